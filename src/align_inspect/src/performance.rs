//! Performance counters recorded by the alignment loop.
//!
//! [`StatCollector`] owns one histogram per counter. All of them share the bin
//! count, file prefix and report flag of a [`PerformanceConfig`].

use std::io::{self, Write};

use serde::Serialize;
use tracing::{error, info};

use crate::config::PerformanceConfig;
use crate::error::{InspectError, Result};
use crate::histogram::{Histogram, Sample, Stats};

/// Final statistics of one histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSummary {
    pub name: String,
    pub count: usize,
    pub stats: Stats,
}

/// Statistics of every performance histogram, in collector order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub histograms: Vec<HistogramSummary>,
}

impl PerformanceSummary {
    pub fn get(&self, name: &str) -> Option<&HistogramSummary> {
        self.histograms.iter().find(|h| h.name == name)
    }

    /// Convert to JSON string. Non-finite values (empty histograms) become
    /// `null`.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Convert to pretty JSON string.
    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Column access shared by histograms of every sample type.
trait StatsColumns {
    fn write_line(&self, out: &mut dyn Write) -> io::Result<()>;
    fn write_header(&self, out: &mut dyn Write) -> io::Result<()>;
    fn summary(&self) -> HistogramSummary;
}

impl<T: Sample> StatsColumns for Histogram<T> {
    fn write_line(&self, out: &mut dyn Write) -> io::Result<()> {
        self.write_stats(out)
    }

    fn write_header(&self, out: &mut dyn Write) -> io::Result<()> {
        self.write_stats_header(out)
    }

    fn summary(&self) -> HistogramSummary {
        HistogramSummary {
            name: self.name().to_string(),
            count: self.len(),
            stats: self.compute_stats(),
        }
    }
}

/// Histograms of the per-run performance counters.
#[derive(Debug)]
pub struct StatCollector {
    key_frame_duration: Histogram<f64>,
    convergence_duration: Histogram<f64>,
    iterations_count: Histogram<u32>,
    point_count_in: Histogram<u32>,
    point_count_reading: Histogram<u32>,
    point_count_key_frame: Histogram<u32>,
    point_count_touched: Histogram<u32>,
    overlap_ratio: Histogram<f64>,
}

impl StatCollector {
    pub fn new(config: &PerformanceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            key_frame_duration: Histogram::from_config(&config.histogram("key_frame_duration"))?,
            convergence_duration: Histogram::from_config(
                &config.histogram("convergence_duration"),
            )?,
            iterations_count: Histogram::from_config(&config.histogram("iterations_count"))?,
            point_count_in: Histogram::from_config(&config.histogram("point_count_in"))?,
            point_count_reading: Histogram::from_config(&config.histogram("point_count_reading"))?,
            point_count_key_frame: Histogram::from_config(
                &config.histogram("point_count_key_frame"),
            )?,
            point_count_touched: Histogram::from_config(&config.histogram("point_count_touched"))?,
            overlap_ratio: Histogram::from_config(&config.histogram("overlap_ratio"))?,
        })
    }

    /// Seconds spent creating a key frame.
    pub fn stat_key_frame_duration(&mut self, seconds: f64) {
        self.key_frame_duration.push(seconds);
    }

    /// Seconds until the alignment converged.
    pub fn stat_convergence_duration(&mut self, seconds: f64) {
        self.convergence_duration.push(seconds);
    }

    pub fn stat_iterations_count(&mut self, count: u32) {
        self.iterations_count.push(count);
    }

    pub fn stat_point_count_in(&mut self, count: u32) {
        self.point_count_in.push(count);
    }

    pub fn stat_point_count_reading(&mut self, count: u32) {
        self.point_count_reading.push(count);
    }

    pub fn stat_point_count_key_frame(&mut self, count: u32) {
        self.point_count_key_frame.push(count);
    }

    pub fn stat_point_count_touched(&mut self, count: u32) {
        self.point_count_touched.push(count);
    }

    /// Fraction of reading points with a valid match, in `[0, 1]`.
    pub fn stat_overlap_ratio(&mut self, ratio: f64) {
        self.overlap_ratio.push(ratio);
    }

    pub fn key_frame_duration(&self) -> &Histogram<f64> {
        &self.key_frame_duration
    }

    pub fn convergence_duration(&self) -> &Histogram<f64> {
        &self.convergence_duration
    }

    pub fn iterations_count(&self) -> &Histogram<u32> {
        &self.iterations_count
    }

    pub fn point_count_in(&self) -> &Histogram<u32> {
        &self.point_count_in
    }

    pub fn point_count_reading(&self) -> &Histogram<u32> {
        &self.point_count_reading
    }

    pub fn point_count_key_frame(&self) -> &Histogram<u32> {
        &self.point_count_key_frame
    }

    pub fn point_count_touched(&self) -> &Histogram<u32> {
        &self.point_count_touched
    }

    pub fn overlap_ratio(&self) -> &Histogram<f64> {
        &self.overlap_ratio
    }

    fn columns(&self) -> [&dyn StatsColumns; 8] {
        [
            &self.key_frame_duration,
            &self.convergence_duration,
            &self.iterations_count,
            &self.point_count_in,
            &self.point_count_reading,
            &self.point_count_key_frame,
            &self.point_count_touched,
            &self.overlap_ratio,
        ]
    }

    /// Current statistics of every histogram.
    pub fn summary(&self) -> PerformanceSummary {
        PerformanceSummary {
            histograms: self.columns().iter().map(|c| c.summary()).collect(),
        }
    }

    /// Statistics lines of all histograms joined by a space.
    pub fn write_stats<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (i, column) in self.columns().iter().enumerate() {
            if i > 0 {
                out.write_all(b" ")?;
            }
            column.write_line(out)?;
        }
        Ok(())
    }

    /// Column names matching [`StatCollector::write_stats`].
    pub fn write_stats_header<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (i, column) in self.columns().iter().enumerate() {
            if i > 0 {
                out.write_all(b" ")?;
            }
            column.write_header(out)?;
        }
        Ok(())
    }

    /// Finalize every histogram, reporting to stderr.
    pub fn finalize(self) -> Result<PerformanceSummary> {
        self.finalize_to(&mut io::stderr().lock())
    }

    /// Finalize every histogram, reporting to `diagnostics`.
    ///
    /// Every histogram dumps and reports even when another one failed. On
    /// failure the error is [`InspectError::Incomplete`], which carries the
    /// full summary alongside the first I/O error; later failures are logged.
    pub fn finalize_to<W: Write + ?Sized>(self, diagnostics: &mut W) -> Result<PerformanceSummary> {
        let Self {
            key_frame_duration,
            convergence_duration,
            iterations_count,
            point_count_in,
            point_count_reading,
            point_count_key_frame,
            point_count_touched,
            overlap_ratio,
        } = self;

        let mut finalizer = Finalizer::default();
        finalizer.run(key_frame_duration, diagnostics);
        finalizer.run(convergence_duration, diagnostics);
        finalizer.run(iterations_count, diagnostics);
        finalizer.run(point_count_in, diagnostics);
        finalizer.run(point_count_reading, diagnostics);
        finalizer.run(point_count_key_frame, diagnostics);
        finalizer.run(point_count_touched, diagnostics);
        finalizer.run(overlap_ratio, diagnostics);

        let Finalizer {
            summary,
            first_error,
            failures,
        } = finalizer;
        match first_error {
            Some(source) => Err(InspectError::Incomplete {
                summary: Box::new(summary),
                failures,
                source: Box::new(source),
            }),
            None => {
                info!("finalized {} performance histograms", summary.histograms.len());
                Ok(summary)
            }
        }
    }
}

#[derive(Default)]
struct Finalizer {
    summary: PerformanceSummary,
    first_error: Option<InspectError>,
    failures: usize,
}

impl Finalizer {
    fn run<T: Sample, W: Write + ?Sized>(&mut self, histogram: Histogram<T>, diagnostics: &mut W) {
        let name = histogram.name().to_string();
        let count = histogram.len();
        let (stats, outputs) = histogram.finalize_outputs(diagnostics);
        self.summary.histograms.push(HistogramSummary {
            name: name.clone(),
            count,
            stats,
        });
        if let Err(e) = outputs {
            self.failures += 1;
            if self.first_error.is_none() {
                self.first_error = Some(e);
            } else {
                error!("failed to write outputs of histogram {name}: {e}");
            }
        }
    }
}

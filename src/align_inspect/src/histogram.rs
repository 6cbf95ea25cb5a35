//! Running-sample histogram with descriptive statistics.
//!
//! A [`Histogram`] stores every sample pushed into it. Statistics are computed
//! on demand; median and quartiles use partial selection on a scratch copy, so
//! the stored samples keep their recording order for the raw-sample dump.
//!
//! Finalization is explicit: [`Histogram::finalize`] consumes the histogram,
//! writes the configured outputs and returns the final [`Stats`].

use std::fmt::{self, Write as _};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::HistogramConfig;
use crate::error::{InspectError, Result};
use crate::sink::ensure_parent_dir;

/// Significant digits used by the ASCII report.
const REPORT_PRECISION: usize = 4;

/// Width of the longest bar in the ASCII report.
const REPORT_BAR_WIDTH: u64 = 60;

/// Numeric sample type accepted by [`Histogram`].
///
/// Statistics are evaluated in `f64`; the conversion is exact for every
/// implementor except 64-bit integers above 2^53.
pub trait Sample: Copy + PartialOrd + fmt::Display + fmt::Debug {
    /// Machine epsilon of the type the bin index is evaluated in.
    const EPSILON: f64;

    fn to_f64(self) -> f64;

    /// Text of a statistic in the report line.
    fn format_stat(value: f64) -> String;

    /// Inverse of [`Sample::format_stat`].
    fn parse_stat(token: &str) -> Option<f64>;
}

// `$stat` is the type statistics are printed in: the sample type itself for
// floats, `f64` for integers, whose means and quartiles may be fractional.
macro_rules! impl_sample {
    ($($t:ty => ($eps:expr, $stat:ty)),* $(,)?) => {
        $(
            impl Sample for $t {
                const EPSILON: f64 = $eps;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn format_stat(value: f64) -> String {
                    (value as $stat).to_string()
                }

                fn parse_stat(token: &str) -> Option<f64> {
                    token.parse::<$stat>().ok().map(f64::from)
                }
            }
        )*
    };
}

impl_sample! {
    f32 => (f32::EPSILON as f64, f32),
    f64 => (f64::EPSILON, f64),
    u32 => (f64::EPSILON, f64),
    u64 => (f64::EPSILON, f64),
    usize => (f64::EPSILON, f64),
}

/// Descriptive statistics of a sample set.
///
/// Every summary value is NaN for an empty set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stats {
    pub mean: f64,
    /// Population variance.
    pub variance: f64,
    pub median: f64,
    pub low_quartile: f64,
    pub high_quartile: f64,
    pub min: f64,
    pub max: f64,
    /// Per-bin sample counts; length is the bin count.
    pub bins: Vec<u64>,
    pub max_bin_count: u64,
}

impl Stats {
    /// Statistics of an empty sample set.
    pub fn empty(bin_count: usize) -> Self {
        Self {
            mean: f64::NAN,
            variance: f64::NAN,
            median: f64::NAN,
            low_quartile: f64::NAN,
            high_quartile: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
            bins: vec![0; bin_count],
            max_bin_count: 0,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    /// Sum of all bin counts.
    pub fn binned(&self) -> u64 {
        self.bins.iter().sum()
    }

    /// Machine-readable line with `f64` statistics:
    /// `mean variance median lowQuartile highQuartile min max binCount bin_0 .. bin_n maxBinCount`.
    pub fn to_report_line(&self) -> String {
        self.report_line::<f64>()
    }

    /// Machine-readable line with statistics printed the way `T` prints.
    pub fn report_line<T: Sample>(&self) -> String {
        let summary = [
            self.mean,
            self.variance,
            self.median,
            self.low_quartile,
            self.high_quartile,
            self.min,
            self.max,
        ];
        let mut fields: Vec<String> = summary.into_iter().map(T::format_stat).collect();
        fields.push(self.bins.len().to_string());
        fields.extend(self.bins.iter().map(u64::to_string));
        fields.push(self.max_bin_count.to_string());
        fields.join(" ")
    }

    /// Parse a line produced by [`Stats::to_report_line`].
    pub fn from_report_line(line: &str) -> Result<Self> {
        Self::parse_report_line::<f64>(line)
    }

    /// Parse a line produced by [`Stats::report_line`] for the same `T`.
    pub fn parse_report_line<T: Sample>(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let mut summary = [0.0f64; 7];
        for (slot, field) in summary.iter_mut().zip(SUMMARY_FIELDS) {
            let token = tokens
                .next()
                .ok_or_else(|| InspectError::Parse(format!("missing {field}")))?;
            *slot = T::parse_stat(token)
                .ok_or_else(|| InspectError::Parse(format!("invalid {field} `{token}`")))?;
        }
        let bin_count: usize = parse_token(tokens.next(), "bin count")?;
        let bins = (0..bin_count)
            .map(|i| parse_token(tokens.next(), &format!("bin {i}")))
            .collect::<Result<Vec<u64>>>()?;
        let max_bin_count = parse_token(tokens.next(), "max bin count")?;
        if let Some(extra) = tokens.next() {
            return Err(InspectError::Parse(format!("unexpected trailing token `{extra}`")));
        }
        let [mean, variance, median, low_quartile, high_quartile, min, max] = summary;
        Ok(Self {
            mean,
            variance,
            median,
            low_quartile,
            high_quartile,
            min,
            max,
            bins,
            max_bin_count,
        })
    }
}

const SUMMARY_FIELDS: [&str; 7] = [
    "mean",
    "variance",
    "median",
    "low quartile",
    "high quartile",
    "min",
    "max",
];

fn parse_token<V: std::str::FromStr>(token: Option<&str>, field: &str) -> Result<V> {
    let token = token.ok_or_else(|| InspectError::Parse(format!("missing {field}")))?;
    token
        .parse()
        .map_err(|_| InspectError::Parse(format!("invalid {field} `{token}`")))
}

/// Accumulates samples of `T` and reports statistics about them.
///
/// Not synchronized; the owning alignment loop serializes access.
pub struct Histogram<T: Sample> {
    bin_count: usize,
    name: String,
    file_prefix: String,
    dump_report: bool,
    samples: Vec<T>,
    finalized: bool,
}

impl<T: Sample> Histogram<T> {
    /// Create an empty histogram. Fails with a configuration error when
    /// `bin_count` is zero.
    pub fn new(
        bin_count: usize,
        name: impl Into<String>,
        file_prefix: impl Into<String>,
        dump_report: bool,
    ) -> Result<Self> {
        Self::from_config(&HistogramConfig {
            bin_count,
            name: name.into(),
            file_prefix: file_prefix.into(),
            dump_report,
        })
    }

    pub fn from_config(config: &HistogramConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            bin_count: config.bin_count,
            name: config.name.clone(),
            file_prefix: config.file_prefix.clone(),
            dump_report: config.dump_report,
            samples: Vec::new(),
            finalized: false,
        })
    }

    #[inline]
    pub fn push(&mut self, value: T) {
        self.samples.push(value);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in recording order.
    pub fn samples(&self) -> &[T] {
        &self.samples
    }

    /// Path of the raw-sample dump, `None` when the prefix is empty.
    pub fn sample_path(&self) -> Option<PathBuf> {
        if self.file_prefix.is_empty() {
            None
        } else {
            Some(PathBuf::from(format!("{}{}", self.file_prefix, self.name)))
        }
    }

    pub fn compute_stats(&self) -> Stats {
        let n = self.samples.len();
        if n == 0 {
            return Stats::empty(self.bin_count);
        }

        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in self.samples.iter().map(|v| v.to_f64()) {
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        let mean = sum / n as f64;

        let mut bins = vec![0u64; self.bin_count];
        if min == max {
            return Stats {
                mean,
                variance: 0.0,
                median: min,
                low_quartile: min,
                high_quartile: min,
                min,
                max,
                bins,
                max_bin_count: 0,
            };
        }

        // The epsilon factor keeps `max` inside the last bin.
        let span = (max - min) * (1.0 + T::EPSILON * 10.0);
        let last_bin = self.bin_count - 1;
        let mut variance = 0.0;
        let mut max_bin_count = 0;
        for v in self.samples.iter().map(|v| v.to_f64()) {
            variance += (v - mean) * (v - mean);
            let index = (((v - min) * self.bin_count as f64 / span) as usize).min(last_bin);
            bins[index] += 1;
            max_bin_count = max_bin_count.max(bins[index]);
        }
        variance /= n as f64;

        let (low_quartile, median, high_quartile) = order_statistics(&self.samples);

        Stats {
            mean,
            variance,
            median,
            low_quartile,
            high_quartile,
            min,
            max,
            bins,
            max_bin_count,
        }
    }

    /// Write the machine-readable statistics line (no trailing newline).
    pub fn write_stats<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(self.compute_stats().report_line::<T>().as_bytes())
    }

    /// Write the column names matching [`Histogram::write_stats`].
    pub fn write_stats_header<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(self.stats_header().join(" ").as_bytes())
    }

    fn stats_header(&self) -> Vec<String> {
        let name = &self.name;
        let mut columns: Vec<String> = [
            "mean",
            "var",
            "median",
            "low_quartile",
            "high_quartile",
            "min_value",
            "max_value",
            "bin_count",
        ]
        .iter()
        .map(|column| format!("{name}_{column}"))
        .collect();
        columns.extend((0..self.bin_count).map(|i| format!("{name}_bin_{i}")));
        columns.push(format!("{name}_max_bin_count"));
        columns
    }

    /// ASCII report: a header, the count and mean, then one bar per bin when
    /// more than one sample was recorded.
    pub fn render_report(&self, stats: &Stats) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Histogram {}:", self.name);
        let _ = writeln!(
            out,
            "  count: {}, mean: {}",
            self.samples.len(),
            format_general(stats.mean, REPORT_PRECISION)
        );
        if self.samples.len() > 1 {
            for (i, &count) in stats.bins.iter().enumerate() {
                let lower_edge =
                    stats.min + i as f64 * (stats.max - stats.min) / self.bin_count as f64;
                let bar = if stats.max_bin_count > 0 {
                    (count * REPORT_BAR_WIDTH / stats.max_bin_count) as usize
                } else {
                    0
                };
                let _ = writeln!(
                    out,
                    "  {:<10} ({:<6}) : {}",
                    format_general(lower_edge, REPORT_PRECISION),
                    count,
                    "*".repeat(bar)
                );
            }
        }
        out
    }

    /// Finalize, sending the report (if enabled) to stderr.
    pub fn finalize(self) -> Result<Stats> {
        self.finalize_to(&mut io::stderr().lock())
    }

    /// Finalize, sending the report (if enabled) to `diagnostics`.
    ///
    /// Writes the raw-sample file when a prefix is configured and returns the
    /// final statistics. The report is written even when the sample dump
    /// fails; the first failure is returned.
    pub fn finalize_to<W: Write + ?Sized>(self, diagnostics: &mut W) -> Result<Stats> {
        let (stats, outputs) = self.finalize_outputs(diagnostics);
        outputs.map(|()| stats)
    }

    /// Final statistics plus the outcome of writing the configured outputs.
    pub(crate) fn finalize_outputs<W: Write + ?Sized>(
        mut self,
        diagnostics: &mut W,
    ) -> (Stats, Result<()>) {
        self.finalized = true;
        let stats = self.compute_stats();

        let dumped = match self.sample_path() {
            Some(path) => self.write_samples(&path),
            None => Ok(()),
        };

        let reported = if self.dump_report {
            let report = self.render_report(&stats);
            diagnostics
                .write_all(report.as_bytes())
                .and_then(|()| diagnostics.flush())
                .map_err(|e| InspectError::io("<diagnostics>", e))
        } else {
            Ok(())
        };

        (stats, dumped.and(reported))
    }

    fn write_samples(&self, path: &Path) -> Result<()> {
        info!(
            "writing {} samples of histogram {} to {}",
            self.samples.len(),
            self.name,
            path.display()
        );
        ensure_parent_dir(path)?;
        let file = File::create(path).map_err(|e| InspectError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        for value in &self.samples {
            writeln!(writer, "{value}").map_err(|e| InspectError::io(path, e))?;
        }
        writer.flush().map_err(|e| InspectError::io(path, e))
    }
}

impl<T: Sample> fmt::Debug for Histogram<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Histogram")
            .field("name", &self.name)
            .field("bin_count", &self.bin_count)
            .field("samples", &self.samples.len())
            .finish()
    }
}

impl<T: Sample> Drop for Histogram<T> {
    fn drop(&mut self) {
        let has_output = self.dump_report || !self.file_prefix.is_empty();
        if !self.finalized && has_output && !self.samples.is_empty() {
            warn!(
                "histogram {} dropped without finalize; {} samples not written",
                self.name,
                self.samples.len()
            );
        }
    }
}

/// Low quartile, median and high quartile at ranks n/4, n/2 and 3n/4.
///
/// Requires at least two samples.
fn order_statistics<T: Sample>(samples: &[T]) -> (f64, f64, f64) {
    let mut scratch: Vec<f64> = samples.iter().map(|v| v.to_f64()).collect();
    let n = scratch.len();
    let (low, mid, high) = (n / 4, n / 2, 3 * n / 4);

    let (left, median, right) = scratch.select_nth_unstable_by(mid, f64::total_cmp);
    let median = *median;
    // Partitions around the median already bound the quartile searches.
    let low_quartile = if low < mid {
        *left.select_nth_unstable_by(low, f64::total_cmp).1
    } else {
        median
    };
    let high_quartile = if high > mid {
        *right.select_nth_unstable_by(high - mid - 1, f64::total_cmp).1
    } else {
        median
    };
    (low_quartile, median, high_quartile)
}

/// Format `value` with `precision` significant digits in general notation:
/// fixed for moderate exponents, scientific otherwise, trailing zeros removed.
pub fn format_general(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let precision = precision.max(1);
    let scientific = format!("{:.*e}", precision - 1, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

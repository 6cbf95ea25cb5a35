//! Inspector: performance statistics plus an injected exporter.
//!
//! The alignment loop records counters through the `stat_*` methods and
//! forwards dumps to the exporter. [`Inspector::close`] finalizes every
//! histogram and must be called explicitly; there is no I/O on drop.

use std::io::Write;

use tracing::{debug, info};

use crate::cloud::DataPoints;
use crate::config::{InspectorConfig, InspectorKind, PerformanceConfig};
use crate::error::Result;
use crate::export::{ExportBuilder, Exporter, IterationState, NullExporter};
use crate::performance::{PerformanceSummary, StatCollector};
use crate::sink::FileSinkProvider;

pub struct Inspector<E: Exporter = NullExporter> {
    stats: StatCollector,
    exporter: E,
}

impl Inspector<NullExporter> {
    /// Inspector that records statistics silently and exports nothing.
    pub fn null() -> Result<Self> {
        let config = PerformanceConfig::default()
            .with_file_prefix("")
            .with_dump_perf_on_exit(false);
        Ok(Self::new(StatCollector::new(&config)?, NullExporter))
    }
}

impl<E: Exporter> Inspector<E> {
    pub fn new(stats: StatCollector, exporter: E) -> Self {
        Self { stats, exporter }
    }

    pub fn stats(&self) -> &StatCollector {
        &self.stats
    }

    pub fn exporter(&self) -> &E {
        &self.exporter
    }

    pub fn exporter_mut(&mut self) -> &mut E {
        &mut self.exporter
    }

    pub fn init(&mut self) -> Result<()> {
        self.exporter.init()
    }

    pub fn stat_key_frame_duration(&mut self, seconds: f64) {
        self.stats.stat_key_frame_duration(seconds);
    }

    pub fn stat_convergence_duration(&mut self, seconds: f64) {
        self.stats.stat_convergence_duration(seconds);
    }

    pub fn stat_iterations_count(&mut self, count: u32) {
        self.stats.stat_iterations_count(count);
    }

    pub fn stat_point_count_in(&mut self, count: u32) {
        self.stats.stat_point_count_in(count);
    }

    pub fn stat_point_count_reading(&mut self, count: u32) {
        self.stats.stat_point_count_reading(count);
    }

    pub fn stat_point_count_key_frame(&mut self, count: u32) {
        self.stats.stat_point_count_key_frame(count);
    }

    pub fn stat_point_count_touched(&mut self, count: u32) {
        self.stats.stat_point_count_touched(count);
    }

    pub fn stat_overlap_ratio(&mut self, ratio: f64) {
        self.stats.stat_overlap_ratio(ratio);
    }

    pub fn dump_data_points(&mut self, cloud: &DataPoints, label: &str) -> Result<()> {
        self.exporter.dump_data_points(cloud, label)
    }

    pub fn dump_mesh_nodes(&mut self, cloud: &DataPoints, label: &str) -> Result<()> {
        self.exporter.dump_mesh_nodes(cloud, label)
    }

    pub fn dump_iteration(&mut self, iteration: usize, state: &IterationState<'_>) -> Result<()> {
        self.exporter.dump_iteration(iteration, state)
    }

    pub fn finish(&mut self, final_iteration: usize) -> Result<()> {
        self.exporter.finish(final_iteration)
    }

    /// Finalize the statistics, reporting to stderr.
    ///
    /// When some outputs cannot be written the statistics are still available
    /// through [`crate::InspectError::partial_summary`].
    pub fn close(self) -> Result<PerformanceSummary> {
        self.stats.finalize()
    }

    /// Finalize the statistics, reporting to `diagnostics`.
    pub fn close_to<W: Write + ?Sized>(self, diagnostics: &mut W) -> Result<PerformanceSummary> {
        self.stats.finalize_to(diagnostics)
    }
}

/// Assemble the inspector selected by `config`.
pub fn build_inspector(config: &InspectorConfig) -> Result<Inspector<Box<dyn Exporter>>> {
    config.validate()?;

    let performance = match config.kind {
        InspectorKind::Null => config
            .performance
            .clone()
            .with_file_prefix("")
            .with_dump_perf_on_exit(false),
        InspectorKind::Performance | InspectorKind::VtkFile => config.performance.clone(),
    };
    let exporter: Box<dyn Exporter> = match config.kind {
        InspectorKind::VtkFile => Box::new(ExportBuilder::new(FileSinkProvider::new(
            config.vtk.base_file_name.clone(),
        ))),
        InspectorKind::Null | InspectorKind::Performance => Box::new(NullExporter),
    };

    let mut inspector = Inspector::new(StatCollector::new(&performance)?, exporter);
    inspector.init()?;
    info!("built {:?} inspector", config.kind);
    debug!("performance histograms: {performance:?}");
    Ok(inspector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VtkConfig;
    use crate::sink::MemorySinkProvider;
    use crate::test_utils::{corner_planes, nearest_neighbor_matches, uniform_weights};

    #[test]
    fn test_null_inspector_is_silent() {
        let mut inspector = Inspector::null().unwrap();
        inspector.stat_iterations_count(12);
        inspector.stat_overlap_ratio(0.8);
        inspector
            .dump_data_points(&corner_planes(1.0, 1.0), "reference")
            .unwrap();

        let mut diagnostics = Vec::<u8>::new();
        let summary = inspector.close_to(&mut diagnostics).unwrap();
        assert!(diagnostics.is_empty());
        assert_eq!(summary.get("iterations_count").unwrap().count, 1);
    }

    #[test]
    fn test_null_kind_ignores_outputs() {
        let config = InspectorConfig::default().with_performance(
            PerformanceConfig::default()
                .with_file_prefix("should-not-exist/")
                .with_dump_perf_on_exit(true),
        );
        let mut inspector = build_inspector(&config).unwrap();
        inspector.stat_point_count_in(10);

        let mut diagnostics = Vec::<u8>::new();
        inspector.close_to(&mut diagnostics).unwrap();
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_performance_kind_reports() {
        let config = InspectorConfig::default()
            .with_kind(InspectorKind::Performance)
            .with_performance(PerformanceConfig::default().with_dump_perf_on_exit(true));
        let mut inspector = build_inspector(&config).unwrap();
        inspector.stat_point_count_reading(500);

        let mut diagnostics = Vec::<u8>::new();
        inspector.close_to(&mut diagnostics).unwrap();
        let report = String::from_utf8(diagnostics).unwrap();
        assert!(report.contains("Histogram point_count_reading:\n  count: 1, mean: 500\n"));
    }

    #[test]
    fn test_vtk_kind_rejects_empty_base_name() {
        let config = InspectorConfig::default()
            .with_kind(InspectorKind::VtkFile)
            .with_vtk(VtkConfig::default().with_base_file_name(""));
        assert!(build_inspector(&config).is_err());
    }

    #[test]
    fn test_inspector_with_memory_exporter() {
        let reference = corner_planes(1.0, 1.0);
        let reading = corner_planes(1.0, 0.5);
        let matches = nearest_neighbor_matches(&reference, &reading);
        let weights = uniform_weights(&matches, 1.0);
        let transformation = nalgebra::DMatrix::identity(4, 4);
        let empty = nalgebra::DMatrix::zeros(0, 0);

        let stats = StatCollector::new(&PerformanceConfig::default()).unwrap();
        let exporter = ExportBuilder::new(MemorySinkProvider::default());
        let mut inspector = Inspector::new(stats, exporter);
        inspector
            .dump_iteration(
                0,
                &IterationState {
                    transformation: &transformation,
                    reference: &reference,
                    reading: &reading,
                    matches: &matches,
                    feature_outlier_weights: &weights,
                    descriptor_outlier_weights: &empty,
                    checkers: &[],
                },
            )
            .unwrap();
        inspector.finish(0).unwrap();

        let provider = inspector.exporter().provider();
        let text = provider.text("iteration", Some(0)).unwrap();
        let total = reference.point_count() + reading.point_count();
        assert!(text.contains(&format!("POINTS {total} double")));
        assert!(text.contains(&format!(
            "LINES {} {}",
            reading.point_count(),
            3 * reading.point_count()
        )));
        assert_eq!(
            provider.text("iteration-info.csv", None).unwrap(),
            "iteration\n0\n"
        );
        inspector.close_to(&mut Vec::<u8>::new()).unwrap();
    }
}

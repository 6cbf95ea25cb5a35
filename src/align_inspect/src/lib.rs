//! Run-time statistics and visual export for iterative point-cloud alignment.
//!
//! This crate instruments an alignment loop that lives elsewhere:
//!
//! - [`Histogram`] accumulates samples and reports descriptive statistics;
//! - [`StatCollector`] bundles the per-run performance histograms;
//! - [`Exporter`] implementations write clouds, matches and outlier weights
//!   as VTK legacy polydata through a [`SinkProvider`];
//! - [`Inspector`] composes the two and is built from an [`InspectorConfig`].
//!
//! # Example
//!
//! ```ignore
//! use align_inspect::{build_inspector, load_config, time_stat};
//!
//! let config = load_config("inspector.json".as_ref())?;
//! let mut inspector = build_inspector(&config)?;
//!
//! for iteration in 0..max_iterations {
//!     let state = time_stat!(inspector, stat_convergence_duration, step(&mut solver));
//!     inspector.dump_iteration(iteration, &state)?;
//! }
//! inspector.finish(max_iterations - 1)?;
//! let summary = inspector.close()?;
//! println!("{}", summary.to_json_pretty()?);
//! ```

pub mod blocks;
pub mod cloud;
pub mod config;
pub mod error;
pub mod export;
pub mod histogram;
pub mod inspector;
pub mod performance;
pub mod sink;
pub mod test_utils;
pub mod timing;
pub mod vtk;

pub use cloud::{
    CheckerSnapshot, DataPoints, Descriptor, Matches, OutlierWeights, TransformationParameters,
};
pub use config::{
    load_config, HistogramConfig, InspectorConfig, InspectorKind, PerformanceConfig, VtkConfig,
};
pub use error::{InspectError, Result};
pub use export::{ExportBuilder, Exporter, IterationState, NullExporter};
pub use histogram::{Histogram, Sample, Stats};
pub use inspector::{build_inspector, Inspector};
pub use performance::{HistogramSummary, PerformanceSummary, StatCollector};
pub use sink::{FileSinkProvider, MemorySinkProvider, SinkGuard, SinkProvider};
pub use timing::Timer;

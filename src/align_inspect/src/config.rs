//! Configuration for histograms, the performance collector and exporters.
//!
//! Every struct carries its documented defaults through `Default` and
//! deserializes with `#[serde(default)]`, so a JSON file only has to name the
//! values it overrides:
//!
//! ```ignore
//! {
//!     "kind": "vtk_file",
//!     "performance": { "dump_perf_on_exit": true },
//!     "vtk": { "base_file_name": "out/run-01" }
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{InspectError, Result};

/// Bin count used when none is configured.
pub const DEFAULT_BIN_COUNT: usize = 16;

/// Base file name used by the VTK exporter when none is configured.
pub const DEFAULT_BASE_FILE_NAME: &str = "point-matcher-output";

/// Configuration of a single [`Histogram`](crate::Histogram).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    /// Number of bins; must be positive.
    pub bin_count: usize,
    /// Name used in reports and as the raw-sample file suffix.
    pub name: String,
    /// Prefix of the raw-sample file. Empty disables the file dump.
    pub file_prefix: String,
    /// Write the ASCII report to the diagnostic channel on finalize.
    pub dump_report: bool,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            bin_count: DEFAULT_BIN_COUNT,
            name: "histogram".to_string(),
            file_prefix: String::new(),
            dump_report: false,
        }
    }
}

impl HistogramConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_bin_count(mut self, bin_count: usize) -> Self {
        self.bin_count = bin_count;
        self
    }

    pub fn with_file_prefix(mut self, file_prefix: impl Into<String>) -> Self {
        self.file_prefix = file_prefix.into();
        self
    }

    pub fn with_dump_report(mut self, dump_report: bool) -> Self {
        self.dump_report = dump_report;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.bin_count == 0 {
            return Err(InspectError::Config(format!(
                "histogram `{}` needs a positive bin count",
                self.name
            )));
        }
        Ok(())
    }
}

/// Configuration shared by the eight histograms of the
/// [`StatCollector`](crate::StatCollector).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Number of bins of every performance histogram.
    pub bin_count: usize,
    /// Prefix of the raw-sample files. Empty disables the file dumps.
    pub file_prefix: String,
    /// Write every histogram report to the diagnostic channel on close.
    pub dump_perf_on_exit: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            bin_count: DEFAULT_BIN_COUNT,
            file_prefix: String::new(),
            dump_perf_on_exit: false,
        }
    }
}

impl PerformanceConfig {
    pub fn with_bin_count(mut self, bin_count: usize) -> Self {
        self.bin_count = bin_count;
        self
    }

    pub fn with_file_prefix(mut self, file_prefix: impl Into<String>) -> Self {
        self.file_prefix = file_prefix.into();
        self
    }

    pub fn with_dump_perf_on_exit(mut self, dump: bool) -> Self {
        self.dump_perf_on_exit = dump;
        self
    }

    /// Histogram configuration for one named performance counter.
    pub fn histogram(&self, name: &str) -> HistogramConfig {
        HistogramConfig {
            bin_count: self.bin_count,
            name: name.to_string(),
            file_prefix: self.file_prefix.clone(),
            dump_report: self.dump_perf_on_exit,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.bin_count == 0 {
            return Err(InspectError::Config(
                "performance histograms need a positive bin count".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration of the file-backed VTK exporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VtkConfig {
    /// Base of every exported file name; may contain directories.
    pub base_file_name: String,
}

impl Default for VtkConfig {
    fn default() -> Self {
        Self {
            base_file_name: DEFAULT_BASE_FILE_NAME.to_string(),
        }
    }
}

impl VtkConfig {
    pub fn with_base_file_name(mut self, base_file_name: impl Into<String>) -> Self {
        self.base_file_name = base_file_name.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_file_name.trim().is_empty() {
            return Err(InspectError::Config(
                "VTK base file name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which inspector [`build_inspector`](crate::build_inspector) assembles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectorKind {
    /// Statistics are accumulated but never written; nothing is exported.
    #[default]
    Null,
    /// Performance statistics only.
    Performance,
    /// Performance statistics plus VTK files for every dump.
    VtkFile,
}

/// Top-level inspector configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    pub kind: InspectorKind,
    pub performance: PerformanceConfig,
    pub vtk: VtkConfig,
}

impl InspectorConfig {
    pub fn with_kind(mut self, kind: InspectorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_performance(mut self, performance: PerformanceConfig) -> Self {
        self.performance = performance;
        self
    }

    pub fn with_vtk(mut self, vtk: VtkConfig) -> Self {
        self.vtk = vtk;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.performance.validate()?;
        if self.kind == InspectorKind::VtkFile {
            self.vtk.validate()?;
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| InspectError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

/// Load and validate an inspector configuration from a JSON file.
pub fn load_config(path: &Path) -> Result<InspectorConfig> {
    let contents = fs::read_to_string(path).map_err(|e| InspectError::io(path, e))?;
    InspectorConfig::from_json_str(&contents).map_err(|e| match e {
        InspectError::Config(msg) => InspectError::Config(format!("{}: {msg}", path.display())),
        other => other,
    })
}

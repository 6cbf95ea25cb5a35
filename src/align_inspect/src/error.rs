//! Error type shared by every inspector component.

use std::path::PathBuf;

use thiserror::Error;

use crate::performance::PerformanceSummary;

/// Errors raised while recording statistics or exporting alignment state.
#[derive(Error, Debug)]
pub enum InspectError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{what} has shape {rows}x{cols}, expected {expected_rows}x{expected_cols}")]
    Shape {
        what: String,
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    #[error("malformed statistics line: {0}")]
    Parse(String),

    /// Some histogram outputs could not be written. Statistics were still
    /// computed for every histogram.
    #[error("{failures} histogram outputs failed; first failure: {source}")]
    Incomplete {
        summary: Box<PerformanceSummary>,
        failures: usize,
        #[source]
        source: Box<InspectError>,
    },
}

impl InspectError {
    /// Statistics computed before a finalize failure, if any.
    pub fn partial_summary(&self) -> Option<&PerformanceSummary> {
        match self {
            InspectError::Incomplete { summary, .. } => Some(summary),
            _ => None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InspectError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn shape(
        what: impl Into<String>,
        (rows, cols): (usize, usize),
        (expected_rows, expected_cols): (usize, usize),
    ) -> Self {
        InspectError::Shape {
            what: what.into(),
            rows,
            cols,
            expected_rows,
            expected_cols,
        }
    }
}

pub type Result<T> = std::result::Result<T, InspectError>;

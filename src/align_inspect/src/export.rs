//! Export of point clouds and per-iteration alignment state.
//!
//! [`Exporter`] is the capability the inspector delegates dumps to.
//! [`ExportBuilder`] renders VTK polydata into sinks handed out by a
//! [`SinkProvider`]; every sink goes through a [`SinkGuard`] so it is released
//! even when a write fails halfway.

use std::io::{self, Write};

use nalgebra::DMatrix;
use tracing::{debug, info, warn};

use crate::blocks::{self, AttributeBlock};
use crate::cloud::{CheckerSnapshot, DataPoints, Matches, OutlierWeights, TransformationParameters};
use crate::error::{InspectError, Result};
use crate::sink::{SinkGuard, SinkProvider};
use crate::vtk::VtkWriter;

/// Role of the per-iteration files.
pub const ITERATION_ROLE: &str = "iteration";

/// Role of the end-of-run checker summary.
pub const ITERATION_INFO_ROLE: &str = "iteration-info.csv";

/// Everything the alignment loop hands over at one iteration.
#[derive(Debug, Clone, Copy)]
pub struct IterationState<'a> {
    pub transformation: &'a TransformationParameters,
    /// Filtered reference cloud.
    pub reference: &'a DataPoints,
    /// Reading cloud after the current transformation.
    pub reading: &'a DataPoints,
    pub matches: &'a Matches,
    pub feature_outlier_weights: &'a OutlierWeights,
    /// May be empty (`0 x 0`), in which case every weight is zero.
    pub descriptor_outlier_weights: &'a OutlierWeights,
    pub checkers: &'a [CheckerSnapshot],
}

/// Sink for clouds and alignment state.
pub trait Exporter {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Points plus every descriptor.
    fn dump_data_points(&mut self, cloud: &DataPoints, label: &str) -> Result<()>;

    /// Points only.
    fn dump_mesh_nodes(&mut self, cloud: &DataPoints, label: &str) -> Result<()>;

    fn dump_iteration(&mut self, iteration: usize, state: &IterationState<'_>) -> Result<()>;

    /// Called once after the last iteration.
    fn finish(&mut self, final_iteration: usize) -> Result<()>;
}

impl<E: Exporter + ?Sized> Exporter for Box<E> {
    fn init(&mut self) -> Result<()> {
        (**self).init()
    }

    fn dump_data_points(&mut self, cloud: &DataPoints, label: &str) -> Result<()> {
        (**self).dump_data_points(cloud, label)
    }

    fn dump_mesh_nodes(&mut self, cloud: &DataPoints, label: &str) -> Result<()> {
        (**self).dump_mesh_nodes(cloud, label)
    }

    fn dump_iteration(&mut self, iteration: usize, state: &IterationState<'_>) -> Result<()> {
        (**self).dump_iteration(iteration, state)
    }

    fn finish(&mut self, final_iteration: usize) -> Result<()> {
        (**self).finish(final_iteration)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExporter;

impl Exporter for NullExporter {
    fn dump_data_points(&mut self, _cloud: &DataPoints, _label: &str) -> Result<()> {
        Ok(())
    }

    fn dump_mesh_nodes(&mut self, _cloud: &DataPoints, _label: &str) -> Result<()> {
        Ok(())
    }

    fn dump_iteration(&mut self, _iteration: usize, _state: &IterationState<'_>) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self, _final_iteration: usize) -> Result<()> {
        Ok(())
    }
}

/// Checker values recorded for the iteration summary.
#[derive(Debug, Clone, PartialEq)]
struct IterationRecord {
    iteration: usize,
    values: Vec<f64>,
}

/// Writes VTK polydata for every dump into sinks of `P`.
#[derive(Debug)]
pub struct ExportBuilder<P: SinkProvider> {
    provider: P,
    info_header: Vec<String>,
    records: Vec<IterationRecord>,
    mismatched: usize,
}

impl<P: SinkProvider> ExportBuilder<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            info_header: Vec::new(),
            records: Vec::new(),
            mismatched: 0,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn into_provider(self) -> P {
        self.provider
    }

    /// Iterations recorded since the last [`Exporter::finish`].
    pub fn recorded_iterations(&self) -> usize {
        self.records.len()
    }

    /// Recorded iterations whose checker columns differ from the CSV header.
    pub fn mismatched_iterations(&self) -> usize {
        self.mismatched
    }

    fn write_cloud(
        &mut self,
        cloud: &DataPoints,
        label: &str,
        with_descriptors: bool,
    ) -> Result<()> {
        let positions = blocks::position_values(cloud);
        let attributes = if with_descriptors {
            blocks::cloud_blocks(cloud)?
        } else {
            Vec::new()
        };

        let mut guard = SinkGuard::open(&mut self.provider, label, None)?;
        let written = write_cloud_vtk(&mut guard, label, &positions, &attributes);
        written.map_err(|e| guard.io_error(e))?;
        debug!(
            "exported {} points and {} attributes to {}",
            cloud.point_count(),
            attributes.len(),
            guard.path().display()
        );
        guard.close()
    }
}

impl<P: SinkProvider> Exporter for ExportBuilder<P> {
    fn dump_data_points(&mut self, cloud: &DataPoints, label: &str) -> Result<()> {
        self.write_cloud(cloud, label, true)
    }

    fn dump_mesh_nodes(&mut self, cloud: &DataPoints, label: &str) -> Result<()> {
        self.write_cloud(cloud, label, false)
    }

    fn dump_iteration(&mut self, iteration: usize, state: &IterationState<'_>) -> Result<()> {
        let frame = IterationFrame::build(state)?;

        let mut guard = SinkGuard::open(&mut self.provider, ITERATION_ROLE, Some(iteration))?;
        let written = frame.write(&mut guard, iteration);
        written.map_err(|e| guard.io_error(e))?;
        debug!(
            "exported iteration {iteration} with {} matches to {}",
            frame.lines.len(),
            guard.path().display()
        );
        guard.close()?;

        if self.records.is_empty() {
            self.info_header = checker_columns(state.checkers);
        }
        let values: Vec<f64> = state
            .checkers
            .iter()
            .flat_map(|c| c.entries().flat_map(|(_, value, _, limit)| [value, limit]))
            .collect();
        if values.len() != self.info_header.len() {
            self.mismatched += 1;
            warn!(
                "iteration {iteration} has {} checker columns, the summary header has {}",
                values.len(),
                self.info_header.len()
            );
        }
        self.records.push(IterationRecord { iteration, values });
        Ok(())
    }

    fn finish(&mut self, final_iteration: usize) -> Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }

        let mut guard = SinkGuard::open(&mut self.provider, ITERATION_INFO_ROLE, None)?;
        let written = write_iteration_info(&mut guard, &self.info_header, &self.records);
        written.map_err(|e| guard.io_error(e))?;
        info!(
            "alignment stopped at iteration {final_iteration}; {} iterations summarized in {}",
            self.records.len(),
            guard.path().display()
        );
        guard.close()?;

        self.records.clear();
        self.info_header.clear();
        self.mismatched = 0;
        Ok(())
    }
}

/// Everything written into one iteration file, built before the sink opens.
struct IterationFrame {
    metadata: Vec<(String, Vec<f64>)>,
    positions: DMatrix<f64>,
    point_count: usize,
    lines: Vec<(usize, usize)>,
    feature_weights: Vec<f64>,
    descriptor_weights: Vec<f64>,
    attributes: Vec<AttributeBlock>,
}

impl IterationFrame {
    fn build(state: &IterationState<'_>) -> Result<Self> {
        let matches = state.matches;
        let n_ref = state.reference.point_count();
        let n_read = state.reading.point_count();

        if matches.reading_count() != n_read {
            return Err(InspectError::shape(
                "match ids",
                matches.shape(),
                (matches.knn(), n_read),
            ));
        }
        if state.feature_outlier_weights.shape() != matches.shape() {
            return Err(InspectError::shape(
                "feature outlier weights",
                state.feature_outlier_weights.shape(),
                matches.shape(),
            ));
        }
        let descriptor_weights = if state.descriptor_outlier_weights.is_empty() {
            DMatrix::zeros(matches.knn(), matches.reading_count())
        } else if state.descriptor_outlier_weights.shape() == matches.shape() {
            state.descriptor_outlier_weights.clone()
        } else {
            return Err(InspectError::shape(
                "descriptor outlier weights",
                state.descriptor_outlier_weights.shape(),
                matches.shape(),
            ));
        };

        let attributes = blocks::paired_blocks(state.reference, state.reading)?;
        let positions = blocks::concat_columns(
            &blocks::position_values(state.reference),
            &blocks::position_values(state.reading),
        );

        let mut lines = Vec::new();
        let mut feature_weights = Vec::new();
        let mut descriptor_weights_out = Vec::new();
        for j in 0..n_read {
            for k in 0..matches.knn() {
                let id = matches.ids[(k, j)];
                let Ok(reference_index) = usize::try_from(id) else {
                    continue;
                };
                if reference_index >= n_ref {
                    continue;
                }
                lines.push((n_ref + j, reference_index));
                feature_weights.push(state.feature_outlier_weights[(k, j)]);
                descriptor_weights_out.push(descriptor_weights[(k, j)]);
            }
        }

        Ok(Self {
            metadata: iteration_metadata(state.transformation, state.checkers),
            positions,
            point_count: n_ref + n_read,
            lines,
            feature_weights,
            descriptor_weights: descriptor_weights_out,
            attributes,
        })
    }

    fn write<W: Write>(&self, out: W, iteration: usize) -> io::Result<()> {
        let mut vtk = VtkWriter::new(out);
        vtk.header(&format!("alignment iteration {iteration}"))?;
        vtk.field_data(&self.metadata)?;
        vtk.points(&self.positions)?;
        vtk.vertices(self.point_count)?;
        vtk.lines(&self.lines)?;

        // Vertex cells come first and carry no weight.
        let vertex_weights = std::iter::repeat(0.0).take(self.point_count);
        vtk.cell_data(self.point_count + self.lines.len())?;
        vtk.scalars(
            "outlier_weight",
            vertex_weights.clone().chain(self.feature_weights.iter().copied()),
        )?;
        vtk.scalars(
            "descriptor_outlier_weight",
            vertex_weights.chain(self.descriptor_weights.iter().copied()),
        )?;

        vtk.point_data(self.point_count)?;
        for block in &self.attributes {
            vtk.block(block)?;
        }
        vtk.into_inner().flush()
    }
}

/// Row-major transformation followed by one array per checker variable.
fn iteration_metadata(
    transformation: &TransformationParameters,
    checkers: &[CheckerSnapshot],
) -> Vec<(String, Vec<f64>)> {
    let flattened: Vec<f64> = transformation
        .row_iter()
        .flat_map(|row| row.iter().copied().collect::<Vec<_>>())
        .collect();
    let mut metadata = vec![("transformation".to_string(), flattened)];
    for checker in checkers {
        for (name, value, limit_name, limit) in checker.entries() {
            metadata.push((name.to_string(), vec![value]));
            metadata.push((limit_name.to_string(), vec![limit]));
        }
    }
    metadata
}

fn checker_columns(checkers: &[CheckerSnapshot]) -> Vec<String> {
    checkers
        .iter()
        .flat_map(|c| {
            c.entries()
                .flat_map(|(name, _, limit_name, _)| [name.to_string(), limit_name.to_string()])
                .collect::<Vec<_>>()
        })
        .collect()
}

fn write_cloud_vtk<W: Write>(
    out: W,
    label: &str,
    positions: &DMatrix<f64>,
    attributes: &[AttributeBlock],
) -> io::Result<()> {
    let mut vtk = VtkWriter::new(out);
    vtk.header(label)?;
    vtk.points(positions)?;
    vtk.vertices(positions.ncols())?;
    if !attributes.is_empty() {
        vtk.point_data(positions.ncols())?;
        for block in attributes {
            vtk.block(block)?;
        }
    }
    vtk.into_inner().flush()
}

fn write_iteration_info<W: Write>(
    mut out: W,
    header: &[String],
    records: &[IterationRecord],
) -> io::Result<()> {
    let mut columns = vec!["iteration".to_string()];
    columns.extend(header.iter().cloned());
    writeln!(out, "{}", columns.join(", "))?;
    for record in records {
        let mut row = vec![record.iteration.to_string()];
        row.extend(record.values.iter().map(f64::to_string));
        writeln!(out, "{}", row.join(", "))?;
    }
    out.flush()
}

//! VTK legacy ASCII polydata writer.
//!
//! Sections are written in the order the caller invokes them; the writer does
//! not check the overall file structure. Every value is written as `double`
//! with the shortest representation that round-trips.

use std::io::{self, Write};

use nalgebra::DMatrix;

use crate::blocks::{AttributeBlock, AttributeKind, TENSOR_COMPONENTS};

pub const VTK_VERSION_LINE: &str = "# vtk DataFile Version 3.0";

pub struct VtkWriter<W: Write> {
    out: W,
}

impl<W: Write> VtkWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn header(&mut self, title: &str) -> io::Result<()> {
        // The title is a single line in the legacy format.
        let title = title.replace(['\n', '\r'], " ");
        writeln!(self.out, "{VTK_VERSION_LINE}")?;
        writeln!(self.out, "{title}")?;
        writeln!(self.out, "ASCII")?;
        writeln!(self.out, "DATASET POLYDATA")
    }

    /// Dataset-level field data: one single-component array per entry.
    pub fn field_data(&mut self, arrays: &[(String, Vec<f64>)]) -> io::Result<()> {
        if arrays.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "FIELD FieldData {}", arrays.len())?;
        for (name, values) in arrays {
            writeln!(self.out, "{} 1 {} double", sanitize_name(name), values.len())?;
            self.row(values.iter().copied())?;
        }
        Ok(())
    }

    /// `POINTS` from a `3 x n` coordinate matrix.
    pub fn points(&mut self, positions: &DMatrix<f64>) -> io::Result<()> {
        writeln!(self.out, "POINTS {} double", positions.ncols())?;
        for column in positions.column_iter() {
            self.row(column.iter().copied())?;
        }
        Ok(())
    }

    /// One vertex cell per point.
    pub fn vertices(&mut self, count: usize) -> io::Result<()> {
        writeln!(self.out, "VERTICES {} {}", count, 2 * count)?;
        for i in 0..count {
            writeln!(self.out, "1 {i}")?;
        }
        Ok(())
    }

    /// Two-point line cells.
    pub fn lines(&mut self, lines: &[(usize, usize)]) -> io::Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "LINES {} {}", lines.len(), 3 * lines.len())?;
        for (from, to) in lines {
            writeln!(self.out, "2 {from} {to}")?;
        }
        Ok(())
    }

    pub fn point_data(&mut self, count: usize) -> io::Result<()> {
        writeln!(self.out, "POINT_DATA {count}")
    }

    pub fn cell_data(&mut self, count: usize) -> io::Result<()> {
        writeln!(self.out, "CELL_DATA {count}")
    }

    pub fn scalars(&mut self, name: &str, values: impl IntoIterator<Item = f64>) -> io::Result<()> {
        writeln!(self.out, "SCALARS {} double 1", sanitize_name(name))?;
        writeln!(self.out, "LOOKUP_TABLE default")?;
        for value in values {
            writeln!(self.out, "{value}")?;
        }
        Ok(())
    }

    pub fn block(&mut self, block: &AttributeBlock) -> io::Result<()> {
        let name = sanitize_name(&block.name);
        let values = &block.values;
        match block.kind {
            AttributeKind::Scalar => return self.scalars(&name, values.row(0).iter().copied()),
            AttributeKind::Vector => writeln!(self.out, "VECTORS {name} double")?,
            AttributeKind::Normal => writeln!(self.out, "NORMALS {name} double")?,
            AttributeKind::Tensor => {
                if values.nrows() != TENSOR_COMPONENTS {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!(
                            "tensor {name} has {} components, expected {TENSOR_COMPONENTS}",
                            values.nrows()
                        ),
                    ));
                }
                writeln!(self.out, "TENSORS {name} double")?;
                for column in values.column_iter() {
                    for r in 0..3 {
                        self.row(column.rows(r * 3, 3).iter().copied())?;
                    }
                }
                return Ok(());
            }
            AttributeKind::Field => {
                writeln!(self.out, "FIELD FieldData 1")?;
                writeln!(
                    self.out,
                    "{name} {} {} double",
                    values.nrows(),
                    values.ncols()
                )?;
            }
        }
        for column in values.column_iter() {
            self.row(column.iter().copied())?;
        }
        Ok(())
    }

    fn row(&mut self, values: impl Iterator<Item = f64>) -> io::Result<()> {
        let line = values
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(self.out, "{line}")
    }
}

/// VTK identifiers cannot contain whitespace.
fn sanitize_name(name: &str) -> String {
    if name.is_empty() {
        return "unnamed".to_string();
    }
    name.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

//! Per-attribute output blocks and their padding rules.
//!
//! Every block stores `components x points` values:
//! - scalar blocks have one component;
//! - vector and normal blocks are zero-padded to at least three components;
//! - tensor blocks are zero-padded to [`TENSOR_COMPONENTS`] rows with the
//!   stored values anchored at `(0, 0)`; larger inputs are rejected;
//! - anything else is kept verbatim as a field block.

use nalgebra::DMatrix;

use crate::cloud::{DataPoints, Descriptor};
use crate::error::{InspectError, Result};

/// Minimum number of components of vector and normal blocks.
pub const MIN_VECTOR_COMPONENTS: usize = 3;

/// Components of a 3x3 tensor block.
pub const TENSOR_COMPONENTS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Scalar,
    Vector,
    Normal,
    Tensor,
    Field,
}

impl AttributeKind {
    /// Block kind for a descriptor of `span` components on a cloud of
    /// `dimension`.
    pub fn classify(name: &str, span: usize, dimension: usize) -> Self {
        if span == 1 {
            AttributeKind::Scalar
        } else if name == "normals" {
            AttributeKind::Normal
        } else if name == "eigVectors" || (dimension >= 2 && span == dimension * dimension) {
            AttributeKind::Tensor
        } else if span == 2 || span == 3 {
            AttributeKind::Vector
        } else {
            AttributeKind::Field
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeBlock {
    pub name: String,
    pub kind: AttributeKind,
    /// `components x points`.
    pub values: DMatrix<f64>,
}

impl AttributeBlock {
    pub fn components(&self) -> usize {
        self.values.nrows()
    }

    pub fn point_count(&self) -> usize {
        self.values.ncols()
    }
}

/// Copy `m` into the top-left corner of a zero matrix of the expected shape.
///
/// Fails when `m` exceeds the expected shape in either dimension.
pub fn pad_with_zeros(
    what: &str,
    m: &DMatrix<f64>,
    expected_rows: usize,
    expected_cols: usize,
) -> Result<DMatrix<f64>> {
    if m.nrows() > expected_rows || m.ncols() > expected_cols {
        return Err(InspectError::shape(
            what,
            m.shape(),
            (expected_rows, expected_cols),
        ));
    }
    let mut padded = DMatrix::zeros(expected_rows, expected_cols);
    padded
        .view_mut((0, 0), (m.nrows(), m.ncols()))
        .copy_from(m);
    Ok(padded)
}

/// Append zero rows until `m` has `min_rows` rows; never truncates.
pub fn pad_components(m: &DMatrix<f64>, min_rows: usize) -> DMatrix<f64> {
    if m.nrows() >= min_rows {
        m.clone()
    } else {
        m.clone().resize_vertically(min_rows, 0.0)
    }
}

pub fn scalar_block(name: &str, values: &DMatrix<f64>) -> Result<AttributeBlock> {
    if values.nrows() != 1 {
        return Err(InspectError::shape(
            format!("scalar attribute `{name}`"),
            values.shape(),
            (1, values.ncols()),
        ));
    }
    Ok(AttributeBlock {
        name: name.to_string(),
        kind: AttributeKind::Scalar,
        values: values.clone(),
    })
}

pub fn vector_block(name: &str, values: &DMatrix<f64>) -> AttributeBlock {
    AttributeBlock {
        name: name.to_string(),
        kind: AttributeKind::Vector,
        values: pad_components(values, MIN_VECTOR_COMPONENTS),
    }
}

pub fn normal_block(name: &str, values: &DMatrix<f64>) -> AttributeBlock {
    AttributeBlock {
        name: name.to_string(),
        kind: AttributeKind::Normal,
        values: pad_components(values, MIN_VECTOR_COMPONENTS),
    }
}

pub fn tensor_block(
    name: &str,
    values: &DMatrix<f64>,
    expected_rows: usize,
    expected_cols: usize,
) -> Result<AttributeBlock> {
    let values = pad_with_zeros(
        &format!("tensor attribute `{name}`"),
        values,
        expected_rows,
        expected_cols,
    )?;
    Ok(AttributeBlock {
        name: name.to_string(),
        kind: AttributeKind::Tensor,
        values,
    })
}

pub fn field_block(name: &str, values: &DMatrix<f64>) -> AttributeBlock {
    AttributeBlock {
        name: name.to_string(),
        kind: AttributeKind::Field,
        values: values.clone(),
    }
}

/// Block for one descriptor of a cloud of `dimension`.
pub fn descriptor_block(descriptor: &Descriptor, dimension: usize) -> Result<AttributeBlock> {
    let name = descriptor.name.as_str();
    let values = &descriptor.values;
    match AttributeKind::classify(name, descriptor.span(), dimension) {
        AttributeKind::Scalar => scalar_block(name, values),
        AttributeKind::Vector => Ok(vector_block(name, values)),
        AttributeKind::Normal => Ok(normal_block(name, values)),
        AttributeKind::Tensor => tensor_block(name, values, TENSOR_COMPONENTS, values.ncols()),
        AttributeKind::Field => Ok(field_block(name, values)),
    }
}

/// Point coordinates padded to three components.
pub fn position_values(cloud: &DataPoints) -> DMatrix<f64> {
    pad_components(cloud.positions(), MIN_VECTOR_COMPONENTS)
}

/// One block per descriptor of `cloud`, in registration order.
pub fn cloud_blocks(cloud: &DataPoints) -> Result<Vec<AttributeBlock>> {
    cloud
        .descriptors()
        .map(|d| descriptor_block(d, cloud.dimension()))
        .collect()
}

/// Blocks over the concatenation `reference ++ reading`.
///
/// Descriptors present on both clouds come first, in the reference's
/// registration order, as paired blocks. Descriptors present on one cloud
/// follow (reference-only, then reading-only) with zeros for the points of
/// the other cloud.
pub fn paired_blocks(reference: &DataPoints, reading: &DataPoints) -> Result<Vec<AttributeBlock>> {
    let n_ref = reference.point_count();
    let n_read = reading.point_count();
    let total = n_ref + n_read;
    let mut blocks = Vec::new();

    for ref_desc in reference.descriptors() {
        let Some(read_desc) = reading.descriptor(&ref_desc.name) else {
            continue;
        };
        if ref_desc.span() != read_desc.span() {
            return Err(InspectError::shape(
                format!("reading attribute `{}`", read_desc.name),
                read_desc.values.shape(),
                (ref_desc.span(), n_read),
            ));
        }
        let ref_block = descriptor_block(ref_desc, reference.dimension())?;
        let read_block = descriptor_block(read_desc, reference.dimension())?;
        blocks.push(AttributeBlock {
            values: concat_columns(&ref_block.values, &read_block.values),
            ..ref_block
        });
    }

    for ref_desc in reference
        .descriptors()
        .filter(|d| !reading.has_descriptor(&d.name))
    {
        let block = descriptor_block(ref_desc, reference.dimension())?;
        blocks.push(place_columns(block, 0, total));
    }
    for read_desc in reading
        .descriptors()
        .filter(|d| !reference.has_descriptor(&d.name))
    {
        let block = descriptor_block(read_desc, reading.dimension())?;
        blocks.push(place_columns(block, n_ref, total));
    }

    Ok(blocks)
}

/// `[left | right]`; both sides must have the same number of rows.
pub fn concat_columns(left: &DMatrix<f64>, right: &DMatrix<f64>) -> DMatrix<f64> {
    let rows = left.nrows().max(right.nrows());
    let mut out = DMatrix::zeros(rows, left.ncols() + right.ncols());
    out.view_mut((0, 0), left.shape()).copy_from(left);
    out.view_mut((0, left.ncols()), right.shape()).copy_from(right);
    out
}

fn place_columns(block: AttributeBlock, offset: usize, total: usize) -> AttributeBlock {
    let mut values = DMatrix::zeros(block.values.nrows(), total);
    values
        .view_mut((0, offset), block.values.shape())
        .copy_from(&block.values);
    AttributeBlock { values, ..block }
}

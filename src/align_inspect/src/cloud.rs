//! Alignment state handed to the exporters by the alignment loop.
//!
//! These are the shapes the exporters consume, not a general point-cloud
//! container: a coordinate matrix plus named per-point descriptors kept in
//! registration order, the reading-to-reference matches, outlier weights and
//! transformation checker values.

use nalgebra::DMatrix;
use serde::Serialize;

use crate::error::{InspectError, Result};

/// Per-match outlier weights, `knn x reading points`.
pub type OutlierWeights = DMatrix<f64>;

/// Homogeneous transformation, `(dim + 1) x (dim + 1)`.
pub type TransformationParameters = DMatrix<f64>;

/// Named per-point attribute; one column per point.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub name: String,
    pub values: DMatrix<f64>,
}

impl Descriptor {
    /// Number of components per point.
    pub fn span(&self) -> usize {
        self.values.nrows()
    }
}

/// Point coordinates plus descriptors in registration order.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoints {
    features: DMatrix<f64>,
    descriptors: Vec<Descriptor>,
}

impl DataPoints {
    /// Build a cloud from euclidean coordinates, `dim x points`.
    pub fn new(features: DMatrix<f64>) -> Self {
        Self {
            features,
            descriptors: Vec::new(),
        }
    }

    /// Build a 3-D cloud from a list of points.
    pub fn from_points(points: &[[f64; 3]]) -> Self {
        Self::new(DMatrix::from_fn(3, points.len(), |r, c| points[c][r]))
    }

    pub fn point_count(&self) -> usize {
        self.features.ncols()
    }

    pub fn dimension(&self) -> usize {
        self.features.nrows()
    }

    /// Coordinates, `dim x points`.
    pub fn positions(&self) -> &DMatrix<f64> {
        &self.features
    }

    /// Register a descriptor, or replace the values of an existing one while
    /// keeping its position.
    pub fn add_descriptor(&mut self, name: impl Into<String>, values: DMatrix<f64>) -> Result<()> {
        let name = name.into();
        if values.ncols() != self.point_count() {
            return Err(InspectError::shape(
                format!("descriptor `{name}`"),
                values.shape(),
                (values.nrows(), self.point_count()),
            ));
        }
        match self.descriptors.iter_mut().find(|d| d.name == name) {
            Some(existing) => existing.values = values,
            None => self.descriptors.push(Descriptor { name, values }),
        }
        Ok(())
    }

    pub fn with_descriptor(
        mut self,
        name: impl Into<String>,
        values: DMatrix<f64>,
    ) -> Result<Self> {
        self.add_descriptor(name, values)?;
        Ok(self)
    }

    pub fn descriptor(&self, name: &str) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn has_descriptor(&self, name: &str) -> bool {
        self.descriptor(name).is_some()
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &Descriptor> {
        self.descriptors.iter()
    }

    /// `(name, span)` of every descriptor, in registration order.
    pub fn descriptor_labels(&self) -> Vec<(&str, usize)> {
        self.descriptors
            .iter()
            .map(|d| (d.name.as_str(), d.span()))
            .collect()
    }
}

/// Reading-to-reference associations, `knn x reading points`.
#[derive(Debug, Clone, PartialEq)]
pub struct Matches {
    pub dists: DMatrix<f64>,
    pub ids: DMatrix<i64>,
}

impl Matches {
    /// Marker for a reading point without a reference match.
    pub const INVALID_ID: i64 = -1;

    pub fn new(dists: DMatrix<f64>, ids: DMatrix<i64>) -> Result<Self> {
        if dists.shape() != ids.shape() {
            return Err(InspectError::shape("match distances", dists.shape(), ids.shape()));
        }
        Ok(Self { dists, ids })
    }

    /// Neighbours per reading point.
    pub fn knn(&self) -> usize {
        self.ids.nrows()
    }

    pub fn reading_count(&self) -> usize {
        self.ids.ncols()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.ids.shape()
    }
}

/// Values of one transformation checker at an iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckerSnapshot {
    pub condition_names: Vec<String>,
    pub limit_names: Vec<String>,
    pub conditions: Vec<f64>,
    pub limits: Vec<f64>,
}

impl CheckerSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one condition variable with its limit.
    pub fn with_condition(
        mut self,
        name: impl Into<String>,
        value: f64,
        limit_name: impl Into<String>,
        limit: f64,
    ) -> Self {
        self.condition_names.push(name.into());
        self.conditions.push(value);
        self.limit_names.push(limit_name.into());
        self.limits.push(limit);
        self
    }

    /// `(condition name, value, limit name, limit)` tuples; stops at the
    /// shortest of the four lists.
    pub fn entries(&self) -> impl Iterator<Item = (&str, f64, &str, f64)> {
        self.condition_names
            .iter()
            .zip(&self.conditions)
            .zip(self.limit_names.iter().zip(&self.limits))
            .map(|((name, &value), (limit_name, &limit))| {
                (name.as_str(), value, limit_name.as_str(), limit)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_points() {
        let cloud = DataPoints::from_points(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(cloud.point_count(), 2);
        assert_eq!(cloud.dimension(), 3);
        assert_eq!(cloud.positions()[(2, 1)], 6.0);
    }

    #[test]
    fn test_descriptor_registration_order() {
        let mut cloud = DataPoints::from_points(&[[0.0; 3]; 2]);
        cloud.add_descriptor("zeta", DMatrix::zeros(1, 2)).unwrap();
        cloud.add_descriptor("alpha", DMatrix::zeros(3, 2)).unwrap();
        cloud.add_descriptor("zeta", DMatrix::from_element(1, 2, 7.0)).unwrap();

        let names: Vec<&str> = cloud.descriptors().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha"]);
        assert_eq!(cloud.descriptor_labels(), [("zeta", 1), ("alpha", 3)]);
        assert_eq!(cloud.descriptor("zeta").unwrap().values[(0, 1)], 7.0);
        assert_eq!(cloud.descriptor("alpha").unwrap().span(), 3);
        assert!(!cloud.has_descriptor("normals"));
    }

    #[test]
    fn test_descriptor_column_mismatch() {
        let mut cloud = DataPoints::from_points(&[[0.0; 3]; 3]);
        let err = cloud
            .add_descriptor("weights", DMatrix::zeros(1, 2))
            .unwrap_err();
        assert!(matches!(err, InspectError::Shape { .. }));
    }

    #[test]
    fn test_matches_shape_check() {
        assert!(Matches::new(DMatrix::zeros(1, 3), DMatrix::zeros(1, 3)).is_ok());
        assert!(Matches::new(DMatrix::zeros(2, 3), DMatrix::zeros(1, 3)).is_err());
    }

    #[test]
    fn test_checker_entries() {
        let checker = CheckerSnapshot::new()
            .with_condition("iteration", 3.0, "max_iteration", 40.0)
            .with_condition("error", 0.01, "min_error", 0.001);
        let entries: Vec<_> = checker.entries().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], ("error", 0.01, "min_error", 0.001));
    }
}

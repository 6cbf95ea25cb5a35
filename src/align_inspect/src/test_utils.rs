//! Synthetic clouds and matches for exercising the exporters.
//!
//! The generators produce deterministic geometry with known structure so
//! tests can assert exact point and line counts.

use nalgebra::DMatrix;

use crate::cloud::{DataPoints, Matches, OutlierWeights};

/// Three square grids meeting at the origin, one per coordinate plane.
///
/// Edges shared by two planes are repeated, so the cloud always holds
/// `3 * (side / spacing + 1)²` points.
pub fn corner_planes(side: f64, spacing: f64) -> DataPoints {
    let steps = (side / spacing) as usize + 1;
    let grid = move || {
        (0..steps).flat_map(move |a| {
            (0..steps).map(move |b| (a as f64 * spacing, b as f64 * spacing))
        })
    };
    let points: Vec<[f64; 3]> = grid()
        .map(|(a, b)| [a, b, 0.0])
        .chain(grid().map(|(a, b)| [0.0, a, b]))
        .chain(grid().map(|(a, b)| [a, 0.0, b]))
        .collect();
    DataPoints::from_points(&points)
}

/// [`corner_planes`] shifted by `offset`.
pub fn corner_planes_offset(side: f64, spacing: f64, offset: [f64; 3]) -> DataPoints {
    let cloud = corner_planes(side, spacing);
    let mut features = cloud.positions().clone();
    for mut column in features.column_iter_mut() {
        for (value, delta) in column.iter_mut().zip(offset) {
            *value += delta;
        }
    }
    DataPoints::new(features)
}

/// Planar cloud: `count` points along the x axis, `interval` apart.
pub fn make_line_2d(count: usize, interval: f64) -> DataPoints {
    DataPoints::new(DMatrix::from_fn(2, count, |r, c| {
        if r == 0 {
            interval * c as f64
        } else {
            0.0
        }
    }))
}

/// Single nearest reference point for every reading point, by brute force.
///
/// An empty reference yields [`Matches::INVALID_ID`] everywhere.
pub fn nearest_neighbor_matches(reference: &DataPoints, reading: &DataPoints) -> Matches {
    let n_read = reading.point_count();
    let mut dists = DMatrix::from_element(1, n_read, f64::INFINITY);
    let mut ids = DMatrix::from_element(1, n_read, Matches::INVALID_ID);

    for (j, query) in reading.positions().column_iter().enumerate() {
        for (i, candidate) in reference.positions().column_iter().enumerate() {
            let dist: f64 = query
                .iter()
                .zip(candidate.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            if dist < dists[(0, j)] {
                dists[(0, j)] = dist;
                ids[(0, j)] = i as i64;
            }
        }
    }

    Matches { dists, ids }
}

/// Outlier weights of `value` for every match.
pub fn uniform_weights(matches: &Matches, value: f64) -> OutlierWeights {
    DMatrix::from_element(matches.knn(), matches.reading_count(), value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corner_planes_point_count() {
        let cloud = corner_planes(2.0, 1.0);
        assert_eq!(cloud.point_count(), 27);
        assert_eq!(cloud.dimension(), 3);
        // Every point lies on at least one coordinate plane.
        assert!(cloud
            .positions()
            .column_iter()
            .all(|p| p.iter().any(|&v| v == 0.0)));
    }

    #[test]
    fn test_offset_cloud() {
        let cloud = corner_planes_offset(1.0, 1.0, [10.0, 0.0, -1.0]);
        let first = cloud.positions().column(0);
        assert_eq!(first[0], 10.0);
        assert_eq!(first[2], -1.0);
    }

    #[test]
    fn test_nearest_neighbor_matches() {
        let reference = make_line_2d(4, 1.0);
        let reading = DataPoints::new(DMatrix::from_column_slice(2, 2, &[2.2, 0.1, -5.0, 0.0]));
        let matches = nearest_neighbor_matches(&reference, &reading);

        assert_eq!(matches.shape(), (1, 2));
        assert_eq!(matches.ids[(0, 0)], 2);
        assert_eq!(matches.ids[(0, 1)], 0);
        assert_eq!(uniform_weights(&matches, 1.0).shape(), (1, 2));
    }

    #[test]
    fn test_empty_reference_has_no_matches() {
        let reference = DataPoints::new(DMatrix::zeros(2, 0));
        let matches = nearest_neighbor_matches(&reference, &make_line_2d(3, 1.0));
        assert!(matches.ids.iter().all(|&id| id == Matches::INVALID_ID));
    }
}

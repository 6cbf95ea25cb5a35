//! End-to-end run of a file-backed inspector over a synthetic alignment.

use std::fs;

use align_inspect::test_utils::{
    corner_planes, corner_planes_offset, nearest_neighbor_matches, uniform_weights,
};
use align_inspect::{
    build_inspector, time_stat, CheckerSnapshot, InspectorConfig, InspectorKind, IterationState,
    PerformanceConfig, VtkConfig,
};
use nalgebra::DMatrix;

#[test]
fn test_vtk_inspector_writes_every_file() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("out").join("run");
    let stats_prefix = format!("{}/", dir.path().join("stats").display());

    let config = InspectorConfig::default()
        .with_kind(InspectorKind::VtkFile)
        .with_performance(
            PerformanceConfig::default()
                .with_bin_count(4)
                .with_file_prefix(stats_prefix)
                .with_dump_perf_on_exit(true),
        )
        .with_vtk(VtkConfig::default().with_base_file_name(base.display().to_string()));
    let mut inspector = build_inspector(&config).unwrap();

    let reference = corner_planes(2.0, 1.0);
    let densities = DMatrix::from_element(1, reference.point_count(), 0.5);
    let reference = reference.with_descriptor("densities", densities).unwrap();
    let reading = corner_planes_offset(2.0, 1.0, [0.1, 0.0, 0.0]);
    let normals = DMatrix::from_element(3, reading.point_count(), 1.0);
    let reading = reading.with_descriptor("normals", normals).unwrap();
    let n_ref = reference.point_count();
    let n_read = reading.point_count();

    inspector.dump_data_points(&reference, "reference").unwrap();
    inspector.dump_mesh_nodes(&reading, "reading_nodes").unwrap();

    let transformation = DMatrix::<f64>::identity(4, 4);
    let no_descriptor_weights = DMatrix::<f64>::zeros(0, 0);
    for iteration in 0..3usize {
        let matches = time_stat!(
            inspector,
            stat_convergence_duration,
            nearest_neighbor_matches(&reference, &reading)
        );
        let weights = uniform_weights(&matches, 1.0);
        let checkers = [CheckerSnapshot::new().with_condition(
            "iteration",
            iteration as f64,
            "max_iteration",
            40.0,
        )];
        inspector
            .dump_iteration(
                iteration,
                &IterationState {
                    transformation: &transformation,
                    reference: &reference,
                    reading: &reading,
                    matches: &matches,
                    feature_outlier_weights: &weights,
                    descriptor_outlier_weights: &no_descriptor_weights,
                    checkers: &checkers,
                },
            )
            .unwrap();
        inspector.stat_point_count_reading(n_read as u32);
        inspector.stat_overlap_ratio(1.0);
    }
    inspector.stat_iterations_count(3);
    inspector.finish(2).unwrap();

    let mut diagnostics = Vec::<u8>::new();
    let summary = inspector.close_to(&mut diagnostics).unwrap();

    let out_dir = dir.path().join("out");
    let read = |name: &str| fs::read_to_string(out_dir.join(name)).unwrap();

    let reference_file = read("run-reference.vtk");
    assert!(reference_file.contains(&format!("POINTS {n_ref} double")));
    assert!(reference_file.contains("SCALARS densities double 1"));

    let nodes_file = read("run-reading_nodes.vtk");
    assert!(nodes_file.contains(&format!("VERTICES {n_read} {}", 2 * n_read)));
    assert!(!nodes_file.contains("NORMALS"));

    for iteration in 0..3 {
        let text = read(&format!("run-iteration-{iteration}.vtk"));
        assert!(text.starts_with("# vtk DataFile Version 3.0\n"));
        assert!(text.contains(&format!("POINTS {} double", n_ref + n_read)));
        assert!(text.contains(&format!("LINES {n_read} {}", 3 * n_read)));
        assert!(text.contains(&format!("CELL_DATA {}", n_ref + 2 * n_read)));
        assert!(text.contains("SCALARS densities double 1"));
        assert!(text.contains("NORMALS normals double"));
    }
    assert_eq!(
        read("run-iteration-1.vtk").lines().count(),
        read("run-iteration-2.vtk").lines().count()
    );

    assert_eq!(
        read("run-iteration-info.csv"),
        "iteration, iteration, max_iteration\n0, 0, 40\n1, 1, 40\n2, 2, 40\n"
    );

    let stats_dir = dir.path().join("stats");
    let durations = fs::read_to_string(stats_dir.join("convergence_duration")).unwrap();
    assert_eq!(durations.lines().count(), 3);
    assert_eq!(
        fs::read_to_string(stats_dir.join("iterations_count")).unwrap(),
        "3\n"
    );
    assert_eq!(
        fs::read_to_string(stats_dir.join("point_count_key_frame")).unwrap(),
        ""
    );

    let report = String::from_utf8(diagnostics).unwrap();
    assert!(report.contains("Histogram iterations_count:\n  count: 1, mean: 3\n"));
    assert_eq!(summary.get("point_count_reading").unwrap().count, 3);
    assert_eq!(summary.get("overlap_ratio").unwrap().stats.variance, 0.0);
}

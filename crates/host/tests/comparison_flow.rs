//! Geometry comparison scenarios: pure point sets and STL references.

use cadlink_host::comparison::{compare, ComparisonError, SurfaceMetrics};
use cadlink_host::fixtures::{box_corners, write_box_stl};
use cadlink_host::harness::TestHarness;
use serde_json::{json, Value};

fn metrics(l: f64, w: f64, h: f64) -> SurfaceMetrics {
    SurfaceMetrics {
        volume: l * w * h,
        area: 2.0 * (l * w + l * h + w * h),
    }
}

#[test]
fn test_box_corners_against_themselves() {
    let corners = box_corners(50.0, 30.0, 20.0);
    let m = metrics(50.0, 30.0, 20.0);
    for tolerance in [0.0, 1.0, 100.0] {
        let r = compare(&corners, &corners, tolerance, m, m).unwrap();
        assert_eq!(r.hausdorff_distance, 0.0);
        assert!(r.is_match);
        assert_eq!(r.volume_error, 0.0);
        assert_eq!(r.area_error, 0.0);
        assert_eq!(r.reference_points, 8);
    }
}

#[test]
fn test_smaller_box_does_not_match() {
    let reference = box_corners(50.0, 30.0, 20.0);
    let current = box_corners(40.0, 25.0, 15.0);
    let r = compare(
        &reference,
        &current,
        1.0,
        metrics(50.0, 30.0, 20.0),
        metrics(40.0, 25.0, 15.0),
    )
    .unwrap();

    // Far corner (50,30,20) to (40,25,15)
    assert!((r.hausdorff_distance - 150f64.sqrt()).abs() < 1e-9);
    assert!(!r.is_match);
    assert!((r.volume_error - 0.5).abs() < 1e-12);
}

#[test]
fn test_empty_current_volume_is_full_error() {
    let corners = box_corners(1.0, 1.0, 1.0);
    let r = compare(
        &corners,
        &corners,
        1.0,
        metrics(1.0, 1.0, 1.0),
        SurfaceMetrics::default(),
    )
    .unwrap();
    assert_eq!(r.volume_error, 1.0);
    assert_eq!(r.area_error, 1.0);
}

#[test]
fn test_empty_sets_rejected() {
    let corners = box_corners(1.0, 1.0, 1.0);
    let m = SurfaceMetrics::default();
    assert_eq!(
        compare(&corners, &[], 1.0, m, m),
        Err(ComparisonError::EmptyPointSet("current"))
    );
}

#[test]
fn test_document_matches_own_reference() {
    let dir = tempfile::tempdir().unwrap();
    let reference = write_box_stl(dir.path(), "ref.stl", 50.0, 30.0, 20.0);

    let mut h = TestHarness::new();
    h.new_document("Compare");
    h.create_box("Box", 50.0, 30.0, 20.0);

    let r = h.compare_to(&reference, 1.0);
    assert!(r.hausdorff_distance < 1e-3, "hausdorff = {}", r.hausdorff_distance);
    assert!(r.is_match);
    assert!((r.reference_volume - 30_000.0).abs() < 1e-3);
    assert!(r.volume_error < 1e-6);
    assert!(r.area_error < 1e-6);
}

#[test]
fn test_document_differs_from_larger_reference() {
    let dir = tempfile::tempdir().unwrap();
    let reference = write_box_stl(dir.path(), "ref.stl", 50.0, 30.0, 20.0);

    let mut h = TestHarness::new();
    h.new_document("Compare");
    h.create_box("Box", 40.0, 25.0, 15.0);

    let r = h.compare_to(&reference, 1.0);
    assert!((r.hausdorff_distance - 150f64.sqrt()).abs() < 1e-3);
    assert!(!r.is_match);
    assert!((r.volume_error - 0.5).abs() < 1e-6);
}

#[test]
fn test_compare_errors_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let reference = write_box_stl(dir.path(), "ref.stl", 10.0, 10.0, 10.0);
    let mut h = TestHarness::new();

    let resp = h.call("compare_to_stl", json!({ "reference_path": reference }));
    assert_eq!(resp.error.as_deref(), Some("No active document"));

    h.new_document("Empty");
    let resp = h.call("compare_to_stl", json!({ "reference_path": reference }));
    assert!(resp.error.unwrap().contains("No shapes"));

    h.create_box("Box", 10.0, 10.0, 10.0);
    let missing = dir.path().join("missing.stl");
    let resp = h.call("compare_to_stl", json!({ "reference_path": missing }));
    assert!(resp.error.unwrap().starts_with("Reference file not found"));

    let resp = h.call(
        "compare_to_stl",
        json!({ "reference_path": reference, "tolerance": -1.0 }),
    );
    assert!(resp.error.unwrap().contains("Tolerance"));
}

#[test]
fn test_get_mesh_points() {
    let mut h = TestHarness::new();
    h.new_document("Points");
    h.create_box("Box", 50.0, 30.0, 20.0);

    let resp = h.call_ok("get_mesh_points", Value::Null);
    let count = resp.get("point_count").unwrap().as_u64().unwrap();
    assert!(count >= 8);
    assert_eq!(resp.get("bounds_min").unwrap(), &json!([0.0, 0.0, 0.0]));
    assert_eq!(resp.get("bounds_max").unwrap(), &json!([50.0, 30.0, 20.0]));
    assert!((resp.get("volume").unwrap().as_f64().unwrap() - 30_000.0).abs() < 1e-3);

    let sampled = h.call_ok("get_mesh_points", json!({ "sample_rate": 2 }));
    let sampled_count = sampled.get("point_count").unwrap().as_u64().unwrap();
    assert_eq!(sampled_count, count.div_ceil(2));
}

#[test]
fn test_export_then_compare_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.stl");

    let mut h = TestHarness::new();
    h.new_document("Export");
    h.create_box("Box", 20.0, 20.0, 20.0);
    h.call_ok("create_cylinder", json!({ "radius": 5.0, "height": 30.0 }));
    let resp = h.call_ok("export_stl", json!({ "path": path }));
    assert!(resp.get("triangles").unwrap().as_u64().unwrap() > 12);

    let r = h.compare_to(&path, 0.01);
    assert!(r.is_match, "hausdorff = {}", r.hausdorff_distance);
}

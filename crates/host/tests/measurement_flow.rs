//! End-to-end measurement sessions through the tool protocol.

use cadlink_host::fixtures;
use cadlink_host::harness::TestHarness;
use shared::CameraPose;
use serde_json::{json, Value};

/// Half-width of the view 100 mm in front of the camera (45° fov, 4:3)
fn half_width() -> f64 {
    (22.5f64).to_radians().tan() * 100.0 * 4.0 / 3.0
}

fn half_height() -> f64 {
    (22.5f64).to_radians().tan() * 100.0
}

/// Document with a 50×30×20 box viewed head-on, measurement active
fn box_session() -> TestHarness {
    let mut h = TestHarness::new();
    h.new_document("Measure");
    h.create_box("Box", 50.0, 30.0, 20.0);
    h.set_camera(&fixtures::front_view(50.0, 30.0, 20.0));
    h.start_measurement();
    h
}

#[test]
fn test_select_point_hits_front_face() {
    let mut h = box_session();
    let p = h.select("C4");
    assert_eq!(p.id, "point_1");
    assert_eq!(p.grid_cell, "C4");
    assert!(p.resolved);

    let [x, y, z] = p.position.unwrap();
    assert!((x - (25.0 - 0.125 * half_width())).abs() < 1e-3, "x = {x}");
    assert!(y.abs() < 1e-3, "y = {y}");
    assert!((z - (10.0 + half_height() / 6.0)).abs() < 1e-3, "z = {z}");
    assert_eq!(h.marker_count(), 1);
}

#[test]
fn test_each_select_adds_one_listed_point() {
    let mut h = box_session();
    for (i, cell) in ["C4", "c5", "D4", "A1", "F8"].iter().enumerate() {
        h.select(cell);
        let resp = h.call_ok("list_points", Value::Null);
        let points = resp.get("points").unwrap().as_array().unwrap();
        assert_eq!(points.len(), i + 1);
        assert_eq!(points[i]["grid_cell"], cell.to_uppercase());
    }
}

#[test]
fn test_measure_distance_between_cells() {
    let mut h = box_session();
    let a = h.select("C4").id;
    let b = h.select("C5").id;
    h.confirm(&a);
    h.confirm(&b);

    let ab = h.measure(&a, &b);
    let ba = h.measure(&b, &a);
    let expected = half_width() * 0.25;
    assert!((ab - expected).abs() < 1e-3, "distance = {ab}");
    assert_eq!(ab, ba);

    // Two points plus two distance lines
    assert_eq!(h.marker_count(), 4);
}

#[test]
fn test_unresolved_point_cannot_be_confirmed() {
    let mut h = box_session();
    let miss = h.select("A1");
    assert!(!miss.resolved);
    assert!(miss.position.is_none());

    let resp = h.call("confirm_point", json!({ "point_id": miss.id }));
    assert!(!resp.success);
    assert!(resp.error.unwrap().contains("did not hit any geometry"));

    let resp = h.call_ok("list_points", Value::Null);
    let points = resp.get("points").unwrap().as_array().unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0]["confirmed"], false);
}

#[test]
fn test_errors_keep_session_usable() {
    let mut h = box_session();

    let resp = h.call("select_point", json!({ "grid_cell": "Z99" }));
    assert!(!resp.success);
    assert!(resp.error.unwrap().contains("Invalid grid cell: Z99"));

    let resp = h.call("measure_distance", json!({ "point_a": "point_1", "point_b": "point_7" }));
    assert!(resp.error.unwrap().contains("Unknown point"));

    let a = h.select("C4").id;
    let b = h.select("C5").id;
    h.confirm(&a);
    let resp = h.call("measure_distance", json!({ "point_a": a, "point_b": b }));
    assert!(resp.error.unwrap().contains("must be confirmed"));

    assert_eq!(h.select("D4").id, "point_3");
}

#[test]
fn test_clear_all_keeps_session_active() {
    let mut h = box_session();
    h.select("C4");
    h.select("C5");
    h.select("A1");

    let resp = h.call_ok("clear_point", json!({ "point_id": "all" }));
    assert_eq!(resp.get("removed").unwrap(), 3);
    assert_eq!(h.marker_count(), 0);

    let resp = h.call_ok("list_points", Value::Null);
    assert!(resp.get("points").unwrap().as_array().unwrap().is_empty());
    assert_eq!(h.select("C4").id, "point_4");
}

#[test]
fn test_zoom_refines_selection() {
    let mut h = box_session();
    let resp = h.call_ok("zoom_grid_region", json!({ "start_cell": "D4", "size": 2 }));
    assert_eq!(resp.get("grid").unwrap()["zoomed"], true);

    // A1 of the zoomed grid lies inside D4 of the full grid
    let p = h.select("A1");
    let [x, _, z] = p.position.unwrap();
    let (hw, hh) = (half_width(), half_height());
    let cell_w = 2.0 * hw / 8.0;
    let cell_h = 2.0 * hh / 6.0;
    assert!(x > 25.0 - hw + 3.0 * cell_w && x < 25.0 - hw + 4.0 * cell_w);
    assert!(z < 10.0 + hh - 3.0 * cell_h && z > 10.0 + hh - 4.0 * cell_h);

    let resp = h.call("zoom_grid_region", json!({ "start_cell": "C4", "size": 0 }));
    assert!(!resp.success);

    let resp = h.call_ok("reset_grid_zoom", Value::Null);
    assert_eq!(resp.get("grid").unwrap()["zoomed"], false);
}

#[test]
fn test_end_measurement_removes_markers() {
    let mut h = box_session();
    let a = h.select("C4").id;
    let b = h.select("C5").id;
    h.confirm(&a);
    h.confirm(&b);
    h.measure(&a, &b);
    assert_eq!(h.marker_count(), 3);

    let resp = h.call_ok("end_measurement", Value::Null);
    assert_eq!(resp.get("markers_removed").unwrap(), 3);
    assert_eq!(h.marker_count(), 0);

    let resp = h.call("select_point", json!({ "grid_cell": "C4" }));
    assert!(!resp.success);
    assert!(h.call("end_measurement", Value::Null).success);
}

#[test]
fn test_json_lines_with_method_params() {
    let mut h = box_session();
    let resp = h.call_json(r#"{"method": "select_point", "params": {"grid_cell": "c4"}}"#);
    assert!(resp.success, "{:?}", resp.error);
    assert_eq!(resp.get("id").unwrap(), "point_1");

    let resp = h.call_json("not json");
    assert!(resp.error.unwrap().starts_with("Invalid request JSON"));
}

#[test]
fn test_screenshot_written() {
    let mut h = box_session();
    h.select("C4");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("view.png");
    let resp = h.call_ok(
        "save_screenshot",
        json!({ "path": path, "width": 160, "height": 120 }),
    );
    assert_eq!(resp.get("width").unwrap(), 160);

    let img = image::open(&path).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (160, 120));
}

#[test]
fn test_screenshot_with_eye_on_measured_point() {
    let mut h = box_session();
    let a = h.select("C4");
    let b = h.select("C5");
    h.confirm(&a.id);
    h.confirm(&b.id);
    h.measure(&a.id, &b.id);

    let (pa, pb) = (a.position.unwrap(), b.position.unwrap());
    let beside_a = [
        pa[0] + (pa[0] - pb[0]) * 1e-8,
        pa[1] + (pa[1] - pb[1]) * 1e-8,
        pa[2] + (pa[2] - pb[2]) * 1e-8,
    ];
    let poses = [
        // Distance line starts right at the eye
        CameraPose::looking_at(beside_a, pb),
        // Line runs far past the edge of the view
        CameraPose::looking_at([pa[0], -0.5, pa[2]], [pa[0] + 1.0, -0.5, pa[2]]),
    ];

    let dir = tempfile::tempdir().unwrap();
    for (i, pose) in poses.iter().enumerate() {
        h.set_camera(pose);
        let path = dir.path().join(format!("edge_{i}.png"));
        let resp = h.call("save_screenshot", json!({ "path": path, "width": 160, "height": 120 }));
        assert!(resp.success, "pose {i}: {:?}", resp.error);
        assert!(path.exists());
    }

    let listed = h.call_ok("list_points", Value::Null);
    assert_eq!(listed.get("points").unwrap().as_array().unwrap().len(), 2);
}

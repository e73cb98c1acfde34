//! Object editing and document switching through the tool protocol.

use cadlink_host::harness::TestHarness;
use serde_json::{json, Value};

fn volume(h: &mut TestHarness, name: &str) -> f64 {
    let resp = h.call_ok("get_volume", json!({ "name": name }));
    resp.get("volume").and_then(Value::as_f64).unwrap()
}

#[test]
fn test_copy_then_intersect() {
    let mut h = TestHarness::new();
    h.new_document("Parts");
    h.create_box("Block", 50.0, 30.0, 20.0);

    let resp = h.call_ok("copy_object", json!({ "name": "Block", "offset": [25.0, 0.0, 0.0] }));
    assert_eq!(resp.get("name").unwrap(), "Block_copy");
    assert_eq!(h.object_count(), 2);

    let resp = h.call_ok(
        "boolean_intersection",
        json!({ "object1": "Block", "object2": "Block_copy", "name": "Common" }),
    );
    assert_eq!(resp.get("name").unwrap(), "Common");
    assert_eq!(h.object_count(), 1);
    assert!((volume(&mut h, "Common") - 15_000.0).abs() < 1.0);

    let resp = h.call_ok("get_bounding_box", json!({ "name": "Common" }));
    let bb = resp.get("bounding_box").unwrap();
    assert_eq!(bb["min"], json!([25.0, 0.0, 0.0]));
    assert_eq!(bb["size"], json!([25.0, 30.0, 20.0]));
}

#[test]
fn test_rotate_and_scale_through_tools() {
    let mut h = TestHarness::new();
    h.new_document("Parts");
    h.create_box("Block", 50.0, 30.0, 20.0);

    h.call_ok("rotate_object", json!({ "name": "Block", "angle": 90.0 }));
    let resp = h.call_ok("get_bounding_box", json!({ "name": "Block" }));
    assert_eq!(resp.get("bounding_box").unwrap()["size"], json!([30.0, 50.0, 20.0]));

    h.call_ok("scale_object", json!({ "name": "Block", "uniform": 2.0 }));
    assert!((volume(&mut h, "Block") - 240_000.0).abs() < 1.0);
}

#[test]
fn test_documents_switch_and_close() {
    let mut h = TestHarness::new();
    h.new_document("First");
    h.create_box("A", 10.0, 10.0, 10.0);
    h.new_document("Second");
    assert_eq!(h.object_count(), 0);

    h.call_ok("set_active_document", json!({ "name": "First" }));
    assert_eq!(h.object_count(), 1);

    let resp = h.call("set_active_document", json!({ "name": "Missing" }));
    assert!(!resp.success);
    assert_eq!(h.object_count(), 1);

    let resp = h.call_ok("close_document", Value::Null);
    assert_eq!(resp.get("closed").unwrap(), "First");
    assert_eq!(resp.get("active_document").unwrap(), "Second");
    assert_eq!(h.object_count(), 0);
}

//! Headless test harness driving the tool protocol in-process.
//!
//! Commands run directly on the calling thread, which plays the part of the
//! host thread, so tests can script whole sessions without sockets.

use serde_json::{json, Value};
use shared::{CameraPose, ComparisonResult, PointSnapshot, ToolRequest, ToolResponse};

use crate::command::{execute_json, execute_tool};
use crate::config::HostConfig;
use crate::context::HostContext;

/// Headless test harness over a [`HostContext`]
pub struct TestHarness {
    pub ctx: HostContext,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Create a new harness with default settings and no documents.
    pub fn new() -> Self {
        Self::with_config(HostConfig::default())
    }

    pub fn with_config(config: HostConfig) -> Self {
        Self {
            ctx: HostContext::new(config),
        }
    }

    // ── Raw protocol ──────────────────────────────────────────

    pub fn call(&mut self, tool: &str, arguments: Value) -> ToolResponse {
        execute_tool(&mut self.ctx, &ToolRequest::new(tool, arguments))
    }

    pub fn call_json(&mut self, line: &str) -> ToolResponse {
        execute_json(&mut self.ctx, line)
    }

    /// Call a tool that must succeed; panics with the error otherwise.
    pub fn call_ok(&mut self, tool: &str, arguments: Value) -> ToolResponse {
        let resp = self.call(tool, arguments);
        assert!(resp.success, "{tool} failed: {:?}", resp.error);
        resp
    }

    // ── Scene manipulation ────────────────────────────────────

    pub fn new_document(&mut self, name: &str) -> String {
        self.ctx.new_document(Some(name))
    }

    /// Create a box and return its object name
    pub fn create_box(&mut self, name: &str, length: f64, width: f64, height: f64) -> String {
        let resp = self.call_ok(
            "create_box",
            json!({ "name": name, "length": length, "width": width, "height": height }),
        );
        string_field(&resp, "name")
    }

    pub fn set_camera(&mut self, pose: &CameraPose) {
        self.call_ok(
            "set_camera",
            json!({
                "eye": pose.eye,
                "target": pose.target,
                "up": pose.up,
                "fov": pose.fov_degrees,
            }),
        );
    }

    // ── Measurement ───────────────────────────────────────────

    pub fn start_measurement(&mut self) {
        self.call_ok("start_measurement", Value::Null);
    }

    pub fn select(&mut self, cell: &str) -> PointSnapshot {
        let resp = self.call_ok("select_point", json!({ "grid_cell": cell }));
        from_data(resp)
    }

    pub fn confirm(&mut self, point_id: &str) -> PointSnapshot {
        let resp = self.call_ok("confirm_point", json!({ "point_id": point_id }));
        from_data(resp)
    }

    /// Distance between two confirmed points
    pub fn measure(&mut self, a: &str, b: &str) -> f64 {
        let resp = self.call_ok("measure_distance", json!({ "point_a": a, "point_b": b }));
        resp.get("distance").and_then(Value::as_f64).unwrap_or(f64::NAN)
    }

    // ── Comparison ────────────────────────────────────────────

    pub fn compare_to(&mut self, reference: &std::path::Path, tolerance: f64) -> ComparisonResult {
        let resp = self.call_ok(
            "compare_to_stl",
            json!({ "reference_path": reference, "tolerance": tolerance }),
        );
        from_data(resp)
    }

    // ── Inspection ────────────────────────────────────────────

    pub fn object_count(&self) -> usize {
        self.ctx
            .active_document()
            .map(|d| d.objects().len())
            .unwrap_or(0)
    }

    /// Number of markers shown in the active document
    pub fn marker_count(&self) -> usize {
        self.ctx
            .active_document()
            .map(|d| d.marker_count())
            .unwrap_or(0)
    }
}

fn string_field(resp: &ToolResponse, key: &str) -> String {
    match resp.get(key) {
        Some(Value::String(s)) => s.clone(),
        other => panic!("response has no string field {key}: {other:?}"),
    }
}

fn from_data<T: serde::de::DeserializeOwned>(resp: ToolResponse) -> T {
    match serde_json::from_value(Value::Object(resp.data)) {
        Ok(v) => v,
        Err(e) => panic!("unexpected response shape: {e}"),
    }
}

//! JSON tool protocol for remote clients.
//!
//! A request names a tool and carries its arguments; every tool runs against
//! the [`HostContext`] on the host thread and answers with
//! `{"success": true, ...}` or `{"success": false, "error": "..."}`.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context as _};
use glam::DVec3;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use shared::{BooleanOp, CameraPose, Primitive, ToolRequest, ToolResponse};
use tracing::debug;

use crate::bridge::ExecutionBridge;
use crate::comparison::{self, SurfaceMetrics};
use crate::context::HostContext;
use crate::measurement::ClearTarget;
use crate::scene::{Color, SceneAccess};
use crate::stl;
use crate::viewport::mesh::TriMesh;

const DEFAULT_BACKGROUND: Color = [40, 40, 48, 255];

/// Tool descriptor returned by `list_tools`
pub struct ToolInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: &'static [(&'static str, &'static str)],
}

pub static TOOLS: &[ToolInfo] = &[
    ToolInfo {
        name: "list_tools",
        description: "List available tools",
        parameters: &[],
    },
    ToolInfo {
        name: "new_document",
        description: "Create a new document and make it active",
        parameters: &[("name", "string (optional, default 'Unnamed')")],
    },
    ToolInfo {
        name: "list_documents",
        description: "List all open documents",
        parameters: &[],
    },
    ToolInfo {
        name: "set_active_document",
        description: "Make an open document the active one",
        parameters: &[("name", "string")],
    },
    ToolInfo {
        name: "close_document",
        description: "Close a document without saving",
        parameters: &[("name", "string (optional, default active document)")],
    },
    ToolInfo {
        name: "list_objects",
        description: "List all objects in the active document",
        parameters: &[],
    },
    ToolInfo {
        name: "create_box",
        description: "Create a box primitive with one corner at the origin",
        parameters: &[
            ("length", "number (mm)"),
            ("width", "number (mm)"),
            ("height", "number (mm)"),
            ("name", "string (optional)"),
        ],
    },
    ToolInfo {
        name: "create_cylinder",
        description: "Create a cylinder primitive along Z",
        parameters: &[
            ("radius", "number (mm)"),
            ("height", "number (mm)"),
            ("name", "string (optional)"),
        ],
    },
    ToolInfo {
        name: "create_sphere",
        description: "Create a sphere primitive",
        parameters: &[("radius", "number (mm)"), ("name", "string (optional)")],
    },
    ToolInfo {
        name: "create_cone",
        description: "Create a cone primitive along Z",
        parameters: &[
            ("radius1", "number (mm)"),
            ("radius2", "number (mm)"),
            ("height", "number (mm)"),
            ("name", "string (optional)"),
        ],
    },
    ToolInfo {
        name: "boolean_union",
        description: "Create a union of two objects",
        parameters: &[
            ("object1", "string"),
            ("object2", "string"),
            ("name", "string (optional)"),
        ],
    },
    ToolInfo {
        name: "boolean_cut",
        description: "Cut one object from another",
        parameters: &[
            ("base", "string"),
            ("tool", "string"),
            ("name", "string (optional)"),
        ],
    },
    ToolInfo {
        name: "boolean_intersection",
        description: "Keep the common volume of two objects",
        parameters: &[
            ("object1", "string"),
            ("object2", "string"),
            ("name", "string (optional)"),
        ],
    },
    ToolInfo {
        name: "move_object",
        description: "Move an object by offset",
        parameters: &[
            ("name", "string"),
            ("x", "number (optional)"),
            ("y", "number (optional)"),
            ("z", "number (optional)"),
        ],
    },
    ToolInfo {
        name: "rotate_object",
        description: "Rotate an object around an axis",
        parameters: &[
            ("name", "string"),
            ("angle", "number (degrees)"),
            ("axis", "[x, y, z] (optional, default Z)"),
            ("center", "[x, y, z] (optional, default object origin)"),
        ],
    },
    ToolInfo {
        name: "scale_object",
        description: "Scale an object along its own axes",
        parameters: &[
            ("name", "string"),
            ("scale_x", "number (optional, default 1)"),
            ("scale_y", "number (optional, default 1)"),
            ("scale_z", "number (optional, default 1)"),
            ("uniform", "number (optional, overrides x/y/z)"),
        ],
    },
    ToolInfo {
        name: "copy_object",
        description: "Duplicate an object",
        parameters: &[
            ("name", "string"),
            ("new_name", "string (optional, default '<name>_copy')"),
            ("offset", "[x, y, z] (optional)"),
        ],
    },
    ToolInfo {
        name: "mirror_object",
        description: "Mirror an object across a principal plane",
        parameters: &[
            ("name", "string"),
            ("plane", "'XY' | 'XZ' | 'YZ' (default 'XY')"),
            ("base_point", "[x, y, z] (optional, default origin)"),
            ("copy", "bool (default true)"),
            ("new_name", "string (optional, default '<name>_mirrored')"),
        ],
    },
    ToolInfo {
        name: "array_linear",
        description: "Fuse evenly shifted copies of an object into a new object",
        parameters: &[
            ("name", "string"),
            ("count", "integer, copies including the original"),
            ("offset", "[x, y, z] between copies"),
            ("new_name", "string (optional, default 'LinearArray')"),
        ],
    },
    ToolInfo {
        name: "array_polar",
        description: "Fuse evenly turned copies of an object into a new object",
        parameters: &[
            ("name", "string"),
            ("count", "integer, copies including the original"),
            ("axis", "[x, y, z] (optional, default Z)"),
            ("center", "[x, y, z] (optional, default origin)"),
            ("angle", "degrees spanned (default 360)"),
            ("new_name", "string (optional, default 'PolarArray')"),
        ],
    },
    ToolInfo {
        name: "delete_object",
        description: "Delete an object",
        parameters: &[("name", "string")],
    },
    ToolInfo {
        name: "get_object_info",
        description: "Get object information (volume, area, bounds)",
        parameters: &[("name", "string")],
    },
    ToolInfo {
        name: "get_bounding_box",
        description: "Axis-aligned bounding box of an object",
        parameters: &[("name", "string")],
    },
    ToolInfo {
        name: "get_volume",
        description: "Volume of an object (mm³)",
        parameters: &[("name", "string")],
    },
    ToolInfo {
        name: "get_surface_area",
        description: "Surface area of an object (mm²)",
        parameters: &[("name", "string")],
    },
    ToolInfo {
        name: "get_center_of_mass",
        description: "Centre of mass of an object, uniform density",
        parameters: &[("name", "string")],
    },
    ToolInfo {
        name: "export_stl",
        description: "Export objects to a binary STL file",
        parameters: &[
            ("path", "string"),
            ("objects", "array of strings (optional, default all)"),
            ("tessellation", "number (mm, optional, default 0.1)"),
        ],
    },
    ToolInfo {
        name: "set_camera",
        description: "Point the view camera",
        parameters: &[
            ("eye", "[x, y, z]"),
            ("target", "[x, y, z]"),
            ("up", "[x, y, z] (optional, default Z)"),
            ("fov", "number (degrees, optional, default 45)"),
        ],
    },
    ToolInfo {
        name: "save_screenshot",
        description: "Render the current view to an image file",
        parameters: &[
            ("path", "string"),
            ("width", "number (px, optional)"),
            ("height", "number (px, optional)"),
            ("background", "[r, g, b, a] (optional)"),
        ],
    },
    ToolInfo {
        name: "start_measurement",
        description: "Enter measurement mode and show the selection grid",
        parameters: &[],
    },
    ToolInfo {
        name: "end_measurement",
        description: "Leave measurement mode and remove its markers",
        parameters: &[],
    },
    ToolInfo {
        name: "select_point",
        description: "Pick the surface point under a grid cell",
        parameters: &[("grid_cell", "string, e.g. 'C4'")],
    },
    ToolInfo {
        name: "confirm_point",
        description: "Accept a selected point",
        parameters: &[("point_id", "string")],
    },
    ToolInfo {
        name: "list_points",
        description: "List selected points",
        parameters: &[],
    },
    ToolInfo {
        name: "clear_point",
        description: "Remove one point or all points",
        parameters: &[("point_id", "string or 'all'")],
    },
    ToolInfo {
        name: "measure_distance",
        description: "Distance between two confirmed points",
        parameters: &[("point_a", "string"), ("point_b", "string")],
    },
    ToolInfo {
        name: "zoom_grid_region",
        description: "Refine the grid inside a block of cells",
        parameters: &[("start_cell", "string"), ("size", "number of cells")],
    },
    ToolInfo {
        name: "reset_grid_zoom",
        description: "Restore the full-view grid",
        parameters: &[],
    },
    ToolInfo {
        name: "clear_measurements",
        description: "Remove all points and distance lines",
        parameters: &[],
    },
    ToolInfo {
        name: "compare_to_stl",
        description: "Compare current document shapes to a reference STL file. \
                      Returns Hausdorff distance, volume/area comparison.",
        parameters: &[
            ("reference_path", "string (path to reference STL file)"),
            ("tolerance", "number (mm, optional, default 1.0)"),
            ("tessellation", "number (mm, optional, default 0.1)"),
        ],
    },
    ToolInfo {
        name: "get_mesh_points",
        description: "Export current shapes as point cloud for external comparison",
        parameters: &[
            ("tessellation", "number (mm, optional, default 0.1)"),
            ("sample_rate", "number (optional, sample every Nth point, default 1)"),
        ],
    },
];

/// A tool invocation with typed arguments.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ToolCommand {
    ListTools,
    NewDocument {
        #[serde(default)]
        name: Option<String>,
    },
    ListDocuments,
    SetActiveDocument {
        name: String,
    },
    CloseDocument {
        #[serde(default)]
        name: Option<String>,
    },
    ListObjects,
    CreateBox {
        length: f64,
        width: f64,
        height: f64,
        #[serde(default)]
        name: Option<String>,
    },
    CreateCylinder {
        radius: f64,
        height: f64,
        #[serde(default)]
        name: Option<String>,
    },
    CreateSphere {
        radius: f64,
        #[serde(default)]
        name: Option<String>,
    },
    CreateCone {
        radius1: f64,
        radius2: f64,
        height: f64,
        #[serde(default)]
        name: Option<String>,
    },
    BooleanUnion {
        object1: String,
        object2: String,
        #[serde(default)]
        name: Option<String>,
    },
    BooleanCut {
        base: String,
        tool: String,
        #[serde(default)]
        name: Option<String>,
    },
    BooleanIntersection {
        object1: String,
        object2: String,
        #[serde(default)]
        name: Option<String>,
    },
    MoveObject {
        name: String,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default)]
        z: f64,
    },
    RotateObject {
        name: String,
        angle: f64,
        #[serde(default = "z_axis")]
        axis: [f64; 3],
        #[serde(default)]
        center: Option<[f64; 3]>,
    },
    ScaleObject {
        name: String,
        #[serde(default = "unit")]
        scale_x: f64,
        #[serde(default = "unit")]
        scale_y: f64,
        #[serde(default = "unit")]
        scale_z: f64,
        #[serde(default)]
        uniform: Option<f64>,
    },
    CopyObject {
        name: String,
        #[serde(default)]
        new_name: Option<String>,
        #[serde(default)]
        offset: Option<[f64; 3]>,
    },
    MirrorObject {
        name: String,
        #[serde(default = "xy_plane")]
        plane: String,
        #[serde(default)]
        base_point: Option<[f64; 3]>,
        #[serde(default = "yes")]
        copy: bool,
        #[serde(default)]
        new_name: Option<String>,
    },
    ArrayLinear {
        name: String,
        count: usize,
        offset: [f64; 3],
        #[serde(default)]
        new_name: Option<String>,
    },
    ArrayPolar {
        name: String,
        count: usize,
        #[serde(default = "z_axis")]
        axis: [f64; 3],
        #[serde(default)]
        center: [f64; 3],
        #[serde(default = "full_turn")]
        angle: f64,
        #[serde(default)]
        new_name: Option<String>,
    },
    DeleteObject {
        name: String,
    },
    GetObjectInfo {
        name: String,
    },
    GetBoundingBox {
        name: String,
    },
    GetVolume {
        name: String,
    },
    GetSurfaceArea {
        name: String,
    },
    GetCenterOfMass {
        name: String,
    },
    ExportStl {
        path: PathBuf,
        #[serde(default)]
        objects: Option<Vec<String>>,
        #[serde(default)]
        tessellation: Option<f64>,
    },
    SetCamera {
        eye: [f64; 3],
        target: [f64; 3],
        #[serde(default)]
        up: Option<[f64; 3]>,
        #[serde(default)]
        fov: Option<f64>,
    },
    SaveScreenshot {
        path: PathBuf,
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        height: Option<u32>,
        #[serde(default)]
        background: Option<Color>,
    },
    StartMeasurement,
    EndMeasurement,
    SelectPoint {
        grid_cell: String,
    },
    ConfirmPoint {
        point_id: String,
    },
    ListPoints,
    ClearPoint {
        point_id: String,
    },
    MeasureDistance {
        point_a: String,
        point_b: String,
    },
    ZoomGridRegion {
        start_cell: String,
        size: u32,
    },
    ResetGridZoom,
    ClearMeasurements,
    CompareToStl {
        reference_path: PathBuf,
        #[serde(default)]
        tolerance: Option<f64>,
        #[serde(default)]
        tessellation: Option<f64>,
    },
    GetMeshPoints {
        #[serde(default)]
        tessellation: Option<f64>,
        #[serde(default)]
        sample_rate: Option<usize>,
    },
}

fn z_axis() -> [f64; 3] {
    [0.0, 0.0, 1.0]
}

fn unit() -> f64 {
    1.0
}

fn xy_plane() -> String {
    "XY".into()
}

fn yes() -> bool {
    true
}

fn full_turn() -> f64 {
    360.0
}

impl ToolCommand {
    /// Build a typed command from a wire request.
    pub fn from_request(request: &ToolRequest) -> anyhow::Result<Self> {
        if !TOOLS.iter().any(|t| t.name == request.tool) {
            bail!("Unknown tool: {}", request.tool);
        }
        let mut args = match &request.arguments {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => bail!("Arguments for {} must be an object, got {other}", request.tool),
        };
        args.insert("command".into(), Value::String(request.tool.clone()));
        serde_json::from_value(Value::Object(args))
            .with_context(|| format!("Invalid arguments for {}", request.tool))
    }
}

/// Run one request against the context, turning every failure into an
/// error response.
pub fn execute_tool(ctx: &mut HostContext, request: &ToolRequest) -> ToolResponse {
    debug!(tool = %request.tool, "Executing tool");
    match ToolCommand::from_request(request).and_then(|cmd| execute_command(ctx, cmd)) {
        Ok(data) => ToolResponse::ok_with(data),
        Err(e) => ToolResponse::err(format!("{e:#}")),
    }
}

/// Parse and execute one JSON request line.
pub fn execute_json(ctx: &mut HostContext, line: &str) -> ToolResponse {
    match parse_request(line) {
        Ok(request) => execute_tool(ctx, &request),
        Err(response) => response,
    }
}

/// Parse a request line, or produce the error response for it.
pub fn parse_request(line: &str) -> Result<ToolRequest, ToolResponse> {
    serde_json::from_str(line).map_err(|e| ToolResponse::err(format!("Invalid request JSON: {e}")))
}

/// Submit a request through the bridge and wait for its response.
pub fn dispatch(bridge: &ExecutionBridge<HostContext>, request: ToolRequest) -> ToolResponse {
    let tool = request.tool.clone();
    let result = bridge.submit(move |ctx: &mut HostContext| {
        serde_json::to_value(execute_tool(ctx, &request)).map_err(Into::into)
    });
    match result.map(serde_json::from_value::<ToolResponse>) {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => ToolResponse::err(format!("Malformed response from {tool}: {e}")),
        Err(e) => ToolResponse::err(e.to_string()),
    }
}

/// Static tool table as JSON
pub fn tools_json() -> Value {
    let tools: Vec<Value> = TOOLS
        .iter()
        .map(|t| {
            let params: Map<String, Value> = t
                .parameters
                .iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect();
            json!({ "name": t.name, "description": t.description, "parameters": params })
        })
        .collect();
    Value::Array(tools)
}

/// Execute a typed command.
pub fn execute_command(ctx: &mut HostContext, cmd: ToolCommand) -> anyhow::Result<Value> {
    let defaults = ctx.config().comparison.clone();

    match cmd {
        ToolCommand::ListTools => Ok(json!({ "tools": tools_json() })),

        // ── Documents ─────────────────────────────────────────
        ToolCommand::NewDocument { name } => {
            let name = ctx.new_document(name.as_deref());
            Ok(json!({ "document": name }))
        }

        ToolCommand::ListDocuments => {
            let active = ctx.active_name();
            let docs: Vec<Value> = ctx
                .documents()
                .iter()
                .map(|d| {
                    json!({
                        "name": d.name(),
                        "objects": d.objects().len(),
                        "is_active": Some(d.name()) == active,
                    })
                })
                .collect();
            Ok(json!({ "documents": docs, "active_document": active }))
        }

        ToolCommand::SetActiveDocument { name } => {
            ctx.set_active_document(&name)?;
            Ok(json!({ "document": name }))
        }

        ToolCommand::CloseDocument { name } => {
            let closed = ctx.close_document(name.as_deref())?;
            Ok(json!({ "closed": closed, "active_document": ctx.active_name() }))
        }

        ToolCommand::ListObjects => {
            let doc = ctx.active_document()?;
            let objects: Vec<Value> = doc
                .objects()
                .iter()
                .map(|o| json!({ "name": o.name, "type": o.type_id }))
                .collect();
            Ok(json!({ "objects": objects }))
        }

        ToolCommand::CreateBox {
            length,
            width,
            height,
            name,
        } => create(
            ctx,
            name.as_deref().unwrap_or("Box"),
            Primitive::Box {
                length,
                width,
                height,
            },
        ),

        ToolCommand::CreateCylinder {
            radius,
            height,
            name,
        } => create(
            ctx,
            name.as_deref().unwrap_or("Cylinder"),
            Primitive::Cylinder { radius, height },
        ),

        ToolCommand::CreateSphere { radius, name } => create(
            ctx,
            name.as_deref().unwrap_or("Sphere"),
            Primitive::Sphere { radius },
        ),

        ToolCommand::CreateCone {
            radius1,
            radius2,
            height,
            name,
        } => create(
            ctx,
            name.as_deref().unwrap_or("Cone"),
            Primitive::Cone {
                radius1,
                radius2,
                height,
            },
        ),

        ToolCommand::BooleanUnion {
            object1,
            object2,
            name,
        } => boolean(
            ctx,
            BooleanOp::Union,
            &object1,
            &object2,
            name.as_deref().unwrap_or("Fusion"),
        ),

        ToolCommand::BooleanCut { base, tool, name } => boolean(
            ctx,
            BooleanOp::Difference,
            &base,
            &tool,
            name.as_deref().unwrap_or("Cut"),
        ),

        ToolCommand::BooleanIntersection {
            object1,
            object2,
            name,
        } => boolean(
            ctx,
            BooleanOp::Intersection,
            &object1,
            &object2,
            name.as_deref().unwrap_or("Intersection"),
        ),

        ToolCommand::MoveObject { name, x, y, z } => {
            let position = ctx.active_document_mut()?.move_object(&name, [x, y, z])?;
            Ok(json!({ "position": position }))
        }

        ToolCommand::RotateObject {
            name,
            angle,
            axis,
            center,
        } => {
            let doc = ctx.active_document_mut()?;
            let rotation = doc.rotate_object(&name, angle, axis, center)?;
            let position = doc.object(&name).map(|o| o.shape.position());
            Ok(json!({ "name": name, "rotation": rotation, "position": position }))
        }

        ToolCommand::ScaleObject {
            name,
            scale_x,
            scale_y,
            scale_z,
            uniform,
        } => {
            let factors = uniform.map_or([scale_x, scale_y, scale_z], |u| [u; 3]);
            let doc = ctx.active_document_mut()?;
            let scale = doc.scale_object(&name, factors)?;
            let volume = doc.exact_volume(&name)?;
            Ok(json!({ "name": name, "scale": scale, "volume": round_to(volume, 2) }))
        }

        ToolCommand::CopyObject {
            name,
            new_name,
            offset,
        } => {
            let copy = ctx
                .active_document_mut()?
                .copy_object(&name, new_name.as_deref(), offset)?;
            Ok(json!({ "name": copy, "original": name }))
        }

        ToolCommand::MirrorObject {
            name,
            plane,
            base_point,
            copy,
            new_name,
        } => {
            let mirrored = ctx.active_document_mut()?.mirror_object(
                &name,
                &plane,
                base_point,
                copy,
                new_name.as_deref(),
            )?;
            Ok(json!({ "name": mirrored, "original": name, "plane": plane.to_uppercase() }))
        }

        ToolCommand::ArrayLinear {
            name,
            count,
            offset,
            new_name,
        } => {
            let doc = ctx.active_document_mut()?;
            let array = doc.add_linear_array(
                new_name.as_deref().unwrap_or("LinearArray"),
                &name,
                count,
                offset,
            )?;
            let volume = doc.exact_volume(&array)?;
            Ok(json!({
                "name": array,
                "source": name,
                "count": count,
                "volume": round_to(volume, 2),
            }))
        }

        ToolCommand::ArrayPolar {
            name,
            count,
            axis,
            center,
            angle,
            new_name,
        } => {
            let doc = ctx.active_document_mut()?;
            let array = doc.add_polar_array(
                new_name.as_deref().unwrap_or("PolarArray"),
                &name,
                count,
                axis,
                center,
                angle,
            )?;
            let volume = doc.exact_volume(&array)?;
            Ok(json!({
                "name": array,
                "source": name,
                "count": count,
                "angle": angle,
                "volume": round_to(volume, 2),
            }))
        }

        ToolCommand::DeleteObject { name } => {
            if !ctx.active_document_mut()?.remove_object(&name) {
                bail!("Object not found: {name}");
            }
            Ok(json!({ "deleted": name }))
        }

        ToolCommand::GetObjectInfo { name } => {
            let info = ctx.active_document()?.object_info(&name)?;
            Ok(json!({ "info": info }))
        }

        ToolCommand::GetBoundingBox { name } => {
            let bounds = ctx.active_document()?.bounding_box(&name)?;
            let size = bounds.size();
            Ok(json!({
                "name": name,
                "bounding_box": {
                    "min": round2(bounds.min),
                    "max": round2(bounds.max),
                    "center": round2(bounds.center()),
                    "size": round2(size),
                    "diagonal": round_to(size.length(), 2),
                },
            }))
        }

        ToolCommand::GetVolume { name } => {
            let volume = ctx.active_document()?.exact_volume(&name)?;
            Ok(json!({ "name": name, "volume": round_to(volume, 2) }))
        }

        ToolCommand::GetSurfaceArea { name } => {
            let area = ctx.active_document()?.exact_area(&name)?;
            Ok(json!({ "name": name, "area": round_to(area, 2) }))
        }

        ToolCommand::GetCenterOfMass { name } => {
            let center = ctx.active_document()?.center_of_mass(&name)?;
            Ok(json!({ "name": name, "center_of_mass": round2(center) }))
        }

        ToolCommand::ExportStl {
            path,
            objects,
            tessellation,
        } => {
            let doc = ctx.active_document()?;
            let deflection = tessellation.unwrap_or(defaults.default_tessellation);
            let names = objects.unwrap_or_else(|| doc.enumerate_objects());
            if names.is_empty() {
                bail!("No objects to export");
            }
            let mut mesh = TriMesh::default();
            for name in &names {
                mesh.append(&doc.tessellate(name, deflection)?);
            }
            stl::write_binary(&path, &mesh)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(json!({
                "path": path,
                "triangles": mesh.triangle_count(),
                "points": mesh.vertex_count(),
            }))
        }

        ToolCommand::SetCamera { eye, target, up, fov } => {
            let mut pose = CameraPose::looking_at(eye, target);
            if let Some(up) = up {
                pose.up = up;
            }
            if let Some(fov) = fov {
                pose.fov_degrees = fov;
            }
            ctx.active_document_mut()?.set_camera(&pose)?;
            Ok(json!({ "camera": pose }))
        }

        ToolCommand::SaveScreenshot {
            path,
            width,
            height,
            background,
        } => {
            let max_px = ctx.config().viewport.max_screenshot_px;
            let doc = ctx.active_document()?;
            let viewport = doc.viewport();
            let (w, h) = (
                width.unwrap_or(viewport.width),
                height.unwrap_or(viewport.height),
            );
            if w == 0 || h == 0 {
                bail!("Screenshot size must be positive, got {w}x{h}");
            }
            if w > max_px || h > max_px {
                bail!("Screenshot size {w}x{h} exceeds the {max_px} px limit");
            }
            let pixels = doc.render(w, h, background.unwrap_or(DEFAULT_BACKGROUND));
            save_image(&path, w, h, pixels)?;
            Ok(json!({ "path": path, "width": w, "height": h }))
        }

        // ── Measurement ───────────────────────────────────────
        ToolCommand::StartMeasurement => {
            let grid = ctx.start_measurement()?;
            Ok(json!({ "active": true, "grid": grid }))
        }

        ToolCommand::EndMeasurement => {
            let removed = ctx.end_measurement();
            Ok(json!({ "active": false, "markers_removed": removed }))
        }

        ToolCommand::SelectPoint { grid_cell } => {
            let (session, scene) = ctx.measurement_and_scene()?;
            let point = session.select_point(scene, &grid_cell)?;
            Ok(serde_json::to_value(point)?)
        }

        ToolCommand::ConfirmPoint { point_id } => {
            let point = ctx.measurement_mut()?.confirm_point(&point_id)?;
            Ok(serde_json::to_value(point)?)
        }

        ToolCommand::ListPoints => {
            let session = ctx.measurement()?;
            Ok(json!({
                "points": session.list_points(),
                "grid": session.grid().snapshot(),
            }))
        }

        ToolCommand::ClearPoint { point_id } => {
            let (session, scene) = ctx.measurement_and_scene()?;
            let removed = session.clear_point(scene, &ClearTarget::parse(&point_id))?;
            Ok(json!({ "removed": removed }))
        }

        ToolCommand::MeasureDistance { point_a, point_b } => {
            let (session, scene) = ctx.measurement_and_scene()?;
            let measurement = session.measure_distance(scene, &point_a, &point_b)?;
            Ok(serde_json::to_value(measurement)?)
        }

        ToolCommand::ZoomGridRegion { start_cell, size } => {
            let grid = ctx.measurement_mut()?.zoom(&start_cell, size)?;
            Ok(json!({ "grid": grid }))
        }

        ToolCommand::ResetGridZoom => {
            let grid = ctx.measurement_mut()?.reset_zoom();
            Ok(json!({ "grid": grid }))
        }

        ToolCommand::ClearMeasurements => {
            let (session, scene) = ctx.measurement_and_scene()?;
            let removed = session.clear_measurements(scene);
            Ok(json!({ "markers_removed": removed }))
        }

        // ── Comparison ────────────────────────────────────────
        ToolCommand::CompareToStl {
            reference_path,
            tolerance,
            tessellation,
        } => {
            let doc = ctx.active_document()?;
            let tolerance = tolerance.unwrap_or(defaults.default_tolerance);
            let deflection = tessellation.unwrap_or(defaults.default_tessellation);

            let reference = stl::load_reference(&reference_path)?;
            let sample = comparison::sample_scene(doc, deflection)?;
            let result = comparison::compare(
                &reference.vertices,
                &sample.points,
                tolerance,
                SurfaceMetrics {
                    volume: reference.volume(),
                    area: reference.surface_area(),
                },
                sample.metrics,
            )?;
            Ok(serde_json::to_value(result)?)
        }

        ToolCommand::GetMeshPoints {
            tessellation,
            sample_rate,
        } => {
            let doc = ctx.active_document()?;
            let deflection = tessellation.unwrap_or(defaults.default_tessellation);
            let sample = comparison::sample_scene(doc, deflection)?;
            let points = comparison::thin_points(&sample.points, sample_rate.unwrap_or(1));
            let (min, max) = sample
                .bounds
                .map(|b| (b.min, b.max))
                .ok_or_else(|| anyhow!("Sampled shapes have no extent"))?;
            Ok(json!({
                "point_count": points.len(),
                "points": points,
                "volume": sample.metrics.volume,
                "area": sample.metrics.area,
                "bounds_min": round2(min),
                "bounds_max": round2(max),
            }))
        }
    }
}

fn create(ctx: &mut HostContext, name: &str, primitive: Primitive) -> anyhow::Result<Value> {
    let doc = ctx.document_or_create();
    let name = doc.add_primitive(name, primitive)?;
    let volume = doc.exact_volume(&name)?;
    Ok(json!({ "name": name, "volume": round_to(volume, 2) }))
}

fn boolean(
    ctx: &mut HostContext,
    op: BooleanOp,
    left: &str,
    right: &str,
    name: &str,
) -> anyhow::Result<Value> {
    let doc = ctx.active_document_mut()?;
    let name = doc.add_boolean(name, op, left, right)?;
    let volume = doc.exact_volume(&name)?;
    Ok(json!({ "name": name, "volume": round_to(volume, 2) }))
}

fn save_image(path: &Path, width: u32, height: u32, pixels: Vec<u8>) -> anyhow::Result<()> {
    let image = image::RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("Rendered buffer does not match {width}x{height}"))?;
    image
        .save(path)
        .with_context(|| format!("Failed to save screenshot to {}", path.display()))
}

fn round_to(v: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (v * f).round() / f
}

fn round2(v: DVec3) -> [f64; 3] {
    [round_to(v.x, 2), round_to(v.y, 2), round_to(v.z, 2)]
}

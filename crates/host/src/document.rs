//! Kernel-backed scene document.
//!
//! Objects are stored as primitive/boolean trees and realised through
//! `vcad::Part` on demand, so tessellation can honour the requested linear
//! deflection instead of a fixed segment count.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use glam::{DQuat, DVec3, EulerRot};
use serde::Serialize;
use shared::{BooleanOp, CameraPose, ObjectId, Primitive, Transform};
use vcad::{centered_cube, Part};

use crate::scene::{Color, MarkerHandle, MarkerShape, SceneAccess, SceneError};
use crate::viewport::camera::{Camera, Viewport};
use crate::viewport::mesh::TriMesh;
use crate::viewport::picking::{pick_nearest, Aabb, Ray};
use crate::viewport::raster::Frame;

const MIN_SEGMENTS: u32 = 12;
/// Type id of derived shapes (mirrored copies and arrays)
const FEATURE_TYPE: &str = "Part::Feature";
const MAX_SEGMENTS: u32 = 256;

/// Geometry definition of a document object
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Solid {
        primitive: Primitive,
        transform: Transform,
    },
    Boolean {
        op: BooleanOp,
        left: Box<Shape>,
        right: Box<Shape>,
        transform: Transform,
    },
    /// Union of rigidly placed copies of one shape
    Array {
        source: Box<Shape>,
        copies: Vec<Transform>,
        transform: Transform,
    },
}

impl Shape {
    pub fn transform(&self) -> &Transform {
        match self {
            Shape::Solid { transform, .. }
            | Shape::Boolean { transform, .. }
            | Shape::Array { transform, .. } => transform,
        }
    }

    fn transform_mut(&mut self) -> &mut Transform {
        match self {
            Shape::Solid { transform, .. }
            | Shape::Boolean { transform, .. }
            | Shape::Array { transform, .. } => transform,
        }
    }

    pub fn position(&self) -> [f64; 3] {
        self.transform().position
    }

    fn translate(&mut self, delta: [f64; 3]) {
        for (p, d) in self.transform_mut().position.iter_mut().zip(delta) {
            *p += d;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: ObjectId,
    pub type_id: &'static str,
    pub shape: Shape,
}

/// Summary returned by `get_object_info`
#[derive(Debug, Clone, Serialize)]
pub struct ObjectInfo {
    pub name: ObjectId,
    #[serde(rename = "type")]
    pub type_id: String,
    pub volume: f64,
    pub area: f64,
    pub position: [f64; 3],
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
    pub bounds_min: [f64; 3],
    pub bounds_max: [f64; 3],
}

/// A named modeling document: objects, camera, viewport and markers
pub struct Document {
    name: String,
    objects: Vec<SceneObject>,
    camera: Camera,
    viewport: Viewport,
    markers: BTreeMap<MarkerHandle, (MarkerShape, Color)>,
    next_marker: u64,
    display_deflection: f64,
    /// Display tessellations, rebuilt lazily after any object change
    display_cache: RefCell<HashMap<ObjectId, TriMesh>>,
}

impl Document {
    pub fn new(name: impl Into<String>, viewport: Viewport, display_deflection: f64) -> Self {
        Self {
            name: name.into(),
            objects: Vec::new(),
            camera: Camera::default(),
            viewport,
            markers: BTreeMap::new(),
            next_marker: 1,
            display_deflection,
            display_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn object(&self, name: &str) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    // ── Modeling ──────────────────────────────────────────────

    /// Add a primitive; the name gets a numeric suffix if already taken.
    pub fn add_primitive(&mut self, name: &str, primitive: Primitive) -> Result<ObjectId, SceneError> {
        validate_primitive(&primitive)?;
        let name = self.unique_name(name);
        tracing::debug!(document = %self.name, object = %name, "adding {}", primitive.type_id());
        self.objects.push(SceneObject {
            name: name.clone(),
            type_id: primitive.type_id(),
            shape: Shape::Solid {
                primitive,
                transform: Transform::new(),
            },
        });
        self.invalidate();
        Ok(name)
    }

    /// Combine two objects. Both inputs are consumed into the new object.
    pub fn add_boolean(
        &mut self,
        name: &str,
        op: BooleanOp,
        left: &str,
        right: &str,
    ) -> Result<ObjectId, SceneError> {
        if left == right {
            return Err(SceneError::ObjectNotFound(format!("{right} (same as {left})")));
        }
        let left_idx = self.index_of(left)?;
        let right_idx = self.index_of(right)?;

        // Remove the higher index first so the lower one stays valid
        let (first, second) = if left_idx > right_idx {
            (left_idx, right_idx)
        } else {
            (right_idx, left_idx)
        };
        let a = self.objects.remove(first);
        let b = self.objects.remove(second);
        let (l, r) = if left_idx > right_idx { (a, b) } else { (b, a) };

        let name = self.unique_name(name);
        self.objects.push(SceneObject {
            name: name.clone(),
            type_id: op.type_id(),
            shape: Shape::Boolean {
                op,
                left: Box::new(l.shape),
                right: Box::new(r.shape),
                transform: Transform::new(),
            },
        });
        self.invalidate();
        Ok(name)
    }

    /// Translate an object by `delta`; returns its new position.
    pub fn move_object(&mut self, name: &str, delta: [f64; 3]) -> Result<[f64; 3], SceneError> {
        let idx = self.index_of(name)?;
        let shape = &mut self.objects[idx].shape;
        shape.translate(delta);
        let position = shape.position();
        self.invalidate();
        Ok(position)
    }

    /// Turn an object by `angle` degrees about `axis`. The pivot is the
    /// object's own origin unless `center` is given, in which case the
    /// position swings around it too. Returns the new Euler angles.
    pub fn rotate_object(
        &mut self,
        name: &str,
        angle: f64,
        axis: [f64; 3],
        center: Option<[f64; 3]>,
    ) -> Result<[f64; 3], SceneError> {
        let axis = DVec3::from_array(axis);
        if !(axis.is_finite() && axis.length_squared() > 1e-18) {
            return Err(SceneError::InvalidTransform(format!("rotation axis {axis} is degenerate")));
        }
        if !angle.is_finite() {
            return Err(SceneError::InvalidTransform(format!("rotation angle {angle}")));
        }
        let idx = self.index_of(name)?;
        let turn = DQuat::from_axis_angle(axis.normalize(), angle.to_radians());

        let transform = self.objects[idx].shape.transform_mut();
        let rotation = turn * euler_to_quat(transform.rotation);
        transform.rotation = quat_to_euler(rotation);
        if let Some(center) = center {
            let c = DVec3::from_array(center);
            let p = DVec3::from_array(transform.position);
            transform.position = (c + turn * (p - c)).to_array();
        }
        let rotation = transform.rotation;
        self.invalidate();
        Ok(rotation)
    }

    /// Multiply an object's scale factors, applied along its own axes
    /// about its origin. Returns the resulting factors.
    pub fn scale_object(&mut self, name: &str, factors: [f64; 3]) -> Result<[f64; 3], SceneError> {
        if let Some(bad) = factors.iter().find(|f| !(**f > 0.0 && f.is_finite())) {
            return Err(SceneError::InvalidTransform(format!(
                "scale factor must be positive, got {bad}"
            )));
        }
        let idx = self.index_of(name)?;
        let transform = self.objects[idx].shape.transform_mut();
        for (s, f) in transform.scale.iter_mut().zip(factors) {
            *s *= f;
        }
        let scale = transform.scale;
        self.invalidate();
        Ok(scale)
    }

    /// Duplicate an object, optionally shifted by `offset`.
    pub fn copy_object(
        &mut self,
        name: &str,
        new_name: Option<&str>,
        offset: Option<[f64; 3]>,
    ) -> Result<ObjectId, SceneError> {
        let idx = self.index_of(name)?;
        let mut copy = self.objects[idx].clone();
        copy.name = match new_name {
            Some(n) => self.unique_name(n),
            None => self.unique_name(&format!("{name}_copy")),
        };
        if let Some(offset) = offset {
            copy.shape.translate(offset);
        }
        let copy_name = copy.name.clone();
        self.objects.push(copy);
        self.invalidate();
        Ok(copy_name)
    }

    /// Reflect an object across a principal plane through `base`
    /// (origin by default), either into a new object or in place.
    /// Returns the name of the mirrored object.
    pub fn mirror_object(
        &mut self,
        name: &str,
        plane: &str,
        base: Option<[f64; 3]>,
        copy: bool,
        new_name: Option<&str>,
    ) -> Result<ObjectId, SceneError> {
        let axis = plane_normal_axis(plane)?;
        let base = DVec3::from_array(base.unwrap_or([0.0; 3]));
        let idx = self.index_of(name)?;

        if !copy {
            let transform = self.objects[idx].shape.transform_mut();
            *transform = mirrored(transform, axis, base);
            self.invalidate();
            return Ok(name.to_string());
        }

        let mut shape = self.objects[idx].shape.clone();
        let transform = shape.transform_mut();
        *transform = mirrored(transform, axis, base);
        let mirror_name = self.unique_name(new_name.unwrap_or(&format!("{name}_mirrored")));
        self.objects.push(SceneObject {
            name: mirror_name.clone(),
            type_id: FEATURE_TYPE,
            shape,
        });
        self.invalidate();
        Ok(mirror_name)
    }

    /// `count` copies of `source`, each shifted by one more `offset`,
    /// fused into a new object. The source stays.
    pub fn add_linear_array(
        &mut self,
        name: &str,
        source: &str,
        count: usize,
        offset: [f64; 3],
    ) -> Result<ObjectId, SceneError> {
        let step = DVec3::from_array(offset);
        if !step.is_finite() {
            return Err(SceneError::InvalidTransform(format!("array offset {step}")));
        }
        let copies = (0..count)
            .map(|i| Transform {
                position: (step * i as f64).to_array(),
                ..Transform::new()
            })
            .collect();
        self.add_array(name, source, count, copies)
    }

    /// `count` copies of `source` turned in equal steps of `angle / count`
    /// degrees about `axis` through `center`, fused into a new object.
    pub fn add_polar_array(
        &mut self,
        name: &str,
        source: &str,
        count: usize,
        axis: [f64; 3],
        center: [f64; 3],
        angle: f64,
    ) -> Result<ObjectId, SceneError> {
        let axis = DVec3::from_array(axis);
        if !(axis.is_finite() && axis.length_squared() > 1e-18) {
            return Err(SceneError::InvalidTransform(format!("rotation axis {axis} is degenerate")));
        }
        if !angle.is_finite() {
            return Err(SceneError::InvalidTransform(format!("array angle {angle}")));
        }
        let center = DVec3::from_array(center);
        let step = angle / count.max(1) as f64;
        let copies = (0..count)
            .map(|i| {
                let turn = DQuat::from_axis_angle(axis.normalize(), (step * i as f64).to_radians());
                Transform {
                    position: (center - turn * center).to_array(),
                    rotation: quat_to_euler(turn),
                    ..Transform::new()
                }
            })
            .collect();
        self.add_array(name, source, count, copies)
    }

    fn add_array(
        &mut self,
        name: &str,
        source: &str,
        count: usize,
        copies: Vec<Transform>,
    ) -> Result<ObjectId, SceneError> {
        if count < 1 {
            return Err(SceneError::InvalidDimension {
                name: "count",
                value: count as f64,
            });
        }
        let idx = self.index_of(source)?;
        let shape = self.objects[idx].shape.clone();
        let name = self.unique_name(name);
        tracing::debug!(document = %self.name, object = %name, count, "adding array of {source}");
        self.objects.push(SceneObject {
            name: name.clone(),
            type_id: FEATURE_TYPE,
            shape: Shape::Array {
                source: Box::new(shape),
                copies,
                transform: Transform::new(),
            },
        });
        self.invalidate();
        Ok(name)
    }

    pub fn remove_object(&mut self, name: &str) -> bool {
        let before = self.objects.len();
        self.objects.retain(|o| o.name != name);
        let removed = self.objects.len() != before;
        if removed {
            self.invalidate();
        }
        removed
    }

    pub fn object_info(&self, name: &str) -> Result<ObjectInfo, SceneError> {
        let object = self
            .object(name)
            .ok_or_else(|| SceneError::ObjectNotFound(name.to_string()))?;
        let part = self.build(name, self.display_deflection)?;
        let aabb = mesh_bounds(name, &part_mesh(name, &part)?)?;
        let transform = object.shape.transform();

        Ok(ObjectInfo {
            name: object.name.clone(),
            type_id: object.type_id.to_string(),
            volume: part.volume() as f64,
            area: part.surface_area() as f64,
            position: transform.position,
            rotation: transform.rotation,
            scale: transform.scale,
            bounds_min: aabb.min.to_array(),
            bounds_max: aabb.max.to_array(),
        })
    }

    /// Axis-aligned bounds of the display tessellation
    pub fn bounding_box(&self, name: &str) -> Result<Aabb, SceneError> {
        let mesh = self.tessellate(name, self.display_deflection)?;
        mesh_bounds(name, &mesh)
    }

    /// Centre of mass of the display tessellation, uniform density
    pub fn center_of_mass(&self, name: &str) -> Result<DVec3, SceneError> {
        let mesh = self.tessellate(name, self.display_deflection)?;
        mesh.centroid().ok_or_else(|| SceneError::Tessellation {
            object: name.to_string(),
            message: "mesh encloses no volume".into(),
        })
    }

    // ── Internals ─────────────────────────────────────────────

    fn index_of(&self, name: &str) -> Result<usize, SceneError> {
        self.objects
            .iter()
            .position(|o| o.name == name)
            .ok_or_else(|| SceneError::ObjectNotFound(name.to_string()))
    }

    fn unique_name(&self, base: &str) -> String {
        let base = if base.trim().is_empty() { "Object" } else { base.trim() };
        if self.object(base).is_none() {
            return base.to_string();
        }
        let mut i = 1;
        loop {
            let candidate = format!("{base}{i:03}");
            if self.object(&candidate).is_none() {
                return candidate;
            }
            i += 1;
        }
    }

    fn invalidate(&self) {
        self.display_cache.borrow_mut().clear();
    }

    fn build(&self, name: &str, deflection: f64) -> Result<Part, SceneError> {
        if !(deflection > 0.0 && deflection.is_finite()) {
            return Err(SceneError::InvalidDeflection(deflection));
        }
        let object = self
            .object(name)
            .ok_or_else(|| SceneError::ObjectNotFound(name.to_string()))?;
        Ok(build_part(&object.name, &object.shape, deflection))
    }

    /// Fill the display cache for objects that are missing from it.
    fn refresh_display(&self) {
        let mut cache = self.display_cache.borrow_mut();
        for object in &self.objects {
            if cache.contains_key(&object.name) {
                continue;
            }
            match self.tessellate(&object.name, self.display_deflection) {
                Ok(mesh) => {
                    cache.insert(object.name.clone(), mesh);
                }
                Err(e) => tracing::warn!("Skipping {} in view: {e}", object.name),
            }
        }
    }
}

impl SceneAccess for Document {
    fn enumerate_objects(&self) -> Vec<ObjectId> {
        self.objects.iter().map(|o| o.name.clone()).collect()
    }

    fn tessellate(&self, object: &str, linear_deflection: f64) -> Result<TriMesh, SceneError> {
        let part = self.build(object, linear_deflection)?;
        part_mesh(object, &part)
    }

    fn exact_volume(&self, object: &str) -> Result<f64, SceneError> {
        Ok(self.build(object, self.display_deflection)?.volume() as f64)
    }

    fn exact_area(&self, object: &str) -> Result<f64, SceneError> {
        Ok(self.build(object, self.display_deflection)?.surface_area() as f64)
    }

    fn cast_ray(&self, origin: DVec3, direction: DVec3) -> Option<DVec3> {
        self.refresh_display();
        let ray = Ray::new(origin, direction);
        let cache = self.display_cache.borrow();
        pick_nearest(&ray, cache.values()).map(|hit| hit.point)
    }

    fn camera(&self) -> &Camera {
        &self.camera
    }

    fn set_camera(&mut self, pose: &CameraPose) -> Result<(), SceneError> {
        self.camera = Camera::from_pose(pose)?;
        Ok(())
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn render(&self, width: u32, height: u32, background: Color) -> Vec<u8> {
        self.refresh_display();
        let mut frame = Frame::new(width, height, background);
        for mesh in self.display_cache.borrow().values() {
            frame.draw_mesh(&self.camera, mesh);
        }
        for (shape, color) in self.markers.values() {
            match *shape {
                MarkerShape::Point(p) => frame.draw_point(&self.camera, p, *color),
                MarkerShape::Line(a, b) => frame.draw_line(&self.camera, a, b, *color),
            }
        }
        frame.into_pixels()
    }

    fn place_marker(&mut self, shape: MarkerShape, color: Color) -> MarkerHandle {
        let handle = MarkerHandle(self.next_marker);
        self.next_marker += 1;
        self.markers.insert(handle, (shape, color));
        handle
    }

    fn remove_marker(&mut self, handle: MarkerHandle) -> bool {
        self.markers.remove(&handle).is_some()
    }
}

// ── Kernel glue ───────────────────────────────────────────────

/// Segment count whose chord sagitta stays within `deflection` for `radius`.
pub fn segments_for_deflection(radius: f64, deflection: f64) -> u32 {
    if radius <= deflection {
        return MIN_SEGMENTS;
    }
    let half_angle = (1.0 - deflection / radius).acos();
    let segments = (std::f64::consts::PI / half_angle).ceil();
    (segments as u32).clamp(MIN_SEGMENTS, MAX_SEGMENTS)
}

fn validate_primitive(primitive: &Primitive) -> Result<(), SceneError> {
    fn positive(name: &'static str, value: f64) -> Result<(), SceneError> {
        if value > 0.0 && value.is_finite() {
            Ok(())
        } else {
            Err(SceneError::InvalidDimension { name, value })
        }
    }
    fn non_negative(name: &'static str, value: f64) -> Result<(), SceneError> {
        if value >= 0.0 && value.is_finite() {
            Ok(())
        } else {
            Err(SceneError::InvalidDimension { name, value })
        }
    }

    match *primitive {
        Primitive::Box { length, width, height } => {
            positive("length", length)?;
            positive("width", width)?;
            positive("height", height)
        }
        Primitive::Cylinder { radius, height } => {
            positive("radius", radius)?;
            positive("height", height)
        }
        Primitive::Sphere { radius } => positive("radius", radius),
        Primitive::Cone { radius1, radius2, height } => {
            non_negative("radius1", radius1)?;
            non_negative("radius2", radius2)?;
            positive("radius1 + radius2", radius1 + radius2)?;
            positive("height", height)
        }
    }
}

/// Create a vcad Part from a primitive. Boxes get their corner at the origin.
fn create_primitive(id: &str, primitive: &Primitive, deflection: f64) -> Part {
    match *primitive {
        Primitive::Box { length, width, height } => {
            centered_cube(id, length, width, height).translate(length / 2.0, width / 2.0, height / 2.0)
        }
        Primitive::Cylinder { radius, height } => {
            Part::cylinder(id, radius, height, segments_for_deflection(radius, deflection))
        }
        Primitive::Sphere { radius } => {
            Part::sphere(id, radius, segments_for_deflection(radius, deflection))
        }
        Primitive::Cone { radius1, radius2, height } => {
            let segments = segments_for_deflection(radius1.max(radius2), deflection);
            Part::cone(id, radius1, radius2, height, segments)
        }
    }
}

/// Place a part: scale about its origin, turn, then move to `position`.
fn place(part: Part, transform: &Transform) -> Part {
    let Transform {
        position,
        rotation,
        scale,
    } = transform;

    let mut part = part;
    if *scale != [1.0; 3] {
        part = part.scale(scale[0], scale[1], scale[2]);
    }
    if *rotation != [0.0; 3] {
        part = part.rotate(rotation[0], rotation[1], rotation[2]);
    }
    if *position != [0.0; 3] {
        part = part.translate(position[0], position[1], position[2]);
    }
    part
}

/// Euler angles in degrees as `Part::rotate` applies them: about X, then Y,
/// then Z.
fn euler_to_quat([x, y, z]: [f64; 3]) -> DQuat {
    DQuat::from_euler(EulerRot::ZYX, z.to_radians(), y.to_radians(), x.to_radians())
}

fn quat_to_euler(q: DQuat) -> [f64; 3] {
    let (z, y, x) = q.normalize().to_euler(EulerRot::ZYX);
    // Snap float noise so axis-aligned turns stay readable
    [x, y, z].map(|a| {
        let deg = a.to_degrees();
        let snapped = (deg * 1e9).round() / 1e9;
        if snapped == 0.0 { 0.0 } else { snapped }
    })
}

/// Index of the axis normal to a principal plane
fn plane_normal_axis(plane: &str) -> Result<usize, SceneError> {
    match plane.to_ascii_uppercase().as_str() {
        "YZ" => Ok(0),
        "XZ" => Ok(1),
        "XY" => Ok(2),
        _ => Err(SceneError::InvalidTransform(format!(
            "invalid plane '{plane}', use XY, XZ or YZ"
        ))),
    }
}

/// Placement of `t` reflected across the plane through `base` normal to
/// `axis`. The reflection moves into the scale; the rotation is conjugated.
fn mirrored(t: &Transform, axis: usize, base: DVec3) -> Transform {
    let mut flip = DVec3::ONE;
    flip[axis] = -1.0;
    let position = flip * (DVec3::from_array(t.position) - base) + base;

    let mut q = euler_to_quat(t.rotation).to_array();
    for (i, c) in q.iter_mut().take(3).enumerate() {
        if i != axis {
            *c = -*c;
        }
    }

    let mut scale = t.scale;
    scale[axis] = -scale[axis];
    Transform {
        position: position.to_array(),
        rotation: quat_to_euler(DQuat::from_array(q)),
        scale,
    }
}

/// Rigid move of an already built part
fn moved(part: &Part, t: &Transform) -> Part {
    let [rx, ry, rz] = t.rotation;
    let [px, py, pz] = t.position;
    part.rotate(rx, ry, rz).translate(px, py, pz)
}

fn mesh_bounds(name: &str, mesh: &TriMesh) -> Result<Aabb, SceneError> {
    mesh.aabb().ok_or_else(|| SceneError::Tessellation {
        object: name.to_string(),
        message: "empty mesh".into(),
    })
}

fn build_part(id: &str, shape: &Shape, deflection: f64) -> Part {
    match shape {
        Shape::Solid { primitive, transform } => place(create_primitive(id, primitive, deflection), transform),
        Shape::Boolean {
            op,
            left,
            right,
            transform,
        } => {
            let l = build_part(&format!("{id}_a"), left, deflection);
            let r = build_part(&format!("{id}_b"), right, deflection);
            let combined = match op {
                BooleanOp::Union => l.union(&r),
                BooleanOp::Difference => l.difference(&r),
                BooleanOp::Intersection => l.intersection(&r),
            };
            place(combined, transform)
        }
        Shape::Array {
            source,
            copies,
            transform,
        } => {
            let base = build_part(&format!("{id}_src"), source, deflection);
            let fused = copies
                .iter()
                .fold(Part::empty(id), |acc, copy| acc.union(&moved(&base, copy)));
            place(fused, transform)
        }
    }
}

fn part_mesh(name: &str, part: &Part) -> Result<TriMesh, SceneError> {
    let mesh = part.to_mesh();
    let tri = TriMesh::from_buffers(&mesh.vertices(), &mesh.indices());
    if tri.is_empty() {
        return Err(SceneError::Tessellation {
            object: name.to_string(),
            message: "kernel produced an empty mesh".into(),
        });
    }
    Ok(tri)
}

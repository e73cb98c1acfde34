//! Narrow capability interface over the modeling kernel.
//!
//! Everything the measurement and comparison code needs from the live scene
//! goes through [`SceneAccess`]. [`crate::document::Document`] is the
//! kernel-backed implementation; tests substitute lightweight stand-ins.

use glam::DVec3;
use serde::Serialize;
use shared::{CameraPose, ObjectId};
use thiserror::Error;

use crate::viewport::camera::{Camera, Viewport};
use crate::viewport::mesh::TriMesh;

/// RGBA color
pub type Color = [u8; 4];

/// High-contrast magenta for selected points
pub const POINT_MARKER_COLOR: Color = [255, 0, 255, 255];
/// Yellow for distance lines
pub const LINE_MARKER_COLOR: Color = [255, 220, 0, 255];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    #[error("No active document")]
    NoActiveDocument,

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("Failed to tessellate {object}: {message}")]
    Tessellation { object: ObjectId, message: String },

    #[error("Invalid camera: {0}")]
    InvalidCamera(String),

    #[error("Invalid dimension {name} = {value}")]
    InvalidDimension { name: &'static str, value: f64 },

    #[error("Linear deflection must be positive, got {0}")]
    InvalidDeflection(f64),

    #[error("Invalid transform: {0}")]
    InvalidTransform(String),
}

/// Opaque handle to a visual marker owned by the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MarkerHandle(pub u64);

/// Geometry of a visual marker
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkerShape {
    Point(DVec3),
    Line(DVec3, DVec3),
}

pub trait SceneAccess {
    /// Names of every object in the scene, in creation order
    fn enumerate_objects(&self) -> Vec<ObjectId>;

    /// Triangulate one object within `linear_deflection` (mm)
    fn tessellate(&self, object: &str, linear_deflection: f64) -> Result<TriMesh, SceneError>;

    fn exact_volume(&self, object: &str) -> Result<f64, SceneError>;

    fn exact_area(&self, object: &str) -> Result<f64, SceneError>;

    /// Nearest intersection of the ray with scene geometry
    fn cast_ray(&self, origin: DVec3, direction: DVec3) -> Option<DVec3>;

    fn camera(&self) -> &Camera;

    fn set_camera(&mut self, pose: &CameraPose) -> Result<(), SceneError>;

    fn viewport(&self) -> Viewport;

    /// Offscreen RGBA8 image of the current view
    fn render(&self, width: u32, height: u32, background: Color) -> Vec<u8>;

    fn place_marker(&mut self, shape: MarkerShape, color: Color) -> MarkerHandle;

    /// Returns false when the handle was unknown
    fn remove_marker(&mut self, handle: MarkerHandle) -> bool;
}

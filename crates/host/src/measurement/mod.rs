//! Grid-guided point selection and distance measurement.
//!
//! A remote client cannot click into the view, so it addresses screen
//! positions through a labelled grid instead. Selecting a cell casts a ray
//! through the cell centre, the hit is shown as a marker, and the client
//! confirms the point once it has checked the screenshot.

pub mod grid;
pub mod session;

use thiserror::Error;

use crate::scene::SceneError;

pub use grid::{CellLabel, GridSpec, ResolvedCell, ViewRect};
pub use session::{ClearTarget, DistanceMeasurement, MeasurementPoint, MeasurementSession};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasurementError {
    #[error("Measurement mode is not active. Call start_measurement first")]
    NotActive,

    #[error("Invalid grid cell: {0}")]
    InvalidCell(String),

    #[error("Zoom size must be at least 1")]
    InvalidZoomSize,

    #[error("Unknown point: {0}")]
    UnknownPoint(String),

    #[error("Point {0} did not hit any geometry and cannot be confirmed")]
    NotYetResolved(String),

    #[error("Point {0} must be confirmed before measuring")]
    PointNotConfirmed(String),

    #[error("Grid cell {label} belongs to a previous grid (generation {generation})")]
    StaleCell { label: String, generation: u64 },

    #[error(transparent)]
    Scene(#[from] SceneError),
}

// Library crate: everything that runs on the host thread, plus the bridge
// that lets other threads hand work to it. The network front end lives in
// the server crate.

pub mod bridge;
pub mod command;
pub mod comparison;
pub mod config;
pub mod context;
pub mod document;
pub mod fixtures;
pub mod harness;
pub mod measurement;
pub mod scene;
pub mod stl;

/// Camera, picking and mesh math for the virtual view.
pub mod viewport {
    pub mod camera;
    pub mod mesh;
    pub mod picking;
    pub mod raster;
}

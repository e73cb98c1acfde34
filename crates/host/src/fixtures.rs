//! Factory functions for test data: point sets, meshes and STL files.

use std::path::{Path, PathBuf};

use glam::DVec3;
use shared::CameraPose;

use crate::stl;
use crate::viewport::mesh::TriMesh;

// ── Point sets ──────────────────────────────────────────────────

/// The 8 corners of an axis-aligned box with one corner at the origin.
pub fn box_corners(length: f64, width: f64, height: f64) -> Vec<DVec3> {
    let mut corners = Vec::with_capacity(8);
    for z in [0.0, height] {
        for y in [0.0, width] {
            for x in [0.0, length] {
                corners.push(DVec3::new(x, y, z));
            }
        }
    }
    corners
}

// ── Meshes ──────────────────────────────────────────────────────

/// Closed box mesh with one corner at the origin.
pub fn box_mesh(length: f64, width: f64, height: f64) -> TriMesh {
    TriMesh::cuboid(DVec3::ZERO, DVec3::new(length, width, height))
}

/// Write a box as binary STL into `dir` and return its path.
pub fn write_box_stl(dir: &Path, name: &str, length: f64, width: f64, height: f64) -> PathBuf {
    let path = dir.join(name);
    if let Err(e) = stl::write_binary(&path, &box_mesh(length, width, height)) {
        panic!("failed to write fixture {}: {e}", path.display());
    }
    path
}

// ── Cameras ─────────────────────────────────────────────────────

/// Head-on view of the front (y = 0) face of a box at the origin,
/// 100 mm in front of it and centred on the face.
pub fn front_view(length: f64, width: f64, height: f64) -> CameraPose {
    let cx = length / 2.0;
    let cz = height / 2.0;
    CameraPose::looking_at([cx, -100.0, cz], [cx, width / 2.0, cz])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_corners() {
        let c = box_corners(50.0, 30.0, 20.0);
        assert_eq!(c.len(), 8);
        assert!(c.contains(&DVec3::ZERO));
        assert!(c.contains(&DVec3::new(50.0, 30.0, 20.0)));
    }

    #[test]
    fn test_box_mesh_volume() {
        assert!((box_mesh(50.0, 30.0, 20.0).volume() - 30_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_front_view_looks_along_y() {
        let pose = front_view(50.0, 30.0, 20.0);
        assert_eq!(pose.eye, [25.0, -100.0, 10.0]);
        assert_eq!(pose.target, [25.0, 15.0, 10.0]);
    }
}

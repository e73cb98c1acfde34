//! STL reference files.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use glam::DVec3;
use tracing::debug;

use crate::comparison::ComparisonError;
use crate::viewport::mesh::TriMesh;

/// Load an ASCII or binary STL file.
pub fn load_reference(path: &Path) -> Result<TriMesh, ComparisonError> {
    if !path.is_file() {
        return Err(ComparisonError::MissingReferenceFile(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|e| ComparisonError::InvalidReference {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let mut reader = BufReader::new(file);
    let stl = stl_io::read_stl(&mut reader).map_err(|e| ComparisonError::InvalidReference {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let vertices = stl
        .vertices
        .iter()
        .map(|v| DVec3::new(v[0] as f64, v[1] as f64, v[2] as f64))
        .collect::<Vec<_>>();
    let faces = stl
        .faces
        .iter()
        .map(|f| {
            [
                f.vertices[0] as u32,
                f.vertices[1] as u32,
                f.vertices[2] as u32,
            ]
        })
        .collect::<Vec<_>>();

    debug!(path = %path.display(), faces = faces.len(), "Loaded STL reference");
    let mesh = TriMesh::new(vertices, faces);
    if mesh.is_empty() {
        return Err(ComparisonError::InvalidReference {
            path: path.to_path_buf(),
            message: "file contains no triangles".into(),
        });
    }
    Ok(mesh)
}

/// Write a mesh as binary STL.
pub fn write_binary(path: &Path, mesh: &TriMesh) -> std::io::Result<()> {
    let triangles: Vec<stl_io::Triangle> = mesh
        .triangles()
        .map(|[a, b, c]| stl_io::Triangle {
            normal: stl_io::Normal::new(to_f32((b - a).cross(c - a).normalize_or_zero())),
            vertices: [a, b, c].map(|v| stl_io::Vertex::new(to_f32(v))),
        })
        .collect();

    let mut out = BufWriter::new(File::create(path)?);
    stl_io::write_stl(&mut out, triangles.iter())?;
    out.flush()
}

fn to_f32(v: DVec3) -> [f32; 3] {
    v.as_vec3().to_array()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file() {
        let err = load_reference(Path::new("/nonexistent/ref.stl")).unwrap_err();
        assert!(matches!(err, ComparisonError::MissingReferenceFile(_)));
    }

    #[test]
    fn test_garbage_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.stl");
        std::fs::write(&path, b"definitely not an stl").unwrap();
        let err = load_reference(&path).unwrap_err();
        assert!(matches!(err, ComparisonError::InvalidReference { .. }));
    }

    #[test]
    fn test_unit_cube_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.stl");
        write_binary(&path, &TriMesh::cuboid(DVec3::ZERO, DVec3::ONE)).unwrap();
        // 80-byte header, count, 50 bytes per facet
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 84 + 50 * 12);

        let mesh = load_reference(&path).unwrap();
        assert_eq!(mesh.triangle_count(), 12);
        assert!((mesh.volume() - 1.0).abs() < 1e-6);
        assert!((mesh.surface_area() - 6.0).abs() < 1e-6);
    }

    #[test]
    fn test_ascii_stl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.stl");
        std::fs::write(
            &path,
            "solid tri\n\
             facet normal 0 0 1\n\
             outer loop\n\
             vertex 0 0 0\n\
             vertex 1 0 0\n\
             vertex 0 1 0\n\
             endloop\n\
             endfacet\n\
             endsolid tri\n",
        )
        .unwrap();

        let mesh = load_reference(&path).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert!((mesh.surface_area() - 0.5).abs() < 1e-9);
    }
}

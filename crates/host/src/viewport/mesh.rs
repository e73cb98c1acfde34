use glam::DVec3;

use super::picking::Aabb;

/// CPU-side triangle mesh: shared vertex positions plus index triples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriMesh {
    pub vertices: Vec<DVec3>,
    pub faces: Vec<[u32; 3]>,
}

impl TriMesh {
    pub fn new(vertices: Vec<DVec3>, faces: Vec<[u32; 3]>) -> Self {
        Self { vertices, faces }
    }

    /// Build from flat kernel buffers: `positions` holds 3 floats per vertex,
    /// `indices` 3 per triangle. A trailing partial triangle is dropped.
    pub fn from_buffers(positions: &[f32], indices: &[u32]) -> Self {
        let vertices = positions
            .chunks_exact(3)
            .map(|p| DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64))
            .collect();
        let faces = indices
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();
        Self { vertices, faces }
    }

    /// Axis-aligned box with one corner at `origin`.
    pub fn cuboid(origin: DVec3, size: DVec3) -> Self {
        let o = origin;
        let s = size;
        let vertices = vec![
            o,
            o + DVec3::new(s.x, 0.0, 0.0),
            o + DVec3::new(s.x, s.y, 0.0),
            o + DVec3::new(0.0, s.y, 0.0),
            o + DVec3::new(0.0, 0.0, s.z),
            o + DVec3::new(s.x, 0.0, s.z),
            o + DVec3::new(s.x, s.y, s.z),
            o + DVec3::new(0.0, s.y, s.z),
        ];
        // Outward-facing winding
        let faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [1, 2, 6],
            [1, 6, 5],
            [2, 3, 7],
            [2, 7, 6],
            [3, 0, 4],
            [3, 4, 7],
        ];
        Self { vertices, faces }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Triangles as position triples. Faces with out-of-range indices are skipped.
    pub fn triangles(&self) -> impl Iterator<Item = [DVec3; 3]> + '_ {
        self.faces.iter().filter_map(move |f| {
            Some([
                *self.vertices.get(f[0] as usize)?,
                *self.vertices.get(f[1] as usize)?,
                *self.vertices.get(f[2] as usize)?,
            ])
        })
    }

    /// Append another mesh, re-basing its indices.
    pub fn append(&mut self, other: &TriMesh) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.faces.extend(
            other
                .faces
                .iter()
                .map(|f| [f[0] + base, f[1] + base, f[2] + base]),
        );
    }

    /// Total triangle area
    pub fn surface_area(&self) -> f64 {
        self.triangles()
            .map(|[a, b, c]| (b - a).cross(c - a).length() * 0.5)
            .sum()
    }

    /// Signed volume via the divergence theorem (sum of origin tetrahedra).
    /// Positive for a closed mesh with outward winding.
    pub fn signed_volume(&self) -> f64 {
        self.triangles()
            .map(|[a, b, c]| a.dot(b.cross(c)) / 6.0)
            .sum()
    }

    pub fn volume(&self) -> f64 {
        self.signed_volume().abs()
    }

    /// Centre of mass of the enclosed solid, assuming uniform density.
    /// None for meshes that enclose no volume.
    pub fn centroid(&self) -> Option<DVec3> {
        let (moment, volume) = self.triangles().fold((DVec3::ZERO, 0.0), |(m, v), [a, b, c]| {
            let tet = a.dot(b.cross(c)) / 6.0;
            (m + (a + b + c) * (tet / 4.0), v + tet)
        });
        if volume.abs() < 1e-12 {
            return None;
        }
        Some(moment / volume)
    }

    pub fn aabb(&self) -> Option<Aabb> {
        Aabb::from_points(&self.vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cuboid_metrics() {
        let m = TriMesh::cuboid(DVec3::ZERO, DVec3::new(50.0, 30.0, 20.0));
        assert_eq!(m.vertex_count(), 8);
        assert_eq!(m.triangle_count(), 12);
        assert!((m.signed_volume() - 30000.0).abs() < 1e-9);
        let expected_area = 2.0 * (50.0 * 30.0 + 50.0 * 20.0 + 30.0 * 20.0);
        assert!((m.surface_area() - expected_area).abs() < 1e-9);
    }

    #[test]
    fn test_cuboid_centroid() {
        let m = TriMesh::cuboid(DVec3::new(10.0, 0.0, 0.0), DVec3::new(4.0, 2.0, 6.0));
        let c = m.centroid().unwrap();
        assert!((c - DVec3::new(12.0, 1.0, 3.0)).length() < 1e-9);

        let flat = TriMesh::from_buffers(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], &[0, 1, 2]);
        assert!(flat.centroid().is_none());
    }

    #[test]
    fn test_from_buffers_drops_partial() {
        let m = TriMesh::from_buffers(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 9.0], &[0, 1, 2, 0]);
        assert_eq!(m.vertex_count(), 3);
        assert_eq!(m.triangle_count(), 1);
        assert!((m.surface_area() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_face_skipped() {
        let mut m = TriMesh::cuboid(DVec3::ZERO, DVec3::ONE);
        m.faces.push([0, 1, 99]);
        assert_eq!(m.triangles().count(), 12);
    }

    #[test]
    fn test_append_rebases_indices() {
        let mut a = TriMesh::cuboid(DVec3::ZERO, DVec3::ONE);
        let b = TriMesh::cuboid(DVec3::new(5.0, 0.0, 0.0), DVec3::ONE);
        a.append(&b);
        assert_eq!(a.vertex_count(), 16);
        assert!((a.volume() - 2.0).abs() < 1e-12);
        let aabb = a.aabb().unwrap();
        assert_eq!(aabb.max, DVec3::new(6.0, 1.0, 1.0));
    }
}

//! Geometry comparison against a reference mesh.
//!
//! Shapes are compared through vertex samples with the two-sided Hausdorff
//! distance: the largest distance from any point of one set to its nearest
//! neighbour in the other. Nearest neighbours come from [`PointGrid`], a
//! uniform grid index that returns exact minima, so the result is identical
//! to the brute-force definition.

use std::path::PathBuf;

use glam::DVec3;
use shared::ComparisonResult;
use thiserror::Error;
use tracing::{debug, warn};

use crate::scene::{SceneAccess, SceneError};
use crate::viewport::picking::Aabb;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComparisonError {
    #[error("The {0} point set is empty")]
    EmptyPointSet(&'static str),

    #[error("Reference file not found: {}", .0.display())]
    MissingReferenceFile(PathBuf),

    #[error("Failed to read reference {}: {}", path.display(), message)]
    InvalidReference { path: PathBuf, message: String },

    #[error("Tolerance must be a finite non-negative number, got {0}")]
    InvalidTolerance(f64),

    #[error("No shapes with volume found in the document")]
    NoShapes,

    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Volume and surface area of one side of a comparison
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SurfaceMetrics {
    pub volume: f64,
    pub area: f64,
}

/// Vertex sample of the solids in a scene
#[derive(Debug, Clone)]
pub struct SceneSample {
    pub points: Vec<DVec3>,
    pub metrics: SurfaceMetrics,
    pub bounds: Option<Aabb>,
    /// Objects that contributed to the sample
    pub shapes: Vec<String>,
}

/// Sample every object with positive volume at the given deflection.
pub fn sample_scene(scene: &dyn SceneAccess, deflection: f64) -> Result<SceneSample, ComparisonError> {
    if !(deflection > 0.0 && deflection.is_finite()) {
        return Err(SceneError::InvalidDeflection(deflection).into());
    }

    let mut sample = SceneSample {
        points: Vec::new(),
        metrics: SurfaceMetrics::default(),
        bounds: None,
        shapes: Vec::new(),
    };

    for name in scene.enumerate_objects() {
        let volume = match scene.exact_volume(&name) {
            Ok(v) if v > 0.0 => v,
            Ok(_) => continue,
            Err(e) => {
                warn!("Skipping {name}: {e}");
                continue;
            }
        };
        let (area, mesh) = match scene
            .exact_area(&name)
            .and_then(|area| Ok((area, scene.tessellate(&name, deflection)?)))
        {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Failed to tessellate {name}: {e}");
                continue;
            }
        };

        if let Some(aabb) = mesh.aabb() {
            sample.bounds = Some(match sample.bounds {
                Some(b) => b.union(&aabb),
                None => aabb,
            });
        }
        sample.points.extend_from_slice(&mesh.vertices);
        sample.metrics.volume += volume;
        sample.metrics.area += area;
        sample.shapes.push(name);
    }

    if sample.shapes.is_empty() {
        return Err(ComparisonError::NoShapes);
    }
    debug!(
        shapes = sample.shapes.len(),
        points = sample.points.len(),
        "Sampled scene"
    );
    Ok(sample)
}

/// Compare two point samples and their metrics.
pub fn compare(
    reference: &[DVec3],
    current: &[DVec3],
    tolerance: f64,
    reference_metrics: SurfaceMetrics,
    current_metrics: SurfaceMetrics,
) -> Result<ComparisonResult, ComparisonError> {
    if !(tolerance >= 0.0 && tolerance.is_finite()) {
        return Err(ComparisonError::InvalidTolerance(tolerance));
    }
    if reference.is_empty() {
        return Err(ComparisonError::EmptyPointSet("reference"));
    }
    if current.is_empty() {
        return Err(ComparisonError::EmptyPointSet("current"));
    }

    let hausdorff = finite_or_max(hausdorff_distance(reference, current));

    Ok(ComparisonResult {
        hausdorff_distance: hausdorff,
        is_match: hausdorff <= tolerance,
        tolerance,
        reference_volume: finite_or_zero(reference_metrics.volume),
        current_volume: finite_or_zero(current_metrics.volume),
        volume_error: relative_error(reference_metrics.volume, current_metrics.volume),
        reference_area: finite_or_zero(reference_metrics.area),
        current_area: finite_or_zero(current_metrics.area),
        area_error: relative_error(reference_metrics.area, current_metrics.area),
        reference_points: reference.len(),
        current_points: current.len(),
    })
}

/// `|r - c| / |r|`, or 0 when the reference is zero.
pub fn relative_error(reference: f64, current: f64) -> f64 {
    if reference == 0.0 {
        return 0.0;
    }
    finite_or_zero((reference - current).abs() / reference.abs())
}

/// Two-sided Hausdorff distance between non-empty point sets.
pub fn hausdorff_distance(a: &[DVec3], b: &[DVec3]) -> f64 {
    let grid_a = PointGrid::new(a);
    let grid_b = PointGrid::new(b);
    directed_hausdorff(a, &grid_b).max(directed_hausdorff(b, &grid_a))
}

/// Largest nearest-neighbour distance from `from` into the indexed set.
pub fn directed_hausdorff(from: &[DVec3], to: &PointGrid) -> f64 {
    from.iter()
        .map(|&p| to.nearest_distance_sq(p))
        .fold(0.0, f64::max)
        .sqrt()
}

/// Keep every `sample_rate`-th point, rounded to 4 decimals.
pub fn thin_points(points: &[DVec3], sample_rate: usize) -> Vec<[f64; 3]> {
    points
        .iter()
        .step_by(sample_rate.max(1))
        .map(|p| [round4(p.x), round4(p.y), round4(p.z)])
        .collect()
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

fn finite_or_max(v: f64) -> f64 {
    if v.is_nan() {
        f64::MAX
    } else {
        v.min(f64::MAX)
    }
}

// ── Spatial index ─────────────────────────────────────────────

/// Uniform grid over a point set for exact nearest-neighbour queries
pub struct PointGrid<'a> {
    points: &'a [DVec3],
    origin: DVec3,
    cell: f64,
    dims: [i64; 3],
    /// Point indices per cell, x-fastest
    cells: Vec<Vec<u32>>,
}

impl<'a> PointGrid<'a> {
    pub fn new(points: &'a [DVec3]) -> Self {
        let Some(aabb) = Aabb::from_points(points) else {
            return Self {
                points,
                origin: DVec3::ZERO,
                cell: 1.0,
                dims: [1, 1, 1],
                cells: vec![Vec::new()],
            };
        };

        // Aim for about two points per cell along the longest axis
        let extent = aabb.size().max_element();
        let per_axis = ((points.len() as f64 / 2.0).cbrt().ceil()).max(1.0);
        let cell = if extent > 0.0 && extent.is_finite() {
            extent / per_axis
        } else {
            1.0
        };

        let size = aabb.size();
        let dims = [
            (size.x / cell).floor() as i64 + 1,
            (size.y / cell).floor() as i64 + 1,
            (size.z / cell).floor() as i64 + 1,
        ];
        let mut grid = Self {
            points,
            origin: aabb.min,
            cell,
            dims,
            cells: vec![Vec::new(); (dims[0] * dims[1] * dims[2]) as usize],
        };
        for (i, &p) in points.iter().enumerate() {
            let idx = grid.flat_index(grid.cell_of(p));
            grid.cells[idx].push(i as u32);
        }
        grid
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Squared distance from `q` to its nearest indexed point.
    /// Infinite when the grid holds no points.
    pub fn nearest_distance_sq(&self, q: DVec3) -> f64 {
        if self.points.is_empty() {
            return f64::INFINITY;
        }

        let center = self.cell_of(q);
        let max_ring = self.dims.iter().copied().max().unwrap_or(1);
        let mut best = f64::INFINITY;

        for r in 0..max_ring {
            self.visit_shell(center, r, |i| {
                let d = self.points[i as usize].distance_squared(q);
                if d < best {
                    best = d;
                }
            });
            // Unvisited cells are at least r cells away from q
            let reach = r as f64 * self.cell;
            if best <= reach * reach {
                break;
            }
        }
        best
    }

    /// Cell coordinates of `p`, clamped into the grid
    fn cell_of(&self, p: DVec3) -> [i64; 3] {
        let rel = (p - self.origin) / self.cell;
        [
            (rel.x.floor() as i64).clamp(0, self.dims[0] - 1),
            (rel.y.floor() as i64).clamp(0, self.dims[1] - 1),
            (rel.z.floor() as i64).clamp(0, self.dims[2] - 1),
        ]
    }

    fn flat_index(&self, [x, y, z]: [i64; 3]) -> usize {
        ((z * self.dims[1] + y) * self.dims[0] + x) as usize
    }

    /// Visit the points of every cell at Chebyshev distance exactly `r`.
    fn visit_shell(&self, [cx, cy, cz]: [i64; 3], r: i64, mut f: impl FnMut(u32)) {
        for dx in -r..=r {
            for dy in -r..=r {
                let on_shell = dx.abs() == r || dy.abs() == r;
                let step = if on_shell || r == 0 { 1 } else { 2 * r };
                let mut dz = -r;
                while dz <= r {
                    let c = [cx + dx, cy + dy, cz + dz];
                    if (0..3).all(|i| c[i] >= 0 && c[i] < self.dims[i]) {
                        for &i in &self.cells[self.flat_index(c)] {
                            f(i);
                        }
                    }
                    dz += step;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic pseudo-random points
    fn lcg_points(n: usize, seed: u64, scale: f64) -> Vec<DVec3> {
        let mut state = seed;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        (0..n)
            .map(|_| DVec3::new(next(), next(), next()) * scale)
            .collect()
    }

    fn brute_force(a: &[DVec3], b: &[DVec3]) -> f64 {
        let directed = |from: &[DVec3], to: &[DVec3]| {
            from.iter()
                .map(|p| to.iter().map(|q| p.distance(*q)).fold(f64::INFINITY, f64::min))
                .fold(0.0, f64::max)
        };
        directed(a, b).max(directed(b, a))
    }

    #[test]
    fn test_identical_sets() {
        let pts = lcg_points(200, 7, 10.0);
        assert_eq!(hausdorff_distance(&pts, &pts), 0.0);
    }

    #[test]
    fn test_single_points() {
        let a = [DVec3::ZERO];
        let b = [DVec3::new(3.0, 4.0, 0.0)];
        assert!((hausdorff_distance(&a, &b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_matches_brute_force() {
        let a = lcg_points(500, 1, 50.0);
        let b = lcg_points(300, 2, 40.0);
        let fast = hausdorff_distance(&a, &b);
        let slow = brute_force(&a, &b);
        assert!((fast - slow).abs() < 1e-9, "{fast} vs {slow}");
    }

    #[test]
    fn test_query_outside_grid() {
        let pts = lcg_points(100, 3, 1.0);
        let grid = PointGrid::new(&pts);
        let q = DVec3::new(10.0, -5.0, 0.5);
        let expected = pts.iter().map(|p| p.distance_squared(q)).fold(f64::INFINITY, f64::min);
        assert!((grid.nearest_distance_sq(q) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_flat_set() {
        let a: Vec<DVec3> = (0..10).map(|i| DVec3::new(i as f64, 0.0, 0.0)).collect();
        let b = [DVec3::new(4.5, 1.0, 0.0)];
        let slow = brute_force(&a, &b);
        assert!((hausdorff_distance(&a, &b) - slow).abs() < 1e-12);
    }

    #[test]
    fn test_compare_errors() {
        let p = [DVec3::ZERO];
        let m = SurfaceMetrics::default();
        assert_eq!(
            compare(&[], &p, 1.0, m, m),
            Err(ComparisonError::EmptyPointSet("reference"))
        );
        assert_eq!(
            compare(&p, &[], 1.0, m, m),
            Err(ComparisonError::EmptyPointSet("current"))
        );
        assert!(matches!(
            compare(&p, &p, -1.0, m, m),
            Err(ComparisonError::InvalidTolerance(_))
        ));
    }

    #[test]
    fn test_relative_error() {
        assert_eq!(relative_error(0.0, 5.0), 0.0);
        assert!((relative_error(200.0, 150.0) - 0.25).abs() < 1e-12);
        assert!(!relative_error(1e-320, 1e300).is_nan());
    }

    #[test]
    fn test_tolerance_boundary() {
        let a = [DVec3::ZERO];
        let b = [DVec3::new(1.0, 0.0, 0.0)];
        let m = SurfaceMetrics::default();
        assert!(compare(&a, &b, 1.0, m, m).unwrap().is_match);
        assert!(!compare(&a, &b, 0.999, m, m).unwrap().is_match);
    }

    #[test]
    fn test_thin_points() {
        let pts = [
            DVec3::new(1.234_56, 0.0, 0.0),
            DVec3::ONE,
            DVec3::new(2.0, 2.0, 2.0),
        ];
        assert_eq!(thin_points(&pts, 2), vec![[1.2346, 0.0, 0.0], [2.0, 2.0, 2.0]]);
        assert_eq!(thin_points(&pts, 0).len(), 3);
    }
}

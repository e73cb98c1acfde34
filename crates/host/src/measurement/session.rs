use glam::DVec3;
use serde::Serialize;
use shared::{GridSnapshot, PointSnapshot};
use tracing::debug;

use super::grid::{CellLabel, GridSpec, ResolvedCell};
use super::MeasurementError;
use crate::scene::{MarkerHandle, MarkerShape, SceneAccess, LINE_MARKER_COLOR, POINT_MARKER_COLOR};

/// A point picked through the grid
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementPoint {
    pub id: String,
    pub cell: CellLabel,
    /// None when the ray through the cell missed all geometry
    pub world_position: Option<DVec3>,
    pub confirmed: bool,
    marker: Option<MarkerHandle>,
}

impl MeasurementPoint {
    pub fn is_resolved(&self) -> bool {
        self.world_position.is_some()
    }

    pub fn snapshot(&self) -> PointSnapshot {
        PointSnapshot {
            id: self.id.clone(),
            grid_cell: self.cell.to_string(),
            position: self.world_position.map(|p| p.to_array()),
            resolved: self.is_resolved(),
            confirmed: self.confirmed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistanceMeasurement {
    pub point_a: String,
    pub point_b: String,
    pub distance: f64,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

/// What `clear_point` removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearTarget {
    All,
    Point(String),
}

impl ClearTarget {
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("all") {
            ClearTarget::All
        } else {
            ClearTarget::Point(s.trim().to_string())
        }
    }
}

/// State of an active measurement session
#[derive(Debug)]
pub struct MeasurementSession {
    grid: GridSpec,
    points: Vec<MeasurementPoint>,
    lines: Vec<MarkerHandle>,
    next_id: u64,
}

impl MeasurementSession {
    pub fn new(columns: u32, rows: u32) -> Self {
        Self {
            grid: GridSpec::full(columns, rows, 1),
            points: Vec::new(),
            lines: Vec::new(),
            next_id: 1,
        }
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn points(&self) -> &[MeasurementPoint] {
        &self.points
    }

    pub fn point(&self, id: &str) -> Option<&MeasurementPoint> {
        self.points.iter().find(|p| p.id == id)
    }

    /// Number of distance lines currently shown
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Pick the surface under a grid cell of the current grid.
    pub fn select_point(
        &mut self,
        scene: &mut dyn SceneAccess,
        cell: &str,
    ) -> Result<PointSnapshot, MeasurementError> {
        let resolved = self.grid.resolve(cell)?;
        self.select_resolved(scene, resolved)
    }

    /// Pick the surface under an already resolved cell. Fails with
    /// `StaleCell` when the grid changed since the cell was resolved.
    pub fn select_resolved(
        &mut self,
        scene: &mut dyn SceneAccess,
        cell: ResolvedCell,
    ) -> Result<PointSnapshot, MeasurementError> {
        if cell.generation != self.grid.generation {
            return Err(MeasurementError::StaleCell {
                label: cell.label.to_string(),
                generation: cell.generation,
            });
        }

        let (nx, ny) = cell.center;
        let ray = scene.camera().viewport_ray(nx, ny, scene.viewport().aspect());
        let hit = scene.cast_ray(ray.origin, ray.direction);
        let marker = hit.map(|p| scene.place_marker(MarkerShape::Point(p), POINT_MARKER_COLOR));

        let id = format!("point_{}", self.next_id);
        self.next_id += 1;
        debug!(point = %id, cell = %cell.label, resolved = hit.is_some(), "Selected point");

        let point = MeasurementPoint {
            id,
            cell: cell.label,
            world_position: hit,
            confirmed: false,
            marker,
        };
        let snapshot = point.snapshot();
        self.points.push(point);
        Ok(snapshot)
    }

    /// Mark a resolved point as accepted. Confirming twice is a no-op.
    pub fn confirm_point(&mut self, id: &str) -> Result<PointSnapshot, MeasurementError> {
        let point = self
            .points
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| MeasurementError::UnknownPoint(id.to_string()))?;
        if !point.is_resolved() {
            return Err(MeasurementError::NotYetResolved(id.to_string()));
        }
        point.confirmed = true;
        Ok(point.snapshot())
    }

    pub fn list_points(&self) -> Vec<PointSnapshot> {
        self.points.iter().map(MeasurementPoint::snapshot).collect()
    }

    /// Distance between two confirmed points; draws a line between them.
    pub fn measure_distance(
        &mut self,
        scene: &mut dyn SceneAccess,
        a: &str,
        b: &str,
    ) -> Result<DistanceMeasurement, MeasurementError> {
        let pa = self.confirmed_position(a)?;
        let pb = self.confirmed_position(b)?;
        let delta = pb - pa;

        self.lines
            .push(scene.place_marker(MarkerShape::Line(pa, pb), LINE_MARKER_COLOR));

        Ok(DistanceMeasurement {
            point_a: a.to_string(),
            point_b: b.to_string(),
            distance: delta.length(),
            dx: delta.x,
            dy: delta.y,
            dz: delta.z,
        })
    }

    /// Replace the grid region with a `size × size` block of the
    /// full-viewport grid starting at `start_cell`.
    pub fn zoom(&mut self, start_cell: &str, size: u32) -> Result<GridSnapshot, MeasurementError> {
        if size == 0 {
            return Err(MeasurementError::InvalidZoomSize);
        }
        let full = GridSpec::full(self.grid.columns, self.grid.rows, self.grid.generation);
        let start = full.parse(start_cell)?;
        let region = full.block_region(start, size);
        self.grid = GridSpec {
            region,
            generation: self.grid.generation + 1,
            ..full
        };
        debug!(start = %start, size, "Zoomed grid");
        Ok(self.grid.snapshot())
    }

    pub fn reset_zoom(&mut self) -> GridSnapshot {
        self.grid = GridSpec::full(self.grid.columns, self.grid.rows, self.grid.generation + 1);
        self.grid.snapshot()
    }

    /// Remove one point or all of them with their markers; returns how many.
    pub fn clear_point(
        &mut self,
        scene: &mut dyn SceneAccess,
        target: &ClearTarget,
    ) -> Result<usize, MeasurementError> {
        let removed: Vec<MeasurementPoint> = match target {
            ClearTarget::All => std::mem::take(&mut self.points),
            ClearTarget::Point(id) => {
                let idx = self
                    .points
                    .iter()
                    .position(|p| &p.id == id)
                    .ok_or_else(|| MeasurementError::UnknownPoint(id.clone()))?;
                vec![self.points.remove(idx)]
            }
        };
        for marker in removed.iter().filter_map(|p| p.marker) {
            scene.remove_marker(marker);
        }
        Ok(removed.len())
    }

    /// Remove every point and distance line; returns the number of markers removed.
    pub fn clear_measurements(&mut self, scene: &mut dyn SceneAccess) -> usize {
        let markers: Vec<MarkerHandle> = self
            .points
            .drain(..)
            .filter_map(|p| p.marker)
            .chain(self.lines.drain(..))
            .collect();
        markers
            .into_iter()
            .filter(|&m| scene.remove_marker(m))
            .count()
    }

    /// Tear down the session, removing every marker it placed.
    pub fn end(mut self, scene: &mut dyn SceneAccess) -> usize {
        self.clear_measurements(scene)
    }

    fn confirmed_position(&self, id: &str) -> Result<DVec3, MeasurementError> {
        let point = self
            .point(id)
            .ok_or_else(|| MeasurementError::UnknownPoint(id.to_string()))?;
        match (point.confirmed, point.world_position) {
            (true, Some(p)) => Ok(p),
            _ => Err(MeasurementError::PointNotConfirmed(id.to_string())),
        }
    }
}

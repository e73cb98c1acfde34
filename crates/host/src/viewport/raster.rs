//! Flat-shaded software rasterizer for offscreen views.
//!
//! Produces tightly packed RGBA8 rows, top row first.

use glam::DVec3;

use super::camera::{Camera, NEAR_PLANE};
use super::mesh::TriMesh;

const BASE_COLOR: [f64; 3] = [0.6, 0.6, 0.65];
const AMBIENT: f64 = 0.3;
/// Half-size in pixels of a point marker square
const MARKER_RADIUS: i64 = 3;
/// Line markers are cut slightly beyond the projection near plane
const LINE_NEAR: f64 = 2.0 * NEAR_PLANE;

/// RGBA8 frame with a depth buffer
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    depth: Vec<f64>,
}

impl Frame {
    pub fn new(width: u32, height: u32, background: [u8; 4]) -> Self {
        let count = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(count * 4);
        for _ in 0..count {
            pixels.extend_from_slice(&background);
        }
        Self {
            width,
            height,
            pixels,
            depth: vec![f64::INFINITY; count],
        }
    }

    fn put(&mut self, x: i64, y: i64, depth: f64, color: [u8; 4]) {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return;
        }
        let idx = y as usize * self.width as usize + x as usize;
        if depth > self.depth[idx] {
            return;
        }
        self.depth[idx] = depth;
        self.pixels[idx * 4..idx * 4 + 4].copy_from_slice(&color);
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ]
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Rasterize a mesh with lambert shading against the view direction.
    pub fn draw_mesh(&mut self, camera: &Camera, mesh: &TriMesh) {
        let aspect = self.width.max(1) as f64 / self.height.max(1) as f64;
        let view_dir = camera.forward();
        let (w, h) = (self.width as f64, self.height as f64);

        for [a, b, c] in mesh.triangles() {
            let normal = (b - a).cross(c - a).normalize_or_zero();
            let shade = AMBIENT + (1.0 - AMBIENT) * normal.dot(view_dir).abs();
            let color = [
                (BASE_COLOR[0] * shade * 255.0) as u8,
                (BASE_COLOR[1] * shade * 255.0) as u8,
                (BASE_COLOR[2] * shade * 255.0) as u8,
                255,
            ];

            // Triangles touching the near plane are skipped rather than clipped
            let (Some(pa), Some(pb), Some(pc)) = (
                camera.project(a, aspect),
                camera.project(b, aspect),
                camera.project(c, aspect),
            ) else {
                continue;
            };
            let s = [
                (pa.0 * w, pa.1 * h, pa.2),
                (pb.0 * w, pb.1 * h, pb.2),
                (pc.0 * w, pc.1 * h, pc.2),
            ];

            let area = edge(s[0], s[1], s[2].0, s[2].1);
            if area.abs() < 1e-12 {
                continue;
            }

            let min_x = s.iter().map(|p| p.0).fold(f64::INFINITY, f64::min).floor().max(0.0) as i64;
            let max_x = s.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max).ceil().min(w - 1.0) as i64;
            let min_y = s.iter().map(|p| p.1).fold(f64::INFINITY, f64::min).floor().max(0.0) as i64;
            let max_y = s.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max).ceil().min(h - 1.0) as i64;

            for y in min_y..=max_y {
                for x in min_x..=max_x {
                    let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
                    let w0 = edge(s[1], s[2], px, py) / area;
                    let w1 = edge(s[2], s[0], px, py) / area;
                    let w2 = edge(s[0], s[1], px, py) / area;
                    if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                        continue;
                    }
                    let depth = w0 * s[0].2 + w1 * s[1].2 + w2 * s[2].2;
                    self.put(x, y, depth, color);
                }
            }
        }
    }

    /// Draw a square point marker on top of the geometry.
    pub fn draw_point(&mut self, camera: &Camera, position: DVec3, color: [u8; 4]) {
        let Some((x, y)) = self.to_screen(camera, position) else {
            return;
        };
        let r = MARKER_RADIUS as f64;
        if x < -r || y < -r || x > self.width as f64 + r || y > self.height as f64 + r {
            return;
        }
        let (cx, cy) = (x.floor() as i64, y.floor() as i64);
        for dy in -MARKER_RADIUS..=MARKER_RADIUS {
            for dx in -MARKER_RADIUS..=MARKER_RADIUS {
                self.put(cx.saturating_add(dx), cy.saturating_add(dy), f64::NEG_INFINITY, color);
            }
        }
    }

    /// Draw a 1px line marker on top of the geometry. The segment is cut at
    /// the near plane and at the frame border, so the number of steps never
    /// exceeds `width + height`.
    pub fn draw_line(&mut self, camera: &Camera, from: DVec3, to: DVec3, color: [u8; 4]) {
        let Some((from, to)) = clip_to_near(camera, from, to) else {
            return;
        };
        let (Some(a), Some(b)) = (self.to_screen(camera, from), self.to_screen(camera, to)) else {
            return;
        };
        let Some((a, b)) = clip_to_rect(a, b, self.width as f64, self.height as f64) else {
            return;
        };

        let steps = (b.0 - a.0).abs().max((b.1 - a.1).abs()).ceil().max(1.0) as i64;
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let x = a.0 + (b.0 - a.0) * t;
            let y = a.1 + (b.1 - a.1) * t;
            self.put(x.floor() as i64, y.floor() as i64, f64::NEG_INFINITY, color);
        }
    }

    /// Screen position in pixels, unclamped
    fn to_screen(&self, camera: &Camera, point: DVec3) -> Option<(f64, f64)> {
        let aspect = self.width.max(1) as f64 / self.height.max(1) as f64;
        let (nx, ny, _) = camera.project(point, aspect)?;
        let (x, y) = (nx * self.width as f64, ny * self.height as f64);
        (x.is_finite() && y.is_finite()).then_some((x, y))
    }
}

/// Keep the part of a segment at least `LINE_NEAR` in front of the eye.
fn clip_to_near(camera: &Camera, a: DVec3, b: DVec3) -> Option<(DVec3, DVec3)> {
    let (da, db) = (camera.view_depth(a), camera.view_depth(b));
    match (da >= LINE_NEAR, db >= LINE_NEAR) {
        (true, true) => Some((a, b)),
        (true, false) => Some((a, a + (b - a) * ((da - LINE_NEAR) / (da - db)))),
        (false, true) => Some((b + (a - b) * ((db - LINE_NEAR) / (db - da)), b)),
        (false, false) => None,
    }
}

/// Liang-Barsky clip of a screen segment to `[0, w] x [0, h]`.
fn clip_to_rect(a: (f64, f64), b: (f64, f64), w: f64, h: f64) -> Option<((f64, f64), (f64, f64))> {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [(-dx, a.0), (dx, w - a.0), (-dy, a.1), (dy, h - a.1)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((
        (a.0 + t0 * dx, a.1 + t0 * dy),
        (a.0 + t1 * dx, a.1 + t1 * dy),
    ))
}

fn edge(a: (f64, f64, f64), b: (f64, f64, f64), px: f64, py: f64) -> f64 {
    (b.0 - a.0) * (py - a.1) - (b.1 - a.1) * (px - a.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::CameraPose;

    const BG: [u8; 4] = [0, 0, 0, 255];

    fn front_camera() -> Camera {
        Camera::from_pose(&CameraPose::looking_at([0.5, -10.0, 0.5], [0.5, 0.0, 0.5])).unwrap()
    }

    #[test]
    fn test_background_fill() {
        let frame = Frame::new(4, 3, [10, 20, 30, 255]);
        assert_eq!(frame.pixels.len(), 4 * 3 * 4);
        assert_eq!(frame.pixel(3, 2), [10, 20, 30, 255]);
    }

    #[test]
    fn test_box_covers_center_not_corner() {
        let mut frame = Frame::new(64, 48, BG);
        let mesh = TriMesh::cuboid(DVec3::ZERO, DVec3::ONE);
        frame.draw_mesh(&front_camera(), &mesh);
        assert_ne!(frame.pixel(32, 24), BG);
        assert_eq!(frame.pixel(0, 0), BG);
    }

    #[test]
    fn test_point_marker_drawn_over_mesh() {
        let mut frame = Frame::new(64, 48, BG);
        let cam = front_camera();
        frame.draw_mesh(&cam, &TriMesh::cuboid(DVec3::ZERO, DVec3::ONE));
        frame.draw_point(&cam, DVec3::new(0.5, 0.0, 0.5), [255, 0, 255, 255]);
        assert_eq!(frame.pixel(32, 24), [255, 0, 255, 255]);
    }

    const LINE: [u8; 4] = [255, 255, 0, 255];

    fn eye_camera() -> Camera {
        Camera::from_pose(&CameraPose::looking_at([0.0, -100.0, 0.0], [0.0, 0.0, 0.0])).unwrap()
    }

    /// Whether column `x` has `color` in any row near `y`
    fn column_has(frame: &Frame, x: u32, y: u32, color: [u8; 4]) -> bool {
        (y.saturating_sub(2)..=(y + 2).min(frame.height - 1)).any(|row| frame.pixel(x, row) == color)
    }

    #[test]
    fn test_line_across_view() {
        let mut frame = Frame::new(160, 120, BG);
        let cam = eye_camera();
        frame.draw_line(&cam, DVec3::new(-10.0, 0.0, 0.0), DVec3::new(10.0, 0.0, 0.0), LINE);
        assert!(column_has(&frame, 80, 60, LINE));
        assert!(column_has(&frame, 70, 60, LINE));
        assert!(!column_has(&frame, 10, 60, LINE));
    }

    #[test]
    fn test_line_ending_at_eye_plane_is_clipped() {
        let mut frame = Frame::new(160, 120, BG);
        let cam = eye_camera();
        frame.draw_line(&cam, DVec3::ZERO, DVec3::new(10.0, -100.0 + 1e-7, 0.0), LINE);
        assert!(column_has(&frame, 120, 60, LINE));
        assert!(column_has(&frame, 159, 60, LINE));
        assert!(!column_has(&frame, 40, 60, LINE));
    }

    #[test]
    fn test_line_behind_camera_not_drawn() {
        let mut frame = Frame::new(32, 24, BG);
        let cam = eye_camera();
        frame.draw_line(&cam, DVec3::new(0.0, -200.0, 0.0), DVec3::new(5.0, -150.0, 0.0), LINE);
        assert!(frame.pixels.chunks(4).all(|p| p == BG));
    }

    #[test]
    fn test_line_outside_frame_not_drawn() {
        let mut frame = Frame::new(32, 24, BG);
        let cam = eye_camera();
        frame.draw_line(&cam, DVec3::new(1e6, 0.0, 1e6), DVec3::new(2e6, 0.0, 1e6), LINE);
        assert!(frame.pixels.chunks(4).all(|p| p == BG));
    }

    #[test]
    fn test_point_far_off_screen_ignored() {
        let mut frame = Frame::new(32, 24, BG);
        let cam = eye_camera();
        frame.draw_point(&cam, DVec3::new(1e12, -100.0 + 0.11, 0.0), LINE);
        frame.draw_point(&cam, DVec3::new(-1e12, -100.0 + 0.11, -1e12), LINE);
        assert!(frame.pixels.chunks(4).all(|p| p == BG));
    }
}

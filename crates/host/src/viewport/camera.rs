use glam::{DMat4, DVec3};
use shared::CameraPose;

use super::picking::Ray;
use crate::scene::SceneError;

/// Closest view depth that still projects
pub const NEAR_PLANE: f64 = 0.1;
const FAR_PLANE: f64 = 100_000.0;

/// Pixel dimensions of the (virtual) 3D view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f64 {
        self.width.max(1) as f64 / self.height.max(1) as f64
    }
}

/// Look-at perspective camera
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub eye: DVec3,
    pub target: DVec3,
    pub up: DVec3,
    /// Vertical field of view (radians)
    pub fov: f64,
}

impl Camera {
    /// Validate and convert a wire pose. Rejects a zero view direction, an
    /// up vector parallel to it, and a field of view outside (0°, 180°).
    pub fn from_pose(pose: &CameraPose) -> Result<Self, SceneError> {
        let eye = DVec3::from_array(pose.eye);
        let target = DVec3::from_array(pose.target);
        let up = DVec3::from_array(pose.up);

        if !(eye.is_finite() && target.is_finite() && up.is_finite()) {
            return Err(SceneError::InvalidCamera("non-finite coordinates".into()));
        }
        let forward = target - eye;
        if forward.length_squared() < 1e-12 {
            return Err(SceneError::InvalidCamera("eye and target coincide".into()));
        }
        if forward.normalize().cross(up.normalize_or_zero()).length_squared() < 1e-12 {
            return Err(SceneError::InvalidCamera(
                "up vector is parallel to the view direction".into(),
            ));
        }
        if !(pose.fov_degrees > 0.0 && pose.fov_degrees < 180.0) {
            return Err(SceneError::InvalidCamera(format!(
                "field of view {} out of range",
                pose.fov_degrees
            )));
        }

        Ok(Self {
            eye,
            target,
            up: up.normalize(),
            fov: pose.fov_degrees.to_radians(),
        })
    }

    pub fn to_pose(&self) -> CameraPose {
        CameraPose {
            eye: self.eye.to_array(),
            target: self.target.to_array(),
            up: self.up.to_array(),
            fov_degrees: self.fov.to_degrees(),
        }
    }

    /// View matrix (world -> camera)
    pub fn view_matrix(&self) -> DMat4 {
        DMat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// Projection matrix (camera -> clip)
    pub fn projection_matrix(&self, aspect: f64) -> DMat4 {
        DMat4::perspective_rh_gl(self.fov, aspect, NEAR_PLANE, FAR_PLANE)
    }

    /// Combined view-projection matrix
    pub fn view_projection(&self, aspect: f64) -> DMat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    pub fn forward(&self) -> DVec3 {
        (self.target - self.eye).normalize_or_zero()
    }

    /// Distance of `point` in front of the eye, measured along the view axis
    pub fn view_depth(&self, point: DVec3) -> f64 {
        (point - self.eye).dot(self.forward())
    }

    /// Project a world point to normalized viewport coordinates
    /// (0..1, origin top-left) plus NDC depth. None when the point is
    /// closer than the near plane or behind the camera.
    pub fn project(&self, point: DVec3, aspect: f64) -> Option<(f64, f64, f64)> {
        let clip = self.view_projection(aspect) * point.extend(1.0);
        if !(clip.w >= NEAR_PLANE) {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        Some(((ndc.x + 1.0) * 0.5, (1.0 - ndc.y) * 0.5, ndc.z))
    }

    /// Cast a ray from a normalized viewport position (0..1, origin top-left)
    /// into the 3D scene.
    pub fn viewport_ray(&self, nx: f64, ny: f64, aspect: f64) -> Ray {
        let ndc_x = nx * 2.0 - 1.0;
        let ndc_y = 1.0 - ny * 2.0;

        let vp_inv = self.view_projection(aspect).inverse();
        let near = vp_inv.project_point3(DVec3::new(ndc_x, ndc_y, -1.0));
        let far = vp_inv.project_point3(DVec3::new(ndc_x, ndc_y, 1.0));

        Ray::new(self.eye, far - near)
    }
}

impl Default for Camera {
    fn default() -> Self {
        let pose = CameraPose::default();
        Self {
            eye: DVec3::from_array(pose.eye),
            target: DVec3::from_array(pose.target),
            up: DVec3::from_array(pose.up),
            fov: pose.fov_degrees.to_radians(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn front_camera() -> Camera {
        Camera::from_pose(&CameraPose::looking_at([0.0, -100.0, 0.0], [0.0, 0.0, 0.0])).unwrap()
    }

    #[test]
    fn test_center_ray_points_at_target() {
        let cam = front_camera();
        let ray = cam.viewport_ray(0.5, 0.5, 4.0 / 3.0);
        assert!((ray.direction - DVec3::Y).length() < 1e-9);
        assert_eq!(ray.origin, cam.eye);
    }

    #[test]
    fn test_right_and_up_mapping() {
        let cam = front_camera();
        let right = cam.viewport_ray(0.75, 0.5, 1.0);
        assert!(right.direction.x > 0.0);
        let top = cam.viewport_ray(0.5, 0.25, 1.0);
        assert!(top.direction.z > 0.0);
    }

    #[test]
    fn test_project_inverts_ray() {
        let cam = front_camera();
        let aspect = 800.0 / 600.0;
        let ray = cam.viewport_ray(0.3, 0.7, aspect);
        let (x, y, _) = cam.project(ray.at(50.0), aspect).unwrap();
        assert!((x - 0.3).abs() < 1e-9);
        assert!((y - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_project_rejects_points_inside_near_plane() {
        let cam = front_camera();
        assert!(cam.project(DVec3::new(10.0, -100.0 + 1e-7, 0.0), 1.0).is_none());
        assert!(cam.project(DVec3::new(0.0, -150.0, 0.0), 1.0).is_none());
        assert!((cam.view_depth(DVec3::new(3.0, -40.0, 7.0)) - 60.0).abs() < 1e-12);
        assert!(cam.project(DVec3::new(0.0, -100.0 + 2.0 * NEAR_PLANE, 0.0), 1.0).is_some());
    }

    #[test]
    fn test_invalid_poses_rejected() {
        let same = CameraPose::looking_at([1.0, 1.0, 1.0], [1.0, 1.0, 1.0]);
        assert!(Camera::from_pose(&same).is_err());

        let parallel = CameraPose::looking_at([0.0, 0.0, 100.0], [0.0, 0.0, 0.0]);
        assert!(Camera::from_pose(&parallel).is_err());

        let mut wide = CameraPose::default();
        wide.fov_degrees = 180.0;
        assert!(Camera::from_pose(&wide).is_err());
    }

    #[test]
    fn test_pose_round_trip() {
        let pose = CameraPose::looking_at([10.0, -50.0, 30.0], [0.0, 0.0, 5.0]);
        let cam = Camera::from_pose(&pose).unwrap();
        let back = cam.to_pose();
        assert!((back.fov_degrees - 45.0).abs() < 1e-9);
        assert_eq!(back.eye, pose.eye);
    }
}

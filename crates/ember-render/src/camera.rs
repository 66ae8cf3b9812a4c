//! Camera and view management.
//!
//! Projection convention: right-handed view space, Vulkan clip space (depth
//! 0..1, +Y down). The Y flip lives in [`Camera::projection_matrix`] and
//! nowhere else, so model matrices stay in a Y-up world.

use glam::{Mat4, Vec3};

/// Degrees the demo camera orbits per frame.
pub const ORBIT_DEGREES_PER_FRAME: f32 = 0.2;

/// Camera for rendering.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 5.0),
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_2,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 200.0,
        }
    }
}

impl Camera {
    /// Create a new camera looking at `target`.
    pub fn new(position: Vec3, target: Vec3, fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            direction: (target - position).normalize(),
            up: Vec3::Y,
            fov,
            aspect,
            near,
            far,
        }
    }

    /// Set the aspect ratio from a framebuffer size. Zero heights are ignored.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.direction, self.up)
    }

    /// Perspective projection into Vulkan clip space.
    pub fn projection_matrix(&self) -> Mat4 {
        let mut projection = Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far);
        projection.y_axis.y *= -1.0;
        projection
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// View-projection for a camera carried around the world Y axis by
    /// `frame_number` orbit steps, starting from this camera's pose.
    pub fn orbit_view_projection(&self, frame_number: u64) -> Mat4 {
        let angle = (frame_number as f64 * f64::from(ORBIT_DEGREES_PER_FRAME)).to_radians();
        // Wrap before narrowing so long runs keep full precision
        let angle = angle.rem_euclid(std::f64::consts::TAU) as f32;

        let camera_to_world = Mat4::from_rotation_y(angle)
            * Mat4::look_to_rh(self.position, self.direction, self.up).inverse();
        self.projection_matrix() * camera_to_world.inverse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    #[test]
    fn projection_flips_y_only() {
        let camera = Camera::default();
        let flipped = camera.projection_matrix();
        let plain = Mat4::perspective_rh(camera.fov, camera.aspect, camera.near, camera.far);

        assert_relative_eq!(flipped.y_axis.y, -plain.y_axis.y);
        assert_relative_eq!(flipped.x_axis.x, plain.x_axis.x);
        assert_relative_eq!(flipped.z_axis.z, plain.z_axis.z);
    }

    #[test]
    fn point_above_center_lands_in_upper_half() {
        let camera = Camera::new(Vec3::ZERO, Vec3::NEG_Z, 1.0, 1.0, 0.1, 100.0);
        let clip = camera.view_projection_matrix() * Vec4::new(0.0, 1.0, -5.0, 1.0);

        // Vulkan NDC has +Y pointing down
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn depth_maps_near_to_zero_far_to_one() {
        let camera = Camera::new(Vec3::ZERO, Vec3::NEG_Z, 1.0, 1.0, 0.1, 100.0);
        let vp = camera.view_projection_matrix();

        let near = vp * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = vp * Vec4::new(0.0, 0.0, -100.0, 1.0);

        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn orbit_frame_zero_is_the_static_view() {
        let camera = Camera::default();
        let orbit = camera.orbit_view_projection(0);
        let fixed = camera.view_projection_matrix();

        assert!(orbit.abs_diff_eq(fixed, 1e-5));
    }

    #[test]
    fn orbit_returns_after_a_full_turn() {
        let camera = Camera::default();
        // 360 / 0.2 frames per revolution
        let turn = 1800;

        assert!(camera
            .orbit_view_projection(turn)
            .abs_diff_eq(camera.orbit_view_projection(0), 1e-4));
        assert!(!camera
            .orbit_view_projection(turn / 2)
            .abs_diff_eq(camera.orbit_view_projection(0), 1e-2));
    }

    #[test]
    fn viewport_sets_aspect() {
        let mut camera = Camera::default();
        camera.set_viewport(800, 400);
        assert_relative_eq!(camera.aspect, 2.0);

        camera.set_viewport(800, 0);
        assert_relative_eq!(camera.aspect, 2.0);
    }
}

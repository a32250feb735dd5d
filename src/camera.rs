//! 2D camera: a fixed orthographic projection and a look-at view from a movable position.

use cgmath::{Matrix4, Point3, Vector2, Vector3};

use crate::config::CameraConfig;

/// Maps OpenGL clip space (z in -1..1) onto wgpu's (z in 0..1).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

const FORWARD: Vector3<f32> = Vector3::new(0.0, 0.0, -1.0);
const UP: Vector3<f32> = Vector3::new(0.0, 1.0, 0.0);

/// A 2D camera looking down the negative z axis at a fixed orthographic
/// volume.
#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vector2<f32>,
    projection: Matrix4<f32>,
    view: Matrix4<f32>,
    config: CameraConfig,
}

impl Camera {
    pub fn new(position: Vector2<f32>) -> Self {
        Self::with_config(position, CameraConfig::default())
    }

    pub fn with_config(position: Vector2<f32>, config: CameraConfig) -> Self {
        let mut camera = Self {
            position,
            projection: Matrix4::from_scale(1.0),
            view: Matrix4::from_scale(1.0),
            config,
        };
        camera.adjust_projection();
        camera
    }

    /// Rebuilds the projection from the configured viewport. Idempotent.
    pub fn adjust_projection(&mut self) {
        let c = &self.config;
        self.projection = OPENGL_TO_WGPU_MATRIX
            * cgmath::ortho(0.0, c.viewport_width, 0.0, c.viewport_height, c.near, c.far);
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        self.projection
    }

    /// Recomputes the look-at transform from the current position.
    pub fn view_matrix(&mut self) -> Matrix4<f32> {
        let eye = Point3::new(self.position.x, self.position.y, self.config.depth);
        let target = Point3::new(self.position.x, self.position.y, 0.0) + FORWARD;
        self.view = Matrix4::look_at_rh(eye, target, UP);
        self.view
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.position += Vector2::new(dx, dy);
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: CameraConfig) {
        self.config = config;
        self.adjust_projection();
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vector2::new(0.0, 0.0))
    }
}

//! Engine settings with sensible defaults.

/// Window collaborator settings.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 960,
            height: 640,
            title: "Game engine".to_string(),
            vsync: true,
        }
    }
}

/// The fixed orthographic volume and eye distance of the camera.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CameraConfig {
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub near: f32,
    pub far: f32,
    /// Distance of the eye in front of the z = 0 plane.
    pub depth: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            viewport_width: 640.0,
            viewport_height: 480.0,
            near: 0.0,
            far: 100.0,
            depth: 20.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub camera: CameraConfig,
    pub clear_colour: wgpu::Color,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            camera: CameraConfig::default(),
            clear_colour: wgpu::Color {
                r: 0.5,
                g: 0.5,
                b: 0.5,
                a: 1.0,
            },
        }
    }
}

impl EngineConfig {
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window.width = width;
        self.window.height = height;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.window.title = title.into();
        self
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.window.vsync = vsync;
        self
    }

    pub fn with_camera(mut self, camera: CameraConfig) -> Self {
        self.camera = camera;
        self
    }

    pub fn with_clear_colour(mut self, clear_colour: wgpu::Color) -> Self {
        self.clear_colour = clear_colour;
        self
    }
}

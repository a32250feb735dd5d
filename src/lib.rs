//! pixel-ngin
//!
//! A minimal 2D rendering runtime: named entities hold components, and a
//! scene draws one textured quad through a fixed shader/camera pipeline
//! every frame before handing `update` to its entities.
//!
//! High-level modules
//! - `camera`: orthographic projection and look-at view from a 2D position
//! - `config`: window, camera and clear colour settings
//! - `context`: the wgpu implementation of the device boundary
//! - `data_structures`: entities and components, vertex layout, textures
//! - `device`: the GL-style `RenderDevice` boundary every draw goes through
//! - `flow`: the render loop and the `run` entry point
//! - `input`: keyboard and mouse state handed to components
//! - `pipelines`: WGSL compilation, reflection and pipeline state
//! - `recording`: an in-memory device that records calls for tests
//! - `resources`: file loading and image decoding
//! - `scene`: the start/update lifecycle tying everything together
//! - `window`: the winit window the loop polls
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod device;
pub mod error;
pub mod flow;
pub mod input;
pub mod pipelines;
pub mod recording;
pub mod resources;
pub mod scene;
pub mod window;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath::*;
pub use winit::event::MouseButton;
pub use winit::keyboard::KeyCode;

pub use error::RenderError;

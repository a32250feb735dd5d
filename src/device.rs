//! The GPU binding boundary.
//!
//! [`RenderDevice`] is a small immediate-mode surface shaped after the classic
//! bind-then-draw model: one current program, one current vertex array, one
//! texture per texture unit. Every method mutates that single global binding
//! context, so call order matters and all calls must happen on the thread
//! that owns the device.
//!
//! Two implementations ship with the crate:
//! - [`crate::context::Context`] drives a real GPU through wgpu
//! - [`crate::recording::RecordingDevice`] logs calls for tests

use std::fmt;

use crate::{error::RenderError, pipelines::reflect::ProgramLayout};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);
    };
}

handle!(
    /// A compiled, not yet linked, shader stage.
    ShaderId
);
handle!(
    /// A linked shader program.
    ProgramId
);
handle!(TextureId);
handle!(BufferId);
handle!(VertexArrayId);
handle!(
    /// Index of a uniform inside a program's [`ProgramLayout`].
    UniformLocation
);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferTarget {
    /// Per-vertex attribute data.
    Vertex,
    /// Triangle connectivity, `u32` indices.
    Index,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Primitive {
    Triangles,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn channels(&self) -> u8 {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }

    /// Maps a decoded channel count to an uploadable format.
    pub fn from_channels(channels: u8) -> Option<Self> {
        match channels {
            3 => Some(PixelFormat::Rgb8),
            4 => Some(PixelFormat::Rgba8),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WrapMode {
    Repeat,
    ClampToEdge,
    MirroredRepeat,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Sampling state of a texture.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SamplerParams {
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
}

impl SamplerParams {
    /// Repeating, unfiltered sampling for pixel art.
    pub const PIXEL_ART: SamplerParams = SamplerParams {
        wrap_s: WrapMode::Repeat,
        wrap_t: WrapMode::Repeat,
        min_filter: FilterMode::Nearest,
        mag_filter: FilterMode::Nearest,
    };
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self::PIXEL_ART
    }
}

/// One float vertex attribute inside the currently bound vertex buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    /// Number of `f32` components, 1 to 4.
    pub components: u32,
    /// Distance between consecutive vertices, in bytes.
    pub stride: u32,
    /// Offset of the first component inside one vertex, in bytes.
    pub offset: u32,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum UniformValue {
    /// Column-major 4x4 matrix.
    Mat4([[f32; 4]; 4]),
    Float(f32),
    /// Integers double as texture unit indices for texture uniforms.
    Int(i32),
}

/// Tightly packed pixel rows, bottom row first.
#[derive(Copy, Clone, Debug)]
pub struct ImageData<'a> {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: &'a [u8],
}

pub trait RenderDevice {
    fn create_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, RenderError>;

    /// Optional shader features this device supports. Sources are validated
    /// against these on the host before they reach [`RenderDevice::create_shader`].
    fn shader_capabilities(&self) -> naga::valid::Capabilities;

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        layout: &ProgramLayout,
    ) -> Result<ProgramId, RenderError>;

    fn use_program(&mut self, program: Option<ProgramId>);

    /// Writes to the currently bound program. Writes without a bound program,
    /// or to a location the program does not have, are ignored.
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    fn delete_shader(&mut self, shader: ShaderId);

    fn delete_program(&mut self, program: ProgramId);

    fn create_texture(&mut self) -> TextureId;

    fn active_texture(&mut self, unit: u32);

    /// Binds to the active texture unit.
    fn bind_texture(&mut self, texture: Option<TextureId>);

    /// Applies to the texture bound on the active unit.
    fn set_sampler_params(&mut self, params: SamplerParams) -> Result<(), RenderError>;

    /// Applies to the texture bound on the active unit.
    fn upload_texture(&mut self, image: ImageData<'_>) -> Result<(), RenderError>;

    fn delete_texture(&mut self, texture: TextureId);

    fn create_vertex_array(&mut self) -> VertexArrayId;

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>);

    /// Generates, binds and fills a static buffer. Index buffers are attached
    /// to the bound vertex array.
    fn create_buffer(
        &mut self,
        target: BufferTarget,
        contents: &[u8],
    ) -> Result<BufferId, RenderError>;

    /// Records `attribute` in the bound vertex array, sourcing it from the
    /// currently bound vertex buffer.
    fn vertex_attrib_pointer(&mut self, attribute: VertexAttribute) -> Result<(), RenderError>;

    fn enable_vertex_attrib(&mut self, location: u32);

    fn disable_vertex_attrib(&mut self, location: u32);

    fn delete_buffer(&mut self, buffer: BufferId);

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId);

    /// Draws `count` indices from the bound vertex array's index buffer.
    fn draw_indexed(&mut self, primitive: Primitive, count: u32) -> Result<(), RenderError>;

    /// Clears the colour buffer. The first clear of a frame opens it.
    fn clear(&mut self, colour: wgpu::Color) -> Result<(), RenderError>;

    /// Presents the frame opened by [`RenderDevice::clear`].
    fn present(&mut self) -> Result<(), RenderError>;

    fn resize(&mut self, width: u32, height: u32);
}

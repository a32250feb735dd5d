//! Error type shared by every rendering stage.
//!
//! Failures are never recovered inside the engine. They travel up to whoever
//! owns the render loop, which decides whether to abort or substitute.

use std::path::PathBuf;

use crate::device::ShaderStage;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("error compiling {stage} shader:\n{log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    #[error("error linking shader program:\n{log}")]
    ShaderLink { log: String },

    /// A previous compile or link attempt failed; the shader cannot be used.
    #[error("shader program failed to build earlier and cannot be used")]
    ShaderUnusable,

    #[error("failed to load image {}: {source}", path.display())]
    TextureLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("unknown texture format in {}: {channels} channel(s)", path.display())]
    UnsupportedFormat { path: PathBuf, channels: u8 },

    #[error("asset not found: {}", path.display())]
    AssetNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("scene updated before start()")]
    SceneNotStarted,

    #[error("scene started twice")]
    SceneAlreadyStarted,

    /// A binding precondition was violated (nothing bound, unknown handle, ...).
    #[error("invalid GPU state: {0}")]
    InvalidState(String),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("no usable graphics adapter: {0}")]
    Adapter(String),

    #[error("window error: {0}")]
    Window(String),
}

impl RenderError {
    /// The stage a diagnostic belongs to, for operator-facing messages.
    pub fn stage(&self) -> &'static str {
        match self {
            RenderError::ShaderCompile { .. } | RenderError::ShaderUnusable => "compile",
            RenderError::ShaderLink { .. } => "link",
            RenderError::TextureLoad { .. }
            | RenderError::UnsupportedFormat { .. }
            | RenderError::AssetNotFound { .. }
            | RenderError::Io(_) => "load",
            RenderError::SceneNotStarted | RenderError::SceneAlreadyStarted => "lifecycle",
            RenderError::InvalidState(_) => "draw",
            RenderError::Surface(_) | RenderError::Adapter(_) | RenderError::Window(_) => {
                "platform"
            }
        }
    }
}

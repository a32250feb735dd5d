//! GPU textures loaded from image files.

use std::path::{Path, PathBuf};

use crate::{
    device::{PixelFormat, RenderDevice, SamplerParams, TextureId},
    error::RenderError,
    resources::texture::{DecodedImage, decode_image},
};

/// One GPU texture holding the pixels of exactly one image file.
///
/// The decoded pixels only live on the host for the duration of
/// [`Texture::load`]; afterwards the GPU copy is the only one.
#[derive(Debug)]
pub struct Texture {
    pub path: PathBuf,
    id: TextureId,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl Texture {
    /// Decodes `path` and uploads it with repeat wrapping and nearest
    /// filtering. Any failure is fatal for this texture; there is no
    /// fallback image.
    pub fn load(device: &mut dyn RenderDevice, path: impl AsRef<Path>) -> Result<Self, RenderError> {
        Self::load_with(device, path, SamplerParams::PIXEL_ART)
    }

    /// Like [`Texture::load`], with explicit wrap and filter modes.
    pub fn load_with(
        device: &mut dyn RenderDevice,
        path: impl AsRef<Path>,
        sampler: SamplerParams,
    ) -> Result<Self, RenderError> {
        let decoded = decode_image(path.as_ref())?;
        Self::from_decoded(device, decoded, sampler)
    }

    pub fn from_decoded(
        device: &mut dyn RenderDevice,
        decoded: DecodedImage,
        sampler: SamplerParams,
    ) -> Result<Self, RenderError> {
        let id = device.create_texture();
        device.bind_texture(Some(id));

        let uploaded = device
            .set_sampler_params(sampler)
            .and_then(|_| device.upload_texture(decoded.as_image_data()));
        if let Err(err) = uploaded {
            device.bind_texture(None);
            device.delete_texture(id);
            return Err(err);
        }

        log::debug!(
            "uploaded {} ({}x{}, {:?}) as {:?}",
            decoded.path.display(),
            decoded.width,
            decoded.height,
            decoded.format,
            id
        );
        let texture = Self {
            path: decoded.path.clone(),
            id,
            width: decoded.width,
            height: decoded.height,
            format: decoded.format,
        };
        drop(decoded);
        Ok(texture)
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Binds to the active texture unit.
    pub fn bind(&self, device: &mut dyn RenderDevice) {
        device.bind_texture(Some(self.id));
    }

    pub fn unbind(&self, device: &mut dyn RenderDevice) {
        device.bind_texture(None);
    }

    pub fn release(self, device: &mut dyn RenderDevice) {
        device.delete_texture(self.id);
    }
}

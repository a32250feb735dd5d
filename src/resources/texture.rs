use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::{
    device::{ImageData, PixelFormat},
    error::RenderError,
    resources::load_binary,
};

/// Host-side pixels ready for upload.
///
/// Rows are stored bottom row first so that texture coordinate (0, 0) lands
/// on the image's bottom-left corner.
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn as_image_data(&self) -> ImageData<'_> {
        ImageData {
            width: self.width,
            height: self.height,
            format: self.format,
            pixels: &self.pixels,
        }
    }
}

/// Decodes an image file, flipping it vertically.
///
/// Only 3- and 4-channel images are accepted; anything else is an
/// [`RenderError::UnsupportedFormat`].
pub fn decode_image(path: impl AsRef<Path>) -> Result<DecodedImage, RenderError> {
    let path = path.as_ref();
    let bytes = load_binary(path)?;
    let img = image::load_from_memory(&bytes).map_err(|source| RenderError::TextureLoad {
        path: path.to_path_buf(),
        source,
    })?;
    from_dynamic(path, img)
}

pub(crate) fn from_dynamic(path: &Path, img: DynamicImage) -> Result<DecodedImage, RenderError> {
    let channels = img.color().channel_count();
    let format = PixelFormat::from_channels(channels).ok_or_else(|| RenderError::UnsupportedFormat {
        path: path.to_path_buf(),
        channels,
    })?;

    let img = img.flipv();
    let (width, height) = (img.width(), img.height());
    let pixels = match format {
        PixelFormat::Rgb8 => img.into_rgb8().into_raw(),
        PixelFormat::Rgba8 => img.into_rgba8().into_raw(),
    };

    Ok(DecodedImage {
        path: path.to_path_buf(),
        width,
        height,
        format,
        pixels,
    })
}

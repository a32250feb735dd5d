use pixel_ngin::{
    RenderError,
    data_structures::texture::Texture,
    device::{FilterMode, PixelFormat, SamplerParams, WrapMode},
    recording::{GpuCall, RecordingDevice},
};

use crate::common::test_utils::{write_gray_png, write_rgb_png, write_rgba_png};

mod common;

#[test]
fn rgb_image_loads_with_pixel_art_sampling() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rgb_png(dir.path(), "rgb.png", 8, 4);
    let mut device = RecordingDevice::new();

    let texture = Texture::load(&mut device, &path).unwrap();

    assert_eq!(texture.format(), PixelFormat::Rgb8);
    assert_eq!(texture.size(), (8, 4));
    assert_eq!(device.texture_size(texture.id()), Some((8, 4)));
    assert_eq!(
        device.sampler_params(texture.id()),
        Some(SamplerParams::PIXEL_ART)
    );
    assert!(device.calls().contains(&GpuCall::UploadTexture {
        texture: texture.id(),
        width: 8,
        height: 4,
        format: PixelFormat::Rgb8,
    }));
}

#[test]
fn sampler_modes_can_be_chosen_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rgba_png(dir.path(), "ui.png", 4, 4, [200, 200, 200, 255]);
    let mut device = RecordingDevice::new();
    let smooth = SamplerParams {
        wrap_s: WrapMode::ClampToEdge,
        wrap_t: WrapMode::MirroredRepeat,
        min_filter: FilterMode::Linear,
        mag_filter: FilterMode::Linear,
    };

    let texture = Texture::load_with(&mut device, &path, smooth).unwrap();

    assert_eq!(device.sampler_params(texture.id()), Some(smooth));
    assert!(device.calls().contains(&GpuCall::SetSamplerParams {
        texture: texture.id(),
        params: smooth,
    }));
}

#[test]
fn rgba_image_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rgba_png(dir.path(), "rgba.png", 2, 2, [10, 20, 30, 40]);
    let mut device = RecordingDevice::new();

    let texture = Texture::load(&mut device, &path).unwrap();

    assert_eq!(texture.format(), PixelFormat::Rgba8);
    assert_eq!(texture.path, path);
    assert_eq!(device.live_textures(), 1);
}

#[test]
fn grayscale_image_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_gray_png(dir.path(), "gray.png", 4, 4);
    let mut device = RecordingDevice::new();

    match Texture::load(&mut device, &path) {
        Err(RenderError::UnsupportedFormat { channels, .. }) => assert_eq!(channels, 1),
        other => panic!("expected an unsupported format, got {other:?}"),
    }
    assert_eq!(device.live_textures(), 0);
}

#[test]
fn missing_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut device = RecordingDevice::new();
    let err = Texture::load(&mut device, dir.path().join("missing.png")).unwrap_err();
    assert!(matches!(err, RenderError::AssetNotFound { .. }), "{err}");
    assert_eq!(err.stage(), "load");
}

#[test]
fn undecodable_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.png");
    std::fs::write(&path, b"definitely not a png").unwrap();
    let mut device = RecordingDevice::new();

    let err = Texture::load(&mut device, &path).unwrap_err();
    assert!(matches!(err, RenderError::TextureLoad { .. }), "{err}");
    assert_eq!(device.live_textures(), 0);
}

#[test]
fn release_deletes_the_texture() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rgba_png(dir.path(), "rgba.png", 1, 1, [0, 0, 0, 255]);
    let mut device = RecordingDevice::new();
    let texture = Texture::load(&mut device, &path).unwrap();
    let id = texture.id();

    texture.release(&mut device);

    assert_eq!(device.live_textures(), 0);
    assert_eq!(device.calls().last(), Some(&GpuCall::DeleteTexture(id)));
}

#[cfg(feature = "integration-tests")]
mod common;

#[cfg(feature = "integration-tests")]
fn render_one_frame(clear: wgpu::Color, texel: [u8; 4]) -> image::RgbaImage {
    use pixel_ngin::{context::Context, flow::RenderLoop};

    use crate::common::test_utils::{ScriptedWindow, sprite_scene};

    let dir = tempfile::tempdir().unwrap();
    let mut ctx = futures::executor::block_on(Context::headless(640, 480)).unwrap();
    let mut scene = sprite_scene(&mut ctx, dir.path(), texel);
    let mut window = ScriptedWindow::new(1);
    RenderLoop::new(clear)
        .run(&mut window, &mut ctx, &mut scene)
        .unwrap();
    let pixels = ctx.read_pixels().unwrap();
    scene.release(&mut ctx);
    pixels
}

#[test]
#[cfg(feature = "integration-tests")]
fn should_render_clear_colour_around_the_quad() {
    let pixels = render_one_frame(wgpu::Color::WHITE, [255, 0, 0, 255]);

    assert_eq!(pixels.dimensions(), (640, 480));
    // The quad covers the bottom-left 100x100 world units only.
    assert_eq!(*pixels.get_pixel(320, 100), image::Rgba([255, 255, 255, 255]));
    assert_eq!(*pixels.get_pixel(639, 0), image::Rgba([255, 255, 255, 255]));
    assert_eq!(*pixels.get_pixel(200, 430), image::Rgba([255, 255, 255, 255]));
}

#[test]
#[cfg(feature = "integration-tests")]
fn should_render_textured_quad_bottom_left() {
    let pixels = render_one_frame(wgpu::Color::BLACK, [255, 0, 0, 255]);

    for (x, y) in [(5, 475), (50, 430), (95, 385)] {
        assert_eq!(
            *pixels.get_pixel(x, y),
            image::Rgba([255, 0, 0, 255]),
            "pixel ({x}, {y})"
        );
    }
    assert_eq!(*pixels.get_pixel(150, 430), image::Rgba([0, 0, 0, 255]));
}

use pixel_ngin::{
    KeyCode, RenderError,
    data_structures::entity::Entity,
    flow::RenderLoop,
    recording::{GpuCall, RecordingDevice},
};

use crate::common::test_utils::{Recorder, ScriptedWindow, sprite_scene};

mod common;

const GREY: wgpu::Color = wgpu::Color {
    r: 0.5,
    g: 0.5,
    b: 0.5,
    a: 1.0,
};

#[test]
fn loop_starts_once_and_updates_every_frame() {
    let dir = tempfile::tempdir().unwrap();
    let mut device = RecordingDevice::new();
    let mut scene = sprite_scene(&mut device, dir.path(), [255, 255, 255, 255]);
    let (recorder, log) = Recorder::new();
    let mut entity = Entity::new("player");
    entity.add_component(recorder);
    scene.add_entity(entity);

    let mut window = ScriptedWindow::new(3);
    let mut render_loop = RenderLoop::new(GREY);
    render_loop.run(&mut window, &mut device, &mut scene).unwrap();

    let log = log.borrow();
    assert_eq!(log.starts, 1);
    assert_eq!(log.updates.len(), 3);
    assert_eq!(log.updates[0], 0.0);
    assert!(log.updates.iter().all(|dt| *dt >= 0.0));
    assert_eq!(device.frames_presented(), 3);
    assert_eq!(device.draws().len(), 3);
    assert_eq!(render_loop.timer().frames(), 3);
}

#[test]
fn each_frame_clears_draws_then_presents() {
    let dir = tempfile::tempdir().unwrap();
    let mut device = RecordingDevice::new();
    let mut scene = sprite_scene(&mut device, dir.path(), [255, 255, 255, 255]);
    scene.start(&mut device).unwrap();
    device.take_calls();

    let mut window = ScriptedWindow::new(2);
    RenderLoop::new(GREY)
        .run(&mut window, &mut device, &mut scene)
        .unwrap();

    let frame_calls: Vec<&GpuCall> = device
        .calls()
        .iter()
        .filter(|call| {
            matches!(
                call,
                GpuCall::Clear(_) | GpuCall::DrawIndexed { .. } | GpuCall::Present
            )
        })
        .collect();
    assert_eq!(frame_calls.len(), 6);
    for frame in frame_calls.chunks(3) {
        assert_eq!(frame[0], &GpuCall::Clear(GREY));
        assert!(matches!(frame[1], GpuCall::DrawIndexed { count: 6, .. }));
        assert_eq!(frame[2], &GpuCall::Present);
    }
}

#[test]
fn resizes_reach_the_device() {
    let dir = tempfile::tempdir().unwrap();
    let mut device = RecordingDevice::new();
    let mut scene = sprite_scene(&mut device, dir.path(), [255, 255, 255, 255]);

    let mut window = ScriptedWindow::new(3).resize_on(1, (800, 600));
    RenderLoop::new(GREY)
        .run(&mut window, &mut device, &mut scene)
        .unwrap();

    let resizes: Vec<_> = device
        .calls()
        .iter()
        .filter(|call| matches!(call, GpuCall::Resize { .. }))
        .collect();
    assert_eq!(
        resizes,
        [&GpuCall::Resize {
            width: 800,
            height: 600
        }]
    );
}

#[test]
fn components_see_polled_input() {
    let dir = tempfile::tempdir().unwrap();
    let mut device = RecordingDevice::new();
    let mut scene = sprite_scene(&mut device, dir.path(), [255, 255, 255, 255]);
    let (recorder, log) = Recorder::new();
    let mut entity = Entity::new("player");
    entity.add_component(recorder);
    scene.add_entity(entity);

    let mut window = ScriptedWindow::new(3).press_on(1, KeyCode::Space);
    let mut render_loop = RenderLoop::new(GREY);
    render_loop.run(&mut window, &mut device, &mut scene).unwrap();

    assert_eq!(log.borrow().space_held, [false, true, true]);
    assert!(render_loop.input().is_key_pressed(KeyCode::Space));
    assert_eq!(window.polls(), 3);
}

#[test]
fn start_failure_ends_the_loop_before_any_frame() {
    let dir = tempfile::tempdir().unwrap();
    let mut device = RecordingDevice::new();
    let mut scene = sprite_scene(&mut device, dir.path(), [255, 255, 255, 255]);
    device.fail_next_link("no");

    let mut window = ScriptedWindow::new(5);
    let err = RenderLoop::new(GREY)
        .run(&mut window, &mut device, &mut scene)
        .unwrap_err();

    assert!(matches!(err, RenderError::ShaderLink { .. }), "{err}");
    assert_eq!(device.frames_presented(), 0);
    assert_eq!(window.polls(), 0);
}

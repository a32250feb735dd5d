use pixel_ngin::{
    RenderError,
    data_structures::entity::Entity,
    device::{BufferTarget, Primitive, UniformValue},
    input::InputState,
    recording::{GpuCall, RecordingDevice},
    scene::{PROJECTION_UNIFORM, TEXTURE_UNIFORM, VIEW_UNIFORM},
};

use crate::common::test_utils::{Recorder, sprite_scene};

mod common;

fn label(call: &GpuCall) -> Option<String> {
    Some(match call {
        GpuCall::UseProgram(Some(_)) => return None,
        GpuCall::UseProgram(None) => "unbind program".to_string(),
        GpuCall::SetUniform { name, .. } => format!("uniform {name}"),
        GpuCall::ActiveTexture(unit) => format!("active texture {unit}"),
        GpuCall::BindTexture {
            unit,
            texture: Some(_),
        } => format!("bind texture {unit}"),
        GpuCall::BindVertexArray(Some(_)) => "bind vertex array".to_string(),
        GpuCall::BindVertexArray(None) => "unbind vertex array".to_string(),
        GpuCall::EnableVertexAttrib(location) => format!("enable {location}"),
        GpuCall::DisableVertexAttrib(location) => format!("disable {location}"),
        GpuCall::DrawIndexed { count, .. } => format!("draw {count}"),
        other => format!("{other:?}"),
    })
}

#[test]
fn one_update_draws_the_quad_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut device = RecordingDevice::new();
    let mut scene = sprite_scene(&mut device, dir.path(), [255, 0, 0, 255]);
    scene.start(&mut device).unwrap();

    scene
        .update(&mut device, 0.016, &InputState::new())
        .unwrap();

    assert_eq!(device.draws().len(), 1);
    let draw = &device.draws()[0];
    assert_eq!(draw.primitive, Primitive::Triangles);
    assert_eq!(draw.count, 6);
    assert_eq!(draw.triangles(), 2);
    assert_eq!(draw.enabled_attributes, [0, 1, 2]);
    assert_eq!(draw.textures.get(&0), Some(&scene.texture().id()));
    assert_eq!(draw.uniforms.get(TEXTURE_UNIFORM), Some(&UniformValue::Int(0)));
    assert!(matches!(
        draw.uniforms.get(PROJECTION_UNIFORM),
        Some(UniformValue::Mat4(_))
    ));
    assert!(matches!(
        draw.uniforms.get(VIEW_UNIFORM),
        Some(UniformValue::Mat4(_))
    ));

    let vao = scene.vertex_array().unwrap();
    assert!(device.enabled_attributes(vao).is_empty());
    assert_eq!(device.bound_vertex_array(), None);
    assert_eq!(device.current_program(), None);
}

#[test]
fn update_binds_in_a_fixed_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut device = RecordingDevice::new();
    let mut scene = sprite_scene(&mut device, dir.path(), [0, 0, 255, 255]);
    scene.start(&mut device).unwrap();
    device.take_calls();

    scene.update(&mut device, 0.0, &InputState::new()).unwrap();

    let calls = device.take_calls();
    assert_eq!(calls.first(), Some(&GpuCall::UseProgram(scene.shader().program())));
    let labels: Vec<String> = calls.iter().filter_map(label).collect();
    assert_eq!(
        labels,
        [
            "uniform uniform_texture",
            "active texture 0",
            "bind texture 0",
            "uniform uniform_projection_matrix",
            "uniform uniform_view_matrix",
            "bind vertex array",
            "enable 0",
            "enable 1",
            "enable 2",
            "draw 6",
            "disable 0",
            "disable 1",
            "disable 2",
            "unbind vertex array",
            "unbind program",
        ]
    );
}

#[test]
fn start_uploads_the_interleaved_quad() {
    let dir = tempfile::tempdir().unwrap();
    let mut device = RecordingDevice::new();
    let mut scene = sprite_scene(&mut device, dir.path(), [0, 255, 0, 255]);
    scene.start(&mut device).unwrap();

    let buffers: Vec<(BufferTarget, usize)> = device
        .calls()
        .iter()
        .filter_map(|call| match call {
            GpuCall::CreateBuffer { target, len, .. } => Some((*target, *len)),
            _ => None,
        })
        .collect();
    assert_eq!(buffers, [(BufferTarget::Vertex, 4 * 36), (BufferTarget::Index, 6 * 4)]);

    let pointers: Vec<(u32, u32, u32, u32)> = device
        .calls()
        .iter()
        .filter_map(|call| match call {
            GpuCall::VertexAttribPointer { attribute, .. } => Some((
                attribute.location,
                attribute.components,
                attribute.stride,
                attribute.offset,
            )),
            _ => None,
        })
        .collect();
    assert_eq!(pointers, [(0, 3, 36, 0), (1, 4, 36, 12), (2, 2, 36, 28)]);
    assert!(scene.is_started());
}

#[test]
fn update_before_start_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut device = RecordingDevice::new();
    let mut scene = sprite_scene(&mut device, dir.path(), [0, 0, 0, 255]);

    let err = scene
        .update(&mut device, 0.016, &InputState::new())
        .unwrap_err();
    assert!(matches!(err, RenderError::SceneNotStarted), "{err}");
    assert!(device.draws().is_empty());
}

#[test]
fn starting_twice_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut device = RecordingDevice::new();
    let mut scene = sprite_scene(&mut device, dir.path(), [0, 0, 0, 255]);
    scene.start(&mut device).unwrap();
    assert!(matches!(
        scene.start(&mut device),
        Err(RenderError::SceneAlreadyStarted)
    ));
}

#[test]
fn entities_start_once_and_update_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut device = RecordingDevice::new();
    let mut scene = sprite_scene(&mut device, dir.path(), [0, 0, 0, 255]);

    let (early, early_log) = Recorder::new();
    let mut entity = Entity::new("early");
    entity.add_component(early);
    scene.add_entity(entity);
    scene.start(&mut device).unwrap();
    assert_eq!(early_log.borrow().starts, 1);

    let (late, late_log) = Recorder::new();
    let mut entity = Entity::new("late");
    entity.add_component(late);
    scene.add_entity(entity);
    assert_eq!(late_log.borrow().starts, 1);

    scene.update(&mut device, 0.016, &InputState::new()).unwrap();
    scene.update(&mut device, 0.5, &InputState::new()).unwrap();

    assert_eq!(early_log.borrow().starts, 1);
    assert_eq!(early_log.borrow().updates, [0.016, 0.5]);
    assert_eq!(late_log.borrow().updates, [0.016, 0.5]);
    assert_eq!(
        early_log.borrow().owner,
        scene.entity("early").map(|e| e.id())
    );
}

#[test]
fn failed_link_leaves_no_gpu_objects_behind() {
    let dir = tempfile::tempdir().unwrap();
    let mut device = RecordingDevice::new();
    let mut scene = sprite_scene(&mut device, dir.path(), [0, 0, 0, 255]);
    device.fail_next_link("varying mismatch");

    match scene.start(&mut device) {
        Err(RenderError::ShaderLink { log }) => assert_eq!(log, "varying mismatch"),
        other => panic!("expected a link error, got {other:?}"),
    }
    assert!(!scene.is_started());
    assert_eq!(device.live_shaders(), 0);
    assert_eq!(device.live_vertex_arrays(), 0);
    assert_eq!(device.live_buffers(), 0);

    // The failure is terminal for the shader.
    assert!(matches!(
        scene.start(&mut device),
        Err(RenderError::ShaderUnusable)
    ));
}

#[test]
fn failed_draw_still_updates_entities_and_unbinds() {
    let dir = tempfile::tempdir().unwrap();
    let mut device = RecordingDevice::new();
    let mut scene = sprite_scene(&mut device, dir.path(), [0, 0, 0, 255]);
    let (recorder, log) = Recorder::new();
    let mut entity = Entity::new("player");
    entity.add_component(recorder);
    scene.add_entity(entity);
    scene.start(&mut device).unwrap();
    device.take_calls();
    device.fail_next_draw("device lost");

    match scene.update(&mut device, 0.25, &InputState::new()) {
        Err(RenderError::InvalidState(message)) => assert_eq!(message, "device lost"),
        other => panic!("expected the draw error, got {other:?}"),
    }

    assert!(device.draws().is_empty());
    assert_eq!(log.borrow().updates, [0.25]);
    assert_eq!(device.calls().last(), Some(&GpuCall::UseProgram(None)));
    assert_eq!(device.current_program(), None);
    assert_eq!(device.bound_vertex_array(), None);
    let vao = scene.vertex_array().unwrap();
    assert!(device.enabled_attributes(vao).is_empty());

    scene.update(&mut device, 0.016, &InputState::new()).unwrap();
    assert_eq!(device.draws().len(), 1);
}

#[test]
fn release_deletes_every_gpu_object() {
    let dir = tempfile::tempdir().unwrap();
    let mut device = RecordingDevice::new();
    let mut scene = sprite_scene(&mut device, dir.path(), [0, 0, 0, 255]);
    scene.start(&mut device).unwrap();
    scene.update(&mut device, 0.016, &InputState::new()).unwrap();
    assert_eq!(device.live_programs(), 1);
    assert_eq!(device.live_textures(), 1);
    assert_eq!(device.live_buffers(), 2);
    assert_eq!(device.live_vertex_arrays(), 1);

    scene.release(&mut device);

    assert_eq!(device.live_programs(), 0);
    assert_eq!(device.live_textures(), 0);
    assert_eq!(device.live_buffers(), 0);
    assert_eq!(device.live_vertex_arrays(), 0);
}

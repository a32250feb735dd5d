use pixel_ngin::{
    RenderError,
    device::{ShaderStage, UniformValue},
    pipelines::shader::{Shader, ShaderSource},
    recording::{GpuCall, RecordingDevice},
};

fn broken_vertex() -> ShaderSource {
    let sprite = ShaderSource::sprite();
    let vertex = sprite
        .vertex
        .replace("out.uv_coords = input.uv_coords;", "out.uv_coords = input.uv_coords");
    ShaderSource::new("broken vertex", vertex, sprite.fragment)
}

#[test]
fn sprite_program_compiles_and_drops_its_stages() {
    let mut device = RecordingDevice::new();
    let mut shader = Shader::new(ShaderSource::sprite());
    shader.compile(&mut device).unwrap();

    assert!(shader.program().is_some());
    assert!(!shader.is_failed());
    assert_eq!(device.live_programs(), 1);
    assert_eq!(device.live_shaders(), 0);

    // Compiling again keeps the program.
    let program = shader.program();
    shader.compile(&mut device).unwrap();
    assert_eq!(shader.program(), program);
    assert_eq!(device.live_programs(), 1);
}

#[test]
fn missing_semicolon_names_the_failing_stage() {
    let mut device = RecordingDevice::new();
    let mut shader = Shader::new(broken_vertex());
    match shader.compile(&mut device) {
        Err(RenderError::ShaderCompile { stage, log }) => {
            assert_eq!(stage, ShaderStage::Vertex);
            assert!(!log.is_empty());
        }
        other => panic!("expected a vertex compile error, got {other:?}"),
    }
    // Host-side validation fails before anything reaches the device.
    assert!(device.calls().is_empty());

    let sprite = ShaderSource::sprite();
    let fragment = sprite.fragment.replace("input.uv_coords);", "input.uv_coords)");
    let mut shader = Shader::new(ShaderSource::new("broken fragment", sprite.vertex, fragment));
    let err = shader.compile(&mut device).unwrap_err();
    assert!(
        matches!(
            err,
            RenderError::ShaderCompile {
                stage: ShaderStage::Fragment,
                ..
            }
        ),
        "{err}"
    );
    assert_eq!(err.stage(), "compile");
}

#[test]
fn compile_failure_is_terminal() {
    let mut device = RecordingDevice::new();
    let mut shader = Shader::new(broken_vertex());
    assert!(shader.compile(&mut device).is_err());
    assert!(shader.is_failed());
    assert!(matches!(
        shader.compile(&mut device),
        Err(RenderError::ShaderUnusable)
    ));
    assert_eq!(shader.program(), None);
}

#[test]
fn link_failure_reports_the_linker_log() {
    let mut device = RecordingDevice::new();
    device.fail_next_link("interface mismatch");
    let mut shader = Shader::new(ShaderSource::sprite());

    let err = shader.compile(&mut device).unwrap_err();
    assert_eq!(err.stage(), "link");
    assert!(err.to_string().contains("interface mismatch"), "{err}");
    assert!(shader.is_failed());
    assert_eq!(device.live_shaders(), 0);
    assert_eq!(device.live_programs(), 0);
}

#[test]
fn unknown_uniforms_are_ignored() {
    let mut device = RecordingDevice::new();
    let mut shader = Shader::new(ShaderSource::sprite());
    shader.compile(&mut device).unwrap();
    device.take_calls();

    shader.set_float(&mut device, "uniform_does_not_exist", 1.0);

    assert!(
        !device
            .calls()
            .iter()
            .any(|call| matches!(call, GpuCall::SetUniform { .. }))
    );
}

fn tinted_sprite() -> ShaderSource {
    let sprite = ShaderSource::sprite();
    let fragment = sprite
        .fragment
        .replace(
            "struct FragmentInput",
            "@group(2) @binding(0)\nvar<uniform> uniform_brightness: f32;\n\nstruct FragmentInput",
        )
        .replace(
            "return textureSample(uniform_texture, uniform_texture_sampler, input.uv_coords);",
            "return uniform_brightness * textureSample(uniform_texture, uniform_texture_sampler, input.uv_coords);",
        );
    ShaderSource::new("tinted sprite", sprite.vertex, fragment)
}

#[test]
fn float_uniforms_reach_the_device() {
    let mut device = RecordingDevice::new();
    let mut shader = Shader::new(tinted_sprite());
    shader.compile(&mut device).unwrap();
    let program = shader.program().unwrap();
    device.take_calls();

    shader.set_float(&mut device, "uniform_brightness", 0.75);

    assert_eq!(
        device.uniform(program, "uniform_brightness"),
        Some(UniformValue::Float(0.75))
    );
    assert_eq!(
        device.calls(),
        [
            GpuCall::UseProgram(Some(program)),
            GpuCall::SetUniform {
                program,
                name: "uniform_brightness".to_string(),
                value: UniformValue::Float(0.75),
            },
        ]
    );
}

#[test]
fn mismatched_setter_writes_nothing() {
    let mut device = RecordingDevice::new();
    let mut shader = Shader::new(tinted_sprite());
    shader.compile(&mut device).unwrap();
    let program = shader.program().unwrap();

    shader.set_matrix4(
        &mut device,
        "uniform_brightness",
        &cgmath::Matrix4::from_scale(2.0),
    );

    assert_eq!(device.uniform(program, "uniform_brightness"), None);
}

#[test]
fn setters_rebind_their_program() {
    let mut device = RecordingDevice::new();
    let mut shader = Shader::new(ShaderSource::sprite());
    shader.compile(&mut device).unwrap();
    shader.unbind(&mut device);
    assert_eq!(device.current_program(), None);

    shader.set_matrix4(
        &mut device,
        "uniform_view_matrix",
        &cgmath::Matrix4::from_scale(2.0),
    );

    let program = shader.program().unwrap();
    assert_eq!(device.current_program(), Some(program));
    assert!(device.uniform(program, "uniform_view_matrix").is_some());
}

#[test]
fn sources_are_read_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let sprite = ShaderSource::sprite();
    let vertex = dir.path().join("sprite.vert.wgsl");
    let fragment = dir.path().join("sprite.frag.wgsl");
    std::fs::write(&vertex, sprite.vertex.as_bytes()).unwrap();
    std::fs::write(&fragment, sprite.fragment.as_bytes()).unwrap();

    let loaded = ShaderSource::from_files(&vertex, &fragment).unwrap();
    assert_eq!(loaded.vertex, sprite.vertex);
    assert_eq!(loaded.fragment, sprite.fragment);

    let missing = ShaderSource::from_files(dir.path().join("nope.wgsl"), &fragment);
    assert!(matches!(missing, Err(RenderError::AssetNotFound { .. })));
}

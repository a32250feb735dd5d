/// Builds the fixed-function state every program is drawn with: triangle
/// lists, no culling, no depth test. `layout: None` derives the bind group
/// layouts from the shaders.
pub fn mk_render_pipeline(
    device: &wgpu::Device,
    layout: Option<&wgpu::PipelineLayout>,
    color_format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    vertex_layouts: &[wgpu::VertexBufferLayout],
    vertex: (&wgpu::ShaderModule, &str),
    fragment: (&wgpu::ShaderModule, &str),
) -> wgpu::RenderPipeline {
    let (vertex_module, vertex_entry) = vertex;
    let (fragment_module, fragment_entry) = fragment;

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some("Render Pipeline"),
        layout,
        vertex: wgpu::VertexState {
            module: vertex_module,
            entry_point: Some(vertex_entry),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment_module,
            entry_point: Some(fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // Quads are not wound consistently.
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview_mask: None,
    })
}

pub fn vertex_format(components: u32) -> Option<wgpu::VertexFormat> {
    match components {
        1 => Some(wgpu::VertexFormat::Float32),
        2 => Some(wgpu::VertexFormat::Float32x2),
        3 => Some(wgpu::VertexFormat::Float32x3),
        4 => Some(wgpu::VertexFormat::Float32x4),
        _ => None,
    }
}

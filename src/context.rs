//! The wgpu implementation of [`RenderDevice`].
//!
//! wgpu has no global binding state, so `Context` keeps the GL-style state
//! itself (current program, bound vertex array, textures per unit) and turns
//! each `draw_indexed` into one render pass over the current frame:
//!
//! 1. pending uniform writes are copied into the program's uniform buffers
//! 2. a pipeline for (program, enabled vertex layout) is fetched or built
//! 3. bind groups are assembled from the uniform buffers and bound textures
//! 4. the pass loads the frame, draws, and stores it again
//!
//! Uniform copies are recorded in the same encoder as the draws, so a write
//! is only visible to draws issued after it.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    iter,
    sync::Arc,
};

use instant::Duration;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    device::{
        BufferId, BufferTarget, FilterMode, ImageData, PixelFormat, Primitive,
        ProgramId, RenderDevice, SamplerParams, ShaderId, ShaderStage, TextureId,
        UniformLocation, UniformValue, VertexArrayId, VertexAttribute, WrapMode,
    },
    error::RenderError,
    pipelines::{
        basic::{mk_render_pipeline, vertex_format},
        reflect::{ProgramLayout, UniformKind},
    },
};

pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

enum Target {
    Surface {
        window: Arc<Window>,
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
        width: u32,
        height: u32,
    },
}

struct Frame {
    encoder: wgpu::CommandEncoder,
    view: wgpu::TextureView,
    surface_texture: Option<wgpu::SurfaceTexture>,
    /// The surface is reconfigured once this frame is presented.
    reconfigure: bool,
}

/// What the surface handed out when asked for its next texture.
#[derive(Debug)]
enum Acquired<T> {
    Success(T),
    Suboptimal(T),
    Timeout,
    Occluded,
    Outdated,
    Lost,
    Validation,
}

impl From<wgpu::CurrentSurfaceTexture> for Acquired<wgpu::SurfaceTexture> {
    fn from(current: wgpu::CurrentSurfaceTexture) -> Self {
        match current {
            wgpu::CurrentSurfaceTexture::Success(texture) => Acquired::Success(texture),
            wgpu::CurrentSurfaceTexture::Suboptimal(texture) => Acquired::Suboptimal(texture),
            wgpu::CurrentSurfaceTexture::Timeout => Acquired::Timeout,
            wgpu::CurrentSurfaceTexture::Occluded => Acquired::Occluded,
            wgpu::CurrentSurfaceTexture::Outdated => Acquired::Outdated,
            wgpu::CurrentSurfaceTexture::Lost => Acquired::Lost,
            wgpu::CurrentSurfaceTexture::Validation => Acquired::Validation,
        }
    }
}

#[derive(Debug, PartialEq)]
enum FramePlan<T> {
    Draw { texture: T, reconfigure: bool },
    Skip { reconfigure: bool },
}

fn plan_frame<T>(acquired: Acquired<T>) -> Result<FramePlan<T>, RenderError> {
    match acquired {
        Acquired::Success(texture) => Ok(FramePlan::Draw {
            texture,
            reconfigure: false,
        }),
        Acquired::Suboptimal(texture) => Ok(FramePlan::Draw {
            texture,
            reconfigure: true,
        }),
        Acquired::Outdated | Acquired::Lost => Ok(FramePlan::Skip { reconfigure: true }),
        // Minimised windows time out or report occlusion until restored.
        Acquired::Timeout | Acquired::Occluded => Ok(FramePlan::Skip { reconfigure: false }),
        Acquired::Validation => Err(RenderError::Surface(
            "validation error while acquiring the next surface texture".into(),
        )),
    }
}

struct GpuShader {
    stage: ShaderStage,
    module: wgpu::ShaderModule,
}

struct GpuProgram {
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    layout: ProgramLayout,
    uniform_buffers: HashMap<UniformLocation, wgpu::Buffer>,
    /// Writes not yet copied into `uniform_buffers`.
    staged: BTreeMap<UniformLocation, Vec<u8>>,
    texture_units: HashMap<UniformLocation, u32>,
}

struct GpuTexture {
    sampler: wgpu::Sampler,
    image: Option<(wgpu::Texture, wgpu::TextureView)>,
}

struct GpuBuffer {
    target: BufferTarget,
    buffer: wgpu::Buffer,
}

#[derive(Default)]
struct VertexArrayState {
    index_buffer: Option<BufferId>,
    pointers: BTreeMap<u32, (BufferId, VertexAttribute)>,
    enabled: BTreeSet<u32>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct BufferLayoutKey {
    stride: u32,
    /// (location, components, offset)
    attributes: Vec<(u32, u32, u32)>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: ProgramId,
    format: wgpu::TextureFormat,
    buffers: Vec<BufferLayoutKey>,
}

pub struct Context {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    target: Target,
    format: wgpu::TextureFormat,
    capabilities: naga::valid::Capabilities,

    next_id: u32,
    shaders: HashMap<ShaderId, GpuShader>,
    programs: HashMap<ProgramId, GpuProgram>,
    textures: HashMap<TextureId, GpuTexture>,
    buffers: HashMap<BufferId, GpuBuffer>,
    vertex_arrays: HashMap<VertexArrayId, VertexArrayState>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    current_program: Option<ProgramId>,
    active_unit: u32,
    units: BTreeMap<u32, TextureId>,
    bound_vertex_array: Option<VertexArrayId>,
    bound_vertex_buffer: Option<BufferId>,

    frame: Option<Frame>,
    /// Set when the surface could not hand out a texture; draws until the
    /// next `present` are dropped.
    skipping_frame: bool,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("format", &self.format)
            .field("size", &self.size())
            .field("programs", &self.programs.len())
            .field("textures", &self.textures.len())
            .field("buffers", &self.buffers.len())
            .finish()
    }
}

impl Context {
    /// Creates a context presenting to `window`.
    pub async fn new(window: Arc<Window>, vsync: bool) -> Result<Self, RenderError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| RenderError::Window(e.to_string()))?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::Adapter(e.to_string()))?;
        let (device, queue) = request_device(&adapter).await?;
        let capabilities = shader_capabilities(
            device.features(),
            adapter.get_downlevel_capabilities().flags,
        );

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| RenderError::Adapter("surface supports no formats".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!(
            "wgpu context on {} ({:?}), surface {:?} {}x{}",
            adapter.get_info().name,
            adapter.get_info().backend,
            format,
            config.width,
            config.height
        );

        Ok(Self::with_target(
            device,
            queue,
            Target::Surface {
                window,
                surface,
                config,
            },
            format,
            capabilities,
        ))
    }

    /// Creates a context rendering into an off-screen texture that can be
    /// read back with [`Context::read_pixels`].
    pub async fn headless(width: u32, height: u32) -> Result<Self, RenderError> {
        Self::offscreen(
            wgpu::InstanceDescriptor {
                backends: wgpu::Backends::PRIMARY,
                ..wgpu::InstanceDescriptor::new_without_display_handle()
            },
            width,
            height,
        )
        .await
    }

    async fn offscreen(
        descriptor: wgpu::InstanceDescriptor,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(descriptor);
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::Adapter(e.to_string()))?;
        let (device, queue) = request_device(&adapter).await?;
        let capabilities = shader_capabilities(
            device.features(),
            adapter.get_downlevel_capabilities().flags,
        );
        let texture = offscreen_texture(&device, width, height);
        Ok(Self::with_target(
            device,
            queue,
            Target::Offscreen {
                texture,
                width,
                height,
            },
            OFFSCREEN_FORMAT,
            capabilities,
        ))
    }

    fn with_target(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target: Target,
        format: wgpu::TextureFormat,
        capabilities: naga::valid::Capabilities,
    ) -> Self {
        Self {
            device,
            queue,
            target,
            format,
            capabilities,
            next_id: 0,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            pipelines: HashMap::new(),
            current_program: None,
            active_unit: 0,
            units: BTreeMap::new(),
            bound_vertex_array: None,
            bound_vertex_buffer: None,
            frame: None,
            skipping_frame: false,
        }
    }

    pub fn window(&self) -> Option<&Arc<Window>> {
        match &self.target {
            Target::Surface { window, .. } => Some(window),
            Target::Offscreen { .. } => None,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        match &self.target {
            Target::Surface { config, .. } => (config.width, config.height),
            Target::Offscreen { width, height, .. } => (*width, *height),
        }
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.format
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Opens a frame if none is open. Returns `false` if the frame is being
    /// skipped.
    fn ensure_frame(&mut self) -> Result<bool, RenderError> {
        if self.frame.is_some() {
            return Ok(true);
        }
        if self.skipping_frame {
            return Ok(false);
        }

        let (view, surface_texture, reconfigure) = match &mut self.target {
            Target::Surface {
                surface, config, ..
            } => match plan_frame(surface.get_current_texture().into())? {
                FramePlan::Draw {
                    texture,
                    reconfigure,
                } => {
                    let view = texture
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default());
                    (view, Some(texture), reconfigure)
                }
                FramePlan::Skip { reconfigure } => {
                    if reconfigure {
                        // Reconfigure the surface if it's lost or outdated
                        surface.configure(&self.device, config);
                        log::warn!("surface lost or outdated; skipping frame");
                    } else {
                        log::debug!("surface has no texture to hand out; skipping frame");
                    }
                    self.skipping_frame = true;
                    return Ok(false);
                }
            },
            Target::Offscreen { texture, .. } => (
                texture.create_view(&wgpu::TextureViewDescriptor::default()),
                None,
                false,
            ),
        };

        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        self.frame = Some(Frame {
            encoder,
            view,
            surface_texture,
            reconfigure,
        });
        Ok(true)
    }

    /// Checks what a draw needs and returns the enabled attribute pointers.
    #[allow(clippy::type_complexity)]
    fn draw_inputs(
        &self,
        count: u32,
    ) -> Result<(ProgramId, BufferId, Vec<(BufferId, VertexAttribute)>), RenderError> {
        let program_id = self
            .current_program
            .ok_or_else(|| RenderError::InvalidState("draw without a bound program".into()))?;
        let program = self
            .programs
            .get(&program_id)
            .ok_or_else(|| RenderError::InvalidState(format!("{program_id:?} was deleted")))?;
        let vao_id = self
            .bound_vertex_array
            .ok_or_else(|| RenderError::InvalidState("draw without a bound vertex array".into()))?;
        let vao = self
            .vertex_arrays
            .get(&vao_id)
            .ok_or_else(|| RenderError::InvalidState(format!("{vao_id:?} was deleted")))?;
        let index_id = vao
            .index_buffer
            .ok_or_else(|| RenderError::InvalidState("vertex array has no index buffer".into()))?;
        let index = self
            .buffers
            .get(&index_id)
            .ok_or_else(|| RenderError::InvalidState(format!("{index_id:?} was deleted")))?;
        if u64::from(count) * 4 > index.buffer.size() {
            return Err(RenderError::InvalidState(format!(
                "draw of {count} indices overruns a {} byte index buffer",
                index.buffer.size()
            )));
        }

        let mut pointers = Vec::with_capacity(vao.enabled.len());
        for location in &vao.enabled {
            let pointer = vao.pointers.get(location).ok_or_else(|| {
                RenderError::InvalidState(format!(
                    "attribute {location} is enabled but has no pointer"
                ))
            })?;
            if !self.buffers.contains_key(&pointer.0) {
                return Err(RenderError::InvalidState(format!(
                    "attribute {location} reads from deleted {:?}",
                    pointer.0
                )));
            }
            pointers.push(*pointer);
        }
        if let Some(missing) = program
            .layout
            .vertex_inputs()
            .iter()
            .find(|loc| !vao.enabled.contains(*loc))
        {
            return Err(RenderError::InvalidState(format!(
                "vertex input {missing} is read by the program but not enabled"
            )));
        }
        Ok((program_id, index_id, pointers))
    }

    fn pipeline(
        &mut self,
        program_id: ProgramId,
        slots: &[((BufferId, u32), Vec<VertexAttribute>)],
    ) -> Result<PipelineKey, RenderError> {
        let key = PipelineKey {
            program: program_id,
            format: self.format,
            buffers: slots
                .iter()
                .map(|((_, stride), attributes)| BufferLayoutKey {
                    stride: *stride,
                    attributes: attributes
                        .iter()
                        .map(|a| (a.location, a.components, a.offset))
                        .collect(),
                })
                .collect(),
        };
        if self.pipelines.contains_key(&key) {
            return Ok(key);
        }

        let program = self
            .programs
            .get(&program_id)
            .ok_or_else(|| RenderError::InvalidState(format!("{program_id:?} was deleted")))?;
        let attributes: Vec<Vec<wgpu::VertexAttribute>> = slots
            .iter()
            .map(|(_, attributes)| {
                attributes
                    .iter()
                    .map(|a| {
                        let format = vertex_format(a.components).ok_or_else(|| {
                            RenderError::InvalidState(format!(
                                "attribute {} has {} components",
                                a.location, a.components
                            ))
                        })?;
                        Ok(wgpu::VertexAttribute {
                            format,
                            offset: u64::from(a.offset),
                            shader_location: a.location,
                        })
                    })
                    .collect::<Result<Vec<_>, RenderError>>()
            })
            .collect::<Result<_, _>>()?;
        let layouts: Vec<wgpu::VertexBufferLayout> = slots
            .iter()
            .zip(&attributes)
            .map(|(((_, stride), _), attributes)| wgpu::VertexBufferLayout {
                array_stride: u64::from(*stride),
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let pipeline = mk_render_pipeline(
            &self.device,
            None,
            self.format,
            Some(wgpu::BlendState::REPLACE),
            &layouts,
            (&program.vertex, program.layout.vertex_entry.as_str()),
            (&program.fragment, program.layout.fragment_entry.as_str()),
        );
        log::debug!(
            "built pipeline for {program_id:?} with {} vertex buffer(s)",
            layouts.len()
        );
        self.pipelines.insert(key.clone(), pipeline);
        Ok(key)
    }

    fn bind_groups(
        &self,
        program: &GpuProgram,
        pipeline: &wgpu::RenderPipeline,
    ) -> Result<Vec<wgpu::BindGroup>, RenderError> {
        let Some(max_group) = program.layout.max_used_group() else {
            return Ok(Vec::new());
        };
        let slots = program.layout.slots();

        let mut groups = Vec::with_capacity(max_group as usize + 1);
        for group in 0..=max_group {
            let mut entries = Vec::new();
            for (idx, slot) in slots.iter().enumerate() {
                if slot.group != group || !slot.used {
                    continue;
                }
                let location = UniformLocation(idx as u32);
                let resource = match slot.kind {
                    UniformKind::Texture => {
                        let unit = program.texture_units.get(&location).copied().unwrap_or(0);
                        let (_, view) = self.texture_on(unit)?.image.as_ref().ok_or_else(|| {
                            RenderError::InvalidState(format!(
                                "texture on unit {unit} has no pixels"
                            ))
                        })?;
                        wgpu::BindingResource::TextureView(view)
                    }
                    UniformKind::Sampler => {
                        // Samplers follow the unit of the texture they are paired with.
                        let unit = slots
                            .iter()
                            .position(|s| s.sampler == Some(location))
                            .and_then(|t| program.texture_units.get(&UniformLocation(t as u32)))
                            .copied()
                            .unwrap_or(0);
                        wgpu::BindingResource::Sampler(&self.texture_on(unit)?.sampler)
                    }
                    _ => program
                        .uniform_buffers
                        .get(&location)
                        .ok_or_else(|| {
                            RenderError::InvalidState(format!("`{}` has no buffer", slot.name))
                        })?
                        .as_entire_binding(),
                };
                entries.push(wgpu::BindGroupEntry {
                    binding: slot.binding,
                    resource,
                });
            }
            groups.push(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("uniform_bind_group"),
                layout: &pipeline.get_bind_group_layout(group),
                entries: &entries,
            }));
        }
        Ok(groups)
    }

    fn texture_on(&self, unit: u32) -> Result<&GpuTexture, RenderError> {
        self.units
            .get(&unit)
            .and_then(|id| self.textures.get(id))
            .ok_or_else(|| RenderError::InvalidState(format!("no texture bound on unit {unit}")))
    }

    fn bound_texture_mut(&mut self) -> Result<&mut GpuTexture, RenderError> {
        let unit = self.active_unit;
        self.units
            .get(&unit)
            .and_then(|id| self.textures.get_mut(id))
            .ok_or_else(|| RenderError::InvalidState(format!("no texture bound on unit {unit}")))
    }

    fn bound_vertex_array_mut(&mut self) -> Option<&mut VertexArrayState> {
        let id = self.bound_vertex_array?;
        self.vertex_arrays.get_mut(&id)
    }

    /// Copies the last presented off-screen frame back to the host.
    pub fn read_pixels(&self) -> Result<image::RgbaImage, RenderError> {
        let Target::Offscreen {
            texture,
            width,
            height,
        } = &self.target
        else {
            return Err(RenderError::InvalidState(
                "read_pixels needs a headless context".into(),
            ));
        };
        let (width, height) = (*width, *height);

        let unpadded_row = 4 * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row = unpadded_row.div_ceil(align) * align;
        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Read-back Buffer"),
            size: u64::from(padded_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Read-back Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(iter::once(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(Duration::from_secs(3)),
            })
            .map_err(|e| RenderError::InvalidState(format!("device poll failed: {e}")))?;
        futures::executor::block_on(rx.receive())
            .ok_or_else(|| RenderError::InvalidState("read-back was cancelled".into()))?
            .map_err(|e| RenderError::InvalidState(format!("read-back failed: {e}")))?;

        let pixels = {
            let data = buffer_slice.get_mapped_range();
            data.chunks(padded_row as usize)
                .flat_map(|row| &row[..unpadded_row as usize])
                .copied()
                .collect::<Vec<u8>>()
        };
        output_buffer.unmap();
        image::RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| RenderError::InvalidState("read-back size mismatch".into()))
    }
}

async fn request_device(
    adapter: &wgpu::Adapter,
) -> Result<(wgpu::Device, wgpu::Queue), RenderError> {
    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("pixel-ngin device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            ..Default::default()
        })
        .await
        .map_err(|e| RenderError::Adapter(e.to_string()))
}

/// Shader features the host validator may accept for this device.
fn shader_capabilities(
    features: wgpu::Features,
    downlevel: wgpu::DownlevelFlags,
) -> naga::valid::Capabilities {
    use naga::valid::Capabilities as Caps;

    let mut caps = Caps::empty();
    caps.set(Caps::FLOAT64, features.contains(wgpu::Features::SHADER_F64));
    caps.set(Caps::SHADER_FLOAT16, features.contains(wgpu::Features::SHADER_F16));
    caps.set(Caps::SHADER_INT64, features.contains(wgpu::Features::SHADER_INT64));
    caps.set(
        Caps::PRIMITIVE_INDEX,
        features.contains(wgpu::Features::PRIMITIVE_INDEX),
    );
    caps.set(Caps::IMMEDIATES, features.contains(wgpu::Features::IMMEDIATES));
    caps.set(Caps::MULTIVIEW, features.contains(wgpu::Features::MULTIVIEW));
    caps.set(
        Caps::DUAL_SOURCE_BLENDING,
        features.contains(wgpu::Features::DUAL_SOURCE_BLENDING),
    );
    caps.set(
        Caps::CLIP_DISTANCE,
        features.contains(wgpu::Features::CLIP_DISTANCES),
    );
    caps.set(
        Caps::MULTISAMPLED_SHADING,
        downlevel.contains(wgpu::DownlevelFlags::MULTISAMPLED_SHADING),
    );
    caps.set(
        Caps::CUBE_ARRAY_TEXTURES,
        downlevel.contains(wgpu::DownlevelFlags::CUBE_ARRAY_TEXTURES),
    );
    caps
}

fn offscreen_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Off-screen Target"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    })
}

fn address_mode(wrap: WrapMode) -> wgpu::AddressMode {
    match wrap {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        WrapMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
    }
}

fn filter_mode(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn create_sampler(device: &wgpu::Device, params: SamplerParams) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("texture_sampler"),
        address_mode_u: address_mode(params.wrap_s),
        address_mode_v: address_mode(params.wrap_t),
        mag_filter: filter_mode(params.mag_filter),
        min_filter: filter_mode(params.min_filter),
        ..Default::default()
    })
}

/// Expands tightly packed RGB to RGBA; wgpu has no 3-channel formats.
fn to_rgba8(image: &ImageData<'_>) -> Vec<u8> {
    match image.format {
        PixelFormat::Rgba8 => image.pixels.to_vec(),
        PixelFormat::Rgb8 => image
            .pixels
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], u8::MAX])
            .collect(),
    }
}

fn uniform_bytes(value: UniformValue) -> Vec<u8> {
    match value {
        UniformValue::Mat4(m) => bytemuck::bytes_of(&m).to_vec(),
        UniformValue::Float(f) => bytemuck::bytes_of(&f).to_vec(),
        UniformValue::Int(i) => bytemuck::bytes_of(&i).to_vec(),
    }
}

/// Uniform buffers are sized in 16 byte steps.
fn uniform_buffer_size(size: u32) -> u64 {
    u64::from(size.max(4).div_ceil(16) * 16)
}

impl RenderDevice for Context {
    fn create_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, RenderError> {
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(match stage {
                    ShaderStage::Vertex => "Vertex Shader",
                    ShaderStage::Fragment => "Fragment Shader",
                }),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        if let Some(error) = futures::executor::block_on(scope.pop()) {
            return Err(RenderError::ShaderCompile {
                stage,
                log: error.to_string(),
            });
        }
        let info = futures::executor::block_on(module.get_compilation_info());
        let errors: Vec<String> = info
            .messages
            .iter()
            .filter(|m| m.message_type == wgpu::CompilationMessageType::Error)
            .map(|m| m.message.clone())
            .collect();
        if !errors.is_empty() {
            return Err(RenderError::ShaderCompile {
                stage,
                log: errors.join("\n"),
            });
        }

        let id = ShaderId(self.next());
        self.shaders.insert(id, GpuShader { stage, module });
        Ok(id)
    }

    fn shader_capabilities(&self) -> naga::valid::Capabilities {
        self.capabilities
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        layout: &ProgramLayout,
    ) -> Result<ProgramId, RenderError> {
        let module = |id: ShaderId, stage: ShaderStage| {
            self.shaders
                .get(&id)
                .filter(|s| s.stage == stage)
                .map(|s| s.module.clone())
                .ok_or_else(|| RenderError::ShaderLink {
                    log: format!("{id:?} is not a live {stage} shader"),
                })
        };
        let vertex = module(vertex, ShaderStage::Vertex)?;
        let fragment = module(fragment, ShaderStage::Fragment)?;

        let uniform_buffers = layout
            .slots()
            .iter()
            .enumerate()
            .filter(|(_, slot)| !matches!(slot.kind, UniformKind::Texture | UniformKind::Sampler))
            .map(|(idx, slot)| {
                let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&slot.name),
                    size: uniform_buffer_size(slot.size),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                (UniformLocation(idx as u32), buffer)
            })
            .collect();

        let id = ProgramId(self.next());
        self.programs.insert(
            id,
            GpuProgram {
                vertex,
                fragment,
                layout: layout.clone(),
                uniform_buffers,
                staged: BTreeMap::new(),
                texture_units: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.current_program = program;
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(program) = self
            .current_program
            .and_then(|id| self.programs.get_mut(&id))
        else {
            return;
        };
        let Some(slot) = program.layout.slot(location) else {
            return;
        };
        match (slot.kind, value) {
            (UniformKind::Texture, UniformValue::Int(unit)) => match u32::try_from(unit) {
                Ok(unit) => {
                    program.texture_units.insert(location, unit);
                }
                Err(_) => log::warn!("negative texture unit {unit} for `{}`", slot.name),
            },
            (UniformKind::Texture | UniformKind::Sampler, _) => {
                log::warn!("`{}` only accepts a texture unit", slot.name)
            }
            (_, value) => {
                let mut bytes = uniform_bytes(value);
                if bytes.len() > slot.size as usize {
                    log::warn!("value too large for `{}`; ignored", slot.name);
                    return;
                }
                bytes.resize(uniform_buffer_size(slot.size) as usize, 0);
                program.staged.insert(location, bytes);
            }
        }
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        self.pipelines.retain(|key, _| key.program != program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn create_texture(&mut self) -> TextureId {
        let id = TextureId(self.next());
        let sampler = create_sampler(&self.device, SamplerParams::default());
        self.textures.insert(
            id,
            GpuTexture {
                sampler,
                image: None,
            },
        );
        id
    }

    fn active_texture(&mut self, unit: u32) {
        self.active_unit = unit;
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        match texture {
            Some(id) => self.units.insert(self.active_unit, id),
            None => self.units.remove(&self.active_unit),
        };
    }

    fn set_sampler_params(&mut self, params: SamplerParams) -> Result<(), RenderError> {
        let sampler = create_sampler(&self.device, params);
        self.bound_texture_mut()?.sampler = sampler;
        Ok(())
    }

    fn upload_texture(&mut self, image: ImageData<'_>) -> Result<(), RenderError> {
        let expected =
            image.width as usize * image.height as usize * image.format.channels() as usize;
        if image.width == 0 || image.height == 0 || image.pixels.len() != expected {
            return Err(RenderError::InvalidState(format!(
                "{}x{} {:?} image with {} bytes cannot be uploaded",
                image.width,
                image.height,
                image.format,
                image.pixels.len()
            )));
        }

        let size = wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            &to_rgba8(&image),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * image.width),
                rows_per_image: Some(image.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.bound_texture_mut()?.image = Some((texture, view));
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.units.retain(|_, bound| *bound != texture);
    }

    fn create_vertex_array(&mut self) -> VertexArrayId {
        let id = VertexArrayId(self.next());
        self.vertex_arrays.insert(id, VertexArrayState::default());
        id
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.bound_vertex_array = vertex_array;
    }

    fn create_buffer(
        &mut self,
        target: BufferTarget,
        contents: &[u8],
    ) -> Result<BufferId, RenderError> {
        if target == BufferTarget::Index && self.bound_vertex_array.is_none() {
            return Err(RenderError::InvalidState(
                "index buffer created without a bound vertex array".into(),
            ));
        }
        let usage = match target {
            BufferTarget::Vertex => wgpu::BufferUsages::VERTEX,
            BufferTarget::Index => wgpu::BufferUsages::INDEX,
        };
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(match target {
                    BufferTarget::Vertex => "Vertex Buffer",
                    BufferTarget::Index => "Index Buffer",
                }),
                contents,
                usage,
            });

        let id = BufferId(self.next());
        self.buffers.insert(id, GpuBuffer { target, buffer });
        match target {
            BufferTarget::Vertex => self.bound_vertex_buffer = Some(id),
            BufferTarget::Index => {
                if let Some(vao) = self.bound_vertex_array_mut() {
                    vao.index_buffer = Some(id);
                }
            }
        }
        Ok(id)
    }

    fn vertex_attrib_pointer(&mut self, attribute: VertexAttribute) -> Result<(), RenderError> {
        let buffer = self
            .bound_vertex_buffer
            .filter(|id| {
                self.buffers
                    .get(id)
                    .is_some_and(|b| b.target == BufferTarget::Vertex)
            })
            .ok_or_else(|| RenderError::InvalidState("no vertex buffer bound".into()))?;
        if vertex_format(attribute.components).is_none() {
            return Err(RenderError::InvalidState(format!(
                "attribute {} has {} components",
                attribute.location, attribute.components
            )));
        }
        let vao = self.bound_vertex_array_mut().ok_or_else(|| {
            RenderError::InvalidState("attribute pointer without a bound vertex array".into())
        })?;
        vao.pointers.insert(attribute.location, (buffer, attribute));
        Ok(())
    }

    fn enable_vertex_attrib(&mut self, location: u32) {
        match self.bound_vertex_array_mut() {
            Some(vao) => {
                vao.enabled.insert(location);
            }
            None => log::warn!("enable of attribute {location} without a bound vertex array"),
        }
    }

    fn disable_vertex_attrib(&mut self, location: u32) {
        if let Some(vao) = self.bound_vertex_array_mut() {
            vao.enabled.remove(&location);
        }
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if let Some(gpu) = self.buffers.remove(&buffer) {
            gpu.buffer.destroy();
        }
        if self.bound_vertex_buffer == Some(buffer) {
            self.bound_vertex_buffer = None;
        }
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.vertex_arrays.remove(&vertex_array);
        if self.bound_vertex_array == Some(vertex_array) {
            self.bound_vertex_array = None;
        }
    }

    fn draw_indexed(&mut self, primitive: Primitive, count: u32) -> Result<(), RenderError> {
        let Primitive::Triangles = primitive;
        let (program_id, index_id, pointers) = self.draw_inputs(count)?;
        if !self.ensure_frame()? {
            return Ok(());
        }

        // One vertex buffer slot per (buffer, stride), attributes in location order.
        let mut slots: BTreeMap<(BufferId, u32), Vec<VertexAttribute>> = BTreeMap::new();
        for (buffer, attribute) in pointers {
            slots
                .entry((buffer, attribute.stride))
                .or_default()
                .push(attribute);
        }
        let slots: Vec<_> = slots.into_iter().collect();
        let key = self.pipeline(program_id, &slots)?;

        // Staged values are consumed by this draw.
        let staged = match self.programs.get_mut(&program_id) {
            Some(program) => std::mem::take(&mut program.staged),
            None => BTreeMap::new(),
        };
        let program = self
            .programs
            .get(&program_id)
            .ok_or_else(|| RenderError::InvalidState(format!("{program_id:?} was deleted")))?;
        let pipeline = self
            .pipelines
            .get(&key)
            .ok_or_else(|| RenderError::InvalidState("pipeline cache miss".into()))?;
        let bind_groups = self.bind_groups(program, pipeline)?;

        let copies: Vec<(wgpu::Buffer, &wgpu::Buffer, u64)> = staged
            .iter()
            .filter_map(|(location, bytes)| {
                let target = program.uniform_buffers.get(location)?;
                let staging = self
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Uniform Staging Buffer"),
                        contents: bytes,
                        usage: wgpu::BufferUsages::COPY_SRC,
                    });
                Some((staging, target, bytes.len() as u64))
            })
            .collect();

        let (Some(frame), Some(index)) = (self.frame.as_mut(), self.buffers.get(&index_id)) else {
            return Err(RenderError::InvalidState("frame closed during draw".into()));
        };
        for (staging, target, size) in &copies {
            frame
                .encoder
                .copy_buffer_to_buffer(staging, 0, target, 0, *size);
        }

        let mut render_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            ..Default::default()
        });
        render_pass.set_pipeline(pipeline);
        for (group, bind_group) in bind_groups.iter().enumerate() {
            render_pass.set_bind_group(group as u32, bind_group, &[]);
        }
        for (slot, ((buffer, _), _)) in slots.iter().enumerate() {
            if let Some(gpu) = self.buffers.get(buffer) {
                render_pass.set_vertex_buffer(slot as u32, gpu.buffer.slice(..));
            }
        }
        render_pass.set_index_buffer(index.buffer.slice(..), wgpu::IndexFormat::Uint32);
        render_pass.draw_indexed(0..count, 0, 0..1);
        Ok(())
    }

    fn clear(&mut self, colour: wgpu::Color) -> Result<(), RenderError> {
        if !self.ensure_frame()? {
            return Ok(());
        }
        let Some(frame) = self.frame.as_mut() else {
            return Ok(());
        };
        let _ = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(colour),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            ..Default::default()
        });
        Ok(())
    }

    fn present(&mut self) -> Result<(), RenderError> {
        self.skipping_frame = false;
        let Some(frame) = self.frame.take() else {
            return Ok(());
        };
        self.queue.submit(iter::once(frame.encoder.finish()));
        if let Some(surface_texture) = frame.surface_texture {
            if let Target::Surface { window, .. } = &self.target {
                window.pre_present_notify();
            }
            surface_texture.present();
        }
        if frame.reconfigure
            && let Target::Surface {
                surface, config, ..
            } = &self.target
        {
            log::debug!("surface is suboptimal; reconfiguring");
            surface.configure(&self.device, config);
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        match &mut self.target {
            Target::Surface {
                surface, config, ..
            } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            Target::Offscreen {
                texture,
                width: w,
                height: h,
            } => {
                *texture = offscreen_texture(&self.device, width, height);
                *w = width;
                *h = height;
            }
        }
        log::debug!("resized to {width}x{height}");
    }
}

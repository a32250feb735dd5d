//! An in-memory [`RenderDevice`] that records every call.
//!
//! It keeps the same binding state a GL driver would (current program, bound
//! vertex array, textures per unit, per-array attribute enables) and checks
//! the draw preconditions the wgpu backend relies on, so tests can assert
//! binding order and draw state without a GPU.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    device::{
        BufferId, BufferTarget, ImageData, PixelFormat, Primitive, ProgramId,
        RenderDevice, SamplerParams, ShaderId, ShaderStage, TextureId, UniformLocation,
        UniformValue, VertexArrayId, VertexAttribute,
    },
    error::RenderError,
    pipelines::reflect::ProgramLayout,
};

#[derive(Clone, Debug, PartialEq)]
pub enum GpuCall {
    CreateShader { id: ShaderId, stage: ShaderStage },
    LinkProgram { id: ProgramId, vertex: ShaderId, fragment: ShaderId },
    UseProgram(Option<ProgramId>),
    SetUniform { program: ProgramId, name: String, value: UniformValue },
    DeleteShader(ShaderId),
    DeleteProgram(ProgramId),
    CreateTexture(TextureId),
    ActiveTexture(u32),
    BindTexture { unit: u32, texture: Option<TextureId> },
    SetSamplerParams { texture: TextureId, params: SamplerParams },
    UploadTexture { texture: TextureId, width: u32, height: u32, format: PixelFormat },
    DeleteTexture(TextureId),
    CreateVertexArray(VertexArrayId),
    BindVertexArray(Option<VertexArrayId>),
    CreateBuffer { id: BufferId, target: BufferTarget, len: usize },
    VertexAttribPointer { buffer: BufferId, attribute: VertexAttribute },
    EnableVertexAttrib(u32),
    DisableVertexAttrib(u32),
    DeleteBuffer(BufferId),
    DeleteVertexArray(VertexArrayId),
    DrawIndexed { primitive: Primitive, count: u32 },
    Clear(wgpu::Color),
    Present,
    Resize { width: u32, height: u32 },
}

/// Binding state captured at a draw.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    pub primitive: Primitive,
    pub count: u32,
    pub program: ProgramId,
    pub vertex_array: VertexArrayId,
    pub textures: BTreeMap<u32, TextureId>,
    pub enabled_attributes: Vec<u32>,
    pub uniforms: BTreeMap<String, UniformValue>,
}

impl DrawCall {
    pub fn triangles(&self) -> u32 {
        match self.primitive {
            Primitive::Triangles => self.count / 3,
        }
    }
}

#[derive(Debug)]
struct ProgramRecord {
    layout: ProgramLayout,
    uniforms: HashMap<UniformLocation, UniformValue>,
}

#[derive(Debug, Default)]
struct VertexArrayRecord {
    index_buffer: Option<BufferId>,
    pointers: BTreeMap<u32, (BufferId, VertexAttribute)>,
    enabled: BTreeSet<u32>,
}

#[derive(Debug)]
struct BufferRecord {
    target: BufferTarget,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct TextureRecord {
    params: Option<SamplerParams>,
    size: Option<(u32, u32)>,
}

#[derive(Debug, Default)]
pub struct RecordingDevice {
    next_id: u32,
    calls: Vec<GpuCall>,
    draws: Vec<DrawCall>,

    shaders: HashMap<ShaderId, ShaderStage>,
    programs: HashMap<ProgramId, ProgramRecord>,
    textures: HashMap<TextureId, TextureRecord>,
    vertex_arrays: HashMap<VertexArrayId, VertexArrayRecord>,
    buffers: HashMap<BufferId, BufferRecord>,

    current_program: Option<ProgramId>,
    active_unit: u32,
    units: BTreeMap<u32, TextureId>,
    bound_vertex_array: Option<VertexArrayId>,
    bound_vertex_buffer: Option<BufferId>,

    link_failure: Option<String>,
    draw_failure: Option<String>,
    frames: u32,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `link_program` fail with `log`.
    pub fn fail_next_link(&mut self, log: impl Into<String>) {
        self.link_failure = Some(log.into());
    }

    /// Makes the next `draw_indexed` fail with `message`.
    pub fn fail_next_draw(&mut self, message: impl Into<String>) {
        self.draw_failure = Some(message.into());
    }

    pub fn calls(&self) -> &[GpuCall] {
        &self.calls
    }

    /// Drains the call log, keeping all binding state.
    pub fn take_calls(&mut self) -> Vec<GpuCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn draws(&self) -> &[DrawCall] {
        &self.draws
    }

    pub fn frames_presented(&self) -> u32 {
        self.frames
    }

    pub fn current_program(&self) -> Option<ProgramId> {
        self.current_program
    }

    pub fn bound_vertex_array(&self) -> Option<VertexArrayId> {
        self.bound_vertex_array
    }

    pub fn bound_texture(&self, unit: u32) -> Option<TextureId> {
        self.units.get(&unit).copied()
    }

    pub fn enabled_attributes(&self, vertex_array: VertexArrayId) -> Vec<u32> {
        self.vertex_arrays
            .get(&vertex_array)
            .map(|vao| vao.enabled.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(|b| b.data.as_slice())
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&texture).and_then(|t| t.size)
    }

    pub fn sampler_params(&self, texture: TextureId) -> Option<SamplerParams> {
        self.textures.get(&texture).and_then(|t| t.params)
    }

    pub fn uniform(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        let record = self.programs.get(&program)?;
        let location = record.layout.location(name)?;
        record.uniforms.get(&location).copied()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_vertex_arrays(&self) -> usize {
        self.vertex_arrays.len()
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn bound_texture_record(&mut self) -> Result<(TextureId, &mut TextureRecord), RenderError> {
        let unit = self.active_unit;
        let id = self
            .units
            .get(&unit)
            .copied()
            .ok_or_else(|| RenderError::InvalidState(format!("no texture bound on unit {unit}")))?;
        let record = self
            .textures
            .get_mut(&id)
            .ok_or_else(|| RenderError::InvalidState(format!("{id:?} was deleted")))?;
        Ok((id, record))
    }

    fn bound_vertex_array_mut(&mut self) -> Option<&mut VertexArrayRecord> {
        let id = self.bound_vertex_array?;
        self.vertex_arrays.get_mut(&id)
    }

    fn check_draw(&self, count: u32) -> Result<(ProgramId, VertexArrayId, &VertexArrayRecord), RenderError> {
        let program = self
            .current_program
            .ok_or_else(|| RenderError::InvalidState("draw without a bound program".into()))?;
        let vao_id = self
            .bound_vertex_array
            .ok_or_else(|| RenderError::InvalidState("draw without a bound vertex array".into()))?;
        let vao = self
            .vertex_arrays
            .get(&vao_id)
            .ok_or_else(|| RenderError::InvalidState(format!("{vao_id:?} was deleted")))?;
        let index_buffer = vao
            .index_buffer
            .and_then(|id| self.buffers.get(&id))
            .ok_or_else(|| RenderError::InvalidState("vertex array has no index buffer".into()))?;
        let needed = count as usize * std::mem::size_of::<u32>();
        if needed > index_buffer.data.len() {
            return Err(RenderError::InvalidState(format!(
                "draw of {count} indices overruns a {} byte index buffer",
                index_buffer.data.len()
            )));
        }
        if let Some(missing) = vao.enabled.iter().find(|loc| !vao.pointers.contains_key(*loc)) {
            return Err(RenderError::InvalidState(format!(
                "attribute {missing} is enabled but has no pointer"
            )));
        }
        // wgpu has no constant attribute values, so every input must be fed.
        if let Some(record) = self.programs.get(&program) {
            if let Some(missing) = record
                .layout
                .vertex_inputs()
                .iter()
                .find(|loc| !vao.enabled.contains(*loc))
            {
                return Err(RenderError::InvalidState(format!(
                    "vertex input {missing} is read by the program but not enabled"
                )));
            }
        }
        Ok((program, vao_id, vao))
    }
}

impl RenderDevice for RecordingDevice {
    fn create_shader(&mut self, stage: ShaderStage, _source: &str) -> Result<ShaderId, RenderError> {
        let id = ShaderId(self.next());
        self.shaders.insert(id, stage);
        self.calls.push(GpuCall::CreateShader { id, stage });
        Ok(id)
    }

    fn shader_capabilities(&self) -> naga::valid::Capabilities {
        naga::valid::Capabilities::default()
    }

    fn link_program(
        &mut self,
        vertex: ShaderId,
        fragment: ShaderId,
        layout: &ProgramLayout,
    ) -> Result<ProgramId, RenderError> {
        if let Some(log) = self.link_failure.take() {
            return Err(RenderError::ShaderLink { log });
        }
        for (shader, stage) in [(vertex, ShaderStage::Vertex), (fragment, ShaderStage::Fragment)] {
            if self.shaders.get(&shader) != Some(&stage) {
                return Err(RenderError::ShaderLink {
                    log: format!("{shader:?} is not a live {stage} shader"),
                });
            }
        }
        let id = ProgramId(self.next());
        self.programs.insert(
            id,
            ProgramRecord {
                layout: layout.clone(),
                uniforms: HashMap::new(),
            },
        );
        self.calls.push(GpuCall::LinkProgram {
            id,
            vertex,
            fragment,
        });
        Ok(id)
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.current_program = program;
        self.calls.push(GpuCall::UseProgram(program));
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(program) = self.current_program else {
            return;
        };
        let Some(record) = self.programs.get_mut(&program) else {
            return;
        };
        let Some(slot) = record.layout.slot(location) else {
            return;
        };
        let name = slot.name.clone();
        record.uniforms.insert(location, value);
        self.calls.push(GpuCall::SetUniform {
            program,
            name,
            value,
        });
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        self.shaders.remove(&shader);
        self.calls.push(GpuCall::DeleteShader(shader));
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
        self.calls.push(GpuCall::DeleteProgram(program));
    }

    fn create_texture(&mut self) -> TextureId {
        let id = TextureId(self.next());
        self.textures.insert(id, TextureRecord::default());
        self.calls.push(GpuCall::CreateTexture(id));
        id
    }

    fn active_texture(&mut self, unit: u32) {
        self.active_unit = unit;
        self.calls.push(GpuCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        let unit = self.active_unit;
        match texture {
            Some(id) => self.units.insert(unit, id),
            None => self.units.remove(&unit),
        };
        self.calls.push(GpuCall::BindTexture { unit, texture });
    }

    fn set_sampler_params(&mut self, params: SamplerParams) -> Result<(), RenderError> {
        let (texture, record) = self.bound_texture_record()?;
        record.params = Some(params);
        self.calls.push(GpuCall::SetSamplerParams { texture, params });
        Ok(())
    }

    fn upload_texture(&mut self, image: ImageData<'_>) -> Result<(), RenderError> {
        let expected =
            image.width as usize * image.height as usize * image.format.channels() as usize;
        if image.pixels.len() != expected {
            return Err(RenderError::InvalidState(format!(
                "{}x{} {:?} image needs {expected} bytes, got {}",
                image.width,
                image.height,
                image.format,
                image.pixels.len()
            )));
        }
        let (texture, record) = self.bound_texture_record()?;
        record.size = Some((image.width, image.height));
        self.calls.push(GpuCall::UploadTexture {
            texture,
            width: image.width,
            height: image.height,
            format: image.format,
        });
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.units.retain(|_, bound| *bound != texture);
        self.calls.push(GpuCall::DeleteTexture(texture));
    }

    fn create_vertex_array(&mut self) -> VertexArrayId {
        let id = VertexArrayId(self.next());
        self.vertex_arrays.insert(id, VertexArrayRecord::default());
        self.calls.push(GpuCall::CreateVertexArray(id));
        id
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.bound_vertex_array = vertex_array;
        self.calls.push(GpuCall::BindVertexArray(vertex_array));
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
        let id = BufferId(self.next());
        self.buffers.insert(
            id,
            BufferRecord {
                target,
                data: contents.to_vec(),
            },
        );
        match target {
            BufferTarget::Vertex => self.bound_vertex_buffer = Some(id),
            BufferTarget::Index => {
                if let Some(vao) = self.bound_vertex_array_mut() {
                    vao.index_buffer = Some(id);
                }
            }
        }
        self.calls.push(GpuCall::CreateBuffer {
            id,
            target,
            len: contents.len(),
        });
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
        if !(1..=4).contains(&attribute.components) {
            return Err(RenderError::InvalidState(format!(
                "attribute {} has {} components",
                attribute.location, attribute.components
            )));
        }
        let vao = self.bound_vertex_array_mut().ok_or_else(|| {
            RenderError::InvalidState("attribute pointer without a bound vertex array".into())
        })?;
        vao.pointers.insert(attribute.location, (buffer, attribute));
        self.calls.push(GpuCall::VertexAttribPointer { buffer, attribute });
        Ok(())
    }

    fn enable_vertex_attrib(&mut self, location: u32) {
        match self.bound_vertex_array_mut() {
            Some(vao) => {
                vao.enabled.insert(location);
            }
            None => log::warn!("enable of attribute {location} without a bound vertex array"),
        }
        self.calls.push(GpuCall::EnableVertexAttrib(location));
    }

    fn disable_vertex_attrib(&mut self, location: u32) {
        if let Some(vao) = self.bound_vertex_array_mut() {
            vao.enabled.remove(&location);
        }
        self.calls.push(GpuCall::DisableVertexAttrib(location));
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
        if self.bound_vertex_buffer == Some(buffer) {
            self.bound_vertex_buffer = None;
        }
        self.calls.push(GpuCall::DeleteBuffer(buffer));
    }

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId) {
        self.vertex_arrays.remove(&vertex_array);
        if self.bound_vertex_array == Some(vertex_array) {
            self.bound_vertex_array = None;
        }
        self.calls.push(GpuCall::DeleteVertexArray(vertex_array));
    }

    fn draw_indexed(&mut self, primitive: Primitive, count: u32) -> Result<(), RenderError> {
        if let Some(message) = self.draw_failure.take() {
            return Err(RenderError::InvalidState(message));
        }
        let (program, vertex_array, vao) = self.check_draw(count)?;
        let enabled_attributes = vao.enabled.iter().copied().collect();
        let uniforms = self
            .programs
            .get(&program)
            .map(|record| {
                record
                    .uniforms
                    .iter()
                    .filter_map(|(location, value)| {
                        let slot = record.layout.slot(*location)?;
                        Some((slot.name.clone(), *value))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let draw = DrawCall {
            primitive,
            count,
            program,
            vertex_array,
            textures: self.units.clone(),
            enabled_attributes,
            uniforms,
        };
        self.draws.push(draw);
        self.calls.push(GpuCall::DrawIndexed { primitive, count });
        Ok(())
    }

    fn clear(&mut self, colour: wgpu::Color) -> Result<(), RenderError> {
        self.calls.push(GpuCall::Clear(colour));
        Ok(())
    }

    fn present(&mut self) -> Result<(), RenderError> {
        self.frames += 1;
        self.calls.push(GpuCall::Present);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.calls.push(GpuCall::Resize { width, height });
    }
}

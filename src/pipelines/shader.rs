//! Shader programs: source text in, linked GPU program and typed uniform
//! setters out.

use std::{borrow::Cow, path::Path};

use crate::{
    device::{ProgramId, RenderDevice, ShaderId, ShaderStage, UniformValue},
    error::RenderError,
    pipelines::reflect::{self, ProgramLayout, UniformKind},
    resources,
};

/// The two WGSL texts a program is built from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderSource {
    pub label: Cow<'static, str>,
    pub vertex: Cow<'static, str>,
    pub fragment: Cow<'static, str>,
}

impl ShaderSource {
    pub fn new(
        label: impl Into<Cow<'static, str>>,
        vertex: impl Into<Cow<'static, str>>,
        fragment: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            label: label.into(),
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// The built-in textured quad program.
    ///
    /// Uniforms: `uniform_projection_matrix`, `uniform_view_matrix` and the
    /// `uniform_texture` / `uniform_texture_sampler` pair.
    pub fn sprite() -> Self {
        Self::new(
            "sprite",
            include_str!("sprite.vert.wgsl"),
            include_str!("sprite.frag.wgsl"),
        )
    }

    /// Reads both stages from disk.
    pub fn from_files(
        vertex: impl AsRef<Path>,
        fragment: impl AsRef<Path>,
    ) -> Result<Self, RenderError> {
        let label = vertex.as_ref().display().to_string();
        Ok(Self::new(
            label,
            resources::load_string(vertex)?,
            resources::load_string(fragment)?,
        ))
    }

    fn text(&self, stage: ShaderStage) -> &str {
        match stage {
            ShaderStage::Vertex => &self.vertex,
            ShaderStage::Fragment => &self.fragment,
        }
    }
}

#[derive(Debug)]
enum ShaderState {
    Pending,
    Linked {
        program: ProgramId,
        layout: ProgramLayout,
    },
    Failed,
    Released,
}

/// A GPU program. [`Shader::compile`] must succeed before any other use.
#[derive(Debug)]
pub struct Shader {
    source: ShaderSource,
    state: ShaderState,
}

impl Shader {
    pub fn new(source: ShaderSource) -> Self {
        Self {
            source,
            state: ShaderState::Pending,
        }
    }

    pub fn source(&self) -> &ShaderSource {
        &self.source
    }

    pub fn program(&self) -> Option<ProgramId> {
        match &self.state {
            ShaderState::Linked { program, .. } => Some(*program),
            _ => None,
        }
    }

    pub fn layout(&self) -> Option<&ProgramLayout> {
        match &self.state {
            ShaderState::Linked { layout, .. } => Some(layout),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, ShaderState::Failed)
    }

    /// Compiles both stages and links them.
    ///
    /// A failure is reported through `log::error!` with the full diagnostic
    /// and is terminal: the shader stays unusable afterwards.
    pub fn compile(&mut self, device: &mut dyn RenderDevice) -> Result<(), RenderError> {
        match self.state {
            ShaderState::Pending => {}
            ShaderState::Linked { .. } => {
                log::warn!("shader `{}` is already compiled", self.source.label);
                return Ok(());
            }
            ShaderState::Failed | ShaderState::Released => return Err(RenderError::ShaderUnusable),
        }

        match self.build(device) {
            Ok((program, layout)) => {
                log::debug!(
                    "linked shader `{}` as program {:?} with {} uniform(s)",
                    self.source.label,
                    program,
                    layout.slots().len()
                );
                self.state = ShaderState::Linked { program, layout };
                Ok(())
            }
            Err(err) => {
                match &err {
                    RenderError::ShaderCompile { stage, log } => log::error!(
                        "Error compiling {stage} shader `{}`\n:: Error message ::\n{log}",
                        self.source.label
                    ),
                    RenderError::ShaderLink { log } => log::error!(
                        "Error linking shader program `{}`\n:: Error message ::\n{log}",
                        self.source.label
                    ),
                    other => log::error!("Error building shader `{}`: {other}", self.source.label),
                }
                self.state = ShaderState::Failed;
                Err(err)
            }
        }
    }

    fn build(
        &self,
        device: &mut dyn RenderDevice,
    ) -> Result<(ProgramId, ProgramLayout), RenderError> {
        let capabilities = device.shader_capabilities();
        let vertex = reflect::compile_stage(ShaderStage::Vertex, &self.source.vertex, capabilities)?;
        let fragment =
            reflect::compile_stage(ShaderStage::Fragment, &self.source.fragment, capabilities)?;
        let layout = reflect::link(&vertex, &fragment)?;

        let vs = self.create_stage(device, ShaderStage::Vertex)?;
        let fs = match self.create_stage(device, ShaderStage::Fragment) {
            Ok(fs) => fs,
            Err(err) => {
                device.delete_shader(vs);
                return Err(err);
            }
        };
        let program = device.link_program(vs, fs, &layout);
        // The program keeps what it needs; the stage objects are not reused.
        device.delete_shader(vs);
        device.delete_shader(fs);
        Ok((program?, layout))
    }

    fn create_stage(
        &self,
        device: &mut dyn RenderDevice,
        stage: ShaderStage,
    ) -> Result<ShaderId, RenderError> {
        device.create_shader(stage, self.source.text(stage))
    }

    pub fn bind(&self, device: &mut dyn RenderDevice) {
        match self.program() {
            Some(program) => device.use_program(Some(program)),
            None => log::error!("shader `{}` bound before compile()", self.source.label),
        }
    }

    pub fn unbind(&self, device: &mut dyn RenderDevice) {
        device.use_program(None);
    }

    pub fn set_matrix4(
        &self,
        device: &mut dyn RenderDevice,
        name: &str,
        matrix: &cgmath::Matrix4<f32>,
    ) {
        self.set_uniform(device, name, UniformKind::Mat4, UniformValue::Mat4((*matrix).into()));
    }

    pub fn set_float(&self, device: &mut dyn RenderDevice, name: &str, value: f32) {
        self.set_uniform(device, name, UniformKind::Float, UniformValue::Float(value));
    }

    /// Points the texture uniform `name` (and its paired sampler) at `slot`.
    pub fn set_texture_slot(&self, device: &mut dyn RenderDevice, name: &str, slot: u32) {
        self.set_uniform(device, name, UniformKind::Texture, UniformValue::Int(slot as i32));
    }

    /// Rebinds this program, then writes the uniform.
    ///
    /// Unknown names are ignored, like a write to location -1 in GL.
    fn set_uniform(
        &self,
        device: &mut dyn RenderDevice,
        name: &str,
        expected: UniformKind,
        value: UniformValue,
    ) {
        let ShaderState::Linked { program, layout } = &self.state else {
            log::error!(
                "uniform `{name}` set on shader `{}` before compile()",
                self.source.label
            );
            return;
        };
        device.use_program(Some(*program));
        let Some(location) = layout.location(name) else {
            log::trace!("shader `{}` has no uniform `{name}`", self.source.label);
            return;
        };
        if let Some(slot) = layout.slot(location) {
            if slot.kind != expected {
                log::warn!(
                    "uniform `{name}` is {:?}, not {:?}; write ignored",
                    slot.kind,
                    expected
                );
                return;
            }
        }
        device.set_uniform(location, value);
    }

    /// Deletes the GPU program.
    pub fn release(&mut self, device: &mut dyn RenderDevice) {
        if let ShaderState::Linked { program, .. } = self.state {
            device.delete_program(program);
        }
        self.state = ShaderState::Released;
    }
}

//! WGSL compilation, stage linking and uniform reflection.
//!
//! Each stage is parsed and validated on the host with naga before any GPU
//! object exists, so compile diagnostics are identical on every backend.
//! Linking checks the vertex/fragment interface and merges the resources of
//! both stages into one [`ProgramLayout`].

use naga::{
    Binding, BuiltIn, Handle, Module, ScalarKind, Type, TypeInner, VectorSize,
    valid::{Capabilities, ValidationFlags, Validator},
};

use crate::{
    device::{ShaderStage, UniformLocation},
    error::RenderError,
};

/// What a uniform holds, as far as the setters are concerned.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UniformKind {
    Mat4,
    Float,
    Int,
    Texture,
    Sampler,
    Other,
}

impl UniformKind {
    fn of(inner: &TypeInner) -> Self {
        match inner {
            TypeInner::Matrix {
                columns: VectorSize::Quad,
                rows: VectorSize::Quad,
                scalar,
            } if *scalar == naga::Scalar::F32 => UniformKind::Mat4,
            TypeInner::Scalar(scalar) if *scalar == naga::Scalar::F32 => UniformKind::Float,
            TypeInner::Scalar(scalar)
                if matches!(scalar.kind, ScalarKind::Sint | ScalarKind::Uint) =>
            {
                UniformKind::Int
            }
            TypeInner::Image { .. } => UniformKind::Texture,
            TypeInner::Sampler { .. } => UniformKind::Sampler,
            _ => UniformKind::Other,
        }
    }
}

/// A resource variable bound at `@group(group) @binding(binding)`.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformSlot {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub kind: UniformKind,
    /// Size in bytes of the value; zero for textures and samplers.
    pub size: u32,
    /// Whether an entry point actually reads the variable.
    pub used: bool,
    /// For textures: the sampler named `<texture>_sampler`, if declared.
    pub sampler: Option<UniformLocation>,
}

/// Reflected interface of a linked program.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramLayout {
    pub vertex_entry: String,
    pub fragment_entry: String,
    uniforms: Vec<UniformSlot>,
    vertex_inputs: Vec<u32>,
}

impl ProgramLayout {
    /// Looks a uniform up by name. Unknown names have no location.
    pub fn location(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms
            .iter()
            .position(|slot| slot.name == name)
            .map(|idx| UniformLocation(idx as u32))
    }

    pub fn slot(&self, location: UniformLocation) -> Option<&UniformSlot> {
        self.uniforms.get(location.0 as usize)
    }

    pub fn slots(&self) -> &[UniformSlot] {
        &self.uniforms
    }

    /// `@location`s the vertex stage reads, ascending.
    pub fn vertex_inputs(&self) -> &[u32] {
        &self.vertex_inputs
    }

    /// Highest bind group index read by either stage.
    pub fn max_used_group(&self) -> Option<u32> {
        self.uniforms
            .iter()
            .filter(|slot| slot.used)
            .map(|slot| slot.group)
            .max()
    }
}

#[derive(Clone, Debug)]
struct Varying {
    name: String,
    location: Option<u32>,
    builtin: Option<BuiltIn>,
    ty: TypeInner,
}

/// One stage that parsed and validated.
#[derive(Clone, Debug)]
pub struct CompiledStage {
    pub stage: ShaderStage,
    pub entry_point: String,
    inputs: Vec<Varying>,
    outputs: Vec<Varying>,
    resources: Vec<UniformSlot>,
}

fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

/// Parses and validates one stage of WGSL against the shader features the
/// device reports.
pub fn compile_stage(
    stage: ShaderStage,
    source: &str,
    capabilities: Capabilities,
) -> Result<CompiledStage, RenderError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| RenderError::ShaderCompile {
        stage,
        log: e.emit_to_string(source),
    })?;
    let info = Validator::new(ValidationFlags::all(), capabilities)
        .validate(&module)
        .map_err(|e| RenderError::ShaderCompile {
            stage,
            log: e.emit_to_string(source),
        })?;

    let wanted = naga_stage(stage);
    let mut candidates = module
        .entry_points
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.stage == wanted);
    let (index, entry) = match (candidates.next(), candidates.next()) {
        (Some(found), None) => found,
        (None, _) => {
            return Err(RenderError::ShaderCompile {
                stage,
                log: format!("no @{stage} entry point"),
            });
        }
        (Some(_), Some(_)) => {
            return Err(RenderError::ShaderCompile {
                stage,
                log: format!("more than one @{stage} entry point"),
            });
        }
    };

    let mut inputs = Vec::new();
    for argument in &entry.function.arguments {
        flatten(
            &module,
            argument.name.as_deref().unwrap_or_default(),
            argument.ty,
            argument.binding.as_ref(),
            &mut inputs,
        );
    }
    let mut outputs = Vec::new();
    if let Some(result) = &entry.function.result {
        flatten(&module, "", result.ty, result.binding.as_ref(), &mut outputs);
    }

    let usage = info.get_entry_point(index);
    let resources = module
        .global_variables
        .iter()
        .filter_map(|(handle, var)| {
            let binding = var.binding.as_ref()?;
            let inner = &module.types[var.ty].inner;
            let kind = UniformKind::of(inner);
            let size = match kind {
                UniformKind::Texture | UniformKind::Sampler => 0,
                _ => inner.size(module.to_ctx()),
            };
            Some(UniformSlot {
                name: var.name.clone().unwrap_or_default(),
                group: binding.group,
                binding: binding.binding,
                kind,
                size,
                used: !usage[handle].is_empty(),
                sampler: None,
            })
        })
        .collect();

    Ok(CompiledStage {
        stage,
        entry_point: entry.name.clone(),
        inputs,
        outputs,
        resources,
    })
}

fn flatten(
    module: &Module,
    name: &str,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    out: &mut Vec<Varying>,
) {
    let inner = &module.types[ty].inner;
    match binding {
        Some(Binding::BuiltIn(builtin)) => out.push(Varying {
            name: name.to_string(),
            location: None,
            builtin: Some(*builtin),
            ty: inner.clone(),
        }),
        Some(Binding::Location { location, .. }) => out.push(Varying {
            name: name.to_string(),
            location: Some(*location),
            builtin: None,
            ty: inner.clone(),
        }),
        None => {
            if let TypeInner::Struct { members, .. } = inner {
                for member in members {
                    flatten(
                        module,
                        member.name.as_deref().unwrap_or_default(),
                        member.ty,
                        member.binding.as_ref(),
                        out,
                    );
                }
            }
        }
    }
}

fn describe(inner: &TypeInner) -> String {
    fn scalar_name(scalar: &naga::Scalar) -> String {
        let prefix = match scalar.kind {
            ScalarKind::Float | ScalarKind::AbstractFloat => "f",
            ScalarKind::Sint | ScalarKind::AbstractInt => "i",
            ScalarKind::Uint => "u",
            ScalarKind::Bool => return "bool".to_string(),
        };
        format!("{prefix}{}", scalar.width as u32 * 8)
    }
    match inner {
        TypeInner::Scalar(scalar) => scalar_name(scalar),
        TypeInner::Vector { size, scalar } => {
            format!("vec{}<{}>", *size as u8, scalar_name(scalar))
        }
        other => format!("{other:?}"),
    }
}

/// Checks the interface between the two stages and merges their resources.
pub fn link(vertex: &CompiledStage, fragment: &CompiledStage) -> Result<ProgramLayout, RenderError> {
    let link_error = |log: String| RenderError::ShaderLink { log };

    if !vertex
        .outputs
        .iter()
        .any(|out| matches!(out.builtin, Some(BuiltIn::Position { .. })))
    {
        return Err(link_error(format!(
            "vertex entry point `{}` does not write @builtin(position)",
            vertex.entry_point
        )));
    }

    for input in &fragment.inputs {
        let Some(location) = input.location else {
            continue;
        };
        let Some(output) = vertex
            .outputs
            .iter()
            .find(|out| out.location == Some(location))
        else {
            return Err(link_error(format!(
                "fragment input `{}` at location {location} is not written by the vertex stage",
                input.name
            )));
        };
        if output.ty != input.ty {
            return Err(link_error(format!(
                "type mismatch at location {location}: vertex writes {} (`{}`), fragment reads {} (`{}`)",
                describe(&output.ty),
                output.name,
                describe(&input.ty),
                input.name
            )));
        }
    }

    let mut uniforms: Vec<UniformSlot> = vertex.resources.clone();
    for resource in &fragment.resources {
        if let Some(existing) = uniforms
            .iter_mut()
            .find(|slot| slot.group == resource.group && slot.binding == resource.binding)
        {
            if existing.name != resource.name
                || existing.kind != resource.kind
                || existing.size != resource.size
            {
                return Err(link_error(format!(
                    "@group({}) @binding({}) is `{}` in the vertex stage but `{}` in the fragment stage",
                    resource.group, resource.binding, existing.name, resource.name
                )));
            }
            existing.used |= resource.used;
        } else if let Some(existing) = uniforms.iter().find(|slot| slot.name == resource.name) {
            return Err(link_error(format!(
                "`{}` is bound at @group({}) @binding({}) in the vertex stage but @group({}) @binding({}) in the fragment stage",
                resource.name, existing.group, existing.binding, resource.group, resource.binding
            )));
        } else {
            uniforms.push(resource.clone());
        }
    }
    uniforms.sort_by_key(|slot| (slot.group, slot.binding));

    let samplers: Vec<(usize, String)> = uniforms
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.kind == UniformKind::Sampler)
        .map(|(idx, slot)| (idx, slot.name.clone()))
        .collect();
    for slot in uniforms
        .iter_mut()
        .filter(|slot| slot.kind == UniformKind::Texture)
    {
        let wanted = format!("{}_sampler", slot.name);
        slot.sampler = samplers
            .iter()
            .find(|(_, name)| *name == wanted)
            .map(|(idx, _)| UniformLocation(*idx as u32));
    }

    let mut vertex_inputs: Vec<u32> = vertex.inputs.iter().filter_map(|v| v.location).collect();
    vertex_inputs.sort_unstable();

    Ok(ProgramLayout {
        vertex_entry: vertex.entry_point.clone(),
        fragment_entry: fragment.entry_point.clone(),
        uniforms,
        vertex_inputs,
    })
}

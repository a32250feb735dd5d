//! The scene: entities plus the one textured mesh they are drawn with.

use crate::{
    camera::Camera,
    data_structures::{
        entity::Entity,
        geometry::{Geometry, Vertex},
        texture::Texture,
    },
    device::{BufferId, BufferTarget, Primitive, RenderDevice, VertexArrayId},
    error::RenderError,
    input::InputState,
    pipelines::shader::{Shader, ShaderSource},
};

pub const TEXTURE_UNIFORM: &str = "uniform_texture";
pub const PROJECTION_UNIFORM: &str = "uniform_projection_matrix";
pub const VIEW_UNIFORM: &str = "uniform_view_matrix";

const TEXTURE_UNIT: u32 = 0;

#[derive(Debug)]
struct GeometryBuffers {
    vertex_array: VertexArrayId,
    vertex_buffer: BufferId,
    index_buffer: BufferId,
    index_count: u32,
}

/// Owns the entities, the camera, the shader, the texture and the GPU
/// copy of the geometry.
///
/// [`Scene::start`] must succeed once before [`Scene::update`] is called.
/// Both leave arbitrary GPU bindings behind.
#[derive(Debug)]
pub struct Scene {
    entities: Vec<Entity>,
    camera: Camera,
    shader: Shader,
    texture: Texture,
    geometry: Geometry,
    buffers: Option<GeometryBuffers>,
}

impl Scene {
    pub fn new(shader: ShaderSource, texture: Texture, camera: Camera) -> Self {
        Self {
            entities: Vec::new(),
            camera,
            shader: Shader::new(shader),
            texture,
            geometry: Geometry::quad(),
            buffers: None,
        }
    }

    /// Replaces the default quad. Has no effect once started.
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        if self.is_started() {
            log::warn!("geometry replaced after start(); keeping the uploaded one");
        } else {
            self.geometry = geometry;
        }
        self
    }

    pub fn is_started(&self) -> bool {
        self.buffers.is_some()
    }

    /// Adds an entity. Entities added after [`Scene::start`] are started
    /// right away.
    pub fn add_entity(&mut self, mut entity: Entity) {
        if self.is_started() {
            entity.start();
        }
        self.entities.push(entity);
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name() == name)
    }

    pub fn entity_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|e| e.name() == name)
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn shader(&self) -> &Shader {
        &self.shader
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn vertex_array(&self) -> Option<VertexArrayId> {
        self.buffers.as_ref().map(|b| b.vertex_array)
    }

    /// Compiles the shader, uploads the geometry, then starts every entity.
    pub fn start(&mut self, device: &mut dyn RenderDevice) -> Result<(), RenderError> {
        if self.is_started() {
            return Err(RenderError::SceneAlreadyStarted);
        }
        self.shader.compile(device)?;
        self.buffers = Some(self.upload_geometry(device)?);

        for entity in &mut self.entities {
            entity.start();
        }
        log::info!(
            "scene started: {} entities, {} triangles",
            self.entities.len(),
            self.geometry.triangle_count()
        );
        Ok(())
    }

    fn upload_geometry(&self, device: &mut dyn RenderDevice) -> Result<GeometryBuffers, RenderError> {
        let vertex_array = device.create_vertex_array();
        device.bind_vertex_array(Some(vertex_array));

        let mut created = Vec::with_capacity(2);
        match self.fill_vertex_array(device, &mut created) {
            Ok((vertex_buffer, index_buffer)) => Ok(GeometryBuffers {
                vertex_array,
                vertex_buffer,
                index_buffer,
                index_count: self.geometry.index_count(),
            }),
            Err(err) => {
                for buffer in created {
                    device.delete_buffer(buffer);
                }
                device.bind_vertex_array(None);
                device.delete_vertex_array(vertex_array);
                Err(err)
            }
        }
    }

    /// Uploads both buffers into the bound vertex array and points the
    /// attributes at the vertex buffer.
    fn fill_vertex_array(
        &self,
        device: &mut dyn RenderDevice,
        created: &mut Vec<BufferId>,
    ) -> Result<(BufferId, BufferId), RenderError> {
        let vertex_buffer =
            device.create_buffer(BufferTarget::Vertex, self.geometry.vertex_bytes())?;
        created.push(vertex_buffer);
        let index_buffer =
            device.create_buffer(BufferTarget::Index, self.geometry.index_bytes())?;
        created.push(index_buffer);

        for attribute in Vertex::attributes() {
            device.vertex_attrib_pointer(attribute)?;
            device.enable_vertex_attrib(attribute.location);
        }
        Ok((vertex_buffer, index_buffer))
    }

    /// Draws the mesh with the scene's texture and camera, then updates
    /// every entity. A failed draw is returned only after the entities are
    /// updated and the program is unbound.
    pub fn update(
        &mut self,
        device: &mut dyn RenderDevice,
        dt: f32,
        input: &InputState,
    ) -> Result<(), RenderError> {
        let Some(buffers) = &self.buffers else {
            return Err(RenderError::SceneNotStarted);
        };
        let (vertex_array, index_count) = (buffers.vertex_array, buffers.index_count);
        let locations = Vertex::attributes().map(|a| a.location);

        self.shader.bind(device);

        self.shader.set_texture_slot(device, TEXTURE_UNIFORM, TEXTURE_UNIT);
        device.active_texture(TEXTURE_UNIT);
        self.texture.bind(device);

        let projection = self.camera.projection_matrix();
        self.shader.set_matrix4(device, PROJECTION_UNIFORM, &projection);
        let view = self.camera.view_matrix();
        self.shader.set_matrix4(device, VIEW_UNIFORM, &view);

        device.bind_vertex_array(Some(vertex_array));
        for location in locations {
            device.enable_vertex_attrib(location);
        }
        let drawn = device.draw_indexed(Primitive::Triangles, index_count);
        for location in locations {
            device.disable_vertex_attrib(location);
        }
        device.bind_vertex_array(None);

        for entity in &mut self.entities {
            entity.update(dt, input);
        }

        self.shader.unbind(device);
        drawn
    }

    /// Deletes every GPU object the scene owns.
    pub fn release(mut self, device: &mut dyn RenderDevice) {
        if let Some(buffers) = self.buffers.take() {
            device.bind_vertex_array(None);
            device.delete_buffer(buffers.vertex_buffer);
            device.delete_buffer(buffers.index_buffer);
            device.delete_vertex_array(buffers.vertex_array);
        }
        self.shader.release(device);
        self.texture.release(device);
        log::debug!("scene released");
    }
}

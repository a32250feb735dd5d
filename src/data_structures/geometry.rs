//! Interleaved vertex data and triangle indices.

use std::mem;

use crate::device::VertexAttribute;

/// Position, colour and texture coordinates, nine floats in total.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const POSITION_LOCATION: u32 = 0;
    pub const COLOR_LOCATION: u32 = 1;
    pub const UV_LOCATION: u32 = 2;

    pub const fn new(position: [f32; 3], color: [f32; 4], uv: [f32; 2]) -> Self {
        Self {
            position,
            color,
            uv,
        }
    }

    /// Attribute pointers for locations 0 (position), 1 (colour) and 2 (UV).
    ///
    /// Offsets follow the field sizes so they stay in sync with the struct.
    pub fn attributes() -> [VertexAttribute; 3] {
        let float = mem::size_of::<f32>() as u32;
        let position = (mem::size_of::<[f32; 3]>() as u32) / float;
        let color = (mem::size_of::<[f32; 4]>() as u32) / float;
        let uv = (mem::size_of::<[f32; 2]>() as u32) / float;
        let stride = mem::size_of::<Vertex>() as u32;
        [
            VertexAttribute {
                location: Self::POSITION_LOCATION,
                components: position,
                stride,
                offset: 0,
            },
            VertexAttribute {
                location: Self::COLOR_LOCATION,
                components: color,
                stride,
                offset: position * float,
            },
            VertexAttribute {
                location: Self::UV_LOCATION,
                components: uv,
                stride,
                offset: (position + color) * float,
            },
        ]
    }
}

/// A triangle list.
#[derive(Clone, Debug, PartialEq)]
pub struct Geometry {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Geometry {
    /// A 100x100 quad with its bottom-left corner at the origin, as two
    /// triangles.
    pub fn quad() -> Self {
        Self {
            vertices: vec![
                // bottom right
                Vertex::new([100.0, 0.0, 0.0], [1.0, 0.0, 0.0, 1.0], [1.0, 0.0]),
                // bottom left
                Vertex::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 1.0], [0.0, 0.0]),
                // top left
                Vertex::new([0.0, 100.0, 0.0], [0.0, 0.0, 1.0, 1.0], [0.0, 1.0]),
                // top right
                Vertex::new([100.0, 100.0, 0.0], [0.0, 1.0, 0.0, 1.0], [1.0, 1.0]),
            ],
            indices: vec![0, 2, 1, 0, 2, 3],
        }
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::quad()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_offsets_follow_the_interleaved_layout() {
        let [position, color, uv] = Vertex::attributes();
        assert_eq!(position.stride, 36);
        assert_eq!((position.location, position.components, position.offset), (0, 3, 0));
        assert_eq!((color.location, color.components, color.offset), (1, 4, 12));
        assert_eq!((uv.location, uv.components, uv.offset), (2, 2, 28));
        assert!(color.stride == 36 && uv.stride == 36);
    }

    #[test]
    fn quad_is_two_triangles_over_four_vertices() {
        let quad = Geometry::quad();
        assert_eq!(quad.indices, [0, 2, 1, 0, 2, 3]);
        assert_eq!(quad.triangle_count(), 2);
        assert_eq!(quad.vertex_bytes().len(), 4 * 36);
        assert_eq!(quad.index_bytes().len(), 6 * 4);
        assert!(quad.indices.iter().all(|&i| (i as usize) < quad.vertices.len()));
    }

    #[test]
    fn uv_origin_is_the_bottom_left_corner() {
        let quad = Geometry::quad();
        let bottom_left = quad.vertices[1];
        assert_eq!(bottom_left.position, [0.0, 0.0, 0.0]);
        assert_eq!(bottom_left.uv, [0.0, 0.0]);
    }
}

//! Shader programs and the GPU pipelines built from them.
//!
//! - `reflect` compiles WGSL stages on the host and links their interfaces
//! - `shader` owns a program and its typed uniform setters
//! - `basic` turns a linked program plus a vertex layout into a wgpu pipeline

pub mod basic;
pub mod reflect;
pub mod shader;

// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
//! GPU backend boundary
//!
//! The refresh never talks to a graphics API directly. Everything it needs
//! from the device goes through [`GpuBackend`]; vertex and uniform data are
//! plain `Pod` structs handed over as bytes.

use bytemuck::{Pod, Zeroable};

/// Opaque handle of a texture owned by the backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// Texture unit for diffuse images.
pub const TMU_DIFFUSE: u32 = 0;
/// Texture unit for the lightmap array.
pub const TMU_LIGHTMAP: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderId {
    /// Diffuse * sum of 4 lightmap layers, plus dynamic lights.
    Lightmapped,
    /// Same as `Lightmapped` with the texture scrolling.
    LightmappedFlow,
    /// Warped water/lava/slime, no lightmap.
    Turbulent,
    /// Translucent world surface, no lightmap.
    Translucent,
    Sky,
    Alias,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformBlockId {
    Frame,
    Entity,
    LightStyles,
    DynamicLights,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveTopology {
    TriangleList,
}

/// What part of the last vertex upload a draw consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawRange {
    Indices { first: u32, count: u32 },
}

/// Device operations used by the refresh.
///
/// Calls are treated as blocking for sequencing purposes; a backend is free
/// to pipeline them internally.
pub trait GpuBackend {
    /// Create a 2D (array) texture with `layers` RGBA8 layers.
    fn allocate_texture(&mut self, width: u32, height: u32, layers: u32) -> TextureId;
    /// Replace one layer of a texture with tightly packed RGBA8 texels.
    fn upload_texture_2d(&mut self, texture: TextureId, layer: u32, width: u32, height: u32, rgba: &[u8]);
    fn bind_texture(&mut self, unit: u32, texture: TextureId);
    /// Replace the current vertex/index stream. Subsequent draws index into it.
    fn upload_vertex_data(&mut self, vertices: &[u8], stride: u32, indices: &[u32]);
    fn draw(&mut self, topology: PrimitiveTopology, range: DrawRange);
    fn use_shader(&mut self, shader: ShaderId);
    fn set_uniform_block(&mut self, block: UniformBlockId, data: &[u8]);
}

/// Upload a typed vertex slice plus indices.
pub fn upload_vertices<V: Pod>(gpu: &mut dyn GpuBackend, vertices: &[V], indices: &[u32]) {
    gpu.upload_vertex_data(
        bytemuck::cast_slice(vertices),
        std::mem::size_of::<V>() as u32,
        indices,
    );
}

/// Upload one uniform block.
pub fn set_uniforms<U: Pod>(gpu: &mut dyn GpuBackend, block: UniformBlockId, data: &U) {
    gpu.set_uniform_block(block, bytemuck::bytes_of(data));
}

// ============================================================
// Vertex formats
// ============================================================

/// World surface vertex.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct WorldVertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
    pub lm_coord: [f32; 2],
    pub normal: [f32; 3],
    /// First of the surface's 4 layers in the lightmap array.
    pub lm_layer: u32,
    /// Bitmask of the dynamic lights touching the surface this frame.
    pub light_flags: u32,
    /// Light style index per lightmap layer, 255 = unused.
    pub styles: [u8; 4],
}

/// Sky box vertex.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SkyVertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
}

/// Interpolated alias model vertex.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct AliasVertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
    pub color: [f32; 4],
}

// ============================================================
// Uniform blocks
// ============================================================

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view_origin: [f32; 4],
    pub time: f32,
    pub pad: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct EntityUniforms {
    pub model: [[f32; 4]; 4],
    /// rgb tint, alpha
    pub color: [f32; 4],
}

impl Default for EntityUniforms {
    fn default() -> Self {
        Self {
            model: IDENTITY,
            color: [1.0; 4],
        }
    }
}

pub const IDENTITY: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Per-style rgb scale; w unused.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LightStyleUniforms {
    pub styles: [[f32; 4]; 256],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct DlightUniform {
    pub origin: [f32; 3],
    pub intensity: f32,
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DlightUniforms {
    pub lights: [DlightUniform; 32],
    pub count: u32,
    pub pad: [u32; 3],
}

// ============================================================
// Test backend
// ============================================================


// =============================================================
//  Tests
// =============================================================

// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// qfiles.rs — level and model data as handed over by the file loaders
//
// The loaders decode the on-disk lumps; everything here is already
// byte-swapped and split into typed records.

use crate::q_shared::Vec3;

// ============================================================
// MD2 model format
// ============================================================

pub const ALIAS_VERSION: i32 = 8;

pub const MAX_TRIANGLES: usize = 4096;
pub const MAX_VERTS: usize = 2048;
pub const MAX_FRAMES: usize = 512;
pub const MAX_MD2SKINS: usize = 32;

#[derive(Debug, Clone, Copy, Default)]
pub struct DStVert {
    pub s: i16,
    pub t: i16,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DTriangle {
    pub index_xyz: [i16; 3],
    pub index_st: [i16; 3],
}

/// One compressed vertex: byte position plus an index into the
/// precomputed normal table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DTriVertx {
    pub v: [u8; 3],
    pub lightnormalindex: u8,
}

#[derive(Debug, Clone, Default)]
pub struct DAliasFrame {
    pub scale: Vec3,
    pub translate: Vec3,
    pub name: String,
    pub verts: Vec<DTriVertx>,
}

/// Header counts of an MD2 file.
#[derive(Debug, Clone, Copy, Default)]
pub struct DMdl {
    pub version: i32,
    pub skinwidth: i32,
    pub skinheight: i32,
    pub num_skins: i32,
    pub num_xyz: i32,
    pub num_st: i32,
    pub num_tris: i32,
    pub num_glcmds: i32,
    pub num_frames: i32,
}

/// A parsed MD2 file.
///
/// `glcmds` is the raw command stream: a signed vertex count (positive for a
/// strip, negative for a fan, zero terminates) followed by `count` triples of
/// `(s as f32 bits, t as f32 bits, vertex index)`.
#[derive(Debug, Clone, Default)]
pub struct Md2Data {
    pub header: DMdl,
    pub skins: Vec<String>,
    pub st: Vec<DStVert>,
    pub tris: Vec<DTriangle>,
    pub frames: Vec<DAliasFrame>,
    pub glcmds: Vec<i32>,
}

// ============================================================
// BSP level format
// ============================================================

pub const MAX_MAP_MODELS: usize = 1024;
pub const MAX_MAP_TEXINFO: usize = 8192;
pub const MAX_MAP_PLANES: usize = 65536;
pub const MAX_MAP_NODES: usize = 65536;
pub const MAX_MAP_LEAFS: usize = 65536;
pub const MAX_MAP_VERTS: usize = 65536;
pub const MAX_MAP_FACES: usize = 65536;
pub const MAX_MAP_LEAFFACES: usize = 65536;
pub const MAX_MAP_EDGES: usize = 128000;
pub const MAX_MAP_SURFEDGES: usize = 256000;

pub const MAXLIGHTMAPS: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct DModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub headnode: i32,
    pub firstface: i32,
    pub numfaces: i32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DVertex {
    pub point: Vec3,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DPlane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: i32,
}

/// Interior node. Negative children are leaves: `-1 - leafnum`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DNode {
    pub planenum: i32,
    pub children: [i32; 2],
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstface: u16,
    pub numfaces: u16,
}

#[derive(Debug, Clone, Default)]
pub struct TexInfo {
    pub vecs: [[f32; 4]; 2], // [s/t][xyz offset]
    pub flags: i32,
    pub value: i32,
    pub texture: String,
    pub nexttexinfo: i32, // for animations, -1 = end of chain
}

/// Edge vertex indices. Edge 0 is never used; negative surfedges
/// walk an edge backwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct DEdge {
    pub v: [u16; 2],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DFace {
    pub planenum: u16,
    pub side: i16,
    pub firstedge: i32,
    pub numedges: i16,
    pub texinfo: i16,
    pub styles: [u8; MAXLIGHTMAPS],
    pub lightofs: i32, // start of [numstyles*surfsize] samples, -1 if none
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DLeaf {
    pub contents: i32,
    pub cluster: i16,
    pub area: i16,
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstleafface: u16,
    pub numleaffaces: u16,
}

/// Compressed visibility: per cluster a byte offset into `data` for the
/// run-length encoded PVS row.
#[derive(Debug, Clone, Default)]
pub struct DVis {
    pub numclusters: i32,
    pub bitofs_pvs: Vec<i32>,
    pub data: Vec<u8>,
}

/// A parsed level, one vector per lump.
#[derive(Debug, Clone, Default)]
pub struct BspData {
    pub name: String,
    pub planes: Vec<DPlane>,
    pub vertexes: Vec<DVertex>,
    pub edges: Vec<DEdge>,
    pub surfedges: Vec<i32>,
    pub texinfo: Vec<TexInfo>,
    pub faces: Vec<DFace>,
    pub leaffaces: Vec<u16>,
    pub leafs: Vec<DLeaf>,
    pub nodes: Vec<DNode>,
    pub models: Vec<DModel>,
    pub lighting: Vec<u8>,
    pub visibility: Option<DVis>,
}

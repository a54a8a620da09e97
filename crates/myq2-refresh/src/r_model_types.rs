// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// r_model_types.rs
// In-memory world and alias model structures.
// Everything here is built once at level load and read-only afterwards;
// per-frame marks live in r_local::WorldFrameState.

use myq2_common::q_shared::{CPlane, SurfFlags, Vec3};
use myq2_common::qfiles::{DMdl, DAliasFrame, DStVert, DTriangle, MAXLIGHTMAPS};

use crate::r_backend::TextureId;

// ============================================================================
// IMAGES
// ============================================================================

/// A texture the caller already uploaded, identified by its GPU handle.
#[derive(Debug, Clone)]
pub struct Image {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub texnum: TextureId,
}

// ============================================================================
// BRUSH MODELS
// ============================================================================

pub const SIDE_FRONT: i32 = 0;
pub const SIDE_BACK: i32 = 1;
pub const SIDE_ON: i32 = 2;

bitflags::bitflags! {
    /// Draw flags derived at load time for each surface.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SurfaceFlags: u32 {
        const PLANEBACK  = 0x02;
        const DRAWSKY    = 0x04;
        const DRAWTURB   = 0x10;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MEdge {
    pub v: [u32; 2],
}

#[derive(Debug, Clone)]
pub struct MTexInfo {
    pub vecs: [[f32; 4]; 2],
    pub flags: SurfFlags,
    pub numframes: i32,
    pub next: Option<usize>, // animation chain
    pub image: usize,        // index into WorldModel::images
}

/// One cached polygon vertex.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PolyVert {
    pub xyz: Vec3,
    pub st: [f32; 2],
    pub lm_st: [f32; 2],
}

/// Convex polygon, drawn as a fan.
#[derive(Debug, Clone, Default)]
pub struct GlPoly {
    pub verts: Vec<PolyVert>,
}

#[derive(Debug, Clone)]
pub struct MSurface {
    pub plane: usize,
    pub flags: SurfaceFlags,

    pub firstedge: i32, // look up in model->surfedges[], negative numbers
    pub numedges: i32,  // are backwards edges

    pub texturemins: [i16; 2],
    pub extents: [i16; 2],

    pub light_s: i32, // lightmap tex coordinates
    pub light_t: i32,
    pub lightmaptexturenum: i32,

    pub polys: Vec<GlPoly>, // one polygon, or the subdivided warp pieces

    pub texinfo: usize,

    pub styles: [u8; MAXLIGHTMAPS],
    pub samples: Option<usize>, // byte offset into WorldModel::lightdata
}

impl MSurface {
    /// Lightmap size in texels.
    pub fn lightmap_size(&self) -> (i32, i32) {
        (
            (self.extents[0] as i32 >> 4) + 1,
            (self.extents[1] as i32 >> 4) + 1,
        )
    }
}

/// A child slot of an interior node: either another node or a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MNodeRef {
    Node(usize),
    Leaf(usize),
}

#[derive(Debug, Clone)]
pub struct MNode {
    pub minmaxs: [f32; 6], // for bounding box culling
    pub parent: Option<usize>,

    pub plane: usize,
    pub children: [MNodeRef; 2],

    pub firstsurface: usize,
    pub numsurfaces: usize,
}

#[derive(Debug, Clone)]
pub struct MLeaf {
    pub contents: i32,
    pub minmaxs: [f32; 6],
    pub parent: Option<usize>,

    pub cluster: i32,
    pub area: i32,

    pub firstmarksurface: usize, // index into WorldModel::marksurfaces
    pub nummarksurfaces: usize,
}

/// Inline brush model (doors, platforms); submodel 0 is the world itself.
#[derive(Debug, Clone)]
pub struct MModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub radius: f32,
    pub headnode: MNodeRef,
    pub firstface: usize,
    pub numfaces: usize,
}

/// Compressed PVS rows, one per cluster.
#[derive(Debug, Clone, Default)]
pub struct VisData {
    pub numclusters: i32,
    pub bitofs: Vec<usize>,
    pub data: Vec<u8>,
}

/// A finished level.
#[derive(Debug, Clone, Default)]
pub struct WorldModel {
    pub name: String,

    pub planes: Vec<CPlane>,
    pub vertexes: Vec<Vec3>,
    pub edges: Vec<MEdge>,
    pub surfedges: Vec<i32>,

    pub images: Vec<Image>,
    pub texinfo: Vec<MTexInfo>,
    pub surfaces: Vec<MSurface>,
    pub marksurfaces: Vec<usize>,

    pub nodes: Vec<MNode>,
    pub leafs: Vec<MLeaf>,
    pub submodels: Vec<MModel>,

    pub vis: Option<VisData>,
    pub lightdata: Vec<u8>,

    pub lightmap_texture: TextureId,
    pub lightmap_pages: i32,
}

impl WorldModel {
    /// Root of the world tree.
    pub fn root(&self) -> MNodeRef {
        self.submodels
            .first()
            .map(|m| m.headnode)
            .unwrap_or(MNodeRef::Node(0))
    }
}

// ============================================================================
// ALIAS MODELS
// ============================================================================

/// A validated MD2 model with its skins resolved.
#[derive(Debug, Clone)]
pub struct AliasModel {
    pub name: String,
    pub header: DMdl,
    pub st: Vec<DStVert>,
    pub tris: Vec<DTriangle>,
    pub frames: Vec<DAliasFrame>,
    pub glcmds: Vec<i32>,
    pub skins: Vec<TextureId>,
    pub mins: Vec3,
    pub maxs: Vec3,
}

impl AliasModel {
    pub fn num_frames(&self) -> i32 {
        self.frames.len() as i32
    }
}

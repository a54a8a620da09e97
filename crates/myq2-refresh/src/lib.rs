// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later

#![allow(clippy::too_many_arguments, clippy::manual_range_contains, clippy::float_cmp,
         clippy::needless_range_loop, clippy::identity_op, clippy::new_without_default)]
// World refresh: visibility, lightmaps, surface batching, sky and alias meshes

// GPU seam
pub mod r_backend;

// level data and loading
pub mod r_local;
pub mod r_model_types;
pub mod r_model;
pub mod r_lightmap;

// per-frame passes
pub mod r_vis;
pub mod r_light;
pub mod r_surf;
pub mod r_warp;
pub mod r_anorms;
pub mod r_mesh;
pub mod r_main;

pub use r_backend::{GpuBackend, ShaderId, TextureId, UniformBlockId};
pub use r_local::{DLight, Entity, EntityModel, FrameStats, LightStyle, RefDef, RefreshError, RefreshSettings};
pub use r_main::Refresh;

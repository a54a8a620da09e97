// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// r_local.rs
// Refresh local definitions: frame input, per-frame state, settings, errors.

use myq2_common::common::{com_dprintf, com_printf};
use myq2_common::cvar::{CvarContext, CVAR_ARCHIVE, CVAR_LATCH};
use myq2_common::q_shared::*;

use crate::r_backend::TextureId;
use crate::r_model_types::WorldModel;

pub const BACKFACE_EPSILON: f32 = 0.01;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("{model}: {reason}")]
    BadLump { model: String, reason: String },

    #[error("{model}: {reason}")]
    BadAliasModel { model: String, reason: String },

    #[error("consecutive calls to LM_AllocBlock({w},{h}) failed")]
    LightmapOverflow { w: i32, h: i32 },

    #[error("MAX_LIGHTMAPS exceeded")]
    TooManyLightmaps,

    #[error("{0} dynamic lights exceed MAX_DLIGHTS")]
    TooManyDlights(usize),

    #[error("bad surface lightmap: {0}")]
    BadSurfaceLightmap(String),

    #[error("ClipSkyPolygon: MAX_CLIP_VERTS")]
    TooManyClipVerts,

    #[error("R_RenderFrame: NULL worldmodel")]
    NoWorldModel,
}

impl RefreshError {
    pub(crate) fn bad_lump(model: &str, reason: impl Into<String>) -> Self {
        RefreshError::BadLump {
            model: model.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn bad_alias(model: &str, reason: impl Into<String>) -> Self {
        RefreshError::BadAliasModel {
            model: model.to_string(),
            reason: reason.into(),
        }
    }

    /// ERR_DROP aborts the level or frame; ERR_FATAL means a fixed-size
    /// table ran out.
    pub fn severity(&self) -> i32 {
        match self {
            RefreshError::TooManyLightmaps | RefreshError::TooManyDlights(_) => ERR_FATAL,
            RefreshError::LightmapOverflow { .. } => ERR_FATAL,
            _ => ERR_DROP,
        }
    }
}

/// Print through the console channels.
pub fn vid_printf(level: i32, msg: &str) {
    if level == PRINT_DEVELOPER {
        com_dprintf(msg);
    } else {
        com_printf(msg);
    }
}

// ============================================================================
// Frame input
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct DLight {
    pub origin: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct LightStyle {
    pub rgb: Vec3, // 0.0 - 2.0
    pub white: f32, // highest of rgb
}

impl Default for LightStyle {
    fn default() -> Self {
        Self { rgb: [1.0; 3], white: 3.0 }
    }
}

/// What an entity draws.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntityModel {
    #[default]
    None,
    /// Inline brush model `*n` of the current level.
    Brush(usize),
    /// Handle returned by `Refresh::register_alias_model`.
    Alias(usize),
}

#[derive(Debug, Clone, Default)]
pub struct Entity {
    pub model: EntityModel,
    pub angles: Vec3,

    // most recent data
    pub origin: Vec3,
    pub frame: i32,

    // previous data for lerping
    pub oldorigin: Vec3,
    pub oldframe: i32,

    // misc
    pub backlerp: f32, // 0.0 = current, 1.0 = old
    pub skinnum: i32,
    pub skin: Option<TextureId>, // custom skin overrides the model's

    pub alpha: f32, // ignore if RF_TRANSLUCENT isn't set
    pub flags: i32,
}

/// Everything the caller supplies for one frame.
#[derive(Debug, Clone)]
pub struct RefDef {
    pub fov_x: f32,
    pub fov_y: f32,
    pub vieworg: Vec3,
    pub viewangles: Vec3,
    pub time: f32, // time is used to auto animate
    pub rdflags: i32,

    pub areabits: Option<Vec<u8>>, // if None, all areas are visible

    pub lightstyles: Vec<LightStyle>,
    pub entities: Vec<Entity>,
    pub dlights: Vec<DLight>,
}

impl Default for RefDef {
    fn default() -> Self {
        Self {
            fov_x: 90.0,
            fov_y: 90.0,
            vieworg: [0.0; 3],
            viewangles: [0.0; 3],
            time: 0.0,
            rdflags: 0,
            areabits: None,
            lightstyles: vec![LightStyle::default(); MAX_LIGHTSTYLES],
            entities: Vec::new(),
            dlights: Vec::new(),
        }
    }
}

/// Column-major model-to-world matrix for an origin and angles.
pub fn entity_matrix(origin: &Vec3, angles: &Vec3) -> [[f32; 4]; 4] {
    let (f, r, u) = angle_vectors(angles);
    [
        [f[0], f[1], f[2], 0.0],
        [-r[0], -r[1], -r[2], 0.0],
        [u[0], u[1], u[2], 0.0],
        [origin[0], origin[1], origin[2], 1.0],
    ]
}

// ============================================================================
// Per-frame state
// ============================================================================

/// Generation stamps and light masks for one world.
///
/// Indexed in parallel with the world's nodes, leafs and surfaces. A node,
/// leaf or surface is marked for a frame when its stamp equals that
/// frame's counter; nothing is ever cleared.
#[derive(Debug, Clone, Default)]
pub struct WorldFrameState {
    pub node_visframe: Vec<i32>,
    pub leaf_visframe: Vec<i32>,
    pub surf_visframe: Vec<i32>,
    pub surf_dlightframe: Vec<i32>,
    pub surf_dlightbits: Vec<u32>,
}

impl WorldFrameState {
    pub fn new(world: &WorldModel) -> Self {
        let numsurfaces = world.surfaces.len();
        Self {
            node_visframe: vec![0; world.nodes.len()],
            leaf_visframe: vec![0; world.leafs.len()],
            surf_visframe: vec![0; numsurfaces],
            surf_dlightframe: vec![0; numsurfaces],
            surf_dlightbits: vec![0; numsurfaces],
        }
    }

    /// Light mask of a surface for `dlightframe`, zero when stale.
    pub fn dlightbits(&self, surf: usize, dlightframe: i32) -> u32 {
        if self.surf_dlightframe[surf] == dlightframe {
            self.surf_dlightbits[surf]
        } else {
            0
        }
    }
}

/// Counters reported when `r_speeds` is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub brush_polys: u32,
    pub alias_polys: u32,
    pub visible_leafs: u32,
    pub texture_binds: u32,
    pub draw_calls: u32,
    pub pvs_recomputed: bool,
}

// ============================================================================
// Settings
// ============================================================================

/// Cvar values read once at the top of each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshSettings {
    pub novis: bool,
    pub lockpvs: bool,
    pub nocull: bool,
    pub dynamic: bool,
    pub drawworld: bool,
    pub drawentities: bool,
    pub speeds: bool,
    pub modulate: f32,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            novis: false,
            lockpvs: false,
            nocull: false,
            dynamic: true,
            drawworld: true,
            drawentities: true,
            speeds: false,
            modulate: 1.0,
        }
    }
}

impl RefreshSettings {
    /// Register the refresh cvars with their defaults.
    pub fn register(cvars: &mut CvarContext) {
        cvars.get("r_novis", "0", 0);
        cvars.get("r_lockpvs", "0", 0);
        cvars.get("r_nocull", "0", 0);
        cvars.get("r_dynamic", "1", 0);
        cvars.get("r_drawworld", "1", 0);
        cvars.get("r_drawentities", "1", 0);
        // lightmaps are built at load time
        cvars.get("r_fullbright", "0", CVAR_LATCH);
        cvars.get("r_speeds", "0", 0);
        cvars.get("r_modulate", "1", CVAR_ARCHIVE);
        cvars.get("r_lightlevel", "0", 0);
    }

    pub fn from_cvars(cvars: &CvarContext) -> Self {
        Self {
            novis: cvars.variable_value("r_novis") != 0.0,
            lockpvs: cvars.variable_value("r_lockpvs") != 0.0,
            nocull: cvars.variable_value("r_nocull") != 0.0,
            dynamic: cvars.variable_value("r_dynamic") != 0.0,
            drawworld: cvars.variable_value("r_drawworld") != 0.0,
            drawentities: cvars.variable_value("r_drawentities") != 0.0,
            speeds: cvars.variable_value("r_speeds") != 0.0,
            modulate: cvars.variable_value("r_modulate"),
        }
    }
}

// =============================================================
//  Tests
// =============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults_round_trip_through_cvars() {
        let mut cvars = CvarContext::new();
        RefreshSettings::register(&mut cvars);
        assert_eq!(RefreshSettings::from_cvars(&cvars), RefreshSettings::default());
    }

    #[test]
    fn test_settings_read_changed_cvars() {
        let mut cvars = CvarContext::new();
        RefreshSettings::register(&mut cvars);
        cvars.set("r_novis", "1");
        cvars.set("r_modulate", "2");
        let s = RefreshSettings::from_cvars(&cvars);
        assert!(s.novis);
        assert_eq!(s.modulate, 2.0);
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(RefreshError::TooManyLightmaps.severity(), ERR_FATAL);
        assert_eq!(RefreshError::LightmapOverflow { w: 1, h: 1 }.severity(), ERR_FATAL);
        assert_eq!(RefreshError::bad_lump("maps/x.bsp", "bad").severity(), ERR_DROP);
        assert_eq!(RefreshError::NoWorldModel.severity(), ERR_DROP);
    }

    #[test]
    fn test_error_messages() {
        let e = RefreshError::bad_alias("models/a.md2", "has no frames");
        assert_eq!(e.to_string(), "models/a.md2: has no frames");
        let e = RefreshError::LightmapOverflow { w: 9, h: 2 };
        assert_eq!(e.to_string(), "consecutive calls to LM_AllocBlock(9,2) failed");
    }

    #[test]
    fn test_entity_matrix_unrotated_is_translation() {
        let m = entity_matrix(&[1.0, 2.0, 3.0], &[0.0; 3]);
        for i in 0..3 {
            for j in 0..3 {
                let want = if i == j { 1.0 } else { 0.0 };
                assert!((m[i][j] - want).abs() < 1e-6);
            }
        }
        assert_eq!(m[3], [1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_entity_matrix_yaw_turns_forward() {
        let m = entity_matrix(&[0.0; 3], &[0.0, 90.0, 0.0]);
        // local +x ends up along world +y
        assert!(m[0][0].abs() < 1e-6);
        assert!((m[0][1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dlightbits_stale_frame_reads_zero() {
        let mut st = WorldFrameState::default();
        st.surf_dlightframe = vec![5];
        st.surf_dlightbits = vec![0b101];
        assert_eq!(st.dlightbits(0, 5), 0b101);
        assert_eq!(st.dlightbits(0, 6), 0);
    }
}

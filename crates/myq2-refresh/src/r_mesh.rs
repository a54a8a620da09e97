// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// r_mesh.rs — Alias model frame lerping and draw-list flattening

use myq2_common::q_shared::*;

use crate::r_anorms::{BYTEDIRS, NUMVERTEXNORMALS};
use crate::r_backend::{
    set_uniforms, upload_vertices, AliasVertex, DrawRange, EntityUniforms, GpuBackend, PrimitiveTopology,
    ShaderId, TextureId, UniformBlockId, TMU_DIFFUSE,
};
use crate::r_local::{entity_matrix, vid_printf, Entity};
use crate::r_model_types::AliasModel;
use crate::r_surf::push_fan_indices;

/// How far shell vertices are pushed out along their normal.
pub const POWERSUIT_SCALE: f32 = 4.0;

/// Frame index to use for `frame`, or 0 with a developer warning when the
/// model has no such frame.
pub fn clamp_frame(model: &AliasModel, frame: i32, caller: &str) -> usize {
    if frame < 0 || frame >= model.num_frames() {
        vid_printf(
            PRINT_DEVELOPER,
            &format!("{}: no such frame {} in {}\n", caller, frame, model.name),
        );
        return 0;
    }
    frame as usize
}

// ============================================================
// Gl command lists
// ============================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlCmdKind {
    Strip,
    Fan,
}

/// Iterate the runs of a command list as `(kind, triples)`, where every
/// triple is `(s bits, t bits, vertex index)`.
pub fn gl_commands(cmds: &[i32]) -> impl Iterator<Item = (GlCmdKind, &[i32])> {
    let mut i = 0;
    std::iter::from_fn(move || {
        let count = *cmds.get(i)?;
        if count == 0 {
            return None;
        }
        let n = count.unsigned_abs() as usize;
        let run = cmds.get(i + 1..i + 1 + n * 3)?;
        i += 1 + n * 3;
        let kind = if count < 0 { GlCmdKind::Fan } else { GlCmdKind::Strip };
        Some((kind, run))
    })
}

/// Triangle indices needed to draw the whole command list.
pub fn count_indices(cmds: &[i32]) -> usize {
    gl_commands(cmds)
        .map(|(_, run)| (run.len() / 3).saturating_sub(2) * 3)
        .sum()
}

/// Indices of an `n` vertex strip, flipping every other triangle so all
/// of them keep the first one's winding.
pub fn push_strip_indices(indices: &mut Vec<u32>, base: u32, n: usize) {
    for i in 0..n.saturating_sub(2) as u32 {
        if i & 1 == 0 {
            indices.extend_from_slice(&[base + i, base + i + 1, base + i + 2]);
        } else {
            indices.extend_from_slice(&[base + i + 1, base + i, base + i + 2]);
        }
    }
}

// ============================================================
// Shading
// ============================================================

/// Per-entity lighting fed to the vertex colors.
#[derive(Debug, Clone, Copy)]
pub struct AliasShading<'a> {
    pub shadelight: Vec3,
    pub alpha: f32,
    /// Flat color, pushed-out vertices.
    pub shell: bool,
    pub shadedots: &'a [f32; NUMVERTEXNORMALS],
}

/// Base light color of an alias entity. `light_point` is only sampled
/// when no shell or fullbright flag decides the color.
pub fn shade_light(flags: i32, time: f32, light_point: impl FnOnce() -> Vec3) -> Vec3 {
    let mut shadelight;
    if flags & RF_SHELL_MASK != 0 {
        shadelight = [0.0; 3];
        if flags & RF_SHELL_HALF_DAM != 0 {
            shadelight = [0.56, 0.59, 0.45];
        }
        if flags & RF_SHELL_DOUBLE != 0 {
            shadelight[0] = 0.9;
            shadelight[1] = 0.7;
        }
        if flags & RF_SHELL_RED != 0 {
            shadelight[0] = 1.0;
        }
        if flags & RF_SHELL_GREEN != 0 {
            shadelight[1] = 1.0;
        }
        if flags & RF_SHELL_BLUE != 0 {
            shadelight[2] = 1.0;
        }
    } else if flags & RF_FULLBRIGHT != 0 {
        shadelight = [1.0; 3];
    } else {
        shadelight = light_point();
    }

    if flags & RF_MINLIGHT != 0 && shadelight.iter().all(|&c| c <= 0.1) {
        shadelight = [0.1; 3];
    }

    if flags & RF_GLOW != 0 {
        // bonus items will pulse with time
        let scale = 0.1 * (time * 7.0).sin();
        for c in shadelight.iter_mut() {
            let min = *c * 0.8;
            *c += scale;
            if *c < min {
                *c = min;
            }
        }
    }

    shadelight
}

/// Skin for an entity: its own override, else the model skin `skinnum`,
/// else the first skin.
pub fn alias_skin(model: &AliasModel, e: &Entity, notexture: TextureId) -> TextureId {
    if let Some(skin) = e.skin {
        return skin;
    }
    let n = usize::try_from(e.skinnum).ok().filter(|&n| n < model.skins.len()).unwrap_or(0);
    model.skins.get(n).copied().unwrap_or(notexture)
}

// ============================================================
// Assembly
// ============================================================

/// Buffers reused across models and frames.
#[derive(Debug, Default)]
pub struct MeshScratch {
    pub lerped: Vec<Vec3>,
    pub vertices: Vec<AliasVertex>,
    pub indices: Vec<u32>,
}

/// Interpolate the entity's two frames and flatten the command list into
/// one indexed triangle list in `scratch`. Positions are in model space.
pub fn assemble(model: &AliasModel, e: &Entity, shading: &AliasShading, scratch: &mut MeshScratch) {
    let frame = &model.frames[clamp_frame(model, e.frame, "R_DrawAliasModel")];
    let oldframe = &model.frames[clamp_frame(model, e.oldframe, "R_DrawAliasModel")];

    let backlerp = e.backlerp;
    let frontlerp = 1.0 - backlerp;

    // move should be the delta back to the previous frame * backlerp
    let delta = vector_subtract(&e.oldorigin, &e.origin);
    let (forward, right, up) = angle_vectors(&e.angles);
    let mut mv = [
        dot_product(&delta, &forward),  // forward
        -dot_product(&delta, &right),   // left
        dot_product(&delta, &up),       // up
    ];
    mv = vector_add(&mv, &oldframe.translate);

    let mut frontv = [0.0f32; 3];
    let mut backv = [0.0f32; 3];
    for i in 0..3 {
        mv[i] = backlerp * mv[i] + frontlerp * frame.translate[i];
        frontv[i] = frontlerp * frame.scale[i];
        backv[i] = backlerp * oldframe.scale[i];
    }

    scratch.lerped.clear();
    scratch.lerped.extend(frame.verts.iter().zip(oldframe.verts.iter()).map(|(v, ov)| {
        let mut p = [0.0f32; 3];
        for i in 0..3 {
            p[i] = mv[i] + ov.v[i] as f32 * backv[i] + v.v[i] as f32 * frontv[i];
        }
        if shading.shell {
            let normal = &BYTEDIRS[v.lightnormalindex as usize % NUMVERTEXNORMALS];
            p = vector_ma(&p, POWERSUIT_SCALE, normal);
        }
        p
    }));

    scratch.vertices.clear();
    scratch.indices.clear();
    scratch.indices.reserve(count_indices(&model.glcmds));

    for (kind, run) in gl_commands(&model.glcmds) {
        let base = scratch.vertices.len() as u32;
        let n = run.len() / 3;
        for t in run.chunks_exact(3) {
            let index = t[2] as usize;
            let color = if shading.shell {
                shading.shadelight
            } else {
                let l = shading.shadedots[frame.verts[index].lightnormalindex as usize % NUMVERTEXNORMALS];
                vector_scale(&shading.shadelight, l)
            };
            scratch.vertices.push(AliasVertex {
                position: scratch.lerped[index],
                tex_coord: [f32::from_bits(t[0] as u32), f32::from_bits(t[1] as u32)],
                color: [color[0], color[1], color[2], shading.alpha],
            });
        }
        match kind {
            GlCmdKind::Fan => push_fan_indices(&mut scratch.indices, base, n),
            GlCmdKind::Strip => push_strip_indices(&mut scratch.indices, base, n),
        }
    }
}

/// Assemble and submit one alias entity as a single draw. Returns the
/// model's triangle count.
pub fn draw_alias_model(
    gpu: &mut dyn GpuBackend,
    model: &AliasModel,
    e: &Entity,
    shading: &AliasShading,
    skin: TextureId,
    scratch: &mut MeshScratch,
) -> u32 {
    assemble(model, e, shading, scratch);
    if scratch.indices.is_empty() {
        return 0;
    }

    let uniforms = EntityUniforms {
        model: entity_matrix(&e.origin, &e.angles),
        color: [1.0, 1.0, 1.0, shading.alpha],
    };
    gpu.use_shader(ShaderId::Alias);
    set_uniforms(gpu, UniformBlockId::Entity, &uniforms);
    gpu.bind_texture(TMU_DIFFUSE, skin);
    upload_vertices(gpu, &scratch.vertices, &scratch.indices);
    gpu.draw(
        PrimitiveTopology::TriangleList,
        DrawRange::Indices { first: 0, count: scratch.indices.len() as u32 },
    );

    model.header.num_tris.max(0) as u32
}

// =============================================================
//  Tests
// =============================================================

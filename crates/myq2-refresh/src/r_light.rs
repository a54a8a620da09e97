// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// r_light.rs — Dynamic light marking and light sampling

use myq2_common::q_shared::*;
use myq2_common::qfiles::MAXLIGHTMAPS;

use crate::r_backend::{DlightUniform, DlightUniforms};
use crate::r_local::{DLight, LightStyle, RefreshError, RefreshSettings, WorldFrameState};
use crate::r_model_types::*;

pub const DLIGHT_CUTOFF: f32 = 16.0;

/// Length of the downward trace used by `light_point`.
const LIGHT_TRACE_DIST: f32 = 2048.0;

// ============================================================
// DYNAMIC LIGHTS — BSP marking
// ============================================================

/// OR `bit` into the light mask of every surface `light` can reach below
/// `headnode`, facing the light.
///
/// A surface's mask is reset the first time it is touched in `dlightframe`.
pub fn mark_lights(
    world: &WorldModel,
    state: &mut WorldFrameState,
    light: &DLight,
    bit: u32,
    headnode: MNodeRef,
    dlightframe: i32,
) {
    let mut stack = vec![headnode];

    while let Some(r) = stack.pop() {
        let MNodeRef::Node(n) = r else {
            continue;
        };
        let node = &world.nodes[n];

        let splitplane = &world.planes[node.plane];
        let dist = dot_product(&light.origin, &splitplane.normal) - splitplane.dist;

        if dist > light.intensity - DLIGHT_CUTOFF {
            stack.push(node.children[0]);
            continue;
        }
        if dist < -light.intensity + DLIGHT_CUTOFF {
            stack.push(node.children[1]);
            continue;
        }

        // mark the polygons
        for s in node.firstsurface..node.firstsurface + node.numsurfaces {
            let surf = &world.surfaces[s];
            let plane = &world.planes[surf.plane];
            let dist2 = dot_product(&light.origin, &plane.normal) - plane.dist;
            let back = dist2 < 0.0;

            if surf.flags.contains(SurfaceFlags::PLANEBACK) != back {
                continue;
            }

            if state.surf_dlightframe[s] != dlightframe {
                state.surf_dlightbits[s] = bit;
                state.surf_dlightframe[s] = dlightframe;
            } else {
                state.surf_dlightbits[s] |= bit;
            }
        }

        stack.push(node.children[1]);
        stack.push(node.children[0]);
    }
}

/// Mark the world surfaces touched by this frame's lights.
pub fn push_dlights(
    world: &WorldModel,
    state: &mut WorldFrameState,
    dlights: &[DLight],
    dlightframe: i32,
    settings: &RefreshSettings,
) -> Result<(), RefreshError> {
    if dlights.len() > MAX_DLIGHTS {
        return Err(RefreshError::TooManyDlights(dlights.len()));
    }
    if !settings.dynamic {
        return Ok(());
    }

    let root = world.root();
    for (i, light) in dlights.iter().enumerate() {
        mark_lights(world, state, light, 1 << i, root, dlightframe);
    }
    Ok(())
}

/// Pack the frame's lights for the shader.
pub fn dlight_uniforms(dlights: &[DLight], dynamic: bool) -> DlightUniforms {
    let mut u = DlightUniforms {
        lights: [DlightUniform::default(); MAX_DLIGHTS],
        count: 0,
        pad: [0; 3],
    };
    if !dynamic {
        return u;
    }
    for (dst, dl) in u.lights.iter_mut().zip(dlights.iter()) {
        *dst = DlightUniform {
            origin: dl.origin,
            intensity: dl.intensity,
            color: [dl.color[0], dl.color[1], dl.color[2], 1.0],
        };
    }
    u.count = dlights.len().min(MAX_DLIGHTS) as u32;
    u
}

// ============================================================
// LIGHT SAMPLING
// ============================================================

enum TraceStep {
    Descend(MNodeRef, Vec3, Vec3),
    Impact(usize, Vec3, Vec3, MNodeRef),
}

/// Trace from `start` to `end` and return the static light of the first
/// lightmapped surface hit, or `None` if nothing was hit.
pub fn recursive_light_point(
    world: &WorldModel,
    headnode: MNodeRef,
    start: &Vec3,
    end: &Vec3,
    styles: &[LightStyle],
    modulate: f32,
) -> Option<Vec3> {
    let mut stack = vec![TraceStep::Descend(headnode, *start, *end)];

    while let Some(step) = stack.pop() {
        match step {
            TraceStep::Descend(MNodeRef::Leaf(_), _, _) => {} // didn't hit anything
            TraceStep::Descend(MNodeRef::Node(n), start, end) => {
                let node = &world.nodes[n];
                let plane = &world.planes[node.plane];
                let front = dot_product(&start, &plane.normal) - plane.dist;
                let back = dot_product(&end, &plane.normal) - plane.dist;
                let side = (front < 0.0) as usize;

                if (back < 0.0) == (front < 0.0) {
                    stack.push(TraceStep::Descend(node.children[side], start, end));
                    continue;
                }

                // calculate mid point
                let frac = front / (front - back);
                let mid = [
                    start[0] + (end[0] - start[0]) * frac,
                    start[1] + (end[1] - start[1]) * frac,
                    start[2] + (end[2] - start[2]) * frac,
                ];

                // front side first, then this node, then the back side
                stack.push(TraceStep::Impact(n, mid, end, node.children[side ^ 1]));
                stack.push(TraceStep::Descend(node.children[side], start, mid));
            }
            TraceStep::Impact(n, mid, end, back_child) => {
                let node = &world.nodes[n];
                for s in node.firstsurface..node.firstsurface + node.numsurfaces {
                    if let Some(color) = sample_surface(world, &world.surfaces[s], &mid, styles, modulate) {
                        return Some(color);
                    }
                }

                // go down back side
                stack.push(TraceStep::Descend(back_child, mid, end));
            }
        }
    }
    None
}

/// Light at `point` on `surf`, if the point lies within its lightmap.
fn sample_surface(
    world: &WorldModel,
    surf: &MSurface,
    point: &Vec3,
    styles: &[LightStyle],
    modulate: f32,
) -> Option<Vec3> {
    if surf.flags.intersects(SurfaceFlags::DRAWTURB | SurfaceFlags::DRAWSKY) {
        return None; // no lightmaps
    }

    let tex = &world.texinfo[surf.texinfo];
    let s = dot_product(point, &[tex.vecs[0][0], tex.vecs[0][1], tex.vecs[0][2]]) + tex.vecs[0][3];
    let t = dot_product(point, &[tex.vecs[1][0], tex.vecs[1][1], tex.vecs[1][2]]) + tex.vecs[1][3];
    let s = s as i32;
    let t = t as i32;

    if s < surf.texturemins[0] as i32 || t < surf.texturemins[1] as i32 {
        return None;
    }

    let ds = s - surf.texturemins[0] as i32;
    let dt = t - surf.texturemins[1] as i32;
    if ds > surf.extents[0] as i32 || dt > surf.extents[1] as i32 {
        return None;
    }

    let Some(base) = surf.samples else {
        return Some([0.0; 3]);
    };

    let (smax, tmax) = surf.lightmap_size();
    let size = (smax * tmax) as usize * 3;
    let mut ofs = base + 3 * ((dt >> 4) * smax + (ds >> 4)) as usize;

    let mut color = [0.0f32; 3];
    for &style in surf.styles.iter().take(MAXLIGHTMAPS) {
        if style == 255 {
            break;
        }
        let Some(rgb) = world.lightdata.get(ofs..ofs + 3) else {
            break;
        };
        let ls = styles.get(style as usize).copied().unwrap_or_default();
        for c in 0..3 {
            color[c] += rgb[c] as f32 * modulate * ls.rgb[c] * (1.0 / 255.0);
        }
        ofs += size;
    }
    Some(color)
}

/// Static plus dynamic light at a world point.
pub fn light_point(
    world: &WorldModel,
    p: &Vec3,
    styles: &[LightStyle],
    dlights: &[DLight],
    modulate: f32,
) -> Vec3 {
    if world.lightdata.is_empty() {
        return [1.0; 3];
    }

    let end = [p[0], p[1], p[2] - LIGHT_TRACE_DIST];
    let mut color = recursive_light_point(world, world.root(), p, &end, styles, modulate).unwrap_or([0.0; 3]);

    // add dynamic lights
    for dl in dlights {
        let dist = vector_subtract(p, &dl.origin);
        let add = (dl.intensity - vector_length(&dist)) * (1.0 / 256.0);
        if add > 0.0 {
            color = vector_ma(&color, add, &dl.color);
        }
    }

    vector_scale(&color, modulate)
}

// =============================================================
//  Tests
// =============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_model::fixtures::*;

    fn floor_room(light: Option<u8>) -> WorldModel {
        let mut floor = FaceSpec::quad([0.0, 0.0, 1.0], [0.0, 0.0, -8.0], 8.0, "e1u1/floor1_1");
        if let Some(v) = light {
            floor = floor.lit(v);
        }
        load_room(&[floor], [0.0; 3], &[])
    }

    fn light_at_height(z: f32) -> DLight {
        DLight { origin: [0.0, 0.0, z], color: [1.0, 0.5, 0.0], intensity: 100.0 }
    }

    // ---- marking ----

    #[test]
    fn test_cutoff_boundary() {
        let world = floor_room(None);

        // 85 units above the floor plane: beyond intensity - cutoff
        let mut state = WorldFrameState::new(&world);
        mark_lights(&world, &mut state, &light_at_height(-8.0 + 85.0), 1, world.root(), 1);
        assert_eq!(state.dlightbits(0, 1), 0);

        // 83 units: inside
        let mut state = WorldFrameState::new(&world);
        mark_lights(&world, &mut state, &light_at_height(-8.0 + 83.0), 1, world.root(), 1);
        assert_eq!(state.dlightbits(0, 1), 1);
    }

    #[test]
    fn test_light_behind_surface_is_ignored() {
        let world = floor_room(None);
        let mut state = WorldFrameState::new(&world);
        mark_lights(&world, &mut state, &light_at_height(-20.0), 1, world.root(), 1);
        assert_eq!(state.dlightbits(0, 1), 0);
    }

    #[test]
    fn test_push_dlights_ors_bits_and_resets_per_frame() {
        let world = floor_room(None);
        let mut state = WorldFrameState::new(&world);
        let settings = RefreshSettings::default();
        let lights = [light_at_height(0.0), light_at_height(10.0), light_at_height(500.0)];

        push_dlights(&world, &mut state, &lights, 1, &settings).unwrap();
        assert_eq!(state.dlightbits(0, 1), 0b011);

        push_dlights(&world, &mut state, &lights[1..2], 2, &settings).unwrap();
        assert_eq!(state.dlightbits(0, 2), 0b001);
        assert_eq!(state.dlightbits(0, 1), 0);
    }

    #[test]
    fn test_push_dlights_disabled() {
        let world = floor_room(None);
        let mut state = WorldFrameState::new(&world);
        let settings = RefreshSettings { dynamic: false, ..Default::default() };
        push_dlights(&world, &mut state, &[light_at_height(0.0)], 1, &settings).unwrap();
        assert_eq!(state.dlightbits(0, 1), 0);
    }

    #[test]
    fn test_too_many_dlights_is_fatal() {
        let world = floor_room(None);
        let mut state = WorldFrameState::new(&world);
        let lights = vec![light_at_height(0.0); MAX_DLIGHTS + 1];
        let err = push_dlights(&world, &mut state, &lights, 1, &RefreshSettings::default()).unwrap_err();
        assert!(matches!(err, RefreshError::TooManyDlights(33)));
        assert_eq!(err.severity(), ERR_FATAL);
    }

    #[test]
    fn test_dlight_uniforms() {
        let u = dlight_uniforms(&[light_at_height(4.0)], true);
        assert_eq!(u.count, 1);
        assert_eq!(u.lights[0].origin, [0.0, 0.0, 4.0]);
        assert_eq!(u.lights[0].color, [1.0, 0.5, 0.0, 1.0]);
        assert_eq!(dlight_uniforms(&[light_at_height(4.0)], false).count, 0);
    }

    // ---- sampling ----

    #[test]
    fn test_light_point_samples_floor() {
        let world = floor_room(Some(128));
        let styles = vec![LightStyle::default(); MAX_LIGHTSTYLES];
        let c = light_point(&world, &[0.0; 3], &styles, &[], 1.0);
        for v in c {
            assert!((v - 128.0 / 255.0).abs() < 1e-5, "{:?}", c);
        }
    }

    #[test]
    fn test_light_point_follows_style_scale() {
        let world = floor_room(Some(255));
        let mut styles = vec![LightStyle::default(); MAX_LIGHTSTYLES];
        styles[0].rgb = [0.5, 0.0, 2.0];
        let c = light_point(&world, &[0.0; 3], &styles, &[], 1.0);
        assert!((c[0] - 0.5).abs() < 1e-5);
        assert_eq!(c[1], 0.0);
        assert!((c[2] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_light_point_adds_dlights() {
        let world = floor_room(Some(0));
        let styles = vec![LightStyle::default(); MAX_LIGHTSTYLES];
        let dl = DLight { origin: [0.0, 0.0, 36.0], color: [1.0, 1.0, 1.0], intensity: 100.0 };
        let c = light_point(&world, &[0.0; 3], &styles, &[dl], 1.0);
        // (100 - 36) / 256
        assert!((c[0] - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_light_point_without_lightdata_is_white() {
        let world = floor_room(None);
        let styles = vec![LightStyle::default(); MAX_LIGHTSTYLES];
        assert_eq!(light_point(&world, &[0.0; 3], &styles, &[], 2.0), [1.0; 3]);
    }

    #[test]
    fn test_light_point_miss_is_dark() {
        let world = floor_room(Some(200));
        let styles = vec![LightStyle::default(); MAX_LIGHTSTYLES];
        // outside the floor quad: the trace crosses the plane but no surface
        let c = light_point(&world, &[100.0, 100.0, 0.0], &styles, &[], 1.0);
        assert_eq!(c, [0.0; 3]);
    }
}

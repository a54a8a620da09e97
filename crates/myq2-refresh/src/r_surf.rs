// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// r_surf.rs — Surface-related refresh code

use myq2_common::q_shared::*;

use crate::r_backend::{
    set_uniforms, upload_vertices, DrawRange, EntityUniforms, GpuBackend, PrimitiveTopology, ShaderId,
    UniformBlockId, WorldVertex, IDENTITY, TMU_DIFFUSE, TMU_LIGHTMAP,
};
use crate::r_light::mark_lights;
use crate::r_local::{entity_matrix, vid_printf, DLight, Entity, FrameStats, RefreshError, WorldFrameState, BACKFACE_EPSILON};
use crate::r_model_types::*;
use crate::r_vis::{area_visible, world_to_entity, ViewState};
use crate::r_warp::{emit_water_polys, SkyBox};

/// Triangle list indices for an `n` vertex fan starting at `base`.
pub(crate) fn push_fan_indices(indices: &mut Vec<u32>, base: u32, n: usize) {
    for i in 1..n.saturating_sub(1) as u32 {
        indices.extend_from_slice(&[base, base + i, base + i + 1]);
    }
}

/// Returns the proper image for a given time and base texinfo.
pub fn texture_animation(world: &WorldModel, texinfo: usize, frame: i32) -> usize {
    let tex = &world.texinfo[texinfo];
    if tex.next.is_none() {
        return tex.image;
    }

    let mut c = frame.rem_euclid(tex.numframes.max(1));
    let mut t = texinfo;
    while c > 0 {
        match world.texinfo[t].next {
            Some(next) => t = next,
            None => break,
        }
        c -= 1;
    }
    world.texinfo[t].image
}

fn surface_normal(world: &WorldModel, surf: &MSurface) -> Vec3 {
    let n = world.planes[surf.plane].normal;
    if surf.flags.contains(SurfaceFlags::PLANEBACK) {
        [-n[0], -n[1], -n[2]]
    } else {
        n
    }
}

fn emit_lightmapped_poly(
    surf: &MSurface,
    normal: Vec3,
    light_flags: u32,
    verts: &mut Vec<WorldVertex>,
    indices: &mut Vec<u32>,
) {
    let Some(p) = surf.polys.first() else {
        return;
    };
    let base = verts.len() as u32;
    let lm_layer = surf.lightmaptexturenum.max(0) as u32 * 4;
    verts.extend(p.verts.iter().map(|v| WorldVertex {
        position: v.xyz,
        tex_coord: v.st,
        lm_coord: v.lm_st,
        normal,
        lm_layer,
        light_flags,
        styles: surf.styles,
    }));
    push_fan_indices(indices, base, p.verts.len());
}

/// Translucent surfaces carry no lightmap.
fn emit_unlit_poly(surf: &MSurface, normal: Vec3, verts: &mut Vec<WorldVertex>, indices: &mut Vec<u32>) {
    let Some(p) = surf.polys.first() else {
        return;
    };
    let base = verts.len() as u32;
    verts.extend(p.verts.iter().map(|v| WorldVertex {
        position: v.xyz,
        tex_coord: v.st,
        normal,
        styles: [255; 4],
        ..WorldVertex::default()
    }));
    push_fan_indices(indices, base, p.verts.len());
}

fn minmaxs_culled(view: &ViewState, mm: &[f32; 6]) -> bool {
    view.cull_box(&[mm[0], mm[1], mm[2]], &[mm[3], mm[4], mm[5]])
}

// ============================================================
// Texture chains
// ============================================================

/// A translucent surface waiting for the end of the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlphaSurface {
    pub surf: usize,
    pub image: usize,
    pub model: [[f32; 4]; 4],
}

/// Frame counters and filters for one world walk.
#[derive(Debug, Clone, Copy)]
pub struct WorldWalk<'a> {
    pub framecount: i32,
    pub visframecount: i32,
    pub areabits: Option<&'a [u8]>,
    /// Texture animation frame.
    pub anim_frame: i32,
}

/// What a chain flush needs besides the chains.
#[derive(Debug, Clone, Copy)]
pub struct ChainPass {
    pub dlightframe: i32,
    pub time: f32,
    pub model: [[f32; 4]; 4],
}

/// Per-frame state a brush entity is drawn against.
#[derive(Debug, Clone, Copy)]
pub struct BrushPass<'a> {
    pub view: &'a ViewState,
    pub dlights: &'a [DLight],
    pub dlightframe: i32,
    pub dynamic: bool,
    pub time: f32,
}

enum WalkStep {
    Visit(MNodeRef),
    Surfaces(usize, bool),
}

/// One batch: an image drawn with one shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Material {
    pub image: usize,
    pub shader: ShaderId,
}

const CHAIN_SHADERS: [ShaderId; 3] = [ShaderId::Lightmapped, ShaderId::LightmappedFlow, ShaderId::Turbulent];

impl Material {
    fn of(world: &WorldModel, surf: &MSurface, image: usize) -> Self {
        let shader = if surf.flags.contains(SurfaceFlags::DRAWTURB) {
            ShaderId::Turbulent
        } else if world.texinfo[surf.texinfo].flags.contains(SurfFlags::FLOWING) {
            ShaderId::LightmappedFlow
        } else {
            ShaderId::Lightmapped
        };
        Self { image, shader }
    }

    fn slot(&self) -> usize {
        let group = match self.shader {
            ShaderId::LightmappedFlow => 1,
            ShaderId::Turbulent => 2,
            _ => 0,
        };
        self.image * CHAIN_SHADERS.len() + group
    }

    fn from_slot(slot: usize) -> Self {
        Self {
            image: slot / CHAIN_SHADERS.len(),
            shader: CHAIN_SHADERS[slot % CHAIN_SHADERS.len()],
        }
    }
}

/// Per-material surface batches, kept in arrays indexed by material and
/// surface so nothing is stored on the level data.
///
/// A material is an image plus the shader its surfaces need, so a lava
/// image that also scrolls gets two batches. Each material has a head;
/// `next` links the surfaces of one chain.
/// Translucent surfaces go to one unsorted list; sky surfaces are only
/// recorded, their drawing is the sky box.
#[derive(Debug, Clone, Default)]
pub struct TextureChains {
    heads: Vec<Option<usize>>,
    next: Vec<Option<usize>>,
    alpha: Vec<AlphaSurface>,
    sky: Vec<usize>,
}

impl TextureChains {
    pub fn new(world: &WorldModel) -> Self {
        Self {
            heads: vec![None; world.images.len() * CHAIN_SHADERS.len()],
            next: vec![None; world.surfaces.len()],
            alpha: Vec::new(),
            sky: Vec::new(),
        }
    }

    /// Drop every chain and list.
    pub fn clear(&mut self) {
        self.clear_materials();
        self.alpha.clear();
        self.sky.clear();
    }

    fn clear_materials(&mut self) {
        self.heads.iter_mut().for_each(|h| *h = None);
    }

    fn slot_chain(&self, slot: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.heads.get(slot).copied().flatten(), move |&s| self.next[s])
    }

    /// Surfaces chained on `material`, most recently added first.
    pub fn chain(&self, material: Material) -> impl Iterator<Item = usize> + '_ {
        self.slot_chain(material.slot())
    }

    /// Materials with at least one chained surface.
    pub fn materials(&self) -> impl Iterator<Item = Material> + '_ {
        self.heads
            .iter()
            .enumerate()
            .filter_map(|(slot, h)| h.map(|_| Material::from_slot(slot)))
    }

    pub fn alpha_surfaces(&self) -> &[AlphaSurface] {
        &self.alpha
    }

    pub fn sky_surfaces(&self) -> &[usize] {
        &self.sky
    }

    fn chain_surface(&mut self, world: &WorldModel, s: usize, anim_frame: i32, model: [[f32; 4]; 4]) {
        let surf = &world.surfaces[s];
        let image = texture_animation(world, surf.texinfo, anim_frame);

        if world.texinfo[surf.texinfo].flags.intersects(SurfFlags::TRANSLUCENT) {
            // add to the translucent chain
            self.alpha.push(AlphaSurface { surf: s, image, model });
        } else {
            let slot = Material::of(world, surf, image).slot();
            self.next[s] = self.heads[slot];
            self.heads[slot] = Some(s);
        }
    }

    // ============================================================
    // World walk
    // ============================================================

    /// Walk the marked world front to back, stamping the surfaces of
    /// visible leaves and chaining the ones facing the camera.
    pub fn build_world_chains(
        &mut self,
        world: &WorldModel,
        state: &mut WorldFrameState,
        view: &ViewState,
        walk: &WorldWalk,
        sky: &mut SkyBox,
        stats: &mut FrameStats,
    ) -> Result<(), RefreshError> {
        let modelorg = view.origin;
        let mut stack = vec![WalkStep::Visit(world.root())];

        while let Some(step) = stack.pop() {
            match step {
                WalkStep::Visit(MNodeRef::Leaf(l)) => {
                    let leaf = &world.leafs[l];
                    if leaf.contents == CONTENTS_SOLID {
                        continue; // solid
                    }
                    if state.leaf_visframe[l] != walk.visframecount {
                        continue;
                    }
                    if minmaxs_culled(view, &leaf.minmaxs) {
                        continue;
                    }
                    // check for door connected areas
                    if !area_visible(walk.areabits, leaf.area) {
                        continue; // not visible
                    }

                    stats.visible_leafs += 1;
                    let first = leaf.firstmarksurface;
                    for &s in &world.marksurfaces[first..first + leaf.nummarksurfaces] {
                        state.surf_visframe[s] = walk.framecount;
                    }
                }
                WalkStep::Visit(MNodeRef::Node(n)) => {
                    if state.node_visframe[n] != walk.visframecount {
                        continue;
                    }
                    let node = &world.nodes[n];
                    if minmaxs_culled(view, &node.minmaxs) {
                        continue;
                    }

                    // find which side of the node we are on
                    let back = world.planes[node.plane].distance(&modelorg) < 0.0;
                    let (near, far) = if back {
                        (node.children[1], node.children[0])
                    } else {
                        (node.children[0], node.children[1])
                    };

                    stack.push(WalkStep::Visit(far));
                    stack.push(WalkStep::Surfaces(n, back));
                    stack.push(WalkStep::Visit(near));
                }
                WalkStep::Surfaces(n, back) => {
                    let node = &world.nodes[n];
                    for s in node.firstsurface..node.firstsurface + node.numsurfaces {
                        if state.surf_visframe[s] != walk.framecount {
                            continue;
                        }
                        let surf = &world.surfaces[s];
                        if surf.flags.contains(SurfaceFlags::PLANEBACK) != back {
                            continue; // wrong side
                        }

                        if surf.flags.contains(SurfaceFlags::DRAWSKY) {
                            // just adds to visible sky bounds
                            self.sky.push(s);
                            sky.add_sky_surface(surf, &modelorg)?;
                        } else {
                            self.chain_surface(world, s, walk.anim_frame, IDENTITY);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    // ============================================================
    // Flushing
    // ============================================================

    /// Draw every material chain with one diffuse bind and one draw per
    /// material, then empty the chains.
    pub fn draw_texture_chains(
        &mut self,
        gpu: &mut dyn GpuBackend,
        world: &WorldModel,
        state: &WorldFrameState,
        pass: &ChainPass,
        stats: &mut FrameStats,
    ) {
        if self.heads.iter().all(Option::is_none) {
            return;
        }

        set_uniforms(gpu, UniformBlockId::Entity, &EntityUniforms { model: pass.model, color: [1.0; 4] });
        gpu.bind_texture(TMU_LIGHTMAP, world.lightmap_texture);

        let mut verts: Vec<WorldVertex> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();

        for slot in 0..self.heads.len() {
            if self.heads[slot].is_none() {
                continue;
            }
            let material = Material::from_slot(slot);
            verts.clear();
            indices.clear();

            for s in self.slot_chain(slot) {
                let surf = &world.surfaces[s];
                let normal = surface_normal(world, surf);
                match material.shader {
                    ShaderId::Turbulent => {
                        let flowing = world.texinfo[surf.texinfo].flags.contains(SurfFlags::FLOWING);
                        emit_water_polys(surf, normal, flowing, pass.time, &mut verts, &mut indices);
                    }
                    _ => {
                        let light_flags = state.dlightbits(s, pass.dlightframe);
                        emit_lightmapped_poly(surf, normal, light_flags, &mut verts, &mut indices);
                    }
                }
                stats.brush_polys += 1;
            }

            gpu.bind_texture(TMU_DIFFUSE, world.images[material.image].texnum);
            stats.texture_binds += 1;
            upload_vertices(gpu, &verts, &indices);
            gpu.use_shader(material.shader);
            gpu.draw(
                PrimitiveTopology::TriangleList,
                DrawRange::Indices { first: 0, count: indices.len() as u32 },
            );
            stats.draw_calls += 1;
        }

        self.clear_materials();
    }

    /// Draw the translucent list in the order it was built, then empty it.
    pub fn draw_alpha_surfaces(
        &mut self,
        gpu: &mut dyn GpuBackend,
        world: &WorldModel,
        time: f32,
        stats: &mut FrameStats,
    ) {
        if self.alpha.is_empty() {
            return;
        }

        let mut verts: Vec<WorldVertex> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        let mut ranges = Vec::with_capacity(self.alpha.len());

        for a in &self.alpha {
            let surf = &world.surfaces[a.surf];
            let normal = surface_normal(world, surf);
            let first = indices.len() as u32;
            if surf.flags.contains(SurfaceFlags::DRAWTURB) {
                let flowing = world.texinfo[surf.texinfo].flags.contains(SurfFlags::FLOWING);
                emit_water_polys(surf, normal, flowing, time, &mut verts, &mut indices);
            } else {
                emit_unlit_poly(surf, normal, &mut verts, &mut indices);
            }
            ranges.push((first, indices.len() as u32 - first));
            stats.brush_polys += 1;
        }

        gpu.use_shader(ShaderId::Translucent);
        upload_vertices(gpu, &verts, &indices);

        for (a, (first, count)) in self.alpha.iter().zip(ranges) {
            let flags = world.texinfo[world.surfaces[a.surf].texinfo].flags;
            let alpha = if flags.contains(SurfFlags::TRANS33) {
                0.33
            } else if flags.contains(SurfFlags::TRANS66) {
                0.66
            } else {
                1.0
            };

            set_uniforms(gpu, UniformBlockId::Entity, &EntityUniforms { model: a.model, color: [1.0, 1.0, 1.0, alpha] });
            gpu.bind_texture(TMU_DIFFUSE, world.images[a.image].texnum);
            stats.texture_binds += 1;
            gpu.draw(PrimitiveTopology::TriangleList, DrawRange::Indices { first, count });
            stats.draw_calls += 1;
        }

        self.alpha.clear();
    }

    // ============================================================
    // Brush entities
    // ============================================================

    /// Draw an inline model. Returns false if it was culled as a whole.
    ///
    /// Opaque surfaces are flushed right away with the entity transform;
    /// translucent ones stay on the translucent list.
    pub fn draw_brush_model(
        &mut self,
        gpu: &mut dyn GpuBackend,
        world: &WorldModel,
        state: &mut WorldFrameState,
        e: &Entity,
        submodel: usize,
        pass: &BrushPass,
        stats: &mut FrameStats,
    ) -> bool {
        let Some(sub) = world.submodels.get(submodel) else {
            vid_printf(PRINT_DEVELOPER, &format!("R_DrawBrushModel: bad submodel {}\n", submodel));
            return false;
        };
        if sub.numfaces == 0 {
            return false;
        }

        let (mins, maxs) = ViewState::brush_model_bounds(sub, e);
        if pass.view.cull_box(&mins, &maxs) {
            return false;
        }

        let modelorg = pass.view.entity_local_origin(e);

        // calculate dynamic lighting for bmodel
        if pass.dynamic {
            for (k, dl) in pass.dlights.iter().enumerate() {
                let local = DLight {
                    origin: world_to_entity(e, &dl.origin),
                    ..*dl
                };
                mark_lights(world, state, &local, 1 << k, sub.headnode, pass.dlightframe);
            }
        }

        let model = entity_matrix(&e.origin, &e.angles);

        self.clear_materials();
        for s in sub.firstface..sub.firstface + sub.numfaces {
            let surf = &world.surfaces[s];
            if surf.flags.contains(SurfaceFlags::DRAWSKY) {
                continue;
            }

            // find which side of the node we are on
            let dot = world.planes[surf.plane].distance(&modelorg);
            let back = surf.flags.contains(SurfaceFlags::PLANEBACK);
            if (back && dot < -BACKFACE_EPSILON) || (!back && dot > BACKFACE_EPSILON) {
                self.chain_surface(world, s, e.frame, model);
            }
        }

        let chains = ChainPass {
            dlightframe: pass.dlightframe,
            time: pass.time,
            model,
        };
        self.draw_texture_chains(gpu, world, state, &chains, stats);
        true
    }
}

// =============================================================
//  Tests
// =============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_backend::recording::{GpuCall, RecordingBackend};
    use crate::r_local::RefreshSettings;
    use crate::r_model::fixtures::*;
    use crate::r_warp::SKY_FACE_UP;

    fn room_faces() -> Vec<FaceSpec> {
        vec![
            FaceSpec::quad([0.0, 0.0, 1.0], [0.0, 0.0, -64.0], 64.0, "e1u1/floor").lit(100),
            FaceSpec::quad([0.0, 0.0, -1.0], [0.0, 0.0, 64.0], 64.0, "e1u1/sky").with_flags(SurfFlags::SKY),
            FaceSpec::quad([-1.0, 0.0, 0.0], [64.0, 0.0, 0.0], 64.0, "e1u1/wall"),
            FaceSpec::quad([1.0, 0.0, 0.0], [-64.0, 0.0, 0.0], 64.0, "e1u1/wall"),
            FaceSpec::quad([0.0, -1.0, 0.0], [0.0, 64.0, 0.0], 64.0, "e1u1/glass").with_flags(SurfFlags::TRANS33),
            FaceSpec::quad([0.0, 1.0, 0.0], [0.0, -64.0, 0.0], 64.0, "e1u1/water").with_flags(SurfFlags::WARP),
        ]
    }

    fn door() -> FaceSpec {
        FaceSpec::quad([1.0, 0.0, 0.0], [32.0, 0.0, 0.0], 8.0, "e1u1/door")
    }

    /// View from `origin` with its leaves marked for visframe 1.
    fn view_from(world: &WorldModel, origin: Vec3, angles: Vec3) -> (ViewState, WorldFrameState) {
        let mut view = ViewState::new();
        view.setup_frame(Some(world), &origin, &angles);
        view.set_frustum(90.0, 90.0);
        let mut state = WorldFrameState::new(world);
        let mut visframecount = 0;
        view.mark_leaves(world, &mut state, &mut visframecount, &RefreshSettings::default());
        (view, state)
    }

    fn walk(areabits: Option<&[u8]>) -> WorldWalk<'_> {
        WorldWalk {
            framecount: 1,
            visframecount: 1,
            areabits,
            anim_frame: 0,
        }
    }

    fn image_of(world: &WorldModel, name: &str) -> usize {
        world
            .images
            .iter()
            .position(|i| i.name == format!("textures/{}.wal", name))
            .expect("image loaded")
    }

    // ---- fans ----

    #[test]
    fn test_push_fan_indices() {
        let mut indices = Vec::new();
        push_fan_indices(&mut indices, 10, 5);
        assert_eq!(indices, vec![10, 11, 12, 10, 12, 13, 10, 13, 14]);
        push_fan_indices(&mut indices, 0, 2);
        assert_eq!(indices.len(), 9);
    }

    // ---- texture animation ----

    #[test]
    fn test_texture_animation_walks_chain() {
        let tex = |next: usize, image: usize| MTexInfo {
            vecs: [[0.0; 4]; 2],
            flags: SurfFlags::empty(),
            numframes: 3,
            next: Some(next),
            image,
        };
        let mut world = WorldModel::default();
        world.texinfo = vec![tex(1, 10), tex(2, 11), tex(0, 12)];
        world.texinfo.push(MTexInfo { next: None, numframes: 1, ..tex(0, 13) });

        assert_eq!(texture_animation(&world, 0, 0), 10);
        assert_eq!(texture_animation(&world, 0, 1), 11);
        assert_eq!(texture_animation(&world, 0, 5), 12);
        assert_eq!(texture_animation(&world, 1, 2), 10);
        assert_eq!(texture_animation(&world, 0, -1), 12);
        assert_eq!(texture_animation(&world, 3, 7), 13);
    }

    // ---- world walk ----

    #[test]
    fn test_every_visible_surface_in_exactly_one_list() {
        let world = load_room(&room_faces(), [0.0; 3], &[]);
        let (view, mut state) = view_from(&world, [0.0; 3], [0.0; 3]);
        let mut chains = TextureChains::new(&world);
        let mut sky = SkyBox::new();
        let mut stats = FrameStats::default();

        chains
            .build_world_chains(&world, &mut state, &view, &walk(None), &mut sky, &mut stats)
            .unwrap();

        let mut seen = vec![0; world.surfaces.len()];
        for m in chains.materials().collect::<Vec<_>>() {
            for s in chains.chain(m) {
                seen[s] += 1;
            }
        }
        for a in chains.alpha_surfaces() {
            seen[a.surf] += 1;
        }
        for &s in chains.sky_surfaces() {
            seen[s] += 1;
        }
        assert_eq!(seen, vec![1; 6]);

        assert_eq!(chains.sky_surfaces(), &[1]);
        assert_eq!(chains.alpha_surfaces().len(), 1);
        assert_eq!(chains.alpha_surfaces()[0].surf, 4);
        let wall = Material { image: image_of(&world, "e1u1/wall"), shader: ShaderId::Lightmapped };
        assert_eq!(chains.chain(wall).count(), 2);
        assert!(sky.face_visible(SKY_FACE_UP));
        assert_eq!(stats.visible_leafs, 1);
        assert!(state.surf_visframe.iter().all(|&f| f == 1));
    }

    #[test]
    fn test_stale_marks_chain_nothing() {
        let world = load_room(&room_faces(), [0.0; 3], &[]);
        let (view, mut state) = view_from(&world, [0.0; 3], [0.0; 3]);
        let mut chains = TextureChains::new(&world);
        let mut sky = SkyBox::new();
        let mut stats = FrameStats::default();

        let stale = WorldWalk { visframecount: 2, ..walk(None) };
        chains
            .build_world_chains(&world, &mut state, &view, &stale, &mut sky, &mut stats)
            .unwrap();
        assert_eq!(chains.materials().count(), 0);
        assert!(chains.sky_surfaces().is_empty());
        assert!(chains.alpha_surfaces().is_empty());
    }

    #[test]
    fn test_closed_area_hides_leaf() {
        let world = load_room(&room_faces(), [0.0; 3], &[]);
        let (view, mut state) = view_from(&world, [0.0; 3], [0.0; 3]);
        let mut chains = TextureChains::new(&world);
        let mut sky = SkyBox::new();
        let mut stats = FrameStats::default();

        let closed = [0u8];
        chains
            .build_world_chains(&world, &mut state, &view, &walk(Some(&closed[..])), &mut sky, &mut stats)
            .unwrap();
        assert_eq!(chains.materials().count(), 0);
        assert_eq!(stats.visible_leafs, 0);
    }

    // ---- flushing ----

    #[test]
    fn test_flush_binds_each_material_once() {
        let world = load_room(&room_faces(), [0.0; 3], &[]);
        let (view, mut state) = view_from(&world, [0.0; 3], [0.0; 3]);
        let mut chains = TextureChains::new(&world);
        let mut sky = SkyBox::new();
        let mut stats = FrameStats::default();
        chains
            .build_world_chains(&world, &mut state, &view, &walk(None), &mut sky, &mut stats)
            .unwrap();

        let mut gpu = RecordingBackend::new();
        let pass = ChainPass { dlightframe: 1, time: 0.0, model: IDENTITY };
        chains.draw_texture_chains(&mut gpu, &world, &state, &pass, &mut stats);

        // floor, wall and water; the two walls share one bind and one draw
        let binds = gpu.binds(TMU_DIFFUSE);
        assert_eq!(binds.len(), 3);
        let mut distinct = binds.clone();
        distinct.dedup();
        assert_eq!(distinct.len(), 3);
        assert_eq!(gpu.draws().len(), 3);
        assert_eq!(gpu.binds(TMU_LIGHTMAP), vec![world.lightmap_texture]);
        assert!(gpu.shaders().contains(&ShaderId::Turbulent));
        assert_eq!(stats.brush_polys, 4);
        assert_eq!(stats.texture_binds, 3);

        // chains are drained
        assert_eq!(chains.materials().count(), 0);
    }

    #[test]
    fn test_flowing_surfaces_get_their_own_batch() {
        let faces = vec![
            FaceSpec::quad([-1.0, 0.0, 0.0], [64.0, 0.0, 0.0], 64.0, "e1u1/wall"),
            FaceSpec::quad([1.0, 0.0, 0.0], [-64.0, 0.0, 0.0], 64.0, "e1u1/wall").with_flags(SurfFlags::FLOWING),
        ];
        let world = load_room(&faces, [0.0; 3], &[]);
        let (view, mut state) = view_from(&world, [0.0; 3], [0.0; 3]);
        let mut chains = TextureChains::new(&world);
        let mut stats = FrameStats::default();
        chains
            .build_world_chains(&world, &mut state, &view, &walk(None), &mut SkyBox::new(), &mut stats)
            .unwrap();

        let image = image_of(&world, "e1u1/wall");
        let materials: Vec<Material> = chains.materials().collect();
        assert_eq!(
            materials,
            vec![
                Material { image, shader: ShaderId::Lightmapped },
                Material { image, shader: ShaderId::LightmappedFlow },
            ]
        );

        let mut gpu = RecordingBackend::new();
        let pass = ChainPass { dlightframe: 1, time: 0.0, model: IDENTITY };
        chains.draw_texture_chains(&mut gpu, &world, &state, &pass, &mut stats);

        // every material is one bind and one draw
        assert_eq!(gpu.binds(TMU_DIFFUSE).len(), 2);
        assert_eq!(gpu.draws().len(), 2);
        assert_eq!(gpu.shaders(), vec![ShaderId::Lightmapped, ShaderId::LightmappedFlow]);
        assert_eq!(stats.texture_binds, stats.draw_calls);
        for (_, range) in gpu.draws() {
            assert_eq!(range, DrawRange::Indices { first: 0, count: 6 });
        }
    }

    #[test]
    fn test_wall_batch_is_one_draw_of_both_quads() {
        let faces = vec![
            FaceSpec::quad([-1.0, 0.0, 0.0], [64.0, 0.0, 0.0], 64.0, "e1u1/wall"),
            FaceSpec::quad([1.0, 0.0, 0.0], [-64.0, 0.0, 0.0], 64.0, "e1u1/wall"),
        ];
        let world = load_room(&faces, [0.0; 3], &[]);
        let (view, mut state) = view_from(&world, [0.0; 3], [0.0; 3]);
        let mut chains = TextureChains::new(&world);
        let mut stats = FrameStats::default();
        chains
            .build_world_chains(&world, &mut state, &view, &walk(None), &mut SkyBox::new(), &mut stats)
            .unwrap();

        let mut gpu = RecordingBackend::new();
        let pass = ChainPass { dlightframe: 1, time: 0.0, model: IDENTITY };
        chains.draw_texture_chains(&mut gpu, &world, &state, &pass, &mut stats);

        assert_eq!(
            gpu.draws(),
            vec![(PrimitiveTopology::TriangleList, DrawRange::Indices { first: 0, count: 12 })]
        );
        let verts: Vec<WorldVertex> = gpu.vertices(0);
        assert_eq!(verts.len(), 8);
        assert!(verts.iter().all(|v| v.styles == [255; 4] && v.light_flags == 0));
        // inward facing normals
        assert!(verts.iter().any(|v| v.normal == [-1.0, 0.0, 0.0]));
        assert!(verts.iter().any(|v| v.normal == [1.0, 0.0, 0.0]));
    }

    #[test]
    fn test_dlight_bits_reach_vertices() {
        let faces = vec![FaceSpec::quad([0.0, 0.0, 1.0], [0.0, 0.0, -64.0], 64.0, "e1u1/floor").lit(50)];
        let world = load_room(&faces, [0.0; 3], &[]);
        let (view, mut state) = view_from(&world, [0.0; 3], [0.0; 3]);
        state.surf_dlightframe[0] = 1;
        state.surf_dlightbits[0] = 0b100;

        let mut chains = TextureChains::new(&world);
        let mut stats = FrameStats::default();
        chains
            .build_world_chains(&world, &mut state, &view, &walk(None), &mut SkyBox::new(), &mut stats)
            .unwrap();
        let mut gpu = RecordingBackend::new();
        let pass = ChainPass { dlightframe: 1, time: 0.0, model: IDENTITY };
        chains.draw_texture_chains(&mut gpu, &world, &state, &pass, &mut stats);

        let verts: Vec<WorldVertex> = gpu.vertices(0);
        assert!(verts.iter().all(|v| v.light_flags == 0b100));
        assert!(verts.iter().all(|v| v.styles == [0, 255, 255, 255]));
        assert!(verts.iter().all(|v| v.lm_layer == world.surfaces[0].lightmaptexturenum as u32 * 4));
    }

    #[test]
    fn test_alpha_surfaces_draw_in_order() {
        let world = load_room(&room_faces(), [0.0; 3], &[]);
        let (view, mut state) = view_from(&world, [0.0; 3], [0.0; 3]);
        let mut chains = TextureChains::new(&world);
        let mut stats = FrameStats::default();
        chains
            .build_world_chains(&world, &mut state, &view, &walk(None), &mut SkyBox::new(), &mut stats)
            .unwrap();

        let mut gpu = RecordingBackend::new();
        chains.draw_alpha_surfaces(&mut gpu, &world, 0.0, &mut stats);

        assert_eq!(gpu.shaders(), vec![ShaderId::Translucent]);
        assert_eq!(gpu.binds(TMU_DIFFUSE), vec![world.images[image_of(&world, "e1u1/glass")].texnum]);
        assert_eq!(gpu.draws().len(), 1);
        assert!(chains.alpha_surfaces().is_empty());
    }

    #[test]
    fn test_translucent_vertices_carry_no_lightmap() {
        let world = load_room(&room_faces(), [0.0; 3], &[]);
        let (view, mut state) = view_from(&world, [0.0; 3], [0.0; 3]);
        // a light touching the glass does not reach its vertices
        state.surf_dlightframe[4] = 1;
        state.surf_dlightbits[4] = 0b1;

        let mut chains = TextureChains::new(&world);
        let mut stats = FrameStats::default();
        chains
            .build_world_chains(&world, &mut state, &view, &walk(None), &mut SkyBox::new(), &mut stats)
            .unwrap();
        let mut gpu = RecordingBackend::new();
        chains.draw_alpha_surfaces(&mut gpu, &world, 0.0, &mut stats);

        let verts: Vec<WorldVertex> = gpu.vertices(0);
        assert_eq!(verts.len(), 4);
        for v in &verts {
            assert_eq!(v.styles, [255; 4]);
            assert_eq!(v.lm_coord, [0.0; 2]);
            assert_eq!(v.lm_layer, 0);
            assert_eq!(v.light_flags, 0);
        }
    }

    // ---- brush entities ----

    #[test]
    fn test_brush_model_drawn_from_front_only() {
        let world = load_room(&[], [0.0; 3], &[door()]);
        let e = Entity { model: crate::r_local::EntityModel::Brush(1), ..Entity::default() };
        let mut chains = TextureChains::new(&world);
        let mut stats = FrameStats::default();

        // door faces -x toward the origin
        let (view, mut state) = view_from(&world, [0.0; 3], [0.0; 3]);
        let pass = BrushPass { view: &view, dlights: &[], dlightframe: 1, dynamic: true, time: 0.0 };
        let mut gpu = RecordingBackend::new();
        assert!(chains.draw_brush_model(&mut gpu, &world, &mut state, &e, 1, &pass, &mut stats));
        assert_eq!(stats.brush_polys, 1);

        // from behind, looking back at it
        let (view, mut state) = view_from(&world, [100.0, 0.0, 0.0], [0.0, 180.0, 0.0]);
        let pass = BrushPass { view: &view, ..pass };
        let mut gpu = RecordingBackend::new();
        assert!(chains.draw_brush_model(&mut gpu, &world, &mut state, &e, 1, &pass, &mut stats));
        assert_eq!(stats.brush_polys, 1);
        assert!(gpu.draws().is_empty());

        // out of view
        let (view, mut state) = view_from(&world, [0.0; 3], [0.0, 180.0, 0.0]);
        let pass = BrushPass { view: &view, ..pass };
        assert!(!chains.draw_brush_model(&mut gpu, &world, &mut state, &e, 1, &pass, &mut stats));

        // no such submodel
        assert!(!chains.draw_brush_model(&mut gpu, &world, &mut state, &e, 9, &pass, &mut stats));
    }

    #[test]
    fn test_brush_model_lights_marked_in_model_space() {
        let world = load_room(&[], [0.0; 3], &[door()]);
        let e = Entity {
            model: crate::r_local::EntityModel::Brush(1),
            origin: [200.0, 0.0, 0.0],
            ..Entity::default()
        };
        let (view, mut state) = view_from(&world, [200.0, 0.0, 0.0], [0.0; 3]);

        // 12 units in front of the moved door; far from its untransformed plane
        let light = DLight { origin: [220.0, 0.0, 0.0], color: [1.0; 3], intensity: 100.0 };
        let lights = [light];
        let pass = BrushPass { view: &view, dlights: &lights, dlightframe: 1, dynamic: true, time: 0.0 };

        let mut chains = TextureChains::new(&world);
        let mut stats = FrameStats::default();
        let mut gpu = RecordingBackend::new();
        assert!(chains.draw_brush_model(&mut gpu, &world, &mut state, &e, 1, &pass, &mut stats));

        let verts: Vec<WorldVertex> = gpu.vertices(0);
        assert!(verts.iter().all(|v| v.light_flags == 1));
        assert!(gpu.calls.contains(&GpuCall::SetUniformBlock(UniformBlockId::Entity)));
    }
}

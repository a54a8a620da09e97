// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// r_main.rs — Refresh entry points and the per-frame pipeline

use std::sync::Arc;

use parking_lot::RwLock;

use myq2_common::cvar::CvarContext;
use myq2_common::q_shared::*;
use myq2_common::qfiles::{BspData, Md2Data};

use crate::r_anorms::ShadeDots;
use crate::r_backend::{set_uniforms, FrameUniforms, GpuBackend, TextureId, UniformBlockId, IDENTITY};
use crate::r_light::{dlight_uniforms, light_point, push_dlights};
use crate::r_lightmap::light_style_uniforms;
use crate::r_local::*;
use crate::r_mesh::{alias_skin, draw_alias_model, shade_light, AliasShading, MeshScratch};
use crate::r_model::{load_alias_model, load_brush_model};
use crate::r_model_types::{AliasModel, Image, WorldModel};
use crate::r_surf::{BrushPass, ChainPass, TextureChains, WorldWalk};
use crate::r_vis::ViewState;
use crate::r_warp::SkyBox;

/// The world refresh: the loaded level, the registered models and the
/// state carried from one frame to the next.
pub struct Refresh {
    cvars: Arc<RwLock<CvarContext>>,
    notexture: TextureId,

    world: Option<WorldModel>,
    state: WorldFrameState,
    chains: TextureChains,
    alias_models: Vec<AliasModel>,

    view: ViewState,
    sky: SkyBox,
    shadedots: ShadeDots,
    scratch: MeshScratch,

    framecount: i32,
    visframecount: i32,
}

impl Refresh {
    /// Register the refresh cvars in `cvars` and start with no level.
    pub fn new(cvars: Arc<RwLock<CvarContext>>, notexture: TextureId) -> Self {
        RefreshSettings::register(&mut cvars.write());
        Self {
            cvars,
            notexture,
            world: None,
            state: WorldFrameState::default(),
            chains: TextureChains::default(),
            alias_models: Vec::new(),
            view: ViewState::new(),
            sky: SkyBox::new(),
            shadedots: ShadeDots::new(),
            scratch: MeshScratch::default(),
            framecount: 0,
            visframecount: 0,
        }
    }

    pub fn cvars(&self) -> &Arc<RwLock<CvarContext>> {
        &self.cvars
    }

    pub fn world(&self) -> Option<&WorldModel> {
        self.world.as_ref()
    }

    pub fn sky(&self) -> &SkyBox {
        &self.sky
    }

    /// Load a new level, dropping the previous one and every alias model
    /// registered for it.
    pub fn begin_registration(
        &mut self,
        bsp: &BspData,
        find_image: &mut dyn FnMut(&str) -> Image,
        gpu: &mut dyn GpuBackend,
    ) -> Result<(), RefreshError> {
        let fullbright = {
            let mut cvars = self.cvars.write();
            cvars.get_latched_vars();
            cvars.variable_value("r_fullbright") != 0.0
        };
        let world = load_brush_model(bsp, find_image, gpu, fullbright)?;

        self.state = WorldFrameState::new(&world);
        self.chains = TextureChains::new(&world);
        self.alias_models.clear();
        // force a PVS pass on the first frame of the level
        self.view = ViewState::new();
        self.sky.clear();
        self.world = Some(world);
        Ok(())
    }

    /// Validate an MD2 model and hand back its entity handle. Registering
    /// the same name twice returns the first handle.
    pub fn register_alias_model(
        &mut self,
        name: &str,
        md2: &Md2Data,
        skins: Vec<TextureId>,
    ) -> Result<EntityModel, RefreshError> {
        if let Some(i) = self.alias_models.iter().position(|m| m.name == name) {
            return Ok(EntityModel::Alias(i));
        }
        self.alias_models.push(load_alias_model(name, md2, skins)?);
        Ok(EntityModel::Alias(self.alias_models.len() - 1))
    }

    pub fn set_sky(
        &mut self,
        name: &str,
        rotate: f32,
        axis: &Vec3,
        find_image: &mut dyn FnMut(&str) -> Option<TextureId>,
    ) {
        self.sky.set_sky(name, rotate, axis, find_image, self.notexture);
    }

    /// Draw one frame. Returns once every draw of the frame was submitted.
    pub fn render_frame(&mut self, fd: &RefDef, gpu: &mut dyn GpuBackend) -> Result<FrameStats, RefreshError> {
        let no_world = fd.rdflags & RDF_NOWORLDMODEL != 0;
        if self.world.is_none() && !no_world {
            return Err(RefreshError::NoWorldModel);
        }
        if fd.dlights.len() > MAX_DLIGHTS {
            return Err(RefreshError::TooManyDlights(fd.dlights.len()));
        }

        let settings = RefreshSettings::from_cvars(&self.cvars.read());
        let mut stats = FrameStats::default();

        let Refresh {
            cvars,
            notexture,
            world,
            state,
            chains,
            alias_models,
            view,
            sky,
            shadedots,
            scratch,
            framecount,
            visframecount,
        } = self;
        let world = if no_world { None } else { world.as_ref() };

        // setup frame
        *framecount += 1;
        let dlightframe = *framecount;
        view.nocull = settings.nocull;
        view.setup_frame(world, &fd.vieworg, &fd.viewangles);
        view.set_frustum(fd.fov_x, fd.fov_y);
        chains.clear();
        sky.clear();

        if let Some(world) = world {
            stats.pvs_recomputed = view.mark_leaves(world, state, visframecount, &settings);
            push_dlights(world, state, &fd.dlights, dlightframe, &settings)?;
        }

        set_uniforms(
            gpu,
            UniformBlockId::Frame,
            &FrameUniforms {
                view_origin: [fd.vieworg[0], fd.vieworg[1], fd.vieworg[2], 1.0],
                time: fd.time,
                pad: [0.0; 3],
            },
        );
        set_uniforms(gpu, UniformBlockId::LightStyles, &light_style_uniforms(&fd.lightstyles, settings.modulate));
        set_uniforms(gpu, UniformBlockId::DynamicLights, &dlight_uniforms(&fd.dlights, settings.dynamic));

        // world
        if let Some(world) = world.filter(|_| settings.drawworld) {
            let walk = WorldWalk {
                framecount: *framecount,
                visframecount: *visframecount,
                areabits: fd.areabits.as_deref(),
                anim_frame: (fd.time * 2.0) as i32,
            };
            chains.build_world_chains(world, state, view, &walk, sky, &mut stats)?;

            let pass = ChainPass { dlightframe, time: fd.time, model: IDENTITY };
            chains.draw_texture_chains(gpu, world, state, &pass, &mut stats);

            let quads = sky.draw(gpu, &view.origin, fd.time);
            stats.texture_binds += quads;
            stats.draw_calls += quads;
        }

        if settings.drawentities {
            // brush entities
            if let Some(world) = world {
                let pass = BrushPass {
                    view,
                    dlights: &fd.dlights,
                    dlightframe,
                    dynamic: settings.dynamic,
                    time: fd.time,
                };
                for e in &fd.entities {
                    if let EntityModel::Brush(i) = e.model {
                        chains.draw_brush_model(gpu, world, state, e, i, &pass, &mut stats);
                    }
                }
            }

            let alias = AliasPass {
                world,
                fd,
                settings: &settings,
                view,
                models: alias_models,
                shadedots,
                notexture: *notexture,
            };

            // opaque alias entities
            for e in fd.entities.iter().filter(|e| e.flags & RF_TRANSLUCENT == 0) {
                alias.draw(gpu, e, scratch, &mut stats);
            }

            // translucent surfaces
            if let Some(world) = world {
                chains.draw_alpha_surfaces(gpu, world, fd.time, &mut stats);
            }

            // translucent entities
            for e in fd.entities.iter().filter(|e| e.flags & RF_TRANSLUCENT != 0) {
                alias.draw(gpu, e, scratch, &mut stats);
            }
        } else if let Some(world) = world {
            chains.draw_alpha_surfaces(gpu, world, fd.time, &mut stats);
        }

        // save off light value for server to look at
        if let Some(world) = world {
            let shadelight = light_point(world, &fd.vieworg, &fd.lightstyles, &fd.dlights, settings.modulate);
            let level = 150.0 * shadelight[0].max(shadelight[1]).max(shadelight[2]);
            cvars.write().set_value("r_lightlevel", level);
        }

        if settings.speeds {
            vid_printf(
                PRINT_ALL,
                &format!(
                    "{:4} wpoly {:4} epoly {} leafs {} tex {} draws\n",
                    stats.brush_polys, stats.alias_polys, stats.visible_leafs, stats.texture_binds, stats.draw_calls,
                ),
            );
        }

        Ok(stats)
    }
}

/// Frame state an alias entity is lit and culled against.
struct AliasPass<'a> {
    world: Option<&'a WorldModel>,
    fd: &'a RefDef,
    settings: &'a RefreshSettings,
    view: &'a ViewState,
    models: &'a [AliasModel],
    shadedots: &'a ShadeDots,
    notexture: TextureId,
}

impl AliasPass<'_> {
    fn draw(&self, gpu: &mut dyn GpuBackend, e: &Entity, scratch: &mut MeshScratch, stats: &mut FrameStats) {
        let EntityModel::Alias(i) = e.model else {
            return;
        };
        let Some(model) = self.models.get(i) else {
            vid_printf(PRINT_DEVELOPER, &format!("R_DrawEntitiesOnList: bad alias model {}\n", i));
            return;
        };

        // viewer models only show up in mirrors
        if e.flags & RF_VIEWERMODEL != 0 {
            return;
        }
        if e.flags & RF_WEAPONMODEL == 0 && self.view.cull_alias_model(model, e) {
            return;
        }

        let fd = self.fd;
        let shadelight = shade_light(e.flags, fd.time, || match self.world {
            Some(world) => light_point(world, &e.origin, &fd.lightstyles, &fd.dlights, self.settings.modulate),
            None => [1.0; 3],
        });
        let shading = AliasShading {
            shadelight,
            alpha: if e.flags & RF_TRANSLUCENT != 0 { e.alpha } else { 1.0 },
            shell: e.flags & RF_SHELL_MASK != 0,
            shadedots: self.shadedots.for_yaw(e.angles[YAW]),
        };

        let skin = alias_skin(model, e, self.notexture);
        stats.alias_polys += draw_alias_model(gpu, model, e, &shading, skin, scratch);
        stats.texture_binds += 1;
        stats.draw_calls += 1;
    }
}

// =============================================================
//  Tests
// =============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_backend::recording::{GpuCall, RecordingBackend};
    use crate::r_backend::{ShaderId, WorldVertex};
    use crate::r_model::fixtures::*;
    use crate::r_warp::SKY_FACE_UP;
    use myq2_common::qfiles::{DAliasFrame, DMdl, DStVert, DTriVertx, DTriangle, ALIAS_VERSION};

    fn refresh_with(faces: &[FaceSpec], door: &[FaceSpec]) -> Refresh {
        let cvars = Arc::new(RwLock::new(CvarContext::new()));
        let mut r = Refresh::new(cvars, TextureId(0));
        let bsp = room_bsp(faces, [0.0; 3], door);
        let mut gpu = RecordingBackend::new();
        r.begin_registration(&bsp, &mut image_resolver(), &mut gpu).unwrap();
        r
    }

    fn box_md2() -> Md2Data {
        let verts = |k: u8| {
            vec![
                DTriVertx { v: [0, 0, 0], lightnormalindex: 5 },
                DTriVertx { v: [k, 0, 0], lightnormalindex: 5 },
                DTriVertx { v: [0, k, 0], lightnormalindex: 5 },
            ]
        };
        let bits = |f: f32| f.to_bits() as i32;
        Md2Data {
            header: DMdl {
                version: ALIAS_VERSION,
                skinwidth: 8,
                skinheight: 8,
                num_skins: 1,
                num_xyz: 3,
                num_st: 3,
                num_tris: 1,
                num_glcmds: 11,
                num_frames: 1,
            },
            skins: vec!["models/box/skin.pcx".into()],
            st: vec![DStVert::default(); 3],
            tris: vec![DTriangle { index_xyz: [0, 1, 2], index_st: [0, 1, 2] }],
            frames: vec![DAliasFrame {
                scale: [0.1; 3],
                translate: [0.0; 3],
                name: "frame0".into(),
                verts: verts(80),
            }],
            glcmds: vec![-3, bits(0.0), bits(0.0), 0, bits(1.0), bits(0.0), 1, bits(0.0), bits(1.0), 2, 0],
        }
    }

    fn looking_along_x() -> RefDef {
        RefDef::default()
    }

    /// Draws issued between `UseShader(shader)` and the next shader change.
    fn draws_under(gpu: &RecordingBackend, shader: ShaderId) -> usize {
        let mut active = false;
        let mut n = 0;
        for c in &gpu.calls {
            match c {
                GpuCall::UseShader(s) => active = *s == shader,
                GpuCall::Draw { .. } if active => n += 1,
                _ => {}
            }
        }
        n
    }

    // ---- setup ----

    #[test]
    fn test_render_without_world() {
        let cvars = Arc::new(RwLock::new(CvarContext::new()));
        let mut r = Refresh::new(cvars, TextureId(0));
        let mut gpu = RecordingBackend::new();

        let err = r.render_frame(&looking_along_x(), &mut gpu).unwrap_err();
        assert!(matches!(err, RefreshError::NoWorldModel));

        let fd = RefDef { rdflags: RDF_NOWORLDMODEL, ..looking_along_x() };
        let stats = r.render_frame(&fd, &mut gpu).unwrap();
        assert_eq!(stats.brush_polys, 0);
        assert!(gpu.draws().is_empty());
    }

    #[test]
    fn test_new_registers_cvars() {
        let cvars = Arc::new(RwLock::new(CvarContext::new()));
        let _r = Refresh::new(cvars.clone(), TextureId(0));
        let c = cvars.read();
        assert_eq!(c.variable_value("r_dynamic"), 1.0);
        assert_eq!(c.variable_value("r_modulate"), 1.0);
        assert!(c.find_var("r_lightlevel").is_some());
    }

    #[test]
    fn test_fullbright_waits_for_next_level() {
        let mut r = refresh_with(&[], &[]);
        r.cvars().write().set("r_fullbright", "1");
        assert_eq!(r.cvars().read().variable_value("r_fullbright"), 0.0);

        let bsp = room_bsp(&[], [0.0; 3], &[]);
        r.begin_registration(&bsp, &mut image_resolver(), &mut RecordingBackend::new()).unwrap();
        assert_eq!(r.cvars().read().variable_value("r_fullbright"), 1.0);
    }

    #[test]
    fn test_register_alias_model_reuses_name() {
        let mut r = refresh_with(&[], &[]);
        let a = r.register_alias_model("models/box/tris.md2", &box_md2(), vec![TextureId(9)]).unwrap();
        let b = r.register_alias_model("models/box/tris.md2", &box_md2(), vec![]).unwrap();
        assert_eq!(a, EntityModel::Alias(0));
        assert_eq!(a, b);

        let mut bad = box_md2();
        bad.header.version = 7;
        assert!(r.register_alias_model("models/bad.md2", &bad, vec![]).is_err());
    }

    // ---- frames ----

    #[test]
    fn test_sky_overhead_draws_one_quad() {
        let faces = [FaceSpec::quad([0.0, 0.0, -1.0], [0.0, 0.0, 64.0], 8.0, "e1u1/sky").with_flags(SurfFlags::SKY)];
        let mut r = refresh_with(&faces, &[]);
        let mut next = 40;
        r.set_sky("unit1_", 0.0, &[0.0; 3], &mut |_: &str| {
            next += 1;
            Some(TextureId(next))
        });

        let fd = RefDef { viewangles: [-90.0, 0.0, 0.0], ..looking_along_x() };
        let mut gpu = RecordingBackend::new();
        let stats = r.render_frame(&fd, &mut gpu).unwrap();

        for face in 0..6 {
            assert_eq!(r.sky().face_visible(face), face == SKY_FACE_UP, "face {}", face);
        }
        assert_eq!(draws_under(&gpu, ShaderId::Sky), 1);
        assert_eq!(stats.brush_polys, 0);
    }

    #[test]
    fn test_pass_order() {
        let faces = [
            FaceSpec::quad([-1.0, 0.0, 0.0], [64.0, 0.0, 0.0], 64.0, "e1u1/wall"),
            FaceSpec::quad([1.0, 0.0, 0.0], [-64.0, 0.0, 0.0], 64.0, "e1u1/glass").with_flags(SurfFlags::TRANS33),
        ];
        let door = [FaceSpec::quad([1.0, 0.0, 0.0], [32.0, 0.0, 0.0], 8.0, "e1u1/door")];
        let mut r = refresh_with(&faces, &door);
        let model = r.register_alias_model("models/box/tris.md2", &box_md2(), vec![TextureId(9)]).unwrap();

        let mut fd = looking_along_x();
        let ghost = Entity {
            model,
            origin: [40.0, 0.0, 0.0],
            flags: RF_TRANSLUCENT,
            alpha: 0.5,
            ..Entity::default()
        };
        let solid = Entity { model, origin: [40.0, 0.0, 0.0], ..Entity::default() };
        let door_entity = Entity { model: EntityModel::Brush(1), ..Entity::default() };
        let missing = Entity { model: EntityModel::Alias(5), ..Entity::default() };
        fd.entities = vec![ghost, solid, door_entity, missing];

        let mut gpu = RecordingBackend::new();
        let stats = r.render_frame(&fd, &mut gpu).unwrap();

        assert_eq!(
            gpu.shaders(),
            vec![
                ShaderId::Lightmapped, // world wall
                ShaderId::Lightmapped, // door
                ShaderId::Alias,
                ShaderId::Translucent,
                ShaderId::Alias,
            ]
        );
        assert_eq!(stats.brush_polys, 3);
        assert_eq!(stats.alias_polys, 2);
    }

    #[test]
    fn test_pvs_reused_while_standing_still() {
        let faces = [FaceSpec::quad([-1.0, 0.0, 0.0], [64.0, 0.0, 0.0], 64.0, "e1u1/wall")];
        let mut r = refresh_with(&faces, &[]);
        let mut gpu = RecordingBackend::new();

        assert!(r.render_frame(&looking_along_x(), &mut gpu).unwrap().pvs_recomputed);
        let stats = r.render_frame(&looking_along_x(), &mut gpu).unwrap();
        assert!(!stats.pvs_recomputed);
        assert_eq!(stats.brush_polys, 1);
    }

    #[test]
    fn test_dynamic_light_reaches_floor_vertices() {
        let faces = [FaceSpec::quad([0.0, 0.0, 1.0], [0.0, 0.0, -32.0], 32.0, "e1u1/floor").lit(64)];
        let mut r = refresh_with(&faces, &[]);
        let fd = RefDef {
            viewangles: [45.0, 0.0, 0.0],
            dlights: vec![
                DLight { origin: [0.0, 0.0, -500.0], color: [1.0; 3], intensity: 200.0 },
                DLight { origin: [0.0, 0.0, 0.0], color: [1.0; 3], intensity: 200.0 },
            ],
            ..looking_along_x()
        };

        // same light mask on two consecutive frames
        for _ in 0..2 {
            let mut gpu = RecordingBackend::new();
            r.render_frame(&fd, &mut gpu).unwrap();
            let verts: Vec<WorldVertex> = gpu.vertices(0);
            assert!(verts.iter().all(|v| v.light_flags == 0b10));
        }

        // r_dynamic 0 drops the mask
        r.cvars().write().set("r_dynamic", "0");
        let mut gpu = RecordingBackend::new();
        r.render_frame(&fd, &mut gpu).unwrap();
        let verts: Vec<WorldVertex> = gpu.vertices(0);
        assert!(verts.iter().all(|v| v.light_flags == 0));
    }

    #[test]
    fn test_too_many_dlights_is_fatal() {
        let mut r = refresh_with(&[], &[]);
        let fd = RefDef { dlights: vec![DLight::default(); MAX_DLIGHTS + 1], ..looking_along_x() };
        let err = r.render_frame(&fd, &mut RecordingBackend::new()).unwrap_err();
        assert_eq!(err.severity(), ERR_FATAL);
    }

    #[test]
    fn test_light_level_written_back() {
        let faces = [FaceSpec::quad([0.0, 0.0, 1.0], [0.0, 0.0, -32.0], 32.0, "e1u1/floor").lit(102)];
        let mut r = refresh_with(&faces, &[]);
        r.render_frame(&looking_along_x(), &mut RecordingBackend::new()).unwrap();

        let level = r.cvars().read().variable_value("r_lightlevel");
        assert!((level - 150.0 * 102.0 / 255.0).abs() < 0.01, "{}", level);
    }

    #[test]
    fn test_drawworld_off_skips_world() {
        let faces = [FaceSpec::quad([-1.0, 0.0, 0.0], [64.0, 0.0, 0.0], 64.0, "e1u1/wall")];
        let mut r = refresh_with(&faces, &[]);
        r.cvars().write().set("r_drawworld", "0");
        let mut gpu = RecordingBackend::new();
        let stats = r.render_frame(&looking_along_x(), &mut gpu).unwrap();
        assert_eq!(stats.brush_polys, 0);
        assert!(gpu.draws().is_empty());
        // per-frame uniforms still go out
        assert!(gpu.calls.contains(&GpuCall::SetUniformBlock(UniformBlockId::LightStyles)));
    }
}

// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// r_warp.rs — Sky and water polygon warping

use myq2_common::q_shared::*;

use crate::r_backend::{
    upload_vertices, DrawRange, GpuBackend, PrimitiveTopology, ShaderId, SkyVertex, TextureId, WorldVertex,
    TMU_DIFFUSE,
};
use crate::r_local::RefreshError;
use crate::r_model::surface_vertex;
use crate::r_model_types::*;
use crate::r_surf::push_fan_indices;

// ============================================================
// Constants
// ============================================================

const SUBDIVIDE_SIZE: f32 = 64.0;
const ON_EPSILON: f32 = 0.1;
const MAX_CLIP_VERTS: usize = 64;
const MAX_SUBDIVIDE_VERTS: usize = 60;

/// Distance of the sky box faces from the eye.
pub const SKY_DIST: f32 = 2300.0;

/// Bounds of a face nothing has touched yet.
const SKY_SENTINEL: f32 = 9999.0;

// ============================================================
// Turbulent sine table (from warpsin.h)
// ============================================================

pub static R_TURBSIN: [f32; 256] = [
    0.0, 0.19633, 0.392541, 0.588517, 0.784137, 0.979285, 1.17384, 1.3677,
    1.56072, 1.75281, 1.94384, 2.1337, 2.32228, 2.50945, 2.69512, 2.87916,
    3.06147, 3.24193, 3.42044, 3.59689, 3.77117, 3.94319, 4.11282, 4.27998,
    4.44456, 4.60647, 4.76559, 4.92185, 5.07515, 5.22538, 5.37247, 5.51632,
    5.65685, 5.79398, 5.92761, 6.05767, 6.18408, 6.30677, 6.42566, 6.54068,
    6.65176, 6.75883, 6.86183, 6.9607, 7.05537, 7.14579, 7.23191, 7.31368,
    7.39104, 7.46394, 7.53235, 7.59623, 7.65552, 7.71021, 7.76025, 7.80562,
    7.84628, 7.88222, 7.91341, 7.93984, 7.96148, 7.97832, 7.99036, 7.99759,
    8.0, 7.99759, 7.99036, 7.97832, 7.96148, 7.93984, 7.91341, 7.88222,
    7.84628, 7.80562, 7.76025, 7.71021, 7.65552, 7.59623, 7.53235, 7.46394,
    7.39104, 7.31368, 7.23191, 7.14579, 7.05537, 6.9607, 6.86183, 6.75883,
    6.65176, 6.54068, 6.42566, 6.30677, 6.18408, 6.05767, 5.92761, 5.79398,
    5.65685, 5.51632, 5.37247, 5.22538, 5.07515, 4.92185, 4.76559, 4.60647,
    4.44456, 4.27998, 4.11282, 3.94319, 3.77117, 3.59689, 3.42044, 3.24193,
    3.06147, 2.87916, 2.69512, 2.50945, 2.32228, 2.1337, 1.94384, 1.75281,
    1.56072, 1.3677, 1.17384, 0.979285, 0.784137, 0.588517, 0.392541, 0.19633,
    9.79717e-16, -0.19633, -0.392541, -0.588517, -0.784137, -0.979285, -1.17384, -1.3677,
    -1.56072, -1.75281, -1.94384, -2.1337, -2.32228, -2.50945, -2.69512, -2.87916,
    -3.06147, -3.24193, -3.42044, -3.59689, -3.77117, -3.94319, -4.11282, -4.27998,
    -4.44456, -4.60647, -4.76559, -4.92185, -5.07515, -5.22538, -5.37247, -5.51632,
    -5.65685, -5.79398, -5.92761, -6.05767, -6.18408, -6.30677, -6.42566, -6.54068,
    -6.65176, -6.75883, -6.86183, -6.9607, -7.05537, -7.14579, -7.23191, -7.31368,
    -7.39104, -7.46394, -7.53235, -7.59623, -7.65552, -7.71021, -7.76025, -7.80562,
    -7.84628, -7.88222, -7.91341, -7.93984, -7.96148, -7.97832, -7.99036, -7.99759,
    -8.0, -7.99759, -7.99036, -7.97832, -7.96148, -7.93984, -7.91341, -7.88222,
    -7.84628, -7.80562, -7.76025, -7.71021, -7.65552, -7.59623, -7.53235, -7.46394,
    -7.39104, -7.31368, -7.23191, -7.14579, -7.05537, -6.9607, -6.86183, -6.75883,
    -6.65176, -6.54068, -6.42566, -6.30677, -6.18408, -6.05767, -5.92761, -5.79398,
    -5.65685, -5.51632, -5.37247, -5.22538, -5.07515, -4.92185, -4.76559, -4.60647,
    -4.44456, -4.27998, -4.11282, -3.94319, -3.77117, -3.59689, -3.42044, -3.24193,
    -3.06147, -2.87916, -2.69512, -2.50945, -2.32228, -2.1337, -1.94384, -1.75281,
    -1.56072, -1.3677, -1.17384, -0.979285, -0.784137, -0.588517, -0.392541, -0.19633,
];

const TURBSCALE: f32 = 256.0 / (2.0 * std::f32::consts::PI);

// ============================================================
// Sky clip planes
// ============================================================

pub static SKYCLIP: [[f32; 3]; 6] = [
    [1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
    [0.0, -1.0, 1.0],
    [0.0, 1.0, 1.0],
    [1.0, 0.0, 1.0],
    [-1.0, 0.0, 1.0],
];

// 1 = s, 2 = t, 3 = 2048
pub static ST_TO_VEC: [[i32; 3]; 6] = [
    [3, -1, 2],
    [-3, 1, 2],
    [1, 3, 2],
    [-1, -3, 2],
    [-2, -1, 3], // 0 degrees yaw, look straight up
    [2, -1, -3], // look straight down
];

// s = [0]/[2], t = [1]/[2]
pub static VEC_TO_ST: [[i32; 3]; 6] = [
    [-2, 3, 1],
    [2, 3, -1],
    [1, 3, 2],
    [-1, 3, -2],
    [-2, -1, 3],
    [-2, 1, -3],
];

pub static SKYTEXORDER: [usize; 6] = [0, 2, 1, 3, 4, 5];

static SUF: [&str; 6] = ["rt", "bk", "lf", "ft", "up", "dn"];

/// Sky face that the up-looking camera sees.
pub const SKY_FACE_UP: usize = 4;

// ============================================================
// Polygon subdivision
// ============================================================

/// Axis-aligned bounds of a polygon.
pub fn bound_poly(verts: &[Vec3]) -> (Vec3, Vec3) {
    let mut mins = [SKY_SENTINEL; 3];
    let mut maxs = [-SKY_SENTINEL; 3];
    for v in verts {
        for j in 0..3 {
            if v[j] < mins[j] {
                mins[j] = v[j];
            }
            if v[j] > maxs[j] {
                maxs[j] = v[j];
            }
        }
    }
    (mins, maxs)
}

/// Cut a polygon on a 64 unit grid so the warp stays smooth.
///
/// Every piece is returned as a fan with a centre point prepended and the
/// first vertex repeated at the end. `st` holds raw texture-space s,t.
pub fn subdivide_polygon(verts: Vec<Vec3>, vecs: &[[f32; 4]; 2]) -> Result<Vec<GlPoly>, RefreshError> {
    let mut polys = Vec::new();
    let mut work = vec![verts];

    while let Some(verts) = work.pop() {
        let numverts = verts.len();
        if numverts > MAX_SUBDIVIDE_VERTS {
            return Err(RefreshError::BadLump {
                model: String::new(),
                reason: format!("SubdividePolygon: numverts = {}", numverts),
            });
        }

        let (mins, maxs) = bound_poly(&verts);

        let mut split = None;
        for i in 0..3 {
            let m = (mins[i] + maxs[i]) * 0.5;
            let m = SUBDIVIDE_SIZE * (m / SUBDIVIDE_SIZE + 0.5).floor();
            if maxs[i] - m < 8.0 || m - mins[i] < 8.0 {
                continue;
            }
            split = Some((i, m));
            break;
        }

        let Some((axis, m)) = split else {
            polys.push(warp_poly(&verts, vecs));
            continue;
        };

        // cut it
        let dist: Vec<f32> = verts.iter().map(|v| v[axis] - m).collect();
        let mut front = Vec::with_capacity(numverts + 2);
        let mut back = Vec::with_capacity(numverts + 2);

        for j in 0..numverts {
            let next = (j + 1) % numverts;
            let v = verts[j];
            if dist[j] >= 0.0 {
                front.push(v);
            }
            if dist[j] <= 0.0 {
                back.push(v);
            }
            if dist[j] == 0.0 || dist[next] == 0.0 {
                continue;
            }
            if (dist[j] > 0.0) != (dist[next] > 0.0) {
                // clip point
                let frac = dist[j] / (dist[j] - dist[next]);
                let mut e = [0.0f32; 3];
                for k in 0..3 {
                    e[k] = v[k] + frac * (verts[next][k] - v[k]);
                }
                front.push(e);
                back.push(e);
            }
        }

        work.push(back);
        work.push(front);
    }

    Ok(polys)
}

fn warp_poly(verts: &[Vec3], vecs: &[[f32; 4]; 2]) -> GlPoly {
    let numverts = verts.len();
    let mut out = Vec::with_capacity(numverts + 2);
    out.push(PolyVert::default());

    let mut total = [0.0f32; 3];
    let mut total_s = 0.0;
    let mut total_t = 0.0;
    for v in verts {
        let s = dot_product(v, &[vecs[0][0], vecs[0][1], vecs[0][2]]);
        let t = dot_product(v, &[vecs[1][0], vecs[1][1], vecs[1][2]]);
        total_s += s;
        total_t += t;
        total = vector_add(&total, v);
        out.push(PolyVert { xyz: *v, st: [s, t], lm_st: [0.0; 2] });
    }

    // add a point in the center to help keep warp valid
    let n = numverts as f32;
    out[0] = PolyVert {
        xyz: vector_scale(&total, 1.0 / n),
        st: [total_s / n, total_t / n],
        lm_st: [0.0; 2],
    };
    out.push(out[1]);

    GlPoly { verts: out }
}

/// Break a warped surface into grid-sized fans.
pub fn subdivide_surface(m: &WorldModel, surf: &MSurface) -> Result<Vec<GlPoly>, RefreshError> {
    let verts: Vec<Vec3> = (0..surf.numedges).map(|i| surface_vertex(m, surf, i)).collect();
    subdivide_polygon(verts, &m.texinfo[surf.texinfo].vecs).map_err(|e| match e {
        RefreshError::BadLump { reason, .. } => RefreshError::BadLump { model: m.name.clone(), reason },
        other => other,
    })
}

// ============================================================
// Water polygon emission
// ============================================================

/// Append the fans of a warped surface with turbulent texture coordinates.
pub fn emit_water_polys(
    surf: &MSurface,
    normal: Vec3,
    flowing: bool,
    time: f32,
    verts: &mut Vec<WorldVertex>,
    indices: &mut Vec<u32>,
) {
    let scroll = if flowing {
        -64.0 * ((time * 0.5) - (time * 0.5).trunc())
    } else {
        0.0
    };

    for p in &surf.polys {
        let base = verts.len() as u32;
        for v in &p.verts {
            let os = v.st[0];
            let ot = v.st[1];

            let mut s = os + R_TURBSIN[(((ot * 0.125 + time) * TURBSCALE) as i32 & 255) as usize];
            s += scroll;
            s *= 1.0 / 64.0;

            let mut t = ot + R_TURBSIN[(((os * 0.125 + time) * TURBSCALE) as i32 & 255) as usize];
            t *= 1.0 / 64.0;

            verts.push(WorldVertex {
                position: v.xyz,
                tex_coord: [s, t],
                normal,
                styles: [255; 4],
                ..Default::default()
            });
        }
        push_fan_indices(indices, base, p.verts.len());
    }
}

// ============================================================
// Sky box
// ============================================================

/// Per-frame sky face bounds plus the loaded sky.
#[derive(Debug, Clone)]
pub struct SkyBox {
    pub name: String,
    pub rotate: f32,
    pub axis: Vec3,
    pub images: [TextureId; 6],

    mins: [[f32; 6]; 2],
    maxs: [[f32; 6]; 2],
    sky_min: f32,
    sky_max: f32,

    /// Polygon fragments projected this frame.
    pub c_sky: u32,
}

impl Default for SkyBox {
    fn default() -> Self {
        let mut sky = Self {
            name: String::new(),
            rotate: 0.0,
            axis: [0.0; 3],
            images: [TextureId::default(); 6],
            mins: [[0.0; 6]; 2],
            maxs: [[0.0; 6]; 2],
            sky_min: 1.0 / 512.0,
            sky_max: 511.0 / 512.0,
            c_sky: 0,
        };
        sky.clear();
        sky
    }
}

impl SkyBox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the six `env/<name><suffix>.pcx` images.
    pub fn set_sky(
        &mut self,
        name: &str,
        rotate: f32,
        axis: &Vec3,
        find_image: &mut dyn FnMut(&str) -> Option<TextureId>,
        notexture: TextureId,
    ) {
        self.name = name.to_string();
        self.rotate = rotate;
        self.axis = *axis;

        for (image, suf) in self.images.iter_mut().zip(SUF.iter()) {
            let pathname = format!("env/{}{}.pcx", name, suf);
            *image = find_image(&pathname).unwrap_or(notexture);
        }

        if rotate != 0.0 {
            self.sky_min = 1.0 / 256.0;
            self.sky_max = 255.0 / 256.0;
        } else {
            self.sky_min = 1.0 / 512.0;
            self.sky_max = 511.0 / 512.0;
        }
    }

    /// Reset every face to its empty sentinel bounds.
    pub fn clear(&mut self) {
        for i in 0..6 {
            self.mins[0][i] = SKY_SENTINEL;
            self.mins[1][i] = SKY_SENTINEL;
            self.maxs[0][i] = -SKY_SENTINEL;
            self.maxs[1][i] = -SKY_SENTINEL;
        }
        self.c_sky = 0;
    }

    /// S and T bounds of one face: `([smin, tmin], [smax, tmax])`.
    pub fn face_bounds(&self, face: usize) -> ([f32; 2], [f32; 2]) {
        (
            [self.mins[0][face], self.mins[1][face]],
            [self.maxs[0][face], self.maxs[1][face]],
        )
    }

    pub fn face_visible(&self, face: usize) -> bool {
        self.mins[0][face] < self.maxs[0][face] && self.mins[1][face] < self.maxs[1][face]
    }

    /// Clip the camera-relative polygons of a sky surface into the face bounds.
    pub fn add_sky_surface(&mut self, surf: &MSurface, origin: &Vec3) -> Result<(), RefreshError> {
        for p in &surf.polys {
            let verts = p.verts.iter().map(|v| vector_subtract(&v.xyz, origin)).collect();
            self.clip_sky_polygon(verts)?;
        }
        Ok(())
    }

    /// Split a polygon by the six face boundary planes, then project every
    /// fragment onto its face.
    pub fn clip_sky_polygon(&mut self, verts: Vec<Vec3>) -> Result<(), RefreshError> {
        let mut work = vec![(verts, 0usize)];

        while let Some((vecs, stage)) = work.pop() {
            let nump = vecs.len();
            if nump > MAX_CLIP_VERTS - 2 {
                return Err(RefreshError::TooManyClipVerts);
            }
            if stage == 6 {
                // fully clipped, so draw it
                self.draw_sky_polygon(&vecs);
                continue;
            }

            let norm = &SKYCLIP[stage];
            let mut front = false;
            let mut back = false;
            let mut dists = Vec::with_capacity(nump);
            let mut sides = Vec::with_capacity(nump);

            for v in &vecs {
                let d = dot_product(v, norm);
                let side = if d > ON_EPSILON {
                    front = true;
                    SIDE_FRONT
                } else if d < -ON_EPSILON {
                    back = true;
                    SIDE_BACK
                } else {
                    SIDE_ON
                };
                sides.push(side);
                dists.push(d);
            }

            if !front || !back {
                // not clipped
                work.push((vecs, stage + 1));
                continue;
            }

            // clip it
            let mut newv: [Vec<Vec3>; 2] = [Vec::with_capacity(nump + 1), Vec::with_capacity(nump + 1)];
            for i in 0..nump {
                let next = (i + 1) % nump;
                let v = vecs[i];
                match sides[i] {
                    SIDE_FRONT => newv[0].push(v),
                    SIDE_BACK => newv[1].push(v),
                    _ => {
                        newv[0].push(v);
                        newv[1].push(v);
                    }
                }

                if sides[i] == SIDE_ON || sides[next] == SIDE_ON || sides[next] == sides[i] {
                    continue;
                }

                let d = dists[i] / (dists[i] - dists[next]);
                let mut e = [0.0f32; 3];
                for j in 0..3 {
                    e[j] = v[j] + d * (vecs[next][j] - v[j]);
                }
                newv[0].push(e);
                newv[1].push(e);
            }

            let [front_verts, back_verts] = newv;
            work.push((back_verts, stage + 1));
            work.push((front_verts, stage + 1));
        }
        Ok(())
    }

    /// Expand the bounds of the face the fragment's average direction picks.
    fn draw_sky_polygon(&mut self, vecs: &[Vec3]) {
        self.c_sky += 1;

        // decide which face it maps to
        let mut v = [0.0f32; 3];
        for p in vecs {
            v = vector_add(&v, p);
        }
        let av = [v[0].abs(), v[1].abs(), v[2].abs()];
        let axis = if av[0] > av[1] && av[0] > av[2] {
            if v[0] < 0.0 { 1 } else { 0 }
        } else if av[1] > av[2] && av[1] > av[0] {
            if v[1] < 0.0 { 3 } else { 2 }
        } else if v[2] < 0.0 {
            5
        } else {
            4
        };

        let component = |vp: &Vec3, j: i32| {
            if j < 0 {
                -vp[(-j - 1) as usize]
            } else {
                vp[(j - 1) as usize]
            }
        };

        // project new texture coords
        for vp in vecs {
            let dv = component(vp, VEC_TO_ST[axis][2]);
            if dv < 0.001 {
                continue; // don't divide by zero
            }
            let s = component(vp, VEC_TO_ST[axis][0]) / dv;
            let t = component(vp, VEC_TO_ST[axis][1]) / dv;

            if s < self.mins[0][axis] {
                self.mins[0][axis] = s;
            }
            if t < self.mins[1][axis] {
                self.mins[1][axis] = t;
            }
            if s > self.maxs[0][axis] {
                self.maxs[0][axis] = s;
            }
            if t > self.maxs[1][axis] {
                self.maxs[1][axis] = t;
            }
        }
    }

    /// Eye-relative corner of face `axis` at face coordinates (s, t) in
    /// [-1, 1], with clamped texture coordinates.
    pub fn make_sky_vec(&self, s: f32, t: f32, axis: usize) -> SkyVertex {
        let b = [s * SKY_DIST, t * SKY_DIST, SKY_DIST];

        let mut v = [0.0f32; 3];
        for j in 0..3 {
            let k = ST_TO_VEC[axis][j];
            v[j] = if k < 0 { -b[(-k - 1) as usize] } else { b[(k - 1) as usize] };
        }

        // avoid bilerp seam
        let s = ((s + 1.0) * 0.5).clamp(self.sky_min, self.sky_max);
        let t = ((t + 1.0) * 0.5).clamp(self.sky_min, self.sky_max);

        SkyVertex {
            position: v,
            tex_coord: [s, 1.0 - t],
        }
    }

    /// Emit one quad per touched face around `origin`. Returns the number
    /// of quads drawn.
    pub fn draw(&mut self, gpu: &mut dyn GpuBackend, origin: &Vec3, time: f32) -> u32 {
        if self.rotate != 0.0 {
            // check for no sky at all
            if !(0..6).any(|i| self.face_visible(i)) {
                return 0;
            }
            // a rotating sky shows every face
            for i in 0..6 {
                self.mins[0][i] = -1.0;
                self.mins[1][i] = -1.0;
                self.maxs[0][i] = 1.0;
                self.maxs[1][i] = 1.0;
            }
        }

        let angle = time * self.rotate;
        let mut verts = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        let mut faces = Vec::with_capacity(6);

        for i in 0..6 {
            if !self.face_visible(i) {
                continue;
            }
            let base = verts.len() as u32;
            let (mins, maxs) = self.face_bounds(i);
            for (s, t) in [(mins[0], mins[1]), (mins[0], maxs[1]), (maxs[0], maxs[1]), (maxs[0], mins[1])] {
                let mut sv = self.make_sky_vec(s, t, i);
                if angle != 0.0 {
                    sv.position = rotate_point_around_vector(&self.axis, &sv.position, angle);
                }
                sv.position = vector_add(&sv.position, origin);
                verts.push(sv);
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
            faces.push(i);
        }

        if faces.is_empty() {
            return 0;
        }

        gpu.use_shader(ShaderId::Sky);
        upload_vertices(gpu, &verts, &indices);
        for (n, &i) in faces.iter().enumerate() {
            gpu.bind_texture(TMU_DIFFUSE, self.images[SKYTEXORDER[i]]);
            gpu.draw(
                PrimitiveTopology::TriangleList,
                DrawRange::Indices { first: n as u32 * 6, count: 6 },
            );
        }
        faces.len() as u32
    }
}

// =============================================================
//  Tests
// =============================================================

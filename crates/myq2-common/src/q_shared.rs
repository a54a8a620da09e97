// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// q_shared.rs — math and flag definitions shared by the refresh and its callers

// ============================================================
// Basic types
// ============================================================

pub type Vec3 = [f32; 3];

pub const PITCH: usize = 0; // up / down
pub const YAW: usize = 1; // left / right
pub const ROLL: usize = 2; // fall over

pub const MAX_DLIGHTS: usize = 32;
pub const MAX_LIGHTSTYLES: usize = 256;

// ============================================================
// Print levels / error codes
// ============================================================

pub const ERR_FATAL: i32 = 4; // exit the entire game with a popup window
pub const ERR_DROP: i32 = 8; // print to console and disconnect from game

pub const PRINT_ALL: i32 = 0;
pub const PRINT_DEVELOPER: i32 = 1; // only print when "developer 1"

// ============================================================
// Contents / surface flags
// ============================================================

pub const CONTENTS_SOLID: i32 = 1;
pub const CONTENTS_WATER: i32 = 32;

bitflags::bitflags! {
    /// Texinfo surface flags as stored in the level file.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SurfFlags: i32 {
        const SKY     = 0x4;  // don't draw, but add to skybox
        const WARP    = 0x8;  // turbulent water warp
        const TRANS33 = 0x10;
        const TRANS66 = 0x20;
        const FLOWING = 0x40; // scroll towards angle
    }
}

impl SurfFlags {
    /// Either translucency level.
    pub const TRANSLUCENT: SurfFlags = SurfFlags::TRANS33.union(SurfFlags::TRANS66);
}

// ============================================================
// Entity render flags (RF_*) and refdef flags (RDF_*)
// ============================================================

pub const RF_MINLIGHT: i32 = 1; // always have some light (viewmodel)
pub const RF_VIEWERMODEL: i32 = 2; // don't draw through eyes, only mirrors
pub const RF_WEAPONMODEL: i32 = 4; // only draw through eyes
pub const RF_FULLBRIGHT: i32 = 8; // always draw full intensity
pub const RF_TRANSLUCENT: i32 = 32;
pub const RF_GLOW: i32 = 512; // pulse lighting for bonus items
pub const RF_SHELL_RED: i32 = 1024;
pub const RF_SHELL_GREEN: i32 = 2048;
pub const RF_SHELL_BLUE: i32 = 4096;
pub const RF_SHELL_DOUBLE: i32 = 0x00010000;
pub const RF_SHELL_HALF_DAM: i32 = 0x00020000;

pub const RF_SHELL_MASK: i32 =
    RF_SHELL_RED | RF_SHELL_GREEN | RF_SHELL_BLUE | RF_SHELL_DOUBLE | RF_SHELL_HALF_DAM;

pub const RDF_NOWORLDMODEL: i32 = 2; // used for player configuration screen

// ============================================================
// Plane
// ============================================================

// Plane types; 0-2 are axial planes
pub const PLANE_X: u8 = 0;
pub const PLANE_Y: u8 = 1;
pub const PLANE_Z: u8 = 2;
pub const PLANE_ANYX: u8 = 3;
pub const PLANE_ANYY: u8 = 4;
pub const PLANE_ANYZ: u8 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CPlane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: u8, // for fast side tests
    pub signbits: u8,   // signx + (signy<<1) + (signz<<2)
}

impl CPlane {
    /// Build a plane and classify it: axial type and sign bits.
    pub fn new(normal: Vec3, dist: f32) -> Self {
        Self {
            normal,
            dist,
            plane_type: plane_type_for_normal(&normal),
            signbits: signbits_for_plane(&normal),
        }
    }

    /// Signed distance from `p` to the plane, using the axial fast path.
    #[inline]
    pub fn distance(&self, p: &Vec3) -> f32 {
        match self.plane_type {
            PLANE_X | PLANE_Y | PLANE_Z => p[self.plane_type as usize] - self.dist,
            _ => dot_product(p, &self.normal) - self.dist,
        }
    }
}

/// Sign bitmask of a plane normal, used to pick the near/far box corners.
pub fn signbits_for_plane(normal: &Vec3) -> u8 {
    let mut bits = 0;
    for (j, &n) in normal.iter().enumerate() {
        if n < 0.0 {
            bits |= 1 << j;
        }
    }
    bits
}

pub fn plane_type_for_normal(normal: &Vec3) -> u8 {
    if normal[0] == 1.0 || normal[0] == -1.0 {
        return PLANE_X;
    }
    if normal[1] == 1.0 || normal[1] == -1.0 {
        return PLANE_Y;
    }
    if normal[2] == 1.0 || normal[2] == -1.0 {
        return PLANE_Z;
    }

    let ax = normal[0].abs();
    let ay = normal[1].abs();
    let az = normal[2].abs();
    if ax >= ay && ax >= az {
        PLANE_ANYX
    } else if ay >= ax && ay >= az {
        PLANE_ANYY
    } else {
        PLANE_ANYZ
    }
}

/// Returns 1 (front), 2 (back), or 3 (crossing) for a box vs. plane test.
pub fn box_on_plane_side(emins: &Vec3, emaxs: &Vec3, p: &CPlane) -> i32 {
    // fast axial cases
    if p.plane_type < 3 {
        let t = p.plane_type as usize;
        if p.dist <= emins[t] {
            return 1;
        }
        if p.dist >= emaxs[t] {
            return 2;
        }
        return 3;
    }

    // general case: signbits select the nearest and farthest corners
    let mut near = [0.0f32; 3];
    let mut far = [0.0f32; 3];
    for i in 0..3 {
        if p.signbits & (1 << i) != 0 {
            far[i] = emins[i];
            near[i] = emaxs[i];
        } else {
            far[i] = emaxs[i];
            near[i] = emins[i];
        }
    }
    let dist1 = dot_product(&p.normal, &far);
    let dist2 = dot_product(&p.normal, &near);

    let mut sides = 0;
    if dist1 >= p.dist {
        sides = 1;
    }
    if dist2 < p.dist {
        sides |= 2;
    }
    sides
}

// ============================================================
// Vector math
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

/// veca + scale * vecb
#[inline]
pub fn vector_ma(veca: &Vec3, scale: f32, vecb: &Vec3) -> Vec3 {
    [
        veca[0] + scale * vecb[0],
        veca[1] + scale * vecb[1],
        veca[2] + scale * vecb[2],
    ]
}

pub fn vector_length(v: &Vec3) -> f32 {
    dot_product(v, v).sqrt()
}

/// Normalize in place, returns original length.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

pub fn cross_product(v1: &Vec3, v2: &Vec3) -> Vec3 {
    [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ]
}

pub fn clear_bounds() -> (Vec3, Vec3) {
    ([99999.0; 3], [-99999.0; 3])
}

pub fn add_point_to_bounds(v: &Vec3, mins: &mut Vec3, maxs: &mut Vec3) {
    for i in 0..3 {
        if v[i] < mins[i] {
            mins[i] = v[i];
        }
        if v[i] > maxs[i] {
            maxs[i] = v[i];
        }
    }
}

/// Distance from the origin to the farthest box corner.
pub fn radius_from_bounds(mins: &Vec3, maxs: &Vec3) -> f32 {
    let mut corner = [0.0f32; 3];
    for i in 0..3 {
        corner[i] = mins[i].abs().max(maxs[i].abs());
    }
    vector_length(&corner)
}

// ============================================================
// Rotation
// ============================================================

/// Forward, right and up vectors for a pitch/yaw/roll triple in degrees.
pub fn angle_vectors(angles: &Vec3) -> (Vec3, Vec3, Vec3) {
    let (sy, cy) = angles[YAW].to_radians().sin_cos();
    let (sp, cp) = angles[PITCH].to_radians().sin_cos();
    let (sr, cr) = angles[ROLL].to_radians().sin_cos();

    let forward = [cp * cy, cp * sy, -sp];
    let right = [
        -sr * sp * cy + -cr * -sy,
        -sr * sp * sy + -cr * cy,
        -sr * cp,
    ];
    let up = [
        cr * sp * cy + -sr * -sy,
        cr * sp * sy + -sr * cy,
        cr * cp,
    ];
    (forward, right, up)
}

pub fn concat_rotations(in1: &[[f32; 3]; 3], in2: &[[f32; 3]; 3]) -> [[f32; 3]; 3] {
    let mut out = [[0.0f32; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = in1[i][0] * in2[0][j] + in1[i][1] * in2[1][j] + in1[i][2] * in2[2][j];
        }
    }
    out
}

pub fn project_point_on_plane(p: &Vec3, normal: &Vec3) -> Vec3 {
    let inv_denom = 1.0 / dot_product(normal, normal);
    let d = dot_product(normal, p) * inv_denom;
    let n = vector_scale(normal, inv_denom);
    vector_ma(p, -d, &n)
}

/// Any unit vector perpendicular to `src` (assumed normalized).
pub fn perpendicular_vector(src: &Vec3) -> Vec3 {
    let mut min_elem: f32 = 1.0;
    let mut pos = 0;
    for (i, &c) in src.iter().enumerate() {
        if c.abs() < min_elem {
            pos = i;
            min_elem = c.abs();
        }
    }
    let mut tempvec = [0.0f32; 3];
    tempvec[pos] = 1.0;

    let mut dst = project_point_on_plane(&tempvec, src);
    vector_normalize(&mut dst);
    dst
}

/// Rotate `point` about the axis `dir` by `degrees`.
pub fn rotate_point_around_vector(dir: &Vec3, point: &Vec3, degrees: f32) -> Vec3 {
    let vf = *dir;
    let vr = perpendicular_vector(dir);
    let vup = cross_product(&vr, &vf);

    let m = [
        [vr[0], vup[0], vf[0]],
        [vr[1], vup[1], vf[1]],
        [vr[2], vup[2], vf[2]],
    ];
    let im = [
        [m[0][0], m[1][0], m[2][0]],
        [m[0][1], m[1][1], m[2][1]],
        [m[0][2], m[1][2], m[2][2]],
    ];

    let (s, c) = degrees.to_radians().sin_cos();
    let zrot = [[c, s, 0.0], [-s, c, 0.0], [0.0, 0.0, 1.0]];

    let rot = concat_rotations(&concat_rotations(&m, &zrot), &im);

    let mut dst = [0.0f32; 3];
    for i in 0..3 {
        dst[i] = rot[i][0] * point[0] + rot[i][1] * point[1] + rot[i][2] * point[2];
    }
    dst
}

// =============================================================
//  Tests
// =============================================================

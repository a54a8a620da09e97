// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// r_vis.rs — View setup, PVS marking and frustum culling

use myq2_common::q_shared::*;

use crate::r_local::{Entity, RefreshSettings, WorldFrameState};
use crate::r_mesh::clamp_frame;
use crate::r_model::{cluster_pvs, point_in_leaf};
use crate::r_model_types::{AliasModel, MModel, WorldModel};

/// Camera pose, frustum and PVS clusters for the current frame.
#[derive(Debug, Clone)]
pub struct ViewState {
    pub origin: Vec3,
    pub vpn: Vec3,
    pub vright: Vec3,
    pub vup: Vec3,

    pub frustum: [CPlane; 4],
    pub nocull: bool,

    pub viewcluster: i32,
    pub viewcluster2: i32,
    pub oldviewcluster: i32,
    pub oldviewcluster2: i32,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            vpn: [1.0, 0.0, 0.0],
            vright: [0.0, -1.0, 0.0],
            vup: [0.0, 0.0, 1.0],
            frustum: [CPlane::default(); 4],
            nocull: false,
            viewcluster: -1,
            viewcluster2: -1,
            // force a PVS pass on the first frame
            oldviewcluster: -2,
            oldviewcluster2: -2,
        }
    }
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the camera pose and, with a world, find the view clusters.
    pub fn setup_frame(&mut self, world: Option<&WorldModel>, vieworg: &Vec3, viewangles: &Vec3) {
        self.origin = *vieworg;
        let (f, r, u) = angle_vectors(viewangles);
        self.vpn = f;
        self.vright = r;
        self.vup = u;

        if let Some(world) = world {
            self.setup_view_clusters(world);
        }
    }

    /// Current viewcluster, plus the one just across a water surface.
    pub fn setup_view_clusters(&mut self, world: &WorldModel) {
        self.oldviewcluster = self.viewcluster;
        self.oldviewcluster2 = self.viewcluster2;

        let Some(leaf) = point_in_leaf(&self.origin, world).map(|l| &world.leafs[l]) else {
            self.viewcluster = -1;
            self.viewcluster2 = -1;
            return;
        };
        self.viewcluster = leaf.cluster;
        self.viewcluster2 = leaf.cluster;

        // check above and below so crossing solid water doesn't draw wrong
        let mut temp = self.origin;
        if leaf.contents == 0 {
            temp[2] -= 16.0; // look down a bit
        } else {
            temp[2] += 16.0; // look up a bit
        }
        if let Some(leaf2) = point_in_leaf(&temp, world).map(|l| &world.leafs[l]) {
            if leaf2.contents & CONTENTS_SOLID == 0 && leaf2.cluster != self.viewcluster2 {
                self.viewcluster2 = leaf2.cluster;
            }
        }
    }

    /// Build the four side planes by rotating the view direction half the
    /// field of view around the up and right axes.
    pub fn set_frustum(&mut self, fov_x: f32, fov_y: f32) {
        // rotate VPN right by FOV_X/2 degrees
        self.frustum[0].normal = rotate_point_around_vector(&self.vup, &self.vpn, -(90.0 - fov_x / 2.0));
        // rotate VPN left by FOV_X/2 degrees
        self.frustum[1].normal = rotate_point_around_vector(&self.vup, &self.vpn, 90.0 - fov_x / 2.0);
        // rotate VPN up by FOV_Y/2 degrees
        self.frustum[2].normal = rotate_point_around_vector(&self.vright, &self.vpn, 90.0 - fov_y / 2.0);
        // rotate VPN down by FOV_Y/2 degrees
        self.frustum[3].normal = rotate_point_around_vector(&self.vright, &self.vpn, -(90.0 - fov_y / 2.0));

        for p in self.frustum.iter_mut() {
            p.plane_type = PLANE_ANYZ;
            p.dist = dot_product(&self.origin, &p.normal);
            p.signbits = signbits_for_plane(&p.normal);
        }
    }

    /// True if the box is completely outside the frustum.
    pub fn cull_box(&self, mins: &Vec3, maxs: &Vec3) -> bool {
        if self.nocull {
            return false;
        }
        self.frustum.iter().any(|p| box_on_plane_side(mins, maxs, p) == 2)
    }

    /// Stamp every leaf and node whose cluster the camera can see.
    ///
    /// Reuses the previous stamps while the view clusters are unchanged.
    /// Returns true if a new PVS pass ran.
    pub fn mark_leaves(
        &mut self,
        world: &WorldModel,
        state: &mut WorldFrameState,
        visframecount: &mut i32,
        settings: &RefreshSettings,
    ) -> bool {
        if self.oldviewcluster == self.viewcluster
            && self.oldviewcluster2 == self.viewcluster2
            && !settings.novis
            && self.viewcluster != -1
        {
            return false;
        }

        // development aid to let you run around and see exactly where the pvs ends
        if settings.lockpvs {
            return false;
        }

        *visframecount += 1;
        let count = *visframecount;
        self.oldviewcluster = self.viewcluster;
        self.oldviewcluster2 = self.viewcluster2;

        if settings.novis || self.viewcluster == -1 || world.vis.is_none() {
            // mark everything
            state.leaf_visframe.iter_mut().for_each(|v| *v = count);
            state.node_visframe.iter_mut().for_each(|v| *v = count);
            return true;
        }

        let mut vis = cluster_pvs(self.viewcluster, world);

        // may have to combine two clusters because of solid water boundaries
        if self.viewcluster2 != self.viewcluster {
            let vis2 = cluster_pvs(self.viewcluster2, world);
            for (a, b) in vis.iter_mut().zip(vis2.iter()) {
                *a |= *b;
            }
        }

        for (i, leaf) in world.leafs.iter().enumerate() {
            let cluster = leaf.cluster;
            if cluster == -1 {
                continue;
            }
            let byte = vis.get((cluster >> 3) as usize).copied().unwrap_or(0);
            if byte & (1 << (cluster & 7)) == 0 {
                continue;
            }

            if state.leaf_visframe[i] == count {
                continue;
            }
            state.leaf_visframe[i] = count;

            let mut node = leaf.parent;
            while let Some(n) = node {
                if state.node_visframe[n] == count {
                    break;
                }
                state.node_visframe[n] = count;
                node = world.nodes[n].parent;
            }
        }
        true
    }

    /// True if the entity's interpolated bounding box is outside the frustum.
    pub fn cull_alias_model(&self, model: &AliasModel, e: &Entity) -> bool {
        let frame = clamp_frame(model, e.frame, "R_CullAliasModel");
        let oldframe = clamp_frame(model, e.oldframe, "R_CullAliasModel");

        let pframe = &model.frames[frame];
        let poldframe = &model.frames[oldframe];

        // compute axially aligned mins and maxs
        let mut mins = [0.0f32; 3];
        let mut maxs = [0.0f32; 3];
        for i in 0..3 {
            let thismins = pframe.translate[i];
            let thismaxs = thismins + pframe.scale[i] * 255.0;
            let oldmins = poldframe.translate[i];
            let oldmaxs = oldmins + poldframe.scale[i] * 255.0;
            mins[i] = thismins.min(oldmins);
            maxs[i] = thismaxs.max(oldmaxs);
        }

        // rotate the bounding box
        let mut angles = e.angles;
        angles[YAW] = -angles[YAW];
        let (forward, right, up) = angle_vectors(&angles);

        let mut aggregatemask = !0u32;
        for i in 0..8 {
            let tmp = [
                if i & 1 != 0 { mins[0] } else { maxs[0] },
                if i & 2 != 0 { mins[1] } else { maxs[1] },
                if i & 4 != 0 { mins[2] } else { maxs[2] },
            ];
            let corner = [
                dot_product(&forward, &tmp) + e.origin[0],
                -dot_product(&right, &tmp) + e.origin[1],
                dot_product(&up, &tmp) + e.origin[2],
            ];

            let mut mask = 0u32;
            for (f, plane) in self.frustum.iter().enumerate() {
                if dot_product(&plane.normal, &corner) - plane.dist < 0.0 {
                    mask |= 1 << f;
                }
            }
            aggregatemask &= mask;
        }

        !self.nocull && aggregatemask != 0
    }

    /// Conservative world-space bounds of an inline model; rotated models
    /// use their radius.
    pub fn brush_model_bounds(sub: &MModel, e: &Entity) -> (Vec3, Vec3) {
        if e.angles.iter().any(|&a| a != 0.0) {
            let r = [sub.radius; 3];
            (vector_subtract(&e.origin, &r), vector_add(&e.origin, &r))
        } else {
            (vector_add(&e.origin, &sub.mins), vector_add(&e.origin, &sub.maxs))
        }
    }

    /// View origin in the entity's local space.
    pub fn entity_local_origin(&self, e: &Entity) -> Vec3 {
        world_to_entity(e, &self.origin)
    }
}

/// True if `area` is open in the refdef's area mask; no mask means every
/// area is connected.
pub fn area_visible(areabits: Option<&[u8]>, area: i32) -> bool {
    let Some(bits) = areabits else {
        return true;
    };
    if area < 0 {
        return false;
    }
    bits.get((area >> 3) as usize).is_some_and(|b| b & (1 << (area & 7)) != 0)
}

/// A world point in the entity's local space.
pub fn world_to_entity(e: &Entity, p: &Vec3) -> Vec3 {
    let temp = vector_subtract(p, &e.origin);
    if e.angles.iter().all(|&a| a == 0.0) {
        return temp;
    }
    let (forward, right, up) = angle_vectors(&e.angles);
    [dot_product(&temp, &forward), -dot_product(&temp, &right), dot_product(&temp, &up)]
}

// =============================================================
//  Tests
// =============================================================

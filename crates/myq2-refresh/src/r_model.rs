// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// r_model.rs
// Level finishing and model validation: parsed lumps in, immutable
// WorldModel / AliasModel out.

use std::collections::HashMap;

use myq2_common::q_shared::*;
use myq2_common::qfiles::*;

use crate::r_backend::{GpuBackend, TextureId};
use crate::r_lightmap::LightmapBuilder;
use crate::r_local::{vid_printf, RefreshError};
use crate::r_model_types::*;
use crate::r_warp::subdivide_surface;

/// Deepest tree accepted; real levels stay far below this.
pub const MAX_NODE_DEPTH: usize = 1024;

/// Largest texture extent of a lightmapped surface.
const MAX_SURFACE_EXTENT: i16 = 512;

// ===============================================================
//  BRUSH MODELS
// ===============================================================

/// Turn a parsed level into a `WorldModel`, packing and uploading its
/// lightmaps on the way.
///
/// `find_image` maps a texture path (`textures/<name>.wal`) to an image the
/// caller has already uploaded.
pub fn load_brush_model(
    bsp: &BspData,
    find_image: &mut dyn FnMut(&str) -> Image,
    gpu: &mut dyn GpuBackend,
    fullbright: bool,
) -> Result<WorldModel, RefreshError> {
    let mut m = WorldModel {
        name: bsp.name.clone(),
        ..Default::default()
    };

    load_vertexes(&mut m, &bsp.vertexes)?;
    load_edges(&mut m, &bsp.edges)?;
    load_surfedges(&mut m, &bsp.surfedges)?;
    m.lightdata = bsp.lighting.clone();
    load_planes(&mut m, &bsp.planes)?;
    load_texinfo(&mut m, &bsp.texinfo, find_image)?;
    load_faces(&mut m, &bsp.faces, gpu, fullbright)?;
    load_marksurfaces(&mut m, &bsp.leaffaces)?;
    load_visibility(&mut m, bsp.visibility.as_ref())?;
    load_leafs(&mut m, &bsp.leafs)?;
    load_nodes(&mut m, &bsp.nodes)?;
    load_submodels(&mut m, &bsp.models)?;

    vid_printf(
        PRINT_DEVELOPER,
        &format!(
            "{}: {} surfaces, {} nodes, {} leafs, {} lightmap pages\n",
            m.name,
            m.surfaces.len(),
            m.nodes.len(),
            m.leafs.len(),
            m.lightmap_pages
        ),
    );

    Ok(m)
}

fn load_vertexes(m: &mut WorldModel, lump: &[DVertex]) -> Result<(), RefreshError> {
    if lump.len() > MAX_MAP_VERTS {
        return Err(RefreshError::bad_lump(&m.name, "too many vertexes"));
    }
    m.vertexes = lump.iter().map(|v| v.point).collect();
    Ok(())
}

fn load_edges(m: &mut WorldModel, lump: &[DEdge]) -> Result<(), RefreshError> {
    if lump.len() > MAX_MAP_EDGES {
        return Err(RefreshError::bad_lump(&m.name, "too many edges"));
    }
    let numvertexes = m.vertexes.len();
    m.edges = Vec::with_capacity(lump.len());
    for e in lump {
        if e.v.iter().any(|&v| v as usize >= numvertexes) {
            return Err(RefreshError::bad_lump(&m.name, "bad vertex number in edge"));
        }
        m.edges.push(MEdge { v: [e.v[0] as u32, e.v[1] as u32] });
    }
    Ok(())
}

fn load_surfedges(m: &mut WorldModel, lump: &[i32]) -> Result<(), RefreshError> {
    if lump.is_empty() || lump.len() >= MAX_MAP_SURFEDGES {
        return Err(RefreshError::bad_lump(
            &m.name,
            format!("bad surfedges count: {}", lump.len()),
        ));
    }
    let numedges = m.edges.len() as i64;
    if lump.iter().any(|&e| (e as i64).abs() >= numedges) {
        return Err(RefreshError::bad_lump(&m.name, "bad edge number in surfedges"));
    }
    m.surfedges = lump.to_vec();
    Ok(())
}

fn load_planes(m: &mut WorldModel, lump: &[DPlane]) -> Result<(), RefreshError> {
    if lump.len() > MAX_MAP_PLANES {
        return Err(RefreshError::bad_lump(&m.name, "too many planes"));
    }
    m.planes = lump
        .iter()
        .map(|p| CPlane {
            normal: p.normal,
            dist: p.dist,
            plane_type: p.plane_type as u8,
            signbits: signbits_for_plane(&p.normal),
        })
        .collect();
    Ok(())
}

fn load_texinfo(
    m: &mut WorldModel,
    lump: &[TexInfo],
    find_image: &mut dyn FnMut(&str) -> Image,
) -> Result<(), RefreshError> {
    if lump.len() > MAX_MAP_TEXINFO {
        return Err(RefreshError::bad_lump(&m.name, "too many texinfo"));
    }
    let count = lump.len();
    let mut image_index: HashMap<String, usize> = HashMap::new();

    m.texinfo = Vec::with_capacity(count);
    for ti in lump {
        let next = if ti.nexttexinfo > 0 {
            if ti.nexttexinfo as usize >= count {
                return Err(RefreshError::bad_lump(&m.name, "bad nexttexinfo"));
            }
            Some(ti.nexttexinfo as usize)
        } else {
            None
        };

        let name = format!("textures/{}.wal", ti.texture);
        let image = match image_index.get(&name) {
            Some(&i) => i,
            None => {
                let i = m.images.len();
                m.images.push(find_image(&name));
                image_index.insert(name, i);
                i
            }
        };

        m.texinfo.push(MTexInfo {
            vecs: ti.vecs,
            flags: SurfFlags::from_bits_truncate(ti.flags),
            numframes: 1,
            next,
            image,
        });
    }

    // count animation frames
    for i in 0..count {
        let mut numframes = 1;
        let mut step = m.texinfo[i].next;
        while let Some(s) = step {
            if s == i || numframes as usize > count {
                break;
            }
            numframes += 1;
            step = m.texinfo[s].next;
        }
        m.texinfo[i].numframes = numframes;
    }
    Ok(())
}

/// Vertex position of the `i`th corner of a surface.
pub fn surface_vertex(m: &WorldModel, surf: &MSurface, i: i32) -> Vec3 {
    let lindex = m.surfedges[(surf.firstedge + i) as usize];
    if lindex > 0 {
        m.vertexes[m.edges[lindex as usize].v[0] as usize]
    } else {
        m.vertexes[m.edges[(-lindex) as usize].v[1] as usize]
    }
}

/// Texture-space bounds of a surface, snapped to 16-texel lightmap cells.
pub fn calc_surface_extents(m: &WorldModel, surf: &mut MSurface) -> Result<(), RefreshError> {
    let mut mins = [999999.0f32; 2];
    let mut maxs = [-99999.0f32; 2];

    let tex = &m.texinfo[surf.texinfo];

    for i in 0..surf.numedges {
        let v = surface_vertex(m, surf, i);
        for j in 0..2 {
            let val = v[0] * tex.vecs[j][0] + v[1] * tex.vecs[j][1] + v[2] * tex.vecs[j][2] + tex.vecs[j][3];
            if val < mins[j] {
                mins[j] = val;
            }
            if val > maxs[j] {
                maxs[j] = val;
            }
        }
    }

    for i in 0..2 {
        let bmins = (mins[i] / 16.0).floor() as i32;
        let bmaxs = (maxs[i] / 16.0).ceil() as i32;
        let texel = |v: i32| i16::try_from(v).map_err(|_| RefreshError::bad_lump(&m.name, "bad surface extents"));
        surf.texturemins[i] = texel(bmins * 16)?;
        surf.extents[i] = texel((bmaxs - bmins) * 16)?;
    }
    Ok(())
}

/// Cache the surface polygon with texture and lightmap coordinates.
pub fn build_polygon_from_surface(m: &WorldModel, surf: &MSurface, block: (i32, i32)) -> GlPoly {
    let texinfo = &m.texinfo[surf.texinfo];
    let image = &m.images[texinfo.image];
    let (block_w, block_h) = block;

    let mut verts = Vec::with_capacity(surf.numedges as usize);
    for i in 0..surf.numedges {
        let vec = surface_vertex(m, surf, i);

        let s = dot_product(&vec, &[texinfo.vecs[0][0], texinfo.vecs[0][1], texinfo.vecs[0][2]])
            + texinfo.vecs[0][3];
        let t = dot_product(&vec, &[texinfo.vecs[1][0], texinfo.vecs[1][1], texinfo.vecs[1][2]])
            + texinfo.vecs[1][3];

        // lightmap texture coordinates
        let mut ls = s - surf.texturemins[0] as f32;
        ls += surf.light_s as f32 * 16.0;
        ls += 8.0;
        ls /= (block_w * 16) as f32;

        let mut lt = t - surf.texturemins[1] as f32;
        lt += surf.light_t as f32 * 16.0;
        lt += 8.0;
        lt /= (block_h * 16) as f32;

        verts.push(PolyVert {
            xyz: vec,
            st: [s / image.width.max(1) as f32, t / image.height.max(1) as f32],
            lm_st: [ls, lt],
        });
    }

    GlPoly { verts }
}

fn load_faces(
    m: &mut WorldModel,
    lump: &[DFace],
    gpu: &mut dyn GpuBackend,
    fullbright: bool,
) -> Result<(), RefreshError> {
    if lump.len() > MAX_MAP_FACES {
        return Err(RefreshError::bad_lump(&m.name, "too many faces"));
    }

    let mut lightmaps = LightmapBuilder::new(gpu, fullbright);
    let block = lightmaps.page_size();

    m.surfaces = Vec::with_capacity(lump.len());
    for face in lump {
        let planenum = face.planenum as usize;
        if planenum >= m.planes.len() {
            return Err(RefreshError::bad_lump(&m.name, "bad planenum"));
        }
        let ti = face.texinfo as i32;
        if ti < 0 || ti as usize >= m.texinfo.len() {
            return Err(RefreshError::bad_lump(&m.name, "bad texinfo number"));
        }
        let numedges = face.numedges as i32;
        if numedges < 3
            || face.firstedge < 0
            || (face.firstedge as usize + numedges as usize) > m.surfedges.len()
        {
            return Err(RefreshError::bad_lump(&m.name, "bad surface edge range"));
        }

        let mut flags = SurfaceFlags::empty();
        if face.side != 0 {
            flags |= SurfaceFlags::PLANEBACK;
        }

        let samples = if face.lightofs == -1 {
            None
        } else if face.lightofs < 0 || face.lightofs as usize >= m.lightdata.len() {
            return Err(RefreshError::bad_lump(&m.name, "bad lightofs"));
        } else {
            Some(face.lightofs as usize)
        };

        let mut surf = MSurface {
            plane: planenum,
            flags,
            firstedge: face.firstedge,
            numedges,
            texturemins: [0; 2],
            extents: [0; 2],
            light_s: 0,
            light_t: 0,
            lightmaptexturenum: 0,
            polys: Vec::new(),
            texinfo: ti as usize,
            styles: face.styles,
            samples,
        };

        calc_surface_extents(m, &mut surf)?;

        // set the drawing flags
        let texflags = m.texinfo[surf.texinfo].flags;
        if texflags.contains(SurfFlags::SKY) {
            surf.flags |= SurfaceFlags::DRAWSKY;
        }
        if texflags.contains(SurfFlags::WARP) {
            surf.flags |= SurfaceFlags::DRAWTURB;
            surf.extents = [16384, 16384];
            surf.texturemins = [-8192, -8192];
            surf.polys = subdivide_surface(m, &surf)?; // cut up polygon for warps
        }

        // create lightmaps and polygons
        if !texflags.intersects(SurfFlags::SKY | SurfFlags::TRANSLUCENT | SurfFlags::WARP) {
            if surf.extents.iter().any(|&e| e > MAX_SURFACE_EXTENT) {
                return Err(RefreshError::bad_lump(&m.name, "bad surface extents"));
            }
            lightmaps.create_surface_lightmap(gpu, &m.lightdata, &mut surf)?;
        }

        if !texflags.contains(SurfFlags::WARP) {
            surf.polys = vec![build_polygon_from_surface(m, &surf, block)];
        }

        m.surfaces.push(surf);
    }

    m.lightmap_texture = lightmaps.texture();
    m.lightmap_pages = lightmaps.finish(gpu, &m.lightdata)?;
    Ok(())
}

fn load_marksurfaces(m: &mut WorldModel, lump: &[u16]) -> Result<(), RefreshError> {
    if lump.len() > MAX_MAP_LEAFFACES {
        return Err(RefreshError::bad_lump(&m.name, "too many leaffaces"));
    }
    let numsurfaces = m.surfaces.len();
    m.marksurfaces = Vec::with_capacity(lump.len());
    for &j in lump {
        if j as usize >= numsurfaces {
            return Err(RefreshError::bad_lump(&m.name, "bad surface number in marksurfaces"));
        }
        m.marksurfaces.push(j as usize);
    }
    Ok(())
}

fn load_visibility(m: &mut WorldModel, lump: Option<&DVis>) -> Result<(), RefreshError> {
    let Some(vis) = lump else {
        m.vis = None;
        return Ok(());
    };
    if vis.numclusters < 0 || vis.bitofs_pvs.len() != vis.numclusters as usize {
        return Err(RefreshError::bad_lump(&m.name, "bad visibility cluster count"));
    }
    let mut bitofs = Vec::with_capacity(vis.bitofs_pvs.len());
    for &ofs in &vis.bitofs_pvs {
        if ofs < 0 || ofs as usize >= vis.data.len() {
            return Err(RefreshError::bad_lump(&m.name, "bad visibility offset"));
        }
        bitofs.push(ofs as usize);
    }
    m.vis = Some(VisData {
        numclusters: vis.numclusters,
        bitofs,
        data: vis.data.clone(),
    });
    Ok(())
}

fn load_leafs(m: &mut WorldModel, lump: &[DLeaf]) -> Result<(), RefreshError> {
    if lump.is_empty() || lump.len() > MAX_MAP_LEAFS {
        return Err(RefreshError::bad_lump(&m.name, "bad leaf count"));
    }
    let numclusters = m.vis.as_ref().map_or(0, |v| v.numclusters);

    m.leafs = Vec::with_capacity(lump.len());
    for l in lump {
        let first = l.firstleafface as usize;
        let num = l.numleaffaces as usize;
        if first + num > m.marksurfaces.len() {
            return Err(RefreshError::bad_lump(&m.name, "bad leaf marksurface range"));
        }
        let cluster = l.cluster as i32;
        if m.vis.is_some() && cluster >= numclusters {
            return Err(RefreshError::bad_lump(&m.name, "bad leaf cluster"));
        }

        let mut minmaxs = [0.0f32; 6];
        for j in 0..3 {
            minmaxs[j] = l.mins[j] as f32;
            minmaxs[3 + j] = l.maxs[j] as f32;
        }

        m.leafs.push(MLeaf {
            contents: l.contents,
            minmaxs,
            parent: None,
            cluster,
            area: l.area as i32,
            firstmarksurface: first,
            nummarksurfaces: num,
        });
    }
    Ok(())
}

fn child_ref(m: &WorldModel, numnodes: usize, child: i32) -> Result<MNodeRef, RefreshError> {
    if child >= 0 {
        if child as usize >= numnodes {
            return Err(RefreshError::bad_lump(&m.name, "bad node child"));
        }
        Ok(MNodeRef::Node(child as usize))
    } else {
        let leaf = (-1 - child) as usize;
        if leaf >= m.leafs.len() {
            return Err(RefreshError::bad_lump(&m.name, "bad leaf child"));
        }
        Ok(MNodeRef::Leaf(leaf))
    }
}

fn load_nodes(m: &mut WorldModel, lump: &[DNode]) -> Result<(), RefreshError> {
    if lump.len() > MAX_MAP_NODES {
        return Err(RefreshError::bad_lump(&m.name, "too many nodes"));
    }
    let numnodes = lump.len();

    m.nodes = Vec::with_capacity(numnodes);
    for n in lump {
        if n.planenum < 0 || n.planenum as usize >= m.planes.len() {
            return Err(RefreshError::bad_lump(&m.name, "bad node plane"));
        }
        let first = n.firstface as usize;
        let num = n.numfaces as usize;
        if first + num > m.surfaces.len() {
            return Err(RefreshError::bad_lump(&m.name, "bad node surface range"));
        }

        let mut minmaxs = [0.0f32; 6];
        for j in 0..3 {
            minmaxs[j] = n.mins[j] as f32;
            minmaxs[3 + j] = n.maxs[j] as f32;
        }

        let children = [child_ref(m, numnodes, n.children[0])?, child_ref(m, numnodes, n.children[1])?];

        m.nodes.push(MNode {
            minmaxs,
            parent: None,
            plane: n.planenum as usize,
            children,
            firstsurface: first,
            numsurfaces: num,
        });
    }

    if numnodes > 0 {
        set_parent(m, 0)?; // sets nodes and leafs
    }
    Ok(())
}

/// Link every node and leaf below `root` to its parent.
///
/// Rejects trees that reuse a node or go deeper than `MAX_NODE_DEPTH`.
pub fn set_parent(m: &mut WorldModel, root: usize) -> Result<(), RefreshError> {
    let mut seen = vec![false; m.nodes.len()];
    let mut stack = vec![(root, None::<usize>, 0usize)];

    while let Some((node, parent, depth)) = stack.pop() {
        if depth > MAX_NODE_DEPTH {
            return Err(RefreshError::bad_lump(&m.name, "node tree too deep"));
        }
        if seen[node] {
            return Err(RefreshError::bad_lump(&m.name, "node referenced twice"));
        }
        seen[node] = true;
        m.nodes[node].parent = parent;

        for child in m.nodes[node].children {
            match child {
                MNodeRef::Node(n) => stack.push((n, Some(node), depth + 1)),
                MNodeRef::Leaf(l) => m.leafs[l].parent = Some(node),
            }
        }
    }
    Ok(())
}

fn load_submodels(m: &mut WorldModel, lump: &[DModel]) -> Result<(), RefreshError> {
    if lump.is_empty() || lump.len() > MAX_MAP_MODELS {
        return Err(RefreshError::bad_lump(&m.name, "bad submodel count"));
    }
    let numnodes = m.nodes.len();
    m.submodels = Vec::with_capacity(lump.len());
    for d in lump {
        let headnode = child_ref(m, numnodes, d.headnode)?;
        if d.firstface < 0 || d.numfaces < 0 || (d.firstface + d.numfaces) as usize > m.surfaces.len() {
            return Err(RefreshError::bad_lump(&m.name, "bad submodel face range"));
        }

        // spread the mins / maxs by a pixel
        let mut mins = [0.0f32; 3];
        let mut maxs = [0.0f32; 3];
        for j in 0..3 {
            mins[j] = d.mins[j] - 1.0;
            maxs[j] = d.maxs[j] + 1.0;
        }

        m.submodels.push(MModel {
            mins,
            maxs,
            origin: d.origin,
            radius: radius_from_bounds(&mins, &maxs),
            headnode,
            firstface: d.firstface as usize,
            numfaces: d.numfaces as usize,
        });
    }
    Ok(())
}

// ===============================================================
//  QUERIES
// ===============================================================

/// Leaf containing `p`.
pub fn point_in_leaf(p: &Vec3, m: &WorldModel) -> Option<usize> {
    let mut node = m.root();
    loop {
        match node {
            MNodeRef::Leaf(l) => return Some(l),
            MNodeRef::Node(n) => {
                let mnode = m.nodes.get(n)?;
                let plane = &m.planes[mnode.plane];
                let d = dot_product(p, &plane.normal) - plane.dist;
                node = if d > 0.0 { mnode.children[0] } else { mnode.children[1] };
            }
        }
    }
}

/// Run-length decode one PVS row. `None` means no vis info: all visible.
pub fn decompress_vis(input: Option<&[u8]>, numclusters: i32) -> Vec<u8> {
    let row = ((numclusters.max(0) + 7) >> 3) as usize;

    let input = match input {
        Some(i) => i,
        None => return vec![0xff; row], // no vis info, so make all visible
    };

    let mut out = Vec::with_capacity(row);
    let mut i = 0;
    while out.len() < row && i < input.len() {
        if input[i] != 0 {
            out.push(input[i]);
            i += 1;
            continue;
        }

        // run of zeros
        let c = input.get(i + 1).copied().unwrap_or(0) as usize;
        i += 2;
        for _ in 0..c {
            if out.len() == row {
                break;
            }
            out.push(0);
        }
    }
    out.resize(row, 0);
    out
}

/// Decompressed PVS row of `cluster`; all ones for cluster -1 or no vis.
pub fn cluster_pvs(cluster: i32, m: &WorldModel) -> Vec<u8> {
    match &m.vis {
        Some(vis) if cluster >= 0 && cluster < vis.numclusters => {
            let ofs = vis.bitofs[cluster as usize];
            decompress_vis(Some(&vis.data[ofs..]), vis.numclusters)
        }
        Some(vis) => vec![0xff; ((vis.numclusters + 7) >> 3) as usize],
        None => vec![0xff; (m.leafs.len() + 7) >> 3],
    }
}

// ===============================================================
//  ALIAS MODELS
// ===============================================================

/// Validate a parsed MD2 file and attach its skins.
pub fn load_alias_model(name: &str, md2: &Md2Data, skins: Vec<TextureId>) -> Result<AliasModel, RefreshError> {
    let h = &md2.header;

    if h.version != ALIAS_VERSION {
        return Err(RefreshError::bad_alias(
            name,
            format!("has wrong version number ({} should be {})", h.version, ALIAS_VERSION),
        ));
    }
    if h.num_skins < 0 || h.num_skins as usize > MAX_MD2SKINS {
        return Err(RefreshError::bad_alias(name, "has too many skins"));
    }
    if h.num_xyz <= 0 {
        return Err(RefreshError::bad_alias(name, "has no vertices"));
    }
    if h.num_xyz as usize > MAX_VERTS {
        return Err(RefreshError::bad_alias(name, "has too many vertices"));
    }
    if h.num_st <= 0 {
        return Err(RefreshError::bad_alias(name, "has no st vertices"));
    }
    if h.num_tris <= 0 {
        return Err(RefreshError::bad_alias(name, "has no triangles"));
    }
    if h.num_tris as usize > MAX_TRIANGLES {
        return Err(RefreshError::bad_alias(name, "has too many triangles"));
    }
    if h.num_frames <= 0 {
        return Err(RefreshError::bad_alias(name, "has no frames"));
    }
    if h.num_frames as usize > MAX_FRAMES {
        return Err(RefreshError::bad_alias(name, "has too many frames"));
    }

    let num_xyz = h.num_xyz as usize;
    if md2.st.len() != h.num_st as usize || md2.tris.len() != h.num_tris as usize {
        return Err(RefreshError::bad_alias(name, "st/triangle counts disagree with header"));
    }
    if md2.frames.len() != h.num_frames as usize {
        return Err(RefreshError::bad_alias(name, "frame count disagrees with header"));
    }
    if let Some(f) = md2.frames.iter().find(|f| f.verts.len() != num_xyz) {
        return Err(RefreshError::bad_alias(
            name,
            format!("frame {} has {} vertices, expected {}", f.name, f.verts.len(), num_xyz),
        ));
    }
    for tri in &md2.tris {
        let bad_xyz = tri.index_xyz.iter().any(|&i| i < 0 || i as usize >= num_xyz);
        let bad_st = tri.index_st.iter().any(|&i| i < 0 || i >= h.num_st as i16);
        if bad_xyz || bad_st {
            return Err(RefreshError::bad_alias(name, "triangle index out of range"));
        }
    }
    validate_glcmds(name, &md2.glcmds, num_xyz)?;

    // bounds over every frame
    let (mut mins, mut maxs) = clear_bounds();
    for f in &md2.frames {
        let lo = f.translate;
        let hi = vector_ma(&f.translate, 255.0, &f.scale);
        for c in [lo, hi] {
            add_point_to_bounds(&c, &mut mins, &mut maxs);
        }
    }

    Ok(AliasModel {
        name: name.to_string(),
        header: *h,
        st: md2.st.clone(),
        tris: md2.tris.clone(),
        frames: md2.frames.clone(),
        glcmds: md2.glcmds.clone(),
        skins,
        mins,
        maxs,
    })
}

/// Walk the command stream once: every run must fit, every index must name
/// a real vertex, and the stream must be terminated.
fn validate_glcmds(name: &str, cmds: &[i32], num_xyz: usize) -> Result<(), RefreshError> {
    let mut i = 0;
    loop {
        let Some(&count) = cmds.get(i) else {
            return Err(RefreshError::bad_alias(name, "unterminated gl command list"));
        };
        i += 1;
        if count == 0 {
            return Ok(());
        }
        let n = count.unsigned_abs() as usize;
        if n < 3 {
            return Err(RefreshError::bad_alias(name, format!("gl command with {} vertices", n)));
        }
        if i + n * 3 > cmds.len() {
            return Err(RefreshError::bad_alias(name, "gl command runs past the end"));
        }
        for v in 0..n {
            let index = cmds[i + v * 3 + 2];
            if index < 0 || index as usize >= num_xyz {
                return Err(RefreshError::bad_alias(name, "gl command vertex out of range"));
            }
        }
        i += n * 3;
    }
}

// ===============================================================
//  Test fixtures
// ===============================================================


// =============================================================
//  Tests
// =============================================================

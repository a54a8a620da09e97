// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// r_lightmap.rs — Lightmap atlas packing and texel building
//
// Lightmaps are packed at level load into fixed-size pages. Every page has
// MAXLIGHTMAPS layers (one per light style slot); a surface owns the same
// rectangle in all four. All pages live in one array texture, layer
// `page * 4 + style slot`.

use rayon::prelude::*;

use myq2_common::q_shared::{MAX_LIGHTSTYLES, PRINT_DEVELOPER};
use myq2_common::qfiles::MAXLIGHTMAPS;

use crate::r_backend::{GpuBackend, LightStyleUniforms, TextureId};
use crate::r_local::{vid_printf, LightStyle, RefreshError};
use crate::r_model_types::{MSurface, SurfaceFlags};

pub const BLOCK_WIDTH: i32 = 128;
pub const BLOCK_HEIGHT: i32 = 128;

pub const LIGHTMAP_BYTES: usize = 4;

pub const MAX_LIGHTMAPS: i32 = 128;

/// Largest lightmap a surface may have, in texels (extents are capped at 512).
const MAX_BLOCKLIGHTS: usize = 34 * 34;

// ============================================================
// Skyline allocator
// ============================================================

/// Shelf packer over one page: `allocated[column]` is the height in use.
#[derive(Debug, Clone)]
pub struct LightmapPacker {
    width: i32,
    height: i32,
    allocated: Vec<i32>,
}

impl LightmapPacker {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            allocated: vec![0; width as usize],
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn allocated(&self) -> &[i32] {
        &self.allocated
    }

    /// Start a fresh page.
    pub fn reset(&mut self) {
        self.allocated.iter_mut().for_each(|a| *a = 0);
    }

    /// Place a w×h rectangle at the lowest spot found scanning every valid
    /// starting column. Returns `None` when the page is full.
    pub fn alloc_block(&mut self, w: i32, h: i32) -> Option<(i32, i32)> {
        if w <= 0 || h <= 0 || w > self.width {
            return None;
        }

        let w = w as usize;
        let mut best = self.height;
        let mut x = 0usize;

        for i in 0..=(self.width as usize - w) {
            let mut best2 = 0;
            let mut j = 0;
            while j < w {
                if self.allocated[i + j] >= best {
                    break;
                }
                if self.allocated[i + j] > best2 {
                    best2 = self.allocated[i + j];
                }
                j += 1;
            }
            if j == w {
                // this is a valid spot
                x = i;
                best = best2;
            }
        }

        if best + h > self.height {
            return None;
        }

        for a in &mut self.allocated[x..x + w] {
            *a = best + h;
        }

        Some((x as i32, best))
    }
}

// ============================================================
// Texel building
// ============================================================

/// Four RGBA layers for one surface, each `smax * tmax` texels.
pub type LightmapLayers = [Vec<u8>; MAXLIGHTMAPS];

/// Expand a surface's stored samples into 4 RGBA layers.
///
/// Layer `i < numstyles` gets the raw RGB of style `i` with alpha set to the
/// brightest channel; the remaining layers are zero. Without samples layer 0
/// is full bright.
pub fn build_light_map(
    styles: &[u8; MAXLIGHTMAPS],
    samples: Option<&[u8]>,
    smax: i32,
    tmax: i32,
) -> Result<LightmapLayers, RefreshError> {
    let size = (smax * tmax) as usize;
    if smax <= 0 || tmax <= 0 || size > MAX_BLOCKLIGHTS {
        return Err(RefreshError::BadSurfaceLightmap(format!(
            "bad blocklights size {}x{}",
            smax, tmax
        )));
    }

    let mut layers: LightmapLayers = Default::default();
    for layer in layers.iter_mut() {
        *layer = vec![0u8; size * LIGHTMAP_BYTES];
    }

    let samples = match samples {
        Some(s) => s,
        None => {
            layers[0].iter_mut().for_each(|b| *b = 255);
            return Ok(layers);
        }
    };

    let nummaps = styles.iter().take_while(|&&s| s != 255).count();
    if samples.len() < nummaps * size * 3 {
        return Err(RefreshError::BadSurfaceLightmap(format!(
            "{} light samples for {} styles of {} texels",
            samples.len(),
            nummaps,
            size
        )));
    }

    for (map, layer) in layers.iter_mut().enumerate().take(nummaps) {
        let src = &samples[map * size * 3..(map + 1) * size * 3];
        for (dest, rgb) in layer.chunks_exact_mut(4).zip(src.chunks_exact(3)) {
            let (r, g, b) = (rgb[0], rgb[1], rgb[2]);
            dest[0] = r;
            dest[1] = g;
            dest[2] = b;
            dest[3] = r.max(g).max(b);
        }
    }

    Ok(layers)
}

/// Style scales for the lightmap shader: rgb * modulate.
pub fn light_style_uniforms(styles: &[LightStyle], modulate: f32) -> LightStyleUniforms {
    let mut u = LightStyleUniforms { styles: [[0.0; 4]; 256] };
    for (i, slot) in u.styles.iter_mut().enumerate().take(MAX_LIGHTSTYLES) {
        let style = styles.get(i).copied().unwrap_or_default();
        *slot = [
            style.rgb[0] * modulate,
            style.rgb[1] * modulate,
            style.rgb[2] * modulate,
            style.white,
        ];
    }
    u
}

// ============================================================
// Page management
// ============================================================

struct PendingSurface {
    x: i32,
    y: i32,
    smax: i32,
    tmax: i32,
    styles: [u8; MAXLIGHTMAPS],
    samples: Option<usize>,
}

/// Lightmap pages under construction during level load.
pub struct LightmapBuilder {
    packer: LightmapPacker,
    buffers: LightmapLayers,
    pending: Vec<PendingSurface>,
    current_page: i32,
    max_pages: i32,
    texture: TextureId,
    fullbright: bool,
    flushes: u32,
}

impl LightmapBuilder {
    /// Standard 128×128 pages in a fresh array texture.
    pub fn new(gpu: &mut dyn GpuBackend, fullbright: bool) -> Self {
        Self::with_page_size(gpu, BLOCK_WIDTH, BLOCK_HEIGHT, MAX_LIGHTMAPS, fullbright)
    }

    pub fn with_page_size(
        gpu: &mut dyn GpuBackend,
        width: i32,
        height: i32,
        max_pages: i32,
        fullbright: bool,
    ) -> Self {
        let texture = gpu.allocate_texture(
            width as u32,
            height as u32,
            (max_pages as usize * MAXLIGHTMAPS) as u32,
        );
        let page_bytes = (width * height) as usize * LIGHTMAP_BYTES;
        let mut buffers: LightmapLayers = Default::default();
        for b in buffers.iter_mut() {
            *b = vec![0u8; page_bytes];
        }
        Self {
            packer: LightmapPacker::new(width, height),
            buffers,
            pending: Vec::new(),
            current_page: 0,
            max_pages,
            texture,
            fullbright,
            flushes: 0,
        }
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn page_size(&self) -> (i32, i32) {
        (self.packer.width(), self.packer.height())
    }

    pub fn current_page(&self) -> i32 {
        self.current_page
    }

    /// Number of pages uploaded so far.
    pub fn flushes(&self) -> u32 {
        self.flushes
    }

    /// Reserve the surface's rectangle and queue its texels for the page.
    pub fn create_surface_lightmap(
        &mut self,
        gpu: &mut dyn GpuBackend,
        lightdata: &[u8],
        surf: &mut MSurface,
    ) -> Result<(), RefreshError> {
        if surf.flags.intersects(SurfaceFlags::DRAWSKY | SurfaceFlags::DRAWTURB) {
            return Ok(());
        }

        let (smax, tmax) = surf.lightmap_size();

        let (x, y) = match self.packer.alloc_block(smax, tmax) {
            Some(spot) => spot,
            None => {
                self.upload_block(gpu, lightdata)?;
                self.packer
                    .alloc_block(smax, tmax)
                    .ok_or(RefreshError::LightmapOverflow { w: smax, h: tmax })?
            }
        };

        surf.light_s = x;
        surf.light_t = y;
        surf.lightmaptexturenum = self.current_page;

        self.pending.push(PendingSurface {
            x,
            y,
            smax,
            tmax,
            styles: surf.styles,
            samples: if self.fullbright { None } else { surf.samples },
        });
        Ok(())
    }

    /// Build the queued surfaces, upload the page and start the next one.
    pub fn upload_block(&mut self, gpu: &mut dyn GpuBackend, lightdata: &[u8]) -> Result<(), RefreshError> {
        if self.current_page >= self.max_pages {
            return Err(RefreshError::TooManyLightmaps);
        }

        let blocks = self
            .pending
            .par_iter()
            .map(|p| {
                let samples = p.samples.map(|ofs| lightdata.get(ofs..).unwrap_or(&[]));
                build_light_map(&p.styles, samples, p.smax, p.tmax)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let width = self.packer.width() as usize;
        for (p, layers) in self.pending.iter().zip(blocks.iter()) {
            let row_bytes = p.smax as usize * LIGHTMAP_BYTES;
            for (dest, src) in self.buffers.iter_mut().zip(layers.iter()) {
                for t in 0..p.tmax as usize {
                    let ofs = ((p.y as usize + t) * width + p.x as usize) * LIGHTMAP_BYTES;
                    dest[ofs..ofs + row_bytes].copy_from_slice(&src[t * row_bytes..(t + 1) * row_bytes]);
                }
            }
        }

        let (w, h) = self.page_size();
        for (i, buf) in self.buffers.iter().enumerate() {
            let layer = (self.current_page as usize * MAXLIGHTMAPS + i) as u32;
            gpu.upload_texture_2d(self.texture, layer, w as u32, h as u32, buf);
        }

        vid_printf(
            PRINT_DEVELOPER,
            &format!(
                "lightmap page {} uploaded ({} surfaces)\n",
                self.current_page,
                self.pending.len()
            ),
        );

        self.pending.clear();
        self.buffers.iter_mut().for_each(|b| b.iter_mut().for_each(|x| *x = 0));
        self.packer.reset();
        self.current_page += 1;
        self.flushes += 1;
        Ok(())
    }

    /// Flush the last page. Returns the number of pages used.
    pub fn finish(mut self, gpu: &mut dyn GpuBackend, lightdata: &[u8]) -> Result<i32, RefreshError> {
        if !self.pending.is_empty() {
            self.upload_block(gpu, lightdata)?;
        }
        Ok(self.current_page)
    }
}

// =============================================================
//  Tests
// =============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_backend::recording::{GpuCall, RecordingBackend};

    fn lit_surface(extents: [i16; 2], styles: [u8; 4], samples: Option<usize>) -> MSurface {
        MSurface {
            plane: 0,
            flags: SurfaceFlags::empty(),
            firstedge: 0,
            numedges: 0,
            texturemins: [0, 0],
            extents,
            light_s: 0,
            light_t: 0,
            lightmaptexturenum: 0,
            polys: Vec::new(),
            texinfo: 0,
            styles,
            samples,
        }
    }

    // ---- packer ----

    #[test]
    fn test_alloc_block_first_fits_at_origin() {
        let mut p = LightmapPacker::new(16, 16);
        assert_eq!(p.alloc_block(4, 3), Some((0, 0)));
        assert_eq!(&p.allocated()[..5], &[3, 3, 3, 3, 0]);
    }

    #[test]
    fn test_alloc_block_uses_last_column() {
        let mut p = LightmapPacker::new(8, 8);
        assert_eq!(p.alloc_block(4, 8), Some((0, 0)));
        assert_eq!(p.alloc_block(4, 8), Some((4, 0)));
        assert_eq!(p.alloc_block(1, 1), None);
    }

    #[test]
    fn test_alloc_block_full_width() {
        let mut p = LightmapPacker::new(8, 8);
        assert_eq!(p.alloc_block(8, 2), Some((0, 0)));
        assert_eq!(p.alloc_block(8, 2), Some((0, 2)));
        assert!(p.allocated().iter().all(|&a| a == 4));
    }

    #[test]
    fn test_alloc_block_rejects_oversize() {
        let mut p = LightmapPacker::new(8, 8);
        assert_eq!(p.alloc_block(9, 1), None);
        assert_eq!(p.alloc_block(1, 9), None);
        assert_eq!(p.alloc_block(0, 1), None);
    }

    #[test]
    fn test_alloc_block_prefers_lowest_spot() {
        let mut p = LightmapPacker::new(8, 8);
        p.alloc_block(2, 5).unwrap(); // columns 0-1 at 5
        p.alloc_block(2, 1).unwrap(); // lowest is columns 2-3
        assert_eq!(p.allocated(), &[5, 5, 1, 1, 0, 0, 0, 0]);
        let (x, y) = p.alloc_block(3, 2).unwrap();
        assert_eq!((x, y), (4, 0));
    }

    #[test]
    fn test_alloc_block_never_overlaps_and_tracks_skyline() {
        let mut p = LightmapPacker::new(32, 32);
        let mut placed: Vec<(i32, i32, i32, i32)> = Vec::new();
        let mut seed: u32 = 12345;
        let mut next = || {
            seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
            ((seed >> 16) % 6 + 1) as i32
        };

        for _ in 0..200 {
            let (w, h) = (next(), next());
            let before = p.allocated().to_vec();
            let Some((x, y)) = p.alloc_block(w, h) else {
                assert_eq!(p.allocated(), &before[..]);
                continue;
            };
            for c in x..x + w {
                assert!(y >= before[c as usize]);
                assert_eq!(p.allocated()[c as usize], y + h);
            }
            for &(px, py, pw, ph) in &placed {
                let disjoint = x + w <= px || px + pw <= x || y + h <= py || py + ph <= y;
                assert!(disjoint, "({x},{y},{w},{h}) overlaps ({px},{py},{pw},{ph})");
            }
            placed.push((x, y, w, h));
        }
        assert!(!placed.is_empty());
    }

    // ---- texel building ----

    #[test]
    fn test_build_light_map_no_samples_is_fullbright_layer0() {
        let layers = build_light_map(&[0, 255, 255, 255], None, 2, 2).unwrap();
        assert!(layers[0].iter().all(|&b| b == 255));
        for layer in &layers[1..] {
            assert_eq!(layer.len(), 16);
            assert!(layer.iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_build_light_map_copies_styles_and_zero_fills() {
        // 2 styles, 1x2 texels
        let samples = [10, 20, 30, 40, 5, 6, /* style 2 */ 7, 8, 9, 200, 100, 50];
        let layers = build_light_map(&[0, 3, 255, 255], Some(&samples[..]), 1, 2).unwrap();
        assert_eq!(layers[0], vec![10, 20, 30, 30, 40, 5, 6, 40]);
        assert_eq!(layers[1], vec![7, 8, 9, 9, 200, 100, 50, 200]);
        assert_eq!(layers[2], vec![0; 8]);
        assert_eq!(layers[3], vec![0; 8]);
    }

    #[test]
    fn test_build_light_map_short_samples_is_error() {
        let samples = [1, 2, 3];
        assert!(matches!(
            build_light_map(&[0, 255, 255, 255], Some(&samples[..]), 2, 2),
            Err(RefreshError::BadSurfaceLightmap(_))
        ));
    }

    #[test]
    fn test_build_light_map_oversize_is_error() {
        assert!(build_light_map(&[255; 4], None, 40, 40).is_err());
    }

    #[test]
    fn test_light_style_uniforms_scale() {
        let mut styles = vec![LightStyle::default(); 4];
        styles[2].rgb = [0.5, 1.0, 2.0];
        let u = light_style_uniforms(&styles, 2.0);
        assert_eq!(u.styles[0], [2.0, 2.0, 2.0, 3.0]);
        assert_eq!(u.styles[2][..3], [1.0, 2.0, 4.0]);
        // styles not supplied fall back to normal light
        assert_eq!(u.styles[200][..3], [2.0, 2.0, 2.0]);
    }

    // ---- pages ----

    #[test]
    fn test_three_4x8_rects_on_8x8_pages_flush_once() {
        let mut gpu = RecordingBackend::new();
        let mut lm = LightmapBuilder::with_page_size(&mut gpu, 8, 8, 4, false);
        // extents 48 >> 4 = 3, + 1 = 4 texels wide; 112 >> 4 = 7, + 1 = 8 high
        let mut surfs: Vec<MSurface> = (0..3)
            .map(|_| lit_surface([48, 112], [255; 4], None))
            .collect();

        lm.create_surface_lightmap(&mut gpu, &[], &mut surfs[0]).unwrap();
        lm.create_surface_lightmap(&mut gpu, &[], &mut surfs[1]).unwrap();
        assert_eq!(lm.flushes(), 0);
        assert_eq!((surfs[0].light_s, surfs[1].light_s), (0, 4));
        assert_eq!(surfs[1].lightmaptexturenum, 0);

        lm.create_surface_lightmap(&mut gpu, &[], &mut surfs[2]).unwrap();
        assert_eq!(lm.flushes(), 1);
        assert_eq!(surfs[2].lightmaptexturenum, 1);
        assert_eq!((surfs[2].light_s, surfs[2].light_t), (0, 0));

        let uploads = gpu
            .calls
            .iter()
            .filter(|c| matches!(c, GpuCall::UploadTexture { .. }))
            .count();
        assert_eq!(uploads, MAXLIGHTMAPS);
    }

    #[test]
    fn test_rect_too_big_for_fresh_page_is_fatal() {
        let mut gpu = RecordingBackend::new();
        let mut lm = LightmapBuilder::with_page_size(&mut gpu, 8, 8, 4, false);
        let mut s = lit_surface([160, 0], [255; 4], None); // 11 wide
        let err = lm.create_surface_lightmap(&mut gpu, &[], &mut s).unwrap_err();
        assert!(matches!(err, RefreshError::LightmapOverflow { w: 11, h: 1 }));
    }

    #[test]
    fn test_too_many_pages_is_fatal() {
        let mut gpu = RecordingBackend::new();
        let mut lm = LightmapBuilder::with_page_size(&mut gpu, 8, 8, 2, false);
        let mut result = Ok(());
        for _ in 0..3 {
            let mut s = lit_surface([112, 112], [255; 4], None); // a whole page each
            result = lm.create_surface_lightmap(&mut gpu, &[], &mut s);
            if result.is_err() {
                break;
            }
        }
        assert!(result.is_ok());
        assert!(matches!(lm.finish(&mut gpu, &[]), Err(RefreshError::TooManyLightmaps)));
    }

    #[test]
    fn test_sky_and_warp_surfaces_get_no_lightmap() {
        let mut gpu = RecordingBackend::new();
        let mut lm = LightmapBuilder::with_page_size(&mut gpu, 8, 8, 4, false);
        let mut s = lit_surface([16, 16], [0, 255, 255, 255], Some(0));
        s.flags = SurfaceFlags::DRAWTURB;
        lm.create_surface_lightmap(&mut gpu, &[], &mut s).unwrap();
        assert_eq!(lm.finish(&mut gpu, &[]).unwrap(), 0);
    }

    #[test]
    fn test_page_upload_places_texels_at_slot() {
        let mut gpu = RecordingBackend::new();
        let mut lm = LightmapBuilder::with_page_size(&mut gpu, 4, 4, 4, false);
        // first surface takes columns 0-1, second gets columns 2-3
        let mut a = lit_surface([16, 0], [0, 255, 255, 255], Some(0)); // 2x1
        let mut b = lit_surface([16, 0], [0, 255, 255, 255], Some(6));
        let lightdata = [1, 1, 1, 2, 2, 2, 9, 8, 7, 6, 5, 4];
        lm.create_surface_lightmap(&mut gpu, &lightdata, &mut a).unwrap();
        lm.create_surface_lightmap(&mut gpu, &lightdata, &mut b).unwrap();
        assert_eq!((b.light_s, b.light_t), (2, 0));
        assert_eq!(lm.finish(&mut gpu, &lightdata).unwrap(), 1);

        let (_, layer, texels) = &gpu.texture_layers[0];
        assert_eq!(*layer, 0);
        assert_eq!(&texels[0..16], &[1, 1, 1, 1, 2, 2, 2, 2, 9, 8, 7, 9, 6, 5, 4, 6]);
        // layers 1-3 stay empty
        assert!(gpu.texture_layers[1].2.iter().all(|&x| x == 0));
    }

    #[test]
    fn test_fullbright_ignores_samples() {
        let mut gpu = RecordingBackend::new();
        let mut lm = LightmapBuilder::with_page_size(&mut gpu, 4, 4, 4, true);
        let mut a = lit_surface([0, 0], [0, 255, 255, 255], Some(0));
        lm.create_surface_lightmap(&mut gpu, &[0, 0, 0], &mut a).unwrap();
        lm.finish(&mut gpu, &[0, 0, 0]).unwrap();
        assert_eq!(&gpu.texture_layers[0].2[0..4], &[255, 255, 255, 255]);
    }
}

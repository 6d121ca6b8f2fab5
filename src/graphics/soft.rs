use std::collections::HashMap;

use crate::{
    foundation::core::{BlendMode, Filter, PixelRect, Rgba8Premul},
    foundation::error::{RestoreError, RestoreResult},
    foundation::math::{next_power_of_two, unit_to_u8},
    graphics::device::{DrawCall, FramebufferId, GraphicsDevice, RenderTarget, TextureId},
    graphics::vertices::FLOATS_PER_VERTEX,
    transform::color::ColorMatrix,
};

/// Counters recorded by [`SoftwareDevice`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct DeviceStats {
    pub textures_created: u64,
    pub textures_deleted: u64,
    pub framebuffers_created: u64,
    pub framebuffers_deleted: u64,
    pub sub_image_uploads: u64,
    pub clears: u64,
    pub buffer_uploads: u64,
    pub largest_index_upload: usize,
    pub draw_calls: u64,
    pub readbacks: u64,
    pub flushes: u64,
}

struct SoftSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl SoftSurface {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; (width as usize) * (height as usize) * 4],
        }
    }

    fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        let idx = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        let px = &self.pixels[idx..idx + 4];
        [
            f32::from(px[0]) / 255.0,
            f32::from(px[1]) / 255.0,
            f32::from(px[2]) / 255.0,
            f32::from(px[3]) / 255.0,
        ]
    }
}

/// CPU reference implementation of [`GraphicsDevice`].
///
/// Textures are power-of-two sized premultiplied RGBA8 buffers. Triangles are rasterized at
/// pixel centers with a top-left fill rule, so the two triangles of a quad never touch the same
/// pixel twice. Context loss can be simulated with [`SoftwareDevice::lose_context`].
pub struct SoftwareDevice {
    textures: HashMap<TextureId, SoftSurface>,
    framebuffers: HashMap<FramebufferId, SoftSurface>,
    next_handle: u64,
    vertices: Vec<f32>,
    indices: Vec<u16>,
    lost: bool,
    max_texture_size: u32,
    allocation_budget: Option<usize>,
    stats: DeviceStats,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            next_handle: 1,
            vertices: Vec::new(),
            indices: Vec::new(),
            lost: false,
            max_texture_size: 4096,
            allocation_budget: None,
            stats: DeviceStats::default(),
        }
    }

    pub fn with_max_texture_size(mut self, max: u32) -> Self {
        self.max_texture_size = max;
        self
    }

    /// Allow only `n` more texture/framebuffer allocations; `None` lifts the limit.
    pub fn set_allocation_budget(&mut self, n: Option<usize>) {
        self.allocation_budget = n;
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    /// Simulate the driver discarding every resource.
    pub fn lose_context(&mut self) {
        tracing::debug!(
            textures = self.textures.len(),
            framebuffers = self.framebuffers.len(),
            "simulated context loss"
        );
        self.textures.clear();
        self.framebuffers.clear();
        self.vertices.clear();
        self.indices.clear();
        self.lost = true;
    }

    fn ensure_live(&self) -> RestoreResult<()> {
        if self.lost {
            return Err(RestoreError::gpu("graphics context is lost"));
        }
        Ok(())
    }

    fn take_allocation(&mut self) -> RestoreResult<u64> {
        self.ensure_live()?;
        if let Some(budget) = self.allocation_budget.as_mut() {
            if *budget == 0 {
                return Err(RestoreError::gpu("out of texture memory"));
            }
            *budget -= 1;
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        Ok(handle)
    }

    fn surface(&self, target: RenderTarget) -> RestoreResult<&SoftSurface> {
        let found = match target {
            RenderTarget::Texture(t) => self.textures.get(&t),
            RenderTarget::Screen(f) => self.framebuffers.get(&f),
        };
        found.ok_or_else(|| RestoreError::gpu(format!("unknown render target {target:?}")))
    }

    fn take_surface(&mut self, target: RenderTarget) -> RestoreResult<SoftSurface> {
        let found = match target {
            RenderTarget::Texture(t) => self.textures.remove(&t),
            RenderTarget::Screen(f) => self.framebuffers.remove(&f),
        };
        found.ok_or_else(|| RestoreError::gpu(format!("unknown render target {target:?}")))
    }

    fn put_surface(&mut self, target: RenderTarget, surface: SoftSurface) {
        match target {
            RenderTarget::Texture(t) => self.textures.insert(t, surface),
            RenderTarget::Screen(f) => self.framebuffers.insert(f, surface),
        };
    }
}

impl GraphicsDevice for SoftwareDevice {
    fn create_texture(&mut self, width: u32, height: u32) -> RestoreResult<TextureId> {
        let w = next_power_of_two(width);
        let h = next_power_of_two(height);
        if w > self.max_texture_size || h > self.max_texture_size {
            return Err(RestoreError::gpu(format!(
                "texture {w}x{h} exceeds maximum size {}",
                self.max_texture_size
            )));
        }
        let id = TextureId(self.take_allocation()?);
        self.textures.insert(id, SoftSurface::new(w, h));
        self.stats.textures_created += 1;
        Ok(id)
    }

    fn screen_framebuffer(&mut self, width: u32, height: u32) -> RestoreResult<FramebufferId> {
        let id = FramebufferId(self.take_allocation()?);
        // The default framebuffer keeps its exact size.
        self.framebuffers.insert(id, SoftSurface::new(width, height));
        self.stats.framebuffers_created += 1;
        Ok(id)
    }

    fn upload_sub_image(
        &mut self,
        texture: TextureId,
        region: PixelRect,
        pixels: &[u8],
    ) -> RestoreResult<()> {
        self.ensure_live()?;
        let tex = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| RestoreError::gpu(format!("unknown texture {texture:?}")))?;
        if region.x + region.width > tex.width || region.y + region.height > tex.height {
            return Err(RestoreError::out_of_range(format!(
                "upload region {region:?} outside {}x{} texture",
                tex.width, tex.height
            )));
        }
        if pixels.len() != region.byte_len() {
            return Err(RestoreError::out_of_range(format!(
                "upload expects {} bytes, got {}",
                region.byte_len(),
                pixels.len()
            )));
        }
        let row = region.width as usize * 4;
        for j in 0..region.height as usize {
            let dst = ((region.y as usize + j) * tex.width as usize + region.x as usize) * 4;
            tex.pixels[dst..dst + row].copy_from_slice(&pixels[j * row..(j + 1) * row]);
        }
        self.stats.sub_image_uploads += 1;
        Ok(())
    }

    fn read_pixels(
        &mut self,
        target: RenderTarget,
        width: u32,
        height: u32,
    ) -> RestoreResult<Vec<u8>> {
        self.ensure_live()?;
        let surface = self.surface(target)?;
        if width > surface.width || height > surface.height {
            return Err(RestoreError::out_of_range(format!(
                "readback {width}x{height} larger than {}x{} surface",
                surface.width, surface.height
            )));
        }
        let row = width as usize * 4;
        let mut out = Vec::with_capacity(row * height as usize);
        for y in 0..height as usize {
            let start = y * surface.width as usize * 4;
            out.extend_from_slice(&surface.pixels[start..start + row]);
        }
        self.stats.readbacks += 1;
        Ok(out)
    }

    fn clear_target(&mut self, target: RenderTarget, color: Rgba8Premul) -> RestoreResult<()> {
        self.ensure_live()?;
        let surface = match target {
            RenderTarget::Texture(t) => self.textures.get_mut(&t),
            RenderTarget::Screen(f) => self.framebuffers.get_mut(&f),
        }
        .ok_or_else(|| RestoreError::gpu(format!("unknown render target {target:?}")))?;
        let px = color.to_array();
        for chunk in surface.pixels.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
        self.stats.clears += 1;
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_some() {
            self.stats.textures_deleted += 1;
        }
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.framebuffers.remove(&framebuffer).is_some() {
            self.stats.framebuffers_deleted += 1;
        }
    }

    fn upload_buffers(&mut self, vertices: &[f32], indices: &[u16]) -> RestoreResult<()> {
        self.ensure_live()?;
        self.vertices.clear();
        self.vertices.extend_from_slice(vertices);
        self.indices.clear();
        self.indices.extend_from_slice(indices);
        self.stats.buffer_uploads += 1;
        self.stats.largest_index_upload = self.stats.largest_index_upload.max(indices.len());
        Ok(())
    }

    fn draw_indexed(&mut self, call: &DrawCall<'_>) -> RestoreResult<()> {
        self.ensure_live()?;
        if call.target == RenderTarget::Texture(call.source) {
            return Err(RestoreError::gpu("a texture cannot be drawn onto itself"));
        }
        let start = call.index_offset_bytes / std::mem::size_of::<u16>();
        let end = start + call.index_count;
        if end > self.indices.len() || !call.index_count.is_multiple_of(3) {
            return Err(RestoreError::gpu(format!(
                "index range {start}..{end} outside uploaded buffer of {}",
                self.indices.len()
            )));
        }

        let mut dst = self.take_surface(call.target)?;
        let result = match self.textures.get(&call.source) {
            Some(src) => {
                let raster = Rasterizer {
                    src,
                    color: call.color,
                    blend: call.blend,
                    filter: call.filter,
                };
                self.indices[start..end].chunks_exact(3).try_for_each(|tri| {
                    let v = |i: u16| -> RestoreResult<&[f32]> {
                        let at = usize::from(i) * FLOATS_PER_VERTEX;
                        self.vertices.get(at..at + FLOATS_PER_VERTEX).ok_or_else(|| {
                            RestoreError::gpu(format!("vertex {i} outside uploaded buffer"))
                        })
                    };
                    raster.triangle(&mut dst, [v(tri[0])?, v(tri[1])?, v(tri[2])?]);
                    Ok(())
                })
            }
            None => Err(RestoreError::gpu(format!(
                "unknown source texture {:?}",
                call.source
            ))),
        };
        self.put_surface(call.target, dst);
        self.stats.draw_calls += 1;
        result
    }

    fn is_context_lost(&self) -> bool {
        self.lost
    }

    fn reset_context(&mut self) -> RestoreResult<()> {
        self.lost = false;
        Ok(())
    }

    fn flush(&mut self) {
        self.stats.flushes += 1;
    }

    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }
}

struct Rasterizer<'a> {
    src: &'a SoftSurface,
    color: &'a ColorMatrix,
    blend: BlendMode,
    filter: Filter,
}

fn edge(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> f64 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

fn is_top_left(a: (f64, f64), b: (f64, f64)) -> bool {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    (dy == 0.0 && dx > 0.0) || dy < 0.0
}

fn covers(w: f64, a: (f64, f64), b: (f64, f64)) -> bool {
    w > 0.0 || (w == 0.0 && is_top_left(a, b))
}

impl Rasterizer<'_> {
    fn triangle(&self, dst: &mut SoftSurface, mut v: [&[f32]; 3]) {
        let pos = |v: &[f32]| (f64::from(v[0]), f64::from(v[1]));
        let mut area = edge(pos(v[0]), pos(v[1]), pos(v[2]));
        if area == 0.0 {
            return;
        }
        if area < 0.0 {
            v.swap(1, 2);
            area = -area;
        }
        let (p0, p1, p2) = (pos(v[0]), pos(v[1]), pos(v[2]));

        let min_x = p0.0.min(p1.0).min(p2.0).floor().max(0.0) as u32;
        let min_y = p0.1.min(p1.1).min(p2.1).floor().max(0.0) as u32;
        let max_x = (p0.0.max(p1.0).max(p2.0).ceil().max(0.0) as u32).min(dst.width);
        let max_y = (p0.1.max(p1.1).max(p2.1).ceil().max(0.0) as u32).min(dst.height);

        // Every vertex of a quad carries the same source rectangle.
        let rect = self.source_rect(v[0]);

        for y in min_y..max_y {
            for x in min_x..max_x {
                let p = (f64::from(x) + 0.5, f64::from(y) + 0.5);
                let w0 = edge(p1, p2, p);
                let w1 = edge(p2, p0, p);
                let w2 = edge(p0, p1, p);
                if !(covers(w0, p1, p2) && covers(w1, p2, p0) && covers(w2, p0, p1)) {
                    continue;
                }
                let (l0, l1, l2) = (w0 / area, w1 / area, w2 / area);
                let lerp = |i: usize| {
                    (l0 * f64::from(v[0][i]) + l1 * f64::from(v[1][i]) + l2 * f64::from(v[2][i]))
                        as f32
                };
                let sample = self.sample(lerp(2), lerp(3), rect);
                let tint = [lerp(6), lerp(7), lerp(8), lerp(9)];
                let src = self.shade(sample, tint);
                let idx = ((y as usize) * (dst.width as usize) + (x as usize)) * 4;
                self.blend_into(&mut dst.pixels[idx..idx + 4], src);
            }
        }
    }

    /// Texel bounds `[x0, x1) x [y0, y1)` recovered from a vertex's UV pair.
    fn source_rect(&self, v: &[f32]) -> (i64, i64, i64, i64) {
        let tw = f64::from(self.src.width);
        let th = f64::from(self.src.height);
        let (u_a, u_b) = (f64::from(v[2]), f64::from(v[4]));
        let (v_a, v_b) = (f64::from(v[3]), f64::from(v[5]));
        let x0 = (u_a.min(u_b) * tw).round() as i64;
        let x1 = (u_a.max(u_b) * tw).round() as i64;
        let y0 = (v_a.min(v_b) * th).round() as i64;
        let y1 = (v_a.max(v_b) * th).round() as i64;
        (
            x0.clamp(0, i64::from(self.src.width) - 1),
            x1.clamp(x0 + 1, i64::from(self.src.width)),
            y0.clamp(0, i64::from(self.src.height) - 1),
            y1.clamp(y0 + 1, i64::from(self.src.height)),
        )
    }

    fn sample(&self, u: f32, v: f32, rect: (i64, i64, i64, i64)) -> [f32; 4] {
        let (x0, x1, y0, y1) = rect;
        let fx = f64::from(u) * f64::from(self.src.width);
        let fy = f64::from(v) * f64::from(self.src.height);
        match self.filter {
            Filter::Nearest => {
                let tx = (fx.floor() as i64).clamp(x0, x1 - 1);
                let ty = (fy.floor() as i64).clamp(y0, y1 - 1);
                self.src.texel(tx, ty)
            }
            Filter::Linear => {
                let sx = fx - 0.5;
                let sy = fy - 0.5;
                let bx = sx.floor();
                let by = sy.floor();
                let ax = (sx - bx) as f32;
                let ay = (sy - by) as f32;
                let cx = |x: i64| x.clamp(x0, x1 - 1);
                let cy = |y: i64| y.clamp(y0, y1 - 1);
                let (bx, by) = (bx as i64, by as i64);
                let c00 = self.src.texel(cx(bx), cy(by));
                let c10 = self.src.texel(cx(bx + 1), cy(by));
                let c01 = self.src.texel(cx(bx), cy(by + 1));
                let c11 = self.src.texel(cx(bx + 1), cy(by + 1));
                let mut out = [0.0f32; 4];
                for i in 0..4 {
                    let top = c00[i] * (1.0 - ax) + c10[i] * ax;
                    let bottom = c01[i] * (1.0 - ax) + c11[i] * ax;
                    out[i] = top * (1.0 - ay) + bottom * ay;
                }
                out
            }
        }
    }

    fn shade(&self, texel: [f32; 4], tint: [f32; 4]) -> [f32; 4] {
        let c = self.color.apply_premultiplied(texel);
        let ta = tint[3];
        [
            c[0] * tint[0] * ta,
            c[1] * tint[1] * ta,
            c[2] * tint[2] * ta,
            c[3] * ta,
        ]
    }

    fn blend_into(&self, dst: &mut [u8], src: [f32; 4]) {
        let d = [
            f32::from(dst[0]) / 255.0,
            f32::from(dst[1]) / 255.0,
            f32::from(dst[2]) / 255.0,
            f32::from(dst[3]) / 255.0,
        ];
        let (fs, fd) = self.blend.factors();
        let s_factor = fs.eval(src[3], d[3]);
        let d_factor = fd.eval(src[3], d[3]);
        for i in 0..4 {
            dst[i] = unit_to_u8(src[i] * s_factor + d[i] * d_factor);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graphics/soft.rs"]
mod tests;

//! Quad vertex generation.
//!
//! Vertex layout, ten `f32`s per vertex:
//!
//! | floats | meaning |
//! |--------|---------|
//! | 0..2   | position in target pixels |
//! | 2..4   | texture coordinate |
//! | 4..6   | texture coordinate of the diagonally opposite corner |
//! | 6..10  | tint, straight RGBA in `[0, 1]` |
//!
//! The opposite-corner pair lets the sampler recover the source rectangle and clamp to it.

use crate::{
    foundation::core::Rgba8, foundation::math::next_power_of_two,
    transform::geometry::GeometryTransform,
};

pub const FLOATS_PER_VERTEX: usize = 10;
pub const VERTICES_PER_QUAD: usize = 4;
pub const QUAD_FLOATS: usize = FLOATS_PER_VERTEX * VERTICES_PER_QUAD;
/// Two triangles over corners ordered top-left, top-right, bottom-left, bottom-right.
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 1, 2, 3];

/// Source rectangle in source-image pixels, `(x0, y0)` inclusive, `(x1, y1)` exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SourceRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl SourceRect {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn whole(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    /// True when nothing inside `width`x`height` would be sampled.
    pub fn is_degenerate(self, width: u32, height: u32) -> bool {
        self.x0 >= self.x1
            || self.y0 >= self.y1
            || self.x1 <= 0
            || self.y1 <= 0
            || self.x0 >= width as i32
            || self.y0 >= height as i32
    }
}

/// Fixed-capacity scratch buffer that hands out one quad at a time.
///
/// A returned quad borrows the ring, so it is gone by the time the next one is requested.
/// Callers copy each quad into the command queue and the draw history before asking for the
/// next, so overwriting old quads on wrap behaves exactly like allocating fresh ones.
#[derive(Debug)]
pub struct VertexRing {
    backend: Vec<f32>,
    head: usize,
    capacity_quads: usize,
    wraps: u64,
}

impl VertexRing {
    pub fn new(capacity_quads: usize) -> Self {
        Self {
            backend: Vec::new(),
            head: 0,
            capacity_quads: capacity_quads.max(1),
            wraps: 0,
        }
    }

    /// Number of times the ring ran out and started over.
    pub fn wraps(&self) -> u64 {
        self.wraps
    }

    fn next_quad(&mut self) -> &mut [f32] {
        if self.backend.is_empty() {
            self.backend = vec![0.0; QUAD_FLOATS * self.capacity_quads];
        }
        if self.head + QUAD_FLOATS > self.backend.len() {
            self.head = 0;
            self.wraps += 1;
        }
        let start = self.head;
        self.head += QUAD_FLOATS;
        &mut self.backend[start..start + QUAD_FLOATS]
    }

    /// Build the quad that samples `rect` out of a `src_width`x`src_height` image.
    ///
    /// Returns `None` for a degenerate rectangle; the caller must skip the draw.
    pub fn quad<G: GeometryTransform + ?Sized>(
        &mut self,
        src_width: u32,
        src_height: u32,
        rect: SourceRect,
        tint: Option<Rgba8>,
        geo: &G,
    ) -> Option<&[f32]> {
        if rect.is_degenerate(src_width, src_height) {
            return None;
        }

        // Extents of extreme rects do not fit in i32.
        let x1 = f64::from(rect.x1) - f64::from(rect.x0);
        let y1 = f64::from(rect.y1) - f64::from(rect.y0);
        let [r, g, b, a] = tint.unwrap_or(Rgba8::WHITE).to_f32();

        // Textures are allocated at power-of-two sizes.
        let wf = next_power_of_two(src_width) as f32;
        let hf = next_power_of_two(src_height) as f32;
        let u0 = rect.x0 as f32 / wf;
        let v0 = rect.y0 as f32 / hf;
        let u1 = rect.x1 as f32 / wf;
        let v1 = rect.y1 as f32 / hf;

        let corners = [
            (0.0, 0.0, [u0, v0, u1, v1]),
            (x1, 0.0, [u1, v0, u0, v1]),
            (0.0, y1, [u0, v1, u1, v0]),
            (x1, y1, [u1, v1, u0, v0]),
        ];

        let vs = self.next_quad();
        for (i, (lx, ly, uv)) in corners.into_iter().enumerate() {
            let (x, y) = geo.apply32(lx, ly);
            let v = &mut vs[i * FLOATS_PER_VERTEX..(i + 1) * FLOATS_PER_VERTEX];
            v[0] = x;
            v[1] = y;
            v[2..6].copy_from_slice(&uv);
            v[6] = r;
            v[7] = g;
            v[8] = b;
            v[9] = a;
        }
        Some(vs)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/graphics/vertices.rs"]
mod tests;

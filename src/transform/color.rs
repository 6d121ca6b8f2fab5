//! 4x5 color matrix applied to straight (non-premultiplied) RGBA.

const IDENTITY: [f32; 20] = [
    1.0, 0.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 0.0, 1.0, 0.0, //
];

/// Row-major 4x5 matrix: four channel rows, each with four coefficients and a translation.
///
/// Equality is value equality, which is what draw merging compares.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorMatrix {
    elements: [f32; 20],
}

impl Default for ColorMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl ColorMatrix {
    pub const fn identity() -> Self {
        Self { elements: IDENTITY }
    }

    pub fn from_elements(elements: [f32; 20]) -> Self {
        Self { elements }
    }

    pub fn elements(&self) -> &[f32; 20] {
        &self.elements
    }

    pub fn is_identity(&self) -> bool {
        self.elements == IDENTITY
    }

    pub fn scale(r: f32, g: f32, b: f32, a: f32) -> Self {
        let mut m = Self::identity();
        for (row, s) in [r, g, b, a].into_iter().enumerate() {
            m.elements[row * 5 + row] = s;
        }
        m
    }

    pub fn translate(r: f32, g: f32, b: f32, a: f32) -> Self {
        let mut m = Self::identity();
        for (row, t) in [r, g, b, a].into_iter().enumerate() {
            m.elements[row * 5 + 4] = t;
        }
        m
    }

    /// `self` applied first, then `next`.
    pub fn then(&self, next: &ColorMatrix) -> ColorMatrix {
        let a = &next.elements;
        let b = &self.elements;
        let mut out = [0.0f32; 20];
        for row in 0..4 {
            for col in 0..5 {
                let mut v = 0.0;
                for k in 0..4 {
                    v += a[row * 5 + k] * b[k * 5 + col];
                }
                if col == 4 {
                    v += a[row * 5 + 4];
                }
                out[row * 5 + col] = v;
            }
        }
        ColorMatrix { elements: out }
    }

    /// Apply to a straight color; results are clamped to `[0, 1]`.
    pub fn apply_straight(&self, c: [f32; 4]) -> [f32; 4] {
        let m = &self.elements;
        let mut out = [0.0f32; 4];
        for (row, o) in out.iter_mut().enumerate() {
            let r = &m[row * 5..row * 5 + 5];
            *o = (r[0] * c[0] + r[1] * c[1] + r[2] * c[2] + r[3] * c[3] + r[4]).clamp(0.0, 1.0);
        }
        out
    }

    /// Unpremultiply, apply, premultiply.
    pub fn apply_premultiplied(&self, c: [f32; 4]) -> [f32; 4] {
        if self.is_identity() {
            return c;
        }
        let straight = if c[3] > 0.0 {
            [c[0] / c[3], c[1] / c[3], c[2] / c[3], c[3]]
        } else {
            [0.0, 0.0, 0.0, 0.0]
        };
        let [r, g, b, a] = self.apply_straight(straight);
        [r * a, g * a, b * a, a]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transform/color.rs"]
mod tests;

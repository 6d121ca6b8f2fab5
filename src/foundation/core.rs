use std::fmt;

pub use kurbo::{Affine, Point, Vec2};

/// Identity of a logical image.
///
/// Ids are allocated monotonically and never reused, so a lookup miss reliably means the image
/// was disposed.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ImageId(pub u64);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Straight-alpha RGBA8 color, used for tints and solid fills.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Channels scaled to `[0, 1]`.
    pub fn to_f32(self) -> [f32; 4] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
            f32::from(self.a) / 255.0,
        ]
    }

    pub fn premultiply(self) -> Rgba8Premul {
        Rgba8Premul::from_straight_rgba(self.r, self.g, self.b, self.a)
    }
}

/// Premultiplied RGBA8 (r,g,b already multiplied by a).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rgba8Premul {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8Premul {
    pub fn transparent() -> Self {
        Self {
            r: 0,
            g: 0,
            b: 0,
            a: 0,
        }
    }

    pub fn from_straight_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        fn premul(c: u8, a: u8) -> u8 {
            crate::foundation::math::mul_div255_u8(u16::from(c), u16::from(a))
        }

        Self {
            r: premul(r, a),
            g: premul(g, a),
            b: premul(b, a),
            a,
        }
    }

    pub fn from_slice(px: &[u8]) -> Self {
        Self {
            r: px[0],
            g: px[1],
            b: px[2],
            a: px[3],
        }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Integer pixel rectangle, origin top-left.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn byte_len(self) -> usize {
        (self.width as usize) * (self.height as usize) * 4
    }
}

/// Fixed set of Porter-Duff composite modes over premultiplied colors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BlendMode {
    /// Regular alpha blending.
    #[default]
    SourceOver,
    Clear,
    Copy,
    Destination,
    DestinationOver,
    SourceIn,
    DestinationIn,
    SourceOut,
    DestinationOut,
    SourceAtop,
    DestinationAtop,
    Xor,
    /// Additive blending (`1, 1`).
    Lighter,
}

/// Coefficient applied to one side of a blend equation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    DstAlpha,
    OneMinusSrcAlpha,
    OneMinusDstAlpha,
}

impl BlendFactor {
    pub fn eval(self, src_alpha: f32, dst_alpha: f32) -> f32 {
        match self {
            Self::Zero => 0.0,
            Self::One => 1.0,
            Self::SrcAlpha => src_alpha,
            Self::DstAlpha => dst_alpha,
            Self::OneMinusSrcAlpha => 1.0 - src_alpha,
            Self::OneMinusDstAlpha => 1.0 - dst_alpha,
        }
    }
}

impl BlendMode {
    /// `(source factor, destination factor)` for premultiplied colors.
    pub fn factors(self) -> (BlendFactor, BlendFactor) {
        use BlendFactor::*;
        match self {
            Self::SourceOver => (One, OneMinusSrcAlpha),
            Self::Clear => (Zero, Zero),
            Self::Copy => (One, Zero),
            Self::Destination => (Zero, One),
            Self::DestinationOver => (OneMinusDstAlpha, One),
            Self::SourceIn => (DstAlpha, Zero),
            Self::DestinationIn => (Zero, SrcAlpha),
            Self::SourceOut => (OneMinusDstAlpha, Zero),
            Self::DestinationOut => (Zero, OneMinusSrcAlpha),
            Self::SourceAtop => (DstAlpha, OneMinusSrcAlpha),
            Self::DestinationAtop => (OneMinusDstAlpha, SrcAlpha),
            Self::Xor => (OneMinusDstAlpha, OneMinusSrcAlpha),
            Self::Lighter => (One, One),
        }
    }
}

/// Texture sampling filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;

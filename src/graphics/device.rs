use crate::{
    foundation::core::{BlendMode, Filter, PixelRect, Rgba8Premul},
    foundation::error::RestoreResult,
    transform::color::ColorMatrix,
};

/// Opaque texture handle issued by a [`GraphicsDevice`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Opaque framebuffer handle issued by a [`GraphicsDevice`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u64);

/// Where a draw lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// An offscreen texture (power-of-two sized).
    Texture(TextureId),
    /// The platform's default framebuffer.
    Screen(FramebufferId),
}

impl RenderTarget {
    pub fn texture(self) -> Option<TextureId> {
        match self {
            Self::Texture(t) => Some(t),
            Self::Screen(_) => None,
        }
    }
}

/// One indexed draw issued against the most recently uploaded vertex/index buffers.
#[derive(Clone, Copy, Debug)]
pub struct DrawCall<'a> {
    pub target: RenderTarget,
    pub source: TextureId,
    /// Byte offset into the uploaded index buffer (`u16` indices).
    pub index_offset_bytes: usize,
    pub index_count: usize,
    pub color: &'a ColorMatrix,
    pub blend: BlendMode,
    pub filter: Filter,
}

/// Primitive graphics operations consumed by the engine.
///
/// The engine never talks to hardware directly; everything goes through this seam.
pub trait GraphicsDevice {
    /// Allocate a texture of at least `width`x`height`. Implementations round each dimension up
    /// to a power of two.
    fn create_texture(&mut self, width: u32, height: u32) -> RestoreResult<TextureId>;

    /// Bind the platform framebuffer at the given logical size.
    fn screen_framebuffer(&mut self, width: u32, height: u32) -> RestoreResult<FramebufferId>;

    /// Replace `region` of `texture` with tightly packed premultiplied RGBA8 `pixels`.
    fn upload_sub_image(
        &mut self,
        texture: TextureId,
        region: PixelRect,
        pixels: &[u8],
    ) -> RestoreResult<()>;

    /// Read back the top-left `width`x`height` region of `target`. Blocks until the driver
    /// returns data.
    fn read_pixels(
        &mut self,
        target: RenderTarget,
        width: u32,
        height: u32,
    ) -> RestoreResult<Vec<u8>>;

    /// Set every pixel of `target` to `color`. Works on the screen as well as on textures.
    fn clear_target(&mut self, target: RenderTarget, color: Rgba8Premul) -> RestoreResult<()>;

    fn delete_texture(&mut self, texture: TextureId);

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Single sub-data transfer of one chunk of vertex and index data.
    fn upload_buffers(&mut self, vertices: &[f32], indices: &[u16]) -> RestoreResult<()>;

    fn draw_indexed(&mut self, call: &DrawCall<'_>) -> RestoreResult<()>;

    /// Whether the underlying context (and with it every resource) was lost.
    fn is_context_lost(&self) -> bool;

    /// Acquire a fresh context after a loss. Old handles stay invalid.
    fn reset_context(&mut self) -> RestoreResult<()> {
        Ok(())
    }

    /// Force the driver to flush pending work.
    fn flush(&mut self);

    fn max_texture_size(&self) -> u32;
}

impl<D: GraphicsDevice + ?Sized> GraphicsDevice for Box<D> {
    fn create_texture(&mut self, width: u32, height: u32) -> RestoreResult<TextureId> {
        (**self).create_texture(width, height)
    }

    fn screen_framebuffer(&mut self, width: u32, height: u32) -> RestoreResult<FramebufferId> {
        (**self).screen_framebuffer(width, height)
    }

    fn upload_sub_image(
        &mut self,
        texture: TextureId,
        region: PixelRect,
        pixels: &[u8],
    ) -> RestoreResult<()> {
        (**self).upload_sub_image(texture, region, pixels)
    }

    fn read_pixels(
        &mut self,
        target: RenderTarget,
        width: u32,
        height: u32,
    ) -> RestoreResult<Vec<u8>> {
        (**self).read_pixels(target, width, height)
    }

    fn clear_target(&mut self, target: RenderTarget, color: Rgba8Premul) -> RestoreResult<()> {
        (**self).clear_target(target, color)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        (**self).delete_texture(texture)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        (**self).delete_framebuffer(framebuffer)
    }

    fn upload_buffers(&mut self, vertices: &[f32], indices: &[u16]) -> RestoreResult<()> {
        (**self).upload_buffers(vertices, indices)
    }

    fn draw_indexed(&mut self, call: &DrawCall<'_>) -> RestoreResult<()> {
        (**self).draw_indexed(call)
    }

    fn is_context_lost(&self) -> bool {
        (**self).is_context_lost()
    }

    fn reset_context(&mut self) -> RestoreResult<()> {
        (**self).reset_context()
    }

    fn flush(&mut self) {
        (**self).flush()
    }

    fn max_texture_size(&self) -> u32 {
        (**self).max_texture_size()
    }
}

use std::collections::{BTreeSet, HashMap};

use crate::{
    foundation::config::{DEFAULT_MAX_HISTORY, DEFAULT_MAX_HISTORY_QUADS},
    foundation::core::{ImageId, PixelRect, Rgba8Premul},
    foundation::error::{RestoreError, RestoreResult},
    graphics::command::{Command, CommandQueue, DrawMaterial},
    graphics::device::{GraphicsDevice, RenderTarget, TextureId},
    graphics::vertices::QUAD_FLOATS,
};

/// How an image survives frame ticks and context loss.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ImageKind {
    /// Restored from its pixel cache and draw history.
    #[default]
    Regular,
    /// Cleared at every frame start; recreated empty after a context loss.
    Volatile,
    /// Bound to the platform framebuffer; recreated from the platform after a context loss.
    Screen,
}

/// One recorded draw that contributed to an image's content.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DrawHistoryItem {
    /// Looked up in the registry at replay time; a miss means the source was disposed.
    pub(crate) source: ImageId,
    pub(crate) vertices: Vec<f32>,
    pub(crate) material: DrawMaterial,
}

impl DrawHistoryItem {
    fn can_merge(&self, source: ImageId, material: &DrawMaterial) -> bool {
        self.source == source && self.material == *material
    }
}

/// Bounds on what one image's history may hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct HistoryLimits {
    pub(crate) entries: usize,
    pub(crate) quads: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            entries: DEFAULT_MAX_HISTORY,
            quads: DEFAULT_MAX_HISTORY_QUADS,
        }
    }
}

/// Read-only view of an image's bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ImageState {
    pub kind: ImageKind,
    pub width: u32,
    pub height: u32,
    pub stale: bool,
    pub history_len: usize,
    /// Quads across all history entries.
    pub history_quads: usize,
    pub cached: bool,
}

/// A logical image whose GPU contents can be rebuilt after a context loss.
///
/// At any time one of three things explains the current content: the pixel cache (history
/// empty), the cache or zeros plus the history replayed on top, or nothing but the GPU copy
/// (`stale`).
#[derive(Debug)]
pub struct RestorableImage {
    id: ImageId,
    width: u32,
    height: u32,
    kind: ImageKind,
    target: RenderTarget,
    base_pixels: Option<Vec<u8>>,
    history: Vec<DrawHistoryItem>,
    stale: bool,
}

impl RestorableImage {
    /// Allocate the GPU side and queue its zero initialization.
    pub(crate) fn allocate<D: GraphicsDevice + ?Sized>(
        id: ImageId,
        width: u32,
        height: u32,
        kind: ImageKind,
        device: &mut D,
        queue: &mut CommandQueue,
    ) -> RestoreResult<Self> {
        let target = Self::allocate_target(kind, width, height, device)?;
        queue.enqueue(Command::Create {
            target,
            width,
            height,
        });
        let base_pixels = match kind {
            ImageKind::Regular => Some(vec![0; PixelRect::full(width, height).byte_len()]),
            ImageKind::Volatile | ImageKind::Screen => None,
        };
        Ok(Self {
            id,
            width,
            height,
            kind,
            target,
            base_pixels,
            history: Vec::new(),
            stale: false,
        })
    }

    fn allocate_target<D: GraphicsDevice + ?Sized>(
        kind: ImageKind,
        width: u32,
        height: u32,
        device: &mut D,
    ) -> RestoreResult<RenderTarget> {
        Ok(match kind {
            ImageKind::Screen => RenderTarget::Screen(device.screen_framebuffer(width, height)?),
            ImageKind::Regular | ImageKind::Volatile => {
                RenderTarget::Texture(device.create_texture(width, height)?)
            }
        })
    }

    pub fn id(&self) -> ImageId {
        self.id
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn target(&self) -> RenderTarget {
        self.target
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.target.texture()
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_quads(&self) -> usize {
        self.history
            .iter()
            .map(|item| item.vertices.len() / QUAD_FLOATS)
            .sum()
    }

    pub fn state(&self) -> ImageState {
        ImageState {
            kind: self.kind,
            width: self.width,
            height: self.height,
            stale: self.stale,
            history_len: self.history.len(),
            history_quads: self.history_quads(),
            cached: self.base_pixels.is_some(),
        }
    }

    pub(crate) fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < i64::from(self.width) && y < i64::from(self.height)
    }

    /// Forget every way of rebuilding this image other than the GPU copy.
    pub(crate) fn make_stale(&mut self, reason: &'static str) {
        if !self.stale {
            tracing::debug!(image = %self.id, reason, "image went stale");
        }
        self.base_pixels = None;
        self.history.clear();
        self.stale = true;
    }

    pub(crate) fn depends_on(&self, source: ImageId) -> bool {
        self.history.iter().any(|item| item.source == source)
    }

    pub(crate) fn dependencies(&self) -> BTreeSet<ImageId> {
        self.history.iter().map(|item| item.source).collect()
    }

    /// Whether restoring this image requires other images to be restored first.
    pub(crate) fn has_dependency(&self) -> bool {
        !self.stale && !self.history.is_empty()
    }

    /// Record a draw from `source`, merging into the last entry when the material matches.
    ///
    /// Going past either limit makes the image stale instead.
    pub(crate) fn append_history(
        &mut self,
        source: ImageId,
        vertices: &[f32],
        material: &DrawMaterial,
        limits: HistoryLimits,
    ) {
        if self.stale || self.kind != ImageKind::Regular {
            return;
        }
        let quads = self.history_quads() + vertices.len() / QUAD_FLOATS;
        if quads > limits.quads {
            tracing::debug!(image = %self.id, max_quads = limits.quads, "draw history too large");
            self.make_stale("history quad overflow");
            return;
        }
        if let Some(last) = self.history.last_mut()
            && last.can_merge(source, material)
        {
            last.vertices.extend_from_slice(vertices);
            return;
        }
        if self.history.len() + 1 > limits.entries {
            tracing::debug!(image = %self.id, max_history = limits.entries, "draw history truncated");
            self.make_stale("history overflow");
            return;
        }
        self.history.push(DrawHistoryItem {
            source,
            vertices: vertices.to_vec(),
            material: *material,
        });
    }

    /// Copy `pixels` into the cache for `region`. The image is fully described by its cache
    /// afterwards, unless a partial region lands on content only the GPU knows.
    pub(crate) fn record_replace(&mut self, region: PixelRect, pixels: &[u8]) {
        let whole = PixelRect::full(self.width, self.height);
        if region != whole && (self.stale || !self.history.is_empty()) {
            self.make_stale("partial replace over unresolved content");
            return;
        }
        let stride = self.width as usize * 4;
        let full = whole.byte_len();
        let base = self.base_pixels.get_or_insert_with(|| vec![0; full]);
        let row = region.width as usize * 4;
        for j in 0..region.height as usize {
            let dst = (region.y as usize + j) * stride + region.x as usize * 4;
            base[dst..dst + row].copy_from_slice(&pixels[j * row..(j + 1) * row]);
        }
        self.history.clear();
        self.stale = false;
    }

    /// Answer from the cache when it alone describes the image.
    pub(crate) fn cached_pixel(&self, x: u32, y: u32) -> Option<Rgba8Premul> {
        if self.stale || !self.history.is_empty() {
            return None;
        }
        let base = self.base_pixels.as_ref()?;
        let idx = ((y as usize) * (self.width as usize) + x as usize) * 4;
        Some(Rgba8Premul::from_slice(&base[idx..idx + 4]))
    }

    pub(crate) fn cached_pixels(&self) -> Option<&[u8]> {
        if self.stale || !self.history.is_empty() {
            return None;
        }
        self.base_pixels.as_deref()
    }

    /// Adopt pixels read back from the GPU as the new ground truth.
    pub(crate) fn adopt_gpu_pixels(&mut self, pixels: Vec<u8>) -> RestoreResult<()> {
        let expected = PixelRect::full(self.width, self.height).byte_len();
        if pixels.len() != expected {
            return Err(RestoreError::gpu(format!(
                "readback of image {} returned {} bytes, expected {expected}",
                self.id,
                pixels.len()
            )));
        }
        self.base_pixels = Some(pixels);
        self.history.clear();
        self.stale = false;
        Ok(())
    }

    /// Regular images that went stale must be read back before the frame ends.
    pub(crate) fn needs_resolve(&self) -> bool {
        self.stale && self.kind == ImageKind::Regular
    }

    /// Drop all CPU-side state and hand back the GPU target for deletion.
    pub(crate) fn release(mut self) -> RenderTarget {
        self.base_pixels = None;
        self.history.clear();
        self.stale = false;
        self.target
    }

    /// Per-frame contract of volatile images: everything is transparent again.
    pub(crate) fn clear_volatile(&mut self, queue: &mut CommandQueue) {
        if self.kind != ImageKind::Volatile {
            return;
        }
        self.base_pixels = None;
        self.history.clear();
        self.stale = false;
        if let Some(texture) = self.texture() {
            let region = PixelRect::full(self.width, self.height);
            queue.enqueue(Command::Replace {
                target: texture,
                region,
                pixels: vec![0; region.byte_len()],
            });
        }
    }

    /// Rebuild the GPU side on a fresh context.
    ///
    /// `restored` maps every already restored image to its new texture; each history source
    /// must be in it.
    pub(crate) fn restore<D: GraphicsDevice + ?Sized>(
        &mut self,
        device: &mut D,
        queue: &mut CommandQueue,
        restored: &HashMap<ImageId, TextureId>,
    ) -> RestoreResult<()> {
        match self.kind {
            ImageKind::Screen | ImageKind::Volatile => {
                self.target = Self::allocate_target(self.kind, self.width, self.height, device)?;
                queue.enqueue(Command::Create {
                    target: self.target,
                    width: self.width,
                    height: self.height,
                });
                self.base_pixels = None;
                self.history.clear();
                self.stale = false;
                return Ok(());
            }
            ImageKind::Regular => {}
        }
        if self.stale {
            return Err(RestoreError::invariant(format!(
                "image {} is stale and cannot be restored",
                self.id
            )));
        }

        let texture = device.create_texture(self.width, self.height)?;
        self.target = RenderTarget::Texture(texture);
        let region = PixelRect::full(self.width, self.height);
        let base = self
            .base_pixels
            .take()
            .unwrap_or_else(|| vec![0; region.byte_len()]);
        queue.enqueue(Command::Replace {
            target: texture,
            region,
            pixels: base.clone(),
        });

        if self.history.is_empty() {
            self.base_pixels = Some(base);
            return Ok(());
        }
        for item in &self.history {
            let Some(&source) = restored.get(&item.source) else {
                return Err(RestoreError::invariant(format!(
                    "image {} replays history from {}, which is not restored",
                    self.id, item.source
                )));
            };
            queue.enqueue_draw(self.target, source, &item.vertices, &item.material)?;
        }
        queue.flush(device)?;
        let pixels = device.read_pixels(self.target, self.width, self.height)?;
        self.adopt_gpu_pixels(pixels)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/restorable/image.rs"]
mod tests;

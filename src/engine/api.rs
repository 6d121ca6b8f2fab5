use crate::{
    engine::stats::EngineStats,
    foundation::config::EngineConfig,
    foundation::core::{Affine, BlendMode, Filter, ImageId, PixelRect, Rgba8, Rgba8Premul},
    foundation::error::{RestoreError, RestoreResult},
    graphics::command::{Command, CommandQueue, DrawMaterial, FlushReport},
    graphics::device::{GraphicsDevice, RenderTarget},
    graphics::vertices::{SourceRect, VertexRing},
    restorable::image::{HistoryLimits, ImageKind, ImageState, RestorableImage},
    restorable::registry::Registry,
    transform::color::ColorMatrix,
};

/// Parameters of one [`Engine::draw`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawOptions {
    /// Part of the source to draw; `None` draws the whole source.
    pub source_rect: Option<SourceRect>,
    /// Maps source-rect-local pixels (origin at the rect's top-left) to destination pixels.
    pub geometry: Affine,
    pub color: ColorMatrix,
    /// `None` is opaque white.
    pub tint: Option<Rgba8>,
    pub blend: BlendMode,
    pub filter: Filter,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            source_rect: None,
            geometry: Affine::IDENTITY,
            color: ColorMatrix::identity(),
            tint: None,
            blend: BlendMode::SourceOver,
            filter: Filter::Nearest,
        }
    }
}

impl DrawOptions {
    /// Whole source, translated to `(x, y)`.
    pub fn at(x: f64, y: f64) -> Self {
        Self {
            geometry: Affine::translate((x, y)),
            ..Self::default()
        }
    }
}

/// Restorable images on top of a batching command queue.
///
/// Every mutation is queued; pixel reads and [`Engine::flush`] drain the queue. The frame loop
/// must call [`Engine::on_frame_start`] and [`Engine::on_frame_end`] around each frame so that
/// volatile images are cleared and every regular image stays restorable.
pub struct Engine<D: GraphicsDevice> {
    device: D,
    config: EngineConfig,
    queue: CommandQueue,
    ring: VertexRing,
    registry: Registry,
}

impl<D: GraphicsDevice> Engine<D> {
    pub fn new(device: D, config: EngineConfig) -> Self {
        let queue = CommandQueue::new(config.index_capacity());
        let ring = VertexRing::new(config.ring_capacity_quads);
        tracing::debug!(
            restoring = config.restoring_enabled,
            index_capacity = queue.capacity(),
            "engine created"
        );
        Self {
            device,
            config,
            queue,
            ring,
            registry: Registry::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Consume the engine, returning its device. Pending commands are dropped.
    pub fn into_device(self) -> D {
        self.device
    }

    /// Create a transparent image.
    ///
    /// # Panics
    ///
    /// When a dimension is zero or larger than the configured maximum or the device's maximum
    /// texture size.
    pub fn create(&mut self, width: u32, height: u32) -> RestoreResult<ImageId> {
        self.create_with_kind(width, height, ImageKind::Regular)
    }

    /// Create an image that is cleared at every frame start and never restored from history.
    pub fn create_volatile(&mut self, width: u32, height: u32) -> RestoreResult<ImageId> {
        self.create_with_kind(width, height, ImageKind::Volatile)
    }

    /// Bind the platform framebuffer as an image.
    pub fn create_screen(&mut self, width: u32, height: u32) -> RestoreResult<ImageId> {
        self.create_with_kind(width, height, ImageKind::Screen)
    }

    /// Create an image holding a copy of `source` (straight alpha).
    pub fn create_from_image(&mut self, source: &image::RgbaImage) -> RestoreResult<ImageId> {
        let (width, height) = source.dimensions();
        let id = self.create(width, height)?;
        let pixels: Vec<u8> = source
            .pixels()
            .flat_map(|p| Rgba8::new(p[0], p[1], p[2], p[3]).premultiply().to_array())
            .collect();
        self.replace_pixels(id, &pixels, PixelRect::full(width, height))?;
        Ok(id)
    }

    fn create_with_kind(
        &mut self,
        width: u32,
        height: u32,
        kind: ImageKind,
    ) -> RestoreResult<ImageId> {
        assert!(
            width > 0 && height > 0,
            "image size must be positive, got {width}x{height}"
        );
        let max = self
            .config
            .max_image_size
            .min(self.device.max_texture_size());
        assert!(
            width <= max && height <= max,
            "image size {width}x{height} exceeds maximum {max}"
        );
        let id = self.registry.allocate_id();
        let image =
            RestorableImage::allocate(id, width, height, kind, &mut self.device, &mut self.queue)?;
        self.registry.add(image);
        tracing::trace!(image = %id, width, height, ?kind, "image created");
        Ok(id)
    }

    pub fn size(&self, id: ImageId) -> RestoreResult<(u32, u32)> {
        self.registry
            .get(id)
            .map(RestorableImage::size)
            .ok_or(RestoreError::Disposed(id))
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.registry.contains(id)
    }

    /// Bookkeeping of a live image, `None` once disposed.
    pub fn image_state(&self, id: ImageId) -> Option<ImageState> {
        self.registry.get(id).map(RestorableImage::state)
    }

    /// Draw `src` onto `dst`.
    ///
    /// Drawing onto a disposed image does nothing; drawing from one fails with
    /// [`RestoreError::Disposed`].
    ///
    /// # Panics
    ///
    /// When `dst == src`, or when `src` is the screen.
    pub fn draw(&mut self, dst: ImageId, src: ImageId, opts: &DrawOptions) -> RestoreResult<()> {
        assert_ne!(dst, src, "an image cannot be drawn onto itself");
        if !self.registry.contains(dst) {
            return Ok(());
        }
        let source = self.registry.get(src).ok_or(RestoreError::Disposed(src))?;
        let Some(src_texture) = source.texture() else {
            panic!("the screen cannot be used as a draw source");
        };
        let (src_w, src_h) = source.size();

        let rect = opts
            .source_rect
            .unwrap_or_else(|| SourceRect::whole(src_w, src_h));
        let Some(vertices) = self
            .ring
            .quad(src_w, src_h, rect, opts.tint, &opts.geometry)
        else {
            return Ok(());
        };
        let material = DrawMaterial {
            color: opts.color,
            tint: opts.tint,
            blend: opts.blend,
            filter: opts.filter,
        };

        self.registry.invalidate_dependents(dst);
        // The scan above may have just made the source stale.
        let src_untracked = self
            .registry
            .get(src)
            .is_none_or(|s| s.is_stale() || s.kind() != ImageKind::Regular);
        let Some(target) = self.registry.get_mut(dst) else {
            return Ok(());
        };
        let tracked =
            self.config.restoring_enabled && !src_untracked && target.kind() == ImageKind::Regular;
        if tracked {
            let limits = HistoryLimits {
                entries: self.config.max_history,
                quads: self.config.max_history_quads,
            };
            target.append_history(src, vertices, &material, limits);
        } else {
            target.make_stale("untracked draw");
        }
        let dst_target = target.target();
        if tracked {
            self.registry.note_dependency(src);
        }
        self.queue
            .enqueue_draw(dst_target, src_texture, vertices, &material)
    }

    /// Fill the whole image with a straight-alpha color.
    ///
    /// Textures take a regular full upload. The screen cannot receive uploads, so it is
    /// cleared on the device instead.
    pub fn fill(&mut self, id: ImageId, color: Rgba8) -> RestoreResult<()> {
        let Some(image) = self.registry.get(id) else {
            return Ok(());
        };
        let (width, height) = image.size();
        let target = image.target();
        let premul = color.premultiply();
        let region = PixelRect::full(width, height);
        let pixels = premul.to_array().repeat((width as usize) * (height as usize));
        let RenderTarget::Screen(_) = target else {
            return self.replace_pixels(id, &pixels, region);
        };

        self.registry.invalidate_dependents(id);
        if let Some(image) = self.registry.get_mut(id) {
            image.record_replace(region, &pixels);
        }
        self.queue.enqueue(Command::Fill {
            target,
            color: premul,
        });
        Ok(())
    }

    pub fn clear(&mut self, id: ImageId) -> RestoreResult<()> {
        self.fill(id, Rgba8::TRANSPARENT)
    }

    /// Overwrite `region` with premultiplied RGBA8 `pixels`. The buffer is copied.
    ///
    /// Every image whose history draws from `id` goes stale. A disposed image is left alone.
    pub fn replace_pixels(
        &mut self,
        id: ImageId,
        pixels: &[u8],
        region: PixelRect,
    ) -> RestoreResult<()> {
        let Some(image) = self.registry.get(id) else {
            return Ok(());
        };
        let (width, height) = image.size();
        if region.width == 0 || region.height == 0 {
            return Err(RestoreError::out_of_range(format!(
                "replace region {region:?} is empty"
            )));
        }
        let fits = region
            .x
            .checked_add(region.width)
            .is_some_and(|x1| x1 <= width)
            && region
                .y
                .checked_add(region.height)
                .is_some_and(|y1| y1 <= height);
        if !fits {
            return Err(RestoreError::out_of_range(format!(
                "replace region {region:?} outside {width}x{height} image {id}"
            )));
        }
        if pixels.len() != region.byte_len() {
            return Err(RestoreError::out_of_range(format!(
                "replace region {region:?} needs {} bytes, got {}",
                region.byte_len(),
                pixels.len()
            )));
        }
        let Some(texture) = image.texture() else {
            panic!("the screen cannot be replaced with pixels");
        };

        self.registry.invalidate_dependents(id);
        if let Some(image) = self.registry.get_mut(id) {
            image.record_replace(region, pixels);
        }
        self.queue.enqueue(Command::Replace {
            target: texture,
            region,
            pixels: pixels.to_vec(),
        });
        Ok(())
    }

    /// Premultiplied color at `(x, y)`. Out of bounds and disposed images read transparent.
    pub fn read_pixel(&mut self, id: ImageId, x: i64, y: i64) -> RestoreResult<Rgba8Premul> {
        let Some(image) = self.registry.get(id) else {
            return Ok(Rgba8Premul::transparent());
        };
        if !image.contains(x, y) {
            return Ok(Rgba8Premul::transparent());
        }
        let (x, y) = (x as u32, y as u32);
        if let Some(px) = image.cached_pixel(x, y) {
            return Ok(px);
        }
        self.read_back(id)?;
        Ok(self
            .registry
            .get(id)
            .and_then(|image| image.cached_pixel(x, y))
            .unwrap_or_else(Rgba8Premul::transparent))
    }

    /// All premultiplied pixels of the image, row-major.
    pub fn read_pixels(&mut self, id: ImageId) -> RestoreResult<Vec<u8>> {
        let image = self.registry.get(id).ok_or(RestoreError::Disposed(id))?;
        if let Some(px) = image.cached_pixels() {
            return Ok(px.to_vec());
        }
        self.read_back(id)?;
        self.registry
            .get(id)
            .and_then(RestorableImage::cached_pixels)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| RestoreError::invariant(format!("image {id} has no pixels after readback")))
    }

    /// Copy of the image as an [`image::RgbaImage`] holding premultiplied pixels.
    pub fn snapshot(&mut self, id: ImageId) -> RestoreResult<image::RgbaImage> {
        let (width, height) = self.size(id)?;
        let pixels = self.read_pixels(id)?;
        image::RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            RestoreError::invariant(format!("pixel buffer of image {id} does not match its size"))
        })
    }

    /// Flush pending work and make the GPU copy the image's ground truth.
    fn read_back(&mut self, id: ImageId) -> RestoreResult<()> {
        self.queue.flush(&mut self.device)?;
        let Some(image) = self.registry.get_mut(id) else {
            return Ok(());
        };
        let (width, height) = image.size();
        let pixels = self.device.read_pixels(image.target(), width, height)?;
        image.adopt_gpu_pixels(pixels)
    }

    /// Release the image. Images drawn from it go stale first. Unknown ids are ignored.
    pub fn dispose(&mut self, id: ImageId) {
        if !self.registry.contains(id) {
            return;
        }
        self.registry.invalidate_dependents(id);
        if let Some(image) = self.registry.remove(id) {
            let target = image.release();
            self.queue.enqueue(Command::Dispose { target });
            tracing::trace!(image = %id, "image disposed");
        }
    }

    pub fn flush(&mut self) -> RestoreResult<FlushReport> {
        self.queue.flush(&mut self.device)
    }

    /// Start-of-frame hook: recover from a lost context, then clear volatile images.
    pub fn on_frame_start(&mut self) -> RestoreResult<()> {
        if self.config.restoring_enabled && self.device.is_context_lost() {
            self.on_context_lost()?;
        }
        self.registry.clear_volatile(&mut self.queue);
        Ok(())
    }

    /// End-of-frame hook: flush, then read back every stale image so all of them can be
    /// restored if the context goes away before the next frame.
    pub fn on_frame_end(&mut self) -> RestoreResult<FlushReport> {
        if self.device.is_context_lost() {
            tracing::warn!("context lost before frame end; recovery deferred to next frame");
            return Ok(FlushReport::default());
        }
        let report = self.queue.flush(&mut self.device)?;
        if self.config.restoring_enabled {
            self.registry
                .resolve_stale(&mut self.queue, &mut self.device)?;
        }
        Ok(report)
    }

    /// Rebuild every image on a fresh context. Returns the number of images restored.
    ///
    /// Queued commands reference resources of the old context and are dropped.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn on_context_lost(&mut self) -> RestoreResult<usize> {
        let dropped = self.queue.discard();
        tracing::info!(
            images = self.registry.len(),
            dropped_commands = dropped,
            "graphics context lost; restoring images"
        );
        self.device.reset_context()?;
        let restored = self
            .registry
            .restore_all(&mut self.queue, &mut self.device)?;
        self.queue.flush(&mut self.device)?;
        tracing::info!(restored, "images restored");
        Ok(restored)
    }

    /// Whether the context was lost and images must be restored. Always false when restoring
    /// is disabled.
    pub fn is_invalidated(&mut self) -> RestoreResult<bool> {
        if !self.config.restoring_enabled {
            return Ok(false);
        }
        if self.device.is_context_lost() {
            return Ok(true);
        }
        self.queue.flush(&mut self.device)?;
        Ok(self.device.is_context_lost())
    }

    pub fn stats(&self) -> EngineStats {
        let mut stats = EngineStats {
            live_images: self.registry.len(),
            queued_commands: self.queue.len(),
            queue_splits: self.queue.splits(),
            ring_wraps: self.ring.wraps(),
            ..EngineStats::default()
        };
        for image in self.registry.iter() {
            if image.is_stale() {
                stats.stale_images += 1;
            }
            if image.kind() == ImageKind::Volatile {
                stats.volatile_images += 1;
            }
            stats.history_entries += image.history_len();
        }
        stats
    }
}

#[cfg(test)]
#[path = "../../tests/unit/engine/api.rs"]
mod tests;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    foundation::core::ImageId,
    foundation::error::{RestoreError, RestoreResult},
    graphics::command::CommandQueue,
    graphics::device::GraphicsDevice,
    restorable::image::RestorableImage,
};

/// Every live image, keyed by id.
#[derive(Debug, Default)]
pub struct Registry {
    images: BTreeMap<ImageId, RestorableImage>,
    next_id: u64,
    /// Target of the last dependents scan, valid while nothing new depends on it.
    last_checked: Option<ImageId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids start at 1 and are never reused.
    pub(crate) fn allocate_id(&mut self) -> ImageId {
        self.next_id += 1;
        ImageId(self.next_id)
    }

    pub(crate) fn add(&mut self, image: RestorableImage) {
        self.images.insert(image.id(), image);
    }

    pub(crate) fn remove(&mut self, id: ImageId) -> Option<RestorableImage> {
        if self.last_checked == Some(id) {
            self.last_checked = None;
        }
        self.images.remove(&id)
    }

    pub fn get(&self, id: ImageId) -> Option<&RestorableImage> {
        self.images.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ImageId) -> Option<&mut RestorableImage> {
        self.images.get_mut(&id)
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.images.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RestorableImage> {
        self.images.values()
    }

    /// Mark stale every image whose history draws from `target`. Returns how many went stale.
    ///
    /// Repeated calls for the same target are free until something records a new dependency
    /// on it.
    pub(crate) fn invalidate_dependents(&mut self, target: ImageId) -> usize {
        if self.last_checked == Some(target) {
            return 0;
        }
        self.last_checked = Some(target);
        let mut invalidated = 0;
        for image in self.images.values_mut() {
            if image.id() != target && !image.is_stale() && image.depends_on(target) {
                image.make_stale("source changed");
                invalidated += 1;
            }
        }
        invalidated
    }

    /// Called whenever a history entry reading from `source` is recorded.
    pub(crate) fn note_dependency(&mut self, source: ImageId) {
        if self.last_checked == Some(source) {
            self.last_checked = None;
        }
    }

    /// Order in which images can be restored: every history source comes before the images
    /// replaying it. Among images that are ready, the lower id goes first.
    pub fn restore_order(&self) -> RestoreResult<Vec<ImageId>> {
        let mut pending: BTreeMap<ImageId, usize> = BTreeMap::new();
        let mut dependents: HashMap<ImageId, Vec<ImageId>> = HashMap::new();
        for image in self.images.values() {
            let deps = if image.has_dependency() {
                image.dependencies()
            } else {
                BTreeSet::new()
            };
            // A missing source is reported when the history is replayed.
            let live: Vec<ImageId> = deps
                .into_iter()
                .filter(|d| self.images.contains_key(d))
                .collect();
            pending.insert(image.id(), live.len());
            for dep in live {
                dependents.entry(dep).or_default().push(image.id());
            }
        }

        let mut ready: BTreeSet<ImageId> = pending
            .iter()
            .filter(|&(_, &n)| n == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(self.images.len());
        while let Some(id) = ready.pop_first() {
            order.push(id);
            for dependent in dependents.get(&id).into_iter().flatten() {
                if let Some(n) = pending.get_mut(dependent) {
                    *n -= 1;
                    if *n == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if order.len() != self.images.len() {
            let cyclic: Vec<String> = pending
                .iter()
                .filter(|&(_, &n)| n > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            return Err(RestoreError::invariant(format!(
                "history dependency cycle among images {}",
                cyclic.join(", ")
            )));
        }
        Ok(order)
    }

    /// Rebuild every image on a fresh context, sources before dependents.
    #[tracing::instrument(level = "debug", skip_all, fields(images = self.images.len()))]
    pub(crate) fn restore_all<D: GraphicsDevice + ?Sized>(
        &mut self,
        queue: &mut CommandQueue,
        device: &mut D,
    ) -> RestoreResult<usize> {
        let order = self.restore_order()?;
        let mut restored = HashMap::with_capacity(order.len());
        for id in &order {
            let Some(image) = self.images.get_mut(id) else {
                continue;
            };
            image.restore(device, queue, &restored)?;
            if let Some(texture) = image.texture() {
                restored.insert(*id, texture);
            }
        }
        self.last_checked = None;
        Ok(order.len())
    }

    /// Queue the per-frame clear of every volatile image.
    pub(crate) fn clear_volatile(&mut self, queue: &mut CommandQueue) {
        for image in self.images.values_mut() {
            image.clear_volatile(queue);
        }
    }

    /// Read back every stale regular image so that all of them are restorable again.
    /// Returns how many were resolved.
    #[tracing::instrument(level = "trace", skip_all)]
    pub(crate) fn resolve_stale<D: GraphicsDevice + ?Sized>(
        &mut self,
        queue: &mut CommandQueue,
        device: &mut D,
    ) -> RestoreResult<usize> {
        self.last_checked = None;
        let stale: Vec<ImageId> = self
            .images
            .values()
            .filter(|image| image.needs_resolve())
            .map(RestorableImage::id)
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        queue.flush(device)?;
        for id in &stale {
            if let Some(image) = self.images.get_mut(id) {
                let (width, height) = image.size();
                let pixels = device.read_pixels(image.target(), width, height)?;
                image.adopt_gpu_pixels(pixels)?;
            }
        }
        tracing::debug!(resolved = stale.len(), "resolved stale images");
        Ok(stale.len())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/restorable/registry.rs"]
mod tests;

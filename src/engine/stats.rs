use anyhow::Context;

use crate::foundation::error::RestoreResult;

/// Point-in-time counters of an [`Engine`](crate::Engine).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct EngineStats {
    pub live_images: usize,
    pub stale_images: usize,
    pub volatile_images: usize,
    /// Sum of history entries over all images.
    pub history_entries: usize,
    pub queued_commands: usize,
    /// Hardware buffer boundaries forced while enqueuing.
    pub queue_splits: u64,
    pub ring_wraps: u64,
}

impl EngineStats {
    pub fn to_json(&self) -> RestoreResult<String> {
        Ok(serde_json::to_string(self).context("serialize engine stats")?)
    }
}

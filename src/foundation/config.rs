use anyhow::Context;

use crate::foundation::error::RestoreResult;

/// Largest multiple of 6 indices that still addresses every vertex with `u16` indices.
pub const INDICES_NUM: usize = (u16::MAX as usize + 1) / 6 * 6;

/// History entries retained per image before it falls back to being stale.
pub const DEFAULT_MAX_HISTORY: usize = 100;

/// Quads of draw history retained per image, across all entries, before it falls back to
/// being stale. Merged draws count too.
pub const DEFAULT_MAX_HISTORY_QUADS: usize = 4096;

pub const DEFAULT_MAX_IMAGE_SIZE: u32 = 4096;

pub const DEFAULT_RING_CAPACITY_QUADS: usize = 256;

/// Engine-wide knobs.
///
/// Every field is optional when deserialized; missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// When false, draws never record history and context loss is never reported.
    pub restoring_enabled: bool,
    /// Per-image history cap.
    pub max_history: usize,
    /// Per-image cap on quads held by the history.
    pub max_history_quads: usize,
    /// Maximum logical width/height of an image.
    pub max_image_size: u32,
    /// Hardware index buffer capacity, in indices.
    pub index_buffer_capacity: usize,
    /// Quads held by the vertex ring before it wraps.
    pub ring_capacity_quads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            restoring_enabled: true,
            max_history: DEFAULT_MAX_HISTORY,
            max_history_quads: DEFAULT_MAX_HISTORY_QUADS,
            max_image_size: DEFAULT_MAX_IMAGE_SIZE,
            index_buffer_capacity: INDICES_NUM,
            ring_capacity_quads: DEFAULT_RING_CAPACITY_QUADS,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `RESTORABLE_*` environment variables.
    ///
    /// Unparseable or zero values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let restoring_enabled = !lookup("RESTORABLE_DISABLE_RESTORING")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let max_history = lookup("RESTORABLE_MAX_HISTORY")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.max_history);
        let max_history_quads = lookup("RESTORABLE_MAX_HISTORY_QUADS")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.max_history_quads);
        let max_image_size = lookup("RESTORABLE_MAX_IMAGE_SIZE")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.max_image_size);
        Self {
            restoring_enabled,
            max_history,
            max_history_quads,
            max_image_size,
            ..defaults
        }
    }

    pub fn from_json_str(json: &str) -> RestoreResult<Self> {
        let cfg: Self = serde_json::from_str(json).context("parse engine config json")?;
        Ok(cfg)
    }

    pub(crate) fn index_capacity(&self) -> usize {
        // Whole quads only; a partial quad could never be enqueued.
        (self.index_buffer_capacity.min(INDICES_NUM) / 6 * 6).max(6)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/config.rs"]
mod tests;

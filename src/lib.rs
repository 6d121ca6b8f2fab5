//! Restorable is a draw-command batching engine whose GPU images survive context loss.
//!
//! Callers create logical images and issue "draw image A onto image B" and "replace pixels"
//! operations against them. The engine:
//!
//! 1. **Batches**: consecutive draws that share a material merge into one indexed draw call,
//!    and the queue is flushed in chunks that each fit one hardware index buffer.
//! 2. **Remembers**: every image keeps a CPU pixel cache and a bounded history of the draws that
//!    produced it, or is marked stale when neither can be trusted.
//! 3. **Restores**: after the graphics context is lost, images are rebuilt in dependency order
//!    by re-uploading caches and replaying histories against fresh resources.
//!
//! Hardware access goes through the [`GraphicsDevice`] trait. [`SoftwareDevice`] is a complete
//! CPU implementation used for headless rendering and tests.
//!
//! Pixels are **premultiplied RGBA8** everywhere except where a straight-alpha [`Rgba8`] is
//! taken explicitly (tints, fills).
#![forbid(unsafe_code)]

mod engine;
mod foundation;
mod graphics;
mod restorable;

/// Geometry and color transforms consumed by draws.
pub mod transform;

pub use engine::api::{DrawOptions, Engine};
pub use engine::global;
pub use engine::stats::EngineStats;
pub use foundation::config::{
    DEFAULT_MAX_HISTORY, DEFAULT_MAX_HISTORY_QUADS, DEFAULT_MAX_IMAGE_SIZE,
    DEFAULT_RING_CAPACITY_QUADS, EngineConfig, INDICES_NUM,
};
pub use foundation::core::{
    Affine, BlendFactor, BlendMode, Filter, ImageId, PixelRect, Point, Rgba8, Rgba8Premul, Vec2,
};
pub use foundation::error::{RestoreError, RestoreResult};
pub use foundation::math::next_power_of_two;
pub use graphics::command::{
    Command, CommandQueue, DrawCommand, DrawMaterial, FlushReport, QueueState,
};
pub use graphics::device::{DrawCall, FramebufferId, GraphicsDevice, RenderTarget, TextureId};
pub use graphics::soft::{DeviceStats, SoftwareDevice};
pub use graphics::vertices::{
    FLOATS_PER_VERTEX, QUAD_FLOATS, QUAD_INDICES, SourceRect, VERTICES_PER_QUAD, VertexRing,
};
pub use restorable::image::{ImageKind, ImageState, RestorableImage};
pub use restorable::registry::Registry;
pub use transform::color::ColorMatrix;
pub use transform::geometry::GeometryTransform;

//! Images that remember how they were produced, and the registry that restores them.

/// Per-image cache, history and staleness.
pub mod image;
/// Live image set, invalidation and ordered restoration.
pub mod registry;

//! Domain types for the locsync orchestrator.
//!
//! This module contains the core data structures:
//! - Location, Identity, Credential: who can act for which profile
//! - ContentItem: publishable text/media and its per-platform results
//! - Synced rows: reviews, media, Q&A and daily metrics mirrored from upstream

pub mod content;
pub mod location;
pub mod synced;

// Re-export commonly used types
pub use content::{ContentItem, ContentStatus, MediaKind, MediaRef, PlatformResult};
pub use location::{AutoReplySettings, Credential, DisplayFields, Identity, Location, Platform};
pub use synced::{Answer, MediaAsset, MetricDay, Question, ReplySource, Review};

//! locsync - External integration orchestrator for local business profiles
//!
//! Keeps a local record of each managed Location in sync with its external
//! business profile and publishes content items to the profile plus several
//! social platforms.
//!
//! # Architecture
//!
//! - A credential resolver picks the first identity holding a usable token,
//!   refreshing it once when expired
//! - The sync engine reconciles reviews, posts, metrics, media and Q&A by
//!   external id, never touching local-only fields
//! - The publish orchestrator fans an item out concurrently and reduces the
//!   per-platform results to one status
//! - The scheduler fires the recurring jobs, each on its own task
//!
//! # Modules
//!
//! - `adapters`: External system integrations (business profile, social, OAuth, text generation)
//! - `core`: Orchestration logic (resolver, sync, publish, scheduler)
//! - `domain`: Data structures (Location, Credential, ContentItem, synced rows)
//! - `store`: SQLite persistence
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Link a location and sync it
//! locsync link loc-1 --profile-id locations/123
//! locsync sync loc-1
//!
//! # Publish a content item now
//! locsync publish <item-id>
//!
//! # Run the recurring jobs
//! locsync scheduler
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod store;

// Re-export main types at crate root for convenience
pub use core::{Integrations, Orchestrator};
pub use domain::{ContentItem, ContentStatus, Credential, Location, Platform, PlatformResult};
pub use error::IntegrationError;
pub use store::{Store, StoreError};

//! Core orchestration logic.
//!
//! This module contains:
//! - CredentialResolver: picks a usable credential among candidate identities
//! - SyncEngine: reconciles upstream profile resources into the store
//! - PublishOrchestrator: fans a content item out to its target platforms
//! - Scheduler: fires the named recurring jobs
//! - Orchestrator: wires the above around one store

pub mod auto_reply;
pub mod connect;
pub mod credentials;
pub mod media;
pub mod metrics;
pub mod orchestrator;
pub mod publish;
pub mod scheduler;
pub mod sync;
pub mod text_limit;

// Re-export commonly used types
pub use auto_reply::{AutoReplier, AutoReplyReport};
pub use connect::{ConnectFlow, ConnectStart, ConnectState};
pub use credentials::CredentialResolver;
pub use media::{classify, MediaClass, MediaResolver, ResolvedMedia};
pub use orchestrator::{Integrations, Orchestrator};
pub use publish::PublishOrchestrator;
pub use scheduler::{Job, JobSummary, Scheduler};
pub use sync::{SyncCounts, SyncEngine, SyncOutcome, SyncReport, SyncResource};

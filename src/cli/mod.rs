//! Command-line interface for locsync.
//!
//! Provides commands for linking locations, syncing and publishing, the
//! manual review/Q&A/media operations, the OAuth connect flow and the
//! scheduler daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::info;

use crate::config::{self, ResolvedConfig};
use crate::core::{Integrations, Job, Orchestrator, Scheduler, SyncResource};
use crate::domain::{
    AutoReplySettings, ContentItem, Identity, Location, MediaKind, MediaRef, Platform,
};
use crate::store::Store;

/// locsync - keep business profiles in sync and publish to social platforms
#[derive(Parser, Debug)]
#[command(name = "locsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the recurring jobs until interrupted
    Scheduler,

    /// Run one named job once (publish_due, auto_reply, profile_resync, state_eviction)
    RunJob {
        job: Job,
    },

    /// Create or relink a location
    Link {
        location_id: String,

        /// External profile id (e.g. "locations/123")
        #[arg(short, long)]
        profile_id: Option<String>,

        /// Owning organization
        #[arg(short, long)]
        org: Option<String>,
    },

    /// Create or update an organization
    Organization {
        id: String,

        #[arg(short, long)]
        name: Option<String>,

        /// Organization-specific text-generation API key
        #[arg(long, env = "LOCSYNC_ORG_TEXTGEN_KEY", hide_env_values = true)]
        textgen_key: Option<String>,
    },

    /// Assign an identity to a location (created if unknown)
    Assign {
        location_id: String,
        identity_id: String,

        #[arg(long)]
        email: Option<String>,
    },

    /// Start an OAuth connect flow and print the consent URL
    Connect {
        identity_id: String,
        platform: Platform,

        /// Page or business account the token should act for
        #[arg(short, long)]
        account: Option<String>,
    },

    /// Complete an OAuth connect flow with the callback's state and code
    ConnectCallback {
        state: String,
        code: String,
    },

    /// Show which identity currently holds a usable credential
    Resolve {
        location_id: String,
        platform: Platform,
    },

    /// Sync upstream resources into the local store
    Sync {
        location_id: String,

        /// Only this resource class (all when omitted)
        #[arg(short, long, value_enum)]
        resource: Option<ResourceArg>,
    },

    /// Print the cached profile, refetching when stale
    Profile {
        location_id: String,

        /// Refetch even if the cache is fresh
        #[arg(short, long)]
        force: bool,
    },

    /// Apply a partial profile update
    UpdateProfile {
        location_id: String,

        /// Comma-separated field mask (e.g. "title,websiteUri")
        #[arg(short, long)]
        mask: String,

        /// JSON file with the patch (reads the --patch string if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Inline JSON patch
        #[arg(long)]
        patch: Option<String>,
    },

    /// Create a content item
    Draft {
        location_id: String,

        #[arg(short, long)]
        body: String,

        /// Target platforms (repeatable)
        #[arg(short, long = "target", required = true)]
        targets: Vec<Platform>,

        /// Media URL to attach
        #[arg(long)]
        media: Option<String>,

        /// Kind of the attached media
        #[arg(long, default_value = "image")]
        media_kind: MediaKind,

        /// Schedule for this RFC 3339 time instead of leaving a draft
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Publish a content item to all its targets now
    Publish {
        item_id: String,
    },

    /// Delete a content item and its published copies
    DeleteItem {
        item_id: String,
    },

    /// List content items of a location
    Items {
        location_id: String,
    },

    /// Reply to a review
    ReplyReview {
        review_id: String,
        text: String,
    },

    /// Answer a customer question
    AnswerQuestion {
        question_id: String,
        text: String,
    },

    /// Upload a photo or video from a public URL
    UploadMedia {
        location_id: String,
        url: String,

        #[arg(short, long, default_value = "image")]
        kind: MediaKind,

        #[arg(short, long, default_value = "ADDITIONAL")]
        category: String,
    },

    /// Delete an uploaded photo or video
    DeleteMedia {
        media_id: String,
    },

    /// Enable or disable automatic review replies
    AutoReply {
        location_id: String,

        /// Disable instead of enable
        #[arg(long)]
        off: bool,

        /// Only answer reviews left on or after this date
        #[arg(long)]
        since: Option<NaiveDate>,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// Resource class for CLI (maps to SyncResource)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ResourceArg {
    Reviews,
    Posts,
    Metrics,
    Media,
    Questions,
    Profile,
}

impl From<ResourceArg> for SyncResource {
    fn from(r: ResourceArg) -> Self {
        match r {
            ResourceArg::Reviews => SyncResource::Reviews,
            ResourceArg::Posts => SyncResource::Posts,
            ResourceArg::Metrics => SyncResource::Metrics,
            ResourceArg::Media => SyncResource::Media,
            ResourceArg::Questions => SyncResource::Questions,
            ResourceArg::Profile => SyncResource::Profile,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;

        match self.command {
            Commands::Config => show_config(cfg),
            Commands::Scheduler => run_scheduler(cfg).await,
            Commands::RunJob { job } => {
                let summary = orchestrator(cfg)?.run_job(job).await?;
                print_json(&summary)
            }
            Commands::Link {
                location_id,
                profile_id,
                org,
            } => link_location(cfg, &location_id, profile_id, org),
            Commands::Organization {
                id,
                name,
                textgen_key,
            } => {
                let store = open_store(cfg)?;
                store.upsert_organization(
                    &id,
                    name.as_deref().unwrap_or(&id),
                    textgen_key.as_deref(),
                )?;
                eprintln!("Saved organization {}", id);
                Ok(())
            }
            Commands::Assign {
                location_id,
                identity_id,
                email,
            } => assign_identity(cfg, &location_id, &identity_id, email),
            Commands::Connect {
                identity_id,
                platform,
                account,
            } => {
                let start = orchestrator(cfg)?
                    .connect()
                    .begin(&identity_id, platform, account)?;
                print_json(&start)
            }
            Commands::ConnectCallback { state, code } => {
                let credential = orchestrator(cfg)?
                    .connect()
                    .complete(&state, &code)
                    .await
                    .context("Connect flow failed")?;
                print_json(&json!({
                    "identity_id": credential.identity_id,
                    "platform": credential.platform,
                    "expires_at": credential.expires_at,
                    "external_account_id": credential.external_account_id,
                }))
            }
            Commands::Resolve {
                location_id,
                platform,
            } => resolve_credential(cfg, &location_id, platform).await,
            Commands::Sync {
                location_id,
                resource,
            } => sync(cfg, &location_id, resource.map(SyncResource::from)).await,
            Commands::Profile { location_id, force } => {
                let profile = orchestrator(cfg)?
                    .sync()
                    .profile(&location_id, force)
                    .await?;
                print_json(&profile)
            }
            Commands::UpdateProfile {
                location_id,
                mask,
                input,
                patch,
            } => {
                let patch = read_patch(input, patch)?;
                let updated = orchestrator(cfg)?
                    .sync()
                    .update_profile(&location_id, &patch, &mask)
                    .await?;
                print_json(&updated)
            }
            Commands::Draft {
                location_id,
                body,
                targets,
                media,
                media_kind,
                at,
            } => draft(cfg, &location_id, body, targets, media, media_kind, at),
            Commands::Publish { item_id } => {
                let orchestrator = orchestrator(cfg)?;
                orchestrator.publisher().publish(&item_id).await?;
                let item = orchestrator
                    .store()
                    .get_content_item(&item_id)?
                    .with_context(|| format!("Content item vanished: {}", item_id))?;
                print_json(&item)
            }
            Commands::DeleteItem { item_id } => {
                orchestrator(cfg)?.publisher().delete(&item_id).await?;
                eprintln!("Deleted {}", item_id);
                Ok(())
            }
            Commands::Items { location_id } => {
                let items = open_store(cfg)?.content_items_for_location(&location_id)?;
                print_json(&items)
            }
            Commands::ReplyReview { review_id, text } => {
                let review = orchestrator(cfg)?
                    .sync()
                    .reply_to_review(&review_id, &text)
                    .await?;
                print_json(&review)
            }
            Commands::AnswerQuestion { question_id, text } => {
                let answer = orchestrator(cfg)?
                    .sync()
                    .answer_question(&question_id, &text)
                    .await?;
                print_json(&answer)
            }
            Commands::UploadMedia {
                location_id,
                url,
                kind,
                category,
            } => {
                let asset = orchestrator(cfg)?
                    .sync()
                    .upload_media(&location_id, &url, kind, &category)
                    .await?;
                print_json(&asset)
            }
            Commands::DeleteMedia { media_id } => {
                orchestrator(cfg)?.sync().delete_media(&media_id).await?;
                eprintln!("Deleted {}", media_id);
                Ok(())
            }
            Commands::AutoReply {
                location_id,
                off,
                since,
            } => {
                let settings = AutoReplySettings {
                    enabled: !off,
                    since,
                };
                open_store(cfg)?.set_auto_reply(&location_id, &settings)?;
                print_json(&settings)
            }
        }
    }
}

fn open_store(cfg: &ResolvedConfig) -> Result<Store> {
    Store::open(&cfg.database)
        .with_context(|| format!("Failed to open database: {}", cfg.database.display()))
}

fn orchestrator(cfg: &ResolvedConfig) -> Result<Orchestrator> {
    let store = Arc::new(open_store(cfg)?);
    let integrations =
        Integrations::http(&cfg.settings).context("Failed to build integration clients")?;
    Ok(Orchestrator::new(store, integrations, &cfg.settings))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run every job on its interval until Ctrl-C
async fn run_scheduler(cfg: &ResolvedConfig) -> Result<()> {
    let orchestrator = Arc::new(orchestrator(cfg)?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = Scheduler::new(orchestrator, cfg.settings.scheduler.clone());
    let handle = tokio::spawn(scheduler.run(shutdown_rx));
    info!(database = %cfg.database.display(), "Scheduler started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested; waiting for running jobs");
    // Receivers may already be gone if every job task exited
    let _ = shutdown_tx.send(true);

    handle.await.context("Scheduler task failed")?;
    Ok(())
}

fn link_location(
    cfg: &ResolvedConfig,
    location_id: &str,
    profile_id: Option<String>,
    org: Option<String>,
) -> Result<()> {
    let store = open_store(cfg)?;

    let mut location = store
        .get_location(location_id)?
        .unwrap_or_else(|| Location::new(location_id, None));
    if org.is_some() {
        location.organization_id = org;
    }
    if let Some(profile_id) = profile_id {
        location.external_profile_id = Some(profile_id);
    }
    store.upsert_location(&location)?;

    print_json(&location)
}

fn assign_identity(
    cfg: &ResolvedConfig,
    location_id: &str,
    identity_id: &str,
    email: Option<String>,
) -> Result<()> {
    let store = open_store(cfg)?;
    let location = store
        .get_location(location_id)?
        .with_context(|| format!("Location not found: {}", location_id))?;

    store.upsert_identity(&Identity {
        id: identity_id.to_string(),
        organization_id: location.organization_id.clone(),
        email,
    })?;
    store.assign_identity(location_id, identity_id)?;

    print_json(&store.assigned_identity_ids(location_id)?)
}

async fn resolve_credential(
    cfg: &ResolvedConfig,
    location_id: &str,
    platform: Platform,
) -> Result<()> {
    let orchestrator = orchestrator(cfg)?;
    let location = orchestrator
        .store()
        .get_location(location_id)?
        .with_context(|| format!("Location not found: {}", location_id))?;

    let credential = orchestrator.resolver().resolve(&location, platform).await?;
    print_json(&json!({
        "identity_id": credential.identity_id,
        "platform": credential.platform,
        "expires_at": credential.expires_at,
        "scope": credential.scope,
        "external_account_id": credential.external_account_id,
    }))
}

async fn sync(
    cfg: &ResolvedConfig,
    location_id: &str,
    resource: Option<SyncResource>,
) -> Result<()> {
    let orchestrator = orchestrator(cfg)?;
    let engine = orchestrator.sync();

    let Some(resource) = resource else {
        let report = engine.sync_all(location_id).await?;
        return print_json(&report);
    };

    let counts = match resource {
        SyncResource::Reviews => engine.sync_reviews(location_id).await?,
        SyncResource::Posts => engine.sync_posts(location_id).await?,
        SyncResource::Metrics => engine.sync_metrics(location_id).await?,
        SyncResource::Media => engine.sync_media(location_id).await?,
        SyncResource::Questions => engine.sync_questions(location_id).await?,
        SyncResource::Profile => {
            let profile = engine.sync_profile(location_id).await?;
            return print_json(&profile);
        }
    };
    print_json(&json!({ resource.as_str(): counts }))
}

fn read_patch(input: Option<PathBuf>, inline: Option<String>) -> Result<Value> {
    let raw = match (input, inline) {
        (Some(path), _) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read patch file: {}", path.display()))?,
        (None, Some(inline)) => inline,
        (None, None) => anyhow::bail!("Provide the patch with --input or --patch"),
    };
    serde_json::from_str(&raw).context("Patch is not valid JSON")
}

fn draft(
    cfg: &ResolvedConfig,
    location_id: &str,
    body: String,
    targets: Vec<Platform>,
    media: Option<String>,
    media_kind: MediaKind,
    at: Option<DateTime<Utc>>,
) -> Result<()> {
    let store = open_store(cfg)?;
    store
        .get_location(location_id)?
        .with_context(|| format!("Location not found: {}", location_id))?;

    let mut item = ContentItem::draft(location_id, body, targets);
    if let Some(url) = media {
        item = item.with_media(MediaRef {
            url,
            kind: media_kind,
        });
    }
    if let Some(at) = at {
        item = item.scheduled_for(at);
    }
    store.save_content_item(&item)?;

    print_json(&item)
}

/// Show resolved configuration
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    let settings = &cfg.settings;

    println!("Config file: {}", cfg.config_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "(none - using defaults)".to_string()));
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Database: {}", cfg.database.display());
    println!();
    println!("HTTP timeout: {}s", settings.http.timeout_seconds);
    println!();
    println!("OAuth clients:");
    if settings.oauth.is_empty() {
        println!("  (none)");
    } else {
        for (platform, client) in &settings.oauth {
            println!("  {}: {}", platform, client.client_id);
        }
    }
    println!();
    println!("Text generation:");
    println!("  Base URL: {}", settings.text_generation.base_url);
    println!("  Model:    {}", settings.text_generation.model);
    println!("  API key:  {}", if settings.text_generation.api_key.is_some() { "(set)" } else { "(none)" });
    println!();
    println!("Media:");
    println!("  Own CDN hosts:  {}", settings.media.own_cdn_hosts.join(", "));
    println!("  Primary host:   {}", settings.media.primary_host.as_ref().map(|h| h.upload_url.as_str()).unwrap_or("(none)"));
    println!("  Secondary host: {}", settings.media.secondary_host.as_ref().map(|h| h.upload_url.as_str()).unwrap_or("(none)"));
    println!();
    println!("Scheduler:");
    for job in Job::ALL {
        println!("  {:<16} every {}s", job.as_str(), job.period(&settings.scheduler).as_secs());
    }
    println!("  Auto-reply cap:  {} per location", settings.auto_reply.per_cycle_cap);

    Ok(())
}

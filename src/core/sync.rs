//! Sync engine: mirror business-profile resources into the local store.
//!
//! Each resource class is synced independently. `sync_all` reports one
//! outcome per class and a failure in one class never stops the others.
//! Rows are keyed by the upstream resource name; re-running a sync against
//! unchanged upstream data only refreshes existing rows.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::credentials::CredentialResolver;
use super::media::{classify, MediaClass};
use super::metrics::{pivot, DAILY_METRICS};
use crate::adapters::{LocationAddress, ProfileApi, RemoteAnswer, RemotePost};
use crate::config::SyncSettings;
use crate::domain::{
    Answer, ContentItem, ContentStatus, Credential, DisplayFields, Location, MediaAsset,
    MediaKind, MediaRef, Platform, PlatformResult, Question, ReplySource, Review,
};
use crate::error::IntegrationError;
use crate::store::{Store, Upserted};

/// Fields requested when fetching the profile
pub const PROFILE_READ_MASK: &str = "name,title,storefrontAddress,phoneNumbers,websiteUri,\
categories,profile,metadata,regularHours,specialHours,openInfo,serviceArea,labels";

/// Resource classes handled by the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncResource {
    Reviews,
    Posts,
    Metrics,
    Media,
    Questions,
    Profile,
}

impl SyncResource {
    pub const ALL: [SyncResource; 6] = [
        SyncResource::Reviews,
        SyncResource::Posts,
        SyncResource::Metrics,
        SyncResource::Media,
        SyncResource::Questions,
        SyncResource::Profile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reviews => "reviews",
            Self::Posts => "posts",
            Self::Metrics => "metrics",
            Self::Media => "media",
            Self::Questions => "questions",
            Self::Profile => "profile",
        }
    }

    /// Classes addressed through the account-qualified location path
    fn needs_account(&self) -> bool {
        matches!(
            self,
            Self::Reviews | Self::Posts | Self::Media | Self::Questions
        )
    }
}

impl fmt::Display for SyncResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rows written by one class sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    pub inserted: usize,
    pub updated: usize,
}

impl SyncCounts {
    fn record(&mut self, outcome: Upserted) {
        match outcome {
            Upserted::Inserted => self.inserted += 1,
            Upserted::Updated => self.updated += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Synced { inserted: usize, updated: usize },
    Failed { error: String },
}

impl SyncOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl From<Result<SyncCounts, IntegrationError>> for SyncOutcome {
    fn from(result: Result<SyncCounts, IntegrationError>) -> Self {
        match result {
            Ok(c) => Self::Synced {
                inserted: c.inserted,
                updated: c.updated,
            },
            Err(e) => Self::Failed { error: e.detail() },
        }
    }
}

pub type SyncReport = BTreeMap<SyncResource, SyncOutcome>;

pub struct SyncEngine {
    store: Arc<Store>,
    resolver: Arc<CredentialResolver>,
    api: Arc<dyn ProfileApi>,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        store: Arc<Store>,
        resolver: Arc<CredentialResolver>,
        api: Arc<dyn ProfileApi>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            resolver,
            api,
            settings,
        }
    }

    fn load(&self, location_id: &str) -> Result<(Location, String), IntegrationError> {
        let location = self
            .store
            .get_location(location_id)?
            .ok_or_else(|| IntegrationError::unknown("location", location_id))?;
        let profile_id = location
            .external_profile_id
            .clone()
            .ok_or_else(|| IntegrationError::NotLinked(location.id.clone()))?;
        Ok((location, profile_id))
    }

    /// Location, profile credential and composite address for one operation
    async fn context(
        &self,
        location_id: &str,
    ) -> Result<(Location, Credential, LocationAddress), IntegrationError> {
        let (location, profile_id) = self.load(location_id)?;
        let credential = self.resolver.resolve(&location, Platform::Google).await?;
        let address = LocationAddress::resolve(self.api.as_ref(), &credential, &profile_id).await?;
        Ok((location, credential, address))
    }

    /// Sync every resource class, isolating failures per class
    #[instrument(skip(self))]
    pub async fn sync_all(&self, location_id: &str) -> Result<SyncReport, IntegrationError> {
        let (location, profile_id) = self.load(location_id)?;
        let mut report = SyncReport::new();

        let credential = match self.resolver.resolve(&location, Platform::Google).await {
            Ok(c) => c,
            Err(IntegrationError::Store(e)) => return Err(IntegrationError::Store(e)),
            Err(e) => {
                warn!(error = %e, "No profile credential; every class fails");
                for resource in SyncResource::ALL {
                    report.insert(resource, SyncOutcome::Failed { error: e.detail() });
                }
                return Ok(report);
            }
        };

        // Only the account-qualified classes depend on this lookup
        let address =
            LocationAddress::resolve(self.api.as_ref(), &credential, &profile_id)
                .await
                .map_err(|e| e.detail());

        for resource in SyncResource::ALL {
            let result = match (&address, resource.needs_account()) {
                (Err(detail), true) => Err(IntegrationError::Permanent(format!(
                    "account lookup failed: {}",
                    detail
                ))),
                (Ok(addr), true) => {
                    self.sync_with(resource, &location, &credential, Some(addr))
                        .await
                }
                (_, false) => self.sync_with(resource, &location, &credential, None).await,
            };

            if let Err(e) = &result {
                warn!(%resource, error = %e, "Resource sync failed");
            }
            report.insert(resource, SyncOutcome::from(result));
        }

        let failed = report.values().filter(|o| o.is_failed()).count();
        info!(failed, "Sync finished");
        Ok(report)
    }

    async fn sync_with(
        &self,
        resource: SyncResource,
        location: &Location,
        credential: &Credential,
        address: Option<&LocationAddress>,
    ) -> Result<SyncCounts, IntegrationError> {
        let need = |a: Option<&LocationAddress>| {
            a.cloned().ok_or_else(|| {
                IntegrationError::Permanent("account-qualified address missing".to_string())
            })
        };

        match resource {
            SyncResource::Reviews => {
                self.reviews_with(location, credential, &need(address)?)
                    .await
            }
            SyncResource::Posts => self.posts_with(location, credential, &need(address)?).await,
            SyncResource::Media => self.media_with(location, credential, &need(address)?).await,
            SyncResource::Questions => {
                self.questions_with(location, credential, &need(address)?)
                    .await
            }
            SyncResource::Metrics => self.metrics_with(location, credential).await,
            SyncResource::Profile => self
                .profile_with(location, credential)
                .await
                .map(|_| SyncCounts {
                    inserted: 0,
                    updated: 1,
                }),
        }
    }

    // ------------------------------------------------------------------
    // Per-class operations
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn sync_reviews(&self, location_id: &str) -> Result<SyncCounts, IntegrationError> {
        let (location, credential, address) = self.context(location_id).await?;
        self.reviews_with(&location, &credential, &address).await
    }

    #[instrument(skip(self))]
    pub async fn sync_posts(&self, location_id: &str) -> Result<SyncCounts, IntegrationError> {
        let (location, credential, address) = self.context(location_id).await?;
        self.posts_with(&location, &credential, &address).await
    }

    #[instrument(skip(self))]
    pub async fn sync_media(&self, location_id: &str) -> Result<SyncCounts, IntegrationError> {
        let (location, credential, address) = self.context(location_id).await?;
        self.media_with(&location, &credential, &address).await
    }

    #[instrument(skip(self))]
    pub async fn sync_questions(&self, location_id: &str) -> Result<SyncCounts, IntegrationError> {
        let (location, credential, address) = self.context(location_id).await?;
        self.questions_with(&location, &credential, &address).await
    }

    #[instrument(skip(self))]
    pub async fn sync_metrics(&self, location_id: &str) -> Result<SyncCounts, IntegrationError> {
        let (location, _) = self.load(location_id)?;
        let credential = self.resolver.resolve(&location, Platform::Google).await?;
        self.metrics_with(&location, &credential).await
    }

    /// Fetch the profile and replace the cached blob
    #[instrument(skip(self))]
    pub async fn sync_profile(&self, location_id: &str) -> Result<Value, IntegrationError> {
        let (location, _) = self.load(location_id)?;
        let credential = self.resolver.resolve(&location, Platform::Google).await?;
        self.profile_with(&location, &credential).await
    }

    /// Cached profile read; one upstream fetch when stale or forced
    #[instrument(skip(self))]
    pub async fn profile(&self, location_id: &str, force: bool) -> Result<Value, IntegrationError> {
        let (location, _) = self.load(location_id)?;
        let ttl = Duration::seconds(self.settings.profile_cache_ttl_seconds);

        if !force && location.profile_is_fresh(ttl, Utc::now()) {
            if let Some(profile) = location.profile {
                return Ok(profile);
            }
        }

        let credential = self.resolver.resolve(&location, Platform::Google).await?;
        self.profile_with(&location, &credential).await
    }

    /// Partial update of the upstream location, then replace the cache
    #[instrument(skip(self, patch))]
    pub async fn update_profile(
        &self,
        location_id: &str,
        patch: &Value,
        update_mask: &str,
    ) -> Result<Value, IntegrationError> {
        let (location, profile_id) = self.load(location_id)?;
        let credential = self.resolver.resolve(&location, Platform::Google).await?;

        let updated = self
            .api
            .update_location(
                &credential,
                &crate::adapters::plain_location(&profile_id),
                patch,
                update_mask,
            )
            .await?;
        self.replace_profile(&location, &updated)?;
        info!(update_mask, "Profile updated");
        Ok(updated)
    }

    // ------------------------------------------------------------------
    // Manual operations
    // ------------------------------------------------------------------

    /// Submit a reply to a review and record it locally
    #[instrument(skip(self, text))]
    pub async fn reply_to_review(
        &self,
        review_id: &str,
        text: &str,
    ) -> Result<Review, IntegrationError> {
        let review = self
            .store
            .get_review(review_id)?
            .ok_or_else(|| IntegrationError::unknown("review", review_id))?;
        let (location, _) = self.load(&review.location_id)?;
        let credential = self.resolver.resolve(&location, Platform::Google).await?;

        self.api
            .reply_review(&credential, &review.external_id, text)
            .await?;
        self.store
            .record_review_reply(review_id, text, Utc::now(), ReplySource::Manual)?;

        self.store
            .get_review(review_id)?
            .ok_or_else(|| IntegrationError::unknown("review", review_id))
    }

    /// Answer a customer question and store the answer
    #[instrument(skip(self, text))]
    pub async fn answer_question(
        &self,
        question_id: &str,
        text: &str,
    ) -> Result<Answer, IntegrationError> {
        let question = self
            .store
            .get_question(question_id)?
            .ok_or_else(|| IntegrationError::unknown("question", question_id))?;
        let (location, _) = self.load(&question.location_id)?;
        let credential = self.resolver.resolve(&location, Platform::Google).await?;

        let remote = self
            .api
            .answer_question(&credential, &question.external_id, text)
            .await?;
        let answer = answer_row(&question.id, remote);
        self.store.upsert_answer(&answer)?;
        Ok(answer)
    }

    /// Upload a publicly reachable photo or video to the profile
    #[instrument(skip(self))]
    pub async fn upload_media(
        &self,
        location_id: &str,
        source_url: &str,
        kind: MediaKind,
        category: &str,
    ) -> Result<MediaAsset, IntegrationError> {
        if let MediaClass::Unreachable(reason) = classify(source_url, &[]) {
            return Err(IntegrationError::Permanent(reason));
        }

        let (location, credential, address) = self.context(location_id).await?;
        let remote = self
            .api
            .upload_media(&credential, &address, source_url, kind, category)
            .await?;

        let asset = media_row(&location.id, remote);
        self.store.upsert_media_asset(&asset)?;
        info!(external_id = %asset.external_id, "Uploaded media");

        // Re-read so a pre-existing row's local id is returned
        let stored = self
            .store
            .media_for_location(&location.id)?
            .into_iter()
            .find(|m| m.external_id == asset.external_id);
        Ok(stored.unwrap_or(asset))
    }

    /// Delete media upstream first; "already gone" counts as deleted
    #[instrument(skip(self))]
    pub async fn delete_media(&self, media_id: &str) -> Result<(), IntegrationError> {
        let asset = self
            .store
            .get_media_asset(media_id)?
            .ok_or_else(|| IntegrationError::unknown("media", media_id))?;
        let (location, _) = self.load(&asset.location_id)?;
        let credential = self.resolver.resolve(&location, Platform::Google).await?;

        match self.api.delete_media(&credential, &asset.external_id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!(external_id = %asset.external_id, "Media already gone upstream");
            }
            Err(e) => return Err(e),
        }

        self.store.delete_media_asset(media_id)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Class implementations
    // ------------------------------------------------------------------

    async fn reviews_with(
        &self,
        location: &Location,
        credential: &Credential,
        address: &LocationAddress,
    ) -> Result<SyncCounts, IntegrationError> {
        let remote = self.api.list_reviews(credential, address).await?;
        let mut counts = SyncCounts::default();

        for r in remote {
            let replied = r.reply_text.as_deref().is_some_and(|t| !t.trim().is_empty());
            let review = Review {
                id: Uuid::new_v4().to_string(),
                location_id: location.id.clone(),
                external_id: r.name,
                reviewer_name: r.reviewer_name,
                rating: r.rating,
                comment: r.comment,
                reviewed_at: r.created_at,
                reply_text: r.reply_text,
                replied_at: r.replied_at,
                reply_source: replied.then_some(ReplySource::External),
                internal_note: None,
            };
            counts.record(self.store.upsert_review(&review)?);
        }

        Ok(counts)
    }

    /// Reconcile local posts: stored result id first, then exact body match
    /// against dispatched items still missing a Google id
    async fn posts_with(
        &self,
        location: &Location,
        credential: &Credential,
        address: &LocationAddress,
    ) -> Result<SyncCounts, IntegrationError> {
        let remote = self.api.list_posts(credential, address).await?;
        let mut items = self.store.content_items_for_location(&location.id)?;
        let mut counts = SyncCounts::default();

        for post in remote {
            if items
                .iter()
                .any(|i| i.external_id(Platform::Google) == Some(post.name.as_str()))
            {
                counts.updated += 1;
                continue;
            }

            let body = post.summary.clone().unwrap_or_default();
            if let Some(item) = items.iter_mut().find(|i| adopts_post(i, &body)) {
                item.results
                    .insert(Platform::Google, PlatformResult::Published(post.name.clone()));
                self.store.save_content_item(item)?;
                counts.updated += 1;
                continue;
            }

            let item = mirrored_post(&location.id, post);
            self.store.save_content_item(&item)?;
            items.push(item);
            counts.inserted += 1;
        }

        Ok(counts)
    }

    async fn media_with(
        &self,
        location: &Location,
        credential: &Credential,
        address: &LocationAddress,
    ) -> Result<SyncCounts, IntegrationError> {
        let remote = self.api.list_media(credential, address).await?;
        let mut counts = SyncCounts::default();
        for m in remote {
            counts.record(self.store.upsert_media_asset(&media_row(&location.id, m))?);
        }
        Ok(counts)
    }

    async fn questions_with(
        &self,
        location: &Location,
        credential: &Credential,
        address: &LocationAddress,
    ) -> Result<SyncCounts, IntegrationError> {
        let remote = self.api.list_questions(credential, address).await?;
        let mut counts = SyncCounts::default();

        for q in remote {
            let question = Question {
                id: Uuid::new_v4().to_string(),
                location_id: location.id.clone(),
                external_id: q.name,
                text: q.text,
                author: q.author,
                upvote_count: q.upvote_count,
                asked_at: q.created_at,
                internal_note: None,
            };
            let (outcome, question_id) = self.store.upsert_question(&question)?;
            counts.record(outcome);

            for a in q.answers {
                counts.record(self.store.upsert_answer(&answer_row(&question_id, a))?);
            }
        }

        Ok(counts)
    }

    async fn metrics_with(
        &self,
        location: &Location,
        credential: &Credential,
    ) -> Result<SyncCounts, IntegrationError> {
        let profile_id = location
            .external_profile_id
            .as_deref()
            .ok_or_else(|| IntegrationError::NotLinked(location.id.clone()))?;

        // Window ends yesterday; today's counters are still moving
        let end = Utc::now().date_naive() - Duration::days(1);
        let start = end - Duration::days(self.settings.metrics_window_days.max(1) - 1);

        let series = self
            .api
            .fetch_metrics(
                credential,
                &crate::adapters::plain_location(profile_id),
                &DAILY_METRICS,
                start,
                end,
            )
            .await?;

        let mut counts = SyncCounts::default();
        for day in pivot(&location.id, &series) {
            counts.record(self.store.upsert_metric_day(&day)?);
        }
        Ok(counts)
    }

    async fn profile_with(
        &self,
        location: &Location,
        credential: &Credential,
    ) -> Result<Value, IntegrationError> {
        let profile_id = location
            .external_profile_id
            .as_deref()
            .ok_or_else(|| IntegrationError::NotLinked(location.id.clone()))?;

        let profile = self
            .api
            .get_location(
                credential,
                &crate::adapters::plain_location(profile_id),
                PROFILE_READ_MASK,
            )
            .await?;
        self.replace_profile(location, &profile)?;
        Ok(profile)
    }

    /// Wholesale replacement; display fields come only from `profile`
    fn replace_profile(&self, location: &Location, profile: &Value) -> Result<(), IntegrationError> {
        let display = DisplayFields::from_profile(profile);
        self.store
            .save_profile(&location.id, profile, Utc::now(), &display)?;
        Ok(())
    }
}

fn media_row(location_id: &str, m: crate::adapters::RemoteMedia) -> MediaAsset {
    MediaAsset {
        id: Uuid::new_v4().to_string(),
        location_id: location_id.to_string(),
        external_id: m.name,
        url: m.url,
        thumbnail_url: m.thumbnail_url,
        format: m.format,
        category: m.category,
        view_count: m.view_count,
        created_at: m.created_at,
        local_label: None,
    }
}

fn answer_row(question_id: &str, a: RemoteAnswer) -> Answer {
    Answer {
        id: Uuid::new_v4().to_string(),
        question_id: question_id.to_string(),
        external_id: a.name,
        text: a.text,
        author: a.author,
        author_type: a.author_type,
        answered_at: a.created_at,
    }
}

/// Body fallback: only a dispatched Google item not yet bound to a post
fn adopts_post(item: &ContentItem, body: &str) -> bool {
    item.body == body
        && item.targets.contains(&Platform::Google)
        && item.status.is_terminal()
        && item.external_id(Platform::Google).is_none()
}

/// A post created outside this system, recorded as already published
fn mirrored_post(location_id: &str, post: RemotePost) -> ContentItem {
    let created_at = post.created_at.unwrap_or_else(Utc::now);
    let mut item = ContentItem::draft(
        location_id,
        post.summary.unwrap_or_default(),
        [Platform::Google],
    );
    if let Some(url) = post.media_url {
        item = item.with_media(MediaRef::image(url));
    }
    item.status = ContentStatus::Published;
    item.results
        .insert(Platform::Google, PlatformResult::Published(post.name));
    item.created_at = created_at;
    item.published_at = Some(created_at);
    item
}

//! Publish orchestrator: fan one content item out to its target platforms.
//!
//! Credentials are resolved per target before anything is sent. Dispatches
//! run concurrently and each one owns its slot in the result map; the
//! aggregate status, results and reason are committed once after every
//! dispatch has settled.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, instrument, warn};

use super::credentials::CredentialResolver;
use super::media::{MediaResolver, ResolvedMedia};
use super::text_limit::fit_text;
use crate::adapters::{PlatformAdapter, PublishRequest, TextGenerator, TextGeneratorSource};
use crate::domain::{ContentItem, ContentStatus, Credential, Location, Platform, PlatformResult};
use crate::error::{IntegrationError, NO_CREDENTIAL_MESSAGE};
use crate::store::Store;

pub struct PublishOrchestrator {
    store: Arc<Store>,
    resolver: Arc<CredentialResolver>,
    adapters: BTreeMap<Platform, Arc<dyn PlatformAdapter>>,
    media: MediaResolver,
    text: Arc<dyn TextGeneratorSource>,
}

/// One target that passed credential resolution
struct Dispatch {
    platform: Platform,
    adapter: Arc<dyn PlatformAdapter>,
    credential: Credential,
}

impl PublishOrchestrator {
    pub fn new(
        store: Arc<Store>,
        resolver: Arc<CredentialResolver>,
        adapters: impl IntoIterator<Item = Arc<dyn PlatformAdapter>>,
        media: MediaResolver,
        text: Arc<dyn TextGeneratorSource>,
    ) -> Self {
        Self {
            store,
            resolver,
            adapters: adapters.into_iter().map(|a| (a.platform(), a)).collect(),
            media,
            text,
        }
    }

    fn load(&self, item_id: &str) -> Result<(ContentItem, Location), IntegrationError> {
        let item = self
            .store
            .get_content_item(item_id)?
            .ok_or_else(|| IntegrationError::unknown("content item", item_id))?;
        let location = self
            .store
            .get_location(&item.location_id)?
            .ok_or_else(|| IntegrationError::unknown("location", &item.location_id))?;
        Ok((item, location))
    }

    /// Dispatch the item to every target platform once and commit the outcome
    #[instrument(skip(self))]
    pub async fn publish(&self, item_id: &str) -> Result<ContentStatus, IntegrationError> {
        let (item, location) = self.load(item_id)?;
        let mut results: BTreeMap<Platform, PlatformResult> = BTreeMap::new();
        let mut dispatches = Vec::new();
        let mut missing_credentials = 0usize;

        for &platform in &item.targets {
            let Some(adapter) = self.adapters.get(&platform) else {
                results.insert(
                    platform,
                    PlatformResult::Error(format!("{} is not configured", platform)),
                );
                continue;
            };

            match self.resolver.resolve(&location, platform).await {
                Ok(credential) => dispatches.push(Dispatch {
                    platform,
                    adapter: Arc::clone(adapter),
                    credential,
                }),
                Err(IntegrationError::Store(e)) => return Err(IntegrationError::Store(e)),
                Err(e) if e.is_no_credential() => {
                    missing_credentials += 1;
                    results.insert(
                        platform,
                        PlatformResult::Error(NO_CREDENTIAL_MESSAGE.to_string()),
                    );
                }
                Err(e) => {
                    results.insert(platform, PlatformResult::Error(e.detail()));
                }
            }
        }

        let dispatched = !dispatches.is_empty();
        if dispatched {
            let settled = self.dispatch_all(&item, &location, dispatches).await?;
            results.extend(settled);
        }

        let status = ContentStatus::aggregate(results.values());
        let reason = (!dispatched && missing_credentials > 0).then_some(NO_CREDENTIAL_MESSAGE);
        let published_at = results
            .values()
            .any(PlatformResult::is_success)
            .then(Utc::now);

        self.store
            .commit_dispatch(&item.id, status, &results, reason, published_at)?;

        match status {
            ContentStatus::Published => info!(%status, "Content published"),
            _ => warn!(%status, reason = reason.unwrap_or(""), "Content not fully published"),
        }
        Ok(status)
    }

    async fn dispatch_all(
        &self,
        item: &ContentItem,
        location: &Location,
        dispatches: Vec<Dispatch>,
    ) -> Result<Vec<(Platform, PlatformResult)>, IntegrationError> {
        // Resolved once; only needed when some target pulls media by URL
        let resolved = match &item.media {
            Some(media) if dispatches.iter().any(|d| d.adapter.requires_public_media()) => {
                Some(self.media.resolve(media).await)
            }
            _ => None,
        };

        let organization_key = match &location.organization_id {
            Some(org) => self.store.text_generation_key(org)?,
            None => None,
        };
        let generator = self.text.for_key(organization_key.as_deref());

        let futures = dispatches.into_iter().map(|dispatch| {
            let resolved = resolved.as_ref();
            let generator = generator.as_deref();
            async move {
                let platform = dispatch.platform;
                let result = dispatch_one(item, location, resolved, generator, dispatch).await;
                match &result {
                    PlatformResult::Published(id) => info!(%platform, external_id = %id, "Dispatched"),
                    PlatformResult::Error(detail) => warn!(%platform, %detail, "Dispatch failed"),
                }
                (platform, result)
            }
        });

        Ok(join_all(futures).await)
    }

    /// Remove published copies upstream, then the local item.
    ///
    /// Upstream "not found" counts as removed; any other upstream error
    /// leaves the local item in place.
    #[instrument(skip(self))]
    pub async fn delete(&self, item_id: &str) -> Result<(), IntegrationError> {
        let (item, location) = self.load(item_id)?;

        let mut published = Vec::new();
        for (&platform, result) in &item.results {
            let PlatformResult::Published(external_id) = result else {
                continue;
            };
            let adapter = self.adapters.get(&platform).ok_or_else(|| {
                IntegrationError::Permanent(format!("{} is not configured", platform))
            })?;
            // Checked up front so no copy is removed when another must stay
            if !adapter.supports_delete() {
                warn!(%platform, %external_id, "Upstream copy cannot be deleted; keeping item");
                return Err(IntegrationError::Permanent(format!(
                    "{} posts cannot be deleted remotely",
                    platform
                )));
            }
            published.push((platform, external_id, adapter));
        }

        for (platform, external_id, adapter) in published {
            let credential = self.resolver.resolve(&location, platform).await?;

            match adapter.delete(external_id, &credential).await {
                Ok(()) => info!(%platform, %external_id, "Deleted upstream copy"),
                Err(e) if e.is_not_found() => {
                    info!(%platform, %external_id, "Upstream copy already gone")
                }
                Err(e) => {
                    warn!(%platform, %external_id, error = %e, "Upstream delete failed; keeping item");
                    return Err(e);
                }
            }
        }

        self.store.delete_content_item(&item.id)?;
        info!("Content item deleted");
        Ok(())
    }
}

async fn dispatch_one(
    item: &ContentItem,
    location: &Location,
    resolved: Option<&ResolvedMedia>,
    generator: Option<&dyn TextGenerator>,
    dispatch: Dispatch,
) -> PlatformResult {
    let adapter = dispatch.adapter.as_ref();

    let media = match (&item.media, resolved) {
        (None, _) => None,
        (Some(original), _) if !adapter.requires_public_media() => Some(original.clone()),
        (Some(_), Some(ResolvedMedia::Public(public))) => Some(public.clone()),
        (Some(_), Some(ResolvedMedia::Unreachable(reason))) => {
            return PlatformResult::Error(reason.clone())
        }
        (Some(original), None) => Some(original.clone()),
    };

    let link = media
        .as_ref()
        .filter(|m| adapter.media_link_in_text(m))
        .map(|m| m.url.clone());
    let text = fit_text(&item.body, adapter.char_limit(), link.as_deref(), generator).await;

    let request = PublishRequest {
        location,
        text: &text,
        media: if link.is_some() { None } else { media.as_ref() },
    };

    match adapter.publish(request, &dispatch.credential).await {
        Ok(external_id) => PlatformResult::Published(external_id),
        Err(e) => PlatformResult::Error(e.detail()),
    }
}

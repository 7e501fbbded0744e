//! Wiring of the core components around one store and one set of adapters.

use std::sync::Arc;

use chrono::Duration;

use super::auto_reply::AutoReplier;
use super::connect::ConnectFlow;
use super::credentials::CredentialResolver;
use super::media::MediaResolver;
use super::publish::PublishOrchestrator;
use super::sync::SyncEngine;
use crate::adapters::{
    AssetFetcher, BusinessProfileClient, FacebookAdapter, HttpFetcher, HttpImageHost, ImageHost,
    InstagramAdapter, LocalPostAdapter, OAuthClient, OpenAiSource, PlatformAdapter, ProfileApi,
    TextGeneratorSource, TokenRefresher, YouTubeAdapter,
};
use crate::config::Settings;
use crate::error::IntegrationError;
use crate::store::Store;

/// External collaborators the core talks to
pub struct Integrations {
    pub profile_api: Arc<dyn ProfileApi>,
    pub platforms: Vec<Arc<dyn PlatformAdapter>>,
    pub token_refresher: Arc<dyn TokenRefresher>,
    pub text_generation: Arc<dyn TextGeneratorSource>,
    pub image_hosts: Vec<Arc<dyn ImageHost>>,
    pub fetcher: Arc<dyn AssetFetcher>,
}

impl Integrations {
    /// Production HTTP clients built from settings
    pub fn http(settings: &Settings) -> Result<Self, IntegrationError> {
        let profile_api: Arc<dyn ProfileApi> =
            Arc::new(BusinessProfileClient::from_settings(settings)?);
        let fetcher: Arc<dyn AssetFetcher> = Arc::new(HttpFetcher::from_settings(settings)?);

        let platforms: Vec<Arc<dyn PlatformAdapter>> = vec![
            Arc::new(LocalPostAdapter::new(Arc::clone(&profile_api))),
            Arc::new(FacebookAdapter::from_settings(settings)?),
            Arc::new(InstagramAdapter::from_settings(settings)?),
            Arc::new(YouTubeAdapter::from_settings(settings, Arc::clone(&fetcher))?),
        ];

        let image_hosts = HttpImageHost::from_settings(settings)?
            .into_iter()
            .map(|h| Arc::new(h) as Arc<dyn ImageHost>)
            .collect();

        Ok(Self {
            profile_api,
            platforms,
            token_refresher: Arc::new(OAuthClient::from_settings(settings)?),
            text_generation: Arc::new(OpenAiSource::from_settings(settings)?),
            image_hosts,
            fetcher,
        })
    }
}

/// The four core components sharing one store and one credential resolver
pub struct Orchestrator {
    store: Arc<Store>,
    resolver: Arc<CredentialResolver>,
    sync: SyncEngine,
    publisher: PublishOrchestrator,
    auto_reply: AutoReplier,
    connect: ConnectFlow,
}

impl Orchestrator {
    pub fn new(store: Arc<Store>, integrations: Integrations, settings: &Settings) -> Self {
        let resolver = Arc::new(CredentialResolver::new(
            Arc::clone(&store),
            Arc::clone(&integrations.token_refresher),
            Duration::seconds(settings.credentials.expiry_skew_seconds),
        ));

        let sync = SyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&resolver),
            Arc::clone(&integrations.profile_api),
            settings.sync.clone(),
        );

        let media = MediaResolver::new(
            Arc::clone(&integrations.fetcher),
            integrations.image_hosts,
            settings.media.clone(),
        );
        let publisher = PublishOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&resolver),
            integrations.platforms,
            media,
            Arc::clone(&integrations.text_generation),
        );

        let auto_reply = AutoReplier::new(
            Arc::clone(&store),
            Arc::clone(&resolver),
            Arc::clone(&integrations.profile_api),
            Arc::clone(&integrations.text_generation),
            settings.auto_reply.per_cycle_cap,
        );

        let connect = ConnectFlow::new(
            Arc::clone(&store),
            integrations.token_refresher,
            Duration::seconds(settings.credentials.connect_state_ttl_seconds),
        );

        Self {
            store,
            resolver,
            sync,
            publisher,
            auto_reply,
            connect,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn resolver(&self) -> &CredentialResolver {
        &self.resolver
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    pub fn publisher(&self) -> &PublishOrchestrator {
        &self.publisher
    }

    pub fn auto_reply(&self) -> &AutoReplier {
        &self.auto_reply
    }

    pub fn connect(&self) -> &ConnectFlow {
        &self.connect
    }
}

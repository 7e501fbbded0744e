//! Adapter interfaces for external systems.
//!
//! Every external dependency sits behind an `async_trait` seam so the core
//! can run against HTTP clients in production and in-process fakes in tests:
//! - `ProfileApi`: the business-profile platform
//! - `PlatformAdapter`: one publish target per platform
//! - `TokenRefresher`: OAuth token endpoint
//! - `TextGenerator` / `TextGeneratorSource`: chat-completions text generation
//! - `ImageHost` / `AssetFetcher`: media re-hosting

pub mod business_profile;
pub mod facebook;
pub mod fetcher;
pub mod image_host;
pub mod instagram;
pub mod oauth;
pub mod text_generation;
pub mod youtube;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::domain::{Credential, Location, MediaKind, MediaRef, Platform};
use crate::error::IntegrationError;

pub use business_profile::{BusinessProfileClient, LocalPostAdapter};
pub use facebook::FacebookAdapter;
pub use fetcher::HttpFetcher;
pub use image_host::HttpImageHost;
pub use instagram::InstagramAdapter;
pub use oauth::OAuthClient;
pub use text_generation::{OpenAiSource, OpenAiTextGenerator};
pub use youtube::YouTubeAdapter;

pub type AdapterResult<T> = Result<T, IntegrationError>;

// ---------------------------------------------------------------------------
// Business-profile platform
// ---------------------------------------------------------------------------

/// Account-qualified address of a location ("accounts/1/locations/2").
///
/// The account segment is never stored; it is looked up from the
/// credential's accounts on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationAddress {
    pub account: String,
    pub location: String,
}

impl LocationAddress {
    pub fn new(account: impl Into<String>, profile_id: &str) -> Self {
        Self {
            account: account.into(),
            location: plain_location(profile_id),
        }
    }

    /// List the credential's accounts and splice the first with the profile id
    pub async fn resolve(
        api: &dyn ProfileApi,
        credential: &Credential,
        profile_id: &str,
    ) -> AdapterResult<Self> {
        let accounts = api.list_accounts(credential).await?;
        let account = accounts.into_iter().next().ok_or_else(|| {
            IntegrationError::Permanent("credential has no business accounts".to_string())
        })?;
        Ok(Self::new(account.name, profile_id))
    }

    pub fn composite(&self) -> String {
        format!("{}/{}", self.account, self.location)
    }

    pub fn plain(&self) -> &str {
        &self.location
    }
}

/// Normalize a stored profile id to "locations/{id}"
pub fn plain_location(profile_id: &str) -> String {
    let id = profile_id.trim().trim_matches('/');
    match id.rfind("locations/") {
        Some(idx) => id[idx..].to_string(),
        None => format!("locations/{}", id),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAccount {
    /// "accounts/{id}"
    pub name: String,
    pub account_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteReview {
    /// Full resource name, used as the external id
    pub name: String,
    pub reviewer_name: Option<String>,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub reply_text: Option<String>,
    pub replied_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemotePost {
    pub name: String,
    pub summary: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub media_url: Option<String>,
}

/// One metric's daily values over the requested range
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    pub metric: String,
    pub points: Vec<(NaiveDate, i64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteMedia {
    pub name: String,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub format: Option<String>,
    pub category: Option<String>,
    pub view_count: i64,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteQuestion {
    pub name: String,
    pub text: String,
    pub author: Option<String>,
    pub upvote_count: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub answers: Vec<RemoteAnswer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAnswer {
    pub name: String,
    pub text: String,
    pub author: Option<String>,
    pub author_type: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Business-profile REST surfaces
#[async_trait]
pub trait ProfileApi: Send + Sync {
    async fn list_accounts(&self, credential: &Credential) -> AdapterResult<Vec<RemoteAccount>>;

    /// Fetch the location resource restricted to `read_mask`
    async fn get_location(
        &self,
        credential: &Credential,
        location: &str,
        read_mask: &str,
    ) -> AdapterResult<Value>;

    /// Partial update; returns the updated resource
    async fn update_location(
        &self,
        credential: &Credential,
        location: &str,
        patch: &Value,
        update_mask: &str,
    ) -> AdapterResult<Value>;

    async fn list_reviews(
        &self,
        credential: &Credential,
        address: &LocationAddress,
    ) -> AdapterResult<Vec<RemoteReview>>;

    async fn reply_review(
        &self,
        credential: &Credential,
        review_name: &str,
        text: &str,
    ) -> AdapterResult<()>;

    async fn list_posts(
        &self,
        credential: &Credential,
        address: &LocationAddress,
    ) -> AdapterResult<Vec<RemotePost>>;

    async fn create_post(
        &self,
        credential: &Credential,
        address: &LocationAddress,
        text: &str,
        media: Option<&MediaRef>,
    ) -> AdapterResult<RemotePost>;

    async fn delete_post(&self, credential: &Credential, post_name: &str) -> AdapterResult<()>;

    /// Daily series for each metric over `[start, end]`
    async fn fetch_metrics(
        &self,
        credential: &Credential,
        location: &str,
        metrics: &[&str],
        start: NaiveDate,
        end: NaiveDate,
    ) -> AdapterResult<Vec<MetricSeries>>;

    async fn list_media(
        &self,
        credential: &Credential,
        address: &LocationAddress,
    ) -> AdapterResult<Vec<RemoteMedia>>;

    async fn upload_media(
        &self,
        credential: &Credential,
        address: &LocationAddress,
        source_url: &str,
        kind: MediaKind,
        category: &str,
    ) -> AdapterResult<RemoteMedia>;

    async fn delete_media(&self, credential: &Credential, media_name: &str) -> AdapterResult<()>;

    async fn list_questions(
        &self,
        credential: &Credential,
        address: &LocationAddress,
    ) -> AdapterResult<Vec<RemoteQuestion>>;

    async fn answer_question(
        &self,
        credential: &Credential,
        question_name: &str,
        text: &str,
    ) -> AdapterResult<RemoteAnswer>;
}

// ---------------------------------------------------------------------------
// Publish targets
// ---------------------------------------------------------------------------

/// What a platform adapter receives for one dispatch
#[derive(Debug, Clone, Copy)]
pub struct PublishRequest<'a> {
    pub location: &'a Location,
    pub text: &'a str,
    pub media: Option<&'a MediaRef>,
}

/// One publish target
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Maximum text length the platform accepts, if it enforces one
    fn char_limit(&self) -> Option<usize> {
        None
    }

    /// Whether the platform pulls media by URL (and so needs it public)
    fn requires_public_media(&self) -> bool {
        true
    }

    /// Whether the media URL is appended to the text instead of attached
    fn media_link_in_text(&self, _media: &MediaRef) -> bool {
        false
    }

    /// Whether published posts can be removed through the API
    fn supports_delete(&self) -> bool {
        true
    }

    /// Publish and return the platform's external id
    async fn publish(
        &self,
        request: PublishRequest<'_>,
        credential: &Credential,
    ) -> AdapterResult<String>;

    async fn delete(&self, external_id: &str, credential: &Credential) -> AdapterResult<()>;
}

// ---------------------------------------------------------------------------
// OAuth
// ---------------------------------------------------------------------------

/// Token set returned by a token endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Refresh-token grant
    async fn refresh(&self, platform: Platform, refresh_token: &str) -> AdapterResult<TokenGrant>;

    /// Authorization-code exchange at the end of the connect flow
    async fn exchange_code(&self, platform: Platform, code: &str) -> AdapterResult<TokenGrant>;

    /// Consent-screen URL carrying `state`
    fn authorization_url(&self, platform: Platform, state: &str) -> AdapterResult<String>;
}

// ---------------------------------------------------------------------------
// Text generation and media
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, user: &str) -> AdapterResult<String>;
}

/// Picks a text generator for an organization (its own key, else the default)
pub trait TextGeneratorSource: Send + Sync {
    fn for_key(&self, organization_key: Option<&str>) -> Option<Arc<dyn TextGenerator>>;
}

/// Accepts base64 image data and returns a public URL
#[async_trait]
pub trait ImageHost: Send + Sync {
    fn name(&self) -> &str;

    async fn upload(&self, base64_image: &str) -> AdapterResult<String>;
}

#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> AdapterResult<Vec<u8>>;
}

/// Map a non-success response to an `IntegrationError`
pub(crate) async fn check_status(response: reqwest::Response) -> AdapterResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(IntegrationError::from_status(status.as_u16(), body))
}

/// Build an HTTP client with the configured per-call timeout
pub(crate) fn http_client(timeout: std::time::Duration) -> AdapterResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| IntegrationError::Permanent(format!("Failed to build HTTP client: {}", e)))
}

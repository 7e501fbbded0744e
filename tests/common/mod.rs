//! In-process fakes for the adapter traits plus store seeding helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::{json, Value};

use locsync::adapters::{
    AdapterResult, AssetFetcher, ImageHost, LocationAddress, MetricSeries, PlatformAdapter,
    ProfileApi, PublishRequest, RemoteAccount, RemoteAnswer, RemoteMedia, RemotePost,
    RemoteQuestion, RemoteReview, TextGenerator, TextGeneratorSource, TokenGrant, TokenRefresher,
};
use locsync::config::Settings;
use locsync::core::{Integrations, Orchestrator};
use locsync::domain::{Credential, Identity, Location, MediaKind, MediaRef, Platform};
use locsync::error::IntegrationError;
use locsync::store::Store;

/// Call counter keyed by method name
#[derive(Default)]
pub struct Calls(Mutex<HashMap<&'static str, usize>>);

impl Calls {
    pub fn hit(&self, name: &'static str) {
        *self.0.lock().unwrap().entry(name).or_default() += 1;
    }

    pub fn count(&self, name: &str) -> usize {
        self.0.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.lock().unwrap().values().sum()
    }
}

// ---------------------------------------------------------------------------
// Business profile
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeProfileApi {
    pub calls: Calls,
    pub fail_accounts: Mutex<bool>,
    pub profile: Mutex<Value>,
    pub reviews: Mutex<Vec<RemoteReview>>,
    pub posts: Mutex<Vec<RemotePost>>,
    pub metrics: Mutex<Vec<MetricSeries>>,
    pub media: Mutex<Vec<RemoteMedia>>,
    pub questions: Mutex<Vec<RemoteQuestion>>,
    /// HTTP status returned by delete_media/delete_post (0 = success)
    pub delete_status: Mutex<u16>,
    pub replies: Mutex<Vec<(String, String)>>,
    /// Access tokens seen by list_accounts, in call order
    pub tokens_seen: Mutex<Vec<String>>,
}

impl FakeProfileApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn deletion(&self) -> AdapterResult<()> {
        match *self.delete_status.lock().unwrap() {
            0 => Ok(()),
            status => Err(IntegrationError::from_status(status, "delete rejected")),
        }
    }
}

#[async_trait]
impl ProfileApi for FakeProfileApi {
    async fn list_accounts(&self, credential: &Credential) -> AdapterResult<Vec<RemoteAccount>> {
        self.calls.hit("list_accounts");
        self.tokens_seen
            .lock()
            .unwrap()
            .push(credential.access_token.clone());
        if *self.fail_accounts.lock().unwrap() {
            return Err(IntegrationError::from_status(403, "accounts forbidden"));
        }
        Ok(vec![RemoteAccount {
            name: "accounts/100".to_string(),
            account_name: Some("Owner".to_string()),
        }])
    }

    async fn get_location(
        &self,
        _credential: &Credential,
        _location: &str,
        _read_mask: &str,
    ) -> AdapterResult<Value> {
        self.calls.hit("get_location");
        Ok(self.profile.lock().unwrap().clone())
    }

    async fn update_location(
        &self,
        _credential: &Credential,
        _location: &str,
        patch: &Value,
        _update_mask: &str,
    ) -> AdapterResult<Value> {
        self.calls.hit("update_location");
        let mut profile = self.profile.lock().unwrap();
        if let (Some(target), Some(fields)) = (profile.as_object_mut(), patch.as_object()) {
            for (k, v) in fields {
                target.insert(k.clone(), v.clone());
            }
        }
        Ok(profile.clone())
    }

    async fn list_reviews(
        &self,
        _credential: &Credential,
        _address: &LocationAddress,
    ) -> AdapterResult<Vec<RemoteReview>> {
        self.calls.hit("list_reviews");
        Ok(self.reviews.lock().unwrap().clone())
    }

    async fn reply_review(
        &self,
        _credential: &Credential,
        review_name: &str,
        text: &str,
    ) -> AdapterResult<()> {
        self.calls.hit("reply_review");
        self.replies
            .lock()
            .unwrap()
            .push((review_name.to_string(), text.to_string()));
        Ok(())
    }

    async fn list_posts(
        &self,
        _credential: &Credential,
        _address: &LocationAddress,
    ) -> AdapterResult<Vec<RemotePost>> {
        self.calls.hit("list_posts");
        Ok(self.posts.lock().unwrap().clone())
    }

    async fn create_post(
        &self,
        _credential: &Credential,
        address: &LocationAddress,
        text: &str,
        media: Option<&MediaRef>,
    ) -> AdapterResult<RemotePost> {
        self.calls.hit("create_post");
        let mut posts = self.posts.lock().unwrap();
        let post = RemotePost {
            name: format!("{}/localPosts/{}", address.composite(), posts.len() + 1),
            summary: Some(text.to_string()),
            created_at: Some(Utc::now()),
            media_url: media.map(|m| m.url.clone()),
        };
        posts.push(post.clone());
        Ok(post)
    }

    async fn delete_post(&self, _credential: &Credential, _post_name: &str) -> AdapterResult<()> {
        self.calls.hit("delete_post");
        self.deletion()
    }

    async fn fetch_metrics(
        &self,
        _credential: &Credential,
        _location: &str,
        _metrics: &[&str],
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> AdapterResult<Vec<MetricSeries>> {
        self.calls.hit("fetch_metrics");
        Ok(self.metrics.lock().unwrap().clone())
    }

    async fn list_media(
        &self,
        _credential: &Credential,
        _address: &LocationAddress,
    ) -> AdapterResult<Vec<RemoteMedia>> {
        self.calls.hit("list_media");
        Ok(self.media.lock().unwrap().clone())
    }

    async fn upload_media(
        &self,
        _credential: &Credential,
        address: &LocationAddress,
        source_url: &str,
        kind: MediaKind,
        category: &str,
    ) -> AdapterResult<RemoteMedia> {
        self.calls.hit("upload_media");
        let mut media = self.media.lock().unwrap();
        let item = remote_media(
            &format!("{}/media/{}", address.composite(), media.len() + 1),
            source_url,
            0,
        );
        let item = RemoteMedia {
            format: Some(
                match kind {
                    MediaKind::Image => "PHOTO",
                    MediaKind::Video => "VIDEO",
                }
                .to_string(),
            ),
            category: Some(category.to_string()),
            ..item
        };
        media.push(item.clone());
        Ok(item)
    }

    async fn delete_media(&self, _credential: &Credential, _media_name: &str) -> AdapterResult<()> {
        self.calls.hit("delete_media");
        self.deletion()
    }

    async fn list_questions(
        &self,
        _credential: &Credential,
        _address: &LocationAddress,
    ) -> AdapterResult<Vec<RemoteQuestion>> {
        self.calls.hit("list_questions");
        Ok(self.questions.lock().unwrap().clone())
    }

    async fn answer_question(
        &self,
        _credential: &Credential,
        question_name: &str,
        text: &str,
    ) -> AdapterResult<RemoteAnswer> {
        self.calls.hit("answer_question");
        Ok(RemoteAnswer {
            name: format!("{}/answers/merchant", question_name),
            text: text.to_string(),
            author: Some("Owner".to_string()),
            author_type: Some("MERCHANT".to_string()),
            created_at: Some(Utc::now()),
        })
    }
}

pub fn remote_review(name: &str, rating: u8, reply: Option<&str>) -> RemoteReview {
    RemoteReview {
        name: name.to_string(),
        reviewer_name: Some("Dana".to_string()),
        rating,
        comment: Some("Lovely coffee".to_string()),
        created_at: Some(Utc::now() - Duration::days(2)),
        reply_text: reply.map(str::to_string),
        replied_at: reply.map(|_| Utc::now() - Duration::days(1)),
    }
}

pub fn remote_media(name: &str, url: &str, views: i64) -> RemoteMedia {
    RemoteMedia {
        name: name.to_string(),
        url: Some(url.to_string()),
        thumbnail_url: None,
        format: Some("PHOTO".to_string()),
        category: Some("ADDITIONAL".to_string()),
        view_count: views,
        created_at: None,
    }
}

pub fn remote_question(name: &str, text: &str, answers: Vec<RemoteAnswer>) -> RemoteQuestion {
    RemoteQuestion {
        name: name.to_string(),
        text: text.to_string(),
        author: Some("Sam".to_string()),
        upvote_count: 1,
        created_at: None,
        answers,
    }
}

pub fn sample_profile(title: &str) -> Value {
    json!({
        "name": "locations/1",
        "title": title,
        "websiteUri": "https://example.com",
        "phoneNumbers": { "primaryPhone": "+1 555 0100" },
    })
}

// ---------------------------------------------------------------------------
// Publish targets
// ---------------------------------------------------------------------------

pub struct FakeAdapter {
    platform: Platform,
    outcome: Result<String, String>,
    limit: Option<usize>,
    public_media: bool,
    delete_status: u16,
    deletable: bool,
    pub publishes: AtomicUsize,
    pub deletes: AtomicUsize,
    pub last_text: Mutex<Option<String>>,
    pub last_media: Mutex<Option<MediaRef>>,
}

impl FakeAdapter {
    /// Adapter that returns `external_id` on every publish
    pub fn succeeding(platform: Platform, external_id: &str) -> Self {
        Self::with_outcome(platform, Ok(external_id.to_string()))
    }

    /// Adapter that fails every publish with `detail`
    pub fn failing(platform: Platform, detail: &str) -> Self {
        Self::with_outcome(platform, Err(detail.to_string()))
    }

    fn with_outcome(platform: Platform, outcome: Result<String, String>) -> Self {
        Self {
            platform,
            outcome,
            limit: None,
            public_media: true,
            delete_status: 0,
            deletable: true,
            publishes: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            last_text: Mutex::new(None),
            last_media: Mutex::new(None),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_delete_status(mut self, status: u16) -> Self {
        self.delete_status = status;
        self
    }

    /// Platform whose posts cannot be removed once published
    pub fn undeletable(mut self) -> Self {
        self.deletable = false;
        self
    }

    pub fn publish_count(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformAdapter for FakeAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn char_limit(&self) -> Option<usize> {
        self.limit
    }

    fn requires_public_media(&self) -> bool {
        self.public_media
    }

    fn supports_delete(&self) -> bool {
        self.deletable
    }

    async fn publish(
        &self,
        request: PublishRequest<'_>,
        _credential: &Credential,
    ) -> AdapterResult<String> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        *self.last_text.lock().unwrap() = Some(request.text.to_string());
        *self.last_media.lock().unwrap() = request.media.cloned();
        self.outcome
            .clone()
            .map_err(IntegrationError::Permanent)
    }

    async fn delete(&self, _external_id: &str, _credential: &Credential) -> AdapterResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        match self.delete_status {
            0 => Ok(()),
            status => Err(IntegrationError::from_status(status, "delete rejected")),
        }
    }
}

// ---------------------------------------------------------------------------
// OAuth, text generation, media
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeRefresher {
    pub refreshes: AtomicUsize,
    pub exchanges: AtomicUsize,
    /// Refresh tokens that the endpoint rejects
    pub rejected: Mutex<Vec<String>>,
}

impl FakeRefresher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject(&self, refresh_token: &str) {
        self.rejected.lock().unwrap().push(refresh_token.to_string());
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for FakeRefresher {
    async fn refresh(&self, _platform: Platform, refresh_token: &str) -> AdapterResult<TokenGrant> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.rejected.lock().unwrap().iter().any(|t| t == refresh_token) {
            return Err(IntegrationError::from_status(400, "invalid_grant"));
        }
        Ok(TokenGrant {
            access_token: format!("refreshed-{}", refresh_token),
            refresh_token: None,
            expires_at: Some(Utc::now() + Duration::hours(1)),
            scope: None,
        })
    }

    async fn exchange_code(&self, _platform: Platform, code: &str) -> AdapterResult<TokenGrant> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        Ok(TokenGrant {
            access_token: format!("access-for-{}", code),
            refresh_token: Some(format!("refresh-for-{}", code)),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            scope: Some("business.manage".to_string()),
        })
    }

    fn authorization_url(&self, platform: Platform, state: &str) -> AdapterResult<String> {
        Ok(format!("https://auth.test/{}?state={}", platform, state))
    }
}

/// Generator echoing a fixed reply, recording prompts
#[derive(Default)]
pub struct FakeGenerator {
    pub reply: String,
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, _system: &str, user: &str) -> AdapterResult<String> {
        self.prompts.lock().unwrap().push(user.to_string());
        Ok(self.reply.clone())
    }
}

/// Source handing out one generator, or none at all
pub struct FakeTextSource {
    pub generator: Option<Arc<FakeGenerator>>,
    pub keys_seen: Mutex<Vec<Option<String>>>,
}

impl FakeTextSource {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            generator: Some(Arc::new(FakeGenerator {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            })),
            keys_seen: Mutex::new(Vec::new()),
        })
    }

    pub fn none() -> Arc<Self> {
        Arc::new(Self {
            generator: None,
            keys_seen: Mutex::new(Vec::new()),
        })
    }
}

impl TextGeneratorSource for FakeTextSource {
    fn for_key(&self, organization_key: Option<&str>) -> Option<Arc<dyn TextGenerator>> {
        self.keys_seen
            .lock()
            .unwrap()
            .push(organization_key.map(str::to_string));
        self.generator
            .clone()
            .map(|g| g as Arc<dyn TextGenerator>)
    }
}

pub struct FakeHost {
    name: String,
    result: Result<String, String>,
    pub uploads: AtomicUsize,
}

impl FakeHost {
    pub fn ok(name: &str, url: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            result: Ok(url.to_string()),
            uploads: AtomicUsize::new(0),
        })
    }

    pub fn down(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            result: Err("host unavailable".to_string()),
            uploads: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ImageHost for FakeHost {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, _base64_image: &str) -> AdapterResult<String> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        self.result
            .clone()
            .map_err(IntegrationError::TransientNetwork)
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    pub fetches: AtomicUsize,
}

#[async_trait]
impl AssetFetcher for FakeFetcher {
    async fn fetch(&self, _url: &str) -> AdapterResult<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Fakes handed to the orchestrator, kept for assertions
pub struct Harness {
    pub store: Arc<Store>,
    pub api: Arc<FakeProfileApi>,
    pub refresher: Arc<FakeRefresher>,
    pub text: Arc<FakeTextSource>,
    pub fetcher: Arc<FakeFetcher>,
    pub orchestrator: Orchestrator,
}

pub struct HarnessBuilder {
    adapters: Vec<Arc<dyn PlatformAdapter>>,
    hosts: Vec<Arc<dyn ImageHost>>,
    text: Arc<FakeTextSource>,
    settings: Settings,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
            hosts: Vec::new(),
            text: FakeTextSource::none(),
            settings: Settings::default(),
        }
    }

    pub fn adapter(mut self, adapter: Arc<FakeAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn host(mut self, host: Arc<FakeHost>) -> Self {
        self.hosts.push(host);
        self
    }

    pub fn text(mut self, text: Arc<FakeTextSource>) -> Self {
        self.text = text;
        self
    }

    pub fn settings(mut self, f: impl FnOnce(&mut Settings)) -> Self {
        f(&mut self.settings);
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let api = FakeProfileApi::new();
        let refresher = FakeRefresher::new();
        let fetcher = Arc::new(FakeFetcher::default());

        let integrations = Integrations {
            profile_api: api.clone(),
            platforms: self.adapters,
            token_refresher: refresher.clone(),
            text_generation: self.text.clone(),
            image_hosts: self.hosts,
            fetcher: fetcher.clone(),
        };
        let orchestrator = Orchestrator::new(Arc::clone(&store), integrations, &self.settings);

        Harness {
            store,
            api,
            refresher,
            text: self.text,
            fetcher,
            orchestrator,
        }
    }
}

impl Harness {
    /// Linked location "loc-1" in organization "org-1"
    pub fn seed_location(&self) -> Location {
        self.store.upsert_organization("org-1", "Acme", None).unwrap();
        let location =
            Location::new("loc-1", Some("org-1".to_string())).with_profile_id("locations/1");
        self.store.upsert_location(&location).unwrap();
        location
    }

    /// Identity assigned to loc-1
    pub fn assign(&self, identity_id: &str) {
        self.store
            .upsert_identity(&Identity {
                id: identity_id.to_string(),
                organization_id: None,
                email: None,
            })
            .unwrap();
        self.store.assign_identity("loc-1", identity_id).unwrap();
    }

    /// Identity belonging to org-1 but not assigned to any location
    pub fn org_member(&self, identity_id: &str) {
        self.store
            .upsert_identity(&Identity {
                id: identity_id.to_string(),
                organization_id: Some("org-1".to_string()),
                email: None,
            })
            .unwrap();
    }

    pub fn give_credential(
        &self,
        identity_id: &str,
        platform: Platform,
        token: &str,
        expires_at: Option<DateTime<Utc>>,
        refresh_token: Option<&str>,
    ) {
        self.store
            .upsert_credential(&Credential {
                identity_id: identity_id.to_string(),
                platform,
                access_token: token.to_string(),
                refresh_token: refresh_token.map(str::to_string),
                expires_at,
                scope: None,
                external_account_id: None,
            })
            .unwrap();
    }

    /// loc-1 with one identity holding live credentials for `platforms`
    pub fn connected(&self, platforms: &[Platform]) -> Location {
        let location = self.seed_location();
        self.assign("id-owner");
        for &platform in platforms {
            self.give_credential(
                "id-owner",
                platform,
                &format!("tok-{}", platform),
                Some(Utc::now() + Duration::hours(1)),
                None,
            );
        }
        location
    }
}

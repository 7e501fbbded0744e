//! Google Business Profile REST client.
//!
//! The platform is split over several hosts (account management, business
//! information, performance, Q&A, and the legacy v4 surface for reviews,
//! posts and media). Base URLs come from `EndpointSettings` so tests and
//! proxies can redirect them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    check_status, http_client, AdapterResult, LocationAddress, MetricSeries, PlatformAdapter,
    ProfileApi, PublishRequest, RemoteAccount, RemoteAnswer, RemoteMedia, RemotePost,
    RemoteQuestion, RemoteReview,
};
use crate::config::{EndpointSettings, Settings};
use crate::domain::{Credential, MediaKind, MediaRef, Platform};
use crate::error::IntegrationError;

/// Page size requested from list endpoints
const PAGE_SIZE: u32 = 50;

/// Local post summaries are capped at this many characters
pub const LOCAL_POST_CHAR_LIMIT: usize = 1500;

/// HTTP implementation of `ProfileApi`
pub struct BusinessProfileClient {
    client: reqwest::Client,
    endpoints: EndpointSettings,
}

impl BusinessProfileClient {
    pub fn new(client: reqwest::Client, endpoints: EndpointSettings) -> Self {
        Self { client, endpoints }
    }

    pub fn from_settings(settings: &Settings) -> AdapterResult<Self> {
        Ok(Self::new(
            http_client(settings.http.timeout())?,
            settings.endpoints.clone(),
        ))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        credential: &Credential,
        url: &str,
        query: &[(&str, String)],
    ) -> AdapterResult<T> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .bearer_auth(&credential.access_token)
            .query(query)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        credential: &Credential,
        body: &Value,
    ) -> AdapterResult<T> {
        let response = request
            .bearer_auth(&credential.access_token)
            .json(body)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn delete_resource(&self, credential: &Credential, url: &str) -> AdapterResult<()> {
        debug!(url, "DELETE");
        let response = self
            .client
            .delete(url)
            .bearer_auth(&credential.access_token)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Follow `nextPageToken` until exhausted
    async fn list_all<P, T>(
        &self,
        credential: &Credential,
        url: &str,
        extra: &[(&str, String)],
        mut split: impl FnMut(P) -> (Vec<T>, Option<String>),
    ) -> AdapterResult<Vec<T>>
    where
        P: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = extra.to_vec();
            query.push(("pageSize", PAGE_SIZE.to_string()));
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let page: P = self.get_json(credential, url, &query).await?;
            let (mut batch, next) = split(page);
            items.append(&mut batch);

            match next.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl ProfileApi for BusinessProfileClient {
    async fn list_accounts(&self, credential: &Credential) -> AdapterResult<Vec<RemoteAccount>> {
        let url = format!("{}/accounts", self.endpoints.account_management);
        self.list_all(credential, &url, &[], |page: AccountsPage| {
            let accounts = page
                .accounts
                .into_iter()
                .map(|a| RemoteAccount {
                    name: a.name,
                    account_name: a.account_name,
                })
                .collect();
            (accounts, page.next_page_token)
        })
        .await
    }

    async fn get_location(
        &self,
        credential: &Credential,
        location: &str,
        read_mask: &str,
    ) -> AdapterResult<Value> {
        let url = format!("{}/{}", self.endpoints.business_information, location);
        self.get_json(credential, &url, &[("readMask", read_mask.to_string())])
            .await
    }

    async fn update_location(
        &self,
        credential: &Credential,
        location: &str,
        patch: &Value,
        update_mask: &str,
    ) -> AdapterResult<Value> {
        let url = format!("{}/{}", self.endpoints.business_information, location);
        let request = self
            .client
            .patch(&url)
            .query(&[("updateMask", update_mask)]);
        self.send_json(request, credential, patch).await
    }

    async fn list_reviews(
        &self,
        credential: &Credential,
        address: &LocationAddress,
    ) -> AdapterResult<Vec<RemoteReview>> {
        let url = format!("{}/{}/reviews", self.endpoints.legacy_v4, address.composite());
        self.list_all(credential, &url, &[], |page: ReviewsPage| {
            let reviews = page.reviews.into_iter().map(RemoteReview::from).collect();
            (reviews, page.next_page_token)
        })
        .await
    }

    async fn reply_review(
        &self,
        credential: &Credential,
        review_name: &str,
        text: &str,
    ) -> AdapterResult<()> {
        let url = format!("{}/{}/reply", self.endpoints.legacy_v4, review_name);
        let _: Value = self
            .send_json(self.client.put(&url), credential, &json!({ "comment": text }))
            .await?;
        Ok(())
    }

    async fn list_posts(
        &self,
        credential: &Credential,
        address: &LocationAddress,
    ) -> AdapterResult<Vec<RemotePost>> {
        let url = format!("{}/{}/localPosts", self.endpoints.legacy_v4, address.composite());
        self.list_all(credential, &url, &[], |page: PostsPage| {
            let posts = page.local_posts.into_iter().map(RemotePost::from).collect();
            (posts, page.next_page_token)
        })
        .await
    }

    async fn create_post(
        &self,
        credential: &Credential,
        address: &LocationAddress,
        text: &str,
        media: Option<&MediaRef>,
    ) -> AdapterResult<RemotePost> {
        let url = format!("{}/{}/localPosts", self.endpoints.legacy_v4, address.composite());
        let mut body = json!({
            "languageCode": "en",
            "summary": text,
            "topicType": "STANDARD",
        });
        if let Some(media) = media {
            body["media"] = json!([{
                "mediaFormat": media_format(media.kind),
                "sourceUrl": media.url,
            }]);
        }

        let post: LocalPostJson = self
            .send_json(self.client.post(&url), credential, &body)
            .await?;
        Ok(post.into())
    }

    async fn delete_post(&self, credential: &Credential, post_name: &str) -> AdapterResult<()> {
        let url = format!("{}/{}", self.endpoints.legacy_v4, post_name);
        self.delete_resource(credential, &url).await
    }

    async fn fetch_metrics(
        &self,
        credential: &Credential,
        location: &str,
        metrics: &[&str],
        start: NaiveDate,
        end: NaiveDate,
    ) -> AdapterResult<Vec<MetricSeries>> {
        use chrono::Datelike;

        let url = format!(
            "{}/{}:fetchMultiDailyMetricsTimeSeries",
            self.endpoints.performance, location
        );
        let mut query: Vec<(&str, String)> = metrics
            .iter()
            .map(|m| ("dailyMetrics", m.to_string()))
            .collect();
        query.extend([
            ("dailyRange.start_date.year", start.year().to_string()),
            ("dailyRange.start_date.month", start.month().to_string()),
            ("dailyRange.start_date.day", start.day().to_string()),
            ("dailyRange.end_date.year", end.year().to_string()),
            ("dailyRange.end_date.month", end.month().to_string()),
            ("dailyRange.end_date.day", end.day().to_string()),
        ]);

        let response: MultiMetricsJson = self.get_json(credential, &url, &query).await?;
        Ok(response.into_series())
    }

    async fn list_media(
        &self,
        credential: &Credential,
        address: &LocationAddress,
    ) -> AdapterResult<Vec<RemoteMedia>> {
        let url = format!("{}/{}/media", self.endpoints.legacy_v4, address.composite());
        self.list_all(credential, &url, &[], |page: MediaPage| {
            let media = page.media_items.into_iter().map(RemoteMedia::from).collect();
            (media, page.next_page_token)
        })
        .await
    }

    async fn upload_media(
        &self,
        credential: &Credential,
        address: &LocationAddress,
        source_url: &str,
        kind: MediaKind,
        category: &str,
    ) -> AdapterResult<RemoteMedia> {
        let url = format!("{}/{}/media", self.endpoints.legacy_v4, address.composite());
        let body = json!({
            "mediaFormat": media_format(kind),
            "locationAssociation": { "category": category },
            "sourceUrl": source_url,
        });
        let item: MediaItemJson = self
            .send_json(self.client.post(&url), credential, &body)
            .await?;
        Ok(item.into())
    }

    async fn delete_media(&self, credential: &Credential, media_name: &str) -> AdapterResult<()> {
        let url = format!("{}/{}", self.endpoints.legacy_v4, media_name);
        self.delete_resource(credential, &url).await
    }

    async fn list_questions(
        &self,
        credential: &Credential,
        address: &LocationAddress,
    ) -> AdapterResult<Vec<RemoteQuestion>> {
        // The Q&A surface is addressed by the plain location id
        let url = format!("{}/{}/questions", self.endpoints.qanda, address.plain());
        self.list_all(
            credential,
            &url,
            &[("answersPerQuestion", "10".to_string())],
            |page: QuestionsPage| {
                let questions = page.questions.into_iter().map(RemoteQuestion::from).collect();
                (questions, page.next_page_token)
            },
        )
        .await
    }

    async fn answer_question(
        &self,
        credential: &Credential,
        question_name: &str,
        text: &str,
    ) -> AdapterResult<RemoteAnswer> {
        let url = format!("{}/{}/answers:upsert", self.endpoints.qanda, question_name);
        let answer: AnswerJson = self
            .send_json(
                self.client.post(&url),
                credential,
                &json!({ "answer": { "text": text } }),
            )
            .await?;
        Ok(answer.into())
    }
}

fn media_format(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "PHOTO",
        MediaKind::Video => "VIDEO",
    }
}

/// Publishes content items as local posts on the profile itself
pub struct LocalPostAdapter {
    api: Arc<dyn ProfileApi>,
}

impl LocalPostAdapter {
    pub fn new(api: Arc<dyn ProfileApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PlatformAdapter for LocalPostAdapter {
    fn platform(&self) -> Platform {
        Platform::Google
    }

    fn char_limit(&self) -> Option<usize> {
        Some(LOCAL_POST_CHAR_LIMIT)
    }

    async fn publish(
        &self,
        request: PublishRequest<'_>,
        credential: &Credential,
    ) -> AdapterResult<String> {
        let profile_id = request
            .location
            .external_profile_id
            .as_deref()
            .ok_or_else(|| IntegrationError::NotLinked(request.location.id.clone()))?;

        let address = LocationAddress::resolve(self.api.as_ref(), credential, profile_id).await?;
        let post = self
            .api
            .create_post(credential, &address, request.text, request.media)
            .await?;
        Ok(post.name)
    }

    async fn delete(&self, external_id: &str, credential: &Credential) -> AdapterResult<()> {
        self.api.delete_post(credential, external_id).await
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountsPage {
    #[serde(default)]
    accounts: Vec<AccountJson>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountJson {
    name: String,
    account_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewsPage {
    #[serde(default)]
    reviews: Vec<ReviewJson>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewJson {
    name: String,
    reviewer: Option<ReviewerJson>,
    star_rating: Option<String>,
    comment: Option<String>,
    create_time: Option<DateTime<Utc>>,
    review_reply: Option<ReplyJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewerJson {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyJson {
    comment: Option<String>,
    update_time: Option<DateTime<Utc>>,
}

/// "ONE".."FIVE" to 1..=5; anything else is 0
fn star_rating(raw: Option<&str>) -> u8 {
    match raw {
        Some("ONE") => 1,
        Some("TWO") => 2,
        Some("THREE") => 3,
        Some("FOUR") => 4,
        Some("FIVE") => 5,
        _ => 0,
    }
}

impl From<ReviewJson> for RemoteReview {
    fn from(r: ReviewJson) -> Self {
        let (reply_text, replied_at) = match r.review_reply {
            Some(reply) => (reply.comment, reply.update_time),
            None => (None, None),
        };
        Self {
            name: r.name,
            reviewer_name: r.reviewer.and_then(|rv| rv.display_name),
            rating: star_rating(r.star_rating.as_deref()),
            comment: r.comment,
            created_at: r.create_time,
            reply_text,
            replied_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostsPage {
    #[serde(default)]
    local_posts: Vec<LocalPostJson>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalPostJson {
    name: String,
    summary: Option<String>,
    create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    media: Vec<PostMediaJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostMediaJson {
    google_url: Option<String>,
}

impl From<LocalPostJson> for RemotePost {
    fn from(p: LocalPostJson) -> Self {
        Self {
            name: p.name,
            summary: p.summary,
            created_at: p.create_time,
            media_url: p.media.into_iter().find_map(|m| m.google_url),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultiMetricsJson {
    #[serde(default)]
    multi_daily_metric_time_series: Vec<MultiSeriesJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultiSeriesJson {
    #[serde(default)]
    daily_metric_time_series: Vec<DailySeriesJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailySeriesJson {
    daily_metric: String,
    time_series: Option<TimeSeriesJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeSeriesJson {
    #[serde(default)]
    dated_values: Vec<DatedValueJson>,
}

#[derive(Debug, Deserialize)]
struct DatedValueJson {
    date: DateJson,
    /// int64 encoded as a string; absent means zero
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DateJson {
    year: i32,
    month: u32,
    day: u32,
}

impl MultiMetricsJson {
    fn into_series(self) -> Vec<MetricSeries> {
        self.multi_daily_metric_time_series
            .into_iter()
            .flat_map(|m| m.daily_metric_time_series)
            .map(|series| MetricSeries {
                metric: series.daily_metric,
                points: series
                    .time_series
                    .map(|ts| ts.dated_values)
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|dv| {
                        let date = NaiveDate::from_ymd_opt(dv.date.year, dv.date.month, dv.date.day)?;
                        let value = dv
                            .value
                            .as_deref()
                            .and_then(|v| v.parse::<i64>().ok())
                            .unwrap_or(0);
                        Some((date, value))
                    })
                    .collect(),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaPage {
    #[serde(default)]
    media_items: Vec<MediaItemJson>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaItemJson {
    name: String,
    google_url: Option<String>,
    thumbnail_url: Option<String>,
    media_format: Option<String>,
    location_association: Option<LocationAssociationJson>,
    insights: Option<InsightsJson>,
    create_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct LocationAssociationJson {
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsightsJson {
    view_count: Option<String>,
}

impl From<MediaItemJson> for RemoteMedia {
    fn from(m: MediaItemJson) -> Self {
        Self {
            name: m.name,
            url: m.google_url,
            thumbnail_url: m.thumbnail_url,
            format: m.media_format,
            category: m.location_association.and_then(|a| a.category),
            view_count: m
                .insights
                .and_then(|i| i.view_count)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            created_at: m.create_time,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionsPage {
    #[serde(default)]
    questions: Vec<QuestionJson>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestionJson {
    name: String,
    #[serde(default)]
    text: String,
    author: Option<AuthorJson>,
    #[serde(default)]
    upvote_count: i64,
    create_time: Option<DateTime<Utc>>,
    #[serde(default)]
    top_answers: Vec<AnswerJson>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorJson {
    display_name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerJson {
    name: String,
    #[serde(default)]
    text: String,
    author: Option<AuthorJson>,
    create_time: Option<DateTime<Utc>>,
}

impl From<QuestionJson> for RemoteQuestion {
    fn from(q: QuestionJson) -> Self {
        Self {
            name: q.name,
            text: q.text,
            author: q.author.and_then(|a| a.display_name),
            upvote_count: q.upvote_count,
            created_at: q.create_time,
            answers: q.top_answers.into_iter().map(RemoteAnswer::from).collect(),
        }
    }
}

impl From<AnswerJson> for RemoteAnswer {
    fn from(a: AnswerJson) -> Self {
        let (author, author_type) = match a.author {
            Some(author) => (author.display_name, author.kind),
            None => (None, None),
        };
        Self {
            name: a.name,
            text: a.text,
            author,
            author_type,
            created_at: a.create_time,
        }
    }
}

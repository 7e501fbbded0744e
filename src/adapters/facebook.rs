//! Facebook page publishing over the Graph API.
//!
//! The credential's `external_account_id` names the page; its access token
//! is the page token.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{http_client, AdapterResult, PlatformAdapter, PublishRequest};
use crate::config::Settings;
use crate::domain::{Credential, MediaKind, MediaRef, Platform};
use crate::error::IntegrationError;

pub const FACEBOOK_CHAR_LIMIT: usize = 63_206;

/// Graph API error codes meaning the token is no longer valid
const TOKEN_ERROR_CODES: [i64; 2] = [102, 190];

/// Graph API throttling codes
const RATE_LIMIT_CODES: [i64; 4] = [4, 17, 32, 613];

pub struct FacebookAdapter {
    client: reqwest::Client,
    graph_url: String,
}

#[derive(Debug, Deserialize)]
struct CreatedJson {
    id: String,
    post_id: Option<String>,
}

impl FacebookAdapter {
    pub fn new(client: reqwest::Client, graph_url: impl Into<String>) -> Self {
        Self {
            client,
            graph_url: graph_url.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> AdapterResult<Self> {
        Ok(Self::new(
            http_client(settings.http.timeout())?,
            settings.endpoints.facebook_graph.clone(),
        ))
    }

    fn page_id(credential: &Credential) -> AdapterResult<&str> {
        credential
            .external_account_id
            .as_deref()
            .ok_or_else(|| IntegrationError::Permanent("no Facebook page selected".to_string()))
    }
}

#[async_trait]
impl PlatformAdapter for FacebookAdapter {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn char_limit(&self) -> Option<usize> {
        Some(FACEBOOK_CHAR_LIMIT)
    }

    /// Videos go out as a link in the message
    fn media_link_in_text(&self, media: &MediaRef) -> bool {
        media.kind == MediaKind::Video
    }

    async fn publish(
        &self,
        request: PublishRequest<'_>,
        credential: &Credential,
    ) -> AdapterResult<String> {
        let page_id = Self::page_id(credential)?;

        let (url, body) = match request.media {
            Some(media) if media.kind == MediaKind::Image => (
                format!("{}/{}/photos", self.graph_url, page_id),
                json!({ "url": media.url, "caption": request.text }),
            ),
            _ => (
                format!("{}/{}/feed", self.graph_url, page_id),
                json!({ "message": request.text }),
            ),
        };

        let response = self
            .client
            .post(&url)
            .query(&[("access_token", credential.access_token.as_str())])
            .json(&body)
            .send()
            .await?;
        let created: CreatedJson = check_graph(response).await?.json().await?;

        Ok(created.post_id.unwrap_or(created.id))
    }

    async fn delete(&self, external_id: &str, credential: &Credential) -> AdapterResult<()> {
        let url = format!("{}/{}", self.graph_url, external_id);
        let response = self
            .client
            .delete(&url)
            .query(&[("access_token", credential.access_token.as_str())])
            .send()
            .await?;
        check_graph(response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    #[serde(default)]
    message: String,
    code: Option<i64>,
}

/// Graph API wraps most failures in HTTP 400; classify by error code instead
pub(crate) async fn check_graph(response: reqwest::Response) -> AdapterResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_graph_error(status.as_u16(), &body))
}

fn classify_graph_error(status: u16, body: &str) -> IntegrationError {
    let Ok(envelope) = serde_json::from_str::<GraphErrorEnvelope>(body) else {
        return IntegrationError::from_status(status, body);
    };

    let GraphError { message, code } = envelope.error;
    match code {
        Some(code) if TOKEN_ERROR_CODES.contains(&code) => IntegrationError::Unauthorized(message),
        Some(code) if RATE_LIMIT_CODES.contains(&code) => {
            IntegrationError::TransientNetwork(message)
        }
        Some(100) if message.contains("does not exist") => IntegrationError::NotFound(message),
        _ => IntegrationError::from_status(status, message),
    }
}

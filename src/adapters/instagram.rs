//! Instagram business publishing: create a media container, then publish it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::facebook::check_graph;
use super::{http_client, AdapterResult, PlatformAdapter, PublishRequest};
use crate::config::Settings;
use crate::domain::{Credential, MediaKind, Platform};
use crate::error::IntegrationError;

pub const INSTAGRAM_CHAR_LIMIT: usize = 2_200;

/// Video containers are processed asynchronously upstream
const CONTAINER_POLL_ATTEMPTS: u32 = 30;
const CONTAINER_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct InstagramAdapter {
    client: reqwest::Client,
    graph_url: String,
}

#[derive(Debug, Deserialize)]
struct IdJson {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ContainerStatusJson {
    status_code: Option<String>,
}

impl InstagramAdapter {
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

    async fn wait_for_container(&self, container_id: &str, token: &str) -> AdapterResult<()> {
        let url = format!("{}/{}", self.graph_url, container_id);

        for attempt in 1..=CONTAINER_POLL_ATTEMPTS {
            let response = self
                .client
                .get(&url)
                .query(&[("fields", "status_code"), ("access_token", token)])
                .send()
                .await?;
            let status: ContainerStatusJson = check_graph(response).await?.json().await?;

            match status.status_code.as_deref() {
                Some("FINISHED") => return Ok(()),
                Some("ERROR") | Some("EXPIRED") => {
                    return Err(IntegrationError::Permanent(format!(
                        "media container {} failed processing",
                        container_id
                    )))
                }
                other => {
                    debug!(container_id, attempt, status = ?other, "Container not ready");
                    tokio::time::sleep(CONTAINER_POLL_INTERVAL).await;
                }
            }
        }

        Err(IntegrationError::TransientNetwork(format!(
            "media container {} still processing",
            container_id
        )))
    }
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn char_limit(&self) -> Option<usize> {
        Some(INSTAGRAM_CHAR_LIMIT)
    }

    fn supports_delete(&self) -> bool {
        false
    }

    async fn publish(
        &self,
        request: PublishRequest<'_>,
        credential: &Credential,
    ) -> AdapterResult<String> {
        let user_id = credential.external_account_id.as_deref().ok_or_else(|| {
            IntegrationError::Permanent("no Instagram business account selected".to_string())
        })?;
        let media = request.media.ok_or_else(|| {
            IntegrationError::Permanent("Instagram requires an image or video".to_string())
        })?;
        let token = credential.access_token.as_str();

        let body = match media.kind {
            MediaKind::Image => json!({ "image_url": media.url, "caption": request.text }),
            MediaKind::Video => json!({
                "media_type": "REELS",
                "video_url": media.url,
                "caption": request.text,
            }),
        };

        let response = self
            .client
            .post(format!("{}/{}/media", self.graph_url, user_id))
            .query(&[("access_token", token)])
            .json(&body)
            .send()
            .await?;
        let container: IdJson = check_graph(response).await?.json().await?;

        if media.kind == MediaKind::Video {
            self.wait_for_container(&container.id, token).await?;
        }

        let response = self
            .client
            .post(format!("{}/{}/media_publish", self.graph_url, user_id))
            .query(&[("access_token", token)])
            .json(&json!({ "creation_id": container.id }))
            .send()
            .await?;
        let published: IdJson = check_graph(response).await?.json().await?;

        Ok(published.id)
    }

    /// The Graph API offers no deletion for published Instagram media
    async fn delete(&self, external_id: &str, _credential: &Credential) -> AdapterResult<()> {
        warn!(external_id, "Refusing to drop a live Instagram post");
        Err(IntegrationError::Permanent(
            "Instagram media cannot be deleted remotely".to_string(),
        ))
    }
}

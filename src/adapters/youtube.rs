//! YouTube video upload (resumable protocol, single PUT of the whole file).

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{check_status, http_client, AdapterResult, AssetFetcher, PlatformAdapter, PublishRequest};
use crate::config::Settings;
use crate::domain::{Credential, MediaKind, Platform};
use crate::error::IntegrationError;

/// Description limit; the title is cut separately
pub const YOUTUBE_CHAR_LIMIT: usize = 5_000;
const TITLE_LIMIT: usize = 100;

pub struct YouTubeAdapter {
    client: reqwest::Client,
    upload_url: String,
    data_url: String,
    fetcher: Arc<dyn AssetFetcher>,
}

#[derive(Debug, Deserialize)]
struct VideoJson {
    id: String,
}

impl YouTubeAdapter {
    pub fn new(
        client: reqwest::Client,
        upload_url: impl Into<String>,
        data_url: impl Into<String>,
        fetcher: Arc<dyn AssetFetcher>,
    ) -> Self {
        Self {
            client,
            upload_url: upload_url.into(),
            data_url: data_url.into(),
            fetcher,
        }
    }

    pub fn from_settings(settings: &Settings, fetcher: Arc<dyn AssetFetcher>) -> AdapterResult<Self> {
        Ok(Self::new(
            http_client(settings.http.timeout())?,
            settings.endpoints.youtube_upload.clone(),
            settings.endpoints.youtube_data.clone(),
            fetcher,
        ))
    }
}

/// First non-empty line of the text, cut to the title limit
fn video_title(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("Untitled");
    line.chars().take(TITLE_LIMIT).collect()
}

#[async_trait]
impl PlatformAdapter for YouTubeAdapter {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    fn char_limit(&self) -> Option<usize> {
        Some(YOUTUBE_CHAR_LIMIT)
    }

    /// Bytes are uploaded by this process, not pulled by the platform
    fn requires_public_media(&self) -> bool {
        false
    }

    async fn publish(
        &self,
        request: PublishRequest<'_>,
        credential: &Credential,
    ) -> AdapterResult<String> {
        let media = request
            .media
            .filter(|m| m.kind == MediaKind::Video)
            .ok_or_else(|| IntegrationError::Permanent("YouTube requires a video".to_string()))?;

        let bytes = self.fetcher.fetch(&media.url).await?;

        let metadata = json!({
            "snippet": {
                "title": video_title(request.text),
                "description": request.text,
            },
            "status": { "privacyStatus": "public" },
        });

        let response = self
            .client
            .post(format!("{}/videos", self.upload_url))
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(&credential.access_token)
            .header("X-Upload-Content-Length", bytes.len().to_string())
            .header("X-Upload-Content-Type", "video/*")
            .json(&metadata)
            .send()
            .await?;
        let response = check_status(response).await?;

        let session_url = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                IntegrationError::Permanent("upload session missing Location header".to_string())
            })?;

        let size = bytes.len();
        let response = self
            .client
            .put(&session_url)
            .bearer_auth(&credential.access_token)
            .header(reqwest::header::CONTENT_TYPE, "video/*")
            .body(bytes)
            .send()
            .await?;
        let video: VideoJson = check_status(response).await?.json().await?;

        info!(video_id = %video.id, bytes = size, "Uploaded video");
        Ok(video.id)
    }

    async fn delete(&self, external_id: &str, credential: &Credential) -> AdapterResult<()> {
        let response = self
            .client
            .delete(format!("{}/videos", self.data_url))
            .query(&[("id", external_id)])
            .bearer_auth(&credential.access_token)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

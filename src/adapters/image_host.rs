//! Image re-hosting endpoints (imgbb/freeimage-style form uploads).
//!
//! Both accept `key` + base64 `image` as form fields and answer with
//! `{"data": {"url": ...}}` or `{"image": {"url": ...}}`.

use async_trait::async_trait;
use reqwest::multipart::Form;
use serde::Deserialize;

use super::{check_status, http_client, AdapterResult, ImageHost};
use crate::config::{ImageHostSettings, Settings};
use crate::error::IntegrationError;

pub struct HttpImageHost {
    name: String,
    client: reqwest::Client,
    upload_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: Option<UploadedJson>,
    image: Option<UploadedJson>,
}

#[derive(Debug, Deserialize)]
struct UploadedJson {
    url: Option<String>,
}

impl HttpImageHost {
    pub fn new(
        name: impl Into<String>,
        client: reqwest::Client,
        host: &ImageHostSettings,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            upload_url: host.upload_url.clone(),
            api_key: host.api_key.clone(),
        }
    }

    /// Primary then secondary, skipping unconfigured hosts
    pub fn from_settings(settings: &Settings) -> AdapterResult<Vec<Self>> {
        let client = http_client(settings.http.timeout())?;
        let hosts = [
            ("primary", settings.media.primary_host.as_ref()),
            ("secondary", settings.media.secondary_host.as_ref()),
        ];

        Ok(hosts
            .into_iter()
            .filter_map(|(name, host)| host.map(|h| Self::new(name, client.clone(), h)))
            .collect())
    }
}

#[async_trait]
impl ImageHost for HttpImageHost {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, base64_image: &str) -> AdapterResult<String> {
        let form = Form::new()
            .text("key", self.api_key.clone())
            .text("image", base64_image.to_string());

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await?;
        let uploaded: UploadResponse = check_status(response).await?.json().await?;

        uploaded
            .data
            .or(uploaded.image)
            .and_then(|u| u.url)
            .ok_or_else(|| {
                IntegrationError::Permanent(format!("{} host returned no URL", self.name))
            })
    }
}

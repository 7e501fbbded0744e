//! Plain HTTP download of media assets.

use async_trait::async_trait;

use super::{check_status, http_client, AdapterResult, AssetFetcher};
use crate::config::Settings;

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn from_settings(settings: &Settings) -> AdapterResult<Self> {
        Ok(Self::new(http_client(settings.http.timeout())?))
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> AdapterResult<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let bytes = check_status(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

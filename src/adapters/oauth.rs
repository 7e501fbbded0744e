//! OAuth 2.0 token endpoint client (refresh grant and code exchange).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use url::Url;

use super::{check_status, http_client, AdapterResult, TokenGrant, TokenRefresher};
use crate::config::{OAuthClientSettings, Settings};
use crate::domain::Platform;
use crate::error::IntegrationError;

/// HTTP implementation of `TokenRefresher`.
///
/// Client registrations are keyed by platform name. Instagram shares the
/// Facebook app and YouTube shares the Google client when they have no entry
/// of their own.
pub struct OAuthClient {
    client: reqwest::Client,
    registrations: BTreeMap<String, OAuthClientSettings>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

impl OAuthClient {
    pub fn new(client: reqwest::Client, registrations: BTreeMap<String, OAuthClientSettings>) -> Self {
        Self {
            client,
            registrations,
        }
    }

    pub fn from_settings(settings: &Settings) -> AdapterResult<Self> {
        Ok(Self::new(
            http_client(settings.http.timeout())?,
            settings.oauth.clone(),
        ))
    }

    fn registration(&self, platform: Platform) -> AdapterResult<&OAuthClientSettings> {
        let fallback = match platform {
            Platform::Instagram => Some(Platform::Facebook),
            Platform::YouTube => Some(Platform::Google),
            _ => None,
        };

        self.registrations
            .get(platform.as_str())
            .or_else(|| fallback.and_then(|p| self.registrations.get(p.as_str())))
            .ok_or_else(|| {
                IntegrationError::Permanent(format!("no OAuth client configured for {}", platform))
            })
    }

    async fn token_request(
        &self,
        registration: &OAuthClientSettings,
        form: &[(&str, &str)],
    ) -> AdapterResult<TokenGrant> {
        let mut params: Vec<(&str, &str)> = vec![
            ("client_id", registration.client_id.as_str()),
            ("client_secret", registration.client_secret.as_str()),
        ];
        params.extend_from_slice(form);

        let response = self
            .client
            .post(&registration.token_url)
            .form(&params)
            .send()
            .await?;
        let token: TokenResponse = check_status(response).await?.json().await?;

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token.expires_in.map(|s| Utc::now() + Duration::seconds(s)),
            scope: token.scope,
        })
    }
}

#[async_trait]
impl TokenRefresher for OAuthClient {
    async fn refresh(&self, platform: Platform, refresh_token: &str) -> AdapterResult<TokenGrant> {
        let registration = self.registration(platform)?;
        self.token_request(
            registration,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        )
        .await
    }

    async fn exchange_code(&self, platform: Platform, code: &str) -> AdapterResult<TokenGrant> {
        let registration = self.registration(platform)?;
        self.token_request(
            registration,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", registration.redirect_uri.as_str()),
            ],
        )
        .await
    }

    fn authorization_url(&self, platform: Platform, state: &str) -> AdapterResult<String> {
        let registration = self.registration(platform)?;
        let mut url = Url::parse(&registration.auth_url).map_err(|e| {
            IntegrationError::Permanent(format!("invalid auth_url for {}: {}", platform, e))
        })?;

        url.query_pairs_mut()
            .append_pair("client_id", &registration.client_id)
            .append_pair("redirect_uri", &registration.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &registration.scopes.join(" "))
            .append_pair("state", state)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        Ok(url.into())
    }
}

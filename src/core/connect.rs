//! OAuth connect flow: hand out a consent URL, then trade the code for tokens.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::adapters::TokenRefresher;
use crate::domain::{Credential, Platform};
use crate::error::IntegrationError;
use crate::store::{Store, StoreError};

/// What the callback needs to know about the flow it completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectState {
    pub identity_id: String,
    pub platform: Platform,
    /// Page or business user the resulting token should act for
    pub external_account_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectStart {
    pub state: String,
    pub authorization_url: String,
}

pub struct ConnectFlow {
    store: Arc<Store>,
    refresher: Arc<dyn TokenRefresher>,
    ttl: Duration,
}

impl ConnectFlow {
    pub fn new(store: Arc<Store>, refresher: Arc<dyn TokenRefresher>, ttl: Duration) -> Self {
        Self {
            store,
            refresher,
            ttl,
        }
    }

    /// Persist a fresh state token and build the consent URL carrying it
    #[instrument(skip(self))]
    pub fn begin(
        &self,
        identity_id: &str,
        platform: Platform,
        external_account_id: Option<String>,
    ) -> Result<ConnectStart, IntegrationError> {
        let state = format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        );
        let authorization_url = self.refresher.authorization_url(platform, &state)?;

        let payload = serde_json::to_value(ConnectState {
            identity_id: identity_id.to_string(),
            platform,
            external_account_id,
        })?;
        self.store
            .put_oauth_state(&state, &payload, Utc::now() + self.ttl)?;

        Ok(ConnectStart {
            state,
            authorization_url,
        })
    }

    /// Consume the state and store the credential obtained for its identity
    #[instrument(skip(self, state, code))]
    pub async fn complete(&self, state: &str, code: &str) -> Result<Credential, IntegrationError> {
        let payload = self
            .store
            .take_oauth_state(state, Utc::now())?
            .ok_or_else(|| {
                IntegrationError::Permanent("unknown or expired connect state".to_string())
            })?;
        let connect: ConnectState = serde_json::from_value(payload)?;

        let grant = self
            .refresher
            .exchange_code(connect.platform, code)
            .await?;

        let credential = Credential {
            identity_id: connect.identity_id,
            platform: connect.platform,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: grant.expires_at,
            scope: grant.scope,
            external_account_id: connect.external_account_id,
        };
        self.store.upsert_credential(&credential)?;

        info!(
            identity_id = %credential.identity_id,
            platform = %credential.platform,
            "Connected account"
        );
        Ok(credential)
    }

    /// Drop states whose TTL has passed
    pub fn evict_expired(&self) -> Result<usize, StoreError> {
        self.store.evict_expired_oauth_states(Utc::now())
    }
}

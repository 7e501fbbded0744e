//! Credential resolution across candidate identities.
//!
//! Candidates are the identities assigned to the location (assignment order)
//! followed by the identities of its organization. The first candidate with a
//! live credential wins. An expired credential gets exactly one refresh
//! attempt; the refreshed token is persisted before it is handed out.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, instrument, warn};

use crate::adapters::TokenRefresher;
use crate::domain::{Credential, Location, Platform};
use crate::error::{IntegrationError, NoCredentialReason};
use crate::store::{Store, StoreError};

pub struct CredentialResolver {
    store: Arc<Store>,
    refresher: Arc<dyn TokenRefresher>,
    skew: Duration,
}

impl CredentialResolver {
    pub fn new(store: Arc<Store>, refresher: Arc<dyn TokenRefresher>, skew: Duration) -> Self {
        Self {
            store,
            refresher,
            skew,
        }
    }

    /// Candidate identity ids, assignment first, deduplicated
    pub fn candidates(&self, location: &Location) -> Result<Vec<String>, StoreError> {
        let mut ids = self.store.assigned_identity_ids(&location.id)?;
        if let Some(org) = &location.organization_id {
            for id in self.store.organization_identity_ids(org)? {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }

    /// Find a usable credential for `platform` acting for `location`
    #[instrument(skip(self, location), fields(location_id = %location.id, %platform))]
    pub async fn resolve(
        &self,
        location: &Location,
        platform: Platform,
    ) -> Result<Credential, IntegrationError> {
        let candidates = self.candidates(location)?;
        let mut stale = 0usize;

        for identity_id in &candidates {
            let Some(credential) = self.store.get_credential(identity_id, platform)? else {
                continue;
            };

            if !credential.is_expired(Utc::now(), self.skew) {
                debug!(%identity_id, "Using live credential");
                return Ok(credential);
            }

            stale += 1;
            if !credential.can_refresh() {
                debug!(%identity_id, "Credential expired with no refresh token");
                continue;
            }

            match self.refresh(credential).await {
                Ok(refreshed) => return Ok(refreshed),
                Err(IntegrationError::Store(e)) => return Err(IntegrationError::Store(e)),
                Err(e) => {
                    warn!(%identity_id, error = %e, "Token refresh failed, trying next candidate");
                }
            }
        }

        let reason = if stale == 0 {
            NoCredentialReason::NeverConnected
        } else {
            NoCredentialReason::AllStale { candidates: stale }
        };
        debug!(?reason, candidates = candidates.len(), "No usable credential");
        Err(IntegrationError::NoCredential(reason))
    }

    /// One refresh attempt; persists before returning
    async fn refresh(&self, mut credential: Credential) -> Result<Credential, IntegrationError> {
        let refresh_token = credential.refresh_token.clone().unwrap_or_default();
        let grant = self
            .refresher
            .refresh(credential.platform, &refresh_token)
            .await?;

        self.store.update_credential_tokens(
            &credential.identity_id,
            credential.platform,
            &grant.access_token,
            grant.expires_at,
            grant.refresh_token.as_deref(),
        )?;

        info!(identity_id = %credential.identity_id, "Refreshed access token");

        credential.access_token = grant.access_token;
        credential.expires_at = grant.expires_at;
        if let Some(rotated) = grant.refresh_token {
            credential.refresh_token = Some(rotated);
        }
        Ok(credential)
    }
}

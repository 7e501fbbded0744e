//! OAuth connect-flow state: a TTL'd key/value table consumed exactly once.
//!
//! Tokens are stored as SHA-256 digests so a copy of the database cannot be
//! replayed against the callback.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};

use super::{parse_ts, ts, Store, StoreError};

fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

impl Store {
    /// Persist a state payload under `token` until `expires_at`
    pub fn put_oauth_state(
        &self,
        token: &str,
        payload: &serde_json::Value,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(payload)?;
        self.lock()?.execute(
            "INSERT OR REPLACE INTO oauth_states (token, payload, expires_at) VALUES (?1, ?2, ?3)",
            params![digest(token), payload, ts(expires_at)],
        )?;
        Ok(())
    }

    /// Remove and return the payload for `token`.
    ///
    /// The row is deleted whether or not it has expired; an expired row
    /// yields None.
    pub fn take_oauth_state(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let key = digest(token);
        let row = self.with_transaction(|tx| {
            let row: Option<(String, String)> = tx
                .query_row(
                    "SELECT payload, expires_at FROM oauth_states WHERE token = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            if row.is_some() {
                tx.execute("DELETE FROM oauth_states WHERE token = ?1", params![key])?;
            }
            Ok(row)
        })?;

        let Some((payload, expires_at)) = row else {
            return Ok(None);
        };
        if parse_ts("expires_at", &expires_at)? <= now {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&payload)?))
    }

    /// Delete every state that expired at or before `now`
    pub fn evict_expired_oauth_states(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let n = self.lock()?.execute(
            "DELETE FROM oauth_states WHERE expires_at <= ?1",
            params![ts(now)],
        )?;
        Ok(n)
    }
}

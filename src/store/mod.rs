//! SQLite-backed store for locations, credentials, content and synced rows.
//!
//! One connection guarded by a mutex. Every method takes the lock for the
//! duration of a single statement or transaction; callers never hold it
//! across an `.await`.

pub mod oauth_state;
mod schema;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use thiserror::Error;

use crate::domain::{
    Answer, AutoReplySettings, ContentItem, ContentStatus, Credential, DisplayFields, Identity,
    Location, MediaAsset, MediaKind, MediaRef, MetricDay, Platform, PlatformResult, Question,
    ReplySource, Review,
};

/// Errors specific to store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Corrupt value in column {column}: {value}")]
    Corrupt { column: &'static str, value: String },

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Whether an upsert created a row or refreshed an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Inserted,
    Updated,
}

/// Persistent store handle
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(StoreError::CreateDir)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// Open a private in-memory database (tests, dry runs)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Execute a closure within a transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Organizations and identities
    // ------------------------------------------------------------------

    pub fn upsert_organization(
        &self,
        id: &str,
        name: &str,
        text_generation_key: Option<&str>,
    ) -> Result<(), StoreError> {
        self.lock()?.execute(
            "INSERT INTO organizations (id, name, text_generation_key) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                text_generation_key = COALESCE(excluded.text_generation_key, organizations.text_generation_key)",
            params![id, name, text_generation_key],
        )?;
        Ok(())
    }

    /// Organization-specific text-generation API key, if one is stored
    pub fn text_generation_key(&self, organization_id: &str) -> Result<Option<String>, StoreError> {
        let key = self
            .lock()?
            .query_row(
                "SELECT text_generation_key FROM organizations WHERE id = ?1",
                params![organization_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(key.flatten().filter(|k| !k.is_empty()))
    }

    pub fn upsert_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        self.lock()?.execute(
            "INSERT INTO identities (id, organization_id, email) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                organization_id = excluded.organization_id,
                email = excluded.email",
            params![identity.id, identity.organization_id, identity.email],
        )?;
        Ok(())
    }

    /// Directly assign an identity to a location (appended to the order)
    pub fn assign_identity(&self, location_id: &str, identity_id: &str) -> Result<(), StoreError> {
        self.lock()?.execute(
            "INSERT OR IGNORE INTO location_identities (location_id, identity_id) VALUES (?1, ?2)",
            params![location_id, identity_id],
        )?;
        Ok(())
    }

    /// Identities assigned to a location, in assignment order
    pub fn assigned_identity_ids(&self, location_id: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT identity_id FROM location_identities WHERE location_id = ?1 ORDER BY seq",
        )?;
        let ids = stmt
            .query_map(params![location_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Identities belonging to an organization, oldest first
    pub fn organization_identity_ids(&self, organization_id: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id FROM identities WHERE organization_id = ?1 ORDER BY rowid")?;
        let ids = stmt
            .query_map(params![organization_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------

    pub fn upsert_credential(&self, credential: &Credential) -> Result<(), StoreError> {
        self.lock()?.execute(
            "INSERT INTO credentials (
                identity_id, platform, access_token, refresh_token, expires_at, scope,
                external_account_id, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(identity_id, platform) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                scope = excluded.scope,
                external_account_id = excluded.external_account_id,
                updated_at = excluded.updated_at",
            params![
                credential.identity_id,
                credential.platform.as_str(),
                credential.access_token,
                credential.refresh_token,
                credential.expires_at.map(ts),
                credential.scope,
                credential.external_account_id,
                ts(Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn get_credential(
        &self,
        identity_id: &str,
        platform: Platform,
    ) -> Result<Option<Credential>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT identity_id, platform, access_token, refresh_token, expires_at, scope,
                        external_account_id
                 FROM credentials WHERE identity_id = ?1 AND platform = ?2",
                params![identity_id, platform.as_str()],
                RawCredential::from_row,
            )
            .optional()?;
        row.map(RawCredential::into_credential).transpose()
    }

    /// Persist refreshed tokens in place.
    ///
    /// A None refresh token keeps the stored one (most providers only return
    /// a new refresh token on rotation).
    pub fn update_credential_tokens(
        &self,
        identity_id: &str,
        platform: Platform,
        access_token: &str,
        expires_at: Option<DateTime<Utc>>,
        refresh_token: Option<&str>,
    ) -> Result<(), StoreError> {
        self.lock()?.execute(
            "UPDATE credentials SET
                access_token = ?3,
                expires_at = ?4,
                refresh_token = COALESCE(?5, refresh_token),
                updated_at = ?6
             WHERE identity_id = ?1 AND platform = ?2",
            params![
                identity_id,
                platform.as_str(),
                access_token,
                expires_at.map(ts),
                refresh_token,
                ts(Utc::now()),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Locations
    // ------------------------------------------------------------------

    pub fn upsert_location(&self, location: &Location) -> Result<(), StoreError> {
        let profile = location
            .profile
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let d = &location.display;

        self.lock()?.execute(
            "INSERT INTO locations (
                id, organization_id, external_profile_id, profile_json, profile_synced_at,
                display_name, address, phone, website, primary_category, description, maps_url,
                auto_reply_enabled, auto_reply_since
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id) DO UPDATE SET
                organization_id = excluded.organization_id,
                external_profile_id = excluded.external_profile_id,
                profile_json = excluded.profile_json,
                profile_synced_at = excluded.profile_synced_at,
                display_name = excluded.display_name,
                address = excluded.address,
                phone = excluded.phone,
                website = excluded.website,
                primary_category = excluded.primary_category,
                description = excluded.description,
                maps_url = excluded.maps_url,
                auto_reply_enabled = excluded.auto_reply_enabled,
                auto_reply_since = excluded.auto_reply_since",
            params![
                location.id,
                location.organization_id,
                location.external_profile_id,
                profile,
                location.profile_synced_at.map(ts),
                d.display_name,
                d.address,
                d.phone,
                d.website,
                d.primary_category,
                d.description,
                d.maps_url,
                location.auto_reply.enabled,
                location.auto_reply.since.map(|d| d.to_string()),
            ],
        )?;
        Ok(())
    }

    pub fn get_location(&self, id: &str) -> Result<Option<Location>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM locations WHERE id = ?1", LOCATION_COLUMNS),
                params![id],
                RawLocation::from_row,
            )
            .optional()?;
        raw.map(RawLocation::into_location).transpose()
    }

    /// Locations linked to an external profile
    pub fn linked_locations(&self) -> Result<Vec<Location>, StoreError> {
        self.query_locations("WHERE external_profile_id IS NOT NULL ORDER BY id")
    }

    /// Linked locations with auto-reply switched on
    pub fn auto_reply_locations(&self) -> Result<Vec<Location>, StoreError> {
        self.query_locations(
            "WHERE external_profile_id IS NOT NULL AND auto_reply_enabled = 1 ORDER BY id",
        )
    }

    fn query_locations(&self, clause: &str) -> Result<Vec<Location>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM locations {}",
            LOCATION_COLUMNS, clause
        ))?;
        let raws = stmt
            .query_map([], RawLocation::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawLocation::into_location).collect()
    }

    /// Replace the cached profile and every flattened field in one write
    pub fn save_profile(
        &self,
        location_id: &str,
        profile: &serde_json::Value,
        synced_at: DateTime<Utc>,
        display: &DisplayFields,
    ) -> Result<(), StoreError> {
        let profile = serde_json::to_string(profile)?;
        self.lock()?.execute(
            "UPDATE locations SET
                profile_json = ?2,
                profile_synced_at = ?3,
                display_name = ?4,
                address = ?5,
                phone = ?6,
                website = ?7,
                primary_category = ?8,
                description = ?9,
                maps_url = ?10
             WHERE id = ?1",
            params![
                location_id,
                profile,
                ts(synced_at),
                display.display_name,
                display.address,
                display.phone,
                display.website,
                display.primary_category,
                display.description,
                display.maps_url,
            ],
        )?;
        Ok(())
    }

    pub fn set_auto_reply(
        &self,
        location_id: &str,
        settings: &AutoReplySettings,
    ) -> Result<(), StoreError> {
        self.lock()?.execute(
            "UPDATE locations SET auto_reply_enabled = ?2, auto_reply_since = ?3 WHERE id = ?1",
            params![
                location_id,
                settings.enabled,
                settings.since.map(|d| d.to_string())
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Content items
    // ------------------------------------------------------------------

    pub fn save_content_item(&self, item: &ContentItem) -> Result<(), StoreError> {
        let targets = serde_json::to_string(&item.targets)?;
        let results = serde_json::to_string(&item.results)?;

        self.lock()?.execute(
            "INSERT INTO content_items (
                id, location_id, body, media_url, media_kind, scheduled_at, targets_json,
                status, results_json, status_reason, created_at, published_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                body = excluded.body,
                media_url = excluded.media_url,
                media_kind = excluded.media_kind,
                scheduled_at = excluded.scheduled_at,
                targets_json = excluded.targets_json,
                status = excluded.status,
                results_json = excluded.results_json,
                status_reason = excluded.status_reason,
                published_at = excluded.published_at",
            params![
                item.id,
                item.location_id,
                item.body,
                item.media.as_ref().map(|m| m.url.clone()),
                item.media.as_ref().map(|m| m.kind.as_str()),
                item.scheduled_at.map(ts),
                targets,
                item.status.as_str(),
                results,
                item.status_reason,
                ts(item.created_at),
                item.published_at.map(ts),
            ],
        )?;
        Ok(())
    }

    pub fn get_content_item(&self, id: &str) -> Result<Option<ContentItem>, StoreError> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM content_items WHERE id = ?1", CONTENT_COLUMNS),
                params![id],
                RawContent::from_row,
            )
            .optional()?;
        raw.map(RawContent::into_item).transpose()
    }

    pub fn content_items_for_location(
        &self,
        location_id: &str,
    ) -> Result<Vec<ContentItem>, StoreError> {
        self.query_content(
            "WHERE location_id = ?1 ORDER BY created_at",
            params![location_id],
        )
    }

    /// Scheduled items whose time has come, oldest first
    pub fn due_scheduled_items(&self, now: DateTime<Utc>) -> Result<Vec<ContentItem>, StoreError> {
        self.query_content(
            "WHERE status = 'scheduled' AND scheduled_at IS NOT NULL AND scheduled_at <= ?1
             ORDER BY scheduled_at",
            params![ts(now)],
        )
    }

    fn query_content(
        &self,
        clause: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<ContentItem>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM content_items {}",
            CONTENT_COLUMNS, clause
        ))?;
        let raws = stmt
            .query_map(params, RawContent::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawContent::into_item).collect()
    }

    /// Commit the outcome of one dispatch: status, results and reason together
    pub fn commit_dispatch(
        &self,
        id: &str,
        status: ContentStatus,
        results: &BTreeMap<Platform, PlatformResult>,
        reason: Option<&str>,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let results = serde_json::to_string(results)?;
        self.lock()?.execute(
            "UPDATE content_items SET
                status = ?2,
                results_json = ?3,
                status_reason = ?4,
                published_at = COALESCE(?5, published_at)
             WHERE id = ?1",
            params![id, status.as_str(), results, reason, published_at.map(ts)],
        )?;
        Ok(())
    }

    pub fn delete_content_item(&self, id: &str) -> Result<bool, StoreError> {
        let n = self
            .lock()?
            .execute("DELETE FROM content_items WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    // ------------------------------------------------------------------
    // Reviews
    // ------------------------------------------------------------------

    /// Insert a review or refresh its upstream fields; local-only fields survive
    pub fn upsert_review(&self, review: &Review) -> Result<Upserted, StoreError> {
        self.with_transaction(|tx| {
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM reviews WHERE external_id = ?1",
                    params![review.external_id],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE reviews SET
                            reviewer_name = ?2,
                            rating = ?3,
                            comment = ?4,
                            reviewed_at = ?5,
                            reply_text = ?6,
                            replied_at = ?7,
                            reply_source = CASE
                                WHEN ?6 IS NULL THEN NULL
                                ELSE COALESCE(reply_source, 'external')
                            END
                         WHERE id = ?1",
                        params![
                            id,
                            review.reviewer_name,
                            review.rating,
                            review.comment,
                            review.reviewed_at.map(ts),
                            review.reply_text,
                            review.replied_at.map(ts),
                        ],
                    )?;
                    Ok(Upserted::Updated)
                }
                None => {
                    tx.execute(
                        "INSERT INTO reviews (
                            id, location_id, external_id, reviewer_name, rating, comment,
                            reviewed_at, reply_text, replied_at, reply_source, internal_note
                         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                        params![
                            review.id,
                            review.location_id,
                            review.external_id,
                            review.reviewer_name,
                            review.rating,
                            review.comment,
                            review.reviewed_at.map(ts),
                            review.reply_text,
                            review.replied_at.map(ts),
                            review.reply_source.map(|s| s.as_str()),
                            review.internal_note,
                        ],
                    )?;
                    Ok(Upserted::Inserted)
                }
            }
        })
    }

    pub fn get_review(&self, id: &str) -> Result<Option<Review>, StoreError> {
        Ok(self
            .query_reviews("WHERE id = ?1", params![id])?
            .into_iter()
            .next())
    }

    pub fn get_review_by_external_id(&self, external_id: &str) -> Result<Option<Review>, StoreError> {
        Ok(self
            .query_reviews("WHERE external_id = ?1", params![external_id])?
            .into_iter()
            .next())
    }

    pub fn reviews_for_location(&self, location_id: &str) -> Result<Vec<Review>, StoreError> {
        self.query_reviews("WHERE location_id = ?1 ORDER BY reviewed_at", params![location_id])
    }

    /// Oldest unreplied reviews, optionally only those left on/after `since`
    pub fn unreplied_reviews(
        &self,
        location_id: &str,
        since: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<Review>, StoreError> {
        let since = since
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| ts(dt.and_utc()));
        self.query_reviews(
            "WHERE location_id = ?1
               AND (reply_text IS NULL OR TRIM(reply_text) = '')
               AND (?2 IS NULL OR reviewed_at >= ?2)
             ORDER BY reviewed_at
             LIMIT ?3",
            params![location_id, since, limit as i64],
        )
    }

    pub fn record_review_reply(
        &self,
        review_id: &str,
        text: &str,
        replied_at: DateTime<Utc>,
        source: ReplySource,
    ) -> Result<(), StoreError> {
        self.lock()?.execute(
            "UPDATE reviews SET reply_text = ?2, replied_at = ?3, reply_source = ?4 WHERE id = ?1",
            params![review_id, text, ts(replied_at), source.as_str()],
        )?;
        Ok(())
    }

    pub fn set_review_note(&self, review_id: &str, note: Option<&str>) -> Result<(), StoreError> {
        self.lock()?.execute(
            "UPDATE reviews SET internal_note = ?2 WHERE id = ?1",
            params![review_id, note],
        )?;
        Ok(())
    }

    fn query_reviews(
        &self,
        clause: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Review>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, location_id, external_id, reviewer_name, rating, comment, reviewed_at,
                    reply_text, replied_at, reply_source, internal_note
             FROM reviews {}",
            clause
        ))?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    Review {
                        id: row.get(0)?,
                        location_id: row.get(1)?,
                        external_id: row.get(2)?,
                        reviewer_name: row.get(3)?,
                        rating: row.get(4)?,
                        comment: row.get(5)?,
                        reviewed_at: None,
                        reply_text: row.get(7)?,
                        replied_at: None,
                        reply_source: None,
                        internal_note: row.get(10)?,
                    },
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(8)?,
                    row.get::<_, Option<String>>(9)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mut review, reviewed_at, replied_at, source)| {
                review.reviewed_at = parse_opt_ts("reviewed_at", reviewed_at)?;
                review.replied_at = parse_opt_ts("replied_at", replied_at)?;
                review.reply_source = source.as_deref().and_then(ReplySource::parse);
                Ok(review)
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Media
    // ------------------------------------------------------------------

    pub fn upsert_media_asset(&self, asset: &MediaAsset) -> Result<Upserted, StoreError> {
        self.with_transaction(|tx| {
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM media_assets WHERE external_id = ?1",
                    params![asset.external_id],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE media_assets SET
                            url = ?2, thumbnail_url = ?3, format = ?4, category = ?5,
                            view_count = ?6, created_at = ?7
                         WHERE id = ?1",
                        params![
                            id,
                            asset.url,
                            asset.thumbnail_url,
                            asset.format,
                            asset.category,
                            asset.view_count,
                            asset.created_at.map(ts),
                        ],
                    )?;
                    Ok(Upserted::Updated)
                }
                None => {
                    tx.execute(
                        "INSERT INTO media_assets (
                            id, location_id, external_id, url, thumbnail_url, format, category,
                            view_count, created_at, local_label
                         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                        params![
                            asset.id,
                            asset.location_id,
                            asset.external_id,
                            asset.url,
                            asset.thumbnail_url,
                            asset.format,
                            asset.category,
                            asset.view_count,
                            asset.created_at.map(ts),
                            asset.local_label,
                        ],
                    )?;
                    Ok(Upserted::Inserted)
                }
            }
        })
    }

    pub fn get_media_asset(&self, id: &str) -> Result<Option<MediaAsset>, StoreError> {
        Ok(self
            .query_media("WHERE id = ?1", params![id])?
            .into_iter()
            .next())
    }

    pub fn media_for_location(&self, location_id: &str) -> Result<Vec<MediaAsset>, StoreError> {
        self.query_media("WHERE location_id = ?1 ORDER BY created_at", params![location_id])
    }

    pub fn set_media_label(&self, id: &str, label: Option<&str>) -> Result<(), StoreError> {
        self.lock()?.execute(
            "UPDATE media_assets SET local_label = ?2 WHERE id = ?1",
            params![id, label],
        )?;
        Ok(())
    }

    pub fn delete_media_asset(&self, id: &str) -> Result<bool, StoreError> {
        let n = self
            .lock()?
            .execute("DELETE FROM media_assets WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    fn query_media(
        &self,
        clause: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<MediaAsset>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, location_id, external_id, url, thumbnail_url, format, category,
                    view_count, created_at, local_label
             FROM media_assets {}",
            clause
        ))?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    MediaAsset {
                        id: row.get(0)?,
                        location_id: row.get(1)?,
                        external_id: row.get(2)?,
                        url: row.get(3)?,
                        thumbnail_url: row.get(4)?,
                        format: row.get(5)?,
                        category: row.get(6)?,
                        view_count: row.get(7)?,
                        created_at: None,
                        local_label: row.get(9)?,
                    },
                    row.get::<_, Option<String>>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mut asset, created_at)| {
                asset.created_at = parse_opt_ts("created_at", created_at)?;
                Ok(asset)
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Questions and answers
    // ------------------------------------------------------------------

    /// Upsert a question; returns the local id alongside the outcome
    pub fn upsert_question(&self, question: &Question) -> Result<(Upserted, String), StoreError> {
        self.with_transaction(|tx| {
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM questions WHERE external_id = ?1",
                    params![question.external_id],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE questions SET text = ?2, author = ?3, upvote_count = ?4,
                            asked_at = ?5
                         WHERE id = ?1",
                        params![
                            id,
                            question.text,
                            question.author,
                            question.upvote_count,
                            question.asked_at.map(ts),
                        ],
                    )?;
                    Ok((Upserted::Updated, id))
                }
                None => {
                    tx.execute(
                        "INSERT INTO questions (
                            id, location_id, external_id, text, author, upvote_count, asked_at,
                            internal_note
                         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                        params![
                            question.id,
                            question.location_id,
                            question.external_id,
                            question.text,
                            question.author,
                            question.upvote_count,
                            question.asked_at.map(ts),
                            question.internal_note,
                        ],
                    )?;
                    Ok((Upserted::Inserted, question.id.clone()))
                }
            }
        })
    }

    pub fn upsert_answer(&self, answer: &Answer) -> Result<Upserted, StoreError> {
        self.with_transaction(|tx| {
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM answers WHERE external_id = ?1",
                    params![answer.external_id],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(id) => {
                    tx.execute(
                        "UPDATE answers SET text = ?2, author = ?3, author_type = ?4,
                            answered_at = ?5
                         WHERE id = ?1",
                        params![
                            id,
                            answer.text,
                            answer.author,
                            answer.author_type,
                            answer.answered_at.map(ts),
                        ],
                    )?;
                    Ok(Upserted::Updated)
                }
                None => {
                    tx.execute(
                        "INSERT INTO answers (
                            id, question_id, external_id, text, author, author_type, answered_at
                         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            answer.id,
                            answer.question_id,
                            answer.external_id,
                            answer.text,
                            answer.author,
                            answer.author_type,
                            answer.answered_at.map(ts),
                        ],
                    )?;
                    Ok(Upserted::Inserted)
                }
            }
        })
    }

    pub fn get_question(&self, id: &str) -> Result<Option<Question>, StoreError> {
        Ok(self
            .query_questions("WHERE id = ?1", params![id])?
            .into_iter()
            .next())
    }

    pub fn questions_for_location(&self, location_id: &str) -> Result<Vec<Question>, StoreError> {
        self.query_questions("WHERE location_id = ?1 ORDER BY asked_at", params![location_id])
    }

    pub fn answers_for_question(&self, question_id: &str) -> Result<Vec<Answer>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, question_id, external_id, text, author, author_type, answered_at
             FROM answers WHERE question_id = ?1 ORDER BY answered_at",
        )?;
        let rows = stmt
            .query_map(params![question_id], |row| {
                Ok((
                    Answer {
                        id: row.get(0)?,
                        question_id: row.get(1)?,
                        external_id: row.get(2)?,
                        text: row.get(3)?,
                        author: row.get(4)?,
                        author_type: row.get(5)?,
                        answered_at: None,
                    },
                    row.get::<_, Option<String>>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mut answer, answered_at)| {
                answer.answered_at = parse_opt_ts("answered_at", answered_at)?;
                Ok(answer)
            })
            .collect()
    }

    fn query_questions(
        &self,
        clause: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Question>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, location_id, external_id, text, author, upvote_count, asked_at,
                    internal_note
             FROM questions {}",
            clause
        ))?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    Question {
                        id: row.get(0)?,
                        location_id: row.get(1)?,
                        external_id: row.get(2)?,
                        text: row.get(3)?,
                        author: row.get(4)?,
                        upvote_count: row.get(5)?,
                        asked_at: None,
                        internal_note: row.get(7)?,
                    },
                    row.get::<_, Option<String>>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mut question, asked_at)| {
                question.asked_at = parse_opt_ts("asked_at", asked_at)?;
                Ok(question)
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Metrics
    // ------------------------------------------------------------------

    /// One row per (location, date); counters are upstream-authoritative
    pub fn upsert_metric_day(&self, day: &MetricDay) -> Result<Upserted, StoreError> {
        self.with_transaction(|tx| {
            let date = day.date.to_string();
            let exists = tx
                .query_row(
                    "SELECT 1 FROM metric_days WHERE location_id = ?1 AND date = ?2",
                    params![day.location_id, date],
                    |_row| Ok(()),
                )
                .optional()?
                .is_some();

            tx.execute(
                "INSERT INTO metric_days (
                    location_id, date, search_impressions, maps_impressions, website_clicks,
                    call_clicks, direction_requests, conversations, bookings
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(location_id, date) DO UPDATE SET
                    search_impressions = excluded.search_impressions,
                    maps_impressions = excluded.maps_impressions,
                    website_clicks = excluded.website_clicks,
                    call_clicks = excluded.call_clicks,
                    direction_requests = excluded.direction_requests,
                    conversations = excluded.conversations,
                    bookings = excluded.bookings",
                params![
                    day.location_id,
                    date,
                    day.search_impressions,
                    day.maps_impressions,
                    day.website_clicks,
                    day.call_clicks,
                    day.direction_requests,
                    day.conversations,
                    day.bookings,
                ],
            )?;

            Ok(if exists {
                Upserted::Updated
            } else {
                Upserted::Inserted
            })
        })
    }

    pub fn metric_days(&self, location_id: &str) -> Result<Vec<MetricDay>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT location_id, date, search_impressions, maps_impressions, website_clicks,
                    call_clicks, direction_requests, conversations, bookings
             FROM metric_days WHERE location_id = ?1 ORDER BY date",
        )?;
        let rows = stmt
            .query_map(params![location_id], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    MetricDay {
                        location_id: row.get(0)?,
                        date: NaiveDate::MIN,
                        search_impressions: row.get(2)?,
                        maps_impressions: row.get(3)?,
                        website_clicks: row.get(4)?,
                        call_clicks: row.get(5)?,
                        direction_requests: row.get(6)?,
                        conversations: row.get(7)?,
                        bookings: row.get(8)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(date, mut day)| {
                day.date = parse_date("date", &date)?;
                Ok(day)
            })
            .collect()
    }
}

// ----------------------------------------------------------------------
// Row mapping
// ----------------------------------------------------------------------

const LOCATION_COLUMNS: &str = "id, organization_id, external_profile_id, profile_json,
    profile_synced_at, display_name, address, phone, website, primary_category, description,
    maps_url, auto_reply_enabled, auto_reply_since";

struct RawLocation {
    location: Location,
    profile_json: Option<String>,
    profile_synced_at: Option<String>,
    auto_reply_since: Option<String>,
}

impl RawLocation {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mut location = Location::new(row.get::<_, String>(0)?, row.get(1)?);
        location.external_profile_id = row.get(2)?;
        location.display = DisplayFields {
            display_name: row.get(5)?,
            address: row.get(6)?,
            phone: row.get(7)?,
            website: row.get(8)?,
            primary_category: row.get(9)?,
            description: row.get(10)?,
            maps_url: row.get(11)?,
        };
        location.auto_reply.enabled = row.get(12)?;

        Ok(Self {
            location,
            profile_json: row.get(3)?,
            profile_synced_at: row.get(4)?,
            auto_reply_since: row.get(13)?,
        })
    }

    fn into_location(self) -> Result<Location, StoreError> {
        let mut location = self.location;
        location.profile = self
            .profile_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        location.profile_synced_at = parse_opt_ts("profile_synced_at", self.profile_synced_at)?;
        location.auto_reply.since = self
            .auto_reply_since
            .as_deref()
            .map(|d| parse_date("auto_reply_since", d))
            .transpose()?;
        Ok(location)
    }
}

struct RawCredential {
    identity_id: String,
    platform: String,
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<String>,
    scope: Option<String>,
    external_account_id: Option<String>,
}

impl RawCredential {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            identity_id: row.get(0)?,
            platform: row.get(1)?,
            access_token: row.get(2)?,
            refresh_token: row.get(3)?,
            expires_at: row.get(4)?,
            scope: row.get(5)?,
            external_account_id: row.get(6)?,
        })
    }

    fn into_credential(self) -> Result<Credential, StoreError> {
        Ok(Credential {
            identity_id: self.identity_id,
            platform: parse_platform(&self.platform)?,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: parse_opt_ts("expires_at", self.expires_at)?,
            scope: self.scope,
            external_account_id: self.external_account_id,
        })
    }
}

const CONTENT_COLUMNS: &str = "id, location_id, body, media_url, media_kind, scheduled_at,
    targets_json, status, results_json, status_reason, created_at, published_at";

struct RawContent {
    id: String,
    location_id: String,
    body: String,
    media_url: Option<String>,
    media_kind: Option<String>,
    scheduled_at: Option<String>,
    targets_json: String,
    status: String,
    results_json: String,
    status_reason: Option<String>,
    created_at: String,
    published_at: Option<String>,
}

impl RawContent {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            location_id: row.get(1)?,
            body: row.get(2)?,
            media_url: row.get(3)?,
            media_kind: row.get(4)?,
            scheduled_at: row.get(5)?,
            targets_json: row.get(6)?,
            status: row.get(7)?,
            results_json: row.get(8)?,
            status_reason: row.get(9)?,
            created_at: row.get(10)?,
            published_at: row.get(11)?,
        })
    }

    fn into_item(self) -> Result<ContentItem, StoreError> {
        let media = match self.media_url {
            Some(url) => {
                let kind = match self.media_kind.as_deref() {
                    Some(kind) => kind.parse::<MediaKind>().map_err(|_| StoreError::Corrupt {
                        column: "media_kind",
                        value: kind.to_string(),
                    })?,
                    None => MediaKind::Image,
                };
                Some(MediaRef { url, kind })
            }
            None => None,
        };

        let targets: BTreeSet<Platform> = serde_json::from_str(&self.targets_json)?;
        let results: BTreeMap<Platform, PlatformResult> = serde_json::from_str(&self.results_json)?;
        let status = self
            .status
            .parse::<ContentStatus>()
            .map_err(|_| StoreError::Corrupt {
                column: "status",
                value: self.status.clone(),
            })?;

        Ok(ContentItem {
            id: self.id,
            location_id: self.location_id,
            body: self.body,
            media,
            scheduled_at: parse_opt_ts("scheduled_at", self.scheduled_at)?,
            targets,
            status,
            results,
            status_reason: self.status_reason,
            created_at: parse_ts("created_at", &self.created_at)?,
            published_at: parse_opt_ts("published_at", self.published_at)?,
        })
    }
}

/// Fixed-width UTC timestamp so text comparison orders correctly
pub(crate) fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(column: &'static str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt {
            column,
            value: value.to_string(),
        })
}

fn parse_opt_ts(
    column: &'static str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.as_deref().map(|v| parse_ts(column, v)).transpose()
}

fn parse_date(column: &'static str, value: &str) -> Result<NaiveDate, StoreError> {
    value.parse::<NaiveDate>().map_err(|_| StoreError::Corrupt {
        column,
        value: value.to_string(),
    })
}

fn parse_platform(value: &str) -> Result<Platform, StoreError> {
    value.parse::<Platform>().map_err(|_| StoreError::Corrupt {
        column: "platform",
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn review(external_id: &str, reply: Option<&str>) -> Review {
        Review {
            id: uuid::Uuid::new_v4().to_string(),
            location_id: "loc-1".to_string(),
            external_id: external_id.to_string(),
            reviewer_name: Some("Pat".to_string()),
            rating: 5,
            comment: Some("Great".to_string()),
            reviewed_at: Some(Utc::now()),
            reply_text: reply.map(str::to_string),
            replied_at: None,
            reply_source: None,
            internal_note: None,
        }
    }

    fn store_with_location() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_location(&Location::new("loc-1", None).with_profile_id("locations/1"))
            .unwrap();
        store
    }

    #[test]
    fn test_review_upsert_preserves_local_fields() {
        let store = store_with_location();
        let first = review("accounts/1/locations/1/reviews/r1", None);
        assert_eq!(store.upsert_review(&first).unwrap(), Upserted::Inserted);

        store
            .set_review_note(&first.id, Some("call this customer"))
            .unwrap();

        let mut again = review("accounts/1/locations/1/reviews/r1", Some("Thanks!"));
        again.rating = 4;
        assert_eq!(store.upsert_review(&again).unwrap(), Upserted::Updated);

        let stored = store.reviews_for_location("loc-1").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, first.id);
        assert_eq!(stored[0].rating, 4);
        assert_eq!(stored[0].reply_text.as_deref(), Some("Thanks!"));
        assert_eq!(stored[0].reply_source, Some(ReplySource::External));
        assert_eq!(stored[0].internal_note.as_deref(), Some("call this customer"));
    }

    #[test]
    fn test_due_scheduled_items() {
        let store = store_with_location();
        let now = Utc::now();

        let due = ContentItem::draft("loc-1", "due", [Platform::Google])
            .scheduled_for(now - Duration::minutes(1));
        let later = ContentItem::draft("loc-1", "later", [Platform::Google])
            .scheduled_for(now + Duration::hours(1));
        let draft = ContentItem::draft("loc-1", "draft", [Platform::Google]);

        for item in [&due, &later, &draft] {
            store.save_content_item(item).unwrap();
        }

        let picked = store.due_scheduled_items(now).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, due.id);
    }

    #[test]
    fn test_commit_dispatch_round_trip() {
        let store = store_with_location();
        let item = ContentItem::draft("loc-1", "hello", [Platform::Google, Platform::Facebook])
            .with_media(MediaRef::image("https://cdn.example/a.jpg"));
        store.save_content_item(&item).unwrap();

        let mut results = BTreeMap::new();
        results.insert(Platform::Google, PlatformResult::Published("x1".to_string()));
        results.insert(
            Platform::Facebook,
            PlatformResult::Error("rate_limited".to_string()),
        );
        store
            .commit_dispatch(
                &item.id,
                ContentStatus::PartialFailure,
                &results,
                None,
                Some(Utc::now()),
            )
            .unwrap();

        let stored = store.get_content_item(&item.id).unwrap().unwrap();
        assert_eq!(stored.status, ContentStatus::PartialFailure);
        assert_eq!(stored.results, results);
        assert_eq!(stored.media, item.media);
        assert!(stored.published_at.is_some());
    }

    #[test]
    fn test_identity_order() {
        let store = store_with_location();
        for id in ["b", "a", "c"] {
            store
                .upsert_identity(&Identity {
                    id: id.to_string(),
                    organization_id: Some("org".to_string()),
                    email: None,
                })
                .unwrap();
        }
        store.assign_identity("loc-1", "c").unwrap();
        store.assign_identity("loc-1", "a").unwrap();

        assert_eq!(store.assigned_identity_ids("loc-1").unwrap(), vec!["c", "a"]);
        assert_eq!(
            store.organization_identity_ids("org").unwrap(),
            vec!["b", "a", "c"]
        );
    }

    #[test]
    fn test_metric_day_upsert() {
        let store = store_with_location();
        let date = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let mut day = MetricDay::empty("loc-1", date);
        day.search_impressions = 10;

        assert_eq!(store.upsert_metric_day(&day).unwrap(), Upserted::Inserted);
        day.search_impressions = 12;
        assert_eq!(store.upsert_metric_day(&day).unwrap(), Upserted::Updated);

        let days = store.metric_days("loc-1").unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].search_impressions, 12);
        assert_eq!(days[0].date, date);
    }
}

//! Table definitions. Applied on every open; every statement is idempotent.

pub(super) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS organizations (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    text_generation_key TEXT
);

CREATE TABLE IF NOT EXISTS identities (
    id TEXT PRIMARY KEY,
    organization_id TEXT,
    email TEXT
);

CREATE TABLE IF NOT EXISTS locations (
    id TEXT PRIMARY KEY,
    organization_id TEXT,
    external_profile_id TEXT,
    profile_json TEXT,
    profile_synced_at TEXT,
    display_name TEXT,
    address TEXT,
    phone TEXT,
    website TEXT,
    primary_category TEXT,
    description TEXT,
    maps_url TEXT,
    auto_reply_enabled INTEGER NOT NULL DEFAULT 0,
    auto_reply_since TEXT
);

CREATE TABLE IF NOT EXISTS location_identities (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    location_id TEXT NOT NULL REFERENCES locations(id) ON DELETE CASCADE,
    identity_id TEXT NOT NULL,
    UNIQUE(location_id, identity_id)
);

CREATE TABLE IF NOT EXISTS credentials (
    identity_id TEXT NOT NULL,
    platform TEXT NOT NULL,
    access_token TEXT NOT NULL,
    refresh_token TEXT,
    expires_at TEXT,
    scope TEXT,
    external_account_id TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (identity_id, platform)
);

CREATE TABLE IF NOT EXISTS content_items (
    id TEXT PRIMARY KEY,
    location_id TEXT NOT NULL REFERENCES locations(id) ON DELETE CASCADE,
    body TEXT NOT NULL,
    media_url TEXT,
    media_kind TEXT,
    scheduled_at TEXT,
    targets_json TEXT NOT NULL DEFAULT '[]',
    status TEXT NOT NULL,
    results_json TEXT NOT NULL DEFAULT '{}',
    status_reason TEXT,
    created_at TEXT NOT NULL,
    published_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_content_due ON content_items(status, scheduled_at);

CREATE TABLE IF NOT EXISTS reviews (
    id TEXT PRIMARY KEY,
    location_id TEXT NOT NULL REFERENCES locations(id) ON DELETE CASCADE,
    external_id TEXT NOT NULL UNIQUE,
    reviewer_name TEXT,
    rating INTEGER NOT NULL DEFAULT 0,
    comment TEXT,
    reviewed_at TEXT,
    reply_text TEXT,
    replied_at TEXT,
    reply_source TEXT,
    internal_note TEXT
);

CREATE TABLE IF NOT EXISTS media_assets (
    id TEXT PRIMARY KEY,
    location_id TEXT NOT NULL REFERENCES locations(id) ON DELETE CASCADE,
    external_id TEXT NOT NULL UNIQUE,
    url TEXT,
    thumbnail_url TEXT,
    format TEXT,
    category TEXT,
    view_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT,
    local_label TEXT
);

CREATE TABLE IF NOT EXISTS questions (
    id TEXT PRIMARY KEY,
    location_id TEXT NOT NULL REFERENCES locations(id) ON DELETE CASCADE,
    external_id TEXT NOT NULL UNIQUE,
    text TEXT NOT NULL,
    author TEXT,
    upvote_count INTEGER NOT NULL DEFAULT 0,
    asked_at TEXT,
    internal_note TEXT
);

CREATE TABLE IF NOT EXISTS answers (
    id TEXT PRIMARY KEY,
    question_id TEXT NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
    external_id TEXT NOT NULL UNIQUE,
    text TEXT NOT NULL,
    author TEXT,
    author_type TEXT,
    answered_at TEXT
);

CREATE TABLE IF NOT EXISTS metric_days (
    location_id TEXT NOT NULL REFERENCES locations(id) ON DELETE CASCADE,
    date TEXT NOT NULL,
    search_impressions INTEGER NOT NULL DEFAULT 0,
    maps_impressions INTEGER NOT NULL DEFAULT 0,
    website_clicks INTEGER NOT NULL DEFAULT 0,
    call_clicks INTEGER NOT NULL DEFAULT 0,
    direction_requests INTEGER NOT NULL DEFAULT 0,
    conversations INTEGER NOT NULL DEFAULT 0,
    bookings INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (location_id, date)
);

CREATE TABLE IF NOT EXISTS oauth_states (
    token TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
"#;

//! Rows mirrored from the business-profile platform.
//!
//! Each row carries the external id as its idempotency key. Fields are split
//! into externally-authoritative ones (overwritten on every sync) and
//! local-only ones (never touched by sync).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A customer review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub location_id: String,
    pub external_id: String,
    pub reviewer_name: Option<String>,
    /// 1..=5, 0 when the platform reports no rating
    pub rating: u8,
    pub comment: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reply_text: Option<String>,
    pub replied_at: Option<DateTime<Utc>>,

    // Local-only
    pub reply_source: Option<ReplySource>,
    pub internal_note: Option<String>,
}

/// Who wrote the stored reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    /// Reply found upstream during sync
    External,
    /// Submitted through this core by a person
    Manual,
    /// Generated by the auto-reply job
    Auto,
}

impl ReplySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::External => "external",
            Self::Manual => "manual",
            Self::Auto => "auto",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "external" => Some(Self::External),
            "manual" => Some(Self::Manual),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

/// A photo or video on the profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: String,
    pub location_id: String,
    pub external_id: String,
    pub url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub format: Option<String>,
    pub category: Option<String>,
    pub view_count: i64,
    pub created_at: Option<DateTime<Utc>>,

    // Local-only
    pub local_label: Option<String>,
}

/// A customer question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub location_id: String,
    pub external_id: String,
    pub text: String,
    pub author: Option<String>,
    pub upvote_count: i64,
    pub asked_at: Option<DateTime<Utc>>,

    // Local-only
    pub internal_note: Option<String>,
}

/// An answer to a customer question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: String,
    pub question_id: String,
    pub external_id: String,
    pub text: String,
    pub author: Option<String>,
    /// MERCHANT, LOCAL_GUIDE, REGULAR_USER as reported upstream
    pub author_type: Option<String>,
    pub answered_at: Option<DateTime<Utc>>,
}

/// Daily performance counters for one location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDay {
    pub location_id: String,
    pub date: NaiveDate,
    pub search_impressions: i64,
    pub maps_impressions: i64,
    pub website_clicks: i64,
    pub call_clicks: i64,
    pub direction_requests: i64,
    pub conversations: i64,
    pub bookings: i64,
}

impl MetricDay {
    pub fn empty(location_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            location_id: location_id.into(),
            date,
            search_impressions: 0,
            maps_impressions: 0,
            website_clicks: 0,
            call_clicks: 0,
            direction_requests: 0,
            conversations: 0,
            bookings: 0,
        }
    }
}

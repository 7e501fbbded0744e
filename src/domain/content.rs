//! Content items and their per-platform publish results.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::location::Platform;

/// Prefix marking a failed slot in the result map
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Publishable text plus optional media destined for one or more platforms
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub location_id: String,
    pub body: String,
    pub media: Option<MediaRef>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub targets: BTreeSet<Platform>,
    pub status: ContentStatus,
    pub results: BTreeMap<Platform, PlatformResult>,

    /// Diagnostic reason for the current status (if any)
    pub status_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
}

impl ContentItem {
    /// Create a draft item with a fresh id
    pub fn draft(
        location_id: impl Into<String>,
        body: impl Into<String>,
        targets: impl IntoIterator<Item = Platform>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            location_id: location_id.into(),
            body: body.into(),
            media: None,
            scheduled_at: None,
            targets: targets.into_iter().collect(),
            status: ContentStatus::Draft,
            results: BTreeMap::new(),
            status_reason: None,
            created_at: Utc::now(),
            published_at: None,
        }
    }

    pub fn with_media(mut self, media: MediaRef) -> Self {
        self.media = Some(media);
        self
    }

    /// Mark the item for the scheduled-publish job
    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self.status = ContentStatus::Scheduled;
        self
    }

    /// External id recorded for a platform by a successful dispatch
    pub fn external_id(&self, platform: Platform) -> Option<&str> {
        match self.results.get(&platform) {
            Some(PlatformResult::Published(id)) => Some(id.as_str()),
            _ => None,
        }
    }
}

/// Lifecycle status of a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Scheduled,
    Published,
    PartialFailure,
    Failed,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Published => "published",
            Self::PartialFailure => "partial_failure",
            Self::Failed => "failed",
        }
    }

    /// Terminal statuses are never re-dispatched by the scheduler
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published | Self::PartialFailure | Self::Failed)
    }

    /// Reduce the results of one dispatch into an aggregate status.
    ///
    /// No failures means Published, including the empty case.
    pub fn aggregate<'a>(results: impl IntoIterator<Item = &'a PlatformResult>) -> Self {
        let (mut successes, mut failures) = (0usize, 0usize);
        for result in results {
            if result.is_success() {
                successes += 1;
            } else {
                failures += 1;
            }
        }

        match (successes, failures) {
            (_, 0) => Self::Published,
            (0, _) => Self::Failed,
            _ => Self::PartialFailure,
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "scheduled" => Ok(Self::Scheduled),
            "published" => Ok(Self::Published),
            "partial_failure" => Ok(Self::PartialFailure),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Unknown content status: {}", other)),
        }
    }
}

/// Outcome recorded in one slot of the result map.
///
/// Stored as a plain string: the external id, or `ERROR: <detail>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum PlatformResult {
    Published(String),
    Error(String),
}

impl PlatformResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Published(_))
    }
}

impl From<PlatformResult> for String {
    fn from(result: PlatformResult) -> Self {
        match result {
            PlatformResult::Published(id) => id,
            PlatformResult::Error(detail) => format!("{}{}", ERROR_PREFIX, detail),
        }
    }
}

impl From<String> for PlatformResult {
    fn from(raw: String) -> Self {
        match raw.strip_prefix(ERROR_PREFIX) {
            Some(detail) => Self::Error(detail.to_string()),
            None => Self::Published(raw),
        }
    }
}

impl fmt::Display for PlatformResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Published(id) => f.write_str(id),
            Self::Error(detail) => write!(f, "{}{}", ERROR_PREFIX, detail),
        }
    }
}

/// Stored media reference attached to a content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub url: String,
    pub kind: MediaKind,
}

impl MediaRef {
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: MediaKind::Image,
        }
    }

    pub fn video(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: MediaKind::Video,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" | "photo" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(format!("Unknown media kind: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(id: &str) -> PlatformResult {
        PlatformResult::Published(id.to_string())
    }

    fn err(detail: &str) -> PlatformResult {
        PlatformResult::Error(detail.to_string())
    }

    #[test]
    fn test_aggregate_over_all_failure_counts() {
        for n in 1..=4usize {
            for k in 0..=n {
                let results: Vec<PlatformResult> = (0..n)
                    .map(|i| if i < k { err("boom") } else { ok("id") })
                    .collect();
                let status = ContentStatus::aggregate(&results);

                let expected = if k == 0 {
                    ContentStatus::Published
                } else if k < n {
                    ContentStatus::PartialFailure
                } else {
                    ContentStatus::Failed
                };
                assert_eq!(status, expected, "n={} k={}", n, k);
            }
        }
    }

    #[test]
    fn test_aggregate_empty_is_published() {
        let results: Vec<PlatformResult> = Vec::new();
        assert_eq!(ContentStatus::aggregate(&results), ContentStatus::Published);
    }

    #[test]
    fn test_result_wire_format() {
        let mut results = BTreeMap::new();
        results.insert(Platform::Google, ok("x1"));
        results.insert(Platform::Facebook, err("rate_limited"));

        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["google"], "x1");
        assert_eq!(json["facebook"], "ERROR: rate_limited");

        let back: BTreeMap<Platform, PlatformResult> = serde_json::from_value(json).unwrap();
        assert_eq!(back, results);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ContentStatus::Draft.is_terminal());
        assert!(!ContentStatus::Scheduled.is_terminal());
        assert!(ContentStatus::PartialFailure.is_terminal());
    }
}

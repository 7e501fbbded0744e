//! Locations, identities and the credentials they hold.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// External system a credential belongs to and a content item can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// The business-profile platform itself (local posts)
    Google,
    Facebook,
    Instagram,
    #[serde(rename = "youtube")]
    YouTube,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Google,
        Platform::Facebook,
        Platform::Instagram,
        Platform::YouTube,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::YouTube => "youtube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" | "gbp" => Ok(Self::Google),
            "facebook" | "fb" => Ok(Self::Facebook),
            "instagram" | "ig" => Ok(Self::Instagram),
            "youtube" | "yt" => Ok(Self::YouTube),
            other => Err(format!("Unknown platform: {}", other)),
        }
    }
}

/// A locally managed business profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: String,

    /// Owning organization (if any)
    pub organization_id: Option<String>,

    /// Plain external profile id ("locations/123"), None until linked
    pub external_profile_id: Option<String>,

    /// Last fetched profile, stored verbatim
    pub profile: Option<serde_json::Value>,

    /// When `profile` was last replaced
    pub profile_synced_at: Option<DateTime<Utc>>,

    /// Display fields flattened from `profile`
    #[serde(flatten)]
    pub display: DisplayFields,

    pub auto_reply: AutoReplySettings,
}

impl Location {
    pub fn new(id: impl Into<String>, organization_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            organization_id,
            external_profile_id: None,
            profile: None,
            profile_synced_at: None,
            display: DisplayFields::default(),
            auto_reply: AutoReplySettings::default(),
        }
    }

    /// Link the location to an external profile id
    pub fn with_profile_id(mut self, profile_id: impl Into<String>) -> Self {
        self.external_profile_id = Some(profile_id.into());
        self
    }

    /// Whether the cached profile is younger than `ttl`
    pub fn profile_is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match (self.profile.as_ref(), self.profile_synced_at) {
            (Some(_), Some(synced_at)) => now - synced_at < ttl,
            _ => false,
        }
    }
}

/// Human-facing fields mirrored from the profile blob
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFields {
    pub display_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub primary_category: Option<String>,
    pub description: Option<String>,
    pub maps_url: Option<String>,
}

impl DisplayFields {
    /// Derive every display field from a profile blob.
    ///
    /// Fields absent from the blob come back as None; nothing is carried over
    /// from a previous value.
    pub fn from_profile(profile: &serde_json::Value) -> Self {
        let str_at = |pointer: &str| {
            profile
                .pointer(pointer)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            display_name: str_at("/title"),
            address: format_address(profile.get("storefrontAddress")),
            phone: str_at("/phoneNumbers/primaryPhone"),
            website: str_at("/websiteUri"),
            primary_category: str_at("/categories/primaryCategory/displayName"),
            description: str_at("/profile/description"),
            maps_url: str_at("/metadata/mapsUri"),
        }
    }
}

fn format_address(address: Option<&serde_json::Value>) -> Option<String> {
    let address = address?;
    let mut parts: Vec<String> = address
        .get("addressLines")
        .and_then(|v| v.as_array())
        .map(|lines| {
            lines
                .iter()
                .filter_map(|l| l.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    for key in ["locality", "administrativeArea", "postalCode"] {
        if let Some(value) = address.get(key).and_then(|v| v.as_str()) {
            if !value.is_empty() {
                parts.push(value.to_string());
            }
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// Per-location auto-reply configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoReplySettings {
    pub enabled: bool,

    /// Only reviews left on or after this date are answered
    pub since: Option<NaiveDate>,
}

/// An account able to hold external credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub organization_id: Option<String>,
    pub email: Option<String>,
}

/// Stored OAuth token set for one identity/platform pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub identity_id: String,
    pub platform: Platform,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,

    /// Page/user id the token acts for, where the platform needs one
    pub external_account_id: Option<String>,
}

impl Credential {
    /// A credential without an expiry never expires
    pub fn is_expired(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - skew <= now,
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }
}

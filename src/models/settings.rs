//! Admin configuration models: channels, SLA policies, banners and
//! installed apps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ticket::{ChannelKind, Priority};

/// An inbound support channel (mailbox, chat widget, phone line, ...).
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Channel {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub workspace_id: Uuid,
    pub kind: ChannelKind,
    pub name: String,

    /// Mailbox address, phone number or widget origin
    pub address: Option<String>,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub kind: ChannelKind,
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChannelRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub is_active: Option<bool>,
}

/// Response-time targets for tickets of one priority.
///
/// At most one active policy per priority is honored; when several exist
/// the most recently updated wins.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct SlaPolicy {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub workspace_id: Uuid,
    pub name: String,
    pub priority: Priority,
    pub first_response_minutes: i32,
    pub resolution_minutes: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSlaPolicyRequest {
    pub name: String,
    pub priority: Priority,
    pub first_response_minutes: i32,
    pub resolution_minutes: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSlaPolicyRequest {
    pub name: Option<String>,
    pub first_response_minutes: Option<i32>,
    pub resolution_minutes: Option<i32>,
    pub is_active: Option<bool>,
}

text_enum! {
    pub enum BannerLevel {
        Info => "info",
        Warning => "warning",
        Critical => "critical",
    }
}

/// Announcement shown in the portal and help center.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Banner {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub workspace_id: Uuid,
    pub message: String,
    pub level: BannerLevel,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Banner {
    /// Whether the banner should be displayed at `now`.
    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.starts_at.is_none_or(|start| start <= now)
            && self.ends_at.is_none_or(|end| now < end)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBannerRequest {
    pub message: String,
    #[serde(default = "default_level")]
    pub level: BannerLevel,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

fn default_level() -> BannerLevel {
    BannerLevel::Info
}

#[derive(Debug, Deserialize)]
pub struct UpdateBannerRequest {
    pub message: Option<String>,
    pub level: Option<BannerLevel>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

/// An app from the static registry installed into a workspace.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct InstalledApp {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub workspace_id: Uuid,
    pub app_id: String,
    pub config: serde_json::Value,
    pub is_enabled: bool,
    pub installed_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct InstallAppRequest {
    pub app_id: String,
    #[serde(default = "empty_object")]
    pub config: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Deserialize)]
pub struct UpdateInstalledAppRequest {
    pub config: Option<serde_json::Value>,
    pub is_enabled: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn banner(starts_at: Option<DateTime<Utc>>, ends_at: Option<DateTime<Utc>>) -> Banner {
        Banner {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            message: "Scheduled maintenance".to_string(),
            level: BannerLevel::Warning,
            starts_at,
            ends_at,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn banner_window_is_half_open() {
        let now = Utc::now();
        assert!(banner(None, None).is_visible_at(now));
        assert!(banner(Some(now), Some(now + Duration::hours(1))).is_visible_at(now));
        assert!(!banner(Some(now + Duration::minutes(1)), None).is_visible_at(now));
        assert!(!banner(None, Some(now)).is_visible_at(now));
    }

    #[test]
    fn inactive_banner_is_hidden() {
        let mut hidden = banner(None, None);
        hidden.is_active = false;
        assert!(!hidden.is_visible_at(Utc::now()));
    }
}

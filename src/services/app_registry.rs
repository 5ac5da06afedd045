//! Built-in app registry and UI slot resolution.
//!
//! Apps are not uploaded by tenants; the set of installable apps is the
//! static `APPS` table. A workspace installs an app (with its own config)
//! and the agent UI asks which apps render in a given slot.

use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{error::AppError, models::settings::InstalledApp};

/// Location in the agent or portal UI where an app can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    TicketSidebar,
    TicketToolbar,
    ContactSidebar,
    PortalFooter,
}

impl Slot {
    pub const ALL: &'static [Slot] = &[
        Slot::TicketSidebar,
        Slot::TicketToolbar,
        Slot::ContactSidebar,
        Slot::PortalFooter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::TicketSidebar => "ticket_sidebar",
            Slot::TicketToolbar => "ticket_toolbar",
            Slot::ContactSidebar => "contact_sidebar",
            Slot::PortalFooter => "portal_footer",
        }
    }
}

impl FromStr for Slot {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Slot::ALL
            .iter()
            .copied()
            .find(|slot| slot.as_str() == s)
            .ok_or_else(|| AppError::InvalidRequest(format!("unknown slot '{s}'")))
    }
}

/// A registry entry.
#[derive(Debug, Serialize)]
pub struct AppDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub slots: &'static [Slot],

    /// Config keys that must be present as non-empty strings on install
    pub required_config: &'static [&'static str],
}

pub const APPS: &[AppDefinition] = &[
    AppDefinition {
        id: "shopify-orders",
        name: "Shopify Orders",
        description: "Recent orders for the ticket's contact",
        slots: &[Slot::TicketSidebar, Slot::ContactSidebar],
        required_config: &["shop_domain", "access_token"],
    },
    AppDefinition {
        id: "jira-link",
        name: "Jira",
        description: "Create or link Jira issues from a ticket",
        slots: &[Slot::TicketToolbar, Slot::TicketSidebar],
        required_config: &["base_url", "project_key"],
    },
    AppDefinition {
        id: "stripe-customer",
        name: "Stripe Customer",
        description: "Subscription and payment history for a contact",
        slots: &[Slot::ContactSidebar],
        required_config: &["api_key"],
    },
    AppDefinition {
        id: "status-page",
        name: "Status Page",
        description: "Current system status in the customer portal",
        slots: &[Slot::PortalFooter],
        required_config: &["page_url"],
    },
    AppDefinition {
        id: "time-tracking",
        name: "Time Tracking",
        description: "Log time spent on tickets",
        slots: &[Slot::TicketToolbar],
        required_config: &[],
    },
    AppDefinition {
        id: "csat-survey",
        name: "CSAT Survey",
        description: "Satisfaction survey link for resolved tickets",
        slots: &[Slot::PortalFooter, Slot::TicketSidebar],
        required_config: &[],
    },
];

pub fn find(app_id: &str) -> Option<&'static AppDefinition> {
    APPS.iter().find(|app| app.id == app_id)
}

/// Look up an app for installation, rejecting unknown ids.
pub fn require(app_id: &str) -> Result<&'static AppDefinition, AppError> {
    find(app_id).ok_or_else(|| AppError::InvalidRequest(format!("unknown app '{app_id}'")))
}

/// Config must be a JSON object holding every required key as a
/// non-empty string. Extra keys are kept as-is.
pub fn validate_install_config(app: &AppDefinition, config: &Value) -> Result<(), AppError> {
    let Some(object) = config.as_object() else {
        return Err(AppError::InvalidRequest(
            "app config must be a JSON object".to_string(),
        ));
    };

    let missing: Vec<&str> = app
        .required_config
        .iter()
        .copied()
        .filter(|key| {
            !object
                .get(*key)
                .and_then(Value::as_str)
                .is_some_and(|v| !v.trim().is_empty())
        })
        .collect();

    if !missing.is_empty() {
        return Err(AppError::InvalidRequest(format!(
            "{} requires config: {}",
            app.id,
            missing.join(", ")
        )));
    }
    Ok(())
}

/// An installed app resolved for a slot.
#[derive(Debug, Serialize)]
pub struct SlotApp {
    pub installed_app_id: Uuid,
    pub app_id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

/// Enabled installations declaring `slot`, in registry order.
pub fn apps_for_slot(slot: Slot, installed: &[InstalledApp]) -> Vec<SlotApp> {
    APPS.iter()
        .filter(|app| app.slots.contains(&slot))
        .filter_map(|app| {
            installed
                .iter()
                .find(|i| i.app_id == app.id && i.is_enabled)
                .map(|i| SlotApp {
                    installed_app_id: i.id,
                    app_id: app.id,
                    name: app.name,
                    description: app.description,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn installed(app_id: &str, is_enabled: bool) -> InstalledApp {
        InstalledApp {
            id: Uuid::new_v4(),
            workspace_id: Uuid::nil(),
            app_id: app_id.to_string(),
            config: json!({}),
            is_enabled,
            installed_at: Utc::now(),
        }
    }

    #[test]
    fn registry_ids_are_unique() {
        for (i, app) in APPS.iter().enumerate() {
            assert!(APPS[i + 1..].iter().all(|other| other.id != app.id));
            assert!(!app.slots.is_empty());
        }
    }

    #[test]
    fn slots_parse_from_path_text() {
        assert_eq!("portal_footer".parse::<Slot>().unwrap(), Slot::PortalFooter);
        assert!("sidebar".parse::<Slot>().is_err());
    }

    #[test]
    fn required_keys_must_be_non_empty_strings() {
        let app = require("jira-link").unwrap();
        assert!(
            validate_install_config(app, &json!({"base_url": "https://acme.atlassian.net", "project_key": "SUP"}))
                .is_ok()
        );

        let Err(AppError::InvalidRequest(message)) =
            validate_install_config(app, &json!({"base_url": " ", "project_key": 7}))
        else {
            panic!("expected an invalid request");
        };
        assert!(message.contains("base_url"));
        assert!(message.contains("project_key"));

        assert!(validate_install_config(app, &json!(["base_url"])).is_err());
    }

    #[test]
    fn apps_without_required_config_accept_empty_object() {
        assert!(validate_install_config(require("time-tracking").unwrap(), &json!({})).is_ok());
        assert!(require("does-not-exist").is_err());
    }

    #[test]
    fn slot_lists_enabled_apps_in_registry_order() {
        let installed = vec![
            installed("csat-survey", true),
            installed("jira-link", true),
            installed("shopify-orders", false),
        ];

        let sidebar: Vec<&str> = apps_for_slot(Slot::TicketSidebar, &installed)
            .iter()
            .map(|a| a.app_id)
            .collect();
        assert_eq!(sidebar, vec!["jira-link", "csat-survey"]);

        assert!(apps_for_slot(Slot::ContactSidebar, &installed).is_empty());
    }
}

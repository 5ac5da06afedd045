//! Automation rule models.
//!
//! An automation is a stored rule: when `trigger` fires for a ticket and
//! the `conditions` match (all of them, or any of them, per `match_mode`),
//! the `actions` are applied. Conditions and actions are stored as JSONB
//! and decoded into the typed enums below.
//!
//! # JSON Example
//!
//! ```json
//! {
//!   "name": "Escalate outages",
//!   "trigger": "ticket_created",
//!   "match_mode": "any",
//!   "conditions": [
//!     { "field": "subject", "operator": "contains", "value": "outage" },
//!     { "field": "tags", "operator": "contains", "value": "vip" }
//!   ],
//!   "actions": [
//!     { "type": "set_priority", "priority": "urgent" },
//!     { "type": "add_tag", "tag": "escalated" }
//!   ],
//!   "priority": 10,
//!   "stop_processing": true
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use uuid::Uuid;

use super::ticket::{ChannelKind, Priority, TicketStatus};
use crate::error::AppError;

text_enum! {
    /// Ticket event an automation listens to.
    pub enum Trigger {
        TicketCreated => "ticket_created",
        TicketUpdated => "ticket_updated",
        CustomerReplied => "customer_replied",
        AgentReplied => "agent_replied",
    }
}

text_enum! {
    pub enum MatchMode {
        /// Every condition must hold
        All => "all",
        /// At least one condition must hold
        Any => "any",
    }
}

/// Ticket attribute a condition inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionField {
    Status,
    Priority,
    Channel,
    Subject,
    Description,
    AssigneeId,
    ContactEmail,
    Tags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    In,
    IsSet,
    IsNotSet,
}

/// One comparison of a ticket field against a stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: ConditionField,
    pub operator: Operator,

    /// String for scalar operators, array of strings for `in`, ignored for
    /// `is_set` / `is_not_set`
    #[serde(default)]
    pub value: Value,
}

/// A change an automation (or an approved AI proposal) applies to a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    SetStatus { status: TicketStatus },
    SetPriority { priority: Priority },
    /// `user_id: null` unassigns
    Assign { user_id: Option<Uuid> },
    AddTag { tag: String },
    RemoveTag { tag: String },
    /// Internal note, agents only
    AddNote { body: String },
    /// Public reply visible to the customer
    SendReply { body: String },
}

impl Action {
    /// Every action kind, as stored in `ai_actions.kind` and
    /// `ai_settings.auto_approve_kinds`.
    pub const KINDS: &'static [&'static str] = &[
        "set_status",
        "set_priority",
        "assign",
        "add_tag",
        "remove_tag",
        "add_note",
        "send_reply",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Action::SetStatus { .. } => "set_status",
            Action::SetPriority { .. } => "set_priority",
            Action::Assign { .. } => "assign",
            Action::AddTag { .. } => "add_tag",
            Action::RemoveTag { .. } => "remove_tag",
            Action::AddNote { .. } => "add_note",
            Action::SendReply { .. } => "send_reply",
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        match self {
            Action::AddTag { tag } | Action::RemoveTag { tag } if tag.trim().is_empty() => Err(
                AppError::InvalidRequest(format!("{}: tag must not be empty", self.kind())),
            ),
            Action::AddNote { body } | Action::SendReply { body } if body.trim().is_empty() => {
                Err(AppError::InvalidRequest(format!(
                    "{}: body must not be empty",
                    self.kind()
                )))
            }
            _ => Ok(()),
        }
    }
}

impl ConditionField {
    fn is_text(&self) -> bool {
        matches!(
            self,
            ConditionField::Subject | ConditionField::Description | ConditionField::ContactEmail
        )
    }

    /// Check that `text` is a legal value for enum-valued fields.
    fn check_value(&self, text: &str) -> Result<(), AppError> {
        match self {
            ConditionField::Status => text.parse::<TicketStatus>().map(|_| ()),
            ConditionField::Priority => text.parse::<Priority>().map(|_| ()),
            ConditionField::Channel => text.parse::<ChannelKind>().map(|_| ()),
            ConditionField::AssigneeId => Uuid::parse_str(text).map(|_| ()).map_err(|_| {
                AppError::InvalidRequest(format!("'{text}' is not a valid user id"))
            }),
            _ => Ok(()),
        }
    }
}

impl Condition {
    /// Reject operator/value combinations the engine cannot evaluate.
    pub fn validate(&self) -> Result<(), AppError> {
        let invalid = |msg: &str| {
            Err(AppError::InvalidRequest(format!(
                "condition on {:?}: {msg}",
                self.field
            )))
        };

        match self.operator {
            Operator::IsSet | Operator::IsNotSet => Ok(()),
            Operator::In => {
                let Some(items) = self.value.as_array() else {
                    return invalid("'in' expects an array of strings");
                };
                if items.is_empty() {
                    return invalid("'in' expects at least one value");
                }
                for item in items {
                    let Some(text) = item.as_str() else {
                        return invalid("'in' expects an array of strings");
                    };
                    self.field.check_value(text)?;
                }
                Ok(())
            }
            Operator::Contains | Operator::NotContains | Operator::StartsWith => {
                let Some(text) = self.value.as_str() else {
                    return invalid("expects a string value");
                };
                let allowed = self.field.is_text()
                    || (self.field == ConditionField::Tags && self.operator != Operator::StartsWith);
                if !allowed {
                    return invalid("operator only applies to text fields");
                }
                if text.trim().is_empty() {
                    return invalid("value must not be empty");
                }
                Ok(())
            }
            Operator::Equals | Operator::NotEquals => {
                if self.field == ConditionField::Tags {
                    return invalid("use contains/not_contains for tags");
                }
                let Some(text) = self.value.as_str() else {
                    return invalid("expects a string value");
                };
                self.field.check_value(text)
            }
        }
    }
}

/// Represents an automation record from the `automations` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Automation {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub workspace_id: Uuid,
    pub name: String,
    pub trigger: Trigger,
    pub match_mode: MatchMode,
    pub conditions: Json<Vec<Condition>>,
    pub actions: Json<Vec<Action>>,

    /// Evaluation order, lowest first
    pub priority: i32,

    /// When this rule matches, rules after it are skipped
    pub stop_processing: bool,

    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Audit row written for every automation that fired.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AutomationRun {
    pub id: Uuid,
    pub automation_id: Uuid,
    pub ticket_id: Uuid,
    pub trigger: Trigger,
    pub actions: Json<Vec<Action>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAutomationRequest {
    pub name: String,
    pub trigger: Trigger,
    #[serde(default = "default_match_mode")]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub stop_processing: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_match_mode() -> MatchMode {
    MatchMode::All
}

fn default_priority() -> i32 {
    100
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UpdateAutomationRequest {
    pub name: Option<String>,
    pub trigger: Option<Trigger>,
    pub match_mode: Option<MatchMode>,
    pub conditions: Option<Vec<Condition>>,
    pub actions: Option<Vec<Action>>,
    pub priority: Option<i32>,
    pub stop_processing: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct TestAutomationRequest {
    pub ticket_id: Uuid,
}

/// Validate the condition and action lists of a rule before saving.
pub fn validate_rule(conditions: &[Condition], actions: &[Action]) -> Result<(), AppError> {
    if actions.is_empty() {
        return Err(AppError::InvalidRequest(
            "an automation needs at least one action".to_string(),
        ));
    }
    conditions.iter().try_for_each(Condition::validate)?;
    actions.iter().try_for_each(Action::validate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn condition(value: Value) -> Condition {
        serde_json::from_value(value).expect("condition json")
    }

    #[test]
    fn actions_use_a_type_tag() {
        let action: Action =
            serde_json::from_value(json!({"type": "set_priority", "priority": "urgent"})).unwrap();
        assert_eq!(
            action,
            Action::SetPriority {
                priority: Priority::Urgent
            }
        );
        assert_eq!(action.kind(), "set_priority");

        let unassign: Action =
            serde_json::from_value(json!({"type": "assign", "user_id": null})).unwrap();
        assert_eq!(unassign, Action::Assign { user_id: None });
    }

    #[test]
    fn every_action_kind_is_listed() {
        let samples = [
            Action::SetStatus { status: TicketStatus::Open },
            Action::SetPriority { priority: Priority::Low },
            Action::Assign { user_id: None },
            Action::AddTag { tag: "a".into() },
            Action::RemoveTag { tag: "a".into() },
            Action::AddNote { body: "n".into() },
            Action::SendReply { body: "r".into() },
        ];
        for action in samples {
            assert!(Action::KINDS.contains(&action.kind()));
        }
    }

    #[test]
    fn blank_tag_and_body_are_rejected() {
        assert!(Action::AddTag { tag: " ".into() }.validate().is_err());
        assert!(Action::SendReply { body: String::new() }.validate().is_err());
        assert!(Action::AddNote { body: "ok".into() }.validate().is_ok());
    }

    #[test]
    fn enum_fields_validate_their_values() {
        assert!(condition(json!({"field": "status", "operator": "equals", "value": "open"}))
            .validate()
            .is_ok());
        assert!(condition(json!({"field": "status", "operator": "equals", "value": "new"}))
            .validate()
            .is_err());
        assert!(condition(json!({"field": "priority", "operator": "in", "value": ["high", "urgent"]}))
            .validate()
            .is_ok());
        assert!(condition(json!({"field": "priority", "operator": "in", "value": []}))
            .validate()
            .is_err());
        assert!(condition(json!({"field": "assignee_id", "operator": "equals", "value": "nope"}))
            .validate()
            .is_err());
    }

    #[test]
    fn text_operators_only_apply_to_text_fields() {
        assert!(condition(json!({"field": "subject", "operator": "contains", "value": "refund"}))
            .validate()
            .is_ok());
        assert!(condition(json!({"field": "priority", "operator": "contains", "value": "hi"}))
            .validate()
            .is_err());
        assert!(condition(json!({"field": "tags", "operator": "contains", "value": "vip"}))
            .validate()
            .is_ok());
        assert!(condition(json!({"field": "tags", "operator": "equals", "value": "vip"}))
            .validate()
            .is_err());
        assert!(condition(json!({"field": "tags", "operator": "starts_with", "value": "v"}))
            .validate()
            .is_err());
    }

    #[test]
    fn presence_operators_ignore_value() {
        assert!(condition(json!({"field": "assignee_id", "operator": "is_not_set"}))
            .validate()
            .is_ok());
    }

    #[test]
    fn rules_need_an_action() {
        assert!(validate_rule(&[], &[]).is_err());
        assert!(validate_rule(&[], &[Action::AddTag { tag: "x".into() }]).is_ok());
    }

    #[test]
    fn create_request_defaults() {
        let request: CreateAutomationRequest = serde_json::from_value(json!({
            "name": "Tag billing",
            "trigger": "ticket_created",
            "actions": [{"type": "add_tag", "tag": "billing"}]
        }))
        .unwrap();
        assert_eq!(request.match_mode, MatchMode::All);
        assert_eq!(request.priority, 100);
        assert!(request.is_active);
        assert!(!request.stop_processing);
        assert!(request.conditions.is_empty());
    }
}

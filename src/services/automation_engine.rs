//! Automation rule interpreter.
//!
//! The engine is pure: it takes a snapshot of a ticket and the stored
//! rules, and returns the resulting snapshot plus the side effects (notes,
//! replies) and the list of rules that fired. Persisting the outcome is
//! `ticket_service`'s job.
//!
//! # Evaluation
//!
//! 1. Keep active rules for the trigger, ordered by `priority` then `created_at`
//! 2. For each rule, test its conditions against the *current* snapshot
//! 3. On a match, apply its actions to the snapshot; later rules see the result
//! 4. Stop after a matching rule with `stop_processing`
//!
//! Changes made here never fire further triggers.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{
    automation::{Action, Automation, Condition, ConditionField, MatchMode, Operator, Trigger},
    ticket::{ChannelKind, Priority, Ticket, TicketStatus, normalize_tag},
};

/// The ticket attributes rules can read and write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketSnapshot {
    pub status: TicketStatus,
    pub priority: Priority,
    pub channel: ChannelKind,
    pub subject: String,
    pub description: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub contact_email: Option<String>,
    pub tags: BTreeSet<String>,
}

impl TicketSnapshot {
    pub fn new(ticket: &Ticket, contact_email: Option<String>, tags: Vec<String>) -> Self {
        Self {
            status: ticket.status,
            priority: ticket.priority,
            channel: ticket.channel,
            subject: ticket.subject.clone(),
            description: ticket.description.clone(),
            assignee_id: ticket.assignee_id,
            contact_email,
            tags: tags.iter().map(|t| normalize_tag(t)).collect(),
        }
    }
}

/// Messages produced by `add_note` and `send_reply` actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Effects {
    pub notes: Vec<String>,
    pub replies: Vec<String>,
}

/// A rule that matched, with the actions it applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiredRule {
    pub automation_id: Uuid,
    pub name: String,
    pub actions: Vec<Action>,
}

/// Result of running the rules for one trigger.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub snapshot: TicketSnapshot,
    pub effects: Effects,
    pub fired: Vec<FiredRule>,
}

/// Field-level difference between two snapshots, plus message effects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketChanges {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<Option<Uuid>>,
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
    pub effects: Effects,
}

impl TicketChanges {
    pub fn between(before: &TicketSnapshot, after: &TicketSnapshot, effects: Effects) -> Self {
        Self {
            status: (before.status != after.status).then_some(after.status),
            priority: (before.priority != after.priority).then_some(after.priority),
            assignee_id: (before.assignee_id != after.assignee_id).then_some(after.assignee_id),
            add_tags: after.tags.difference(&before.tags).cloned().collect(),
            remove_tags: before.tags.difference(&after.tags).cloned().collect(),
            effects,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.priority.is_none()
            && self.assignee_id.is_none()
            && self.add_tags.is_empty()
            && self.remove_tags.is_empty()
            && self.effects.notes.is_empty()
            && self.effects.replies.is_empty()
    }
}

/// Run every applicable rule for `trigger` against `snapshot`.
pub fn run(trigger: Trigger, snapshot: TicketSnapshot, automations: &[Automation]) -> Outcome {
    let mut rules: Vec<&Automation> = automations
        .iter()
        .filter(|a| a.is_active && a.trigger == trigger)
        .collect();
    rules.sort_by_key(|a| (a.priority, a.created_at));

    let mut outcome = Outcome {
        snapshot,
        effects: Effects::default(),
        fired: Vec::new(),
    };

    for rule in rules {
        if !matches(rule.match_mode, &rule.conditions.0, &outcome.snapshot) {
            continue;
        }

        for action in &rule.actions.0 {
            apply(&mut outcome.snapshot, action, &mut outcome.effects);
        }
        outcome.fired.push(FiredRule {
            automation_id: rule.id,
            name: rule.name.clone(),
            actions: rule.actions.0.clone(),
        });

        if rule.stop_processing {
            break;
        }
    }

    outcome
}

/// Whether `conditions` hold for `snapshot` under `mode`.
///
/// An empty condition list always matches.
pub fn matches(mode: MatchMode, conditions: &[Condition], snapshot: &TicketSnapshot) -> bool {
    if conditions.is_empty() {
        return true;
    }
    match mode {
        MatchMode::All => conditions.iter().all(|c| evaluate(c, snapshot)),
        MatchMode::Any => conditions.iter().any(|c| evaluate(c, snapshot)),
    }
}

enum FieldValue<'a> {
    Text(Option<String>),
    Tags(&'a BTreeSet<String>),
}

fn field_value<'a>(field: ConditionField, snapshot: &'a TicketSnapshot) -> FieldValue<'a> {
    let text = match field {
        ConditionField::Status => Some(snapshot.status.as_str().to_string()),
        ConditionField::Priority => Some(snapshot.priority.as_str().to_string()),
        ConditionField::Channel => Some(snapshot.channel.as_str().to_string()),
        ConditionField::Subject => Some(snapshot.subject.clone()),
        ConditionField::Description => snapshot.description.clone(),
        ConditionField::AssigneeId => snapshot.assignee_id.map(|id| id.to_string()),
        ConditionField::ContactEmail => snapshot.contact_email.clone(),
        ConditionField::Tags => return FieldValue::Tags(&snapshot.tags),
    };
    FieldValue::Text(text.filter(|t| !t.is_empty()).map(|t| t.to_lowercase()))
}

fn lowered(value: &Value) -> Option<String> {
    value.as_str().map(str::to_lowercase)
}

/// Evaluate a single condition. Comparisons are case-insensitive; a value
/// of the wrong JSON shape never matches.
pub fn evaluate(condition: &Condition, snapshot: &TicketSnapshot) -> bool {
    let value = field_value(condition.field, snapshot);

    match condition.operator {
        Operator::IsSet => is_set(&value),
        Operator::IsNotSet => !is_set(&value),
        Operator::Equals => lowered(&condition.value).is_some_and(|expected| equals(&value, &expected)),
        Operator::NotEquals => {
            lowered(&condition.value).is_some_and(|expected| !equals(&value, &expected))
        }
        Operator::Contains => {
            lowered(&condition.value).is_some_and(|needle| contains(&value, &needle))
        }
        Operator::NotContains => {
            lowered(&condition.value).is_some_and(|needle| !contains(&value, &needle))
        }
        Operator::StartsWith => lowered(&condition.value).is_some_and(|prefix| match &value {
            FieldValue::Text(Some(text)) => text.starts_with(&prefix),
            _ => false,
        }),
        Operator::In => condition
            .value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(lowered)
                    .any(|expected| equals(&value, &expected))
            })
            .unwrap_or(false),
    }
}

fn is_set(value: &FieldValue<'_>) -> bool {
    match value {
        FieldValue::Text(text) => text.is_some(),
        FieldValue::Tags(tags) => !tags.is_empty(),
    }
}

fn equals(value: &FieldValue<'_>, expected: &str) -> bool {
    match value {
        FieldValue::Text(Some(text)) => text == expected,
        FieldValue::Text(None) => false,
        FieldValue::Tags(tags) => tags.contains(expected.trim()),
    }
}

fn contains(value: &FieldValue<'_>, needle: &str) -> bool {
    match value {
        FieldValue::Text(Some(text)) => text.contains(needle),
        FieldValue::Text(None) => false,
        FieldValue::Tags(tags) => tags.contains(&normalize_tag(needle)),
    }
}

/// Apply one action to the snapshot, collecting message effects.
pub fn apply(snapshot: &mut TicketSnapshot, action: &Action, effects: &mut Effects) {
    match action {
        Action::SetStatus { status } => snapshot.status = *status,
        Action::SetPriority { priority } => snapshot.priority = *priority,
        Action::Assign { user_id } => snapshot.assignee_id = *user_id,
        Action::AddTag { tag } => {
            snapshot.tags.insert(normalize_tag(tag));
        }
        Action::RemoveTag { tag } => {
            snapshot.tags.remove(&normalize_tag(tag));
        }
        Action::AddNote { body } => effects.notes.push(body.clone()),
        Action::SendReply { body } => effects.replies.push(body.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use sqlx::types::Json;

    fn snapshot() -> TicketSnapshot {
        TicketSnapshot {
            status: TicketStatus::Open,
            priority: Priority::Normal,
            channel: ChannelKind::Email,
            subject: "Refund for order #1234".to_string(),
            description: Some("I was charged twice".to_string()),
            assignee_id: None,
            contact_email: Some("Jane@Example.com".to_string()),
            tags: BTreeSet::from(["vip".to_string()]),
        }
    }

    fn cond(value: serde_json::Value) -> Condition {
        serde_json::from_value(value).expect("condition json")
    }

    fn rule(
        name: &str,
        trigger: Trigger,
        priority: i32,
        conditions: Vec<Condition>,
        actions: Vec<Action>,
    ) -> Automation {
        let now = Utc::now();
        Automation {
            id: Uuid::new_v4(),
            workspace_id: Uuid::nil(),
            name: name.to_string(),
            trigger,
            match_mode: MatchMode::All,
            conditions: Json(conditions),
            actions: Json(actions),
            priority,
            stop_processing: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn text_conditions_are_case_insensitive() {
        let s = snapshot();
        assert!(evaluate(
            &cond(json!({"field": "subject", "operator": "contains", "value": "REFUND"})),
            &s
        ));
        assert!(evaluate(
            &cond(json!({"field": "contact_email", "operator": "equals", "value": "jane@example.com"})),
            &s
        ));
        assert!(evaluate(
            &cond(json!({"field": "subject", "operator": "starts_with", "value": "refund"})),
            &s
        ));
        assert!(!evaluate(
            &cond(json!({"field": "description", "operator": "contains", "value": "login"})),
            &s
        ));
        assert!(evaluate(
            &cond(json!({"field": "description", "operator": "not_contains", "value": "login"})),
            &s
        ));
    }

    #[test]
    fn enum_fields_compare_by_text() {
        let s = snapshot();
        assert!(evaluate(
            &cond(json!({"field": "status", "operator": "equals", "value": "open"})),
            &s
        ));
        assert!(evaluate(
            &cond(json!({"field": "priority", "operator": "in", "value": ["low", "normal"]})),
            &s
        ));
        assert!(evaluate(
            &cond(json!({"field": "channel", "operator": "not_equals", "value": "chat"})),
            &s
        ));
    }

    #[test]
    fn presence_operators() {
        let mut s = snapshot();
        assert!(evaluate(
            &cond(json!({"field": "assignee_id", "operator": "is_not_set"})),
            &s
        ));
        s.assignee_id = Some(Uuid::new_v4());
        assert!(evaluate(&cond(json!({"field": "assignee_id", "operator": "is_set"})), &s));
        s.description = Some(String::new());
        assert!(evaluate(
            &cond(json!({"field": "description", "operator": "is_not_set"})),
            &s
        ));
    }

    #[test]
    fn tags_use_membership() {
        let s = snapshot();
        assert!(evaluate(
            &cond(json!({"field": "tags", "operator": "contains", "value": " VIP "})),
            &s
        ));
        assert!(evaluate(
            &cond(json!({"field": "tags", "operator": "not_contains", "value": "billing"})),
            &s
        ));
        assert!(evaluate(&cond(json!({"field": "tags", "operator": "is_set"})), &s));
    }

    #[test]
    fn missing_or_malformed_values_never_match() {
        let mut s = snapshot();
        s.contact_email = None;
        assert!(!evaluate(
            &cond(json!({"field": "contact_email", "operator": "equals", "value": "a@b.test"})),
            &s
        ));
        assert!(!evaluate(
            &cond(json!({"field": "subject", "operator": "contains", "value": 42})),
            &s
        ));
        assert!(!evaluate(
            &cond(json!({"field": "priority", "operator": "in", "value": "normal"})),
            &s
        ));
    }

    #[test]
    fn match_modes() {
        let s = snapshot();
        let hit = cond(json!({"field": "status", "operator": "equals", "value": "open"}));
        let miss = cond(json!({"field": "status", "operator": "equals", "value": "closed"}));
        assert!(matches(MatchMode::All, &[], &s));
        assert!(!matches(MatchMode::All, &[hit.clone(), miss.clone()], &s));
        assert!(matches(MatchMode::Any, &[hit, miss], &s));
    }

    #[test]
    fn rules_run_in_priority_order_and_see_earlier_changes() {
        let escalate = rule(
            "escalate vip",
            Trigger::TicketCreated,
            20,
            vec![cond(json!({"field": "tags", "operator": "contains", "value": "vip"}))],
            vec![Action::SetPriority { priority: Priority::Urgent }],
        );
        let page = rule(
            "page on urgent",
            Trigger::TicketCreated,
            30,
            vec![cond(json!({"field": "priority", "operator": "equals", "value": "urgent"}))],
            vec![Action::AddNote { body: "Paging on-call".into() }],
        );
        // Stored out of order on purpose.
        let outcome = run(Trigger::TicketCreated, snapshot(), &[page, escalate]);

        assert_eq!(outcome.snapshot.priority, Priority::Urgent);
        assert_eq!(outcome.effects.notes, vec!["Paging on-call".to_string()]);
        let names: Vec<_> = outcome.fired.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["escalate vip", "page on urgent"]);
    }

    #[test]
    fn equal_priorities_fall_back_to_creation_order() {
        let mut first = rule("first", Trigger::TicketCreated, 10, vec![], vec![
            Action::AddTag { tag: "a".into() },
        ]);
        let mut second = rule("second", Trigger::TicketCreated, 10, vec![], vec![
            Action::AddTag { tag: "b".into() },
        ]);
        first.created_at = Utc::now() - Duration::hours(1);
        second.created_at = Utc::now();

        let outcome = run(Trigger::TicketCreated, snapshot(), &[second, first]);
        let names: Vec<_> = outcome.fired.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn stop_processing_halts_later_rules() {
        let mut stopper = rule("stopper", Trigger::TicketCreated, 1, vec![], vec![
            Action::AddTag { tag: "triaged".into() },
        ]);
        stopper.stop_processing = true;
        let later = rule("later", Trigger::TicketCreated, 2, vec![], vec![
            Action::AddTag { tag: "never".into() },
        ]);

        let outcome = run(Trigger::TicketCreated, snapshot(), &[stopper, later]);
        assert_eq!(outcome.fired.len(), 1);
        assert!(outcome.snapshot.tags.contains("triaged"));
        assert!(!outcome.snapshot.tags.contains("never"));
    }

    #[test]
    fn non_matching_stop_rule_does_not_halt() {
        let mut stopper = rule(
            "stopper",
            Trigger::TicketCreated,
            1,
            vec![cond(json!({"field": "status", "operator": "equals", "value": "closed"}))],
            vec![Action::AddTag { tag: "x".into() }],
        );
        stopper.stop_processing = true;
        let later = rule("later", Trigger::TicketCreated, 2, vec![], vec![
            Action::AddTag { tag: "y".into() },
        ]);

        let outcome = run(Trigger::TicketCreated, snapshot(), &[stopper, later]);
        let names: Vec<_> = outcome.fired.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["later"]);
    }

    #[test]
    fn other_triggers_and_inactive_rules_are_skipped() {
        let other = rule("other trigger", Trigger::CustomerReplied, 1, vec![], vec![
            Action::AddTag { tag: "x".into() },
        ]);
        let mut inactive = rule("inactive", Trigger::TicketCreated, 1, vec![], vec![
            Action::AddTag { tag: "y".into() },
        ]);
        inactive.is_active = false;

        let outcome = run(Trigger::TicketCreated, snapshot(), &[other, inactive]);
        assert!(outcome.fired.is_empty());
        assert_eq!(outcome.snapshot, snapshot());
    }

    #[test]
    fn changes_capture_the_diff() {
        let before = snapshot();
        let assignee = Uuid::new_v4();
        let actions = vec![
            Action::SetStatus { status: TicketStatus::Pending },
            Action::Assign { user_id: Some(assignee) },
            Action::AddTag { tag: "Billing".into() },
            Action::RemoveTag { tag: "vip".into() },
            Action::SendReply { body: "We're on it".into() },
        ];
        let outcome = run(
            Trigger::TicketCreated,
            before.clone(),
            &[rule("all", Trigger::TicketCreated, 1, vec![], actions)],
        );

        let changes = TicketChanges::between(&before, &outcome.snapshot, outcome.effects);
        assert_eq!(changes.status, Some(TicketStatus::Pending));
        assert_eq!(changes.priority, None);
        assert_eq!(changes.assignee_id, Some(Some(assignee)));
        assert_eq!(changes.add_tags, vec!["billing".to_string()]);
        assert_eq!(changes.remove_tags, vec!["vip".to_string()]);
        assert_eq!(changes.effects.replies, vec!["We're on it".to_string()]);
        assert!(!changes.is_empty());
    }

    #[test]
    fn add_then_remove_cancels_out() {
        let before = snapshot();
        let mut after = before.clone();
        let mut effects = Effects::default();
        apply(&mut after, &Action::AddTag { tag: "temp".into() }, &mut effects);
        apply(&mut after, &Action::RemoveTag { tag: "TEMP".into() }, &mut effects);
        assert!(TicketChanges::between(&before, &after, effects).is_empty());
    }
}

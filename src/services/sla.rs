//! SLA due-time computation and breach evaluation.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{settings::SlaPolicy, ticket::Ticket};

/// Due times stamped on a ticket from its priority's policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlaTargets {
    pub first_response_due_at: Option<DateTime<Utc>>,
    pub resolution_due_at: Option<DateTime<Utc>>,
}

/// Due times for a ticket created at `created_at`. No policy, no targets.
pub fn targets(created_at: DateTime<Utc>, policy: Option<&SlaPolicy>) -> SlaTargets {
    match policy {
        Some(policy) => SlaTargets {
            first_response_due_at: Some(
                created_at + Duration::minutes(i64::from(policy.first_response_minutes)),
            ),
            resolution_due_at: Some(
                created_at + Duration::minutes(i64::from(policy.resolution_minutes)),
            ),
        },
        None => SlaTargets::default(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaState {
    /// No targets apply
    None,
    Ok,
    /// Less than a quarter of the window remains
    AtRisk,
    Breached,
}

fn check(
    created_at: DateTime<Utc>,
    due: Option<DateTime<Utc>>,
    fulfilled_at: Option<DateTime<Utc>>,
    done: bool,
    now: DateTime<Utc>,
) -> SlaState {
    let Some(due) = due else {
        return SlaState::None;
    };

    match fulfilled_at {
        Some(at) if at > due => SlaState::Breached,
        Some(_) => SlaState::Ok,
        // Finished without ever meeting this target (e.g. resolved with no reply).
        None if done => SlaState::None,
        None if now > due => SlaState::Breached,
        None => {
            let window = due - created_at;
            let remaining = due - now;
            if remaining * 4 <= window {
                SlaState::AtRisk
            } else {
                SlaState::Ok
            }
        }
    }
}

/// SLA state of `ticket` at `now`: the worst of its first-response and
/// resolution targets.
pub fn evaluate(ticket: &Ticket, now: DateTime<Utc>) -> SlaState {
    let done = ticket.status.is_done();
    let first_response = check(
        ticket.created_at,
        ticket.first_response_due_at,
        ticket.first_response_at,
        done,
        now,
    );
    let resolution = check(
        ticket.created_at,
        ticket.resolution_due_at,
        ticket.resolved_at.or(ticket.closed_at),
        done,
        now,
    );
    first_response.max(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ticket::{ChannelKind, Priority, TicketStatus};
    use uuid::Uuid;

    fn policy(first: i32, resolution: i32) -> SlaPolicy {
        let now = Utc::now();
        SlaPolicy {
            id: Uuid::new_v4(),
            workspace_id: Uuid::nil(),
            name: "Urgent".to_string(),
            priority: Priority::Urgent,
            first_response_minutes: first,
            resolution_minutes: resolution,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn ticket(created_at: DateTime<Utc>, targets: SlaTargets) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            workspace_id: Uuid::nil(),
            number: 1,
            subject: "Down".to_string(),
            description: None,
            status: TicketStatus::Open,
            priority: Priority::Urgent,
            channel: ChannelKind::Email,
            contact_id: None,
            assignee_id: None,
            first_response_due_at: targets.first_response_due_at,
            resolution_due_at: targets.resolution_due_at,
            first_response_at: None,
            resolved_at: None,
            closed_at: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn targets_offset_from_creation() {
        let created = Utc::now();
        let t = targets(created, Some(&policy(30, 240)));
        assert_eq!(t.first_response_due_at, Some(created + Duration::minutes(30)));
        assert_eq!(t.resolution_due_at, Some(created + Duration::minutes(240)));
        assert_eq!(targets(created, None), SlaTargets::default());
    }

    #[test]
    fn no_targets_means_no_state() {
        let now = Utc::now();
        assert_eq!(evaluate(&ticket(now, SlaTargets::default()), now), SlaState::None);
    }

    #[test]
    fn fresh_ticket_is_ok_then_at_risk_then_breached() {
        let created = Utc::now();
        let t = ticket(created, targets(created, Some(&policy(60, 600))));

        assert_eq!(evaluate(&t, created + Duration::minutes(10)), SlaState::Ok);
        assert_eq!(evaluate(&t, created + Duration::minutes(50)), SlaState::AtRisk);
        assert_eq!(evaluate(&t, created + Duration::minutes(61)), SlaState::Breached);
    }

    #[test]
    fn late_first_response_stays_breached() {
        let created = Utc::now();
        let mut t = ticket(created, targets(created, Some(&policy(60, 600))));
        t.first_response_at = Some(created + Duration::minutes(90));
        assert_eq!(evaluate(&t, created + Duration::minutes(100)), SlaState::Breached);
    }

    #[test]
    fn resolved_in_time_is_ok() {
        let created = Utc::now();
        let mut t = ticket(created, targets(created, Some(&policy(60, 600))));
        t.first_response_at = Some(created + Duration::minutes(5));
        t.status = TicketStatus::Resolved;
        t.resolved_at = Some(created + Duration::minutes(120));
        assert_eq!(evaluate(&t, created + Duration::days(3)), SlaState::Ok);
    }

    #[test]
    fn resolved_without_reply_ignores_first_response_target() {
        let created = Utc::now();
        let mut t = ticket(created, targets(created, Some(&policy(60, 600))));
        t.status = TicketStatus::Closed;
        t.closed_at = Some(created + Duration::minutes(30));
        assert_eq!(evaluate(&t, created + Duration::days(1)), SlaState::Ok);
    }
}

//! Ticket status transitions and the timestamps they stamp.

use chrono::{DateTime, Utc};

use crate::{error::AppError, models::ticket::TicketStatus};

/// Resolution timestamps carried by a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusStamps {
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Timestamps after moving a ticket into `status` at `now`.
///
/// - `open` / `pending`: both cleared (the ticket is active again)
/// - `resolved`: `resolved_at` kept or set, `closed_at` cleared
/// - `closed`: both kept or set; closing implies resolving
pub fn stamps_for(status: TicketStatus, current: StatusStamps, now: DateTime<Utc>) -> StatusStamps {
    match status {
        TicketStatus::Open | TicketStatus::Pending => StatusStamps::default(),
        TicketStatus::Resolved => StatusStamps {
            resolved_at: current.resolved_at.or(Some(now)),
            closed_at: None,
        },
        TicketStatus::Closed => StatusStamps {
            resolved_at: current.resolved_at.or(Some(now)),
            closed_at: current.closed_at.or(Some(now)),
        },
    }
}

/// Status a ticket moves to when its customer replies.
///
/// A reply reopens resolved and pending tickets. Closed tickets are final:
/// the customer must open a new ticket.
pub fn status_after_customer_reply(current: TicketStatus) -> Result<TicketStatus, AppError> {
    match current {
        TicketStatus::Closed => Err(AppError::Conflict(
            "This ticket is closed; please open a new ticket".to_string(),
        )),
        TicketStatus::Open | TicketStatus::Pending | TicketStatus::Resolved => {
            Ok(TicketStatus::Open)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn resolving_sets_resolved_at_once() {
        let now = Utc::now();
        let earlier = now - Duration::hours(2);

        let fresh = stamps_for(TicketStatus::Resolved, StatusStamps::default(), now);
        assert_eq!(fresh.resolved_at, Some(now));
        assert_eq!(fresh.closed_at, None);

        let kept = stamps_for(
            TicketStatus::Resolved,
            StatusStamps { resolved_at: Some(earlier), closed_at: None },
            now,
        );
        assert_eq!(kept.resolved_at, Some(earlier));
    }

    #[test]
    fn closing_implies_resolving() {
        let now = Utc::now();
        let stamps = stamps_for(TicketStatus::Closed, StatusStamps::default(), now);
        assert_eq!(stamps.resolved_at, Some(now));
        assert_eq!(stamps.closed_at, Some(now));
    }

    #[test]
    fn reopening_clears_both() {
        let now = Utc::now();
        let closed = StatusStamps { resolved_at: Some(now), closed_at: Some(now) };
        assert_eq!(stamps_for(TicketStatus::Open, closed, now), StatusStamps::default());
        assert_eq!(stamps_for(TicketStatus::Pending, closed, now), StatusStamps::default());
    }

    #[test]
    fn customer_reply_reopens_except_closed() {
        assert_eq!(
            status_after_customer_reply(TicketStatus::Resolved).unwrap(),
            TicketStatus::Open
        );
        assert_eq!(
            status_after_customer_reply(TicketStatus::Pending).unwrap(),
            TicketStatus::Open
        );
        assert!(matches!(
            status_after_customer_reply(TicketStatus::Closed),
            Err(AppError::Conflict(_))
        ));
    }
}

//! Pure state transitions for approval requests.
//!
//! Nothing here touches storage; the service loads the request, applies one
//! of these transitions and persists the result together with any audit entry
//! in the same transaction.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::audit::NewAuditEntry;
use crate::domain::request::{
    Decision, NewRequest, Request, RequestDraft, RequestId, RequestPatch, RequestStatus,
};
use crate::domain::user::{User, UserId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("user {actor_id} is not authorized to {action}")]
    NotAuthorized { actor_id: UserId, action: String },
    #[error("request {request_id} is {status} and cannot be {action}")]
    InvalidState { request_id: RequestId, status: RequestStatus, action: &'static str },
    #[error("rejecting request {request_id} requires a reason")]
    ReasonRequired { request_id: RequestId },
    #[error("{0}")]
    InvalidInput(String),
}

/// Outcome of a human decision: the updated request and the entry to append.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub request: Request,
    pub audit: NewAuditEntry,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EscalationOutcome {
    pub request: Request,
    pub audit: NewAuditEntry,
    pub reassigned: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RequestLifecycle;

impl RequestLifecycle {
    pub fn new() -> Self {
        Self
    }

    /// Builds a Pending request whose deadline is fixed at `now + sla_minutes`.
    pub fn open(
        &self,
        submitter: &User,
        draft: RequestDraft,
        handler: &User,
        now: DateTime<Utc>,
        sla_minutes: i64,
    ) -> Result<NewRequest, TransitionError> {
        let title = require_title(&draft.title)?;
        if sla_minutes < 1 {
            return Err(TransitionError::InvalidInput(format!(
                "SLA minutes must be at least 1, got {sla_minutes}"
            )));
        }

        let sla_deadline = Duration::try_minutes(sla_minutes)
            .and_then(|window| now.checked_add_signed(window))
            .ok_or_else(|| {
                TransitionError::InvalidInput(format!(
                    "SLA of {sla_minutes} minutes puts the deadline out of range"
                ))
            })?;

        Ok(NewRequest {
            title,
            description: draft.description,
            urgency: draft.urgency.unwrap_or_default(),
            submitter_id: submitter.id,
            handler_id: handler.id,
            created_at: now,
            sla_deadline,
        })
    }

    /// State is checked before authorship, so a closed request reports
    /// `InvalidState` to every caller.
    pub fn check_edit(&self, request: &Request, actor_id: UserId) -> Result<(), TransitionError> {
        if request.status != RequestStatus::Pending {
            return Err(TransitionError::InvalidState {
                request_id: request.id,
                status: request.status,
                action: "edited",
            });
        }
        if actor_id != request.submitter_id {
            return Err(TransitionError::NotAuthorized {
                actor_id,
                action: format!("edit request {}", request.id),
            });
        }
        Ok(())
    }

    /// Applies `patch`; `handler` is the freshly resolved handler when the
    /// patch names a new target. The SLA deadline is left alone.
    pub fn apply_edit(
        &self,
        request: &Request,
        patch: RequestPatch,
        handler: Option<&User>,
        now: DateTime<Utc>,
    ) -> Result<Request, TransitionError> {
        let mut updated = request.clone();
        if let Some(title) = patch.title {
            updated.title = require_title(&title)?;
        }
        if let Some(description) = patch.description {
            updated.description = description;
        }
        if let Some(urgency) = patch.urgency {
            updated.urgency = urgency;
        }
        if let Some(handler) = handler {
            updated.handler_id = handler.id;
        }
        updated.updated_at = now;
        Ok(updated)
    }

    pub fn decide(
        &self,
        request: &Request,
        actor: &User,
        decision: Decision,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, TransitionError> {
        if actor.id != request.handler_id && !actor.is_administrator() {
            return Err(TransitionError::NotAuthorized {
                actor_id: actor.id,
                action: format!("decide request {}", request.id),
            });
        }
        if request.status.is_terminal() {
            return Err(TransitionError::InvalidState {
                request_id: request.id,
                status: request.status,
                action: "decided",
            });
        }

        let reason = reason.map(|reason| reason.trim().to_string()).filter(|r| !r.is_empty());
        if decision == Decision::Rejected && reason.is_none() {
            return Err(TransitionError::ReasonRequired { request_id: request.id });
        }

        let mut updated = request.clone();
        updated.status = decision.status();
        updated.actioned_by = Some(actor.id);
        updated.updated_at = now;
        updated.rejection_reason = match decision {
            Decision::Rejected => reason.clone(),
            Decision::Approved => None,
        };

        let audit = NewAuditEntry::decision(request.id, decision, actor.id, reason, now);
        Ok(DecisionOutcome { request: updated, audit })
    }

    /// Marks a breached request Escalated. The handler moves to `backup`
    /// when one exists and is kept otherwise.
    pub fn escalate(
        &self,
        request: &Request,
        backup: Option<&User>,
        now: DateTime<Utc>,
    ) -> Result<EscalationOutcome, TransitionError> {
        if request.status != RequestStatus::Pending {
            return Err(TransitionError::InvalidState {
                request_id: request.id,
                status: request.status,
                action: "escalated",
            });
        }

        let mut updated = request.clone();
        updated.status = RequestStatus::Escalated;
        updated.updated_at = now;
        let reassigned = match backup {
            Some(backup) => {
                updated.handler_id = backup.id;
                true
            }
            None => false,
        };

        Ok(EscalationOutcome {
            request: updated,
            audit: NewAuditEntry::escalation(request.id, now),
            reassigned,
        })
    }
}

fn require_title(title: &str) -> Result<String, TransitionError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(TransitionError::InvalidInput("title must not be blank".to_string()));
    }
    Ok(title.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{RequestLifecycle, TransitionError};
    use crate::audit::{AuditAction, ESCALATION_DETAIL};
    use crate::domain::request::{
        Decision, Request, RequestDraft, RequestId, RequestPatch, RequestStatus, Urgency,
    };
    use crate::domain::user::{Role, User, UserId};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).single().expect("valid time")
    }

    fn submitter() -> User {
        User::new(10, "sam", Role::Employee).reporting_to(UserId(2))
    }

    fn manager() -> User {
        User::new(2, "maya", Role::Manager)
    }

    fn pending() -> Request {
        let draft = RequestDraft {
            title: "  New monitor ".to_string(),
            description: "27 inch".to_string(),
            urgency: None,
            target_manager_id: None,
        };
        RequestLifecycle::new()
            .open(&submitter(), draft, &manager(), t0(), 60)
            .expect("open")
            .into_request(RequestId(1))
    }

    #[test]
    fn open_fixes_deadline_and_defaults_urgency() {
        let request = pending();

        assert_eq!(request.title, "New monitor");
        assert_eq!(request.urgency, Urgency::Medium);
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.handler_id, UserId(2));
        assert_eq!(request.sla_deadline, t0() + Duration::minutes(60));
    }

    #[test]
    fn open_refuses_blank_title() {
        let draft = RequestDraft { title: "   ".to_string(), ..RequestDraft::default() };

        let error = RequestLifecycle::new()
            .open(&submitter(), draft, &manager(), t0(), 60)
            .expect_err("blank title");

        assert!(matches!(error, TransitionError::InvalidInput(_)));
    }

    #[test]
    fn open_refuses_deadline_beyond_calendar_range() {
        let draft = RequestDraft { title: "Sabbatical".to_string(), ..RequestDraft::default() };

        let error = RequestLifecycle::new()
            .open(&submitter(), draft.clone(), &manager(), t0(), 1_000_000_000_000)
            .expect_err("deadline overflows");
        assert!(matches!(error, TransitionError::InvalidInput(_)));

        let error = RequestLifecycle::new()
            .open(&submitter(), draft, &manager(), t0(), i64::MAX)
            .expect_err("window overflows");
        assert!(matches!(error, TransitionError::InvalidInput(_)));
    }

    #[test]
    fn edit_of_closed_request_is_invalid_state_for_anyone() {
        let mut request = pending();
        request.status = RequestStatus::Approved;
        let lifecycle = RequestLifecycle::new();

        for actor in [UserId(10), UserId(2), UserId(404)] {
            let error = lifecycle.check_edit(&request, actor).expect_err("closed");
            assert!(matches!(error, TransitionError::InvalidState { .. }));
        }
    }

    #[test]
    fn only_submitter_may_edit() {
        let error = RequestLifecycle::new().check_edit(&pending(), UserId(2)).expect_err("manager");

        assert!(matches!(error, TransitionError::NotAuthorized { actor_id: UserId(2), .. }));
    }

    #[test]
    fn edit_keeps_deadline() {
        let request = pending();
        let later = t0() + Duration::minutes(30);
        let patch = RequestPatch {
            urgency: Some(Urgency::Critical),
            description: Some("34 inch ultrawide".to_string()),
            ..RequestPatch::default()
        };

        let edited =
            RequestLifecycle::new().apply_edit(&request, patch, None, later).expect("edit");

        assert_eq!(edited.urgency, Urgency::Critical);
        assert_eq!(edited.description, "34 inch ultrawide");
        assert_eq!(edited.sla_deadline, request.sla_deadline);
        assert_eq!(edited.updated_at, later);
        assert_eq!(edited.handler_id, request.handler_id);
    }

    #[test]
    fn rejection_needs_a_reason() {
        let lifecycle = RequestLifecycle::new();
        let request = pending();

        for reason in [None, Some("   ".to_string())] {
            let error = lifecycle
                .decide(&request, &manager(), Decision::Rejected, reason, t0())
                .expect_err("reason required");
            assert_eq!(error, TransitionError::ReasonRequired { request_id: RequestId(1) });
        }

        let outcome = lifecycle
            .decide(&request, &manager(), Decision::Rejected, Some("x".to_string()), t0())
            .expect("reject");
        assert_eq!(outcome.request.status, RequestStatus::Rejected);
        assert_eq!(outcome.request.rejection_reason.as_deref(), Some("x"));
        assert_eq!(outcome.audit.action, AuditAction::Rejected);
        assert_eq!(outcome.audit.detail.as_deref(), Some("x"));
    }

    #[test]
    fn approval_records_actor() {
        let outcome = RequestLifecycle::new()
            .decide(&pending(), &manager(), Decision::Approved, None, t0())
            .expect("approve");

        assert_eq!(outcome.request.status, RequestStatus::Approved);
        assert_eq!(outcome.request.actioned_by, Some(UserId(2)));
        assert_eq!(outcome.request.rejection_reason, None);
        assert_eq!(outcome.audit.actor_id, Some(UserId(2)));
        assert_eq!(outcome.audit.action, AuditAction::Approved);
    }

    #[test]
    fn administrator_may_decide_for_any_handler() {
        let admin = User::new(1, "root", Role::Administrator);

        let outcome = RequestLifecycle::new()
            .decide(&pending(), &admin, Decision::Approved, None, t0())
            .expect("approve");

        assert_eq!(outcome.request.actioned_by, Some(UserId(1)));
    }

    #[test]
    fn bystander_cannot_decide() {
        let other_manager = User::new(3, "otto", Role::Manager);

        let error = RequestLifecycle::new()
            .decide(&pending(), &other_manager, Decision::Approved, None, t0())
            .expect_err("not handler");

        assert!(matches!(error, TransitionError::NotAuthorized { .. }));
    }

    #[test]
    fn terminal_request_cannot_be_decided_again() {
        let lifecycle = RequestLifecycle::new();
        let approved =
            lifecycle.decide(&pending(), &manager(), Decision::Approved, None, t0()).expect("ok");

        let error = lifecycle
            .decide(&approved.request, &manager(), Decision::Rejected, Some("late".into()), t0())
            .expect_err("terminal");

        assert!(matches!(error, TransitionError::InvalidState { status: RequestStatus::Approved, .. }));
    }

    #[test]
    fn escalation_reassigns_when_backup_exists() {
        let backup = User::new(3, "bea", Role::BackupManager);
        let now = t0() + Duration::minutes(61);

        let outcome = RequestLifecycle::new().escalate(&pending(), Some(&backup), now).expect("ok");

        assert!(outcome.reassigned);
        assert_eq!(outcome.request.status, RequestStatus::Escalated);
        assert_eq!(outcome.request.handler_id, UserId(3));
        assert_eq!(outcome.audit.actor_id, None);
        assert_eq!(outcome.audit.detail.as_deref(), Some(ESCALATION_DETAIL));
    }

    #[test]
    fn escalation_without_backup_keeps_handler() {
        let outcome = RequestLifecycle::new().escalate(&pending(), None, t0()).expect("ok");

        assert!(!outcome.reassigned);
        assert_eq!(outcome.request.status, RequestStatus::Escalated);
        assert_eq!(outcome.request.handler_id, UserId(2));
    }

    #[test]
    fn escalated_request_stays_actionable() {
        let lifecycle = RequestLifecycle::new();
        let backup = User::new(3, "bea", Role::BackupManager);
        let escalated = lifecycle.escalate(&pending(), Some(&backup), t0()).expect("ok").request;

        let outcome =
            lifecycle.decide(&escalated, &backup, Decision::Approved, None, t0()).expect("approve");

        assert_eq!(outcome.request.status, RequestStatus::Approved);
    }
}

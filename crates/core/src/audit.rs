use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::{Decision, RequestId, UnknownVariant};
use crate::domain::user::UserId;

pub const ESCALATION_DETAIL: &str = "SLA deadline exceeded";

/// Action tag recorded on an audit entry.
///
/// The stored tags are `Approved`, `Rejected` and `ESCALATED`; the upper-case
/// escalation tag marks entries written by the system rather than a person.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "Approved")]
    Approved,
    #[serde(rename = "Rejected")]
    Rejected,
    #[serde(rename = "ESCALATED")]
    Escalated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Escalated => "ESCALATED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "escalated" => Ok(Self::Escalated),
            _ => Err(UnknownVariant { kind: "audit action", value: value.to_string() }),
        }
    }
}

impl From<Decision> for AuditAction {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => Self::Approved,
            Decision::Rejected => Self::Rejected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub request_id: RequestId,
    pub action: AuditAction,
    /// `None` for system-originated entries.
    pub actor_id: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
    pub detail: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewAuditEntry {
    pub request_id: RequestId,
    pub action: AuditAction,
    pub actor_id: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
    pub detail: Option<String>,
}

impl NewAuditEntry {
    pub fn decision(
        request_id: RequestId,
        decision: Decision,
        actor_id: UserId,
        reason: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id,
            action: decision.into(),
            actor_id: Some(actor_id),
            occurred_at,
            detail: reason,
        }
    }

    pub fn escalation(request_id: RequestId, occurred_at: DateTime<Utc>) -> Self {
        Self {
            request_id,
            action: AuditAction::Escalated,
            actor_id: None,
            occurred_at,
            detail: Some(ESCALATION_DETAIL.to_string()),
        }
    }

    pub fn into_entry(self, id: i64) -> AuditEntry {
        AuditEntry {
            id,
            request_id: self.request_id,
            action: self.action,
            actor_id: self.actor_id,
            occurred_at: self.occurred_at,
            detail: self.detail,
        }
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::user::{Role, User, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub i64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Escalated,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

impl FromStr for Urgency {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(UnknownVariant { kind: "urgency", value: value.to_string() }),
        }
    }
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Escalated => "Escalated",
        }
    }

    /// Approved and Rejected accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "escalated" => Ok(Self::Escalated),
            _ => Err(UnknownVariant { kind: "request status", value: value.to_string() }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub title: String,
    pub description: String,
    pub urgency: Urgency,
    pub submitter_id: UserId,
    pub handler_id: UserId,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sla_deadline: DateTime<Utc>,
    pub rejection_reason: Option<String>,
    pub actioned_by: Option<UserId>,
    /// Bumped by the store on every persisted mutation.
    pub version: i64,
}

impl Request {
    pub fn is_breached(&self, now: DateTime<Utc>) -> bool {
        self.status == RequestStatus::Pending && self.sla_deadline < now
    }

    /// Submitter, current handler and administrators may read a request.
    pub fn is_visible_to(&self, user: &User) -> bool {
        user.is_administrator() || self.submitter_id == user.id || self.handler_id == user.id
    }
}

/// A request ready to be persisted; the store assigns the id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRequest {
    pub title: String,
    pub description: String,
    pub urgency: Urgency,
    pub submitter_id: UserId,
    pub handler_id: UserId,
    pub created_at: DateTime<Utc>,
    pub sla_deadline: DateTime<Utc>,
}

impl NewRequest {
    pub fn into_request(self, id: RequestId) -> Request {
        Request {
            id,
            title: self.title,
            description: self.description,
            urgency: self.urgency,
            submitter_id: self.submitter_id,
            handler_id: self.handler_id,
            status: RequestStatus::Pending,
            created_at: self.created_at,
            updated_at: self.created_at,
            sla_deadline: self.sla_deadline,
            rejection_reason: None,
            actioned_by: None,
            version: 1,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDraft {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    #[serde(default)]
    pub target_manager_id: Option<UserId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    #[serde(default)]
    pub target_manager_id: Option<UserId>,
}

impl RequestPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.urgency.is_none()
            && self.target_manager_id.is_none()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn status(&self) -> RequestStatus {
        match self {
            Self::Approved => RequestStatus::Approved,
            Self::Rejected => RequestStatus::Rejected,
        }
    }
}

impl TryFrom<RequestStatus> for Decision {
    type Error = UnknownVariant;

    fn try_from(status: RequestStatus) -> Result<Self, Self::Error> {
        match status {
            RequestStatus::Approved => Ok(Self::Approved),
            RequestStatus::Rejected => Ok(Self::Rejected),
            other => Err(UnknownVariant { kind: "decision", value: other.to_string() }),
        }
    }
}

/// Which requests a user sees when listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestScope {
    SubmittedBy(UserId),
    HandledBy(UserId),
    All,
}

impl RequestScope {
    pub fn for_role(role: Role, user_id: UserId) -> Self {
        match role {
            Role::Employee => Self::SubmittedBy(user_id),
            Role::Manager | Role::BackupManager => Self::HandledBy(user_id),
            Role::Administrator => Self::All,
        }
    }

    pub fn for_user(user: &User) -> Self {
        Self::for_role(user.role, user.id)
    }

    pub fn includes(&self, request: &Request) -> bool {
        match self {
            Self::SubmittedBy(id) => request.submitter_id == *id,
            Self::HandledBy(id) => request.handler_id == *id,
            Self::All => true,
        }
    }
}

pub const DEFAULT_PAGE_LIMIT: u32 = 100;
pub const MAX_PAGE_LIMIT: u32 = 500;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub skip: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { skip: 0, limit: DEFAULT_PAGE_LIMIT }
    }
}

impl Page {
    pub fn new(skip: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            skip: skip.unwrap_or(0),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        }
    }
}

/// A request enriched with the usernames a dashboard shows next to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestView {
    #[serde(flatten)]
    pub request: Request,
    pub submitter_username: Option<String>,
    pub handler_username: Option<String>,
    pub actioned_by_username: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub escalated: usize,
}

impl StatusSummary {
    pub fn from_requests<'a>(requests: impl IntoIterator<Item = &'a Request>) -> Self {
        requests.into_iter().fold(Self::default(), |mut summary, request| {
            summary.total += 1;
            match request.status {
                RequestStatus::Pending => summary.pending += 1,
                RequestStatus::Approved => summary.approved += 1,
                RequestStatus::Rejected => summary.rejected += 1,
                RequestStatus::Escalated => summary.escalated += 1,
            }
            summary
        })
    }
}

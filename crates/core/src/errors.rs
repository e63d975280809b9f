use thiserror::Error;

use crate::domain::request::{RequestId, RequestStatus};
use crate::domain::user::{Role, UserId};
use crate::lifecycle::TransitionError;
use crate::routing::RoutingError;
use crate::store::StoreError;

/// Typed failures returned by every workflow operation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("target handler {target_id} does not exist")]
    TargetNotFound { target_id: UserId },
    #[error("target handler {target_id} has role `{role}`, which cannot handle requests")]
    InvalidTargetRole { target_id: UserId, role: Role },
    #[error("no manager, backup manager or administrator is available for submitter {submitter_id}")]
    NoHandlerAvailable { submitter_id: UserId },
    #[error("user {actor_id} is not authorized to {action}")]
    NotAuthorized { actor_id: UserId, action: String },
    #[error("request {request_id} is {status} and cannot be {action}")]
    InvalidState { request_id: RequestId, status: RequestStatus, action: &'static str },
    #[error("rejecting request {request_id} requires a reason")]
    ReasonRequired { request_id: RequestId },
    #[error("{entity} {id} was not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("transient store failure: {0}")]
    TransientStoreFailure(String),
}

impl WorkflowError {
    pub fn request_not_found(id: RequestId) -> Self {
        Self::NotFound { entity: "request", id: id.0 }
    }

    pub fn user_not_found(id: UserId) -> Self {
        Self::NotFound { entity: "user", id: id.0 }
    }

    /// Stable snake_case tag for logs and transport payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TargetNotFound { .. } => "target_not_found",
            Self::InvalidTargetRole { .. } => "invalid_target_role",
            Self::NoHandlerAvailable { .. } => "no_handler_available",
            Self::NotAuthorized { .. } => "not_authorized",
            Self::InvalidState { .. } => "invalid_state",
            Self::ReasonRequired { .. } => "reason_required",
            Self::NotFound { .. } => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::TransientStoreFailure(_) => "transient_store_failure",
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        Self::TransientStoreFailure(value.to_string())
    }
}

impl From<RoutingError> for WorkflowError {
    fn from(value: RoutingError) -> Self {
        match value {
            RoutingError::TargetNotFound { target_id } => Self::TargetNotFound { target_id },
            RoutingError::InvalidTargetRole { target_id, role } => {
                Self::InvalidTargetRole { target_id, role }
            }
            RoutingError::NoHandlerAvailable { submitter_id } => {
                Self::NoHandlerAvailable { submitter_id }
            }
            RoutingError::Store(error) => error.into(),
        }
    }
}

impl From<TransitionError> for WorkflowError {
    fn from(value: TransitionError) -> Self {
        match value {
            TransitionError::NotAuthorized { actor_id, action } => {
                Self::NotAuthorized { actor_id, action }
            }
            TransitionError::InvalidState { request_id, status, action } => {
                Self::InvalidState { request_id, status, action }
            }
            TransitionError::ReasonRequired { request_id } => Self::ReasonRequired { request_id },
            TransitionError::InvalidInput(message) => Self::InvalidInput(message),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { kind: &'static str, message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { kind: &'static str, message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { kind: &'static str, message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { kind: &'static str, message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { kind: &'static str, message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::NotFound { .. } => "The requested item does not exist.",
            Self::Conflict { .. } => {
                "The request changed state before this action completed. Refresh and retry."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::ServiceUnavailable { .. } => 503,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest { kind, .. }
            | Self::Forbidden { kind, .. }
            | Self::NotFound { kind, .. }
            | Self::Conflict { kind, .. }
            | Self::ServiceUnavailable { kind, .. } => kind,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::Conflict { message, .. }
            | Self::ServiceUnavailable { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }
}

impl WorkflowError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let kind = self.kind();
        let message = self.to_string();
        let correlation_id = correlation_id.into();
        match self {
            Self::TargetNotFound { .. }
            | Self::InvalidTargetRole { .. }
            | Self::NoHandlerAvailable { .. }
            | Self::ReasonRequired { .. }
            | Self::InvalidInput(_) => InterfaceError::BadRequest { kind, message, correlation_id },
            Self::NotAuthorized { .. } => InterfaceError::Forbidden { kind, message, correlation_id },
            Self::NotFound { .. } => InterfaceError::NotFound { kind, message, correlation_id },
            Self::InvalidState { .. } => InterfaceError::Conflict { kind, message, correlation_id },
            Self::TransientStoreFailure(_) => {
                InterfaceError::ServiceUnavailable { kind, message, correlation_id }
            }
        }
    }
}

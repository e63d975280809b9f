pub mod audit;
pub mod clock;
pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod routing;
pub mod service;
pub mod sla;
pub mod store;

pub use audit::{AuditAction, AuditEntry, NewAuditEntry, ESCALATION_DETAIL};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use directory::Directory;
pub use domain::request::{
    Decision, Page, Request, RequestDraft, RequestId, RequestPatch, RequestScope, RequestStatus,
    RequestView, StatusSummary, Urgency,
};
pub use domain::user::{Role, User, UserId};
pub use errors::{InterfaceError, WorkflowError};
pub use lifecycle::{RequestLifecycle, TransitionError};
pub use routing::{HandlerResolver, RouteSource, RoutingDecision, RoutingError};
pub use service::RequestService;
pub use sla::{SlaMonitor, SweepOutcome, SweepReport};
pub use store::{InMemoryStore, StoreError, StoreTransaction, WorkflowStore};

//! Storage seam shared by the lifecycle service and the SLA monitor.
//!
//! Every interactive operation and every sweep runs inside one
//! [`StoreTransaction`]. Dropping a transaction without calling
//! [`StoreTransaction::commit`] discards all of its writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::audit::{AuditEntry, NewAuditEntry};
use crate::directory::Directory;
use crate::domain::request::{NewRequest, Page, Request, RequestId, RequestScope};

pub mod memory;

pub use memory::InMemoryStore;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored data could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait StoreTransaction: Directory {
    /// Stored SLA setting, if an administrator ever set one.
    async fn sla_minutes(&mut self) -> Result<Option<i64>, StoreError>;

    async fn set_sla_minutes(&mut self, minutes: i64) -> Result<(), StoreError>;

    async fn insert_request(&mut self, request: NewRequest) -> Result<Request, StoreError>;

    async fn request_by_id(&mut self, id: RequestId) -> Result<Option<Request>, StoreError>;

    /// Writes `request` if the stored row still carries `request.version`.
    ///
    /// Returns the persisted request with its bumped version, or `None` when
    /// another writer got there first.
    async fn update_request(&mut self, request: &Request) -> Result<Option<Request>, StoreError>;

    /// Pending requests whose deadline is strictly before `now`, by id.
    async fn expired_pending(&mut self, now: DateTime<Utc>) -> Result<Vec<Request>, StoreError>;

    async fn list_requests(
        &mut self,
        scope: RequestScope,
        page: Page,
    ) -> Result<Vec<Request>, StoreError>;

    async fn append_audit(&mut self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError>;

    async fn audit_for_request(&mut self, id: RequestId) -> Result<Vec<AuditEntry>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Opens a transaction. Write transactions against one store never
    /// interleave.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;
}

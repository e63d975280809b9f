use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::audit::{AuditEntry, NewAuditEntry};
use crate::directory::Directory;
use crate::domain::request::{NewRequest, Page, Request, RequestId, RequestScope};
use crate::domain::user::{Role, User, UserId};

use super::{StoreError, StoreTransaction, WorkflowStore};

#[derive(Clone, Debug, Default)]
struct StoreState {
    users: BTreeMap<UserId, User>,
    requests: BTreeMap<RequestId, Request>,
    audit: Vec<AuditEntry>,
    sla_minutes: Option<i64>,
}

/// Process-local store. Transactions work on a copy of the state and hold the
/// store lock until they commit or drop, so they are fully serialized.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let state = StoreState {
            users: users.into_iter().map(|user| (user.id, user)).collect(),
            ..StoreState::default()
        };
        Self { state: Arc::new(Mutex::new(state)), fail_next_commit: Arc::default() }
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn requests(&self) -> Vec<Request> {
        self.state.lock().await.requests.values().cloned().collect()
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.lock().await.audit.clone()
    }

    /// Makes the next commit fail as if the backing store went away.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            fail_commit: Arc::clone(&self.fail_next_commit),
        }))
    }
}

struct InMemoryTransaction {
    guard: OwnedMutexGuard<StoreState>,
    working: StoreState,
    fail_commit: Arc<AtomicBool>,
}

#[async_trait]
impl Directory for InMemoryTransaction {
    async fn user_by_id(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn user_by_username(&mut self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.working.users.values().find(|user| user.username == username).cloned())
    }

    async fn users_with_role(&mut self, roles: &[Role]) -> Result<Vec<User>, StoreError> {
        Ok(self.working.users.values().filter(|user| roles.contains(&user.role)).cloned().collect())
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn sla_minutes(&mut self) -> Result<Option<i64>, StoreError> {
        Ok(self.working.sla_minutes)
    }

    async fn set_sla_minutes(&mut self, minutes: i64) -> Result<(), StoreError> {
        self.working.sla_minutes = Some(minutes);
        Ok(())
    }

    async fn insert_request(&mut self, request: NewRequest) -> Result<Request, StoreError> {
        let next_id = self.working.requests.keys().next_back().map_or(1, |id| id.0 + 1);
        let request = request.into_request(RequestId(next_id));
        self.working.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn request_by_id(&mut self, id: RequestId) -> Result<Option<Request>, StoreError> {
        Ok(self.working.requests.get(&id).cloned())
    }

    async fn update_request(&mut self, request: &Request) -> Result<Option<Request>, StoreError> {
        let Some(stored) = self.working.requests.get_mut(&request.id) else {
            return Ok(None);
        };
        if stored.version != request.version {
            return Ok(None);
        }

        let mut updated = request.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(Some(updated))
    }

    async fn expired_pending(&mut self, now: DateTime<Utc>) -> Result<Vec<Request>, StoreError> {
        Ok(self.working.requests.values().filter(|request| request.is_breached(now)).cloned().collect())
    }

    async fn list_requests(
        &mut self,
        scope: RequestScope,
        page: Page,
    ) -> Result<Vec<Request>, StoreError> {
        Ok(self
            .working
            .requests
            .values()
            .filter(|request| scope.includes(request))
            .skip(page.skip as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn append_audit(&mut self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        let next_id = self.working.audit.last().map_or(1, |entry| entry.id + 1);
        let entry = entry.into_entry(next_id);
        self.working.audit.push(entry.clone());
        Ok(entry)
    }

    async fn audit_for_request(&mut self, id: RequestId) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.working.audit.iter().filter(|entry| entry.request_id == id).cloned().collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let InMemoryTransaction { mut guard, working, fail_commit } = *self;
        if fail_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }
        *guard = working;
        Ok(())
    }
}

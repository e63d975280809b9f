//! SQLite-backed [`WorkflowStore`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};

use handoff_core::audit::{AuditEntry, NewAuditEntry};
use handoff_core::directory::Directory;
use handoff_core::domain::request::{NewRequest, Page, Request, RequestId, RequestScope};
use handoff_core::domain::user::{Role, User, UserId};
use handoff_core::store::{StoreError, StoreTransaction, WorkflowStore};

use crate::repositories::{self, RepositoryError};
use crate::DbPool;

/// Store over a SQLite pool.
///
/// SQLite allows one writer at a time; the write gate queues transactions
/// inside the process instead of letting them fail with `SQLITE_BUSY`.
/// Versioned updates still guard against writers in other processes.
#[derive(Clone)]
pub struct SqlWorkflowStore {
    pool: DbPool,
    write_gate: Arc<Mutex<()>>,
}

impl SqlWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, write_gate: Arc::new(Mutex::new(())) }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl WorkflowStore for SqlWorkflowStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let gate = Arc::clone(&self.write_gate).lock_owned().await;
        let tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        Ok(Box::new(SqlTransaction { tx, _gate: gate }))
    }
}

struct SqlTransaction {
    tx: Transaction<'static, Sqlite>,
    _gate: OwnedMutexGuard<()>,
}

#[async_trait]
impl Directory for SqlTransaction {
    async fn user_by_id(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(repositories::user::find_by_id(&mut self.tx, id).await?)
    }

    async fn user_by_username(&mut self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(repositories::user::find_by_username(&mut self.tx, username).await?)
    }

    async fn users_with_role(&mut self, roles: &[Role]) -> Result<Vec<User>, StoreError> {
        Ok(repositories::user::with_roles(&mut self.tx, roles).await?)
    }
}

#[async_trait]
impl StoreTransaction for SqlTransaction {
    async fn sla_minutes(&mut self) -> Result<Option<i64>, StoreError> {
        Ok(repositories::settings::sla_minutes(&mut self.tx).await?)
    }

    async fn set_sla_minutes(&mut self, minutes: i64) -> Result<(), StoreError> {
        Ok(repositories::settings::set_sla_minutes(&mut self.tx, minutes, Utc::now()).await?)
    }

    async fn insert_request(&mut self, request: NewRequest) -> Result<Request, StoreError> {
        Ok(repositories::request::insert(&mut self.tx, request).await?)
    }

    async fn request_by_id(&mut self, id: RequestId) -> Result<Option<Request>, StoreError> {
        Ok(repositories::request::find_by_id(&mut self.tx, id).await?)
    }

    async fn update_request(&mut self, request: &Request) -> Result<Option<Request>, StoreError> {
        Ok(repositories::request::update_versioned(&mut self.tx, request).await?)
    }

    async fn expired_pending(&mut self, now: DateTime<Utc>) -> Result<Vec<Request>, StoreError> {
        Ok(repositories::request::expired_pending(&mut self.tx, now).await?)
    }

    async fn list_requests(
        &mut self,
        scope: RequestScope,
        page: Page,
    ) -> Result<Vec<Request>, StoreError> {
        Ok(repositories::request::list_scoped(&mut self.tx, scope, page).await?)
    }

    async fn append_audit(&mut self, entry: NewAuditEntry) -> Result<AuditEntry, StoreError> {
        Ok(repositories::audit::append(&mut self.tx, entry).await?)
    }

    async fn audit_for_request(&mut self, id: RequestId) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(repositories::audit::list_for_request(&mut self.tx, id).await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let SqlTransaction { tx, _gate } = *self;
        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use handoff_core::audit::AuditAction;
    use handoff_core::clock::{ManualClock, SystemClock};
    use handoff_core::domain::request::{
        Decision, Page, RequestDraft, RequestPatch, RequestStatus, Urgency,
    };
    use handoff_core::domain::user::{Role, User, UserId};
    use handoff_core::errors::WorkflowError;
    use handoff_core::service::RequestService;
    use handoff_core::sla::{SlaMonitor, SweepOutcome};
    use handoff_core::store::{StoreTransaction, WorkflowStore};

    use super::SqlWorkflowStore;
    use crate::repositories;
    use crate::{connect_with_settings, migrations};

    const ADMIN: UserId = UserId(1);
    const MANAGER: UserId = UserId(2);
    const BACKUP: UserId = UserId(3);
    const EMPLOYEE: UserId = UserId(4);

    struct Harness {
        store: Arc<SqlWorkflowStore>,
        clock: ManualClock,
        service: RequestService,
    }

    async fn harness() -> Harness {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let mut conn = pool.acquire().await.expect("acquire");
        for user in [
            User::new(1, "ada", Role::Administrator),
            User::new(2, "mia", Role::Manager),
            User::new(3, "bo", Role::BackupManager),
            User::new(4, "eli", Role::Employee).reporting_to(MANAGER),
        ] {
            repositories::user::upsert(&mut conn, &user).await.expect("seed user");
        }
        drop(conn);

        let store = Arc::new(SqlWorkflowStore::new(pool));
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid time"),
        );
        let service = RequestService::new(store.clone(), Arc::new(clock.clone()));
        Harness { store, clock, service }
    }

    fn draft(title: &str) -> RequestDraft {
        RequestDraft {
            title: title.to_string(),
            description: "needed for onboarding".to_string(),
            urgency: Some(Urgency::High),
            target_manager_id: None,
        }
    }

    #[tokio::test]
    async fn created_request_round_trips_through_sqlite() {
        let h = harness().await;

        let created = h.service.create_request(EMPLOYEE, draft("Laptop")).await.expect("create");
        let loaded = h.service.request(EMPLOYEE, created.id).await.expect("load");

        assert_eq!(loaded, created);
        assert_eq!(loaded.handler_id, MANAGER);
        assert_eq!(loaded.status, RequestStatus::Pending);
        assert_eq!(loaded.sla_deadline - loaded.created_at, Duration::minutes(1440));
    }

    #[tokio::test]
    async fn rejection_persists_reason_and_audit() {
        let h = harness().await;
        let created = h.service.create_request(EMPLOYEE, draft("Monitor")).await.expect("create");

        let rejected = h
            .service
            .decide_request(created.id, MANAGER, Decision::Rejected, Some("no budget".into()))
            .await
            .expect("reject");
        assert_eq!(rejected.version, 2);

        let loaded = h.service.request(EMPLOYEE, created.id).await.expect("load");
        assert_eq!(loaded.status, RequestStatus::Rejected);
        assert_eq!(loaded.rejection_reason.as_deref(), Some("no budget"));
        assert_eq!(loaded.actioned_by, Some(MANAGER));

        let trail = h.service.audit_trail(EMPLOYEE, created.id).await.expect("audit");
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::Rejected);
        assert_eq!(trail[0].actor_id, Some(MANAGER));
        assert_eq!(trail[0].detail.as_deref(), Some("no budget"));
    }

    #[tokio::test]
    async fn second_decision_is_refused() {
        let h = harness().await;
        let created = h.service.create_request(EMPLOYEE, draft("Desk")).await.expect("create");
        h.service
            .decide_request(created.id, MANAGER, Decision::Approved, None)
            .await
            .expect("approve");

        let error = h
            .service
            .decide_request(created.id, ADMIN, Decision::Rejected, Some("late".into()))
            .await
            .expect_err("terminal request");

        assert!(matches!(error, WorkflowError::InvalidState { .. }));
        assert_eq!(h.service.audit_trail(EMPLOYEE, created.id).await.expect("audit").len(), 1);
    }

    #[tokio::test]
    async fn stale_version_is_not_written() {
        let h = harness().await;
        let created = h.service.create_request(EMPLOYEE, draft("Chair")).await.expect("create");
        h.service
            .edit_request(created.id, EMPLOYEE, RequestPatch {
                title: Some("Ergonomic chair".into()),
                ..RequestPatch::default()
            })
            .await
            .expect("edit");

        let mut tx = h.store.begin().await.expect("begin");
        let mut stale = created.clone();
        stale.title = "Stool".to_string();
        assert!(tx.update_request(&stale).await.expect("update").is_none());
        drop(tx);

        let loaded = h.service.request(EMPLOYEE, created.id).await.expect("load");
        assert_eq!(loaded.title, "Ergonomic chair");
        assert_eq!(loaded.version, 2);
    }

    #[tokio::test]
    async fn sweep_escalates_breached_requests_to_backup() {
        let h = harness().await;
        let monitor = SlaMonitor::new(h.store.clone(), Arc::new(h.clock.clone()));
        let breached = h.service.create_request(EMPLOYEE, draft("Badge")).await.expect("create");
        h.clock.advance(Duration::minutes(30));
        let fresh = h.service.create_request(EMPLOYEE, draft("Keys")).await.expect("create");

        h.clock.advance(Duration::minutes(1411));
        let SweepOutcome::Completed(report) = monitor.run().await.expect("sweep") else {
            panic!("sweep should not be skipped");
        };

        assert_eq!(report.escalated, vec![breached.id]);
        assert_eq!(report.backup_handler, Some(BACKUP));

        let escalated = h.service.request(EMPLOYEE, breached.id).await.expect("load");
        assert_eq!(escalated.status, RequestStatus::Escalated);
        assert_eq!(escalated.handler_id, BACKUP);
        let fresh = h.service.request(EMPLOYEE, fresh.id).await.expect("load");
        assert_eq!(fresh.status, RequestStatus::Pending);

        let trail = h.service.audit_trail(EMPLOYEE, breached.id).await.expect("audit");
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::Escalated);
        assert!(trail[0].actor_id.is_none());

        let SweepOutcome::Completed(again) = monitor.run().await.expect("sweep") else {
            panic!("sweep should not be skipped");
        };
        assert_eq!(again.escalated_count(), 0);
    }

    #[tokio::test]
    async fn unrecognized_directory_role_does_not_block_escalation() {
        let h = harness().await;
        sqlx::query("INSERT INTO users (id, username, role) VALUES (9, 'temp', 'Contractor')")
            .execute(h.store.pool())
            .await
            .expect("seed contractor");
        let monitor = SlaMonitor::new(h.store.clone(), Arc::new(h.clock.clone()));
        let created = h.service.create_request(EMPLOYEE, draft("Badge")).await.expect("create");

        h.clock.advance(Duration::minutes(1441));
        let SweepOutcome::Completed(report) = monitor.run().await.expect("sweep") else {
            panic!("sweep should not be skipped");
        };

        assert_eq!(report.escalated, vec![created.id]);
        assert_eq!(report.backup_handler, Some(BACKUP));
        let handlers = h.service.handlers(EMPLOYEE).await.expect("handlers");
        let ids: Vec<UserId> = handlers.iter().map(|user| user.id).collect();
        assert_eq!(ids, vec![ADMIN, MANAGER, BACKUP]);
    }

    #[tokio::test]
    async fn wall_clock_writes_match_later_reads() {
        let h = harness().await;
        let service = RequestService::new(h.store.clone(), Arc::new(SystemClock));

        let created = service.create_request(EMPLOYEE, draft("Dock")).await.expect("create");
        assert_eq!(service.request(EMPLOYEE, created.id).await.expect("load"), created);

        let approved = service
            .decide_request(created.id, MANAGER, Decision::Approved, None)
            .await
            .expect("approve");
        assert_eq!(service.request(EMPLOYEE, created.id).await.expect("load"), approved);
    }

    #[tokio::test]
    async fn stored_sla_applies_to_new_requests() {
        let h = harness().await;

        assert_eq!(h.service.set_sla_minutes(ADMIN, 90).await.expect("set"), 90);
        assert_eq!(h.service.sla_minutes().await.expect("get"), 90);

        let created = h.service.create_request(EMPLOYEE, draft("Phone")).await.expect("create");
        assert_eq!(created.sla_deadline - created.created_at, Duration::minutes(90));

        let error = h.service.set_sla_minutes(MANAGER, 10).await.expect_err("not admin");
        assert!(matches!(error, WorkflowError::NotAuthorized { .. }));
    }

    #[tokio::test]
    async fn listing_is_scoped_and_paged() {
        let h = harness().await;
        for title in ["One", "Two", "Three"] {
            h.service.create_request(EMPLOYEE, draft(title)).await.expect("create");
        }

        let mine = h.service.list_requests_for_user(EMPLOYEE, Page::default()).await.expect("list");
        assert_eq!(mine.len(), 3);
        assert_eq!(mine[0].submitter_username.as_deref(), Some("eli"));
        assert_eq!(mine[0].handler_username.as_deref(), Some("mia"));

        let backup_view =
            h.service.list_requests_for_user(BACKUP, Page::default()).await.expect("list");
        assert!(backup_view.is_empty());

        let page = h
            .service
            .list_requests_for_user(ADMIN, Page::new(Some(1), Some(1)))
            .await
            .expect("list");
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].request.title, "Two");
    }
}

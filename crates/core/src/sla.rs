//! SLA monitor.
//!
//! Escalates Pending requests whose deadline has passed. One sweep is one
//! store transaction: either every breached request found by the sweep is
//! escalated and audited, or none is.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::request::RequestId;
use crate::domain::user::UserId;
use crate::errors::WorkflowError;
use crate::lifecycle::RequestLifecycle;
use crate::routing::HandlerResolver;
use crate::store::WorkflowStore;

pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub correlation_id: String,
    pub swept_at: DateTime<Utc>,
    pub escalated: Vec<RequestId>,
    /// Backup manager that took over, if one existed.
    pub backup_handler: Option<UserId>,
    pub reassigned: usize,
    /// Escalated but left with their previous handler.
    pub kept_handler: usize,
}

impl SweepReport {
    fn empty(correlation_id: String, swept_at: DateTime<Utc>) -> Self {
        Self {
            correlation_id,
            swept_at,
            escalated: Vec::new(),
            backup_handler: None,
            reassigned: 0,
            kept_handler: 0,
        }
    }

    pub fn escalated_count(&self) -> usize {
        self.escalated.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed(SweepReport),
    /// Another sweep was already in flight.
    Skipped,
}

pub struct SlaMonitor {
    store: Arc<dyn WorkflowStore>,
    clock: Arc<dyn Clock>,
    resolver: HandlerResolver,
    lifecycle: RequestLifecycle,
    interval: Duration,
    sweep_lock: Mutex<()>,
    last_sweep: RwLock<Option<SweepReport>>,
}

impl SlaMonitor {
    pub fn new(store: Arc<dyn WorkflowStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            resolver: HandlerResolver::new(),
            lifecycle: RequestLifecycle::new(),
            interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            sweep_lock: Mutex::new(()),
            last_sweep: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Report of the most recent sweep that committed.
    pub async fn last_sweep(&self) -> Option<SweepReport> {
        self.last_sweep.read().await.clone()
    }

    /// Runs one sweep. Returns [`SweepOutcome::Skipped`] without touching the
    /// store when a sweep is already running.
    pub async fn run(&self) -> Result<SweepOutcome, WorkflowError> {
        let Ok(_running) = self.sweep_lock.try_lock() else {
            debug!(event_name = "sla.sweep.skipped", "sweep already in flight");
            return Ok(SweepOutcome::Skipped);
        };

        let report = self.sweep().await?;
        *self.last_sweep.write().await = Some(report.clone());
        Ok(SweepOutcome::Completed(report))
    }

    async fn sweep(&self) -> Result<SweepReport, WorkflowError> {
        let correlation_id = Uuid::new_v4().to_string();
        let now = self.clock.now();
        let mut report = SweepReport::empty(correlation_id, now);

        let mut tx = self.store.begin().await?;
        let expired = tx.expired_pending(now).await?;
        if expired.is_empty() {
            debug!(
                event_name = "sla.sweep.idle",
                correlation_id = %report.correlation_id,
                "no breached requests"
            );
            return Ok(report);
        }

        let backup = self.resolver.escalation_target(tx.as_mut()).await?;
        if backup.is_none() {
            warn!(
                event_name = "sla.sweep.no_backup_manager",
                correlation_id = %report.correlation_id,
                breached = expired.len(),
                "no backup manager; escalating without reassignment"
            );
        }
        report.backup_handler = backup.as_ref().map(|user| user.id);

        for request in &expired {
            let outcome = self.lifecycle.escalate(request, backup.as_ref(), now)?;
            tx.update_request(&outcome.request).await?.ok_or(WorkflowError::InvalidState {
                request_id: request.id,
                status: request.status,
                action: "escalated",
            })?;
            tx.append_audit(outcome.audit).await?;

            if outcome.reassigned {
                report.reassigned += 1;
            } else {
                report.kept_handler += 1;
            }
            report.escalated.push(request.id);
        }

        tx.commit().await?;

        info!(
            event_name = "sla.sweep.completed",
            correlation_id = %report.correlation_id,
            escalated = report.escalated_count(),
            reassigned = report.reassigned,
            kept_handler = report.kept_handler,
            "escalated breached requests"
        );
        Ok(report)
    }

    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run_until_shutdown(shutdown).await })
    }

    /// Ticks every interval until `shutdown` flips to true or its sender is
    /// dropped. A sweep that has started always runs to completion.
    pub async fn run_until_shutdown(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            event_name = "sla.monitor.started",
            interval_ms = self.interval.as_millis() as u64,
            "SLA monitor started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.run().await {
                        error!(
                            event_name = "sla.sweep.failed",
                            error_kind = error.kind(),
                            error = %error,
                            "sweep failed; retrying on next tick"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(event_name = "sla.monitor.stopped", "SLA monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tokio::sync::watch;

    use super::{SlaMonitor, SweepOutcome, SweepReport};
    use crate::audit::{AuditAction, ESCALATION_DETAIL};
    use crate::clock::ManualClock;
    use crate::domain::request::{Decision, Request, RequestDraft, RequestStatus};
    use crate::domain::user::{Role, User, UserId};
    use crate::errors::WorkflowError;
    use crate::service::RequestService;
    use crate::store::{InMemoryStore, WorkflowStore};

    const EMPLOYEE: UserId = UserId(20);

    struct Harness {
        store: InMemoryStore,
        clock: ManualClock,
        service: RequestService,
        monitor: Arc<SlaMonitor>,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).single().expect("valid time")
    }

    fn harness(users: Vec<User>) -> Harness {
        let store = InMemoryStore::with_users(users);
        let clock = ManualClock::new(t0());
        let shared: Arc<dyn WorkflowStore> = Arc::new(store.clone());
        let service = RequestService::new(Arc::clone(&shared), Arc::new(clock.clone()))
            .with_default_sla_minutes(60);
        let monitor = Arc::new(SlaMonitor::new(shared, Arc::new(clock.clone())));
        Harness { store, clock, service, monitor }
    }

    fn org_with_backup() -> Vec<User> {
        vec![
            User::new(2, "maya", Role::Manager),
            User::new(5, "bea", Role::BackupManager),
            User::new(8, "root", Role::Administrator),
            User::new(20, "sam", Role::Employee).reporting_to(UserId(2)),
        ]
    }

    async fn create(harness: &Harness) -> Request {
        let draft = RequestDraft { title: "Licence renewal".to_string(), ..RequestDraft::default() };
        harness.service.create_request(EMPLOYEE, draft).await.expect("create")
    }

    fn completed(outcome: SweepOutcome) -> SweepReport {
        match outcome {
            SweepOutcome::Completed(report) => report,
            SweepOutcome::Skipped => panic!("sweep unexpectedly skipped"),
        }
    }

    #[tokio::test]
    async fn breached_request_moves_to_backup_manager() {
        let harness = harness(org_with_backup());
        let request = create(&harness).await;
        harness.clock.advance(Duration::minutes(61));

        let report = completed(harness.monitor.run().await.expect("sweep"));

        assert_eq!(report.escalated, vec![request.id]);
        assert_eq!(report.reassigned, 1);
        let escalated = harness.service.request(EMPLOYEE, request.id).await.expect("load");
        assert_eq!(escalated.status, RequestStatus::Escalated);
        assert_eq!(escalated.handler_id, UserId(5));
        assert_eq!(escalated.sla_deadline, request.sla_deadline);

        let trail = harness.service.audit_trail(EMPLOYEE, request.id).await.expect("trail");
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::Escalated);
        assert_eq!(trail[0].actor_id, None);
        assert_eq!(trail[0].detail.as_deref(), Some(ESCALATION_DETAIL));
    }

    #[tokio::test]
    async fn deadline_must_be_strictly_past() {
        let harness = harness(org_with_backup());
        create(&harness).await;

        harness.clock.advance(Duration::minutes(60));
        let report = completed(harness.monitor.run().await.expect("sweep"));

        assert!(report.escalated.is_empty());
    }

    #[tokio::test]
    async fn second_sweep_escalates_nothing() {
        let harness = harness(org_with_backup());
        create(&harness).await;
        create(&harness).await;
        harness.clock.advance(Duration::minutes(90));

        let first = completed(harness.monitor.run().await.expect("sweep"));
        let second = completed(harness.monitor.run().await.expect("sweep"));

        assert_eq!(first.escalated_count(), 2);
        assert_eq!(second.escalated_count(), 0);
        assert_eq!(harness.store.audit_entries().await.len(), 2);
    }

    #[tokio::test]
    async fn decided_requests_are_left_alone() {
        let harness = harness(org_with_backup());
        let request = create(&harness).await;
        harness
            .service
            .decide_request(request.id, UserId(2), Decision::Approved, None)
            .await
            .expect("approve");
        harness.clock.advance(Duration::days(2));

        let report = completed(harness.monitor.run().await.expect("sweep"));

        assert!(report.escalated.is_empty());
    }

    #[tokio::test]
    async fn without_backup_manager_handler_is_kept() {
        let harness = harness(vec![
            User::new(2, "maya", Role::Manager),
            User::new(20, "sam", Role::Employee).reporting_to(UserId(2)),
        ]);
        let request = create(&harness).await;
        harness.clock.advance(Duration::minutes(61));

        let report = completed(harness.monitor.run().await.expect("sweep"));

        assert_eq!(report.kept_handler, 1);
        assert_eq!(report.backup_handler, None);
        let escalated = harness.service.request(EMPLOYEE, request.id).await.expect("load");
        assert_eq!(escalated.status, RequestStatus::Escalated);
        assert_eq!(escalated.handler_id, UserId(2));
        assert_eq!(harness.store.audit_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn escalated_request_can_still_be_decided_by_backup() {
        let harness = harness(org_with_backup());
        let request = create(&harness).await;
        harness.clock.advance(Duration::minutes(61));
        harness.monitor.run().await.expect("sweep");

        let decided = harness
            .service
            .decide_request(request.id, UserId(5), Decision::Rejected, Some("budget".to_string()))
            .await
            .expect("reject");

        assert_eq!(decided.status, RequestStatus::Rejected);
        assert_eq!(harness.store.audit_entries().await.len(), 2);
    }

    #[tokio::test]
    async fn failed_sweep_commits_nothing_and_retries() {
        let harness = harness(org_with_backup());
        let first = create(&harness).await;
        let second = create(&harness).await;
        harness.clock.advance(Duration::minutes(61));
        harness.store.fail_next_commit();

        let error = harness.monitor.run().await.expect_err("commit fails");
        assert!(matches!(error, WorkflowError::TransientStoreFailure(_)));
        for id in [first.id, second.id] {
            let request = harness.service.request(EMPLOYEE, id).await.expect("load");
            assert_eq!(request.status, RequestStatus::Pending);
        }
        assert!(harness.store.audit_entries().await.is_empty());
        assert!(harness.monitor.last_sweep().await.is_none());

        let report = completed(harness.monitor.run().await.expect("retry"));
        assert_eq!(report.escalated, vec![first.id, second.id]);
        assert_eq!(harness.monitor.last_sweep().await, Some(report));
    }

    #[tokio::test]
    async fn overlapping_run_is_skipped() {
        let harness = harness(org_with_backup());
        create(&harness).await;
        harness.clock.advance(Duration::minutes(61));

        // Holding a transaction parks the first sweep inside `begin`.
        let blocker = harness.store.begin().await.expect("begin");
        let in_flight = {
            let monitor = Arc::clone(&harness.monitor);
            tokio::spawn(async move { monitor.run().await })
        };
        tokio::task::yield_now().await;

        assert_eq!(harness.monitor.run().await.expect("second"), SweepOutcome::Skipped);

        drop(blocker);
        let report = completed(in_flight.await.expect("join").expect("sweep"));
        assert_eq!(report.escalated_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let harness = harness(org_with_backup());
        let monitor = Arc::new(
            SlaMonitor::new(Arc::new(harness.store.clone()), Arc::new(harness.clock.clone()))
                .with_interval(StdDuration::from_millis(10)),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Arc::clone(&monitor).spawn(shutdown_rx);

        tokio::time::sleep(StdDuration::from_millis(30)).await;
        shutdown_tx.send(true).expect("monitor listening");

        tokio::time::timeout(StdDuration::from_secs(5), handle)
            .await
            .expect("monitor stopped in time")
            .expect("monitor task did not panic");
        assert!(monitor.last_sweep().await.is_some());
    }
}

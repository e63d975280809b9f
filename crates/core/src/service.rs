use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::audit::AuditEntry;
use crate::clock::Clock;
use crate::config::{DEFAULT_SLA_MINUTES, MAX_SLA_MINUTES};
use crate::directory::Directory;
use crate::domain::request::{
    Decision, Page, Request, RequestDraft, RequestId, RequestPatch, RequestScope, RequestView,
    StatusSummary, MAX_PAGE_LIMIT,
};
use crate::domain::user::{Role, User, UserId, HANDLER_ROLES};
use crate::errors::WorkflowError;
use crate::lifecycle::RequestLifecycle;
use crate::routing::HandlerResolver;
use crate::store::{StoreTransaction, WorkflowStore};

/// Entry point for every interactive request operation.
///
/// Each call opens one store transaction, so a request is never observed with
/// its status changed but its audit entry missing.
#[derive(Clone)]
pub struct RequestService {
    store: Arc<dyn WorkflowStore>,
    clock: Arc<dyn Clock>,
    resolver: HandlerResolver,
    lifecycle: RequestLifecycle,
    default_sla_minutes: i64,
}

impl RequestService {
    pub fn new(store: Arc<dyn WorkflowStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            resolver: HandlerResolver::new(),
            lifecycle: RequestLifecycle::new(),
            default_sla_minutes: DEFAULT_SLA_MINUTES,
        }
    }

    /// SLA used when no administrator has stored one.
    pub fn with_default_sla_minutes(mut self, minutes: i64) -> Self {
        self.default_sla_minutes = minutes;
        self
    }

    pub async fn create_request(
        &self,
        submitter_id: UserId,
        draft: RequestDraft,
    ) -> Result<Request, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let submitter = tx.user_by_id(submitter_id).await?.ok_or_else(|| {
            WorkflowError::NotAuthorized {
                actor_id: submitter_id,
                action: "create requests".to_string(),
            }
        })?;

        let route =
            self.resolver.resolve(tx.as_mut(), &submitter, draft.target_manager_id).await?;
        let sla_minutes = tx.sla_minutes().await?.unwrap_or(self.default_sla_minutes);
        let now = self.clock.now();
        let new_request = self.lifecycle.open(&submitter, draft, &route.handler, now, sla_minutes)?;

        let request = tx.insert_request(new_request).await?;
        tx.commit().await?;

        info!(
            event_name = "request.created",
            request_id = %request.id,
            submitter_id = %request.submitter_id,
            handler_id = %request.handler_id,
            route = route.source.as_str(),
            sla_deadline = %request.sla_deadline,
            "request created"
        );
        Ok(request)
    }

    pub async fn edit_request(
        &self,
        request_id: RequestId,
        actor_id: UserId,
        patch: RequestPatch,
    ) -> Result<Request, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let request = load_request(tx.as_mut(), request_id).await?;
        self.lifecycle.check_edit(&request, actor_id)?;

        let handler = match patch.target_manager_id {
            Some(target) => {
                let submitter = tx
                    .user_by_id(request.submitter_id)
                    .await?
                    .ok_or_else(|| WorkflowError::user_not_found(request.submitter_id))?;
                Some(self.resolver.resolve(tx.as_mut(), &submitter, Some(target)).await?.handler)
            }
            None => None,
        };

        let edited =
            self.lifecycle.apply_edit(&request, patch, handler.as_ref(), self.clock.now())?;
        let saved = save_request(tx.as_mut(), &edited, "edited").await?;
        tx.commit().await?;

        info!(
            event_name = "request.edited",
            request_id = %saved.id,
            handler_id = %saved.handler_id,
            handler_changed = saved.handler_id != request.handler_id,
            "request edited"
        );
        Ok(saved)
    }

    pub async fn decide_request(
        &self,
        request_id: RequestId,
        actor_id: UserId,
        decision: Decision,
        reason: Option<String>,
    ) -> Result<Request, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let request = load_request(tx.as_mut(), request_id).await?;
        let actor = tx.user_by_id(actor_id).await?.ok_or_else(|| WorkflowError::NotAuthorized {
            actor_id,
            action: format!("decide request {request_id}"),
        })?;

        let outcome = self.lifecycle.decide(&request, &actor, decision, reason, self.clock.now())?;
        let saved = save_request(tx.as_mut(), &outcome.request, "decided").await?;
        tx.append_audit(outcome.audit).await?;
        tx.commit().await?;

        info!(
            event_name = "request.decided",
            request_id = %saved.id,
            actor_id = %actor.id,
            status = saved.status.as_str(),
            "request decided"
        );
        Ok(saved)
    }

    /// Lists requests visible to `user_id`, scoped by the user's role.
    pub async fn list_requests_for_user(
        &self,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<RequestView>, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let user =
            tx.user_by_id(user_id).await?.ok_or_else(|| WorkflowError::user_not_found(user_id))?;
        list_views(tx.as_mut(), RequestScope::for_user(&user), page).await
    }

    /// Same as [`Self::list_requests_for_user`] for callers that already know
    /// the caller's role.
    pub async fn list_requests_for_role(
        &self,
        role: Role,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<RequestView>, WorkflowError> {
        let mut tx = self.store.begin().await?;
        list_views(tx.as_mut(), RequestScope::for_role(role, user_id), page).await
    }

    /// Per-status counts over every request `user_id` can see.
    pub async fn status_summary(&self, user_id: UserId) -> Result<StatusSummary, WorkflowError> {
        let mut tx = self.store.begin().await?;
        let user =
            tx.user_by_id(user_id).await?.ok_or_else(|| WorkflowError::user_not_found(user_id))?;
        let scope = RequestScope::for_user(&user);

        let mut summary = StatusSummary::default();
        let mut skip = 0;
        loop {
            let batch = tx.list_requests(scope, Page { skip, limit: MAX_PAGE_LIMIT }).await?;
            let counted = StatusSummary::from_requests(&batch);
            summary.total += counted.total;
            summary.pending += counted.pending;
            summary.approved += counted.approved;
            summary.rejected += counted.rejected;
            summary.escalated += counted.escalated;
            if batch.len() < MAX_PAGE_LIMIT as usize {
                return Ok(summary);
            }
            skip += MAX_PAGE_LIMIT;
        }
    }

    /// Fetches one request the caller is allowed to see.
    pub async fn request(
        &self,
        actor_id: UserId,
        request_id: RequestId,
    ) -> Result<Request, WorkflowError> {
        let mut tx = self.store.begin().await?;
        load_visible_request(tx.as_mut(), actor_id, request_id).await
    }

    pub async fn audit_trail(
        &self,
        actor_id: UserId,
        request_id: RequestId,
    ) -> Result<Vec<AuditEntry>, WorkflowError> {
        let mut tx = self.store.begin().await?;
        load_visible_request(tx.as_mut(), actor_id, request_id).await?;
        Ok(tx.audit_for_request(request_id).await?)
    }

    /// Users a submitter may name as an explicit target, in id order.
    pub async fn handlers(&self, actor_id: UserId) -> Result<Vec<User>, WorkflowError> {
        let mut tx = self.store.begin().await?;
        if tx.user_by_id(actor_id).await?.is_none() {
            return Err(WorkflowError::NotAuthorized {
                actor_id,
                action: "list handlers".to_string(),
            });
        }
        Ok(tx.users_with_role(&HANDLER_ROLES).await?)
    }

    /// Effective SLA: the stored setting, or the configured default.
    pub async fn sla_minutes(&self) -> Result<i64, WorkflowError> {
        let mut tx = self.store.begin().await?;
        Ok(tx.sla_minutes().await?.unwrap_or(self.default_sla_minutes))
    }

    /// Applies to requests created afterwards; existing deadlines stay fixed.
    pub async fn set_sla_minutes(&self, actor_id: UserId, minutes: i64) -> Result<i64, WorkflowError> {
        let mut tx = self.store.begin().await?;
        require_administrator(tx.as_mut(), actor_id, "change the SLA").await?;
        if !(1..=MAX_SLA_MINUTES).contains(&minutes) {
            return Err(WorkflowError::InvalidInput(format!(
                "SLA minutes must be in range 1..={MAX_SLA_MINUTES}, got {minutes}"
            )));
        }

        tx.set_sla_minutes(minutes).await?;
        tx.commit().await?;

        info!(event_name = "sla.updated", actor_id = %actor_id, minutes, "SLA setting changed");
        Ok(minutes)
    }

    pub async fn user(&self, user_id: UserId) -> Result<User, WorkflowError> {
        let mut tx = self.store.begin().await?;
        tx.user_by_id(user_id).await?.ok_or_else(|| WorkflowError::user_not_found(user_id))
    }
}

pub async fn require_administrator(
    tx: &mut dyn StoreTransaction,
    actor_id: UserId,
    action: &str,
) -> Result<User, WorkflowError> {
    match tx.user_by_id(actor_id).await? {
        Some(user) if user.is_administrator() => Ok(user),
        _ => Err(WorkflowError::NotAuthorized { actor_id, action: action.to_string() }),
    }
}

async fn load_request(
    tx: &mut dyn StoreTransaction,
    request_id: RequestId,
) -> Result<Request, WorkflowError> {
    tx.request_by_id(request_id).await?.ok_or_else(|| WorkflowError::request_not_found(request_id))
}

async fn load_visible_request(
    tx: &mut dyn StoreTransaction,
    actor_id: UserId,
    request_id: RequestId,
) -> Result<Request, WorkflowError> {
    let not_authorized = || WorkflowError::NotAuthorized {
        actor_id,
        action: format!("view request {request_id}"),
    };
    let actor = tx.user_by_id(actor_id).await?.ok_or_else(not_authorized)?;
    let request = load_request(tx, request_id).await?;
    if !request.is_visible_to(&actor) {
        return Err(not_authorized());
    }
    Ok(request)
}

/// Persists `request`, turning a lost optimistic-version race into
/// `InvalidState` carrying the status the winner left behind.
async fn save_request(
    tx: &mut dyn StoreTransaction,
    request: &Request,
    action: &'static str,
) -> Result<Request, WorkflowError> {
    if let Some(saved) = tx.update_request(request).await? {
        return Ok(saved);
    }

    let status = tx.request_by_id(request.id).await?.map_or(request.status, |current| current.status);
    warn!(
        event_name = "request.version_conflict",
        request_id = %request.id,
        status = status.as_str(),
        "request changed concurrently"
    );
    Err(WorkflowError::InvalidState { request_id: request.id, status, action })
}

async fn list_views(
    tx: &mut dyn StoreTransaction,
    scope: RequestScope,
    page: Page,
) -> Result<Vec<RequestView>, WorkflowError> {
    let requests = tx.list_requests(scope, page).await?;

    let mut usernames: BTreeMap<UserId, Option<String>> = BTreeMap::new();
    for request in &requests {
        let ids = [Some(request.submitter_id), Some(request.handler_id), request.actioned_by];
        for id in ids.into_iter().flatten() {
            if !usernames.contains_key(&id) {
                let username = tx.user_by_id(id).await?.map(|user| user.username);
                usernames.insert(id, username);
            }
        }
    }
    let username = |id: Option<UserId>| id.and_then(|id| usernames.get(&id).cloned().flatten());

    Ok(requests
        .into_iter()
        .map(|request| RequestView {
            submitter_username: username(Some(request.submitter_id)),
            handler_username: username(Some(request.handler_id)),
            actioned_by_username: username(request.actioned_by),
            request,
        })
        .collect())
}

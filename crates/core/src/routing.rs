//! Handler resolution for new and edited requests, and the escalation target
//! used by the SLA monitor.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::directory::Directory;
use crate::domain::user::{Role, User, UserId};
use crate::store::StoreError;

/// Roles eligible as a fallback handler when neither an explicit target nor a
/// direct manager is available.
pub const FALLBACK_ROLES: [Role; 2] = [Role::BackupManager, Role::Administrator];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    ExplicitTarget,
    DirectManager,
    BackupManager,
    Administrator,
}

impl RouteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExplicitTarget => "explicit_target",
            Self::DirectManager => "direct_manager",
            Self::BackupManager => "backup_manager",
            Self::Administrator => "administrator",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingDecision {
    pub handler: User,
    pub source: RouteSource,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("target handler {target_id} does not exist")]
    TargetNotFound { target_id: UserId },
    #[error("target handler {target_id} has role `{role}`")]
    InvalidTargetRole { target_id: UserId, role: Role },
    #[error("no handler available for submitter {submitter_id}")]
    NoHandlerAvailable { submitter_id: UserId },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HandlerResolver;

impl HandlerResolver {
    pub fn new() -> Self {
        Self
    }

    /// Picks the handler for a request from `submitter`.
    ///
    /// An explicit target must exist and hold a handler role; it is never
    /// silently replaced by a fallback. Without one, the submitter's direct
    /// manager wins, then the lowest-id user who is a backup manager or an
    /// administrator. Only one hop of the manager hierarchy is ever read.
    pub async fn resolve<D>(
        &self,
        directory: &mut D,
        submitter: &User,
        target: Option<UserId>,
    ) -> Result<RoutingDecision, RoutingError>
    where
        D: Directory + ?Sized,
    {
        if let Some(target_id) = target {
            let handler = directory
                .user_by_id(target_id)
                .await?
                .ok_or(RoutingError::TargetNotFound { target_id })?;
            if !handler.role.can_handle_requests() {
                return Err(RoutingError::InvalidTargetRole { target_id, role: handler.role });
            }
            return Ok(RoutingDecision { handler, source: RouteSource::ExplicitTarget });
        }

        // A self-referencing manager link is the only cycle a one-hop lookup can hit.
        if let Some(manager) = directory.manager_of(submitter).await? {
            if manager.id != submitter.id {
                return Ok(RoutingDecision { handler: manager, source: RouteSource::DirectManager });
            }
        }

        let fallback = directory.users_with_role(&FALLBACK_ROLES).await?.into_iter().next();
        match fallback {
            Some(handler) => {
                let source = match handler.role {
                    Role::BackupManager => RouteSource::BackupManager,
                    _ => RouteSource::Administrator,
                };
                Ok(RoutingDecision { handler, source })
            }
            None => Err(RoutingError::NoHandlerAvailable { submitter_id: submitter.id }),
        }
    }

    /// Lowest-id backup manager, if any. Administrators are not considered.
    pub async fn escalation_target<D>(&self, directory: &mut D) -> Result<Option<User>, StoreError>
    where
        D: Directory + ?Sized,
    {
        let backups = directory.users_with_role(&[Role::BackupManager]).await?;
        Ok(backups.into_iter().next())
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of directory roles.
///
/// Stores and transports may carry roles in several spellings
/// (`BackupManager`, `backup_manager`, `Backup Manager`); [`Role::from_str`] is
/// the single parser that folds them into a variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum Role {
    Employee,
    Manager,
    BackupManager,
    Administrator,
}

/// Roles allowed to act as the handler of a request.
pub const HANDLER_ROLES: [Role; 3] = [Role::Manager, Role::BackupManager, Role::Administrator];

impl Role {
    pub const ALL: [Role; 4] =
        [Role::Employee, Role::Manager, Role::BackupManager, Role::Administrator];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "Employee",
            Self::Manager => "Manager",
            Self::BackupManager => "BackupManager",
            Self::Administrator => "Administrator",
        }
    }

    pub fn can_handle_requests(&self) -> bool {
        HANDLER_ROLES.contains(self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown role `{0}` (expected Employee|Manager|BackupManager|Administrator)")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let folded: String = value
            .trim()
            .chars()
            .filter(|ch| !matches!(ch, '_' | '-' | ' '))
            .map(|ch| ch.to_ascii_lowercase())
            .collect();
        // Enum-style names leak through some stores as `UserRole.BACKUP_MANAGER`.
        let folded = folded.strip_prefix("userrole.").unwrap_or(&folded);

        match folded {
            "employee" => Ok(Self::Employee),
            "manager" => Ok(Self::Manager),
            "backupmanager" => Ok(Self::BackupManager),
            "administrator" | "admin" => Ok(Self::Administrator),
            _ => Err(UnknownRole(value.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub manager_id: Option<UserId>,
}

impl User {
    pub fn new(id: i64, username: impl Into<String>, role: Role) -> Self {
        Self { id: UserId(id), username: username.into(), role, manager_id: None }
    }

    pub fn reporting_to(mut self, manager_id: UserId) -> Self {
        self.manager_id = Some(manager_id);
        self
    }

    pub fn is_administrator(&self) -> bool {
        self.role == Role::Administrator
    }
}

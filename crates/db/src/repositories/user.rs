use sqlx::{Row, SqliteConnection};
use tracing::warn;

use handoff_core::domain::user::{Role, User, UserId};

use super::RepositoryError;

const USER_COLUMNS: &str = "id, username, role, manager_id";

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let username: String =
        row.try_get("username").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role: String = row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let manager_id: Option<i64> =
        row.try_get("manager_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let role = role.parse::<Role>().map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(User { id: UserId(id), username, role, manager_id: manager_id.map(UserId) })
}

pub async fn find_by_id(
    conn: &mut SqliteConnection,
    id: UserId,
) -> Result<Option<User>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_user).transpose()
}

pub async fn find_by_username(
    conn: &mut SqliteConnection,
    username: &str,
) -> Result<Option<User>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"))
        .bind(username)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_user).transpose()
}

/// Roles are matched after parsing, so rows written with any accepted
/// spelling of a role are found. Rows whose role is not recognized are
/// skipped rather than failing the whole lookup.
pub async fn with_roles(
    conn: &mut SqliteConnection,
    roles: &[Role],
) -> Result<Vec<User>, RepositoryError> {
    let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
        .fetch_all(&mut *conn)
        .await?;

    let mut users = Vec::new();
    for row in &rows {
        let role: String =
            row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        if role.parse::<Role>().is_err() {
            warn!(
                event_name = "db.user.unknown_role",
                user_id = ?row.try_get::<i64, _>("id").ok(),
                role = %role,
                "skipping directory entry with unrecognized role"
            );
            continue;
        }

        let user = row_to_user(row)?;
        if roles.contains(&user.role) {
            users.push(user);
        }
    }
    Ok(users)
}

pub async fn upsert(conn: &mut SqliteConnection, user: &User) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO users (id, username, role, manager_id)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             username = excluded.username,
             role = excluded.role,
             manager_id = excluded.manager_id",
    )
    .bind(user.id.0)
    .bind(&user.username)
    .bind(user.role.as_str())
    .bind(user.manager_id.map(|id| id.0))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

use sqlx::{Row, SqliteConnection};

use handoff_core::audit::{AuditAction, AuditEntry, NewAuditEntry};
use handoff_core::domain::request::RequestId;
use handoff_core::domain::user::UserId;

use super::{decode_timestamp, encode_timestamp, RepositoryError};

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEntry, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_id: i64 =
        row.try_get("request_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let action: String =
        row.try_get("action").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let actor_id: Option<i64> =
        row.try_get("actor_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let occurred_at: String =
        row.try_get("occurred_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let detail: Option<String> =
        row.try_get("details").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(AuditEntry {
        id,
        request_id: RequestId(request_id),
        action: action.parse::<AuditAction>().map_err(|e| RepositoryError::Decode(e.to_string()))?,
        actor_id: actor_id.map(UserId),
        occurred_at: decode_timestamp("occurred_at", &occurred_at)?,
        detail,
    })
}

pub async fn append(
    conn: &mut SqliteConnection,
    entry: NewAuditEntry,
) -> Result<AuditEntry, RepositoryError> {
    let result = sqlx::query(
        "INSERT INTO audit_logs (request_id, action, actor_id, occurred_at, details)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(entry.request_id.0)
    .bind(entry.action.as_str())
    .bind(entry.actor_id.map(|id| id.0))
    .bind(encode_timestamp(entry.occurred_at))
    .bind(entry.detail.as_deref())
    .execute(&mut *conn)
    .await?;

    Ok(entry.into_entry(result.last_insert_rowid()))
}

pub async fn list_for_request(
    conn: &mut SqliteConnection,
    request_id: RequestId,
) -> Result<Vec<AuditEntry>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT id, request_id, action, actor_id, occurred_at, details
         FROM audit_logs WHERE request_id = ?
         ORDER BY id",
    )
    .bind(request_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_entry).collect()
}

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use handoff_core::domain::request::{
    NewRequest, Page, Request, RequestId, RequestScope, RequestStatus, Urgency,
};
use handoff_core::domain::user::UserId;

use super::{decode_timestamp, encode_timestamp, RepositoryError};

const REQUEST_COLUMNS: &str = "id, title, description, urgency, submitter_id, current_handler_id,
     status, created_at, updated_at, sla_deadline, rejection_reason, actioned_by_id, version";

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<Request, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: String = row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let description: String =
        row.try_get("description").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let urgency: String =
        row.try_get("urgency").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let submitter_id: i64 =
        row.try_get("submitter_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let handler_id: i64 =
        row.try_get("current_handler_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sla_deadline: String =
        row.try_get("sla_deadline").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let rejection_reason: Option<String> =
        row.try_get("rejection_reason").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let actioned_by: Option<i64> =
        row.try_get("actioned_by_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let version: i64 =
        row.try_get("version").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Request {
        id: RequestId(id),
        title,
        description,
        urgency: urgency.parse::<Urgency>().map_err(|e| RepositoryError::Decode(e.to_string()))?,
        submitter_id: UserId(submitter_id),
        handler_id: UserId(handler_id),
        status: status
            .parse::<RequestStatus>()
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        created_at: decode_timestamp("created_at", &created_at)?,
        updated_at: decode_timestamp("updated_at", &updated_at)?,
        sla_deadline: decode_timestamp("sla_deadline", &sla_deadline)?,
        rejection_reason,
        actioned_by: actioned_by.map(UserId),
        version,
    })
}

pub async fn insert(
    conn: &mut SqliteConnection,
    request: NewRequest,
) -> Result<Request, RepositoryError> {
    let result = sqlx::query(
        "INSERT INTO requests (title, description, urgency, submitter_id, current_handler_id,
                               status, created_at, updated_at, sla_deadline, version)
         VALUES (?, ?, ?, ?, ?, 'Pending', ?, ?, ?, 1)",
    )
    .bind(&request.title)
    .bind(&request.description)
    .bind(request.urgency.as_str())
    .bind(request.submitter_id.0)
    .bind(request.handler_id.0)
    .bind(encode_timestamp(request.created_at))
    .bind(encode_timestamp(request.created_at))
    .bind(encode_timestamp(request.sla_deadline))
    .execute(&mut *conn)
    .await?;

    Ok(request.into_request(RequestId(result.last_insert_rowid())))
}

pub async fn find_by_id(
    conn: &mut SqliteConnection,
    id: RequestId,
) -> Result<Option<Request>, RepositoryError> {
    let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?"))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(row_to_request).transpose()
}

/// Compare-and-set on `version`; `None` means the stored row moved on.
pub async fn update_versioned(
    conn: &mut SqliteConnection,
    request: &Request,
) -> Result<Option<Request>, RepositoryError> {
    let result = sqlx::query(
        "UPDATE requests SET
             title = ?, description = ?, urgency = ?, current_handler_id = ?, status = ?,
             updated_at = ?, sla_deadline = ?, rejection_reason = ?, actioned_by_id = ?,
             version = version + 1
         WHERE id = ? AND version = ?",
    )
    .bind(&request.title)
    .bind(&request.description)
    .bind(request.urgency.as_str())
    .bind(request.handler_id.0)
    .bind(request.status.as_str())
    .bind(encode_timestamp(request.updated_at))
    .bind(encode_timestamp(request.sla_deadline))
    .bind(request.rejection_reason.as_deref())
    .bind(request.actioned_by.map(|id| id.0))
    .bind(request.id.0)
    .bind(request.version)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    let mut stored = request.clone();
    stored.version += 1;
    Ok(Some(stored))
}

pub async fn expired_pending(
    conn: &mut SqliteConnection,
    now: DateTime<Utc>,
) -> Result<Vec<Request>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "SELECT {REQUEST_COLUMNS} FROM requests
         WHERE status = 'Pending' AND sla_deadline < ?
         ORDER BY id"
    ))
    .bind(encode_timestamp(now))
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_request).collect()
}

pub async fn list_scoped(
    conn: &mut SqliteConnection,
    scope: RequestScope,
    page: Page,
) -> Result<Vec<Request>, RepositoryError> {
    let (filter, user_id) = match scope {
        RequestScope::SubmittedBy(id) => ("WHERE submitter_id = ?", Some(id.0)),
        RequestScope::HandledBy(id) => ("WHERE current_handler_id = ?", Some(id.0)),
        RequestScope::All => ("", None),
    };

    let sql =
        format!("SELECT {REQUEST_COLUMNS} FROM requests {filter} ORDER BY id LIMIT ? OFFSET ?");
    let mut query = sqlx::query(&sql);
    if let Some(user_id) = user_id {
        query = query.bind(user_id);
    }
    let rows = query
        .bind(i64::from(page.limit))
        .bind(i64::from(page.skip))
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(row_to_request).collect()
}

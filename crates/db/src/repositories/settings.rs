use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use super::{encode_timestamp, RepositoryError};

pub const SLA_MINUTES_KEY: &str = "sla_minutes";

pub async fn sla_minutes(conn: &mut SqliteConnection) -> Result<Option<i64>, RepositoryError> {
    let row = sqlx::query("SELECT value FROM system_config WHERE key = ?")
        .bind(SLA_MINUTES_KEY)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };
    let raw: String = row.try_get("value").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    raw.trim()
        .parse::<i64>()
        .map(Some)
        .map_err(|e| RepositoryError::Decode(format!("{SLA_MINUTES_KEY} `{raw}`: {e}")))
}

pub async fn set_sla_minutes(
    conn: &mut SqliteConnection,
    minutes: i64,
    updated_at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO system_config (key, value, updated_at)
         VALUES (?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET
             value = excluded.value,
             updated_at = excluded.updated_at",
    )
    .bind(SLA_MINUTES_KEY)
    .bind(minutes.to_string())
    .bind(encode_timestamp(updated_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

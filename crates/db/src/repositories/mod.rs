//! Row-level SQLite access for the directory, requests, audit trail and
//! settings.
//!
//! Functions take a bare connection so they run equally against a pool
//! connection or inside an open transaction.

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use handoff_core::store::StoreError;

pub mod audit;
pub mod request;
pub mod settings;
pub mod user;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => StoreError::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Decode(message),
        }
    }
}

/// Fixed-width UTC encoding so stored timestamps order the same as text and
/// as instants.
pub fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column} `{raw}`: {e}")))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{decode_timestamp, encode_timestamp, RepositoryError};
    use handoff_core::store::StoreError;

    #[test]
    fn encoded_timestamps_sort_chronologically() {
        let base = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid time");
        let earlier = encode_timestamp(base);
        let later = encode_timestamp(base + Duration::microseconds(1));

        assert!(earlier < later);
        assert_eq!(earlier, "2026-03-02T09:00:00.000000Z");
        assert_eq!(decode_timestamp("created_at", &earlier).expect("decode"), base);
    }

    #[test]
    fn malformed_timestamps_are_decode_errors() {
        let error = decode_timestamp("sla_deadline", "yesterday").expect_err("should fail");
        assert!(matches!(error, RepositoryError::Decode(ref message) if message.contains("sla_deadline")));
        assert!(matches!(StoreError::from(error), StoreError::Decode(_)));
    }
}

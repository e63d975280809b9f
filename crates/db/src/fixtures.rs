use sqlx::Executor;

use handoff_core::domain::user::Role;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DemoUser {
    pub id: i64,
    pub username: &'static str,
    pub role: Role,
    pub manager_id: Option<i64>,
}

/// Users the demo SQL seeds, in id order.
pub const DEMO_USERS: &[DemoUser] = &[
    DemoUser { id: 1, username: "admin", role: Role::Administrator, manager_id: None },
    DemoUser { id: 2, username: "maria", role: Role::Manager, manager_id: Some(1) },
    DemoUser { id: 3, username: "bruno", role: Role::BackupManager, manager_id: Some(1) },
    DemoUser { id: 4, username: "erin", role: Role::Employee, manager_id: Some(2) },
    DemoUser { id: 5, username: "omar", role: Role::Employee, manager_id: Some(2) },
    DemoUser { id: 6, username: "nadia", role: Role::Employee, manager_id: None },
];

/// Demo user directory covering every routing path: a managed employee, a
/// managerless employee and a backup manager for escalations.
pub struct DemoDirectory;

impl DemoDirectory {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_directory.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        Ok(SeedResult {
            users_seeded: DEMO_USERS.iter().map(|user| (user.id, user.username)).collect(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for user in DEMO_USERS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM users
                               WHERE id = ?1 AND username = ?2 AND role = ?3
                                 AND manager_id IS ?4)",
            )
            .bind(user.id)
            .bind(user.username)
            .bind(user.role.as_str())
            .bind(user.manager_id)
            .fetch_one(pool)
            .await?;
            checks.push((user.username, present == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo users. Fails if requests still reference them.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        for user in DEMO_USERS.iter().rev() {
            sqlx::query("DELETE FROM users WHERE id = ?1 AND username = ?2")
                .bind(user.id)
                .bind(user.username)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SeedResult {
    pub users_seeded: Vec<(i64, &'static str)>,
}

#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::{DemoDirectory, DEMO_USERS};
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn load_verify_clean_cycle() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let before = DemoDirectory::verify(&pool).await.expect("verify");
        assert!(!before.all_present);

        let seeded = DemoDirectory::load(&pool).await.expect("load");
        assert_eq!(seeded.users_seeded.len(), DEMO_USERS.len());
        DemoDirectory::load(&pool).await.expect("reload is idempotent");

        let after = DemoDirectory::verify(&pool).await.expect("verify");
        assert!(after.all_present, "failed checks: {:?}", after.checks);

        DemoDirectory::clean(&pool).await.expect("clean");
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&pool).await.expect("count");
        assert_eq!(count, 0);
    }
}

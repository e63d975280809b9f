use std::sync::Arc;

use handoff_core::clock::SystemClock;
use handoff_core::domain::request::{RequestDraft, RequestStatus};
use handoff_core::domain::user::UserId;
use handoff_core::errors::WorkflowError;
use handoff_core::service::RequestService;
use handoff_db::fixtures::DemoDirectory;
use handoff_db::{connect_with_settings, migrations, SqlWorkflowStore};

type DemoTestResult<T = ()> = Result<T, String>;

macro_rules! require_eq {
    ($left:expr, $right:expr) => {
        if $left != $right {
            return Err(format!(
                "assertion failed: `left == right` (`{:?}` != `{:?}`)",
                $left,
                $right
            ));
        }
    };
}

async fn demo_service() -> DemoTestResult<RequestService> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|e| format!("connect: {e}"))?;
    migrations::run_pending(&pool).await.map_err(|e| format!("migrate: {e}"))?;
    DemoDirectory::load(&pool).await.map_err(|e| format!("seed: {e}"))?;

    Ok(RequestService::new(Arc::new(SqlWorkflowStore::new(pool)), Arc::new(SystemClock)))
}

fn draft(title: &str, target: Option<i64>) -> RequestDraft {
    RequestDraft {
        title: title.to_string(),
        description: String::new(),
        urgency: None,
        target_manager_id: target.map(UserId),
    }
}

#[tokio::test]
async fn demo_directory_covers_each_routing_path() -> DemoTestResult {
    let service = demo_service().await?;

    let managed = service
        .create_request(UserId(4), draft("Laptop", None))
        .await
        .map_err(|e| format!("managed employee: {e}"))?;
    require_eq!(managed.handler_id, UserId(2));
    require_eq!(managed.status, RequestStatus::Pending);

    let managerless = service
        .create_request(UserId(6), draft("Badge", None))
        .await
        .map_err(|e| format!("managerless employee: {e}"))?;
    require_eq!(managerless.handler_id, UserId(1));

    let targeted = service
        .create_request(UserId(5), draft("Travel", Some(3)))
        .await
        .map_err(|e| format!("targeted request: {e}"))?;
    require_eq!(targeted.handler_id, UserId(3));

    match service.create_request(UserId(5), draft("Peer", Some(4))).await {
        Err(WorkflowError::InvalidTargetRole { .. }) => Ok(()),
        other => Err(format!("employee target should be refused, got {other:?}")),
    }
}

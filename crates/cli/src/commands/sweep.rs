use std::sync::Arc;

use crate::commands::{prepare, CommandResult, StepFailure};
use handoff_core::clock::SystemClock;
use handoff_core::sla::{SlaMonitor, SweepOutcome, SweepReport};
use handoff_db::{connect_with_config, migrations, SqlWorkflowStore};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("sweep") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let monitor =
            SlaMonitor::new(Arc::new(SqlWorkflowStore::new(pool.clone())), Arc::new(SystemClock));
        let outcome: Result<SweepOutcome, StepFailure> =
            monitor.run().await.map_err(|error| (error.kind(), error.to_string(), 7u8));

        pool.close().await;
        outcome
    });

    match result {
        Ok(SweepOutcome::Completed(report)) => CommandResult::success("sweep", summarize(&report)),
        Ok(SweepOutcome::Skipped) => CommandResult::success("sweep", "sweep already in flight"),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sweep", error_class, message, exit_code)
        }
    }
}

fn summarize(report: &SweepReport) -> String {
    let handler = match report.backup_handler {
        Some(id) => format!("backup handler {id}"),
        None => "no backup handler".to_string(),
    };
    format!(
        "escalated {} request(s) ({} reassigned, {} kept handler; {handler}) [correlation_id={}]",
        report.escalated_count(),
        report.reassigned,
        report.kept_handler,
        report.correlation_id
    )
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use handoff_core::domain::request::RequestId;
    use handoff_core::domain::user::UserId;
    use handoff_core::sla::SweepReport;

    use super::summarize;

    #[test]
    fn summary_names_backup_handler_and_correlation_id() {
        let report = SweepReport {
            correlation_id: "sweep-1".to_string(),
            swept_at: Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).single().expect("valid time"),
            escalated: vec![RequestId(3), RequestId(9)],
            backup_handler: Some(UserId(4)),
            reassigned: 2,
            kept_handler: 0,
        };

        assert_eq!(
            summarize(&report),
            "escalated 2 request(s) (2 reassigned, 0 kept handler; backup handler 4) \
             [correlation_id=sweep-1]"
        );
    }
}

//! Where finished batch reports go.

use tenant_isolation_sdk::BatchReport;
use tracing::{error, info};

pub trait BatchReportSink: Send + Sync {
    fn publish(&self, report: &BatchReport);
}

/// Logs every report as one structured INFO event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReportSink;

impl BatchReportSink for TracingReportSink {
    fn publish(&self, report: &BatchReport) {
        match serde_json::to_string(report) {
            Ok(json) => info!(
                batch_id = %report.batch_id,
                total = report.summary.total,
                successful = report.summary.successful,
                failed = report.summary.failed,
                report = %json,
                "migration batch report"
            ),
            Err(e) => error!(batch_id = %report.batch_id, error = %e, "failed to serialize batch report"),
        }
    }
}

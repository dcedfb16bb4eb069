use crate::error::ReportError;
use chrono::{DateTime, Utc};
use engine_core::metrics::MetricsSnapshot;
use engine_runtime::pipeline::PipelineReport;
use model::{
    core::identifiers::ImportId,
    import::{outcome::ImportOutcome, warning::ImportWarning},
};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// How an import run ended, from the operator's point of view.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SummaryStatus {
    Completed,
    CompletedWithFailures,
    Halted,
    Cancelled,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RowCounts {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    /// Skipped rows whose values already matched.
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub pending: usize,
}

/// Machine-readable record of a finished import.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummaryReport {
    pub import_id: ImportId,
    pub period: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub status: SummaryStatus,
    pub rows: RowCounts,
    pub outcome: ImportOutcome,
    pub warnings: Vec<ImportWarning>,
    pub errors: Vec<String>,
    pub metrics: MetricsSnapshot,
}

impl ImportSummaryReport {
    pub fn from_pipeline(import_id: ImportId, report: &PipelineReport) -> Self {
        let outcome = &report.outcome;
        let status = if outcome.cancelled {
            SummaryStatus::Cancelled
        } else if report.halted {
            SummaryStatus::Halted
        } else if outcome.failed_count > 0 {
            SummaryStatus::CompletedWithFailures
        } else {
            SummaryStatus::Completed
        };

        ImportSummaryReport {
            import_id,
            period: None,
            generated_at: Utc::now(),
            status,
            rows: RowCounts {
                total: outcome.accounted_rows(),
                created: outcome.created_ids.len(),
                updated: outcome.updated_ids.len(),
                unchanged: report.unchanged,
                skipped: outcome.skipped_indices.len(),
                failed: outcome.failed_count,
                pending: outcome.pending_indices.len(),
            },
            outcome: outcome.clone(),
            warnings: report.warnings.clone(),
            errors: report.errors.clone(),
            metrics: report.metrics,
        }
    }

    pub fn with_period(mut self, period: Option<String>) -> Self {
        self.period = period;
        self
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let path = path.as_ref();
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| ReportError::Write {
            path: path.display().to_string(),
            source,
        })?;

        info!(path = %path.display(), status = ?self.status, "Import summary written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{
        core::identifiers::EntityId,
        import::{outcome::RowDisposition, warning::WarningCode},
    };

    fn pipeline_report() -> PipelineReport {
        let mut outcome = ImportOutcome::default();
        outcome.record(0, RowDisposition::Created(EntityId::new("new-1")));
        outcome.record(1, RowDisposition::Updated(EntityId::new("e1")));
        outcome.record(2, RowDisposition::Skipped);
        outcome.record(3, RowDisposition::Failed("bad amount".to_string()));

        PipelineReport {
            outcome,
            warnings: vec![ImportWarning::for_row(
                2,
                WarningCode::Skipped,
                "no changes",
            )],
            errors: vec!["row 3: bad amount".to_string()],
            unchanged: 1,
            halted: false,
            metrics: MetricsSnapshot::default(),
        }
    }

    #[test]
    fn counts_rows_and_derives_status() {
        let summary = ImportSummaryReport::from_pipeline(ImportId::new("imp-1"), &pipeline_report())
            .with_period(Some("2026-09".to_string()));

        assert_eq!(summary.status, SummaryStatus::CompletedWithFailures);
        assert_eq!(
            summary.rows,
            RowCounts {
                total: 4,
                created: 1,
                updated: 1,
                unchanged: 1,
                skipped: 1,
                failed: 1,
                pending: 0,
            }
        );

        let mut cancelled = pipeline_report();
        cancelled.outcome.cancelled = true;
        cancelled.halted = true;
        let summary = ImportSummaryReport::from_pipeline(ImportId::new("imp-2"), &cancelled);
        assert_eq!(summary.status, SummaryStatus::Cancelled);
    }

    #[test]
    fn writes_camel_case_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let summary = ImportSummaryReport::from_pipeline(ImportId::new("imp-1"), &pipeline_report());

        summary.write_to(&path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["importId"], "imp-1");
        assert_eq!(written["status"], "completedWithFailures");
        assert_eq!(written["rows"]["failed"], 1);
        assert_eq!(written["outcome"]["failed_indices"][0], 3);
    }
}

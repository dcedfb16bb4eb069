use crate::error::CliError;
use engine_config::report::summary::ImportSummaryReport;
use engine_runtime::{orchestrator::ImportProgress, pipeline::PreviewReport};
use model::import::{reconciliation::ReconciliationResult, warning::ImportWarning};
use serde::Serialize;
use std::sync::Mutex;
use tracing::info;

/// Logs a progress line whenever the state changes or another tenth of the
/// work completes.
pub fn progress_logger() -> impl Fn(&ImportProgress) + Send + Sync + 'static {
    let last = Mutex::new((String::new(), -1_i64));
    move |progress: &ImportProgress| {
        let label = progress.state.to_string();
        let decile = (progress.progress.overall_percent / 10.0).floor() as i64;
        let Ok(mut last) = last.lock() else {
            return;
        };
        if last.0 == label && last.1 == decile {
            return;
        }
        *last = (label, decile);

        info!(
            state = %progress.state,
            percent = %format!("{:.1}", progress.progress.overall_percent),
            phase = progress.progress.active_phase.as_deref().unwrap_or("-"),
            eta_secs = ?progress.progress.estimated_remaining_seconds.map(|s| s.round()),
            succeeded = progress.counters.succeeded,
            failed = progress.counters.failed,
            "Import progress"
        );
    }
}

/// Prints each update as one JSON line on stdout.
pub fn progress_json() -> impl Fn(&ImportProgress) + Send + Sync + 'static {
    |progress: &ImportProgress| {
        if let Ok(line) = serde_json::to_string(progress) {
            println!("{line}");
        }
    }
}

pub fn print_summary(summary: &ImportSummaryReport) {
    let rows = &summary.rows;
    println!("Import {} ({:?}):", summary.import_id, summary.status);
    println!("-----------------------------");
    println!("{:<16} {}", "Period", summary.period.as_deref().unwrap_or("n/a"));
    println!("{:<16} {}", "Rows", rows.total);
    println!("{:<16} {}", "Created", rows.created);
    println!("{:<16} {}", "Updated", rows.updated);
    println!("{:<16} {} ({} unchanged)", "Skipped", rows.skipped, rows.unchanged);
    println!("{:<16} {}", "Failed", rows.failed);
    println!("{:<16} {}", "Pending", rows.pending);
    println!("{:<16} {}", "Warnings", summary.warnings.len());
    println!("{:<16} {}", "Batches", summary.metrics.batches_dispatched);

    for error in summary.errors.iter().take(20) {
        println!("  error: {error}");
    }
    if summary.errors.len() > 20 {
        println!("  ... {} more errors", summary.errors.len() - 20);
    }
}

#[derive(Serialize)]
struct PreviewLine<'a> {
    row: usize,
    kind: &'static str,
    result: &'a ReconciliationResult,
}

#[derive(Serialize)]
struct PreviewJson<'a> {
    results: Vec<PreviewLine<'a>>,
    invalid: &'a [(usize, String)],
    warnings: &'a [ImportWarning],
}

pub fn print_preview(preview: &PreviewReport, as_json: bool) -> Result<(), CliError> {
    if as_json {
        let results = preview
            .results
            .iter()
            .map(|(row, result)| PreviewLine {
                row: *row,
                kind: result.kind(),
                result,
            })
            .collect();
        let json = PreviewJson {
            results,
            invalid: &preview.invalid,
            warnings: &preview.warnings,
        };
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("Preview:");
    println!("-----------------------------");
    for kind in ["new", "update", "unmatched"] {
        println!("{:<16} {}", kind, preview.count(kind));
    }
    println!("{:<16} {}", "invalid", preview.invalid.len());
    for (row, result) in &preview.results {
        match result {
            ReconciliationResult::UpdateEntity(diff) if diff.has_changes() => println!(
                "  row {row}: update {} (delta {:+.2})",
                diff.entity_id, diff.aggregate_delta
            ),
            ReconciliationResult::NewEntity(entity) => {
                println!("  row {row}: new entity (total {:.2})", entity.total())
            }
            ReconciliationResult::Unmatched(warning) => println!("  row {row}: {warning}"),
            ReconciliationResult::UpdateEntity(_) => {}
        }
    }
    for (row, reason) in &preview.invalid {
        println!("  row {row}: invalid, {reason}");
    }
    for warning in &preview.warnings {
        println!("  warning: {warning}");
    }
    Ok(())
}

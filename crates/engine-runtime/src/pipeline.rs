use crate::{
    error::ImportError,
    orchestrator::{IMPORTING, ImportOrchestrator, PARSING, VALIDATING},
    writer::{EntityWriter, WriteAck, WriterHandler},
};
use engine_core::metrics::MetricsSnapshot;
use engine_processing::{
    diff::DiffCalculator,
    reconcile::{Reconciler, index::EntityIndex, resolver::IdentityResolver},
};
use model::{
    import::{
        outcome::{ImportOutcome, RowDisposition},
        reconciliation::{ImportAction, ImportItem, ReconciliationResult, UnmatchedPolicy},
        warning::ImportWarning,
    },
    records::{entity::EntityRecord, row::SourceRow},
};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Knobs for row reconciliation.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub resolver: IdentityResolver,
    pub diff: DiffCalculator,
    pub unmatched: UnmatchedPolicy,
}

/// Everything a finished (or cancelled) run produced.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub outcome: ImportOutcome,
    pub warnings: Vec<ImportWarning>,
    pub errors: Vec<String>,
    /// Rows skipped because nothing changed.
    pub unchanged: usize,
    /// Stopped early on an item failure with `continue_on_error` disabled.
    pub halted: bool,
    pub metrics: MetricsSnapshot,
}

/// Read-only result of reconciling rows without writing anything.
#[derive(Debug, Clone, Default)]
pub struct PreviewReport {
    pub results: Vec<(usize, ReconciliationResult)>,
    pub invalid: Vec<(usize, String)>,
    pub warnings: Vec<ImportWarning>,
}

impl PreviewReport {
    pub fn count(&self, kind: &str) -> usize {
        self.results.iter().filter(|(_, r)| r.kind() == kind).count()
    }
}

/// Parsing, then validating, then importing, driven through an
/// [`ImportOrchestrator`].
pub struct ImportPipeline {
    orchestrator: ImportOrchestrator,
    options: PipelineOptions,
}

impl ImportPipeline {
    pub fn new(orchestrator: ImportOrchestrator, options: PipelineOptions) -> Self {
        ImportPipeline {
            orchestrator,
            options,
        }
    }

    pub fn orchestrator(&self) -> &ImportOrchestrator {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut ImportOrchestrator {
        &mut self.orchestrator
    }

    pub fn into_orchestrator(self) -> ImportOrchestrator {
        self.orchestrator
    }

    /// Reconciles rows against `entities` and reports what an import would do.
    pub fn preview(&self, rows: &[SourceRow], entities: Vec<EntityRecord>) -> PreviewReport {
        let index = EntityIndex::build(entities);
        let reconciler = reconciler(&self.options, &index);
        let mut report = PreviewReport::default();

        for row in rows {
            if let Err(reason) = self.check_row(row) {
                report.invalid.push((row.index(), reason));
                continue;
            }
            match reconciler.reconcile(row) {
                Ok(reconciled) => {
                    report.warnings.extend(reconciled.warnings);
                    report.results.push((reconciled.row_index, reconciled.result));
                }
                Err(err) => report.invalid.push((row.index(), err.to_string())),
            }
        }
        report
    }

    pub async fn run<W>(
        &mut self,
        rows: Vec<SourceRow>,
        entities: Vec<EntityRecord>,
        writer: &W,
    ) -> Result<PipelineReport, ImportError>
    where
        W: EntityWriter + ?Sized,
    {
        let mut outcome = ImportOutcome::default();
        let total_rows = rows.len();
        info!(
            import_id = %self.orchestrator.import_id(),
            rows = total_rows,
            entities = entities.len(),
            "Import started"
        );

        // Parsing
        if !self.enter(PARSING, "Checking rows", total_rows)? {
            outcome.pending_indices.extend(rows.iter().map(SourceRow::index));
            return Ok(self.finish_cancelled(outcome, 0));
        }
        let mut valid = Vec::with_capacity(total_rows);
        for (position, row) in rows.into_iter().enumerate() {
            match self.check_row(&row) {
                Ok(()) => valid.push(row),
                Err(reason) => {
                    self.orchestrator
                        .add_error(format!("row {}: {reason}", row.index()), 1);
                    outcome.record(row.index(), RowDisposition::Failed(reason));
                }
            }
            self.advance(position)?;
        }

        // Validating
        if self.orchestrator.is_cancelled()
            || !self.enter(VALIDATING, "Reconciling rows", valid.len())?
        {
            outcome.pending_indices.extend(valid.iter().map(SourceRow::index));
            return Ok(self.finish_cancelled(outcome, 0));
        }
        let index = EntityIndex::build(entities);
        for (key, value, count) in index.collisions() {
            warn!(key = %key, value = %value, entities = count, "Identifier shared by several entities");
        }

        let mut items = Vec::new();
        let mut unchanged = 0;
        {
            let options = self.options.clone();
            let reconciler = reconciler(&options, &index);
            for (position, row) in valid.iter().enumerate() {
                let reconciled = match reconciler.reconcile(row) {
                    Ok(reconciled) => reconciled,
                    Err(err) => {
                        let reason = err.to_string();
                        self.orchestrator
                            .add_error(format!("row {}: {reason}", row.index()), 1);
                        outcome.record(row.index(), RowDisposition::Failed(reason));
                        continue;
                    }
                };

                for warning in reconciled.warnings {
                    self.orchestrator.add_warning(warning);
                }

                match reconciled.result {
                    ReconciliationResult::NewEntity(preview) => items.push(ImportItem {
                        row_index: reconciled.row_index,
                        action: ImportAction::Create(preview),
                    }),
                    ReconciliationResult::UpdateEntity(diff) if diff.has_changes() => {
                        items.push(ImportItem {
                            row_index: reconciled.row_index,
                            action: ImportAction::Update(diff),
                        })
                    }
                    ReconciliationResult::UpdateEntity(_) => {
                        unchanged += 1;
                        outcome.record(reconciled.row_index, RowDisposition::Skipped);
                    }
                    ReconciliationResult::Unmatched(warning) => {
                        self.orchestrator.add_warning(warning);
                        outcome.record(reconciled.row_index, RowDisposition::Skipped);
                    }
                }

                self.advance(position)?;
            }
        }

        // Importing
        if self.orchestrator.is_cancelled()
            || !self.enter(IMPORTING, "Writing changes", items.len())?
        {
            outcome
                .pending_indices
                .extend(items.iter().map(|item| item.row_index));
            return Ok(self.finish_cancelled(outcome, unchanged));
        }
        let row_of: Vec<usize> = items.iter().map(|item| item.row_index).collect();
        let handler = WriterHandler::new(writer, self.orchestrator.import_id().clone());
        let results = self.orchestrator.process_batch(items, &handler).await?;

        let mut dispositions: BTreeMap<usize, RowDisposition> = BTreeMap::new();
        for success in results.results {
            let disposition = match success.value {
                WriteAck::Created(id) => RowDisposition::Created(id),
                WriteAck::Updated(id) => RowDisposition::Updated(id),
            };
            dispositions.insert(row_of[success.index], disposition);
        }
        for failure in results.errors {
            dispositions.insert(failure.item.row_index, RowDisposition::Failed(failure.error));
        }
        for (row_index, disposition) in dispositions {
            outcome.record(row_index, disposition);
        }
        outcome
            .pending_indices
            .extend(results.pending.map(|i| row_of[i]));
        outcome.cancelled = results.cancelled;

        if !results.cancelled && !results.errored {
            self.orchestrator.finish()?;
        }

        let mut report = self.report(outcome, unchanged);
        report.halted = results.errored;
        Ok(report)
    }

    /// Starts a phase; `false` when a cancel got there first.
    fn enter(&mut self, phase: &str, message: &str, total: usize) -> Result<bool, ImportError> {
        match self
            .orchestrator
            .start_phase(phase, Some(message), Some(total as u64))
        {
            Ok(()) => Ok(true),
            Err(ImportError::InvalidTransition { .. }) if self.orchestrator.is_cancelled() => {
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Marks row `position` of the active phase done.
    fn advance(&mut self, position: usize) -> Result<(), ImportError> {
        match self
            .orchestrator
            .update_phase_progress(position as u64 + 1, Some(position), None)
        {
            Err(ImportError::InvalidTransition { .. }) if self.orchestrator.is_cancelled() => {
                Ok(())
            }
            other => other,
        }
    }

    /// A row is importable when it carries an identifier and every amount parses.
    fn check_row(&self, row: &SourceRow) -> Result<(), String> {
        let resolver = &self.options.resolver;
        if !resolver.has_identifier(row) {
            return Err("row carries no identifier value".to_string());
        }
        row.amounts(resolver.columns()).map(|_| ()).map_err(|err| err.to_string())
    }

    fn finish_cancelled(&mut self, mut outcome: ImportOutcome, unchanged: usize) -> PipelineReport {
        self.orchestrator.cancel();
        outcome.cancelled = true;
        self.report(outcome, unchanged)
    }

    fn report(&self, outcome: ImportOutcome, unchanged: usize) -> PipelineReport {
        info!(
            import_id = %self.orchestrator.import_id(),
            created = outcome.created_ids.len(),
            updated = outcome.updated_ids.len(),
            skipped = outcome.skipped_indices.len(),
            failed = outcome.failed_count,
            pending = outcome.pending_indices.len(),
            cancelled = outcome.cancelled,
            "Import outcome assembled"
        );
        PipelineReport {
            outcome,
            warnings: self.orchestrator.warnings().to_vec(),
            errors: self.orchestrator.errors().to_vec(),
            unchanged,
            halted: false,
            metrics: self.orchestrator.metrics().snapshot(),
        }
    }
}

fn reconciler<'a>(options: &'a PipelineOptions, index: &'a EntityIndex) -> Reconciler<'a> {
    Reconciler::new(&options.resolver, index)
        .with_diff(options.diff)
        .with_unmatched_policy(options.unmatched)
}

use crate::error::ImportError;
use engine_core::{
    metrics::ImportMetrics,
    progress::{PhaseSpec, PhaseTracker, ProgressSnapshot},
    subscription::{SubscriberRegistry, Subscription},
};
use engine_processing::batch::{
    BatchHandler, BatchScheduler, BatchState, ItemFailure, ItemSuccess, SchedulerConfig,
    Termination,
};
use model::{core::identifiers::ImportId, import::warning::ImportWarning};
use serde::Serialize;
use std::{fmt, ops::Range};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const PARSING: &str = "parsing";
pub const VALIDATING: &str = "validating";
pub const IMPORTING: &str = "importing";

/// Parsing, validating and importing weighted 10/20/70.
pub fn default_phases() -> Vec<PhaseSpec> {
    vec![
        PhaseSpec::new(PARSING, 0.1, 0),
        PhaseSpec::new(VALIDATING, 0.2, 0),
        PhaseSpec::new(IMPORTING, 0.7, 0),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ImportState {
    Idle,
    Parsing,
    Validating,
    Importing,
    /// Cancellation requested while a batch is still in flight.
    Cancelling,
    Completed {
        cancelled: bool,
    },
    Error {
        message: String,
    },
}

impl ImportState {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ImportState::Parsing
                | ImportState::Validating
                | ImportState::Importing
                | ImportState::Cancelling
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportState::Completed { .. } | ImportState::Error { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            ImportState::Idle => "idle",
            ImportState::Parsing => "parsing",
            ImportState::Validating => "validating",
            ImportState::Importing => "importing",
            ImportState::Cancelling => "cancelling",
            ImportState::Completed { cancelled: false } => "completed",
            ImportState::Completed { cancelled: true } => "cancelled",
            ImportState::Error { .. } => "failed",
        }
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Domain tallies kept next to phase progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportCounters {
    pub succeeded: usize,
    pub failed: usize,
    pub warnings: usize,
    pub groups_completed: usize,
}

/// What subscribers receive and `current_progress` returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportProgress {
    pub import_id: ImportId,
    pub state: ImportState,
    pub progress: ProgressSnapshot,
    pub message: Option<String>,
    pub current_item_index: Option<usize>,
    pub current_group: Option<String>,
    pub counters: ImportCounters,
    pub batch: Option<BatchState>,
}

#[derive(Debug, Clone)]
pub struct BatchResults<T, R> {
    pub results: Vec<ItemSuccess<R>>,
    pub errors: Vec<ItemFailure<T>>,
    pub cancelled: bool,
    /// Halted on an item failure with `continue_on_error` disabled.
    pub errored: bool,
    /// Item indices never dispatched.
    pub pending: Range<usize>,
}

/// Cloneable cancel switch, usable while `process_batch` is awaiting.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            info!("Import cancellation requested");
        }
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Sequences an import's phases, feeds the importing phase through the
/// batch scheduler and publishes progress after every state change.
pub struct ImportOrchestrator {
    import_id: ImportId,
    phase_names: Vec<String>,
    importing_position: usize,
    tracker: PhaseTracker,
    state: ImportState,
    scheduler_config: SchedulerConfig,
    metrics: ImportMetrics,
    cancel: CancellationToken,
    subscribers: SubscriberRegistry<ImportProgress>,
    counters: ImportCounters,
    errors: Vec<String>,
    warnings: Vec<ImportWarning>,
    message: Option<String>,
    current_item_index: Option<usize>,
    current_group: Option<String>,
    group_open: bool,
    last_batch: Option<BatchState>,
}

impl ImportOrchestrator {
    pub fn new(phases: &[PhaseSpec], scheduler_config: SchedulerConfig) -> Result<Self, ImportError> {
        let tracker = PhaseTracker::new(phases)?;
        let importing_position = phases
            .iter()
            .position(|p| p.name == IMPORTING)
            .ok_or_else(|| ImportError::MissingImportPhase(IMPORTING.to_string()))?;
        scheduler_config.sizing.validate()?;

        Ok(ImportOrchestrator {
            import_id: ImportId::generate(),
            phase_names: phases.iter().map(|p| p.name.clone()).collect(),
            importing_position,
            tracker,
            state: ImportState::Idle,
            scheduler_config,
            metrics: ImportMetrics::new(),
            cancel: CancellationToken::new(),
            subscribers: SubscriberRegistry::new(),
            counters: ImportCounters::default(),
            errors: Vec::new(),
            warnings: Vec::new(),
            message: None,
            current_item_index: None,
            current_group: None,
            group_open: false,
            last_batch: None,
        })
    }

    pub fn with_defaults() -> Result<Self, ImportError> {
        Self::new(&default_phases(), SchedulerConfig::default())
    }

    pub fn with_import_id(mut self, import_id: ImportId) -> Self {
        self.import_id = import_id;
        self
    }

    pub fn with_metrics(mut self, metrics: ImportMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Shares an externally owned token, e.g. one cancelled on SIGINT.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn import_id(&self) -> &ImportId {
        &self.import_id
    }

    /// Current state; an active import with a pending cancel reads as `Cancelling`.
    pub fn state(&self) -> ImportState {
        if self.cancel.is_cancelled() && self.state.is_active() {
            ImportState::Cancelling
        } else {
            self.state.clone()
        }
    }

    pub fn counters(&self) -> &ImportCounters {
        &self.counters
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[ImportWarning] {
        &self.warnings
    }

    pub fn metrics(&self) -> &ImportMetrics {
        &self.metrics
    }

    pub fn tracker(&self) -> &PhaseTracker {
        &self.tracker
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.cancel.clone(),
        }
    }

    /// Enters `name`, closing the previously active phase. Repeating the same
    /// call changes nothing and publishes nothing.
    pub fn start_phase(
        &mut self,
        name: &str,
        message: Option<&str>,
        total_steps: Option<u64>,
    ) -> Result<(), ImportError> {
        let Some(position) = self.phase_names.iter().position(|p| p == name) else {
            return Err(ImportError::UnknownPhase(name.to_string()));
        };
        self.sync_cancellation();
        self.ensure_open("start a phase")?;
        self.enter_phase(position, name, message, total_steps);
        Ok(())
    }

    fn enter_phase(
        &mut self,
        position: usize,
        name: &str,
        message: Option<&str>,
        total_steps: Option<u64>,
    ) {
        let mut changed = false;
        if let Some(total) = total_steps {
            changed |= self.tracker.set_total_steps(name, total);
        }

        let previous = self.tracker.active_phase().map(|p| p.name().to_string());
        if previous.as_deref() != Some(name) {
            if let Some(previous) = &previous {
                self.tracker.complete_phase(previous);
            }
            changed |= self.tracker.activate(name);
            self.current_item_index = None;
        }

        let stage = self.stage_at(position);
        if self.state != stage {
            self.state = stage;
            changed = true;
        }

        if let Some(message) = message
            && self.message.as_deref() != Some(message)
        {
            self.message = Some(message.to_string());
            changed = true;
        }

        if changed {
            info!(
                import_id = %self.import_id,
                phase = name,
                previous = previous.as_deref().unwrap_or("-"),
                "Phase started"
            );
            self.publish();
        }
    }

    /// Moves the active phase to `completed_steps` (clamped to its total).
    pub fn update_phase_progress(
        &mut self,
        completed_steps: u64,
        current_item_index: Option<usize>,
        message: Option<&str>,
    ) -> Result<(), ImportError> {
        self.sync_cancellation();
        self.ensure_open("update phase progress")?;
        let Some(active) = self.tracker.active_phase().map(|p| p.name().to_string()) else {
            return Err(ImportError::InvalidTransition {
                action: "update phase progress",
                state: self.state.to_string(),
            });
        };

        let steps = i64::try_from(completed_steps).unwrap_or(i64::MAX);
        self.tracker.update_phase(&active, steps, false);
        if current_item_index.is_some() {
            self.current_item_index = current_item_index;
        }
        if let Some(message) = message {
            self.message = Some(message.to_string());
        }
        self.publish();
        Ok(())
    }

    /// Runs `items` through the batch scheduler as part of the importing
    /// phase. Successes and failures are tallied into the counters.
    pub async fn process_batch<T, R, H>(
        &mut self,
        items: Vec<T>,
        handler: &H,
    ) -> Result<BatchResults<T, R>, ImportError>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        H: BatchHandler<T, R> + ?Sized,
    {
        self.sync_cancellation();
        if self.state == (ImportState::Completed { cancelled: true }) {
            return Ok(BatchResults {
                results: Vec::new(),
                errors: Vec::new(),
                cancelled: true,
                errored: false,
                pending: 0..items.len(),
            });
        }
        self.ensure_open("process a batch")?;

        if self.state != ImportState::Importing {
            self.enter_phase(self.importing_position, IMPORTING, None, None);
        }

        let base = self
            .tracker
            .phase(IMPORTING)
            .map(|p| p.completed_steps())
            .unwrap_or_default();
        let wanted_total = base + items.len() as u64;
        let current_total = self
            .tracker
            .phase(IMPORTING)
            .map(|p| p.total_steps())
            .unwrap_or_default();
        if wanted_total > current_total {
            self.tracker.set_total_steps(IMPORTING, wanted_total);
        }

        let scheduler = BatchScheduler::new(self.scheduler_config.clone())?
            .with_cancel_token(self.cancel.clone())
            .with_metrics(self.metrics.clone());

        info!(
            import_id = %self.import_id,
            items = items.len(),
            "Dispatching import batches"
        );

        let report = {
            let this = &mut *self;
            scheduler
                .run(items, handler, |state| this.on_batch_settled(base, state))
                .await
        };

        let pending = report.pending_indices();
        let cancelled = report.cancelled();
        let errored = report.errored();

        self.counters.succeeded += report.successes.len();
        self.counters.failed += report.failures.len();
        self.errors.extend(
            report
                .failures
                .iter()
                .map(|f| format!("item {}: {}", f.index, f.error)),
        );
        self.last_batch = Some(report.state.clone());

        match report.termination {
            Termination::Fatal(err) => {
                error!(import_id = %self.import_id, error = %err, "Import aborted");
                self.errors.push(err.to_string());
                self.state = ImportState::Error {
                    message: err.to_string(),
                };
                self.publish();
                return Err(ImportError::SchedulerFatal(err));
            }
            Termination::Cancelled => {
                warn!(
                    import_id = %self.import_id,
                    pending = pending.len(),
                    "Import cancelled at batch boundary"
                );
            }
            Termination::Halted => {
                warn!(import_id = %self.import_id, "Import halted on item failure");
            }
            Termination::Completed => {}
        }
        if !self.sync_cancellation() {
            self.publish();
        }

        Ok(BatchResults {
            results: report.successes,
            errors: report.failures,
            cancelled,
            errored,
            pending,
        })
    }

    pub fn add_success(&mut self, count: usize) {
        self.counters.succeeded += count;
        self.publish();
    }

    /// Records `count` failures under one message. Never fatal by itself.
    pub fn add_error(&mut self, error: impl Into<String>, count: usize) {
        let error = error.into();
        warn!(import_id = %self.import_id, count, error = %error, "Import error recorded");
        self.counters.failed += count;
        self.errors.push(error);
        self.publish();
    }

    pub fn add_warning(&mut self, warning: ImportWarning) {
        warn!(import_id = %self.import_id, code = %warning.code, "{}", warning.message);
        self.counters.warnings += 1;
        self.warnings.push(warning);
        self.publish();
    }

    /// Opens a named group of related items. Re-opening the current group is a no-op.
    pub fn begin_group(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.group_open && self.current_group.as_deref() == Some(name.as_str()) {
            return;
        }
        self.current_group = Some(name);
        self.group_open = true;
        self.publish();
    }

    /// Counts the current group once; later calls return false until a new group begins.
    pub fn complete_current_group(&mut self) -> bool {
        if !self.group_open {
            return false;
        }
        self.group_open = false;
        self.counters.groups_completed += 1;
        self.publish();
        true
    }

    /// Requests cancellation. Without a batch in flight the import completes
    /// as cancelled right away. Outside an active import this does nothing.
    pub fn cancel(&mut self) {
        if !self.state.is_active() {
            debug!(
                import_id = %self.import_id,
                state = %self.state,
                "Cancel ignored, no import in progress"
            );
            return;
        }
        self.cancel_handle().cancel();
        self.sync_cancellation();
    }

    /// Completes every phase and closes the import.
    pub fn finish(&mut self) -> Result<(), ImportError> {
        self.sync_cancellation();
        match &self.state {
            ImportState::Completed { .. } => return Ok(()),
            ImportState::Error { .. } => {
                return Err(ImportError::InvalidTransition {
                    action: "finish",
                    state: self.state.to_string(),
                });
            }
            _ => {}
        }

        for name in &self.phase_names {
            let untouched = self
                .tracker
                .phase(name)
                .is_some_and(|p| p.total_steps() == 0 && p.started_at().is_none());
            if untouched {
                self.tracker.activate(name);
            }
            self.tracker.complete_phase(name);
        }
        self.tracker.deactivate_at(std::time::Instant::now());
        self.state = ImportState::Completed { cancelled: false };
        self.current_group = None;
        self.group_open = false;

        info!(
            import_id = %self.import_id,
            succeeded = self.counters.succeeded,
            failed = self.counters.failed,
            warnings = self.counters.warnings,
            "Import finished"
        );
        self.publish();
        Ok(())
    }

    /// Back to `Idle` with zeroed phases and counters. Cancel handles taken
    /// before the reset no longer affect this orchestrator.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.state = ImportState::Idle;
        self.cancel = CancellationToken::new();
        self.counters = ImportCounters::default();
        self.errors.clear();
        self.warnings.clear();
        self.message = None;
        self.current_item_index = None;
        self.current_group = None;
        self.group_open = false;
        self.last_batch = None;
        info!(import_id = %self.import_id, "Import reset");
        self.publish();
    }

    pub fn current_progress(&self) -> ImportProgress {
        ImportProgress {
            import_id: self.import_id.clone(),
            state: self.state(),
            progress: self.tracker.snapshot(),
            message: self.message.clone(),
            current_item_index: self.current_item_index,
            current_group: self.current_group.clone(),
            counters: self.counters.clone(),
            batch: self.last_batch.clone(),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ImportProgress) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.subscribers.unsubscribe(subscription)
    }

    fn on_batch_settled(&mut self, base: u64, state: &BatchState) {
        let steps = i64::try_from(base + state.processed_count as u64).unwrap_or(i64::MAX);
        self.tracker.update_phase(IMPORTING, steps, false);
        self.current_item_index = state.processed_count.checked_sub(1);
        self.last_batch = Some(state.clone());
        self.publish();
    }

    /// Phases before the importing phase read as parsing (the first) or
    /// validating; the importing phase and anything after it as importing.
    fn stage_at(&self, position: usize) -> ImportState {
        if position >= self.importing_position {
            ImportState::Importing
        } else if position == 0 {
            ImportState::Parsing
        } else {
            ImportState::Validating
        }
    }

    /// Resolves a pending cancel into `Completed { cancelled: true }`.
    fn sync_cancellation(&mut self) -> bool {
        if self.cancel.is_cancelled() && self.state.is_active() {
            info!(import_id = %self.import_id, "Import completed as cancelled");
            self.state = ImportState::Completed { cancelled: true };
            self.publish();
            return true;
        }
        false
    }

    fn ensure_open(&self, action: &'static str) -> Result<(), ImportError> {
        if self.state.is_terminal() {
            return Err(ImportError::InvalidTransition {
                action,
                state: self.state.to_string(),
            });
        }
        Ok(())
    }

    fn publish(&self) {
        if self.subscribers.subscriber_count() == 0 {
            return;
        }
        let progress = self.current_progress();
        self.subscribers.publish(&progress);
    }
}

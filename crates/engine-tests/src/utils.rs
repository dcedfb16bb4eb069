use async_trait::async_trait;
use engine_processing::{
    batch::{SchedulerConfig, SizingConfig},
    error::BatchError,
};
use engine_runtime::{
    orchestrator::{ImportOrchestrator, ImportProgress, default_phases},
    writer::{EntityWriter, InMemoryEntityStore, WriteResult},
};
use model::{
    core::key::IdentifierKey,
    import::reconciliation::ImportItem,
    records::{entity::EntityRecord, row::SourceRow},
};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Stored payroll entities. `n1` and `n2` share a display name on purpose.
pub fn payroll_entities() -> Vec<EntityRecord> {
    vec![
        EntityRecord::new("e1")
            .with_identifier(IdentifierKey::IdNumber, "110101199001011234")
            .with_identifier(IdentifierKey::EmployeeCode, "E001")
            .with_identifier(IdentifierKey::FullName, "Li Wei")
            .with_value("basic_salary", 8000.0)
            .with_value("bonus", 500.0),
        EntityRecord::new("e2")
            .with_identifier(IdentifierKey::EmployeeCode, "E002")
            .with_identifier(IdentifierKey::FullName, "Wang Fang")
            .with_value("basic_salary", 6000.0),
        EntityRecord::new("n1")
            .with_identifier(IdentifierKey::FullName, "Zhang Min")
            .with_value("basic_salary", 4000.0),
        EntityRecord::new("n2")
            .with_identifier(IdentifierKey::FullName, "Zhang Min")
            .with_value("basic_salary", 4100.0),
    ]
}

/// One row per disposition, keyed by the source system's Chinese headers.
///
/// 0: id number match with a changed bonus
/// 1: code match, nothing changed
/// 2: empty code, name shared by `n1` and `n2`
/// 3: no identifier at all
/// 4: unknown code, becomes a new entity
/// 5: unparseable amount
pub fn payroll_rows() -> Vec<SourceRow> {
    vec![
        SourceRow::from_pairs(
            0,
            [
                ("身份证号", "110101199001011234"),
                ("员工编号", "E999"),
                ("basic_salary", "8,000"),
                ("bonus", "650"),
                ("department", "Finance"),
            ],
        ),
        SourceRow::from_pairs(1, [("员工编号", "e002"), ("basic_salary", "6000.00")]),
        SourceRow::from_pairs(
            2,
            [("员工编号", ""), ("员工姓名", "Zhang  Min"), ("basic_salary", "4200")],
        ),
        SourceRow::from_pairs(3, [("department", "Sales"), ("basic_salary", "1000")]),
        SourceRow::from_pairs(
            4,
            [("员工编号", "E100"), ("员工姓名", "Zhao Lei"), ("basic_salary", "5000")],
        ),
        SourceRow::from_pairs(5, [("员工编号", "E001"), ("bonus", "n/a")]),
    ]
}

/// Scheduler that always dispatches `size` items per batch.
pub fn fixed_batches(size: usize) -> SchedulerConfig {
    SchedulerConfig::new(SizingConfig::default().with_bounds(size, size, size))
}

pub fn orchestrator(config: SchedulerConfig) -> ImportOrchestrator {
    ImportOrchestrator::new(&default_phases(), config).expect("default phases are valid")
}

/// Collects every progress update the orchestrator publishes.
pub fn record_progress(orchestrator: &ImportOrchestrator) -> Arc<Mutex<Vec<ImportProgress>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    orchestrator.subscribe(move |progress| {
        if let Ok(mut seen) = sink.lock() {
            seen.push(progress.clone());
        }
    });
    seen
}

/// Writer whose first `failures` calls fail as a whole with a transient error.
pub struct FlakyWriter {
    inner: InMemoryEntityStore,
    remaining: AtomicUsize,
}

impl FlakyWriter {
    pub fn new(inner: InMemoryEntityStore, failures: usize) -> Self {
        FlakyWriter {
            inner,
            remaining: AtomicUsize::new(failures),
        }
    }

    pub fn store(&self) -> &InMemoryEntityStore {
        &self.inner
    }
}

#[async_trait]
impl EntityWriter for FlakyWriter {
    async fn write(&self, batch: &[ImportItem]) -> Result<Vec<WriteResult>, BatchError> {
        let failing = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BatchError::transient("connection reset by peer"));
        }
        self.inner.write(batch).await
    }
}

pub const SLOW_BATCH: Duration = Duration::from_millis(100);

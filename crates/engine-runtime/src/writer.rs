use async_trait::async_trait;
use engine_processing::{
    batch::{BatchHandler, BatchOutcome, BatchRequest},
    diff::DiffCalculator,
    error::BatchError,
};
use model::{
    core::identifiers::{BatchId, EntityId, ImportId},
    import::reconciliation::{ImportAction, ImportItem},
    records::entity::EntityRecord,
};
use std::{
    collections::{BTreeMap, HashSet},
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Acknowledgement for one committed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteAck {
    Created(EntityId),
    Updated(EntityId),
}

/// Per-item write result; `Err` carries the reason the item was rejected.
pub type WriteResult = Result<WriteAck, String>;

/// Persistence-write collaborator. Returns one result per item, in order;
/// `Err` is reserved for failures of the whole call.
#[async_trait]
pub trait EntityWriter: Send + Sync {
    async fn write(&self, batch: &[ImportItem]) -> Result<Vec<WriteResult>, BatchError>;
}

/// Adapts an [`EntityWriter`] to the batch scheduler.
pub struct WriterHandler<'w, W: ?Sized> {
    writer: &'w W,
    import_id: ImportId,
}

impl<'w, W: EntityWriter + ?Sized> WriterHandler<'w, W> {
    pub fn new(writer: &'w W, import_id: ImportId) -> Self {
        WriterHandler { writer, import_id }
    }
}

#[async_trait]
impl<'w, W: EntityWriter + ?Sized> BatchHandler<ImportItem, WriteAck> for WriterHandler<'w, W> {
    async fn handle(
        &self,
        request: BatchRequest<ImportItem>,
    ) -> Result<BatchOutcome<WriteAck>, BatchError> {
        let batch_id = BatchId::for_batch(&self.import_id, request.batch_number);
        debug!(batch_id = %batch_id, items = request.len(), "Writing batch");

        let results = self.writer.write(&request.items).await?;

        let mut outcome = BatchOutcome::new();
        for ((index, _), result) in request.indexed().zip(results) {
            match result {
                Ok(ack) => outcome.succeed(index, ack),
                Err(reason) => outcome.fail(index, reason),
            }
        }

        info!(
            batch_id = %batch_id,
            written = outcome.successes.len(),
            rejected = outcome.failures.len(),
            "Batch written"
        );
        Ok(outcome)
    }
}

/// Map-backed writer for demos and tests.
pub struct InMemoryEntityStore {
    entities: Mutex<BTreeMap<EntityId, EntityRecord>>,
    failing_rows: HashSet<usize>,
    latency: Option<Duration>,
}

impl InMemoryEntityStore {
    pub fn new(entities: impl IntoIterator<Item = EntityRecord>) -> Self {
        InMemoryEntityStore {
            entities: Mutex::new(
                entities
                    .into_iter()
                    .map(|entity| (entity.id.clone(), entity))
                    .collect(),
            ),
            failing_rows: HashSet::new(),
            latency: None,
        }
    }

    /// Rejects writes for items coming from these source rows.
    pub fn with_failing_rows(mut self, rows: impl IntoIterator<Item = usize>) -> Self {
        self.failing_rows.extend(rows);
        self
    }

    /// Sleeps this long on every write call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn get(&self, id: &EntityId) -> Option<EntityRecord> {
        self.entities.lock().await.get(id).cloned()
    }

    pub async fn entities(&self) -> Vec<EntityRecord> {
        self.entities.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entities.lock().await.len()
    }

    fn apply(
        entities: &mut BTreeMap<EntityId, EntityRecord>,
        item: &ImportItem,
    ) -> WriteResult {
        match &item.action {
            ImportAction::Create(preview) => {
                let mut entity = EntityRecord::new(EntityId::generate());
                entity.identifiers = preview.identifiers.clone();
                for value in &preview.values {
                    entity.values.insert(value.field.clone(), value.amount);
                }
                let id = entity.id.clone();
                entities.insert(id.clone(), entity);
                Ok(WriteAck::Created(id))
            }
            ImportAction::Update(diff) => {
                let Some(entity) = entities.get_mut(&diff.entity_id) else {
                    return Err(format!("entity {} no longer exists", diff.entity_id));
                };
                entity.values = DiffCalculator::apply(&entity.values, diff);
                Ok(WriteAck::Updated(diff.entity_id.clone()))
            }
        }
    }
}

#[async_trait]
impl EntityWriter for InMemoryEntityStore {
    async fn write(&self, batch: &[ImportItem]) -> Result<Vec<WriteResult>, BatchError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut entities = self.entities.lock().await;
        let results = batch
            .iter()
            .map(|item| {
                if self.failing_rows.contains(&item.row_index) {
                    Err(format!("write rejected for row {}", item.row_index))
                } else {
                    Self::apply(&mut entities, item)
                }
            })
            .collect();
        Ok(results)
    }
}

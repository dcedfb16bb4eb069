use crate::diff::DiffCalculator;
use model::{
    error::RowValueError,
    import::{
        reconciliation::{EntityPreview, ReconciliationResult, UnmatchedPolicy},
        warning::{ImportWarning, WarningCode},
    },
    records::row::SourceRow,
};
use tracing::debug;

pub mod index;
pub mod resolver;

use index::EntityIndex;
use resolver::IdentityResolver;

/// Reconciliation of one row plus the warnings it raised along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct RowReconciliation {
    pub row_index: usize,
    pub result: ReconciliationResult,
    pub warnings: Vec<ImportWarning>,
}

/// Turns rows into reconciliation results against a fixed entity index.
pub struct Reconciler<'a> {
    resolver: &'a IdentityResolver,
    index: &'a EntityIndex,
    diff: DiffCalculator,
    unmatched: UnmatchedPolicy,
}

impl<'a> Reconciler<'a> {
    pub fn new(resolver: &'a IdentityResolver, index: &'a EntityIndex) -> Self {
        Reconciler {
            resolver,
            index,
            diff: DiffCalculator::new(),
            unmatched: UnmatchedPolicy::default(),
        }
    }

    pub fn with_diff(mut self, diff: DiffCalculator) -> Self {
        self.diff = diff;
        self
    }

    pub fn with_unmatched_policy(mut self, policy: UnmatchedPolicy) -> Self {
        self.unmatched = policy;
        self
    }

    pub fn reconcile(&self, row: &SourceRow) -> Result<RowReconciliation, RowValueError> {
        let row_index = row.index();
        let amounts = row.amounts(self.resolver.columns())?;
        let resolution = self.resolver.resolve(row, self.index);

        let mut warnings = Vec::new();
        if let Some(ambiguity) = &resolution.ambiguity {
            let candidates: Vec<&str> = ambiguity.candidates.iter().map(|c| c.as_str()).collect();
            warnings.push(ImportWarning::for_row(
                row_index,
                WarningCode::ReconciliationAmbiguity,
                format!(
                    "{} '{}' matches {} entities ({}); using the first",
                    ambiguity.key,
                    ambiguity.value,
                    candidates.len(),
                    candidates.join(", ")
                ),
            ));
        }

        let result = match resolution.entity {
            Some(entity) => ReconciliationResult::UpdateEntity(self.diff.diff(
                entity,
                &amounts,
                resolution.matched_by,
            )),
            None if !self.resolver.has_identifier(row) => {
                ReconciliationResult::Unmatched(ImportWarning::for_row(
                    row_index,
                    WarningCode::Unmatched,
                    "row carries no identifier value",
                ))
            }
            None => match self.unmatched {
                UnmatchedPolicy::Create => {
                    let (changes, _) = self.diff.compare(&Default::default(), &amounts);
                    let values = changes
                        .into_iter()
                        .map(|c| model::import::change::IncomingAmount::new(c.field, c.new_value))
                        .collect();
                    ReconciliationResult::NewEntity(EntityPreview {
                        row_index,
                        identifiers: self.resolver.identifiers_of(row),
                        values,
                    })
                }
                UnmatchedPolicy::Skip => ReconciliationResult::Unmatched(ImportWarning::for_row(
                    row_index,
                    WarningCode::Unmatched,
                    "no stored entity matches any identifier",
                )),
            },
        };

        debug!(row = row_index, result = result.kind(), "Row reconciled");
        Ok(RowReconciliation {
            row_index,
            result,
            warnings,
        })
    }
}

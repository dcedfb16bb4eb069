#[cfg(test)]
mod tests {
    use crate::utils::{FlakyWriter, fixed_batches, orchestrator, payroll_entities, payroll_rows};
    use engine_config::{
        report::summary::{ImportSummaryReport, SummaryStatus},
        settings::ImportSettings,
    };
    use engine_processing::{
        error::BatchError,
        reconcile::{Reconciler, index::EntityIndex, resolver::IdentityResolver},
    };
    use engine_runtime::{
        error::ImportError,
        orchestrator::ImportState,
        pipeline::{ImportPipeline, PipelineOptions},
        writer::InMemoryEntityStore,
    };
    use model::{
        core::{identifiers::EntityId, key::IdentifierKey},
        import::{reconciliation::ReconciliationResult, warning::WarningCode},
    };
    use std::fs;
    use tracing_test::traced_test;

    #[traced_test]
    #[tokio::test]
    async fn payroll_rows_are_each_accounted_for_once() {
        let store = InMemoryEntityStore::new(payroll_entities());
        let mut pipeline = ImportPipeline::new(orchestrator(fixed_batches(2)), PipelineOptions::default());

        let report = pipeline
            .run(payroll_rows(), payroll_entities(), &store)
            .await
            .unwrap();
        let outcome = &report.outcome;

        assert_eq!(outcome.created_ids.len(), 1);
        assert_eq!(
            outcome.updated_ids,
            vec![EntityId::new("e1"), EntityId::new("n1")]
        );
        assert_eq!(outcome.skipped_indices, vec![1]);
        let mut failed = outcome.failed_indices.clone();
        failed.sort();
        assert_eq!(failed, vec![3, 5]);
        assert_eq!(outcome.accounted_rows(), 6);
        assert_eq!(report.unchanged, 1);
        assert!(!report.halted);

        let e1 = store.get(&EntityId::new("e1")).await.unwrap();
        assert_eq!(e1.values["bonus"], 650.0);
        assert_eq!(e1.values["basic_salary"], 8000.0);
        let n2 = store.get(&EntityId::new("n2")).await.unwrap();
        assert_eq!(n2.values["basic_salary"], 4100.0);
        assert_eq!(store.len().await, 5);

        assert_eq!(
            pipeline.orchestrator().state(),
            ImportState::Completed { cancelled: false }
        );
        assert!(logs_contain("Identifier shared by several entities"));
    }

    // Scenario: a row has an empty internal code and a name that two stored
    // entities share.
    // Expected Outcome: the first indexed entity wins and exactly one
    // ambiguity warning is raised for that row.
    #[test]
    fn shared_name_resolves_to_first_entity_with_one_warning() {
        let index = EntityIndex::build(payroll_entities());
        let resolver = IdentityResolver::default();
        let reconciler = Reconciler::new(&resolver, &index);
        let row = &payroll_rows()[2];

        let reconciled = reconciler.reconcile(row).unwrap();

        match &reconciled.result {
            ReconciliationResult::UpdateEntity(diff) => {
                assert_eq!(diff.entity_id, EntityId::new("n1"));
                assert_eq!(diff.matched_by, Some(IdentifierKey::FullName));
            }
            other => panic!("expected an update, got {other:?}"),
        }
        let ambiguous: Vec<_> = reconciled
            .warnings
            .iter()
            .filter(|w| w.code == WarningCode::ReconciliationAmbiguity)
            .collect();
        assert_eq!(ambiguous.len(), 1);
        assert_eq!(ambiguous[0].row_index, Some(2));
    }

    #[tokio::test]
    async fn ambiguity_warning_survives_into_the_pipeline_report() {
        let store = InMemoryEntityStore::new(payroll_entities());
        let mut pipeline = ImportPipeline::new(orchestrator(fixed_batches(3)), PipelineOptions::default());

        let report = pipeline
            .run(payroll_rows(), payroll_entities(), &store)
            .await
            .unwrap();

        let rows: Vec<_> = report
            .warnings
            .iter()
            .filter(|w| w.code == WarningCode::ReconciliationAmbiguity)
            .map(|w| w.row_index)
            .collect();
        assert_eq!(rows, vec![Some(2)]);
    }

    #[traced_test]
    #[tokio::test]
    async fn writer_failure_aborts_the_import() {
        let writer = FlakyWriter::new(InMemoryEntityStore::new(payroll_entities()), 1);
        let mut pipeline = ImportPipeline::new(orchestrator(fixed_batches(2)), PipelineOptions::default());

        let err = pipeline
            .run(payroll_rows(), payroll_entities(), &writer)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ImportError::SchedulerFatal(BatchError::Handler { transient: true, .. })
        ));
        assert!(matches!(
            pipeline.orchestrator().state(),
            ImportState::Error { .. }
        ));
        assert_eq!(writer.store().len().await, 4);
        assert!(logs_contain("Import aborted"));
    }

    #[tokio::test]
    async fn settings_file_drives_the_import_and_its_summary() {
        let dir = tempfile::tempdir().unwrap();
        let settings_path = dir.path().join("import.json");
        fs::write(
            &settings_path,
            r#"{
                "period": "2024-03",
                "batch": { "initial_size": 2, "min_size": 1, "max_size": 4 },
                "unmatched": "skip"
            }"#,
        )
        .unwrap();

        let settings = ImportSettings::load(&settings_path)
            .unwrap()
            .validate()
            .unwrap();
        let store = InMemoryEntityStore::new(payroll_entities());
        let mut pipeline =
            ImportPipeline::new(settings.orchestrator().unwrap(), settings.pipeline_options());

        let result = pipeline
            .run(payroll_rows(), payroll_entities(), &store)
            .await
            .unwrap();
        let import_id = pipeline.orchestrator().import_id().clone();
        let summary =
            ImportSummaryReport::from_pipeline(import_id, &result).with_period(settings.period_label());

        assert_eq!(summary.status, SummaryStatus::CompletedWithFailures);
        assert_eq!(summary.rows.total, 6);
        assert_eq!(summary.rows.created, 0);
        assert_eq!(summary.rows.updated, 2);
        assert_eq!(summary.rows.skipped, 2);
        assert_eq!(summary.rows.failed, 2);
        assert_eq!(store.len().await, 4);

        let report_path = dir.path().join("summary.json");
        summary.write_to(&report_path).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
        assert_eq!(written["period"], "2024-03");
        assert_eq!(written["status"], "completedWithFailures");
        assert_eq!(written["rows"]["updated"], 2);
        assert_eq!(written["importId"], summary.import_id.to_string());
    }

    #[tokio::test]
    async fn env_overrides_halt_on_the_first_failed_write() {
        let settings = ImportSettings::default()
            .with_env_overrides(|var| match var {
                "TALLY_CONTINUE_ON_ERROR" => Some("false".to_string()),
                "TALLY_BATCH_INITIAL" => Some("2".to_string()),
                "TALLY_BATCH_MIN" => Some("2".to_string()),
                "TALLY_BATCH_MAX" => Some("2".to_string()),
                _ => None,
            })
            .unwrap()
            .validate()
            .unwrap();
        assert!(!settings.continue_on_error());

        let store = InMemoryEntityStore::new(payroll_entities()).with_failing_rows([0]);
        let mut pipeline =
            ImportPipeline::new(settings.orchestrator().unwrap(), settings.pipeline_options());

        let result = pipeline
            .run(payroll_rows(), payroll_entities(), &store)
            .await
            .unwrap();

        assert!(result.halted);
        assert!(!result.outcome.cancelled);
        assert_eq!(result.outcome.pending_indices, vec![4]);
        assert_eq!(result.outcome.accounted_rows(), 6);
        assert_eq!(pipeline.orchestrator().state(), ImportState::Importing);

        let summary =
            ImportSummaryReport::from_pipeline(pipeline.orchestrator().import_id().clone(), &result);
        assert_eq!(summary.status, SummaryStatus::Halted);
    }
}

use crate::settings::{
    ImportSettings,
    error::SettingsError,
    validated::{ValidatedSettings, ValidatedSettingsBuilder},
};
use chrono::NaiveDate;
use engine_core::progress::PhaseTracker;
use engine_runtime::orchestrator::IMPORTING;
use std::collections::HashSet;
use tracing::{info, warn};

// Above this, cancellation waits on a very long in-flight batch.
const LARGE_BATCH_WARNING: usize = 10_000;

/// Validates raw import settings into [`ValidatedSettings`].
#[derive(Debug, Default)]
pub struct SettingsValidator;

impl SettingsValidator {
    pub fn new() -> Self {
        SettingsValidator
    }

    pub fn validate(&self, settings: &ImportSettings) -> Result<ValidatedSettings, SettingsError> {
        info!("Validating import settings");

        let mut builder = ValidatedSettingsBuilder::new();
        let mut errors: Vec<String> = Vec::new();

        self.validate_batch(settings, &mut builder, &mut errors)?;
        self.validate_period(settings, &mut builder, &mut errors);
        self.validate_identifiers(settings, &mut builder, &mut errors);
        self.validate_phases(settings, &mut builder, &mut errors)?;

        if !errors.is_empty() {
            return Err(SettingsError::ValidationFailed(errors));
        }

        let validated = builder
            .continue_on_error(settings.continue_on_error)
            .unmatched(settings.unmatched)
            .skip_zero_amounts(settings.skip_zero_amounts)
            .columns(settings.columns.clone())
            .build();

        info!("Settings validation completed successfully");
        self.log_validated_settings(&validated);
        Ok(validated)
    }

    fn validate_batch(
        &self,
        settings: &ImportSettings,
        builder: &mut ValidatedSettingsBuilder,
        errors: &mut Vec<String>,
    ) -> Result<(), SettingsError> {
        if settings.batch.target_latency_ms == 0 {
            errors.push("batch.target_latency_ms must be greater than zero".to_string());
            return Ok(());
        }

        let sizing = settings.batch.sizing();
        sizing.validate()?;

        if sizing.max_size > LARGE_BATCH_WARNING {
            warn!(
                max_size = sizing.max_size,
                "Maximum batch size is very large, cancellation may take a while"
            );
        }
        builder.sizing = Some(sizing);
        Ok(())
    }

    fn validate_period(
        &self,
        settings: &ImportSettings,
        builder: &mut ValidatedSettingsBuilder,
        errors: &mut Vec<String>,
    ) {
        let Some(period) = settings.period.as_deref() else {
            return;
        };

        match parse_period(period) {
            Some(date) => builder.period = Some(date),
            None => errors.push(format!("period '{period}' is not a valid YYYY-MM month")),
        }
    }

    fn validate_identifiers(
        &self,
        settings: &ImportSettings,
        builder: &mut ValidatedSettingsBuilder,
        errors: &mut Vec<String>,
    ) {
        let priority = &settings.identifier_priority;
        if priority.is_empty() {
            errors.push("identifier_priority needs at least one key".to_string());
            return;
        }

        let mut seen = HashSet::new();
        for key in priority {
            if !seen.insert(*key) {
                errors.push(format!("identifier key '{key}' is listed more than once"));
            }
            if settings.columns.aliases(*key).is_empty() {
                errors.push(format!("identifier key '{key}' has no column aliases"));
            }
        }
        builder.identifier_priority = Some(priority.clone());
    }

    fn validate_phases(
        &self,
        settings: &ImportSettings,
        builder: &mut ValidatedSettingsBuilder,
        errors: &mut Vec<String>,
    ) -> Result<(), SettingsError> {
        let tracker = PhaseTracker::new(&settings.phases)?;
        if !tracker.contains(IMPORTING) {
            errors.push(format!("phases must include '{IMPORTING}'"));
        }
        builder.phases = Some(settings.phases.clone());
        Ok(())
    }

    fn log_validated_settings(&self, settings: &ValidatedSettings) {
        let sizing = settings.sizing();
        info!(
            initial = sizing.initial_size,
            min = sizing.min_size,
            max = sizing.max_size,
            target_ms = sizing.target_latency.as_millis() as u64,
            continue_on_error = settings.continue_on_error(),
            unmatched = ?settings.unmatched(),
            period = ?settings.period_label(),
            "Effective import settings"
        );
    }
}

/// Parses a strict `YYYY-MM` month into its first day.
fn parse_period(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let bytes = raw.as_bytes();
    let well_formed = bytes.len() == 7
        && bytes[4] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || b.is_ascii_digit());
    if !well_formed {
        return None;
    }
    NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d").ok()
}

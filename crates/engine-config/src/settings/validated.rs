use chrono::NaiveDate;
use engine_core::progress::PhaseSpec;
use engine_processing::{
    batch::{SchedulerConfig, SizingConfig},
    diff::DiffCalculator,
    reconcile::resolver::IdentityResolver,
};
use engine_runtime::{
    error::ImportError,
    orchestrator::{ImportOrchestrator, default_phases},
    pipeline::PipelineOptions,
};
use model::{
    core::key::{ColumnMap, IdentifierKey},
    import::reconciliation::UnmatchedPolicy,
};

/// Immutable, validated configuration for one import run.
#[derive(Debug, Clone)]
pub struct ValidatedSettings {
    /// First day of the pay period, when one was configured.
    period: Option<NaiveDate>,
    sizing: SizingConfig,
    continue_on_error: bool,
    unmatched: UnmatchedPolicy,
    skip_zero_amounts: bool,
    identifier_priority: Vec<IdentifierKey>,
    columns: ColumnMap,
    phases: Vec<PhaseSpec>,
}

impl ValidatedSettings {
    pub fn from_builder(builder: ValidatedSettingsBuilder) -> Self {
        Self {
            period: builder.period,
            sizing: builder.sizing.unwrap_or_default(),
            continue_on_error: builder.continue_on_error.unwrap_or(true),
            unmatched: builder.unmatched.unwrap_or_default(),
            skip_zero_amounts: builder.skip_zero_amounts.unwrap_or(false),
            identifier_priority: builder
                .identifier_priority
                .unwrap_or_else(|| IdentifierKey::PRIORITY.to_vec()),
            columns: builder.columns.unwrap_or_default(),
            phases: builder.phases.unwrap_or_else(default_phases),
        }
    }

    pub fn period(&self) -> Option<NaiveDate> {
        self.period
    }

    /// The period rendered back as `YYYY-MM`.
    pub fn period_label(&self) -> Option<String> {
        self.period.map(|date| date.format("%Y-%m").to_string())
    }

    pub fn sizing(&self) -> &SizingConfig {
        &self.sizing
    }

    pub fn continue_on_error(&self) -> bool {
        self.continue_on_error
    }

    pub fn unmatched(&self) -> UnmatchedPolicy {
        self.unmatched
    }

    pub fn skip_zero_amounts(&self) -> bool {
        self.skip_zero_amounts
    }

    pub fn identifier_priority(&self) -> &[IdentifierKey] {
        &self.identifier_priority
    }

    pub fn phases(&self) -> &[PhaseSpec] {
        &self.phases
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::new(self.sizing.clone()).with_continue_on_error(self.continue_on_error)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            resolver: IdentityResolver::new(self.identifier_priority.clone(), self.columns.clone()),
            diff: DiffCalculator::new().with_skip_zero_amounts(self.skip_zero_amounts),
            unmatched: self.unmatched,
        }
    }

    pub fn orchestrator(&self) -> Result<ImportOrchestrator, ImportError> {
        ImportOrchestrator::new(&self.phases, self.scheduler_config())
    }
}

#[derive(Debug, Default)]
pub struct ValidatedSettingsBuilder {
    pub period: Option<NaiveDate>,
    pub sizing: Option<SizingConfig>,
    pub continue_on_error: Option<bool>,
    pub unmatched: Option<UnmatchedPolicy>,
    pub skip_zero_amounts: Option<bool>,
    pub identifier_priority: Option<Vec<IdentifierKey>>,
    pub columns: Option<ColumnMap>,
    pub phases: Option<Vec<PhaseSpec>>,
}

impl ValidatedSettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn period(mut self, period: NaiveDate) -> Self {
        self.period = Some(period);
        self
    }

    pub fn sizing(mut self, sizing: SizingConfig) -> Self {
        self.sizing = Some(sizing);
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = Some(continue_on_error);
        self
    }

    pub fn unmatched(mut self, unmatched: UnmatchedPolicy) -> Self {
        self.unmatched = Some(unmatched);
        self
    }

    pub fn skip_zero_amounts(mut self, skip: bool) -> Self {
        self.skip_zero_amounts = Some(skip);
        self
    }

    pub fn identifier_priority(mut self, priority: Vec<IdentifierKey>) -> Self {
        self.identifier_priority = Some(priority);
        self
    }

    pub fn columns(mut self, columns: ColumnMap) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn phases(mut self, phases: Vec<PhaseSpec>) -> Self {
        self.phases = Some(phases);
        self
    }

    pub fn build(self) -> ValidatedSettings {
        ValidatedSettings::from_builder(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_falls_back_to_defaults() {
        let settings = ValidatedSettingsBuilder::new().build();

        assert_eq!(settings.sizing(), &SizingConfig::default());
        assert!(settings.continue_on_error());
        assert_eq!(settings.unmatched(), UnmatchedPolicy::Create);
        assert_eq!(settings.identifier_priority(), IdentifierKey::PRIORITY);
        assert_eq!(settings.period_label(), None);
        assert!(settings.orchestrator().is_ok());
    }

    #[test]
    fn feeds_scheduler_and_pipeline() {
        let settings = ValidatedSettingsBuilder::new()
            .sizing(SizingConfig::default().with_bounds(5, 5, 5))
            .continue_on_error(false)
            .unmatched(UnmatchedPolicy::Skip)
            .identifier_priority(vec![IdentifierKey::FullName])
            .period(NaiveDate::from_ymd_opt(2026, 9, 1).unwrap())
            .build();

        let scheduler = settings.scheduler_config();
        assert_eq!(scheduler.sizing.initial_size, 5);
        assert!(!scheduler.continue_on_error);

        let options = settings.pipeline_options();
        assert_eq!(options.unmatched, UnmatchedPolicy::Skip);
        assert_eq!(options.resolver.priority(), [IdentifierKey::FullName]);
        assert_eq!(settings.period_label().as_deref(), Some("2026-09"));
    }
}

use crate::settings::{ImportSettings, error::SettingsError};
use std::{fmt::Display, str::FromStr};
use tracing::debug;

pub const BATCH_INITIAL: &str = "TALLY_BATCH_INITIAL";
pub const BATCH_MIN: &str = "TALLY_BATCH_MIN";
pub const BATCH_MAX: &str = "TALLY_BATCH_MAX";
pub const TARGET_LATENCY_MS: &str = "TALLY_TARGET_LATENCY_MS";
pub const CONTINUE_ON_ERROR: &str = "TALLY_CONTINUE_ON_ERROR";
pub const PERIOD: &str = "TALLY_PERIOD";

/// Reads overrides straight from the process environment.
pub fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

/// Replaces file values with any `TALLY_*` variable `lookup` knows about.
/// Returns how many overrides were applied.
pub fn apply_overrides<F>(settings: &mut ImportSettings, lookup: F) -> Result<usize, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = 0;
    let mut read = |var: &'static str| {
        let value = lookup(var)?;
        debug!(var, value = %value, "Applying environment override");
        applied += 1;
        Some(value)
    };

    if let Some(raw) = read(BATCH_INITIAL) {
        settings.batch.initial_size = parse(BATCH_INITIAL, &raw)?;
    }
    if let Some(raw) = read(BATCH_MIN) {
        settings.batch.min_size = parse(BATCH_MIN, &raw)?;
    }
    if let Some(raw) = read(BATCH_MAX) {
        settings.batch.max_size = parse(BATCH_MAX, &raw)?;
    }
    if let Some(raw) = read(TARGET_LATENCY_MS) {
        settings.batch.target_latency_ms = parse(TARGET_LATENCY_MS, &raw)?;
    }
    if let Some(raw) = read(CONTINUE_ON_ERROR) {
        settings.continue_on_error = parse_flag(CONTINUE_ON_ERROR, &raw)?;
    }
    if let Some(raw) = read(PERIOD) {
        let raw = raw.trim();
        settings.period = (!raw.is_empty()).then(|| raw.to_string());
    }

    Ok(applied)
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, SettingsError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|err: T::Err| SettingsError::InvalidEnv {
            var,
            value: raw.to_string(),
            reason: err.to_string(),
        })
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, SettingsError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::InvalidEnv {
            var,
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut settings = ImportSettings::default();
        let applied = apply_overrides(
            &mut settings,
            lookup(&[
                (BATCH_INITIAL, "25"),
                (BATCH_MAX, " 100 "),
                (TARGET_LATENCY_MS, "500"),
                (CONTINUE_ON_ERROR, "no"),
                (PERIOD, "2026-10"),
                ("UNRELATED", "x"),
            ]),
        )
        .unwrap();

        assert_eq!(applied, 5);
        assert_eq!(settings.batch.initial_size, 25);
        assert_eq!(settings.batch.min_size, 10);
        assert_eq!(settings.batch.max_size, 100);
        assert_eq!(settings.batch.target_latency_ms, 500);
        assert!(!settings.continue_on_error);
        assert_eq!(settings.period.as_deref(), Some("2026-10"));
    }

    #[test]
    fn malformed_override_names_the_variable() {
        let mut settings = ImportSettings::default();
        let err = apply_overrides(&mut settings, lookup(&[(BATCH_MIN, "ten")])).unwrap_err();

        assert!(matches!(err, SettingsError::InvalidEnv { var: BATCH_MIN, .. }));
    }

    #[test]
    fn blank_period_clears_it() {
        let mut settings = ImportSettings {
            period: Some("2026-01".to_string()),
            ..Default::default()
        };
        apply_overrides(&mut settings, lookup(&[(PERIOD, "  ")])).unwrap();
        assert_eq!(settings.period, None);
    }
}

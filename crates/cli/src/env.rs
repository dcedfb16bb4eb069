use crate::error::CliError;
use std::{collections::HashMap, fs, path::Path};

/// Process environment plus whatever a `.env` file adds on top of it.
#[derive(Debug, Clone)]
pub struct EnvManager {
    vars: HashMap<String, String>,
}

impl EnvManager {
    pub fn new() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Load variables from a .env file; file values win over the process.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), CliError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|err| CliError::Config(format!("{}: {err}", path.display())))?;

        self.parse_env_content(&content)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    fn parse_env_content(&mut self, content: &str) -> Result<(), CliError> {
        let entries = content
            .lines()
            .map(str::trim)
            .enumerate()
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

        for (number, line) in entries {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line
                .split_once('=')
                .map(|(key, value)| (key.trim(), value))
                .filter(|(key, _)| !key.is_empty())
                .ok_or_else(|| {
                    CliError::Config(format!("env file line {} is not KEY=VALUE", number + 1))
                })?;

            self.vars.insert(key.to_string(), Self::unquote_value(value));
        }

        Ok(())
    }

    fn unquote_value(value: &str) -> String {
        let value = value.trim();
        for quote in ['"', '\''] {
            if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
                return value[1..value.len() - 1].to_string();
            }
        }
        value.to_string()
    }
}

impl Default for EnvManager {
    fn default() -> Self {
        Self::new()
    }
}

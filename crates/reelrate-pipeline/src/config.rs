use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set; there is no built-in default")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// File-system layout of the batch jobs. Every path can be overridden from the
/// environment; defaults are relative to the working directory.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub contracts_dir: PathBuf,
    pub text_dir: PathBuf,
    pub rates_dir: PathBuf,
    pub budgets_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub cleaning_rules: PathBuf,
    pub extractor: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            contracts_dir: PathBuf::from("./contracts"),
            text_dir: PathBuf::from("./extracted_text"),
            rates_dir: PathBuf::from("./extracted_rates"),
            budgets_dir: PathBuf::from("./budgets"),
            templates_dir: PathBuf::from("./budget_templates"),
            cleaning_rules: PathBuf::from("./rules/cleaning.yaml"),
            extractor: "v2".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let path = |key: &str, default: PathBuf| lookup(key).map(PathBuf::from).unwrap_or(default);
        Self {
            contracts_dir: path("REELRATE_CONTRACTS_DIR", defaults.contracts_dir),
            text_dir: path("REELRATE_TEXT_DIR", defaults.text_dir),
            rates_dir: path("REELRATE_RATES_DIR", defaults.rates_dir),
            budgets_dir: path("REELRATE_BUDGETS_DIR", defaults.budgets_dir),
            templates_dir: path("REELRATE_TEMPLATES_DIR", defaults.templates_dir),
            cleaning_rules: path("REELRATE_CLEANING_RULES", defaults.cleaning_rules),
            extractor: lookup("REELRATE_EXTRACTOR").unwrap_or(defaults.extractor),
        }
    }

    pub fn all_rates_path(&self) -> PathBuf {
        self.rates_dir.join("all_rates.json")
    }

    pub fn cleaned_rates_path(&self) -> PathBuf {
        self.rates_dir.join("cleaned_rates.json")
    }

    pub fn wga_rates_path(&self) -> PathBuf {
        self.rates_dir.join("wga_rates.json")
    }
}

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Database settings. The connection string is only ever read from configuration.
#[derive(Clone, PartialEq)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let max_connections = match lookup("REELRATE_DB_MAX_CONNECTIONS") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "REELRATE_DB_MAX_CONNECTIONS",
                value: raw,
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        Ok(Self {
            database_url,
            max_connections,
        })
    }

    /// Connection string with any password replaced, for logs.
    pub fn redacted_url(&self) -> String {
        let Some((scheme, rest)) = self.database_url.split_once("://") else {
            return "<unparsed database url>".to_string();
        };
        match rest.rsplit_once('@') {
            Some((userinfo, host)) => {
                let user = userinfo.split(':').next().unwrap_or_default();
                format!("{scheme}://{user}:***@{host}")
            }
            None => self.database_url.clone(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("database_url", &self.redacted_url())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

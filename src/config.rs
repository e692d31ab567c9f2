use crate::error::{BudgetError, Result};
use crate::schema::Platform;
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_FILE_PATTERN: &str = "Copy of Budgets*.csv";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SourceConfig {
    #[schemars(description = "Directory holding the exported CSV files")]
    pub directory: PathBuf,

    #[schemars(description = "Glob pattern, relative to the directory, that selects export files")]
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,
}

fn default_file_pattern() -> String {
    DEFAULT_FILE_PATTERN.to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            file_pattern: default_file_pattern(),
        }
    }
}

/// What a missing or unparseable date becomes during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DateFallback {
    /// The evaluation date of the run.
    #[default]
    Today,
    Fixed(NaiveDate),
}

/// The documented defaults applied to cells that cannot be parsed.
///
/// Missing dates become the run date (or a fixed date) so day arithmetic is
/// always defined. Missing money is always zero cents; rates stay absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub struct FallbackPolicy {
    #[serde(default)]
    pub missing_date: DateFallback,
}

impl FallbackPolicy {
    pub fn date_or_default(&self, parsed: Option<NaiveDate>, today: NaiveDate) -> NaiveDate {
        parsed.unwrap_or(match self.missing_date {
            DateFallback::Today => today,
            DateFallback::Fixed(date) => date,
        })
    }

    pub fn cents_or_zero(&self, parsed: Option<i64>) -> i64 {
        parsed.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AlertSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[schemars(description = "Utilization (spend / budget) at or above which a campaign is critical")]
    #[serde(default = "default_critical_utilization")]
    pub critical_utilization: Decimal,
}

fn default_true() -> bool {
    true
}

fn default_critical_utilization() -> Decimal {
    Decimal::new(90, 2)
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            critical_utilization: default_critical_utilization(),
        }
    }
}

fn default_min_daily_floors() -> BTreeMap<String, Decimal> {
    BTreeMap::from([(Platform::LinkedIn.to_string(), Decimal::new(1000, 2))])
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

/// Everything a pipeline run depends on. Independent values never share state.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    #[serde(default)]
    pub source: SourceConfig,

    #[schemars(description = "Seconds a loaded table is reused before files are checked again")]
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[schemars(description = "Evaluation date; the local date when omitted")]
    #[serde(default)]
    pub as_of: Option<NaiveDate>,

    #[schemars(description = "Minimum daily spend per platform or channel name, in currency units")]
    #[serde(default = "default_min_daily_floors")]
    pub min_daily_floors: BTreeMap<String, Decimal>,

    #[serde(default)]
    pub alerts: AlertSettings,

    #[serde(default)]
    pub fallback: FallbackPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            as_of: None,
            min_daily_floors: default_min_daily_floors(),
            alerts: AlertSettings::default(),
            fallback: FallbackPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn for_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            source: SourceConfig {
                directory: directory.into(),
                file_pattern: default_file_pattern(),
            },
            ..Self::default()
        }
    }

    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.alerts.critical_utilization;
        if threshold <= Decimal::ZERO || threshold > Decimal::ONE {
            return Err(BudgetError::InvalidConfig(format!(
                "critical_utilization {} must be in (0, 1]",
                threshold
            )));
        }

        if let Some((name, floor)) = self
            .min_daily_floors
            .iter()
            .find(|(_, floor)| floor.is_sign_negative())
        {
            return Err(BudgetError::InvalidConfig(format!(
                "minimum daily floor for {} is negative ({})",
                name, floor
            )));
        }

        if self.source.file_pattern.trim().is_empty() {
            return Err(BudgetError::InvalidConfig(
                "file_pattern must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// The date all day arithmetic of a run is evaluated against.
    pub fn today(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Floor for a row: looked up by platform name first, then by the
    /// channel label, case-insensitively.
    pub fn min_daily_floor(&self, platform: Platform, channel: &str) -> Option<Decimal> {
        let lookup = |name: &str| {
            self.min_daily_floors
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, floor)| *floor)
        };
        lookup(platform.as_str()).or_else(|| {
            let channel = channel.trim();
            if channel.is_empty() {
                None
            } else {
                lookup(channel)
            }
        })
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PipelineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

//! # Budget Pacing
//!
//! A library for turning heterogeneous ad-budget CSV exports into an exact
//! fact table of budget and spend records, with pacing, forecast and
//! minimum-daily-spend metrics for every campaign.
//!
//! ## Core Concepts
//!
//! - **Raw table**: every exported row, keyed by the export's own column names
//! - **Canonical row**: one leaf record with hierarchy labels, dates and money in integer cents
//! - **Format registry**: ordered matchers that recognize each export layout
//! - **Campaign aggregate**: exact sums of the leaf rows sharing a campaign key
//! - **Fallback policy**: the documented defaults for cells that cannot be parsed
//!
//! ## Example
//!
//! ```rust,ignore
//! use budget_pacing::*;
//!
//! let config = PipelineConfig::for_directory("/data/exports");
//! let mut pipeline = BudgetPipeline::new(config)?;
//!
//! let output = pipeline.run()?;
//! for campaign in &output.aggregates {
//!     println!(
//!         "{}: {} of {} spent",
//!         campaign.row.campaign,
//!         format_cents(campaign.row.spent_to_date_cents),
//!         format_cents(campaign.row.total_budget_cents),
//!     );
//! }
//! ```

pub mod aggregate;
pub mod columns;
pub mod config;
pub mod error;
pub mod formats;
pub mod hierarchy;
pub mod loader;
pub mod metrics;
pub mod money;
pub mod overview;
pub mod sanitize;
pub mod schema;
pub mod simulation;
pub mod utils;

pub use aggregate::{aggregate, verify_rollup};
pub use columns::{normalize_column_name, ColumnIndex, Field};
pub use config::*;
pub use error::{BudgetError, Result};
pub use formats::{ExtractContext, FormatMatcher, FormatRegistry, RowOutcome};
pub use hierarchy::{infer_platform, split_path, HierarchyPath, PathStyle};
pub use loader::{discover_files, load_file, load_tables, LoadCache};
pub use metrics::*;
pub use money::{format_cents, parse_cents, parse_decimal};
pub use overview::{Overview, RowFilter};
pub use schema::*;
pub use simulation::{simulate, Adjustment, SimulationResult};
pub use utils::parse_date;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything one pipeline run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// The table as loaded, before normalization.
    pub raw: RawTable,
    pub canonical: Vec<Measured<CanonicalRow>>,
    pub aggregates: Vec<Measured<CampaignAggregate>>,
    /// Rows that were skipped, and why.
    pub diagnostics: Vec<Diagnostic>,
}

/// Read-only view of the raw and canonical tables for troubleshooting.
#[derive(Debug, Serialize)]
pub struct DebugSnapshot<'a> {
    pub raw: &'a RawTable,
    pub canonical: Vec<&'a CanonicalRow>,
    pub diagnostics: &'a [Diagnostic],
}

impl PipelineOutput {
    pub fn debug_snapshot(&self) -> DebugSnapshot<'_> {
        DebugSnapshot {
            raw: &self.raw,
            canonical: self.canonical.iter().map(|m| &m.row).collect(),
            diagnostics: &self.diagnostics,
        }
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn overview(&self, filter: &RowFilter) -> Overview {
        Overview::from_measured(&self.canonical, filter)
    }

    pub fn simulate(
        &self,
        filter: &RowFilter,
        adjustments: &BTreeMap<Platform, Adjustment>,
    ) -> Result<SimulationResult> {
        let base = simulation::base_budgets(filter.apply(&self.canonical).map(|m| &m.row));
        simulate(&base, adjustments)
    }

    /// Campaigns whose alert level is not `None`.
    pub fn alerts(&self) -> impl Iterator<Item = &Measured<CampaignAggregate>> {
        self.aggregates
            .iter()
            .filter(|m| m.metrics.alert != AlertLevel::None)
    }
}

/// Normalizes an already loaded table with the built-in formats.
pub fn process_raw_table(table: &RawTable, config: &PipelineConfig) -> Result<PipelineOutput> {
    process_with_registry(table, config, &FormatRegistry::default())
}

pub fn process_with_registry(
    table: &RawTable,
    config: &PipelineConfig,
    registry: &FormatRegistry,
) -> Result<PipelineOutput> {
    config.validate()?;

    let engine = MetricsEngine::new(config);
    let ctx = ExtractContext {
        today: engine.today(),
        fallback: config.fallback,
    };

    info!("Normalizing {} raw rows as of {}", table.len(), ctx.today);

    // Header rows can survive a per-file pass when files are concatenated.
    let sanitized = sanitize::drop_repeated_headers(table.clone());

    let mut canonical = Vec::with_capacity(sanitized.len());
    let mut diagnostics = Vec::new();
    for row in &sanitized.rows {
        match registry.normalize(row, &ctx) {
            RowOutcome::Canonical(record) => {
                if let Some(notes) = &record.parse_error {
                    debug!("{}: defaults applied: {}", record.source_file, notes);
                }
                canonical.push(record);
            }
            RowOutcome::Skipped(diagnostic) => diagnostics.push(diagnostic),
        }
    }

    if !diagnostics.is_empty() {
        warn!("Skipped {} rows, see diagnostics", diagnostics.len());
    }
    if canonical.is_empty() {
        return Err(BudgetError::EmptyResult {
            skipped: diagnostics.len(),
        });
    }

    let canonical = engine.measure_all(canonical);
    let aggregates = aggregate(&canonical);
    verify_rollup(&canonical, &aggregates)?;
    let aggregates = engine.measure_all(aggregates);

    info!(
        "Produced {} canonical rows and {} campaigns",
        canonical.len(),
        aggregates.len()
    );

    Ok(PipelineOutput {
        raw: table.clone(),
        canonical,
        aggregates,
        diagnostics,
    })
}

/// Loads the configured exports through a cache and normalizes them.
pub struct BudgetPipeline {
    config: PipelineConfig,
    cache: LoadCache,
    registry: FormatRegistry,
}

impl BudgetPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let cache = LoadCache::with_ttl_secs(config.cache_ttl_secs);
        Ok(Self {
            config,
            cache,
            registry: FormatRegistry::default(),
        })
    }

    pub fn with_registry(mut self, registry: FormatRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Number of times the export files were actually read.
    pub fn loads(&self) -> usize {
        self.cache.loads()
    }

    pub fn run(&mut self) -> Result<PipelineOutput> {
        let table = self.cache.load(&self.config.source)?;
        process_with_registry(&table, &self.config, &self.registry)
    }

    /// Drops the cached table and runs again.
    pub fn sync(&mut self) -> Result<PipelineOutput> {
        self.cache.invalidate();
        self.run()
    }
}

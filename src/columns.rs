//! Resolution of arbitrary source column names to semantic fields.
//!
//! Source exports name the same concept in many ways ("Total Budget",
//! "Lifetime budget", "Startdatum"). Names are first normalized, then looked
//! up against a fixed, prioritized alias list per field.

use crate::schema::{CellValue, RawRow};
use regex::Regex;
use std::sync::OnceLock;

fn separator_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\p{Alphabetic}\p{Nd}]+").expect("invalid separator regex"))
}

/// Lower-cases, reads `→` as `to`, collapses every run of non-alphanumeric
/// characters to one `_` and trims `_` at both ends.
///
/// `"Total Budget (€)"` becomes `"total_budget"`, `"Customer → Program"`
/// becomes `"customer_to_program"`.
pub fn normalize_column_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase().replace('→', " to ");
    let collapsed = separator_run_re().replace_all(&lowered, "_");
    collapsed.trim_matches('_').to_string()
}

/// Semantic fields a source column can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    StartDate,
    EndDate,
    Budget,
    Spent,
    Status,
    Group,
    Campaign,
    CustomerPath,
    Program,
    Industry,
    Channel,
    Phase,
    PausedDaysTotal,
    PausedDaysToDate,
    Cpm,
    Ctr,
    Cpl,
}

impl Field {
    /// Candidate normalized names, highest priority first.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Field::StartDate => &[
                "start_date",
                "start",
                "startdatum",
                "period_start",
                "startdate",
            ],
            Field::EndDate => &["end_date", "end", "slutdatum", "period_end", "enddate"],
            Field::Budget => &[
                "total_budget",
                "budget",
                "planned_spend",
                "lifetime_budget",
                "current_budget",
                "current_budget_total",
                "current_total",
                "assigned_budget",
            ],
            Field::Spent => &[
                "total_spent",
                "spent_to_date",
                "spent",
                "spend",
                "amount_spent",
                "cost",
                "current_spend",
                "current_budget_utilisation",
            ],
            Field::Status => &["status", "current_status", "off_on"],
            Field::Group => &[
                "group",
                "campaign_group_name",
                "campaign_group",
                "campaign_group_budget",
            ],
            Field::Campaign => &["campaign_name", "campaign"],
            Field::CustomerPath => &[
                "customer_to_industry_to_program",
                "customer_industry_program",
                "client_path",
                "customer_path",
            ],
            Field::Program => &["program", "programme", "program_name"],
            Field::Industry => &["industry", "vertical"],
            Field::Channel => &["channel", "channel_name"],
            Field::Phase => &["phase", "phase_name", "line_item", "flight"],
            Field::PausedDaysTotal => &["paused_days_total", "paused_days", "days_paused"],
            Field::PausedDaysToDate => &[
                "paused_days_to_date",
                "paused_to_date",
                "days_paused_to_date",
            ],
            Field::Cpm => &["cpm", "cost_per_mille"],
            Field::Ctr => &["ctr", "click_through_rate"],
            Field::Cpl => &["cpl", "cost_per_lead"],
        }
    }
}

/// Maps normalized column names back to the row's source column names.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    entries: Vec<(String, String)>,
}

impl ColumnIndex {
    /// When two source columns normalize to the same name the first one wins.
    pub fn new<'a>(columns: impl IntoIterator<Item = &'a str>) -> Self {
        let mut entries: Vec<(String, String)> = Vec::new();
        for column in columns {
            let normalized = normalize_column_name(column);
            if normalized.is_empty() || entries.iter().any(|(n, _)| *n == normalized) {
                continue;
            }
            entries.push((normalized, column.to_string()));
        }
        Self { entries }
    }

    pub fn for_row(row: &RawRow) -> Self {
        Self::new(row.column_names())
    }

    /// Returns the source column of the first alias present, if any.
    pub fn resolve(&self, field: Field) -> Option<&str> {
        resolve_first(&self.entries, field.aliases())
    }

    pub fn has(&self, field: Field) -> bool {
        self.resolve(field).is_some()
    }

    /// Looks up the cell for a field; unresolved fields read as empty.
    pub fn cell<'r>(&self, row: &'r RawRow, field: Field) -> &'r CellValue {
        const EMPTY: &CellValue = &CellValue::Empty;
        self.resolve(field)
            .and_then(|column| row.get(column))
            .unwrap_or(EMPTY)
    }

    pub fn text(&self, row: &RawRow, field: Field) -> String {
        self.cell(row, field).to_text()
    }
}

fn resolve_first<'a>(entries: &'a [(String, String)], candidates: &[&str]) -> Option<&'a str> {
    candidates.iter().find_map(|candidate| {
        entries
            .iter()
            .find(|(normalized, _)| normalized == candidate)
            .map(|(_, source)| source.as_str())
    })
}

use chrono::NaiveDate;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single cell as it arrived from a source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    Empty,
    Text(String),
    Number(Decimal),
}

impl CellValue {
    /// Builds a cell from raw CSV text; whitespace-only text counts as empty.
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(trimmed.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn to_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(d) => d.to_string(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::from_raw(value)
    }
}

impl From<Decimal> for CellValue {
    fn from(value: Decimal) -> Self {
        CellValue::Number(value)
    }
}

/// One row of a source table, keyed by the source's own column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub source_file: String,
    /// Cells in source column order. Only the columns of the row's own file are present.
    pub cells: Vec<(String, CellValue)>,
    /// Set on the one-row marker that stands in for a file that failed to parse.
    pub parse_error: Option<String>,
}

impl RawRow {
    pub fn new(source_file: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            cells: Vec::new(),
            parse_error: None,
        }
    }

    pub fn error_marker(source_file: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            cells: Vec::new(),
            parse_error: Some(details.into()),
        }
    }

    pub fn with_cell(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.cells.push((column.into(), value.into()));
        self
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, value)| value.is_empty())
    }
}

/// The pre-normalization table: union of source columns plus rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<RawRow>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Concatenates tables; columns are the union in first-seen order.
    pub fn concat(tables: Vec<RawTable>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::new();

        for table in tables {
            for column in table.columns {
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
            rows.extend(table.rows);
        }

        Self { columns, rows }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum Platform {
    LinkedIn,
    Google,
    Meta,
    Other,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::LinkedIn,
        Platform::Google,
        Platform::Meta,
        Platform::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::LinkedIn => "LinkedIn",
            Platform::Google => "Google",
            Platform::Meta => "Meta",
            Platform::Other => "Other",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Leaf fact produced by normalization. Money is held in integer cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalRow {
    #[schemars(description = "Customer level; empty for exports without a customer path")]
    pub customer: String,
    pub program: String,
    pub industry: String,
    pub channel: String,
    pub campaign: String,
    pub phase: String,

    #[schemars(description = "The hierarchy string the levels were parsed from")]
    pub group_path: String,

    pub platform: Platform,
    pub status: String,

    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    #[schemars(description = "Lifetime budget in cents, never negative")]
    pub total_budget_cents: i64,

    #[schemars(description = "Spend to date in cents; may exceed the budget")]
    pub spent_to_date_cents: i64,

    pub paused_days_total: i64,
    pub paused_days_to_date: i64,

    pub cpm: Option<Decimal>,
    pub ctr: Option<Decimal>,
    pub cpl: Option<Decimal>,

    pub source_file: String,

    #[schemars(description = "Cells that could not be parsed and the default that replaced them")]
    pub parse_error: Option<String>,
}

impl CanonicalRow {
    pub fn remaining_budget_cents(&self) -> i64 {
        (self.total_budget_cents - self.spent_to_date_cents).max(0)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(CanonicalRow)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// Campaign-level rollup of leaf rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CampaignAggregate {
    pub customer: String,
    pub program: String,
    pub industry: String,
    pub channel: String,
    pub campaign: String,

    pub platform: Platform,
    pub status: String,

    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    pub total_budget_cents: i64,
    pub spent_to_date_cents: i64,

    #[schemars(description = "Exact sum of the leaves' remaining budget")]
    pub remaining_budget_cents: i64,

    #[schemars(description = "Exact sum of the leaves' expected spend to date")]
    pub expected_spend_to_date_cents: i64,

    pub paused_days_total: i64,
    pub paused_days_to_date: i64,

    #[schemars(description = "Present only when every leaf that carries a value agrees")]
    pub cpm: Option<Decimal>,
    pub ctr: Option<Decimal>,
    pub cpl: Option<Decimal>,

    pub leaf_count: usize,
    pub source_files: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// A file could not be parsed at all.
    MalformedFile,
    /// No registered format recognized the row's columns.
    UnrecognizedSchema,
    /// Subtotal or grand-total line repeated inside an export.
    TotalsRow,
}

/// A raw row that did not make it into the canonical table, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub source_file: String,
    pub details: String,
    pub row: RawRow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_unions_columns_in_first_seen_order() {
        let a = RawTable::new(
            vec!["Group".to_string(), "Budget".to_string()],
            vec![RawRow::new("a.csv").with_cell("Group", "X").with_cell("Budget", "10")],
        );
        let b = RawTable::new(
            vec!["Budget".to_string(), "Spend".to_string()],
            vec![RawRow::new("b.csv").with_cell("Budget", "5").with_cell("Spend", "1")],
        );

        let combined = RawTable::concat(vec![a, b]);
        assert_eq!(combined.columns, vec!["Group", "Budget", "Spend"]);
        assert_eq!(combined.len(), 2);
        assert_eq!(combined.rows[1].get("Group"), None);
    }

    #[test]
    fn test_whitespace_cell_is_empty() {
        assert!(CellValue::from_raw("   ").is_empty());
        assert_eq!(CellValue::from_raw(" x "), CellValue::Text("x".to_string()));
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = CanonicalRow::schema_as_json().unwrap();
        assert!(schema_json.contains("total_budget_cents"));
        assert!(schema_json.contains("parse_error"));
    }
}

//! Registry of known export layouts.
//!
//! Each layout is a [`FormatMatcher`]. Rows are offered to the matchers in
//! registration order and the first one whose `matches` accepts the row's
//! columns extracts the canonical row.

use crate::columns::{ColumnIndex, Field};
use crate::config::FallbackPolicy;
use crate::hierarchy::{infer_platform, split_path, PathStyle};
use crate::money::{parse_cents, parse_decimal, parse_rate, round_half_up};
use crate::schema::{CanonicalRow, CellValue, Diagnostic, DiagnosticKind, RawRow};
use crate::utils::parse_date;
use chrono::NaiveDate;
use log::debug;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Per-run values every extraction needs.
#[derive(Debug, Clone, Copy)]
pub struct ExtractContext {
    pub today: NaiveDate,
    pub fallback: FallbackPolicy,
}

pub trait FormatMatcher {
    fn name(&self) -> &'static str;
    fn matches(&self, columns: &ColumnIndex) -> bool;
    fn extract(&self, row: &RawRow, columns: &ColumnIndex, ctx: &ExtractContext) -> CanonicalRow;
}

/// Hierarchy labels a format pulled out of a row.
#[derive(Debug, Clone, Default)]
struct Levels {
    customer: String,
    program: String,
    industry: String,
    channel: String,
    phase: String,
    group_path: String,
}

/// Plans that carry program, channel and campaign as separate columns.
pub struct PhasePlanFormat;

impl FormatMatcher for PhasePlanFormat {
    fn name(&self) -> &'static str {
        "phase_plan"
    }

    fn matches(&self, columns: &ColumnIndex) -> bool {
        columns.has(Field::Program) && columns.has(Field::Channel) && columns.has(Field::Campaign)
    }

    fn extract(&self, row: &RawRow, columns: &ColumnIndex, ctx: &ExtractContext) -> CanonicalRow {
        let program = columns.text(row, Field::Program);
        let industry = columns.text(row, Field::Industry);
        let channel = columns.text(row, Field::Channel);
        let group_path = [&program, &industry, &channel]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" / ");

        let levels = Levels {
            customer: String::new(),
            program,
            industry,
            channel,
            phase: columns.text(row, Field::Phase),
            group_path,
        };
        build_row(row, columns, ctx, levels)
    }
}

/// Exports keyed by a `Customer → Industry → Program` path column.
pub struct CustomerPathFormat;

impl FormatMatcher for CustomerPathFormat {
    fn name(&self) -> &'static str {
        "customer_path"
    }

    fn matches(&self, columns: &ColumnIndex) -> bool {
        columns.has(Field::CustomerPath)
    }

    fn extract(&self, row: &RawRow, columns: &ColumnIndex, ctx: &ExtractContext) -> CanonicalRow {
        let group_path = columns.text(row, Field::CustomerPath);
        let path = split_path(&group_path, PathStyle::Arrowed);
        let phase = non_empty_or(columns.text(row, Field::Phase), || path.rest_label());

        let levels = Levels {
            customer: path.level(0).to_string(),
            industry: path.level(1).to_string(),
            program: path.level(2).to_string(),
            channel: columns.text(row, Field::Channel),
            phase,
            group_path,
        };
        build_row(row, columns, ctx, levels)
    }
}

/// Campaign-group exports whose group column holds `Program / Industry / Channel`.
pub struct GroupPathFormat;

impl FormatMatcher for GroupPathFormat {
    fn name(&self) -> &'static str {
        "group_path"
    }

    fn matches(&self, columns: &ColumnIndex) -> bool {
        columns.has(Field::Group)
    }

    fn extract(&self, row: &RawRow, columns: &ColumnIndex, ctx: &ExtractContext) -> CanonicalRow {
        let group_path = columns.text(row, Field::Group);
        let path = split_path(&group_path, PathStyle::Slashed);
        let phase = non_empty_or(columns.text(row, Field::Phase), || path.rest_label());

        let levels = Levels {
            customer: String::new(),
            program: path.level(0).to_string(),
            industry: path.level(1).to_string(),
            channel: path.level(2).to_string(),
            phase,
            group_path,
        };
        build_row(row, columns, ctx, levels)
    }
}

/// Flat campaign lists with no hierarchy column.
pub struct CampaignSheetFormat;

impl FormatMatcher for CampaignSheetFormat {
    fn name(&self) -> &'static str {
        "campaign_sheet"
    }

    fn matches(&self, columns: &ColumnIndex) -> bool {
        columns.has(Field::Campaign) && (columns.has(Field::Budget) || columns.has(Field::Spent))
    }

    fn extract(&self, row: &RawRow, columns: &ColumnIndex, ctx: &ExtractContext) -> CanonicalRow {
        let levels = Levels {
            program: columns.text(row, Field::Program),
            industry: columns.text(row, Field::Industry),
            channel: columns.text(row, Field::Channel),
            phase: columns.text(row, Field::Phase),
            ..Levels::default()
        };
        build_row(row, columns, ctx, levels)
    }
}

fn non_empty_or(value: String, fallback: impl FnOnce() -> String) -> String {
    if value.is_empty() {
        fallback()
    } else {
        value
    }
}

/// Collects notes about cells that were replaced by a default.
#[derive(Default)]
struct ParseNotes(Vec<String>);

impl ParseNotes {
    fn push(&mut self, note: String) {
        self.0.push(note);
    }

    fn into_option(self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.join("; "))
        }
    }
}

fn read_cents(cell: &CellValue, label: &str, notes: &mut ParseNotes) -> Option<i64> {
    if cell.is_empty() {
        return None;
    }
    let text = cell.to_text();
    let parsed = parse_cents(&text);
    match parsed {
        None => notes.push(format!("{} '{}' unparseable, defaulted to 0", label, text)),
        Some(cents) if cents < 0 => {
            notes.push(format!("{} '{}' negative, clamped to 0", label, text));
            return Some(0);
        }
        Some(_) => {}
    }
    parsed
}

fn read_date(cell: &CellValue, label: &str, notes: &mut ParseNotes) -> Option<NaiveDate> {
    if cell.is_empty() {
        return None;
    }
    let text = cell.to_text();
    let parsed = parse_date(&text);
    if parsed.is_none() {
        notes.push(format!("{} '{}' unparseable, defaulted", label, text));
    }
    parsed
}

fn read_days(cell: &CellValue, label: &str, notes: &mut ParseNotes) -> i64 {
    if cell.is_empty() {
        return 0;
    }
    let text = cell.to_text();
    match parse_decimal(&text).and_then(|d| round_half_up(d, 0).to_i64()) {
        Some(days) => days.max(0),
        None => {
            notes.push(format!("{} '{}' unparseable, defaulted to 0", label, text));
            0
        }
    }
}

fn read_optional(
    cell: &CellValue,
    label: &str,
    parse: fn(&str) -> Option<Decimal>,
    notes: &mut ParseNotes,
) -> Option<Decimal> {
    if cell.is_empty() {
        return None;
    }
    let text = cell.to_text();
    let parsed = parse(&text);
    if parsed.is_none() {
        notes.push(format!("{} '{}' unparseable, left absent", label, text));
    }
    parsed
}

fn build_row(row: &RawRow, columns: &ColumnIndex, ctx: &ExtractContext, levels: Levels) -> CanonicalRow {
    let mut notes = ParseNotes::default();

    let budget = read_cents(columns.cell(row, Field::Budget), "budget", &mut notes);
    let spent = read_cents(columns.cell(row, Field::Spent), "spent", &mut notes);
    let start = read_date(columns.cell(row, Field::StartDate), "start_date", &mut notes);
    let end = read_date(columns.cell(row, Field::EndDate), "end_date", &mut notes);

    let paused_days_total = read_days(
        columns.cell(row, Field::PausedDaysTotal),
        "paused_days_total",
        &mut notes,
    );
    let paused_days_to_date = read_days(
        columns.cell(row, Field::PausedDaysToDate),
        "paused_days_to_date",
        &mut notes,
    );

    let cpm = read_optional(columns.cell(row, Field::Cpm), "cpm", parse_decimal, &mut notes);
    let ctr = read_optional(columns.cell(row, Field::Ctr), "ctr", parse_rate, &mut notes);
    let cpl = read_optional(columns.cell(row, Field::Cpl), "cpl", parse_decimal, &mut notes);

    let campaign = non_empty_or(columns.text(row, Field::Campaign), || {
        levels.group_path.clone()
    });
    let platform = infer_platform(&levels.group_path, &campaign);

    CanonicalRow {
        customer: levels.customer,
        program: levels.program,
        industry: levels.industry,
        channel: levels.channel,
        campaign,
        phase: levels.phase,
        group_path: levels.group_path,
        platform,
        status: columns.text(row, Field::Status),
        start_date: ctx.fallback.date_or_default(start, ctx.today),
        end_date: ctx.fallback.date_or_default(end, ctx.today),
        total_budget_cents: ctx.fallback.cents_or_zero(budget),
        spent_to_date_cents: ctx.fallback.cents_or_zero(spent),
        paused_days_total,
        paused_days_to_date,
        cpm,
        ctr,
        cpl,
        source_file: row.source_file.clone(),
        parse_error: notes.into_option(),
    }
}

/// Labels of subtotal and grand-total lines.
pub fn is_totals_label(label: &str) -> bool {
    let text = label.trim().to_lowercase();
    text.starts_with("total") || matches!(text.as_str(), "tot" | "sum" | "grand_total")
}

/// Result of normalizing one raw row.
#[derive(Debug, Clone)]
pub enum RowOutcome {
    Canonical(CanonicalRow),
    Skipped(Diagnostic),
}

pub struct FormatRegistry {
    matchers: Vec<Box<dyn FormatMatcher>>,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
            .register(PhasePlanFormat)
            .register(CustomerPathFormat)
            .register(GroupPathFormat)
            .register(CampaignSheetFormat)
    }
}

impl FormatRegistry {
    /// An empty registry; `Default` gives the built-in layouts.
    pub fn new() -> Self {
        Self {
            matchers: Vec::new(),
        }
    }

    pub fn register(mut self, matcher: impl FormatMatcher + 'static) -> Self {
        self.matchers.push(Box::new(matcher));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.matchers.iter().map(|m| m.name()).collect()
    }

    pub fn find(&self, columns: &ColumnIndex) -> Option<&dyn FormatMatcher> {
        self.matchers
            .iter()
            .find(|m| m.matches(columns))
            .map(|m| m.as_ref())
    }

    pub fn normalize(&self, row: &RawRow, ctx: &ExtractContext) -> RowOutcome {
        if let Some(details) = &row.parse_error {
            return RowOutcome::Skipped(Diagnostic {
                kind: DiagnosticKind::MalformedFile,
                source_file: row.source_file.clone(),
                details: details.clone(),
                row: row.clone(),
            });
        }

        let columns = ColumnIndex::for_row(row);
        let Some(matcher) = self.find(&columns) else {
            let names: Vec<&str> = row.column_names().collect();
            return RowOutcome::Skipped(Diagnostic {
                kind: DiagnosticKind::UnrecognizedSchema,
                source_file: row.source_file.clone(),
                details: format!("no known format matches columns {:?}", names),
                row: row.clone(),
            });
        };

        let canonical = matcher.extract(row, &columns, ctx);
        if is_totals_label(&canonical.group_path) || is_totals_label(&canonical.campaign) {
            debug!("{}: dropping totals row '{}'", row.source_file, canonical.campaign);
            return RowOutcome::Skipped(Diagnostic {
                kind: DiagnosticKind::TotalsRow,
                source_file: row.source_file.clone(),
                details: format!("totals row '{}'", canonical.campaign),
                row: row.clone(),
            });
        }

        RowOutcome::Canonical(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Platform;

    fn ctx() -> ExtractContext {
        ExtractContext {
            today: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            fallback: FallbackPolicy::default(),
        }
    }

    fn canonical(outcome: RowOutcome) -> CanonicalRow {
        match outcome {
            RowOutcome::Canonical(row) => row,
            RowOutcome::Skipped(d) => panic!("row skipped: {:?}", d),
        }
    }

    #[test]
    fn test_group_path_row() {
        let row = RawRow::new("a.csv")
            .with_cell("Campaign Group Name", "BV / Nordcloud / AWS / Traffic")
            .with_cell("Campaign Name", "LinkedIn Spotlight")
            .with_cell("Total Budget", "1,234.56")
            .with_cell("Amount Spent", "100")
            .with_cell("Start Date", "2024-06-01")
            .with_cell("End Date", "2024-06-30")
            .with_cell("Status", "Active");

        let out = canonical(FormatRegistry::default().normalize(&row, &ctx()));
        assert_eq!(out.program, "BV");
        assert_eq!(out.industry, "Nordcloud");
        assert_eq!(out.channel, "AWS");
        assert_eq!(out.phase, "Traffic");
        assert_eq!(out.campaign, "LinkedIn Spotlight");
        assert_eq!(out.platform, Platform::LinkedIn);
        assert_eq!(out.total_budget_cents, 123456);
        assert_eq!(out.spent_to_date_cents, 10000);
        assert_eq!(out.start_date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(out.status, "Active");
        assert_eq!(out.parse_error, None);
    }

    #[test]
    fn test_customer_path_row_splits_arrows() {
        let row = RawRow::new("b.csv")
            .with_cell("Customer → Industry → Program", "Acme -> Retail → Brand Lift")
            .with_cell("Campaign", "PMax Q3")
            .with_cell("Budget", "500");

        let registry = FormatRegistry::default();
        let columns = ColumnIndex::for_row(&row);
        assert_eq!(registry.find(&columns).map(|m| m.name()), Some("customer_path"));

        let out = canonical(registry.normalize(&row, &ctx()));
        assert_eq!(out.customer, "Acme");
        assert_eq!(out.industry, "Retail");
        assert_eq!(out.program, "Brand Lift");
        assert_eq!(out.platform, Platform::Google);
    }

    #[test]
    fn test_phase_plan_takes_priority() {
        let row = RawRow::new("c.csv")
            .with_cell("Program", "AO")
            .with_cell("Industry", "SaaS")
            .with_cell("Channel", "Meta")
            .with_cell("Campaign", "Retargeting")
            .with_cell("Phase", "Phase 2")
            .with_cell("Group", "ignored / path")
            .with_cell("Budget", "10")
            .with_cell("CPM", "12,5")
            .with_cell("CTR", "0.8%");

        let out = canonical(FormatRegistry::default().normalize(&row, &ctx()));
        assert_eq!(out.program, "AO");
        assert_eq!(out.channel, "Meta");
        assert_eq!(out.phase, "Phase 2");
        assert_eq!(out.group_path, "AO / SaaS / Meta");
        assert_eq!(out.platform, Platform::Meta);
        assert_eq!(out.cpm, Some(Decimal::new(125, 1)));
        assert_eq!(out.ctr, Some(Decimal::new(8, 3)));
        assert_eq!(out.cpl, None);
    }

    #[test]
    fn test_campaign_sheet_fallback() {
        let row = RawRow::new("d.csv")
            .with_cell("Campaign", "Newsletter")
            .with_cell("Spend", "42");
        let out = canonical(FormatRegistry::default().normalize(&row, &ctx()));
        assert_eq!(out.group_path, "");
        assert_eq!(out.platform, Platform::Other);
        assert_eq!(out.total_budget_cents, 0);
        assert_eq!(out.spent_to_date_cents, 4200);
    }

    #[test]
    fn test_unrecognized_schema_is_diagnosed() {
        let row = RawRow::new("e.csv").with_cell("Foo", "1").with_cell("Bar", "2");
        match FormatRegistry::default().normalize(&row, &ctx()) {
            RowOutcome::Skipped(d) => {
                assert_eq!(d.kind, DiagnosticKind::UnrecognizedSchema);
                assert_eq!(d.source_file, "e.csv");
                assert_eq!(d.row, row);
            }
            RowOutcome::Canonical(_) => panic!("expected skip"),
        }
    }

    #[test]
    fn test_error_marker_is_malformed_file() {
        let row = RawRow::error_marker("broken.csv", "no header line found");
        match FormatRegistry::default().normalize(&row, &ctx()) {
            RowOutcome::Skipped(d) => {
                assert_eq!(d.kind, DiagnosticKind::MalformedFile);
                assert_eq!(d.details, "no header line found");
            }
            RowOutcome::Canonical(_) => panic!("expected skip"),
        }
    }

    #[test]
    fn test_defaults_are_applied_to_unparseable_cells() {
        let row = RawRow::new("f.csv")
            .with_cell("Group", "X / Y / Z")
            .with_cell("Budget", "n/a")
            .with_cell("Spent", "")
            .with_cell("Start", "someday");

        let context = ctx();
        let out = canonical(FormatRegistry::default().normalize(&row, &context));
        assert_eq!(out.total_budget_cents, 0);
        assert_eq!(out.spent_to_date_cents, 0);
        assert_eq!(out.start_date, context.today);
        assert_eq!(out.end_date, context.today);
        // missing campaign name falls back to the group path
        assert_eq!(out.campaign, "X / Y / Z");

        let notes = out.parse_error.unwrap();
        assert!(notes.contains("budget 'n/a'"));
        assert!(notes.contains("start_date 'someday'"));
        assert!(!notes.contains("spent"));
    }

    #[test]
    fn test_negative_money_is_clamped() {
        let row = RawRow::new("g.csv")
            .with_cell("Group", "A")
            .with_cell("Budget", "-50");
        let out = canonical(FormatRegistry::default().normalize(&row, &ctx()));
        assert_eq!(out.total_budget_cents, 0);
        assert!(out.parse_error.unwrap().contains("negative"));
    }

    #[test]
    fn test_totals_rows_are_skipped() {
        assert!(is_totals_label("Total"));
        assert!(is_totals_label("  TOTAL spend"));
        assert!(is_totals_label("sum"));
        assert!(!is_totals_label("Subtotal campaign"));

        let row = RawRow::new("h.csv")
            .with_cell("Group", "Total")
            .with_cell("Budget", "999");
        match FormatRegistry::default().normalize(&row, &ctx()) {
            RowOutcome::Skipped(d) => assert_eq!(d.kind, DiagnosticKind::TotalsRow),
            RowOutcome::Canonical(_) => panic!("expected skip"),
        }
    }

    #[test]
    fn test_registry_order() {
        assert_eq!(
            FormatRegistry::default().names(),
            vec!["phase_plan", "customer_path", "group_path", "campaign_sheet"]
        );
        let empty = FormatRegistry::new();
        assert!(empty.find(&ColumnIndex::new(["Group"])).is_none());
    }
}

use crate::metrics::{utilization, Measured};
use crate::schema::{CanonicalRow, Platform};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Number of customers kept in the budget-vs-spend ranking.
pub const TOP_CUSTOMERS: usize = 12;

/// The customer a row is reported under: its customer level, or the first
/// hierarchy level for layouts without one.
pub fn customer_label(row: &CanonicalRow) -> &str {
    let customer = row.customer.trim();
    if customer.is_empty() {
        row.program.trim()
    } else {
        customer
    }
}

/// Restricts the rows an overview is built from. `None` means "all".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFilter {
    pub customer: Option<String>,
    pub platform: Option<Platform>,
}

impl RowFilter {
    pub fn matches(&self, row: &CanonicalRow) -> bool {
        let customer_ok = self
            .customer
            .as_deref()
            .map_or(true, |customer| customer_label(row) == customer);
        let platform_ok = self.platform.map_or(true, |platform| row.platform == platform);
        customer_ok && platform_ok
    }

    pub fn apply<'a>(
        &'a self,
        rows: &'a [Measured<CanonicalRow>],
    ) -> impl Iterator<Item = &'a Measured<CanonicalRow>> + 'a {
        rows.iter().filter(move |m| self.matches(&m.row))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformTotals {
    pub platform: Platform,
    pub total_budget_cents: i64,
    pub spent_to_date_cents: i64,
    pub utilization: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerTotals {
    pub customer: String,
    pub total_budget_cents: i64,
    pub spent_to_date_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overview {
    pub total_budget_cents: i64,
    pub spent_to_date_cents: i64,
    pub active_customers: usize,
    /// Distinct platforms among the rows.
    pub active_channels: usize,
    /// Budget per platform in `Platform::ALL` order, zero-budget platforms omitted.
    pub allocation: Vec<PlatformTotals>,
    /// Every platform with rows, highest spend first.
    pub spend_tracker: Vec<PlatformTotals>,
    /// Largest budgets first, at most [`TOP_CUSTOMERS`].
    pub customers: Vec<CustomerTotals>,
}

impl Overview {
    pub fn build<'a>(rows: impl IntoIterator<Item = &'a CanonicalRow>) -> Self {
        let mut total_budget_cents = 0i64;
        let mut spent_to_date_cents = 0i64;
        let mut by_platform: BTreeMap<Platform, (i64, i64)> = BTreeMap::new();
        let mut by_customer: BTreeMap<String, (i64, i64)> = BTreeMap::new();

        for row in rows {
            total_budget_cents += row.total_budget_cents;
            spent_to_date_cents += row.spent_to_date_cents;

            let customer = customer_label(row);
            if !customer.is_empty() {
                let entry = by_customer.entry(customer.to_string()).or_default();
                entry.0 += row.total_budget_cents;
                entry.1 += row.spent_to_date_cents;
            }

            let entry = by_platform.entry(row.platform).or_default();
            entry.0 += row.total_budget_cents;
            entry.1 += row.spent_to_date_cents;
        }

        let totals = |platform: Platform, (budget, spent): (i64, i64)| PlatformTotals {
            platform,
            total_budget_cents: budget,
            spent_to_date_cents: spent,
            utilization: utilization(spent, budget),
        };

        let allocation = Platform::ALL
            .iter()
            .filter_map(|p| by_platform.get(p).map(|sums| totals(*p, *sums)))
            .filter(|t| t.total_budget_cents > 0)
            .collect();

        let mut spend_tracker: Vec<PlatformTotals> = by_platform
            .iter()
            .map(|(p, sums)| totals(*p, *sums))
            .collect();
        spend_tracker.sort_by(|a, b| b.spent_to_date_cents.cmp(&a.spent_to_date_cents));

        let active_customers = by_customer.len();
        let active_channels = by_platform.len();

        let mut customers: Vec<CustomerTotals> = by_customer
            .into_iter()
            .map(|(customer, (budget, spent))| CustomerTotals {
                customer,
                total_budget_cents: budget,
                spent_to_date_cents: spent,
            })
            .collect();
        customers.sort_by(|a, b| b.total_budget_cents.cmp(&a.total_budget_cents));
        customers.truncate(TOP_CUSTOMERS);

        Self {
            total_budget_cents,
            spent_to_date_cents,
            active_customers,
            active_channels,
            allocation,
            spend_tracker,
            customers,
        }
    }

    pub fn from_measured(rows: &[Measured<CanonicalRow>], filter: &RowFilter) -> Self {
        Self::build(filter.apply(rows).map(|m| &m.row))
    }
}

/// Distinct non-empty customers, sorted, for building a customer filter.
pub fn customer_options(rows: &[Measured<CanonicalRow>]) -> Vec<String> {
    rows.iter()
        .map(|m| customer_label(&m.row))
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::metrics::MetricsEngine;
    use chrono::NaiveDate;

    fn row(customer: &str, channel: &str, platform: Platform, budget: i64, spent: i64) -> CanonicalRow {
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        CanonicalRow {
            customer: customer.to_string(),
            program: String::new(),
            industry: String::new(),
            channel: channel.to_string(),
            campaign: format!("{} {}", customer, platform),
            phase: String::new(),
            group_path: String::new(),
            platform,
            status: String::new(),
            start_date: day,
            end_date: day,
            total_budget_cents: budget,
            spent_to_date_cents: spent,
            paused_days_total: 0,
            paused_days_to_date: 0,
            cpm: None,
            ctr: None,
            cpl: None,
            source_file: "a.csv".to_string(),
            parse_error: None,
        }
    }

    fn sample() -> Vec<CanonicalRow> {
        vec![
            row("Acme", "AWS", Platform::Google, 20000, 5000),
            row("Acme", "AWS", Platform::LinkedIn, 10000, 9000),
            row("Globex", "Azure", Platform::Meta, 5000, 0),
            row("", "", Platform::Other, 0, 100),
        ]
    }

    #[test]
    fn test_totals_and_counts() {
        let rows = sample();
        let overview = Overview::build(&rows);
        assert_eq!(overview.total_budget_cents, 35000);
        assert_eq!(overview.spent_to_date_cents, 14100);
        assert_eq!(overview.active_customers, 2);
        assert_eq!(overview.active_channels, 4);
    }

    #[test]
    fn test_program_stands_in_for_missing_customer() {
        let mut grouped = row("", "", Platform::LinkedIn, 7000, 700);
        grouped.program = "BV".to_string();
        let mut rows = sample();
        rows.push(grouped);

        let overview = Overview::build(&rows);
        assert_eq!(overview.active_customers, 3);
        assert_eq!(overview.active_channels, 4);
        assert!(overview
            .customers
            .iter()
            .any(|c| c.customer == "BV" && c.total_budget_cents == 7000));

        let config = PipelineConfig::default();
        let measured = MetricsEngine::new(&config).measure_all(rows);
        let filter = RowFilter {
            customer: Some("BV".to_string()),
            platform: None,
        };
        assert_eq!(Overview::from_measured(&measured, &filter).total_budget_cents, 7000);
        assert_eq!(customer_options(&measured), vec!["Acme", "BV", "Globex"]);
    }

    #[test]
    fn test_allocation_in_platform_order_without_empty_budgets() {
        let rows = sample();
        let overview = Overview::build(&rows);
        let platforms: Vec<Platform> = overview.allocation.iter().map(|t| t.platform).collect();
        assert_eq!(
            platforms,
            vec![Platform::LinkedIn, Platform::Google, Platform::Meta]
        );
        assert_eq!(overview.allocation[0].utilization, Decimal::new(9, 1));
    }

    #[test]
    fn test_spend_tracker_sorted_by_spend() {
        let rows = sample();
        let overview = Overview::build(&rows);
        let spent: Vec<i64> = overview
            .spend_tracker
            .iter()
            .map(|t| t.spent_to_date_cents)
            .collect();
        assert_eq!(spent, vec![9000, 5000, 100, 0]);
        // no budget means zero utilization, not a division error
        assert_eq!(overview.spend_tracker[2].utilization, Decimal::ZERO);
    }

    #[test]
    fn test_customer_ranking_is_capped() {
        let rows: Vec<CanonicalRow> = (0..15)
            .map(|i| row(&format!("C{:02}", i), "", Platform::Other, 100 * (i + 1), 0))
            .collect();
        let overview = Overview::build(&rows);
        assert_eq!(overview.customers.len(), TOP_CUSTOMERS);
        assert_eq!(overview.customers[0].customer, "C14");
        assert_eq!(overview.customers[0].total_budget_cents, 1500);
    }

    #[test]
    fn test_filters() {
        let config = PipelineConfig::default();
        let measured = MetricsEngine::new(&config).measure_all(sample());

        let filter = RowFilter {
            customer: Some("Acme".to_string()),
            platform: None,
        };
        assert_eq!(Overview::from_measured(&measured, &filter).total_budget_cents, 30000);

        let filter = RowFilter {
            customer: Some("Acme".to_string()),
            platform: Some(Platform::LinkedIn),
        };
        let overview = Overview::from_measured(&measured, &filter);
        assert_eq!(overview.total_budget_cents, 10000);
        assert_eq!(overview.spend_tracker.len(), 1);

        let all = Overview::from_measured(&measured, &RowFilter::default());
        assert_eq!(all.total_budget_cents, 35000);

        assert_eq!(customer_options(&measured), vec!["Acme", "Globex"]);
    }
}

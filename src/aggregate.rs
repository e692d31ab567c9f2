use crate::error::{BudgetError, Result};
use crate::metrics::Measured;
use crate::schema::{CampaignAggregate, CanonicalRow};
use log::debug;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

/// Grouping key of a campaign: (customer, program, industry, channel, campaign).
pub type CampaignKey = (String, String, String, String, String);

pub fn campaign_key(
    customer: &str,
    program: &str,
    industry: &str,
    channel: &str,
    campaign: &str,
) -> CampaignKey {
    (
        customer.to_string(),
        program.to_string(),
        industry.to_string(),
        channel.to_string(),
        campaign.to_string(),
    )
}

fn leaf_key(row: &CanonicalRow) -> CampaignKey {
    campaign_key(
        &row.customer,
        &row.program,
        &row.industry,
        &row.channel,
        &row.campaign,
    )
}

fn aggregate_key(agg: &CampaignAggregate) -> CampaignKey {
    campaign_key(
        &agg.customer,
        &agg.program,
        &agg.industry,
        &agg.channel,
        &agg.campaign,
    )
}

/// Money sums of a group of leaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct MoneySums {
    total_budget_cents: i64,
    spent_to_date_cents: i64,
    remaining_budget_cents: i64,
    expected_spend_to_date_cents: i64,
    leaf_count: i64,
}

impl MoneySums {
    fn add(&mut self, leaf: &Measured<CanonicalRow>) {
        self.total_budget_cents += leaf.row.total_budget_cents;
        self.spent_to_date_cents += leaf.row.spent_to_date_cents;
        self.remaining_budget_cents += leaf.metrics.remaining_budget_cents;
        self.expected_spend_to_date_cents += leaf.metrics.expected_spend_to_date_cents;
        self.leaf_count += 1;
    }
}

/// A rate survives the rollup only if every child that has one agrees.
fn consistent_rate(values: impl Iterator<Item = Option<Decimal>>) -> Option<Decimal> {
    let mut agreed: Option<Decimal> = None;
    for value in values.flatten() {
        match agreed {
            None => agreed = Some(value),
            Some(existing) if existing != value => return None,
            Some(_) => {}
        }
    }
    agreed
}

fn rollup(children: &[&Measured<CanonicalRow>]) -> Option<CampaignAggregate> {
    let first = &children.first()?.row;
    let last = &children.last()?.row;

    let mut sums = MoneySums::default();
    for child in children {
        sums.add(child);
    }

    let rows = || children.iter().map(|c| &c.row);
    let source_files: BTreeSet<String> = rows().map(|r| r.source_file.clone()).collect();

    Some(CampaignAggregate {
        customer: first.customer.clone(),
        program: first.program.clone(),
        industry: first.industry.clone(),
        channel: first.channel.clone(),
        campaign: first.campaign.clone(),
        platform: first.platform,
        status: last.status.clone(),
        start_date: rows().map(|r| r.start_date).min()?,
        end_date: rows().map(|r| r.end_date).max()?,
        total_budget_cents: sums.total_budget_cents,
        spent_to_date_cents: sums.spent_to_date_cents,
        remaining_budget_cents: sums.remaining_budget_cents,
        expected_spend_to_date_cents: sums.expected_spend_to_date_cents,
        paused_days_total: rows().map(|r| r.paused_days_total).max()?,
        paused_days_to_date: rows().map(|r| r.paused_days_to_date).max()?,
        cpm: consistent_rate(rows().map(|r| r.cpm)),
        ctr: consistent_rate(rows().map(|r| r.ctr)),
        cpl: consistent_rate(rows().map(|r| r.cpl)),
        leaf_count: children.len(),
        source_files: source_files.into_iter().collect(),
    })
}

/// Rolls measured leaves up to one aggregate per campaign key, ordered by key.
pub fn aggregate(leaves: &[Measured<CanonicalRow>]) -> Vec<CampaignAggregate> {
    let mut groups: BTreeMap<CampaignKey, Vec<&Measured<CanonicalRow>>> = BTreeMap::new();
    for leaf in leaves {
        groups.entry(leaf_key(&leaf.row)).or_default().push(leaf);
    }

    debug!(
        "Aggregating {} leaf rows into {} campaigns",
        leaves.len(),
        groups.len()
    );

    groups.values().filter_map(|children| rollup(children)).collect()
}

/// Checks that every aggregate's money fields equal the exact sums of its leaves.
pub fn verify_rollup(
    leaves: &[Measured<CanonicalRow>],
    aggregates: &[CampaignAggregate],
) -> Result<()> {
    let mut expected: BTreeMap<CampaignKey, MoneySums> = BTreeMap::new();
    for leaf in leaves {
        expected.entry(leaf_key(&leaf.row)).or_default().add(leaf);
    }

    let actual: BTreeMap<CampaignKey, &CampaignAggregate> =
        aggregates.iter().map(|agg| (aggregate_key(agg), agg)).collect();

    for (key, sums) in &expected {
        let campaign = key.4.clone();
        let Some(agg) = actual.get(key) else {
            return Err(BudgetError::RollupMismatch {
                campaign,
                field: "leaf_count",
                aggregate: 0,
                leaves: sums.leaf_count,
            });
        };

        let checks = [
            ("total_budget_cents", agg.total_budget_cents, sums.total_budget_cents),
            ("spent_to_date_cents", agg.spent_to_date_cents, sums.spent_to_date_cents),
            (
                "remaining_budget_cents",
                agg.remaining_budget_cents,
                sums.remaining_budget_cents,
            ),
            (
                "expected_spend_to_date_cents",
                agg.expected_spend_to_date_cents,
                sums.expected_spend_to_date_cents,
            ),
            ("leaf_count", agg.leaf_count as i64, sums.leaf_count),
        ];

        if let Some((field, aggregate, leaves)) = checks.into_iter().find(|(_, a, l)| a != l) {
            return Err(BudgetError::RollupMismatch {
                campaign,
                field,
                aggregate,
                leaves,
            });
        }
    }

    if let Some(extra) = actual.keys().find(|key| !expected.contains_key(*key)) {
        return Err(BudgetError::RollupMismatch {
            campaign: extra.4.clone(),
            field: "leaf_count",
            aggregate: actual[extra].leaf_count as i64,
            leaves: 0,
        });
    }

    Ok(())
}

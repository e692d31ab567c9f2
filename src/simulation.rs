//! What-if reallocation of budget between platforms.

use crate::error::{BudgetError, Result};
use crate::money::{cents_to_decimal, decimal_to_cents, format_cents};
use crate::schema::{CanonicalRow, Platform};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SIMULATED_PLATFORMS: [Platform; 3] = [Platform::LinkedIn, Platform::Google, Platform::Meta];
pub const MIN_CHANGE_PCT: i32 = -50;
pub const MAX_CHANGE_PCT: i32 = 100;

/// A new base amount for a platform plus a percentage change applied on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub amount: Decimal,
    #[serde(default)]
    pub change_pct: i32,
}

impl Adjustment {
    pub fn new(amount: Decimal, change_pct: i32) -> Self {
        Self { amount, change_pct }
    }

    fn validate(&self, platform: Platform) -> Result<()> {
        if self.amount.is_sign_negative() && !self.amount.is_zero() {
            return Err(BudgetError::InvalidAdjustment {
                platform: platform.to_string(),
                details: format!("amount {} is negative", self.amount),
            });
        }
        if !(MIN_CHANGE_PCT..=MAX_CHANGE_PCT).contains(&self.change_pct) {
            return Err(BudgetError::InvalidAdjustment {
                platform: platform.to_string(),
                details: format!(
                    "change {}% outside {}..={}",
                    self.change_pct, MIN_CHANGE_PCT, MAX_CHANGE_PCT
                ),
            });
        }
        Ok(())
    }

    /// `amount × (100 + pct) / 100`, in cents after half-up rounding.
    fn simulated_cents(&self, platform: Platform) -> Result<i64> {
        let factor = Decimal::from(100 + self.change_pct) / Decimal::ONE_HUNDRED;
        self.amount
            .checked_mul(factor)
            .and_then(decimal_to_cents)
            .ok_or_else(|| BudgetError::InvalidAdjustment {
                platform: platform.to_string(),
                details: format!("amount {} is out of range", self.amount),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationRow {
    pub platform: Platform,
    pub original_cents: i64,
    pub simulated_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub rows: Vec<SimulationRow>,
    pub original_total_cents: i64,
    pub simulated_total_cents: i64,
    pub delta_cents: i64,
}

impl SimulationResult {
    /// Signed delta for display, e.g. `+1,250.00` or `-80.00`.
    pub fn delta_label(&self) -> String {
        let sign = if self.delta_cents >= 0 { "+" } else { "-" };
        format!("{}{}", sign, format_cents(self.delta_cents.abs()))
    }
}

/// Budget per simulated platform; platforms without rows get zero.
pub fn base_budgets<'a>(rows: impl IntoIterator<Item = &'a CanonicalRow>) -> BTreeMap<Platform, i64> {
    let mut base: BTreeMap<Platform, i64> = SIMULATED_PLATFORMS.iter().map(|p| (*p, 0)).collect();
    for row in rows {
        if let Some(total) = base.get_mut(&row.platform) {
            *total += row.total_budget_cents;
        }
    }
    base
}

/// Applies adjustments to the base budgets. A platform without an
/// adjustment keeps its original amount.
pub fn simulate(
    base: &BTreeMap<Platform, i64>,
    adjustments: &BTreeMap<Platform, Adjustment>,
) -> Result<SimulationResult> {
    let mut rows = Vec::with_capacity(SIMULATED_PLATFORMS.len());

    for platform in SIMULATED_PLATFORMS {
        let original_cents = base.get(&platform).copied().unwrap_or(0);
        let adjustment = adjustments
            .get(&platform)
            .copied()
            .unwrap_or_else(|| Adjustment::new(cents_to_decimal(original_cents), 0));
        adjustment.validate(platform)?;

        rows.push(SimulationRow {
            platform,
            original_cents,
            simulated_cents: adjustment.simulated_cents(platform)?,
        });
    }

    let original_total_cents: i64 = rows.iter().map(|r| r.original_cents).sum();
    let simulated_total_cents: i64 = rows.iter().map(|r| r.simulated_cents).sum();

    Ok(SimulationResult {
        rows,
        original_total_cents,
        simulated_total_cents,
        delta_cents: simulated_total_cents - original_total_cents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BTreeMap<Platform, i64> {
        BTreeMap::from([
            (Platform::LinkedIn, 100000),
            (Platform::Google, 50050),
            (Platform::Meta, 0),
        ])
    }

    #[test]
    fn test_no_adjustments_is_identity() {
        let result = simulate(&base(), &BTreeMap::new()).unwrap();
        assert_eq!(result.original_total_cents, 150050);
        assert_eq!(result.simulated_total_cents, 150050);
        assert_eq!(result.delta_cents, 0);
        assert_eq!(result.delta_label(), "+0.00");
    }

    #[test]
    fn test_percentage_applies_on_top_of_amount() {
        let adjustments = BTreeMap::from([
            (Platform::LinkedIn, Adjustment::new(Decimal::new(2000, 0), 10)),
            (Platform::Google, Adjustment::new(Decimal::new(50050, 2), -50)),
        ]);
        let result = simulate(&base(), &adjustments).unwrap();

        assert_eq!(result.rows[0].simulated_cents, 220000);
        // 500.50 * 0.5 = 250.25
        assert_eq!(result.rows[1].simulated_cents, 25025);
        assert_eq!(result.rows[2].simulated_cents, 0);
        assert_eq!(result.delta_cents, 245025 - 150050);
    }

    #[test]
    fn test_half_up_on_simulated_amount() {
        // 0.25 * 1.5 = 0.375 -> 0.38
        let adjustments = BTreeMap::from([(Platform::Meta, Adjustment::new(Decimal::new(25, 2), 50))]);
        let result = simulate(&base(), &adjustments).unwrap();
        assert_eq!(result.rows[2].simulated_cents, 38);
    }

    #[test]
    fn test_out_of_range_pct_rejected() {
        for pct in [-51, 101] {
            let adjustments = BTreeMap::from([(Platform::Google, Adjustment::new(Decimal::ONE, pct))]);
            let err = simulate(&base(), &adjustments).unwrap_err();
            assert!(matches!(err, BudgetError::InvalidAdjustment { .. }));
        }
    }

    #[test]
    fn test_negative_amount_rejected() {
        let adjustments = BTreeMap::from([(Platform::LinkedIn, Adjustment::new(Decimal::NEGATIVE_ONE, 0))]);
        assert!(simulate(&base(), &adjustments).is_err());
    }

    #[test]
    fn test_base_budgets_ignore_other_platform() {
        let row = |platform, cents| CanonicalRow {
            customer: String::new(),
            program: String::new(),
            industry: String::new(),
            channel: String::new(),
            campaign: "c".to_string(),
            phase: String::new(),
            group_path: String::new(),
            platform,
            status: String::new(),
            start_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            total_budget_cents: cents,
            spent_to_date_cents: 0,
            paused_days_total: 0,
            paused_days_to_date: 0,
            cpm: None,
            ctr: None,
            cpl: None,
            source_file: "a.csv".to_string(),
            parse_error: None,
        };
        let rows = vec![
            row(Platform::Google, 100),
            row(Platform::Google, 250),
            row(Platform::Other, 999),
        ];
        let base = base_budgets(&rows);
        assert_eq!(base.len(), 3);
        assert_eq!(base[&Platform::Google], 350);
        assert_eq!(base[&Platform::LinkedIn], 0);
        assert!(!base.contains_key(&Platform::Other));
    }
}

use crate::config::{AlertSettings, PipelineConfig};
use crate::money::{cents_to_decimal, div_round_half_up, round2, round_half_up};
use crate::schema::{CampaignAggregate, CanonicalRow, Platform};
use crate::utils::{days_between, inclusive_days};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Inputs the metrics engine needs from a leaf row or an aggregate.
pub trait BudgetLine {
    fn platform(&self) -> Platform;
    fn channel(&self) -> &str;
    fn status(&self) -> &str;
    fn start_date(&self) -> NaiveDate;
    fn end_date(&self) -> NaiveDate;
    fn total_budget_cents(&self) -> i64;
    fn spent_to_date_cents(&self) -> i64;
    fn paused_days_total(&self) -> i64;
    fn paused_days_to_date(&self) -> i64;
    fn cpm(&self) -> Option<Decimal>;
    fn ctr(&self) -> Option<Decimal>;
    fn cpl(&self) -> Option<Decimal>;

    fn remaining_budget_cents(&self) -> i64 {
        (self.total_budget_cents() - self.spent_to_date_cents()).max(0)
    }

    /// A precomputed expected spend that replaces proration, if the line has one.
    fn expected_spend_basis(&self) -> Option<i64> {
        None
    }
}

impl BudgetLine for CanonicalRow {
    fn platform(&self) -> Platform {
        self.platform
    }
    fn channel(&self) -> &str {
        &self.channel
    }
    fn status(&self) -> &str {
        &self.status
    }
    fn start_date(&self) -> NaiveDate {
        self.start_date
    }
    fn end_date(&self) -> NaiveDate {
        self.end_date
    }
    fn total_budget_cents(&self) -> i64 {
        self.total_budget_cents
    }
    fn spent_to_date_cents(&self) -> i64 {
        self.spent_to_date_cents
    }
    fn paused_days_total(&self) -> i64 {
        self.paused_days_total
    }
    fn paused_days_to_date(&self) -> i64 {
        self.paused_days_to_date
    }
    fn cpm(&self) -> Option<Decimal> {
        self.cpm
    }
    fn ctr(&self) -> Option<Decimal> {
        self.ctr
    }
    fn cpl(&self) -> Option<Decimal> {
        self.cpl
    }
}

impl BudgetLine for CampaignAggregate {
    fn platform(&self) -> Platform {
        self.platform
    }
    fn channel(&self) -> &str {
        &self.channel
    }
    fn status(&self) -> &str {
        &self.status
    }
    fn start_date(&self) -> NaiveDate {
        self.start_date
    }
    fn end_date(&self) -> NaiveDate {
        self.end_date
    }
    fn total_budget_cents(&self) -> i64 {
        self.total_budget_cents
    }
    fn spent_to_date_cents(&self) -> i64 {
        self.spent_to_date_cents
    }
    fn paused_days_total(&self) -> i64 {
        self.paused_days_total
    }
    fn paused_days_to_date(&self) -> i64 {
        self.paused_days_to_date
    }
    fn cpm(&self) -> Option<Decimal> {
        self.cpm
    }
    fn ctr(&self) -> Option<Decimal> {
        self.ctr
    }
    fn cpl(&self) -> Option<Decimal> {
        self.cpl
    }

    // Aggregates keep the exact sums of their leaves.
    fn remaining_budget_cents(&self) -> i64 {
        self.remaining_budget_cents
    }
    fn expected_spend_basis(&self) -> Option<i64> {
        Some(self.expected_spend_to_date_cents)
    }
}

/// Day counts for a campaign window evaluated on `today`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub total_days: i64,
    pub active_days_total: i64,
    pub elapsed_days: i64,
    pub elapsed_active_days: i64,
    pub remaining_active_days: i64,
    /// Calendar days left after the elapsed portion, ignoring pauses.
    pub remaining_days: i64,
}

impl DaySchedule {
    pub fn compute(
        start: NaiveDate,
        end: NaiveDate,
        today: NaiveDate,
        paused_days_total: i64,
        paused_days_to_date: i64,
    ) -> Self {
        let elapsed_end = today.min(end);

        let total_days = inclusive_days(start, end);
        let active_days_total = (total_days - paused_days_total).max(0);
        let elapsed_days = inclusive_days(start, elapsed_end);
        let elapsed_active_days = (elapsed_days - paused_days_to_date).max(0);
        let remaining_active_days = (active_days_total - elapsed_active_days).max(0);
        let remaining_days = days_between(elapsed_end, end).max(0);

        Self {
            total_days,
            active_days_total,
            elapsed_days,
            elapsed_active_days,
            remaining_active_days,
            remaining_days,
        }
    }

    /// Budget prorated over elapsed active days, rounded once.
    pub fn expected_spend_cents(&self, total_budget_cents: i64) -> i64 {
        if self.active_days_total <= 0 {
            return 0;
        }
        div_round_half_up(
            total_budget_cents as i128 * self.elapsed_active_days as i128,
            self.active_days_total as i128,
        ) as i64
    }

    /// Straight-line extrapolation of spend to the end date.
    pub fn forecast_cents(&self, spent_to_date_cents: i64) -> i64 {
        let elapsed = self.elapsed_days.max(1) as i128;
        let projected =
            div_round_half_up(spent_to_date_cents as i128 * self.remaining_days as i128, elapsed);
        (spent_to_date_cents as i128 + projected).max(0) as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    Active,
    Paused,
    Stopped,
    Unknown,
}

impl CampaignStatus {
    pub fn classify(status: &str) -> Self {
        let text = status.trim().to_lowercase();
        if text.contains("active") || text == "on" {
            CampaignStatus::Active
        } else if text.contains("paused") || text == "off" {
            CampaignStatus::Paused
        } else if text.contains("stopped") {
            CampaignStatus::Stopped
        } else {
            CampaignStatus::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertLevel {
    None,
    Warning,
    Critical,
}

impl AlertLevel {
    pub fn classify(
        settings: &AlertSettings,
        utilization: Decimal,
        status: &str,
        forecast_overrun: bool,
    ) -> Self {
        if !settings.enabled {
            return AlertLevel::None;
        }
        let stopped = matches!(
            status.trim().to_lowercase().as_str(),
            "stopped" | "unexpected stop"
        );
        if utilization >= settings.critical_utilization || stopped {
            AlertLevel::Critical
        } else if forecast_overrun {
            AlertLevel::Warning
        } else {
            AlertLevel::None
        }
    }
}

/// Derived figures for one line. `None` means "no signal", never zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingMetrics {
    #[serde(flatten)]
    pub schedule: DaySchedule,

    pub remaining_budget_cents: i64,
    pub expected_spend_to_date_cents: i64,

    pub required_daily: Option<Decimal>,
    pub pacing_ratio: Option<Decimal>,
    pub min_daily_floor: Option<Decimal>,
    pub min_daily_violation: bool,

    pub forecast_leads: Option<Decimal>,
    pub forecast_impressions: Option<Decimal>,
    pub forecast_clicks: Option<Decimal>,

    pub forecast_cents: i64,
    pub forecast_overrun: bool,
    pub utilization: Decimal,

    pub status_class: CampaignStatus,
    pub alert: AlertLevel,
}

/// A row paired with the metrics computed for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measured<T> {
    #[serde(flatten)]
    pub row: T,
    pub metrics: PacingMetrics,
}

pub struct MetricsEngine<'a> {
    config: &'a PipelineConfig,
    today: NaiveDate,
}

impl<'a> MetricsEngine<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            today: config.today(),
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn evaluate<L: BudgetLine>(&self, line: &L) -> PacingMetrics {
        let schedule = DaySchedule::compute(
            line.start_date(),
            line.end_date(),
            self.today,
            line.paused_days_total(),
            line.paused_days_to_date(),
        );

        let budget = line.total_budget_cents();
        let spent = line.spent_to_date_cents();
        let remaining_budget_cents = line.remaining_budget_cents();
        let expected_spend_to_date_cents = line
            .expected_spend_basis()
            .unwrap_or_else(|| schedule.expected_spend_cents(budget));

        let required_daily = required_daily(remaining_budget_cents, schedule.remaining_active_days);
        let pacing_ratio = pacing_ratio(spent, expected_spend_to_date_cents);

        let min_daily_floor = self.config.min_daily_floor(line.platform(), line.channel());
        let min_daily_violation = match (min_daily_floor, required_daily) {
            (Some(floor), Some(required)) => required < floor,
            _ => false,
        };

        let forecast = Forecast::compute(budget, line.cpm(), line.ctr(), line.cpl());

        let forecast_cents = schedule.forecast_cents(spent);
        let forecast_overrun = forecast_cents > budget;
        let utilization = utilization(spent, budget);

        PacingMetrics {
            schedule,
            remaining_budget_cents,
            expected_spend_to_date_cents,
            required_daily,
            pacing_ratio,
            min_daily_floor,
            min_daily_violation,
            forecast_leads: forecast.leads,
            forecast_impressions: forecast.impressions,
            forecast_clicks: forecast.clicks,
            forecast_cents,
            forecast_overrun,
            utilization,
            status_class: CampaignStatus::classify(line.status()),
            alert: AlertLevel::classify(
                &self.config.alerts,
                utilization,
                line.status(),
                forecast_overrun,
            ),
        }
    }

    pub fn measure<L: BudgetLine>(&self, line: L) -> Measured<L> {
        let metrics = self.evaluate(&line);
        Measured { row: line, metrics }
    }

    pub fn measure_all<L: BudgetLine>(&self, lines: Vec<L>) -> Vec<Measured<L>> {
        lines.into_iter().map(|line| self.measure(line)).collect()
    }
}

/// Daily spend needed to exhaust the remaining budget, in currency units.
pub fn required_daily(remaining_budget_cents: i64, remaining_active_days: i64) -> Option<Decimal> {
    if remaining_active_days <= 0 {
        return None;
    }
    cents_to_decimal(remaining_budget_cents)
        .checked_div(Decimal::from(remaining_active_days))
        .map(round2)
}

pub fn pacing_ratio(spent_to_date_cents: i64, expected_spend_cents: i64) -> Option<Decimal> {
    if expected_spend_cents == 0 {
        return None;
    }
    Decimal::from(spent_to_date_cents)
        .checked_div(Decimal::from(expected_spend_cents))
        .map(round2)
}

/// Spend over budget, rounded to 4 places; 0 without a budget.
pub fn utilization(spent_to_date_cents: i64, total_budget_cents: i64) -> Decimal {
    if total_budget_cents <= 0 {
        return Decimal::ZERO;
    }
    Decimal::from(spent_to_date_cents)
        .checked_div(Decimal::from(total_budget_cents))
        .map(|ratio| round_half_up(ratio, 4))
        .unwrap_or(Decimal::ZERO)
        .max(Decimal::ZERO)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Forecast {
    leads: Option<Decimal>,
    impressions: Option<Decimal>,
    clicks: Option<Decimal>,
}

impl Forecast {
    fn compute(
        total_budget_cents: i64,
        cpm: Option<Decimal>,
        ctr: Option<Decimal>,
        cpl: Option<Decimal>,
    ) -> Self {
        let projected = cents_to_decimal(total_budget_cents);
        let positive = |v: Option<Decimal>| v.filter(|d| *d > Decimal::ZERO);

        let leads = positive(cpl).and_then(|cpl| projected.checked_div(cpl));
        let impressions = positive(cpm)
            .and_then(|cpm| projected.checked_div(cpm))
            .and_then(|per_mille| per_mille.checked_mul(Decimal::ONE_THOUSAND));
        let clicks = impressions
            .zip(positive(ctr))
            .and_then(|(impressions, ctr)| impressions.checked_mul(ctr));

        Self {
            leads: leads.map(round2),
            impressions: impressions.map(round2),
            clicks: clicks.map(round2),
        }
    }
}

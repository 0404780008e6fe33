//! Period validation - decide which trailing windows the data can support

use crate::analysis::types::{
    OmissionReason, OmittedPeriod, PeriodDefinition, PeriodStatus, PeriodValidation,
    ProcessedSale, ValidPeriod,
};
use crate::analysis::utils::{days_to_months, DAYS_PER_MONTH};
use chrono::{Days, NaiveDate};
use tracing::{debug, info};

/// Slack allowed between a window's length and the data coverage
pub const COVERAGE_BUFFER_MONTHS: f64 = 1.0;

/// Accepted periods with fewer sales are flagged, not excluded
pub const MIN_PERIOD_SALES: usize = 3;

/// Candidate windows in evaluation order
pub const DEFAULT_PERIOD_LADDER: [(&str, u32); 9] = [
    ("0-3 months", 3),
    ("4-6 months", 6),
    ("7-9 months", 9),
    ("9-12 months", 12),
    ("0-6 months", 6),
    ("0-12 months", 12),
    ("0-18 months", 18),
    ("0-24 months", 24),
    ("0-36 months", 36),
];

pub fn default_ladder() -> Vec<PeriodDefinition> {
    DEFAULT_PERIOD_LADDER
        .iter()
        .map(|(name, months)| PeriodDefinition::new(*name, *months))
        .collect()
}

/// First day included in a window of `months` ending at the date of value
pub fn period_cutoff(date_of_value: NaiveDate, months: u32) -> NaiveDate {
    let days = (months as f64 * DAYS_PER_MONTH).trunc() as u64;
    date_of_value
        .checked_sub_days(Days::new(days))
        .unwrap_or(NaiveDate::MIN)
}

/// Sales on or after the cutoff
pub fn sales_since(sales: &[ProcessedSale], cutoff: NaiveDate) -> impl Iterator<Item = &ProcessedSale> {
    sales.iter().filter(move |s| s.sale.sale_date >= cutoff)
}

/// Coverage in average months between the earliest sale and the date of value
pub fn coverage_months(sales: &[ProcessedSale], date_of_value: NaiveDate) -> Option<f64> {
    sales
        .iter()
        .map(|s| s.sale.sale_date)
        .min()
        .map(|earliest| days_to_months((date_of_value - earliest).num_days()))
}

/// Evaluate each candidate once, in order, against coverage and the last accepted count
pub fn validate_periods(
    sales: &[ProcessedSale],
    date_of_value: NaiveDate,
    ladder: &[PeriodDefinition],
) -> PeriodValidation {
    let mut validation = PeriodValidation::default();

    let Some(coverage) = coverage_months(sales, date_of_value) else {
        info!("No sales to validate periods against");
        return validation;
    };

    for period in ladder {
        let cutoff = period_cutoff(date_of_value, period.months);
        let sales_count = sales_since(sales, cutoff).count();

        let reason = if period.months as f64 > coverage + COVERAGE_BUFFER_MONTHS {
            Some(OmissionReason::BeyondCoverage {
                coverage_months: coverage,
            })
        } else {
            validation
                .valid
                .last()
                .filter(|last| last.sales_count == sales_count)
                .map(|last| OmissionReason::DuplicateCount {
                    previous: last.name.clone(),
                    sales_count,
                })
        };

        match reason {
            Some(reason) => {
                debug!("Omitting {}: {}", period.name, reason);
                validation.omitted.push(OmittedPeriod {
                    name: period.name.clone(),
                    months: period.months,
                    sales_count,
                    reason,
                });
            }
            None => {
                let status = if sales_count < MIN_PERIOD_SALES {
                    PeriodStatus::InsufficientData
                } else {
                    PeriodStatus::Valid
                };
                debug!("Including {}: n={} ({:?})", period.name, sales_count, status);
                validation.valid.push(ValidPeriod {
                    name: period.name.clone(),
                    months: period.months,
                    sales_count,
                    cutoff_date: cutoff,
                    status,
                });
            }
        }
    }

    info!(
        "Period validation: {} included, {} omitted (coverage {:.1} months)",
        validation.valid.len(),
        validation.omitted.len(),
        coverage
    );

    validation
}

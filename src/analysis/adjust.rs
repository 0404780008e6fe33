//! Adjustment functions - bring each comparable to the subject's date and size
//! Pure functions - no side effects

use crate::analysis::stats::{comparable_statistics, mean, percent_change, prices, prices_per_area};
use crate::analysis::trend::linear_regression;
use crate::analysis::types::{
    Adjustment, AdjustmentAnalysis, AdjustmentCounts, AdjustmentRecord, AdjustmentSummary,
    LinearFit, ProcessedSale, SubjectProperty, Thresholds, TrendResult,
};
use crate::analysis::utils::DAYS_PER_MONTH;
use crate::price_per_area;
use tracing::{debug, info};

/// Marginal value of one unit of living area: OLS slope of price on area
pub fn marginal_value(comparables: &[&ProcessedSale]) -> Option<LinearFit> {
    let (areas, prices): (Vec<f64>, Vec<f64>) = comparables
        .iter()
        .filter_map(|s| s.sale.living_area.map(|a| (a, s.sale.sale_price)))
        .unzip();
    linear_regression(&areas, &prices)
}

/// Time adjustment, applied only when the sale is strictly further away than the threshold
pub fn time_adjustment(days_diff: i64, trend: &TrendResult, thresholds: &Thresholds) -> Adjustment {
    if days_diff.abs() <= thresholds.time_adjustment_days {
        return Adjustment::NONE;
    }
    Adjustment {
        amount: trend.daily_change * days_diff as f64,
        pct: trend.monthly_change_pct / DAYS_PER_MONTH * days_diff as f64,
    }
}

/// Size adjustment; a larger comparable is adjusted down
pub fn size_adjustment(
    area_difference: f64,
    area_difference_pct: f64,
    marginal_value: Option<f64>,
    thresholds: &Thresholds,
) -> Adjustment {
    match marginal_value {
        Some(value) if area_difference_pct.abs() > thresholds.size_adjustment_pct => Adjustment {
            amount: -area_difference * value,
            pct: -area_difference_pct,
        },
        _ => Adjustment::NONE,
    }
}

pub fn adjust_sale(
    sale: &ProcessedSale,
    subject: &SubjectProperty,
    trend: &TrendResult,
    marginal_value: Option<f64>,
    thresholds: &Thresholds,
) -> AdjustmentRecord {
    let days_diff = (subject.date_of_value - sale.sale.sale_date).num_days();
    let time = time_adjustment(days_diff, trend, thresholds);

    let area = sale.sale.living_area.filter(|a| *a > 0.0);
    let area_difference = area.map(|a| a - subject.living_area);
    let area_difference_pct = area_difference
        .filter(|_| subject.living_area > 0.0)
        .map(|d| d / subject.living_area * 100.0);

    let size = match (area_difference, area_difference_pct) {
        (Some(diff), Some(pct)) => size_adjustment(diff, pct, marginal_value, thresholds),
        _ => Adjustment::NONE,
    };

    let net_amount = time.amount + size.amount;
    let adjusted_price = sale.sale.sale_price + net_amount;

    debug!(
        "Row {}: {} days, time {:+.0}, size {:+.0}, adjusted {:.0}",
        sale.sale.row, days_diff, time.amount, size.amount, adjusted_price
    );

    AdjustmentRecord {
        sale: sale.clone(),
        days_diff,
        time,
        area_difference,
        area_difference_pct,
        size,
        net_amount,
        net_pct: time.pct + size.pct,
        adjusted_price,
        adjusted_price_per_area: area.and_then(|a| price_per_area(adjusted_price, a)),
    }
}

/// Adjust every comparable and summarise the set before and after
pub fn adjust_comparables(
    comparables: &[&ProcessedSale],
    subject: &SubjectProperty,
    trend: &TrendResult,
    thresholds: &Thresholds,
) -> AdjustmentAnalysis {
    let marginal = marginal_value(comparables);
    match marginal {
        Some(fit) => info!(
            "Marginal value {:.2} per unit area (R² = {:.3})",
            fit.slope, fit.r_squared
        ),
        None => info!("Marginal value undefined; size adjustments disabled"),
    }

    let records: Vec<AdjustmentRecord> = comparables
        .iter()
        .map(|s| adjust_sale(s, subject, trend, marginal.map(|m| m.slope), thresholds))
        .collect();

    let summary = summarize(comparables, &records, subject, trend, thresholds, marginal);

    info!(
        "Adjusted {} comparables: {} time only, {} size only, {} both, {} none",
        records.len(),
        summary.counts.time_only,
        summary.counts.size_only,
        summary.counts.both,
        summary.counts.none
    );

    AdjustmentAnalysis { records, summary }
}

pub fn count_adjustments(records: &[AdjustmentRecord]) -> AdjustmentCounts {
    records
        .iter()
        .fold(AdjustmentCounts::default(), |mut counts, r| {
            match (r.time.is_applied(), r.size.is_applied()) {
                (true, false) => counts.time_only += 1,
                (false, true) => counts.size_only += 1,
                (true, true) => counts.both += 1,
                (false, false) => counts.none += 1,
            }
            counts
        })
}

fn summarize(
    comparables: &[&ProcessedSale],
    records: &[AdjustmentRecord],
    subject: &SubjectProperty,
    trend: &TrendResult,
    thresholds: &Thresholds,
    marginal: Option<LinearFit>,
) -> AdjustmentSummary {
    let applied_mean = |select: fn(&AdjustmentRecord) -> Adjustment| {
        let amounts: Vec<f64> = records
            .iter()
            .map(select)
            .filter(Adjustment::is_applied)
            .map(|a| a.amount)
            .collect();
        mean(&amounts)
    };

    // Net is averaged over every comparable, adjusted or not
    let net: Vec<f64> = records.iter().map(|r| r.net_amount).collect();

    let unadjusted = comparable_statistics(&prices(comparables), &prices_per_area(comparables));
    let adjusted_prices: Vec<f64> = records.iter().map(|r| r.adjusted_price).collect();
    let adjusted_ppa: Vec<f64> = records
        .iter()
        .filter_map(|r| r.adjusted_price_per_area)
        .collect();
    let adjusted = comparable_statistics(&adjusted_prices, &adjusted_ppa);

    AdjustmentSummary {
        subject_living_area: subject.living_area,
        thresholds: *thresholds,
        comparables: records.len(),
        marginal_value_per_area: marginal.map(|m| m.slope),
        marginal_value_r_squared: marginal.map(|m| m.r_squared),
        monthly_change_pct: trend.monthly_change_pct,
        daily_change: trend.daily_change,
        counts: count_adjustments(records),
        mean_time_adjustment: applied_mean(|r| r.time),
        mean_size_adjustment: applied_mean(|r| r.size),
        mean_net_adjustment: mean(&net),
        mean_price_change_pct: percent_change(unadjusted.price.mean, adjusted.price.mean),
        median_price_change_pct: percent_change(unadjusted.price.median, adjusted.price.median),
        unadjusted,
        adjusted,
    }
}

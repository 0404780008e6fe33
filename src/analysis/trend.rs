//! Trend estimation - least-squares market trend over a trailing window

use crate::analysis::periods::{period_cutoff, sales_since};
use crate::analysis::stats::mean;
use crate::analysis::types::{LinearFit, MarketTrend, PeriodValidation, ProcessedSale, TrendResult};
use crate::analysis::utils::{DAYS_PER_MONTH, DAYS_PER_MONTH_EXACT};
use chrono::NaiveDate;
use tracing::{debug, info};

/// Daily price change (currency/day) beyond which the market has a direction
pub const DIRECTION_THRESHOLD: f64 = 0.50;

/// Below this R² a directionless market is called unstable
pub const STABILITY_R_SQUARED: f64 = 0.30;

/// Window length the trend is preferentially measured over
pub const TREND_WINDOW_MONTHS: u32 = 12;

/// Ordinary least squares of ys on xs
///
/// Returns None with fewer than two points or when every x is identical.
/// R² is the squared Pearson correlation, zero when ys have no variance.
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Option<LinearFit> {
    let n = xs.len();
    if n < 2 || n != ys.len() {
        return None;
    }

    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    if sxx == 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    let r_squared = if syy > 0.0 {
        (sxy * sxy / (sxx * syy)).min(1.0)
    } else {
        0.0
    };

    Some(LinearFit {
        slope,
        intercept: mean_y - slope * mean_x,
        r_squared,
        observations: n,
    })
}

/// Direction by magnitude first, then reliability
pub fn classify_trend(daily_change: f64, r_squared: f64) -> MarketTrend {
    if daily_change > DIRECTION_THRESHOLD {
        MarketTrend::Increasing
    } else if daily_change < -DIRECTION_THRESHOLD {
        MarketTrend::Decreasing
    } else if r_squared < STABILITY_R_SQUARED {
        MarketTrend::Unstable
    } else {
        MarketTrend::Stable
    }
}

/// Sales in the accepted 12-month window, or every sale when there is none
pub fn select_trend_window<'a>(
    sales: &'a [ProcessedSale],
    periods: &PeriodValidation,
    date_of_value: NaiveDate,
) -> (Option<String>, Vec<&'a ProcessedSale>) {
    match periods
        .valid
        .iter()
        .find(|p| p.months == TREND_WINDOW_MONTHS)
    {
        Some(period) => {
            let cutoff = period_cutoff(date_of_value, period.months);
            (Some(period.name.clone()), sales_since(sales, cutoff).collect())
        }
        None => (None, sales.iter().collect()),
    }
}

/// Fit price and price-per-area against days since the window's earliest sale
pub fn estimate_trend(window_sales: &[&ProcessedSale], window: Option<String>) -> TrendResult {
    let observations = window_sales.len();
    let Some(origin) = window_sales.iter().map(|s| s.sale.sale_date).min() else {
        info!("No sales in trend window");
        return TrendResult::insufficient(window, 0);
    };

    let days: Vec<f64> = window_sales
        .iter()
        .map(|s| (s.sale.sale_date - origin).num_days() as f64)
        .collect();
    let prices: Vec<f64> = window_sales.iter().map(|s| s.sale.sale_price).collect();

    let Some(price_fit) = linear_regression(&days, &prices) else {
        info!(
            "Insufficient data for trend analysis ({} sales in window)",
            observations
        );
        return TrendResult::insufficient(window, observations);
    };

    let (area_days, area_prices): (Vec<f64>, Vec<f64>) = window_sales
        .iter()
        .zip(&days)
        .filter_map(|(s, d)| s.price_per_area.map(|ppa| (*d, ppa)))
        .unzip();
    let price_per_area_fit = linear_regression(&area_days, &area_prices).unwrap_or_default();

    let daily_change = price_fit.slope;
    let monthly_change_pct = monthly_pct(daily_change, mean(&prices));
    let daily_change_per_area = price_per_area_fit.slope;
    let monthly_change_per_area_pct = monthly_pct(daily_change_per_area, mean(&area_prices));

    let market_trend = classify_trend(daily_change, price_fit.r_squared);

    info!(
        "Trend: {:+.2}/day, {:+.2}%/month, R² = {:.3} -> {}",
        daily_change, monthly_change_pct, price_fit.r_squared, market_trend
    );
    debug!(
        "Price/area trend: {:+.3}/day, {:+.2}%/month, R² = {:.3}",
        daily_change_per_area, monthly_change_per_area_pct, price_per_area_fit.r_squared
    );

    TrendResult {
        window,
        window_start: Some(origin),
        observations,
        price_fit,
        price_per_area_fit,
        daily_change,
        monthly_change_pct,
        daily_change_per_area,
        monthly_change_per_area_pct,
        compounded_monthly_pct: compounded_monthly_pct(&days, &prices),
        market_trend,
    }
}

fn monthly_pct(daily_change: f64, mean_value: Option<f64>) -> f64 {
    match mean_value {
        Some(m) if m != 0.0 => daily_change * DAYS_PER_MONTH / m * 100.0,
        _ => 0.0,
    }
}

/// Compounded %/month from a fit of ln(price) against elapsed months
pub fn compounded_monthly_pct(days: &[f64], prices: &[f64]) -> Option<f64> {
    let (months, log_prices): (Vec<f64>, Vec<f64>) = days
        .iter()
        .zip(prices)
        .filter(|(_, p)| **p > 0.0)
        .map(|(d, p)| (d / DAYS_PER_MONTH_EXACT, p.ln()))
        .unzip();

    linear_regression(&months, &log_prices).map(|fit| (fit.slope.exp() - 1.0) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::parse::process_sale;
    use crate::analysis::periods::{default_ladder, validate_periods};
    use crate::analysis::types::SaleRecord;
    use chrono::Days;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sale(dov: NaiveDate, days_before: u64, price: f64, area: Option<f64>) -> ProcessedSale {
        process_sale(
            SaleRecord {
                row: 1,
                sale_date: dov.checked_sub_days(Days::new(days_before)).unwrap(),
                sale_price: price,
                living_area: area,
                bedrooms: None,
                bathrooms: None,
                garage: None,
                year_built: None,
                lot_size: None,
                days_on_market: None,
                cumulative_days_on_market: None,
                status: None,
                listing_id: None,
                address: None,
                zip: None,
                latitude: None,
                longitude: None,
            },
            dov,
        )
    }

    #[test]
    fn test_two_points_fit_exactly() {
        let fit = linear_regression(&[0.0, 10.0], &[100.0, 150.0]).unwrap();
        assert!((fit.slope - 5.0).abs() < 1e-12);
        assert!((fit.intercept - 100.0).abs() < 1e-12);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
        assert!((fit.intercept + fit.slope * 10.0 - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_regression_degenerate_inputs() {
        assert!(linear_regression(&[], &[]).is_none());
        assert!(linear_regression(&[1.0], &[5.0]).is_none());
        assert!(linear_regression(&[3.0, 3.0], &[1.0, 2.0]).is_none());
        assert!(linear_regression(&[1.0, 2.0], &[1.0]).is_none());

        let flat = linear_regression(&[1.0, 2.0, 3.0], &[7.0, 7.0, 7.0]).unwrap();
        assert_eq!(flat.slope, 0.0);
        assert_eq!(flat.r_squared, 0.0);
    }

    #[test]
    fn test_noisy_fit_r_squared() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 3.0, 2.0, 4.0];
        let fit = linear_regression(&xs, &ys).unwrap();
        // sxy = 4, sxx = 5, syy = 5
        assert!((fit.slope - 0.8).abs() < 1e-12);
        assert!((fit.r_squared - 0.64).abs() < 1e-12);
    }

    #[test]
    fn test_classification_order() {
        // Magnitude wins over reliability
        assert_eq!(classify_trend(25.0, 0.01), MarketTrend::Increasing);
        assert_eq!(classify_trend(-0.51, 0.01), MarketTrend::Decreasing);
        assert_eq!(classify_trend(0.50, 0.29), MarketTrend::Unstable);
        assert_eq!(classify_trend(-0.50, 0.30), MarketTrend::Stable);
        assert_eq!(classify_trend(0.0, 0.9), MarketTrend::Stable);
    }

    #[test]
    fn test_insufficient_data() {
        let dov = date(2024, 1, 1);
        let one = sale(dov, 10, 400_000.0, Some(2000.0));
        let trend = estimate_trend(&[&one], None);

        assert_eq!(trend.market_trend, MarketTrend::InsufficientData);
        assert_eq!(trend.observations, 1);
        assert_eq!(trend.daily_change, 0.0);
        assert_eq!(trend.price_fit, LinearFit::default());

        let empty = estimate_trend(&[], Some("0-12 months".to_string()));
        assert_eq!(empty.market_trend, MarketTrend::InsufficientData);
    }

    #[test]
    fn test_time_axis_starts_at_window_earliest_sale() {
        let dov = date(2024, 1, 1);
        let a = sale(dov, 100, 400_000.0, Some(2000.0));
        let b = sale(dov, 50, 405_000.0, Some(2000.0));
        let c = sale(dov, 0, 410_000.0, None);

        let trend = estimate_trend(&[&a, &b, &c], None);

        assert!((trend.daily_change - 100.0).abs() < 1e-9);
        // Intercept is the price at the earliest sale, not at the date of value
        assert!((trend.price_fit.intercept - 400_000.0).abs() < 1e-6);
        assert_eq!(trend.window_start, Some(date(2023, 9, 23)));
        let expected_pct = 100.0 * 30.44 / 405_000.0 * 100.0;
        assert!((trend.monthly_change_pct - expected_pct).abs() < 1e-9);
        assert_eq!(trend.market_trend, MarketTrend::Increasing);

        // Price/area only sees the two sales with an area
        assert_eq!(trend.price_per_area_fit.observations, 2);
        assert!((trend.daily_change_per_area - 0.05).abs() < 1e-12);

        let compounded = trend.compounded_monthly_pct.unwrap();
        assert!(compounded > 0.7 && compounded < 0.8);
    }

    #[test]
    fn test_window_prefers_accepted_twelve_month_period() {
        let dov = date(2024, 1, 1);
        let sales: Vec<_> = [20, 60, 100, 200, 300, 500, 700]
            .iter()
            .map(|d| sale(dov, *d, 400_000.0, Some(1800.0)))
            .collect();
        let periods = validate_periods(&sales, dov, &default_ladder());

        let (window, in_window) = select_trend_window(&sales, &periods, dov);
        assert!(window.is_some());
        assert_eq!(in_window.len(), 5);

        let (window, in_window) = select_trend_window(&sales, &PeriodValidation::default(), dov);
        assert!(window.is_none());
        assert_eq!(in_window.len(), 7);
    }
}

//! Statistics functions - descriptive statistics per period and per comparable set

use crate::absorption_rate;
use crate::analysis::periods::sales_since;
use crate::analysis::types::{
    ComparableStatistics, PeriodStatistics, PeriodValidation, ProcessedSale, SeriesStats,
};
use tracing::{debug, info};

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Sample standard deviation (N-1 denominator)
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

pub fn describe(values: &[f64]) -> SeriesStats {
    SeriesStats {
        count: values.len(),
        mean: mean(values),
        median: median(values),
        std_dev: sample_std_dev(values),
        min: values.iter().copied().reduce(f64::min),
        max: values.iter().copied().reduce(f64::max),
    }
}

/// Percent change from `before` to `after`; undefined when `before` is zero
pub fn percent_change(before: Option<f64>, after: Option<f64>) -> Option<f64> {
    match (before, after) {
        (Some(b), Some(a)) if b != 0.0 => Some((a - b) / b * 100.0),
        _ => None,
    }
}

/// Statistics for every accepted period, in acceptance order
pub fn period_statistics(
    sales: &[ProcessedSale],
    periods: &PeriodValidation,
    active_listings: usize,
) -> Vec<PeriodStatistics> {
    let stats: Vec<PeriodStatistics> = periods
        .valid
        .iter()
        .map(|period| {
            let in_period: Vec<&ProcessedSale> = sales_since(sales, period.cutoff_date).collect();
            let absorption = absorption_rate(in_period.len(), period.months).unwrap_or(0.0);

            let months_of_inventory = if active_listings > 0 && absorption > 0.0 {
                Some(active_listings as f64 / absorption)
            } else {
                None
            };

            let dom: Vec<f64> = in_period
                .iter()
                .filter_map(|s| s.sale.days_on_market)
                .collect();

            debug!(
                "{}: n={}, absorption {:.2}/month",
                period.name,
                in_period.len(),
                absorption
            );

            PeriodStatistics {
                name: period.name.clone(),
                months: period.months,
                sales_count: in_period.len(),
                absorption_rate: absorption,
                months_of_inventory,
                price: describe(&prices(&in_period)),
                price_per_area: describe(&prices_per_area(&in_period)),
                days_on_market: (!dom.is_empty()).then(|| describe(&dom)),
                status: period.status,
            }
        })
        .collect();

    info!("Computed statistics for {} periods", stats.len());
    stats
}

pub fn comparable_statistics(prices: &[f64], prices_per_area: &[f64]) -> ComparableStatistics {
    ComparableStatistics {
        price: describe(prices),
        price_per_area: describe(prices_per_area),
    }
}

pub fn prices(sales: &[&ProcessedSale]) -> Vec<f64> {
    sales.iter().map(|s| s.sale.sale_price).collect()
}

pub fn prices_per_area(sales: &[&ProcessedSale]) -> Vec<f64> {
    sales.iter().filter_map(|s| s.price_per_area).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::parse::process_sale;
    use crate::analysis::periods::{default_ladder, validate_periods};
    use crate::analysis::types::{PeriodStatus, SaleRecord};
    use chrono::{Days, NaiveDate};

    fn sale(dov: NaiveDate, days_before: u64, price: f64, dom: Option<f64>) -> ProcessedSale {
        process_sale(
            SaleRecord {
                row: 1,
                sale_date: dov.checked_sub_days(Days::new(days_before)).unwrap(),
                sale_price: price,
                living_area: Some(2000.0),
                bedrooms: None,
                bathrooms: None,
                garage: None,
                year_built: None,
                lot_size: None,
                days_on_market: dom,
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
    fn test_describe() {
        let stats = describe(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(stats.count, 8);
        assert_eq!(stats.mean, Some(5.0));
        assert_eq!(stats.median, Some(4.5));
        // Sum of squared deviations is 32, over N-1 = 7
        assert!((stats.std_dev.unwrap() - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(stats.min, Some(2.0));
        assert_eq!(stats.max, Some(9.0));
    }

    #[test]
    fn test_single_value_has_no_std_dev() {
        let stats = describe(&[300_000.0]);
        assert_eq!(stats.count, 1);
        assert_eq!(stats.median, Some(300_000.0));
        assert_eq!(stats.std_dev, None);

        let empty = describe(&[]);
        assert_eq!(empty, SeriesStats::default());
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(Some(200.0), Some(210.0)), Some(5.0));
        assert_eq!(percent_change(Some(0.0), Some(210.0)), None);
        assert_eq!(percent_change(None, Some(1.0)), None);
    }

    #[test]
    fn test_period_statistics_absorption_and_inventory() {
        let dov = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let sales = vec![
            sale(dov, 10, 400_000.0, Some(20.0)),
            sale(dov, 40, 420_000.0, None),
            sale(dov, 80, 380_000.0, Some(40.0)),
            sale(dov, 150, 390_000.0, Some(60.0)),
        ];
        let periods = validate_periods(&sales, dov, &default_ladder());
        let stats = period_statistics(&sales, &periods, 6);

        let first = &stats[0];
        assert_eq!(first.name, "0-3 months");
        assert_eq!(first.sales_count, 3);
        assert_eq!(first.status, PeriodStatus::Valid);
        assert!((first.absorption_rate - 1.0).abs() < 1e-12);
        assert_eq!(first.months_of_inventory, Some(6.0));
        assert_eq!(first.price.median, Some(400_000.0));
        assert_eq!(first.price_per_area.mean, Some(200.0));

        let dom = first.days_on_market.unwrap();
        assert_eq!(dom.count, 2);
        assert_eq!(dom.mean, Some(30.0));

        let no_inventory = period_statistics(&sales, &periods, 0);
        assert!(no_inventory.iter().all(|p| p.months_of_inventory.is_none()));
    }
}

//! Pipeline orchestration - map, load, validate, estimate, adjust, aggregate

use crate::analysis::adjust::adjust_comparables;
use crate::analysis::columns::ColumnMapping;
use crate::analysis::error::Result;
use crate::analysis::inputs::AnalysisInputs;
use crate::analysis::parse::load_sales;
use crate::analysis::periods::{default_ladder, validate_periods};
use crate::analysis::stats::period_statistics;
use crate::analysis::trend::{estimate_trend, select_trend_window};
use crate::analysis::types::{
    CanonicalField, ComparableScope, LoadStats, MarketAnalysis, MarketSegment, PeriodDefinition,
    PeriodValidation, ProcessedSale, RawTable, ReportInfo, SubjectProperty, Thresholds,
    TrendResult, ValidationReport,
};
use crate::analysis::utils::days_to_months;
use std::collections::BTreeMap;
use tracing::{info, warn};

pub const EMPTY_INPUT_MESSAGE: &str = "No sales on or before date of value";

/// Everything a run needs besides the sales table
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub subject: SubjectProperty,
    pub thresholds: Thresholds,
    pub column_overrides: BTreeMap<CanonicalField, String>,
    pub period_ladder: Vec<PeriodDefinition>,
    pub comparables: ComparableScope,
    pub report_info: ReportInfo,
    pub market_segment: MarketSegment,
}

impl AnalysisConfig {
    pub fn new(subject: SubjectProperty) -> Self {
        Self {
            subject,
            thresholds: Thresholds::default(),
            column_overrides: BTreeMap::new(),
            period_ladder: default_ladder(),
            comparables: ComparableScope::default(),
            report_info: ReportInfo::default(),
            market_segment: MarketSegment::default(),
        }
    }

    pub fn from_inputs(inputs: &AnalysisInputs) -> Result<Self> {
        Ok(Self {
            subject: inputs.subject()?,
            thresholds: inputs.thresholds()?,
            column_overrides: inputs.column_overrides()?,
            period_ladder: inputs.period_ladder()?,
            comparables: inputs.comparables,
            report_info: inputs.report_info.clone(),
            market_segment: inputs.market_segment.clone(),
        })
    }
}

/// Run every stage over one comparable table
///
/// Only configuration problems are errors. Bad rows are dropped and counted,
/// and a table with no usable sales yields a labelled empty analysis.
pub fn run_analysis(table: &RawTable, config: &AnalysisConfig) -> Result<MarketAnalysis> {
    let date_of_value = config.subject.date_of_value;

    let mapping = ColumnMapping::resolve(&table.headers, &config.column_overrides)?;
    mapping.require(&CanonicalField::REQUIRED, &table.headers)?;
    info!(
        "Mapped {} of {} fields",
        CanonicalField::ALL.len() - mapping.unresolved().len(),
        CanonicalField::ALL.len()
    );

    let (sales, load) = load_sales(table, &mapping, date_of_value);
    if sales.is_empty() {
        warn!("{}", EMPTY_INPUT_MESSAGE);
        return Ok(empty_analysis(config, &mapping, load));
    }

    let periods = validate_periods(&sales, date_of_value, &config.period_ladder);

    let (window, window_sales) = select_trend_window(&sales, &periods, date_of_value);
    let trend = estimate_trend(&window_sales, window);

    let period_stats = period_statistics(&sales, &periods, load.active_listings);

    let comparables: Vec<&ProcessedSale> = match config.comparables {
        ComparableScope::TrendWindow => window_sales,
        ComparableScope::AllSales => sales.iter().collect(),
    };
    let adjustments = adjust_comparables(
        &comparables,
        &config.subject,
        &trend,
        &config.thresholds,
    );

    let validation = validation_report(&sales, config, &mapping, periods, trend, load, None);

    Ok(MarketAnalysis {
        sales,
        validation,
        period_statistics: period_stats,
        adjustments: Some(adjustments),
    })
}

fn empty_analysis(
    config: &AnalysisConfig,
    mapping: &ColumnMapping,
    load: LoadStats,
) -> MarketAnalysis {
    MarketAnalysis {
        sales: Vec::new(),
        validation: validation_report(
            &[],
            config,
            mapping,
            PeriodValidation::default(),
            TrendResult::insufficient(None, 0),
            load,
            Some(EMPTY_INPUT_MESSAGE.to_string()),
        ),
        period_statistics: Vec::new(),
        adjustments: None,
    }
}

fn validation_report(
    sales: &[ProcessedSale],
    config: &AnalysisConfig,
    mapping: &ColumnMapping,
    periods: PeriodValidation,
    trend: TrendResult,
    load: LoadStats,
    message: Option<String>,
) -> ValidationReport {
    let date_of_value = config.subject.date_of_value;
    let earliest_sale = sales.first().map(|s| s.sale.sale_date);
    let actual_coverage_days = earliest_sale.map(|d| (date_of_value - d).num_days());

    ValidationReport {
        date_of_value,
        message,
        earliest_sale,
        latest_sale: sales.last().map(|s| s.sale.sale_date),
        actual_coverage_days,
        actual_coverage_months: actual_coverage_days.map(days_to_months),
        valid_periods: periods.valid,
        omitted_periods: periods.omitted,
        trend_results: trend,
        subject_property: config.subject.clone(),
        report_info: config.report_info.clone(),
        thresholds: config.thresholds,
        market_segment: config.market_segment.clone(),
        column_mapping: mapping.iter().map(|(f, c)| (*f, c.clone())).collect(),
        unmapped_fields: mapping.unresolved(),
        load,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::error::AnalysisError;
    use crate::analysis::types::{MarketTrend, MatchSource, OmissionReason};
    use chrono::{Days, NaiveDate};

    const HEADERS: [&str; 8] = [
        "MLS #",
        "Status",
        "Close Date",
        "Close Price",
        "Living Area",
        "Bedrooms Total",
        "Days On Market",
        "Address",
    ];

    fn dov() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn subject() -> SubjectProperty {
        SubjectProperty {
            address: Some("1 Subject St".to_string()),
            living_area: 2000.0,
            bedrooms: Some(3.0),
            bathrooms: Some(2.0),
            garage: None,
            year_built: None,
            date_of_value: dov(),
        }
    }

    /// (days before the date of value, price, living area)
    fn table(sales: &[(u64, f64, &str)]) -> RawTable {
        let rows = sales
            .iter()
            .enumerate()
            .map(|(i, (days, price, area))| {
                let date = dov().checked_sub_days(Days::new(*days)).unwrap();
                vec![
                    format!("M{}", i + 1),
                    "Closed".to_string(),
                    date.format("%m/%d/%Y").to_string(),
                    format!("${:.0}", price),
                    area.to_string(),
                    "3".to_string(),
                    "21".to_string(),
                    format!("{} Comp Ave", i + 1),
                ]
            })
            .collect();
        RawTable::new(HEADERS.iter().map(|h| h.to_string()).collect(), rows)
    }

    fn market_table() -> RawTable {
        table(&[
            (400, 372_000.0, "1900"),
            (330, 381_000.0, "2050"),
            (300, 377_000.0, "1850"),
            (250, 392_000.0, "2150"),
            (200, 389_000.0, "1950"),
            (150, 401_000.0, "2250"),
            (100, 398_000.0, "1800"),
            (60, 410_000.0, "2000"),
            (20, 417_000.0, "2300"),
            (5, 415_000.0, ""),
        ])
    }

    #[test]
    fn test_full_run() {
        let analysis = run_analysis(&market_table(), &AnalysisConfig::new(subject())).unwrap();

        assert_eq!(analysis.sales.len(), 10);
        assert!(analysis
            .sales
            .windows(2)
            .all(|w| w[0].sale.sale_date <= w[1].sale.sale_date));
        assert!(analysis.sales.iter().all(|s| s.sale.sale_date <= dov()));

        let validation = &analysis.validation;
        assert!(validation.message.is_none());
        assert_eq!(validation.actual_coverage_days, Some(400));
        assert_eq!(validation.latest_sale, Some(NaiveDate::from_ymd_opt(2024, 5, 27).unwrap()));
        assert!(!validation.valid_periods.is_empty());
        assert_eq!(
            validation.valid_periods.len() + validation.omitted_periods.len(),
            9
        );
        assert_eq!(analysis.period_statistics.len(), validation.valid_periods.len());

        // Prices rise through the year
        let trend = &validation.trend_results;
        assert!(trend.window.is_some());
        assert_eq!(trend.market_trend, MarketTrend::Increasing);
        assert!(trend.monthly_change_pct > 0.0);

        let adjustments = analysis.adjustments.as_ref().unwrap();
        assert_eq!(adjustments.records.len(), trend.observations);
        for r in &adjustments.records {
            let expected = r.sale.sale.sale_price + r.time.amount + r.size.amount;
            assert!((r.adjusted_price - expected).abs() < 1e-6);
            assert_eq!(r.time.is_applied(), r.days_diff > 30);
        }
        // The sale with no area is kept but cannot be size adjusted
        let no_area = adjustments
            .records
            .iter()
            .find(|r| r.sale.sale.living_area.is_none())
            .unwrap();
        assert!(!no_area.size.is_applied());
        assert!(no_area.adjusted_price_per_area.is_none());
    }

    #[test]
    fn test_all_sales_scope() {
        let mut config = AnalysisConfig::new(subject());
        config.comparables = ComparableScope::AllSales;

        let analysis = run_analysis(&market_table(), &config).unwrap();
        assert_eq!(analysis.adjustments.unwrap().records.len(), 10);
    }

    #[test]
    fn test_runs_are_idempotent() {
        let config = AnalysisConfig::new(subject());
        let first = run_analysis(&market_table(), &config).unwrap();
        let second = run_analysis(&market_table(), &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_two_recent_sales() {
        let analysis = run_analysis(
            &table(&[(60, 400_000.0, "2000"), (5, 406_000.0, "2000")]),
            &AnalysisConfig::new(subject()),
        )
        .unwrap();

        let trend = &analysis.validation.trend_results;
        assert!(trend.window.is_none());
        assert!((trend.price_fit.r_squared - 1.0).abs() < 1e-9);
        let slope = 6000.0 / 55.0;
        assert!((trend.daily_change - slope).abs() < 1e-9);

        let records = &analysis.adjustments.as_ref().unwrap().records;
        let older = &records[0];
        let recent = &records[1];
        assert_eq!(recent.days_diff, 5);
        assert!(!recent.time.is_applied());
        assert_eq!(recent.adjusted_price, 406_000.0);
        assert_eq!(older.days_diff, 60);
        assert!((older.time.amount - slope * 60.0).abs() < 1e-6);

        // Identical areas leave no marginal value to size adjust with
        let summary = &analysis.adjustments.as_ref().unwrap().summary;
        assert_eq!(summary.marginal_value_per_area, None);
        assert_eq!(summary.counts.time_only, 1);
        assert_eq!(summary.counts.none, 1);

        // Under two months of coverage supports no window, not even 0-3 months
        assert!(analysis.validation.valid_periods.is_empty());
        assert_eq!(analysis.validation.omitted_periods.len(), 9);
        assert!(analysis
            .validation
            .omitted_periods
            .iter()
            .all(|p| matches!(p.reason, OmissionReason::BeyondCoverage { .. })));
    }

    #[test]
    fn test_six_months_of_coverage() {
        let span = (6.0 * 30.44) as u64;
        let sales: Vec<(u64, f64, &str)> = (0..=span)
            .step_by(10)
            .chain(std::iter::once(span))
            .map(|d| (d, 400_000.0 + d as f64 * 10.0, "1900"))
            .collect();

        let analysis = run_analysis(&table(&sales), &AnalysisConfig::new(subject())).unwrap();
        let validation = &analysis.validation;

        assert!(validation.valid_periods.iter().all(|p| p.months <= 7));
        for omitted in validation.omitted_periods.iter().filter(|p| p.months > 7) {
            assert!(matches!(omitted.reason, OmissionReason::BeyondCoverage { .. }));
        }
    }

    #[test]
    fn test_no_sales_before_date_of_value() {
        let analysis = run_analysis(
            &table(&[]),
            &AnalysisConfig::new(subject()),
        )
        .unwrap();

        assert!(analysis.sales.is_empty());
        assert_eq!(
            analysis.validation.message.as_deref(),
            Some("No sales on or before date of value")
        );
        assert!(analysis.validation.valid_periods.is_empty());
        assert!(analysis.period_statistics.is_empty());
        assert_eq!(
            analysis.validation.trend_results.market_trend,
            MarketTrend::InsufficientData
        );
        assert!(analysis.adjustments.is_none());
    }

    #[test]
    fn test_missing_required_column() {
        let table = RawTable::new(
            vec!["Close Date".to_string(), "Close Price".to_string()],
            vec![vec!["01/15/2024".to_string(), "400000".to_string()]],
        );

        let err = run_analysis(&table, &AnalysisConfig::new(subject())).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::MissingColumn {
                field: CanonicalField::LivingArea,
                ..
            }
        ));
        assert!(err.to_string().contains("living_area"));
    }

    #[test]
    fn test_column_override() {
        let table = RawTable::new(
            vec![
                "Contract Amount".to_string(),
                "Recorded".to_string(),
                "Heated Area".to_string(),
            ],
            vec![
                vec!["400000".to_string(), "2024-01-15".to_string(), "2000".to_string()],
                vec!["410000".to_string(), "2024-03-15".to_string(), "2100".to_string()],
            ],
        );

        let mut config = AnalysisConfig::new(subject());
        config.column_overrides = BTreeMap::from([
            (CanonicalField::SalePrice, "Contract Amount".to_string()),
            (CanonicalField::SaleDate, "Recorded".to_string()),
            (CanonicalField::LivingArea, "heated area".to_string()),
        ]);

        let analysis = run_analysis(&table, &config).unwrap();
        assert_eq!(analysis.sales.len(), 2);
        assert_eq!(analysis.sales[1].price_per_area, Some(410_000.0 / 2100.0));

        // The report records which header fed each field and how it was matched
        let mapped = &analysis.validation.column_mapping;
        assert_eq!(mapped.len(), 3);
        let area = &mapped[&CanonicalField::LivingArea];
        assert_eq!(area.header, "Heated Area");
        assert_eq!(area.index, 2);
        assert_eq!(area.source, MatchSource::Override);
        assert!(analysis.validation.unmapped_fields.contains(&CanonicalField::Bedrooms));
        assert!(!analysis.validation.unmapped_fields.contains(&CanonicalField::SalePrice));
    }

    #[test]
    fn test_form_sections_reach_the_report() {
        let inputs = AnalysisInputs::from_json_str(
            r#"{
                "effective_date": "2024-06-01",
                "living_area": 2000,
                "appraiser_name": "J. Smith",
                "file_number": "F-17",
                "property_type": "Condo",
                "filter_mls_area": "North"
            }"#,
        )
        .unwrap();
        let config = AnalysisConfig::from_inputs(&inputs).unwrap();

        let analysis = run_analysis(&table(&[(30, 400_000.0, "2000")]), &config).unwrap();
        let validation = &analysis.validation;
        assert_eq!(validation.report_info.appraiser_name.as_deref(), Some("J. Smith"));
        assert_eq!(validation.report_info.file_number.as_deref(), Some("F-17"));
        assert_eq!(validation.market_segment.property_type.as_deref(), Some("Condo"));
        assert_eq!(validation.market_segment.mls_area.as_deref(), Some("North"));

        // Mapping is reported even when no sales survive
        let empty = run_analysis(&table(&[]), &config).unwrap();
        assert!(empty.validation.message.is_some());
        assert!(empty.validation.column_mapping.contains_key(&CanonicalField::SaleDate));
    }
}

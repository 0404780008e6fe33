//! Write functions - persist the analysis as CSV tables and JSON records

use crate::analysis::error::Result;
use crate::analysis::types::{
    AdjustmentRecord, MarketAnalysis, PeriodStatistics, PeriodStatus, ProcessedSale,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const PROCESSED_SALES_FILE: &str = "sales_data_processed.csv";
pub const STATISTICS_FILE: &str = "statistics_summary.csv";
pub const VALIDATION_FILE: &str = "validation_info.json";
pub const ADJUSTED_SALES_FILE: &str = "adjusted_sales.csv";
pub const ADJUSTMENT_SUMMARY_FILE: &str = "adjustment_summary.json";

// Column orders follow the row structs below; serde only emits them with a first row
const PROCESSED_SALES_HEADER: &[&str] = &[
    "row",
    "listing_id",
    "address",
    "status",
    "sale_date",
    "sale_price",
    "living_area",
    "price_per_area",
    "days_from_value",
    "bedrooms",
    "bathrooms",
    "days_on_market",
    "zip",
];

const STATISTICS_HEADER: &[&str] = &[
    "period",
    "months",
    "sales_count",
    "status",
    "absorption_rate",
    "months_of_inventory",
    "mean_price",
    "median_price",
    "std_price",
    "min_price",
    "max_price",
    "mean_price_per_area",
    "median_price_per_area",
    "std_price_per_area",
    "mean_days_on_market",
    "median_days_on_market",
];

const ADJUSTED_SALES_HEADER: &[&str] = &[
    "row",
    "listing_id",
    "address",
    "sale_date",
    "sale_price",
    "living_area",
    "days_diff",
    "time_adjustment",
    "time_adjustment_pct",
    "area_difference",
    "area_difference_pct",
    "size_adjustment",
    "size_adjustment_pct",
    "net_adjustment",
    "net_adjustment_pct",
    "adjusted_price",
    "adjusted_price_per_area",
];

#[derive(Debug, Serialize)]
struct ProcessedSaleRow<'a> {
    row: usize,
    listing_id: Option<&'a str>,
    address: Option<&'a str>,
    status: Option<String>,
    sale_date: NaiveDate,
    sale_price: f64,
    living_area: Option<f64>,
    price_per_area: Option<f64>,
    days_from_value: i64,
    bedrooms: Option<f64>,
    bathrooms: Option<f64>,
    days_on_market: Option<f64>,
    zip: Option<&'a str>,
}

impl<'a> From<&'a ProcessedSale> for ProcessedSaleRow<'a> {
    fn from(s: &'a ProcessedSale) -> Self {
        Self {
            row: s.sale.row,
            listing_id: s.sale.listing_id.as_deref(),
            address: s.sale.address.as_deref(),
            status: s.sale.status.as_ref().map(|st| st.to_string()),
            sale_date: s.sale.sale_date,
            sale_price: s.sale.sale_price,
            living_area: s.sale.living_area,
            price_per_area: s.price_per_area,
            days_from_value: s.days_from_value,
            bedrooms: s.sale.bedrooms,
            bathrooms: s.sale.bathrooms,
            days_on_market: s.sale.days_on_market,
            zip: s.sale.zip.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PeriodStatisticsRow<'a> {
    period: &'a str,
    months: u32,
    sales_count: usize,
    status: &'static str,
    absorption_rate: f64,
    months_of_inventory: Option<f64>,
    mean_price: Option<f64>,
    median_price: Option<f64>,
    std_price: Option<f64>,
    min_price: Option<f64>,
    max_price: Option<f64>,
    mean_price_per_area: Option<f64>,
    median_price_per_area: Option<f64>,
    std_price_per_area: Option<f64>,
    mean_days_on_market: Option<f64>,
    median_days_on_market: Option<f64>,
}

impl<'a> From<&'a PeriodStatistics> for PeriodStatisticsRow<'a> {
    fn from(p: &'a PeriodStatistics) -> Self {
        Self {
            period: &p.name,
            months: p.months,
            sales_count: p.sales_count,
            status: match p.status {
                PeriodStatus::Valid => "valid",
                PeriodStatus::InsufficientData => "insufficient data",
            },
            absorption_rate: p.absorption_rate,
            months_of_inventory: p.months_of_inventory,
            mean_price: p.price.mean,
            median_price: p.price.median,
            std_price: p.price.std_dev,
            min_price: p.price.min,
            max_price: p.price.max,
            mean_price_per_area: p.price_per_area.mean,
            median_price_per_area: p.price_per_area.median,
            std_price_per_area: p.price_per_area.std_dev,
            mean_days_on_market: p.days_on_market.and_then(|d| d.mean),
            median_days_on_market: p.days_on_market.and_then(|d| d.median),
        }
    }
}

#[derive(Debug, Serialize)]
struct AdjustedSaleRow<'a> {
    row: usize,
    listing_id: Option<&'a str>,
    address: Option<&'a str>,
    sale_date: NaiveDate,
    sale_price: f64,
    living_area: Option<f64>,
    days_diff: i64,
    time_adjustment: f64,
    time_adjustment_pct: f64,
    area_difference: Option<f64>,
    area_difference_pct: Option<f64>,
    size_adjustment: f64,
    size_adjustment_pct: f64,
    net_adjustment: f64,
    net_adjustment_pct: f64,
    adjusted_price: f64,
    adjusted_price_per_area: Option<f64>,
}

impl<'a> From<&'a AdjustmentRecord> for AdjustedSaleRow<'a> {
    fn from(r: &'a AdjustmentRecord) -> Self {
        Self {
            row: r.sale.sale.row,
            listing_id: r.sale.sale.listing_id.as_deref(),
            address: r.sale.sale.address.as_deref(),
            sale_date: r.sale.sale.sale_date,
            sale_price: r.sale.sale.sale_price,
            living_area: r.sale.sale.living_area,
            days_diff: r.days_diff,
            time_adjustment: r.time.amount,
            time_adjustment_pct: r.time.pct,
            area_difference: r.area_difference,
            area_difference_pct: r.area_difference_pct,
            size_adjustment: r.size.amount,
            size_adjustment_pct: r.size.pct,
            net_adjustment: r.net_amount,
            net_adjustment_pct: r.net_pct,
            adjusted_price: r.adjusted_price,
            adjusted_price_per_area: r.adjusted_price_per_area,
        }
    }
}

/// Write every artifact for one analysis; returns the files written, in order
pub fn write_outputs(dir: &Path, analysis: &MarketAnalysis) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let path = dir.join(PROCESSED_SALES_FILE);
    write_csv(
        &path,
        PROCESSED_SALES_HEADER,
        analysis.sales.iter().map(ProcessedSaleRow::from),
    )?;
    written.push(path);

    if !analysis.period_statistics.is_empty() {
        let path = dir.join(STATISTICS_FILE);
        write_csv(
            &path,
            STATISTICS_HEADER,
            analysis.period_statistics.iter().map(PeriodStatisticsRow::from),
        )?;
        written.push(path);
    }

    let path = dir.join(VALIDATION_FILE);
    write_json(&path, &analysis.validation)?;
    written.push(path);

    if let Some(adjustments) = &analysis.adjustments {
        let path = dir.join(ADJUSTED_SALES_FILE);
        write_csv(
            &path,
            ADJUSTED_SALES_HEADER,
            adjustments.records.iter().map(AdjustedSaleRow::from),
        )?;
        written.push(path);

        let path = dir.join(ADJUSTMENT_SUMMARY_FILE);
        write_json(&path, &adjustments.summary)?;
        written.push(path);
    }

    info!("Wrote {} files to {:?}", written.len(), dir);

    Ok(written)
}

fn write_csv<T: Serialize>(
    path: &Path,
    header: &[&str],
    rows: impl Iterator<Item = T>,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut count = 0;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    if count == 0 {
        writer.write_record(header)?;
    }
    writer.flush()?;

    info!("Wrote {} rows to {:?}", count, path);
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

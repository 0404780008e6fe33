//! Parse functions - turn raw table rows into processed sale records

use crate::analysis::columns::ColumnMapping;
use crate::analysis::types::{
    CanonicalField, DropReason, DroppedRow, ListingStatus, LoadStats, ProcessedSale, RawTable,
    SaleRecord, SubjectDetails,
};
use crate::analysis::utils::{
    non_empty, normalize_header, normalize_status, parse_number, parse_positive, parse_sale_date,
};
use crate::price_per_area;
use chrono::NaiveDate;
use tracing::{info, warn};

/// Only the first few drops are logged individually
const MAX_LOGGED_DROPS: usize = 10;

/// Recognizes rows describing the subject rather than a comparable sale
///
/// A row is the subject when its status normalizes to Subject, when any cell
/// reads SUBJECT, or when an IsSubject column holds 1/true/yes/y.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubjectMarker {
    flag_column: Option<usize>,
}

impl SubjectMarker {
    pub fn new(table: &RawTable) -> Self {
        Self {
            flag_column: table
                .headers
                .iter()
                .position(|h| normalize_header(h) == "issubject"),
        }
    }

    pub fn marks(&self, table: &RawTable, idx: usize, status: Option<&ListingStatus>) -> bool {
        if status == Some(&ListingStatus::Subject) {
            return true;
        }

        let flagged = self
            .flag_column
            .and_then(|col| table.cell(idx, col))
            .is_some_and(|v| {
                matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "y")
            });

        flagged
            || table.rows.get(idx).is_some_and(|row| {
                row.iter().any(|cell| cell.trim().eq_ignore_ascii_case("subject"))
            })
    }
}

/// Parse, filter and enrich every row; returns sales sorted by date plus the accounting
pub fn load_sales(
    table: &RawTable,
    mapping: &ColumnMapping,
    date_of_value: NaiveDate,
) -> (Vec<ProcessedSale>, LoadStats) {
    info!("Loading {} rows against date of value {}", table.rows.len(), date_of_value);

    let mut stats = LoadStats {
        total_rows: table.rows.len(),
        ..LoadStats::default()
    };
    let mut sales = Vec::new();
    let marker = SubjectMarker::new(table);

    for idx in 0..table.rows.len() {
        let row_number = idx + 1;
        let status = text(table, mapping, idx, CanonicalField::Status).and_then(|s| normalize_status(&s));
        if status == Some(ListingStatus::Active) {
            stats.active_listings += 1;
        }

        match parse_row(table, mapping, &marker, idx, status) {
            Ok(record) if record.sale_date > date_of_value => {
                drop_row(&mut stats, row_number, DropReason::AfterDateOfValue(record.sale_date));
            }
            Ok(record) => sales.push(process_sale(record, date_of_value)),
            Err(reason) => drop_row(&mut stats, row_number, reason),
        }
    }

    // Stable sort keeps input order among same-day sales
    sales.sort_by_key(|s| s.sale.sale_date);
    stats.retained = sales.len();

    info!("Loaded sales: {}", stats);
    if stats.dropped.len() > MAX_LOGGED_DROPS {
        warn!(
            "{} further dropped rows not logged individually",
            stats.dropped.len() - MAX_LOGGED_DROPS
        );
    }

    (sales, stats)
}

fn drop_row(stats: &mut LoadStats, row: usize, reason: DropReason) {
    if stats.dropped.len() < MAX_LOGGED_DROPS {
        warn!("Dropping row {}: {}", row, reason);
    }
    stats.dropped.push(DroppedRow { row, reason });
}

/// Parse one row into a sale record, or say why it cannot be one
pub fn parse_row(
    table: &RawTable,
    mapping: &ColumnMapping,
    marker: &SubjectMarker,
    idx: usize,
    status: Option<ListingStatus>,
) -> Result<SaleRecord, DropReason> {
    if marker.marks(table, idx, status.as_ref()) {
        return Err(DropReason::SubjectRow);
    }

    let raw_date = raw(table, mapping, idx, CanonicalField::SaleDate).unwrap_or("");
    let sale_date =
        parse_sale_date(raw_date).ok_or_else(|| DropReason::UnparseableDate(raw_date.to_string()))?;

    let raw_price = raw(table, mapping, idx, CanonicalField::SalePrice).unwrap_or("");
    let sale_price =
        parse_positive(raw_price).ok_or_else(|| DropReason::UnusablePrice(raw_price.to_string()))?;

    Ok(SaleRecord {
        row: idx + 1,
        sale_date,
        sale_price,
        living_area: raw(table, mapping, idx, CanonicalField::LivingArea).and_then(parse_positive),
        bedrooms: number(table, mapping, idx, CanonicalField::Bedrooms),
        bathrooms: number(table, mapping, idx, CanonicalField::Bathrooms),
        garage: number(table, mapping, idx, CanonicalField::Garage),
        year_built: number(table, mapping, idx, CanonicalField::YearBuilt).map(|y| y as i32),
        lot_size: number(table, mapping, idx, CanonicalField::LotSize),
        days_on_market: number(table, mapping, idx, CanonicalField::DaysOnMarket),
        cumulative_days_on_market: number(
            table,
            mapping,
            idx,
            CanonicalField::CumulativeDaysOnMarket,
        ),
        status,
        listing_id: text(table, mapping, idx, CanonicalField::ListingId),
        address: text(table, mapping, idx, CanonicalField::Address),
        zip: text(table, mapping, idx, CanonicalField::Zip),
        latitude: number(table, mapping, idx, CanonicalField::Latitude),
        longitude: number(table, mapping, idx, CanonicalField::Longitude),
    })
}

/// Derive the per-sale metrics relative to the date of value
pub fn process_sale(sale: SaleRecord, date_of_value: NaiveDate) -> ProcessedSale {
    let price_per_area = sale
        .living_area
        .and_then(|area| price_per_area(sale.sale_price, area));
    let days_from_value = (date_of_value - sale.sale_date).num_days();

    ProcessedSale {
        sale,
        price_per_area,
        days_from_value,
    }
}

/// Subject characteristics from a property table: the flagged subject row, else the first row
pub fn subject_details(table: &RawTable) -> Option<SubjectDetails> {
    let mapping = ColumnMapping::detect(&table.headers);
    let marker = SubjectMarker::new(table);

    let idx = (0..table.rows.len())
        .find(|&idx| {
            let status = text(table, &mapping, idx, CanonicalField::Status)
                .and_then(|s| normalize_status(&s));
            marker.marks(table, idx, status.as_ref())
        })
        .or_else(|| (!table.rows.is_empty()).then_some(0))?;

    let details = SubjectDetails {
        address: text(table, &mapping, idx, CanonicalField::Address),
        living_area: raw(table, &mapping, idx, CanonicalField::LivingArea).and_then(parse_positive),
        bedrooms: number(table, &mapping, idx, CanonicalField::Bedrooms),
        bathrooms: number(table, &mapping, idx, CanonicalField::Bathrooms),
        garage: number(table, &mapping, idx, CanonicalField::Garage),
        year_built: number(table, &mapping, idx, CanonicalField::YearBuilt),
    };
    info!("Subject details from row {}: {:?}", idx + 1, details);

    Some(details)
}

fn raw<'a>(
    table: &'a RawTable,
    mapping: &ColumnMapping,
    idx: usize,
    field: CanonicalField,
) -> Option<&'a str> {
    mapping.index(field).and_then(|col| table.cell(idx, col))
}

fn number(table: &RawTable, mapping: &ColumnMapping, idx: usize, field: CanonicalField) -> Option<f64> {
    raw(table, mapping, idx, field).and_then(parse_number)
}

fn text(table: &RawTable, mapping: &ColumnMapping, idx: usize, field: CanonicalField) -> Option<String> {
    raw(table, mapping, idx, field).and_then(non_empty)
}

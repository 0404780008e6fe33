//! Core data types for the analysis pipeline
//! Pure data structures with no behavior beyond formatting and small accessors

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Raw input bytes, tagged by the reader that understands them
#[derive(Debug)]
pub enum RawData {
    Csv(Vec<u8>),
    Workbook(Vec<u8>),
}

impl RawData {
    pub fn len(&self) -> usize {
        match self {
            RawData::Csv(bytes) | RawData::Workbook(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Header row plus string cells, whatever the source format was
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Cell at (row, column); short rows read as missing
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(|s| s.as_str())
    }
}

/// Canonical field names the column mapper resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    SalePrice,
    SaleDate,
    LivingArea,
    Bedrooms,
    Bathrooms,
    Status,
    ListingId,
    Address,
    Latitude,
    Longitude,
    YearBuilt,
    LotSize,
    Zip,
    DaysOnMarket,
    CumulativeDaysOnMarket,
    Garage,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 16] = [
        CanonicalField::SalePrice,
        CanonicalField::SaleDate,
        CanonicalField::LivingArea,
        CanonicalField::Bedrooms,
        CanonicalField::Bathrooms,
        CanonicalField::Status,
        CanonicalField::ListingId,
        CanonicalField::Address,
        CanonicalField::Latitude,
        CanonicalField::Longitude,
        CanonicalField::YearBuilt,
        CanonicalField::LotSize,
        CanonicalField::Zip,
        CanonicalField::DaysOnMarket,
        CanonicalField::CumulativeDaysOnMarket,
        CanonicalField::Garage,
    ];

    /// Fields the loader cannot run without
    pub const REQUIRED: [CanonicalField; 3] = [
        CanonicalField::SalePrice,
        CanonicalField::SaleDate,
        CanonicalField::LivingArea,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::SalePrice => "sale_price",
            CanonicalField::SaleDate => "sale_date",
            CanonicalField::LivingArea => "living_area",
            CanonicalField::Bedrooms => "bedrooms",
            CanonicalField::Bathrooms => "bathrooms",
            CanonicalField::Status => "status",
            CanonicalField::ListingId => "listing_id",
            CanonicalField::Address => "address",
            CanonicalField::Latitude => "latitude",
            CanonicalField::Longitude => "longitude",
            CanonicalField::YearBuilt => "year_built",
            CanonicalField::LotSize => "lot_size",
            CanonicalField::Zip => "zip",
            CanonicalField::DaysOnMarket => "days_on_market",
            CanonicalField::CumulativeDaysOnMarket => "cumulative_days_on_market",
            CanonicalField::Garage => "garage",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CanonicalField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        CanonicalField::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == key)
            .ok_or_else(|| s.to_string())
    }
}

/// How a canonical field found its column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Override,
    Alias,
    Keyword,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedColumn {
    pub index: usize,
    pub header: String,
    pub source: MatchSource,
}

/// Normalized listing status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ListingStatus {
    Active,
    Pending,
    Closed,
    Subject,
    Other(String),
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListingStatus::Active => write!(f, "Active"),
            ListingStatus::Pending => write!(f, "Pending"),
            ListingStatus::Closed => write!(f, "Closed"),
            ListingStatus::Subject => write!(f, "Subject"),
            ListingStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// One comparable transaction as parsed from a single input row
#[derive(Debug, Clone, PartialEq)]
pub struct SaleRecord {
    /// 1-based data row number in the input (header excluded)
    pub row: usize,
    pub sale_date: NaiveDate,
    pub sale_price: f64,
    pub living_area: Option<f64>,

    pub bedrooms: Option<f64>,
    pub bathrooms: Option<f64>,
    pub garage: Option<f64>,
    pub year_built: Option<i32>,
    pub lot_size: Option<f64>,
    pub days_on_market: Option<f64>,
    pub cumulative_days_on_market: Option<f64>,

    pub status: Option<ListingStatus>,
    pub listing_id: Option<String>,
    pub address: Option<String>,
    pub zip: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Sale record plus the metrics derived relative to the date of value
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedSale {
    pub sale: SaleRecord,
    pub price_per_area: Option<f64>,
    pub days_from_value: i64,
}

/// Why an input row did not make it into the processed sales
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DropReason {
    SubjectRow,
    UnparseableDate(String),
    UnusablePrice(String),
    AfterDateOfValue(NaiveDate),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::SubjectRow => write!(f, "row is marked as the subject property"),
            DropReason::UnparseableDate(raw) => write!(f, "unparseable sale date '{}'", raw),
            DropReason::UnusablePrice(raw) => write!(f, "unusable sale price '{}'", raw),
            DropReason::AfterDateOfValue(date) => {
                write!(f, "sale date {} is after the date of value", date)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedRow {
    pub row: usize,
    #[serde(serialize_with = "serialize_display")]
    pub reason: DropReason,
}

/// Loader accounting - nothing is dropped without a trace
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct LoadStats {
    pub total_rows: usize,
    pub retained: usize,
    pub active_listings: usize,
    pub dropped: Vec<DroppedRow>,
}

impl LoadStats {
    pub fn count_where(&self, predicate: impl Fn(&DropReason) -> bool) -> usize {
        self.dropped.iter().filter(|d| predicate(&d.reason)).count()
    }

    pub fn unparseable_dates(&self) -> usize {
        self.count_where(|r| matches!(r, DropReason::UnparseableDate(_)))
    }

    pub fn unusable_prices(&self) -> usize {
        self.count_where(|r| matches!(r, DropReason::UnusablePrice(_)))
    }

    pub fn after_date_of_value(&self) -> usize {
        self.count_where(|r| matches!(r, DropReason::AfterDateOfValue(_)))
    }

    pub fn subject_rows(&self) -> usize {
        self.count_where(|r| matches!(r, DropReason::SubjectRow))
    }
}

impl fmt::Display for LoadStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows: {}, retained: {}, bad dates: {}, bad prices: {}, after date of value: {}, subject rows: {}",
            self.total_rows,
            self.retained,
            self.unparseable_dates(),
            self.unusable_prices(),
            self.after_date_of_value(),
            self.subject_rows()
        )
    }
}

/// The property being valued
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectProperty {
    pub address: Option<String>,
    pub living_area: f64,
    pub bedrooms: Option<f64>,
    pub bathrooms: Option<f64>,
    pub garage: Option<f64>,
    pub year_built: Option<i32>,
    pub date_of_value: NaiveDate,
}

/// Subject characteristics read from a one-row property table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectDetails {
    pub address: Option<String>,
    pub living_area: Option<f64>,
    pub bedrooms: Option<f64>,
    pub bathrooms: Option<f64>,
    pub garage: Option<f64>,
    pub year_built: Option<f64>,
}

/// Materiality thresholds for the adjustment engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub time_adjustment_days: i64,
    #[serde(rename = "sf_adjustment_pct")]
    pub size_adjustment_pct: f64,
}

/// Who prepared the report; carried into the validation record untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportInfo {
    #[serde(default, deserialize_with = "lenient_text")]
    pub appraiser_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub appraiser_credentials: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub file_number: Option<String>,
}

/// Market segment criteria from the intake form, written under their report labels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSegment {
    #[serde(
        default,
        rename(serialize = "Property Type", deserialize = "property_type"),
        deserialize_with = "lenient_text"
    )]
    pub property_type: Option<String>,
    #[serde(
        default,
        rename(serialize = "County", deserialize = "filter_county"),
        deserialize_with = "lenient_text"
    )]
    pub county: Option<String>,
    #[serde(
        default,
        rename(serialize = "City", deserialize = "filter_city"),
        deserialize_with = "lenient_text"
    )]
    pub city: Option<String>,
    #[serde(
        default,
        rename(serialize = "State", deserialize = "filter_state"),
        deserialize_with = "lenient_text"
    )]
    pub state: Option<String>,
    #[serde(
        default,
        rename(serialize = "Zip", deserialize = "filter_zip"),
        deserialize_with = "lenient_text"
    )]
    pub zip: Option<String>,
    #[serde(
        default,
        rename(serialize = "MLS Area", deserialize = "filter_mls_area"),
        deserialize_with = "lenient_text"
    )]
    pub mls_area: Option<String>,
    #[serde(
        default,
        rename(serialize = "Bedrooms", deserialize = "filter_bedrooms"),
        deserialize_with = "lenient_text"
    )]
    pub bedrooms: Option<String>,
    #[serde(
        default,
        rename(serialize = "Bathrooms", deserialize = "filter_bathrooms"),
        deserialize_with = "lenient_text"
    )]
    pub bathrooms: Option<String>,
    #[serde(
        default,
        rename(serialize = "Living Area Range", deserialize = "filter_living_area"),
        deserialize_with = "lenient_text"
    )]
    pub living_area_range: Option<String>,
    #[serde(
        default,
        rename(serialize = "Lot Size", deserialize = "filter_lot_size"),
        deserialize_with = "lenient_text"
    )]
    pub lot_size: Option<String>,
    #[serde(
        default,
        rename(serialize = "Transaction Type", deserialize = "transaction_type"),
        deserialize_with = "lenient_text"
    )]
    pub transaction_type: Option<String>,
    #[serde(
        default,
        rename(serialize = "Date Range", deserialize = "transaction_date_range"),
        deserialize_with = "lenient_text"
    )]
    pub date_range: Option<String>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            time_adjustment_days: 30,
            size_adjustment_pct: 5.0,
        }
    }
}

/// Which sales feed the adjustment engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparableScope {
    #[default]
    TrendWindow,
    AllSales,
}

/// One rung of the trailing-window ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodDefinition {
    pub name: String,
    pub months: u32,
}

impl PeriodDefinition {
    pub fn new(name: impl Into<String>, months: u32) -> Self {
        Self {
            name: name.into(),
            months,
        }
    }
}

/// Advisory flag on an accepted period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    Valid,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidPeriod {
    pub name: String,
    pub months: u32,
    pub sales_count: usize,
    pub cutoff_date: NaiveDate,
    pub status: PeriodStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OmissionReason {
    BeyondCoverage { coverage_months: f64 },
    DuplicateCount { previous: String, sales_count: usize },
}

impl fmt::Display for OmissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OmissionReason::BeyondCoverage { coverage_months } => write!(
                f,
                "extends beyond data coverage ({:.1} months)",
                coverage_months
            ),
            OmissionReason::DuplicateCount {
                previous,
                sales_count,
            } => write!(
                f,
                "identical sales count to {} (n={})",
                previous, sales_count
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OmittedPeriod {
    pub name: String,
    pub months: u32,
    pub sales_count: usize,
    #[serde(serialize_with = "serialize_display")]
    pub reason: OmissionReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodValidation {
    pub valid: Vec<ValidPeriod>,
    pub omitted: Vec<OmittedPeriod>,
}

/// Ordinary least squares line
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    pub observations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MarketTrend {
    #[serde(rename = "INCREASING")]
    Increasing,
    #[serde(rename = "DECREASING")]
    Decreasing,
    #[serde(rename = "UNSTABLE")]
    Unstable,
    #[serde(rename = "STABLE")]
    Stable,
    #[serde(rename = "INSUFFICIENT DATA")]
    InsufficientData,
}

impl fmt::Display for MarketTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketTrend::Increasing => write!(f, "INCREASING"),
            MarketTrend::Decreasing => write!(f, "DECREASING"),
            MarketTrend::Unstable => write!(f, "UNSTABLE"),
            MarketTrend::Stable => write!(f, "STABLE"),
            MarketTrend::InsufficientData => write!(f, "INSUFFICIENT DATA"),
        }
    }
}

/// Regression-based market trend over the chosen window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendResult {
    /// Accepted period the window came from; None means all clean sales
    pub window: Option<String>,
    pub window_start: Option<NaiveDate>,
    pub observations: usize,
    pub price_fit: LinearFit,
    pub price_per_area_fit: LinearFit,
    pub daily_change: f64,
    pub monthly_change_pct: f64,
    pub daily_change_per_area: f64,
    pub monthly_change_per_area_pct: f64,
    /// Compounded %/month from a log-price fit, when one could be made
    pub compounded_monthly_pct: Option<f64>,
    pub market_trend: MarketTrend,
}

impl TrendResult {
    pub fn insufficient(window: Option<String>, observations: usize) -> Self {
        Self {
            window,
            window_start: None,
            observations,
            price_fit: LinearFit::default(),
            price_per_area_fit: LinearFit::default(),
            daily_change: 0.0,
            monthly_change_pct: 0.0,
            daily_change_per_area: 0.0,
            monthly_change_per_area_pct: 0.0,
            compounded_monthly_pct: None,
            market_trend: MarketTrend::InsufficientData,
        }
    }
}

/// One adjustment component; zero amount means not applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Adjustment {
    pub amount: f64,
    pub pct: f64,
}

impl Adjustment {
    pub const NONE: Adjustment = Adjustment {
        amount: 0.0,
        pct: 0.0,
    };

    pub fn is_applied(&self) -> bool {
        self.amount != 0.0
    }
}

/// One comparable after time and size adjustment
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentRecord {
    pub sale: ProcessedSale,
    pub days_diff: i64,
    pub time: Adjustment,
    pub area_difference: Option<f64>,
    pub area_difference_pct: Option<f64>,
    pub size: Adjustment,
    pub net_amount: f64,
    pub net_pct: f64,
    pub adjusted_price: f64,
    pub adjusted_price_per_area: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdjustmentCounts {
    pub time_only: usize,
    pub size_only: usize,
    pub both: usize,
    pub none: usize,
}

/// Descriptive statistics for one numeric series
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SeriesStats {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    /// Sample standard deviation (N-1); None for fewer than two values
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ComparableStatistics {
    pub price: SeriesStats,
    pub price_per_area: SeriesStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustmentSummary {
    pub subject_living_area: f64,
    pub thresholds: Thresholds,
    pub comparables: usize,
    pub marginal_value_per_area: Option<f64>,
    pub marginal_value_r_squared: Option<f64>,
    pub monthly_change_pct: f64,
    pub daily_change: f64,
    pub counts: AdjustmentCounts,
    pub mean_time_adjustment: Option<f64>,
    pub mean_size_adjustment: Option<f64>,
    pub mean_net_adjustment: Option<f64>,
    pub unadjusted: ComparableStatistics,
    pub adjusted: ComparableStatistics,
    pub mean_price_change_pct: Option<f64>,
    pub median_price_change_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentAnalysis {
    pub records: Vec<AdjustmentRecord>,
    pub summary: AdjustmentSummary,
}

/// Statistics for one accepted period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStatistics {
    pub name: String,
    pub months: u32,
    pub sales_count: usize,
    pub absorption_rate: f64,
    pub months_of_inventory: Option<f64>,
    pub price: SeriesStats,
    pub price_per_area: SeriesStats,
    pub days_on_market: Option<SeriesStats>,
    pub status: PeriodStatus,
}

/// Validation/configuration record handed to report generators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub date_of_value: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub earliest_sale: Option<NaiveDate>,
    pub latest_sale: Option<NaiveDate>,
    pub actual_coverage_days: Option<i64>,
    pub actual_coverage_months: Option<f64>,
    pub valid_periods: Vec<ValidPeriod>,
    pub omitted_periods: Vec<OmittedPeriod>,
    pub trend_results: TrendResult,
    pub subject_property: SubjectProperty,
    pub report_info: ReportInfo,
    pub thresholds: Thresholds,
    pub market_segment: MarketSegment,
    pub column_mapping: BTreeMap<CanonicalField, ResolvedColumn>,
    pub unmapped_fields: Vec<CanonicalField>,
    pub load: LoadStats,
}

/// Everything one run produces
#[derive(Debug, Clone, PartialEq)]
pub struct MarketAnalysis {
    pub sales: Vec<ProcessedSale>,
    pub validation: ValidationReport,
    pub period_statistics: Vec<PeriodStatistics>,
    pub adjustments: Option<AdjustmentAnalysis>,
}

pub(crate) fn serialize_display<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: fmt::Display,
    S: Serializer,
{
    serializer.collect_str(value)
}

/// Accept "text", 42 or 4.5 as text; blank reads as missing
pub(crate) fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TextOrNumber {
        Text(String),
        Integer(i64),
        Number(f64),
    }

    Ok(match Option::<TextOrNumber>::deserialize(deserializer)? {
        Some(TextOrNumber::Text(s)) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Some(TextOrNumber::Integer(n)) => Some(n.to_string()),
        Some(TextOrNumber::Number(n)) => Some(n.to_string()),
        None => None,
    })
}

//! Form inputs - subject property, thresholds and column overrides from the form JSON

use crate::analysis::error::{AnalysisError, Result};
use crate::analysis::fetch::read_sales_table;
use crate::analysis::parse::subject_details;
use crate::analysis::periods::default_ladder;
use crate::analysis::types::{
    CanonicalField, ComparableScope, MarketSegment, PeriodDefinition, ReportInfo, SubjectDetails,
    SubjectProperty, Thresholds,
};
use crate::analysis::utils::{parse_number, parse_sale_date};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Form inputs as saved by the intake form; alternate key spellings are accepted
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisInputs {
    #[serde(default, alias = "date_of_value")]
    pub effective_date: Option<String>,

    #[serde(
        default,
        alias = "subject_gla",
        alias = "subject_living_area",
        alias = "subject_livingarea",
        deserialize_with = "lenient_number"
    )]
    pub living_area: Option<f64>,

    #[serde(
        default,
        alias = "subject_bedrooms",
        alias = "subject_beds",
        deserialize_with = "lenient_number"
    )]
    pub bedrooms_total: Option<f64>,

    #[serde(
        default,
        alias = "subject_bathrooms",
        alias = "subject_baths",
        deserialize_with = "lenient_number"
    )]
    pub bathrooms_total: Option<f64>,

    #[serde(
        default,
        alias = "subject_garage",
        deserialize_with = "lenient_number"
    )]
    pub garage_spaces: Option<f64>,

    #[serde(default, deserialize_with = "lenient_number")]
    pub year_built: Option<f64>,

    #[serde(default, alias = "subject_address")]
    pub address: Option<String>,

    #[serde(
        default,
        alias = "adjustment_threshold",
        deserialize_with = "lenient_number"
    )]
    pub sf_threshold_percent: Option<f64>,

    #[serde(
        default,
        alias = "time_threshold",
        deserialize_with = "lenient_number"
    )]
    pub time_threshold_days: Option<f64>,

    #[serde(default, alias = "csv", alias = "sales_csv", alias = "data_file")]
    pub csv_path: Option<PathBuf>,

    /// One-row property table filling subject fields the form leaves empty
    #[serde(default, alias = "subject_file", alias = "subject_table")]
    pub subject_csv: Option<PathBuf>,

    /// Canonical field name -> header, taking precedence over detection
    #[serde(default)]
    pub columns: BTreeMap<String, String>,

    #[serde(default)]
    pub period_ladder: Option<Vec<PeriodDefinition>>,

    #[serde(default)]
    pub comparables: ComparableScope,

    #[serde(flatten)]
    pub report_info: ReportInfo,

    #[serde(flatten)]
    pub market_segment: MarketSegment,
}

impl AnalysisInputs {
    pub fn from_path(path: &Path) -> Result<Self> {
        info!("Loading form inputs from {:?}", path);
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a property table and fill the subject fields still missing
    pub fn load_subject_table(&mut self, path: &Path) -> Result<()> {
        info!("Loading subject details from {:?}", path);
        let table = read_sales_table(path)?;
        let details = subject_details(&table).ok_or_else(|| AnalysisError::InvalidConfig {
            field: "subject_csv",
            details: format!("{} has no data rows", path.display()),
        })?;
        self.fill_subject(&details);
        Ok(())
    }

    /// Form values win; the table only fills gaps
    pub fn fill_subject(&mut self, details: &SubjectDetails) {
        self.living_area = self.living_area.or(details.living_area);
        self.bedrooms_total = self.bedrooms_total.or(details.bedrooms);
        self.bathrooms_total = self.bathrooms_total.or(details.bathrooms);
        self.garage_spaces = self.garage_spaces.or(details.garage);
        self.year_built = self.year_built.or(details.year_built);
        if self.address.as_deref().map_or(true, |a| a.trim().is_empty()) {
            self.address = details.address.clone();
        }
    }

    pub fn date_of_value(&self) -> Result<chrono::NaiveDate> {
        let raw = self
            .effective_date
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(AnalysisError::MissingField("effective_date"))?;

        parse_sale_date(raw).ok_or_else(|| AnalysisError::InvalidConfig {
            field: "effective_date",
            details: format!("unrecognised date {:?}", raw),
        })
    }

    pub fn subject(&self) -> Result<SubjectProperty> {
        let date_of_value = self.date_of_value()?;
        let living_area = self
            .living_area
            .ok_or(AnalysisError::MissingField("living_area"))?;
        if living_area <= 0.0 {
            return Err(AnalysisError::InvalidConfig {
                field: "living_area",
                details: format!("must be positive, got {}", living_area),
            });
        }

        Ok(SubjectProperty {
            address: self.address.clone().filter(|a| !a.trim().is_empty()),
            living_area,
            bedrooms: self.bedrooms_total,
            bathrooms: self.bathrooms_total,
            garage: self.garage_spaces,
            year_built: self.year_built.map(|y| y as i32),
            date_of_value,
        })
    }

    pub fn thresholds(&self) -> Result<Thresholds> {
        let defaults = Thresholds::default();

        let time_adjustment_days = match self.time_threshold_days {
            Some(days) if days < 0.0 => {
                return Err(AnalysisError::InvalidConfig {
                    field: "time_threshold_days",
                    details: format!("must not be negative, got {}", days),
                })
            }
            Some(days) => days.trunc() as i64,
            None => defaults.time_adjustment_days,
        };

        let size_adjustment_pct = match self.sf_threshold_percent {
            Some(pct) if pct < 0.0 => {
                return Err(AnalysisError::InvalidConfig {
                    field: "sf_threshold_percent",
                    details: format!("must not be negative, got {}", pct),
                })
            }
            Some(pct) => pct,
            None => defaults.size_adjustment_pct,
        };

        Ok(Thresholds {
            time_adjustment_days,
            size_adjustment_pct,
        })
    }

    pub fn column_overrides(&self) -> Result<BTreeMap<CanonicalField, String>> {
        self.columns
            .iter()
            .map(|(field, header)| {
                field
                    .parse::<CanonicalField>()
                    .map(|f| (f, header.clone()))
                    .map_err(AnalysisError::UnknownField)
            })
            .collect()
    }

    pub fn period_ladder(&self) -> Result<Vec<PeriodDefinition>> {
        let Some(ladder) = &self.period_ladder else {
            return Ok(default_ladder());
        };

        if let Some(bad) = ladder.iter().find(|p| p.months == 0) {
            return Err(AnalysisError::InvalidConfig {
                field: "period_ladder",
                details: format!("period {:?} has zero months", bad.name),
            });
        }
        Ok(ladder.clone())
    }
}

/// Accept 1800, "1800", "1,800" or "" (as missing)
fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => Ok(Some(n)),
        Some(NumberOrText::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrText::Text(s)) => parse_number(&s)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("expected a number, got {:?}", s))),
    }
}

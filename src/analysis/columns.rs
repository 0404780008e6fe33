//! Column mapping - resolve heterogeneous MLS export headers to canonical fields
//!
//! Resolution runs in three passes, each header claimed by at most one field:
//! explicit overrides, then exact aliases (compared after stripping case and
//! punctuation), then keyword heuristics over whatever headers remain.

use crate::analysis::error::{AnalysisError, Result};
use crate::analysis::types::{CanonicalField, MatchSource, ResolvedColumn};
use crate::analysis::utils::normalize_header;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Resolved canonical field -> column lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMapping {
    resolved: BTreeMap<CanonicalField, ResolvedColumn>,
}

impl ColumnMapping {
    /// Map headers with no overrides
    pub fn detect(headers: &[String]) -> Self {
        // With no overrides nothing can fail
        Self::resolve(headers, &BTreeMap::new()).unwrap_or_default()
    }

    /// Map headers, letting explicit overrides win over detection
    pub fn resolve(
        headers: &[String],
        overrides: &BTreeMap<CanonicalField, String>,
    ) -> Result<Self> {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let mut resolved = BTreeMap::new();
        let mut claimed = HashSet::new();

        for (field, header) in overrides {
            let wanted = normalize_header(header);
            let index = normalized
                .iter()
                .position(|h| *h == wanted)
                .ok_or_else(|| AnalysisError::OverrideNotFound {
                    field: *field,
                    header: header.clone(),
                })?;

            claimed.insert(index);
            resolved.insert(*field, column(headers, index, MatchSource::Override));
        }

        for field in CanonicalField::ALL {
            if resolved.contains_key(&field) {
                continue;
            }

            let hit = aliases(field).iter().find_map(|alias| {
                let alias = normalize_header(alias);
                normalized
                    .iter()
                    .enumerate()
                    .find(|(i, h)| !claimed.contains(i) && **h == alias)
                    .map(|(i, _)| i)
            });

            if let Some(index) = hit {
                claimed.insert(index);
                resolved.insert(field, column(headers, index, MatchSource::Alias));
            }
        }

        for field in CanonicalField::ALL {
            if resolved.contains_key(&field) {
                continue;
            }

            let hit = normalized
                .iter()
                .enumerate()
                .find(|(i, h)| !claimed.contains(i) && matches_keyword(field, h))
                .map(|(i, _)| i);

            if let Some(index) = hit {
                claimed.insert(index);
                resolved.insert(field, column(headers, index, MatchSource::Keyword));
            }
        }

        for (field, col) in &resolved {
            debug!(
                "Mapped {} -> '{}' ({:?}, column {})",
                field, col.header, col.source, col.index
            );
        }

        Ok(Self { resolved })
    }

    pub fn get(&self, field: CanonicalField) -> Option<&ResolvedColumn> {
        self.resolved.get(&field)
    }

    pub fn index(&self, field: CanonicalField) -> Option<usize> {
        self.get(field).map(|c| c.index)
    }

    pub fn unresolved(&self) -> Vec<CanonicalField> {
        CanonicalField::ALL
            .iter()
            .copied()
            .filter(|f| !self.resolved.contains_key(f))
            .collect()
    }

    /// Fail on the first required field that did not resolve
    pub fn require(&self, fields: &[CanonicalField], headers: &[String]) -> Result<()> {
        match fields.iter().find(|f| !self.resolved.contains_key(f)) {
            Some(field) => Err(AnalysisError::MissingColumn {
                field: *field,
                headers: headers.join(", "),
            }),
            None => Ok(()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CanonicalField, &ResolvedColumn)> {
        self.resolved.iter()
    }
}

fn column(headers: &[String], index: usize, source: MatchSource) -> ResolvedColumn {
    ResolvedColumn {
        index,
        header: headers[index].trim().to_string(),
        source,
    }
}

/// Known header spellings, most specific first
fn aliases(field: CanonicalField) -> &'static [&'static str] {
    match field {
        CanonicalField::SalePrice => &[
            "ClosePrice",
            "Sale Price",
            "Sold Price",
            "PriceSold",
            "SoldPrice",
            "Price",
        ],
        CanonicalField::SaleDate => &[
            "CloseDate",
            "Sold Date",
            "SoldDate",
            "Close Date",
            "DateSold",
            "Sale Date",
            "COE",
        ],
        CanonicalField::LivingArea => &[
            "Living Area",
            "Sq Ft",
            "SqFt",
            "LivingArea",
            "GLA",
            "Gross Living Area",
            "Building SF",
            "SF Bldg",
        ],
        CanonicalField::Bedrooms => &["Bedrooms", "Beds", "BR", "Bed", "BedroomsTotal"],
        CanonicalField::Bathrooms => &[
            "Bathrooms",
            "Baths",
            "BA",
            "Bath",
            "BathroomsTotal",
            "BathroomsTotalInteger",
        ],
        CanonicalField::Status => &["Standard Status", "Status", "StandardStatus", "MlsStatus"],
        CanonicalField::ListingId => &["Listing ID", "ListingID", "MLS#", "MLSNumber", "MLS", "MLS ID"],
        CanonicalField::Address => &[
            "Property Address",
            "Full Address",
            "Address",
            "Street Address",
            "UnparsedAddress",
        ],
        CanonicalField::Latitude => &["Latitude", "Lat"],
        CanonicalField::Longitude => &["Longitude", "Lon", "Lng", "Long"],
        CanonicalField::YearBuilt => &["Year Built", "YrBuilt", "Built Year", "YearBuilt"],
        CanonicalField::LotSize => &[
            "Lot Size",
            "LotSize",
            "Lot Sq Ft",
            "LotSqFt",
            "Lot Area",
            "LotSizeSquareFeet",
        ],
        CanonicalField::Zip => &["ZIP", "ZipCode", "Postal Code", "PostalCode"],
        CanonicalField::DaysOnMarket => &["DOM", "Days On Market", "DaysOnMarket", "Days Active"],
        CanonicalField::CumulativeDaysOnMarket => &[
            "CDOM",
            "Cumulative Days On Market",
            "CumulativeDaysOnMarket",
        ],
        CanonicalField::Garage => &["Garage", "Garage Spaces", "GarageSpaces"],
    }
}

/// Keyword heuristics over a normalized header
fn matches_keyword(field: CanonicalField, h: &str) -> bool {
    let has = |needle: &str| h.contains(needle);
    let per_area = has("psf")
        || has("pricesf")
        || has("pricesq")
        || (has("per") && (has("sf") || has("sq") || has("ft") || has("foot") || has("area")));

    match field {
        CanonicalField::SalePrice => {
            has("price") && (has("close") || has("sale") || has("sold")) && !per_area
        }
        CanonicalField::SaleDate => (has("close") || has("sale") || has("sold")) && has("date"),
        CanonicalField::LivingArea => {
            (has("living") || has("gla") || has("sqft") || has("square"))
                && !has("price")
                && !has("lot")
                && !per_area
        }
        CanonicalField::Bedrooms => has("bed"),
        CanonicalField::Bathrooms => has("bath"),
        CanonicalField::Status => has("status"),
        CanonicalField::ListingId => has("mls") || (has("listing") && has("id")),
        CanonicalField::Address => has("address"),
        CanonicalField::Latitude => h.starts_with("lat"),
        CanonicalField::Longitude => h.starts_with("lon") || h.starts_with("lng"),
        CanonicalField::YearBuilt => has("year") && has("built"),
        CanonicalField::LotSize => {
            has("lot") && (has("size") || has("sq") || has("area") || has("acre"))
        }
        CanonicalField::Zip => has("zip") || has("postal"),
        CanonicalField::DaysOnMarket => {
            (h == "dom" || has("daysonmarket") || has("daysactive")) && !has("cumulative")
        }
        CanonicalField::CumulativeDaysOnMarket => has("cdom") || has("cumulative"),
        CanonicalField::Garage => has("garage"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_detect_standard_mls_export() {
        let h = headers(&[
            "MLS#",
            "Status",
            "Close Date",
            "Close Price",
            "Living Area",
            "Beds",
            "Baths",
            "DOM",
            "CDOM",
            "Garage Spaces",
        ]);
        let mapping = ColumnMapping::detect(&h);

        assert_eq!(mapping.index(CanonicalField::ListingId), Some(0));
        assert_eq!(mapping.index(CanonicalField::Status), Some(1));
        assert_eq!(mapping.index(CanonicalField::SaleDate), Some(2));
        assert_eq!(mapping.index(CanonicalField::SalePrice), Some(3));
        assert_eq!(mapping.index(CanonicalField::LivingArea), Some(4));
        assert_eq!(mapping.index(CanonicalField::Bedrooms), Some(5));
        assert_eq!(mapping.index(CanonicalField::Bathrooms), Some(6));
        assert_eq!(mapping.index(CanonicalField::DaysOnMarket), Some(7));
        assert_eq!(mapping.index(CanonicalField::CumulativeDaysOnMarket), Some(8));
        assert_eq!(mapping.index(CanonicalField::Garage), Some(9));
        assert_eq!(
            mapping.get(CanonicalField::SalePrice).map(|c| c.source),
            Some(MatchSource::Alias)
        );
    }

    #[test]
    fn test_keyword_fallback_is_case_insensitive() {
        let h = headers(&["FINAL SALE PRICE ($)", "settlement / sale date", "Total SQFT Heated"]);
        let mapping = ColumnMapping::detect(&h);

        let price = mapping.get(CanonicalField::SalePrice).unwrap();
        assert_eq!(price.index, 0);
        assert_eq!(price.source, MatchSource::Keyword);
        assert_eq!(mapping.index(CanonicalField::SaleDate), Some(1));
        assert_eq!(mapping.index(CanonicalField::LivingArea), Some(2));
    }

    #[test]
    fn test_price_per_area_not_taken_as_price_or_area() {
        let h = headers(&["Sale Price Per SqFt", "Sold Price", "SqFt"]);
        let mapping = ColumnMapping::detect(&h);

        assert_eq!(mapping.index(CanonicalField::SalePrice), Some(1));
        assert_eq!(mapping.index(CanonicalField::LivingArea), Some(2));
    }

    #[test]
    fn test_each_header_claimed_once() {
        // "Sale Date" must not also be read as the price or anything else
        let h = headers(&["Sale Date", "Price"]);
        let mapping = ColumnMapping::detect(&h);

        assert_eq!(mapping.index(CanonicalField::SaleDate), Some(0));
        assert_eq!(mapping.index(CanonicalField::SalePrice), Some(1));
        let claimed: Vec<usize> = mapping.iter().map(|(_, c)| c.index).collect();
        assert_eq!(claimed.len(), 2);
    }

    #[test]
    fn test_unmatched_fields_are_none() {
        let h = headers(&["Close Date", "Close Price", "GLA"]);
        let mapping = ColumnMapping::detect(&h);

        assert!(mapping.get(CanonicalField::Latitude).is_none());
        assert!(mapping.unresolved().contains(&CanonicalField::Garage));
        assert!(mapping.require(&CanonicalField::REQUIRED, &h).is_ok());
    }

    #[test]
    fn test_missing_required_column_is_an_error() {
        let h = headers(&["Close Date", "Close Price", "Beds"]);
        let mapping = ColumnMapping::detect(&h);

        let err = mapping.require(&CanonicalField::REQUIRED, &h).unwrap_err();
        match err {
            AnalysisError::MissingColumn { field, headers } => {
                assert_eq!(field, CanonicalField::LivingArea);
                assert!(headers.contains("Beds"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_overrides_win() {
        let h = headers(&["Close Price", "Contract Price", "Close Date", "Area"]);
        let mut overrides = BTreeMap::new();
        overrides.insert(CanonicalField::SalePrice, "contract price".to_string());
        overrides.insert(CanonicalField::LivingArea, "Area".to_string());

        let mapping = ColumnMapping::resolve(&h, &overrides).unwrap();
        assert_eq!(mapping.index(CanonicalField::SalePrice), Some(1));
        assert_eq!(mapping.index(CanonicalField::LivingArea), Some(3));
        assert_eq!(
            mapping.get(CanonicalField::SalePrice).map(|c| c.source),
            Some(MatchSource::Override)
        );
    }

    #[test]
    fn test_override_for_absent_header_fails() {
        let h = headers(&["Close Price"]);
        let mut overrides = BTreeMap::new();
        overrides.insert(CanonicalField::SaleDate, "Recorded".to_string());

        assert!(matches!(
            ColumnMapping::resolve(&h, &overrides),
            Err(AnalysisError::OverrideNotFound { .. })
        ));
    }
}

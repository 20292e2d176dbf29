use serde::{Deserialize, Serialize};

/// Column order for the output workbook and its CSV fallback. The first
/// seven columns are the priority prefix; the rest follow in fixed order.
pub const LISTING_COLUMNS: [&str; 23] = [
    "district",
    "subdistrict",
    "community",
    "price_yuan",
    "area_sqm",
    "layout",
    "title",
    "link",
    "community_link",
    "price_unit",
    "orientation",
    "floor",
    "total_floors",
    "built_year",
    "tags",
    "verified",
    "near_subway",
    "furnished",
    "must_see",
    "vr_tour",
    "agency",
    "maintained_at",
    "captured_at",
];

/// One rental listing as extracted from a results page. Location tiers are
/// empty strings when the source omits them; numeric and free-text fields
/// are absent entirely. Each field is written at most once during
/// extraction and never re-derived afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub title: String,
    pub link: String,
    pub district: String,
    pub subdistrict: String,
    pub community: String,
    pub community_link: String,
    pub price: Option<u32>,
    pub price_unit: Option<String>,
    pub area_sqm: Option<f64>,
    pub orientation: Option<String>,
    pub layout: Option<String>,
    pub floor: Option<String>,
    pub total_floors: Option<u32>,
    pub built_year: Option<u32>,
    pub tags: Option<String>,
    pub verified: bool,
    pub near_subway: bool,
    pub furnished: bool,
    pub must_see: bool,
    pub vr_tour: bool,
    pub agency: Option<String>,
    pub maintained_at: Option<String>,
    pub captured_at: String,
}

/// A single spreadsheet cell, typed so the workbook writer can emit real
/// numbers and booleans while the CSV fallback renders everything as text.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
}

fn opt_text(value: &Option<String>) -> CellValue {
    match value {
        Some(s) => CellValue::Text(s.clone()),
        None => CellValue::Empty,
    }
}

impl Listing {
    /// Cell values in `LISTING_COLUMNS` order.
    pub fn cells(&self) -> Vec<CellValue> {
        vec![
            CellValue::Text(self.district.clone()),
            CellValue::Text(self.subdistrict.clone()),
            CellValue::Text(self.community.clone()),
            self.price
                .map(|p| CellValue::Number(p as f64))
                .unwrap_or(CellValue::Empty),
            self.area_sqm
                .map(CellValue::Number)
                .unwrap_or(CellValue::Empty),
            opt_text(&self.layout),
            CellValue::Text(self.title.clone()),
            CellValue::Text(self.link.clone()),
            CellValue::Text(self.community_link.clone()),
            opt_text(&self.price_unit),
            opt_text(&self.orientation),
            opt_text(&self.floor),
            self.total_floors
                .map(|f| CellValue::Number(f as f64))
                .unwrap_or(CellValue::Empty),
            self.built_year
                .map(|y| CellValue::Number(y as f64))
                .unwrap_or(CellValue::Empty),
            opt_text(&self.tags),
            CellValue::Bool(self.verified),
            CellValue::Bool(self.near_subway),
            CellValue::Bool(self.furnished),
            CellValue::Bool(self.must_see),
            CellValue::Bool(self.vr_tour),
            opt_text(&self.agency),
            opt_text(&self.maintained_at),
            CellValue::Text(self.captured_at.clone()),
        ]
    }

    /// Cells rendered as plain strings for the CSV fallback.
    pub fn csv_record(&self) -> Vec<String> {
        self.cells()
            .into_iter()
            .map(|cell| match cell {
                CellValue::Text(s) => s,
                CellValue::Number(n) => n.to_string(),
                CellValue::Bool(b) => b.to_string(),
                CellValue::Empty => String::new(),
            })
            .collect()
    }
}

/// One row of the distance-enrichment pass: an origin address plus the
/// shared destination, with the derived columns filled in over time.
/// Coordinate cells hold the formatted text form, not raw numbers, so the
/// file round-trips through ordinary spreadsheet tooling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRow {
    pub origin: String,
    pub dest_coords: String,
    #[serde(default)]
    pub origin_coords: String,
    #[serde(default)]
    pub driving_km: Option<f64>,
    #[serde(default)]
    pub driving_min: Option<f64>,
    #[serde(default)]
    pub transit_min: Option<f64>,
}

impl EnrichmentRow {
    pub fn new(origin: &str, dest_coords: &str) -> Self {
        Self {
            origin: origin.to_string(),
            dest_coords: dest_coords.to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_match_column_count() {
        let listing = Listing::default();
        assert_eq!(listing.cells().len(), LISTING_COLUMNS.len());
        assert_eq!(listing.csv_record().len(), LISTING_COLUMNS.len());
    }

    #[test]
    fn priority_prefix_order() {
        assert_eq!(
            &LISTING_COLUMNS[..7],
            &[
                "district",
                "subdistrict",
                "community",
                "price_yuan",
                "area_sqm",
                "layout",
                "title"
            ]
        );
    }

    #[test]
    fn csv_record_renders_numbers_and_bools() {
        let listing = Listing {
            price: Some(3000),
            area_sqm: Some(38.5),
            verified: true,
            ..Listing::default()
        };
        let record = listing.csv_record();
        assert_eq!(record[3], "3000");
        assert_eq!(record[4], "38.5");
        assert_eq!(record[15], "true");
    }
}

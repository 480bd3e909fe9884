//! Vehicle detail extraction from a concluded listing page
//!
//! Only the lot title and the description block are required. Every other
//! field degrades to the unknown sentinel (or null) on its own when the page
//! does not carry it.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, trace};

use super::config::{ListingMarkers, ParsingConfig};
use super::error::{ParsingError, ParsingResult};
use super::{compile_selector, element_text, first, stripped_text};
use crate::domain::vehicle_record::columns;
use crate::domain::{Document, FieldValue, VehicleRecord};

const YEAR_PATTERN: &str = r"\d{4}";
const EXPIRY_PATTERN: &str = r"\b\d{2}/\d{2}/\d{4}\b";

#[derive(Debug, Clone)]
struct CompiledSelectors {
    lot_title: Selector,
    description: Selector,
    description_item: Selector,
    current_bid: Selector,
    bid_count: Selector,
    close_date: Selector,
    location_label: Selector,
}

#[derive(Debug, Clone)]
pub struct DetailExtractor {
    selectors: CompiledSelectors,
    /// Raw selector strings, kept for error reporting
    lot_title_selector: String,
    description_selector: String,
    close_date_attribute: String,
    markers: ListingMarkers,
    year: Regex,
    expiry: Regex,
}

impl DetailExtractor {
    pub fn new(config: &ParsingConfig) -> ParsingResult<Self> {
        let s = &config.selectors;
        Ok(Self {
            selectors: CompiledSelectors {
                lot_title: compile_selector(&s.lot_title)?,
                description: compile_selector(&s.description)?,
                description_item: compile_selector(&s.description_item)?,
                current_bid: compile_selector(&s.current_bid)?,
                bid_count: compile_selector(&s.bid_count)?,
                close_date: compile_selector(&s.close_date)?,
                location_label: compile_selector(&s.location_label)?,
            },
            lot_title_selector: s.lot_title.clone(),
            description_selector: s.description.clone(),
            close_date_attribute: s.close_date_attribute.clone(),
            markers: config.markers.clone(),
            year: compile_regex(YEAR_PATTERN)?,
            expiry: compile_regex(EXPIRY_PATTERN)?,
        })
    }

    /// Build a record from a listing page.
    ///
    /// `price` and `url` are left unknown; the caller owns those values.
    pub fn extract(&self, html: &Html) -> ParsingResult<VehicleRecord> {
        let title = first(html, &self.selectors.lot_title).ok_or_else(|| {
            ParsingError::required_element_missing("lot title", &self.lot_title_selector)
        })?;
        let description = first(html, &self.selectors.description).ok_or_else(|| {
            ParsingError::required_element_missing("description", &self.description_selector)
        })?;

        let mut fields = self.title_fields(&element_text(title));
        fields.extend(self.description_fields(description));

        let mut record = VehicleRecord::from_fields(fields);

        if let Some(expiry) = record.get(columns::REGISTRATION_EXPIRY).cloned() {
            if !matches!(expiry, FieldValue::Unknown) {
                record = record.with_field(columns::REGISTRATION_EXPIRY, self.normalize_expiry(&expiry));
            }
        }

        let record = record
            .with_field(columns::LOCATION, self.location(html))
            .with_field(columns::BIDS, self.bid_count(html))
            .with_field(columns::DATE, self.close_date(html));

        trace!(key = ?record.merge_key(), "Extracted vehicle record");
        Ok(record)
    }

    pub fn extract_document(&self, document: &Document) -> ParsingResult<VehicleRecord> {
        let record = self.extract(&document.parse());
        if let Err(e) = &record {
            debug!(url = %document.url(), error = %e, "Detail extraction failed");
        }
        record
    }

    /// `year make model variant...`; without a leading year, year is 0 and
    /// the remaining fields shift left by one token.
    fn title_fields(&self, title: &str) -> Vec<(String, FieldValue)> {
        let tokens: Vec<&str> = title.split_whitespace().collect();
        let year = tokens
            .first()
            .and_then(|token| self.year.find(token))
            .and_then(|m| m.as_str().parse::<i64>().ok());

        let (year, rest) = match year {
            Some(year) => (year, tokens.get(1..).unwrap_or_default()),
            None => (0, &tokens[..]),
        };
        let token = |index: usize| rest.get(index).copied().unwrap_or_default().to_string();
        let variant = rest.get(2..).unwrap_or_default().join(" ");

        vec![
            (columns::YEAR.to_string(), FieldValue::Integer(year)),
            (columns::MAKE.to_string(), FieldValue::text(token(0))),
            (columns::MODEL.to_string(), FieldValue::text(token(1))),
            (columns::VARIANT.to_string(), FieldValue::text(variant)),
        ]
    }

    fn description_fields(&self, description: ElementRef<'_>) -> Vec<(String, FieldValue)> {
        let missing = self.markers.missing_value.to_lowercase();
        description
            .select(&self.selectors.description_item)
            .filter_map(|item| {
                let text = stripped_text(item);
                let (key, value) = text.split_once(':')?;
                let (key, value) = (key.trim(), value.trim());
                if self.markers.dropped_keys.iter().any(|dropped| dropped == key) {
                    return None;
                }

                let value = if value.is_empty() || value.to_lowercase() == missing {
                    FieldValue::Unknown
                } else {
                    FieldValue::text(value)
                };
                Some((key.to_string(), value))
            })
            .collect()
    }

    fn normalize_expiry(&self, raw: &FieldValue) -> FieldValue {
        self.expiry
            .find(&raw.key_text())
            .map(|m| FieldValue::text(m.as_str()))
            .unwrap_or(FieldValue::Unknown)
    }

    /// Region from the cell after the "Location" label, e.g.
    /// `Minchinbury, NSW, 2770` yields `NSW`.
    fn location(&self, html: &Html) -> FieldValue {
        let label = self.markers.location_label.to_lowercase();
        let region = html
            .select(&self.selectors.location_label)
            .find(|cell| element_text(*cell).to_lowercase().contains(&label))
            .and_then(|cell| cell.next_siblings().find_map(ElementRef::wrap))
            .and_then(|value| {
                let text = element_text(value);
                let segments: Vec<&str> = text.split(',').collect();
                segments
                    .len()
                    .checked_sub(2)
                    .map(|index| segments[index].trim().to_uppercase())
            });

        match region {
            Some(region) if self.markers.regions.iter().any(|r| *r == region) => {
                FieldValue::Text(region)
            }
            _ => FieldValue::Unknown,
        }
    }

    fn bid_count(&self, html: &Html) -> FieldValue {
        first(html, &self.selectors.current_bid)
            .and_then(|block| block.select(&self.selectors.bid_count).next())
            .and_then(|link| {
                element_text(link)
                    .split_whitespace()
                    .next()
                    .and_then(|token| token.parse::<i64>().ok())
            })
            .map(FieldValue::Integer)
            .unwrap_or(FieldValue::Null)
    }

    fn close_date(&self, html: &Html) -> FieldValue {
        first(html, &self.selectors.close_date)
            .and_then(|element| element.value().attr(&self.close_date_attribute))
            .and_then(|timestamp| timestamp.split('T').next())
            .map(FieldValue::text)
            .unwrap_or(FieldValue::Null)
    }
}

fn compile_regex(pattern: &str) -> ParsingResult<Regex> {
    Regex::new(pattern).map_err(|e| ParsingError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const LISTING: &str = r#"
        <html><head><title>2019 Toyota Corolla Ascent - Grays</title></head><body>
        <h1 class="dls-heading-3 lotPageTitle">2019 Toyota Corolla Ascent Sport Hybrid</h1>
        <div class="dls-text-medium position-relative">Winning Bid <a>14 bids</a></div>
        <abbr class="endtime text-decoration-none" title="2024-05-12T14:30:00">Sun 12 May</abbr>
        <table><tr><td>Location</td>
            <td>Minchinbury, nsw, 2770</td></tr></table>
        <div class="sanitised-markup"><ul>
            <li><strong>VIN:</strong> JTNB23HK003456789</li>
            <li><strong>Fuel Type:</strong> Petrol</li>
            <li><strong>Registration Expiry Date:</strong> Expires 01/02/2025 (NSW)</li>
            <li><strong>Service History:</strong> Unable to Locate</li>
            <li><strong>Spare Key:</strong></li>
            <li><strong>Key No:</strong> 4411</li>
            <li>No separator here</li>
        </ul></div>
        </body></html>"#;

    fn extractor() -> DetailExtractor {
        DetailExtractor::new(&ParsingConfig::default()).unwrap()
    }

    fn text(value: &str) -> FieldValue {
        FieldValue::Text(value.to_string())
    }

    #[test]
    fn full_listing_is_extracted() {
        let record = extractor().extract(&Html::parse_document(LISTING)).unwrap();

        assert_eq!(record.get(columns::YEAR), Some(&FieldValue::Integer(2019)));
        assert_eq!(record.get(columns::MAKE), Some(&text("Toyota")));
        assert_eq!(record.get(columns::MODEL), Some(&text("Corolla")));
        assert_eq!(record.get(columns::VARIANT), Some(&text("Ascent Sport Hybrid")));
        assert_eq!(record.get(columns::VIN), Some(&text("JTNB23HK003456789")));
        assert_eq!(record.get("Fuel Type"), Some(&text("Petrol")));
        assert_eq!(record.get(columns::REGISTRATION_EXPIRY), Some(&text("01/02/2025")));
        assert_eq!(record.get("Service History"), Some(&FieldValue::Unknown));
        assert_eq!(record.get("Spare Key"), Some(&FieldValue::Unknown));
        assert_eq!(record.get(columns::LOCATION), Some(&text("NSW")));
        assert_eq!(record.get(columns::BIDS), Some(&FieldValue::Integer(14)));
        assert_eq!(record.get(columns::DATE), Some(&text("2024-05-12")));
        assert_eq!(record.get(columns::PRICE), Some(&FieldValue::Unknown));
    }

    #[test]
    fn dropped_key_never_reaches_the_record() {
        let record = extractor().extract(&Html::parse_document(LISTING)).unwrap();
        assert!(record.iter().all(|(column, _)| column != "Key No"));
    }

    #[test]
    fn title_without_year_shifts_fields() {
        let html = Html::parse_document(
            r#"<h1 class="dls-heading-3 lotPageTitle">Ford Ranger XLT</h1>
               <div class="sanitised-markup"></div>"#,
        );
        let record = extractor().extract(&html).unwrap();

        assert_eq!(record.get(columns::YEAR), Some(&FieldValue::Integer(0)));
        assert_eq!(record.get(columns::MAKE), Some(&text("Ford")));
        assert_eq!(record.get(columns::MODEL), Some(&text("Ranger")));
        assert_eq!(record.get(columns::VARIANT), Some(&text("XLT")));
        assert_eq!(record.get(columns::BIDS), Some(&FieldValue::Null));
        assert_eq!(record.get(columns::DATE), Some(&FieldValue::Null));
        assert_eq!(record.get(columns::LOCATION), Some(&FieldValue::Unknown));
    }

    #[test]
    fn title_without_variant_leaves_it_null() {
        let html = Html::parse_document(
            r#"<h1 class="dls-heading-3 lotPageTitle">2019 Toyota Corolla</h1>
               <div class="sanitised-markup"></div>"#,
        );
        let record = extractor().extract(&html).unwrap();

        assert_eq!(record.get(columns::MODEL), Some(&text("Corolla")));
        assert_eq!(record.get(columns::VARIANT), Some(&FieldValue::Null));
    }

    #[rstest]
    #[case(r#"<div class="sanitised-markup"></div>"#, "lot title")]
    #[case(r#"<h1 class="dls-heading-3 lotPageTitle">2019 Mazda 3</h1>"#, "description")]
    fn missing_required_element_fails(#[case] body: &str, #[case] element: &str) {
        let err = extractor().extract(&Html::parse_document(body)).unwrap_err();
        match err {
            ParsingError::RequiredElementMissing { element: missing, .. } => {
                assert_eq!(missing, element)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[rstest]
    #[case("Sydney, ACT, 2600", FieldValue::Unknown)]
    #[case("Perth, wa , 6000", FieldValue::Text("WA".into()))]
    #[case("Somewhere", FieldValue::Unknown)]
    fn location_accepts_only_known_regions(#[case] cell: &str, #[case] expected: FieldValue) {
        let html = Html::parse_document(&format!(
            r#"<h1 class="dls-heading-3 lotPageTitle">2019 Mazda 3</h1>
               <div class="sanitised-markup"></div>
               <table><tr><td>Location:</td><td>{cell}</td></tr></table>"#
        ));
        let record = extractor().extract(&html).unwrap();
        assert_eq!(record.get(columns::LOCATION), Some(&expected));
    }

    #[test]
    fn unreadable_expiry_becomes_unknown() {
        let html = Html::parse_document(
            r#"<h1 class="dls-heading-3 lotPageTitle">2019 Mazda 3</h1>
               <div class="sanitised-markup"><ul><li>Registration Expiry Date: Unregistered</li></ul></div>"#,
        );
        let record = extractor().extract(&html).unwrap();
        assert_eq!(record.get(columns::REGISTRATION_EXPIRY), Some(&FieldValue::Unknown));
    }
}

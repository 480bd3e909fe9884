//! Lifecycle state classification of a listing page
//!
//! States are checked in a fixed order and the first match wins:
//! running, cancelled, referred, sold. A page matching none of them is
//! `Undetermined`, which is not the same thing as a failed fetch.

use scraper::{Html, Selector};
use tracing::debug;

use super::config::{ListingMarkers, ParsingConfig};
use super::error::ParsingResult;
use super::{compile_selector, element_text, first};
use crate::domain::{Classification, Document};

/// Compiled selectors for the state predicates
#[derive(Debug, Clone)]
struct CompiledSelectors {
    current_bid: Selector,
    page_title: Selector,
    cancellation_heading: Selector,
    referred_heading: Selector,
    sold_heading: Selector,
    price: Selector,
}

#[derive(Debug, Clone)]
pub struct StateClassifier {
    selectors: CompiledSelectors,
    markers: ListingMarkers,
}

impl StateClassifier {
    pub fn new(config: &ParsingConfig) -> ParsingResult<Self> {
        let s = &config.selectors;
        Ok(Self {
            selectors: CompiledSelectors {
                current_bid: compile_selector(&s.current_bid)?,
                page_title: compile_selector(&s.page_title)?,
                cancellation_heading: compile_selector(&s.cancellation_heading)?,
                referred_heading: compile_selector(&s.referred_heading)?,
                sold_heading: compile_selector(&s.sold_heading)?,
                price: compile_selector(&s.price)?,
            },
            markers: config.markers.clone(),
        })
    }

    pub fn classify(&self, html: &Html) -> Classification {
        if self.is_running(html) {
            Classification::Running
        } else if self.is_cancelled(html) {
            Classification::Cancelled
        } else if self.is_referred(html) {
            Classification::Referred
        } else if self.is_sold(html) {
            Classification::Sold {
                price: self.sold_price(html),
            }
        } else {
            Classification::Undetermined
        }
    }

    pub fn classify_document(&self, document: &Document) -> Classification {
        let classification = self.classify(&document.parse());
        debug!(url = %document.url(), ?classification, "Classified listing page");
        classification
    }

    fn is_running(&self, html: &Html) -> bool {
        let Some(block) = first(html, &self.selectors.current_bid) else {
            return false;
        };
        let text = block.text().collect::<String>();
        let label = &self.markers.current_bid_label;
        let mut tokens = text.split_whitespace();
        !label.is_empty() && label.iter().all(|expected| tokens.next() == Some(expected.as_str()))
    }

    fn is_cancelled(&self, html: &Html) -> bool {
        let title_matches = first(html, &self.selectors.page_title)
            .map(|title| title.text().collect::<String>().contains(&self.markers.cancelled))
            .unwrap_or(false);

        title_matches
            && first(html, &self.selectors.cancellation_heading)
                .map(|heading| !element_text(heading).is_empty())
                .unwrap_or(false)
    }

    fn is_referred(&self, html: &Html) -> bool {
        first(html, &self.selectors.referred_heading)
            .map(|heading| {
                let text = heading.text().collect::<String>().to_lowercase();
                self.markers
                    .referred
                    .iter()
                    .any(|marker| text.contains(&marker.to_lowercase()))
            })
            .unwrap_or(false)
    }

    fn is_sold(&self, html: &Html) -> bool {
        first(html, &self.selectors.sold_heading)
            .map(|heading| {
                heading
                    .text()
                    .collect::<String>()
                    .to_lowercase()
                    .contains(&self.markers.sold.to_lowercase())
            })
            .unwrap_or(false)
    }

    fn sold_price(&self, html: &Html) -> Option<f64> {
        first(html, &self.selectors.price).and_then(|price| parse_price(&element_text(price)))
    }
}

/// Parse a displayed price such as `$12,345` or `AU$ 9,999.50`.
///
/// Only a leading currency marker, whitespace and thousands separators are
/// discarded. Anything else around the number makes the price unreadable.
pub fn parse_price(text: &str) -> Option<f64> {
    let compact: String = text
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    let amount = compact.trim_start_matches(|c: char| c.is_ascii_alphabetic() || is_currency_symbol(c));

    if amount.is_empty() || !amount.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    amount.parse::<f64>().ok().filter(|price| price.is_finite())
}

fn is_currency_symbol(c: char) -> bool {
    matches!(c, '$' | '€' | '£' | '¥')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn classifier() -> StateClassifier {
        StateClassifier::new(&ParsingConfig::default()).unwrap()
    }

    fn classify(body: &str) -> Classification {
        let html = Html::parse_document(&format!(
            "<html><head><title>Lot page</title></head><body>{body}</body></html>"
        ));
        classifier().classify(&html)
    }

    #[test]
    fn current_bid_label_means_running() {
        let body = r#"<div class="dls-text-medium position-relative">Current Bid <a>3 bids</a></div>
                      <div class="dls-heading-3 currentbid_price">Sold for</div>"#;
        assert_eq!(classify(body), Classification::Running);
    }

    #[test]
    fn other_bid_label_is_not_running() {
        let body = r#"<div class="dls-text-medium position-relative">Winning Bid <a>3 bids</a></div>"#;
        assert_eq!(classify(body), Classification::Undetermined);
    }

    #[test]
    fn cancelled_needs_title_and_heading() {
        let with_heading = Html::parse_document(
            r#"<html><head><title>Cancelled - Lot 1</title></head>
               <body><div class="salepagetitle"><h1>Sale cancelled</h1></div></body></html>"#,
        );
        let without_heading = Html::parse_document(
            r#"<html><head><title>Cancelled - Lot 1</title></head><body></body></html>"#,
        );

        assert_eq!(classifier().classify(&with_heading), Classification::Cancelled);
        assert_eq!(classifier().classify(&without_heading), Classification::Undetermined);
    }

    #[rstest]
    #[case("Referred to vendor")]
    #[case("AUCTION CLOSED")]
    fn referred_markers_are_case_insensitive(#[case] heading: &str) {
        let body = format!(r#"<div class="dls-heading-3">{heading}</div>"#);
        assert_eq!(classify(&body), Classification::Referred);
    }

    #[test]
    fn only_first_heading_is_checked_for_referral() {
        let body = r#"<div class="dls-heading-3">Lot details</div><div class="dls-heading-3">Referred</div>"#;
        assert_eq!(classify(body), Classification::Undetermined);
    }

    #[test]
    fn sold_reads_price() {
        let body = r#"<div class="dls-heading-3 currentbid_price">Sold for <span itemprop="price">$12,345</span></div>"#;
        assert_eq!(classify(body), Classification::Sold { price: Some(12345.0) });
    }

    #[test]
    fn sold_without_readable_price_still_classifies() {
        let missing = r#"<div class="dls-heading-3 currentbid_price">SOLD FOR</div>"#;
        let garbled = r#"<div class="dls-heading-3 currentbid_price">Sold for <span itemprop="price">TBA</span></div>"#;

        assert_eq!(classify(missing), Classification::Sold { price: None });
        assert_eq!(classify(garbled), Classification::Sold { price: None });
    }

    #[test]
    fn empty_page_is_undetermined() {
        assert_eq!(classify(""), Classification::Undetermined);
    }

    #[rstest]
    #[case("$12,345", Some(12345.0))]
    #[case(" AU$ 9,999.50 ", Some(9999.5))]
    #[case("$0", Some(0.0))]
    #[case("", None)]
    #[case("N/A", None)]
    #[case("-$5", None)]
    #[case("$12,345 + 10% BP", None)]
    #[case("12345 (inc GST)", None)]
    fn price_text_parsing(#[case] text: &str, #[case] expected: Option<f64>) {
        assert_eq!(parse_price(text), expected);
    }

    proptest! {
        #[test]
        fn formatted_prices_round_trip(dollars in 0u64..10_000_000) {
            let mut grouped = String::new();
            let digits = dollars.to_string();
            for (i, c) in digits.chars().enumerate() {
                if i > 0 && (digits.len() - i) % 3 == 0 {
                    grouped.push(',');
                }
                grouped.push(c);
            }

            prop_assert_eq!(parse_price(&format!("${grouped}")), Some(dollars as f64));
        }
    }
}

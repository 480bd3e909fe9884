//! HTML parsing for auction listing pages
//!
//! Selectors are compiled once from [`ParsingConfig`] when a parser is built;
//! parsing itself works on a borrowed [`Html`] tree and never performs I/O.

pub mod config;
pub mod detail_extractor;
pub mod error;
pub mod state_classifier;

pub use config::{ListingMarkers, ListingSelectors, ParsingConfig};
pub use detail_extractor::DetailExtractor;
pub use error::{ParsingError, ParsingResult};
pub use state_classifier::{parse_price, StateClassifier};

use scraper::{ElementRef, Html, Selector};

pub(crate) fn compile_selector(selector: &str) -> ParsingResult<Selector> {
    Selector::parse(selector).map_err(|e| ParsingError::invalid_selector(selector, e))
}

/// All text below `element`, trimmed at both ends
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Each text fragment trimmed, then concatenated
pub(crate) fn stripped_text(element: ElementRef<'_>) -> String {
    element.text().map(str::trim).collect()
}

/// First element in `html` matching `selector`
pub(crate) fn first<'a>(html: &'a Html, selector: &Selector) -> Option<ElementRef<'a>> {
    html.select(selector).next()
}

//! Parsing configuration for listing pages
//!
//! CSS selectors and text markers are data, so a markup change on the
//! auction site is a config edit rather than a code change.

use serde::{Deserialize, Serialize};

/// Main parsing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    pub selectors: ListingSelectors,
    pub markers: ListingMarkers,
}

/// CSS selectors for a single listing page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSelectors {
    /// Block holding the "Current Bid" label and bid-count link
    pub current_bid: String,

    /// Bid-count link inside `current_bid`
    pub bid_count: String,

    pub page_title: String,

    /// Sale heading confirming a cancellation
    pub cancellation_heading: String,

    /// Heading carrying the referred/closed wording
    pub referred_heading: String,

    /// Price heading carrying the "sold for" wording
    pub sold_heading: String,

    pub price: String,

    /// Lot title (`<year> <make> <model> <variant...>`)
    pub lot_title: String,

    /// Description block with the `key: value` list
    pub description: String,

    pub description_item: String,

    /// Element whose `close_date_attribute` holds the ISO close timestamp
    pub close_date: String,

    pub close_date_attribute: String,

    /// Table cells scanned for the location label
    pub location_label: String,

    /// Result-page anchors pointing at listings
    pub listing_link: String,
}

impl Default for ListingSelectors {
    fn default() -> Self {
        Self {
            current_bid: "div.dls-text-medium.position-relative".to_string(),
            bid_count: "a".to_string(),
            page_title: "title".to_string(),
            cancellation_heading: "div.salepagetitle h1".to_string(),
            referred_heading: "div.dls-heading-3".to_string(),
            sold_heading: "div.dls-heading-3.currentbid_price".to_string(),
            price: "span[itemprop='price']".to_string(),
            lot_title: "h1.dls-heading-3.lotPageTitle".to_string(),
            description: "div.sanitised-markup".to_string(),
            description_item: "li".to_string(),
            close_date: "abbr.endtime.text-decoration-none".to_string(),
            close_date_attribute: "title".to_string(),
            location_label: "td".to_string(),
            listing_link: "a[href*='/lot/']".to_string(),
        }
    }
}

/// Text markers matched against element contents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingMarkers {
    /// Leading tokens of the running-auction label
    pub current_bid_label: Vec<String>,

    /// Case-sensitive, matched against the page title
    pub cancelled: String,

    /// Case-insensitive
    pub referred: Vec<String>,

    /// Case-insensitive
    pub sold: String,

    /// Case-insensitive description value meaning "no value"
    pub missing_value: String,

    /// Description keys that never reach a record
    pub dropped_keys: Vec<String>,

    pub location_label: String,

    /// Accepted location region abbreviations
    pub regions: Vec<String>,
}

impl Default for ListingMarkers {
    fn default() -> Self {
        Self {
            current_bid_label: vec!["Current".to_string(), "Bid".to_string()],
            cancelled: "Cancelled".to_string(),
            referred: vec!["referred".to_string(), "closed".to_string()],
            sold: "sold for".to_string(),
            missing_value: "unable to locate".to_string(),
            dropped_keys: vec!["Key No".to_string()],
            location_label: "location".to_string(),
            regions: ["NSW", "VIC", "QLD", "SA", "WA", "TAS", "NT"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

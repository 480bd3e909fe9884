//! Listing identifiers and lifecycle outcomes

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use super::document::Document;

/// Opaque key of one monitored listing (its canonical URL or path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(String);

impl ListingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute URL to navigate to.
    ///
    /// Relative identifiers (`/lot/...`) are joined onto `base`; absolute ones
    /// are returned unchanged.
    pub fn navigation_url(&self, base: &Url) -> String {
        match base.join(&self.0) {
            Ok(url) => url.into(),
            Err(_) => self.0.clone(),
        }
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ListingId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ListingId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ListingId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state read off a rendered page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    Running,
    Cancelled,
    Referred,
    Sold { price: Option<f64> },
    /// No known state matched the markup
    Undetermined,
}

/// Result of resolving one listing.
///
/// `Undetermined` comes from the classifier; `Error` is returned only once
/// every attempt for the listing has been used up without a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Running,
    Cancelled,
    Referred { document: Document },
    Sold { document: Document, price: Option<f64> },
    Undetermined,
    Error,
}

impl FetchOutcome {
    /// Attach the fetched document to a classification
    pub fn from_classification(classification: Classification, document: Document) -> Self {
        match classification {
            Classification::Running => Self::Running,
            Classification::Cancelled => Self::Cancelled,
            Classification::Referred => Self::Referred { document },
            Classification::Sold { price } => Self::Sold { document, price },
            Classification::Undetermined => Self::Undetermined,
        }
    }

    /// Whether the retry loop may stop on this outcome
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Running | Self::Cancelled | Self::Referred { .. } | Self::Sold { .. }
        )
    }

    /// Whether the auction is over and the listing leaves the pending set
    pub fn resolves_listing(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Referred { .. } | Self::Sold { .. }
        )
    }

    pub fn category(&self) -> OutcomeCategory {
        match self {
            Self::Running => OutcomeCategory::Running,
            Self::Cancelled => OutcomeCategory::Cancelled,
            Self::Referred { .. } => OutcomeCategory::Referred,
            Self::Sold { .. } => OutcomeCategory::Sold,
            Self::Undetermined => OutcomeCategory::Undetermined,
            Self::Error => OutcomeCategory::Error,
        }
    }
}

/// Payload-free outcome tag used for logging and the link log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeCategory {
    Running,
    Cancelled,
    Referred,
    Sold,
    Undetermined,
    Error,
}

impl OutcomeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Cancelled => "cancelled",
            Self::Referred => "referred",
            Self::Sold => "sold",
            Self::Undetermined => "undetermined",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "running" => Some(Self::Running),
            "cancelled" => Some(Self::Cancelled),
            "referred" => Some(Self::Referred),
            "sold" => Some(Self::Sold),
            "undetermined" => Some(Self::Undetermined),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for OutcomeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

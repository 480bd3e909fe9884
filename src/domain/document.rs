//! Rendered page content retained between fetch and extraction

use scraper::Html;

/// Markup of one fetched listing page.
///
/// The raw markup is kept instead of the parsed tree: `scraper::Html` is not
/// `Send`, so the tree is rebuilt on demand inside synchronous parsing code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    url: String,
    html: String,
}

impl Document {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    /// URL the markup was fetched from
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// Parse the markup into a traversable tree
    pub fn parse(&self) -> Html {
        Html::parse_document(&self.html)
    }
}

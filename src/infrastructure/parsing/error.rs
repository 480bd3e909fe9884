//! Parsing error types
//!
//! Only structural failures are errors here. Optional fields that cannot be
//! read degrade to the unknown sentinel inside the extractor instead.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsingError {
    /// A page element extraction cannot proceed without
    #[error("Required element '{element}' not found (selector: {selector})")]
    RequiredElementMissing { element: String, selector: String },

    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl ParsingError {
    pub fn required_element_missing(element: &str, selector: &str) -> Self {
        Self::RequiredElementMissing {
            element: element.to_string(),
            selector: selector.to_string(),
        }
    }

    pub fn invalid_selector(selector: &str, reason: impl ToString) -> Self {
        Self::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type ParsingResult<T> = Result<T, ParsingError>;

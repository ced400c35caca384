use rand::distributions::WeightedError;
use thiserror::Error;

use crate::template::ParseError;

/// Custom error types for the grammar interpreter
#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("Unknown modifier: {0}")]
    UnknownModifier(String),

    #[error("Invalid argument for modifier '{modifier}': {reason}")]
    InvalidModifierArgument { modifier: String, reason: String },

    #[error("Maximum expansion depth of {limit} exceeded while expanding '{symbol}'")]
    MaxDepthExceeded { symbol: String, limit: usize },

    #[error("Invalid grammar: {0}")]
    InvalidGrammar(String),

    #[error("Invalid grammar for symbol '{symbol}': {reason}")]
    InvalidRule { symbol: String, reason: String },

    #[error("No production of '{symbol}' matches filter {{{filter}}}")]
    NoMatchingProduction { symbol: String, filter: String },

    #[error("Invalid production weights: {0}")]
    Weights(#[from] WeightedError),

    #[error("No active scope to define '{0}' in")]
    NoActiveScope(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GrammarError {
    pub(crate) fn invalid_rule(symbol: &str, reason: impl Into<String>) -> Self {
        GrammarError::InvalidRule {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_argument(modifier: &str, reason: impl Into<String>) -> Self {
        GrammarError::InvalidModifierArgument {
            modifier: modifier.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for grammar operations
pub type Result<T> = std::result::Result<T, GrammarError>;

/// Whether `c` is an English vowel letter, either case
pub fn is_vowel(c: char) -> bool {
    "aeiouAEIOU".contains(c)
}

/// Upper-case the first character of `text`, leaving the rest untouched
pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

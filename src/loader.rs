//! Reading and writing the JSON grammar document format.
//!
//! A document is a flat object mapping each symbol to a single production
//! string or an array of productions. An array entry is either a string
//! (weight 1) or `{"text": "...", "weight": N}`.

use std::collections::BTreeMap;
use std::io::Read;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rules::{Production, RuleStore};
use crate::utils::{GrammarError, Result};

/// One production as it appears in a grammar document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductionEntry {
    Text(String),
    Weighted(WeightedText),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeightedText {
    pub text: String,
    pub weight: u32,
}

impl ProductionEntry {
    fn from_production(production: &Production) -> Self {
        if production.weight == 1 {
            ProductionEntry::Text(production.source.clone())
        } else {
            ProductionEntry::Weighted(WeightedText {
                text: production.source.clone(),
                weight: production.weight,
            })
        }
    }

    fn into_production(self, symbol: &str) -> Result<Production> {
        let (text, weight) = match self {
            ProductionEntry::Text(text) => (text, 1),
            ProductionEntry::Weighted(WeightedText { text, weight }) => (text, weight),
        };
        if text.is_empty() {
            return Err(GrammarError::invalid_rule(symbol, "production cannot be empty"));
        }
        if weight == 0 {
            return Err(GrammarError::invalid_rule(symbol, "production weight must be at least 1"));
        }
        Production::weighted(&text, weight)
    }
}

/// A validated grammar document, ready to install into a rule store
#[derive(Debug, Clone, Default)]
pub struct GrammarDocument {
    rules: Vec<(String, Vec<Production>)>,
}

impl GrammarDocument {
    /// Parse and validate a JSON grammar document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| GrammarError::InvalidGrammar(format!("malformed JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Parse and validate a JSON grammar document from a reader
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let value: Value = serde_json::from_reader(reader)
            .map_err(|e| GrammarError::InvalidGrammar(format!("malformed JSON: {}", e)))?;
        Self::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(GrammarError::InvalidGrammar(format!(
                    "expected a JSON object mapping symbols to productions, got {}",
                    json_kind(&other)
                )));
            }
        };

        let mut rules = Vec::with_capacity(map.len());
        for (symbol, value) in map {
            if symbol.is_empty() {
                return Err(GrammarError::InvalidGrammar(
                    "symbol name cannot be empty".to_string(),
                ));
            }
            let productions = Self::parse_productions(&symbol, value)?;
            rules.push((symbol, productions));
        }

        Ok(GrammarDocument { rules })
    }

    fn parse_productions(symbol: &str, value: Value) -> Result<Vec<Production>> {
        let entries = match value {
            Value::String(text) => vec![ProductionEntry::Text(text)],
            Value::Array(items) => items
                .into_iter()
                .map(|item| Self::parse_entry(symbol, item))
                .collect::<Result<Vec<_>>>()?,
            other => {
                return Err(GrammarError::invalid_rule(
                    symbol,
                    format!("expected a string or an array of strings, got {}", json_kind(&other)),
                ));
            }
        };

        if entries.is_empty() {
            return Err(GrammarError::invalid_rule(symbol, "production list is empty"));
        }

        entries
            .into_iter()
            .map(|entry| entry.into_production(symbol))
            .collect()
    }

    fn parse_entry(symbol: &str, item: Value) -> Result<ProductionEntry> {
        match item {
            Value::String(text) => Ok(ProductionEntry::Text(text)),
            Value::Object(_) => serde_json::from_value::<WeightedText>(item)
                .map(ProductionEntry::Weighted)
                .map_err(|e| {
                    let reason = format!("invalid weighted production: {}", e);
                    GrammarError::invalid_rule(symbol, reason)
                }),
            other => Err(GrammarError::invalid_rule(
                symbol,
                format!("productions must be strings, got {}", json_kind(&other)),
            )),
        }
    }

    /// Number of symbols in the document
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Install every rule at base scope, overwriting same-named symbols
    pub fn install(self, store: &mut RuleStore) -> Result<()> {
        for (symbol, productions) in self.rules {
            store.define(&symbol, productions)?;
        }
        Ok(())
    }
}

/// Serialize the base rules of `store` as a pretty-printed document with
/// sorted keys
pub fn to_json(store: &RuleStore) -> Result<String> {
    let document: BTreeMap<&str, Vec<ProductionEntry>> = store
        .base_rules()
        .map(|(symbol, rule)| {
            let entries: Vec<ProductionEntry> = rule
                .productions()
                .iter()
                .map(ProductionEntry::from_production)
                .collect();
            (symbol, entries)
        })
        .collect();
    Ok(serde_json::to_string_pretty(&document)?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

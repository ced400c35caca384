use std::fmt;
use std::io::Read;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::Expander;
use crate::loader::{self, GrammarDocument};
use crate::modifiers::{default_modifier_registry, Modifier, ModifierRegistry};
use crate::rules::{Production, RuleStore};
use crate::template::Template;
use crate::utils::{GrammarError, Result};

/// Symbol expanded by [`Grammar::generate`] unless configured otherwise
pub const DEFAULT_START_SYMBOL: &str = "origin";

/// Ceiling on `max_depth`. Larger configured values are clamped to it so
/// a cyclic grammar fails with `MaxDepthExceeded` before the thread stack
/// runs out.
pub const MAX_DEPTH_LIMIT: usize = 200;

/// Configuration options for grammar behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrammarConfig {
    /// The symbol expanded by `generate`
    pub start_symbol: String,
    /// Maximum nesting of symbol expansions before failing with
    /// `MaxDepthExceeded`, at most [`MAX_DEPTH_LIMIT`]
    pub max_depth: usize,
}

impl GrammarConfig {
    /// The depth limit actually enforced
    pub fn effective_max_depth(&self) -> usize {
        self.max_depth.min(MAX_DEPTH_LIMIT)
    }
}

impl Default for GrammarConfig {
    fn default() -> Self {
        GrammarConfig {
            start_symbol: DEFAULT_START_SYMBOL.to_string(),
            max_depth: 100,
        }
    }
}

/// A generative grammar: rules, modifiers and the random source used to
/// choose between productions.
///
/// Expansion takes `&mut self`; a grammar is used by one caller at a time.
/// Use [`Grammar::fork`] to hand independent copies to concurrent callers.
pub struct Grammar {
    rules: RuleStore,
    modifiers: ModifierRegistry,
    config: GrammarConfig,
    rng: Box<dyn RngCore + Send>,
}

impl Grammar {
    /// Create an empty grammar with an entropy-seeded random source
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create an empty grammar whose output is reproducible for `seed`
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Create an empty grammar drawing from the given random source
    pub fn with_rng<R: RngCore + Send + 'static>(rng: R) -> Self {
        Grammar {
            rules: RuleStore::new(),
            modifiers: default_modifier_registry(),
            config: GrammarConfig::default(),
            rng: Box::new(rng),
        }
    }

    /// Create an empty grammar with custom configuration
    pub fn with_config(config: GrammarConfig) -> Self {
        let mut grammar = Self::new();
        grammar.config = config;
        grammar
    }

    /// Create a grammar from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let mut grammar = Self::new();
        grammar.load_json(json)?;
        Ok(grammar)
    }

    /// Merge a JSON grammar document into this grammar. Same-named symbols
    /// are overwritten, others are left alone. Nothing is installed if the
    /// document is invalid.
    pub fn load_json(&mut self, json: &str) -> Result<&mut Self> {
        let document = GrammarDocument::from_json_str(json)?;
        self.install(document)
    }

    /// Like [`Grammar::load_json`], reading the document from `reader`
    pub fn load_json_reader<R: Read>(&mut self, reader: R) -> Result<&mut Self> {
        let document = GrammarDocument::from_json_reader(reader)?;
        self.install(document)
    }

    fn install(&mut self, document: GrammarDocument) -> Result<&mut Self> {
        let count = document.len();
        document.install(&mut self.rules)?;
        debug!(symbols = count, total = self.rules.len(), "loaded grammar document");
        Ok(self)
    }

    /// Serialize the rules of this grammar as a JSON document
    pub fn to_json(&self) -> Result<String> {
        loader::to_json(&self.rules)
    }

    /// Define `symbol`, replacing any existing rule of that name
    pub fn define(&mut self, symbol: &str, productions: &[&str]) -> Result<&mut Self> {
        let productions = productions
            .iter()
            .map(|source| Production::parse(source))
            .collect::<Result<Vec<_>>>()?;
        self.rules.define(symbol, productions)?;
        Ok(self)
    }

    /// Define `symbol` from `(production, weight)` pairs
    pub fn define_weighted(
        &mut self,
        symbol: &str,
        productions: &[(&str, u32)],
    ) -> Result<&mut Self> {
        let productions = productions
            .iter()
            .map(|(source, weight)| Production::weighted(source, *weight))
            .collect::<Result<Vec<_>>>()?;
        self.rules.define(symbol, productions)?;
        Ok(self)
    }

    /// Replace the random source. Output is only reproducible if this is
    /// done before the expansions that should be.
    pub fn set_random<R: RngCore + Send + 'static>(&mut self, rng: R) {
        self.rng = Box::new(rng);
    }

    /// Reseed the random source
    pub fn set_seed(&mut self, seed: u64) {
        self.set_random(StdRng::seed_from_u64(seed));
    }

    /// Register a modifier usable as `#symbol.name#`
    pub fn register_modifier<M>(&mut self, name: &str, modifier: M) -> &mut Self
    where
        M: Modifier + 'static,
    {
        self.modifiers.register(name, modifier);
        self
    }

    /// Register a plain string function as a modifier
    pub fn register_modifier_fn<F>(&mut self, name: &str, func: F) -> &mut Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.modifiers.register_fn(name, func);
        self
    }

    /// Expand `symbol` into text
    pub fn expand(&mut self, symbol: &str) -> Result<String> {
        let max_depth = self.config.effective_max_depth();
        Expander::new(&mut self.rules, &self.modifiers, &mut *self.rng, max_depth).expand(symbol)
    }

    /// Expand the configured start symbol, `origin` by default
    pub fn generate(&mut self) -> Result<String> {
        let start = self.config.start_symbol.clone();
        self.expand(&start)
    }

    /// Expand an ad-hoc template string against this grammar's rules
    pub fn flatten(&mut self, template: &str) -> Result<String> {
        let template = Template::parse(template)?;
        let max_depth = self.config.effective_max_depth();
        Expander::new(&mut self.rules, &self.modifiers, &mut *self.rng, max_depth)
            .flatten(&template)
    }

    /// An independent grammar with the same rules, modifiers and
    /// configuration, and its own random source seeded with `seed`
    pub fn fork(&self, seed: u64) -> Grammar {
        Grammar {
            rules: self.rules.clone(),
            modifiers: self.modifiers.clone(),
            config: self.config.clone(),
            rng: Box::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Check if the grammar defines a specific symbol
    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.rules.contains(symbol)
    }

    /// Get a sorted list of the defined symbols
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.rules.base_rules().map(|(s, _)| s).collect();
        symbols.sort_unstable();
        symbols
    }

    /// Get a reference to the grammar's rules
    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    /// Get a reference to the registered modifiers
    pub fn modifiers(&self) -> &ModifierRegistry {
        &self.modifiers
    }

    /// Get a reference to the grammar's configuration
    pub fn config(&self) -> &GrammarConfig {
        &self.config
    }

    /// Set a new configuration
    pub fn set_config(&mut self, config: GrammarConfig) {
        self.config = config;
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("symbols", &self.symbols())
            .field("modifiers", &self.modifiers.list_modifiers())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for constructing Grammar instances
///
/// The first error from any step is kept and returned by `build`.
pub struct GrammarBuilder {
    grammar: Grammar,
    error: Option<GrammarError>,
}

impl GrammarBuilder {
    /// Create a new grammar builder with default config
    pub fn new() -> Self {
        GrammarBuilder {
            grammar: Grammar::new(),
            error: None,
        }
    }

    /// Seed the random source
    pub fn seed(mut self, seed: u64) -> Self {
        self.grammar.set_seed(seed);
        self
    }

    /// Use the given random source
    pub fn rng<R: RngCore + Send + 'static>(mut self, rng: R) -> Self {
        self.grammar.set_random(rng);
        self
    }

    /// Set the configuration
    pub fn config(mut self, config: GrammarConfig) -> Self {
        self.grammar.config = config;
        self
    }

    /// Set the maximum expansion depth, clamped to [`MAX_DEPTH_LIMIT`]
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.grammar.config.max_depth = max_depth.min(MAX_DEPTH_LIMIT);
        self
    }

    /// Add a rule to the grammar
    pub fn rule(mut self, symbol: &str, productions: &[&str]) -> Self {
        let result = self.grammar.define(symbol, productions).map(|_| ());
        self.record(result);
        self
    }

    /// Merge a JSON grammar document
    pub fn json(mut self, json: &str) -> Self {
        let result = self.grammar.load_json(json).map(|_| ());
        self.record(result);
        self
    }

    /// Register a modifier
    pub fn modifier<M: Modifier + 'static>(mut self, name: &str, modifier: M) -> Self {
        self.grammar.register_modifier(name, modifier);
        self
    }

    /// Register a plain string function as a modifier
    pub fn modifier_fn<F>(mut self, name: &str, func: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.grammar.register_modifier_fn(name, func);
        self
    }

    /// Build the grammar
    pub fn build(self) -> Result<Grammar> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.grammar),
        }
    }

    fn record(&mut self, result: Result<()>) {
        if let Err(err) = result {
            self.error.get_or_insert(err);
        }
    }
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

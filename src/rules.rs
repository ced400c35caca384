use std::collections::HashMap;
use std::sync::Arc;

use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, RngCore};

use crate::template::{Filter, Template};
use crate::utils::{GrammarError, Result};

/// One candidate expansion of a symbol
#[derive(Debug, Clone)]
pub struct Production {
    /// The raw template text
    pub source: String,
    /// Relative selection weight, at least 1
    pub weight: u32,
    template: Arc<Template>,
}

impl Production {
    /// Parse `source` into a production with weight 1
    pub fn parse(source: &str) -> Result<Self> {
        Self::weighted(source, 1)
    }

    /// Parse `source` into a production with the given weight
    pub fn weighted(source: &str, weight: u32) -> Result<Self> {
        let template = Template::parse(source)?;
        Ok(Production {
            source: source.to_string(),
            weight,
            template: Arc::new(template),
        })
    }

    /// A production that renders `text` verbatim, whatever it contains
    pub fn literal(text: &str) -> Self {
        Production {
            source: text.to_string(),
            weight: 1,
            template: Arc::new(Template::literal(text)),
        }
    }

    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }
}

/// The ordered, non-empty set of productions for one symbol
#[derive(Debug, Clone)]
pub struct Rule {
    productions: Vec<Production>,
}

impl Rule {
    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    /// Pick one production, optionally restricted to those whose source
    /// matches `filter`. Uniform unless some weight differs from 1.
    /// `None` when no production passes the filter.
    pub fn select<R: RngCore + ?Sized>(
        &self,
        rng: &mut R,
        filter: Option<&Filter>,
    ) -> Result<Option<&Production>> {
        let candidates: Vec<&Production> = match filter {
            Some(filter) => self
                .productions
                .iter()
                .filter(|p| filter.matches(&p.source))
                .collect(),
            None => self.productions.iter().collect(),
        };

        if candidates.is_empty() {
            return Ok(None);
        }

        if candidates.iter().all(|p| p.weight == 1) {
            return Ok(Some(candidates[rng.gen_range(0..candidates.len())]));
        }

        // Summed as u64: a u32 total can overflow
        let index = WeightedIndex::new(candidates.iter().map(|p| u64::from(p.weight)))?;
        Ok(Some(candidates[index.sample(rng)]))
    }
}

/// Symbol table with a stack of shadowing scopes.
///
/// Lookups search the innermost scope first and fall back to the base
/// rules. Scopes only ever hold rules bound while a template is being
/// expanded; they never touch the base rules or each other.
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    base: HashMap<String, Rule>,
    scopes: Vec<HashMap<String, Rule>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a base rule. Base productions must be non-empty
    /// text; scoped bindings may expand to nothing.
    pub fn define(&mut self, symbol: &str, productions: Vec<Production>) -> Result<()> {
        if productions.iter().any(|p| p.source.is_empty()) {
            return Err(GrammarError::invalid_rule(symbol, "production cannot be empty"));
        }
        let rule = Self::make_rule(symbol, productions)?;
        self.base.insert(symbol.to_string(), rule);
        Ok(())
    }

    /// Shadow `symbol` in the innermost scope
    pub fn define_in_scope(&mut self, symbol: &str, productions: Vec<Production>) -> Result<()> {
        let rule = Self::make_rule(symbol, productions)?;
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| GrammarError::NoActiveScope(symbol.to_string()))?;
        scope.insert(symbol.to_string(), rule);
        Ok(())
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Discard the innermost scope and everything bound in it.
    /// Returns false when no scope is active.
    pub fn pop_scope(&mut self) -> bool {
        self.scopes.pop().is_some()
    }

    /// Number of active scopes
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Pop scopes until only `depth` remain
    pub fn truncate_scopes(&mut self, depth: usize) {
        self.scopes.truncate(depth);
    }

    /// Find the visible rule for `symbol`
    pub fn resolve(&self, symbol: &str) -> Option<&Rule> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(symbol))
            .or_else(|| self.base.get(symbol))
    }

    /// Whether `symbol` has a base rule
    pub fn contains(&self, symbol: &str) -> bool {
        self.base.contains_key(symbol)
    }

    /// The base rules, unordered
    pub fn base_rules(&self) -> impl Iterator<Item = (&str, &Rule)> {
        self.base.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.base.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    fn make_rule(symbol: &str, productions: Vec<Production>) -> Result<Rule> {
        if symbol.is_empty() {
            return Err(GrammarError::InvalidGrammar(
                "symbol name cannot be empty".to_string(),
            ));
        }
        if productions.is_empty() {
            return Err(GrammarError::invalid_rule(symbol, "production list is empty"));
        }
        if productions.iter().any(|p| p.weight == 0) {
            return Err(GrammarError::invalid_rule(
                symbol,
                "production weight must be at least 1",
            ));
        }
        Ok(Rule { productions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn literals(texts: &[&str]) -> Vec<Production> {
        texts.iter().map(|t| Production::literal(t)).collect()
    }

    fn only(store: &RuleStore, symbol: &str) -> String {
        store.resolve(symbol).unwrap().productions()[0].source.clone()
    }

    #[test]
    fn test_define_overwrites() {
        let mut store = RuleStore::new();
        store.define("animal", literals(&["cat"])).unwrap();
        store.define("animal", literals(&["dog"])).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(only(&store, "animal"), "dog");
    }

    #[test]
    fn test_define_rejects_empty() {
        let mut store = RuleStore::new();
        assert!(matches!(
            store.define("animal", vec![]),
            Err(GrammarError::InvalidRule { .. })
        ));
        assert!(matches!(
            store.define("", literals(&["x"])),
            Err(GrammarError::InvalidGrammar(_))
        ));
        let zero = Production::weighted("x", 0).unwrap();
        assert!(store.define("animal", vec![zero]).is_err());
    }

    #[test]
    fn test_scopes_shadow_and_restore() {
        let mut store = RuleStore::new();
        store.define("hero", literals(&["Base"])).unwrap();

        store.push_scope();
        store.define_in_scope("hero", literals(&["Outer"])).unwrap();
        store.define_in_scope("pet", literals(&["owl"])).unwrap();

        store.push_scope();
        store.define_in_scope("hero", literals(&["Inner"])).unwrap();
        assert_eq!(only(&store, "hero"), "Inner");
        assert_eq!(only(&store, "pet"), "owl");

        assert!(store.pop_scope());
        assert_eq!(only(&store, "hero"), "Outer");

        assert!(store.pop_scope());
        assert_eq!(only(&store, "hero"), "Base");
        assert!(store.resolve("pet").is_none());
        assert!(!store.pop_scope());
    }

    #[test]
    fn test_define_in_scope_requires_scope() {
        let mut store = RuleStore::new();
        assert!(matches!(
            store.define_in_scope("hero", literals(&["Aria"])),
            Err(GrammarError::NoActiveScope(_))
        ));
    }

    #[test]
    fn test_truncate_scopes() {
        let mut store = RuleStore::new();
        store.push_scope();
        store.push_scope();
        store.push_scope();
        store.truncate_scopes(1);
        assert_eq!(store.scope_depth(), 1);
    }

    #[test]
    fn test_select_uniform_covers_all() {
        let mut store = RuleStore::new();
        store.define("n", literals(&["a", "b", "c"])).unwrap();
        let rule = store.resolve("n").unwrap();
        let mut rng = StdRng::seed_from_u64(3);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(rule.select(&mut rng, None).unwrap().unwrap().source.clone());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_select_weighted() {
        let productions = vec![
            Production::weighted("rare", 1).unwrap(),
            Production::weighted("common", 99).unwrap(),
        ];
        let mut store = RuleStore::new();
        store.define("n", productions).unwrap();
        let rule = store.resolve("n").unwrap();
        let mut rng = StdRng::seed_from_u64(11);

        let common = (0..1000)
            .filter(|_| rule.select(&mut rng, None).unwrap().unwrap().source == "common")
            .count();
        assert!(common > 900, "common picked {} times", common);
    }

    #[test]
    fn test_select_filtered() {
        let mut store = RuleStore::new();
        store
            .define("animal", literals(&["cow", "duck", "coyote"]))
            .unwrap();
        let rule = store.resolve("animal").unwrap();
        let mut rng = StdRng::seed_from_u64(5);

        let template = Template::parse("#animal{co.*}#").unwrap();
        let filter = match &template.nodes[0] {
            crate::template::Node::Reference(r) => r.filter.clone().unwrap(),
            _ => panic!("Expected Reference"),
        };
        for _ in 0..20 {
            let picked = &rule.select(&mut rng, Some(&filter)).unwrap().unwrap().source;
            assert!(picked == "cow" || picked == "coyote");
        }

        let template = Template::parse("#animal{z.*}#").unwrap();
        let filter = match &template.nodes[0] {
            crate::template::Node::Reference(r) => r.filter.clone().unwrap(),
            _ => panic!("Expected Reference"),
        };
        assert!(rule.select(&mut rng, Some(&filter)).unwrap().is_none());
    }

    #[test]
    fn test_literal_production_is_not_parsed() {
        let p = Production::literal("#not a ref");
        assert_eq!(
            p.template().nodes,
            vec![crate::template::Node::Literal("#not a ref".to_string())]
        );
        assert!(Production::parse("#not a ref").is_err());
    }

    #[test]
    fn test_select_weights_near_u32_max() {
        let productions = vec![
            Production::weighted("a", 4_000_000_000).unwrap(),
            Production::weighted("b", 4_000_000_000).unwrap(),
        ];
        let mut store = RuleStore::new();
        store.define("n", productions).unwrap();
        let rule = store.resolve("n").unwrap();
        let mut rng = StdRng::seed_from_u64(2);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            seen.insert(rule.select(&mut rng, None).unwrap().unwrap().source.clone());
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_empty_production_only_in_scope() {
        let mut store = RuleStore::new();
        match store.define("animal", literals(&["cat", ""])) {
            Err(GrammarError::InvalidRule { symbol, .. }) => assert_eq!(symbol, "animal"),
            other => panic!("Expected InvalidRule, got {:?}", other),
        }
        assert!(!store.contains("animal"));

        store.push_scope();
        store.define_in_scope("adjective", literals(&[""])).unwrap();
        assert_eq!(only(&store, "adjective"), "");
    }
}

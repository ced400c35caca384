use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::{Rng, RngCore};
use tracing::debug;

use crate::utils::{capitalize_first, is_vowel, GrammarError, Result};

/// Trait for text transforms applied to the expansion of a reference.
///
/// Modifiers are applied, in the order written, after the referenced
/// symbol is fully expanded: `#animal.capitalize.s#`.
pub trait Modifier: Send + Sync + fmt::Debug {
    /// Transform `text`. `args` holds the parenthesised arguments, if any.
    /// Only modifiers that are random by nature should touch `rng`.
    fn apply(&self, text: &str, args: &[String], rng: &mut dyn RngCore) -> Result<String>;

    /// Get the name of this modifier
    fn name(&self) -> &str;
}

/// A modifier built from a plain string function
pub struct FnModifier<F> {
    name: String,
    func: F,
}

impl<F> FnModifier<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    pub fn new(name: &str, func: F) -> Self {
        FnModifier {
            name: name.to_string(),
            func,
        }
    }
}

impl<F> fmt::Debug for FnModifier<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnModifier").field("name", &self.name).finish()
    }
}

impl<F> Modifier for FnModifier<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn apply(&self, text: &str, _args: &[String], _rng: &mut dyn RngCore) -> Result<String> {
        Ok((self.func)(text))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Returns the text unchanged
#[derive(Debug, Clone)]
pub struct Identity;

impl Modifier for Identity {
    fn apply(&self, text: &str, _args: &[String], _rng: &mut dyn RngCore) -> Result<String> {
        Ok(text.to_string())
    }

    fn name(&self) -> &str {
        "identity"
    }
}

/// Upper-cases the first character
#[derive(Debug, Clone)]
pub struct CapitalizeFirst;

impl Modifier for CapitalizeFirst {
    fn apply(&self, text: &str, _args: &[String], _rng: &mut dyn RngCore) -> Result<String> {
        Ok(capitalize_first(text))
    }

    fn name(&self) -> &str {
        "capitalizeFirst"
    }
}

/// Upper-cases the whole text
#[derive(Debug, Clone)]
pub struct CapitalizeAll;

impl Modifier for CapitalizeAll {
    fn apply(&self, text: &str, _args: &[String], _rng: &mut dyn RngCore) -> Result<String> {
        Ok(text.to_uppercase())
    }

    fn name(&self) -> &str {
        "capitalizeAll"
    }
}

/// Regular English plural: `box` -> `boxes`, `city` -> `cities`, `day` -> `days`
#[derive(Debug, Clone)]
pub struct Pluralize;

impl Modifier for Pluralize {
    fn apply(&self, text: &str, _args: &[String], _rng: &mut dyn RngCore) -> Result<String> {
        let Some(last) = text.chars().last() else {
            return Ok(String::new());
        };
        let stem = &text[..text.len() - last.len_utf8()];

        let plural = match last {
            's' | 'h' | 'x' => format!("{}es", text),
            'y' if ends_with_consonant(stem) => format!("{}ies", stem),
            _ => format!("{}s", text),
        };
        Ok(plural)
    }

    fn name(&self) -> &str {
        "pluralize"
    }
}

/// Regular English past tense: `bake` -> `baked`, `cry` -> `cried`, `fold` -> `folded`
#[derive(Debug, Clone)]
pub struct PastTense;

impl Modifier for PastTense {
    fn apply(&self, text: &str, _args: &[String], _rng: &mut dyn RngCore) -> Result<String> {
        let Some(last) = text.chars().last() else {
            return Ok(String::new());
        };
        let stem = &text[..text.len() - last.len_utf8()];

        let past = match last {
            'e' => format!("{}d", text),
            'y' if ends_with_consonant(stem) => format!("{}ied", stem),
            _ => format!("{}ed", text),
        };
        Ok(past)
    }

    fn name(&self) -> &str {
        "ed"
    }
}

/// Prefixes `a` or `an` depending on the first letter
#[derive(Debug, Clone)]
pub struct IndefiniteArticle;

impl Modifier for IndefiniteArticle {
    fn apply(&self, text: &str, _args: &[String], _rng: &mut dyn RngCore) -> Result<String> {
        match text.chars().next() {
            None => Ok(String::new()),
            Some(c) if is_vowel(c) => Ok(format!("an {}", text)),
            Some(_) => Ok(format!("a {}", text)),
        }
    }

    fn name(&self) -> &str {
        "articleA"
    }
}

/// Keeps the text with the given percent chance (default 50), otherwise
/// yields an empty string: `#adjective.optional(30)#`
#[derive(Debug, Clone)]
pub struct Optional;

impl Modifier for Optional {
    fn apply(&self, text: &str, args: &[String], rng: &mut dyn RngCore) -> Result<String> {
        let chance = match args {
            [] => 50,
            [chance] => chance
                .parse::<u32>()
                .ok()
                .filter(|c| *c <= 100)
                .ok_or_else(|| {
                    GrammarError::invalid_argument(
                        self.name(),
                        format!("expected a percentage between 0 and 100, got '{}'", chance),
                    )
                })?,
            _ => {
                return Err(GrammarError::invalid_argument(
                    self.name(),
                    format!("expected at most one argument, got {}", args.len()),
                ));
            }
        };

        if rng.gen_range(0..100) < chance {
            Ok(text.to_string())
        } else {
            Ok(String::new())
        }
    }

    fn name(&self) -> &str {
        "optional"
    }
}

fn ends_with_consonant(text: &str) -> bool {
    text.chars().last().is_some_and(|c| !is_vowel(c))
}

/// Registry of modifiers by the name used in templates
#[derive(Debug, Clone, Default)]
pub struct ModifierRegistry {
    modifiers: HashMap<String, Arc<dyn Modifier>>,
}

impl ModifierRegistry {
    /// Create a new empty modifier registry
    pub fn new() -> Self {
        ModifierRegistry {
            modifiers: HashMap::new(),
        }
    }

    /// Register a modifier under `name`, replacing any previous one
    pub fn register<M: Modifier + 'static>(&mut self, name: &str, modifier: M) -> &mut Self {
        if self
            .modifiers
            .insert(name.to_string(), Arc::new(modifier))
            .is_some()
        {
            debug!(modifier = name, "replaced existing modifier");
        } else {
            debug!(modifier = name, "registered modifier");
        }
        self
    }

    /// Register a plain string function as a modifier
    pub fn register_fn<F>(&mut self, name: &str, func: F) -> &mut Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.register(name, FnModifier::new(name, func))
    }

    /// Get a modifier by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Modifier>> {
        self.modifiers.get(name).map(Arc::clone)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modifiers.contains_key(name)
    }

    /// Get a sorted list of all registered modifier names
    pub fn list_modifiers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modifiers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Register the built-in English modifiers and their short aliases
    pub fn register_defaults(&mut self) -> &mut Self {
        self.register("identity", Identity)
            .register("capitalizeFirst", CapitalizeFirst)
            .register("capitalize", CapitalizeFirst)
            .register("capitalizeAll", CapitalizeAll)
            .register("uppercase", CapitalizeAll)
            .register("pluralize", Pluralize)
            .register("s", Pluralize)
            .register("articleA", IndefiniteArticle)
            .register("a", IndefiniteArticle)
            .register("ed", PastTense)
            .register("optional", Optional)
    }
}

/// Create a modifier registry with the built-in modifiers
pub fn default_modifier_registry() -> ModifierRegistry {
    let mut registry = ModifierRegistry::new();
    registry.register_defaults();
    registry
}

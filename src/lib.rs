//! Tracery is a generative grammar interpreter.
//!
//! A grammar maps symbols to lists of productions. Productions are templates
//! that reference other symbols with `#symbol#`, transform the result with
//! modifiers (`#animal.a.capitalize#`) and bind symbols for the duration of a
//! reference with actions (`#[hero:#name#]story#`). Expanding a symbol picks
//! one production at random and recursively expands every reference in it.
//!
//! # Example
//!
//! ```rust
//! use tracery::Grammar;
//!
//! let mut grammar = Grammar::with_seed(42);
//! grammar
//!     .load_json(r##"{
//!         "origin": "#[hero:#name#]story#",
//!         "story": "#hero# met #animal.a#. #hero# liked #animal.s#.",
//!         "name": ["Aria", "Brick"],
//!         "animal": ["owl", "fox"]
//!     }"##)
//!     .unwrap();
//!
//! let text = grammar.generate().unwrap();
//! assert!(text.starts_with("Aria met") || text.starts_with("Brick met"));
//! ```

mod engine;
pub mod grammar;
pub mod loader;
pub mod modifiers;
pub mod rules;
pub mod template;
pub mod utils;

pub use engine::NUMBER_SYMBOL;
pub use grammar::{Grammar, GrammarBuilder, GrammarConfig, DEFAULT_START_SYMBOL, MAX_DEPTH_LIMIT};
pub use modifiers::{default_modifier_registry, Modifier, ModifierRegistry};
pub use rules::{Production, Rule, RuleStore};
pub use template::{ParseError, ParseErrorKind, Template, ValueOp};
pub use utils::{GrammarError, Result};

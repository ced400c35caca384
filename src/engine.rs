//! Recursive evaluation of parsed templates against a rule store.

use std::sync::Arc;

use rand::{Rng, RngCore};
use tracing::{debug, trace};

use crate::modifiers::ModifierRegistry;
use crate::rules::{Production, RuleStore};
use crate::template::{Action, Filter, Node, Reference, Template, ValueOp};
use crate::utils::{GrammarError, Result};

/// Built-in symbol expanding to a random non-negative number, unless the
/// grammar defines a rule of the same name
pub const NUMBER_SYMBOL: &str = "num";

/// Per-call expansion state
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ExpansionContext {
    pub depth: usize,
}

impl ExpansionContext {
    fn nested(self) -> Self {
        ExpansionContext {
            depth: self.depth + 1,
        }
    }
}

/// Evaluates templates for a single top-level expansion call.
///
/// Every scope pushed while evaluating is popped again before returning,
/// on success and on error alike.
pub(crate) struct Expander<'a> {
    rules: &'a mut RuleStore,
    modifiers: &'a ModifierRegistry,
    rng: &'a mut dyn RngCore,
    max_depth: usize,
}

impl<'a> Expander<'a> {
    pub fn new(
        rules: &'a mut RuleStore,
        modifiers: &'a ModifierRegistry,
        rng: &'a mut dyn RngCore,
        max_depth: usize,
    ) -> Self {
        Expander {
            rules,
            modifiers,
            rng,
            max_depth,
        }
    }

    /// Expand `symbol` from the top, leaving the rule store's scopes as found
    pub fn expand(&mut self, symbol: &str) -> Result<String> {
        self.rolled_back(|expander| {
            expander.expand_symbol(symbol, None, ExpansionContext::default())
        })
    }

    /// Evaluate an ad-hoc template from the top
    pub fn flatten(&mut self, template: &Template) -> Result<String> {
        self.rolled_back(|expander| expander.evaluate(template, ExpansionContext::default()))
    }

    fn rolled_back<F>(&mut self, run: F) -> Result<String>
    where
        F: FnOnce(&mut Self) -> Result<String>,
    {
        let mark = self.rules.scope_depth();
        let result = run(self);
        if self.rules.scope_depth() != mark {
            debug!(
                leaked = self.rules.scope_depth() - mark,
                "rolling back scopes after expansion"
            );
            self.rules.truncate_scopes(mark);
        }
        if let Err(err) = &result {
            debug!(error = %err, "expansion failed");
        }
        result
    }

    fn expand_symbol(
        &mut self,
        symbol: &str,
        filter: Option<&Filter>,
        ctx: ExpansionContext,
    ) -> Result<String> {
        if ctx.depth > self.max_depth {
            return Err(GrammarError::MaxDepthExceeded {
                symbol: symbol.to_string(),
                limit: self.max_depth,
            });
        }

        let template = {
            let rule = match self.rules.resolve(symbol) {
                Some(rule) => rule,
                None if symbol == NUMBER_SYMBOL => {
                    trace!(symbol, depth = ctx.depth, "expanding built-in number");
                    return Ok(self.rng.gen_range(0..i32::MAX).to_string());
                }
                None => return Err(GrammarError::UnknownSymbol(symbol.to_string())),
            };
            let production = rule.select(&mut *self.rng, filter)?.ok_or_else(|| {
                GrammarError::NoMatchingProduction {
                    symbol: symbol.to_string(),
                    filter: filter.map(|f| f.pattern().to_string()).unwrap_or_default(),
                }
            })?;
            Arc::clone(production.template())
        };

        trace!(symbol, depth = ctx.depth, "expanding symbol");
        self.evaluate(&template, ctx)
    }

    /// Evaluate a node sequence. Bindings made by action-only references
    /// last until the end of the sequence.
    fn evaluate(&mut self, template: &Template, ctx: ExpansionContext) -> Result<String> {
        let mark = self.rules.scope_depth();
        let result = self.evaluate_nodes(template, ctx);
        self.rules.truncate_scopes(mark);
        result
    }

    fn evaluate_nodes(&mut self, template: &Template, ctx: ExpansionContext) -> Result<String> {
        let mut output = String::new();

        for node in &template.nodes {
            match node {
                Node::Literal(text) => output.push_str(text),
                Node::Reference(reference) if reference.symbol.is_none() => {
                    self.rules.push_scope();
                    self.bind_actions(&reference.actions, ctx)?;
                }
                Node::Reference(reference) => {
                    let expanded = self.expand_reference(reference, ctx)?;
                    output.push_str(&expanded);
                }
            }
        }

        Ok(output)
    }

    fn expand_reference(&mut self, reference: &Reference, ctx: ExpansionContext) -> Result<String> {
        let scoped = !reference.actions.is_empty();
        if scoped {
            self.rules.push_scope();
        }

        let result = self.expand_reference_in_scope(reference, ctx);

        if scoped {
            self.rules.pop_scope();
        }
        result
    }

    fn expand_reference_in_scope(
        &mut self,
        reference: &Reference,
        ctx: ExpansionContext,
    ) -> Result<String> {
        self.bind_actions(&reference.actions, ctx)?;

        let Some(symbol) = reference.symbol.as_deref() else {
            return Ok(String::new());
        };
        let mut text = self.expand_symbol(symbol, reference.filter.as_ref(), ctx.nested())?;

        for call in &reference.modifiers {
            let modifier = self
                .modifiers
                .get(&call.name)
                .ok_or_else(|| GrammarError::UnknownModifier(call.name.clone()))?;
            text = modifier.apply(&text, &call.args, &mut *self.rng)?;
        }

        Ok(text)
    }

    /// Run actions into the innermost scope. Each value is expanded before
    /// its key is bound, so a value may refer to the outer binding of the
    /// same key.
    fn bind_actions(&mut self, actions: &[Action], ctx: ExpansionContext) -> Result<()> {
        for action in actions {
            let productions = self.action_productions(action, ctx)?;
            trace!(
                key = %action.key,
                reset = action.reset,
                values = productions.len(),
                "binding action"
            );
            self.rules.define_in_scope(&action.key, productions)?;
        }
        Ok(())
    }

    /// Plain values replace the visible rule. `+` and `-` values edit a copy
    /// of it, or of an empty rule when the key is reset with `!`.
    fn action_productions(
        &mut self,
        action: &Action,
        ctx: ExpansionContext,
    ) -> Result<Vec<Production>> {
        let mut added = Vec::with_capacity(action.values.len());
        let mut removed = Vec::new();
        for value in &action.values {
            let text = self.evaluate(&value.template, ctx.nested())?;
            match value.op {
                ValueOp::Set | ValueOp::Add => added.push(Production::literal(&text)),
                ValueOp::Remove => removed.push(text),
            }
        }

        let mut productions = match self.rules.resolve(&action.key) {
            Some(rule) if action.edits() && !action.reset => rule
                .productions()
                .iter()
                .filter(|p| !removed.contains(&p.source))
                .cloned()
                .collect(),
            _ => Vec::new(),
        };
        productions.extend(added);
        Ok(productions)
    }
}

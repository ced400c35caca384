//! Template syntax: parsing raw production strings into literal and
//! reference nodes.
//!
//! ```text
//! template  := (literal | reference)*
//! reference := '#' action* name? filter? ('.' modifier args?)* '#'
//! action    := '[' '!'? key ':' value (',' value)* ']'
//! value     := ('+' | '-')? template
//! filter    := '{' regex '}'
//! args      := '(' arg (',' arg)* ')'
//! ```
//!
//! A backslash makes the following character literal anywhere.

use std::fmt;

use regex::Regex;
use thiserror::Error;

const REFERENCE_DELIMITER: char = '#';
const MODIFIER_SEPARATOR: char = '.';
const ACTION_START: char = '[';
const ACTION_END: char = ']';
const ACTION_OPERATOR: char = ':';
const VALUE_SEPARATOR: char = ',';
const FILTER_START: char = '{';
const FILTER_END: char = '}';
const ARGS_START: char = '(';
const ARGS_END: char = ')';
const ESCAPE: char = '\\';
const ACTION_RESET: char = '!';
const VALUE_ADD: char = '+';
const VALUE_REMOVE: char = '-';

/// Maximum nesting of actions inside action values
pub const MAX_NESTING: usize = 64;

/// Characters that end a symbol, action key or modifier name
const RESERVED: &[char] = &[
    REFERENCE_DELIMITER,
    MODIFIER_SEPARATOR,
    ACTION_START,
    ACTION_END,
    ACTION_OPERATOR,
    VALUE_SEPARATOR,
    FILTER_START,
    FILTER_END,
    ARGS_START,
    ARGS_END,
    ESCAPE,
];

/// The structural problem found in a template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unterminated reference")]
    UnterminatedReference,
    #[error("empty symbol name")]
    EmptySymbolName,
    #[error("unterminated action")]
    UnterminatedAction,
    #[error("action is missing ':' between key and value")]
    MissingActionOperator,
    #[error("empty action key")]
    EmptyActionKey,
    #[error("empty modifier name")]
    EmptyModifierName,
    #[error("unterminated filter")]
    UnterminatedFilter,
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("escape character at end of template")]
    DanglingEscape,
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("actions nested more than {} deep", MAX_NESTING)]
    TooDeeplyNested,
}

/// A malformed template, with the character offset where parsing stopped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset} in {template:?}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: usize,
    pub template: String,
}

/// A regular expression restricting which productions a reference may select.
///
/// Matches against the whole raw production text.
#[derive(Debug, Clone)]
pub struct Filter {
    pattern: String,
    regex: Regex,
}

impl Filter {
    fn new(pattern: &str) -> std::result::Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Filter {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as written in the template
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// A modifier applied to the expansion of a reference
#[derive(Debug, Clone, PartialEq)]
pub struct ModifierCall {
    pub name: String,
    pub args: Vec<String>,
}

/// How an action value combines with the rule already visible for its key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOp {
    /// `value`
    Set,
    /// `+value`: kept alongside the visible productions
    Add,
    /// `-value`: drops visible productions with this text
    Remove,
}

/// One value of an action, expanded when the action runs
#[derive(Debug, Clone, PartialEq)]
pub struct ActionValue {
    pub op: ValueOp,
    pub template: Template,
}

/// An inline binding `[key:value,value]` executed before a reference expands
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub key: String,
    /// `[!key:...]` starts from an empty rule even when editing with `+`/`-`
    pub reset: bool,
    pub values: Vec<ActionValue>,
}

impl Action {
    /// Whether any value edits the visible rule instead of replacing it
    pub fn edits(&self) -> bool {
        self.values.iter().any(|v| v.op != ValueOp::Set)
    }
}

/// A `#...#` placeholder inside a template
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub actions: Vec<Action>,
    /// `None` for an action-only reference such as `#[hero:Aria]#`
    pub symbol: Option<String>,
    pub filter: Option<Filter>,
    pub modifiers: Vec<ModifierCall>,
}

/// A node of a parsed template
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text, emitted as-is
    Literal(String),
    /// A reference to be expanded
    Reference(Reference),
}

/// A parsed template, a sequence of nodes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub nodes: Vec<Node>,
}

impl Template {
    /// Parse a raw template string
    pub fn parse(input: &str) -> Result<Template, ParseError> {
        let mut parser = Parser::new(input);
        let nodes = parser.parse_sequence(&[])?;
        // An empty stop set only returns at end of input
        debug_assert!(parser.peek().is_none());
        Ok(Template { nodes })
    }

    /// A template that always renders `text` verbatim
    pub fn literal(text: &str) -> Template {
        if text.is_empty() {
            return Template::default();
        }
        Template {
            nodes: vec![Node::Literal(text.to_string())],
        }
    }
}

struct Parser<'s> {
    source: &'s str,
    chars: Vec<char>,
    pos: usize,
    nesting: usize,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str) -> Self {
        Parser {
            source,
            chars: source.chars().collect(),
            pos: 0,
            nesting: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            kind,
            offset: self.pos,
            template: self.source.to_string(),
        }
    }

    /// Literal state: collect text and references until an unescaped stop
    /// character or end of input. The stop character is not consumed.
    fn parse_sequence(&mut self, stops: &[char]) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();
        let mut literal = String::new();

        while let Some(c) = self.peek() {
            if stops.contains(&c) {
                break;
            }
            match c {
                ESCAPE => {
                    self.bump();
                    literal.push(self.escaped()?);
                }
                REFERENCE_DELIMITER => {
                    if !literal.is_empty() {
                        nodes.push(Node::Literal(std::mem::take(&mut literal)));
                    }
                    nodes.push(Node::Reference(self.parse_reference()?));
                }
                _ => {
                    literal.push(c);
                    self.bump();
                }
            }
        }

        if !literal.is_empty() {
            nodes.push(Node::Literal(literal));
        }
        Ok(nodes)
    }

    fn escaped(&mut self) -> Result<char, ParseError> {
        self.bump().ok_or_else(|| self.error(ParseErrorKind::DanglingEscape))
    }

    fn parse_reference(&mut self) -> Result<Reference, ParseError> {
        let open = self.pos;
        self.bump();

        let mut actions = Vec::new();
        while self.peek() == Some(ACTION_START) {
            actions.push(self.parse_action()?);
        }

        let name = self.take_name();
        let symbol = if name.is_empty() { None } else { Some(name) };

        let filter = if self.peek() == Some(FILTER_START) {
            Some(self.parse_filter()?)
        } else {
            None
        };

        let mut modifiers = Vec::new();
        while self.peek() == Some(MODIFIER_SEPARATOR) {
            self.bump();
            modifiers.push(self.parse_modifier()?);
        }

        match self.peek() {
            Some(REFERENCE_DELIMITER) => {
                self.bump();
            }
            Some(c) => return Err(self.error(ParseErrorKind::UnexpectedCharacter(c))),
            None => return Err(self.error(ParseErrorKind::UnterminatedReference)),
        }

        let nameless = symbol.is_none();
        if nameless && (actions.is_empty() || filter.is_some() || !modifiers.is_empty()) {
            return Err(ParseError {
                kind: ParseErrorKind::EmptySymbolName,
                offset: open,
                template: self.source.to_string(),
            });
        }

        Ok(Reference {
            actions,
            symbol,
            filter,
            modifiers,
        })
    }

    fn take_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if RESERVED.contains(&c) {
                break;
            }
            name.push(c);
            self.bump();
        }
        name
    }

    fn parse_action(&mut self) -> Result<Action, ParseError> {
        if self.nesting == MAX_NESTING {
            return Err(self.error(ParseErrorKind::TooDeeplyNested));
        }
        self.bump();

        let reset = self.peek() == Some(ACTION_RESET);
        if reset {
            self.bump();
        }

        let key = self.take_name();
        match self.peek() {
            Some(ACTION_OPERATOR) => {}
            Some(ACTION_END) => return Err(self.error(ParseErrorKind::MissingActionOperator)),
            Some(c) => return Err(self.error(ParseErrorKind::UnexpectedCharacter(c))),
            None => return Err(self.error(ParseErrorKind::UnterminatedAction)),
        }
        if key.is_empty() {
            return Err(self.error(ParseErrorKind::EmptyActionKey));
        }
        self.bump();

        self.nesting += 1;
        let mut values = Vec::new();
        loop {
            let op = match self.peek() {
                Some(VALUE_ADD) => ValueOp::Add,
                Some(VALUE_REMOVE) => ValueOp::Remove,
                _ => ValueOp::Set,
            };
            if op != ValueOp::Set {
                self.bump();
            }
            let nodes = self.parse_sequence(&[VALUE_SEPARATOR, ACTION_END])?;
            values.push(ActionValue {
                op,
                template: Template { nodes },
            });
            match self.bump() {
                Some(VALUE_SEPARATOR) => continue,
                Some(_) => break,
                None => return Err(self.error(ParseErrorKind::UnterminatedAction)),
            }
        }
        self.nesting -= 1;

        Ok(Action { key, reset, values })
    }

    fn parse_filter(&mut self) -> Result<Filter, ParseError> {
        let open = self.pos;
        self.bump();

        let mut pattern = String::new();
        loop {
            match self.bump() {
                Some(FILTER_END) => break,
                // Keep the backslash so the regex sees its own escape
                Some(ESCAPE) => {
                    pattern.push(ESCAPE);
                    pattern.push(self.escaped()?);
                }
                Some(c) => pattern.push(c),
                None => return Err(self.error(ParseErrorKind::UnterminatedFilter)),
            }
        }

        Filter::new(&pattern).map_err(|e| ParseError {
            kind: ParseErrorKind::InvalidFilter(e.to_string()),
            offset: open,
            template: self.source.to_string(),
        })
    }

    fn parse_modifier(&mut self) -> Result<ModifierCall, ParseError> {
        let name = self.take_name();
        if name.is_empty() {
            return Err(self.error(ParseErrorKind::EmptyModifierName));
        }

        let mut args = Vec::new();
        if self.peek() == Some(ARGS_START) {
            self.bump();
            let mut arg = String::new();
            loop {
                match self.bump() {
                    Some(ARGS_END) => break,
                    Some(VALUE_SEPARATOR) => args.push(std::mem::take(&mut arg).trim().to_string()),
                    Some(ESCAPE) => arg.push(self.escaped()?),
                    Some(c) => arg.push(c),
                    None => return Err(self.error(ParseErrorKind::UnterminatedReference)),
                }
            }
            let last = arg.trim();
            if !last.is_empty() || !args.is_empty() {
                args.push(last.to_string());
            }
        }

        Ok(ModifierCall { name, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(symbol: &str) -> Node {
        Node::Reference(Reference {
            actions: vec![],
            symbol: Some(symbol.to_string()),
            filter: None,
            modifiers: vec![],
        })
    }

    fn kind_of(input: &str) -> ParseErrorKind {
        Template::parse(input).unwrap_err().kind
    }

    #[test]
    fn test_parse_literal_only() {
        let t = Template::parse("hello world").unwrap();
        assert_eq!(t.nodes, vec![Node::Literal("hello world".to_string())]);
    }

    #[test]
    fn test_parse_empty() {
        let t = Template::parse("").unwrap();
        assert!(t.nodes.is_empty());
    }

    #[test]
    fn test_parse_symbol_reference() {
        let t = Template::parse("#greeting# world").unwrap();
        assert_eq!(
            t.nodes,
            vec![reference("greeting"), Node::Literal(" world".to_string())]
        );
    }

    #[test]
    fn test_parse_modifier_chain() {
        let t = Template::parse("#animal.capitalize.s#").unwrap();
        match &t.nodes[0] {
            Node::Reference(r) => {
                assert_eq!(r.symbol.as_deref(), Some("animal"));
                let names: Vec<&str> = r.modifiers.iter().map(|m| m.name.as_str()).collect();
                assert_eq!(names, vec!["capitalize", "s"]);
                assert!(r.modifiers.iter().all(|m| m.args.is_empty()));
            }
            _ => panic!("Expected Reference"),
        }
    }

    #[test]
    fn test_parse_modifier_arguments() {
        let t = Template::parse("#adj.optional(30)# #x.wrap( <, > )# #y.f()#").unwrap();
        let calls: Vec<&ModifierCall> = t
            .nodes
            .iter()
            .filter_map(|n| match n {
                Node::Reference(r) => r.modifiers.first(),
                _ => None,
            })
            .collect();
        assert_eq!(calls[0].args, vec!["30"]);
        assert_eq!(calls[1].args, vec!["<", ">"]);
        assert!(calls[2].args.is_empty());
    }

    #[test]
    fn test_parse_action() {
        let t = Template::parse("#[hero:#name#,Aria]story#").unwrap();
        let r = match &t.nodes[0] {
            Node::Reference(r) => r,
            _ => panic!("Expected Reference"),
        };
        assert_eq!(r.symbol.as_deref(), Some("story"));
        assert_eq!(r.actions.len(), 1);
        assert_eq!(r.actions[0].key, "hero");
        assert!(!r.actions[0].reset);
        assert!(!r.actions[0].edits());
        assert_eq!(r.actions[0].values.len(), 2);
        assert_eq!(r.actions[0].values[0].template.nodes, vec![reference("name")]);
        assert_eq!(r.actions[0].values[1].template, Template::literal("Aria"));
    }

    #[test]
    fn test_parse_action_only_reference() {
        let t = Template::parse("#[hero:Aria][pet:owl]#hi").unwrap();
        match &t.nodes[0] {
            Node::Reference(r) => {
                assert!(r.symbol.is_none());
                assert_eq!(r.actions.len(), 2);
                assert_eq!(r.actions[1].key, "pet");
            }
            _ => panic!("Expected Reference"),
        }
        assert_eq!(t.nodes[1], Node::Literal("hi".to_string()));
    }

    #[test]
    fn test_parse_nested_action_value() {
        let t = Template::parse("#[a:#[b:x,y]c#,z]d#").unwrap();
        let r = match &t.nodes[0] {
            Node::Reference(r) => r,
            _ => panic!("Expected Reference"),
        };
        assert_eq!(r.actions[0].values.len(), 2);
        assert_eq!(r.actions[0].values[1].template, Template::literal("z"));
        match &r.actions[0].values[0].template.nodes[0] {
            Node::Reference(inner) => {
                assert_eq!(inner.symbol.as_deref(), Some("c"));
                assert_eq!(inner.actions[0].key, "b");
            }
            _ => panic!("Expected Reference"),
        }
    }

    #[test]
    fn test_parse_empty_action_value() {
        let t = Template::parse("#[hero:]x#").unwrap();
        match &t.nodes[0] {
            Node::Reference(r) => assert!(r.actions[0].values[0].template.nodes.is_empty()),
            _ => panic!("Expected Reference"),
        }
    }

    #[test]
    fn test_parse_filter() {
        let t = Template::parse("#animal{c.*}.s#").unwrap();
        match &t.nodes[0] {
            Node::Reference(r) => {
                let filter = r.filter.as_ref().unwrap();
                assert_eq!(filter.pattern(), "c.*");
                assert!(filter.matches("cow"));
                assert!(!filter.matches("duck"));
                assert!(!filter.matches("xcow"));
                assert_eq!(r.modifiers[0].name, "s");
            }
            _ => panic!("Expected Reference"),
        }
    }

    #[test]
    fn test_parse_filter_keeps_regex_escapes() {
        let t = Template::parse(r"#n{a\}b}#").unwrap();
        match &t.nodes[0] {
            Node::Reference(r) => {
                let filter = r.filter.as_ref().unwrap();
                assert_eq!(filter.pattern(), r"a\}b");
                assert!(filter.matches("a}b"));
            }
            _ => panic!("Expected Reference"),
        }
    }

    #[test]
    fn test_parse_escapes() {
        let t = Template::parse(r"price \#1 \\ #x#").unwrap();
        assert_eq!(
            t.nodes,
            vec![Node::Literal(r"price #1 \ ".to_string()), reference("x")]
        );
    }

    #[test]
    fn test_reserved_chars_literal_outside_references() {
        let t = Template::parse("a [b] {c}, d.e: f").unwrap();
        assert_eq!(t, Template::literal("a [b] {c}, d.e: f"));
    }

    #[test]
    fn test_escape_inside_action_value() {
        let t = Template::parse(r"#[k:a\,b\]c]x#").unwrap();
        match &t.nodes[0] {
            Node::Reference(r) => {
                assert_eq!(r.actions[0].values[0].template, Template::literal("a,b]c"));
            }
            _ => panic!("Expected Reference"),
        }
    }

    #[test]
    fn test_unterminated_reference() {
        assert_eq!(kind_of("hello #name"), ParseErrorKind::UnterminatedReference);
        assert_eq!(kind_of("#name.cap"), ParseErrorKind::UnterminatedReference);
        assert_eq!(kind_of("#"), ParseErrorKind::UnterminatedReference);
    }

    #[test]
    fn test_empty_symbol_name() {
        let err = Template::parse("say ## now").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::EmptySymbolName);
        assert_eq!(err.offset, 4);
        assert_eq!(kind_of("#.capitalize#"), ParseErrorKind::EmptySymbolName);
        assert_eq!(kind_of("#[a:b].s#"), ParseErrorKind::EmptySymbolName);
    }

    #[test]
    fn test_action_errors() {
        assert_eq!(kind_of("#[hero]x#"), ParseErrorKind::MissingActionOperator);
        assert_eq!(kind_of("#[:Aria]x#"), ParseErrorKind::EmptyActionKey);
        assert_eq!(kind_of("#[hero:Aria"), ParseErrorKind::UnterminatedAction);
        assert_eq!(kind_of("#[hero"), ParseErrorKind::UnterminatedAction);
    }

    #[test]
    fn test_modifier_errors() {
        assert_eq!(kind_of("#a.#"), ParseErrorKind::EmptyModifierName);
        assert_eq!(kind_of("#a..s#"), ParseErrorKind::EmptyModifierName);
        assert_eq!(kind_of("#a.f(1#"), ParseErrorKind::UnterminatedReference);
    }

    #[test]
    fn test_filter_errors() {
        assert_eq!(kind_of("#a{b#"), ParseErrorKind::UnterminatedFilter);
        assert!(matches!(kind_of("#a{(}#"), ParseErrorKind::InvalidFilter(_)));
    }

    #[test]
    fn test_dangling_escape() {
        assert_eq!(kind_of("oops\\"), ParseErrorKind::DanglingEscape);
    }

    #[test]
    fn test_unexpected_character() {
        assert_eq!(kind_of("#a[b:c]#"), ParseErrorKind::UnexpectedCharacter('['));
        assert_eq!(kind_of("#a:b#"), ParseErrorKind::UnexpectedCharacter(':'));
    }

    #[test]
    fn test_error_display() {
        let err = Template::parse("#oops").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unterminated reference at offset 5 in \"#oops\""
        );
    }

    #[test]
    fn test_parse_action_operators() {
        let t = Template::parse(r"#[!animal:+owl,-cat,\-1]story#").unwrap();
        let action = match &t.nodes[0] {
            Node::Reference(r) => &r.actions[0],
            _ => panic!("Expected Reference"),
        };
        assert_eq!(action.key, "animal");
        assert!(action.reset);
        assert!(action.edits());
        let ops: Vec<ValueOp> = action.values.iter().map(|v| v.op).collect();
        assert_eq!(ops, vec![ValueOp::Add, ValueOp::Remove, ValueOp::Set]);
        assert_eq!(action.values[0].template, Template::literal("owl"));
        assert_eq!(action.values[1].template, Template::literal("cat"));
        assert_eq!(action.values[2].template, Template::literal("-1"));
    }

    #[test]
    fn test_action_nesting_limit() {
        let nested = |depth: usize| format!("{}x{}", "#[k:".repeat(depth), "]s#".repeat(depth));
        assert!(Template::parse(&nested(MAX_NESTING)).is_ok());
        assert_eq!(kind_of(&nested(MAX_NESTING + 1)), ParseErrorKind::TooDeeplyNested);
        assert_eq!(kind_of(&nested(100_000)), ParseErrorKind::TooDeeplyNested);
    }
}

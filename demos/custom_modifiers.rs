use rand::RngCore;
use std::error::Error;
use tracery::{Grammar, Modifier, Result};

/// Wraps the text in the given delimiters: `#word.wrap([,])#`
#[derive(Debug, Clone)]
struct Wrap;

impl Modifier for Wrap {
    fn apply(&self, text: &str, args: &[String], _rng: &mut dyn RngCore) -> Result<String> {
        match args {
            [open, close] => Ok(format!("{}{}{}", open, text, close)),
            _ => Ok(format!("\"{}\"", text)),
        }
    }

    fn name(&self) -> &str {
        "wrap"
    }
}

/// Example of registering custom modifiers next to the built-in ones
fn main() -> std::result::Result<(), Box<dyn Error>> {
    let mut grammar = Grammar::with_seed(11);
    grammar
        .register_modifier("wrap", Wrap)
        .register_modifier_fn("reverse", |s| s.chars().rev().collect())
        .register_modifier_fn("title", |s| {
            s.split(' ')
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        });

    grammar.load_json(
        r##"{
            "origin": "#title.title# by #author.wrap# (#author.reverse#)",
            "title": ["the #adj# #noun#", "#noun.s# of the #adj# #place#"],
            "adj": ["silent", "hollow", "crimson", "endless"],
            "noun": ["harbor", "fox", "lantern", "archive"],
            "place": ["north", "marsh", "city"],
            "author": ["Ada Vance", "Ian Moss", "Oona Reyes"]
        }"##,
    )?;

    println!("=== Registered modifiers ===");
    println!("{}", grammar.modifiers().list_modifiers().join(", "));

    println!("\n=== Titles ===");
    for i in 1..=5 {
        println!("{}. {}", i, grammar.generate()?);
    }

    Ok(())
}

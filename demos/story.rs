use std::error::Error;
use tracery::GrammarBuilder;

const GRAMMAR: &str = r##"{
    "origin": "#[hero:#name#][pet:#animal#]story#",
    "story": [
        "#hero.capitalize# traveled with #hero.possessive# pet #pet#. #hero# was never #mood#, for the #pet# was always too #mood#.",
        "#hero.capitalize# and the #pet# set out at dawn. By noon #hero# had #found.a#."
    ],
    "name": ["Izzi", "Arjun", "Yuuma", "Darcy", "Mia", "Chiaki"],
    "animal": ["raven", "owl", "lizard", "zebra", "duck", "kitten"],
    "mood": ["vexed", "indignant", "impassioned", "wistful", "astute", "courteous"],
    "found": [{"text": "old map", "weight": 3}, "emerald", "unicorn horn"]
}"##;

/// Generates a few short stories from a fixed seed
fn main() -> Result<(), Box<dyn Error>> {
    let mut grammar = GrammarBuilder::new()
        .seed(5)
        .modifier_fn("possessive", |_| "their".to_string())
        .json(GRAMMAR)
        .build()?;

    for i in 1..=5 {
        println!("{}. {}", i, grammar.generate()?);
    }

    println!("\n=== Grammar as JSON ===");
    println!("{}", grammar.to_json()?);

    Ok(())
}

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tracery::{Grammar, GrammarConfig, MAX_DEPTH_LIMIT};
use tracing_subscriber::EnvFilter;

/// Tracery grammar expander
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON grammar file
    #[arg(help = "Path to the JSON grammar file")]
    grammar_file: Option<PathBuf>,

    /// The symbol to expand
    #[arg(help = "Symbol to expand", default_value = "origin")]
    symbol: String,

    /// Number of texts to generate
    #[arg(help = "Number of texts to generate", default_value = "1")]
    count: usize,

    /// Seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// Maximum expansion depth
    #[arg(
        long,
        default_value_t = GrammarConfig::default().max_depth as u64,
        value_parser = clap::value_parser!(u64).range(1..=MAX_DEPTH_LIMIT as u64)
    )]
    max_depth: u64,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in modifiers
    Modifiers,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(Commands::Modifiers) = cli.command {
        for name in Grammar::new().modifiers().list_modifiers() {
            println!("{}", name);
        }
        return Ok(());
    }

    let grammar_file = cli.grammar_file.ok_or("Grammar file path required")?;

    let mut grammar = match cli.seed {
        Some(seed) => Grammar::with_seed(seed),
        None => Grammar::new(),
    };
    grammar.set_config(GrammarConfig {
        start_symbol: cli.symbol.clone(),
        max_depth: usize::try_from(cli.max_depth)?,
    });

    let reader = BufReader::new(File::open(&grammar_file)?);
    grammar.load_json_reader(reader)?;
    tracing::info!(
        file = %grammar_file.display(),
        symbols = grammar.symbols().len(),
        "loaded grammar"
    );

    for _ in 0..cli.count {
        println!("{}", grammar.generate()?);
    }

    Ok(())
}

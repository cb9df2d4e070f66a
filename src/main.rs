//! Command-line interface for relaxng

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
use relaxng::documents::Document;
#[cfg(feature = "cli")]
use relaxng::validators::RelaxNg;

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "relaxng")]
#[command(author, version, about = "RelaxNG schema compilation and validation tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate an XML document against a RelaxNG grammar
    Validate {
        /// Path to the RelaxNG grammar (.rng)
        #[arg(short, long, value_name = "GRAMMAR")]
        grammar: PathBuf,

        /// Path to the XML file to validate
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output errors as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Compile a RelaxNG grammar and report on it
    Inspect {
        /// Path to the RelaxNG grammar (.rng)
        #[arg(value_name = "GRAMMAR")]
        grammar: PathBuf,

        /// Dump the compiled pattern tree
        #[cfg(feature = "dump")]
        #[arg(long)]
        tree: bool,
    },
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate {
            grammar,
            file,
            json,
        } => cmd_validate(grammar, file, json),
        #[cfg(feature = "dump")]
        Commands::Inspect { grammar, tree } => cmd_inspect(grammar, tree),
        #[cfg(not(feature = "dump"))]
        Commands::Inspect { grammar } => cmd_inspect(grammar, false),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
fn cmd_validate(
    grammar_path: PathBuf,
    file: PathBuf,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema = RelaxNg::from_file(&grammar_path)?;
    let doc = Document::from_file(&file)?;

    let mut ctxt = schema.validator();
    let outcome = ctxt.validate_document(&doc);

    if json {
        let errors: Vec<serde_json::Value> = ctxt
            .errors()
            .iter()
            .map(|e| {
                serde_json::json!({
                    "code": e.code.code(),
                    "kind": e.code.as_str(),
                    "message": e.message,
                    "path": e.path,
                    "expected": e.expected,
                    "actual": e.actual,
                })
            })
            .collect();
        let report = serde_json::json!({
            "valid": outcome.is_ok(),
            "grammar": grammar_path.display().to_string(),
            "file": file.display().to_string(),
            "errors": errors,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if outcome.is_ok() {
        println!("{} is valid", file.display());
    } else {
        println!("{} is invalid", file.display());
        for error in ctxt.errors() {
            println!("  - {}", error);
        }
    }

    if outcome.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn cmd_inspect(grammar_path: PathBuf, tree: bool) -> Result<(), Box<dyn std::error::Error>> {
    let schema = RelaxNg::from_file(&grammar_path)?;

    println!("relaxng v{}", relaxng::VERSION);
    println!();
    println!("Grammar: {}", grammar_path.display());
    println!("  Named defines: {}", schema.define_count());

    #[cfg(feature = "dump")]
    if tree {
        println!();
        print!("{}", schema.dump());
    }
    #[cfg(not(feature = "dump"))]
    let _ = tree;

    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}

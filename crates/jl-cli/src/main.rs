use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use jl_ast::{Diagnostic, Program};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jlc")]
#[command(about = "Lexer and parser front end for jlang schema files", long_about = None)]
#[command(version)]
struct Cli {
    /// Log more (-v debug, -vv trace); overrides RUST_LOG
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the token stream of a file
    Tokens {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = TokenFormat::Text)]
        format: TokenFormat,
    },

    /// Print the syntax tree of a file
    Parse {
        file: PathBuf,
        #[arg(long, value_enum, default_value_t = AstFormat::Debug)]
        format: AstFormat,
    },

    /// Parse a file and report the first error, if any
    Check { file: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum TokenFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum AstFormat {
    Debug,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Tokens { file, format } => cmd_tokens(&file, format),
        Commands::Parse { file, format } => cmd_parse(&file, format),
        Commands::Check { file } => cmd_check(&file),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("cannot read '{}'", path.display()))
}

fn front_end(source: &str) -> std::result::Result<Program, Diagnostic> {
    let tokens = jl_lexer::tokenize(source).map_err(|e| e.to_diagnostic())?;
    jl_parser::parse(tokens).map_err(|e| e.to_diagnostic())
}

fn report(path: &Path, source: &str, diag: &Diagnostic) -> ExitCode {
    eprint!("{}", diag.render(&path.display().to_string(), source));
    ExitCode::FAILURE
}

fn cmd_tokens(path: &Path, format: TokenFormat) -> Result<ExitCode> {
    let source = read_source(path)?;
    let tokens = match jl_lexer::tokenize(&source) {
        Ok(tokens) => tokens,
        Err(e) => return Ok(report(path, &source, &e.to_diagnostic())),
    };

    match format {
        TokenFormat::Text => {
            for tok in &tokens {
                let kind = format!("{:?}", tok.kind);
                println!("{:>4}:{:<4} {:<15} {}", tok.line(), tok.column(), kind, tok.lexeme);
            }
        }
        TokenFormat::Json => println!("{}", serde_json::to_string_pretty(&tokens)?),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_parse(path: &Path, format: AstFormat) -> Result<ExitCode> {
    let source = read_source(path)?;
    let program = match front_end(&source) {
        Ok(program) => program,
        Err(diag) => return Ok(report(path, &source, &diag)),
    };

    match format {
        AstFormat::Debug => println!("{:#?}", program),
        AstFormat::Json => println!("{}", serde_json::to_string_pretty(&program)?),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_check(path: &Path) -> Result<ExitCode> {
    let source = read_source(path)?;
    match front_end(&source) {
        Ok(program) => {
            let declarations: usize = program.modules.iter().map(|m| m.declarations.len()).sum();
            tracing::debug!(modules = program.modules.len(), declarations, "check passed");
            eprintln!("{}: ok", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(diag) => Ok(report(path, &source, &diag)),
    }
}

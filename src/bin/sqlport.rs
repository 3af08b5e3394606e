//! sqlport: translate SQL routines between dialects
//!
//! # Usage
//!
//! ```bash
//! # Translate T-SQL procedures to PostgreSQL
//! sqlport translate --from sqlserver --to postgres procs/*.sql
//!
//! # Check definitions against a dialect's grammar
//! sqlport validate --dialect oracle views/*.sql
//!
//! # Show how a function call is split
//! sqlport formula "DATEADD(day, 1, GETDATE())"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use sqlport::config::Config;
use sqlport::parser;
use sqlport::prelude::*;

#[derive(Parser)]
#[command(name = "sqlport")]
#[command(version)]
#[command(about = "Translate procedures, functions, views and triggers between SQL dialects", long_about = None)]
#[command(after_help = "EXAMPLES:
    sqlport translate --from sqlserver --to mysql usp_orders.sql
    sqlport translate --from oracle --to postgres --kind view --format json views/*.sql
    sqlport validate --dialect mysql routines/*.sql
    sqlport formula \"CONVERT(VARCHAR(10), created, 120)\"")]
struct Cli {
    /// Configuration file (default: ./sqlport.toml, then the user config dir)
    #[arg(long, global = true, env = "SQLPORT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate definition files from one dialect to another
    Translate {
        /// Source dialect (sqlserver, mysql, postgres, oracle, sqlite)
        #[arg(long)]
        from: DatabaseType,

        /// Target dialect
        #[arg(long)]
        to: DatabaseType,

        /// Object kind (common, view, procedure, function, trigger); detected when omitted
        #[arg(short, long)]
        kind: Option<ObjectKind>,

        /// Target schema owner
        #[arg(long)]
        owner: Option<String>,

        /// Skip objects that fail and report them at the end
        #[arg(long)]
        continue_on_error: bool,

        /// Worker threads (0 = all cores)
        #[arg(short, long)]
        threads: Option<usize>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Definition files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Check definition files against a dialect's grammar
    Validate {
        #[arg(short, long)]
        dialect: DatabaseType,

        #[arg(short, long)]
        kind: Option<ObjectKind>,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show how a function call expression is split into name and arguments
    Formula {
        expression: String,

        /// Argument delimiter
        #[arg(short, long, default_value = ",")]
        delimiter: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("SQLPORT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Translate {
            from,
            to,
            kind,
            owner,
            continue_on_error,
            threads,
            format,
            ref files,
        } => {
            let args = TranslateArgs {
                from,
                to,
                kind,
                owner,
                continue_on_error,
                threads,
                format,
            };
            run_translate(cli.config.as_deref(), args, files)
        }
        Commands::Validate { dialect, kind, ref files } => run_validate(dialect, kind, files),
        Commands::Formula {
            ref expression,
            ref delimiter,
        } => {
            show_formula(expression, delimiter);
            Ok(true)
        }
    };
    match outcome {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

struct TranslateArgs {
    from: DatabaseType,
    to: DatabaseType,
    kind: Option<ObjectKind>,
    owner: Option<String>,
    continue_on_error: bool,
    threads: Option<usize>,
    format: OutputFormat,
}

fn load_config(path: Option<&Path>) -> Result<(PathBuf, Config)> {
    if let Some(path) = path {
        let config = Config::load(path).with_context(|| format!("reading {}", path.display()))?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        return Ok((base, config));
    }
    match Config::discover()? {
        Some((path, config)) => {
            let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
            Ok((base, config))
        }
        None => Ok((PathBuf::from("."), Config::default())),
    }
}

fn read_objects(files: &[PathBuf], dialect: DatabaseType, kind: Option<ObjectKind>) -> Result<Vec<ScriptObject>> {
    files
        .iter()
        .map(|path| {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let kind = kind.unwrap_or_else(|| parser::detect_kind(&text, dialect));
            Ok(ScriptObject::new(name, kind, text))
        })
        .collect()
}

#[derive(Serialize)]
struct FailureReport {
    name: String,
    kind: ObjectKind,
    error: String,
}

#[derive(Serialize)]
struct BatchReport<'a> {
    translated: &'a [TranslatedScript],
    failures: Vec<FailureReport>,
}

fn run_translate(config_path: Option<&Path>, args: TranslateArgs, files: &[PathBuf]) -> Result<bool> {
    let (base, config) = load_config(config_path)?;
    let mut options = config.options();
    if args.owner.is_some() {
        options.target_owner = args.owner;
    }
    if args.continue_on_error {
        options.error_policy = ErrorPolicy::SkipAndReport;
    }
    let threads = args.threads.or(config.translate.threads).unwrap_or(1);

    let custom = config.translation_context(&base)?;
    let context = custom.as_ref().unwrap_or_else(|| TranslationContext::builtin());
    let translator = ScriptTranslator::new(context, args.from, args.to, options);

    let objects = read_objects(files, args.from, args.kind)?;
    let result = if threads == 1 {
        translator.translate_batch(&objects)
    } else {
        translator.translate_batch_parallel(&objects, threads)
    };
    let result = match result {
        Ok(result) => result,
        Err(err) if err.is_fatal() => anyhow::bail!("batch aborted: {}", err),
        Err(err) => return Err(err.into()),
    };

    match args.format {
        OutputFormat::Json => {
            let report = BatchReport {
                translated: &result.translated,
                failures: result
                    .failures
                    .iter()
                    .map(|f| FailureReport {
                        name: f.name.clone(),
                        kind: f.kind,
                        error: f.error.to_string(),
                    })
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            for script in &result.translated {
                if result.translated.len() > 1 {
                    println!("{}", format!("-- {} {}", script.kind, script.name).dimmed());
                }
                if let Some(fallback) = script.fallback {
                    eprintln!("{} {} translated by {:?} fallback", "⚠".yellow(), script.name, fallback);
                }
                println!("{}", script.definition);
                println!();
            }
            for failure in &result.failures {
                eprintln!("{} {} {}: {}", "✗".red(), failure.kind, failure.name.bold(), failure.error);
            }
        }
    }
    Ok(result.is_complete())
}

fn run_validate(dialect: DatabaseType, kind: Option<ObjectKind>, files: &[PathBuf]) -> Result<bool> {
    let analyser = sqlport::analyser::for_dialect(dialect);
    let mut valid = true;
    for path in files {
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let error = match kind {
            Some(kind) => analyser.analyse(kind, &text)?.error,
            None => analyser.validate(&text),
        };
        match error {
            None => println!("{} {}", "✓".green(), path.display()),
            Some(error) => {
                valid = false;
                println!("{} {}", "✗".red(), path.display());
                for item in error.items() {
                    println!(
                        "    {}:{} {} {}",
                        item.line,
                        item.column,
                        item.message.red(),
                        format!("near '{}'", item.text).dimmed()
                    );
                }
            }
        }
    }
    Ok(valid)
}

fn show_formula(expression: &str, delimiter: &str) {
    let formula = FunctionFormula::new(expression);
    println!("{}  {}", "Name:".cyan(), formula.name.yellow());
    println!("{}  {}", "Body:".cyan(), formula.body);
    for (i, arg) in formula.args(delimiter).iter().enumerate() {
        println!("  {} {}", format!("[{}]", i).dimmed(), arg.white());
    }
    let balanced = is_parenthesis_balanced(expression);
    let label = if balanced { "yes".green() } else { "no".red() };
    println!("{}  {}", "Balanced:".cyan(), label);
}

//! paramxml CLI
//!
//! Command-line interface for:
//! - Converting directories of text documents into XML (`convert`)
//! - Inspecting the persistent label -> identifier table (`mappings`)
//! - Maintaining the document store (`db`)

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use paramxml_core::ParameterRegistry;
use paramxml_storage::Persisted;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;
mod convert;
mod export;
mod llm;

use convert::{ConvertArgs, Pipeline, StoreArgs};
use export::ExportFormat;

#[derive(Parser)]
#[command(name = "paramxml")]
#[command(
    author,
    version,
    about = "paramxml: Cyrillic parameter labels to stable XML identifiers"
)]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert every `.txt` document under a directory.
    ///
    /// Each document's bullet items are resolved to identifiers through the
    /// persistent registry, so re-running over the same inputs reproduces the
    /// same XML.
    Convert(ConvertArgs),

    /// Inspect label -> identifier mappings
    Mappings {
        #[command(subcommand)]
        command: MappingsCommands,
    },

    /// Document store maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Subcommand)]
enum MappingsCommands {
    /// Dump every mapping in registration order
    Export {
        #[command(flatten)]
        store: StoreArgs,
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Output file (default: stdout)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Print the identifier registered for a label
    Lookup {
        label: String,
        #[command(flatten)]
        store: StoreArgs,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Write a snapshot and truncate the write-ahead log
    Compact {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// List stored documents
    Documents {
        #[command(flatten)]
        store: StoreArgs,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Convert(args) => cmd_convert(&args),
        Commands::Mappings { command } => match command {
            MappingsCommands::Export { store, format, out } => {
                let store = store.open()?;
                let n = export::export_mappings(&store, format, out.as_deref())?;
                if let Some(out) = out {
                    eprintln!(
                        "{} {} mappings to {}",
                        "wrote".green().bold(),
                        n,
                        out.display().to_string().bold()
                    );
                }
                Ok(())
            }
            MappingsCommands::Lookup { label, store } => {
                let store = store.open()?;
                match export::lookup_label(&store, &label)? {
                    Some(identifier) => {
                        println!("{identifier}");
                        Ok(())
                    }
                    None => Err(anyhow!("no mapping for label {label:?}")),
                }
            }
        },
        Commands::Db { command } => match command {
            DbCommands::Compact { store } => {
                let store = store.open()?;
                store.checkpoint()?;
                eprintln!(
                    "{} {} parameters, {} documents in {}",
                    "compacted".green().bold(),
                    store.parameter_count(),
                    store.documents().len(),
                    store.dir().display()
                );
                Ok(())
            }
            DbCommands::Documents { store } => {
                let store = store.open()?;
                for doc in store.documents() {
                    println!(
                        "{}\t{}\t{}\t{} parameters",
                        doc.id,
                        doc.original_filename,
                        doc.title,
                        doc.parameters.len()
                    );
                }
                Ok(())
            }
        },
    }
}

fn cmd_convert(args: &ConvertArgs) -> Result<()> {
    let pipeline = Pipeline::from_args(args)?;
    println!(
        "{} {} (translation={}, splitting={}, sinks={})",
        "Converting".green().bold(),
        args.input.display(),
        pipeline.resolver().translator_name(),
        pipeline.resolver().splitter_name(),
        pipeline.sink_names().join(",")
    );

    let summary = pipeline.convert_dir(&args.input, args.jobs)?;

    for report in &summary.reports {
        let targets: Vec<String> = report
            .persisted
            .iter()
            .map(|p| match p {
                Persisted::Row(id) => format!("db#{id}"),
                Persisted::File(path) => path.display().to_string(),
            })
            .collect();
        println!(
            "  {} {}: {} parameters [{}]",
            "→".cyan(),
            report.source.display(),
            report.parameters,
            targets.join(", ")
        );
        if !report.warnings.is_empty() {
            println!(
                "    {} {} warnings",
                "→".yellow(),
                report.warnings.len()
            );
        }
    }

    let registered = pipeline.resolver().registry().mappings()?.len();
    println!(
        "{} processed: {}, failed: {}, warnings: {}, mappings: {}",
        "done".green().bold(),
        summary.processed(),
        summary.failed.len(),
        summary.warnings(),
        registered
    );
    for (path, error) in &summary.failed {
        eprintln!("  {} {}: {}", "✗".red().bold(), path.display(), error);
    }

    if summary.failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} of {} documents failed",
            summary.failed.len(),
            summary.failed.len() + summary.processed()
        ))
    }
}

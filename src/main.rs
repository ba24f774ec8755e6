use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use frameticket_analyzer::{ComplianceAnalyzer, ComplianceReport};
use frameticket_common::EngineConfig;
use frameticket_core::{normalize_snapshot, DocumentSnapshot, RawDocument, Selection};
use frameticket_prompt::{
    assemble_concurrent, render_prompt, CallerMetadata, CancellationFlag, ContextAssembler,
    PackageOutcome,
};
use frameticket_scanner::{DesignSystemScanner, ScanIndex};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "frameticket",
    version,
    about = "Design-system compliance and ticket context for UI design documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(long, global = true, help = "Engine configuration file (JSON)")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Infer design tokens and components from a document")]
    Scan {
        #[arg(help = "Raw document JSON")]
        document: PathBuf,
    },

    #[command(about = "Score a selection against the inferred design system")]
    Analyze {
        #[arg(help = "Raw document JSON")]
        document: PathBuf,

        #[arg(short, long, required = true, value_delimiter = ',', help = "Selected node ids")]
        select: Vec<String>,
    },

    #[command(about = "Build context packages for a batch of selections")]
    Assemble {
        #[arg(help = "Raw document JSON")]
        document: PathBuf,

        #[arg(short, long, help = "Batch file: {\"selections\": [[ids]], \"metadata\": {..}}")]
        batch: PathBuf,

        #[arg(long, help = "Run selections on parallel workers")]
        concurrent: bool,
    },

    #[command(about = "Print the ticket generation prompt for one selection")]
    Prompt {
        #[arg(help = "Raw document JSON")]
        document: PathBuf,

        #[arg(short, long, required = true, value_delimiter = ',', help = "Selected node ids")]
        select: Vec<String>,

        #[arg(long, help = "Tech stack hint")]
        tech_stack: Option<String>,

        #[arg(long, help = "Frame link template with {node_id} / {file_key}")]
        link_template: Option<String>,

        #[arg(long, help = "File key substituted into templates")]
        file_key: Option<String>,
    },
}

#[derive(Deserialize)]
struct BatchFile {
    selections: Vec<Vec<String>>,
    #[serde(default)]
    metadata: CallerMetadata,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan { document } => {
            let (snapshot, index) = load_and_scan(&document, &config)?;
            eprintln!(
                "{} {} nodes, {} tokens, {} components (snapshot {})",
                "Scanned".green().bold(),
                snapshot.node_count(),
                index.tokens.len(),
                index.components.len(),
                snapshot.id().to_string().dimmed()
            );
            print_json(&index)?;
        }
        Commands::Analyze { document, select } => {
            let (snapshot, index) = load_and_scan(&document, &config)?;
            let report = ComplianceAnalyzer::new()
                .with_config(config.compliance.clone())
                .analyze(&Selection::new(select), &index, &snapshot)
                .context("Compliance analysis failed")?;
            print_report_summary(&report);
            print_json(&report)?;
        }
        Commands::Assemble {
            document,
            batch,
            concurrent,
        } => {
            let (snapshot, index) = load_and_scan(&document, &config)?;
            let raw = std::fs::read_to_string(&batch)
                .with_context(|| format!("Failed to read batch file {}", batch.display()))?;
            let batch: BatchFile =
                serde_json::from_str(&raw).context("Failed to parse batch file")?;
            let selections: Vec<Selection> =
                batch.selections.into_iter().map(Selection::new).collect();

            let outcomes = if concurrent {
                assemble_concurrent(
                    selections,
                    Arc::new(index),
                    Arc::new(snapshot),
                    batch.metadata,
                    config,
                    CancellationFlag::new(),
                )
                .await
            } else {
                ContextAssembler::with_config(config).assemble(
                    &selections,
                    &index,
                    &snapshot,
                    &batch.metadata,
                    &CancellationFlag::new(),
                )
            };
            print_outcome_summary(&outcomes);
            print_json(&outcomes)?;
        }
        Commands::Prompt {
            document,
            select,
            tech_stack,
            link_template,
            file_key,
        } => {
            let (snapshot, index) = load_and_scan(&document, &config)?;
            let metadata = CallerMetadata {
                tech_stack,
                frame_link_template: link_template,
                file_key,
                visual_reference_template: None,
            };
            let package = ContextAssembler::with_config(config)
                .assemble_one(0, &Selection::new(select), &index, &snapshot, &metadata)
                .context("Context assembly failed")?;
            if let Some(warning) = &package.quality.warning {
                eprintln!("{} {}", "Warning:".yellow().bold(), warning.message);
            }
            println!("{}", render_prompt(&package));
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = EngineConfig::from_json_str(&raw)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn load_and_scan(path: &Path, config: &EngineConfig) -> Result<(DocumentSnapshot, ScanIndex)> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document {}", path.display()))?;
    let document: RawDocument =
        serde_json::from_str(&raw).context("Failed to parse document JSON")?;
    let snapshot = normalize_snapshot(&document).context("Failed to normalize document")?;
    let index = DesignSystemScanner::new()
        .with_config(config.scan.clone())
        .scan(&snapshot);
    Ok((snapshot, index))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn colored_score(score: f64) -> ColoredString {
    let text = format!("{:.1}", score);
    if score >= 80.0 {
        text.green()
    } else if score >= 50.0 {
        text.yellow()
    } else {
        text.red()
    }
}

fn print_report_summary(report: &ComplianceReport) {
    eprintln!(
        "{} {} ({} nodes, {} violations)",
        "Compliance".bold(),
        colored_score(report.overall_score),
        report.nodes_analyzed,
        report.violations.len()
    );
    for category in &report.categories {
        eprintln!(
            "  {:<16} {}",
            category.category.as_str(),
            colored_score(category.score)
        );
    }
}

fn print_outcome_summary(outcomes: &[PackageOutcome]) {
    for outcome in outcomes {
        match outcome {
            PackageOutcome::Ready(package) => {
                let quality = &package.quality;
                let flag = if quality.warning.is_some() {
                    " low quality".yellow().to_string()
                } else {
                    String::new()
                };
                eprintln!(
                    "  #{} {} quality {}{}",
                    package.content.selection_index,
                    "ready".green(),
                    colored_score(quality.score),
                    flag
                );
            }
            PackageOutcome::Failed(error) => {
                eprintln!("  #{} {} {}", error.index, "failed".red(), error.message);
            }
            PackageOutcome::Cancelled { index } => {
                eprintln!("  #{} {}", index, "cancelled".dimmed());
            }
        }
    }
}

//! Segment Admin CLI. Inspect the attribute catalog, check and evaluate rule
//! documents, and manage segments in a file-backed store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use coach_core::{AccessContext, AppConfig};
use coach_segmentation::{
    codec, create_empty_rule, validate, AttributeCatalog, FileSegmentStore, RuleEvaluator,
    SegmentRule, SegmentService, WorkerAttributeSet,
};
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "segment-admin")]
#[command(about = "Behavior Coach segment administration tool")]
#[command(version)]
struct Cli {
    /// Segment store directory (overrides config)
    #[arg(long, env = "BEHAVIOR_COACH__SEGMENTATION__STORE_DIR")]
    store_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the worker attributes rules can reference
    Attributes {
        /// Only show one category (personal, employment, location, ...)
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Print an empty rule document
    NewRule,

    /// Check a rule document and list everything that blocks saving it
    Validate {
        /// Path to the rule document
        #[arg(short, long)]
        rule: PathBuf,
    },

    /// Evaluate a rule document against a workers file
    Evaluate {
        /// Path to the rule document
        #[arg(short, long)]
        rule: PathBuf,

        /// JSON object mapping worker id to worker attributes
        #[arg(short, long)]
        workers: PathBuf,
    },

    /// Manage stored segments of one organization
    Segment {
        /// Organization UUID
        #[arg(long, env = "BEHAVIOR_COACH_ORG")]
        org: Uuid,

        #[command(subcommand)]
        action: SegmentAction,
    },
}

#[derive(Subcommand)]
enum SegmentAction {
    /// Create a segment from a rule document
    Create {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        rule: PathBuf,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// List the organization's segments
    List,

    /// Show one segment with its rule document
    Show { id: Uuid },

    /// Delete a segment
    Delete { id: Uuid },

    /// Compute a segment's members from a workers file
    Members {
        id: Uuid,

        #[arg(short, long)]
        workers: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Warning: failed to load config ({e}), using defaults");
        AppConfig::default()
    });
    if let Some(dir) = cli.store_dir {
        config.segmentation.store_dir = dir;
    }
    init_tracing(&config);

    let catalog = AttributeCatalog::standard();
    match cli.command {
        Commands::Attributes { category } => cmd_attributes(&catalog, category),
        Commands::NewRule => cmd_new_rule(),
        Commands::Validate { rule } => cmd_validate(&catalog, &rule),
        Commands::Evaluate { rule, workers } => cmd_evaluate(&catalog, &config, &rule, &workers),
        Commands::Segment { org, action } => cmd_segment(catalog, &config, org, action).await,
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.filter.as_str().into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn cmd_attributes(catalog: &AttributeCatalog, category: Option<String>) -> anyhow::Result<()> {
    println!("Worker attributes:");
    println!();
    for def in catalog
        .definitions()
        .iter()
        .filter(|d| category.as_deref().map_or(true, |c| d.category == c))
    {
        let operators: Vec<String> = catalog
            .operators_for(&def.key)
            .iter()
            .map(|op| op.to_string())
            .collect();
        println!(
            "  {:<32} {:<8} {}",
            def.key,
            format!("{:?}", def.attribute_type).to_lowercase(),
            def.label
        );
        println!("      operators: {}", operators.join(", "));
        if !def.options.is_empty() {
            let options: Vec<&str> = def.options.iter().map(|o| o.value.as_str()).collect();
            println!("      options:   {}", options.join(", "));
        }
    }
    Ok(())
}

fn cmd_new_rule() -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&codec::encode(&create_empty_rule()))?);
    Ok(())
}

fn read_rule(path: &Path) -> anyhow::Result<SegmentRule> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading rule document {}", path.display()))?;
    codec::decode_str(&text).with_context(|| format!("decoding {}", path.display()))
}

fn read_workers(path: &Path) -> anyhow::Result<HashMap<String, WorkerAttributeSet>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading workers file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing workers file {}", path.display()))
}

fn cmd_validate(catalog: &AttributeCatalog, path: &Path) -> anyhow::Result<()> {
    let rule = read_rule(path)?;
    let issues = validate(&rule, catalog);
    if issues.is_empty() {
        println!("Rule is VALID ({} conditions)", rule.conditions().len());
        return Ok(());
    }
    eprintln!("Rule has {} issue(s):", issues.len());
    for issue in &issues {
        eprintln!("  - {:<38} {}", issue.node_id, issue.kind);
    }
    std::process::exit(1);
}

fn cmd_evaluate(
    catalog: &AttributeCatalog,
    config: &AppConfig,
    rule: &Path,
    workers: &Path,
) -> anyhow::Result<()> {
    let rule = read_rule(rule)?;
    let workers = read_workers(workers)?;
    let members = RuleEvaluator::new(catalog).evaluate_batch(
        &rule,
        &workers,
        config.segmentation.parallel_threshold,
    )?;
    info!(evaluated = workers.len(), members = members.len(), "Rule evaluated");
    println!("{}", serde_json::to_string_pretty(&members)?);
    Ok(())
}

async fn cmd_segment(
    catalog: AttributeCatalog,
    config: &AppConfig,
    org: Uuid,
    action: SegmentAction,
) -> anyhow::Result<()> {
    let store = FileSegmentStore::new(&config.segmentation.store_dir);
    let service = SegmentService::new(
        Arc::new(store),
        Arc::new(catalog),
        config.segmentation.clone(),
    );
    // The CLI operator acts as an admin of the organization it names.
    let ctx = AccessContext::admin(Uuid::new_v4(), org);

    match action {
        SegmentAction::Create {
            name,
            rule,
            description,
        } => {
            let rule = read_rule(&rule)?;
            let segment = service.create_segment(&ctx, name, description, rule).await?;
            println!("Segment created: {}", segment.id);
        }
        SegmentAction::List => {
            let segments = service.list_segments(&ctx).await?;
            println!("{} segment(s):", segments.len());
            for s in segments {
                println!(
                    "  {}  {:<32} {} conditions, updated {}",
                    s.id,
                    s.name,
                    s.rule.conditions().len(),
                    s.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        SegmentAction::Show { id } => {
            let segment = service.get_segment(&ctx, id).await?;
            println!("{}", serde_json::to_string_pretty(&segment)?);
        }
        SegmentAction::Delete { id } => {
            service.delete_segment(&ctx, id).await?;
            println!("Segment deleted: {id}");
        }
        SegmentAction::Members { id, workers } => {
            let workers = read_workers(&workers)?;
            let result = service.compute_membership(&ctx, id, &workers).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}

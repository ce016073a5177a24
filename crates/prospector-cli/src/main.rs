//! CLI binary for running the prospector lead pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use prospector_pipeline::{Orchestrator, PipelineConfig};
use prospector_services::{
    DynDiscovery, DynEnrichment, DynGeneration, FixtureDiscovery, FixtureEnrichment,
    FixtureGenerator, HttpDiscovery, HttpEnrichment, OpenAiGenerator, Persona,
};
use prospector_store::LeadStore;
use prospector_types::ProspectorError;

const EXIT_CONFIG: i32 = 2;
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(name = "prospector", version, about = "Sales lead pipeline: discover, enrich, segment, draft, review")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline for a topic
    Run {
        /// Search topic, e.g. a trade show or industry segment
        #[arg(long)]
        topic: String,

        /// How many candidate companies to discover
        #[arg(long, default_value = "20")]
        count: usize,

        /// Sender name used in outreach drafts
        #[arg(long)]
        sender: String,

        /// Sender organization
        #[arg(long)]
        org: String,

        /// One-line value proposition woven into drafts
        #[arg(long, default_value = "")]
        value_prop: String,

        /// Directory holding the lead snapshot (default: .prospector)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Use canned in-process services instead of live APIs
        #[arg(long)]
        offline: bool,
    },

    /// Summarize the current lead snapshot
    Report {
        /// Directory holding the lead snapshot (default: .prospector)
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Run {
            topic,
            count,
            sender,
            org,
            value_prop,
            store,
            offline,
        } => {
            let persona = Persona {
                sender_name: sender,
                org_name: org,
                value_prop,
            };
            cmd_run(&topic, count, persona, store_dir(store), offline).await?;
        }
        Commands::Report { store } => {
            cmd_report(store_dir(store)).await?;
        }
    }

    Ok(())
}

fn store_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| PathBuf::from(".prospector"))
}

async fn cmd_run(
    topic: &str,
    count: usize,
    persona: Persona,
    store_dir: PathBuf,
    offline: bool,
) -> anyhow::Result<()> {
    let config = PipelineConfig::new(topic, count, persona);
    let store = LeadStore::new(&store_dir);

    let orchestrator = match build_orchestrator(config, store, offline) {
        Ok(orchestrator) => orchestrator,
        Err(err @ ProspectorError::ConfigInvalid(_)) => {
            eprintln!("Configuration error: {err}");
            std::process::exit(EXIT_CONFIG);
        }
        Err(err @ ProspectorError::AuthError { .. }) => {
            eprintln!("Configuration error: {err} (set the API key, or pass --offline)");
            std::process::exit(EXIT_CONFIG);
        }
        Err(err) => return Err(err.into()),
    };

    // Ctrl-C requests a cooperative stop: in-flight calls finish and the
    // snapshot stays consistent.
    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight work");
            cancel.cancel();
        }
    });

    println!("Running pipeline for topic: {topic}");
    println!("Store: {}", store_dir.display());
    if offline {
        println!("(offline mode -- no live API calls)");
    }

    let report = orchestrator.run().await?;

    println!();
    println!("Leads:     {}", report.counts.total);
    println!("Succeeded: {}", report.counts.succeeded);
    println!("Failed:    {}", report.counts.failed);
    println!("Skipped:   {}", report.counts.skipped);
    if report.counts.flagged > 0 {
        println!("Flagged:   {} (need review attention)", report.counts.flagged);
    }
    println!("Duration:  {}ms", report.duration_ms);

    if !report.failed.is_empty() {
        println!("\nFailed leads:");
        for failure in &report.failed {
            println!(
                "  {} [{}] at {}: {}",
                failure.id, failure.name, failure.stage, failure.message
            );
        }
    }

    if report.cancelled {
        println!("\nRun cancelled; re-run to resume.");
        std::process::exit(EXIT_CANCELLED);
    }
    Ok(())
}

fn build_orchestrator(
    config: PipelineConfig,
    store: LeadStore,
    offline: bool,
) -> Result<Orchestrator, ProspectorError> {
    if offline {
        return Orchestrator::new(
            config,
            store,
            Arc::new(DynDiscovery::new(FixtureDiscovery)),
            Arc::new(DynEnrichment::new(FixtureEnrichment)),
            Arc::new(DynGeneration::new(FixtureGenerator)),
        );
    }
    Orchestrator::new(
        config,
        store,
        Arc::new(DynDiscovery::new(HttpDiscovery::from_env()?)),
        Arc::new(DynEnrichment::new(HttpEnrichment::from_env()?)),
        Arc::new(DynGeneration::new(OpenAiGenerator::from_env()?)),
    )
}

async fn cmd_report(store_dir: PathBuf) -> anyhow::Result<()> {
    let store = LeadStore::new(&store_dir);
    let loaded = store.load().await?;
    if loaded == 0 {
        println!("No snapshot at {}", store.snapshot_path().display());
        return Ok(());
    }

    let counts = store.counts().await;
    println!("Snapshot: {}", store.snapshot_path().display());
    println!("Leads:     {}", counts.total);
    println!("Succeeded: {}", counts.succeeded);
    println!("Failed:    {}", counts.failed);
    println!("Skipped:   {}", counts.skipped);
    println!("Pending:   {}", counts.pending);
    println!("Flagged:   {}", counts.flagged);

    for tier in [
        prospector_types::Tier::A,
        prospector_types::Tier::B,
        prospector_types::Tier::C,
    ] {
        let leads = store.by_tier(tier).await;
        if leads.is_empty() {
            continue;
        }
        println!("\nTier {tier}:");
        for lead in leads {
            let score = lead.segment.as_ref().map(|s| s.score).unwrap_or(0.0);
            let status = format!("{:?}", lead.status).to_lowercase();
            println!("  {:<30} {:>5.1}  {}", lead.name, score, status);
        }
    }

    let failed = store.failed_leads().await;
    if !failed.is_empty() {
        println!("\nFailed leads:");
        for failure in failed {
            println!("  {} [{}] at {}: {}", failure.id, failure.name, failure.stage, failure.message);
        }
    }
    Ok(())
}

mod classifier;
mod error;
mod fetcher;
mod notify;
mod parser;
mod pipeline;
mod registry;
mod settings;
mod watermark;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use classifier::{Category, RelevanceOracle, ZeroShotClassifier};
use error::ClassificationError;
use fetcher::{HttpFetcher, PageFetcher};
use notify::DiscordWebhook;
use parser::links::LinkSelectors;
use pipeline::{Delivery, Pipeline, PipelineOptions, RunSummary};
use registry::{Registry, RunLock};
use settings::Settings;

#[derive(Parser)]
#[command(name = "jobwatch", about = "Job board watcher: new relevant postings to a webhook")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl every registered site once and notify new relevant postings
    Run {
        /// Print instead of sending and never move the watermark
        #[arg(long)]
        dry_run: bool,
        /// Registry file (default: AID_REGISTRY_PATH or data/homepage.json)
        #[arg(short, long)]
        registry: Option<PathBuf>,
    },
    /// Show the watermark and registered sites
    Status {
        #[arg(short, long)]
        registry: Option<PathBuf>,
    },
    /// Classify one text with the relevance model
    Classify {
        text: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = Settings::load().context("Failed to load settings")?;

    let result = match cli.command {
        Commands::Run { dry_run, registry } => {
            settings.dry_run |= dry_run;
            if let Some(path) = registry {
                settings.registry_path = path;
            }
            run(&settings).await
        }
        Commands::Status { registry } => {
            let path = registry.unwrap_or_else(|| settings.registry_path.clone());
            let reg = Registry::load(&path)?;
            println!("Registry:  {}", path.display());
            println!("Watermark: {}", reg.watermark);
            println!("Sites:     {}", reg.sites.len());
            for (i, site) in reg.sites.iter().enumerate() {
                println!("{:>3} | {:<20} | {}", i + 1, truncate(&site.name, 20), site.url);
            }
            Ok(())
        }
        Commands::Classify { text } => {
            let oracle = classifier_from(&settings);
            let timeout = settings.classifier_timeout();
            let result = tokio::time::timeout(timeout, oracle.classify(&text, &Category::labels()))
                .await
                .unwrap_or_else(|_| Err(ClassificationError::Timeout(timeout)))?;
            for (label, score) in result.labels.iter().zip(&result.scores) {
                println!("{:<22} {:.3}", label, score);
            }
            println!(
                "-> {}",
                if result.is_relevant() { "relevant" } else { "not relevant" }
            );
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    info!("Done in {:.2}s", elapsed.as_secs_f64());

    result
}

async fn run(settings: &Settings) -> anyhow::Result<()> {
    let fetcher = HttpFetcher::new(settings.fetch_timeout()).context("Failed to build HTTP client")?;
    let oracle = classifier_from(settings);
    let summary = crawl(settings, &fetcher, &oracle).await?;
    summary.print();
    Ok(())
}

/// One full pass. Configuration problems abort before any site is fetched; site-level
/// failures only show up in the summary.
async fn crawl(
    settings: &Settings,
    fetcher: &dyn PageFetcher,
    oracle: &dyn RelevanceOracle,
) -> anyhow::Result<RunSummary> {
    let webhook_url = settings.require_webhook()?;
    let selectors = LinkSelectors::parse(&settings.scope_selector, &settings.anchor_selector)?;
    let lock = RunLock::acquire(&settings.registry_path)?;
    let mut registry = Registry::load(&settings.registry_path)?;

    info!(
        mode = if settings.dry_run { "dry run" } else { "production" },
        sites = registry.sites.len(),
        watermark = registry.watermark,
        lock = %lock.path().display(),
        "starting crawl"
    );

    let webhook = match webhook_url.filter(|_| !settings.dry_run) {
        Some(url) => Some(
            DiscordWebhook::new(
                url.to_string(),
                settings.discord_username.clone(),
                settings.fetch_timeout(),
            )
            .context("Failed to build webhook client")?,
        ),
        None => None,
    };
    let delivery = match &webhook {
        Some(hook) => Delivery::Webhook(hook),
        None => Delivery::DryRun {
            limit: settings.dry_run_limit,
        },
    };

    let options = PipelineOptions {
        selectors,
        max_links: settings.max_links_per_site,
        classify_timeout: settings.classifier_timeout(),
        unresolved_ids: settings.unresolved_id_policy(),
    };
    let summary = Pipeline::new(fetcher, oracle, delivery, options)
        .run(&mut registry, &settings.registry_path)
        .await;
    Ok(summary)
}

fn classifier_from(settings: &Settings) -> ZeroShotClassifier {
    ZeroShotClassifier::new(
        settings.classifier_url.clone(),
        settings.classifier_token.clone(),
        settings.hypothesis_template.clone(),
    )
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

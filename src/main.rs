//! # siteindex CLI
//!
//! Command-line front end for the crawl pipeline:
//!
//! - `crawl`: register a domain and run one crawl job with a live page count
//! - `status`: show a job's status report
//! - `domains`: list registered domains
//! - `pages`: page through the pages stored for a domain
//!
//! Every knob falls back to an environment variable so the binary can run
//! unattended.

mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use siteindex::crawler::{CrawlServices, CrawlerConfig, MediaScanPolicy};
use siteindex::index::Database;
use siteindex::jobs::{JobStatus, JobStore, Orchestrator, OrchestratorConfig};
use siteindex::media::{MediaConfig, MediaPipeline, WhisperCommand, YtDlpToolkit};
use siteindex::model::{GeminiClient, Tier};
use siteindex::processor::{
    CompletionTagger, Embedder, HashEmbedder, KeywordTagger, ProcessorConfig, RigEmbedder,
    Tagger,
};
use siteindex::render::{HttpRendererFactory, RendererFactory};
use tracing::{info, instrument, warn};

/// Dimensions of the offline hash embedder
const HASH_DIMENSIONS: usize = 256;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(author, version, about = "Crawl a website and index its content", long_about = None)]
struct Cli {
    /// Write a daily rolling log file into this directory
    #[arg(long, global = true, env = "SITEINDEX_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Export spans and metrics over OTLP
    #[arg(long, global = true)]
    otlp: bool,

    /// Database path
    #[arg(long, global = true, env = "SITEINDEX_DB", default_value = "siteindex.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl a website and index its pages
    Crawl(CrawlArgs),

    /// Show the status of a crawl job
    Status(StatusArgs),

    /// List registered domains
    Domains,

    /// List the pages stored for a domain
    Pages(PagesArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RendererKind {
    Http,
    Chrome,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmbedderKind {
    Hash,
    Gemini,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TaggerKind {
    Keyword,
    Gemini,
}

#[derive(Args, Debug)]
struct CrawlArgs {
    /// Start URL
    #[arg(required = true)]
    url: String,

    /// Maximum number of pages to store
    #[arg(short = 'p', long, env = "SITEINDEX_MAX_PAGES", default_value = "1000")]
    max_pages: usize,

    /// Crawl workers
    #[arg(short, long, env = "SITEINDEX_WORKERS", default_value = "3")]
    workers: usize,

    /// Pages scanned for media (landing|every|off)
    #[arg(long, env = "SITEINDEX_MEDIA_SCAN", default_value = "landing")]
    media_scan: MediaScanPolicy,

    /// Page renderer
    #[arg(long, value_enum, default_value = "http")]
    renderer: RendererKind,

    /// Embedding backend
    #[arg(long, value_enum, default_value = "hash")]
    embedder: EmbedderKind,

    /// Tagging backend
    #[arg(long, value_enum, default_value = "keyword")]
    tagger: TaggerKind,

    /// Use the free tier rate limits for Gemini
    #[arg(long)]
    free_tier: bool,

    /// whisper executable
    #[arg(long, env = "WHISPER_BIN", default_value = "whisper-cli")]
    whisper_bin: String,

    /// whisper model file; media is recorded but not transcribed without one
    #[arg(long, env = "WHISPER_MODEL")]
    whisper_model: Option<PathBuf>,

    /// Language hint for transcription
    #[arg(long)]
    language: Option<String>,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Job id
    job_id: i64,

    /// Print JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct PagesArgs {
    /// Domain id
    domain_id: i64,

    /// Page number, starting at 1
    #[arg(long, default_value = "1")]
    page: usize,

    /// Pages per listing page
    #[arg(long, default_value = "20")]
    per_page: usize,

    /// Print JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _telemetry = telemetry::init_tracing_subscriber(cli.otlp, cli.log_dir.as_deref())?;

    let db = Database::open(&cli.db).await?;
    match cli.command {
        Commands::Crawl(args) => crawl_command(db, args).await,
        Commands::Status(args) => status_command(db, args).await,
        Commands::Domains => domains_command(db).await,
        Commands::Pages(args) => pages_command(db, args).await,
    }
}

fn renderer(kind: RendererKind) -> anyhow::Result<Arc<dyn RendererFactory>> {
    match kind {
        RendererKind::Http => Ok(Arc::new(HttpRendererFactory::new())),
        #[cfg(feature = "chrome")]
        RendererKind::Chrome => Ok(Arc::new(siteindex::render::ChromeRendererFactory::new())),
        #[cfg(not(feature = "chrome"))]
        RendererKind::Chrome => Err(anyhow!(
            "the chrome renderer requires building with `--features chrome`"
        )),
    }
}

fn media_pipeline(args: &CrawlArgs) -> Option<Arc<MediaPipeline>> {
    if args.media_scan == MediaScanPolicy::Disabled {
        return None;
    }
    let Some(model) = args.whisper_model.clone() else {
        warn!("No whisper model configured, media will be recorded without transcripts");
        return None;
    };

    let config = MediaConfig::builder()
        .language(args.language.clone())
        .build();
    let stt = WhisperCommand::new(args.whisper_bin.clone(), model)
        .with_timeout(config.command_timeout);
    Some(Arc::new(MediaPipeline::new(
        Arc::new(YtDlpToolkit::new(config.clone())),
        Arc::new(stt),
        config,
    )))
}

fn services(db: &Database, args: &CrawlArgs) -> anyhow::Result<CrawlServices> {
    let processor = ProcessorConfig::default();
    let uses_gemini =
        matches!(args.embedder, EmbedderKind::Gemini) || matches!(args.tagger, TaggerKind::Gemini);
    let gemini = if uses_gemini {
        let tier = if args.free_tier { Tier::Free } else { Tier::Standard };
        Some(GeminiClient::gemini_from_env(tier)?)
    } else {
        None
    };

    let embedder: Arc<dyn Embedder> = match (args.embedder, &gemini) {
        (EmbedderKind::Gemini, Some(client)) => Arc::new(RigEmbedder::new(client.embedding().clone())),
        _ => Arc::new(HashEmbedder::new(HASH_DIMENSIONS)),
    };
    let tagger: Arc<dyn Tagger> = match (args.tagger, &gemini) {
        (TaggerKind::Gemini, Some(client)) => Arc::new(CompletionTagger::new(
            client.completion().clone(),
            processor.max_tags,
        )),
        _ => Arc::new(KeywordTagger::new(processor.max_tags)),
    };

    Ok(CrawlServices {
        renderer: renderer(args.renderer)?,
        media: media_pipeline(args),
        tagger,
        embedder,
        index: Arc::new(db.clone()),
        pages: Arc::new(db.clone()),
    })
}

#[instrument(skip(db))]
async fn crawl_command(db: Database, args: CrawlArgs) -> anyhow::Result<()> {
    let services = services(&db, &args)?;
    let config = OrchestratorConfig::builder()
        .workers(args.workers)
        .crawler(
            CrawlerConfig::builder()
                .max_pages(args.max_pages)
                .media_scan(args.media_scan)
                .build(),
        )
        .build();
    let orchestrator = Orchestrator::start(services, Arc::new(db), config);

    let domain = orchestrator.register_domain(&args.url).await?;
    let job_id = orchestrator.start_crawl(domain.id, &domain.url).await?;
    info!(domain_id = domain.id, job_id, "Crawl started");

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(120));

    let report = loop {
        let report = orchestrator.get_job_status(job_id).await?;
        spinner.set_message(format!(
            "{} {}: {} pages",
            report.status, domain.url, report.pages_scraped
        ));
        if report.status.is_terminal() {
            break report;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };
    spinner.finish_and_clear();
    orchestrator.shutdown().await;

    match report.status {
        JobStatus::Failed => Err(anyhow!(
            "job {} failed after {} pages: {}",
            job_id,
            report.pages_scraped,
            report.error.unwrap_or_default()
        )),
        _ => {
            println!(
                "Job {} {}: {} pages from {} (domain {})",
                job_id, report.status, report.pages_scraped, domain.url, domain.id
            );
            Ok(())
        }
    }
}

async fn status_command(db: Database, args: StatusArgs) -> anyhow::Result<()> {
    let job = db
        .get_job(args.job_id)
        .await?
        .ok_or_else(|| anyhow!("job {} not found", args.job_id))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&job)?);
        return Ok(());
    }

    println!("Job {} (domain {})", job.id, job.domain_id);
    println!("  status:  {}", job.status);
    println!("  pages:   {}", job.pages_scraped);
    println!("  created: {}", job.created_at.to_rfc3339());
    if let Some(completed_at) = job.completed_at {
        println!("  done:    {}", completed_at.to_rfc3339());
    }
    if let Some(error) = &job.error {
        println!("  error:   {}", error);
    }
    Ok(())
}

async fn domains_command(db: Database) -> anyhow::Result<()> {
    let domains = db.list_domains().await?;
    if domains.is_empty() {
        println!("No domains registered.");
        return Ok(());
    }

    for domain in domains {
        let last = domain
            .last_scraped_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:>4}  {:<10} {:>6} pages  last crawl {}  {}",
            domain.id, domain.status.as_str(), domain.pages_scraped, last, domain.url
        );
    }
    Ok(())
}

async fn pages_command(db: Database, args: PagesArgs) -> anyhow::Result<()> {
    let listing = db
        .list_pages(args.domain_id, args.page, args.per_page)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for page in &listing.pages {
        println!("{:>6}  {:>6} words  {}", page.id, page.word_count, page.url);
        if !page.title.is_empty() {
            println!("        {}", page.title);
        }
        if !page.media_refs.is_empty() {
            println!(
                "        {} media, {} transcribed",
                page.media_refs.len(),
                page.transcriptions.len()
            );
        }
    }
    println!(
        "Page {} of {} ({} pages total)",
        listing.page,
        listing.total_pages.max(1),
        listing.total
    );
    Ok(())
}

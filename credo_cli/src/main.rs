use std::{
    fs,
    path::PathBuf,
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::runtime::Runtime;

use credo_extraction::{
    ClaimRecord, ExtractionRuntime, ExtractionTelemetry, IngestReport, VerificationSummary,
};
use credo_telemetry::{EventPublisher, FileEventPublisher};
use credo_verification::{
    BatchReport, LoopbackSearchClient, LoopbackSynthesizer, VerificationEngine,
    VerificationTelemetry, VerifyOptions,
};

#[derive(Parser, Debug)]
#[command(
    name = "credo",
    version,
    about = "News-claim extraction and fact verification pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs claim extraction (and optionally verification) over a document.
    Analyze(AnalyzeArgs),
    /// Prints the verification summary of a previously saved report.
    Summary {
        /// Path to a report produced by `credo analyze --output`.
        report: PathBuf,
    },
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Path to the input document; omit when using --text.
    input: Option<PathBuf>,
    /// Inline text instead of an input file.
    #[arg(long)]
    text: Option<String>,
    /// Also run a verification pass over the extracted claims.
    #[arg(long)]
    verify: bool,
    /// Worker cap for sentence processing and claim verification.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,
    /// Topic hint prefixed onto derived search queries.
    #[arg(long, default_value = "")]
    query_context: String,
    /// Directory receiving JSONL telemetry logs.
    #[arg(long)]
    log_dir: Option<PathBuf>,
    /// JSONL file receiving lifecycle events.
    #[arg(long)]
    event_log: Option<PathBuf>,
    /// Writes the report here in addition to stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Full report emitted by `credo analyze`.
#[derive(Debug, Serialize, Deserialize)]
struct AnalyzeReport {
    generated_at: DateTime<Utc>,
    ingest: IngestReport,
    claims: Vec<ClaimRecord>,
    summary: VerificationSummary,
    verification: Option<BatchReport>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze(args) => analyze(&args),
        Commands::Summary { report } => summary(&report),
    }
}

fn analyze(args: &AnalyzeArgs) -> Result<()> {
    let text = load_input(args)?;
    let event_publisher: Option<Arc<dyn EventPublisher>> = match &args.event_log {
        Some(path) => Some(Arc::new(FileEventPublisher::new(path)?)),
        None => None,
    };

    let extraction_telemetry = build_extraction_telemetry(args, event_publisher.clone())?;
    let verification_telemetry = build_verification_telemetry(args, event_publisher)?;

    let runtime = ExtractionRuntime::bootstrap()
        .with_max_concurrency(args.concurrency)
        .with_telemetry(extraction_telemetry);

    let rt = Runtime::new()?;
    // The original handle must outlive block_on: the event runtime it owns
    // cannot be dropped from async context.
    let report = rt.block_on(run_pipeline(
        &runtime,
        verification_telemetry.clone(),
        args,
        &text,
    ))?;

    let rendered = serde_json::to_string_pretty(&report)?;
    if let Some(path) = &args.output {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &rendered)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }
    println!("{rendered}");
    Ok(())
}

async fn run_pipeline(
    runtime: &ExtractionRuntime,
    verification_telemetry: VerificationTelemetry,
    args: &AnalyzeArgs,
    text: &str,
) -> Result<AnalyzeReport> {
    let ingest = runtime.ingest(text).await?;
    let store = runtime.store();

    let verification = if args.verify {
        // Offline runs verify against the document itself: each sentence is
        // seeded into the loopback provider as a pseudo-source.
        let mut search = LoopbackSearchClient::new();
        for sentence in &ingest.sentences {
            search = search.with_document(
                format!("Document sentence {}", sentence.id),
                format!("doc://sentence/{}", sentence.id),
                sentence.text.clone(),
            );
        }
        let engine = VerificationEngine::new(
            store.clone(),
            Arc::new(search),
            Arc::new(LoopbackSynthesizer),
        )
        .with_options(VerifyOptions {
            max_concurrency: args.concurrency,
            query_context: args.query_context.clone(),
            ..VerifyOptions::default()
        })
        .with_telemetry(verification_telemetry);
        Some(engine.verify_pending().await?)
    } else {
        None
    };

    Ok(AnalyzeReport {
        generated_at: Utc::now(),
        ingest,
        claims: store.all(),
        summary: store.verification_summary(),
        verification,
    })
}

fn summary(report_path: &PathBuf) -> Result<()> {
    let raw = fs::read_to_string(report_path)
        .with_context(|| format!("reading report {}", report_path.display()))?;
    let report: AnalyzeReport = serde_json::from_str(&raw).context("parsing report JSON")?;
    let rendered = serde_json::to_string_pretty(&json!({
        "generated_at": report.generated_at,
        "claims": report.claims.len(),
        "summary": report.summary,
    }))?;
    println!("{rendered}");
    Ok(())
}

fn load_input(args: &AnalyzeArgs) -> Result<String> {
    match (&args.input, &args.text) {
        (Some(_), Some(_)) => bail!("pass either an input file or --text, not both"),
        (Some(path), None) => fs::read_to_string(path)
            .with_context(|| format!("reading input {}", path.display())),
        (None, Some(text)) => Ok(text.clone()),
        (None, None) => bail!("an input file or --text is required"),
    }
}

fn build_extraction_telemetry(
    args: &AnalyzeArgs,
    event_publisher: Option<Arc<dyn EventPublisher>>,
) -> Result<ExtractionTelemetry> {
    let mut builder = ExtractionTelemetry::builder("extraction");
    if let Some(dir) = &args.log_dir {
        builder = builder.log_path(dir.join("extraction.log"));
    }
    if let Some(publisher) = event_publisher {
        builder = builder.event_publisher(publisher);
    }
    builder.build()
}

fn build_verification_telemetry(
    args: &AnalyzeArgs,
    event_publisher: Option<Arc<dyn EventPublisher>>,
) -> Result<VerificationTelemetry> {
    let mut builder = VerificationTelemetry::builder("verification");
    if let Some(dir) = &args.log_dir {
        builder = builder.log_path(dir.join("verification.log"));
    }
    if let Some(publisher) = event_publisher {
        builder = builder.event_publisher(publisher);
    }
    builder.build()
}

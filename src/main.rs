//! Demo binary for render-orchestrator
//!
//! Runs one render job end to end, against the in-process simulator by
//! default or against the configured endpoint with `--live`.
//!
//! ## Environment Variables
//!
//! - `LOG_FORMAT=json` — overrides `[observability] log_format`
//! - `RUST_LOG=info` — log level filter

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use render_orchestrator::config::loader::load_from_file;
use render_orchestrator::config::{json_schema, OrchestratorConfig};
use render_orchestrator::service::SimulationProfile;
use render_orchestrator::{
    format_minutes_seconds, init_tracing_with_format, metrics, CharacterDescriptor, EtaEstimator,
    EventSink, HttpRenderService, IdentityProfile, JobEvent, JobStatus, Orchestrator,
    OrchestratorError, RenderService, SimulatedRenderService, SourceImage, Tier,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "render-orchestrator", version, about = "Character render job orchestrator")]
struct Cli {
    #[arg(long, global = true, help = "TOML config file (defaults apply when omitted)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit one job and follow it to a terminal status.
    Run {
        #[arg(long)]
        character: String,
        #[arg(long, default_value = "Original")]
        source: String,
        #[arg(long, value_enum, default_value_t = TierArg::Modern)]
        tier: TierArg,
        #[arg(long = "image", help = "Source photo (1 to 3; repeat the flag)")]
        images: Vec<PathBuf>,
        #[arg(long, help = "Identity profile JSON")]
        profile: Option<PathBuf>,
        #[arg(long, default_value_t = false, help = "Talk to the configured endpoint")]
        live: bool,
        #[arg(long, default_value_t = 0, help = "Simulator: jobs ahead at submission")]
        queue: u32,
        #[arg(long, default_value_t = 0, help = "Simulator: throttle the first N calls")]
        throttle: u32,
        #[arg(long, help = "Cancel after this many seconds")]
        cancel_after: Option<u64>,
    },
    /// Print the ETA for a tier and queue position.
    Estimate {
        #[arg(long, value_enum)]
        tier: TierArg,
        #[arg(long, default_value_t = 0)]
        queue: u32,
    },
    /// Print the config file JSON Schema.
    Schema,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TierArg {
    Modern,
    Superhero,
    Fantasy,
    Cartoon,
}

impl From<TierArg> for Tier {
    fn from(arg: TierArg) -> Self {
        match arg {
            TierArg::Modern => Tier::Modern,
            TierArg::Superhero => Tier::Superhero,
            TierArg::Fantasy => Tier::Fantasy,
            TierArg::Cartoon => Tier::Cartoon,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_from_file(path)?,
        None => OrchestratorConfig::default(),
    };

    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| config.observability.log_format.clone());
    let _ = init_tracing_with_format(&format);
    metrics::init_metrics()?;

    match cli.command {
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&json_schema())?);
        }
        Commands::Estimate { tier, queue } => {
            let seconds = EtaEstimator::new(config.estimator.clone()).estimate(tier.into(), queue);
            println!("{} ({seconds}s)", format_minutes_seconds(seconds));
        }
        Commands::Run {
            character,
            source,
            tier,
            images,
            profile,
            live,
            queue,
            throttle,
            cancel_after,
        } => {
            let service: Arc<dyn RenderService> = if live {
                info!(base_url = config.service.base_url(), "using live endpoint");
                Arc::new(HttpRenderService::from_config(&config.service))
            } else {
                let sim = SimulatedRenderService::new(SimulationProfile {
                    initial_queue: queue,
                    ..SimulationProfile::default()
                });
                sim.throttle_next(throttle);
                Arc::new(sim)
            };

            let images = read_images(&images)?;
            let profile = match profile {
                Some(path) => Some(IdentityProfile::from_json(&std::fs::read_to_string(path)?)?),
                None => None,
            };
            let character = CharacterDescriptor::new(character, source, tier.into());

            run_job(&config, service, images, character, profile, cancel_after).await?;
        }
    }

    Ok(())
}

async fn run_job(
    config: &OrchestratorConfig,
    service: Arc<dyn RenderService>,
    images: Vec<SourceImage>,
    character: CharacterDescriptor,
    profile: Option<IdentityProfile>,
    cancel_after: Option<u64>,
) -> Result<(), OrchestratorError> {
    let orchestrator = Arc::new(Orchestrator::new(service, config));
    let (sink, mut rx) = EventSink::channel();

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let handle = orchestrator
        .submit(images, character, profile, &sink)
        .await?;

    let canceller = cancel_after.map(|secs| {
        let orchestrator = orchestrator.clone();
        let handle = handle.clone();
        let sink = sink.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            match orchestrator.cancel(&handle, &sink).await {
                Ok(outcome) => info!(?outcome, "cancel finished"),
                Err(e) => tracing::error!(error = %e, "cancel failed"),
            }
        })
    });

    let job = orchestrator
        .poll_until_terminal(&handle, &sink, config.polling.max_wait(), config.polling.interval())
        .await;
    if let Some(task) = canceller {
        // a cancel that ended the job may still be forwarding its refund
        if job.status() != JobStatus::Cancelled {
            task.abort();
        }
        let _ = task.await;
    }
    drop(sink);
    let _ = printer.await;

    match job.status() {
        JobStatus::Completed => println!("done: {}", job.result_url().unwrap_or("(no url)")),
        JobStatus::Cancelled => println!(
            "cancelled, {} credit(s) refunded",
            job.refund_credits().unwrap_or(0)
        ),
        _ => match job.failure() {
            Some(failure) if failure.is_retryable() => println!("failed: {failure} (retry?)"),
            Some(failure) => println!("failed: {failure} (try again later)"),
            None => println!("ended {}", job.status().as_str()),
        },
    }
    Ok(())
}

fn print_event(event: &JobEvent) {
    match event {
        JobEvent::Submitted {
            job_id,
            queue_position,
            eta,
        } => println!(
            "submitted {job_id}: {queue_position} ahead, ETA {}",
            format_minutes_seconds(eta.as_secs())
        ),
        JobEvent::Retrying { attempt, delay } => println!(
            "busy (attempt {attempt}), retrying in {}",
            format_minutes_seconds(delay.as_secs())
        ),
        JobEvent::Countdown { remaining } => {
            println!("  {}", format_minutes_seconds(remaining.as_secs()))
        }
        JobEvent::Progress {
            status,
            message,
            elapsed,
            ..
        } => println!(
            "[{}] {}: {message}",
            format_minutes_seconds(elapsed.as_secs()),
            status.as_str()
        ),
    }
}

/// Load photos from disk; with none given, use a placeholder.
fn read_images(paths: &[PathBuf]) -> Result<Vec<SourceImage>, std::io::Error> {
    if paths.is_empty() {
        return Ok(vec![SourceImage::jpeg(vec![0xFF, 0xD8, 0xFF, 0xD9])]);
    }
    paths
        .iter()
        .map(|path| {
            Ok(SourceImage {
                mime_type: mime_for(path).to_string(),
                data: std::fs::read(path)?,
            })
        })
        .collect()
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        Some(ext) if ext.eq_ignore_ascii_case("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use spinescan::backend::cloud_text::CloudTextDetectionBackend;
use spinescan::backend::local_engine::{LocalTextRecognitionBackend, release_local_engine};
use spinescan::backend::vision_model::VisionModelBackend;
use spinescan::backend::{BackendAdapter, ImageInput};
use spinescan::config::{BackendKind, PipelineConfig};
use spinescan::enrich::{JsonCatalog, MetadataProvider};
use spinescan::pipeline::{Pipeline, PipelineReport, create_cancel_flag};
use std::path::PathBuf;
use tokio::signal;

/// Spinescan - detect and consolidate movie titles from a shelf photo
#[derive(Parser, Debug)]
#[command(name = "spinescan")]
#[command(about = "Detect movie titles on media spines in a photo", long_about = None)]
struct Args {
    /// Path to the shelf photo (JPEG or PNG)
    image: PathBuf,

    /// Comma-separated backend order: vision-model, cloud-text, local
    #[arg(short = 'b', long, value_delimiter = ',')]
    backends: Option<Vec<BackendKind>>,

    /// Similarity at or above which two candidates merge (0.0 - 1.0)
    #[arg(long)]
    merge_threshold: Option<f64>,

    /// Candidates one backend must yield to stop the fallback chain early
    #[arg(long)]
    min_sufficient: Option<usize>,

    /// Maximum number of ranked titles to report
    #[arg(long)]
    max_results: Option<usize>,

    /// Per-backend timeout in seconds
    #[arg(long)]
    backend_timeout: Option<u64>,

    /// Overall pipeline deadline in seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// Optional TOML config file (flags above override its values)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Optional JSON metadata catalog used to enrich the results
    #[arg(short = 'm', long)]
    metadata: Option<PathBuf>,

    /// Print the report as JSON instead of text
    #[arg(long, default_value = "false")]
    json: bool,

    /// Include per-backend outcomes in the output
    #[arg(short = 'd', long, default_value = "false")]
    diagnostics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder()
        .filter(None, log::LevelFilter::Info)
        .filter(Some("spinescan"), log::LevelFilter::Debug)
        .init();

    let args = Args::parse();
    let config = resolve_config(&args)?;

    if config.backend_order.is_empty() {
        anyhow::bail!("At least one backend must be configured");
    }

    let bytes = std::fs::read(&args.image)?;
    info!("Loaded {} ({} bytes)", args.image.display(), bytes.len());

    let catalog = match &args.metadata {
        Some(path) => {
            let catalog = JsonCatalog::load(path)?;
            info!("Loaded metadata catalog with {} entries", catalog.len());
            Some(catalog)
        }
        None => None,
    };

    let backends = build_backends(&config.backend_order)?;
    let cancel = create_cancel_flag();
    let cancel_ctrl_c = cancel.clone();

    let pipeline = Pipeline::new(config, cancel.clone());
    let image = ImageInput::new(bytes);

    let report = tokio::select! {
        result = pipeline.run(&backends, image) => result?,
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => {
                    info!("Received Ctrl-C, shutting down gracefully...");
                    cancel_ctrl_c.store(true, std::sync::atomic::Ordering::Relaxed);
                }
                Err(err) => {
                    error!("Unable to listen for shutdown signal: {}", err);
                }
            }
            release_local_engine();
            return Ok(());
        }
    };

    release_local_engine();
    print_report(&args, &report, catalog.as_ref())?;

    Ok(())
}

/// Merge the optional config file with command-line overrides.
fn resolve_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(order) = &args.backends {
        config.backend_order = order.clone();
    }
    if let Some(threshold) = args.merge_threshold {
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!("Merge threshold must be between 0.0 and 1.0");
        }
        config.merge_threshold = threshold;
    }
    if let Some(min) = args.min_sufficient {
        config.min_sufficient = min;
    }
    if let Some(max) = args.max_results {
        config.max_results = max;
    }
    if let Some(timeout) = args.backend_timeout {
        config.backend_timeout_secs = timeout;
    }
    if let Some(deadline) = args.deadline {
        config.overall_deadline_secs = deadline;
    }

    Ok(config)
}

fn build_backends(order: &[BackendKind]) -> Result<Vec<BackendAdapter>> {
    order
        .iter()
        .map(|kind| {
            let adapter = match kind {
                BackendKind::VisionModel => BackendAdapter::VisionModel(VisionModelBackend::new()?),
                BackendKind::CloudText => BackendAdapter::CloudText(CloudTextDetectionBackend::new()?),
                BackendKind::Local => BackendAdapter::Local(LocalTextRecognitionBackend::new()?),
            };
            Ok(adapter)
        })
        .collect()
}

fn print_report(args: &Args, report: &PipelineReport, catalog: Option<&JsonCatalog>) -> Result<()> {
    if args.json {
        let mut value = serde_json::to_value(report)?;
        if let Some(catalog) = catalog {
            let enriched: serde_json::Map<String, serde_json::Value> = report
                .results
                .iter()
                .filter_map(|result| {
                    catalog
                        .lookup(&result.title)
                        .and_then(|meta| serde_json::to_value(meta).ok())
                        .map(|meta| (result.title.clone(), meta))
                })
                .collect();
            value["enrichment"] = serde_json::Value::Object(enriched);
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if report.results.is_empty() {
        println!("No titles detected. Add titles manually or retry with another photo.");
    } else {
        println!("Detected {} title(s):", report.results.len());
        for (index, result) in report.results.iter().enumerate() {
            match catalog.and_then(|c| c.lookup(&result.title)) {
                Some(meta) => {
                    let year = meta
                        .release_year
                        .map(|y| format!(" ({y})"))
                        .unwrap_or_default();
                    println!(
                        "{:>3}. {} [{:.2}] - {}{}",
                        index + 1,
                        result.title,
                        result.confidence,
                        meta.title,
                        year
                    );
                }
                None => {
                    println!("{:>3}. {} [{:.2}]", index + 1, result.title, result.confidence);
                }
            }
        }
    }

    if args.diagnostics {
        println!("\nBackend outcomes:");
        for outcome in &report.outcomes {
            let status = match (outcome.success, &outcome.error) {
                (true, _) => format!("ok, {} detections", outcome.detections.len()),
                (false, Some(kind)) => format!("failed: {:?}", kind),
                (false, None) => "failed".to_string(),
            };
            println!("  {} - {}", outcome.backend_name, status);
        }
    }

    Ok(())
}

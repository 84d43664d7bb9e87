//! Storyboard worker binary.
//!
//! Usage: `backdrop-worker <script.json> [--output-dir <dir>]`

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use backdrop_worker::{ScriptJob, ScriptProcessor, WorkerConfig};

/// Command-line arguments for backdrop-worker
#[derive(Parser, Debug)]
#[command(name = "backdrop-worker")]
#[command(about = "Plans storyboard backgrounds for a parsed script")]
#[command(version)]
struct Args {
    /// Script job JSON file
    script: PathBuf,

    /// Directory the report is written to (overrides BACKDROP_OUTPUT_DIR)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("backdrop=info".parse().unwrap())
        .add_directive("reqwest=warn".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    if let Err(e) = run(args).await {
        error!("Worker failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    info!("Starting backdrop-worker");

    let mut config = WorkerConfig::from_env().context("invalid configuration")?;
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    info!(
        output_dir = %config.output_dir.display(),
        threshold = config.continuity.similarity_threshold,
        "Worker config loaded"
    );

    let job = ScriptJob::from_path(&args.script)
        .await
        .with_context(|| format!("failed to load script job from {}", args.script.display()))?;

    let mut processor = ScriptProcessor::from_config(&config)?;
    let report = processor.process(job).await?;
    let path = report.write_to(&config.output_dir).await?;

    info!(
        job_id = %report.job_id,
        scenes = report.scenes.len(),
        backgrounds = report.background_count(),
        inherited = report.inherited_count(),
        report = %path.display(),
        "Storyboard report written"
    );
    Ok(())
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

// Use the library instead of redeclaring modules
use m3u_prober::{
    config::Config,
    models::NoPassFallback,
    observability::init_logging,
    output::write_outputs,
    services::BatchRunner,
    sources::load_file,
};

#[derive(Parser)]
#[command(name = "m3u-prober")]
#[command(version)]
#[command(about = "Probe IPTV channel candidates and keep the fastest live streams")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Candidate list (M3U or TXT), repeatable
    #[arg(short, long = "input", value_name = "FILE", required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for the generated playlists (overrides config file)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Maximum probes in flight
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Maximum URLs kept per channel (0 keeps all)
    #[arg(long, value_name = "N")]
    max_per_channel: Option<usize>,

    /// Minimum sampled throughput in Mbps
    #[arg(long, value_name = "MBPS")]
    min_throughput: Option<f64>,

    /// What to emit for channels where nothing passed (drop, best-effort)
    #[arg(long, value_name = "MODE")]
    no_pass_fallback: Option<NoPassFallback>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_filter = format!("m3u_prober={}", cli.log_level);
    init_logging(&log_filter, cli.log_json).map_err(anyhow::Error::msg)?;

    info!("Starting M3U Prober v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    // Override config with CLI arguments
    if let Some(dir) = cli.output_dir {
        config.output.directory = dir;
    }
    if let Some(concurrency) = cli.concurrency {
        config.probe.concurrency = concurrency;
    }
    if let Some(max) = cli.max_per_channel {
        config.selection.max_per_channel = max;
    }
    if let Some(mbps) = cli.min_throughput {
        config.probe.min_throughput_mbps = mbps;
    }
    if let Some(fallback) = cli.no_pass_fallback {
        config.selection.no_pass_fallback = fallback;
    }
    config.validate()?;

    let mut entries = Vec::new();
    for input in &cli.inputs {
        match load_file(input).await {
            Ok(loaded) => entries.extend(loaded),
            Err(e) => warn!("Skipping input: {}", e),
        }
    }
    if entries.is_empty() {
        anyhow::bail!("No usable candidate entries in {} input file(s)", cli.inputs.len());
    }

    let group_order = config.naming.group_order.clone();
    let output = config.output.clone();
    let runner = BatchRunner::from_config(config)
        .await
        .context("failed to build probe pipeline")?;

    // Interruption is an error so the process exits non-zero
    let report = runner
        .run_until(entries, tokio::signal::ctrl_c())
        .await
        .context("no playlists written")?;

    let written = write_outputs(&report.selected, &group_order, &output).await?;
    for path in &written {
        info!("Wrote {}", path.display());
    }

    info!(
        run_id = %report.run_id,
        stats = %serde_json::to_string(&report.stats)?,
        "Run summary"
    );
    if report.stats.partial {
        warn!("Overall deadline reached; results are partial");
    }

    Ok(())
}

use anyhow::Context;
use clap::Parser;
use landcover_change::PipelineConfig;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Level};

#[derive(Debug, Parser)]
#[command(version, about = "Compare 1848 and 2018 land cover inside the 1400 m contour")]
struct Args {
    /// JSON file overriding the built-in study configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    print_config: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let config = match &args.config {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let t0 = Instant::now();
    let (outputs, written) = landcover_change::run(&config)?;
    info!("Areas:\n{}", outputs.areas);
    info!(
        "Wrote {} files in {:.3}s",
        written.len(),
        t0.elapsed().as_secs_f64()
    );
    Ok(())
}

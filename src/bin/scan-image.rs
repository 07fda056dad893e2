//! Scan a local leaf image without the HTTP layer
//!
//! Prints the same JSON body `POST /scan` would return.

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use onlytech_scan::config::Config;
use onlytech_scan::handlers::scan::ScanResponse;
use onlytech_scan::{load_advisories, load_inference};

#[derive(Parser, Debug)]
#[command(name = "scan-image")]
#[command(version)]
#[command(about = "Classify a leaf image and print the scan response")]
struct Cli {
    /// Image to classify
    image: PathBuf,

    /// ONNX model (overrides MODEL_PATH)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Label table (overrides LABELS_PATH and the model's own names)
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Square input size (overrides IMAGE_SIZE)
    #[arg(long)]
    image_size: Option<u32>,

    /// Print compact JSON
    #[arg(long)]
    compact: bool,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let mut config = Config::from_env();
    if let Some(model) = cli.model {
        config.model_path = model;
    }
    if cli.labels.is_some() {
        config.labels_path = cli.labels;
    }
    if let Some(size) = cli.image_size {
        config.image_size = size;
    }

    let inference = load_inference(&config)?;
    let advisories = load_advisories(&config)?;

    let result = inference.classify_blocking(&cli.image);
    let advice = advisories.advise(&result.disease);
    let response = ScanResponse::assemble(result, advice);

    let json = if cli.compact {
        serde_json::to_string(&response)?
    } else {
        serde_json::to_string_pretty(&response)?
    };
    println!("{}", json);

    Ok(())
}

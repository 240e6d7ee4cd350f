//! get-values
//!
//! Extracts raster values at query geometries for a list of catalog items
//! and writes a `{status, data}` JSON response.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use get_values::{Response, ServiceConfig, Workflow, WorkflowInput};

#[derive(Parser, Debug, Clone)]
#[command(name = "get-values")]
#[command(about = "Extract raster values at query geometries for catalog items")]
struct Args {
    /// Query geometries: inline GeoJSON, or a path or URL to GeoJSON or CSV
    #[arg(long)]
    assets: String,

    /// Catalog items: inline JSON array, or a path or URL to one
    #[arg(long)]
    items: String,

    /// Extra options as a JSON object
    #[arg(long)]
    extra_args: Option<String>,

    /// Response file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "GET_VALUES_LOG_JSON")]
    log_json: bool,

    /// Process datasets in parallel
    #[arg(long, env = "EXTRACT_PARALLEL_DATASETS")]
    parallel: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json);

    info!("Starting get-values");

    let output = args.output.clone();
    let response = Response::from_result(execute(args).await);
    if let Response::Error { message } = &response {
        error!(message = %message, "Run failed");
    }

    write_response(&response, output)?;
    info!(success = response.is_success(), "Finished");
    Ok(())
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn execute(args: Args) -> Result<Value> {
    let config = ServiceConfig::from_env()?.with_parallel_datasets(args.parallel);
    let input = WorkflowInput {
        assets: args.assets,
        items: args.items,
        extra_args: args.extra_args,
    };

    // Raster decoding and remote reads block; keep them off the async workers.
    tokio::task::spawn_blocking(move || Workflow::new(config)?.run(&input))
        .await
        .context("extraction task panicked")?
}

fn write_response(response: &Response, output: Option<PathBuf>) -> Result<()> {
    let text = serde_json::to_string_pretty(response)?;
    match output {
        Some(path) => std::fs::write(&path, text)
            .with_context(|| format!("failed to write response to {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{text}").context("failed to write response to stdout")
        }
    }
}

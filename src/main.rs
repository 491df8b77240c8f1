use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::fs;
use std::io::{self, Read};
use tracing::{info, Level};

use cloudlet_sim::{Config, SimulationRequest, SimulationService};

#[derive(Parser)]
#[command(name = "cloudlet-sim")]
#[command(about = "Compare cloudlet allocation strategies on a simulated datacenter")]
struct Cli {
    /// Request JSON file, or `-` for stdin
    #[arg(short, long, default_value = "-")]
    request: String,

    #[arg(short, long)]
    config: Option<String>,

    /// Write results here instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Run strategies on separate blocking tasks
    #[arg(long)]
    parallel: bool,

    /// Dump Prometheus metrics to this file after the run
    #[arg(long)]
    metrics_out: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: Level,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the results.
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(io::stderr)
        .init();

    let config = Config::load(cli.config.as_deref())?;
    if cli.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let prometheus = match &cli.metrics_out {
        Some(_) => Some(PrometheusBuilder::new().install_recorder()?),
        None => None,
    };

    let parallel = cli.parallel || config.engine.parallel;
    let service = SimulationService::new(config)?;
    let request = read_request(&cli.request)?;

    info!(
        "Running {} strategies ({})",
        request.strategies.len(),
        if parallel { "parallel" } else { "sequential" }
    );
    let results = if parallel {
        service.run_simulations_concurrently(&request).await?
    } else {
        service.run_simulations(&request)?
    };

    let json = serde_json::to_string_pretty(&results)?;
    match &cli.output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing results to {path}"))?;
            info!("Results written to {}", path);
        }
        None => println!("{json}"),
    }

    if let (Some(handle), Some(path)) = (prometheus, &cli.metrics_out) {
        fs::write(path, handle.render()).with_context(|| format!("writing metrics to {path}"))?;
    }

    Ok(())
}

fn read_request(source: &str) -> Result<SimulationRequest> {
    let content = if source == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(source).with_context(|| format!("reading request from {source}"))?
    };
    serde_json::from_str(&content).context("parsing simulation request")
}

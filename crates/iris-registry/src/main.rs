//! Iris Registry - Entry point
//!
//! Runs a standalone registry server.

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use iris_config::ConfigLoader;
use iris_core::ShutdownSignal;
use iris_registry::RegistryServer;

/// Command-line arguments.
struct Args {
    /// Listen address, overriding configuration.
    addr: Option<String>,
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut addr = None;
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--addr" | "-a" => {
                    addr = args.next();
                }
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("iris-registry {}", iris_registry::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { addr, config }
    }
}

fn print_help() {
    println!(
        r"Iris Registry - Shared service registry

USAGE:
    iris-registry [OPTIONS]

OPTIONS:
    -a, --addr <HOST:PORT>  Listen address (default: registry.addr, 127.0.0.1:8787)
    -c, --config <PATH>     Path to configuration file (TOML or JSON)
    -h, --help              Print help information
    -v, --version           Print version information

ENVIRONMENT VARIABLES:
    IRIS_REGISTRY_PORT      Registry port, keeping the configured host
    IRIS__REGISTRY__ADDR    Registry address
    RUST_LOG                Log filter

The registry stops on SIGTERM, SIGINT or a POST to /stop.
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new().with_defaults();
    if let Some(path) = &args.config {
        loader = loader
            .with_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    }
    let config = loader
        .with_env_prefix("IRIS")
        .with_boundary_env()
        .load()
        .context("invalid configuration")?;

    iris_telemetry::init_telemetry(&config.telemetry)?;

    let addr = args.addr.unwrap_or_else(|| config.registry.addr.clone());
    info!(version = iris_registry::VERSION, addr = %addr, "Starting Iris registry");

    let server = RegistryServer::bind(&addr, ShutdownSignal::with_os_signals()).await?;
    server.run().await?;
    Ok(())
}

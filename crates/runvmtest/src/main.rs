use clap::Parser;
use color_eyre::eyre::Context;
use color_eyre::{Report, Result};
use tracing::info;

mod arch;
mod artifacts;
mod cleanup;
mod materialize;
mod podman;
mod resolve;
mod run;
mod template;

/// Install and configure the tracing/logging system.
///
/// Sets up structured logging with environment-based filtering,
/// error layer integration, and console output formatting.
/// Logs are filtered by RUST_LOG environment variable, defaulting to 'info'.
fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

/// Main entry point for runvmtest.
///
/// Provisions the VM test environment and runs the requested command in it.
/// Any failure, including the command's own, results in a non-zero exit.
fn main() -> Result<(), Report> {
    install_tracing();
    color_eyre::install()?;

    let opts = run::RunOpts::parse();
    // Blocking, so done before entering the runtime
    let client = podman::PodmanClient::connect().context("unable to connect to client")?;
    info!("Using podman {}", client.version());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run::run(&client, opts))?;
    Ok(())
}

use anyhow::Result;
use clap::Parser;
use gpfsctl::cli::Cli;
use gpfsctl::GpfsError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    if let Err(err) = cli.run().await {
        // pass the tool's own exit code through to scripts
        if let Some(code) = err.downcast_ref::<GpfsError>().and_then(GpfsError::exit_code) {
            eprintln!("Error: {}", err);
            std::process::exit(code);
        }
        return Err(err);
    }
    Ok(())
}

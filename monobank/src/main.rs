use clap::Parser;
use color_eyre::Result;

use mono_bridge::Command;

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;
    color_eyre::install()?;

    let cmd = Command::parse();

    cmd.run().await?;

    Ok(())
}

fn setup_logging() -> Result<()> {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    tracing_log::LogTracer::init()?;

    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer())
            .with(ErrorLayer::default()),
    )?;

    Ok(())
}

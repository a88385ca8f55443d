//! Databridge CLI - inspect and maintain a databridge cache directory

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use databridge::cli::{self, Cli};

/// Installs a stderr log subscriber, honouring `RUST_LOG` unless `--verbose` is set
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("databridge=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("databridge=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    cli.validate()?;

    let output = cli::execute(&cli).await?;
    print!("{}", output);

    Ok(())
}

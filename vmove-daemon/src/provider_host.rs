use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use log::info;
use tokio_util::sync::CancellationToken;
use vmove_control::{LoggingRegistry, load_settings, prelude::*};
use vmove_logic::DEFAULT_PROVIDER_SOCKET;
use vmove_transport::ProviderHost;

/// Owns the mock provider on behalf of a daemon running in delegated mode
#[derive(Parser)]
struct Cli {
    /// Name of the local socket to accept forwarded positions on
    #[arg(short, long, default_value = DEFAULT_PROVIDER_SOCKET)]
    socket: String,
    /// JSON settings file, only the provider fields are used
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Act as if the user never allowed mock locations
    #[arg(long)]
    deny_mock_locations: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    colog::init();

    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted");
            }
            cancel.cancel();
        }
    });

    let registry = Arc::new(LoggingRegistry::new(!cli.deny_mock_locations));

    ProviderHost::new(registry, settings)
        .serve(&cli.socket, cancel)
        .await
}

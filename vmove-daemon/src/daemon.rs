use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use interprocess::local_socket::{ListenerOptions, tokio::prelude::*};
use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use vmove_control::{
    ControlRequest, ControlResponse, Controller, DEFAULT_CONTROL_SOCKET, LastPointStore,
    LoggingRegistry, drain_events, encode_line, get_socket_name, load_settings, prelude::*,
};
use vmove_logic::ReportingMode;

#[derive(Parser)]
struct Cli {
    /// Name of the local socket to take control requests on
    #[arg(short, long, default_value = DEFAULT_CONTROL_SOCKET)]
    socket: String,
    /// JSON settings file, defaults are used for anything missing
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Forward positions to a provider host on this socket instead of reporting directly
    #[arg(long)]
    delegate_to: Option<String>,
    /// Where to remember the last point between runs
    #[arg(long, default_value = "vmove-last-point.json")]
    store: PathBuf,
    /// Start reporting right away from the last point
    #[arg(long)]
    autostart: bool,
    /// Act as if the user never allowed mock locations
    #[arg(long)]
    deny_mock_locations: bool,
}

#[tokio::main(flavor = "current_thread")]
pub async fn main() -> Result {
    colog::init();

    let cli = Cli::parse();

    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(socket) = cli.delegate_to {
        settings.mode = ReportingMode::Delegated { socket };
    }

    let socket_name = get_socket_name(cli.socket.clone())?;
    let opts = ListenerOptions::new().name(socket_name);
    let listener = opts.create_tokio().context("Failed to bind to socket")?;

    let (resp_tx, mut resp_rx) = mpsc::channel::<ControlResponse>(40);
    let shutdown = CancellationToken::new();

    let controller = Controller::new(
        settings,
        Arc::new(LoggingRegistry::new(!cli.deny_mock_locations)),
        LastPointStore::new(cli.store),
        resp_tx,
        shutdown.clone(),
    );

    if cli.autostart {
        if let Err(why) = controller.start().await {
            error!("Failed to start: {why}");
        }
    }

    info!("Daemon listening on {}", cli.socket);

    'server: loop {
        let res = tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                break 'server;
            }
            Ok(_) = tokio::signal::ctrl_c() => {
                break 'server;
            }
            res = listener.accept() => {
                res
            },
        };

        match res {
            Ok(stream) => {
                info!("Controller connected");

                // Whatever happened while nobody was listening is old news, ask for a status
                let stale = drain_events(&mut resp_rx);
                if !stale.is_empty() {
                    debug!("Dropping {} stale events", stale.len());
                }

                let mut recv = BufReader::new(&stream);
                let mut send = &stream;

                let mut buffer = String::with_capacity(256);

                loop {
                    let replies = tokio::select! {
                        biased;

                        _ = shutdown.cancelled() => {
                            break 'server;
                        }
                        Ok(_) = tokio::signal::ctrl_c() => {
                            break 'server;
                        }
                        Some(event) = resp_rx.recv() => vec![event],
                        res = recv.read_line(&mut buffer) => {
                            match res {
                                Ok(0) => {
                                    info!("Controller disconnected");
                                    break;
                                }
                                Ok(_amnt) => {
                                    let replies = match serde_json::from_str::<ControlRequest>(&buffer) {
                                        Ok(req) => controller.respond(req, &mut resp_rx).await,
                                        Err(why) => vec![ControlResponse::Error(format!("Bad request: {why}"))],
                                    };
                                    buffer.clear();
                                    replies
                                }
                                Err(why) => {
                                    error!("Read Error: {why:?}");
                                    break;
                                }
                            }
                        }
                    };

                    let mut encoded = Vec::new();
                    for resp in &replies {
                        encoded.extend(encode_line(resp)?);
                    }
                    if let Err(why) = send.write_all(&encoded).await {
                        warn!("Failed to send response: {why:?}");
                        break;
                    }
                }
            }
            Err(why) => error!("Error from connection: {why:?}"),
        }
    }

    info!("Shutting down");
    controller.stop().await;

    if let Some(why) = controller.fatal_error() {
        bail!("Service stopped: {why}");
    }

    Ok(())
}

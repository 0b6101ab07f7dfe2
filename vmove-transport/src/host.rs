use interprocess::local_socket::{ListenerOptions, tokio::prelude::*};
use log::{error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use vmove_logic::{
    DirectSink, MockLocationRegistry, ProviderState, ReportingSink, SimError,
    SimulationSettings, prelude::*,
};

use crate::{
    get_socket_name,
    packets::{ProviderRequest, ProviderResponse, read_frame, write_frame},
};

/// Receiving side of delegated reporting, owns the mock provider and converts incoming
/// positions to the offset frame before pushing them.
///
/// Serves one connection at a time, each connection gets a fresh provider lifecycle.
pub struct ProviderHost<R: MockLocationRegistry + Clone + 'static> {
    registry: R,
    settings: SimulationSettings,
}

impl<R: MockLocationRegistry + Clone + 'static> ProviderHost<R> {
    pub fn new(registry: R, settings: SimulationSettings) -> Self {
        Self { registry, settings }
    }

    async fn handle(sink: &mut DirectSink<R>, req: ProviderRequest) -> Result<(), SimError> {
        match req {
            ProviderRequest::Start => sink.start().await,
            ProviderRequest::Report(_) if sink.provider().state() != ProviderState::Enabled => {
                Err(SimError::Host("Provider was not started".into()))
            }
            ProviderRequest::Report(position) => sink.report(position).await,
            ProviderRequest::Stop => {
                sink.stop().await;
                Ok(())
            }
        }
    }

    /// Serve requests from one forwarding loop until it stops, hangs up, or `cancel` fires.
    /// The provider is always cleaned up before this returns.
    pub async fn serve_connection<T: AsyncRead + AsyncWrite + Unpin>(
        &self,
        mut stream: T,
        cancel: &CancellationToken,
    ) -> Result {
        let mut sink = DirectSink::new(self.registry.clone(), &self.settings);

        let res = loop {
            let req = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    break Ok(());
                }

                req = read_frame::<_, ProviderRequest>(&mut stream) => req,
            };

            let req = match req {
                Ok(Some(req)) => req,
                Ok(None) => {
                    info!("Forwarding side hung up");
                    break Ok(());
                }
                Err(why) => break Err(why),
            };

            let is_stop = req == ProviderRequest::Stop;
            let res = Self::handle(&mut sink, req).await;

            if let Err(why) = &res {
                warn!("Request failed: {why}");
            }

            if let Err(why) = write_frame(&mut stream, &ProviderResponse::from(res)).await {
                break Err(why);
            }

            if is_stop {
                break Ok(());
            }
        };

        // No-op if the forwarding side already asked us to stop
        sink.stop().await;

        res
    }

    /// Accept connections on the local socket `socket` until `cancel` fires
    pub async fn serve(&self, socket: &str, cancel: CancellationToken) -> Result {
        let name = get_socket_name(socket.to_string())?;
        let listener = ListenerOptions::new()
            .name(name)
            .create_tokio()
            .context("Failed to bind to socket")?;

        info!("Provider host listening on {socket}");

        loop {
            let res = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    break;
                }

                res = listener.accept() => res,
            };

            match res {
                Ok(stream) => {
                    info!("Forwarding side connected");
                    if let Err(why) = self.serve_connection(stream, &cancel).await {
                        error!("Connection error: {why:?}");
                    }
                }
                Err(why) => error!("Error from connection: {why:?}"),
            }
        }

        Ok(())
    }
}

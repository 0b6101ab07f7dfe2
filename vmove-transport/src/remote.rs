use std::time::Duration;

use interprocess::local_socket::{tokio::Stream, traits::tokio::Stream as _};
use log::{info, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use vmove_logic::{GeoPoint, ReportingSink, SimError, prelude::*};

use crate::{
    get_socket_name,
    packets::{ProviderRequest, ProviderResponse, read_frame, write_frame},
};

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Forwards positions to a [crate::ProviderHost] in another process, which corrects them and
/// pushes them to its own mock provider.
///
/// A request that times out or fails on the wire drops the connection, every request after that
/// fails with [SimError::Transport].
pub struct RemoteSink<T> {
    stream: Option<T>,
}

impl RemoteSink<Stream> {
    /// Connect to a provider host listening on the local socket `socket`
    pub async fn connect(socket: &str) -> Result<Self> {
        let name = get_socket_name(socket.to_string())?;
        let stream = Stream::connect(name)
            .await
            .with_context(|| format!("Failed to connect to provider host at {socket}"))?;
        info!("Connected to provider host at {socket}");
        Ok(Self::new(stream))
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> RemoteSink<T> {
    pub fn new(stream: T) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn exchange(stream: &mut T, req: &ProviderRequest) -> Result<ProviderResponse> {
        write_frame(stream, req).await?;
        read_frame(stream).await?.context("Provider host hung up")
    }

    async fn request(&mut self, req: ProviderRequest) -> Result<(), SimError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(SimError::Transport(
                "Connection to provider host was dropped".into(),
            ));
        };

        let why = match tokio::time::timeout(RESPONSE_TIMEOUT, Self::exchange(stream, &req)).await {
            Ok(Ok(resp)) => return resp.into_result(),
            Ok(Err(why)) => SimError::Transport(format!("{why:#}")),
            Err(_) => SimError::Transport("Timed out waiting for provider host".into()),
        };

        // A late reply or half a frame may still be in flight, nothing read from here on
        // could be matched to its request
        warn!("Dropping connection to provider host: {why}");
        self.stream = None;

        Err(why)
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + 'static> ReportingSink for RemoteSink<T> {
    async fn start(&mut self) -> Result<(), SimError> {
        self.request(ProviderRequest::Start).await
    }

    async fn report(&mut self, position: GeoPoint) -> Result<(), SimError> {
        self.request(ProviderRequest::Report(position)).await
    }

    async fn stop(&mut self) {
        if !self.is_connected() {
            return;
        }
        if let Err(why) = self.request(ProviderRequest::Stop).await {
            warn!("Provider host failed to stop cleanly: {why}");
        }
    }
}

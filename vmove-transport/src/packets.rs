use anyhow::bail;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use vmove_logic::{GeoPoint, SimError, prelude::*};

type LenHeader = u32;
const LEN_HEADER_SIZE: usize = size_of::<LenHeader>();

/// Nothing we send comes close to this, anything bigger is a corrupt stream
const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Sent from the reporting loop to the provider host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProviderRequest {
    /// Register and enable the mock provider
    Start,
    /// Report an *uncorrected* position, the host converts it before pushing
    Report(GeoPoint),
    /// Disable and remove the mock provider, the connection is closed afterwards
    Stop,
}

/// The host's answer to exactly one [ProviderRequest]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProviderResponse {
    Ok,
    Err(SimError),
}

impl From<Result<(), SimError>> for ProviderResponse {
    fn from(res: Result<(), SimError>) -> Self {
        match res {
            Ok(()) => Self::Ok,
            Err(why) => Self::Err(why),
        }
    }
}

impl ProviderResponse {
    pub fn into_result(self) -> Result<(), SimError> {
        match self {
            Self::Ok => Ok(()),
            Self::Err(why) => Err(why),
        }
    }
}

/// Write a message as a little endian length header followed by the msgpack body
pub async fn write_frame<W: AsyncWrite + Unpin, M: Serialize>(writer: &mut W, msg: &M) -> Result {
    let body = rmp_serde::to_vec(msg).context("Failed to serialize message")?;
    if body.len() > MAX_FRAME_SIZE {
        bail!("Message is too long, refusing to send");
    }
    let header = (body.len() as LenHeader).to_le_bytes();

    writer
        .write_all(&header)
        .await
        .context("Failed to write frame header")?;
    writer
        .write_all(&body)
        .await
        .context("Failed to write frame body")?;
    writer.flush().await.context("Failed to flush frame")?;

    Ok(())
}

/// Read one message, returns `None` if the other side closed the stream between frames
pub async fn read_frame<R: AsyncRead + Unpin, M: DeserializeOwned>(
    reader: &mut R,
) -> Result<Option<M>> {
    let mut header = [0; LEN_HEADER_SIZE];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(why) if why.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(why) => return Err(why).context("Failed to read frame header"),
    }

    let len = LenHeader::from_le_bytes(header) as usize;
    if len == 0 {
        bail!("Incoming frame is empty");
    } else if len > MAX_FRAME_SIZE {
        bail!("Incoming frame is too long ({len} bytes)");
    }

    let mut body = vec![0; len];
    reader
        .read_exact(&mut body)
        .await
        .context("Stream closed in the middle of a frame")?;

    rmp_serde::from_slice(&body)
        .map(Some)
        .context("Failed to deserialize message")
}

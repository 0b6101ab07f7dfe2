use clap::{Parser, Subcommand};
use interprocess::local_socket::{tokio::Stream, traits::tokio::Stream as _};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use vmove_control::{
    ControlRequest, ControlResponse, DEFAULT_CONTROL_SOCKET, encode_line, get_socket_name,
    prelude::*,
};

#[derive(Parser)]
struct Cli {
    /// Name of the local socket the daemon is listening on
    #[arg(short, long, default_value = DEFAULT_CONTROL_SOCKET)]
    socket: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Teleport to a point, this also cancels any movement
    #[command(allow_negative_numbers = true)]
    SetPosition { lat: f64, lng: f64 },
    /// Move towards a point at the configured speed
    #[command(allow_negative_numbers = true)]
    Goto { lat: f64, lng: f64 },
    /// Start reporting positions
    Start,
    /// Stop reporting positions
    Stop,
    /// Show the current position and whether we're reporting
    Status,
    /// Stop reporting and exit the daemon
    Shutdown,
    /// Print state changes until the daemon exits
    Watch,
}

impl Commands {
    fn as_request(&self) -> Option<ControlRequest> {
        Some(match *self {
            Self::SetPosition { lat, lng } => ControlRequest::SetCurrentPosition { lat, lng },
            Self::Goto { lat, lng } => ControlRequest::SetDestination { lat, lng },
            Self::Start => ControlRequest::Start,
            Self::Stop => ControlRequest::Stop,
            Self::Status => ControlRequest::Status,
            Self::Shutdown => ControlRequest::Shutdown,
            Self::Watch => return None,
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    let cli = Cli::parse();

    let socket_name = get_socket_name(cli.socket.clone()).context("Failed to get socket name")?;

    let stream = Stream::connect(socket_name)
        .await
        .context("Failed to connect to socket")?;

    let req = cli.command.as_request();

    if let Some(req) = &req {
        let mut send = &stream;
        send.write_all(&encode_line(req)?)
            .await
            .context("Failed to send request")?;
    }

    let mut recv = BufReader::new(&stream);
    let mut buffer = String::with_capacity(256);

    loop {
        buffer.clear();
        let amnt = recv
            .read_line(&mut buffer)
            .await
            .context("Failed to read response")?;

        if amnt == 0 {
            if req.is_some() {
                bail!("Daemon hung up before responding");
            }
            return Ok(());
        }

        let resp = serde_json::from_str::<ControlResponse>(&buffer)
            .context("Failed to parse response")?;

        match resp {
            ControlResponse::StateChanged(running) => {
                println!("Service {}", if running { "running" } else { "stopped" });
            }
            ControlResponse::Complete => return Ok(()),
            ControlResponse::Status(status) => {
                println!("Phase: {:?}", status.phase);
                println!("Reporting: {}", status.running);
                match status.current_position {
                    Some(p) => println!("Position: {p}"),
                    None => println!("Position: unset"),
                }
                match status.destination {
                    Some(p) => println!("Destination: {p}"),
                    None => println!("Destination: unset"),
                }
                return Ok(());
            }
            ControlResponse::Error(why) => bail!("Daemon returned an error: {why}"),
        }
    }
}

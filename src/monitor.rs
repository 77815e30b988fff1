//! Read-only observer client
//!
//! Attaches to the router with `monitor` and prints every event line it
//! receives, stamped with the local time.

use chrono::Local;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::info;

use crate::config::WorkerSettings;
use crate::error::{Error, Result};
use crate::protocol::{write_frame, Frame, FrameReader};

/// Connect as an observer and print the router's events to stdout
pub async fn run_monitor(settings: &WorkerSettings, shutdown: watch::Receiver<bool>) -> Result<u64> {
    let addr = settings.router_addr();
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| Error::connection_failed(addr.clone(), e.to_string()))?;

    let (read_half, mut write_half) = stream.into_split();
    write_frame(&mut write_half, &Frame::Observer).await?;
    info!(router = %addr, "Monitoring router events");

    let mut stdout = tokio::io::stdout();
    let printed = render_events(FrameReader::new(read_half), &mut stdout, shutdown).await?;
    info!(events = printed, "Router closed the event stream");
    Ok(printed)
}

/// Copy event lines to `out` with a `[HH:MM:SS]` prefix until EOF or shutdown.
///
/// Returns the number of lines printed.
pub async fn render_events<R, O>(
    mut reader: FrameReader<R>,
    out: &mut O,
    mut shutdown: watch::Receiver<bool>,
) -> Result<u64>
where
    R: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut printed = 0;
    loop {
        let line = tokio::select! {
            line = reader.next_line() => line?,
            _ = shutdown.changed() => break,
        };
        let Some(line) = line else { break };

        let stamped = format!("[{}] {}\n", Local::now().format("%H:%M:%S"), line);
        out.write_all(stamped.as_bytes()).await?;
        out.flush().await?;
        printed += 1;
    }
    Ok(printed)
}

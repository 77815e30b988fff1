//! Reviewing worker (client side)
//!
//! Connects to the router, takes an identity, then alternates between
//! writing its own work and reviewing its peers'.

mod client;
mod cycle;
mod desk;

pub use client::{connect, handshake, WorkerClient, WorkerStats};
pub use cycle::ReviewCycle;
pub use desk::SimulatedDesk;

use tokio::sync::watch;
use tracing::info;

use crate::config::WorkerSettings;
use crate::error::Result;
use crate::protocol::FrameReader;

/// Connect, handshake and run a simulated worker until shutdown
pub async fn run_worker(
    settings: &WorkerSettings,
    group_size: u32,
    shutdown: watch::Receiver<bool>,
) -> Result<WorkerStats> {
    let stream = connect(settings).await?;
    info!(router = %settings.router_addr(), "Connected to router");

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let identity = handshake(&mut reader, &mut write_half, settings.reconnect_identity()).await?;
    info!(identity = %identity, "Identity assigned");

    let cycle = ReviewCycle::new(identity, group_size)?;
    let desk = SimulatedDesk::from_settings(settings);
    WorkerClient::new(reader, write_half, desk, cycle, settings, shutdown)
        .run()
        .await
}

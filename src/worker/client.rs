//! Worker protocol driver
//!
//! Runs the write → request review → poll loop against the router:
//! - every poll drains whatever the router pushed in the meantime
//!   into the inbox, stopping at the poll's own answer
//! - a poll answer naming a requester is reviewed right away
//! - inbox review requests are reviewed in arrival order
//! - a verdict for our own work closes the cycle; frames behind it
//!   stay in the inbox for the next one
//!
//! The only waits are the desk's own delays and the fixed backoff after
//! an empty poll.

use std::collections::VecDeque;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::cycle::{CycleOutcome, Mode, ReviewCycle};
use super::desk::WorkDesk;
use crate::config::WorkerSettings;
use crate::error::{Error, Result};
use crate::protocol::{write_frame, Frame, FrameReader};
use crate::types::{Identity, Verdict};

/// Counters reported when a worker stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub accepted: u32,
    pub rejected: u32,
    pub reviews_given: u32,
}

/// Open the TCP connection to the router
pub async fn connect(settings: &WorkerSettings) -> Result<TcpStream> {
    let addr = settings.router_addr();
    TcpStream::connect(&addr)
        .await
        .map_err(|e| Error::connection_failed(addr, e.to_string()))
}

/// Introduce ourselves and wait for `start`.
///
/// Returns the identity the router assigned, or `HandshakeRejected` if it
/// answered `break`.
pub async fn handshake<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut W,
    reconnect: Option<Identity>,
) -> Result<Identity>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_frame(writer, &Frame::Client { reconnect }).await?;
    info!(reconnect = ?reconnect.map(Identity::get), "Waiting for the group to start");

    loop {
        match reader.next_frame().await? {
            Some(Frame::Start(identity)) => return Ok(identity),
            Some(Frame::Break(identity)) => return Err(Error::HandshakeRejected { identity }),
            Some(other) => {
                let err = Error::ProtocolUnexpected {
                    expected: "START",
                    actual: other.type_name(),
                };
                warn!(error = %err.format_for_log(), "Ignoring frame during handshake");
            }
            None => return Err(Error::connection_lost("router closed during handshake")),
        }
    }
}

/// Drives one worker's review cycles over an established connection
pub struct WorkerClient<R, W, D> {
    reader: FrameReader<R>,
    writer: W,
    desk: D,
    cycle: ReviewCycle,
    rng: StdRng,
    inbox: VecDeque<Frame>,
    backoff: Duration,
    shutdown: watch::Receiver<bool>,
    stats: WorkerStats,
}

impl<R, W, D> WorkerClient<R, W, D>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
    D: WorkDesk,
{
    pub fn new(
        reader: FrameReader<R>,
        writer: W,
        desk: D,
        cycle: ReviewCycle,
        settings: &WorkerSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(u64::from(cycle.own().get()))),
            None => StdRng::from_entropy(),
        };
        Self {
            reader,
            writer,
            desk,
            cycle,
            rng,
            inbox: VecDeque::new(),
            backoff: settings.poll_backoff(),
            shutdown,
            stats: WorkerStats::default(),
        }
    }

    /// Run review cycles until shutdown or until the router goes away
    pub async fn run(mut self) -> Result<WorkerStats> {
        let own = self.cycle.own();
        info!(identity = %own, "Worker started");

        while !self.stopping() {
            self.cycle.set_mode(Mode::Writing);
            info!(identity = %own, "Writing");
            tokio::select! {
                _ = self.desk.write() => {}
                _ = self.shutdown.changed() => break,
            }

            let reviewer = self.cycle.choose_reviewer(&mut self.rng);
            info!(identity = %own, reviewer = %reviewer, pinned = self.cycle.pinned().is_some(), "Work written, requesting review");
            write_frame(&mut self.writer, &Frame::CheckRequest { to: reviewer, from: own }).await?;

            match self.await_result().await? {
                Some(CycleOutcome::PassContinue) => self.stats.accepted += 1,
                Some(CycleOutcome::FailRewrite) => self.stats.rejected += 1,
                None => break,
            }
        }

        info!(
            identity = %own,
            accepted = self.stats.accepted,
            rejected = self.stats.rejected,
            reviews_given = self.stats.reviews_given,
            "Worker stopping"
        );
        Ok(self.stats)
    }

    /// Poll until a verdict on our work arrives; `None` means shutdown
    async fn await_result(&mut self) -> Result<Option<CycleOutcome>> {
        let own = self.cycle.own();
        loop {
            if self.stopping() {
                return Ok(None);
            }

            write_frame(&mut self.writer, &Frame::QueuePoll(own)).await?;
            let answer = match self.next_poll_answer().await? {
                Some(answer) => answer,
                None => return Ok(None),
            };

            if let Some(requester) = answer {
                if !self.review(requester).await? {
                    return Ok(None);
                }
            }

            match self.drain_inbox().await? {
                Drained::Verdict(verdict) => {
                    let outcome = self.cycle.apply_verdict(verdict);
                    info!(identity = %own, verdict = %verdict, outcome = ?outcome, "Verdict received");
                    return Ok(Some(outcome));
                }
                Drained::Stopped => return Ok(None),
                Drained::Empty => {}
            }

            if answer.is_none() {
                debug!(identity = %own, backoff_ms = self.backoff.as_millis() as u64, "Queue empty, waiting");
                tokio::select! {
                    _ = tokio::time::sleep(self.backoff) => {}
                    _ = self.shutdown.changed() => return Ok(None),
                }
            }
        }
    }

    /// Read frames until the answer to our poll, parking the rest in the inbox.
    ///
    /// Outer `None` means shutdown; inner value is the requester the router
    /// popped from our queue, if any.
    async fn next_poll_answer(&mut self) -> Result<Option<Option<Identity>>> {
        loop {
            let frame = tokio::select! {
                frame = self.reader.next_frame() => frame?,
                _ = self.shutdown.changed() => return Ok(None),
            };

            match frame {
                Some(Frame::QueueAnswer { from, identity }) => {
                    if identity != self.cycle.own() {
                        warn!(identity = %identity, "Poll answer addressed to another worker");
                    }
                    return Ok(Some(from));
                }
                Some(Frame::Unknown(raw)) if raw.is_empty() => {
                    debug!("Skipping empty frame from router");
                }
                Some(frame) => self.inbox.push_back(frame),
                None => return Err(Error::connection_lost("router closed the connection")),
            }
        }
    }

    /// Handle parked frames in order, stopping at the first verdict for us
    async fn drain_inbox(&mut self) -> Result<Drained> {
        let own = self.cycle.own();
        if !self.inbox.is_empty() {
            debug!(identity = %own, pending = self.inbox.len(), "Handling frames received while waiting");
        }

        while let Some(frame) = self.inbox.pop_front() {
            match frame {
                Frame::CheckRequest { to, from } if to == own => {
                    if !self.review(from).await? {
                        return Ok(Drained::Stopped);
                    }
                }
                Frame::ReviewResult { to, verdict, .. } if to == own => {
                    return Ok(Drained::Verdict(verdict));
                }
                other => {
                    let err = Error::ProtocolUnexpected {
                        expected: "CHECK or REVIEWED",
                        actual: other.type_name(),
                    };
                    warn!(identity = %own, frame = %other, error = %err.format_for_log(), "Discarding frame");
                }
            }
        }
        Ok(Drained::Empty)
    }

    /// Review `requester`'s work and send the verdict back; false on shutdown
    async fn review(&mut self, requester: Identity) -> Result<bool> {
        let own = self.cycle.own();
        let resume = self.cycle.mode();
        self.cycle.set_mode(Mode::Reviewing);
        info!(identity = %own, requester = %requester, "Reviewing");

        let verdict: Verdict = tokio::select! {
            verdict = self.desk.review(requester) => verdict,
            _ = self.shutdown.changed() => return Ok(false),
        };

        write_frame(
            &mut self.writer,
            &Frame::ReviewResult {
                to: requester,
                from: own,
                verdict,
            },
        )
        .await?;
        self.stats.reviews_given += 1;
        info!(identity = %own, requester = %requester, verdict = %verdict, "Review sent");

        self.cycle.set_mode(resume);
        Ok(true)
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }
}

enum Drained {
    Verdict(Verdict),
    Stopped,
    Empty,
}

//! Router events and the observer fan-out
//!
//! Every event is logged through `tracing` and also rendered as one
//! human-readable line for each attached observer. Observers are plain
//! sinks: one whose writer has gone away is dropped on the spot and the
//! remaining observers keep receiving. An observer whose outbound queue is
//! full stays attached but misses that line.

use std::fmt;
use std::net::SocketAddr;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{Identity, ReviewTask, Verdict};

// ─────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────

/// Everything the router reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterEvent {
    Listening { addr: SocketAddr, group_size: u32 },
    WorkerAdmitted { identity: Identity, peer: SocketAddr, reconnect: bool },
    ObserverAttached { observer: Uuid, peer: SocketAddr },
    HandshakeRefused { identity: Identity, peer: SocketAddr },
    GroupStarted { group_size: u32 },
    FrameReceived { identity: Identity, frame: String },
    TaskEnqueued { task: ReviewTask },
    NotificationForwarded { to: Identity, from: Identity },
    VerdictRelayed { to: Identity, from: Identity, verdict: Verdict },
    PollAnswered { identity: Identity, from: Option<Identity> },
    RoutingMiss { identity: Identity, frame: String },
    ProtocolError { peer: SocketAddr, detail: String },
    SessionClosed { identity: Identity, reason: String },
    ObserverDropped { observer: Uuid },
    ShuttingDown,
}

impl RouterEvent {
    /// Emit the event as a structured tracing record
    pub fn log(&self) {
        match self {
            RouterEvent::Listening { addr, group_size } => {
                info!(addr = %addr, group_size, "Router listening")
            }
            RouterEvent::WorkerAdmitted { identity, peer, reconnect } => {
                info!(identity = %identity, peer = %peer, reconnect, "Worker admitted")
            }
            RouterEvent::ObserverAttached { observer, peer } => {
                info!(observer = %observer, peer = %peer, "Observer attached")
            }
            RouterEvent::HandshakeRefused { identity, peer } => {
                warn!(identity = %identity, peer = %peer, "Handshake refused")
            }
            RouterEvent::GroupStarted { group_size } => info!(group_size, "Group started"),
            RouterEvent::FrameReceived { identity, frame } => {
                debug!(identity = %identity, frame = %frame, "Frame received")
            }
            RouterEvent::TaskEnqueued { task } => info!(
                requester = %task.requester,
                reviewer = %task.reviewer,
                "Review task enqueued"
            ),
            RouterEvent::NotificationForwarded { to, from } => {
                debug!(to = %to, from = %from, "Review request forwarded")
            }
            RouterEvent::VerdictRelayed { to, from, verdict } => info!(
                task = %ReviewTask::new(*to, *from).with_verdict(*verdict),
                "Verdict relayed"
            ),
            RouterEvent::PollAnswered { identity, from } => {
                debug!(identity = %identity, from = ?from.map(|f| f.get()), "Poll answered")
            }
            RouterEvent::RoutingMiss { identity, frame } => {
                warn!(identity = %identity, frame = %frame, "No live route, message dropped")
            }
            RouterEvent::ProtocolError { peer, detail } => {
                warn!(peer = %peer, detail = %detail, "Protocol error")
            }
            RouterEvent::SessionClosed { identity, reason } => {
                info!(identity = %identity, reason = %reason, "Worker session closed")
            }
            RouterEvent::ObserverDropped { observer } => {
                info!(observer = %observer, "Observer dropped")
            }
            RouterEvent::ShuttingDown => info!("Router shutting down"),
        }
    }
}

impl fmt::Display for RouterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouterEvent::Listening { addr, group_size } => {
                write!(f, "Router listening on {} for {} workers", addr, group_size)
            }
            RouterEvent::WorkerAdmitted { identity, peer, reconnect: false } => {
                write!(f, "Worker ID:{} connected from {}", identity, peer)
            }
            RouterEvent::WorkerAdmitted { identity, peer, reconnect: true } => {
                write!(f, "Worker ID:{} reconnected from {}", identity, peer)
            }
            RouterEvent::ObserverAttached { peer, .. } => {
                write!(f, "Monitor connected from {}", peer)
            }
            RouterEvent::HandshakeRefused { identity, peer } => {
                write!(f, "Refused ID:{} for {}", identity, peer)
            }
            RouterEvent::GroupStarted { group_size } => {
                write!(f, "All {} workers connected, work started", group_size)
            }
            RouterEvent::FrameReceived { identity, frame } => {
                write!(f, "ID:{} sent \"{}\"", identity, frame)
            }
            RouterEvent::TaskEnqueued { task } => write!(f, "Task queued {}", task),
            RouterEvent::NotificationForwarded { to, from } => {
                write!(f, "ID:{} notified of review request from ID:{}", to, from)
            }
            RouterEvent::VerdictRelayed { to, from, verdict } => {
                write!(f, "ID:{} {} the work of ID:{}", from, verdict, to)
            }
            RouterEvent::PollAnswered { identity, from: Some(from) } => {
                write!(f, "ID:{} took the review of ID:{} from its queue", identity, from)
            }
            RouterEvent::PollAnswered { identity, from: None } => {
                write!(f, "ID:{} polled an empty queue", identity)
            }
            RouterEvent::RoutingMiss { identity, frame } => {
                write!(f, "ID:{} is not connected, dropped \"{}\"", identity, frame)
            }
            RouterEvent::ProtocolError { peer, detail } => {
                write!(f, "Protocol error from {}: {}", peer, detail)
            }
            RouterEvent::SessionClosed { identity, reason } => {
                write!(f, "Worker ID:{} disconnected ({})", identity, reason)
            }
            RouterEvent::ObserverDropped { observer } => {
                write!(f, "Monitor {} dropped", observer)
            }
            RouterEvent::ShuttingDown => write!(f, "Router shutting down"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Fan-out
// ─────────────────────────────────────────────────────────────────

/// Set of attached observers, each fed through its own line channel
#[derive(Debug, Default)]
pub struct ObserverHub {
    observers: RwLock<Vec<(Uuid, mpsc::Sender<String>)>>,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer; its writer task drains `tx`'s receiver
    pub fn attach(&self, observer: Uuid, tx: mpsc::Sender<String>) {
        self.observers.write().push((observer, tx));
    }

    /// Remove an observer; returns false if it was already gone
    pub fn detach(&self, observer: Uuid) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(id, _)| *id != observer);
        observers.len() != before
    }

    /// Detach everyone; their writers finish once the queued lines are out
    pub fn clear(&self) {
        self.observers.write().clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Log `event` and deliver its line to every observer.
    ///
    /// Observers whose writer is gone are removed, and their removal is
    /// itself reported to the rest.
    pub fn publish(&self, event: RouterEvent) {
        event.log();
        let mut pending = vec![event.to_string()];
        while let Some(line) = pending.pop() {
            for observer in self.broadcast(&line) {
                let dropped = RouterEvent::ObserverDropped { observer };
                dropped.log();
                pending.push(dropped.to_string());
            }
        }
    }

    /// Offer `line` to each observer, returning those that were removed
    fn broadcast(&self, line: &str) -> Vec<Uuid> {
        let observers = self.observers.read().clone();
        let mut failed = Vec::new();

        for (observer, tx) in observers {
            match tx.try_send(format!("{}\n", line)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => failed.push(observer),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(observer = %observer, "Observer not keeping up, line skipped");
                }
            }
        }

        failed.retain(|observer| self.detach(*observer));
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_event_lines() {
        let event = RouterEvent::PollAnswered {
            identity: Identity::new(2),
            from: None,
        };
        assert_eq!(event.to_string(), "ID:2 polled an empty queue");

        let event = RouterEvent::VerdictRelayed {
            to: Identity::new(0),
            from: Identity::new(1),
            verdict: Verdict::Pass,
        };
        assert_eq!(event.to_string(), "ID:1 ACCEPTED the work of ID:0");

        let event = RouterEvent::TaskEnqueued {
            task: ReviewTask::new(Identity::new(0), Identity::new(1)),
        };
        assert!(event.to_string().contains("from ID:0 to ID:1"));
    }

    #[tokio::test]
    async fn test_publish_reaches_every_observer() {
        let hub = ObserverHub::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        hub.attach(Uuid::new_v4(), tx_a);
        hub.attach(Uuid::new_v4(), tx_b);

        hub.publish(RouterEvent::GroupStarted { group_size: 3 });

        let expected = "All 3 workers connected, work started\n";
        assert_eq!(rx_a.recv().await.as_deref(), Some(expected));
        assert_eq!(rx_b.recv().await.as_deref(), Some(expected));
    }

    #[tokio::test]
    async fn test_failed_observer_removed() {
        let hub = ObserverHub::new();
        let broken = Uuid::new_v4();
        let (tx_broken, rx_broken) = mpsc::channel(8);
        let (tx_ok, mut rx_ok) = mpsc::channel(8);
        hub.attach(broken, tx_broken);
        hub.attach(Uuid::new_v4(), tx_ok);
        drop(rx_broken);

        hub.publish(RouterEvent::ObserverAttached {
            observer: Uuid::new_v4(),
            peer: peer(),
        });
        assert_eq!(hub.len(), 1);

        // The healthy observer got the event and then the drop notice
        assert!(rx_ok.recv().await.unwrap().starts_with("Monitor connected"));
        assert_eq!(
            rx_ok.recv().await.unwrap(),
            format!("Monitor {} dropped\n", broken)
        );

        hub.publish(RouterEvent::ShuttingDown);
        assert_eq!(rx_ok.recv().await.as_deref(), Some("Router shutting down\n"));
        assert_eq!(hub.len(), 1);
    }

    #[tokio::test]
    async fn test_slow_observer_kept() {
        let hub = ObserverHub::new();
        let (tx, mut rx) = mpsc::channel(1);
        hub.attach(Uuid::new_v4(), tx);

        hub.publish(RouterEvent::GroupStarted { group_size: 2 });
        // Queue is full: this line is skipped, the observer stays
        hub.publish(RouterEvent::GroupStarted { group_size: 3 });
        assert_eq!(hub.len(), 1);

        assert_eq!(
            rx.recv().await.as_deref(),
            Some("All 2 workers connected, work started\n")
        );

        hub.publish(RouterEvent::ShuttingDown);
        assert_eq!(rx.recv().await.as_deref(), Some("Router shutting down\n"));
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn test_publish_without_observers() {
        let hub = ObserverHub::new();
        hub.publish(RouterEvent::ShuttingDown);
        assert!(hub.is_empty());
    }
}

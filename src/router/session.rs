//! Worker session loop
//!
//! One task per admitted worker. Reads frames off that worker's
//! connection and routes them:
//! - `check <to> <from>`: queue a task for `to`, then notify `to`
//! - `reviewed <to> <from> <v>`: relay unchanged to `to`
//! - `queue <id>`: pop `id`'s queue and answer on this connection; `id`
//!   must be the sender's own identity
//!
//! Anything else is a protocol error: logged, discarded, session kept.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::sync::watch;

use super::observer::{ObserverHub, RouterEvent};
use super::queue::TaskRouter;
use super::registry::{ConnectionRegistry, PeerLink};
use crate::error::Error;
use crate::protocol::{Frame, FrameReader};
use crate::types::{Identity, ReviewTask};

/// State every session and the accept loop share
#[derive(Debug)]
pub struct RouterShared {
    pub registry: ConnectionRegistry,
    pub queues: TaskRouter,
    pub hub: ObserverHub,
}

impl RouterShared {
    pub fn new(group_size: u32) -> Self {
        Self {
            registry: ConnectionRegistry::new(group_size),
            queues: TaskRouter::new(group_size),
            hub: ObserverHub::new(),
        }
    }

    /// Route one frame received from `identity`'s connection
    pub async fn dispatch(&self, identity: Identity, link: &PeerLink, peer: SocketAddr, frame: Frame) {
        if let Frame::Unknown(raw) = &frame {
            let err = Error::ProtocolMalformed { frame: raw.clone() };
            self.hub.publish(RouterEvent::ProtocolError {
                peer,
                detail: format!("{} from ID:{}", err.format_for_log(), identity),
            });
            return;
        }

        self.hub.publish(RouterEvent::FrameReceived {
            identity,
            frame: frame.to_string(),
        });

        match frame {
            Frame::CheckRequest { to, from } => {
                let task = ReviewTask::new(from, to);
                if self.queues.enqueue(to, task.clone()).is_err() {
                    self.hub.publish(RouterEvent::RoutingMiss {
                        identity: to,
                        frame: frame.to_string(),
                    });
                    return;
                }
                self.hub.publish(RouterEvent::TaskEnqueued { task });
                self.forward(to, &frame, RouterEvent::NotificationForwarded { to, from })
                    .await;
            }
            Frame::ReviewResult { to, from, verdict } => {
                self.forward(to, &frame, RouterEvent::VerdictRelayed { to, from, verdict })
                    .await;
            }
            Frame::QueuePoll(polled) if polled != identity => {
                let err = Error::ProtocolUnexpected {
                    expected: "QUEUE_POLL for the sender's own identity",
                    actual: "QUEUE_POLL",
                };
                self.hub.publish(RouterEvent::ProtocolError {
                    peer,
                    detail: format!("{} from ID:{} for ID:{}", err.format_for_log(), identity, polled),
                });
            }
            Frame::QueuePoll(polled) => {
                let from = self.queues.poll(polled).map(|task| task.requester);
                let answer = Frame::QueueAnswer {
                    from,
                    identity: polled,
                };
                if link.send(&answer).await {
                    self.hub.publish(RouterEvent::PollAnswered {
                        identity: polled,
                        from,
                    });
                } else {
                    self.hub.publish(RouterEvent::RoutingMiss {
                        identity,
                        frame: answer.to_string(),
                    });
                }
            }
            other => {
                let err = Error::ProtocolUnexpected {
                    expected: "CHECK, REVIEWED or QUEUE",
                    actual: other.type_name(),
                };
                self.hub.publish(RouterEvent::ProtocolError {
                    peer,
                    detail: format!("{} from ID:{}", err.format_for_log(), identity),
                });
            }
        }
    }

    /// Send `frame` to `to`'s live connection, reporting `delivered` on success
    async fn forward(&self, to: Identity, frame: &Frame, delivered: RouterEvent) {
        let sent = match self.registry.link(to) {
            Some(link) => link.send(frame).await,
            None => false,
        };
        if sent {
            self.hub.publish(delivered);
        } else {
            self.hub.publish(RouterEvent::RoutingMiss {
                identity: to,
                frame: frame.to_string(),
            });
        }
    }
}

/// Serve one worker until its connection ends or the router shuts down
pub async fn run_session<R>(
    shared: Arc<RouterShared>,
    identity: Identity,
    link: PeerLink,
    mut reader: FrameReader<R>,
    peer: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
{
    let reason = loop {
        if *shutdown.borrow() {
            break "router shutting down".to_string();
        }

        let next = tokio::select! {
            next = reader.next_frame() => next,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break "router shutting down".to_string();
                }
                continue;
            }
        };

        match next {
            Ok(Some(frame)) => shared.dispatch(identity, &link, peer, frame).await,
            Ok(None) => break "connection closed".to_string(),
            Err(e) => break format!("read failed: {}", e),
        }
    };

    shared.registry.release(identity, link.connection());
    shared.hub.publish(RouterEvent::SessionClosed { identity, reason });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn id(raw: u32) -> Identity {
        Identity::new(raw)
    }

    /// Register a fake connection for `raw` and hand back its outbound queue
    fn admit(shared: &RouterShared, raw: u32) -> (PeerLink, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        let link = PeerLink::new(Uuid::new_v4(), tx);
        shared.registry.admit(Some(id(raw)), link.clone());
        (link, rx)
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40001".parse().unwrap()
    }

    #[tokio::test]
    async fn test_check_enqueues_and_notifies_reviewer() {
        let shared = RouterShared::new(3);
        let (w0, mut rx0) = admit(&shared, 0);
        let (w1, mut rx1) = admit(&shared, 1);

        let check = Frame::CheckRequest { to: id(1), from: id(0) };
        shared.dispatch(id(0), &w0, peer(), check).await;

        assert_eq!(rx1.recv().await.as_deref(), Some("check 1 0\n"));
        assert_eq!(shared.queues.depth(id(1)), 1);

        shared.dispatch(id(1), &w1, peer(), Frame::QueuePoll(id(1))).await;
        assert_eq!(rx1.recv().await.as_deref(), Some("queue 0 1\n"));
        assert!(rx0.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_verdict_relayed_unchanged() {
        let shared = RouterShared::new(3);
        let (_w0, mut rx0) = admit(&shared, 0);
        let (w1, _rx1) = admit(&shared, 1);

        let verdict = Frame::parse("reviewed 0 1 1");
        shared.dispatch(id(1), &w1, peer(), verdict).await;
        assert_eq!(rx0.recv().await.as_deref(), Some("reviewed 0 1 1\n"));
    }

    #[tokio::test]
    async fn test_empty_poll_answers_sentinel() {
        let shared = RouterShared::new(3);
        let (w2, mut rx2) = admit(&shared, 2);

        shared.dispatch(id(2), &w2, peer(), Frame::QueuePoll(id(2))).await;
        assert_eq!(rx2.recv().await.as_deref(), Some("queue -1 2\n"));
    }

    #[tokio::test]
    async fn test_poll_for_another_queue_is_rejected() {
        let shared = RouterShared::new(3);
        let (w1, mut rx1) = admit(&shared, 1);
        let (w2, mut rx2) = admit(&shared, 2);
        let (tx, mut observer) = mpsc::channel(16);
        shared.hub.attach(Uuid::new_v4(), tx);
        shared
            .queues
            .enqueue(id(2), ReviewTask::new(id(0), id(2)))
            .unwrap();

        shared.dispatch(id(1), &w1, peer(), Frame::QueuePoll(id(2))).await;

        assert_eq!(shared.queues.depth(id(2)), 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
        assert!(observer.recv().await.unwrap().contains("sent \"queue 2\""));
        let error = observer.recv().await.unwrap();
        assert!(error.contains("[E402]"), "{}", error);
        assert!(error.contains("from ID:1 for ID:2"), "{}", error);

        // The owner still gets its task
        shared.dispatch(id(2), &w2, peer(), Frame::QueuePoll(id(2))).await;
        assert_eq!(rx2.recv().await.as_deref(), Some("queue 0 2\n"));
    }

    #[tokio::test]
    async fn test_routing_miss_leaves_queues_alone() {
        let shared = RouterShared::new(3);
        let (w1, _rx1) = admit(&shared, 1);
        shared
            .queues
            .enqueue(id(2), ReviewTask::new(id(1), id(2)))
            .unwrap();

        // Identity 0 has no live connection
        let verdict = Frame::parse("reviewed 0 1 0");
        shared.dispatch(id(1), &w1, peer(), verdict).await;

        assert_eq!(shared.queues.depth(id(0)), 0);
        assert_eq!(shared.queues.depth(id(2)), 1);
    }

    #[tokio::test]
    async fn test_protocol_errors_are_reported_to_observers() {
        let shared = RouterShared::new(3);
        let (w0, mut rx0) = admit(&shared, 0);
        let (tx, mut observer) = mpsc::channel(16);
        shared.hub.attach(Uuid::new_v4(), tx);

        shared.dispatch(id(0), &w0, peer(), Frame::parse("hello")).await;
        shared.dispatch(id(0), &w0, peer(), Frame::Observer).await;

        let first = observer.recv().await.unwrap();
        assert!(first.contains("[E401] Malformed protocol frame: \"hello\""), "{}", first);
        // Handshake frames mid-session are logged as received, then rejected
        assert!(observer.recv().await.unwrap().contains("sent \"monitor\""));
        assert!(observer.recv().await.unwrap().contains("Unexpected MONITOR frame"));
        assert!(rx0.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_session_releases_registry_on_eof() {
        let shared = Arc::new(RouterShared::new(3));
        let (w0, _rx0) = admit(&shared, 0);
        let (_w1, mut rx1) = admit(&shared, 1);
        let (_tx, shutdown) = watch::channel(false);

        let (mut client, server) = tokio::io::duplex(256);
        let session = tokio::spawn(run_session(
            Arc::clone(&shared),
            id(0),
            w0,
            FrameReader::new(server),
            peer(),
            shutdown,
        ));

        client.write_all(b"check 1 0\n").await.unwrap();
        assert_eq!(rx1.recv().await.as_deref(), Some("check 1 0\n"));

        drop(client);
        session.await.unwrap();
        assert!(shared.registry.link(id(0)).is_none());
        assert!(shared.registry.link(id(1)).is_some());
    }

    #[tokio::test]
    async fn test_session_stops_on_shutdown() {
        let shared = Arc::new(RouterShared::new(2));
        let (w0, _rx0) = admit(&shared, 0);
        let (tx, shutdown) = watch::channel(false);
        let (_client, server) = tokio::io::duplex(64);

        let session = tokio::spawn(run_session(
            Arc::clone(&shared),
            id(0),
            w0,
            FrameReader::new(server),
            peer(),
            shutdown,
        ));
        tx.send(true).unwrap();
        session.await.unwrap();
        assert!(shared.registry.is_empty());
    }
}

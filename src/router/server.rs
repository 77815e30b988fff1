//! TCP front of the router
//!
//! A single accept loop, bounded by the observer poll interval so it keeps
//! checking the shutdown flag. Each accepted connection is classified by its
//! first frame in its own task:
//! - `monitor` joins the observer set
//! - `client [id]` is admitted to the registry and gets a session
//! - anything else is closed without a reply

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::observer::RouterEvent;
use super::registry::{Admission, PeerLink, StartPlan};
use super::session::{run_session, RouterShared};
use crate::config::RouterSettings;
use crate::error::{Error, Result};
use crate::protocol::{write_line, Frame, FrameReader};
use crate::types::Identity;

/// Bound listener plus the state its connections share
pub struct RouterServer {
    settings: RouterSettings,
    listener: TcpListener,
    local_addr: SocketAddr,
    shared: Arc<RouterShared>,
}

impl RouterServer {
    /// Bind the listening socket. This is the only failure that stops the router.
    pub async fn bind(settings: RouterSettings) -> Result<Self> {
        let addr = settings.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| Error::BindFailed {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| Error::BindFailed { addr, source })?;

        Ok(Self {
            shared: Arc::new(RouterShared::new(settings.group_size)),
            settings,
            listener,
            local_addr,
        })
    }

    /// Address actually bound (resolves port 0)
    #[cfg(test)]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept and classify connections until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let poll_interval = self.settings.observer_poll_interval();
        self.shared.hub.publish(RouterEvent::Listening {
            addr: self.local_addr,
            group_size: self.settings.group_size,
        });

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                accepted = tokio::time::timeout(poll_interval, self.listener.accept()) => {
                    match accepted {
                        Ok(Ok((stream, peer))) => {
                            let shared = Arc::clone(&self.shared);
                            let queue_size = self.settings.outbound_queue_size;
                            let shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                handle_connection(shared, stream, peer, queue_size, shutdown).await;
                            });
                        }
                        Ok(Err(e)) => warn!(error = %e, "Accept failed"),
                        Err(_) => debug!("Accept wait elapsed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.shared.hub.publish(RouterEvent::ShuttingDown);
        self.shared.registry.clear();
        self.shared.hub.clear();
        Ok(())
    }
}

/// Drain `rx` onto `writer` until every sender is gone or a write fails
fn spawn_writer<W>(mut writer: W, mut rx: mpsc::Receiver<String>, connection: Uuid) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if let Err(e) = write_line(&mut writer, &line).await {
                debug!(connection = %connection, error = %e, "Write failed, closing writer");
                break;
            }
        }
        let _ = writer.shutdown().await;
    })
}

/// Classify one fresh connection by its first frame and serve it
async fn handle_connection(
    shared: Arc<RouterShared>,
    stream: TcpStream,
    peer: SocketAddr,
    queue_size: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);

    let first = tokio::select! {
        first = reader.next_frame() => first,
        _ = shutdown.changed() => return,
    };
    let first = match first {
        Ok(Some(frame)) => frame,
        Ok(None) => {
            debug!(peer = %peer, "Connection closed before handshake");
            return;
        }
        Err(e) => {
            debug!(peer = %peer, error = %e, "Handshake read failed");
            return;
        }
    };

    let connection = Uuid::new_v4();
    match first {
        Frame::Observer => {
            let (tx, rx) = mpsc::channel(queue_size);
            let mut writer = spawn_writer(write_half, rx, connection);
            shared.hub.attach(connection, tx);
            shared.hub.publish(RouterEvent::ObserverAttached {
                observer: connection,
                peer,
            });

            // Observers never talk; reading only tells us when they leave.
            // The writer ends once the hub lets go of it at shutdown.
            loop {
                tokio::select! {
                    next = reader.next_frame() => match next {
                        Ok(Some(_)) => continue,
                        _ => break,
                    },
                    _ = &mut writer => break,
                }
            }
            if shared.hub.detach(connection) {
                shared.hub.publish(RouterEvent::ObserverDropped { observer: connection });
            }
        }
        Frame::Client { reconnect } => {
            let (tx, rx) = mpsc::channel(queue_size);
            spawn_writer(write_half, rx, connection);
            let link = PeerLink::new(connection, tx);

            match shared.registry.admit(reconnect, link.clone()) {
                Admission::Refused(identity) => {
                    shared.hub.publish(RouterEvent::HandshakeRefused { identity, peer });
                    link.send(&Frame::Break(identity)).await;
                }
                Admission::Admitted {
                    identity,
                    reconnect,
                    start,
                } => {
                    shared.hub.publish(RouterEvent::WorkerAdmitted {
                        identity,
                        peer,
                        reconnect,
                    });
                    announce_start(&shared, identity, &link, start).await;
                    run_session(shared, identity, link, reader, peer, shutdown).await;
                }
            }
        }
        other => {
            shared.hub.publish(RouterEvent::ProtocolError {
                peer,
                detail: format!("handshake expected, got {:?}", other.to_string()),
            });
        }
    }
}

/// Send `start` to whoever an admission says should begin
async fn announce_start(shared: &RouterShared, identity: Identity, link: &PeerLink, start: StartPlan) {
    match start {
        StartPlan::Waiting { registered } => {
            debug!(
                registered,
                group_size = shared.registry.group_size(),
                "Waiting for the rest of the group"
            );
        }
        StartPlan::StartGroup(members) => {
            for (member, member_link) in members {
                if !member_link.send(&Frame::Start(member)).await {
                    shared.hub.publish(RouterEvent::RoutingMiss {
                        identity: member,
                        frame: Frame::Start(member).to_string(),
                    });
                }
            }
            shared.hub.publish(RouterEvent::GroupStarted {
                group_size: shared.registry.group_size(),
            });
        }
        StartPlan::JoinRunning => {
            if !link.send(&Frame::Start(identity)).await {
                shared.hub.publish(RouterEvent::RoutingMiss {
                    identity,
                    frame: Frame::Start(identity).to_string(),
                });
            }
        }
    }
}

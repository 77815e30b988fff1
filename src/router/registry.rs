//! Worker registry and identity assignment
//!
//! Maps each identity to the live connection currently speaking for it.
//! Every connection owns a writer task fed by a bounded channel, so routing
//! a frame to a worker is a channel send and never touches the socket
//! while a lock is held.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::Frame;
use crate::types::Identity;

// ─────────────────────────────────────────────────────────────────
// Peer link
// ─────────────────────────────────────────────────────────────────

/// Handle to one connection's outbound queue
#[derive(Debug, Clone)]
pub struct PeerLink {
    connection: Uuid,
    tx: mpsc::Sender<String>,
}

impl PeerLink {
    pub fn new(connection: Uuid, tx: mpsc::Sender<String>) -> Self {
        Self { connection, tx }
    }

    /// Id of the underlying connection
    pub fn connection(&self) -> Uuid {
        self.connection
    }

    /// Queue `frame` for writing; false if the connection's writer is gone
    pub async fn send(&self, frame: &Frame) -> bool {
        self.tx.send(frame.encode()).await.is_ok()
    }
}

// ─────────────────────────────────────────────────────────────────
// Admission
// ─────────────────────────────────────────────────────────────────

/// Outcome of a `client` handshake
#[derive(Debug)]
pub enum Admission {
    /// Worker holds `identity`; `start` says who must now be told to begin
    Admitted {
        identity: Identity,
        reconnect: bool,
        start: StartPlan,
    },
    /// No identity could be granted; the worker gets `break <identity>`
    Refused(Identity),
}

/// Which workers to send `start` to after an admission
#[derive(Debug)]
pub enum StartPlan {
    /// Group still incomplete
    Waiting { registered: usize },
    /// This admission completed the group: every member, in identity order
    StartGroup(Vec<(Identity, PeerLink)>),
    /// Group already running: only the newcomer
    JoinRunning,
}

// ─────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct RegistryState {
    links: HashMap<Identity, PeerLink>,
    next_identity: u32,
    started: bool,
}

/// Identity → connection map for a fixed-size group
#[derive(Debug)]
pub struct ConnectionRegistry {
    group_size: u32,
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new(group_size: u32) -> Self {
        Self {
            group_size,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn group_size(&self) -> u32 {
        self.group_size
    }

    /// Classify a `client` handshake and register the connection.
    ///
    /// A fresh worker takes the lowest identity the counter has not handed
    /// out yet, skipping identities already claimed by reconnects; the
    /// counter never goes back. A reconnect identity inside the group is
    /// honored as is and replaces whatever connection held it.
    ///
    /// There is no liveness check on the replaced connection: any client
    /// naming an in-range identity takes that slot over.
    pub fn admit(&self, requested: Option<Identity>, link: PeerLink) -> Admission {
        let mut state = self.state.write();

        let (identity, reconnect) = match requested {
            Some(identity) if identity.is_member_of(self.group_size) => (identity, true),
            Some(identity) => return Admission::Refused(identity),
            None => {
                while state.next_identity < self.group_size
                    && state.links.contains_key(&Identity::new(state.next_identity))
                {
                    state.next_identity += 1;
                }
                let candidate = Identity::new(state.next_identity);
                if !candidate.is_member_of(self.group_size) {
                    return Admission::Refused(candidate);
                }
                state.next_identity += 1;
                (candidate, false)
            }
        };

        state.links.insert(identity, link);

        let start = if state.started {
            StartPlan::JoinRunning
        } else if state.links.len() as u32 == self.group_size {
            state.started = true;
            let mut members: Vec<_> = state
                .links
                .iter()
                .map(|(id, link)| (*id, link.clone()))
                .collect();
            members.sort_by_key(|(id, _)| *id);
            StartPlan::StartGroup(members)
        } else {
            StartPlan::Waiting {
                registered: state.links.len(),
            }
        };

        Admission::Admitted {
            identity,
            reconnect,
            start,
        }
    }

    /// Current link for `identity`
    pub fn link(&self, identity: Identity) -> Option<PeerLink> {
        self.state.read().links.get(&identity).cloned()
    }

    /// Drop `identity`'s entry if `connection` still owns it.
    ///
    /// A session that was superseded by a reconnect must not evict its
    /// replacement.
    pub fn release(&self, identity: Identity, connection: Uuid) -> bool {
        let mut state = self.state.write();
        match state.links.get(&identity) {
            Some(link) if link.connection == connection => {
                state.links.remove(&identity);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub fn is_started(&self) -> bool {
        self.state.read().started
    }

    /// Number of identities with a live entry
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.state.read().links.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.state.read().links.is_empty()
    }

    /// Drop every entry, closing writers once their sessions let go
    pub fn clear(&self) {
        self.state.write().links.clear();
    }
}

//! Frame definitions and the text encoding
//!
//! | Frame                                | Direction       |
//! |--------------------------------------|-----------------|
//! | `client [id]`                        | worker → router |
//! | `monitor`                            | observer → router |
//! | `start <id>`                         | router → worker |
//! | `break <id>`                         | router → worker |
//! | `check <to> <from>`                  | both ways       |
//! | `reviewed <to> <from> <0\|1>`        | both ways       |
//! | `queue <id>`                         | worker → router |
//! | `queue <from\|-1> <id>`              | router → worker |

use std::fmt;
use std::str::FromStr;

use crate::types::{Identity, Verdict};

/// Sentinel carried by a poll answer when the queue is empty
pub const EMPTY_QUEUE_SENTINEL: &str = "-1";

// ─────────────────────────────────────────────────────────────────
// Frame
// ─────────────────────────────────────────────────────────────────

/// One decoded protocol line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Worker handshake, optionally carrying the identity it had before
    Client { reconnect: Option<Identity> },

    /// Observer handshake
    Observer,

    /// Group is complete; carries the worker's assigned identity
    Start(Identity),

    /// Handshake refused for this identity
    Break(Identity),

    /// `from` asks `to` to review its work
    CheckRequest { to: Identity, from: Identity },

    /// `from` reports its verdict on `to`'s work
    ReviewResult {
        to: Identity,
        from: Identity,
        verdict: Verdict,
    },

    /// Worker asks for the head of its own queue
    QueuePoll(Identity),

    /// Router's answer to a poll; `from` is `None` when the queue was empty
    QueueAnswer {
        from: Option<Identity>,
        identity: Identity,
    },

    /// Empty or unparseable line, kept verbatim for the caller to judge
    Unknown(String),
}

impl Frame {
    /// Decode one line (without its terminating newline).
    ///
    /// Never fails: anything that does not match the grammar exactly comes
    /// back as [`Frame::Unknown`].
    pub fn parse(line: &str) -> Frame {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        parse_tokens(&tokens).unwrap_or_else(|| Frame::Unknown(line.trim_end().to_string()))
    }

    /// Encode as one wire line, trailing newline included
    pub fn encode(&self) -> String {
        format!("{}\n", self)
    }

    /// Short name for logs
    pub fn type_name(&self) -> &'static str {
        match self {
            Frame::Client { .. } => "CLIENT",
            Frame::Observer => "MONITOR",
            Frame::Start(_) => "START",
            Frame::Break(_) => "BREAK",
            Frame::CheckRequest { .. } => "CHECK",
            Frame::ReviewResult { .. } => "REVIEWED",
            Frame::QueuePoll(_) => "QUEUE_POLL",
            Frame::QueueAnswer { .. } => "QUEUE_ANSWER",
            Frame::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Client { reconnect: None } => write!(f, "client"),
            Frame::Client { reconnect: Some(id) } => write!(f, "client {}", id),
            Frame::Observer => write!(f, "monitor"),
            Frame::Start(id) => write!(f, "start {}", id),
            Frame::Break(id) => write!(f, "break {}", id),
            Frame::CheckRequest { to, from } => write!(f, "check {} {}", to, from),
            Frame::ReviewResult { to, from, verdict } => {
                write!(f, "reviewed {} {} {}", to, from, verdict.as_wire())
            }
            Frame::QueuePoll(id) => write!(f, "queue {}", id),
            Frame::QueueAnswer { from: Some(from), identity } => {
                write!(f, "queue {} {}", from, identity)
            }
            Frame::QueueAnswer { from: None, identity } => {
                write!(f, "queue {} {}", EMPTY_QUEUE_SENTINEL, identity)
            }
            Frame::Unknown(raw) => write!(f, "{}", raw),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Token grammar
// ─────────────────────────────────────────────────────────────────

fn parse_tokens(tokens: &[&str]) -> Option<Frame> {
    let frame = match tokens {
        ["client"] => Frame::Client { reconnect: None },
        ["client", id] => Frame::Client {
            reconnect: Some(identity(id)?),
        },
        ["monitor"] => Frame::Observer,
        ["start", id] => Frame::Start(identity(id)?),
        ["break", id] => Frame::Break(identity(id)?),
        ["check", to, from] => Frame::CheckRequest {
            to: identity(to)?,
            from: identity(from)?,
        },
        ["reviewed", to, from, verdict] => Frame::ReviewResult {
            to: identity(to)?,
            from: identity(from)?,
            verdict: Verdict::from_wire(number(verdict)?)?,
        },
        ["queue", id] => Frame::QueuePoll(identity(id)?),
        ["queue", from, id] => Frame::QueueAnswer {
            from: optional_identity(from)?,
            identity: identity(id)?,
        },
        _ => return None,
    };
    Some(frame)
}

/// Plain decimal digits only; `str::parse` alone would also take a leading `+`
fn number<T: FromStr>(token: &str) -> Option<T> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

fn identity(token: &str) -> Option<Identity> {
    number::<u32>(token).map(Identity::new)
}

/// `-1` decodes to `Some(None)`; garbage decodes to `None`
fn optional_identity(token: &str) -> Option<Option<Identity>> {
    if token == EMPTY_QUEUE_SENTINEL {
        Some(None)
    } else {
        identity(token).map(Some)
    }
}

//! Task router (server side)
//!
//! Classifies incoming connections, keeps one review queue per worker,
//! relays requests and verdicts between workers, and mirrors every event
//! to attached observers.

mod observer;
mod queue;
mod registry;
mod server;
mod session;

pub use server::RouterServer;

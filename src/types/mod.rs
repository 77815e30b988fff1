//! Core domain types shared by the router and the workers
//!
//! Identities name workers inside the fixed group; review tasks and
//! verdicts are what flows between them.

mod identity;
mod review;

pub use identity::*;
pub use review::*;

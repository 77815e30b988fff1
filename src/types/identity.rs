//! Worker identities

use std::fmt;

use serde::{Deserialize, Serialize};

/// Small integer naming one worker within the fixed-size group.
///
/// Assigned once by the router's registry (or supplied by the worker on
/// reconnect) and immutable for the lifetime of that worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(u32);

impl Identity {
    /// Wrap a raw identity value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw numeric value as carried on the wire
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Position of this identity in per-identity tables
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether this identity belongs to a group of `group_size` workers
    pub const fn is_member_of(self, group_size: u32) -> bool {
        self.0 < group_size
    }

    /// Every identity of a group, in ascending order
    pub fn all(group_size: u32) -> impl Iterator<Item = Identity> {
        (0..group_size).map(Identity)
    }
}

impl From<u32> for Identity {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership() {
        assert!(Identity::new(0).is_member_of(3));
        assert!(Identity::new(2).is_member_of(3));
        assert!(!Identity::new(3).is_member_of(3));
    }

    #[test]
    fn test_all_is_ordered() {
        let ids: Vec<u32> = Identity::all(3).map(Identity::get).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Identity::new(7).to_string(), "7");
    }
}

//! Review tasks and verdicts

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Identity;

// ─────────────────────────────────────────────────────────────────
// Verdict
// ─────────────────────────────────────────────────────────────────

/// Binary outcome of a peer review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// The work was rejected and must be rewritten
    Fail,
    /// The work was accepted
    Pass,
}

impl Verdict {
    /// Wire encoding (`0` = fail, `1` = pass)
    pub const fn as_wire(self) -> u8 {
        match self {
            Verdict::Fail => 0,
            Verdict::Pass => 1,
        }
    }

    /// Decode the wire value; anything but `0` or `1` is rejected
    pub const fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verdict::Fail),
            1 => Some(Verdict::Pass),
            _ => None,
        }
    }

    /// Whether the work was accepted
    #[cfg(test)]
    pub const fn is_pass(self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl From<bool> for Verdict {
    fn from(passed: bool) -> Self {
        if passed {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Fail => write!(f, "REJECTED"),
            Verdict::Pass => write!(f, "ACCEPTED"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Review Task
// ─────────────────────────────────────────────────────────────────

/// One pending request for peer review.
///
/// Lives in exactly one queue (the reviewer's) until the reviewer polls it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewTask {
    /// Worker whose work needs reviewing
    pub requester: Identity,

    /// Worker asked to review it
    pub reviewer: Identity,

    /// Unset until the reviewer reports back
    pub verdict: Option<Verdict>,
}

impl ReviewTask {
    /// Create a task that has not been reviewed yet
    pub fn new(requester: Identity, reviewer: Identity) -> Self {
        Self {
            requester,
            reviewer,
            verdict: None,
        }
    }

    /// Attach the reviewer's verdict
    pub fn with_verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = Some(verdict);
        self
    }
}

impl fmt::Display for ReviewTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from ID:{} to ID:{} result:", self.requester, self.reviewer)?;
        match self.verdict {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "undecided"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_wire_values() {
        assert_eq!(Verdict::Fail.as_wire(), 0);
        assert_eq!(Verdict::Pass.as_wire(), 1);
        assert_eq!(Verdict::from_wire(1), Some(Verdict::Pass));
        assert_eq!(Verdict::from_wire(0), Some(Verdict::Fail));
        assert_eq!(Verdict::from_wire(2), None);
    }

    #[test]
    fn test_new_task_is_undecided() {
        let task = ReviewTask::new(Identity::new(0), Identity::new(1));
        assert!(task.verdict.is_none());
        assert_eq!(task.to_string(), "from ID:0 to ID:1 result:undecided");

        let task = task.with_verdict(Verdict::Pass);
        assert_eq!(task.verdict, Some(Verdict::Pass));
    }
}

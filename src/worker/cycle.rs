//! Review cycle bookkeeping
//!
//! Tracks what a worker is doing and who reviews its next piece of work.
//! A rejected piece goes back to the same reviewer; an accepted one frees
//! the worker to draw a new reviewer.

use std::fmt;

use rand::Rng;

use crate::error::{Error, Result};
use crate::types::{Identity, Verdict};

/// What the worker is busy with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Writing,
    AwaitingResult,
    Reviewing,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Writing => write!(f, "writing"),
            Mode::AwaitingResult => write!(f, "awaiting result"),
            Mode::Reviewing => write!(f, "reviewing"),
        }
    }
}

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Accepted: next cycle draws a fresh reviewer
    PassContinue,
    /// Rejected: next cycle rewrites for the same reviewer
    FailRewrite,
}

/// Client-side state of one worker
#[derive(Debug, Clone)]
pub struct ReviewCycle {
    own: Identity,
    group_size: u32,
    mode: Mode,
    current_reviewer: Option<Identity>,
    pinned: Option<Identity>,
}

impl ReviewCycle {
    pub fn new(own: Identity, group_size: u32) -> Result<Self> {
        if group_size < 2 {
            return Err(Error::config_field_invalid(
                "router.group_size",
                "a worker needs at least one peer to review its work",
            ));
        }
        if !own.is_member_of(group_size) {
            return Err(Error::Config(format!(
                "identity {} is outside the group of {} workers",
                own, group_size
            )));
        }

        Ok(Self {
            own,
            group_size,
            mode: Mode::Writing,
            current_reviewer: None,
            pinned: None,
        })
    }

    pub fn own(&self) -> Identity {
        self.own
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Reviewer of the work currently out for review
    #[cfg(test)]
    pub fn current_reviewer(&self) -> Option<Identity> {
        self.current_reviewer
    }

    /// Reviewer the next cycle is bound to, if the last one was rejected
    pub fn pinned(&self) -> Option<Identity> {
        self.pinned
    }

    /// Pick the reviewer for the work just written.
    ///
    /// Reuses the pinned reviewer after a rejection, otherwise draws
    /// uniformly from every other member of the group.
    pub fn choose_reviewer<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Identity {
        let reviewer = match self.pinned {
            Some(pinned) => pinned,
            None => {
                let mut pick = rng.gen_range(0..self.group_size - 1);
                if pick >= self.own.get() {
                    pick += 1;
                }
                Identity::new(pick)
            }
        };
        self.current_reviewer = Some(reviewer);
        self.mode = Mode::AwaitingResult;
        reviewer
    }

    /// Close the cycle with `verdict` and return to writing
    pub fn apply_verdict(&mut self, verdict: Verdict) -> CycleOutcome {
        self.mode = Mode::Writing;
        let reviewer = self.current_reviewer.take();
        match verdict {
            Verdict::Pass => {
                self.pinned = None;
                CycleOutcome::PassContinue
            }
            Verdict::Fail => {
                self.pinned = reviewer;
                CycleOutcome::FailRewrite
            }
        }
    }
}

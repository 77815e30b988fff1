//! Where a worker's actual writing and reviewing happens
//!
//! The protocol driver only needs to know how long these take and what
//! verdict a review produces, so both sit behind [`WorkDesk`].

use std::ops::RangeInclusive;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::WorkerSettings;
use crate::types::{Identity, Verdict};

/// Writing and reviewing, as seen by the review cycle
#[async_trait]
pub trait WorkDesk: Send {
    /// Produce the next piece of work
    async fn write(&mut self);

    /// Review `requester`'s work and decide
    async fn review(&mut self, requester: Identity) -> Verdict;
}

/// Stand-in worker: random delays and a coin-flip verdict
#[derive(Debug)]
pub struct SimulatedDesk {
    rng: StdRng,
    write_ms: RangeInclusive<u64>,
    review_ms: RangeInclusive<u64>,
}

impl SimulatedDesk {
    pub fn new(rng: StdRng, write_ms: RangeInclusive<u64>, review_ms: RangeInclusive<u64>) -> Self {
        Self {
            rng,
            write_ms,
            review_ms,
        }
    }

    /// Delays from `settings`, seeded from `settings.seed` when set
    pub fn from_settings(settings: &WorkerSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(
            rng,
            settings.min_write_ms..=settings.max_write_ms,
            settings.min_review_ms..=settings.max_review_ms,
        )
    }

    fn delay(&mut self, range: RangeInclusive<u64>) -> Duration {
        Duration::from_millis(self.rng.gen_range(range))
    }
}

#[async_trait]
impl WorkDesk for SimulatedDesk {
    async fn write(&mut self) {
        let delay = self.delay(self.write_ms.clone());
        tokio::time::sleep(delay).await;
    }

    async fn review(&mut self, _requester: Identity) -> Verdict {
        let delay = self.delay(self.review_ms.clone());
        tokio::time::sleep(delay).await;
        Verdict::from(self.rng.gen_bool(0.5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_desk(seed: u64) -> SimulatedDesk {
        SimulatedDesk::new(StdRng::seed_from_u64(seed), 0..=2, 0..=2)
    }

    #[tokio::test]
    async fn test_simulated_desk_produces_both_verdicts() {
        let mut desk = quick_desk(11);
        desk.write().await;

        let mut passes = 0;
        for _ in 0..64 {
            if desk.review(Identity::new(0)).await.is_pass() {
                passes += 1;
            }
        }
        assert!(passes > 0 && passes < 64);
    }

    #[tokio::test]
    async fn test_seed_makes_runs_repeatable() {
        let mut a = quick_desk(5);
        let mut b = quick_desk(5);
        for _ in 0..16 {
            assert_eq!(
                a.review(Identity::new(1)).await,
                b.review(Identity::new(1)).await
            );
        }
    }

    #[test]
    fn test_from_settings_uses_ranges() {
        let settings = WorkerSettings {
            min_write_ms: 3,
            max_write_ms: 3,
            seed: Some(1),
            ..Default::default()
        };
        let mut desk = SimulatedDesk::from_settings(&settings);
        assert_eq!(desk.delay(desk.write_ms.clone()), Duration::from_millis(3));
    }
}

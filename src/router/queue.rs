//! Per-identity review queues
//!
//! One FIFO per worker, each behind its own lock, so workers polling
//! different identities never contend. Locks are held for a single
//! push or pop and never across I/O.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::types::{Identity, ReviewTask};

/// Sharded set of review queues, indexed by reviewer identity
#[derive(Debug)]
pub struct TaskRouter {
    queues: Vec<Mutex<VecDeque<ReviewTask>>>,
}

impl TaskRouter {
    /// One empty queue per identity of a `group_size` group
    pub fn new(group_size: u32) -> Self {
        let queues = Identity::all(group_size)
            .map(|_| Mutex::new(VecDeque::new()))
            .collect();
        Self { queues }
    }

    /// Append `task` to `reviewer`'s queue.
    ///
    /// Fails only for an identity outside the group.
    pub fn enqueue(&self, reviewer: Identity, task: ReviewTask) -> Result<()> {
        let queue = self
            .queues
            .get(reviewer.index())
            .ok_or(Error::RoutingMiss { identity: reviewer })?;
        queue.lock().push_back(task);
        Ok(())
    }

    /// Remove and return the head of `identity`'s queue.
    ///
    /// Returns immediately; `None` means the queue was empty or the identity
    /// is not part of the group.
    pub fn poll(&self, identity: Identity) -> Option<ReviewTask> {
        self.queues.get(identity.index())?.lock().pop_front()
    }

    /// Number of tasks waiting for `identity`
    #[cfg(test)]
    pub fn depth(&self, identity: Identity) -> usize {
        self.queues
            .get(identity.index())
            .map(|q| q.lock().len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn id(raw: u32) -> Identity {
        Identity::new(raw)
    }

    #[test]
    fn test_poll_empty_returns_none() {
        let router = TaskRouter::new(3);
        assert_eq!(router.poll(id(2)), None);
        assert_eq!(router.poll(id(2)), None);
    }

    #[test]
    fn test_fifo_per_identity() {
        let router = TaskRouter::new(3);
        router.enqueue(id(1), ReviewTask::new(id(0), id(1))).unwrap();
        router.enqueue(id(2), ReviewTask::new(id(0), id(2))).unwrap();
        router.enqueue(id(1), ReviewTask::new(id(2), id(1))).unwrap();

        assert_eq!(router.depth(id(1)), 2);
        assert_eq!(router.poll(id(1)).unwrap().requester, id(0));

        router.enqueue(id(1), ReviewTask::new(id(0), id(1))).unwrap();
        assert_eq!(router.poll(id(1)).unwrap().requester, id(2));
        assert_eq!(router.poll(id(1)).unwrap().requester, id(0));
        assert_eq!(router.poll(id(1)), None);

        // The other identity was untouched
        assert_eq!(router.poll(id(2)).unwrap().requester, id(0));
    }

    #[test]
    fn test_out_of_group_identity() {
        let router = TaskRouter::new(3);
        let err = router.enqueue(id(7), ReviewTask::new(id(0), id(7))).unwrap_err();
        assert!(matches!(err, Error::RoutingMiss { .. }));
        assert_eq!(router.poll(id(7)), None);
        assert_eq!(router.depth(id(7)), 0);
    }

    #[test]
    fn test_concurrent_producers_keep_per_producer_order() {
        let router = Arc::new(TaskRouter::new(4));
        let handles: Vec<_> = (1..4)
            .map(|producer| {
                let router = Arc::clone(&router);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        router.enqueue(id(0), ReviewTask::new(id(producer), id(0))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut seen = 0;
        while router.poll(id(0)).is_some() {
            seen += 1;
        }
        assert_eq!(seen, 300);
    }
}

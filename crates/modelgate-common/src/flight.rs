//! Single-flight execution keyed by an identifier
//!
//! The first caller for a key starts the work on a detached tokio task and
//! leaves a marker in the in-flight table. Callers arriving while the marker
//! exists attach to the same operation instead of starting another. The marker
//! is cleared before the outcome is published, so a caller that comes later
//! starts a fresh attempt.
//!
//! Because the work runs on its own task, a waiter that is cancelled (its
//! future dropped) detaches without affecting the operation or the other
//! waiters.

use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::FlightAbandoned;

type Marker<V> = watch::Receiver<Option<V>>;

/// Deduplicates concurrent operations per key; every waiter of one operation
/// receives a clone of the same outcome.
pub struct SingleFlight<K, V> {
    inflight: Arc<DashMap<K, Marker<V>>>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Create an empty in-flight table
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
        }
    }

    /// Run `work` for `key` unless an operation for `key` is already in
    /// flight, in which case wait for that operation's outcome instead.
    ///
    /// `work` is only invoked by the caller that becomes the leader. Must be
    /// called from within a tokio runtime.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> Result<V, FlightAbandoned>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let (mut marker, leader) = match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), None),
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(rx.clone());
                (rx, Some(tx))
            }
        };

        match leader {
            Some(tx) => {
                debug!(key = %key, "Starting in-flight operation");
                let operation = work();
                let publisher = Publisher {
                    inflight: Arc::clone(&self.inflight),
                    key: key.clone(),
                    tx,
                    cleared: false,
                };
                tokio::spawn(async move {
                    let outcome = operation.await;
                    publisher.publish(outcome);
                });
            }
            None => debug!(key = %key, "Joining in-flight operation"),
        }

        let outcome = marker
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|published| (*published).clone());

        outcome.ok_or_else(|| {
            warn!(key = %key, "In-flight operation ended without an outcome");
            FlightAbandoned {
                key: key.to_string(),
            }
        })
    }

    /// Whether an operation for `key` is currently running
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.inflight.contains_key(key)
    }

    /// Number of operations currently running
    pub fn in_flight_count(&self) -> usize {
        self.inflight.len()
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Owned by the operation task. Clears the in-flight marker before the
/// outcome becomes visible, and also when the task unwinds without one.
struct Publisher<K: Eq + Hash, V> {
    inflight: Arc<DashMap<K, Marker<V>>>,
    key: K,
    tx: watch::Sender<Option<V>>,
    cleared: bool,
}

impl<K: Eq + Hash, V> Publisher<K, V> {
    fn clear(&mut self) {
        if !self.cleared {
            self.inflight.remove(&self.key);
            self.cleared = true;
        }
    }

    fn publish(mut self, outcome: V) {
        self.clear();
        // Every waiter holds a receiver, so this only fails when all of them
        // were cancelled.
        let _ = self.tx.send(Some(outcome));
    }
}

impl<K: Eq + Hash, V> Drop for Publisher<K, V> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_execution() {
        let flight: Arc<SingleFlight<String, usize>> = Arc::new(SingleFlight::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let flight = Arc::clone(&flight);
            let runs = Arc::clone(&runs);
            tasks.push(tokio::spawn(async move {
                flight
                    .run("model".to_string(), move || async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        runs.fetch_add(1, Ordering::SeqCst) + 1
                    })
                    .await
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok(1));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_later_caller_starts_fresh_attempt() {
        let flight: SingleFlight<String, u32> = SingleFlight::new();

        let first = flight.run("k".to_string(), || async { 1 }).await;
        let second = flight.run("k".to_string(), || async { 2 }).await;

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(2));
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_wait_on_each_other() {
        let flight: Arc<SingleFlight<String, &'static str>> = Arc::new(SingleFlight::new());

        let slow = {
            let flight = Arc::clone(&flight);
            tokio::spawn(async move {
                flight
                    .run("slow".to_string(), || async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        "slow"
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let fast = tokio::time::timeout(
            Duration::from_millis(500),
            flight.run("fast".to_string(), || async { "fast" }),
        )
        .await;

        assert_eq!(fast, Ok(Ok("fast")));
        assert!(flight.is_in_flight(&"slow".to_string()));
        slow.abort();
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_cancel_operation() {
        let flight: Arc<SingleFlight<String, u32>> = Arc::new(SingleFlight::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let leader = {
            let flight = Arc::clone(&flight);
            let runs = Arc::clone(&runs);
            tokio::spawn(async move {
                flight
                    .run("k".to_string(), move || async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        runs.fetch_add(1, Ordering::SeqCst);
                        7
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        leader.abort();

        let joined = flight.run("k".to_string(), || async { 99 }).await;
        assert_eq!(joined, Ok(7));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_operation_is_abandoned() {
        let flight: SingleFlight<String, u32> = SingleFlight::new();

        let result = flight
            .run("boom".to_string(), || async {
                if true {
                    panic!("operation failed");
                }
                0
            })
            .await;

        assert_eq!(
            result,
            Err(FlightAbandoned {
                key: "boom".to_string()
            })
        );
        assert!(!flight.is_in_flight(&"boom".to_string()));
    }
}

//! Eviction policies
//!
//! The pool only ever offers free (checked-in) instances as candidates; a
//! policy decides which of them goes when capacity is needed and which are
//! old enough for the idle reaper.

use std::time::Duration;

use modelgate_common::ModelId;

/// A free, loaded instance that could be evicted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleCandidate {
    pub model: ModelId,
    pub idle_for: Duration,
}

/// Decides which free instances to drop
pub trait EvictionPolicy: Send + Sync {
    /// Index of the candidate to evict to make room, or `None` to keep all
    fn select_victim(&self, candidates: &[IdleCandidate]) -> Option<usize>;

    /// Whether the reaper should drop this candidate
    fn is_expired(&self, candidate: &IdleCandidate) -> bool;
}

/// Evicts the least recently used instance; optionally expires instances idle
/// for longer than a timeout
#[derive(Debug, Clone, Default)]
pub struct LruEviction {
    idle_timeout: Option<Duration>,
}

impl LruEviction {
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        Self { idle_timeout }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }
}

impl EvictionPolicy for LruEviction {
    fn select_victim(&self, candidates: &[IdleCandidate]) -> Option<usize> {
        candidates
            .iter()
            .enumerate()
            .max_by_key(|(_, candidate)| candidate.idle_for)
            .map(|(index, _)| index)
    }

    fn is_expired(&self, candidate: &IdleCandidate) -> bool {
        self.idle_timeout
            .map_or(false, |timeout| candidate.idle_for >= timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, idle_secs: u64) -> IdleCandidate {
        IdleCandidate {
            model: ModelId::parse(name).unwrap(),
            idle_for: Duration::from_secs(idle_secs),
        }
    }

    #[test]
    fn test_lru_picks_longest_idle() {
        let policy = LruEviction::default();
        let candidates = vec![candidate("a", 5), candidate("b", 50), candidate("c", 1)];
        assert_eq!(policy.select_victim(&candidates), Some(1));
        assert_eq!(policy.select_victim(&[]), None);
    }

    #[test]
    fn test_idle_timeout_expiry() {
        let policy = LruEviction::new(Some(Duration::from_secs(10)));
        assert!(policy.is_expired(&candidate("a", 10)));
        assert!(!policy.is_expired(&candidate("a", 9)));
        assert!(!LruEviction::default().is_expired(&candidate("a", 10_000)));
    }
}

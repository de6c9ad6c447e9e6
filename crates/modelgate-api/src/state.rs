//! Application state for the API server

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::gateway::CompletionGateway;

/// Readiness reported by `GET /health`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Warm-up still running
    Starting,
    /// Serving normally
    Ready,
    /// Warm-up failed; requests may still succeed after a retry
    Degraded,
}

impl Readiness {
    /// Name reported in the health response
    pub fn as_str(&self) -> &'static str {
        match self {
            Readiness::Starting => "starting",
            Readiness::Ready => "ready",
            Readiness::Degraded => "degraded",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Readiness::Starting,
            1 => Readiness::Ready,
            _ => Readiness::Degraded,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Readiness::Starting => 0,
            Readiness::Ready => 1,
            Readiness::Degraded => 2,
        }
    }
}

/// Application state shared across all API handlers
#[derive(Clone)]
pub struct AppState {
    /// Completion gateway
    pub gateway: Arc<CompletionGateway>,
    /// Message returned by `GET /`
    pub status_message: Arc<str>,
    /// Server start time for uptime calculation
    pub start_time: std::time::Instant,
    readiness: Arc<AtomicU8>,
}

impl AppState {
    /// Create new application state; readiness starts as [`Readiness::Starting`]
    pub fn new(gateway: Arc<CompletionGateway>, status_message: impl Into<Arc<str>>) -> Self {
        Self {
            gateway,
            status_message: status_message.into(),
            start_time: std::time::Instant::now(),
            readiness: Arc::new(AtomicU8::new(Readiness::Starting.as_u8())),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Current readiness
    pub fn readiness(&self) -> Readiness {
        Readiness::from_u8(self.readiness.load(Ordering::SeqCst))
    }

    /// Update readiness
    pub fn set_readiness(&self, readiness: Readiness) {
        self.readiness.store(readiness.as_u8(), Ordering::SeqCst);
    }
}

//! Model instance pool for ModelGate
//!
//! Keeps at most one loaded instance per model, bounded by a pool capacity,
//! and hands instances out through an exclusive checkout so no two callers
//! ever run `generate` on the same instance at once.

pub mod backends;
pub mod error;
pub mod eviction;
pub mod handle;
pub mod pool;

pub use backends::{MockHandle, MockLoader, OllamaLoader};
pub use error::{BackendError, InferenceError, PoolError};
pub use eviction::{EvictionPolicy, IdleCandidate, LruEviction};
pub use handle::{ChatMessage, ModelHandle, ModelLoader};
pub use pool::{InstancePool, PoolConfig, PoolStats, PooledHandle, SlotStatus};

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

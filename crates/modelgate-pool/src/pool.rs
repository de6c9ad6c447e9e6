//! Instance pool with exclusive checkout

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant as StdInstant};

use dashmap::DashMap;
use modelgate_common::{ModelId, SingleFlight};
use modelgate_local_models::ModelArtifact;
use serde::Serialize;
use tokio::sync::{Mutex, Notify, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::error::{InferenceError, PoolError};
use crate::eviction::{EvictionPolicy, IdleCandidate, LruEviction};
use crate::handle::{ChatMessage, ModelHandle, ModelLoader};
use crate::Result;

/// Pool sizing and timing
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of loaded instances across all models
    pub capacity: usize,
    /// How long a checkout may wait for an instance or for capacity
    pub checkout_timeout: Duration,
    /// Free instances idle for this long are dropped by the reaper
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 1,
            checkout_timeout: Duration::from_secs(30),
            idle_timeout: None,
        }
    }
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub resident: usize,
    pub busy: usize,
    pub loading: usize,
}

/// Occupancy of one model's slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Free,
    Busy,
}

struct SlotState {
    handle: Option<Box<dyn ModelHandle>>,
    last_used: StdInstant,
}

/// Per-model slot. Slots are created on first checkout and never removed;
/// eviction only empties them.
struct PoolSlot {
    model: ModelId,
    state: Arc<Mutex<SlotState>>,
    resident: AtomicBool,
    /// Checkouts in progress for this model; a slot with waiters is never
    /// an eviction candidate
    waiters: AtomicUsize,
}

impl PoolSlot {
    fn new(model: ModelId) -> Self {
        Self {
            model,
            state: Arc::new(Mutex::new(SlotState {
                handle: None,
                last_used: StdInstant::now(),
            })),
            resident: AtomicBool::new(false),
            waiters: AtomicUsize::new(0),
        }
    }

    fn is_resident(&self) -> bool {
        self.resident.load(Ordering::SeqCst)
    }
}

struct PoolInner {
    config: PoolConfig,
    loader: Arc<dyn ModelLoader>,
    policy: Arc<dyn EvictionPolicy>,
    slots: DashMap<ModelId, Arc<PoolSlot>>,
    loads: SingleFlight<ModelId, Result<()>>,
    resident: AtomicUsize,
    released: Notify,
}

/// Registers a checkout in progress on a slot
struct Waiting<'a>(&'a PoolSlot);

impl<'a> Waiting<'a> {
    fn register(slot: &'a PoolSlot) -> Self {
        slot.waiters.fetch_add(1, Ordering::SeqCst);
        Self(slot)
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.0.waiters.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Capacity held by an in-progress load; given back unless committed
struct Reservation<'a> {
    pool: &'a PoolInner,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.pool.resident.fetch_sub(1, Ordering::SeqCst);
            self.pool.released.notify_waiters();
        }
    }
}

impl PoolInner {
    fn slot(&self, model: &ModelId) -> Arc<PoolSlot> {
        if let Some(slot) = self.slots.get(model) {
            return Arc::clone(slot.value());
        }
        let slot = self
            .slots
            .entry(model.clone())
            .or_insert_with(|| Arc::new(PoolSlot::new(model.clone())));
        Arc::clone(slot.value())
    }

    fn exhausted(&self, model: &ModelId) -> PoolError {
        PoolError::Exhausted {
            model: model.clone(),
            capacity: self.config.capacity,
        }
    }

    fn try_reserve(&self) -> bool {
        let capacity = self.config.capacity;
        self.resident
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < capacity).then_some(n + 1)
            })
            .is_ok()
    }

    /// Reserve room for one more instance, evicting a free instance or
    /// waiting for one to be released if the pool is full.
    async fn reserve(&self, model: &ModelId, deadline: Instant) -> Result<Reservation<'_>> {
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if self.try_reserve() {
                return Ok(Reservation {
                    pool: self,
                    committed: false,
                });
            }
            if self.evict_one() {
                continue;
            }

            debug!(
                model = %model,
                capacity = self.config.capacity,
                "Pool full, waiting for an instance to free up"
            );
            if timeout_at(deadline, released).await.is_err() {
                return Err(self.exhausted(model));
            }
        }
    }

    /// Lock every free resident instance without blocking
    fn free_instances(&self) -> Vec<(Arc<PoolSlot>, OwnedMutexGuard<SlotState>)> {
        let resident: Vec<Arc<PoolSlot>> = self
            .slots
            .iter()
            .filter(|entry| entry.value().is_resident())
            .filter(|entry| entry.value().waiters.load(Ordering::SeqCst) == 0)
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        resident
            .into_iter()
            .filter_map(|slot| {
                let guard = Arc::clone(&slot.state).try_lock_owned().ok()?;
                guard.handle.is_some().then_some((slot, guard))
            })
            .collect()
    }

    fn candidates(free: &[(Arc<PoolSlot>, OwnedMutexGuard<SlotState>)]) -> Vec<IdleCandidate> {
        free.iter()
            .map(|(slot, guard)| IdleCandidate {
                model: slot.model.clone(),
                idle_for: guard.last_used.elapsed(),
            })
            .collect()
    }

    fn evict_one(&self) -> bool {
        let mut free = self.free_instances();
        let candidates = Self::candidates(&free);
        match self.policy.select_victim(&candidates) {
            Some(index) if index < free.len() => {
                let (slot, mut guard) = free.swap_remove(index);
                self.evict_locked(&slot, &mut guard, "capacity");
                true
            }
            _ => false,
        }
    }

    fn evict_idle(&self) -> usize {
        let free = self.free_instances();
        let candidates = Self::candidates(&free);
        let mut evicted = 0;
        for ((slot, mut guard), candidate) in free.into_iter().zip(candidates.iter()) {
            if self.policy.is_expired(candidate) {
                self.evict_locked(&slot, &mut guard, "idle");
                evicted += 1;
            }
        }
        evicted
    }

    /// Drop the slot's instance. Caller holds the slot lock.
    fn evict_locked(&self, slot: &PoolSlot, state: &mut SlotState, reason: &str) {
        if state.handle.take().is_some() {
            slot.resident.store(false, Ordering::SeqCst);
            self.resident.fetch_sub(1, Ordering::SeqCst);
            info!(model = %slot.model, reason = reason, "Evicted model instance");
            self.released.notify_waiters();
        }
    }

    /// Body of a shared lazy load
    async fn load_into(
        self: Arc<Self>,
        slot: Arc<PoolSlot>,
        artifact: ModelArtifact,
        deadline: Instant,
    ) -> Result<()> {
        if slot.is_resident() {
            return Ok(());
        }

        let reservation = self.reserve(&artifact.id, deadline).await?;
        info!(model = %artifact.id, loader = self.loader.name(), "Loading model instance");
        let started = StdInstant::now();

        match self.loader.load(&artifact).await {
            Ok(handle) => {
                let mut state = slot.state.lock().await;
                state.handle = Some(handle);
                state.last_used = StdInstant::now();
                slot.resident.store(true, Ordering::SeqCst);
                reservation.commit();
                info!(
                    model = %artifact.id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Model instance loaded"
                );
                Ok(())
            }
            Err(e) => {
                warn!(model = %artifact.id, error = %e, "Failed to load model instance");
                Err(PoolError::LoadFailed {
                    model: artifact.id.clone(),
                    cause: e.to_string(),
                })
            }
        }
    }
}

/// Pool of loaded model instances.
///
/// Holds at most one instance per model and at most `capacity` instances in
/// total. Cloning is cheap and shares the pool.
#[derive(Clone)]
pub struct InstancePool {
    inner: Arc<PoolInner>,
}

impl InstancePool {
    /// Create a pool evicting least recently used instances
    pub fn new(config: PoolConfig, loader: Arc<dyn ModelLoader>) -> Self {
        let policy = Arc::new(LruEviction::new(config.idle_timeout));
        Self::with_policy(config, loader, policy)
    }

    /// Create a pool with a custom eviction policy
    pub fn with_policy(
        config: PoolConfig,
        loader: Arc<dyn ModelLoader>,
        policy: Arc<dyn EvictionPolicy>,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                loader,
                policy,
                slots: DashMap::new(),
                loads: SingleFlight::new(),
                resident: AtomicUsize::new(0),
                released: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Name of the loader creating instances
    pub fn loader_name(&self) -> &str {
        self.inner.loader.name()
    }

    /// Obtain exclusive use of the instance for `artifact`, loading it first
    /// if needed.
    ///
    /// Concurrent checkouts of an unloaded model share one load and all see
    /// its outcome. A checkout of a busy instance waits until it is checked in.
    pub async fn checkout(&self, artifact: &ModelArtifact) -> Result<PooledHandle> {
        let model = artifact.id.clone();
        if !artifact.is_ready() {
            return Err(PoolError::LoadFailed {
                model,
                cause: format!("artifact is {:?}, not ready", artifact.status),
            });
        }

        let deadline = Instant::now() + self.inner.config.checkout_timeout;
        loop {
            let slot = self.inner.slot(&model);
            let waiting = Waiting::register(&slot);

            if !slot.is_resident() {
                let inner = Arc::clone(&self.inner);
                let load_slot = Arc::clone(&slot);
                let load_artifact = artifact.clone();
                self.inner
                    .loads
                    .run(model.clone(), move || {
                        inner.load_into(load_slot, load_artifact, deadline)
                    })
                    .await
                    .unwrap_or_else(|abandoned| {
                        Err(PoolError::LoadFailed {
                            model: model.clone(),
                            cause: abandoned.to_string(),
                        })
                    })?;
            }

            let guard = timeout_at(deadline, Arc::clone(&slot.state).lock_owned())
                .await
                .map_err(|_| self.inner.exhausted(&model))?;
            drop(waiting);

            if guard.handle.is_none() {
                // Evicted between the load and the lock
                drop(guard);
                if Instant::now() >= deadline {
                    return Err(self.inner.exhausted(&model));
                }
                continue;
            }

            debug!(model = %model, "Checked out model instance");
            return Ok(PooledHandle {
                model,
                slot,
                guard: Some(guard),
                pool: Arc::clone(&self.inner),
                unusable: false,
            });
        }
    }

    /// Drop free instances the eviction policy considers expired
    pub fn evict_idle(&self) -> usize {
        self.inner.evict_idle()
    }

    /// Periodically drop expired instances until the pool is dropped
    pub fn spawn_reaper(&self, interval: Duration) -> JoinHandle<()> {
        let pool: Weak<PoolInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(pool) = pool.upgrade() else {
                    break;
                };
                let evicted = pool.evict_idle();
                if evicted > 0 {
                    debug!(evicted = evicted, "Reaped idle model instances");
                }
            }
        })
    }

    pub fn stats(&self) -> PoolStats {
        let mut resident = 0;
        let mut busy = 0;
        for entry in self.inner.slots.iter() {
            let slot = entry.value();
            if slot.is_resident() {
                resident += 1;
                if slot.state.try_lock().is_err() {
                    busy += 1;
                }
            }
        }
        PoolStats {
            capacity: self.inner.config.capacity,
            resident,
            busy,
            loading: self.inner.loads.in_flight_count(),
        }
    }

    /// Whether `model` has a loaded instance, and whether it is checked out
    pub fn status(&self, model: &ModelId) -> Option<SlotStatus> {
        let slot = self.inner.slots.get(model)?;
        if !slot.is_resident() {
            return None;
        }
        let status = match slot.state.try_lock() {
            Ok(state) if state.handle.is_some() => Some(SlotStatus::Free),
            Ok(_) => None,
            Err(_) => Some(SlotStatus::Busy),
        };
        status
    }

    pub fn is_loading(&self, model: &ModelId) -> bool {
        self.inner.loads.is_in_flight(model)
    }
}

/// Exclusive use of one loaded instance.
///
/// Dropping the handle checks the instance back in, so it is returned even
/// when the holder fails or is cancelled.
pub struct PooledHandle {
    model: ModelId,
    slot: Arc<PoolSlot>,
    guard: Option<OwnedMutexGuard<SlotState>>,
    pool: Arc<PoolInner>,
    unusable: bool,
}

impl PooledHandle {
    pub fn model(&self) -> &ModelId {
        &self.model
    }

    /// Run one generation on the instance. A corrupting failure marks the
    /// instance unusable.
    pub async fn generate(
        &mut self,
        turns: &[ChatMessage],
    ) -> std::result::Result<String, InferenceError> {
        let handle = self
            .guard
            .as_mut()
            .and_then(|state| state.handle.as_mut())
            .ok_or_else(|| InferenceError::corrupted("instance is no longer loaded"))?;

        let result = handle.generate(turns).await;
        if matches!(&result, Err(e) if e.corrupted) {
            self.unusable = true;
        }
        result
    }

    /// Drop the instance at checkin instead of returning it to the pool
    pub fn mark_unusable(&mut self) {
        self.unusable = true;
    }

    pub fn is_unusable(&self) -> bool {
        self.unusable
    }

    /// Return the instance to the pool
    pub fn checkin(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(mut state) = self.guard.take() else {
            return;
        };
        if self.unusable {
            self.pool.evict_locked(&self.slot, &mut state, "unusable");
        } else {
            state.last_used = StdInstant::now();
        }
        drop(state);
        self.pool.released.notify_waiters();
        debug!(model = %self.model, "Checked in model instance");
    }
}

impl Drop for PooledHandle {
    fn drop(&mut self) {
        // A panic may have left the instance half-mutated
        if std::thread::panicking() {
            self.unusable = true;
        }
        self.release();
    }
}

impl std::fmt::Debug for PooledHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledHandle")
            .field("model", &self.model)
            .field("unusable", &self.unusable)
            .finish()
    }
}

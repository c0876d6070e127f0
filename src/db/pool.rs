//! Fixed-size blocking connection pool.
//!
//! Every connection lives in its own `Arc<Mutex<_>>` slot. A slot is either
//! queued in `idle` or owned by exactly one [`PooledConnection`], which holds
//! the slot lock for the whole lease. Liveness probes and reconnects always
//! run with the pool lock released.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Condvar, Mutex, RawMutex};
use tracing::{debug, error, info, warn};

use crate::db::error::DbError;

/// A persistent backend connection the pool can probe and repair in place.
pub trait ManagedConnection: Send + Sized + 'static {
    type Config: Send + Sync;

    fn connect(config: &Self::Config) -> Result<Self, DbError>;

    /// Cheap liveness check. `false` means the connection must be
    /// reconnected before use.
    fn ping(&mut self) -> bool;

    fn reconnect(&mut self) -> Result<(), DbError>;
}

type Slot<C> = Arc<Mutex<C>>;

struct PoolState<C> {
    initialized: bool,
    capacity: usize,
    idle: VecDeque<Slot<C>>,
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub capacity: usize,
    pub idle: usize,
    pub in_use: usize,
}

/// Outcome of one repair pass over the idle connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub checked: usize,
    pub reconnected: usize,
    pub failed: usize,
}

pub struct ConnectionPool<C: ManagedConnection> {
    state: Mutex<PoolState<C>>,
    available: Condvar,
}

impl<C: ManagedConnection> Default for ConnectionPool<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ManagedConnection> ConnectionPool<C> {
    /// Creates an empty pool. Nothing can be acquired until
    /// [`initialize`](Self::initialize) succeeds.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PoolState {
                initialized: false,
                capacity: 0,
                idle: VecDeque::new(),
            }),
            available: Condvar::new(),
        }
    }

    /// Eagerly opens `size` connections. Only the first successful call has
    /// any effect; later calls return `Ok(())` without touching the pool.
    ///
    /// If any connection fails to open, the ones already opened are dropped
    /// and the pool stays uninitialized.
    pub fn initialize(&self, config: &C::Config, size: usize) -> Result<(), DbError> {
        let mut state = self.state.lock();
        if state.initialized {
            debug!(requested = size, capacity = state.capacity, "Pool already initialized");
            return Ok(());
        }

        let mut idle = VecDeque::with_capacity(size);
        for _ in 0..size {
            idle.push_back(Arc::new(Mutex::new(C::connect(config)?)));
        }

        state.idle = idle;
        state.capacity = size;
        state.initialized = true;
        drop(state);

        self.available.notify_all();
        info!(size, "Database connection pool initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.state.lock();
        PoolStatus {
            capacity: state.capacity,
            idle: state.idle.len(),
            in_use: state.capacity - state.idle.len(),
        }
    }

    /// Leases a connection, blocking for as long as every connection is in
    /// use.
    ///
    /// A connection that fails its liveness probe is reconnected before it
    /// is handed out. If that reconnect fails the connection goes back to
    /// the pool and the error is returned.
    pub fn acquire(&self) -> Result<PooledConnection<'_, C>, DbError> {
        self.checkout(None)
    }

    /// Like [`acquire`](Self::acquire), but gives up with
    /// [`DbError::Timeout`] after `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection<'_, C>, DbError> {
        self.checkout(Some((Instant::now() + timeout, timeout)))
    }

    fn checkout(
        &self,
        deadline: Option<(Instant, Duration)>,
    ) -> Result<PooledConnection<'_, C>, DbError> {
        let slot = {
            let mut state = self.state.lock();
            if !state.initialized {
                return Err(DbError::NotInitialized);
            }

            loop {
                if let Some(slot) = state.idle.pop_front() {
                    break slot;
                }

                debug!("Waiting for available connection");
                match deadline {
                    None => self.available.wait(&mut state),
                    Some((at, timeout)) => {
                        if self.available.wait_until(&mut state, at).timed_out()
                            && state.idle.is_empty()
                        {
                            return Err(DbError::Timeout(timeout));
                        }
                    }
                }
            }
        };

        // May briefly wait for a repair pass that is probing this slot.
        let conn = slot.lock_arc();
        let mut lease = PooledConnection {
            pool: self,
            slot,
            conn: Some(conn),
        };

        if !lease.ping() {
            warn!("Connection lost, attempting to reconnect");
            if let Err(e) = lease.reconnect() {
                error!(error = %e, "Failed to get connection");
                return Err(e);
            }
        }

        Ok(lease)
    }

    fn release(&self, slot: Slot<C>) {
        let mut state = self.state.lock();
        state.idle.push_back(slot);
        drop(state);
        self.available.notify_one();
    }

    /// Probes every idle connection once and reconnects the dead ones.
    ///
    /// Connections leased out at the time they come up are skipped. A failed
    /// reconnect is logged and does not stop the pass.
    pub fn repair_idle(&self) -> RepairReport {
        let snapshot: Vec<Slot<C>> = self.state.lock().idle.iter().cloned().collect();
        let mut report = RepairReport::default();

        for slot in snapshot {
            let Some(mut conn) = slot.try_lock() else {
                continue;
            };
            // Holding the slot lock, so a lease taken after this check waits
            // for us instead of racing.
            if !self.is_idle(&slot) {
                continue;
            }

            report.checked += 1;
            if conn.ping() {
                continue;
            }

            match conn.reconnect() {
                Ok(()) => report.reconnected += 1,
                Err(e) => {
                    error!(error = %e, "Failed to reconnect");
                    report.failed += 1;
                }
            }
        }

        report
    }

    fn is_idle(&self, slot: &Slot<C>) -> bool {
        self.state
            .lock()
            .idle
            .iter()
            .any(|s| Arc::ptr_eq(s, slot))
    }

    /// Starts the background repair thread.
    ///
    /// Each cycle runs [`repair_idle`](Self::repair_idle) and then sleeps
    /// `interval`. While the pool is uninitialized or fully leased out, or
    /// after a cycle panicked, it sleeps only `retry_delay` before trying
    /// again. Connections that die while leased are caught by their next
    /// `acquire`.
    pub fn spawn_repair(
        self: &Arc<Self>,
        interval: Duration,
        retry_delay: Duration,
    ) -> Result<RepairTask, DbError> {
        let pool = Arc::clone(self);
        let signal = Arc::new(StopSignal::default());
        let stop = Arc::clone(&signal);

        let handle = thread::Builder::new()
            .name("db-pool-repair".to_string())
            .spawn(move || {
                loop {
                    let delay = if pool.status().idle == 0 {
                        retry_delay
                    } else {
                        match panic::catch_unwind(AssertUnwindSafe(|| pool.repair_idle())) {
                            Ok(report) => {
                                debug!(
                                    checked = report.checked,
                                    reconnected = report.reconnected,
                                    failed = report.failed,
                                    "Pool repair cycle finished"
                                );
                                interval
                            }
                            Err(_) => {
                                error!("Error in pool repair cycle");
                                retry_delay
                            }
                        }
                    };

                    if stop.wait(delay) {
                        break;
                    }
                }
                debug!("Pool repair thread stopped");
            })?;

        Ok(RepairTask {
            signal,
            handle: Some(handle),
        })
    }
}

impl<C: ManagedConnection> Drop for ConnectionPool<C> {
    fn drop(&mut self) {
        if self.state.get_mut().initialized {
            info!("Database connection pool destroyed");
        }
    }
}

/// A leased connection. Dropping it returns the connection to the pool and
/// wakes one waiting `acquire`.
pub struct PooledConnection<'a, C: ManagedConnection> {
    pool: &'a ConnectionPool<C>,
    slot: Slot<C>,
    conn: Option<ArcMutexGuard<RawMutex, C>>,
}

impl<C: ManagedConnection> Deref for PooledConnection<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.conn.as_deref().expect("connection is held until drop")
    }
}

impl<C: ManagedConnection> DerefMut for PooledConnection<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_deref_mut().expect("connection is held until drop")
    }
}

impl<C: ManagedConnection> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        // Unlock before the slot becomes visible to other acquirers.
        self.conn.take();
        self.pool.release(Arc::clone(&self.slot));
    }
}

#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    /// Sleeps up to `timeout`; returns whether a stop was requested.
    fn wait(&self, timeout: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            self.wake.wait_for(&mut stopped, timeout);
        }
        *stopped
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }
}

/// Handle to the background repair thread. Stops and joins it on drop.
pub struct RepairTask {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl RepairTask {
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.signal.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Pool repair thread panicked");
            }
        }
    }
}

impl Drop for RepairTask {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

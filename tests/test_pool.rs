//! Tests for the blocking connection pool

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use pylon::db::{ConnectionPool, DbError, ManagedConnection, PoolStatus, RepairReport};

/// Shared view of one mock connection, so tests can kill it from outside.
#[derive(Default)]
struct Probe {
    alive: AtomicBool,
    reconnect_fails: AtomicBool,
    pings: AtomicUsize,
    reconnects: AtomicUsize,
}

impl Probe {
    fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MockConfig {
    refuse: AtomicBool,
    probes: Mutex<Vec<Arc<Probe>>>,
}

impl MockConfig {
    fn probe(&self, id: usize) -> Arc<Probe> {
        self.probes.lock().unwrap()[id].clone()
    }

    fn count(&self) -> usize {
        self.probes.lock().unwrap().len()
    }
}

struct MockConn {
    id: usize,
    probe: Arc<Probe>,
}

impl ManagedConnection for MockConn {
    type Config = MockConfig;

    fn connect(config: &MockConfig) -> Result<Self, DbError> {
        if config.refuse.load(Ordering::SeqCst) {
            return Err(DbError::Connect {
                addr: "mock:0".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            });
        }
        let probe = Arc::new(Probe::default());
        probe.alive.store(true, Ordering::SeqCst);
        let mut probes = config.probes.lock().unwrap();
        probes.push(probe.clone());
        Ok(MockConn {
            id: probes.len() - 1,
            probe,
        })
    }

    fn ping(&mut self) -> bool {
        self.probe.pings.fetch_add(1, Ordering::SeqCst);
        self.probe.alive.load(Ordering::SeqCst)
    }

    fn reconnect(&mut self) -> Result<(), DbError> {
        self.probe.reconnects.fetch_add(1, Ordering::SeqCst);
        if self.probe.reconnect_fails.load(Ordering::SeqCst) {
            return Err(DbError::Io(std::io::Error::from(
                std::io::ErrorKind::ConnectionRefused,
            )));
        }
        self.probe.alive.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn pool_of(size: usize) -> (Arc<ConnectionPool<MockConn>>, MockConfig) {
    let config = MockConfig::default();
    let pool = Arc::new(ConnectionPool::new());
    pool.initialize(&config, size).unwrap();
    (pool, config)
}

#[test]
fn test_acquire_before_initialize_fails_immediately() {
    let pool: ConnectionPool<MockConn> = ConnectionPool::new();

    let started = Instant::now();
    let result = pool.acquire();
    assert!(matches!(result, Err(DbError::NotInitialized)));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!pool.is_initialized());
}

#[test]
fn test_initialize_opens_all_connections_eagerly() {
    let (pool, config) = pool_of(3);

    assert!(pool.is_initialized());
    assert_eq!(config.count(), 3);
    assert_eq!(
        pool.status(),
        PoolStatus {
            capacity: 3,
            idle: 3,
            in_use: 0
        }
    );
}

#[test]
fn test_second_initialize_is_ignored() {
    let (pool, config) = pool_of(2);

    pool.initialize(&config, 5).unwrap();

    assert_eq!(pool.status().capacity, 2);
    assert_eq!(config.count(), 2);
}

#[test]
fn test_failed_initialize_leaves_pool_uninitialized() {
    let config = MockConfig::default();
    config.refuse.store(true, Ordering::SeqCst);
    let pool: ConnectionPool<MockConn> = ConnectionPool::new();

    assert!(matches!(pool.initialize(&config, 2), Err(DbError::Connect { .. })));
    assert!(!pool.is_initialized());
    assert!(matches!(pool.acquire(), Err(DbError::NotInitialized)));

    config.refuse.store(false, Ordering::SeqCst);
    pool.initialize(&config, 2).unwrap();
    assert_eq!(pool.status().capacity, 2);
}

#[test]
fn test_lease_returns_on_drop() {
    let (pool, _config) = pool_of(2);

    {
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert_eq!(pool.status().in_use, 2);
        assert_eq!(pool.status().idle, 0);
    }

    assert_eq!(pool.status().in_use, 0);
    assert_eq!(pool.status().idle, 2);
}

#[test]
fn test_lease_returns_when_holder_panics() {
    let (pool, _config) = pool_of(1);

    let worker = {
        let pool = pool.clone();
        thread::spawn(move || {
            let _conn = pool.acquire().unwrap();
            panic!("handler blew up");
        })
    };
    assert!(worker.join().is_err());

    assert_eq!(pool.status().idle, 1);
    assert!(pool.acquire().is_ok());
}

#[test]
fn test_acquire_blocks_until_release() {
    let (pool, _config) = pool_of(2);
    let first = pool.acquire().unwrap();
    let _second = pool.acquire().unwrap();

    let (tx, rx) = mpsc::channel();
    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || {
            let conn = pool.acquire().unwrap();
            tx.send(conn.id).unwrap();
        })
    };

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    let released = first.id;
    drop(first);
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), released);
    waiter.join().unwrap();
}

#[test]
fn test_acquire_timeout_expires_when_exhausted() {
    let (pool, _config) = pool_of(1);
    let _held = pool.acquire().unwrap();

    let started = Instant::now();
    let result = pool.acquire_timeout(Duration::from_millis(50));

    assert!(matches!(result, Err(DbError::Timeout(_))));
    assert!(started.elapsed() >= Duration::from_millis(40));
}

#[test]
fn test_acquire_timeout_succeeds_when_released_in_time() {
    let (pool, _config) = pool_of(1);
    let (tx, rx) = mpsc::channel();

    let holder = {
        let pool = pool.clone();
        thread::spawn(move || {
            let _held = pool.acquire().unwrap();
            tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(50));
        })
    };
    rx.recv().unwrap();

    assert!(pool.acquire_timeout(Duration::from_secs(5)).is_ok());
    holder.join().unwrap();
}

#[test]
fn test_concurrent_callers_never_share_a_connection() {
    const CAPACITY: usize = 3;
    const CALLERS: usize = 12;
    let (pool, _config) = pool_of(CAPACITY);

    let in_use = Arc::new(Mutex::new(HashSet::new()));
    let peak = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..CALLERS)
        .map(|_| {
            let pool = pool.clone();
            let in_use = in_use.clone();
            let peak = peak.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    let conn = pool.acquire().unwrap();
                    {
                        let mut set = in_use.lock().unwrap();
                        assert!(set.insert(conn.id), "connection {} leased twice", conn.id);
                        peak.fetch_max(set.len(), Ordering::SeqCst);
                    }
                    thread::sleep(Duration::from_millis(2));
                    in_use.lock().unwrap().remove(&conn.id);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= CAPACITY);
    assert_eq!(pool.status().idle, CAPACITY);
}

#[test]
fn test_dead_connection_reconnected_on_acquire() {
    let (pool, config) = pool_of(1);
    config.probe(0).kill();

    let conn = pool.acquire().unwrap();

    assert_eq!(conn.id, 0);
    assert_eq!(config.probe(0).reconnects.load(Ordering::SeqCst), 1);
    assert!(config.probe(0).alive.load(Ordering::SeqCst));
}

#[test]
fn test_live_connection_not_reconnected() {
    let (pool, config) = pool_of(1);

    drop(pool.acquire().unwrap());

    assert_eq!(config.probe(0).pings.load(Ordering::SeqCst), 1);
    assert_eq!(config.probe(0).reconnects.load(Ordering::SeqCst), 0);
}

#[test]
fn test_failed_reconnect_on_acquire_returns_connection() {
    let (pool, config) = pool_of(1);
    config.probe(0).kill();
    config.probe(0).reconnect_fails.store(true, Ordering::SeqCst);

    assert!(matches!(pool.acquire(), Err(DbError::Io(_))));
    assert_eq!(pool.status().idle, 1);

    config.probe(0).reconnect_fails.store(false, Ordering::SeqCst);
    assert!(pool.acquire().is_ok());
}

#[test]
fn test_repair_skips_leased_connections() {
    let (pool, config) = pool_of(2);
    let leased = pool.acquire().unwrap();
    let leased_id = leased.id;
    let idle_id = 1 - leased_id;

    config.probe(0).kill();
    config.probe(1).kill();
    let leased_pings = config.probe(leased_id).pings.load(Ordering::SeqCst);

    let report = pool.repair_idle();

    assert_eq!(
        report,
        RepairReport {
            checked: 1,
            reconnected: 1,
            failed: 0
        }
    );
    assert!(config.probe(idle_id).alive.load(Ordering::SeqCst));
    assert!(!config.probe(leased_id).alive.load(Ordering::SeqCst));
    assert_eq!(config.probe(leased_id).pings.load(Ordering::SeqCst), leased_pings);
    assert_eq!(config.probe(leased_id).reconnects.load(Ordering::SeqCst), 0);
    drop(leased);
}

#[test]
fn test_repair_continues_past_failed_reconnect() {
    let (pool, config) = pool_of(3);
    for id in 0..3 {
        config.probe(id).kill();
    }
    config.probe(0).reconnect_fails.store(true, Ordering::SeqCst);

    let report = pool.repair_idle();

    assert_eq!(report.checked, 3);
    assert_eq!(report.reconnected, 2);
    assert_eq!(report.failed, 1);
    assert!(config.probe(1).alive.load(Ordering::SeqCst));
    assert!(config.probe(2).alive.load(Ordering::SeqCst));
    assert_eq!(pool.status().idle, 3);
}

#[test]
fn test_repair_on_uninitialized_pool_is_noop() {
    let pool: ConnectionPool<MockConn> = ConnectionPool::new();
    assert_eq!(pool.repair_idle(), RepairReport::default());
}

#[test]
fn test_background_repair_revives_idle_connection() {
    let (pool, config) = pool_of(2);
    config.probe(1).kill();

    let task = pool
        .spawn_repair(Duration::from_millis(10), Duration::from_millis(10))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !config.probe(1).alive.load(Ordering::SeqCst) {
        assert!(Instant::now() < deadline, "repair thread never reconnected");
        thread::sleep(Duration::from_millis(5));
    }
    task.shutdown();

    assert_eq!(config.probe(1).reconnects.load(Ordering::SeqCst), 1);
    assert_eq!(config.probe(0).reconnects.load(Ordering::SeqCst), 0);
}

#[test]
fn test_background_repair_waits_while_fully_leased() {
    let (pool, config) = pool_of(1);
    let held = pool.acquire().unwrap();
    config.probe(0).kill();
    let pings = config.probe(0).pings.load(Ordering::SeqCst);

    let task = pool
        .spawn_repair(Duration::from_millis(5), Duration::from_millis(5))
        .unwrap();
    thread::sleep(Duration::from_millis(50));
    drop(task);

    assert_eq!(config.probe(0).pings.load(Ordering::SeqCst), pings);
    assert_eq!(config.probe(0).reconnects.load(Ordering::SeqCst), 0);
    drop(held);

    // Caught lazily on the next lease instead.
    drop(pool.acquire().unwrap());
    assert_eq!(config.probe(0).reconnects.load(Ordering::SeqCst), 1);
}

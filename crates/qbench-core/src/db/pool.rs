use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};

use crate::error::BenchError;
use crate::telemetry::{self, tags};
use crate::types::Result;

/// How long `acquire` waits for a returned connection before re-checking
/// whether it may open a new one.
const ACQUIRE_POLL: Duration = Duration::from_millis(50);

/// A connection the pool can tell is no longer usable.
pub trait ManagedConnection: Send + 'static {
    fn is_closed(&self) -> bool;
}

#[cfg(feature = "postgres")]
impl ManagedConnection for postgres::Client {
    fn is_closed(&self) -> bool {
        postgres::Client::is_closed(self)
    }
}

/// Sizing limits for a [`ConnectionPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Connections open at once, checked out or idle.
    pub max_open: usize,
    /// Idle connections kept for reuse.
    pub max_idle: usize,
    /// Connections older than this are closed instead of reused.
    pub max_lifetime: Duration,
}

impl PoolConfig {
    /// Twice as many open connections as workers, one idle per worker,
    /// recycled after a minute.
    pub fn for_workers(workers: usize) -> Self {
        Self {
            max_open: workers.saturating_mul(2).max(1),
            max_idle: workers,
            max_lifetime: Duration::from_secs(60),
        }
    }
}

type Connect<C> = Box<dyn Fn() -> Result<C> + Send + Sync>;

struct Idle<C> {
    connection: C,
    opened_at: Instant,
}

struct PoolShared<C> {
    recycler: Sender<Idle<C>>,
    receiver: Receiver<Idle<C>>,
    connect: Connect<C>,
    config: PoolConfig,
    open: AtomicUsize,
    metrics: PoolMetricsInner,
}

impl<C: ManagedConnection> PoolShared<C> {
    fn is_reusable(&self, idle: &Idle<C>) -> bool {
        !idle.connection.is_closed() && idle.opened_at.elapsed() < self.config.max_lifetime
    }

    fn discard(&self, idle: Idle<C>) {
        drop(idle);
        self.open.fetch_sub(1, Ordering::AcqRel);
        self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
        telemetry::increment_counter(tags::METRIC_DB_CONNECTION_DISCARD_COUNT, 1);
    }
}

/// Blocking pool of reusable connections shared by all lane workers.
///
/// Idle connections are recycled through a bounded channel. A connection is
/// opened only when none is idle and fewer than `max_open` exist; otherwise
/// `acquire` waits for one to be returned.
pub struct ConnectionPool<C> {
    shared: Arc<PoolShared<C>>,
}

impl<C: ManagedConnection> ConnectionPool<C> {
    pub fn new<F>(config: PoolConfig, connect: F) -> Self
    where
        F: Fn() -> Result<C> + Send + Sync + 'static,
    {
        let (recycler, receiver) = bounded(config.max_idle);
        Self {
            shared: Arc::new(PoolShared {
                recycler,
                receiver,
                connect: Box::new(connect),
                config,
                open: AtomicUsize::new(0),
                metrics: PoolMetricsInner::default(),
            }),
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.shared.config
    }

    /// Connections currently open, checked out or idle.
    pub fn open_count(&self) -> usize {
        self.shared.open.load(Ordering::Acquire)
    }

    /// Checks out a connection, reusing an idle one when possible.
    ///
    /// Blocks while `max_open` connections are all checked out.
    pub fn acquire(&self) -> Result<PooledConnection<C>> {
        let shared = &self.shared;
        loop {
            while let Ok(idle) = shared.receiver.try_recv() {
                if let Some(connection) = self.checkout(idle) {
                    return Ok(connection);
                }
            }

            let open = shared.open.load(Ordering::Acquire);
            if open < shared.config.max_open {
                if shared
                    .open
                    .compare_exchange(open, open + 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    return self.open_new();
                }
                continue;
            }

            match shared.receiver.recv_timeout(ACQUIRE_POLL) {
                Ok(idle) => {
                    if let Some(connection) = self.checkout(idle) {
                        return Ok(connection);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(BenchError::Config("connection pool is closed".to_string()));
                }
            }
        }
    }

    fn checkout(&self, idle: Idle<C>) -> Option<PooledConnection<C>> {
        if !self.shared.is_reusable(&idle) {
            self.shared.discard(idle);
            return None;
        }
        self.shared.metrics.reused.fetch_add(1, Ordering::Relaxed);
        telemetry::increment_counter(tags::METRIC_DB_CONNECTION_REUSE_COUNT, 1);
        Some(PooledConnection {
            idle: Some(idle),
            shared: Arc::clone(&self.shared),
        })
    }

    // Caller has already reserved the slot in `open`.
    fn open_new(&self) -> Result<PooledConnection<C>> {
        match (self.shared.connect)() {
            Ok(connection) => {
                self.shared.metrics.opened.fetch_add(1, Ordering::Relaxed);
                telemetry::increment_counter(tags::METRIC_DB_CONNECTION_OPEN_COUNT, 1);
                tracing::debug!(open = self.open_count(), "database connection opened");
                Ok(PooledConnection {
                    idle: Some(Idle {
                        connection,
                        opened_at: Instant::now(),
                    }),
                    shared: Arc::clone(&self.shared),
                })
            }
            Err(error) => {
                self.shared.open.fetch_sub(1, Ordering::AcqRel);
                Err(error)
            }
        }
    }

    pub fn metrics(&self) -> PoolMetricsSnapshot {
        let metrics = &self.shared.metrics;
        PoolMetricsSnapshot {
            opened: metrics.opened.load(Ordering::Relaxed),
            reused: metrics.reused.load(Ordering::Relaxed),
            discarded: metrics.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Connection pool counters at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolMetricsSnapshot {
    pub opened: usize,
    pub reused: usize,
    /// Closed, expired, or surplus connections that were dropped.
    pub discarded: usize,
}

#[derive(Debug, Default)]
struct PoolMetricsInner {
    opened: AtomicUsize,
    reused: AtomicUsize,
    discarded: AtomicUsize,
}

/// A connection checked out of a [`ConnectionPool`].
///
/// Dropping it returns the connection to the pool, unless it is closed,
/// past its lifetime, or the idle set is already full.
pub struct PooledConnection<C: ManagedConnection> {
    idle: Option<Idle<C>>,
    shared: Arc<PoolShared<C>>,
}

impl<C: ManagedConnection> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        match &self.idle {
            Some(idle) => &idle.connection,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: ManagedConnection> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.idle {
            Some(idle) => &mut idle.connection,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: ManagedConnection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let Some(idle) = self.idle.take() else {
            return;
        };
        if !self.shared.is_reusable(&idle) {
            self.shared.discard(idle);
            return;
        }
        if let Err(TrySendError::Full(idle)) | Err(TrySendError::Disconnected(idle)) =
            self.shared.recycler.try_send(idle)
        {
            self.shared.discard(idle);
        }
    }
}

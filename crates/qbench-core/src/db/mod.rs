//! Database side of the benchmark: a blocking connection pool and the
//! TimescaleDB query executor built on it.

mod pool;
#[cfg(feature = "postgres")]
mod timescale;

pub use pool::{ConnectionPool, ManagedConnection, PoolConfig, PoolMetricsSnapshot, PooledConnection};
#[cfg(feature = "postgres")]
pub use timescale::{CONNECT_TIMEOUT, CPU_USAGE_QUERY, PostgresExecutor, QUERY_TIMEOUT};

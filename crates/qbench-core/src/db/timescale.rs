use std::time::Duration;

use chrono::{DateTime, Utc};
use postgres::{Client, Config, NoTls};

use crate::db::pool::{ConnectionPool, PoolConfig, PooledConnection};
use crate::error::BenchError;
use crate::executor::QueryExecutor;
use crate::types::{Result, WorkItem};

/// Per-minute max/min CPU usage of one host over a time range.
pub const CPU_USAGE_QUERY: &str = "SELECT time_bucket('1 minute', ts) AS bucket, \
     MAX(usage) AS max_usage, MIN(usage) AS min_usage \
     FROM cpu_usage \
     WHERE host = $1 AND ts >= $2 AND ts <= $3 \
     GROUP BY bucket \
     ORDER BY bucket";

/// Deadline for opening a connection and for the startup ping.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
/// Server-side deadline for one benchmark query.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

/// Runs [`CPU_USAGE_QUERY`] against a TimescaleDB instance.
pub struct PostgresExecutor {
    pool: ConnectionPool<Client>,
}

impl PostgresExecutor {
    /// Validates `url`, opens a pool sized for `workers` and checks that the
    /// database answers.
    pub fn connect(url: &str, workers: usize) -> Result<Self> {
        let mut config: Config = url
            .parse()
            .map_err(|error| BenchError::Config(format!("invalid database URL: {error}")))?;
        config.connect_timeout(CONNECT_TIMEOUT);
        config.options(&format!(
            "-c statement_timeout={}",
            QUERY_TIMEOUT.as_millis()
        ));

        let pool = ConnectionPool::new(PoolConfig::for_workers(workers), move || {
            config.connect(NoTls).map_err(BenchError::from)
        });
        let executor = Self { pool };
        executor
            .ping()
            .map_err(|error| error.with_context("failed to connect to database"))?;

        tracing::info!(
            max_open = executor.pool.config().max_open,
            max_idle = executor.pool.config().max_idle,
            "connected to database"
        );
        Ok(executor)
    }

    fn ping(&self) -> Result<()> {
        let mut client = self.pool.acquire()?;
        client.is_valid(CONNECT_TIMEOUT)?;
        Ok(())
    }

    pub fn pool(&self) -> &ConnectionPool<Client> {
        &self.pool
    }
}

impl QueryExecutor for PostgresExecutor {
    fn execute(&self, item: &WorkItem) -> Result<()> {
        let mut client: PooledConnection<Client> = self.pool.acquire()?;
        let rows = client.query(
            CPU_USAGE_QUERY,
            &[&item.hostname, &item.start_time, &item.end_time],
        )?;

        // Decode every row so the measurement includes result transfer.
        for row in &rows {
            let _bucket: DateTime<Utc> = row.try_get(0)?;
            let _max_usage: f64 = row.try_get(1)?;
            let _min_usage: f64 = row.try_get(2)?;
        }
        Ok(())
    }
}

use crate::types::{Result, WorkItem};

/// Runs the benchmarked query for one work item.
///
/// Implementations are shared by every worker and must enforce their own
/// deadline; the pool only measures how long each call takes.
pub trait QueryExecutor: Send + Sync {
    fn execute(&self, item: &WorkItem) -> Result<()>;
}

impl<F> QueryExecutor for F
where
    F: Fn(&WorkItem) -> Result<()> + Send + Sync,
{
    fn execute(&self, item: &WorkItem) -> Result<()> {
        self(item)
    }
}

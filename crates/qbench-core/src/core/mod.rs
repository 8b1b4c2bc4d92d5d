pub mod lanes;
pub mod router;
pub mod worker_pool;

pub use lanes::{LANE_CAPACITY, Lanes};
pub use router::{fnv1a_32, route};
pub use worker_pool::{LanePool, LanePoolHandle, PoolRuntimeSnapshot, WorkerRuntimeSnapshot};

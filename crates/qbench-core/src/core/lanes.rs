use crossbeam_channel::{Receiver, Sender, bounded, select};

use crate::cancel::CancelToken;
use crate::core::router::route;
use crate::error::BenchError;
use crate::types::{Result, WorkItem};

/// Default per-lane queue capacity, independent of the worker count.
pub const LANE_CAPACITY: usize = 10;

/// Producer side of the per-worker lane queues.
///
/// Each lane is a bounded FIFO channel with exactly one consumer: the worker
/// spawned with the matching receiver. Dropping `Lanes` closes every lane,
/// which lets workers drain what is queued and exit.
#[derive(Debug)]
pub struct Lanes {
    senders: Vec<Sender<WorkItem>>,
}

impl Lanes {
    /// Creates `count` bounded lanes, returning the producer handle and one
    /// receiver per lane (index `i` belongs to lane `i`).
    pub fn bounded(count: usize, capacity: usize) -> (Self, Vec<Receiver<WorkItem>>) {
        let mut senders = Vec::with_capacity(count);
        let mut receivers = Vec::with_capacity(count);
        for _ in 0..count {
            let (tx, rx) = bounded(capacity);
            senders.push(tx);
            receivers.push(rx);
        }
        (Self { senders }, receivers)
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Items currently queued on `lane`.
    pub fn depth(&self, lane: usize) -> usize {
        self.senders.get(lane).map_or(0, Sender::len)
    }

    /// Lane that `item` is routed to.
    pub fn lane_for(&self, item: &WorkItem) -> usize {
        route(item.partition_key(), self.senders.len())
    }

    /// Enqueues `item` on `lane`, blocking while the lane is full.
    ///
    /// Returns [`BenchError::Cancelled`] as soon as `cancel` fires, and
    /// [`BenchError::LaneClosed`] if the lane's worker has gone away.
    pub fn send(&self, lane: usize, item: WorkItem, cancel: &CancelToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(BenchError::Cancelled);
        }
        let sender = self
            .senders
            .get(lane)
            .ok_or(BenchError::LaneClosed(lane))?;

        select! {
            recv(cancel.watch()) -> _ => Err(BenchError::Cancelled),
            send(sender, item) -> sent => sent.map_err(|_| BenchError::LaneClosed(lane)),
        }
    }

    /// Routes `item` by its partition key and enqueues it, returning the lane.
    pub fn dispatch(&self, item: WorkItem, cancel: &CancelToken) -> Result<usize> {
        let lane = self.lane_for(&item);
        self.send(lane, item, cancel)?;
        Ok(lane)
    }
}

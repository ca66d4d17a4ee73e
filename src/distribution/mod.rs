use std::any::Any;
use std::ops::Range;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;

use crate::error::DistributionError;

/// Rank that generates the model and aggregates the results.
pub const ROOT: usize = 0;

/// Scatter/gather contract between the coordinating rank and the workers.
///
/// Every rank must enter the same collectives in the same order.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    /// The root passes `Some(value)`; every rank gets the root's value back.
    fn broadcast<T: Clone + Send + 'static>(&self, value: Option<T>) -> Result<T, DistributionError>;

    /// Collects one value per rank on the root, ordered by rank. Other ranks get `None`.
    fn gather<T: Send + 'static>(&self, value: T) -> Result<Option<Vec<T>>, DistributionError>;
}

/// Contiguous slice of `0..total` owned by `rank`. The last rank takes the remainder.
pub fn partition(total: usize, rank: usize, size: usize) -> Range<usize> {
    let size = size.max(1);
    let per_rank = total / size;
    let start = rank * per_rank;
    let end = if rank + 1 == size { total } else { start + per_rank };
    start..end
}

/// The whole run in one rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        ROOT
    }

    fn size(&self) -> usize {
        1
    }

    fn broadcast<T: Clone + Send + 'static>(&self, value: Option<T>) -> Result<T, DistributionError> {
        value.ok_or(DistributionError::NothingToBroadcast)
    }

    fn gather<T: Send + 'static>(&self, value: T) -> Result<Option<Vec<T>>, DistributionError> {
        Ok(Some(vec![value]))
    }
}

struct Envelope {
    from: usize,
    payload: Box<dyn Any + Send>,
}

/// A group of ranks living on the threads of one pool, talking over bounded channels.
pub struct ThreadGroup {
    rank: usize,
    size: usize,
    inbox: Receiver<Envelope>,
    outboxes: Vec<SyncSender<Envelope>>,
}

impl ThreadGroup {
    /// Runs `job` once per rank, each on its own thread, and returns every
    /// rank's output ordered by rank.
    pub fn run<F, R>(size: usize, job: F) -> Result<Vec<R>, DistributionError>
    where
        F: Fn(&ThreadGroup) -> R + Send + Sync + 'static,
        R: Send + 'static,
    {
        if size == 0 {
            return Err(DistributionError::EmptyGroup);
        }

        let (outboxes, inboxes): (Vec<_>, Vec<_>) = (0..size).map(|_| sync_channel(size)).unzip();
        let (result_sender, result_reciever) = sync_channel(size);
        let pool = threadpool::Builder::new()
            .num_threads(size)
            .thread_name("Rad51RankThread".to_string())
            .build();
        let job = Arc::new(job);

        for (rank, inbox) in inboxes.into_iter().enumerate() {
            let group = ThreadGroup {
                rank,
                size,
                inbox,
                outboxes: outboxes.clone(),
            };
            let job = Arc::clone(&job);
            let result_sender = result_sender.clone();
            pool.execute(move || {
                let output = job(&group);
                // the receiver only goes away once run has returned
                let _ = result_sender.send((rank, output));
            });
        }
        drop(result_sender);
        drop(outboxes);

        let mut outputs: Vec<Option<R>> = (0..size).map(|_| None).collect();
        for (rank, output) in result_reciever.iter() {
            outputs[rank] = Some(output);
        }
        pool.join();

        outputs
            .into_iter()
            .enumerate()
            .map(|(rank, output)| output.ok_or(DistributionError::RankPanicked { rank }))
            .collect()
    }

    fn send(&self, to: usize, payload: Box<dyn Any + Send>) -> Result<(), DistributionError> {
        self.outboxes[to]
            .send(Envelope { from: self.rank, payload })
            .map_err(|_| DistributionError::Disconnected { rank: to })
    }

    fn receive<T: 'static>(&self) -> Result<(usize, T), DistributionError> {
        let envelope = self
            .inbox
            .recv()
            .map_err(|_| DistributionError::Disconnected { rank: self.rank })?;
        let value = envelope
            .payload
            .downcast::<T>()
            .map_err(|_| DistributionError::UnexpectedMessage { rank: self.rank })?;
        Ok((envelope.from, *value))
    }
}

impl Communicator for ThreadGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast<T: Clone + Send + 'static>(&self, value: Option<T>) -> Result<T, DistributionError> {
        if !self.is_root() {
            return self.receive::<T>().map(|(_, value)| value);
        }

        let value = value.ok_or(DistributionError::NothingToBroadcast)?;
        for rank in (0..self.size).filter(|&r| r != ROOT) {
            self.send(rank, Box::new(value.clone()))?;
        }
        Ok(value)
    }

    fn gather<T: Send + 'static>(&self, value: T) -> Result<Option<Vec<T>>, DistributionError> {
        if !self.is_root() {
            self.send(ROOT, Box::new(value))?;
            return Ok(None);
        }

        let mut slots: Vec<Option<T>> = (0..self.size).map(|_| None).collect();
        slots[ROOT] = Some(value);
        for _ in 1..self.size {
            let (from, value) = self.receive::<T>()?;
            slots[from] = Some(value);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(rank, slot)| slot.ok_or(DistributionError::Disconnected { rank }))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_covers_every_index_once() {
        for size in 1..6 {
            let mut covered = Vec::new();
            for rank in 0..size {
                covered.extend(partition(13, rank, size));
            }
            assert_eq!(covered, (0..13).collect::<Vec<_>>());
        }
        assert_eq!(partition(10, 2, 3), 6..10);
        assert_eq!(partition(2, 0, 4), 0..0);
        assert_eq!(partition(2, 3, 4), 0..2);
    }

    #[test]
    fn single_process_is_its_own_root() {
        let ctx = SingleProcess;
        assert!(ctx.is_root());
        assert_eq!(ctx.broadcast(Some(5)).unwrap(), 5);
        assert_eq!(ctx.broadcast::<u8>(None), Err(DistributionError::NothingToBroadcast));
        assert_eq!(ctx.gather("a").unwrap(), Some(vec!["a"]));
    }

    #[test]
    fn thread_group_broadcasts_from_root() {
        let outputs = ThreadGroup::run(4, |ctx| {
            let value = ctx.is_root().then(|| vec![1u32, 2, 3]);
            ctx.broadcast(value)
        })
        .unwrap();
        assert_eq!(outputs.len(), 4);
        for output in outputs {
            assert_eq!(output.unwrap(), vec![1, 2, 3]);
        }
    }

    #[test]
    fn thread_group_gathers_in_rank_order() {
        let outputs = ThreadGroup::run(3, |ctx| {
            let size = ctx.broadcast(ctx.is_root().then_some(ctx.size()))?;
            ctx.gather(ctx.rank() * 10 + size)
        })
        .unwrap();
        assert_eq!(outputs[0], Ok(Some(vec![3, 13, 23])));
        assert_eq!(outputs[1], Ok(None));
        assert_eq!(outputs[2], Ok(None));
    }

    #[test]
    fn empty_group_is_rejected() {
        let result = ThreadGroup::run(0, |ctx| ctx.rank());
        assert!(matches!(result, Err(DistributionError::EmptyGroup)));
    }
}

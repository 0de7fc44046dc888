//! Workers as threads joined by a channel mesh.
//!
//! [`ThreadComm::mesh`] connects every ordered pair of ranks with its own
//! unbounded channel, so messages between two workers arrive in the order
//! they were sent and a collective can never consume a payload that belongs
//! to the next one. When a worker's communicator is dropped its outgoing
//! channels close and any peer blocked on it fails instead of hanging.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, error};

use crate::comm::Communicator;
use crate::error::{ObsError, Result};

/// Communicator for one worker thread of an in-process group.
#[derive(Debug)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    /// `outboxes[dest]` carries payloads from this rank to `dest`.
    outboxes: Vec<Sender<Vec<u8>>>,
    /// `inboxes[source]` carries payloads from `source` to this rank.
    inboxes: Vec<Receiver<Vec<u8>>>,
}

impl ThreadComm {
    /// Build the communicators of a group of `size` workers, indexed by rank.
    pub fn mesh(size: usize) -> Vec<ThreadComm> {
        let mut outboxes: Vec<Vec<Sender<Vec<u8>>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut inboxes: Vec<Vec<Receiver<Vec<u8>>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();

        for source in 0..size {
            for dest in 0..size {
                let (tx, rx) = unbounded();
                outboxes[source].push(tx);
                inboxes[dest].push(rx);
            }
        }

        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| ThreadComm {
                rank,
                size,
                outboxes,
                inboxes,
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dest: usize, payload: Vec<u8>) -> Result<()> {
        let outbox = self.outboxes.get(dest).ok_or_else(|| {
            ObsError::precondition(format!("no worker {dest} in a group of {}", self.size))
        })?;
        outbox
            .send(payload)
            .map_err(|_| ObsError::collective(format!("worker {dest} left the group")))
    }

    fn recv(&self, source: usize) -> Result<Vec<u8>> {
        let inbox = self.inboxes.get(source).ok_or_else(|| {
            ObsError::precondition(format!("no worker {source} in a group of {}", self.size))
        })?;
        inbox
            .recv()
            .map_err(|_| ObsError::collective(format!("worker {source} left the group")))
    }
}

/// Run `work` on `size` worker threads, each with its own communicator, and
/// return the per-rank results.
///
/// If any worker fails the whole run fails. The reported error is the root
/// cause: the first error that is not merely a peer disconnect.
pub fn run_workers<F, R>(size: usize, work: F) -> Result<Vec<R>>
where
    F: Fn(Arc<dyn Communicator>) -> Result<R> + Sync,
    R: Send,
{
    if size == 0 {
        return Err(ObsError::configuration("a worker group needs at least one worker"));
    }
    debug!("starting {size} workers");

    let outcomes: Vec<Result<R>> = std::thread::scope(|scope| {
        let handles: Vec<_> = ThreadComm::mesh(size)
            .into_iter()
            .map(|comm| {
                let work = &work;
                std::thread::Builder::new()
                    .name(format!("obs-worker-{}", comm.rank))
                    .spawn_scoped(scope, move || work(Arc::new(comm)))
            })
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| match handle {
                Ok(handle) => handle
                    .join()
                    .unwrap_or_else(|_| Err(ObsError::other(format!("worker {rank} panicked")))),
                Err(e) => Err(ObsError::Io(e)),
            })
            .collect()
    });

    let mut values = Vec::with_capacity(size);
    let mut failure: Option<ObsError> = None;
    for (rank, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(value) => values.push(value),
            Err(e) => {
                error!("worker {rank} failed: {e}");
                let replace = failure
                    .as_ref()
                    .is_none_or(|current| current.is_collective() && !e.is_collective());
                if replace {
                    failure = Some(e);
                }
            }
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(values),
    }
}

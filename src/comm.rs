//! Collective redistribution layer.
//!
//! A fixed group of workers cooperates through blocking collectives. Every
//! worker holds a [`Communicator`] that knows its rank and the group size and
//! can move opaque byte payloads to and from a single peer; the collectives in
//! this module (broadcast, scatter, gather, reductions) are built on those two
//! primitives and must be entered by every worker in the same order.
//!
//! Values cross the worker boundary serialized with `bincode`, so any
//! `serde` type can be broadcast, scattered or gathered.
//!
//! # Example
//!
//! ```
//! use obspace::comm::{allreduce_sum, run_workers};
//!
//! # fn main() -> obspace::error::Result<()> {
//! let sums = run_workers(3, |comm| allreduce_sum(comm.as_ref(), comm.rank() as f64 + 1.0))?;
//! assert_eq!(sums, vec![6.0, 6.0, 6.0]);
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ObsError, Result};

pub mod plan;
pub mod serial;
pub mod threaded;

pub use plan::RedistributionPlan;
pub use serial::SerialComm;
pub use threaded::{ThreadComm, run_workers};

/// Rank of the worker that performs file I/O, random draws and partitioning.
pub const ROOT: usize = 0;

/// Point-to-point transport between the workers of one group.
pub trait Communicator: Send + Sync + std::fmt::Debug {
    /// Rank of this worker, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of workers in the group.
    fn size(&self) -> usize;

    /// Send a payload to `dest`. Messages between one pair never overtake.
    fn send(&self, dest: usize, payload: Vec<u8>) -> Result<()>;

    /// Block until the next payload from `source` arrives.
    fn recv(&self, source: usize) -> Result<Vec<u8>>;

    /// Whether this worker is the root.
    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

fn check_root(comm: &dyn Communicator, root: usize) -> Result<()> {
    if root >= comm.size() {
        return Err(ObsError::precondition(format!(
            "root {root} outside a group of {} workers",
            comm.size()
        )));
    }
    Ok(())
}

fn check_counts(comm: &dyn Communicator, counts: &[usize]) -> Result<()> {
    if counts.len() != comm.size() {
        return Err(ObsError::precondition(format!(
            "count table has {} entries for {} workers",
            counts.len(),
            comm.size()
        )));
    }
    Ok(())
}

/// Exclusive prefix sums of a count table.
pub fn displacements(counts: &[usize]) -> Vec<usize> {
    counts
        .iter()
        .scan(0usize, |offset, &count| {
            let start = *offset;
            *offset += count;
            Some(start)
        })
        .collect()
}

/// Replace `value` on every worker with the root's `value`.
pub fn broadcast<T>(comm: &dyn Communicator, root: usize, value: &mut T) -> Result<()>
where
    T: Serialize + DeserializeOwned,
{
    check_root(comm, root)?;
    if comm.size() == 1 {
        return Ok(());
    }

    if comm.rank() == root {
        let bytes = encode(value)?;
        for dest in (0..comm.size()).filter(|&dest| dest != root) {
            comm.send(dest, bytes.clone())?;
        }
    } else {
        *value = decode(&comm.recv(root)?)?;
    }
    Ok(())
}

/// Split the root's `send` buffer into consecutive segments of `counts[r]`
/// values and hand segment `r` to worker `r`.
///
/// Only the root's `send` is read; every worker must pass the same `counts`.
pub fn scatterv<T>(
    comm: &dyn Communicator,
    root: usize,
    send: &[T],
    counts: &[usize],
) -> Result<Vec<T>>
where
    T: Clone + Serialize + DeserializeOwned,
{
    check_root(comm, root)?;
    check_counts(comm, counts)?;
    let rank = comm.rank();

    if rank == root {
        let total: usize = counts.iter().sum();
        if total != send.len() {
            return Err(ObsError::precondition(format!(
                "scatter counts sum to {total} but the buffer holds {} values",
                send.len()
            )));
        }

        let mut local = Vec::new();
        for (dest, (&count, start)) in counts.iter().zip(displacements(counts)).enumerate() {
            let segment = &send[start..start + count];
            if dest == root {
                local = segment.to_vec();
            } else {
                comm.send(dest, encode(segment)?)?;
            }
        }
        Ok(local)
    } else {
        let segment: Vec<T> = decode(&comm.recv(root)?)?;
        if segment.len() != counts[rank] {
            return Err(ObsError::precondition(format!(
                "worker {rank} expected {} values, received {}",
                counts[rank],
                segment.len()
            )));
        }
        Ok(segment)
    }
}

/// Concatenate every worker's `send` buffer on the root, in rank order.
///
/// Returns the concatenation on the root and an empty vector elsewhere.
pub fn gatherv<T>(
    comm: &dyn Communicator,
    root: usize,
    send: &[T],
    counts: &[usize],
) -> Result<Vec<T>>
where
    T: Clone + Serialize + DeserializeOwned,
{
    check_root(comm, root)?;
    check_counts(comm, counts)?;
    let rank = comm.rank();
    if send.len() != counts[rank] {
        return Err(ObsError::precondition(format!(
            "worker {rank} contributes {} values but the count table expects {}",
            send.len(),
            counts[rank]
        )));
    }

    if rank == root {
        let mut gathered = Vec::with_capacity(counts.iter().sum());
        for source in 0..comm.size() {
            if source == root {
                gathered.extend_from_slice(send);
                continue;
            }
            let segment: Vec<T> = decode(&comm.recv(source)?)?;
            if segment.len() != counts[source] {
                return Err(ObsError::precondition(format!(
                    "worker {source} sent {} values, expected {}",
                    segment.len(),
                    counts[source]
                )));
            }
            gathered.extend(segment);
        }
        Ok(gathered)
    } else {
        comm.send(root, encode(send)?)?;
        Ok(Vec::new())
    }
}

/// Collect one value per worker on the root, in rank order.
pub fn gather<T>(comm: &dyn Communicator, root: usize, value: T) -> Result<Vec<T>>
where
    T: Serialize + DeserializeOwned,
{
    check_root(comm, root)?;
    if comm.rank() == root {
        let mut values = Vec::with_capacity(comm.size());
        let mut own = Some(value);
        for source in 0..comm.size() {
            if source == root {
                values.extend(own.take());
            } else {
                values.push(decode(&comm.recv(source)?)?);
            }
        }
        Ok(values)
    } else {
        comm.send(root, encode(&value)?)?;
        Ok(Vec::new())
    }
}

/// Collect one value per worker on every worker, in rank order.
pub fn allgather<T>(comm: &dyn Communicator, value: T) -> Result<Vec<T>>
where
    T: Serialize + DeserializeOwned,
{
    let mut values = gather(comm, ROOT, value)?;
    broadcast(comm, ROOT, &mut values)?;
    Ok(values)
}

/// Combine one value per worker with `op`, folding in ascending rank order
/// on the root so every worker receives a bit-identical result.
pub fn allreduce<T, F>(comm: &dyn Communicator, value: T, op: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: Fn(T, T) -> T,
{
    let contributions = gather(comm, ROOT, value)?;
    let mut reduced = contributions.into_iter().reduce(op);
    broadcast(comm, ROOT, &mut reduced)?;
    reduced.ok_or_else(|| ObsError::collective("reduction produced no value"))
}

/// Sum one `f64` per worker.
pub fn allreduce_sum(comm: &dyn Communicator, value: f64) -> Result<f64> {
    allreduce(comm, value, |a, b| a + b)
}

/// Make the root's `status` everyone's status.
///
/// Root-only sections (file I/O, random draws) end with this call so a root
/// failure stops every worker at the same point. Other workers pass `Ok(())`
/// and receive a [`ObsError::Collective`] carrying the root's message; the
/// root keeps its original error.
pub fn share_status(comm: &dyn Communicator, root: usize, status: Result<()>) -> Result<()> {
    let mut message = match (&status, comm.rank() == root) {
        (Err(e), true) => Some(e.to_string()),
        _ => None,
    };
    broadcast(comm, root, &mut message)?;
    match (status, message) {
        (Err(e), _) if comm.rank() == root => Err(e),
        (_, Some(message)) => Err(ObsError::collective(format!(
            "worker {root} failed: {message}"
        ))),
        (status, None) => status,
    }
}

/// Block until every worker has reached the barrier.
pub fn barrier(comm: &dyn Communicator) -> Result<()> {
    allreduce(comm, (), |_, _| ())
}

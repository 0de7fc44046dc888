//! Root-computed redistribution of per-record payloads.

use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::comm::{Communicator, ROOT, broadcast, displacements, gatherv, scatterv};
use crate::error::{ObsError, Result};

/// How the root's global record set is split across workers.
///
/// Records owned by worker `r` form the `r`-th contiguous segment of the plan
/// order; inside a segment they keep their original relative order. Only the
/// root knows the permutation; every worker knows the counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedistributionPlan {
    counts: Vec<usize>,
    /// `permutation[k]` is the source index of the `k`-th record in plan order.
    permutation: Vec<usize>,
}

impl RedistributionPlan {
    /// Build a plan from one owning worker per record.
    pub fn from_assignment(owners: &[usize], workers: usize) -> Result<Self> {
        let mut counts = vec![0usize; workers];
        for (index, &owner) in owners.iter().enumerate() {
            let slot = counts.get_mut(owner).ok_or_else(|| {
                ObsError::precondition(format!(
                    "record {index} assigned to worker {owner} outside a group of {workers}"
                ))
            })?;
            *slot += 1;
        }

        let mut next = displacements(&counts);
        let mut permutation = vec![0usize; owners.len()];
        for (index, &owner) in owners.iter().enumerate() {
            permutation[next[owner]] = index;
            next[owner] += 1;
        }

        Ok(RedistributionPlan {
            counts,
            permutation,
        })
    }

    /// A plan that only knows its counts, as held by non-root workers.
    pub fn from_counts(counts: Vec<usize>) -> Self {
        RedistributionPlan {
            counts,
            permutation: Vec::new(),
        }
    }

    /// Collective: the root builds the plan from `owners` and every worker
    /// receives the per-worker counts.
    ///
    /// `owners` is only read on the root, where it is required.
    pub fn establish(comm: &dyn Communicator, owners: Option<&[usize]>) -> Result<Self> {
        let mut plan = if comm.is_root() {
            let owners = owners.ok_or_else(|| {
                ObsError::precondition("the root needs an owner assignment to plan a distribution")
            })?;
            Self::from_assignment(owners, comm.size())?
        } else {
            Self::from_counts(Vec::new())
        };

        broadcast(comm, ROOT, &mut plan.counts)?;
        debug!(
            "worker {} holds {} of {} records",
            comm.rank(),
            plan.local_count(comm.rank()),
            plan.total()
        );
        Ok(plan)
    }

    /// Records assigned to each worker.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Records assigned to `rank`.
    pub fn local_count(&self, rank: usize) -> usize {
        self.counts.get(rank).copied().unwrap_or(0)
    }

    /// Total number of records.
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Offset of each worker's segment in plan order.
    pub fn displacements(&self) -> Vec<usize> {
        displacements(&self.counts)
    }

    /// Root-side permutation, empty on other workers.
    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    /// Reorder a strided source buffer (`stride` values per record) into plan
    /// order.
    pub fn arrange<T: Clone>(&self, source: &[T], stride: usize) -> Result<Vec<T>> {
        if source.len() != self.permutation.len() * stride {
            return Err(ObsError::precondition(format!(
                "payload holds {} values, plan expects {} records of {stride}",
                source.len(),
                self.permutation.len()
            )));
        }
        let mut arranged = Vec::with_capacity(source.len());
        for &index in &self.permutation {
            arranged.extend_from_slice(&source[index * stride..(index + 1) * stride]);
        }
        Ok(arranged)
    }

    fn strided_counts(&self, stride: usize) -> Vec<usize> {
        self.counts.iter().map(|count| count * stride).collect()
    }

    /// Collective: arrange the root's `source` and hand every worker its own
    /// segment. `source` is ignored on other workers.
    pub fn scatter<T>(&self, comm: &dyn Communicator, source: &[T], stride: usize) -> Result<Vec<T>>
    where
        T: Clone + Serialize + DeserializeOwned,
    {
        if comm.is_root() {
            let arranged = self.arrange(source, stride)?;
            self.scatter_arranged(comm, &arranged, stride)
        } else {
            self.scatter_arranged(comm, &[], stride)
        }
    }

    /// Collective: scatter a root buffer that is already in plan order.
    pub fn scatter_arranged<T>(
        &self,
        comm: &dyn Communicator,
        arranged: &[T],
        stride: usize,
    ) -> Result<Vec<T>>
    where
        T: Clone + Serialize + DeserializeOwned,
    {
        scatterv(comm, ROOT, arranged, &self.strided_counts(stride))
    }

    /// Collective: gather every worker's strided segment on the root, in plan
    /// order. Returns an empty vector on other workers.
    pub fn collect<T>(&self, comm: &dyn Communicator, local: &[T], stride: usize) -> Result<Vec<T>>
    where
        T: Clone + Serialize + DeserializeOwned,
    {
        gatherv(comm, ROOT, local, &self.strided_counts(stride))
    }
}

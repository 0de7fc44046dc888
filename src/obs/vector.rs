//! Distributed numeric vector over an observation store.
//!
//! An [`ObsVector`] holds one `f64` column per declared variable, sized to
//! its store's local record count. Elementwise operators work on the local
//! partition only; [`ObsVector::dot_product_with`], [`ObsVector::rms`] and
//! [`ObsVector::summary`] reduce over every worker.
//!
//! [`ObsVector::random`] is reproducible for any worker count: the root
//! draws one value per (canonical record, variable) pair and each record
//! receives the draw belonging to its canonical position.

use std::fmt;
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::comm::{RedistributionPlan, allreduce, allreduce_sum};
use crate::error::{ObsError, Result};
use crate::obs::columns::ColumnSet;
use crate::obs::space::ObsSpace;
use crate::util::missing::{MISSING_F64, is_missing};

/// Seed of the generator behind [`ObsVector::random`].
pub const OBS_PERTURBATION_SEED: u64 = 2;

const VECTOR_NAME: &str = "ObsVector";

/// Values per declared variable for the local records of one store.
#[derive(Debug, Clone)]
pub struct ObsVector<'a> {
    space: &'a ObsSpace,
    data: ColumnSet,
}

impl<'a> ObsVector<'a> {
    /// A zero vector.
    pub fn new(space: &'a ObsSpace) -> Self {
        ObsVector {
            space,
            data: ColumnSet::filled(VECTOR_NAME, space.variables(), space.local_count(), 0.0),
        }
    }

    /// Copy `other`'s values, or only its shape when `copy` is false.
    pub fn copy_from(other: &ObsVector<'a>, copy: bool) -> Self {
        let mut vector = other.clone();
        if !copy {
            vector.zero();
        }
        vector
    }

    /// Read the declared variables from a store group.
    pub fn from_group(space: &'a ObsSpace, group: &str) -> Result<Self> {
        let source = space.get(group)?;
        let mut data = ColumnSet::new(VECTOR_NAME);
        for variable in space.variables() {
            let values = source.column(variable).ok_or_else(|| {
                ObsError::not_found(format!(
                    "variable {variable} in group {group}; columns: [{}]",
                    source.column_names().join(", ")
                ))
            })?;
            data.push_column(variable.clone(), values.to_vec())?;
        }
        if data.len() != space.local_count() {
            return Err(ObsError::precondition(format!(
                "group {group} holds {} values, store has {} records",
                data.len(),
                space.local_count()
            )));
        }
        Ok(ObsVector { space, data })
    }

    /// The values as a group named `name`, ready for [`ObsSpace::put`].
    pub fn to_group(&self, name: &str) -> ColumnSet {
        let mut group = self.data.clone();
        group.set_name(name);
        group
    }

    pub fn space(&self) -> &'a ObsSpace {
        self.space
    }

    pub fn data(&self) -> &ColumnSet {
        &self.data
    }

    pub fn variables(&self) -> &[String] {
        self.space.variables()
    }

    pub fn column(&self, variable: &str) -> Option<&[f64]> {
        self.data.column(variable)
    }

    /// Global number of records.
    pub fn size(&self) -> usize {
        self.space.global_count()
    }

    pub fn local_size(&self) -> usize {
        self.data.len()
    }

    fn check_layout(&self, other: &ObsVector<'_>, operation: &str) {
        assert!(
            self.data.same_layout(&other.data),
            "{operation}: vectors differ in variables or size ({:?} x {} vs {:?} x {})",
            self.data.column_names(),
            self.data.len(),
            other.data.column_names(),
            other.data.len()
        );
    }

    fn apply<F: Fn(f64) -> f64>(&mut self, f: F) {
        for column in self.data.columns_mut() {
            column.values.iter_mut().for_each(|x| *x = f(*x));
        }
    }

    fn combine<F: Fn(f64, f64) -> f64>(&mut self, other: &ObsVector<'_>, operation: &str, f: F) {
        self.check_layout(other, operation);
        for (mine, theirs) in self.data.columns_mut().iter_mut().zip(other.data.columns()) {
            for (x, &y) in mine.values.iter_mut().zip(&theirs.values) {
                *x = f(*x, y);
            }
        }
    }

    /// Copy the values of another vector of the same shape.
    pub fn assign(&mut self, other: &ObsVector<'_>) {
        self.combine(other, "assign", |_, y| y);
    }

    pub fn zero(&mut self) {
        self.apply(|_| 0.0);
    }

    pub fn ones(&mut self) {
        self.apply(|_| 1.0);
    }

    pub fn sqrt(&mut self) {
        self.apply(f64::sqrt);
    }

    /// Replace every entry by its reciprocal. Zero entries are not guarded.
    pub fn invert(&mut self) {
        let original = self.clone();
        self.ones();
        *self /= &original;

        let non_finite = self
            .data
            .columns()
            .iter()
            .flat_map(|c| c.values.iter())
            .filter(|x| !x.is_finite())
            .count();
        if non_finite > 0 {
            debug!("invert produced {non_finite} non-finite values");
        }
    }

    /// `self += a * x`.
    pub fn axpy(&mut self, a: f64, x: &ObsVector<'_>) {
        self.combine(x, "axpy", |s, v| s + a * v);
    }

    /// Collective: standard normal perturbations from the fixed seed.
    pub fn random(&mut self) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(OBS_PERTURBATION_SEED);
        self.random_with(&mut rng)
    }

    /// Collective: standard normal perturbations drawn from `rng` on the
    /// root. Other workers never touch `rng`.
    pub fn random_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        let result = self.draw_random(rng);
        self.space.guard(result)
    }

    fn draw_random<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        trace!("random starting");
        let comm = self.space.comm();
        let width = self.data.num_columns();
        let plan = RedistributionPlan::from_counts(self.space.counts_by_worker().to_vec());

        let arranged = if comm.is_root() {
            let order = self.space.global_order();
            let draws: Vec<f64> = (0..order.len() * width)
                .map(|_| -> f64 { StandardNormal.sample(rng) })
                .collect();
            let mut arranged = Vec::with_capacity(draws.len());
            for rank in canonical_ranks(order) {
                arranged.extend_from_slice(&draws[rank * width..(rank + 1) * width]);
            }
            arranged
        } else {
            Vec::new()
        };

        let local = plan.scatter_arranged(comm, &arranged, width)?;
        self.data = ColumnSet::from_interleaved(VECTOR_NAME, &self.data.column_names(), &local)?;
        trace!("random done");
        Ok(())
    }

    /// Collective: sum of elementwise products over every variable, record
    /// and worker.
    pub fn dot_product_with(&self, other: &ObsVector<'_>) -> Result<f64> {
        if !self.data.same_layout(&other.data) {
            return Err(ObsError::precondition(format!(
                "dot product of {:?} x {} with {:?} x {}",
                self.data.column_names(),
                self.data.len(),
                other.data.column_names(),
                other.data.len()
            )));
        }
        let local = self
            .data
            .columns()
            .iter()
            .zip(other.data.columns())
            .map(|(a, b)| a.values.iter().zip(&b.values).map(|(x, y)| x * y).sum::<f64>())
            .sum();
        self.space.guard(allreduce_sum(self.space.comm(), local))
    }

    /// Collective: `sqrt(self · self / global count)`, or 0 for an empty store.
    pub fn rms(&self) -> Result<f64> {
        let dot = self.dot_product_with(self)?;
        let count = self.space.global_count();
        if count == 0 {
            return Ok(0.0);
        }
        Ok((dot / count as f64).sqrt())
    }

    /// Mark every entry missing where `mask` is missing.
    pub fn mask(&mut self, mask: &ObsVector<'_>) {
        self.combine(mask, "mask", |x, m| if is_missing(m) { MISSING_F64 } else { x });
    }

    fn dense_entries<'b>(&'b self, mask: &'b ObsVector<'_>) -> impl Iterator<Item = f64> + 'b {
        self.check_layout(mask, "pack");
        self.data
            .columns()
            .iter()
            .zip(mask.data.columns())
            .flat_map(|(mine, theirs)| mine.values.iter().zip(&theirs.values))
            .filter(|(x, m)| !is_missing(**x) && !is_missing(**m))
            .map(|(x, _)| *x)
    }

    /// Entries missing in neither vector nor mask, variable by variable.
    pub fn pack_dense(&self, mask: &ObsVector<'_>) -> Vec<f64> {
        self.dense_entries(mask).collect()
    }

    /// Length of [`pack_dense`](Self::pack_dense).
    pub fn pack_dense_size(&self, mask: &ObsVector<'_>) -> usize {
        self.dense_entries(mask).count()
    }

    fn check_index(&self, variable: usize, index: usize) -> Result<()> {
        if variable >= self.data.num_columns() || index >= self.data.len() {
            return Err(ObsError::precondition(format!(
                "element ({variable}, {index}) outside {} variables x {} records",
                self.data.num_columns(),
                self.data.len()
            )));
        }
        Ok(())
    }

    pub fn get(&self, variable: usize, index: usize) -> Result<f64> {
        self.check_index(variable, index)?;
        Ok(self.data.columns()[variable].values[index])
    }

    pub fn set(&mut self, variable: usize, index: usize, value: f64) -> Result<()> {
        self.check_index(variable, index)?;
        self.data.columns_mut()[variable].values[index] = value;
        Ok(())
    }

    /// Collective: minimum, maximum and mean of every variable, ignoring
    /// missing entries.
    pub fn summary(&self) -> Result<VectorSummary> {
        let local: Vec<Accumulator> = self
            .data
            .columns()
            .iter()
            .map(|c| {
                c.values
                    .iter()
                    .copied()
                    .filter(|x| !is_missing(*x))
                    .fold(Accumulator::default(), Accumulator::push)
            })
            .collect();
        let global = self.space.guard(allreduce(self.space.comm(), local, |a, b| {
            a.into_iter().zip(b).map(|(x, y)| x.merge(y)).collect()
        }))?;

        Ok(VectorSummary {
            global_count: self.space.global_count(),
            variables: self
                .data
                .columns()
                .iter()
                .zip(global)
                .map(|(c, acc)| acc.finish(&c.name))
                .collect(),
        })
    }
}

/// Position of each entry of `order` among all entries, ascending.
fn canonical_ranks(order: &[u64]) -> Vec<usize> {
    let mut sorted: Vec<usize> = (0..order.len()).collect();
    sorted.sort_by_key(|&i| order[i]);
    let mut ranks = vec![0usize; order.len()];
    for (rank, &index) in sorted.iter().enumerate() {
        ranks[index] = rank;
    }
    ranks
}

impl AddAssign<&ObsVector<'_>> for ObsVector<'_> {
    fn add_assign(&mut self, rhs: &ObsVector<'_>) {
        self.combine(rhs, "+=", |x, y| x + y);
    }
}

impl SubAssign<&ObsVector<'_>> for ObsVector<'_> {
    fn sub_assign(&mut self, rhs: &ObsVector<'_>) {
        self.combine(rhs, "-=", |x, y| x - y);
    }
}

impl MulAssign<f64> for ObsVector<'_> {
    fn mul_assign(&mut self, rhs: f64) {
        self.apply(|x| x * rhs);
    }
}

impl MulAssign<&ObsVector<'_>> for ObsVector<'_> {
    fn mul_assign(&mut self, rhs: &ObsVector<'_>) {
        self.combine(rhs, "*=", |x, y| x * y);
    }
}

impl DivAssign<&ObsVector<'_>> for ObsVector<'_> {
    fn div_assign(&mut self, rhs: &ObsVector<'_>) {
        self.combine(rhs, "/=", |x, y| x / y);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Accumulator {
    min: f64,
    max: f64,
    sum: f64,
    count: u64,
}

impl Default for Accumulator {
    fn default() -> Self {
        Accumulator {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
        }
    }
}

impl Accumulator {
    fn push(self, value: f64) -> Self {
        Accumulator {
            min: self.min.min(value),
            max: self.max.max(value),
            sum: self.sum + value,
            count: self.count + 1,
        }
    }

    fn merge(self, other: Accumulator) -> Self {
        Accumulator {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            sum: self.sum + other.sum,
            count: self.count + other.count,
        }
    }

    fn finish(self, name: &str) -> VariableSummary {
        let present = self.count > 0;
        VariableSummary {
            name: name.to_string(),
            count: self.count as usize,
            min: present.then_some(self.min),
            max: present.then_some(self.max),
            mean: present.then(|| self.sum / self.count as f64),
        }
    }
}

/// Statistics of one variable over all workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSummary {
    pub name: String,
    /// Non-missing entries.
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

/// Statistics of a whole vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSummary {
    pub global_count: usize,
    pub variables: Vec<VariableSummary>,
}

impl fmt::Display for VectorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn value(v: Option<f64>) -> String {
            v.map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        for (i, variable) in self.variables.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(
                f,
                "obspace[{}]: Min={}, Max={}, Average={}",
                self.global_count,
                value(variable.min),
                value(variable.max),
                value(variable.mean)
            )?;
        }
        Ok(())
    }
}

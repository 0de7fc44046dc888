//! Validity tests applied when screening a store.

use std::fmt::Debug;

/// Decides whether one local observation survives screening.
///
/// `residual` and `predicted` hold the observation's value for every
/// declared variable, in declaration order.
pub trait ScreeningFilter: Debug {
    fn accept(&self, residual: &[f64], predicted: &[f64]) -> bool;
}

/// Keeps every observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ScreeningFilter for AcceptAll {
    fn accept(&self, _residual: &[f64], _predicted: &[f64]) -> bool {
        true
    }
}

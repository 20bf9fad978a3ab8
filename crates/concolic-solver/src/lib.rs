// SPDX-License-Identifier: AGPL-3.0

//! Index-concretizing solver middleware.
//!
//! A [`SolverBackend`] is assumed to reason efficiently only about reads at
//! concrete array offsets. [`IndexConcretizer`] wraps such a backend: it
//! discovers every symbolic offset in a query, solves a side query that pins
//! each one to a concrete witness, and re-solves the original query with the
//! witnesses added as equalities. Queries without symbolic offsets are
//! delegated untouched.

use std::time::Duration;

use concolic_exceptions::SolverResult;
use concolic_expr::{ArrayRef, ExprRef, Query};

mod collect;
mod concretize;

pub use collect::*;
pub use concretize::*;

/// Satisfiability outcome of a model-producing solver call.
///
/// `Sat` carries one byte buffer per requested array, in request order.
/// Backend failures are not an outcome; they surface as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverOutput {
    Sat { values: Vec<Vec<u8>> },
    Unsat,
}

impl SolverOutput {
    pub fn is_sat(&self) -> bool {
        matches!(self, SolverOutput::Sat { .. })
    }

    /// The per-object value buffers, `None` when unsat.
    pub fn values(&self) -> Option<&[Vec<u8>]> {
        match self {
            SolverOutput::Sat { values } => Some(values),
            SolverOutput::Unsat => None,
        }
    }
}

/// Three-valued validity verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    True,
    False,
    Unknown,
}

/// Coarse status of the most recent backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverRunStatus {
    #[default]
    Success,
    Timeout,
    Failure,
    Unknown,
}

/// The backend solver capability consumed by the decorator.
///
/// The decorator owns its backend exclusively for its whole lifetime and
/// issues at most two sequential `compute_initial_values` calls per query.
pub trait SolverBackend {
    /// Solve for concrete byte contents of `objects` under `query`.
    fn compute_initial_values(
        &mut self,
        query: &Query,
        objects: &[ArrayRef],
    ) -> SolverResult<SolverOutput>;

    /// Whether the query's goal is provably true under its constraints.
    fn compute_truth(&mut self, query: &Query) -> SolverResult<bool>;

    /// Validity of the query's goal under its constraints.
    fn compute_validity(&mut self, query: &Query) -> SolverResult<Validity>;

    /// A concrete value for the query's goal expression.
    fn compute_value(&mut self, query: &Query) -> SolverResult<ExprRef>;

    /// Status of the most recent operation.
    fn operation_status(&self) -> SolverRunStatus;

    /// Textual form of the query as the backend would solve it.
    fn constraint_log(&mut self, query: &Query) -> SolverResult<String>;

    /// Configure the backend's solve timeout; `None` disables it.
    fn set_timeout(&mut self, timeout: Option<Duration>);
}

// SPDX-License-Identifier: AGPL-3.0

//! Two-phase index concretization.
//!
//! Phase one solves a side query that assigns one concrete witness to every
//! symbolic array offset in the caller's query; phase two re-solves the
//! original query with those witnesses pinned as equalities. The side query
//! zero-forces every symbolic array referenced by the query, so witnesses are
//! reproducible and independent of which objects the caller asked for. The
//! trade-off: an index assignment that is only feasible under a non-zero
//! array valuation is never explored, and such queries report unsat.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use concolic_exceptions::{SolverError, SolverResult};
use concolic_expr::{
    ArrayCache, ArrayRef, ConstraintSet, Expr, ExprRef, Query, UpdateList, BYTE_WIDTH, INDEX_WIDTH,
};

use crate::{
    collect_indices, collect_symbolic_arrays, SolverBackend, SolverOutput, SolverRunStatus,
    Validity,
};

/// Bytes used to carry one 32-bit witness through the byte-granular
/// value-extraction channel.
const WITNESS_BYTES: usize = (INDEX_WIDTH / BYTE_WIDTH) as usize;

/// Solver decorator that concretizes symbolic array offsets before
/// delegating.
///
/// Owns its backend for its whole lifetime. `compute_initial_values` is the
/// only operation this layer implements; truth/validity/value queries return
/// [`SolverError::Unsupported`], and status/log/timeout calls forward
/// unchanged.
pub struct IndexConcretizer<B> {
    backend: B,
    // Mints the per-call evaluation arrays; append-only, never reused.
    eval_arrays: ArrayCache,
    calls: u64,
}

impl<B: SolverBackend> IndexConcretizer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            eval_arrays: ArrayCache::new(),
            calls: 0,
        }
    }

    /// Release the decorator and hand back its backend.
    pub fn into_inner(self) -> B {
        self.backend
    }

    /// Mint the ephemeral array carrying the side query's answer. The name
    /// keys on the index count and a per-instance call counter so two calls
    /// can never collide on a name-addressed array namespace.
    fn mint_eval_array(&mut self, index_count: usize) -> SolverResult<ArrayRef> {
        self.calls += 1;
        let name = format!("index_evaluation_{}_{}", index_count, self.calls);
        let size = eval_array_size(index_count)?;
        Ok(self.eval_arrays.symbolic(&name, size)?)
    }
}

/// Size in bytes of the evaluation array carrying `index_count` witnesses.
fn eval_array_size(index_count: usize) -> SolverResult<u32> {
    index_count
        .checked_mul(WITNESS_BYTES)
        .and_then(|bytes| u32::try_from(bytes).ok())
        .ok_or_else(|| {
            SolverError::InvariantViolation(format!(
                "evaluation array for {} indices exceeds the addressable size",
                index_count
            ))
        })
}

/// Build the phase-one constraint set: byte-split equalities binding each
/// index to the evaluation array, plus zero-forcing of every symbolic array
/// the query references.
fn side_constraints(
    indices: &[ExprRef],
    arrays: &[ArrayRef],
    eval: &ArrayRef,
) -> SolverResult<ConstraintSet> {
    let mut side = ConstraintSet::new();

    // The backend's value-extraction channel is reliable only at byte
    // granularity: split each 32-bit index into four little-endian byte
    // equalities against the evaluation array.
    for (k, index) in indices.iter().enumerate() {
        for j in 0..WITNESS_BYTES {
            let byte = Expr::extract(Arc::clone(index), 8 * j as u32, BYTE_WIDTH)?;
            let cell = Expr::read(
                UpdateList::new(Arc::clone(eval)),
                Expr::constant((WITNESS_BYTES * k + j) as u64, INDEX_WIDTH)?,
            )?;
            side.push(Expr::eq(byte, cell)?);
        }
    }

    for array in arrays {
        for i in 0..array.size() {
            let cell = Expr::read(
                UpdateList::new(Arc::clone(array)),
                Expr::constant(u64::from(i), array.domain())?,
            )?;
            side.push(Expr::eq(cell, Expr::constant(0, array.range())?)?);
        }
    }

    Ok(side)
}

/// Decode the side query's single buffer into per-index witness values,
/// preserving the pairing established by the byte-split constraints.
fn decode_witnesses(indices: &[ExprRef], buffers: &[Vec<u8>]) -> SolverResult<Vec<u32>> {
    if buffers.len() != 1 {
        return Err(SolverError::InvariantViolation(format!(
            "side query returned {} value buffers, expected 1",
            buffers.len()
        )));
    }
    let buffer = &buffers[0];
    let expected = indices.len() * WITNESS_BYTES;
    if buffer.len() != expected {
        return Err(SolverError::InvariantViolation(format!(
            "side query buffer is {} bytes, expected {}",
            buffer.len(),
            expected
        )));
    }

    let witnesses = buffer
        .chunks_exact(WITNESS_BYTES)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Ok(witnesses)
}

impl<B: SolverBackend> SolverBackend for IndexConcretizer<B> {
    fn compute_initial_values(
        &mut self,
        query: &Query,
        objects: &[ArrayRef],
    ) -> SolverResult<SolverOutput> {
        let indices = collect_indices(query);

        // Nothing to concretize: behave exactly like the bare backend.
        if indices.is_empty() {
            return self.backend.compute_initial_values(query, objects);
        }

        for index in &indices {
            if index.width() != INDEX_WIDTH {
                return Err(SolverError::InvariantViolation(format!(
                    "array offset expression is {} bits wide, expected {}",
                    index.width(),
                    INDEX_WIDTH
                )));
            }
        }

        let arrays = collect_symbolic_arrays(query);
        debug!(
            indices = indices.len(),
            arrays = arrays.len(),
            "concretizing array offsets"
        );

        let eval = self.mint_eval_array(indices.len())?;
        let side = side_constraints(&indices, &arrays, &eval)?;
        let side_query = Query::new(side, Expr::constant_false());

        let output = self
            .backend
            .compute_initial_values(&side_query, std::slice::from_ref(&eval))?;
        let buffers = match output {
            SolverOutput::Sat { values } => values,
            // Fail closed: no feasible index assignment under the canonical
            // zero valuation means the whole query reports unsat.
            SolverOutput::Unsat => return Ok(SolverOutput::Unsat),
        };

        let witnesses = decode_witnesses(&indices, &buffers)?;

        let mut pins = Vec::with_capacity(indices.len());
        for (k, (index, &witness)) in indices.iter().zip(&witnesses).enumerate() {
            debug!(index = k, witness, "pinned array offset");
            pins.push(Expr::eq(
                Arc::clone(index),
                Expr::constant(u64::from(witness), INDEX_WIDTH)?,
            )?);
        }

        let final_query = Query::new(query.constraints.with(pins), Arc::clone(&query.expr));
        self.backend.compute_initial_values(&final_query, objects)
    }

    fn compute_truth(&mut self, _query: &Query) -> SolverResult<bool> {
        Err(SolverError::Unsupported("compute_truth"))
    }

    fn compute_validity(&mut self, _query: &Query) -> SolverResult<Validity> {
        Err(SolverError::Unsupported("compute_validity"))
    }

    fn compute_value(&mut self, _query: &Query) -> SolverResult<ExprRef> {
        Err(SolverError::Unsupported("compute_value"))
    }

    fn operation_status(&self) -> SolverRunStatus {
        self.backend.operation_status()
    }

    fn constraint_log(&mut self, query: &Query) -> SolverResult<String> {
        self.backend.constraint_log(query)
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.backend.set_timeout(timeout)
    }
}

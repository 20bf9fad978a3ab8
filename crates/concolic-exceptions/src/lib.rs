// SPDX-License-Identifier: AGPL-3.0

//! Error taxonomy shared across the concolic workspace.
//!
//! Every contract breach is a checked error, never an abort, so callers can
//! tell "no solution" apart from "contract broken".

use thiserror::Error;

/// Errors raised while building expressions or minting arrays.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// Two operands that must agree on bit-width do not.
    #[error("Width mismatch: {context} ({lhs} vs {rhs} bits)")]
    WidthMismatch {
        context: &'static str,
        lhs: u32,
        rhs: u32,
    },

    /// An extract reaches past the end of its source expression.
    #[error("Extract out of range: [{offset}, {offset}+{width}) of a {src_width}-bit expression")]
    ExtractOutOfRange {
        offset: u32,
        width: u32,
        src_width: u32,
    },

    /// A constant literal does not fit the requested width.
    #[error("Constant {value:#x} does not fit in {width} bits")]
    ConstantOverflow { value: u64, width: u32 },

    /// The same array name was requested with a different shape.
    #[error("Array '{name}' redefined with a different shape")]
    ArrayRedefined { name: String },
}

/// Errors surfaced by a solver or the concretizing decorator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// Operation the decorator deliberately does not implement.
    #[error("Operation not supported by this solver layer: {0}")]
    Unsupported(&'static str),

    /// A solver-interface contract was broken by a caller or backend.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The backend itself failed (as opposed to reporting unsat).
    #[error("Backend solver failure: {0}")]
    Backend(String),

    /// Expression construction failed while rewriting a query.
    #[error(transparent)]
    Expr(#[from] ExprError),
}

/// Errors raised by the offline array dumper.
#[derive(Error, Debug)]
pub enum DumpError {
    #[error("I/O error while dumping array data: {0}")]
    Io(#[from] std::io::Error),

    /// A previously seen array reappeared with a smaller size.
    #[error("Array '{name}' shrank from {recorded} to {observed} bytes")]
    SizeShrunk {
        name: String,
        recorded: u32,
        observed: u32,
    },

    /// A previously dumped constant array reappeared with different contents.
    #[error("Constant array '{name}' changed contents at byte {offset}")]
    ContentChanged { name: String, offset: usize },

    /// A name first seen as a symbolic array reappeared as a constant array.
    #[error("Array '{name}' reclassified from symbolic to constant")]
    Reclassified { name: String },

    /// An array name that cannot be used as a file name under the run
    /// directory.
    #[error("Array name {name:?} is not a valid file name")]
    InvalidName { name: String },
}

/// Result type for expression construction.
pub type ExprResult<T> = Result<T, ExprError>;

/// Result type for solver operations.
pub type SolverResult<T> = Result<T, SolverError>;

/// Result type for dumper operations.
pub type DumpResult<T> = Result<T, DumpError>;

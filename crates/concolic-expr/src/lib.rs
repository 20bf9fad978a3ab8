// SPDX-License-Identifier: AGPL-3.0

//! Expression and array data model for the concolic solver stack.
//!
//! Expressions are immutable, reference-counted DAG nodes; structurally
//! identical sub-expressions may be the same object, and traversals key their
//! visited sets on node identity rather than structure. Arrays are byte
//! addressed with a persistent update log layered on top.

mod array;
mod constraints;
mod expr;

pub use array::*;
pub use constraints::*;
pub use expr::*;

/// Bit-width of boolean expressions.
pub const BOOL_WIDTH: u32 = 1;

/// Bit-width of a single array cell.
pub const BYTE_WIDTH: u32 = 8;

/// Bit-width of array offsets. The whole stack assumes a 32-bit offset
/// domain; wider or narrower offsets are a caller contract breach.
pub const INDEX_WIDTH: u32 = 32;

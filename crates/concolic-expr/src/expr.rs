// SPDX-License-Identifier: AGPL-3.0

//! Expression nodes and their factory operations.

use std::fmt;
use std::sync::Arc;

use concolic_exceptions::{ExprError, ExprResult};

use crate::{UpdateList, BOOL_WIDTH};

/// Shared handle to an expression node.
pub type ExprRef = Arc<Expr>;

/// An immutable bitvector or boolean expression.
///
/// Nodes are shared by reference; structurally identical sub-expressions may
/// be one object. Traversals that must visit each node once key on
/// [`Expr::id`], not on structure.
pub struct Expr {
    kind: ExprKind,
    width: u32,
}

#[derive(Debug)]
pub enum ExprKind {
    /// Constant literal, value held zero-extended in a u64.
    Constant(u64),
    /// Read of one cell through an update log: `updates.root[index]`.
    Read { updates: UpdateList, index: ExprRef },
    /// Bit-range extraction starting at `bit_offset` (LSB = 0).
    Extract { src: ExprRef, bit_offset: u32 },
    /// Zero-extension of `src` to a wider bitvector.
    ZExt { src: ExprRef },
    /// Boolean equality of two same-width expressions.
    Eq { lhs: ExprRef, rhs: ExprRef },
    /// Wrapping addition of two same-width expressions.
    Add { lhs: ExprRef, rhs: ExprRef },
}

impl Expr {
    /// Constant literal of the given bit-width (1..=64).
    pub fn constant(value: u64, width: u32) -> ExprResult<ExprRef> {
        debug_assert!(width >= 1 && width <= 64);
        if width < 64 && value >> width != 0 {
            return Err(ExprError::ConstantOverflow { value, width });
        }
        Ok(Arc::new(Expr {
            kind: ExprKind::Constant(value),
            width,
        }))
    }

    /// The always-false boolean constant.
    pub fn constant_false() -> ExprRef {
        Arc::new(Expr {
            kind: ExprKind::Constant(0),
            width: BOOL_WIDTH,
        })
    }

    /// Indexed read through an update log. Result width is the array's
    /// cell width.
    pub fn read(updates: UpdateList, index: ExprRef) -> ExprResult<ExprRef> {
        if index.width() != updates.root().domain() {
            return Err(ExprError::WidthMismatch {
                context: "read index",
                lhs: index.width(),
                rhs: updates.root().domain(),
            });
        }
        let width = updates.root().range();
        Ok(Arc::new(Expr {
            kind: ExprKind::Read { updates, index },
            width,
        }))
    }

    /// Extract `width` bits of `src` starting at `bit_offset`.
    pub fn extract(src: ExprRef, bit_offset: u32, width: u32) -> ExprResult<ExprRef> {
        let src_width = src.width();
        if bit_offset
            .checked_add(width)
            .map_or(true, |end| end > src_width)
        {
            return Err(ExprError::ExtractOutOfRange {
                offset: bit_offset,
                width,
                src_width,
            });
        }
        Ok(Arc::new(Expr {
            kind: ExprKind::Extract { src, bit_offset },
            width,
        }))
    }

    /// Zero-extend `src` to `width` bits.
    pub fn zero_extend(src: ExprRef, width: u32) -> ExprResult<ExprRef> {
        if width < src.width() {
            return Err(ExprError::WidthMismatch {
                context: "zero extend",
                lhs: src.width(),
                rhs: width,
            });
        }
        Ok(Arc::new(Expr {
            kind: ExprKind::ZExt { src },
            width,
        }))
    }

    /// Boolean equality of two same-width expressions.
    pub fn eq(lhs: ExprRef, rhs: ExprRef) -> ExprResult<ExprRef> {
        if lhs.width() != rhs.width() {
            return Err(ExprError::WidthMismatch {
                context: "eq",
                lhs: lhs.width(),
                rhs: rhs.width(),
            });
        }
        Ok(Arc::new(Expr {
            kind: ExprKind::Eq { lhs, rhs },
            width: BOOL_WIDTH,
        }))
    }

    /// Wrapping addition of two same-width expressions.
    pub fn add(lhs: ExprRef, rhs: ExprRef) -> ExprResult<ExprRef> {
        if lhs.width() != rhs.width() {
            return Err(ExprError::WidthMismatch {
                context: "add",
                lhs: lhs.width(),
                rhs: rhs.width(),
            });
        }
        let width = lhs.width();
        Ok(Arc::new(Expr {
            kind: ExprKind::Add { lhs, rhs },
            width,
        }))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    /// Bit-width of this expression.
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ExprKind::Constant(_))
    }

    /// The literal value of a constant node, `None` otherwise.
    pub fn as_constant(&self) -> Option<u64> {
        match self.kind {
            ExprKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// Canonical identity of a shared node, used as a visited-set key.
    pub fn id(this: &ExprRef) -> usize {
        Arc::as_ptr(this) as usize
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Constant(value) => write!(f, "Const({:#x}, w{})", value, self.width),
            ExprKind::Read { updates, index } => {
                write!(f, "Read({}, {:?})", updates.root().name(), index)
            }
            ExprKind::Extract { src, bit_offset } => {
                write!(f, "Extract({:?}, {}, w{})", src, bit_offset, self.width)
            }
            ExprKind::ZExt { src } => write!(f, "ZExt({:?}, w{})", src, self.width),
            ExprKind::Eq { lhs, rhs } => write!(f, "Eq({:?}, {:?})", lhs, rhs),
            ExprKind::Add { lhs, rhs } => write!(f, "Add({:?}, {:?})", lhs, rhs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArrayCache, BYTE_WIDTH, INDEX_WIDTH};

    #[test]
    fn test_constant_width_and_value() {
        let c = Expr::constant(42, INDEX_WIDTH).unwrap();
        assert_eq!(c.width(), 32);
        assert_eq!(c.as_constant(), Some(42));
        assert!(c.is_constant());
    }

    #[test]
    fn test_constant_overflow() {
        let err = Expr::constant(0x100, BYTE_WIDTH).unwrap_err();
        assert!(matches!(err, ExprError::ConstantOverflow { .. }));
        // 64-bit constants take any value.
        assert!(Expr::constant(u64::MAX, 64).is_ok());
    }

    #[test]
    fn test_constant_false_is_bool_zero() {
        let f = Expr::constant_false();
        assert_eq!(f.width(), BOOL_WIDTH);
        assert_eq!(f.as_constant(), Some(0));
    }

    #[test]
    fn test_read_width_is_cell_width() {
        let mut cache = ArrayCache::new();
        let a = cache.symbolic("mem", 8).unwrap();
        let read = Expr::read(
            UpdateList::new(a),
            Expr::constant(3, INDEX_WIDTH).unwrap(),
        )
        .unwrap();
        assert_eq!(read.width(), BYTE_WIDTH);
    }

    #[test]
    fn test_read_rejects_narrow_index() {
        let mut cache = ArrayCache::new();
        let a = cache.symbolic("mem", 8).unwrap();
        let err = Expr::read(UpdateList::new(a), Expr::constant(3, 8).unwrap()).unwrap_err();
        assert!(matches!(err, ExprError::WidthMismatch { .. }));
    }

    #[test]
    fn test_extract_bounds() {
        let c = Expr::constant(0xdead_beef, INDEX_WIDTH).unwrap();
        let byte = Expr::extract(Arc::clone(&c), 8, 8).unwrap();
        assert_eq!(byte.width(), 8);

        let err = Expr::extract(Arc::clone(&c), 28, 8).unwrap_err();
        assert!(matches!(err, ExprError::ExtractOutOfRange { .. }));
        let err = Expr::extract(c, u32::MAX, 8).unwrap_err();
        assert!(matches!(err, ExprError::ExtractOutOfRange { .. }));
    }

    #[test]
    fn test_zero_extend_widens_only() {
        let byte = Expr::constant(0xff, BYTE_WIDTH).unwrap();
        let wide = Expr::zero_extend(Arc::clone(&byte), INDEX_WIDTH).unwrap();
        assert_eq!(wide.width(), INDEX_WIDTH);

        let err = Expr::zero_extend(wide, BYTE_WIDTH).unwrap_err();
        assert!(matches!(err, ExprError::WidthMismatch { .. }));
    }

    #[test]
    fn test_eq_requires_matching_widths() {
        let a = Expr::constant(1, 32).unwrap();
        let b = Expr::constant(1, 8).unwrap();
        let err = Expr::eq(a, b).unwrap_err();
        assert!(matches!(err, ExprError::WidthMismatch { context: "eq", .. }));
    }

    #[test]
    fn test_eq_is_boolean() {
        let a = Expr::constant(1, 32).unwrap();
        let b = Expr::constant(2, 32).unwrap();
        let eq = Expr::eq(a, b).unwrap();
        assert_eq!(eq.width(), BOOL_WIDTH);
    }

    #[test]
    fn test_node_identity() {
        let shared = Expr::constant(7, 32).unwrap();
        let also_shared = Arc::clone(&shared);
        let structural_twin = Expr::constant(7, 32).unwrap();

        assert_eq!(Expr::id(&shared), Expr::id(&also_shared));
        assert_ne!(Expr::id(&shared), Expr::id(&structural_twin));
    }
}

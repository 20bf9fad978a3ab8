// SPDX-License-Identifier: AGPL-3.0

//! Arrays, the array factory, and persistent update logs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use concolic_exceptions::{ExprError, ExprResult};

use crate::{ExprRef, BYTE_WIDTH, INDEX_WIDTH};

/// A named, fixed-size byte array.
///
/// Symbolic arrays have unknown contents chosen by the solver; constant
/// arrays carry their initial bytes and are never solved for. Identity is by
/// name: the same name across queries denotes the same logical object.
pub struct Array {
    name: String,
    size: u32,
    domain: u32,
    range: u32,
    constant_values: Option<Vec<u8>>,
}

/// Shared handle to an array.
pub type ArrayRef = Arc<Array>;

impl Array {
    fn symbolic(name: String, size: u32, domain: u32, range: u32) -> Self {
        Self {
            name,
            size,
            domain,
            range,
            constant_values: None,
        }
    }

    fn constant(name: String, values: Vec<u8>) -> Self {
        Self {
            name,
            size: values.len() as u32,
            domain: INDEX_WIDTH,
            range: BYTE_WIDTH,
            constant_values: Some(values),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Bit-width of index expressions into this array.
    pub fn domain(&self) -> u32 {
        self.domain
    }

    /// Bit-width of a stored cell.
    pub fn range(&self) -> u32 {
        self.range
    }

    pub fn is_symbolic(&self) -> bool {
        self.constant_values.is_none()
    }

    pub fn is_constant(&self) -> bool {
        self.constant_values.is_some()
    }

    /// Initial bytes of a constant array, `None` for symbolic arrays.
    pub fn constant_values(&self) -> Option<&[u8]> {
        self.constant_values.as_deref()
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_symbolic() { "sym" } else { "const" };
        write!(f, "Array({}, {} bytes, {})", self.name, self.size, kind)
    }
}

/// Append-only factory for arrays, keyed by name.
///
/// Requesting an existing name with the identical shape yields the cached
/// instance; a conflicting shape is a caller error. A minted array is never
/// mutated or replaced.
#[derive(Default)]
pub struct ArrayCache {
    arrays: HashMap<String, ArrayRef>,
}

impl ArrayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint (or re-fetch) a symbolic array of `size` cells with the default
    /// 32-bit index domain and byte-wide cells.
    pub fn symbolic(&mut self, name: &str, size: u32) -> ExprResult<ArrayRef> {
        self.symbolic_with_widths(name, size, INDEX_WIDTH, BYTE_WIDTH)
    }

    /// Mint (or re-fetch) a symbolic array with explicit index/value widths.
    pub fn symbolic_with_widths(
        &mut self,
        name: &str,
        size: u32,
        domain: u32,
        range: u32,
    ) -> ExprResult<ArrayRef> {
        if let Some(existing) = self.arrays.get(name) {
            if existing.is_symbolic()
                && existing.size() == size
                && existing.domain() == domain
                && existing.range() == range
            {
                return Ok(Arc::clone(existing));
            }
            return Err(ExprError::ArrayRedefined {
                name: name.to_string(),
            });
        }
        let array = Arc::new(Array::symbolic(name.to_string(), size, domain, range));
        self.arrays.insert(name.to_string(), Arc::clone(&array));
        Ok(array)
    }

    /// Mint (or re-fetch) a constant array with fixed initial bytes.
    pub fn constant(&mut self, name: &str, values: Vec<u8>) -> ExprResult<ArrayRef> {
        if let Some(existing) = self.arrays.get(name) {
            if existing.constant_values() == Some(values.as_slice()) {
                return Ok(Arc::clone(existing));
            }
            return Err(ExprError::ArrayRedefined {
                name: name.to_string(),
            });
        }
        let array = Arc::new(Array::constant(name.to_string(), values));
        self.arrays.insert(name.to_string(), Arc::clone(&array));
        Ok(array)
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

/// One logged write: (index, value), linked to the rest of the history.
#[derive(Debug)]
pub struct UpdateNode {
    index: ExprRef,
    value: ExprRef,
    next: Option<Arc<UpdateNode>>,
}

impl UpdateNode {
    pub fn index(&self) -> &ExprRef {
        &self.index
    }

    pub fn value(&self) -> &ExprRef {
        &self.value
    }
}

/// Persistent write log layered on top of a root array.
///
/// `write` returns a new list whose head is the new write and whose tail is
/// shared with the original; iteration proceeds most-recent-first.
#[derive(Debug, Clone)]
pub struct UpdateList {
    root: ArrayRef,
    head: Option<Arc<UpdateNode>>,
}

impl UpdateList {
    /// An empty log over `root`.
    pub fn new(root: ArrayRef) -> Self {
        Self { root, head: None }
    }

    pub fn root(&self) -> &ArrayRef {
        &self.root
    }

    /// Layer one write on top of this log.
    pub fn write(&self, index: ExprRef, value: ExprRef) -> ExprResult<UpdateList> {
        if index.width() != self.root.domain() {
            return Err(ExprError::WidthMismatch {
                context: "update index",
                lhs: index.width(),
                rhs: self.root.domain(),
            });
        }
        if value.width() != self.root.range() {
            return Err(ExprError::WidthMismatch {
                context: "update value",
                lhs: value.width(),
                rhs: self.root.range(),
            });
        }
        Ok(UpdateList {
            root: Arc::clone(&self.root),
            head: Some(Arc::new(UpdateNode {
                index,
                value,
                next: self.head.clone(),
            })),
        })
    }

    /// Iterate writes, most recent first.
    pub fn iter(&self) -> Updates<'_> {
        Updates {
            node: self.head.as_deref(),
        }
    }

    /// Number of logged writes.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

/// Iterator over an update log, most recent write first.
pub struct Updates<'a> {
    node: Option<&'a UpdateNode>,
}

impl<'a> Iterator for Updates<'a> {
    type Item = &'a UpdateNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node?;
        self.node = node.next.as_deref();
        Some(node)
    }
}

// SPDX-License-Identifier: AGPL-3.0

//! Offline array dumper.
//!
//! Inspects a constraint set, discovers every referenced array, and persists
//! sizes (and, for constant arrays, raw contents) to disk for post-mortem
//! inspection. The registry is an owned object with an explicit lifecycle;
//! repeat sightings of a known array name are checked for consistency, since
//! the same logical name reused with different shape or contents means the
//! producing run is corrupt.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use tracing::{debug, warn};

use concolic_exceptions::{DumpError, DumpResult};
use concolic_expr::{ArrayRef, ConstraintSet, Expr, ExprKind, ExprRef};

/// Discover every array (symbolic and constant) referenced by `constraints`,
/// in first-discovery order, de-duplicated by name. Update-log index and
/// value expressions are traversed as well.
pub fn collect_arrays(constraints: &ConstraintSet) -> Vec<ArrayRef> {
    let mut finder = ArrayFinder::default();
    for constraint in constraints {
        finder.visit(constraint);
    }
    finder.arrays.into_values().collect()
}

#[derive(Default)]
struct ArrayFinder {
    visited: HashSet<usize>,
    arrays: IndexMap<String, ArrayRef>,
}

impl ArrayFinder {
    fn visit(&mut self, expr: &ExprRef) {
        if !self.visited.insert(Expr::id(expr)) {
            return;
        }
        match expr.kind() {
            ExprKind::Constant(_) => {}
            ExprKind::Read { updates, index } => {
                for update in updates.iter() {
                    self.visit(update.index());
                    self.visit(update.value());
                }
                let root = updates.root();
                if !self.arrays.contains_key(root.name()) {
                    self.arrays
                        .insert(root.name().to_string(), ArrayRef::clone(root));
                }
                self.visit(index);
            }
            ExprKind::Extract { src, .. } | ExprKind::ZExt { src } => self.visit(src),
            ExprKind::Eq { lhs, rhs } | ExprKind::Add { lhs, rhs } => {
                self.visit(lhs);
                self.visit(rhs);
            }
        }
    }
}

/// Persists array sizes and constant contents under a per-run directory:
/// `<run_dir>/array-sizes/<name>` holds the maximum observed size as plain
/// text, `<run_dir>/arrays/<name>` the raw bytes of constant arrays.
pub struct ArrayDumper {
    arrays_dir: PathBuf,
    sizes_dir: PathBuf,
    constant_arrays: HashMap<String, Vec<u8>>,
    array_lengths: HashMap<String, u32>,
}

impl ArrayDumper {
    /// Create the output directories under `run_dir` and an empty registry.
    pub fn new(run_dir: impl AsRef<Path>) -> DumpResult<Self> {
        let run_dir = run_dir.as_ref();
        let arrays_dir = run_dir.join("arrays");
        let sizes_dir = run_dir.join("array-sizes");
        fs::create_dir_all(&arrays_dir)?;
        fs::create_dir_all(&sizes_dir)?;
        Ok(Self {
            arrays_dir,
            sizes_dir,
            constant_arrays: HashMap::new(),
            array_lengths: HashMap::new(),
        })
    }

    /// Discover and persist every array referenced by `constraints`.
    pub fn dump(&mut self, constraints: &ConstraintSet) -> DumpResult<()> {
        for array in collect_arrays(constraints) {
            let name = array.name();
            check_name(name)?;

            if self.array_lengths.contains_key(name) {
                // Known name: re-validate before updating the size record.
                if let Some(values) = array.constant_values() {
                    self.check_constant_contents(name, values)?;
                }
                self.update_size(&array)?;
                continue;
            }

            self.update_size(&array)?;

            if let Some(values) = array.constant_values() {
                warn!(name, size = array.size(), "found constant array");
                self.constant_arrays
                    .insert(name.to_string(), values.to_vec());
                fs::write(self.arrays_dir.join(name), values)?;
            } else {
                warn!(name, size = array.size(), "found symbolic array");
            }
        }
        Ok(())
    }

    /// Maximum size observed so far for `name`, if any.
    pub fn recorded_size(&self, name: &str) -> Option<u32> {
        self.array_lengths.get(name).copied()
    }

    fn check_constant_contents(&self, name: &str, values: &[u8]) -> DumpResult<()> {
        let recorded = match self.constant_arrays.get(name) {
            Some(recorded) => recorded,
            // A known name without cached contents was first seen as a
            // symbolic array; the same logical name cannot change kind.
            None => {
                return Err(DumpError::Reclassified {
                    name: name.to_string(),
                })
            }
        };
        if let Some(offset) = first_mismatch(recorded, values) {
            return Err(DumpError::ContentChanged {
                name: name.to_string(),
                offset,
            });
        }
        Ok(())
    }

    fn update_size(&mut self, array: &ArrayRef) -> DumpResult<()> {
        let name = array.name();
        match self.array_lengths.get(name) {
            Some(&recorded) if array.size() < recorded => Err(DumpError::SizeShrunk {
                name: name.to_string(),
                recorded,
                observed: array.size(),
            }),
            Some(&recorded) if array.size() == recorded => Ok(()),
            _ => {
                debug!(name, size = array.size(), "recording array size");
                self.array_lengths.insert(name.to_string(), array.size());
                fs::write(self.sizes_dir.join(name), format!("{}\n", array.size()))?;
                Ok(())
            }
        }
    }
}

/// Array names become file names under the run directory; anything that is
/// not a single plain path component is rejected.
fn check_name(name: &str) -> DumpResult<()> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if plain {
        Ok(())
    } else {
        Err(DumpError::InvalidName {
            name: name.to_string(),
        })
    }
}

fn first_mismatch(recorded: &[u8], observed: &[u8]) -> Option<usize> {
    if recorded.len() != observed.len() {
        return Some(recorded.len().min(observed.len()));
    }
    recorded
        .iter()
        .zip(observed)
        .position(|(a, b)| a != b)
}

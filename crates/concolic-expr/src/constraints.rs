// SPDX-License-Identifier: AGPL-3.0

//! Constraint sets and solver queries.

use crate::ExprRef;

/// An insertion-ordered collection of boolean constraints.
///
/// Sets are extended by cloning; a set held by a caller is never mutated
/// behind its back.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    constraints: Vec<ExprRef>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, constraint: ExprRef) {
        self.constraints.push(constraint);
    }

    /// A copy of this set with `extra` appended.
    pub fn with(&self, extra: impl IntoIterator<Item = ExprRef>) -> Self {
        let mut copy = self.clone();
        copy.constraints.extend(extra);
        copy
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExprRef> {
        self.constraints.iter()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

impl<'a> IntoIterator for &'a ConstraintSet {
    type Item = &'a ExprRef;
    type IntoIter = std::slice::Iter<'a, ExprRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.constraints.iter()
    }
}

impl FromIterator<ExprRef> for ConstraintSet {
    fn from_iter<I: IntoIterator<Item = ExprRef>>(iter: I) -> Self {
        Self {
            constraints: iter.into_iter().collect(),
        }
    }
}

/// An immutable (constraints, goal expression) pair submitted to a solver.
#[derive(Debug, Clone)]
pub struct Query {
    pub constraints: ConstraintSet,
    pub expr: ExprRef,
}

impl Query {
    pub fn new(constraints: ConstraintSet, expr: ExprRef) -> Self {
        Self { constraints, expr }
    }
}

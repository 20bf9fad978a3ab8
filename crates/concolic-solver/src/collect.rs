// SPDX-License-Identifier: AGPL-3.0

//! Traversal passes over a query's expression DAG.
//!
//! Both collectors memoize on node identity: shared sub-expressions are
//! visited once, so traversal is linear in the number of distinct nodes and
//! each result appears once no matter how many reads reference it.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

use concolic_expr::{ArrayRef, Expr, ExprKind, ExprRef, Query};

/// Collect the distinct symbolic offset expressions used by any array read
/// in `query`, including offsets logged in each read's write history.
/// First-discovery order; constant offsets are not collected.
pub fn collect_indices(query: &Query) -> Vec<ExprRef> {
    let mut collector = IndexCollector::default();
    collector.visit(&query.expr);
    for constraint in &query.constraints {
        collector.visit(constraint);
    }
    collector.indices
}

/// Collect the symbolic arrays transitively referenced by `query`, in
/// first-discovery order, de-duplicated by name. Update-log index and value
/// expressions are traversed as well, so arrays reachable only through write
/// history are found.
pub fn collect_symbolic_arrays(query: &Query) -> Vec<ArrayRef> {
    let mut collector = ObjectCollector::default();
    collector.visit(&query.expr);
    for constraint in &query.constraints {
        collector.visit(constraint);
    }
    collector.objects.into_values().collect()
}

#[derive(Default)]
struct IndexCollector {
    visited: HashSet<usize>,
    recorded: HashSet<usize>,
    indices: Vec<ExprRef>,
}

impl IndexCollector {
    fn visit(&mut self, expr: &ExprRef) {
        if !self.visited.insert(Expr::id(expr)) {
            return;
        }
        match expr.kind() {
            ExprKind::Constant(_) => {}
            ExprKind::Read { updates, index } => {
                self.record(index);
                for update in updates.iter() {
                    self.record(update.index());
                }
                self.visit(index);
                for update in updates.iter() {
                    self.visit(update.index());
                    self.visit(update.value());
                }
            }
            ExprKind::Extract { src, .. } | ExprKind::ZExt { src } => self.visit(src),
            ExprKind::Eq { lhs, rhs } | ExprKind::Add { lhs, rhs } => {
                self.visit(lhs);
                self.visit(rhs);
            }
        }
    }

    fn record(&mut self, index: &ExprRef) {
        if index.is_constant() {
            return;
        }
        if self.recorded.insert(Expr::id(index)) {
            self.indices.push(Arc::clone(index));
        }
    }
}

#[derive(Default)]
struct ObjectCollector {
    visited: HashSet<usize>,
    objects: IndexMap<String, ArrayRef>,
}

impl ObjectCollector {
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
                if root.is_symbolic() && !self.objects.contains_key(root.name()) {
                    self.objects
                        .insert(root.name().to_string(), Arc::clone(root));
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

#[cfg(test)]
mod tests {
    use super::*;
    use concolic_expr::{ArrayCache, ConstraintSet, UpdateList, BYTE_WIDTH, INDEX_WIDTH};

    fn query_of(constraints: Vec<ExprRef>, expr: ExprRef) -> Query {
        Query::new(constraints.into_iter().collect::<ConstraintSet>(), expr)
    }

    #[test]
    fn test_collects_shared_read_offset_once() {
        let mut cache = ArrayCache::new();
        let data = cache.symbolic("data", 16).unwrap();

        // Non-constant 32-bit offset node shared by two reads.
        let base = Expr::add(
            Expr::constant(0, INDEX_WIDTH).unwrap(),
            Expr::constant(1, INDEX_WIDTH).unwrap(),
        )
        .unwrap();

        // Two reads sharing one offset node.
        let read_a = Expr::read(UpdateList::new(data.clone()), base.clone()).unwrap();
        let read_b = Expr::read(UpdateList::new(data), base.clone()).unwrap();
        let goal = Expr::eq(read_a, read_b).unwrap();

        let indices = collect_indices(&query_of(vec![], goal));
        assert_eq!(indices.len(), 1);
        assert_eq!(Expr::id(&indices[0]), Expr::id(&base));
    }

    #[test]
    fn test_constant_offsets_are_skipped() {
        let mut cache = ArrayCache::new();
        let data = cache.symbolic("data", 16).unwrap();
        let read = Expr::read(
            UpdateList::new(data),
            Expr::constant(3, INDEX_WIDTH).unwrap(),
        )
        .unwrap();
        let goal = Expr::eq(read, Expr::constant(0, BYTE_WIDTH).unwrap()).unwrap();

        assert!(collect_indices(&query_of(vec![], goal)).is_empty());
    }

    #[test]
    fn test_update_log_offsets_are_collected() {
        let mut cache = ArrayCache::new();
        let data = cache.symbolic("data", 16).unwrap();

        let logged_index = Expr::add(
            Expr::constant(2, INDEX_WIDTH).unwrap(),
            Expr::constant(3, INDEX_WIDTH).unwrap(),
        )
        .unwrap();
        let log = UpdateList::new(data)
            .write(logged_index.clone(), Expr::constant(9, BYTE_WIDTH).unwrap())
            .unwrap();
        let read = Expr::read(log, Expr::constant(0, INDEX_WIDTH).unwrap()).unwrap();
        let goal = Expr::eq(read, Expr::constant(9, BYTE_WIDTH).unwrap()).unwrap();

        let indices = collect_indices(&query_of(vec![], goal));
        assert_eq!(indices.len(), 1);
        assert_eq!(Expr::id(&indices[0]), Expr::id(&logged_index));
    }

    #[test]
    fn test_goal_visited_before_constraints() {
        let mut cache = ArrayCache::new();
        let data = cache.symbolic("data", 16).unwrap();

        let goal_idx = Expr::add(
            Expr::constant(1, INDEX_WIDTH).unwrap(),
            Expr::constant(0, INDEX_WIDTH).unwrap(),
        )
        .unwrap();
        let constraint_idx = Expr::add(
            Expr::constant(2, INDEX_WIDTH).unwrap(),
            Expr::constant(0, INDEX_WIDTH).unwrap(),
        )
        .unwrap();

        let goal = Expr::eq(
            Expr::read(UpdateList::new(data.clone()), goal_idx.clone()).unwrap(),
            Expr::constant(0, BYTE_WIDTH).unwrap(),
        )
        .unwrap();
        let constraint = Expr::eq(
            Expr::read(UpdateList::new(data), constraint_idx.clone()).unwrap(),
            Expr::constant(0, BYTE_WIDTH).unwrap(),
        )
        .unwrap();

        let indices = collect_indices(&query_of(vec![constraint], goal));
        assert_eq!(indices.len(), 2);
        assert_eq!(Expr::id(&indices[0]), Expr::id(&goal_idx));
        assert_eq!(Expr::id(&indices[1]), Expr::id(&constraint_idx));
    }

    #[test]
    fn test_symbolic_arrays_found_in_discovery_order() {
        let mut cache = ArrayCache::new();
        let first = cache.symbolic("first", 4).unwrap();
        let second = cache.symbolic("second", 4).unwrap();
        let fixed = cache.constant("fixed", vec![1, 2, 3, 4]).unwrap();

        let read = |array: &ArrayRef, at: u64| {
            Expr::read(
                UpdateList::new(array.clone()),
                Expr::constant(at, INDEX_WIDTH).unwrap(),
            )
            .unwrap()
        };

        let goal = Expr::eq(read(&first, 0), read(&second, 1)).unwrap();
        let constraint = Expr::eq(read(&fixed, 2), read(&first, 3)).unwrap();

        let objects = collect_symbolic_arrays(&query_of(vec![constraint], goal));
        let names: Vec<&str> = objects.iter().map(|a| a.name()).collect();
        // Constant arrays are excluded; `first` appears once.
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_arrays_reachable_only_through_write_values() {
        let mut cache = ArrayCache::new();
        let data = cache.symbolic("data", 8).unwrap();
        let hidden = cache.symbolic("hidden", 8).unwrap();

        let written_value = Expr::read(
            UpdateList::new(hidden),
            Expr::constant(0, INDEX_WIDTH).unwrap(),
        )
        .unwrap();
        let log = UpdateList::new(data)
            .write(Expr::constant(1, INDEX_WIDTH).unwrap(), written_value)
            .unwrap();
        let read = Expr::read(log, Expr::constant(1, INDEX_WIDTH).unwrap()).unwrap();
        let goal = Expr::eq(read, Expr::constant(0, BYTE_WIDTH).unwrap()).unwrap();

        let names: Vec<String> = collect_symbolic_arrays(&query_of(vec![], goal))
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        assert!(names.contains(&"hidden".to_string()));
        assert!(names.contains(&"data".to_string()));
    }

    #[test]
    fn test_shared_subtrees_visited_once() {
        // A wide, heavily shared DAG: without identity memoization this
        // would blow up exponentially.
        let mut node = Expr::add(
            Expr::constant(1, INDEX_WIDTH).unwrap(),
            Expr::constant(2, INDEX_WIDTH).unwrap(),
        )
        .unwrap();
        for _ in 0..64 {
            node = Expr::add(node.clone(), node).unwrap();
        }
        let goal = Expr::eq(node.clone(), node).unwrap();
        assert!(collect_indices(&query_of(vec![], goal)).is_empty());
    }
}

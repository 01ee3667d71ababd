//! Property Tests for the Update Flush
//!
//! Random graphs, cycles included, checked against a plain breadth-first
//! reachability over the relations that allow flushing.

use std::collections::{HashSet, VecDeque};

use proptest::prelude::*;

use depsgraph_core::graph::{Graph, GraphContext, UpdateSource};
use depsgraph_core::id::{IdType, OriginalId};
use depsgraph_core::node::{NodeHandle, NodeType, OperationCode, OperationIndex};
use depsgraph_core::relation::RelationFlag;

#[derive(Debug, Clone)]
struct Edge {
    from: usize,
    to: usize,
    flag: RelationFlag,
}

fn edge_flag() -> impl Strategy<Value = RelationFlag> {
    prop_oneof![
        6 => Just(RelationFlag::empty()),
        1 => Just(RelationFlag::NO_FLUSH),
        1 => Just(RelationFlag::FLUSH_USER_EDIT_ONLY),
        1 => Just(RelationFlag::GODMODE),
    ]
}

fn scenario() -> impl Strategy<Value = (usize, Vec<Edge>, Vec<usize>, bool)> {
    (1usize..40).prop_flat_map(|count| {
        let edges = prop::collection::vec(
            (0..count, 0..count, edge_flag()).prop_map(|(from, to, flag)| Edge { from, to, flag }),
            0..count * 3,
        );
        let tags = prop::collection::vec(0..count, 1..4);
        (Just(count), edges, tags, any::<bool>())
    })
}

/// One operation per component, so component-wide tagging does not widen
/// the reachable set.
fn build(count: usize, edges: &[Edge]) -> (Graph, Vec<OperationIndex>) {
    let mut graph = Graph::new(GraphContext::default().with_parallel_reset_grain(4));
    let id = graph.add_id_node(&OriginalId::new(1, IdType::Object, "Random"));
    let ops: Vec<OperationIndex> = (0..count)
        .map(|i| {
            let comp = graph.add_component(id, NodeType::Parameters, &format!("p{i}"));
            graph.add_operation(comp, None, OperationCode::ParametersEval)
        })
        .collect();
    for edge in edges {
        graph.add_operation_relation(ops[edge.from], ops[edge.to], "edge", edge.flag);
    }
    (graph, ops)
}

fn expected_reach(count: usize, edges: &[Edge], tags: &[usize], user_edit: bool) -> HashSet<usize> {
    let mut adjacency = vec![Vec::new(); count];
    for edge in edges {
        if edge.flag.contains(RelationFlag::NO_FLUSH) {
            continue;
        }
        if edge.flag.contains(RelationFlag::FLUSH_USER_EDIT_ONLY) && !user_edit {
            continue;
        }
        adjacency[edge.from].push(edge.to);
    }
    let mut reached: HashSet<usize> = tags.iter().copied().collect();
    let mut queue: VecDeque<usize> = reached.iter().copied().collect();
    while let Some(node) = queue.pop_front() {
        for &next in &adjacency[node] {
            if reached.insert(next) {
                queue.push_back(next);
            }
        }
    }
    reached
}

proptest! {
    #[test]
    fn flush_tags_exactly_the_reachable_operations((count, edges, tags, user_edit) in scenario()) {
        let (mut graph, ops) = build(count, &edges);
        let source = if user_edit { UpdateSource::UserEdit } else { UpdateSource::Relations };
        for &tag in &tags {
            graph.tag_operation(ops[tag], source);
        }

        let mut visits = Vec::new();
        let summary = graph.flush_updates_with(|op| visits.push(op.index()));

        let expected = expected_reach(count, &edges, &tags, user_edit);
        let tagged: HashSet<usize> = (0..count)
            .filter(|&i| graph.operation(ops[i]).needs_update())
            .collect();
        prop_assert_eq!(&tagged, &expected);

        let unique: HashSet<usize> = visits.iter().copied().collect();
        prop_assert_eq!(unique.len(), visits.len());
        prop_assert_eq!(unique, expected);
        prop_assert_eq!(summary.operations_visited, visits.len());
        prop_assert_eq!(graph.entry_tags().count(), 0);
    }

    #[test]
    fn cycle_flags_leave_an_acyclic_remainder((count, edges, _tags, _user_edit) in scenario()) {
        let (mut graph, ops) = build(count, &edges);
        graph.finalize_build();

        // Kahn's algorithm over the non-cyclic relations must consume every
        // operation.
        let mut in_degree = vec![0usize; count];
        let mut adjacency = vec![Vec::new(); count];
        for (_, relation) in graph.relations() {
            if relation.is_cyclic() {
                continue;
            }
            let (Some(from), Some(to)) = (position(&ops, relation.from()), position(&ops, relation.to())) else {
                continue;
            };
            adjacency[from].push(to);
            in_degree[to] += 1;
        }
        let mut ready: Vec<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
        let mut consumed = 0;
        while let Some(node) = ready.pop() {
            consumed += 1;
            for &next in &adjacency[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(next);
                }
            }
        }
        prop_assert_eq!(consumed, count);
    }
}

fn position(ops: &[OperationIndex], handle: NodeHandle) -> Option<usize> {
    match handle {
        NodeHandle::Operation(op) => ops.iter().position(|candidate| *candidate == op),
        NodeHandle::TimeSource => None,
    }
}

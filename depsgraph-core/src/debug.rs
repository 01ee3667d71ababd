//! Diagnostics
//!
//! Graphviz export and counters for inspecting a built graph. Nothing here
//! is needed for evaluation.

use std::fmt::Write;

use serde::Serialize;

use crate::graph::Graph;
use crate::node::{Node, NodeHandle};
use crate::relation::{Relation, RelationFlag};

/// Size counters of a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub id_nodes: usize,
    pub components: usize,
    pub operations: usize,
    pub relations: usize,
    /// Relations leaving the time source.
    pub time_source_relations: usize,
    pub cyclic_relations: usize,
    pub operations_needing_update: usize,
}

impl GraphStats {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub fn stats(graph: &Graph) -> GraphStats {
    GraphStats {
        id_nodes: graph.id_node_count(),
        components: graph.component_count(),
        operations: graph.operation_count(),
        relations: graph.relation_count(),
        time_source_relations: graph.time_source().outlinks().len(),
        cyclic_relations: graph.relations().filter(|(_, rel)| rel.is_cyclic()).count(),
        operations_needing_update: graph.operations().filter(|(_, op)| op.needs_update()).count(),
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn node_id(handle: NodeHandle) -> String {
    match handle {
        NodeHandle::TimeSource => "time_source".to_owned(),
        NodeHandle::Operation(op) => format!("op_{}", op.index()),
    }
}

fn relation_color(relation: &Relation) -> &'static str {
    if relation.flag().contains(RelationFlag::CYCLIC) {
        "red4"
    } else if relation.flag().contains(RelationFlag::GODMODE) {
        "blue4"
    } else {
        "black"
    }
}

/// Render the graph in Graphviz `dot` syntax: one cluster per ID, nested
/// clusters per component, and one edge per relation.
pub fn to_graphviz(graph: &Graph, label: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph depgraph {{");
    let _ = writeln!(out, "  rankdir = LR;");
    let _ = writeln!(out, "  compound = true;");
    let _ = writeln!(out, "  labelloc = \"t\";");
    let _ = writeln!(out, "  fontname = \"helvetica\";");
    let _ = writeln!(out, "  label = \"{}\";", escape(label));
    let _ = writeln!(out, "  node [shape = box, style = \"rounded,filled\", fontname = \"helvetica\"];");

    let _ = writeln!(
        out,
        "  {} [label = \"{}\", shape = ellipse, fillcolor = \"khaki1\"];",
        node_id(NodeHandle::TimeSource),
        escape(graph.time_source().name())
    );

    for (id_index, id_node) in graph.id_nodes() {
        let _ = writeln!(out, "  subgraph \"cluster_id_{}\" {{", id_index.index());
        let _ = writeln!(out, "    label = \"{}\";", escape(&id_node.identifier()));
        let _ = writeln!(out, "    style = filled;");
        let _ = writeln!(out, "    fillcolor = \"lightgrey\";");
        for component_index in id_node.components() {
            let component = graph.component(component_index);
            let _ = writeln!(out, "    subgraph \"cluster_component_{}\" {{", component_index.index());
            let _ = writeln!(out, "      label = \"{}\";", escape(&component.identifier()));
            let _ = writeln!(out, "      fillcolor = \"white\";");
            for op_index in component.operations() {
                let op = graph.operation(op_index);
                let fill = if op.needs_update() { "lightcoral" } else { "gainsboro" };
                let _ = writeln!(
                    out,
                    "      {} [label = \"{}\", fillcolor = \"{}\"];",
                    node_id(op_index.into()),
                    escape(&op.identifier()),
                    fill
                );
            }
            let _ = writeln!(out, "    }}");
        }
        let _ = writeln!(out, "  }}");
    }

    for (_, relation) in graph.relations() {
        let style = if relation.flag().contains(RelationFlag::NO_FLUSH) {
            "dashed"
        } else {
            "solid"
        };
        let _ = writeln!(
            out,
            "  {} -> {} [label = \"{}\", color = {}, style = {}];",
            node_id(relation.from()),
            node_id(relation.to()),
            escape(relation.name()),
            relation_color(relation),
            style
        );
    }

    let _ = writeln!(out, "}}");
    out
}

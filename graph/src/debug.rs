// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Consistency checking, statistics and visualization of a built graph.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use fixedbitset::FixedBitSet;
use petgraph::dot;
use petgraph::visit::NodeIndexable;
use petgraph::Direction;

use crate::graph::Graph;
use crate::node::{LinkNode, NodeId};

/// Simple graph statistics.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    /// Number of outer nodes: IDs plus components.
    pub outer_nodes: usize,
    pub operations: usize,
    pub relations: usize,
}

pub fn stats_simple(graph: &Graph) -> Stats {
    let mut outer_nodes = 0;
    let mut relations = 0;
    for id_node in &graph.id_nodes {
        outer_nodes += 1;
        for &comp_id in id_node.components.values() {
            outer_nodes += 1;
            for &node in &graph.component(comp_id).operations {
                relations += graph
                    .pg
                    .edges_directed(node, Direction::Incoming)
                    .count();
            }
        }
    }
    relations += graph
        .pg
        .edges_directed(graph.time_source, Direction::Incoming)
        .count();

    Stats {
        outer_nodes,
        operations: graph.operations.len(),
        relations,
    }
}

/// Full identifier of one operation, including its owners.
pub fn operation_full_identifier(graph: &Graph, node: NodeId) -> String {
    let op_node = graph.operation(node);
    let comp = graph.component(op_node.owner);
    let owner_name = match graph.id_node(comp.owner) {
        Some(id_node) => id_node.name.clone(),
        None => "<unowned>".to_owned(),
    };
    if comp.node_type == crate::node::NodeType::Bone || !comp.name.is_empty() {
        format!("{}/{}/{}", owner_name, comp.name, op_node.identifier())
    } else {
        format!("{}/{}", owner_name, op_node.identifier())
    }
}

///
/// Validate the internal consistency of the graph: each operation appears in
/// the scheduler list exactly once, and the stamped valency of every
/// operation matches a recount of its operation-class inlinks.
///
pub fn consistency_check(graph: &Graph) -> bool {
    // Operations list must not contain duplicates.
    let mut seen = FixedBitSet::with_capacity(graph.pg.node_bound());
    for &node in &graph.operations {
        if seen.contains(node.index()) {
            log::error!(
                "Node {} is twice in the operations!",
                operation_full_identifier(graph, node)
            );
            return false;
        }
        seen.insert(node.index());
    }

    // Validate node valency calculated in both directions.
    for &node in &graph.operations {
        let num_links_pending = graph
            .pg
            .neighbors_directed(node, Direction::Incoming)
            .filter(|&from| graph.pg[from].as_operation().is_some())
            .count() as u32;
        let stamped = graph.operation(node).num_links_pending;
        if stamped != num_links_pending {
            log::error!(
                "Valency mismatch: {}, {} != {}",
                operation_full_identifier(graph, node),
                stamped,
                num_links_pending
            );
            log::error!(
                "Number of inlinks: {}",
                graph
                    .pg
                    .edges_directed(node, Direction::Incoming)
                    .count()
            );
            return false;
        }
    }
    true
}

///
/// Cheap structural comparison of two graphs built for the same scene; used
/// by the relations validator to detect missed tags. A proper graph
/// comparison is NP-complex, so operation counts have to do.
///
pub fn debug_compare(graph_a: &Graph, graph_b: &Graph) -> bool {
    graph_a.operations.len() == graph_b.operations.len()
}

/// Dump the link-level graph in GraphViz format.
pub fn visualize(graph: &Graph, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);

    let labeled = graph.pg.map(
        |node, weight| match weight {
            LinkNode::TimeSource(_) => "Time Source".to_owned(),
            LinkNode::Operation(_) => operation_full_identifier(graph, node),
        },
        |_, _| String::new(),
    );
    write!(
        out,
        "{}",
        dot::Dot::with_config(&labeled, &[dot::Config::EdgeNoLabel])
    )?;
    Ok(())
}

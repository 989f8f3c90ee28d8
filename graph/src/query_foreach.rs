// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Reachability traversals over the operation-level graph: which IDs (or
//! ID/component pairs) depend on a given ID, and which IDs it depends on.

use std::collections::VecDeque;

use bitflags::bitflags;
use fixedbitset::FixedBitSet;
use fnv::FnvHashSet;
use petgraph::visit::{EdgeRef, NodeIndexable};
use petgraph::Direction;

use scene::IdHandle;

use crate::graph::Graph;
use crate::node::{IdNodeId, NodeId, NodeType, ObjectComponent, OpCode};

bitflags! {
    /// Modifiers for the dependent-ID traversals.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ForeachFlag: u32 {
        /// Short-circuit at rigid-body simulation operations, breaking the
        /// false-positive dependencies among all simulated objects.
        const IGNORE_TRANSFORM_SOLVERS = 1 << 0;
    }
}

type TraversalQueue = VecDeque<NodeId>;

fn foreach_needs_visit(graph: &Graph, node: NodeId, flags: ForeachFlag) -> bool {
    if flags.contains(ForeachFlag::IGNORE_TRANSFORM_SOLVERS) {
        if let Some(op_node) = graph.pg[node].as_operation() {
            if op_node.opcode == OpCode::RigidbodySim {
                return false;
            }
        }
    }
    true
}

///
/// Core of the dependent walks: breadth-first over outgoing links, starting
/// from every operation of the target's (non-internal) components. Chains
/// with exactly one outlink are followed inline, without queue churn.
///
fn foreach_dependent_operation(
    graph: &Graph,
    target_id_node: IdNodeId,
    source_component: ObjectComponent,
    flags: ForeachFlag,
    mut callback: impl FnMut(NodeId),
) {
    let Some(id_node) = graph.id_node(target_id_node) else {
        // TODO: Shall we inform or assert here about an attempt to iterate
        // over a non-existing ID?
        return;
    };

    // Start with scheduling all operations of the ID node.
    let mut queue = TraversalQueue::new();
    let mut scheduled = FixedBitSet::with_capacity(graph.pg.node_bound());
    for &comp_id in id_node.components.values() {
        let comp = graph.component(comp_id);
        if comp.node_type == NodeType::Visibility {
            // The visibility component is only used internally; it is not to
            // be reporting dependencies to the outer world.
            continue;
        }
        if source_component != ObjectComponent::Any
            && ObjectComponent::from_node_type(comp.node_type) != source_component
        {
            continue;
        }
        for &node in &comp.operations {
            if !foreach_needs_visit(graph, node, flags) {
                continue;
            }
            queue.push_back(node);
            scheduled.insert(node.index());
        }
    }

    // Process the queue.
    while let Some(first) = queue.pop_front() {
        let mut op_node = first;
        loop {
            callback(op_node);
            // Schedule outgoing operation nodes.
            let outgoing: Vec<NodeId> = graph
                .pg
                .edges_directed(op_node, Direction::Outgoing)
                .map(|edge| edge.target())
                .collect();
            if outgoing.len() == 1 {
                let to_node = outgoing[0];
                if !scheduled.contains(to_node.index())
                    && foreach_needs_visit(graph, to_node, flags)
                {
                    scheduled.insert(to_node.index());
                    op_node = to_node;
                } else {
                    break;
                }
            } else {
                for to_node in outgoing {
                    if !scheduled.contains(to_node.index())
                        && foreach_needs_visit(graph, to_node, flags)
                    {
                        queue.push_front(to_node);
                        scheduled.insert(to_node.index());
                    }
                }
                break;
            }
        }
    }
}

///
/// Invoke the callback for every ID which depends on the given one, once
/// per unique ID and never for the starting ID itself.
///
pub fn foreach_dependent_id(graph: &Graph, id: IdHandle, mut callback: impl FnMut(IdHandle)) {
    let Some(target) = graph.find_id_node(id) else {
        return;
    };
    let mut visited: FnvHashSet<IdNodeId> = FnvHashSet::default();
    foreach_dependent_operation(graph, target, ObjectComponent::Any, ForeachFlag::empty(), |node| {
        let comp = graph.component(graph.operation(node).owner);
        let id_node_id = comp.owner;
        if id_node_id != target && visited.insert(id_node_id) {
            if let Some(id_node) = graph.id_node(id_node_id) {
                callback(id_node.id_orig);
            }
        }
    });
}

///
/// Component-granular variant: reports `(ID, component)` pairs reachable
/// from the matching components of the starting ID.
///
pub fn foreach_dependent_id_component(
    graph: &Graph,
    id: IdHandle,
    source_component: ObjectComponent,
    flags: ForeachFlag,
    mut callback: impl FnMut(IdHandle, ObjectComponent),
) {
    let Some(target) = graph.find_id_node(id) else {
        return;
    };
    let mut visited: FnvHashSet<crate::node::ComponentId> = FnvHashSet::default();
    foreach_dependent_operation(graph, target, source_component, flags, |node| {
        let comp_id = graph.operation(node).owner;
        let comp = graph.component(comp_id);
        if comp.owner != target && visited.insert(comp_id) {
            if comp.node_type == NodeType::Visibility {
                return;
            }
            if let Some(id_node) = graph.id_node(comp.owner) {
                callback(
                    id_node.id_orig,
                    ObjectComponent::from_node_type(comp.node_type),
                );
            }
        }
    });
}

///
/// Invoke the callback for every ID the given one depends on, walking
/// incoming links from all of its operations.
///
pub fn foreach_ancestor_id(graph: &Graph, id: IdHandle, mut callback: impl FnMut(IdHandle)) {
    let Some(target) = graph.find_id_node(id) else {
        return;
    };
    let Some(id_node) = graph.id_node(target) else {
        return;
    };

    // Start with scheduling all operations of the ID node.
    let mut queue = TraversalQueue::new();
    let mut scheduled = FixedBitSet::with_capacity(graph.pg.node_bound());
    for &comp_id in id_node.components.values() {
        for &node in &graph.component(comp_id).operations {
            queue.push_back(node);
            scheduled.insert(node.index());
        }
    }

    let mut visited: FnvHashSet<IdNodeId> = FnvHashSet::default();
    visited.insert(target);

    while let Some(first) = queue.pop_front() {
        let mut op_node = first;
        loop {
            // Inform the callee about the corresponding ID node.
            let comp = graph.component(graph.operation(op_node).owner);
            if visited.insert(comp.owner) {
                if let Some(ancestor) = graph.id_node(comp.owner) {
                    callback(ancestor.id_orig);
                }
            }
            // Schedule incoming operation nodes.
            let incoming: Vec<NodeId> = graph
                .pg
                .edges_directed(op_node, Direction::Incoming)
                .map(|edge| edge.source())
                .filter(|&from| graph.pg[from].as_operation().is_some())
                .collect();
            if incoming.len() == 1 {
                let from_node = incoming[0];
                if !scheduled.contains(from_node.index()) {
                    scheduled.insert(from_node.index());
                    op_node = from_node;
                } else {
                    break;
                }
            } else {
                for from_node in incoming {
                    if !scheduled.contains(from_node.index()) {
                        queue.push_front(from_node);
                        scheduled.insert(from_node.index());
                    }
                }
                break;
            }
        }
    }
}

/// Invoke the callback for every original ID in the graph, in allocation
/// order.
pub fn foreach_id(graph: &Graph, mut callback: impl FnMut(IdHandle)) {
    for id_node in &graph.id_nodes {
        callback(id_node.id_orig);
    }
}

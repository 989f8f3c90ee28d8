// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Propagation of entry tags through the graph: starting from the directly
//! modified operations, walk outgoing relations, mark reachable operations
//! as needing update, accumulate per-ID recalc bits and notify editors.

use std::collections::VecDeque;

use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rayon::prelude::*;
use smallvec::SmallVec;

use scene::{IdRecalcFlag, Main};

use crate::graph::Graph;
use crate::node::{ComponentId, IdNodeId, NodeId, NodeType, OpCode, OpFlag};
use crate::registry::{self, EditorUpdateContext};
use crate::relation::RelationFlag;
use crate::tag::{self, UpdateSource};
use crate::DebugFlag;

const ID_STATE_NONE: u32 = 0;
const ID_STATE_MODIFIED: u32 = 1;

const COMPONENT_STATE_NONE: u32 = 0;
const COMPONENT_STATE_SCHEDULED: u32 = 1;
const COMPONENT_STATE_DONE: u32 = 2;

type FlushQueue = VecDeque<NodeId>;

/// Smallest per-thread slice of the parallel state reset.
const FLUSH_RESET_MIN_TILE: usize = 1024;

fn flush_prepare(graph: &mut Graph) {
    for link_node in graph.pg.node_weights_mut() {
        if let Some(op_node) = link_node.as_operation_mut() {
            op_node.scheduled = false;
        }
    }

    graph
        .id_nodes
        .par_iter_mut()
        .with_min_len(FLUSH_RESET_MIN_TILE)
        .for_each(|id_node| {
            id_node.custom_flags = ID_STATE_NONE;
        });
    graph
        .components
        .par_iter_mut()
        .with_min_len(FLUSH_RESET_MIN_TILE)
        .for_each(|comp_node| {
            comp_node.custom_flags = COMPONENT_STATE_NONE;
        });
}

fn flush_schedule_entrypoints(graph: &mut Graph, queue: &mut FlushQueue) {
    let entry_tags: Vec<NodeId> = graph.entry_tags.iter().copied().collect();
    for node in entry_tags {
        queue.push_back(node);
        graph.operation_mut(node).scheduled = true;
        log::debug!(
            "Operation is entry point for update: {}",
            graph.operation(node).identifier()
        );
    }
}

///
/// A tagged time source pre-tags every operation it feeds, so that frame
/// changes enter the flush through the ordinary entry-tag set.
///
fn time_source_flush_update_tag(graph: &mut Graph) {
    if !graph.time_source().tagged_for_update {
        return;
    }
    let targets: Vec<NodeId> = graph
        .pg
        .neighbors_directed(graph.time_source, Direction::Outgoing)
        .collect();
    for node in targets {
        if graph.pg[node].as_operation().is_some() {
            tag::tag_operation(graph, node, UpdateSource::Time);
        }
    }
}

fn flush_handle_id_node(graph: &mut Graph, id_node_id: IdNodeId) {
    if let Some(id_node) = graph.id_node_mut(id_node_id) {
        id_node.custom_flags = ID_STATE_MODIFIED;
    }
}

fn flush_handle_component_node(
    graph: &mut Graph,
    id_node_id: IdNodeId,
    comp_id: ComponentId,
    queue: &mut FlushQueue,
) {
    // We only handle the component once.
    if graph.component(comp_id).custom_flags == COMPONENT_STATE_DONE {
        return;
    }
    graph.component_mut(comp_id).custom_flags = COMPONENT_STATE_DONE;

    let node_type = graph.component(comp_id).node_type;
    // Tag all operations of the component for update, unless this is a
    // special component where we don't want all of them tagged.
    if !matches!(
        node_type,
        NodeType::ParticleSettings | NodeType::ParticleSystem
    ) {
        let is_geometry_component = node_type == NodeType::Geometry;
        let operations = graph.component(comp_id).operations.clone();
        for node in operations {
            // The visibility operation lives in the geometry component so a
            // manual geometry tag re-checks it. Updates arriving through
            // time or driver propagation must not re-run it.
            if is_geometry_component && graph.operation(node).opcode == OpCode::Visibility {
                continue;
            }
            graph.operation_mut(node).flags |= OpFlag::NEEDS_UPDATE;
        }
    }

    // When some target changes a bone, the whole IK solve may need to
    // re-run, otherwise the result is unpredictable.
    if node_type == NodeType::Bone {
        let pose_comp = graph
            .id_node(id_node_id)
            .and_then(|id_node| id_node.find_component(NodeType::EvalPose, ""));
        debug_assert!(pose_comp.is_some(), "Bone component without a pose");
        if let Some(pose_comp) = pose_comp {
            if graph.component(pose_comp).custom_flags == COMPONENT_STATE_NONE {
                if let Some(entry) = graph.component(pose_comp).entry_operation() {
                    queue.push_front(entry);
                    graph.component_mut(pose_comp).custom_flags = COMPONENT_STATE_SCHEDULED;
                }
            }
        }
    }
}

///
/// Schedule children of the given operation node for traversal. One child
/// bypasses the queue and is returned, so it can be handled right away
/// without building up queue churn on long chains.
///
fn flush_schedule_children(graph: &mut Graph, node: NodeId, queue: &mut FlushQueue) -> Option<NodeId> {
    let op_flags = graph.operation(node).flags;
    if op_flags.contains(OpFlag::USER_MODIFIED) {
        let id_node_id = graph.component(graph.operation(node).owner).owner;
        if let Some(id_node) = graph.id_node_mut(id_node_id) {
            id_node.is_user_modified = true;
        }
    }

    let children: SmallVec<[(RelationFlag, NodeId); 8]> = graph
        .pg
        .edges_directed(node, Direction::Outgoing)
        .map(|edge| (edge.weight().flags, edge.target()))
        .collect();

    let mut result = None;
    for (rel_flags, to_node) in children {
        // Flush is forbidden, completely.
        if rel_flags.contains(RelationFlag::NO_FLUSH) {
            continue;
        }
        // Relation only allows flushes on user changes, but the node was not
        // affected by the user.
        if rel_flags.contains(RelationFlag::FLUSH_USER_EDIT_ONLY)
            && !op_flags.contains(OpFlag::USER_MODIFIED)
        {
            continue;
        }
        let Some(to_op) = graph.pg[to_node].as_operation_mut() else {
            continue;
        };
        // Always flush flushable flags, so children always know what
        // happened to their parents.
        to_op.flags |= op_flags & OpFlag::flush_mask();
        // Flush the update over the relation, if not flushed yet.
        if to_op.scheduled {
            continue;
        }
        to_op.scheduled = true;
        if result.is_some() {
            queue.push_front(to_node);
        } else {
            result = Some(to_node);
        }
    }
    result
}

fn flush_engine_data_update(main: &mut Main, id_orig: scene::IdHandle, recalc: IdRecalcFlag) {
    let Some(id) = main.id_mut(id_orig) else {
        return;
    };
    for draw_data in &mut id.draw_data {
        draw_data.recalc |= recalc;
    }
}

/// Accumulate recalc bits from changed components and inform the editors.
fn flush_editors_id_update(graph: &mut Graph, main: &mut Main) {
    let mut updated_any = false;

    for id_node_index in 0..graph.id_nodes.len() {
        if graph.id_nodes[id_node_index].custom_flags != ID_STATE_MODIFIED {
            continue;
        }
        let id_type = graph.id_nodes[id_node_index].id_type;
        tag::tag_id_type(graph, id_type);

        // Gather recalc flags from all changed components.
        let mut recalc = IdRecalcFlag::empty();
        let component_ids: Vec<ComponentId> = graph.id_nodes[id_node_index]
            .components
            .values()
            .copied()
            .collect();
        for comp_id in component_ids {
            let comp = graph.component(comp_id);
            if comp.custom_flags != COMPONENT_STATE_DONE {
                continue;
            }
            recalc |= registry::node_type_info(comp.node_type).id_recalc_tag;
        }

        let id_node = &mut graph.id_nodes[id_node_index];
        if let Some(accumulated) = id_node.cow.recalc_mut() {
            *accumulated |= recalc;
        }
        log::debug!(
            "Accumulated recalc bits for {}: {:?}",
            id_node.name,
            id_node.cow.recalc()
        );

        // Inform editors, but only when the evaluated copy exists already:
        // this distinguishes user edits from the initial evaluation when a
        // datablock first becomes visible.
        if !id_node.cow.is_expanded() {
            continue;
        }
        let id_orig = id_node.id_orig;
        let is_user_modified = id_node.is_user_modified;
        if graph.is_active && is_user_modified {
            let update_ctx = EditorUpdateContext {
                main,
                graph_id: graph.graph_id,
                scene: graph.scene,
                view_layer: &graph.view_layer_name,
            };
            registry::editors_id_update(&update_ctx, id_orig);
            updated_any = true;

            // Library overrides auto-refresh only when the ID itself was
            // edited; indirect changes never require a diff.
            if let Some(id) = main.id_mut(id_orig) {
                if id.is_library_override {
                    id.tag |= scene::LibraryTag::OVERRIDE_AUTOREFRESH;
                }
            }
        }
        // Inform draw engines that something changed.
        flush_engine_data_update(main, id_orig, recalc);
    }

    if graph.is_active {
        let update_ctx = EditorUpdateContext {
            main,
            graph_id: graph.graph_id,
            scene: graph.scene,
            view_layer: &graph.view_layer_name,
        };
        registry::editors_scene_update(&update_ctx, updated_any);
    }
}

///
/// Make stale reads obvious: when the invalidation debug flag is set, wreck
/// the parts of the evaluated state which were tagged for update, so code
/// reading not-yet-evaluated data fails loudly instead of reusing the
/// previous frame's values.
///
fn invalidate_tagged_evaluated_data(graph: &mut Graph) {
    if !graph.debug_flags.contains(DebugFlag::INVALIDATE_ON_FLUSH) {
        return;
    }
    for id_node_index in 0..graph.id_nodes.len() {
        if graph.id_nodes[id_node_index].custom_flags != ID_STATE_MODIFIED {
            continue;
        }
        if !graph.id_nodes[id_node_index].cow.is_expanded() {
            continue;
        }
        let recalc = graph.id_nodes[id_node_index].cow.recalc();
        let id_node = &mut graph.id_nodes[id_node_index];
        if let crate::cow::CowShadow::Shadow(evaluated) = &mut id_node.cow {
            if recalc.contains(IdRecalcFlag::TRANSFORM) {
                evaluated.object_to_world = [f32::NAN; 16];
            }
            if recalc.contains(IdRecalcFlag::GEOMETRY) {
                evaluated.has_evaluated_geometry = false;
            }
        }
    }
}

///
/// Flush updates from tagged nodes outwards until all dependent nodes are
/// tagged too.
///
pub fn flush_updates(graph: &mut Graph, main: &mut Main) {
    time_source_flush_update_tag(graph);

    // Nothing to update, early out.
    if graph.entry_tags.is_empty() {
        return;
    }
    // Reset all flags, get ready for the flush.
    flush_prepare(graph);
    // Starting from the tagged "entry" nodes, flush outwards.
    let mut queue = FlushQueue::new();
    flush_schedule_entrypoints(graph, &mut queue);
    // Do the actual flush.
    while let Some(first) = queue.pop_front() {
        let mut current = Some(first);
        while let Some(node) = current {
            // Tag the operation as required for update.
            graph.operation_mut(node).flags |= OpFlag::NEEDS_UPDATE;
            // Inform the corresponding ID and component nodes.
            let comp_id = graph.operation(node).owner;
            let id_node_id = graph.component(comp_id).owner;
            flush_handle_id_node(graph, id_node_id);
            flush_handle_component_node(graph, id_node_id, comp_id, &mut queue);
            // Flush to nodes along outgoing links.
            current = flush_schedule_children(graph, node, &mut queue);
        }
    }
    // Inform editors about all changes.
    flush_editors_id_update(graph, main);
    // Reset evaluation results tagged for update to a state which is
    // obvious to catch.
    invalidate_tagged_evaluated_data(graph);
}

/// Clear any entry tags which haven't been flushed.
pub fn clear_tags(graph: &mut Graph) {
    graph.entry_tags.clear();
    graph.time_source_mut().tagged_for_update = false;
}

///
/// Clear accumulated recalc bits on every evaluated ID, optionally saving
/// them into the per-ID backup so tools can still peek at them.
///
pub fn ids_clear_recalc(graph: &mut Graph, backup: bool) {
    for id_node in &mut graph.id_nodes {
        let backup_flags = id_node.cow.recalc();
        if let Some(recalc) = id_node.cow.recalc_mut() {
            if backup {
                id_node.id_cow_recalc_backup |= backup_flags;
            }
            *recalc = IdRecalcFlag::empty();
        }
    }
}

/// Restore recalc bits saved by [`ids_clear_recalc`].
pub fn ids_restore_recalc(graph: &mut Graph) {
    for id_node in &mut graph.id_nodes {
        let backup_flags = id_node.id_cow_recalc_backup;
        if let Some(recalc) = id_node.cow.recalc_mut() {
            *recalc |= backup_flags;
        }
        id_node.id_cow_recalc_backup = IdRecalcFlag::empty();
    }
}

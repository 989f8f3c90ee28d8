// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Translation of external "this ID changed" requests into entry tags on
//! operation nodes.

use log::debug;

use scene::{IdHandle, IdRecalcFlag};

use crate::graph::Graph;
use crate::node::{ComponentId, IdNodeId, NodeId, NodeType, OpFlag};
use crate::registry;

/// What caused an update tag; affects only post-tag sub-flags, never which
/// operation gets tagged.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateSource {
    UserEdit,
    Time,
    Relations,
    Visibility,
}

/// Tag one operation node for update; the entry point of all tagging.
pub fn tag_operation(graph: &mut Graph, node: NodeId, source: UpdateSource) {
    {
        let op_node = graph.operation(node);
        if !op_node.flags.contains(OpFlag::NEEDS_UPDATE) {
            graph.add_entry_tag(node);
        }
    }
    let op_node = graph.operation_mut(node);
    // Tag for update, but also note that this was the source of an update.
    op_node.flags |= OpFlag::NEEDS_UPDATE | OpFlag::DIRECTLY_MODIFIED;
    match source {
        UpdateSource::Time | UpdateSource::Relations | UpdateSource::Visibility => {
            // Currently nothing.
        }
        UpdateSource::UserEdit => {
            op_node.flags |= OpFlag::USER_MODIFIED;
        }
    }
}

/// Tag every operation of a component, plus the ID's copy-on-write operation
/// when this component type requires a fresh copy to pick the change up.
pub fn tag_component(graph: &mut Graph, comp_id: ComponentId, source: UpdateSource) {
    let operations = graph.component(comp_id).operations.clone();
    for node in operations {
        tag_operation(graph, node, source);
    }

    let (node_type, id_node_id) = {
        let comp = graph.component(comp_id);
        (comp.node_type, comp.owner)
    };
    let Some(id_node) = graph.id_node(id_node_id) else {
        return;
    };
    if id_node.cow.is_alias() {
        return;
    }
    if node_type != NodeType::CopyOnWrite
        && registry::need_tag_cow_before_update(node_type, id_node.id_type)
    {
        if let Some(cow_comp) = id_node.find_component(NodeType::CopyOnWrite, "") {
            let cow_ops = graph.component(cow_comp).operations.clone();
            for node in cow_ops {
                tag_operation(graph, node, source);
            }
        }
    }
}

/// Tag every component of an ID node. Relations updates do an explicit
/// animation update when needed, so the animation component is skipped for
/// that source to avoid losing unkeyed changes.
pub fn tag_id_node(graph: &mut Graph, id_node_id: IdNodeId, source: UpdateSource) {
    let Some(id_node) = graph.id_node(id_node_id) else {
        return;
    };
    let components: Vec<ComponentId> = id_node.components.values().copied().collect();
    for comp_id in components {
        if graph.component(comp_id).node_type == NodeType::Animation
            && source == UpdateSource::Relations
        {
            continue;
        }
        tag_component(graph, comp_id, source);
    }
}

///
/// The static dispatch table: which component (and optionally which specific
/// operation) each recalc bit maps onto.
///
fn components_for_recalc_bit(bit: IdRecalcFlag) -> &'static [NodeType] {
    if bit == IdRecalcFlag::TRANSFORM {
        &[NodeType::Transform]
    } else if bit == IdRecalcFlag::GEOMETRY {
        &[NodeType::Geometry]
    } else if bit == IdRecalcFlag::ANIMATION || bit == IdRecalcFlag::TIME {
        &[NodeType::Animation]
    } else if bit == IdRecalcFlag::SHADING {
        &[NodeType::Shading, NodeType::ShadingParameters]
    } else if bit == IdRecalcFlag::COPY_ON_WRITE || bit == IdRecalcFlag::SOURCE {
        &[NodeType::CopyOnWrite]
    } else if bit == IdRecalcFlag::PARAMETERS {
        &[NodeType::Parameters]
    } else if bit == IdRecalcFlag::POINT_CACHE {
        &[NodeType::PointCache]
    } else if bit == IdRecalcFlag::SELECT {
        &[NodeType::BatchCache]
    } else if bit == IdRecalcFlag::BASE_FLAGS {
        &[NodeType::ObjectFromLayer]
    } else if bit == IdRecalcFlag::SEQUENCER_STRIPS {
        &[NodeType::Sequencer]
    } else if bit == IdRecalcFlag::AUDIO {
        &[NodeType::Audio]
    } else if bit == IdRecalcFlag::PSYS {
        &[NodeType::ParticleSystem, NodeType::ParticleSettings]
    } else if bit == IdRecalcFlag::SYNCHRONIZE {
        &[NodeType::Synchronization]
    } else {
        &[]
    }
}

///
/// Tag an ID with a set of recalc bits. IDs unknown to this graph are
/// silently ignored: the change simply does not propagate here.
///
pub fn id_tag_update(
    graph: &mut Graph,
    id: IdHandle,
    flags: IdRecalcFlag,
    source: UpdateSource,
) {
    let Some(id_node_id) = graph.find_id_node(id) else {
        debug!("Tag request for {id} which is not in graph {}", graph.graph_id);
        return;
    };

    if flags.is_empty() {
        // A zero tag still means "the datablock was touched": refresh the
        // evaluated copy.
        if let Some(comp_id) = graph
            .id_node(id_node_id)
            .and_then(|id_node| id_node.find_component(NodeType::CopyOnWrite, ""))
        {
            tag_component(graph, comp_id, source);
        }
        return;
    }

    for bit in flags.iter() {
        if bit == IdRecalcFlag::COPY_ON_WRITE {
            if let Some(id_node) = graph.id_node_mut(id_node_id) {
                id_node.is_cow_explicitly_tagged = true;
            }
        }
        for &node_type in components_for_recalc_bit(bit) {
            let Some(comp_id) = graph
                .id_node(id_node_id)
                .and_then(|id_node| id_node.find_component(node_type, ""))
            else {
                continue;
            };
            tag_component(graph, comp_id, source);
        }
    }
}

/// Set the ID-type-updated bit for the given type.
pub fn tag_id_type(graph: &mut Graph, id_type: scene::IdType) {
    graph.id_type_updated[id_type.index()] = 1;
}

/// Tag the time source; the next flush will mark every time-dependent
/// operation for update.
pub fn tag_time(graph: &mut Graph) {
    graph.tag_time_source();
}

// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

#![deny(warnings)]
// Enable all clippy lints except for many of the pedantic ones. It's a shame this needs to be copied and pasted across crates, but there doesn't appear to be a way to include inner attributes from a common source.
#![deny(
    clippy::all,
    clippy::default_trait_access,
    clippy::expl_impl_clone_on_copy,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::unseparated_literal_suffix,
    clippy::used_underscore_binding
)]
// It is often more clear to show that nothing is being moved.
#![allow(clippy::match_ref_pats)]
// Subjective style.
#![allow(
    clippy::len_without_is_empty,
    clippy::redundant_field_names,
    clippy::too_many_arguments
)]
// Default isn't as big a deal as people seem to think it is.
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]

//! Construction of the dependency graph from a scene description: the nodes
//! pass, the relations pass and the state transfer across rebuilds.

pub mod api;
pub mod cache;
pub mod keys;
mod map;
mod nodes;
mod nodes_rig;
mod pchanmap;
mod relations;
mod relations_rig;
mod validate;

use fnv::FnvHashMap;
use log::{debug, warn};

use graph::cow::CowShadow;
use graph::tag::{self, UpdateSource};
use graph::{Depsgraph, Graph, LinkedState, OpFlag};
use scene::{Main, SessionUuid};

pub use crate::api::{resolve_property, PointerSource};
pub use crate::cache::BuilderCache;
pub use crate::keys::{ComponentKey, Key, OpKey, PersistentOpKey};
pub use crate::nodes::{IdInfo, NodeBuilder};
pub use crate::pchanmap::RootChannelMap;
pub use crate::relations::RelationBuilder;
pub use crate::validate::debug_relations_validate;

///
/// (Re)build the graph for its scene and view layer. Previous per-ID state
/// and entry tags survive through persistent keys; everything else is
/// reconstructed from the scene description.
///
pub fn graph_build_from_view_layer(depsgraph: &Depsgraph, main: &Main) {
    let mut graph = depsgraph.lock();
    build_graph(&mut graph, main);
}

/// Rebuild the graph if a relations update was requested.
pub fn graph_relations_update(depsgraph: &Depsgraph, main: &Main) {
    let mut graph = depsgraph.lock();
    if !graph.need_update {
        return;
    }
    build_graph(&mut graph, main);
}

/// Request a rebuild of the graph on the next relations update.
pub fn graph_tag_relations_update(depsgraph: &Depsgraph) {
    let mut graph = depsgraph.lock();
    graph.need_update = true;
}

fn build_graph(graph: &mut Graph, main: &Main) {
    // Capture state which must survive the rebuild before discarding the
    // old nodes.
    let id_info = capture_id_info(graph);
    let saved_entry_tags = save_entry_tags(graph);
    graph.clear_id_nodes();

    let scene = graph.scene;
    let Some(view_layer) = graph.view_layer(main) else {
        warn!(
            "View layer \"{}\" not found in scene, nothing to build",
            graph.view_layer_name
        );
        return;
    };

    {
        let mut node_builder = NodeBuilder::new(main, graph, id_info);
        node_builder.build_view_layer(scene, view_layer, LinkedState::Directly);
    }
    {
        let mut cache = BuilderCache::new();
        let mut relation_builder = RelationBuilder::new(main, graph, &mut cache);
        relation_builder.build_view_layer(scene, view_layer, LinkedState::Directly);
        relation_builder.build_copy_on_write_relations();
    }

    graph.finalize_build();
    restore_entry_tags(graph, saved_entry_tags);
    graph.need_update = false;
}

///
/// Move the evaluated shadows and the previously-computed masks out of the
/// old graph, keyed by session UUID. `clear_id_nodes` will find the shadows
/// already gone, which is exactly the "builder stole ownership" situation
/// its conditional passes skip over.
///
fn capture_id_info(graph: &mut Graph) -> FnvHashMap<SessionUuid, IdInfo> {
    let mut id_info = FnvHashMap::default();
    for id_node in &mut graph.id_nodes {
        let cow = std::mem::replace(&mut id_node.cow, CowShadow::Freed);
        id_info.insert(
            id_node.id_orig_session_uuid,
            IdInfo {
                cow,
                previously_visible_components_mask: id_node.visible_components_mask,
                previous_eval_flags: id_node.eval_flags,
                previous_customdata_masks: id_node.customdata_masks,
            },
        );
    }
    id_info
}

/// Persistent keys of all currently entry-tagged operations.
fn save_entry_tags(graph: &Graph) -> Vec<PersistentOpKey> {
    let mut saved = Vec::new();
    for &node in &graph.entry_tags {
        let op_node = graph.operation(node);
        let comp = graph.component(op_node.owner);
        let Some(id_node) = graph.id_node(comp.owner) else {
            continue;
        };
        saved.push(PersistentOpKey {
            session_uuid: id_node.id_orig_session_uuid,
            component: comp.node_type,
            component_name: comp.name.clone(),
            opcode: op_node.opcode,
            name: op_node.name.clone(),
            name_tag: op_node.name_tag,
            user_modified: op_node.flags.contains(OpFlag::USER_MODIFIED),
        });
    }
    saved
}

///
/// Re-tag operations whose persistent key still resolves in the rebuilt
/// graph; keys referencing nodes that no longer exist are dropped silently.
///
fn restore_entry_tags(graph: &mut Graph, saved: Vec<PersistentOpKey>) {
    if saved.is_empty() {
        return;
    }
    let mut by_uuid = FnvHashMap::default();
    for id_node in &graph.id_nodes {
        by_uuid.insert(id_node.id_orig_session_uuid, id_node.id_orig);
    }
    for key in saved {
        let Some(&id) = by_uuid.get(&key.session_uuid) else {
            debug!("Entry tag for vanished datablock dropped");
            continue;
        };
        let Some(node) = graph.find_operation_for_id(
            id,
            key.component,
            &key.component_name,
            &graph::OpIdKey::new(key.opcode, &key.name, key.name_tag),
        ) else {
            debug!("Entry tag for vanished operation dropped");
            continue;
        };
        let source = if key.user_modified {
            UpdateSource::UserEdit
        } else {
            UpdateSource::Relations
        };
        tag::tag_operation(graph, node, source);
    }
}

#[cfg(test)]
mod tests;

// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Read-only queries over a built graph: evaluated/original resolution and
//! per-graph state inspection.

use bitflags::bitflags;

use scene::{IdHandle, IdRecalcFlag, IdType};

use crate::cow::EvaluatedId;
use crate::graph::Graph;
use crate::node::id_node::CustomDataMasks;
use crate::node::LinkedState;

bitflags! {
    /// Which objects an object iteration returns.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ObjectIterFlag: u32 {
        const LINKED_DIRECTLY = 1 << 0;
        const LINKED_INDIRECTLY = 1 << 1;
        const LINKED_VIA_SET = 1 << 2;
        /// Restrict to objects visible in the evaluated scene.
        const VISIBLE = 1 << 3;
        /// Include objects instanced by duplication. Instances are expanded
        /// by the evaluator, not by this graph, so the flag only widens what
        /// the host may append.
        const DUPLI = 1 << 4;
    }
}

///
/// The evaluated version of a datablock: either the original itself (for ID
/// types which are not copy-on-written, or for IDs this graph does not
/// know), or the graph-owned shadow.
///
/// This is the one "give me the copy-on-write ID" query: handles only ever
/// address originals, so the shadow is handed out as a reference rather
/// than as a second handle. Consumers which must not read a shallow copy
/// check [`crate::cow::EvaluatedId::is_expanded`].
///
#[derive(Debug)]
pub enum EvaluatedRef<'g> {
    Original(IdHandle),
    Evaluated(&'g EvaluatedId),
}

impl<'g> EvaluatedRef<'g> {
    /// Walk back to the original datablock. Round-trips with
    /// [`get_evaluated_id`].
    pub fn original(&self) -> IdHandle {
        match self {
            EvaluatedRef::Original(id) => *id,
            EvaluatedRef::Evaluated(evaluated) => evaluated.orig,
        }
    }

    pub fn recalc(&self) -> IdRecalcFlag {
        match self {
            EvaluatedRef::Original(_) => IdRecalcFlag::empty(),
            EvaluatedRef::Evaluated(evaluated) => evaluated.recalc,
        }
    }
}

///
/// Get the evaluated version of an ID. IDs unknown to the graph resolve to
/// themselves, keeping the documented "missing → original" contract.
///
pub fn get_evaluated_id(graph: &Graph, id: IdHandle) -> EvaluatedRef<'_> {
    match graph.find_id_node(id) {
        Some(id_node_id) => {
            let id_node = graph.id_node(id_node_id).expect("ID node arena mismatch");
            match id_node.cow.evaluated() {
                Some(evaluated) => EvaluatedRef::Evaluated(evaluated),
                None => EvaluatedRef::Original(id),
            }
        }
        None => EvaluatedRef::Original(id),
    }
}

/// Recalc bits accumulated on the evaluated shadow of an ID.
pub fn evaluated_recalc(graph: &Graph, id: IdHandle) -> IdRecalcFlag {
    graph
        .find_id_node(id)
        .and_then(|id_node_id| graph.id_node(id_node_id))
        .map(|id_node| id_node.cow.recalc())
        .unwrap_or_else(IdRecalcFlag::empty)
}

/// Special evaluation flags requested for an ID; zero for unknown IDs.
pub fn eval_flags_for_id(graph: &Graph, id: IdHandle) -> u32 {
    match graph.find_id_node(id).and_then(|id_node_id| graph.id_node(id_node_id)) {
        Some(id_node) => id_node.eval_flags,
        // TODO: Does it mean we need to check the set scene?
        None => 0,
    }
}

/// Customdata layers required of an object's evaluated mesh; empty for
/// unknown IDs.
pub fn customdata_mask_for_object(graph: &Graph, id: IdHandle) -> CustomDataMasks {
    match graph.find_id_node(id).and_then(|id_node_id| graph.id_node(id_node_id)) {
        Some(id_node) => id_node.customdata_masks,
        None => CustomDataMasks::default(),
    }
}

pub fn id_type_updated(graph: &Graph, id_type: IdType) -> bool {
    graph.id_type_updated[id_type.index()] != 0
}

pub fn id_type_any_updated(graph: &Graph) -> bool {
    graph.id_type_updated.iter().any(|&updated| updated != 0)
}

pub fn id_type_exists(graph: &Graph, id_type: IdType) -> bool {
    graph.id_type_exist[id_type.index()] != 0
}

///
/// Iterate original object IDs selected by the given flags, in allocation
/// order.
///
pub fn foreach_object(graph: &Graph, flags: ObjectIterFlag, mut callback: impl FnMut(IdHandle)) {
    for id_node in &graph.id_nodes {
        if id_node.id_type != IdType::Object {
            continue;
        }
        let linked = match id_node.linked_state {
            LinkedState::Directly => ObjectIterFlag::LINKED_DIRECTLY,
            LinkedState::ViaSet => ObjectIterFlag::LINKED_VIA_SET,
            LinkedState::Indirectly => ObjectIterFlag::LINKED_INDIRECTLY,
        };
        if !flags.contains(linked) {
            continue;
        }
        if flags.contains(ObjectIterFlag::VISIBLE) && !id_node.is_directly_visible {
            continue;
        }
        callback(id_node.id_orig);
    }
}

///
/// Whether the graph needs no work: relations are up to date and no entry
/// tags are pending.
///
pub fn is_fully_evaluated(graph: &Graph) -> bool {
    if graph.need_update {
        return false;
    }
    if !graph.entry_tags.is_empty() {
        return false;
    }
    true
}

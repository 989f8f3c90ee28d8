// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Copy-on-write management: which IDs need an evaluated shadow, shallow
//! allocation of shadows, and their expansion by the per-ID copy-on-write
//! operation.

use log::debug;

use scene::{IdHandle, IdRecalcFlag, IdType, Main, SessionUuid};

use crate::graph::Graph;
use crate::node::IdNodeId;

///
/// Whether the given ID type is covered by the copy-on-write system at all.
/// The exceptions are datablocks we never want to start duplicating: bulk
/// media whose evaluated state equals the original.
///
pub fn copy_on_write_is_needed(id_type: IdType) -> bool {
    !matches!(id_type, IdType::Image | IdType::Sound)
}

///
/// ID types whose parameters component can be re-evaluated in place, without
/// re-copying the datablock. Tagging their parameters does not imply a
/// copy-on-write tag.
///
pub fn supports_params_without_cow(id_type: IdType) -> bool {
    matches!(
        id_type,
        IdType::Light | IdType::Camera | IdType::Speaker | IdType::Image | IdType::Sound
    )
}

///
/// The evaluated shadow of one original datablock. Created shallow (type
/// tag and identity only); the copy-on-write operation fills in the body and
/// flips `is_expanded`, after which the rest of the evaluation may read it.
///
#[derive(Clone, Debug)]
pub struct EvaluatedId {
    pub id_type: IdType,
    pub orig: IdHandle,
    pub session_uuid: SessionUuid,
    /// Copied from the original on expansion; empty while shallow.
    pub name: String,
    pub recalc: IdRecalcFlag,
    pub is_expanded: bool,
    /// Evaluated world matrix; the stale-read debug hook NaN-fills it.
    pub object_to_world: [f32; 16],
    /// Whether evaluated geometry caches exist for this datablock.
    pub has_evaluated_geometry: bool,
}

const MATRIX_IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
];

impl EvaluatedId {
    fn shallow(id_type: IdType, orig: IdHandle, session_uuid: SessionUuid) -> EvaluatedId {
        EvaluatedId {
            id_type,
            orig,
            session_uuid,
            name: String::new(),
            recalc: IdRecalcFlag::empty(),
            is_expanded: false,
            object_to_world: MATRIX_IDENTITY,
            has_evaluated_geometry: false,
        }
    }
}

/// The evaluated side of one ID node.
#[derive(Debug)]
pub enum CowShadow {
    /// Copy-on-write is not needed for this ID type; the evaluated datablock
    /// aliases the original. Recalc bits are still tracked graph-side.
    Alias { recalc: IdRecalcFlag },
    Shadow(Box<EvaluatedId>),
    /// The shadow was freed during graph teardown.
    Freed,
}

impl CowShadow {
    ///
    /// Create the evaluated side for a newly added ID node. The pointer-like
    /// record is created as early as possible so relations can bind to it;
    /// contents arrive when the copy-on-write operation runs. A hint
    /// transfers the previous graph's shadow across a rebuild.
    ///
    pub fn init(
        id_type: IdType,
        orig: IdHandle,
        session_uuid: SessionUuid,
        hint: Option<CowShadow>,
    ) -> CowShadow {
        if let Some(hint) = hint {
            if copy_on_write_is_needed(id_type) {
                return hint;
            }
            return CowShadow::Alias {
                recalc: IdRecalcFlag::empty(),
            };
        }
        if copy_on_write_is_needed(id_type) {
            debug!("Create shallow copy for {orig}");
            CowShadow::Shadow(Box::new(EvaluatedId::shallow(id_type, orig, session_uuid)))
        } else {
            CowShadow::Alias {
                recalc: IdRecalcFlag::empty(),
            }
        }
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, CowShadow::Alias { .. })
    }

    /// A shallow-constructed shadow is not yet safe to read; aliases are.
    pub fn is_expanded(&self) -> bool {
        match self {
            CowShadow::Alias { .. } => true,
            CowShadow::Shadow(evaluated) => evaluated.is_expanded,
            CowShadow::Freed => false,
        }
    }

    pub fn recalc(&self) -> IdRecalcFlag {
        match self {
            CowShadow::Alias { recalc } => *recalc,
            CowShadow::Shadow(evaluated) => evaluated.recalc,
            CowShadow::Freed => IdRecalcFlag::empty(),
        }
    }

    pub fn recalc_mut(&mut self) -> Option<&mut IdRecalcFlag> {
        match self {
            CowShadow::Alias { recalc } => Some(recalc),
            CowShadow::Shadow(evaluated) => Some(&mut evaluated.recalc),
            CowShadow::Freed => None,
        }
    }

    pub fn evaluated(&self) -> Option<&EvaluatedId> {
        match self {
            CowShadow::Shadow(evaluated) => Some(evaluated),
            _ => None,
        }
    }
}

///
/// Bring the shadow of the given ID node up to date with its original:
/// the body of the per-ID copy-on-write operation. Also invoked directly by
/// tests which have no evaluator.
///
pub fn evaluate_copy_on_write(graph: &mut Graph, id_node_id: IdNodeId, main: &Main) {
    let name = graph
        .id_node(id_node_id)
        .and_then(|id_node| main.id(id_node.id_orig))
        .map(|id| id.name.clone());
    let Some(id_node) = graph.id_node_mut(id_node_id) else {
        return;
    };
    match &mut id_node.cow {
        CowShadow::Shadow(evaluated) => {
            if let Some(name) = name {
                evaluated.name = name;
            }
            evaluated.is_expanded = true;
            evaluated.object_to_world = MATRIX_IDENTITY;
            evaluated.has_evaluated_geometry = true;
        }
        CowShadow::Alias { .. } => {
            // Nothing to expand; the original is the evaluated datablock.
        }
        CowShadow::Freed => {
            debug_assert!(false, "Copy-on-write evaluation on a freed shadow");
        }
    }
}

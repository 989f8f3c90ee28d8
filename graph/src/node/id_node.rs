// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use fnv::FnvHashMap;

use scene::{IdHandle, IdRecalcFlag, IdType, SessionUuid};

use crate::cow::CowShadow;
use crate::node::component::{ComponentId, ComponentIdKey};
use crate::node::NodeType;

/// Handle of an ID node in the graph's ID arena.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct IdNodeId(pub u32);

impl IdNodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

///
/// How an ID ended up in the graph. Ordered so that merging two states with
/// `max` keeps the strongest linkage.
///
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum LinkedState {
    /// Generic indirectly linked ID.
    Indirectly = 0,
    /// Present through a background ("set") scene only.
    ViaSet = 1,
    /// Directly linked through the built view layer.
    Directly = 2,
}

impl LinkedState {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkedState::Indirectly => "INDIRECTLY",
            LinkedState::ViaSet => "VIA_SET",
            LinkedState::Directly => "DIRECTLY",
        }
    }
}

/// Extra customdata layers the evaluated mesh of an object must carry.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CustomDataMasks {
    pub vert: u64,
    pub edge: u64,
    pub face: u64,
    pub loop_: u64,
    pub poly: u64,
}

impl CustomDataMasks {
    pub fn vert_mask(mask: u64) -> CustomDataMasks {
        CustomDataMasks {
            vert: mask,
            ..CustomDataMasks::default()
        }
    }

    pub fn merge(&mut self, other: &CustomDataMasks) {
        self.vert |= other.vert;
        self.edge |= other.edge;
        self.face |= other.face;
        self.loop_ |= other.loop_;
        self.poly |= other.poly;
    }

    pub fn is_empty(&self) -> bool {
        *self == CustomDataMasks::default()
    }
}

/// Deform-vertex customdata layer, required by vertex-group lookups.
pub const CUSTOMDATA_MASK_DEFORMVERT: u64 = 1 << 0;

/// Per-ID evaluation flag: curve objects must build their path data.
pub const EVAL_FLAG_NEED_CURVE_PATH: u32 = 1 << 0;
/// Per-ID evaluation flag: meshes must build shrinkwrap boundary data.
pub const EVAL_FLAG_NEED_SHRINKWRAP_BOUNDARY: u32 = 1 << 1;

///
/// One original datablock participating in the graph, owning its components
/// and its evaluated shadow.
///
#[derive(Debug)]
pub struct IdNode {
    pub id_type: IdType,
    pub id_orig: IdHandle,
    /// Stable identity used to transfer state across rebuilds; handles are
    /// not guaranteed to survive a database reload, UUIDs are.
    pub id_orig_session_uuid: SessionUuid,
    pub name: String,
    pub cow: CowShadow,
    pub components: FnvHashMap<ComponentIdKey, ComponentId>,
    pub linked_state: LinkedState,
    /// Whether the datablock is visible in the evaluated scene.
    pub is_directly_visible: bool,
    /// Whether the object entered the graph through a view-layer base.
    pub has_base: bool,
    /// For collections: whether the collection content was fully recursed.
    pub is_collection_fully_expanded: bool,
    /// Accumulated from operations during flush.
    pub is_user_modified: bool,
    /// The copy-on-write component was tagged explicitly, not as a side
    /// effect of another tag.
    pub is_cow_explicitly_tagged: bool,
    pub eval_flags: u32,
    pub previous_eval_flags: u32,
    pub customdata_masks: CustomDataMasks,
    pub previous_customdata_masks: CustomDataMasks,
    /// Recalc bits preserved across a clear/restore cycle so tools can peek
    /// at what the last flush produced.
    pub id_cow_recalc_backup: IdRecalcFlag,
    pub visible_components_mask: u64,
    pub previously_visible_components_mask: u64,
    /// Scratch word used only while a flush owns the graph.
    pub custom_flags: u32,
}

impl IdNode {
    pub fn new(
        id_type: IdType,
        id_orig: IdHandle,
        session_uuid: SessionUuid,
        name: &str,
        cow: CowShadow,
    ) -> IdNode {
        IdNode {
            id_type,
            id_orig,
            id_orig_session_uuid: session_uuid,
            name: name.to_owned(),
            cow,
            components: FnvHashMap::default(),
            linked_state: LinkedState::Indirectly,
            is_directly_visible: true,
            has_base: false,
            is_collection_fully_expanded: false,
            is_user_modified: false,
            is_cow_explicitly_tagged: false,
            eval_flags: 0,
            previous_eval_flags: 0,
            customdata_masks: CustomDataMasks::default(),
            previous_customdata_masks: CustomDataMasks::default(),
            id_cow_recalc_backup: IdRecalcFlag::empty(),
            visible_components_mask: 0,
            previously_visible_components_mask: 0,
            custom_flags: 0,
        }
    }

    pub fn identifier(&self) -> String {
        format!(
            "{} : {} (orig: {}, visible: {})",
            NodeType::IdRef.as_str(),
            self.name,
            self.id_orig,
            self.is_directly_visible
        )
    }

    pub fn find_component(&self, node_type: NodeType, name: &str) -> Option<ComponentId> {
        self.components
            .get(&ComponentIdKey::new(node_type, name))
            .copied()
    }
}

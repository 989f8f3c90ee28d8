// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use crate::id::IdHandle;

///
/// The datum a property reference points at. The host classifies property
/// owners up front; the relation builder dispatches on the variant (see the
/// builder's property resolution rules).
///
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum PropertyTarget {
    /// A property directly on a datablock.
    Id(IdHandle),
    /// A pose channel of an armature object.
    PoseBone { object: IdHandle, bone: String },
    /// An armature-level (rest) bone, addressed via the armature or via an
    /// object using it.
    ArmatureBone { owner: IdHandle, bone: String },
    /// A constraint on an object or one of its pose channels.
    Constraint { owner: IdHandle, constraint: String },
    /// A target slot of such a constraint.
    ConstraintTarget {
        owner: IdHandle,
        constraint: String,
        index: usize,
    },
    /// A modifier on an object.
    Modifier { object: IdHandle, modifier: String },
    /// One block of a shape-key datablock.
    ShapeKeyBlock { key: IdHandle, block: String },
    /// Mesh elements, splines, lattice points and other geometry innards.
    GeometryElement { id: IdHandle },
    /// An output socket of a node tree.
    NodeSocket { ntree: IdHandle },
    /// A shader node inside a material/world node tree.
    ShaderNode { ntree: IdHandle },
    /// An image user (frame-dependent image lookup) owned by a datablock.
    ImageUser { owner: IdHandle },
    /// A sequencer strip of a scene.
    Sequence { scene: IdHandle },
}

impl PropertyTarget {
    /// The datablock the addressed data lives on.
    pub fn owner(&self) -> IdHandle {
        match self {
            PropertyTarget::Id(id) => *id,
            PropertyTarget::PoseBone { object, .. } => *object,
            PropertyTarget::ArmatureBone { owner, .. } => *owner,
            PropertyTarget::Constraint { owner, .. } => *owner,
            PropertyTarget::ConstraintTarget { owner, .. } => *owner,
            PropertyTarget::Modifier { object, .. } => *object,
            PropertyTarget::ShapeKeyBlock { key, .. } => *key,
            PropertyTarget::GeometryElement { id } => *id,
            PropertyTarget::NodeSocket { ntree } => *ntree,
            PropertyTarget::ShaderNode { ntree } => *ntree,
            PropertyTarget::ImageUser { owner } => *owner,
            PropertyTarget::Sequence { scene } => *scene,
        }
    }
}

///
/// A reference to one animatable property: the datum it lives on, the
/// property name, and whether it is a custom (ID) property rather than a
/// built-in one.
///
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PropertyRef {
    pub target: PropertyTarget,
    pub prop: Option<String>,
    pub is_idprop: bool,
}

impl PropertyRef {
    pub fn builtin(target: PropertyTarget, prop: &str) -> PropertyRef {
        PropertyRef {
            target,
            prop: Some(prop.to_owned()),
            is_idprop: false,
        }
    }

    pub fn idprop(target: PropertyTarget, prop: &str) -> PropertyRef {
        PropertyRef {
            target,
            prop: Some(prop.to_owned()),
            is_idprop: true,
        }
    }
}

///
/// A driver: an expression-computed property whose inputs are other
/// properties. `property` is what the driver writes; `variables` are what it
/// reads.
///
#[derive(Clone, Debug)]
pub struct Driver {
    pub property: PropertyRef,
    /// Array index within the driven property; part of the operation name so
    /// that drivers on `location[0]` and `location[1]` stay distinct.
    pub array_index: i32,
    pub variables: Vec<PropertyRef>,
    /// The driver expression samples the current frame time.
    pub uses_time: bool,
}

impl Driver {
    pub fn new(property: PropertyRef, array_index: i32) -> Driver {
        Driver {
            property,
            array_index,
            variables: Vec::new(),
            uses_time: false,
        }
    }
}

/// Animation data attached to a datablock: an optional action plus drivers.
#[derive(Clone, Debug, Default)]
pub struct AnimData {
    pub action: Option<IdHandle>,
    /// Properties the action's curves write; what the relation builder needs
    /// to know about the action's contents.
    pub animated_properties: Vec<PropertyRef>,
    pub drivers: Vec<Driver>,
}

impl AnimData {
    pub fn with_action(action: IdHandle) -> AnimData {
        AnimData {
            action: Some(action),
            animated_properties: Vec::new(),
            drivers: Vec::new(),
        }
    }
}

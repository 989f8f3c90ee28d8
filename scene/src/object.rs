// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use crate::anim::AnimData;
use crate::id::{Id, IdHandle, IdType};

/// What kind of data an object carries; drives which geometry/pose components
/// the builder creates for it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObjectType {
    Empty,
    Mesh,
    Curve,
    Lattice,
    Armature,
    Light,
    Camera,
    LightProbe,
    Speaker,
}

impl ObjectType {
    /// Object types with evaluatable geometry.
    pub fn has_geometry(self) -> bool {
        matches!(self, ObjectType::Mesh | ObjectType::Curve | ObjectType::Lattice)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParentKind {
    Object,
    /// Parented to a bone of an armature object.
    Bone,
    /// Parented to vertices of a mesh/lattice object.
    Vertex,
}

#[derive(Clone, Debug)]
pub struct ParentRef {
    pub object: IdHandle,
    pub kind: ParentKind,
    /// Bone name for [`ParentKind::Bone`].
    pub subtarget: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ConstraintTarget {
    pub object: IdHandle,
    /// Bone name or vertex-group name on the target object.
    pub subtarget: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IkSolverKind {
    Legacy,
    Itasc,
}

#[derive(Clone, Debug)]
pub struct IkConstraint {
    pub target: Option<ConstraintTarget>,
    pub pole_target: Option<ConstraintTarget>,
    /// Number of bones in the chain; 0 means "walk to the root".
    pub chain_length: u16,
    /// Whether the constrained bone itself is part of the chain.
    pub use_tip: bool,
}

#[derive(Clone, Debug)]
pub struct SplineIkConstraint {
    /// Curve object supplying the path.
    pub target: Option<IdHandle>,
    pub chain_length: u16,
}

#[derive(Clone, Debug)]
pub enum ConstraintKind {
    Kinematic(IkConstraint),
    SplineIk(SplineIkConstraint),
    /// Copy location/rotation/scale/transforms; these need the owner's
    /// world-space matrix.
    CopyTransforms { target: ConstraintTarget },
    FollowPath { target: IdHandle },
    /// Anything else with plain object/bone targets.
    Generic { targets: Vec<ConstraintTarget> },
}

#[derive(Clone, Debug)]
pub struct Constraint {
    pub name: String,
    pub kind: ConstraintKind,
    pub is_disabled: bool,
}

#[derive(Clone, Debug)]
pub enum ModifierKind {
    Armature { object: Option<IdHandle> },
    Lattice { object: Option<IdHandle> },
    Curve { object: Option<IdHandle> },
    Subsurf,
    Mirror { object: Option<IdHandle> },
    Collision,
    Fluid,
    DynamicPaint,
    /// Geometry-nodes modifier referencing a node group.
    Nodes { group: Option<IdHandle> },
}

#[derive(Clone, Debug)]
pub struct Modifier {
    pub name: String,
    pub kind: ModifierKind,
    pub show_viewport: bool,
    pub show_render: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ForceFieldKind {
    Force,
    Wind,
    Guide,
    FluidFlow,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldShape {
    Point,
    Surface,
    Points,
}

#[derive(Clone, Debug)]
pub struct ForceField {
    pub kind: ForceFieldKind,
    pub shape: FieldShape,
    pub use_absorption: bool,
    /// Fluid domain object for [`ForceFieldKind::FluidFlow`].
    pub source: Option<IdHandle>,
}

#[derive(Clone, Debug)]
pub struct EffectorWeights {
    /// Restrict effectors to this collection; `None` means scene-wide.
    pub collection: Option<IdHandle>,
}

#[derive(Clone, Debug)]
pub struct ParticleSystem {
    pub name: String,
    pub settings: IdHandle,
}

#[derive(Clone, Debug)]
pub struct PoseChannel {
    pub name: String,
    pub parent: Option<String>,
    pub constraints: Vec<Constraint>,
    /// Number of B-Bone segments; > 1 enables the segments operation.
    pub bbone_segments: u32,
    pub bbone_prev: Option<String>,
    pub bbone_next: Option<String>,
    pub bbone_add_parent_end_roll: bool,
    /// Custom display shape object.
    pub custom_shape: Option<IdHandle>,
    /// Names of custom (ID) properties stored on the channel.
    pub custom_properties: Vec<String>,
}

impl PoseChannel {
    pub fn new(name: &str) -> PoseChannel {
        PoseChannel {
            name: name.to_owned(),
            parent: None,
            constraints: Vec::new(),
            bbone_segments: 1,
            bbone_prev: None,
            bbone_next: None,
            bbone_add_parent_end_roll: false,
            custom_shape: None,
            custom_properties: Vec::new(),
        }
    }

    pub fn has_bbone_segments(&self) -> bool {
        self.bbone_segments > 1
    }
}

#[derive(Clone, Debug)]
pub struct Pose {
    pub channels: Vec<PoseChannel>,
    pub iksolver: IkSolverKind,
}

impl Default for Pose {
    fn default() -> Pose {
        Pose {
            channels: Vec::new(),
            iksolver: IkSolverKind::Legacy,
        }
    }
}

impl Pose {
    pub fn channel(&self, name: &str) -> Option<&PoseChannel> {
        self.channels.iter().find(|pchan| pchan.name == name)
    }
}

#[derive(Clone, Debug)]
pub struct RigidBodySettings {
    pub is_passive: bool,
}

#[derive(Clone, Debug)]
pub struct Object {
    pub id: Id,
    pub object_type: ObjectType,
    /// The object-data datablock (mesh, curve, armature, light, ...).
    pub data: Option<IdHandle>,
    pub parent: Option<ParentRef>,
    pub constraints: Vec<Constraint>,
    pub modifiers: Vec<Modifier>,
    pub particle_systems: Vec<ParticleSystem>,
    pub pose: Option<Pose>,
    pub rigidbody: Option<RigidBodySettings>,
    pub materials: Vec<IdHandle>,
    pub field: Option<ForceField>,
    pub effector_weights: Option<EffectorWeights>,
    pub hide_viewport: bool,
    pub hide_render: bool,
    pub adt: Option<AnimData>,
}

impl Object {
    pub fn new(name: &str, object_type: ObjectType) -> Object {
        Object {
            id: Id::new(name, IdType::Object),
            object_type,
            data: None,
            parent: None,
            constraints: Vec::new(),
            modifiers: Vec::new(),
            particle_systems: Vec::new(),
            pose: None,
            rigidbody: None,
            materials: Vec::new(),
            field: None,
            effector_weights: None,
            hide_viewport: false,
            hide_render: false,
            adt: None,
        }
    }

    pub fn uses_collision(&self) -> bool {
        self.modifiers.iter().any(|md| {
            matches!(
                md.kind,
                ModifierKind::Collision | ModifierKind::Fluid | ModifierKind::DynamicPaint
            )
        })
    }
}

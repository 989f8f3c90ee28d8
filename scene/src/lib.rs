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

//! The scene description consumed by the dependency graph builders.
//!
//! This crate stands in for the application's datablock database ("Main"):
//! plain data describing objects, their data, rigs, animation and physics
//! sources. The graph core never mutates this data; it only addresses it
//! through stable [`IdHandle`]s and session UUIDs.

mod anim;
mod data;
mod db;
mod id;
mod layer;
mod object;
pub mod physics;

pub use crate::anim::{AnimData, Driver, PropertyRef, PropertyTarget};
pub use crate::data::{
    Action, Armature, Bone, CacheFile, Camera, Curve, Image, Key, KeyBlock, Lattice, Light,
    LightProbe, Mask, Material, Mesh, MovieClip, NodeTree, ParticleSettings, Simulation, Sound,
    Speaker, Texture, World,
};
pub use crate::db::{Datablock, Main};
pub use crate::id::{
    DrawData, Id, IdHandle, IdRecalcFlag, IdType, LibraryTag, SessionUuid, ID_TYPE_COUNT,
};
pub use crate::layer::{
    Base, BaseFlag, Collection, LayerCollection, RigidBodyWorld, Scene, ViewLayer,
};
pub use crate::object::{
    Constraint, ConstraintKind, ConstraintTarget, EffectorWeights, FieldShape, ForceField,
    ForceFieldKind, IkConstraint, IkSolverKind, Modifier, ModifierKind, Object, ObjectType,
    ParentKind, ParentRef, ParticleSystem, Pose, PoseChannel, SplineIkConstraint,
};

#[cfg(test)]
mod tests;

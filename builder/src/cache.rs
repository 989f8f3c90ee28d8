// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Cached data shared by the builder passes: which properties are animated,
//! and the per-object constraint-to-channel lookup.

use fnv::FnvHashMap;

use scene::{IdHandle, Main, PropertyRef, PropertyTarget};

///
/// Per-object map from constraint name to the pose channel owning it. Built
/// lazily on first query and dropped with the builder cache.
///
#[derive(Debug, Default)]
struct ConstraintToChannelMap {
    by_constraint: FnvHashMap<String, String>,
}

impl ConstraintToChannelMap {
    fn build(main: &Main, object: IdHandle) -> ConstraintToChannelMap {
        let mut by_constraint = FnvHashMap::default();
        if let Some(pose) = main.object(object).and_then(|ob| ob.pose.as_ref()) {
            for pchan in &pose.channels {
                for constraint in &pchan.constraints {
                    by_constraint.insert(constraint.name.clone(), pchan.name.clone());
                }
            }
        }
        ConstraintToChannelMap { by_constraint }
    }
}

/// Cached data which can be re-used by multiple builders.
#[derive(Debug, Default)]
pub struct BuilderCache {
    constraint_to_pchan: FnvHashMap<IdHandle, ConstraintToChannelMap>,
}

impl BuilderCache {
    pub fn new() -> BuilderCache {
        BuilderCache::default()
    }

    ///
    /// The pose channel owning the named constraint of the object, or `None`
    /// for object-level constraints.
    ///
    pub fn pchan_for_constraint(
        &mut self,
        main: &Main,
        object: IdHandle,
        constraint: &str,
    ) -> Option<String> {
        let map = self
            .constraint_to_pchan
            .entry(object)
            .or_insert_with(|| ConstraintToChannelMap::build(main, object));
        map.by_constraint.get(constraint).cloned()
    }

    ///
    /// Whether any property of the given datum is animated, either by the
    /// owner's action curves or by a driver writing into it.
    ///
    pub fn is_any_property_animated(&self, main: &Main, target: &PropertyTarget) -> bool {
        let owner = target.owner();
        let adt = match main.block(owner) {
            Some(scene::Datablock::Object(object)) => object.adt.as_ref(),
            Some(scene::Datablock::Scene(scene)) => scene.adt.as_ref(),
            Some(scene::Datablock::Material(material)) => material.adt.as_ref(),
            Some(scene::Datablock::World(world)) => world.adt.as_ref(),
            Some(scene::Datablock::Mesh(mesh)) => mesh.adt.as_ref(),
            Some(scene::Datablock::Armature(armature)) => armature.adt.as_ref(),
            Some(scene::Datablock::Key(key)) => key.adt.as_ref(),
            _ => None,
        };
        let Some(adt) = adt else {
            return false;
        };
        let matches = |prop: &PropertyRef| prop.target == *target;
        adt.animated_properties.iter().any(matches)
            || adt.drivers.iter().any(|driver| matches(&driver.property))
    }
}

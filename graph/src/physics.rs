// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Per-graph cache of collider/effector lists keyed by collection, filled
//! during relations build and consumed during evaluation.

use fnv::FnvHashMap;

use scene::physics::{
    collision_relations_create, effector_relations_create, CollisionModifier, CollisionRelation,
    EffectorRelation,
};
use scene::{IdHandle, Main};

use crate::graph::Graph;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PhysicsRelationType {
    Effector = 0,
    Collision = 1,
    SmokeCollision = 2,
    DynamicBrush = 3,
}

pub const PHYSICS_RELATIONS_NUM: usize = 4;

pub fn modifier_to_relation_type(modifier: CollisionModifier) -> PhysicsRelationType {
    match modifier {
        CollisionModifier::Collision => PhysicsRelationType::Collision,
        CollisionModifier::Fluid => PhysicsRelationType::SmokeCollision,
        CollisionModifier::DynamicPaint => PhysicsRelationType::DynamicBrush,
    }
}

/// One cached relation list; the variant matches the map's relation type.
#[derive(Clone, Debug)]
pub enum PhysicsRelations {
    Effector(Vec<EffectorRelation>),
    Collision(Vec<CollisionRelation>),
}

///
/// Effector list for a collection, creating it on first use. A `None`
/// collection is a valid key meaning "all bases in the current view layer".
///
pub fn build_effector_relations<'g>(
    graph: &'g mut Graph,
    main: &Main,
    collection: Option<IdHandle>,
) -> &'g [EffectorRelation] {
    let slot = PhysicsRelationType::Effector as usize;
    if graph.physics_relations[slot].is_none() {
        graph.physics_relations[slot] = Some(FnvHashMap::default());
    }
    if !graph.physics_relations[slot]
        .as_ref()
        .expect("Effector map was just ensured")
        .contains_key(&collection)
    {
        let relations = match graph.view_layer(main) {
            Some(view_layer) => effector_relations_create(main, view_layer, collection),
            None => Vec::new(),
        };
        graph.physics_relations[slot]
            .as_mut()
            .expect("Effector map was just ensured")
            .insert(collection, PhysicsRelations::Effector(relations));
    }
    match graph.physics_relations[slot]
        .as_ref()
        .and_then(|map| map.get(&collection))
    {
        Some(PhysicsRelations::Effector(relations)) => relations,
        _ => &[],
    }
}

/// Collision list for a collection and collision-modifier kind.
pub fn build_collision_relations<'g>(
    graph: &'g mut Graph,
    main: &Main,
    collection: Option<IdHandle>,
    modifier: CollisionModifier,
) -> &'g [CollisionRelation] {
    let slot = modifier_to_relation_type(modifier) as usize;
    if graph.physics_relations[slot].is_none() {
        graph.physics_relations[slot] = Some(FnvHashMap::default());
    }
    if !graph.physics_relations[slot]
        .as_ref()
        .expect("Collision map was just ensured")
        .contains_key(&collection)
    {
        let relations = match graph.view_layer(main) {
            Some(view_layer) => collision_relations_create(main, view_layer, collection, modifier),
            None => Vec::new(),
        };
        graph.physics_relations[slot]
            .as_mut()
            .expect("Collision map was just ensured")
            .insert(collection, PhysicsRelations::Collision(relations));
    }
    match graph.physics_relations[slot]
        .as_ref()
        .and_then(|map| map.get(&collection))
    {
        Some(PhysicsRelations::Collision(relations)) => relations,
        _ => &[],
    }
}

/* Evaluation-time lookups; never create. */

pub fn get_effector_relations<'g>(
    graph: &'g Graph,
    collection: Option<IdHandle>,
) -> Option<&'g [EffectorRelation]> {
    let map = graph.physics_relations[PhysicsRelationType::Effector as usize].as_ref()?;
    match map.get(&collection) {
        Some(PhysicsRelations::Effector(relations)) => Some(relations),
        _ => None,
    }
}

pub fn get_collision_relations<'g>(
    graph: &'g Graph,
    collection: Option<IdHandle>,
    modifier: CollisionModifier,
) -> Option<&'g [CollisionRelation]> {
    let map = graph.physics_relations[modifier_to_relation_type(modifier) as usize].as_ref()?;
    match map.get(&collection) {
        Some(PhysicsRelations::Collision(relations)) => Some(relations),
        _ => None,
    }
}

pub fn clear_physics_relations(graph: &mut Graph) {
    for slot in &mut graph.physics_relations {
        *slot = None;
    }
}

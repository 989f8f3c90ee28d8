// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Host-side listing of effector and collision participants. The graph keeps
//! the results cached per collection; this module only computes the lists.

use crate::db::Main;
use crate::id::IdHandle;
use crate::layer::ViewLayer;
use crate::object::{ForceField, ModifierKind};

/// Which collision-style modifier a relation listing is for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CollisionModifier {
    Collision,
    Fluid,
    DynamicPaint,
}

#[derive(Clone, Debug)]
pub struct EffectorRelation {
    pub object: IdHandle,
    /// Name of the particle system when the effector is particle-based.
    pub psys: Option<String>,
    pub field: ForceField,
}

#[derive(Clone, Debug)]
pub struct CollisionRelation {
    pub object: IdHandle,
    /// Name of the modifier providing the collision shape.
    pub modifier: String,
}

fn collection_objects_into(main: &Main, collection: IdHandle, out: &mut Vec<IdHandle>) {
    let Some(collection) = main.collection(collection) else {
        return;
    };
    out.extend(collection.objects.iter().copied());
    for &child in &collection.children {
        collection_objects_into(main, child, out);
    }
}

///
/// Candidate objects for a physics relation listing: the collection's objects
/// (recursively) when one is given, otherwise every base of the view layer.
///
fn candidate_objects(
    main: &Main,
    view_layer: &ViewLayer,
    collection: Option<IdHandle>,
) -> Vec<IdHandle> {
    match collection {
        Some(collection) => {
            let mut objects = Vec::new();
            collection_objects_into(main, collection, &mut objects);
            objects
        }
        None => view_layer.bases.iter().map(|base| base.object).collect(),
    }
}

pub fn effector_relations_create(
    main: &Main,
    view_layer: &ViewLayer,
    collection: Option<IdHandle>,
) -> Vec<EffectorRelation> {
    let mut relations = Vec::new();
    for handle in candidate_objects(main, view_layer, collection) {
        let Some(object) = main.object(handle) else {
            continue;
        };
        if let Some(field) = &object.field {
            relations.push(EffectorRelation {
                object: handle,
                psys: None,
                field: field.clone(),
            });
        }
        for psys in &object.particle_systems {
            let Some(settings) = main.particle_settings(psys.settings) else {
                continue;
            };
            if let Some(field) = &settings.field {
                relations.push(EffectorRelation {
                    object: handle,
                    psys: Some(psys.name.clone()),
                    field: field.clone(),
                });
            }
        }
    }
    relations
}

pub fn collision_relations_create(
    main: &Main,
    view_layer: &ViewLayer,
    collection: Option<IdHandle>,
    modifier: CollisionModifier,
) -> Vec<CollisionRelation> {
    let mut relations = Vec::new();
    for handle in candidate_objects(main, view_layer, collection) {
        let Some(object) = main.object(handle) else {
            continue;
        };
        for md in &object.modifiers {
            let matches = matches!(
                (&md.kind, modifier),
                (ModifierKind::Collision, CollisionModifier::Collision)
                    | (ModifierKind::Fluid, CollisionModifier::Fluid)
                    | (ModifierKind::DynamicPaint, CollisionModifier::DynamicPaint)
            );
            if matches {
                relations.push(CollisionRelation {
                    object: handle,
                    modifier: md.name.clone(),
                });
            }
        }
    }
    relations
}

// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use crate::physics::{collision_relations_create, effector_relations_create, CollisionModifier};
use crate::{
    Base, Collection, Datablock, FieldShape, ForceField, ForceFieldKind, Main, Modifier,
    ModifierKind, Object, ObjectType, Scene, SessionUuid, ViewLayer,
};

fn wind_field() -> ForceField {
    ForceField {
        kind: ForceFieldKind::Wind,
        shape: FieldShape::Point,
        use_absorption: false,
        source: None,
    }
}

#[test]
fn handles_are_stable_and_typed() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut main = Main::new();
    let ob = main.add(Datablock::Object(Object::new("Cube", ObjectType::Mesh)));
    let scene = main.add(Datablock::Scene(Scene::new("Scene")));

    assert_eq!(main.id(ob).unwrap().name, "Cube");
    assert_eq!(main.id(scene).unwrap().name, "Scene");
    assert!(main.object(ob).is_some());
    assert!(main.object(scene).is_none());
    assert!(main.scene(scene).is_some());
}

#[test]
fn session_uuids_are_unique_and_resolvable() {
    let mut main = Main::new();
    let a = main.add(Datablock::Object(Object::new("A", ObjectType::Empty)));
    let b = main.add(Datablock::Object(Object::new("B", ObjectType::Empty)));

    let uuid_a = main.id(a).unwrap().session_uuid;
    let uuid_b = main.id(b).unwrap().session_uuid;
    assert_ne!(uuid_a, uuid_b);
    assert_eq!(main.by_session_uuid(uuid_a), Some(a));
    assert_eq!(main.by_session_uuid(SessionUuid(0)), None);
}

#[test]
fn effector_relations_scene_wide_and_per_collection() {
    let mut main = Main::new();
    let mut windy = Object::new("Windy", ObjectType::Empty);
    windy.field = Some(wind_field());
    let windy = main.add(Datablock::Object(windy));
    let plain = main.add(Datablock::Object(Object::new("Plain", ObjectType::Mesh)));

    let mut collection = Collection::new("Forces");
    collection.objects.push(windy);
    let collection = main.add(Datablock::Collection(collection));

    let mut view_layer = ViewLayer::new("View Layer");
    view_layer.bases.push(Base::new(windy));
    view_layer.bases.push(Base::new(plain));

    // Scene-wide: every base is a candidate.
    let scene_wide = effector_relations_create(&main, &view_layer, None);
    assert_eq!(scene_wide.len(), 1);
    assert_eq!(scene_wide[0].object, windy);

    // Collection-bound: only members of the collection.
    let bound = effector_relations_create(&main, &view_layer, Some(collection));
    assert_eq!(bound.len(), 1);
    assert_eq!(bound[0].object, windy);
}

#[test]
fn collision_relations_filter_by_modifier_kind() {
    let mut main = Main::new();
    let mut wall = Object::new("Wall", ObjectType::Mesh);
    wall.modifiers.push(Modifier {
        name: "Collision".to_owned(),
        kind: ModifierKind::Collision,
        show_viewport: true,
        show_render: true,
    });
    let wall = main.add(Datablock::Object(wall));

    let mut view_layer = ViewLayer::new("View Layer");
    view_layer.bases.push(Base::new(wall));

    let collisions = collision_relations_create(&main, &view_layer, None, CollisionModifier::Collision);
    assert_eq!(collisions.len(), 1);
    assert_eq!(collisions[0].modifier, "Collision");

    let brushes =
        collision_relations_create(&main, &view_layer, None, CollisionModifier::DynamicPaint);
    assert!(brushes.is_empty());
}

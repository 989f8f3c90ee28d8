// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use graph::tag::UpdateSource;
use graph::{
    registry, Depsgraph, EvaluationMode, NodeType, OpCode, OpFlag, OpIdKey,
};
use scene::{
    Base, ConstraintKind, ConstraintTarget, Datablock, Driver, IdHandle, IdRecalcFlag,
    IkConstraint, Main, Mesh, Object, ObjectType, ParentKind, ParentRef, Pose, PoseChannel,
    PropertyRef, PropertyTarget, Scene, ViewLayer,
};

use crate::graph_build_from_view_layer;

fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
    registry::register_node_types();
}

/// Scene with one view layer; returns the scene handle.
fn add_scene(main: &mut Main) -> IdHandle {
    let mut scene = Scene::new("Scene");
    scene.view_layers.push(ViewLayer::new("View Layer"));
    main.add(Datablock::Scene(scene))
}

fn add_to_view_layer(main: &mut Main, scene: IdHandle, object: IdHandle) {
    let scene = main.scene_mut(scene).expect("Scene exists");
    scene.view_layers[0].bases.push(Base::new(object));
}

fn add_mesh_object(main: &mut Main, scene: IdHandle, name: &str) -> IdHandle {
    let mesh = main.add(Datablock::Mesh(Mesh::new(&format!("{name}Mesh"))));
    let mut object = Object::new(name, ObjectType::Mesh);
    object.data = Some(mesh);
    let object = main.add(Datablock::Object(object));
    add_to_view_layer(main, scene, object);
    object
}

fn add_empty_object(main: &mut Main, scene: IdHandle, name: &str) -> IdHandle {
    let object = main.add(Datablock::Object(Object::new(name, ObjectType::Empty)));
    add_to_view_layer(main, scene, object);
    object
}

fn build(main: &Main, scene: IdHandle) -> Depsgraph {
    let depsgraph = Depsgraph::new(main, scene, "View Layer", EvaluationMode::Viewport);
    graph_build_from_view_layer(&depsgraph, main);
    depsgraph
}

fn op_needs_update(
    depsgraph: &Depsgraph,
    id: IdHandle,
    component: NodeType,
    comp_name: &str,
    opcode: OpCode,
    name: &str,
) -> bool {
    let graph = depsgraph.lock();
    let node = graph
        .find_operation_for_id(id, component, comp_name, &OpIdKey::new(opcode, name, -1))
        .unwrap_or_else(|| panic!("Missing operation {opcode:?} on {component:?}/{comp_name}"));
    graph.operation(node).flags.contains(OpFlag::NEEDS_UPDATE)
}

#[test]
fn simple_transform_change() {
    setup();
    let mut main = Main::new();
    let scene = add_scene(&mut main);
    let cube = add_mesh_object(&mut main, scene, "Cube");

    let depsgraph = build(&main, scene);
    assert!(depsgraph.consistency_check());

    depsgraph.tag_id_update(cube, IdRecalcFlag::TRANSFORM, UpdateSource::UserEdit);
    depsgraph.flush_updates(&mut main);

    for opcode in [
        OpCode::TransformInit,
        OpCode::TransformEval,
        OpCode::TransformFinal,
    ] {
        assert!(
            op_needs_update(&depsgraph, cube, NodeType::Transform, "", opcode, ""),
            "{opcode:?} should need an update"
        );
    }
    assert!(depsgraph
        .evaluated_recalc(cube)
        .contains(IdRecalcFlag::TRANSFORM));
    // No unrelated ID accumulated recalc bits.
    assert_eq!(depsgraph.evaluated_recalc(scene), IdRecalcFlag::empty());
}

#[test]
fn parent_propagation() {
    setup();
    let mut main = Main::new();
    let scene = add_scene(&mut main);
    let parent = add_mesh_object(&mut main, scene, "Parent");
    let child = add_mesh_object(&mut main, scene, "Child");
    main.object_mut(child).unwrap().parent = Some(ParentRef {
        object: parent,
        kind: ParentKind::Object,
        subtarget: None,
    });

    let depsgraph = build(&main, scene);
    depsgraph.tag_id_update(parent, IdRecalcFlag::TRANSFORM, UpdateSource::UserEdit);
    depsgraph.flush_updates(&mut main);

    assert!(op_needs_update(
        &depsgraph,
        child,
        NodeType::Transform,
        "",
        OpCode::TransformParent,
        ""
    ));
    assert!(op_needs_update(
        &depsgraph,
        child,
        NodeType::Transform,
        "",
        OpCode::TransformFinal,
        ""
    ));
    // Both IDs appear in the modified set.
    assert!(!depsgraph.evaluated_recalc(parent).is_empty());
    assert!(!depsgraph.evaluated_recalc(child).is_empty());
}

fn ik_chain_scene(main: &mut Main, chain_length: u16) -> (IdHandle, IdHandle, IdHandle) {
    let scene = add_scene(main);
    let goal = add_empty_object(main, scene, "Goal");

    let armature_data = main.add(Datablock::Armature(scene::Armature::new("ArmData")));
    let mut arm = Object::new("Arm", ObjectType::Armature);
    arm.data = Some(armature_data);
    let mut pose = Pose::default();
    let mut root = PoseChannel::new("Root");
    root.parent = None;
    let mut mid = PoseChannel::new("Mid");
    mid.parent = Some("Root".to_owned());
    let mut tip = PoseChannel::new("Tip");
    tip.parent = Some("Mid".to_owned());
    tip.constraints.push(scene::Constraint {
        name: "IK".to_owned(),
        kind: ConstraintKind::Kinematic(IkConstraint {
            target: Some(ConstraintTarget {
                object: goal,
                subtarget: None,
            }),
            pole_target: None,
            chain_length,
            use_tip: true,
        }),
        is_disabled: false,
    });
    pose.channels.push(root);
    pose.channels.push(mid);
    pose.channels.push(tip);
    arm.pose = Some(pose);
    let arm = main.add(Datablock::Object(arm));
    add_to_view_layer(main, scene, arm);
    (scene, arm, goal)
}

#[test]
fn ik_chain_tagging() {
    setup();
    let mut main = Main::new();
    let (scene, arm, goal) = ik_chain_scene(&mut main, 3);

    let depsgraph = build(&main, scene);
    assert!(depsgraph.consistency_check());

    depsgraph.tag_id_update(goal, IdRecalcFlag::TRANSFORM, UpdateSource::UserEdit);
    depsgraph.flush_updates(&mut main);

    // The solver sits at the chain root.
    assert!(op_needs_update(
        &depsgraph,
        arm,
        NodeType::EvalPose,
        "",
        OpCode::PoseIkSolver,
        "Root"
    ));
    for bone in ["Root", "Mid", "Tip"] {
        assert!(
            op_needs_update(&depsgraph, arm, NodeType::Bone, bone, OpCode::BoneDone, ""),
            "BoneDone of {bone} should need an update"
        );
    }
    assert!(op_needs_update(
        &depsgraph,
        arm,
        NodeType::EvalPose,
        "",
        OpCode::PoseDone,
        ""
    ));
}

#[test]
fn ik_chain_parent_links_use_pre_solve_result() {
    setup();
    let mut main = Main::new();
    let (scene, arm, _goal) = ik_chain_scene(&mut main, 3);
    let depsgraph = build(&main, scene);

    // Mid is parented to Root; both are in the same IK chain, so the parent
    // link must come from BoneReady, not BoneDone, or the chain deadlocks.
    let graph = depsgraph.lock();
    let ready = graph
        .find_operation_for_id(
            arm,
            NodeType::Bone,
            "Root",
            &OpIdKey::new(OpCode::BoneReady, "", -1),
        )
        .unwrap();
    let pose_parent = graph
        .find_operation_for_id(
            arm,
            NodeType::Bone,
            "Mid",
            &OpIdKey::new(OpCode::BonePoseParent, "", -1),
        )
        .unwrap();
    assert!(graph
        .check_nodes_connected(ready, pose_parent, Some("Parent Bone -> Child Bone"))
        .is_some());
}

#[test]
fn rebuild_preserves_entry_tags() {
    setup();
    let mut main = Main::new();
    let scene = add_scene(&mut main);
    let object = add_mesh_object(&mut main, scene, "X");

    let depsgraph = build(&main, scene);
    depsgraph.tag_id_update(object, IdRecalcFlag::GEOMETRY, UpdateSource::UserEdit);

    // Rebuild without a structural change; do not evaluate in between.
    graph_build_from_view_layer(&depsgraph, &main);

    let graph = depsgraph.lock();
    let geometry_eval = graph
        .find_operation_for_id(
            object,
            NodeType::Geometry,
            "",
            &OpIdKey::new(OpCode::GeometryEval, "", -1),
        )
        .expect("Geometry eval survives the rebuild");
    assert!(graph.entry_tags.contains(&geometry_eval));
    let flags = graph.operation(geometry_eval).flags;
    assert!(flags.contains(OpFlag::NEEDS_UPDATE | OpFlag::DIRECTLY_MODIFIED));
    assert!(flags.contains(OpFlag::USER_MODIFIED));
}

#[test]
fn rebuild_preserves_expanded_cow() {
    setup();
    let mut main = Main::new();
    let scene = add_scene(&mut main);
    let object = add_mesh_object(&mut main, scene, "X");

    let depsgraph = build(&main, scene);
    depsgraph.evaluate_copy_on_write(&main, object);
    graph_build_from_view_layer(&depsgraph, &main);

    let graph = depsgraph.lock();
    let id_node = graph
        .id_node(graph.find_id_node(object).unwrap())
        .unwrap();
    // The shadow was transferred by persistent key, not re-allocated.
    assert!(id_node.cow.is_expanded());
}

#[test]
fn driver_variable_propagates_to_driven_object() {
    setup();
    let mut main = Main::new();
    let scene = add_scene(&mut main);
    let cube = add_mesh_object(&mut main, scene, "Cube");
    let ctrl = add_empty_object(&mut main, scene, "Ctrl");

    let mut driver = Driver::new(
        PropertyRef::builtin(PropertyTarget::Id(cube), "location"),
        0,
    );
    driver
        .variables
        .push(PropertyRef::builtin(PropertyTarget::Id(ctrl), "location"));
    main.object_mut(cube).unwrap().adt = Some(scene::AnimData {
        action: None,
        animated_properties: Vec::new(),
        drivers: vec![driver],
    });

    let depsgraph = build(&main, scene);
    depsgraph.tag_id_update(ctrl, IdRecalcFlag::TRANSFORM, UpdateSource::UserEdit);
    depsgraph.flush_updates(&mut main);

    // Control transform -> driver -> driven transform.
    assert!(op_needs_update(
        &depsgraph,
        cube,
        NodeType::Parameters,
        "",
        OpCode::Driver,
        "location[0]"
    ));
    assert!(op_needs_update(
        &depsgraph,
        cube,
        NodeType::Transform,
        "",
        OpCode::TransformFinal,
        ""
    ));
}

#[test]
fn visible_components_mask_matches_components() {
    setup();
    let mut main = Main::new();
    let scene = add_scene(&mut main);
    let cube = add_mesh_object(&mut main, scene, "Cube");

    let depsgraph = build(&main, scene);
    let graph = depsgraph.lock();
    let id_node = graph.id_node(graph.find_id_node(cube).unwrap()).unwrap();

    let mut expected = 0u64;
    for (key, &comp_id) in &id_node.components {
        if graph.component(comp_id).affects_directly_visible {
            expected |= key.node_type.component_mask_bit();
        }
    }
    assert_eq!(id_node.visible_components_mask, expected);
    assert_ne!(id_node.visible_components_mask & NodeType::Transform.component_mask_bit(), 0);
}

#[test]
fn dependent_ids_follow_parenting() {
    setup();
    let mut main = Main::new();
    let scene = add_scene(&mut main);
    let parent = add_mesh_object(&mut main, scene, "Parent");
    let child = add_mesh_object(&mut main, scene, "Child");
    main.object_mut(child).unwrap().parent = Some(ParentRef {
        object: parent,
        kind: ParentKind::Object,
        subtarget: None,
    });

    let depsgraph = build(&main, scene);
    let mut dependents = Vec::new();
    depsgraph.foreach_dependent_id(parent, |id| dependents.push(id));
    assert!(dependents.contains(&child));
    assert!(!dependents.contains(&parent));

    let mut ancestors = Vec::new();
    depsgraph.foreach_ancestor_id(child, |id| ancestors.push(id));
    assert!(ancestors.contains(&parent));
}

#[test]
fn object_iteration_filters_by_linkage() {
    setup();
    let mut main = Main::new();
    let scene = add_scene(&mut main);
    let cube = add_mesh_object(&mut main, scene, "Cube");
    // Parent is pulled in indirectly, without a base.
    let helper = main.add(Datablock::Object(Object::new("Helper", ObjectType::Empty)));
    main.object_mut(cube).unwrap().parent = Some(ParentRef {
        object: helper,
        kind: ParentKind::Object,
        subtarget: None,
    });

    let depsgraph = build(&main, scene);

    let mut direct = Vec::new();
    depsgraph.foreach_object(graph::ObjectIterFlag::LINKED_DIRECTLY, |id| direct.push(id));
    assert!(direct.contains(&cube));
    assert!(!direct.contains(&helper));

    let mut indirect = Vec::new();
    depsgraph.foreach_object(graph::ObjectIterFlag::LINKED_INDIRECTLY, |id| {
        indirect.push(id)
    });
    assert!(indirect.contains(&helper));
}

#[test]
fn relations_validator_accepts_untouched_scene() {
    setup();
    let mut main = Main::new();
    let scene = add_scene(&mut main);
    add_mesh_object(&mut main, scene, "Cube");

    let depsgraph = build(&main, scene);
    assert!(crate::debug_relations_validate(&depsgraph, &main));
}

#[test]
fn build_is_idempotent_for_stats() {
    setup();
    let mut main = Main::new();
    let scene = add_scene(&mut main);
    add_mesh_object(&mut main, scene, "Cube");
    add_empty_object(&mut main, scene, "Helper");

    let depsgraph = build(&main, scene);
    let first = depsgraph.stats_simple();
    graph_build_from_view_layer(&depsgraph, &main);
    let second = depsgraph.stats_simple();
    assert_eq!(first, second);
    assert!(depsgraph.consistency_check());
    assert!(depsgraph.is_fully_evaluated());
}

#[test]
fn cow_relations_gate_components() {
    setup();
    let mut main = Main::new();
    let scene = add_scene(&mut main);
    let cube = add_mesh_object(&mut main, scene, "Cube");

    let depsgraph = build(&main, scene);
    let graph = depsgraph.lock();
    let cow = graph
        .find_operation_for_id(
            cube,
            NodeType::CopyOnWrite,
            "",
            &OpIdKey::new(OpCode::CopyOnWrite, "", -1),
        )
        .expect("Copy-on-write operation exists");
    let transform_init = graph
        .find_operation_for_id(
            cube,
            NodeType::Transform,
            "",
            &OpIdKey::new(OpCode::TransformInit, "", -1),
        )
        .unwrap();
    assert!(graph
        .check_nodes_connected(cow, transform_init, Some("CoW Dependency"))
        .is_some());
    // The copy-on-write operation carries its expansion callback.
    assert!(graph.operation(cow).eval.is_some());
}

#[test]
fn cow_callback_expands_shadow() {
    setup();
    let mut main = Main::new();
    let scene = add_scene(&mut main);
    let cube = add_mesh_object(&mut main, scene, "Cube");

    let depsgraph = build(&main, scene);
    let callback = {
        let graph = depsgraph.lock();
        let cow = graph
            .find_operation_for_id(
                cube,
                NodeType::CopyOnWrite,
                "",
                &OpIdKey::new(OpCode::CopyOnWrite, "", -1),
            )
            .unwrap();
        graph.operation(cow).eval.clone().unwrap()
    };

    // What the external evaluator does when it reaches the operation.
    let ctx = graph::EvalContext {
        depsgraph: &depsgraph,
        main: &main,
    };
    callback(&ctx);

    let graph = depsgraph.lock();
    let id_node = graph.id_node(graph.find_id_node(cube).unwrap()).unwrap();
    assert!(id_node.cow.is_expanded());
    assert_eq!(id_node.cow.evaluated().unwrap().name, "Cube");
}

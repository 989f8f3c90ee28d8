// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use scene::{
    Datablock, FieldShape, ForceField, ForceFieldKind, IdHandle, IdRecalcFlag, Image, Main, Object,
    ObjectType, Scene, ViewLayer,
};

use crate::node::{NodeId, NodeType, OpCode, OpFlag};
use crate::query::{self, EvaluatedRef};
use crate::query_foreach::ForeachFlag;
use crate::relation::RelationFlag;
use crate::tag::{self, UpdateSource};
use crate::{registry, Depsgraph, EvaluationMode, Graph};

struct Fixture {
    main: Main,
    scene: IdHandle,
    graph: Depsgraph,
}

fn fixture() -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    registry::register_node_types();

    let mut main = Main::new();
    let mut scene = Scene::new("Scene");
    scene.view_layers.push(ViewLayer::new("View Layer"));
    let scene = main.add(Datablock::Scene(scene));
    let graph = Depsgraph::new(&main, scene, "View Layer", EvaluationMode::Viewport);
    Fixture { main, scene, graph }
}

/// One empty object with a single-operation parameters component.
fn add_simple_id(main: &mut Main, graph: &mut Graph, name: &str) -> (IdHandle, NodeId) {
    let object = main.add(Datablock::Object(Object::new(name, ObjectType::Empty)));
    let id_node = graph.add_id_node(main, object, None);
    let comp = graph.add_component(id_node, NodeType::Parameters, "");
    let op = graph.ensure_operation(comp, OpCode::ParametersEval, "", -1, None);
    (object, op)
}

fn flags_of(graph: &Graph, node: NodeId) -> OpFlag {
    graph.operation(node).flags
}

#[test]
fn single_node_graph_flush_is_noop() {
    let mut fx = fixture();
    {
        let mut graph = fx.graph.lock();
        graph.need_update = false;
        assert!(graph.entry_tags.is_empty());
    }
    // Just the time source: flushing does nothing and the graph reports as
    // fully evaluated.
    fx.graph.flush_updates(&mut fx.main);
    assert!(fx.graph.is_fully_evaluated());

    fx.graph.tag_time();
    assert!(fx.graph.is_fully_evaluated());
}

#[test]
fn empty_entry_tags_leave_flags_untouched() {
    let mut fx = fixture();
    let (_, op) = {
        let mut graph = fx.graph.lock();
        add_simple_id(&mut fx.main, &mut graph, "A")
    };
    fx.graph.flush_updates(&mut fx.main);
    let graph = fx.graph.lock();
    assert_eq!(flags_of(&graph, op), OpFlag::empty());
}

#[test]
fn tagging_is_idempotent() {
    let mut fx = fixture();
    let mut graph = fx.graph.lock();
    let (object, op) = add_simple_id(&mut fx.main, &mut graph, "A");

    tag::id_tag_update(&mut graph, object, IdRecalcFlag::PARAMETERS, UpdateSource::UserEdit);
    let tags_once: Vec<_> = graph.entry_tags.iter().copied().collect();
    tag::id_tag_update(&mut graph, object, IdRecalcFlag::PARAMETERS, UpdateSource::UserEdit);
    tag::id_tag_update(&mut graph, object, IdRecalcFlag::PARAMETERS, UpdateSource::UserEdit);
    let tags_thrice: Vec<_> = graph.entry_tags.iter().copied().collect();

    assert_eq!(tags_once.len(), tags_thrice.len());
    assert!(graph.entry_tags.contains(&op));
    assert!(flags_of(&graph, op).contains(OpFlag::NEEDS_UPDATE | OpFlag::DIRECTLY_MODIFIED));
}

#[test]
fn tagging_unknown_id_is_silently_ignored() {
    let mut fx = fixture();
    let unknown = fx
        .main
        .add(Datablock::Object(Object::new("Loose", ObjectType::Empty)));
    fx.graph
        .tag_id_update(unknown, IdRecalcFlag::TRANSFORM, UpdateSource::UserEdit);
    assert!(fx.graph.lock().entry_tags.is_empty());
}

#[test]
fn check_before_add_merges_duplicate_relations() {
    let mut fx = fixture();
    let mut graph = fx.graph.lock();
    let (_, op_a) = add_simple_id(&mut fx.main, &mut graph, "A");
    let (_, op_b) = add_simple_id(&mut fx.main, &mut graph, "B");

    let first = graph.add_new_relation(op_a, op_b, "Link", RelationFlag::CHECK_BEFORE_ADD);
    let second = graph.add_new_relation(
        op_a,
        op_b,
        "Link",
        RelationFlag::CHECK_BEFORE_ADD | RelationFlag::NO_FLUSH,
    );
    assert_eq!(first, second);
    assert_eq!(graph.pg.edge_count(), 1);
    // Flag bits were merged into the existing relation.
    assert!(graph.pg[first]
        .flags
        .contains(RelationFlag::CHECK_BEFORE_ADD | RelationFlag::NO_FLUSH));

    // A different description is a different relation.
    graph.add_new_relation(op_a, op_b, "Other Link", RelationFlag::CHECK_BEFORE_ADD);
    assert_eq!(graph.pg.edge_count(), 2);
}

#[test]
fn flush_propagates_along_chain() {
    let mut fx = fixture();
    let (op_a, op_b, op_c) = {
        let mut graph = fx.graph.lock();
        let (_, op_a) = add_simple_id(&mut fx.main, &mut graph, "A");
        let (_, op_b) = add_simple_id(&mut fx.main, &mut graph, "B");
        let (_, op_c) = add_simple_id(&mut fx.main, &mut graph, "C");
        graph.add_new_relation(op_a, op_b, "A -> B", RelationFlag::empty());
        graph.add_new_relation(op_b, op_c, "B -> C", RelationFlag::empty());
        tag::tag_operation(&mut graph, op_a, UpdateSource::UserEdit);
        (op_a, op_b, op_c)
    };
    fx.graph.flush_updates(&mut fx.main);

    let graph = fx.graph.lock();
    for op in [op_a, op_b, op_c] {
        assert!(flags_of(&graph, op).contains(OpFlag::NEEDS_UPDATE));
    }
    // Only the entry point is directly modified.
    assert!(flags_of(&graph, op_a).contains(OpFlag::DIRECTLY_MODIFIED));
    assert!(!flags_of(&graph, op_b).contains(OpFlag::DIRECTLY_MODIFIED));
}

#[test]
fn no_flush_relation_blocks_propagation() {
    let mut fx = fixture();
    let (op_a, op_b, op_c) = {
        let mut graph = fx.graph.lock();
        let (_, op_a) = add_simple_id(&mut fx.main, &mut graph, "A");
        let (_, op_b) = add_simple_id(&mut fx.main, &mut graph, "B");
        let (_, op_c) = add_simple_id(&mut fx.main, &mut graph, "C");
        graph.add_new_relation(op_a, op_b, "A -> B", RelationFlag::empty());
        graph.add_new_relation(op_b, op_c, "B -> C", RelationFlag::NO_FLUSH);
        tag::tag_operation(&mut graph, op_a, UpdateSource::UserEdit);
        (op_a, op_b, op_c)
    };
    fx.graph.flush_updates(&mut fx.main);

    let graph = fx.graph.lock();
    assert!(flags_of(&graph, op_a).contains(OpFlag::NEEDS_UPDATE));
    assert!(flags_of(&graph, op_b).contains(OpFlag::NEEDS_UPDATE));
    assert!(!flags_of(&graph, op_c).contains(OpFlag::NEEDS_UPDATE));
}

#[test]
fn flush_user_edit_only_gates_on_source() {
    // Tagged from time: the gated relation does not propagate.
    let mut fx = fixture();
    let (op_a, op_b) = {
        let mut graph = fx.graph.lock();
        let (_, op_a) = add_simple_id(&mut fx.main, &mut graph, "A");
        let (_, op_b) = add_simple_id(&mut fx.main, &mut graph, "B");
        graph.add_new_relation(op_a, op_b, "A -> B", RelationFlag::FLUSH_USER_EDIT_ONLY);
        tag::tag_operation(&mut graph, op_a, UpdateSource::Time);
        (op_a, op_b)
    };
    fx.graph.flush_updates(&mut fx.main);
    {
        let graph = fx.graph.lock();
        assert!(flags_of(&graph, op_a).contains(OpFlag::NEEDS_UPDATE));
        assert!(!flags_of(&graph, op_b).contains(OpFlag::NEEDS_UPDATE));
    }

    // Tagged by the user: it does.
    let mut fx = fixture();
    let (op_a, op_b) = {
        let mut graph = fx.graph.lock();
        let (_, op_a) = add_simple_id(&mut fx.main, &mut graph, "A");
        let (_, op_b) = add_simple_id(&mut fx.main, &mut graph, "B");
        graph.add_new_relation(op_a, op_b, "A -> B", RelationFlag::FLUSH_USER_EDIT_ONLY);
        tag::tag_operation(&mut graph, op_a, UpdateSource::UserEdit);
        (op_a, op_b)
    };
    fx.graph.flush_updates(&mut fx.main);
    let graph = fx.graph.lock();
    assert!(flags_of(&graph, op_a).contains(OpFlag::NEEDS_UPDATE));
    assert!(flags_of(&graph, op_b).contains(OpFlag::NEEDS_UPDATE));
    // The user-modified bit was flushed along so B knows what happened.
    assert!(flags_of(&graph, op_b).contains(OpFlag::USER_MODIFIED));
}

#[test]
fn self_loop_terminates() {
    let mut fx = fixture();
    let op_a = {
        let mut graph = fx.graph.lock();
        let (_, op_a) = add_simple_id(&mut fx.main, &mut graph, "A");
        graph.add_new_relation(op_a, op_a, "Self", RelationFlag::empty());
        tag::tag_operation(&mut graph, op_a, UpdateSource::UserEdit);
        op_a
    };
    // The scheduled set breaks the loop; the flush must return.
    fx.graph.flush_updates(&mut fx.main);
    assert!(fx
        .graph
        .lock()
        .operation(op_a)
        .flags
        .contains(OpFlag::NEEDS_UPDATE));
}

#[test]
fn geometry_visibility_is_skipped_by_flush_but_not_by_direct_tag() {
    let mut fx = fixture();
    let (geometry_comp, op_eval, op_visibility) = {
        let mut graph = fx.graph.lock();
        let (_, upstream) = add_simple_id(&mut fx.main, &mut graph, "Upstream");
        let object = fx
            .main
            .add(Datablock::Object(Object::new("Mesh", ObjectType::Mesh)));
        let id_node = graph.add_id_node(&fx.main, object, None);
        let comp = graph.add_component(id_node, NodeType::Geometry, "");
        let op_init = graph.ensure_operation(comp, OpCode::GeometryEvalInit, "", -1, None);
        let op_eval = graph.ensure_operation(comp, OpCode::GeometryEval, "", -1, None);
        let op_visibility = graph.ensure_operation(comp, OpCode::Visibility, "", -1, None);
        graph.add_new_relation(upstream, op_init, "Upstream -> Geometry", RelationFlag::empty());
        tag::tag_operation(&mut graph, upstream, UpdateSource::Time);
        (comp, op_eval, op_visibility)
    };
    fx.graph.flush_updates(&mut fx.main);
    {
        let graph = fx.graph.lock();
        // Updates flushed into the geometry component do not re-run the
        // visibility operation.
        assert!(flags_of(&graph, op_eval).contains(OpFlag::NEEDS_UPDATE));
        assert!(!flags_of(&graph, op_visibility).contains(OpFlag::NEEDS_UPDATE));
    }

    // A manual geometry tag, on the other hand, re-checks visibility too.
    let mut graph = fx.graph.lock();
    tag::tag_component(&mut graph, geometry_comp, UpdateSource::UserEdit);
    assert!(flags_of(&graph, op_visibility).contains(OpFlag::NEEDS_UPDATE));
}

#[test]
fn bone_change_schedules_whole_pose() {
    let mut fx = fixture();
    let (bone_local, pose_init, pose_done) = {
        let mut graph = fx.graph.lock();
        let object = fx
            .main
            .add(Datablock::Object(Object::new("Rig", ObjectType::Armature)));
        let id_node = graph.add_id_node(&fx.main, object, None);

        let pose = graph.add_component(id_node, NodeType::EvalPose, "");
        let pose_init = graph.ensure_operation(pose, OpCode::PoseInit, "", -1, None);
        let pose_done = graph.ensure_operation(pose, OpCode::PoseDone, "", -1, None);
        graph.component_mut(pose).set_entry_operation(pose_init);
        graph.component_mut(pose).set_exit_operation(pose_done);

        let bone = graph.add_component(id_node, NodeType::Bone, "Bone");
        let bone_local = graph.ensure_operation(bone, OpCode::BoneLocal, "", -1, None);

        tag::tag_operation(&mut graph, bone_local, UpdateSource::UserEdit);
        (bone_local, pose_init, pose_done)
    };
    fx.graph.flush_updates(&mut fx.main);

    let graph = fx.graph.lock();
    // Bone changes invalidate the whole pose solve.
    for op in [bone_local, pose_init, pose_done] {
        assert!(flags_of(&graph, op).contains(OpFlag::NEEDS_UPDATE));
    }
}

#[test]
fn flush_accumulates_recalc_bits_per_id() {
    let mut fx = fixture();
    let object = {
        let mut graph = fx.graph.lock();
        let object = fx
            .main
            .add(Datablock::Object(Object::new("Cube", ObjectType::Mesh)));
        let id_node = graph.add_id_node(&fx.main, object, None);
        let comp = graph.add_component(id_node, NodeType::Transform, "");
        let op = graph.ensure_operation(comp, OpCode::TransformLocal, "", -1, None);
        tag::tag_operation(&mut graph, op, UpdateSource::UserEdit);
        object
    };
    fx.graph.flush_updates(&mut fx.main);

    assert!(fx
        .graph
        .evaluated_recalc(object)
        .contains(IdRecalcFlag::TRANSFORM));
    assert!(fx.graph.id_type_updated(scene::IdType::Object));
    assert!(fx.graph.id_type_any_updated());
    // No other ID accumulated anything.
    assert_eq!(fx.graph.evaluated_recalc(fx.scene), IdRecalcFlag::empty());
}

#[test]
fn time_source_tag_reaches_linked_operations() {
    let mut fx = fixture();
    let op = {
        let mut graph = fx.graph.lock();
        let (_, op) = add_simple_id(&mut fx.main, &mut graph, "Animated");
        let time_source = graph.time_source;
        graph.add_new_relation(time_source, op, "Time Source", RelationFlag::empty());
        op
    };
    fx.graph.tag_time();
    fx.graph.flush_updates(&mut fx.main);

    let graph = fx.graph.lock();
    assert!(flags_of(&graph, op).contains(OpFlag::NEEDS_UPDATE));
    assert!(!flags_of(&graph, op).contains(OpFlag::USER_MODIFIED));
}

#[test]
fn clear_tags_resets_entry_state() {
    let mut fx = fixture();
    {
        let mut graph = fx.graph.lock();
        let (_, op) = add_simple_id(&mut fx.main, &mut graph, "A");
        tag::tag_operation(&mut graph, op, UpdateSource::UserEdit);
        graph.tag_time_source();
    }
    fx.graph.clear_tags();
    let graph = fx.graph.lock();
    assert!(graph.entry_tags.is_empty());
    assert!(!graph.time_source().tagged_for_update);
}

#[test]
fn editor_callbacks_fire_for_active_graph_with_expanded_cow() {
    let id_updates = Arc::new(AtomicUsize::new(0));
    let scene_updates = Arc::new(AtomicUsize::new(0));
    {
        let id_updates = Arc::clone(&id_updates);
        let scene_updates = Arc::clone(&scene_updates);
        registry::set_editors_update_cb(
            Arc::new(move |_ctx, _id| {
                id_updates.fetch_add(1, Ordering::SeqCst);
            }),
            Arc::new(move |_ctx, updated| {
                if updated {
                    scene_updates.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );
    }

    let mut fx = fixture();
    let object = {
        let mut graph = fx.graph.lock();
        let object = fx
            .main
            .add(Datablock::Object(Object::new("Cube", ObjectType::Mesh)));
        let id_node = graph.add_id_node(&fx.main, object, None);
        let comp = graph.add_component(id_node, NodeType::Transform, "");
        let op = graph.ensure_operation(comp, OpCode::TransformLocal, "", -1, None);
        tag::tag_operation(&mut graph, op, UpdateSource::UserEdit);
        object
    };
    fx.graph.make_active();
    // The shadow must be expanded before editors are notified; this
    // distinguishes user edits from the initial evaluation.
    fx.graph.evaluate_copy_on_write(&fx.main, object);
    fx.graph.flush_updates(&mut fx.main);

    assert_eq!(id_updates.load(Ordering::SeqCst), 1);
    assert_eq!(scene_updates.load(Ordering::SeqCst), 1);
    registry::clear_editors_update_cb();
}

// `get_evaluated_id` is the copy-on-write resolution: originals of no-CoW
// types and unknown IDs resolve to themselves, everything else to the
// graph-owned shadow.
#[test]
fn cow_round_trip_and_aliasing() {
    let mut fx = fixture();
    let (object, image) = {
        let mut graph = fx.graph.lock();
        let object = fx
            .main
            .add(Datablock::Object(Object::new("Cube", ObjectType::Mesh)));
        let image = fx.main.add(Datablock::Image(Image::new("Tex")));
        graph.add_id_node(&fx.main, object, None);
        graph.add_id_node(&fx.main, image, None);
        (object, image)
    };
    fx.graph.evaluate_copy_on_write(&fx.main, object);

    let graph = fx.graph.lock();
    match query::get_evaluated_id(&graph, object) {
        EvaluatedRef::Evaluated(evaluated) => {
            assert!(evaluated.is_expanded);
            assert_eq!(evaluated.orig, object);
            assert_eq!(evaluated.name, "Cube");
        }
        EvaluatedRef::Original(_) => panic!("Objects are copy-on-written"),
    }
    // Images do not get a shadow; the evaluated ID is the original.
    match query::get_evaluated_id(&graph, image) {
        EvaluatedRef::Original(id) => assert_eq!(id, image),
        EvaluatedRef::Evaluated(_) => panic!("Images are not copy-on-written"),
    }
    drop(graph);
    // Unknown IDs resolve to themselves.
    let loose = fx
        .main
        .add(Datablock::Object(Object::new("Loose", ObjectType::Empty)));
    let graph = fx.graph.lock();
    assert_eq!(query::get_evaluated_id(&graph, loose).original(), loose);
}

#[test]
fn recalc_clear_backup_restore() {
    let mut fx = fixture();
    let object = {
        let mut graph = fx.graph.lock();
        let object = fx
            .main
            .add(Datablock::Object(Object::new("Cube", ObjectType::Mesh)));
        let id_node = graph.add_id_node(&fx.main, object, None);
        let comp = graph.add_component(id_node, NodeType::Geometry, "");
        let op = graph.ensure_operation(comp, OpCode::GeometryEval, "", -1, None);
        tag::tag_operation(&mut graph, op, UpdateSource::UserEdit);
        object
    };
    fx.graph.flush_updates(&mut fx.main);
    assert!(fx
        .graph
        .evaluated_recalc(object)
        .contains(IdRecalcFlag::GEOMETRY));

    fx.graph.ids_clear_recalc(true);
    assert_eq!(fx.graph.evaluated_recalc(object), IdRecalcFlag::empty());

    fx.graph.ids_restore_recalc();
    assert!(fx
        .graph
        .evaluated_recalc(object)
        .contains(IdRecalcFlag::GEOMETRY));
}

#[test]
fn dependent_walk_excludes_self_and_reports_each_id_once() {
    let mut fx = fixture();
    let (id_a, id_b, id_c) = {
        let mut graph = fx.graph.lock();
        let (id_a, op_a) = add_simple_id(&mut fx.main, &mut graph, "A");
        let (id_b, op_b) = add_simple_id(&mut fx.main, &mut graph, "B");
        let (id_c, op_c) = add_simple_id(&mut fx.main, &mut graph, "C");
        graph.add_new_relation(op_a, op_b, "A -> B", RelationFlag::empty());
        graph.add_new_relation(op_b, op_c, "B -> C", RelationFlag::empty());
        // A second path to C must not produce a second report.
        graph.add_new_relation(op_a, op_c, "A -> C", RelationFlag::empty());
        (id_a, id_b, id_c)
    };

    let mut reported = Vec::new();
    fx.graph.foreach_dependent_id(id_a, |id| reported.push(id));
    assert!(!reported.contains(&id_a));
    assert_eq!(reported.len(), 2);
    assert!(reported.contains(&id_b));
    assert!(reported.contains(&id_c));
}

#[test]
fn ancestor_walk_reports_upstream_ids() {
    let mut fx = fixture();
    let (id_a, id_b, id_c) = {
        let mut graph = fx.graph.lock();
        let (id_a, op_a) = add_simple_id(&mut fx.main, &mut graph, "A");
        let (id_b, op_b) = add_simple_id(&mut fx.main, &mut graph, "B");
        let (id_c, op_c) = add_simple_id(&mut fx.main, &mut graph, "C");
        graph.add_new_relation(op_a, op_b, "A -> B", RelationFlag::empty());
        graph.add_new_relation(op_b, op_c, "B -> C", RelationFlag::empty());
        (id_a, id_b, id_c)
    };

    let mut reported = Vec::new();
    fx.graph.foreach_ancestor_id(id_c, |id| reported.push(id));
    assert_eq!(reported.len(), 2);
    assert!(reported.contains(&id_a));
    assert!(reported.contains(&id_b));
    assert!(!reported.contains(&id_c));
}

#[test]
fn visibility_components_are_never_reported() {
    let mut fx = fixture();
    let (id_a, id_b) = {
        let mut graph = fx.graph.lock();
        let (id_a, op_a) = add_simple_id(&mut fx.main, &mut graph, "A");
        // B only has an (internal) visibility component.
        let id_b = fx
            .main
            .add(Datablock::Object(Object::new("B", ObjectType::Mesh)));
        let id_node_b = graph.add_id_node(&fx.main, id_b, None);
        let visibility = graph.add_component(id_node_b, NodeType::Visibility, "");
        let op_b = graph.ensure_operation(visibility, OpCode::Visibility, "", -1, None);
        graph.add_new_relation(op_b, op_a, "Visibility -> A", RelationFlag::empty());
        (id_a, id_b)
    };

    // Dependent walk from B never seeds from the visibility component.
    let mut reported = Vec::new();
    fx.graph.foreach_dependent_id(id_b, |id| reported.push(id));
    assert!(reported.is_empty());
    let _ = id_a;
}

#[test]
fn ignore_transform_solvers_short_circuits_rigidbody() {
    let mut fx = fixture();
    let (id_a, id_b, id_sim) = {
        let mut graph = fx.graph.lock();
        let (id_a, op_a) = add_simple_id(&mut fx.main, &mut graph, "A");
        let (id_b, op_b) = add_simple_id(&mut fx.main, &mut graph, "B");

        let sim = fx
            .main
            .add(Datablock::Object(Object::new("Sim", ObjectType::Empty)));
        let sim_node = graph.add_id_node(&fx.main, sim, None);
        let sim_comp = graph.add_component(sim_node, NodeType::Transform, "");
        let op_sim = graph.ensure_operation(sim_comp, OpCode::RigidbodySim, "", -1, None);

        graph.add_new_relation(op_a, op_sim, "A -> Sim", RelationFlag::empty());
        graph.add_new_relation(op_sim, op_b, "Sim -> B", RelationFlag::empty());
        (id_a, id_b, sim)
    };

    let mut unfiltered = Vec::new();
    fx.graph.foreach_dependent_id_component(
        id_a,
        crate::node::ObjectComponent::Any,
        ForeachFlag::empty(),
        |id, _comp| unfiltered.push(id),
    );
    assert!(unfiltered.contains(&id_sim));
    assert!(unfiltered.contains(&id_b));

    let mut filtered = Vec::new();
    fx.graph.foreach_dependent_id_component(
        id_a,
        crate::node::ObjectComponent::Any,
        ForeachFlag::IGNORE_TRANSFORM_SOLVERS,
        |id, _comp| filtered.push(id),
    );
    // The walk stops at the rigid-body simulation operation.
    assert!(!filtered.contains(&id_sim));
    assert!(!filtered.contains(&id_b));
}

#[test]
fn foreach_id_iterates_in_allocation_order() {
    let mut fx = fixture();
    let (id_a, id_b) = {
        let mut graph = fx.graph.lock();
        let (id_a, _) = add_simple_id(&mut fx.main, &mut graph, "A");
        let (id_b, _) = add_simple_id(&mut fx.main, &mut graph, "B");
        (id_a, id_b)
    };
    let mut reported = Vec::new();
    fx.graph.foreach_id(|id| reported.push(id));
    assert_eq!(reported, vec![id_a, id_b]);
}

#[test]
fn valency_and_consistency_after_finalize() {
    let mut fx = fixture();
    {
        let mut graph = fx.graph.lock();
        let (_, op_a) = add_simple_id(&mut fx.main, &mut graph, "A");
        let (_, op_b) = add_simple_id(&mut fx.main, &mut graph, "B");
        let (_, op_c) = add_simple_id(&mut fx.main, &mut graph, "C");
        graph.add_new_relation(op_a, op_c, "A -> C", RelationFlag::empty());
        graph.add_new_relation(op_b, op_c, "B -> C", RelationFlag::empty());
        let time_source = graph.time_source;
        graph.add_new_relation(time_source, op_a, "Time Source", RelationFlag::empty());
        graph.finalize_build();

        // Time source does not count towards operation valency.
        assert_eq!(graph.operation(op_a).num_links_pending, 0);
        assert_eq!(graph.operation(op_c).num_links_pending, 2);
    }
    assert!(fx.graph.consistency_check());

    let stats = fx.graph.stats_simple();
    assert_eq!(stats.operations, 3);
    // Three IDs, one component each.
    assert_eq!(stats.outer_nodes, 6);
    // Two operation edges plus the time-source edge.
    assert_eq!(stats.relations, 3);
}

#[test]
fn physics_relation_cache_fills_lazily_and_supports_null_key() {
    let mut fx = fixture();
    let windy = {
        let mut windy = Object::new("Windy", ObjectType::Empty);
        windy.field = Some(ForceField {
            kind: ForceFieldKind::Wind,
            shape: FieldShape::Point,
            use_absorption: false,
            source: None,
        });
        fx.main.add(Datablock::Object(windy))
    };
    {
        let scene = fx.main.scene_mut(fx.scene).unwrap();
        scene.view_layers[0].bases.push(scene::Base::new(windy));
    }

    let mut graph = fx.graph.lock();
    assert!(crate::physics::get_effector_relations(&graph, None).is_none());

    let relations = crate::physics::build_effector_relations(&mut graph, &fx.main, None);
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].object, windy);

    // Cached now; the evaluation-time lookup sees it.
    assert_eq!(
        crate::physics::get_effector_relations(&graph, None).map(|r| r.len()),
        Some(1)
    );

    crate::physics::clear_physics_relations(&mut graph);
    assert!(crate::physics::get_effector_relations(&graph, None).is_none());
}

#[test]
fn live_graph_registry_tracks_graphs() {
    let fx = fixture();
    let graph_id = {
        let other = Depsgraph::new(&fx.main, fx.scene, "View Layer", EvaluationMode::Render);
        let graph_id = other.lock().graph_id;
        assert!(registry::is_graph_registered(graph_id));
        graph_id
    };
    // Dropping the graph unregisters it.
    assert!(!registry::is_graph_registered(graph_id));
    assert!(registry::live_graph_count() >= 1);
}

#[test]
fn replace_owners_rebinds_database() {
    let fx = fixture();
    let mut other_main = Main::new();
    let mut other_scene = Scene::new("Other");
    other_scene.view_layers.push(ViewLayer::new("View Layer"));
    let other_scene = other_main.add(Datablock::Scene(other_scene));

    fx.graph.replace_owners(&other_main, other_scene, "View Layer");
    let graph = fx.graph.lock();
    assert_eq!(graph.main_id, other_main.main_id());
    assert_eq!(graph.scene, other_scene);
}

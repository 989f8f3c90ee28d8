// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The relations pass: consume the fully-constructed node set and draw the
//! directed relations between operations, using key-based addressing.

use itertools::Itertools;
use log::debug;

use graph::node::id_node::{CustomDataMasks, CUSTOMDATA_MASK_DEFORMVERT, EVAL_FLAG_NEED_CURVE_PATH};
use graph::{registry, Graph, LinkedState, NodeType, OpCode, RelationFlag};
use scene::physics::CollisionModifier;
use scene::{
    AnimData, Constraint, ConstraintKind, ConstraintTarget, Datablock, Driver, FieldShape,
    ForceFieldKind, IdHandle, LayerCollection, Main, ModifierKind, ObjectType, ParentKind,
    ViewLayer,
};

use crate::api::{resolve_property, PointerSource};
use crate::cache::BuilderCache;
use crate::keys::{ComponentKey, Key, OpKey};
use crate::map::BuilderMap;
use crate::pchanmap::RootChannelMap;

pub struct RelationBuilder<'a> {
    pub(crate) main: &'a Main,
    pub(crate) graph: &'a mut Graph,
    pub(crate) cache: &'a mut BuilderCache,
    pub(crate) built_map: BuilderMap,
    /// Scene currently being built; changes when recursing into sets.
    pub(crate) scene: IdHandle,
}

impl<'a> RelationBuilder<'a> {
    pub fn new(main: &'a Main, graph: &'a mut Graph, cache: &'a mut BuilderCache) -> RelationBuilder<'a> {
        let scene = graph.scene;
        RelationBuilder {
            main,
            graph,
            cache,
            built_map: BuilderMap::default(),
            scene,
        }
    }

    /* Relation helpers. */

    pub(crate) fn add_relation(&mut self, from: impl Into<Key>, to: impl Into<Key>, description: &str) {
        self.add_relation_flags(from, to, description, RelationFlag::empty());
    }

    pub(crate) fn add_relation_flags(
        &mut self,
        from: impl Into<Key>,
        to: impl Into<Key>,
        description: &str,
        flags: RelationFlag,
    ) {
        let from = from.into();
        let to = to.into();
        let Some(from_node) = from.resolve(self.graph, true) else {
            debug!(
                "Could not resolve {} for relation \"{description}\"",
                from.identifier()
            );
            return;
        };
        let Some(to_node) = to.resolve(self.graph, false) else {
            debug!(
                "Could not resolve {} for relation \"{description}\"",
                to.identifier()
            );
            return;
        };
        self.graph.add_new_relation(from_node, to_node, description, flags);
    }

    fn add_time_relation(&mut self, to: impl Into<Key>, description: &str) {
        self.add_relation(Key::TimeSource, to, description);
    }

    pub(crate) fn add_customdata_mask(&mut self, object: IdHandle, mask: CustomDataMasks) {
        if let Some(id_node) = self
            .graph
            .find_id_node(object)
            .and_then(|id_node_id| self.graph.id_node_mut(id_node_id))
        {
            id_node.customdata_masks.merge(&mask);
        }
    }

    pub(crate) fn add_special_eval_flag(&mut self, id: IdHandle, flag: u32) {
        if let Some(id_node) = self
            .graph
            .find_id_node(id)
            .and_then(|id_node_id| self.graph.id_node_mut(id_node_id))
        {
            id_node.eval_flags |= flag;
        }
    }

    /// Make the visibility of `id_to` imply evaluation of `id_from`.
    pub(crate) fn add_visibility_relation(&mut self, id_from: IdHandle, id_to: IdHandle) {
        self.add_relation_flags(
            ComponentKey::new(id_from, NodeType::Visibility),
            ComponentKey::new(id_to, NodeType::Visibility),
            "Visibility",
            RelationFlag::CHECK_BEFORE_ADD | RelationFlag::NO_FLUSH,
        );
    }

    /// Resolve a property reference and wire it to the given key.
    fn add_property_relation_to(&mut self, prop: &scene::PropertyRef, to: Key, description: &str) {
        match resolve_property(self.main, self.cache, prop, PointerSource::Entry) {
            Some(from) => self.add_relation(from, to, description),
            None => debug!("Unresolvable property for relation \"{description}\""),
        }
    }

    fn add_property_relation_from(&mut self, from: Key, prop: &scene::PropertyRef, description: &str) {
        match resolve_property(self.main, self.cache, prop, PointerSource::Exit) {
            Some(to) => self.add_relation(from, to, description),
            None => debug!("Unresolvable property for relation \"{description}\""),
        }
    }

    /* View layer. */

    pub fn build_view_layer(
        &mut self,
        scene: IdHandle,
        view_layer: &ViewLayer,
        linked_state: LinkedState,
    ) {
        // Guard against set-scene cycles and double building.
        if !self.built_map.check_is_built_and_tag(scene) {
            return;
        }
        let main = self.main;
        self.scene = scene;
        let scene_block = main.scene(scene).expect("Scene is in the database");

        for base in &view_layer.bases {
            if self.graph.find_id_node(base.object).is_some() {
                self.build_object(base.object);
            }
        }
        self.build_layer_collections(&view_layer.layer_collections);
        if let Some(camera) = scene_block.camera {
            self.build_object(camera);
        }
        if scene_block.rigidbody_world.is_some() {
            self.build_rigidbody(scene);
        }
        if let Some(adt) = &scene_block.adt {
            self.build_animdata(scene, adt);
        }
        if let Some(world) = scene_block.world {
            self.build_world(world);
        }
        let masks: Vec<IdHandle> = main.masks().map(|block| block.id.handle).collect();
        for mask in masks {
            self.build_mask(mask);
        }
        let movieclips: Vec<IdHandle> = main.movieclips().map(|block| block.id.handle).collect();
        for clip in movieclips {
            self.build_movieclip(clip);
        }
        let cachefiles: Vec<IdHandle> = main.cachefiles().map(|block| block.id.handle).collect();
        for cachefile in cachefiles {
            self.build_cachefile(cachefile);
        }
        if let Some(material) = view_layer.material_override {
            self.build_material(material);
        }
        self.build_scene_compositor(scene);
        self.build_scene_parameters(scene);
        // Make final scene evaluation dependent on view layer evaluation.
        self.add_relation(
            OpKey::new(scene, NodeType::LayerCollections, OpCode::ViewLayerEval),
            OpKey::new(scene, NodeType::Parameters, OpCode::SceneEval),
            "View Layer -> Scene Eval",
        );
        if linked_state == LinkedState::Directly {
            self.build_scene_audio(scene);
            self.build_scene_sequencer(scene);
        }
        // Build all set scenes.
        if let Some(set) = scene_block.set {
            if let Some(set_view_layer) = main
                .scene(set)
                .and_then(|set_scene| set_scene.default_render_view_layer())
            {
                self.build_view_layer(set, set_view_layer, LinkedState::ViaSet);
            }
            self.scene = scene;
        }
    }

    fn build_layer_collections(&mut self, collections: &[LayerCollection]) {
        for layer_collection in collections {
            if !layer_collection.exclude {
                self.build_collection(layer_collection.collection);
            }
            self.build_layer_collections(&layer_collection.children);
        }
    }

    fn build_collection(&mut self, collection: IdHandle) {
        if !self.built_map.check_is_built_and_tag(collection) {
            return;
        }
        let Some(block) = self.main.collection(collection) else {
            return;
        };
        let objects = block.objects.clone();
        let children = block.children.clone();
        for object in objects {
            if self.graph.find_id_node(object).is_some() {
                self.build_object(object);
            }
        }
        for child in children {
            self.build_collection(child);
        }
    }

    /* Objects. */

    pub(crate) fn build_object(&mut self, object: IdHandle) {
        if !self.built_map.check_is_built_and_tag(object) {
            return;
        }
        let Some(block) = self.main.object(object) else {
            return;
        };
        let block = block.clone();

        self.build_object_from_layer(object);
        self.build_object_transform(object, &block);
        self.build_parameters(object);

        if let Some(parent) = &block.parent {
            self.build_object(parent.object);
            self.build_object_parent(object, parent);
        }
        if !block.constraints.is_empty() {
            let constraints_op =
                OpKey::new(object, NodeType::Transform, OpCode::TransformConstraints);
            self.build_constraints(object, constraints_op, &block.constraints, None);
        }
        if let Some(adt) = &block.adt {
            self.build_animdata(object, adt);
        }
        self.build_object_data(object, &block);
        for modifier in &block.modifiers {
            self.build_object_modifier(object, modifier);
        }
        if !block.particle_systems.is_empty() {
            self.build_particle_systems(object, &block);
        }
        self.build_object_pointcache(object, &block);
        // The active graph writes selected results back onto the original
        // datablock once everything else has settled.
        let synchronize =
            OpKey::new(object, NodeType::Synchronization, OpCode::SynchronizeToOriginal);
        self.add_relation_flags(
            ComponentKey::new(object, NodeType::Transform),
            synchronize.clone(),
            "Transform -> Synchronization",
            RelationFlag::CHECK_BEFORE_ADD,
        );
        if block.object_type.has_geometry() {
            self.add_relation_flags(
                ComponentKey::new(object, NodeType::Geometry),
                synchronize,
                "Geometry -> Synchronization",
                RelationFlag::CHECK_BEFORE_ADD,
            );
        }
        if !block.materials.is_empty() {
            for &material in &block.materials {
                self.build_material(material);
                self.add_relation(
                    ComponentKey::new(material, NodeType::Shading),
                    ComponentKey::new(object, NodeType::Shading),
                    "Material -> Object Shading",
                );
            }
        }
    }

    fn build_object_from_layer(&mut self, object: IdHandle) {
        let entry = OpKey::new(object, NodeType::ObjectFromLayer, OpCode::ObjectFromLayerEntry);
        let base_flags = OpKey::new(object, NodeType::ObjectFromLayer, OpCode::ObjectBaseFlags);
        let exit = OpKey::new(object, NodeType::ObjectFromLayer, OpCode::ObjectFromLayerExit);
        self.add_relation(entry, base_flags.clone(), "Entry -> Base Flags");
        self.add_relation(base_flags.clone(), exit.clone(), "Base Flags -> Exit");
        // Base flags flow from the view layer evaluation.
        self.add_relation(
            OpKey::new(self.scene, NodeType::LayerCollections, OpCode::ViewLayerEval),
            base_flags,
            "View Layer -> Object Base Flags",
        );
        // Hidden-state output feeds the internal visibility component.
        self.add_relation_flags(
            exit,
            ComponentKey::new(object, NodeType::Visibility),
            "Object From Layer -> Visibility",
            RelationFlag::NO_FLUSH,
        );
    }

    ///
    /// Relations between the transform operations of one object, in
    /// pipeline order. Optional stages are skipped when their operation was
    /// not created by the nodes pass.
    ///
    fn build_object_transform(&mut self, object: IdHandle, block: &scene::Object) {
        let mut chain = vec![OpCode::TransformInit, OpCode::TransformLocal];
        if block.parent.is_some() {
            chain.push(OpCode::TransformParent);
        }
        if !block.constraints.is_empty() {
            chain.push(OpCode::TransformConstraints);
        }
        if block.rigidbody.is_some() {
            chain.push(OpCode::TransformSimulationInit);
        }
        chain.push(OpCode::TransformEval);
        if block.rigidbody.is_some() {
            chain.push(OpCode::RigidbodyTransformCopy);
        }
        chain.push(OpCode::TransformFinal);
        for window in chain.windows(2) {
            self.add_relation(
                OpKey::new(object, NodeType::Transform, window[0]),
                OpKey::new(object, NodeType::Transform, window[1]),
                "Transform Order",
            );
        }
    }

    fn build_object_parent(&mut self, object: IdHandle, parent: &scene::ParentRef) {
        let parent_op = OpKey::new(object, NodeType::Transform, OpCode::TransformParent);
        match parent.kind {
            ParentKind::Object => {
                self.add_relation(
                    ComponentKey::new(parent.object, NodeType::Transform),
                    parent_op,
                    "Object Parent",
                );
            }
            ParentKind::Bone => {
                if let Some(bone) = &parent.subtarget {
                    self.add_relation(
                        OpKey::sub(parent.object, NodeType::Bone, bone, OpCode::BoneDone),
                        parent_op.clone(),
                        "Bone Parent",
                    );
                }
                self.add_relation(
                    ComponentKey::new(parent.object, NodeType::Transform),
                    parent_op,
                    "Bone Parent Transform",
                );
            }
            ParentKind::Vertex => {
                self.add_relation(
                    ComponentKey::new(parent.object, NodeType::Geometry),
                    parent_op.clone(),
                    "Vertex Parent",
                );
                self.add_relation(
                    ComponentKey::new(parent.object, NodeType::Transform),
                    parent_op,
                    "Vertex Parent Transform",
                );
                self.add_customdata_mask(
                    parent.object,
                    CustomDataMasks::vert_mask(CUSTOMDATA_MASK_DEFORMVERT),
                );
            }
        }
    }

    fn build_parameters(&mut self, id: IdHandle) {
        let entry = OpKey::new(id, NodeType::Parameters, OpCode::ParametersEntry);
        let eval = OpKey::new(id, NodeType::Parameters, OpCode::ParametersEval);
        let exit = OpKey::new(id, NodeType::Parameters, OpCode::ParametersExit);
        self.add_relation(entry, eval.clone(), "Parameters Order");
        self.add_relation(eval, exit, "Parameters Order");
    }

    ///
    /// Generic constraint-stack relations: every target contributes its
    /// transform (or bone result, or geometry) to the owner's constraints
    /// operation. IK-family constraints are handled by the rig builder.
    ///
    pub(crate) fn build_constraints(
        &mut self,
        object: IdHandle,
        constraints_op: OpKey,
        constraints: &[Constraint],
        root_map: Option<&RootChannelMap>,
    ) {
        let owner_bone = constraints_op.component_name.clone();
        for constraint in constraints {
            let targets: Vec<ConstraintTarget> = match &constraint.kind {
                ConstraintKind::Kinematic(_) | ConstraintKind::SplineIk(_) => continue,
                ConstraintKind::CopyTransforms { target } => vec![target.clone()],
                ConstraintKind::Generic { targets } => targets.clone(),
                ConstraintKind::FollowPath { target } => {
                    self.add_relation(
                        ComponentKey::new(*target, NodeType::Geometry),
                        constraints_op.clone(),
                        &constraint.name,
                    );
                    self.add_relation(
                        ComponentKey::new(*target, NodeType::Transform),
                        constraints_op.clone(),
                        &constraint.name,
                    );
                    // The path solve needs the curve's path data built.
                    self.add_special_eval_flag(*target, EVAL_FLAG_NEED_CURVE_PATH);
                    continue;
                }
            };
            for target in targets {
                self.build_object(target.object);
                let target_type = self.main.object(target.object).map(|ob| ob.object_type);
                match (&target.subtarget, target_type) {
                    (Some(bone), Some(ObjectType::Armature)) => {
                        // Bone target: use the final transform, unless both
                        // ends share an IK chain root, where waiting for the
                        // final result would deadlock the chain.
                        let opcode = match root_map {
                            Some(root_map)
                                if target.object == object
                                    && root_map.has_common_root(&owner_bone, bone) =>
                            {
                                OpCode::BoneReady
                            }
                            _ => OpCode::BoneDone,
                        };
                        self.add_relation(
                            OpKey::sub(target.object, NodeType::Bone, bone, opcode),
                            constraints_op.clone(),
                            &constraint.name,
                        );
                    }
                    (Some(_vertex_group), Some(ObjectType::Mesh) | Some(ObjectType::Lattice)) => {
                        // Vertex groups are not represented separately; the
                        // whole geometry is the dependency.
                        self.add_relation(
                            ComponentKey::new(target.object, NodeType::Geometry),
                            constraints_op.clone(),
                            &constraint.name,
                        );
                        self.add_customdata_mask(
                            target.object,
                            CustomDataMasks::vert_mask(CUSTOMDATA_MASK_DEFORMVERT),
                        );
                    }
                    _ => {
                        self.add_relation(
                            ComponentKey::new(target.object, NodeType::Transform),
                            constraints_op.clone(),
                            &constraint.name,
                        );
                    }
                }
            }
        }
    }

    /* Animation. */

    pub(crate) fn build_animdata(&mut self, id: IdHandle, adt: &AnimData) {
        if adt.action.is_some() || !adt.animated_properties.is_empty() {
            let entry = OpKey::new(id, NodeType::Animation, OpCode::AnimationEntry);
            let eval = OpKey::new(id, NodeType::Animation, OpCode::AnimationEval);
            let exit = OpKey::new(id, NodeType::Animation, OpCode::AnimationExit);
            self.add_time_relation(entry.clone(), "TimeSrc -> Animation");
            self.add_relation(entry, eval.clone(), "Animation Order");
            self.add_relation(eval.clone(), exit.clone(), "Animation Order");
            if let Some(action) = adt.action {
                self.add_relation(
                    ComponentKey::new(action, NodeType::Animation),
                    eval,
                    "Action -> Animation",
                );
            }
            // Wire the animation output into everything the action writes.
            for prop in &adt.animated_properties {
                self.add_property_relation_from(
                    Key::Op(exit.clone()),
                    prop,
                    "Animation -> Driven Property",
                );
            }
        }
        self.build_driver_relations(id, &adt.drivers);
    }

    fn build_driver_relations(&mut self, id: IdHandle, drivers: &[Driver]) {
        for driver in drivers {
            let name = crate::nodes::NodeBuilder::driver_op_name(driver);
            let driver_op = OpKey::named(id, NodeType::Parameters, OpCode::Driver, &name);
            if driver.uses_time {
                self.add_time_relation(driver_op.clone(), "TimeSrc -> Driver");
            }
            // Driver writes the driven property.
            self.add_property_relation_from(
                Key::Op(driver_op.clone()),
                &driver.property,
                "Driver -> Driven Property",
            );
            // And reads its variables.
            for variable in &driver.variables {
                self.add_property_relation_to(variable, Key::Op(driver_op.clone()), "Driver Variable");
            }
        }
        // Keep drivers of the same property strictly ordered: concurrent
        // writes into one array are not safe.
        for (driver, other) in drivers.iter().tuple_combinations() {
            let same_property = driver.property.target == other.property.target
                && driver.property.prop == other.property.prop;
            if !same_property {
                continue;
            }
            let from = OpKey::named(
                id,
                NodeType::Parameters,
                OpCode::Driver,
                &crate::nodes::NodeBuilder::driver_op_name(driver),
            );
            let to = OpKey::named(
                id,
                NodeType::Parameters,
                OpCode::Driver,
                &crate::nodes::NodeBuilder::driver_op_name(other),
            );
            self.add_relation_flags(
                from,
                to,
                "Drivers of the same property",
                RelationFlag::CHECK_BEFORE_ADD,
            );
        }
    }

    /* Object data. */

    fn build_object_data(&mut self, object: IdHandle, block: &scene::Object) {
        match block.object_type {
            ObjectType::Mesh | ObjectType::Curve | ObjectType::Lattice => {
                self.build_object_geometry(object, block);
            }
            ObjectType::Armature => {
                self.build_rig(object, block);
            }
            ObjectType::Light => {
                if let Some(light) = block.data {
                    self.build_light(light);
                }
            }
            ObjectType::Camera => {
                if let Some(camera) = block.data {
                    self.build_camera(camera);
                }
            }
            ObjectType::Speaker => {
                if let Some(speaker) = block.data {
                    self.build_speaker(object, speaker);
                }
            }
            ObjectType::LightProbe | ObjectType::Empty => {}
        }
    }

    fn build_object_geometry(&mut self, object: IdHandle, block: &scene::Object) {
        let init = OpKey::new(object, NodeType::Geometry, OpCode::GeometryEvalInit);
        let eval = OpKey::new(object, NodeType::Geometry, OpCode::GeometryEval);
        let done = OpKey::new(object, NodeType::Geometry, OpCode::GeometryEvalDone);
        self.add_relation(init.clone(), eval.clone(), "Geometry Order");
        self.add_relation(eval.clone(), done.clone(), "Geometry Order");
        // Select state follows the evaluated geometry.
        self.add_relation(
            done,
            OpKey::new(object, NodeType::BatchCache, OpCode::GeometrySelectUpdate),
            "Geometry -> Select Update",
        );

        let Some(data) = block.data else {
            return;
        };
        self.add_relation(
            ComponentKey::new(data, NodeType::Geometry),
            init,
            "Object Geometry Base Data",
        );
        self.build_object_data_geometry_datablock(data);
    }

    fn build_object_data_geometry_datablock(&mut self, data: IdHandle) {
        if !self.built_map.check_is_built_and_tag(data) {
            return;
        }
        self.build_parameters(data);
        let (key, adt, curve_objects) = match self.main.block(data) {
            Some(Datablock::Mesh(mesh)) => (mesh.key, mesh.adt.clone(), Vec::new()),
            Some(Datablock::Curve(curve)) => (
                curve.key,
                curve.adt.clone(),
                [curve.bevel_object, curve.taper_object]
                    .into_iter()
                    .flatten()
                    .collect(),
            ),
            Some(Datablock::Lattice(lattice)) => (lattice.key, lattice.adt.clone(), Vec::new()),
            _ => (None, None, Vec::new()),
        };
        if let Some(adt) = adt {
            self.build_animdata(data, &adt);
        }
        if let Some(key) = key {
            self.build_shapekeys(data, key);
        }
        for curve_object in curve_objects {
            self.build_object(curve_object);
            self.add_relation(
                ComponentKey::new(curve_object, NodeType::Geometry),
                ComponentKey::new(data, NodeType::Geometry),
                "Curve Taper/Bevel",
            );
        }
    }

    fn build_shapekeys(&mut self, data: IdHandle, key: IdHandle) {
        if self.built_map.check_is_built_and_tag(key) {
            if let Some(adt) = self.main.shape_key(key).and_then(|block| block.adt.clone()) {
                self.build_animdata(key, &adt);
            }
            self.build_parameters(key);
        }
        self.add_relation(
            OpKey::new(key, NodeType::Geometry, OpCode::GeometryShapekey),
            ComponentKey::new(data, NodeType::Geometry),
            "Shape Key",
        );
    }

    fn build_object_modifier(&mut self, object: IdHandle, modifier: &scene::Modifier) {
        let geometry_entry = OpKey::new(object, NodeType::Geometry, OpCode::GeometryEvalInit);
        match &modifier.kind {
            ModifierKind::Armature { object: Some(armature) } => {
                self.build_object(*armature);
                self.add_relation(
                    ComponentKey::new(*armature, NodeType::EvalPose),
                    geometry_entry,
                    "Armature Modifier",
                );
                self.add_customdata_mask(
                    object,
                    CustomDataMasks::vert_mask(CUSTOMDATA_MASK_DEFORMVERT),
                );
            }
            ModifierKind::Lattice { object: Some(lattice) }
            | ModifierKind::Curve { object: Some(lattice) } => {
                self.build_object(*lattice);
                self.add_relation(
                    ComponentKey::new(*lattice, NodeType::Geometry),
                    geometry_entry.clone(),
                    "Deformer Geometry",
                );
                self.add_relation(
                    ComponentKey::new(*lattice, NodeType::Transform),
                    geometry_entry,
                    "Deformer Transform",
                );
            }
            ModifierKind::Mirror { object: Some(mirror) } => {
                self.build_object(*mirror);
                self.add_relation(
                    ComponentKey::new(*mirror, NodeType::Transform),
                    geometry_entry,
                    "Mirror Object",
                );
            }
            ModifierKind::Nodes { group: Some(group) } => {
                self.build_nodetree(*group);
                self.add_relation(
                    ComponentKey::new(*group, NodeType::NTreeOutput),
                    geometry_entry,
                    "Nodes Modifier",
                );
            }
            _ => {}
        }
    }

    fn build_object_pointcache(&mut self, object: IdHandle, block: &scene::Object) {
        let needs_cache = block.rigidbody.is_some()
            || !block.particle_systems.is_empty()
            || block.uses_collision();
        if !needs_cache {
            return;
        }
        let reset = OpKey::new(object, NodeType::PointCache, OpCode::PointCacheReset);
        self.add_relation_flags(
            ComponentKey::new(object, NodeType::Transform),
            reset.clone(),
            "Transform -> Point Cache",
            RelationFlag::CHECK_BEFORE_ADD | RelationFlag::FLUSH_USER_EDIT_ONLY,
        );
        if block.object_type.has_geometry() {
            self.add_relation_flags(
                ComponentKey::new(object, NodeType::Geometry),
                reset,
                "Geometry -> Point Cache",
                RelationFlag::CHECK_BEFORE_ADD | RelationFlag::FLUSH_USER_EDIT_ONLY,
            );
        }
    }

    /* Physics. */

    fn build_particle_systems(&mut self, object: IdHandle, block: &scene::Object) {
        let init = OpKey::new(object, NodeType::ParticleSystem, OpCode::ParticleSystemInit);
        let done = OpKey::new(object, NodeType::ParticleSystem, OpCode::ParticleSystemDone);
        self.add_time_relation(init.clone(), "TimeSrc -> Particles");
        for psys in &block.particle_systems {
            let eval = OpKey {
                id: object,
                component: NodeType::ParticleSystem,
                component_name: String::new(),
                opcode: OpCode::ParticleSystemEval,
                name: psys.name.clone(),
                name_tag: -1,
            };
            self.add_relation(init.clone(), eval.clone(), "Particle System Order");
            self.add_relation(eval.clone(), done.clone(), "Particle System Order");
            // Particle settings feed every system using them.
            self.add_relation(
                ComponentKey::new(psys.settings, NodeType::ParticleSettings),
                eval.clone(),
                "Particle Settings",
            );
            self.add_relation(
                OpKey::new(
                    psys.settings,
                    NodeType::ParticleSettings,
                    OpCode::ParticleSettingsReset,
                ),
                eval.clone(),
                "Particle Settings Reset",
            );
            self.build_particle_settings(psys.settings);
            // Effectors.
            let weights_collection = block
                .effector_weights
                .as_ref()
                .and_then(|weights| weights.collection);
            self.build_particle_effectors(object, eval, weights_collection);
        }
        // Particles change the evaluated geometry.
        self.add_relation(
            done,
            OpKey::new(object, NodeType::Geometry, OpCode::GeometryEvalDone),
            "Particle -> Geometry",
        );
    }

    fn build_particle_settings(&mut self, settings: IdHandle) {
        if !self.built_map.check_is_built_and_tag(settings) {
            return;
        }
        let init = OpKey::new(settings, NodeType::ParticleSettings, OpCode::ParticleSettingsInit);
        let eval = OpKey::new(settings, NodeType::ParticleSettings, OpCode::ParticleSettingsEval);
        let reset = OpKey::new(
            settings,
            NodeType::ParticleSettings,
            OpCode::ParticleSettingsReset,
        );
        self.add_relation(init.clone(), eval.clone(), "Particle Settings Order");
        self.add_relation(reset, eval, "Particle Settings Reset Order");
        self.build_parameters(settings);
        if let Some(adt) = self
            .main
            .particle_settings(settings)
            .and_then(|block| block.adt.clone())
        {
            self.build_animdata(settings, &adt);
        }
    }

    ///
    /// Wire cached effector relations into a particle-system evaluation:
    /// transforms always, geometry when the effector needs surface sampling,
    /// fluid sources for flow fields, and collision for absorption.
    ///
    fn build_particle_effectors(
        &mut self,
        object: IdHandle,
        eval: OpKey,
        collection: Option<IdHandle>,
    ) {
        let relations =
            graph::physics::build_effector_relations(self.graph, self.main, collection).to_vec();
        for relation in &relations {
            if relation.object == object {
                continue;
            }
            self.add_relation_flags(
                ComponentKey::new(relation.object, NodeType::Transform),
                eval.clone(),
                "Effector",
                RelationFlag::CHECK_BEFORE_ADD,
            );
            let needs_geometry = relation.psys.is_some()
                || matches!(relation.field.shape, FieldShape::Surface | FieldShape::Points)
                || relation.field.kind == ForceFieldKind::Guide;
            if needs_geometry {
                self.add_relation_flags(
                    ComponentKey::new(relation.object, NodeType::Geometry),
                    eval.clone(),
                    "Effector Geometry",
                    RelationFlag::CHECK_BEFORE_ADD,
                );
            }
            if relation.field.kind == ForceFieldKind::FluidFlow {
                if let Some(source) = relation.field.source {
                    self.add_relation_flags(
                        ComponentKey::new(source, NodeType::Transform),
                        eval.clone(),
                        "Fluid Force Domain",
                        RelationFlag::CHECK_BEFORE_ADD,
                    );
                    self.add_relation_flags(
                        ComponentKey::new(source, NodeType::Geometry),
                        eval.clone(),
                        "Fluid Force Domain",
                        RelationFlag::CHECK_BEFORE_ADD,
                    );
                }
            }
            if relation.field.use_absorption {
                self.build_collision_relations_for(object, eval.clone(), "Force Absorption");
            }
        }
    }

    fn build_collision_relations_for(&mut self, object: IdHandle, to: OpKey, description: &str) {
        let relations = graph::physics::build_collision_relations(
            self.graph,
            self.main,
            None,
            CollisionModifier::Collision,
        )
        .to_vec();
        for relation in &relations {
            if relation.object == object {
                continue;
            }
            self.add_relation_flags(
                ComponentKey::new(relation.object, NodeType::Transform),
                to.clone(),
                description,
                RelationFlag::CHECK_BEFORE_ADD,
            );
            self.add_relation_flags(
                ComponentKey::new(relation.object, NodeType::Geometry),
                to.clone(),
                description,
                RelationFlag::CHECK_BEFORE_ADD,
            );
        }
    }

    fn build_rigidbody(&mut self, scene: IdHandle) {
        let rebuild = OpKey::new(scene, NodeType::Transform, OpCode::RigidbodyRebuild);
        let sim = OpKey::new(scene, NodeType::Transform, OpCode::RigidbodySim);
        self.add_time_relation(rebuild.clone(), "TimeSrc -> Rigidbody Rebuild");
        self.add_relation(rebuild, sim.clone(), "Rigidbody Rebuild -> Sim");

        let Some(collection) = self
            .main
            .scene(scene)
            .and_then(|block| block.rigidbody_world.as_ref())
            .and_then(|rbw| rbw.collection)
        else {
            return;
        };
        self.build_collection(collection);
        let members = match self.main.collection(collection) {
            Some(block) => block.objects.clone(),
            None => Vec::new(),
        };
        for member in members {
            let has_rigidbody = self
                .main
                .object(member)
                .is_some_and(|block| block.rigidbody.is_some());
            if !has_rigidbody {
                continue;
            }
            // The simulation consumes the pre-simulation transform and
            // produces the copied-back result.
            self.add_relation(
                OpKey::new(member, NodeType::Transform, OpCode::TransformEval),
                sim.clone(),
                "Rigidbody Object Transform",
            );
            self.add_relation(
                sim.clone(),
                OpKey::new(member, NodeType::Transform, OpCode::RigidbodyTransformCopy),
                "Rigidbody Sim -> Transform Copy",
            );
        }
    }

    /* Shading and friends. */

    fn build_material(&mut self, material: IdHandle) {
        if !self.built_map.check_is_built_and_tag(material) {
            return;
        }
        self.build_parameters(material);
        let Some(block) = self.main.material(material) else {
            return;
        };
        let ntree = block.ntree;
        let adt = block.adt.clone();
        if let Some(adt) = adt {
            self.build_animdata(material, &adt);
        }
        if let Some(ntree) = ntree {
            self.build_nodetree(ntree);
            self.add_relation(
                ComponentKey::new(ntree, NodeType::NTreeOutput),
                ComponentKey::new(material, NodeType::Shading),
                "NTree -> Material",
            );
        }
    }

    fn build_world(&mut self, world: IdHandle) {
        if !self.built_map.check_is_built_and_tag(world) {
            return;
        }
        self.build_parameters(world);
        let Some(block) = self.main.world(world) else {
            return;
        };
        let ntree = block.ntree;
        let adt = block.adt.clone();
        if let Some(adt) = adt {
            self.build_animdata(world, &adt);
        }
        if let Some(ntree) = ntree {
            self.build_nodetree(ntree);
            self.add_relation(
                ComponentKey::new(ntree, NodeType::NTreeOutput),
                ComponentKey::new(world, NodeType::Shading),
                "NTree -> World",
            );
        }
    }

    fn build_nodetree(&mut self, ntree: IdHandle) {
        if !self.built_map.check_is_built_and_tag(ntree) {
            return;
        }
        self.build_parameters(ntree);
        let Some(block) = self.main.node_tree(ntree) else {
            return;
        };
        let groups = block.groups.clone();
        let has_animated_images = !block.animated_images.is_empty();
        let adt = block.adt.clone();
        if let Some(adt) = adt {
            self.build_animdata(ntree, &adt);
        }
        if has_animated_images {
            self.add_time_relation(
                OpKey::new(ntree, NodeType::ImageAnimation, OpCode::ImageAnimation),
                "TimeSrc -> Image Animation",
            );
        }
        for group in groups {
            self.build_nodetree(group);
            self.add_relation(
                ComponentKey::new(group, NodeType::NTreeOutput),
                ComponentKey::new(ntree, NodeType::NTreeOutput),
                "Group Node",
            );
        }
    }

    fn build_light(&mut self, light: IdHandle) {
        if !self.built_map.check_is_built_and_tag(light) {
            return;
        }
        self.build_parameters(light);
        let Some(block) = self.main.light(light) else {
            return;
        };
        let ntree = block.ntree;
        let adt = block.adt.clone();
        if let Some(adt) = adt {
            self.build_animdata(light, &adt);
        }
        if let Some(ntree) = ntree {
            self.build_nodetree(ntree);
            self.add_relation(
                ComponentKey::new(ntree, NodeType::NTreeOutput),
                ComponentKey::new(light, NodeType::Shading),
                "NTree -> Light",
            );
        }
    }

    fn build_camera(&mut self, camera: IdHandle) {
        if !self.built_map.check_is_built_and_tag(camera) {
            return;
        }
        self.build_parameters(camera);
        let Some(block) = self.main.camera(camera) else {
            return;
        };
        let dof_object = block.dof_object;
        let adt = block.adt.clone();
        if let Some(adt) = adt {
            self.build_animdata(camera, &adt);
        }
        if let Some(dof_object) = dof_object {
            self.build_object(dof_object);
            self.add_relation(
                ComponentKey::new(dof_object, NodeType::Transform),
                ComponentKey::new(camera, NodeType::Parameters),
                "Camera DOF",
            );
        }
    }

    fn build_speaker(&mut self, object: IdHandle, speaker: IdHandle) {
        if self.built_map.check_is_built_and_tag(speaker) {
            self.build_parameters(speaker);
            if let Some(adt) = self.main.speaker(speaker).and_then(|block| block.adt.clone()) {
                self.build_animdata(speaker, &adt);
            }
        }
        let sound = self.main.speaker(speaker).and_then(|block| block.sound);
        if let Some(sound) = sound {
            self.add_relation(
                ComponentKey::new(sound, NodeType::Audio),
                OpKey::new(object, NodeType::Audio, OpCode::SpeakerEval),
                "Sound -> Speaker",
            );
        }
    }

    fn build_mask(&mut self, mask: IdHandle) {
        if !self.built_map.check_is_built_and_tag(mask) {
            return;
        }
        let animation = OpKey::new(mask, NodeType::Animation, OpCode::MaskAnimation);
        let eval = OpKey::new(mask, NodeType::Parameters, OpCode::MaskEval);
        self.add_time_relation(animation.clone(), "TimeSrc -> Mask Animation");
        self.add_relation(animation, eval, "Mask Animation -> Mask Eval");
    }

    fn build_movieclip(&mut self, clip: IdHandle) {
        if !self.built_map.check_is_built_and_tag(clip) {
            return;
        }
        self.add_time_relation(
            OpKey::new(clip, NodeType::Parameters, OpCode::MovieClipEval),
            "TimeSrc -> Movie Clip",
        );
    }

    fn build_cachefile(&mut self, cachefile: IdHandle) {
        if !self.built_map.check_is_built_and_tag(cachefile) {
            return;
        }
        self.add_time_relation(
            OpKey::new(cachefile, NodeType::Cache, OpCode::FileCacheUpdate),
            "TimeSrc -> Cache File",
        );
        if let Some(adt) = self
            .main
            .cachefiles()
            .find(|block| block.id.handle == cachefile)
            .and_then(|block| block.adt.clone())
        {
            self.build_animdata(cachefile, &adt);
        }
    }

    /* Scene-level. */

    fn build_scene_parameters(&mut self, scene: IdHandle) {
        let entry = OpKey::new(scene, NodeType::Parameters, OpCode::ParametersEntry);
        let eval = OpKey::new(scene, NodeType::Parameters, OpCode::SceneEval);
        let exit = OpKey::new(scene, NodeType::Parameters, OpCode::ParametersExit);
        self.add_relation(entry, eval.clone(), "Parameters Order");
        self.add_relation(eval, exit, "Parameters Order");
    }

    fn build_scene_audio(&mut self, scene: IdHandle) {
        let entry = OpKey::new(scene, NodeType::Audio, OpCode::AudioEntry);
        let volume = OpKey::new(scene, NodeType::Audio, OpCode::AudioVolume);
        self.add_relation(entry, volume.clone(), "Audio Order");
        let has_sequencer = self
            .main
            .scene(scene)
            .map(|block| block.has_sequencer)
            .unwrap_or(false);
        if has_sequencer {
            self.add_relation(
                OpKey::new(scene, NodeType::Sequencer, OpCode::SequencesEval),
                volume,
                "Sequencer -> Audio",
            );
        }
    }

    fn build_scene_sequencer(&mut self, scene: IdHandle) {
        let has_sequencer = self
            .main
            .scene(scene)
            .map(|block| block.has_sequencer)
            .unwrap_or(false);
        if !has_sequencer {
            return;
        }
        self.add_time_relation(
            OpKey::new(scene, NodeType::Sequencer, OpCode::SequencesEval),
            "TimeSrc -> Sequencer",
        );
    }

    fn build_scene_compositor(&mut self, scene: IdHandle) {
        if let Some(compositor) = self.main.scene(scene).and_then(|block| block.compositor) {
            self.build_nodetree(compositor);
        }
    }

    /* Copy-on-write. */

    ///
    /// Every component which must not read its datablock before the shadow
    /// is expanded waits for the ID's copy-on-write operation. Done as one
    /// generic pass once everything else is wired.
    ///
    pub fn build_copy_on_write_relations(&mut self) {
        let id_count = self.graph.id_nodes.len();
        for id_node_index in 0..id_count {
            let (id_orig, is_alias) = {
                let id_node = &self.graph.id_nodes[id_node_index];
                (id_node.id_orig, id_node.cow.is_alias())
            };
            if is_alias {
                continue;
            }
            let cow_op = OpKey::new(id_orig, NodeType::CopyOnWrite, OpCode::CopyOnWrite);
            let components: Vec<(NodeType, String)> = self.graph.id_nodes[id_node_index]
                .components
                .keys()
                .map(|key| (key.node_type, key.name.clone()))
                .collect();
            for (node_type, name) in components {
                if node_type == NodeType::CopyOnWrite {
                    continue;
                }
                if !registry::node_type_info(node_type).depends_on_cow {
                    continue;
                }
                self.add_relation_flags(
                    cow_op.clone(),
                    ComponentKey::sub(id_orig, node_type, &name),
                    "CoW Dependency",
                    RelationFlag::CHECK_BEFORE_ADD,
                );
            }
        }
    }
}

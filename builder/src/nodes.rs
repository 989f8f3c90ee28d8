// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The nodes pass: walk the scene description and create ID, component and
//! operation nodes with their callbacks bound, preserving per-ID state
//! across rebuilds.

use std::sync::Arc;

use fnv::FnvHashMap;

use graph::cow::CowShadow;
use graph::node::id_node::CustomDataMasks;
use graph::{ComponentId, EvalFn, Graph, IdNodeId, LinkedState, NodeId, NodeType, OpCode};
use scene::{
    AnimData, Base, BaseFlag, Datablock, Driver, IdHandle, LayerCollection, Main, ObjectType,
    PropertyTarget, SessionUuid, ViewLayer,
};

use crate::map::BuilderMap;

///
/// Per-ID information preserved from the previous state of the graph, keyed
/// by session UUID so it survives handle changes across rebuilds.
///
#[derive(Debug)]
pub struct IdInfo {
    pub cow: CowShadow,
    pub previously_visible_components_mask: u64,
    pub previous_eval_flags: u32,
    pub previous_customdata_masks: CustomDataMasks,
}

pub struct NodeBuilder<'a> {
    pub(crate) main: &'a Main,
    pub(crate) graph: &'a mut Graph,
    built_map: BuilderMap,
    id_info: FnvHashMap<SessionUuid, IdInfo>,
}

impl<'a> NodeBuilder<'a> {
    pub fn new(
        main: &'a Main,
        graph: &'a mut Graph,
        id_info: FnvHashMap<SessionUuid, IdInfo>,
    ) -> NodeBuilder<'a> {
        NodeBuilder {
            main,
            graph,
            built_map: BuilderMap::default(),
            id_info,
        }
    }

    /* Node management helpers. */

    pub(crate) fn add_id_node(&mut self, id: IdHandle) -> IdNodeId {
        let first_time = self.graph.find_id_node(id).is_none();
        if !first_time {
            return self.graph.find_id_node(id).expect("Just checked");
        }

        let uuid = self
            .main
            .id(id)
            .map(|header| header.session_uuid)
            .unwrap_or(SessionUuid(0));
        let (cow_hint, previous) = match self.id_info.remove(&uuid) {
            Some(info) => (
                Some(info.cow),
                Some((
                    info.previously_visible_components_mask,
                    info.previous_eval_flags,
                    info.previous_customdata_masks,
                )),
            ),
            None => (None, None),
        };
        let id_node_id = self.graph.add_id_node(self.main, id, cow_hint);
        if let Some((mask, eval_flags, customdata_masks)) = previous {
            let id_node = self
                .graph
                .id_node_mut(id_node_id)
                .expect("Freshly added ID node");
            id_node.previously_visible_components_mask = mask;
            id_node.previous_eval_flags = eval_flags;
            id_node.previous_customdata_masks = customdata_masks;
        }

        // Every copy-on-written ID carries the operation which expands its
        // shadow before anything else reads from it.
        let needs_cow = self
            .graph
            .id_node(id_node_id)
            .map(|id_node| !id_node.cow.is_alias())
            .unwrap_or(false);
        if needs_cow {
            let comp = self.graph.add_component(id_node_id, NodeType::CopyOnWrite, "");
            let callback: EvalFn = Arc::new(move |ctx| {
                ctx.depsgraph.evaluate_copy_on_write(ctx.main, id);
            });
            self.graph
                .ensure_operation(comp, OpCode::CopyOnWrite, "", -1, Some(callback));
        }
        id_node_id
    }

    pub(crate) fn add_component_node(
        &mut self,
        id: IdHandle,
        node_type: NodeType,
        name: &str,
    ) -> ComponentId {
        let id_node_id = self.add_id_node(id);
        self.graph.add_component(id_node_id, node_type, name)
    }

    pub(crate) fn add_operation_node(
        &mut self,
        id: IdHandle,
        node_type: NodeType,
        comp_name: &str,
        opcode: OpCode,
        name: &str,
        name_tag: i32,
    ) -> NodeId {
        let comp = self.add_component_node(id, node_type, comp_name);
        self.graph.ensure_operation(comp, opcode, name, name_tag, None)
    }

    fn set_entry(&mut self, comp: ComponentId, op: NodeId) {
        self.graph.component_mut(comp).set_entry_operation(op);
    }

    fn set_exit(&mut self, comp: ComponentId, op: NodeId) {
        self.graph.component_mut(comp).set_exit_operation(op);
    }

    /* Build entry points. */

    pub(crate) fn need_pull_base_into_graph(&self, base: &Base) -> bool {
        if self.graph.is_render_pipeline {
            // Post-processing graphs need the view layers but none of the
            // bases.
            return false;
        }
        let required = match self.graph.mode {
            graph::EvaluationMode::Viewport => BaseFlag::ENABLED_VIEWPORT,
            graph::EvaluationMode::Render => BaseFlag::ENABLED_RENDER,
        };
        base.flags.contains(required)
    }

    fn is_object_visibility_animated(&self, object: IdHandle) -> bool {
        let Some(adt) = self.main.object(object).and_then(|ob| ob.adt.as_ref()) else {
            return false;
        };
        let touches_visibility = |prop: &scene::PropertyRef| {
            matches!(prop.prop.as_deref(), Some("hide_viewport") | Some("hide_render"))
                && prop.target == PropertyTarget::Id(object)
        };
        adt.animated_properties.iter().any(touches_visibility)
            || adt.drivers.iter().any(|driver| touches_visibility(&driver.property))
    }

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
        let scene_node = self.add_id_node(scene);
        self.merge_linked_state(scene_node, linked_state);

        let scene_block = main.scene(scene).expect("Scene is in the database");

        // Scene objects. Objects are considered visible even when currently
        // restricted by base flags, otherwise their drivers would never be
        // evaluated.
        for base in &view_layer.bases {
            if !self.need_pull_base_into_graph(base) {
                continue;
            }
            self.build_object(true, base.object, linked_state, true);
            if !self.graph.has_animated_visibility {
                let animated = self.is_object_visibility_animated(base.object);
                self.graph.has_animated_visibility |= animated;
            }
        }
        self.build_layer_collections(&view_layer.layer_collections, true);
        if let Some(camera) = scene_block.camera {
            self.build_object(false, camera, LinkedState::Indirectly, true);
        }
        // Rigidbody.
        if scene_block.rigidbody_world.is_some() {
            self.build_rigidbody(scene);
        }
        // Scene's animation and drivers.
        if let Some(adt) = &scene_block.adt {
            self.build_animdata(scene, adt);
        }
        // World.
        if let Some(world) = scene_block.world {
            self.build_world(world);
        }
        // Cache files, masks, movie clips come from the whole database.
        let cachefiles: Vec<IdHandle> =
            self.main.cachefiles().map(|block| block.id.handle).collect();
        for cachefile in cachefiles {
            self.build_cachefile(cachefile);
        }
        let masks: Vec<IdHandle> = self.main.masks().map(|block| block.id.handle).collect();
        for mask in masks {
            self.build_mask(mask);
        }
        let movieclips: Vec<IdHandle> =
            self.main.movieclips().map(|block| block.id.handle).collect();
        for clip in movieclips {
            self.build_movieclip(clip);
        }
        // Material override.
        if let Some(material) = view_layer.material_override {
            self.build_material(material);
        }
        // Sequencer and audio evaluate only for the directly linked scene.
        if linked_state == LinkedState::Directly {
            self.build_scene_audio(scene);
            self.build_scene_sequencer(scene);
        }
        // Collections.
        let op = self.add_operation_node(
            scene,
            NodeType::LayerCollections,
            "",
            OpCode::ViewLayerEval,
            "",
            -1,
        );
        let comp = self
            .graph
            .find_component(scene, NodeType::LayerCollections, "")
            .expect("Just added");
        self.set_entry(comp, op);
        self.set_exit(comp, op);
        // Parameters evaluation, mainly for scene relations.
        self.build_scene_compositor(scene);
        self.build_scene_parameters(scene);
        // Build all set scenes.
        if let Some(set) = scene_block.set {
            if let Some(set_view_layer) = main
                .scene(set)
                .and_then(|set_scene| set_scene.default_render_view_layer())
            {
                self.build_view_layer(set, set_view_layer, LinkedState::ViaSet);
            }
        }
    }

    fn merge_linked_state(&mut self, id_node_id: IdNodeId, linked_state: LinkedState) {
        if let Some(id_node) = self.graph.id_node_mut(id_node_id) {
            id_node.linked_state = id_node.linked_state.max(linked_state);
        }
    }

    fn build_layer_collections(&mut self, collections: &[LayerCollection], parent_visible: bool) {
        let mode = self.graph.mode;
        for layer_collection in collections {
            let Some(collection) = self.main.collection(layer_collection.collection) else {
                continue;
            };
            let hidden = match mode {
                graph::EvaluationMode::Viewport => collection.hide_viewport,
                graph::EvaluationMode::Render => collection.hide_render,
            };
            if hidden {
                continue;
            }
            if !layer_collection.exclude {
                self.build_collection(layer_collection.collection, parent_visible);
            }
            self.build_layer_collections(&layer_collection.children, parent_visible);
        }
    }

    pub(crate) fn build_collection(&mut self, collection: IdHandle, parent_visible: bool) {
        if !self.built_map.check_is_built_and_tag(collection) {
            return;
        }
        let id_node_id = self.add_id_node(collection);
        if let Some(id_node) = self.graph.id_node_mut(id_node_id) {
            id_node.is_collection_fully_expanded = true;
        }
        let Some(block) = self.main.collection(collection) else {
            return;
        };
        let objects = block.objects.clone();
        let children = block.children.clone();
        for object in objects {
            self.build_object(false, object, LinkedState::Indirectly, parent_visible);
        }
        for child in children {
            self.build_collection(child, parent_visible);
        }
    }

    /* Objects. */

    pub(crate) fn build_object(
        &mut self,
        from_base: bool,
        object: IdHandle,
        linked_state: LinkedState,
        is_visible: bool,
    ) {
        if !self.built_map.check_is_built_and_tag(object) {
            // Built already; only the linkage state may strengthen.
            if let Some(id_node_id) = self.graph.find_id_node(object) {
                self.merge_linked_state(id_node_id, linked_state);
                if from_base {
                    if let Some(id_node) = self.graph.id_node_mut(id_node_id) {
                        id_node.has_base = true;
                    }
                }
            }
            return;
        }
        let Some(block) = self.main.object(object) else {
            log::debug!("Object {object} is not in the database, skipped");
            return;
        };
        let block = block.clone();

        let id_node_id = self.add_id_node(object);
        self.merge_linked_state(id_node_id, linked_state);
        if let Some(id_node) = self.graph.id_node_mut(id_node_id) {
            id_node.has_base |= from_base;
            id_node.is_directly_visible = is_visible;
        }

        // Object from layer: base flag evaluation.
        self.build_object_from_layer(object);
        // Transform.
        self.build_object_transform(object, &block);
        // Parameters.
        self.build_parameters(object);
        self.add_operation_node(object, NodeType::Parameters, "", OpCode::Dimensions, "", -1);
        // Internal visibility state.
        self.add_operation_node(object, NodeType::Visibility, "", OpCode::Visibility, "", -1);
        // Write-back of selected results onto the original datablock.
        let sync_comp = self.add_component_node(object, NodeType::Synchronization, "");
        let sync_op = self
            .graph
            .ensure_operation(sync_comp, OpCode::SynchronizeToOriginal, "", -1, None);
        self.set_entry(sync_comp, sync_op);
        self.set_exit(sync_comp, sync_op);

        // Object data.
        self.build_object_data(object, &block, is_visible);
        // Parent.
        if let Some(parent) = &block.parent {
            self.build_object(false, parent.object, LinkedState::Indirectly, is_visible);
        }
        // Modifiers.
        for modifier in &block.modifiers {
            self.build_modifier_references(modifier, is_visible);
        }
        // Constraints.
        self.build_constraint_references(&block.constraints, is_visible);
        // Animation.
        if let Some(adt) = &block.adt {
            self.build_animdata(object, adt);
        }
        // Particle systems.
        if !block.particle_systems.is_empty() {
            self.build_particle_systems(object, &block, is_visible);
        }
        // Point caches.
        self.build_object_pointcache(object, &block);
        // Materials.
        if !block.materials.is_empty() {
            let comp = self.add_component_node(object, NodeType::Shading, "");
            let op = self
                .graph
                .ensure_operation(comp, OpCode::Shading, "", -1, None);
            self.set_entry(comp, op);
            self.set_exit(comp, op);
            let materials = block.materials.clone();
            for material in materials {
                self.build_material(material);
            }
        }
    }

    fn build_object_from_layer(&mut self, object: IdHandle) {
        let comp = self.add_component_node(object, NodeType::ObjectFromLayer, "");
        let entry = self
            .graph
            .ensure_operation(comp, OpCode::ObjectFromLayerEntry, "", -1, None);
        self.graph
            .ensure_operation(comp, OpCode::ObjectBaseFlags, "", -1, None);
        let exit = self
            .graph
            .ensure_operation(comp, OpCode::ObjectFromLayerExit, "", -1, None);
        self.set_entry(comp, entry);
        self.set_exit(comp, exit);
    }

    fn build_object_transform(&mut self, object: IdHandle, block: &scene::Object) {
        let comp = self.add_component_node(object, NodeType::Transform, "");
        let init = self
            .graph
            .ensure_operation(comp, OpCode::TransformInit, "", -1, None);
        self.graph
            .ensure_operation(comp, OpCode::TransformLocal, "", -1, None);
        if block.parent.is_some() {
            self.graph
                .ensure_operation(comp, OpCode::TransformParent, "", -1, None);
        }
        if !block.constraints.is_empty() {
            self.graph
                .ensure_operation(comp, OpCode::TransformConstraints, "", -1, None);
        }
        if block.rigidbody.is_some() {
            self.graph
                .ensure_operation(comp, OpCode::TransformSimulationInit, "", -1, None);
        }
        self.graph
            .ensure_operation(comp, OpCode::TransformEval, "", -1, None);
        let exit = self
            .graph
            .ensure_operation(comp, OpCode::TransformFinal, "", -1, None);
        self.set_entry(comp, init);
        self.set_exit(comp, exit);
    }

    pub(crate) fn build_parameters(&mut self, id: IdHandle) {
        let comp = self.add_component_node(id, NodeType::Parameters, "");
        let entry = self
            .graph
            .ensure_operation(comp, OpCode::ParametersEntry, "", -1, None);
        self.graph
            .ensure_operation(comp, OpCode::ParametersEval, "", -1, None);
        let exit = self
            .graph
            .ensure_operation(comp, OpCode::ParametersExit, "", -1, None);
        self.set_entry(comp, entry);
        self.set_exit(comp, exit);
    }

    fn build_object_data(&mut self, object: IdHandle, block: &scene::Object, is_visible: bool) {
        match block.object_type {
            ObjectType::Mesh | ObjectType::Curve | ObjectType::Lattice => {
                self.build_object_geometry(object, block);
            }
            ObjectType::Armature => {
                if let Some(armature) = block.data {
                    self.build_armature(armature);
                }
                self.build_rig(object, block, is_visible);
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
            ObjectType::LightProbe => {
                self.add_operation_node(
                    object,
                    NodeType::Parameters,
                    "",
                    OpCode::LightProbeEval,
                    "",
                    -1,
                );
                if let Some(probe) = block.data {
                    self.build_lightprobe(probe);
                }
            }
            ObjectType::Speaker => {
                let comp = self.add_component_node(object, NodeType::Audio, "");
                let op = self
                    .graph
                    .ensure_operation(comp, OpCode::SpeakerEval, "", -1, None);
                self.set_entry(comp, op);
                self.set_exit(comp, op);
                if let Some(speaker) = block.data {
                    self.build_speaker(speaker);
                }
            }
            ObjectType::Empty => {}
        }
    }

    fn build_object_geometry(&mut self, object: IdHandle, block: &scene::Object) {
        let comp = self.add_component_node(object, NodeType::Geometry, "");
        let entry = self
            .graph
            .ensure_operation(comp, OpCode::GeometryEvalInit, "", -1, None);
        self.graph
            .ensure_operation(comp, OpCode::GeometryEval, "", -1, None);
        self.graph
            .ensure_operation(comp, OpCode::Visibility, "", -1, None);
        let exit = self
            .graph
            .ensure_operation(comp, OpCode::GeometryEvalDone, "", -1, None);
        self.set_entry(comp, entry);
        self.set_exit(comp, exit);
        // Selection state for interactive editing.
        self.add_operation_node(
            object,
            NodeType::BatchCache,
            "",
            OpCode::GeometrySelectUpdate,
            "",
            -1,
        );
        if let Some(data) = block.data {
            self.build_object_data_geometry_datablock(data);
        }
    }

    pub(crate) fn build_object_data_geometry_datablock(&mut self, data: IdHandle) {
        if !self.built_map.check_is_built_and_tag(data) {
            return;
        }
        self.add_id_node(data);
        let comp = self.add_component_node(data, NodeType::Geometry, "");
        let op = self
            .graph
            .ensure_operation(comp, OpCode::GeometryEval, "", -1, None);
        let exit = self
            .graph
            .ensure_operation(comp, OpCode::GeometryEvalDone, "", -1, None);
        self.set_entry(comp, op);
        self.set_exit(comp, exit);
        self.build_parameters(data);

        let (key, adt, extra_objects) = match self.main.block(data) {
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
            self.build_shapekeys(key);
        }
        for extra in extra_objects {
            self.build_object(false, extra, LinkedState::Indirectly, true);
        }
    }

    pub(crate) fn build_shapekeys(&mut self, key: IdHandle) {
        if !self.built_map.check_is_built_and_tag(key) {
            return;
        }
        self.add_id_node(key);
        let comp = self.add_component_node(key, NodeType::Geometry, "");
        let op = self
            .graph
            .ensure_operation(comp, OpCode::GeometryShapekey, "", -1, None);
        self.set_entry(comp, op);
        self.set_exit(comp, op);
        self.build_parameters(key);
        let Some(block) = self.main.shape_key(key) else {
            return;
        };
        let blocks: Vec<String> = block.blocks.iter().map(|kb| kb.name.clone()).collect();
        let adt = block.adt.clone();
        for name in blocks {
            self.add_operation_node(key, NodeType::Parameters, "", OpCode::ParametersEval, &name, -1);
        }
        if let Some(adt) = adt {
            self.build_animdata(key, &adt);
        }
    }

    fn build_modifier_references(&mut self, modifier: &scene::Modifier, is_visible: bool) {
        use scene::ModifierKind::*;
        match &modifier.kind {
            Armature { object: Some(object) }
            | Lattice { object: Some(object) }
            | Curve { object: Some(object) }
            | Mirror { object: Some(object) } => {
                self.build_object(false, *object, LinkedState::Indirectly, is_visible);
            }
            Nodes { group: Some(group) } => {
                self.build_nodetree(*group);
            }
            _ => {}
        }
    }

    pub(crate) fn build_constraint_references(
        &mut self,
        constraints: &[scene::Constraint],
        is_visible: bool,
    ) {
        use scene::ConstraintKind::*;
        let mut referenced = Vec::new();
        for constraint in constraints {
            match &constraint.kind {
                Kinematic(ik) => {
                    if let Some(target) = &ik.target {
                        referenced.push(target.object);
                    }
                    if let Some(pole) = &ik.pole_target {
                        referenced.push(pole.object);
                    }
                }
                SplineIk(spline) => {
                    if let Some(target) = spline.target {
                        referenced.push(target);
                    }
                }
                CopyTransforms { target } => referenced.push(target.object),
                FollowPath { target } => referenced.push(*target),
                Generic { targets } => {
                    referenced.extend(targets.iter().map(|target| target.object));
                }
            }
        }
        for object in referenced {
            self.build_object(false, object, LinkedState::Indirectly, is_visible);
        }
    }

    /* Animation. */

    pub(crate) fn build_animdata(&mut self, id: IdHandle, adt: &AnimData) {
        if let Some(action) = adt.action {
            self.build_action(action);
        }
        if adt.action.is_some() || !adt.animated_properties.is_empty() {
            let comp = self.add_component_node(id, NodeType::Animation, "");
            let entry = self
                .graph
                .ensure_operation(comp, OpCode::AnimationEntry, "", -1, None);
            self.graph
                .ensure_operation(comp, OpCode::AnimationEval, "", -1, None);
            let exit = self
                .graph
                .ensure_operation(comp, OpCode::AnimationExit, "", -1, None);
            self.set_entry(comp, entry);
            self.set_exit(comp, exit);
        }
        for driver in &adt.drivers {
            self.build_driver(id, driver);
        }
    }

    fn build_action(&mut self, action: IdHandle) {
        if !self.built_map.check_is_built_and_tag(action) {
            return;
        }
        self.add_id_node(action);
        let comp = self.add_component_node(action, NodeType::Animation, "");
        let op = self
            .graph
            .ensure_operation(comp, OpCode::AnimationEval, "", -1, None);
        self.set_entry(comp, op);
        self.set_exit(comp, op);
    }

    /// Identifier of the driver operation: the driven property plus its
    /// array index, so sibling drivers stay distinct.
    pub(crate) fn driver_op_name(driver: &Driver) -> String {
        let prop = driver.property.prop.as_deref().unwrap_or("");
        format!("{}[{}]", prop, driver.array_index)
    }

    pub(crate) fn build_driver(&mut self, id: IdHandle, driver: &Driver) {
        let name = Self::driver_op_name(driver);
        self.add_operation_node(id, NodeType::Parameters, "", OpCode::Driver, &name, -1);
        self.build_driver_id_property(driver);
        self.build_driver_variables(driver);
    }

    /// Pull datablocks referenced by driver variables into the graph, so the
    /// variable relations have something to attach to.
    fn build_driver_variables(&mut self, driver: &Driver) {
        for variable in &driver.variables {
            let owner = variable.target.owner();
            if self.main.object(owner).is_some() {
                self.build_object(false, owner, LinkedState::Indirectly, true);
            }
        }
    }

    ///
    /// Custom-property outputs get an explicit ID-property operation so the
    /// property can be addressed; pose-channel custom properties bind to the
    /// bone component for granularity.
    ///
    fn build_driver_id_property(&mut self, driver: &Driver) {
        if !driver.property.is_idprop {
            return;
        }
        let Some(prop) = driver.property.prop.as_deref() else {
            return;
        };
        match &driver.property.target {
            PropertyTarget::PoseBone { object, bone } => {
                let bone = bone.clone();
                self.add_operation_node(
                    *object,
                    NodeType::Bone,
                    &bone,
                    OpCode::IdProperty,
                    prop,
                    -1,
                );
            }
            other => {
                self.add_operation_node(
                    other.owner(),
                    NodeType::Parameters,
                    "",
                    OpCode::IdProperty,
                    prop,
                    -1,
                );
            }
        }
    }

    /* Physics. */

    fn build_particle_systems(&mut self, object: IdHandle, block: &scene::Object, is_visible: bool) {
        let comp = self.add_component_node(object, NodeType::ParticleSystem, "");
        let entry = self
            .graph
            .ensure_operation(comp, OpCode::ParticleSystemInit, "", -1, None);
        for psys in &block.particle_systems {
            self.graph
                .ensure_operation(comp, OpCode::ParticleSystemEval, &psys.name, -1, None);
        }
        let exit = self
            .graph
            .ensure_operation(comp, OpCode::ParticleSystemDone, "", -1, None);
        self.set_entry(comp, entry);
        self.set_exit(comp, exit);
        let settings: Vec<IdHandle> = block
            .particle_systems
            .iter()
            .map(|psys| psys.settings)
            .collect();
        for settings in settings {
            self.build_particle_settings(settings, is_visible);
        }
    }

    fn build_particle_settings(&mut self, settings: IdHandle, _is_visible: bool) {
        if !self.built_map.check_is_built_and_tag(settings) {
            return;
        }
        self.add_id_node(settings);
        let comp = self.add_component_node(settings, NodeType::ParticleSettings, "");
        let entry = self
            .graph
            .ensure_operation(comp, OpCode::ParticleSettingsInit, "", -1, None);
        let exit = self
            .graph
            .ensure_operation(comp, OpCode::ParticleSettingsEval, "", -1, None);
        self.graph
            .ensure_operation(comp, OpCode::ParticleSettingsReset, "", -1, None);
        self.set_entry(comp, entry);
        self.set_exit(comp, exit);
        self.build_parameters(settings);
        if let Some(adt) = self
            .main
            .particle_settings(settings)
            .and_then(|block| block.adt.clone())
        {
            self.build_animdata(settings, &adt);
        }
    }

    fn build_object_pointcache(&mut self, object: IdHandle, block: &scene::Object) {
        let needs_cache = block.rigidbody.is_some()
            || !block.particle_systems.is_empty()
            || block.uses_collision();
        if !needs_cache {
            return;
        }
        let comp = self.add_component_node(object, NodeType::PointCache, "");
        let op = self
            .graph
            .ensure_operation(comp, OpCode::PointCacheReset, "", -1, None);
        self.set_entry(comp, op);
        self.set_exit(comp, op);
    }

    pub(crate) fn build_rigidbody(&mut self, scene: IdHandle) {
        let comp = self.add_component_node(scene, NodeType::Transform, "");
        let rebuild = self
            .graph
            .ensure_operation(comp, OpCode::RigidbodyRebuild, "", -1, None);
        let sim = self
            .graph
            .ensure_operation(comp, OpCode::RigidbodySim, "", -1, None);
        self.set_entry(comp, rebuild);
        self.set_exit(comp, sim);

        let Some(collection) = self
            .main
            .scene(scene)
            .and_then(|block| block.rigidbody_world.as_ref())
            .and_then(|rbw| rbw.collection)
        else {
            return;
        };
        self.build_collection(collection, true);
        let members = match self.main.collection(collection) {
            Some(block) => block.objects.clone(),
            None => Vec::new(),
        };
        for member in members {
            let has_rigidbody = self
                .main
                .object(member)
                .is_some_and(|block| block.rigidbody.is_some());
            if has_rigidbody {
                self.add_operation_node(
                    member,
                    NodeType::Transform,
                    "",
                    OpCode::RigidbodyTransformCopy,
                    "",
                    -1,
                );
            }
        }
    }

    /* Shading. */

    pub(crate) fn build_material(&mut self, material: IdHandle) {
        if !self.built_map.check_is_built_and_tag(material) {
            return;
        }
        self.add_id_node(material);
        let comp = self.add_component_node(material, NodeType::Shading, "");
        let op = self
            .graph
            .ensure_operation(comp, OpCode::MaterialUpdate, "", -1, None);
        self.set_entry(comp, op);
        self.set_exit(comp, op);
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
        }
    }

    pub(crate) fn build_world(&mut self, world: IdHandle) {
        if !self.built_map.check_is_built_and_tag(world) {
            return;
        }
        self.add_id_node(world);
        let comp = self.add_component_node(world, NodeType::Shading, "");
        let op = self
            .graph
            .ensure_operation(comp, OpCode::WorldUpdate, "", -1, None);
        self.set_entry(comp, op);
        self.set_exit(comp, op);
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
        }
    }

    pub(crate) fn build_nodetree(&mut self, ntree: IdHandle) {
        if !self.built_map.check_is_built_and_tag(ntree) {
            return;
        }
        self.add_id_node(ntree);
        let comp = self.add_component_node(ntree, NodeType::NTreeOutput, "");
        let op = self
            .graph
            .ensure_operation(comp, OpCode::NTreeOutput, "", -1, None);
        self.set_entry(comp, op);
        self.set_exit(comp, op);
        self.build_parameters(ntree);
        let Some(block) = self.main.node_tree(ntree) else {
            return;
        };
        let animated_images = block.animated_images.clone();
        let groups = block.groups.clone();
        let adt = block.adt.clone();
        if !animated_images.is_empty() {
            let comp = self.add_component_node(ntree, NodeType::ImageAnimation, "");
            let op = self
                .graph
                .ensure_operation(comp, OpCode::ImageAnimation, "", -1, None);
            self.set_entry(comp, op);
            self.set_exit(comp, op);
            for image in animated_images {
                self.build_image(image);
            }
        }
        if let Some(adt) = adt {
            self.build_animdata(ntree, &adt);
        }
        for group in groups {
            self.build_nodetree(group);
        }
    }

    pub(crate) fn build_armature(&mut self, armature: IdHandle) {
        if !self.built_map.check_is_built_and_tag(armature) {
            return;
        }
        self.add_id_node(armature);
        let comp = self.add_component_node(armature, NodeType::Armature, "");
        let op = self
            .graph
            .ensure_operation(comp, OpCode::ArmatureEval, "", -1, None);
        self.set_entry(comp, op);
        self.set_exit(comp, op);
        self.build_parameters(armature);
        if let Some(adt) = self.main.armature(armature).and_then(|block| block.adt.clone()) {
            self.build_animdata(armature, &adt);
        }
    }

    fn build_image(&mut self, image: IdHandle) {
        if !self.built_map.check_is_built_and_tag(image) {
            return;
        }
        self.add_id_node(image);
        let comp = self.add_component_node(image, NodeType::GenericDatablock, "");
        let op = self
            .graph
            .ensure_operation(comp, OpCode::GenericDatablockUpdate, "", -1, None);
        self.set_entry(comp, op);
        self.set_exit(comp, op);
    }

    fn build_light(&mut self, light: IdHandle) {
        if !self.built_map.check_is_built_and_tag(light) {
            return;
        }
        self.add_id_node(light);
        let comp = self.add_component_node(light, NodeType::Shading, "");
        let op = self
            .graph
            .ensure_operation(comp, OpCode::LightUpdate, "", -1, None);
        self.set_entry(comp, op);
        self.set_exit(comp, op);
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
        }
    }

    fn build_camera(&mut self, camera: IdHandle) {
        if !self.built_map.check_is_built_and_tag(camera) {
            return;
        }
        self.add_id_node(camera);
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
            self.build_object(false, dof_object, LinkedState::Indirectly, true);
        }
    }

    fn build_lightprobe(&mut self, probe: IdHandle) {
        if !self.built_map.check_is_built_and_tag(probe) {
            return;
        }
        self.add_id_node(probe);
        self.build_parameters(probe);
        if let Some(adt) = self.main.light_probe(probe).and_then(|block| block.adt.clone()) {
            self.build_animdata(probe, &adt);
        }
    }

    fn build_speaker(&mut self, speaker: IdHandle) {
        if !self.built_map.check_is_built_and_tag(speaker) {
            return;
        }
        self.add_id_node(speaker);
        self.build_parameters(speaker);
        let Some(block) = self.main.speaker(speaker) else {
            return;
        };
        let sound = block.sound;
        let adt = block.adt.clone();
        if let Some(adt) = adt {
            self.build_animdata(speaker, &adt);
        }
        if let Some(sound) = sound {
            self.build_sound(sound);
        }
    }

    fn build_sound(&mut self, sound: IdHandle) {
        if !self.built_map.check_is_built_and_tag(sound) {
            return;
        }
        self.add_id_node(sound);
        let comp = self.add_component_node(sound, NodeType::Audio, "");
        let op = self
            .graph
            .ensure_operation(comp, OpCode::SoundEval, "", -1, None);
        self.set_entry(comp, op);
        self.set_exit(comp, op);
    }

    pub(crate) fn build_cachefile(&mut self, cachefile: IdHandle) {
        if !self.built_map.check_is_built_and_tag(cachefile) {
            return;
        }
        self.add_id_node(cachefile);
        let comp = self.add_component_node(cachefile, NodeType::Cache, "");
        let op = self
            .graph
            .ensure_operation(comp, OpCode::FileCacheUpdate, "", -1, None);
        self.set_entry(comp, op);
        self.set_exit(comp, op);
        if let Some(adt) = self
            .main
            .cachefiles()
            .find(|block| block.id.handle == cachefile)
            .and_then(|block| block.adt.clone())
        {
            self.build_animdata(cachefile, &adt);
        }
    }

    pub(crate) fn build_mask(&mut self, mask: IdHandle) {
        if !self.built_map.check_is_built_and_tag(mask) {
            return;
        }
        self.add_id_node(mask);
        let animation = self.add_component_node(mask, NodeType::Animation, "");
        let animation_op = self
            .graph
            .ensure_operation(animation, OpCode::MaskAnimation, "", -1, None);
        self.set_entry(animation, animation_op);
        self.set_exit(animation, animation_op);
        let params = self.add_component_node(mask, NodeType::Parameters, "");
        let eval_op = self
            .graph
            .ensure_operation(params, OpCode::MaskEval, "", -1, None);
        self.set_entry(params, eval_op);
        self.set_exit(params, eval_op);
    }

    pub(crate) fn build_movieclip(&mut self, clip: IdHandle) {
        if !self.built_map.check_is_built_and_tag(clip) {
            return;
        }
        self.add_id_node(clip);
        let params = self.add_component_node(clip, NodeType::Parameters, "");
        let eval_op = self
            .graph
            .ensure_operation(params, OpCode::MovieClipEval, "", -1, None);
        self.set_entry(params, eval_op);
        self.set_exit(params, eval_op);
        self.add_operation_node(
            clip,
            NodeType::BatchCache,
            "",
            OpCode::MovieClipSelectUpdate,
            "",
            -1,
        );
    }

    /* Scene-level components. */

    fn build_scene_parameters(&mut self, scene: IdHandle) {
        let comp = self.add_component_node(scene, NodeType::Parameters, "");
        let entry = self
            .graph
            .ensure_operation(comp, OpCode::ParametersEntry, "", -1, None);
        self.graph
            .ensure_operation(comp, OpCode::SceneEval, "", -1, None);
        let exit = self
            .graph
            .ensure_operation(comp, OpCode::ParametersExit, "", -1, None);
        self.set_entry(comp, entry);
        self.set_exit(comp, exit);
    }

    fn build_scene_audio(&mut self, scene: IdHandle) {
        let comp = self.add_component_node(scene, NodeType::Audio, "");
        let entry = self
            .graph
            .ensure_operation(comp, OpCode::AudioEntry, "", -1, None);
        let exit = self
            .graph
            .ensure_operation(comp, OpCode::AudioVolume, "", -1, None);
        self.set_entry(comp, entry);
        self.set_exit(comp, exit);
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
        let comp = self.add_component_node(scene, NodeType::Sequencer, "");
        let op = self
            .graph
            .ensure_operation(comp, OpCode::SequencesEval, "", -1, None);
        self.set_entry(comp, op);
        self.set_exit(comp, op);
    }

    fn build_scene_compositor(&mut self, scene: IdHandle) {
        if let Some(compositor) = self.main.scene(scene).and_then(|block| block.compositor) {
            self.build_nodetree(compositor);
        }
    }
}

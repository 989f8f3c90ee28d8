// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use fnv::{FnvHashMap, FnvHashSet};
use log::warn;
use petgraph::graph::EdgeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::Direction;

use scene::{IdHandle, IdType, Main, ViewLayer, ID_TYPE_COUNT};

use crate::cow::CowShadow;
use crate::node::{
    ComponentId, ComponentIdKey, ComponentNode, IdNode, IdNodeId, LinkNode, NodeId, NodeType,
    OpCode, OpIdKey, OperationNode, TimeSourceNode,
};
use crate::physics::{PhysicsRelations, PHYSICS_RELATIONS_NUM};
use crate::registry;
use crate::relation::{Relation, RelationFlag};
use crate::{DebugFlag, EvalFn, EvaluationMode};

pub type LinkGraph = StableDiGraph<LinkNode, Relation, u32>;

///
/// The dependency graph proper: arenas for ID and component records, the
/// petgraph holding time-source/operation nodes and their relations, the
/// entry-tag set and the per-graph configuration. Access is serialized by
/// the owning [`crate::Depsgraph`]'s mutex.
///
pub struct Graph {
    pub pg: LinkGraph,
    pub time_source: NodeId,

    /// Original datablock handle → ID node, for quick lookups.
    pub id_hash: FnvHashMap<IdHandle, IdNodeId>,
    /// Ordered list of ID nodes, order matches allocation order. Critical
    /// areas rely on the exact order of iteration.
    pub id_nodes: Vec<IdNode>,
    pub components: Vec<ComponentNode>,

    /// All operation nodes, snapshot at finalize for scheduler iteration.
    pub operations: Vec<NodeId>,

    /// Nodes which have been tagged as "directly modified".
    pub entry_tags: FnvHashSet<NodeId>,

    /// Indicates whether relations need to be rebuilt.
    pub need_update: bool,
    pub need_visibility_update: bool,
    pub need_visibility_time_update: bool,
    /// Some object in the graph animates its visibility.
    pub has_animated_visibility: bool,

    pub id_type_updated: [u8; ID_TYPE_COUNT],
    pub id_type_exist: [u8; ID_TYPE_COUNT],

    /// Main, scene, layer and mode this graph is built for.
    pub main_id: u64,
    pub scene: IdHandle,
    pub view_layer_name: String,
    pub mode: EvaluationMode,

    /// Time at which the graph is being or was last evaluated. `frame` is
    /// the value before and `ctime` the value after time remapping.
    pub frame: f32,
    pub ctime: f32,

    /// Evaluated scene ID node, cached to save a hash lookup.
    pub scene_cow: Option<IdNodeId>,

    /// The active graph may write evaluation results back to originals.
    pub is_active: bool,
    pub is_evaluating: bool,
    /// Post-processing graphs need all view layers but no bases.
    pub is_render_pipeline: bool,
    pub use_editors_update: bool,

    pub physics_relations:
        [Option<FnvHashMap<Option<IdHandle>, PhysicsRelations>>; PHYSICS_RELATIONS_NUM],

    pub graph_id: u64,
    pub debug_name: String,
    pub debug_flags: DebugFlag,
}

impl Graph {
    pub fn new(main: &Main, scene: IdHandle, view_layer: &str, mode: EvaluationMode) -> Graph {
        let mut pg = LinkGraph::default();
        let time_source = pg.add_node(LinkNode::TimeSource(TimeSourceNode::default()));
        let (frame, ctime) = match main.scene(scene) {
            Some(scene) => (scene.frame, scene.ctime),
            None => (1.0, 1.0),
        };
        Graph {
            pg,
            time_source,
            id_hash: FnvHashMap::default(),
            id_nodes: Vec::new(),
            components: Vec::new(),
            operations: Vec::new(),
            entry_tags: FnvHashSet::default(),
            need_update: true,
            need_visibility_update: true,
            need_visibility_time_update: false,
            has_animated_visibility: false,
            id_type_updated: [0; ID_TYPE_COUNT],
            id_type_exist: [0; ID_TYPE_COUNT],
            main_id: main.main_id(),
            scene,
            view_layer_name: view_layer.to_owned(),
            mode,
            frame,
            ctime,
            scene_cow: None,
            is_active: false,
            is_evaluating: false,
            is_render_pipeline: false,
            use_editors_update: false,
            physics_relations: [None, None, None, None],
            graph_id: registry::next_graph_id(),
            debug_name: String::new(),
            debug_flags: DebugFlag::empty(),
        }
    }

    /* Node management. */

    pub fn time_source(&self) -> &TimeSourceNode {
        match &self.pg[self.time_source] {
            LinkNode::TimeSource(time_source) => time_source,
            LinkNode::Operation(_) => unreachable!("Time source handle points at an operation"),
        }
    }

    pub fn time_source_mut(&mut self) -> &mut TimeSourceNode {
        match &mut self.pg[self.time_source] {
            LinkNode::TimeSource(time_source) => time_source,
            LinkNode::Operation(_) => unreachable!("Time source handle points at an operation"),
        }
    }

    pub fn tag_time_source(&mut self) {
        self.time_source_mut().tagged_for_update = true;
    }

    /// The operation behind a link-node handle. Handles stored in component
    /// operation lists always point at operations.
    pub fn operation(&self, node: NodeId) -> &OperationNode {
        self.pg[node]
            .as_operation()
            .expect("Link node expected to be an operation")
    }

    pub fn operation_mut(&mut self, node: NodeId) -> &mut OperationNode {
        self.pg[node]
            .as_operation_mut()
            .expect("Link node expected to be an operation")
    }

    pub fn id_node(&self, id: IdNodeId) -> Option<&IdNode> {
        self.id_nodes.get(id.index())
    }

    pub fn id_node_mut(&mut self, id: IdNodeId) -> Option<&mut IdNode> {
        self.id_nodes.get_mut(id.index())
    }

    pub fn component(&self, id: ComponentId) -> &ComponentNode {
        &self.components[id.index()]
    }

    pub fn component_mut(&mut self, id: ComponentId) -> &mut ComponentNode {
        &mut self.components[id.index()]
    }

    pub fn find_id_node(&self, id_orig: IdHandle) -> Option<IdNodeId> {
        self.id_hash.get(&id_orig).copied()
    }

    ///
    /// Find-or-create the ID node for an original datablock. The optional
    /// hint transfers an evaluated shadow recovered from a previous graph.
    ///
    pub fn add_id_node(
        &mut self,
        main: &Main,
        id_orig: IdHandle,
        cow_hint: Option<CowShadow>,
    ) -> IdNodeId {
        if let Some(existing) = self.find_id_node(id_orig) {
            return existing;
        }
        let id = main
            .id(id_orig)
            .unwrap_or_else(|| panic!("Datablock {id_orig} is not in the database"));
        let id_node_id = IdNodeId(self.id_nodes.len() as u32);
        let cow = CowShadow::init(id.id_type, id_orig, id.session_uuid, cow_hint);
        self.id_nodes.push(IdNode::new(
            id.id_type,
            id_orig,
            id.session_uuid,
            &id.name,
            cow,
        ));
        self.id_hash.insert(id_orig, id_node_id);
        self.id_type_exist[id.id_type.index()] = 1;
        if id.id_type == IdType::Scene && self.scene == id_orig {
            self.scene_cow = Some(id_node_id);
        }
        id_node_id
    }

    pub fn add_component(
        &mut self,
        id_node_id: IdNodeId,
        node_type: NodeType,
        name: &str,
    ) -> ComponentId {
        debug_assert!(node_type.class() == crate::node::NodeClass::Component);
        let key = ComponentIdKey::new(node_type, name);
        if let Some(existing) = self.id_nodes[id_node_id.index()].components.get(&key) {
            return *existing;
        }
        let comp_id = ComponentId(self.components.len() as u32);
        self.components
            .push(ComponentNode::new(node_type, name, id_node_id));
        self.id_nodes[id_node_id.index()]
            .components
            .insert(key, comp_id);
        comp_id
    }

    pub fn find_component(
        &self,
        id_orig: IdHandle,
        node_type: NodeType,
        name: &str,
    ) -> Option<ComponentId> {
        let id_node = self.id_node(self.find_id_node(id_orig)?)?;
        id_node.find_component(node_type, name)
    }

    ///
    /// Find-or-create an operation within a component. An existing node is
    /// updated in place, which helps when a node was partially created
    /// earlier (e.g. a parent reference before the parent itself is built).
    ///
    pub fn ensure_operation(
        &mut self,
        comp_id: ComponentId,
        opcode: OpCode,
        name: &str,
        name_tag: i32,
        eval: Option<EvalFn>,
    ) -> NodeId {
        let key = OpIdKey::new(opcode, name, name_tag);
        if let Some(existing) = self.find_operation(comp_id, &key) {
            if eval.is_some() {
                self.operation_mut(existing).eval = eval;
            }
            return existing;
        }
        let mut op_node = OperationNode::new(opcode, name, name_tag, comp_id);
        op_node.eval = eval;
        let node = self.pg.add_node(LinkNode::Operation(op_node));
        let comp = self.component_mut(comp_id);
        comp.operations.push(node);
        match &mut comp.ops_map {
            Some(ops_map) => {
                ops_map.insert(key, node);
            }
            None => {
                warn!("Operation added to finalized component {}", comp.identifier());
            }
        }
        node
    }

    pub fn has_operation(&self, comp_id: ComponentId, key: &OpIdKey) -> bool {
        self.component(comp_id).find_operation(key).is_some()
    }

    ///
    /// Operation lookup that works both during construction (hash map) and
    /// after finalize (linear scan of the component's operations).
    ///
    pub fn find_operation(&self, comp_id: ComponentId, key: &OpIdKey) -> Option<NodeId> {
        let comp = self.component(comp_id);
        if comp.ops_map.is_some() {
            return comp.find_operation(key);
        }
        comp.operations
            .iter()
            .copied()
            .find(|&node| {
                let op_node = self.operation(node);
                op_node.opcode == key.opcode
                    && op_node.name == key.name
                    && op_node.name_tag == key.name_tag
            })
    }

    pub fn find_operation_for_id(
        &self,
        id_orig: IdHandle,
        node_type: NodeType,
        comp_name: &str,
        key: &OpIdKey,
    ) -> Option<NodeId> {
        let comp_id = self.find_component(id_orig, node_type, comp_name)?;
        self.find_operation(comp_id, key)
    }

    /* Relations. */

    ///
    /// Check whether two nodes are connected by a relation with the given
    /// description. `None` matches any relation between the nodes.
    ///
    pub fn check_nodes_connected(
        &self,
        from: NodeId,
        to: NodeId,
        description: Option<&str>,
    ) -> Option<EdgeIndex<u32>> {
        use petgraph::visit::EdgeRef;
        self.pg
            .edges_directed(from, Direction::Outgoing)
            .find(|edge| {
                edge.target() == to
                    && description.is_none_or(|description| edge.weight().description == description)
            })
            .map(|edge| edge.id())
    }

    /// Add a new relation between two nodes.
    pub fn add_new_relation(
        &mut self,
        from: NodeId,
        to: NodeId,
        description: &str,
        flags: RelationFlag,
    ) -> EdgeIndex<u32> {
        if flags.contains(RelationFlag::CHECK_BEFORE_ADD) {
            if let Some(existing) = self.check_nodes_connected(from, to, Some(description)) {
                self.pg[existing].flags |= flags;
                return existing;
            }
        }

        #[cfg(debug_assertions)]
        {
            // Copy-on-write layering: only copy-on-write operations may feed
            // another ID's copy-on-write operation.
            if let (LinkNode::Operation(op_from), LinkNode::Operation(op_to)) =
                (&self.pg[from], &self.pg[to])
            {
                let owner_from = self.component(op_from.owner).node_type;
                let owner_to = self.component(op_to.owner).node_type;
                debug_assert!(
                    owner_to != NodeType::CopyOnWrite || owner_from == NodeType::CopyOnWrite,
                    "Relation \"{description}\" targets a copy-on-write operation from {owner_from:?}"
                );
            }
        }

        self.pg.add_edge(from, to, Relation::new(description, flags))
    }

    /* Low level tagging. */

    ///
    /// Add the node to the graph-level set of directly modified nodes to
    /// start flushing from. Set-insertion, hence idempotent.
    ///
    pub fn add_entry_tag(&mut self, node: NodeId) {
        self.entry_tags.insert(node);
    }

    /* Teardown. */

    fn clear_cow_conditional<F: Fn(IdType) -> bool>(&mut self, filter: F) {
        for id_node in &mut self.id_nodes {
            if !id_node.cow.is_expanded() {
                continue;
            }
            if id_node.cow.is_alias() {
                // Copy-on-write version is not needed for this ID type.
                continue;
            }
            if filter(id_node.id_type) {
                id_node.cow = CowShadow::Freed;
            }
        }
    }

    ///
    /// Free all ID nodes. Evaluated shadows are freed in a fixed order,
    /// since destructor side effects depend on scene and particle-settings
    /// lifetimes: particle settings first, scenes last.
    ///
    pub fn clear_id_nodes(&mut self) {
        self.clear_cow_conditional(|id_type| id_type == IdType::ParticleSettings);
        self.clear_cow_conditional(|id_type| id_type != IdType::Scene);
        self.clear_cow_conditional(|_| true);

        self.id_hash.clear();
        self.id_nodes.clear();
        self.components.clear();
        self.operations.clear();
        self.entry_tags.clear();
        self.scene_cow = None;

        // Rebuild the link graph with only the time source in it.
        let tagged_for_update = self.time_source().tagged_for_update;
        let mut pg = LinkGraph::default();
        self.time_source = pg.add_node(LinkNode::TimeSource(TimeSourceNode { tagged_for_update }));
        self.pg = pg;

        crate::physics::clear_physics_relations(self);
    }

    /* Finalize. */

    ///
    /// Post-build bookkeeping: propagate visibility onto components, compute
    /// visible component masks, drop construction-time lookup maps, snapshot
    /// the operations list and stamp scheduler valencies.
    ///
    pub fn finalize_build(&mut self) {
        for id_node_index in 0..self.id_nodes.len() {
            let is_directly_visible = self.id_nodes[id_node_index].is_directly_visible;
            let component_ids: Vec<ComponentId> = self.id_nodes[id_node_index]
                .components
                .values()
                .copied()
                .collect();
            let mut mask = 0u64;
            for comp_id in component_ids {
                let comp = self.component_mut(comp_id);
                comp.affects_directly_visible = is_directly_visible;
                comp.finalize_build();
                if comp.affects_directly_visible {
                    mask |= comp.node_type.component_mask_bit();
                }
            }
            self.id_nodes[id_node_index].visible_components_mask = mask;
        }

        self.operations = self
            .pg
            .node_indices()
            .filter(|&node| self.pg[node].as_operation().is_some())
            .collect();

        self.flush_valency();
    }

    /// Recompute `num_links_pending` from operation-class inlinks.
    pub fn flush_valency(&mut self) {
        let operations = self.operations.clone();
        for &node in &operations {
            let pending = self
                .pg
                .neighbors_directed(node, Direction::Incoming)
                .filter(|&from| self.pg[from].as_operation().is_some())
                .count() as u32;
            self.operation_mut(node).num_links_pending = pending;
        }
    }

    /* Convenience. */

    pub fn view_layer<'a>(&self, main: &'a Main) -> Option<&'a ViewLayer> {
        main.scene(self.scene)
            .and_then(|scene| scene.view_layer(&self.view_layer_name))
    }
}

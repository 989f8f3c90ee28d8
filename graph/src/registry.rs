// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Process-wide state: the node-type info table, the live-graph registry and
//! the editor-update callbacks. All lazily allocated, populated once at
//! startup and clearable at shutdown.

use std::sync::Arc;

use fnv::FnvHashMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use scene::{IdHandle, IdRecalcFlag, IdType, Main};

use crate::node::{NodeType, NODE_TYPE_COUNT};

///
/// Per-node-type information, collapsed into one table row: display name,
/// recalc contribution and component policy.
///
#[derive(Clone, Copy, Debug)]
pub struct NodeTypeInfo {
    pub name: &'static str,
    /// Recalc bit this component contributes when flushing accumulates
    /// per-ID recalc flags.
    pub id_recalc_tag: IdRecalcFlag,
    /// Whether operations of this component must wait for the ID's
    /// copy-on-write operation.
    pub depends_on_cow: bool,
    /// Whether tagging this component for update implicitly tags the ID's
    /// copy-on-write operation too.
    pub need_tag_cow_before_update: bool,
}

struct Registry {
    types: [Option<NodeTypeInfo>; NODE_TYPE_COUNT],
}

static REGISTRY: Lazy<RwLock<Option<Registry>>> = Lazy::new(|| RwLock::new(None));

fn info(
    name: &'static str,
    id_recalc_tag: IdRecalcFlag,
    depends_on_cow: bool,
    need_tag_cow_before_update: bool,
) -> NodeTypeInfo {
    NodeTypeInfo {
        name,
        id_recalc_tag,
        depends_on_cow,
        need_tag_cow_before_update,
    }
}

///
/// Populate the node-type table. Must run once at process startup, before
/// any graph is built.
///
pub fn register_node_types() {
    let mut registry = REGISTRY.write();
    if registry.is_some() {
        return;
    }
    let mut types: [Option<NodeTypeInfo>; NODE_TYPE_COUNT] = [None; NODE_TYPE_COUNT];
    let mut set = |node_type: NodeType, type_info: NodeTypeInfo| {
        types[node_type as usize] = Some(type_info);
    };

    let none = IdRecalcFlag::empty();
    // Base types.
    set(NodeType::TimeSource, info("Time Source", none, false, false));
    set(NodeType::IdRef, info("ID Node", none, false, false));
    set(NodeType::Operation, info("Operation", none, true, true));
    // Components.
    set(
        NodeType::Parameters,
        info("Parameters Component", IdRecalcFlag::PARAMETERS, true, true),
    );
    set(
        NodeType::Animation,
        info("Animation Component", IdRecalcFlag::ANIMATION, true, true),
    );
    set(
        NodeType::Transform,
        info("Transform Component", IdRecalcFlag::TRANSFORM, true, true),
    );
    set(
        NodeType::Geometry,
        info("Geometry Component", IdRecalcFlag::GEOMETRY, true, true),
    );
    set(
        NodeType::Sequencer,
        info(
            "Sequencer Component",
            IdRecalcFlag::SEQUENCER_STRIPS,
            true,
            true,
        ),
    );
    set(
        NodeType::LayerCollections,
        info("Layer Collections Component", none, true, true),
    );
    set(
        NodeType::CopyOnWrite,
        info(
            "Copy On Write Component",
            IdRecalcFlag::COPY_ON_WRITE,
            false,
            false,
        ),
    );
    set(
        NodeType::ObjectFromLayer,
        info(
            "Object From Layer Component",
            IdRecalcFlag::BASE_FLAGS,
            true,
            false,
        ),
    );
    set(
        NodeType::EvalPose,
        info("Pose Component", IdRecalcFlag::GEOMETRY, true, true),
    );
    set(
        NodeType::Bone,
        info("Bone Component", IdRecalcFlag::GEOMETRY, true, true),
    );
    set(
        NodeType::ParticleSystem,
        info("Particles Component", IdRecalcFlag::PSYS, true, true),
    );
    set(
        NodeType::ParticleSettings,
        info(
            "Particle Settings Component",
            IdRecalcFlag::PSYS,
            true,
            true,
        ),
    );
    set(
        NodeType::Shading,
        info("Shading Component", IdRecalcFlag::SHADING, true, false),
    );
    set(
        NodeType::ShadingParameters,
        info(
            "Shading Parameters Component",
            IdRecalcFlag::SHADING,
            true,
            true,
        ),
    );
    set(NodeType::Cache, info("Cache Component", none, true, true));
    set(
        NodeType::PointCache,
        info(
            "Point Cache Component",
            IdRecalcFlag::POINT_CACHE,
            true,
            true,
        ),
    );
    set(
        NodeType::ImageAnimation,
        info("Image Animation Component", none, true, true),
    );
    set(
        NodeType::BatchCache,
        info("Batch Cache Component", IdRecalcFlag::SELECT, true, false),
    );
    set(
        NodeType::Dupli,
        info("Dupli Component", IdRecalcFlag::GEOMETRY, true, true),
    );
    set(
        NodeType::Synchronization,
        info(
            "Synchronization Component",
            IdRecalcFlag::SYNCHRONIZE,
            true,
            true,
        ),
    );
    set(
        NodeType::Audio,
        info("Audio Component", IdRecalcFlag::AUDIO, true, true),
    );
    set(
        NodeType::Armature,
        info("Armature Component", IdRecalcFlag::GEOMETRY, true, true),
    );
    set(
        NodeType::GenericDatablock,
        info(
            "Generic Datablock Component",
            IdRecalcFlag::PARAMETERS,
            true,
            true,
        ),
    );
    // Internal-only component; never reported through public APIs.
    set(
        NodeType::Visibility,
        info("Visibility Component", none, false, false),
    );
    set(
        NodeType::Simulation,
        info("Simulation Component", IdRecalcFlag::GEOMETRY, true, true),
    );
    set(
        NodeType::NTreeOutput,
        info(
            "Node Tree Output Component",
            IdRecalcFlag::PARAMETERS,
            true,
            true,
        ),
    );

    *registry = Some(Registry { types });
}

/// Tear the table down; for symmetric shutdown.
pub fn free_node_types() {
    *REGISTRY.write() = None;
}

pub fn node_type_info(node_type: NodeType) -> NodeTypeInfo {
    let registry = REGISTRY.read();
    let registry = registry
        .as_ref()
        .expect("Node types are not registered, call register_node_types() at startup");
    registry.types[node_type as usize]
        .unwrap_or_else(|| panic!("No type info registered for {}", node_type.as_str()))
}

///
/// Whether tagging a component of this type on this ID kind must also tag
/// the copy-on-write operation. The parameters component is special: some ID
/// types can consume parameter updates without re-copying.
///
pub fn need_tag_cow_before_update(node_type: NodeType, id_type: IdType) -> bool {
    if node_type == NodeType::Parameters && crate::cow::supports_params_without_cow(id_type) {
        return false;
    }
    node_type_info(node_type).need_tag_cow_before_update
}

/* Live graph registry. */

#[derive(Clone, Debug)]
pub struct GraphInfo {
    pub scene: IdHandle,
    pub view_layer: String,
}

static GRAPHS: Lazy<Mutex<FnvHashMap<u64, GraphInfo>>> =
    Lazy::new(|| Mutex::new(FnvHashMap::default()));

static NEXT_GRAPH_ID: Lazy<Mutex<u64>> = Lazy::new(|| Mutex::new(1));

pub fn next_graph_id() -> u64 {
    let mut next = NEXT_GRAPH_ID.lock();
    let id = *next;
    *next += 1;
    id
}

pub fn register_graph(graph_id: u64, graph_info: GraphInfo) {
    GRAPHS.lock().insert(graph_id, graph_info);
}

pub fn unregister_graph(graph_id: u64) {
    GRAPHS.lock().remove(&graph_id);
}

pub fn live_graph_count() -> usize {
    GRAPHS.lock().len()
}

pub fn is_graph_registered(graph_id: u64) -> bool {
    GRAPHS.lock().contains_key(&graph_id)
}

/* Editor update callbacks. */

///
/// Context handed to the editor notification callbacks. Carries identity of
/// the graph rather than a reference; the graph lock is held while the
/// callbacks run.
///
pub struct EditorUpdateContext<'a> {
    pub main: &'a Main,
    pub graph_id: u64,
    pub scene: IdHandle,
    pub view_layer: &'a str,
}

pub type EditorUpdateIdFn = Arc<dyn Fn(&EditorUpdateContext, IdHandle) + Send + Sync>;
pub type EditorUpdateSceneFn = Arc<dyn Fn(&EditorUpdateContext, bool) + Send + Sync>;

#[allow(clippy::type_complexity)]
static EDITOR_CALLBACKS: Lazy<RwLock<Option<(EditorUpdateIdFn, EditorUpdateSceneFn)>>> =
    Lazy::new(|| RwLock::new(None));

/// Install the editor notification callbacks; called once at startup.
pub fn set_editors_update_cb(id_fn: EditorUpdateIdFn, scene_fn: EditorUpdateSceneFn) {
    *EDITOR_CALLBACKS.write() = Some((id_fn, scene_fn));
}

pub fn clear_editors_update_cb() {
    *EDITOR_CALLBACKS.write() = None;
}

pub fn editors_id_update(update_ctx: &EditorUpdateContext, id: IdHandle) {
    let callbacks = EDITOR_CALLBACKS.read();
    if let Some((id_fn, _)) = callbacks.as_ref() {
        id_fn(update_ctx, id);
    }
}

pub fn editors_scene_update(update_ctx: &EditorUpdateContext, updated: bool) {
    let callbacks = EDITOR_CALLBACKS.read();
    if let Some((_, scene_fn)) = callbacks.as_ref() {
        scene_fn(update_ctx, updated);
    }
}

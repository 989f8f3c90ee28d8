// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

#![deny(warnings)]
// Enable all clippy lints except for many of the pedantic ones. It's a shame this needs to be copied and pasted across crates, but there doesn't appear to be a way to include inner attributes from a common source.
#![deny(
    clippy::all,
    clippy::default_trait_access,
    clippy::expl_impl_clone_on_copy,
    clippy::if_not_else,
    clippy::needless_continue,
    clippy::unseparated_literal_suffix,
    clippy::used_underscore_binding
)]
// It is often more clear to show that nothing is being moved.
#![allow(clippy::match_ref_pats)]
// Subjective style.
#![allow(
    clippy::len_without_is_empty,
    clippy::redundant_field_names,
    clippy::too_many_arguments
)]
// Default isn't as big a deal as people seem to think it is.
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]
// Arc<Mutex> can be more clear than needing to grok Orderings:
#![allow(clippy::mutex_atomic)]

//! The dependency graph core: a directed graph over ID/component/operation
//! granularities that tracks how pieces of scene data depend on one another,
//! propagates invalidation when data changes, and answers reachability
//! queries for tools.

pub mod cow;
pub mod debug;
pub mod flush;
mod graph;
pub mod node;
pub mod physics;
pub mod query;
pub mod query_foreach;
pub mod registry;
mod relation;
pub mod tag;

use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::{Mutex, MutexGuard};

use scene::{IdHandle, IdRecalcFlag, IdType, Main};

pub use crate::graph::{Graph, LinkGraph};
pub use crate::node::{
    ComponentId, ComponentIdKey, ComponentNode, IdNode, IdNodeId, LinkNode, LinkedState, NodeClass,
    NodeId, NodeType, ObjectComponent, OpCode, OpFlag, OpIdKey, OperationNode, TimeSourceNode,
};
pub use crate::query::ObjectIterFlag;
pub use crate::query_foreach::ForeachFlag;
pub use crate::relation::{Relation, RelationFlag};
pub use crate::tag::UpdateSource;

/// What the graph is evaluated for. Set once at construction; callers
/// needing the other mode build another graph.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EvaluationMode {
    Viewport,
    Render,
}

bitflags! {
    /// Per-graph debugging switches.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct DebugFlag: u32 {
        /// Log graph construction steps.
        const BUILD = 1 << 0;
        /// Log evaluation-time activity (flush entry points, recalc bits).
        const EVAL = 1 << 1;
        /// Wreck tagged evaluated state on flush so stale reads fail loudly.
        const INVALIDATE_ON_FLUSH = 1 << 2;
    }
}

/// Context handed to operation callbacks by the external evaluator.
pub struct EvalContext<'a> {
    pub depsgraph: &'a Depsgraph,
    pub main: &'a Main,
}

/// An operation's evaluation callback, bound during graph construction.
pub type EvalFn = Arc<dyn Fn(&EvalContext) + Send + Sync>;

///
/// The public shell around the graph. All entry points lock the inner
/// structure once; builders and tests may hold the lock across a whole pass
/// via [`Depsgraph::lock`].
///
pub struct Depsgraph {
    inner: Mutex<Graph>,
}

impl Depsgraph {
    ///
    /// Build an empty graph bound to the given database, scene, view layer
    /// and evaluation mode, and register it with the live-graph registry.
    ///
    pub fn new(main: &Main, scene: IdHandle, view_layer: &str, mode: EvaluationMode) -> Depsgraph {
        let graph = Graph::new(main, scene, view_layer, mode);
        registry::register_graph(
            graph.graph_id,
            registry::GraphInfo {
                scene,
                view_layer: view_layer.to_owned(),
            },
        );
        Depsgraph {
            inner: Mutex::new(graph),
        }
    }

    /// Lock the inner graph for a longer operation (builders, tests).
    pub fn lock(&self) -> MutexGuard<'_, Graph> {
        self.inner.lock()
    }

    ///
    /// Re-bind the graph to another database/scene/view-layer triple while
    /// keeping its structure; used for undo and render, where the graph is
    /// reused against a different source context. The evaluation mode is
    /// not switchable; callers wanting another mode rebuild.
    ///
    pub fn replace_owners(&self, main: &Main, scene: IdHandle, view_layer: &str) {
        let mut graph = self.inner.lock();
        let re_register = graph.main_id != main.main_id();
        if re_register {
            registry::unregister_graph(graph.graph_id);
        }
        graph.main_id = main.main_id();
        graph.scene = scene;
        graph.view_layer_name = view_layer.to_owned();
        if re_register {
            registry::register_graph(
                graph.graph_id,
                registry::GraphInfo {
                    scene,
                    view_layer: view_layer.to_owned(),
                },
            );
        }
    }

    /* Activity. */

    pub fn make_active(&self) {
        self.inner.lock().is_active = true;
        // TODO: Copy data from the evaluated state to the original.
    }

    pub fn make_inactive(&self) {
        self.inner.lock().is_active = false;
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().is_active
    }

    pub fn is_evaluating(&self) -> bool {
        self.inner.lock().is_evaluating
    }

    /* Tagging. */

    /// Tag an ID for an update of the given kinds. Unknown IDs are silently
    /// ignored: the change simply does not propagate within this graph.
    pub fn tag_id_update(&self, id: IdHandle, flags: IdRecalcFlag, source: UpdateSource) {
        let mut graph = self.inner.lock();
        tag::id_tag_update(&mut graph, id, flags, source);
    }

    pub fn tag_id_type(&self, id_type: IdType) {
        tag::tag_id_type(&mut self.inner.lock(), id_type);
    }

    /// Tag the time source; the next flush marks every time-dependent
    /// operation for update.
    pub fn tag_time(&self) {
        tag::tag_time(&mut self.inner.lock());
    }

    /* Flushing. */

    pub fn flush_updates(&self, main: &mut Main) {
        let mut graph = self.inner.lock();
        flush::flush_updates(&mut graph, main);
    }

    pub fn clear_tags(&self) {
        flush::clear_tags(&mut self.inner.lock());
    }

    pub fn ids_clear_recalc(&self, backup: bool) {
        flush::ids_clear_recalc(&mut self.inner.lock(), backup);
    }

    pub fn ids_restore_recalc(&self) {
        flush::ids_restore_recalc(&mut self.inner.lock());
    }

    /* Copy-on-write. */

    /// Bring the evaluated shadow of an ID up to date; the body of the
    /// per-ID copy-on-write operation.
    pub fn evaluate_copy_on_write(&self, main: &Main, id: IdHandle) {
        let mut graph = self.inner.lock();
        if let Some(id_node_id) = graph.find_id_node(id) {
            cow::evaluate_copy_on_write(&mut graph, id_node_id, main);
        }
    }

    /* Queries. */

    pub fn evaluated_recalc(&self, id: IdHandle) -> IdRecalcFlag {
        query::evaluated_recalc(&self.inner.lock(), id)
    }

    pub fn eval_flags_for_id(&self, id: IdHandle) -> u32 {
        query::eval_flags_for_id(&self.inner.lock(), id)
    }

    pub fn customdata_mask_for_object(&self, id: IdHandle) -> node::id_node::CustomDataMasks {
        query::customdata_mask_for_object(&self.inner.lock(), id)
    }

    pub fn id_type_updated(&self, id_type: IdType) -> bool {
        query::id_type_updated(&self.inner.lock(), id_type)
    }

    pub fn id_type_any_updated(&self) -> bool {
        query::id_type_any_updated(&self.inner.lock())
    }

    pub fn id_type_exists(&self, id_type: IdType) -> bool {
        query::id_type_exists(&self.inner.lock(), id_type)
    }

    pub fn is_fully_evaluated(&self) -> bool {
        query::is_fully_evaluated(&self.inner.lock())
    }

    /* Traversal. */

    pub fn foreach_dependent_id(&self, id: IdHandle, callback: impl FnMut(IdHandle)) {
        query_foreach::foreach_dependent_id(&self.inner.lock(), id, callback);
    }

    pub fn foreach_dependent_id_component(
        &self,
        id: IdHandle,
        source_component: ObjectComponent,
        flags: ForeachFlag,
        callback: impl FnMut(IdHandle, ObjectComponent),
    ) {
        query_foreach::foreach_dependent_id_component(
            &self.inner.lock(),
            id,
            source_component,
            flags,
            callback,
        );
    }

    pub fn foreach_ancestor_id(&self, id: IdHandle, callback: impl FnMut(IdHandle)) {
        query_foreach::foreach_ancestor_id(&self.inner.lock(), id, callback);
    }

    pub fn foreach_id(&self, callback: impl FnMut(IdHandle)) {
        query_foreach::foreach_id(&self.inner.lock(), callback);
    }

    pub fn foreach_object(&self, flags: ObjectIterFlag, callback: impl FnMut(IdHandle)) {
        query::foreach_object(&self.inner.lock(), flags, callback);
    }

    /* Debugging. */

    pub fn set_debug_name(&self, name: &str) {
        self.inner.lock().debug_name = name.to_owned();
    }

    pub fn debug_name(&self) -> String {
        self.inner.lock().debug_name.clone()
    }

    pub fn set_debug_flags(&self, flags: DebugFlag) {
        self.inner.lock().debug_flags = flags;
    }

    pub fn debug_flags(&self) -> DebugFlag {
        self.inner.lock().debug_flags
    }

    pub fn consistency_check(&self) -> bool {
        debug::consistency_check(&self.inner.lock())
    }

    pub fn stats_simple(&self) -> debug::Stats {
        debug::stats_simple(&self.inner.lock())
    }
}

impl Drop for Depsgraph {
    fn drop(&mut self) {
        let mut graph = self.inner.lock();
        graph.clear_id_nodes();
        registry::unregister_graph(graph.graph_id);
    }
}

#[cfg(test)]
mod tests;

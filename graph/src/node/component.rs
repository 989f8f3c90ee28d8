// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use fnv::FnvHashMap;

use crate::node::id_node::IdNodeId;
use crate::node::{NodeId, NodeType, OpCode};

/// Handle of a component record in the graph's component arena.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ComponentId(pub u32);

impl ComponentId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Key used to look up operations within a component.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct OpIdKey {
    pub opcode: OpCode,
    pub name: String,
    pub name_tag: i32,
}

impl OpIdKey {
    pub fn new(opcode: OpCode, name: &str, name_tag: i32) -> OpIdKey {
        OpIdKey {
            opcode,
            name: name.to_owned(),
            name_tag,
        }
    }
}

/// Key used to look up components within an ID node.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ComponentIdKey {
    pub node_type: NodeType,
    pub name: String,
}

impl ComponentIdKey {
    pub fn new(node_type: NodeType, name: &str) -> ComponentIdKey {
        ComponentIdKey {
            node_type,
            name: name.to_owned(),
        }
    }
}

///
/// A grouping of operations on one ID sharing a category (transform,
/// geometry, one bone, ...). Components are containers: relations never
/// terminate at them, they resolve to the component's entry/exit operation.
///
#[derive(Debug)]
pub struct ComponentNode {
    pub node_type: NodeType,
    /// Sub-name (bone name, particle system name); usually empty.
    pub name: String,
    pub owner: IdNodeId,
    /// Operations in creation order; this is what evaluation iterates.
    pub operations: Vec<NodeId>,
    /// Fast lookup map used during construction and dropped at finalize.
    pub ops_map: Option<FnvHashMap<OpIdKey, NodeId>>,
    pub entry_operation: Option<NodeId>,
    pub exit_operation: Option<NodeId>,
    /// Whether this component (possibly indirectly) affects a directly
    /// visible datablock; propagated during finalize.
    pub affects_directly_visible: bool,
    /// Scratch word used only while a flush owns the graph.
    pub custom_flags: u32,
}

impl ComponentNode {
    pub fn new(node_type: NodeType, name: &str, owner: IdNodeId) -> ComponentNode {
        ComponentNode {
            node_type,
            name: name.to_owned(),
            owner,
            operations: Vec::new(),
            ops_map: Some(FnvHashMap::default()),
            entry_operation: None,
            exit_operation: None,
            affects_directly_visible: false,
            custom_flags: 0,
        }
    }

    pub fn identifier(&self) -> String {
        if self.name.is_empty() {
            self.node_type.as_str().to_owned()
        } else {
            format!("{} : {}", self.node_type.as_str(), self.name)
        }
    }

    pub fn find_operation(&self, key: &OpIdKey) -> Option<NodeId> {
        match &self.ops_map {
            Some(ops_map) => ops_map.get(key).copied(),
            None => None,
        }
    }

    ///
    /// Entry/exit setters enforce the layering discipline: external inbound
    /// relations must terminate at the entry operation, external outbound
    /// ones must originate at the exit operation.
    ///
    pub fn set_entry_operation(&mut self, op: NodeId) {
        debug_assert!(
            self.entry_operation.is_none(),
            "Entry operation for {} is already set",
            self.identifier()
        );
        self.entry_operation = Some(op);
    }

    pub fn set_exit_operation(&mut self, op: NodeId) {
        debug_assert!(
            self.exit_operation.is_none(),
            "Exit operation for {} is already set",
            self.identifier()
        );
        self.exit_operation = Some(op);
    }

    ///
    /// The operation external inbound relations should target. Components
    /// with several operations must have declared an explicit entry.
    ///
    pub fn entry_operation(&self) -> Option<NodeId> {
        if self.entry_operation.is_some() {
            return self.entry_operation;
        }
        if self.operations.len() == 1 {
            return Some(self.operations[0]);
        }
        None
    }

    pub fn exit_operation(&self) -> Option<NodeId> {
        if self.exit_operation.is_some() {
            return self.exit_operation;
        }
        if self.operations.len() == 1 {
            return Some(self.operations[0]);
        }
        None
    }

    /// Drop the construction-time lookup map; called once the graph is built.
    pub fn finalize_build(&mut self) {
        self.ops_map = None;
    }
}

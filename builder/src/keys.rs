// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Key-based addressing of graph nodes during relation construction.

use graph::{Graph, NodeId, NodeType, OpCode, OpIdKey};
use scene::{IdHandle, SessionUuid};

/// Addresses a specific operation of a specific component of an ID.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct OpKey {
    pub id: IdHandle,
    pub component: NodeType,
    pub component_name: String,
    pub opcode: OpCode,
    pub name: String,
    pub name_tag: i32,
}

impl OpKey {
    pub fn new(id: IdHandle, component: NodeType, opcode: OpCode) -> OpKey {
        OpKey {
            id,
            component,
            component_name: String::new(),
            opcode,
            name: String::new(),
            name_tag: -1,
        }
    }

    /// Key into a sub-named component (a bone, a particle system).
    pub fn sub(id: IdHandle, component: NodeType, component_name: &str, opcode: OpCode) -> OpKey {
        OpKey {
            id,
            component,
            component_name: component_name.to_owned(),
            opcode,
            name: String::new(),
            name_tag: -1,
        }
    }

    /// Key addressing an operation by its per-component name.
    pub fn named(id: IdHandle, component: NodeType, opcode: OpCode, name: &str) -> OpKey {
        OpKey {
            id,
            component,
            component_name: String::new(),
            opcode,
            name: name.to_owned(),
            name_tag: -1,
        }
    }

    pub fn op_id_key(&self) -> OpIdKey {
        OpIdKey::new(self.opcode, &self.name, self.name_tag)
    }
}

/// Addresses a component; as a relation endpoint it resolves to the
/// component's entry or exit operation depending on direction.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ComponentKey {
    pub id: IdHandle,
    pub component: NodeType,
    pub component_name: String,
}

impl ComponentKey {
    pub fn new(id: IdHandle, component: NodeType) -> ComponentKey {
        ComponentKey {
            id,
            component,
            component_name: String::new(),
        }
    }

    pub fn sub(id: IdHandle, component: NodeType, component_name: &str) -> ComponentKey {
        ComponentKey {
            id,
            component,
            component_name: component_name.to_owned(),
        }
    }
}

/// Any relation endpoint the builder can express.
#[derive(Clone, Debug)]
pub enum Key {
    TimeSource,
    Component(ComponentKey),
    Op(OpKey),
}

impl From<ComponentKey> for Key {
    fn from(key: ComponentKey) -> Key {
        Key::Component(key)
    }
}

impl From<OpKey> for Key {
    fn from(key: OpKey) -> Key {
        Key::Op(key)
    }
}

impl Key {
    ///
    /// Resolve to the concrete operation node a relation should attach to.
    /// `as_source` picks the exit operation for component keys, entry
    /// otherwise.
    ///
    pub fn resolve(&self, graph: &Graph, as_source: bool) -> Option<NodeId> {
        match self {
            Key::TimeSource => Some(graph.time_source),
            Key::Op(key) => graph.find_operation_for_id(
                key.id,
                key.component,
                &key.component_name,
                &key.op_id_key(),
            ),
            Key::Component(key) => {
                let comp_id =
                    graph.find_component(key.id, key.component, &key.component_name)?;
                let comp = graph.component(comp_id);
                if as_source {
                    comp.exit_operation()
                } else {
                    comp.entry_operation()
                }
            }
        }
    }

    pub fn identifier(&self) -> String {
        match self {
            Key::TimeSource => "TimeSource".to_owned(),
            Key::Component(key) => format!(
                "ComponentKey({}, {}{})",
                key.id,
                key.component.as_str(),
                if key.component_name.is_empty() {
                    String::new()
                } else {
                    format!(", {}", key.component_name)
                }
            ),
            Key::Op(key) => format!(
                "OpKey({}, {}, {})",
                key.id,
                key.component.as_str(),
                key.opcode
            ),
        }
    }
}

///
/// A key that stays resolvable across graph rebuilds: handles may change,
/// session UUIDs do not. Used to transfer entry tags onto the new graph.
///
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PersistentOpKey {
    pub session_uuid: SessionUuid,
    pub component: NodeType,
    pub component_name: String,
    pub opcode: OpCode,
    pub name: String,
    pub name_tag: i32,
    /// Whether the tagged operation carried the user-modified bit.
    pub user_modified: bool,
}

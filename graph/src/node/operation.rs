// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use bitflags::bitflags;

use crate::node::component::ComponentId;
use crate::node::OpCode;
use crate::EvalFn;

bitflags! {
    /// Scheduling state of one operation node.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct OpFlag: u32 {
        /// The operation must re-run before its outputs may be read.
        const NEEDS_UPDATE = 1 << 0;
        /// The operation was tagged directly, not reached by flushing.
        const DIRECTLY_MODIFIED = 1 << 1;
        /// The tag originated from a user edit.
        const USER_MODIFIED = 1 << 2;
    }
}

impl OpFlag {
    /// Bits which flushing copies onto every downstream operation, so
    /// children always know what happened to their parents.
    pub fn flush_mask() -> OpFlag {
        OpFlag::USER_MODIFIED
    }
}

///
/// The finest-grained unit of scheduling: one evaluatable step within a
/// component, carrying the host-provided callback the evaluator invokes.
///
pub struct OperationNode {
    pub opcode: OpCode,
    /// Identifier for the operation, used to find it again (bone name,
    /// driven property path, ...). Often empty.
    pub name: String,
    pub name_tag: i32,
    pub owner: ComponentId,
    pub eval: Option<EvalFn>,
    pub flags: OpFlag,
    /// Whether this node is already in the flush queue.
    pub scheduled: bool,
    /// Scratch word used only while a traversal owns the graph.
    pub custom_flags: u32,
    /// Number of not-yet-evaluated operation-class inlinks; the external
    /// scheduler uses this as its topological gate.
    pub num_links_pending: u32,
}

impl OperationNode {
    pub fn new(opcode: OpCode, name: &str, name_tag: i32, owner: ComponentId) -> OperationNode {
        OperationNode {
            opcode,
            name: name.to_owned(),
            name_tag,
            owner,
            eval: None,
            flags: OpFlag::empty(),
            scheduled: false,
            custom_flags: 0,
            num_links_pending: 0,
        }
    }

    pub fn identifier(&self) -> String {
        format!("{}({})", self.opcode, self.name)
    }

    pub fn is_tagged_for_update(&self) -> bool {
        self.flags.contains(OpFlag::NEEDS_UPDATE)
    }
}

impl fmt::Debug for OperationNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("OperationNode")
            .field("opcode", &self.opcode)
            .field("name", &self.name)
            .field("name_tag", &self.name_tag)
            .field("owner", &self.owner)
            .field("flags", &self.flags)
            .finish()
    }
}

///
/// The logical source of the current frame time. Unique per graph; every
/// time-dependent operation ultimately depends on it.
///
#[derive(Debug, Default)]
pub struct TimeSourceNode {
    pub tagged_for_update: bool,
}

// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use bitflags::bitflags;

bitflags! {
    /// Behavior modifiers on one relation.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct RelationFlag: u32 {
        /// De-duplicate against an identical `(to, description)` edge on
        /// insert, merging flag bits into the existing relation.
        const CHECK_BEFORE_ADD = 1 << 0;
        /// The relation is allowed to violate the usual layering rules and
        /// is ignored by the cycle reporter.
        const GODMODE = 1 << 1;
        /// Recalc never propagates across this relation.
        const NO_FLUSH = 1 << 2;
        /// Recalc propagates only when the source operation was modified by
        /// the user.
        const FLUSH_USER_EDIT_ONLY = 1 << 3;
    }
}

///
/// An ordered edge `from → to` between two link-level nodes. Stored as a
/// petgraph edge weight, so membership in both endpoints' link lists is
/// structural rather than book-kept.
///
#[derive(Clone, Debug)]
pub struct Relation {
    /// Human-readable label, used by debugging and by de-duplication.
    pub description: String,
    pub flags: RelationFlag,
}

impl Relation {
    pub fn new(description: &str, flags: RelationFlag) -> Relation {
        Relation {
            description: description.to_owned(),
            flags,
        }
    }
}

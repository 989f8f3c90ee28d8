// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use fnv::FnvHashSet;

use scene::IdHandle;

///
/// Bookkeeping of which original IDs a builder pass already visited, so
/// recursive build functions can short-circuit re-entry.
///
#[derive(Debug, Default)]
pub struct BuilderMap {
    built: FnvHashSet<IdHandle>,
}

impl BuilderMap {
    ///
    /// Check whether the ID was built already, marking it as built in the
    /// process. Returns true when the caller should proceed with building.
    ///
    pub fn check_is_built_and_tag(&mut self, id: IdHandle) -> bool {
        self.built.insert(id)
    }
}

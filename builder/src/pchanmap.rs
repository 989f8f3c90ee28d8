// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use fnv::{FnvHashMap, FnvHashSet};

///
/// Which IK chain root(s) each pose channel contributes to. Chain siblings
/// share a root; the rig relation builder consults this to decide whether a
/// parent link may target `BoneReady` instead of `BoneDone`.
///
#[derive(Debug, Default)]
pub struct RootChannelMap {
    map: FnvHashMap<String, FnvHashSet<String>>,
}

impl RootChannelMap {
    /// Record that `bone` belongs to the chain rooted at `root`.
    pub fn add_bone(&mut self, bone: &str, root: &str) {
        self.map
            .entry(bone.to_owned())
            .or_default()
            .insert(root.to_owned());
    }

    /// Check if there's a common chain root between two bones.
    pub fn has_common_root(&self, bone_a: &str, bone_b: &str) -> bool {
        let (Some(roots_a), Some(roots_b)) = (self.map.get(bone_a), self.map.get(bone_b)) else {
            return false;
        };
        roots_a.intersection(roots_b).next().is_some()
    }

    pub fn print_debug(&self) {
        for (bone, roots) in &self.map {
            log::debug!("bone {} roots: {:?}", bone, roots);
        }
    }
}

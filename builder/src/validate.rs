// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use graph::{debug, Depsgraph};
use scene::Main;

///
/// Detect "a tag was missed": build a scratch graph for the same scene and
/// compare against the given one. A mismatch means the graph should have
/// been tagged for a relations update and was not.
///
pub fn debug_relations_validate(depsgraph: &Depsgraph, main: &Main) -> bool {
    let (scene, view_layer, mode) = {
        let graph = depsgraph.lock();
        (graph.scene, graph.view_layer_name.clone(), graph.mode)
    };
    let scratch = Depsgraph::new(main, scene, &view_layer, mode);
    crate::graph_build_from_view_layer(&scratch, main);

    let valid = debug::debug_compare(&depsgraph.lock(), &scratch.lock());
    if !valid {
        log::error!("Depsgraph wasn't tagged for update when it should have been!");
        debug_assert!(valid, "This should not happen!");
    }
    valid
}

// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use bitflags::bitflags;

use crate::anim::AnimData;
use crate::id::{Id, IdHandle, IdType};

bitflags! {
    /// Per-base state within a view layer.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct BaseFlag: u32 {
        const ENABLED_VIEWPORT = 1 << 0;
        const ENABLED_RENDER = 1 << 1;
        const SELECTED = 1 << 2;
        /// Object comes from a background ("set") scene.
        const FROM_SET = 1 << 3;
    }
}

/// The per-view-layer binding of an object.
#[derive(Clone, Debug)]
pub struct Base {
    pub object: IdHandle,
    pub flags: BaseFlag,
}

impl Base {
    pub fn new(object: IdHandle) -> Base {
        Base {
            object,
            flags: BaseFlag::ENABLED_VIEWPORT | BaseFlag::ENABLED_RENDER,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Collection {
    pub id: Id,
    pub objects: Vec<IdHandle>,
    pub children: Vec<IdHandle>,
    pub hide_viewport: bool,
    pub hide_render: bool,
}

impl Collection {
    pub fn new(name: &str) -> Collection {
        Collection {
            id: Id::new(name, IdType::Collection),
            objects: Vec::new(),
            children: Vec::new(),
            hide_viewport: false,
            hide_render: false,
        }
    }
}

/// A view layer's binding of a collection, possibly excluded from evaluation.
#[derive(Clone, Debug)]
pub struct LayerCollection {
    pub collection: IdHandle,
    pub children: Vec<LayerCollection>,
    pub exclude: bool,
}

impl LayerCollection {
    pub fn new(collection: IdHandle) -> LayerCollection {
        LayerCollection {
            collection,
            children: Vec::new(),
            exclude: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ViewLayer {
    pub name: String,
    pub bases: Vec<Base>,
    pub layer_collections: Vec<LayerCollection>,
    pub material_override: Option<IdHandle>,
}

impl ViewLayer {
    pub fn new(name: &str) -> ViewLayer {
        ViewLayer {
            name: name.to_owned(),
            bases: Vec::new(),
            layer_collections: Vec::new(),
            material_override: None,
        }
    }

    pub fn base_for(&self, object: IdHandle) -> Option<&Base> {
        self.bases.iter().find(|base| base.object == object)
    }
}

#[derive(Clone, Debug)]
pub struct RigidBodyWorld {
    /// Collection of rigid bodies; `None` means no simulation members.
    pub collection: Option<IdHandle>,
    pub constraints: Option<IdHandle>,
}

#[derive(Clone, Debug)]
pub struct Scene {
    pub id: Id,
    pub view_layers: Vec<ViewLayer>,
    pub camera: Option<IdHandle>,
    pub world: Option<IdHandle>,
    /// Background ("set") scene evaluated alongside this one.
    pub set: Option<IdHandle>,
    pub rigidbody_world: Option<RigidBodyWorld>,
    /// Compositing node tree.
    pub compositor: Option<IdHandle>,
    pub has_sequencer: bool,
    pub frame: f32,
    /// Frame value after time remapping.
    pub ctime: f32,
    pub adt: Option<AnimData>,
}

impl Scene {
    pub fn new(name: &str) -> Scene {
        Scene {
            id: Id::new(name, IdType::Scene),
            view_layers: Vec::new(),
            camera: None,
            world: None,
            set: None,
            rigidbody_world: None,
            compositor: None,
            has_sequencer: false,
            frame: 1.0,
            ctime: 1.0,
            adt: None,
        }
    }

    pub fn view_layer(&self, name: &str) -> Option<&ViewLayer> {
        self.view_layers.iter().find(|layer| layer.name == name)
    }

    /// The view layer used when this scene is pulled in as a background set.
    pub fn default_render_view_layer(&self) -> Option<&ViewLayer> {
        self.view_layers.first()
    }
}

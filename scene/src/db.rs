// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use fnv::FnvHashMap;

use crate::data::{
    Action, Armature, CacheFile, Camera, Curve, Image, Key, Light, LightProbe, Mask, Material,
    Mesh, MovieClip, NodeTree, ParticleSettings, Simulation, Sound, Speaker, Texture, World,
};
use crate::id::{Id, IdHandle, SessionUuid};
use crate::layer::{Collection, Scene};
use crate::object::Object;

/// One datablock of any kind. The embedded [`Id`] header is reachable
/// uniformly through [`Datablock::id`].
#[derive(Clone, Debug)]
pub enum Datablock {
    Object(Object),
    Mesh(Mesh),
    Curve(Curve),
    Lattice(crate::data::Lattice),
    Armature(Armature),
    Key(Key),
    Material(Material),
    Texture(Texture),
    Image(Image),
    Light(Light),
    Camera(Camera),
    LightProbe(LightProbe),
    Speaker(Speaker),
    Sound(Sound),
    World(World),
    Scene(Scene),
    Collection(Collection),
    ParticleSettings(ParticleSettings),
    NodeTree(NodeTree),
    Mask(Mask),
    MovieClip(MovieClip),
    CacheFile(CacheFile),
    Action(Action),
    Simulation(Simulation),
}

macro_rules! per_datablock {
    ($self:ident, $block:ident => $body:expr) => {
        match $self {
            Datablock::Object($block) => $body,
            Datablock::Mesh($block) => $body,
            Datablock::Curve($block) => $body,
            Datablock::Lattice($block) => $body,
            Datablock::Armature($block) => $body,
            Datablock::Key($block) => $body,
            Datablock::Material($block) => $body,
            Datablock::Texture($block) => $body,
            Datablock::Image($block) => $body,
            Datablock::Light($block) => $body,
            Datablock::Camera($block) => $body,
            Datablock::LightProbe($block) => $body,
            Datablock::Speaker($block) => $body,
            Datablock::Sound($block) => $body,
            Datablock::World($block) => $body,
            Datablock::Scene($block) => $body,
            Datablock::Collection($block) => $body,
            Datablock::ParticleSettings($block) => $body,
            Datablock::NodeTree($block) => $body,
            Datablock::Mask($block) => $body,
            Datablock::MovieClip($block) => $body,
            Datablock::CacheFile($block) => $body,
            Datablock::Action($block) => $body,
            Datablock::Simulation($block) => $body,
        }
    };
}

impl Datablock {
    pub fn id(&self) -> &Id {
        per_datablock!(self, block => &block.id)
    }

    pub fn id_mut(&mut self) -> &mut Id {
        per_datablock!(self, block => &mut block.id)
    }
}

///
/// The datablock database. Storage is allocation-ordered; handles are
/// indices and are never reused, so a handle stays valid for the lifetime of
/// the database.
///
#[derive(Clone, Debug)]
pub struct Main {
    blocks: Vec<Datablock>,
    by_uuid: FnvHashMap<SessionUuid, IdHandle>,
    next_session_uuid: u64,
    /// Process-unique identity of this database; graphs use it to notice
    /// when they get re-bound to a different database (undo, render).
    main_id: u64,
}

impl Default for Main {
    fn default() -> Main {
        Main::new()
    }
}

macro_rules! typed_accessors {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty) => {
        pub fn $get(&self, handle: IdHandle) -> Option<&$ty> {
            match self.blocks.get(handle.index()) {
                Some(Datablock::$variant(block)) => Some(block),
                _ => None,
            }
        }

        pub fn $get_mut(&mut self, handle: IdHandle) -> Option<&mut $ty> {
            match self.blocks.get_mut(handle.index()) {
                Some(Datablock::$variant(block)) => Some(block),
                _ => None,
            }
        }
    };
}

impl Main {
    pub fn new() -> Main {
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT_MAIN_ID: AtomicU64 = AtomicU64::new(1);
        Main {
            blocks: Vec::new(),
            by_uuid: FnvHashMap::default(),
            next_session_uuid: 1,
            main_id: NEXT_MAIN_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn main_id(&self) -> u64 {
        self.main_id
    }

    ///
    /// Insert a datablock, assigning its handle and session UUID. The handle
    /// addresses the block for the lifetime of this database; the UUID is
    /// stable across database rebuilds that re-insert the "same" block.
    ///
    pub fn add(&mut self, mut block: Datablock) -> IdHandle {
        let handle = IdHandle(self.blocks.len() as u32);
        let uuid = SessionUuid(self.next_session_uuid);
        self.next_session_uuid += 1;
        {
            let id = block.id_mut();
            id.handle = handle;
            id.session_uuid = uuid;
        }
        self.by_uuid.insert(uuid, handle);
        self.blocks.push(block);
        handle
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, handle: IdHandle) -> Option<&Datablock> {
        self.blocks.get(handle.index())
    }

    pub fn block_mut(&mut self, handle: IdHandle) -> Option<&mut Datablock> {
        self.blocks.get_mut(handle.index())
    }

    pub fn id(&self, handle: IdHandle) -> Option<&Id> {
        self.block(handle).map(Datablock::id)
    }

    pub fn id_mut(&mut self, handle: IdHandle) -> Option<&mut Id> {
        self.block_mut(handle).map(Datablock::id_mut)
    }

    pub fn by_session_uuid(&self, uuid: SessionUuid) -> Option<IdHandle> {
        self.by_uuid.get(&uuid).copied()
    }

    /// Allocation-order iteration over all datablock headers.
    pub fn ids(&self) -> impl Iterator<Item = &Id> {
        self.blocks.iter().map(Datablock::id)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Datablock> {
        self.blocks.iter()
    }

    pub fn masks(&self) -> impl Iterator<Item = &Mask> {
        self.blocks.iter().filter_map(|block| match block {
            Datablock::Mask(mask) => Some(mask),
            _ => None,
        })
    }

    pub fn movieclips(&self) -> impl Iterator<Item = &MovieClip> {
        self.blocks.iter().filter_map(|block| match block {
            Datablock::MovieClip(clip) => Some(clip),
            _ => None,
        })
    }

    pub fn cachefiles(&self) -> impl Iterator<Item = &CacheFile> {
        self.blocks.iter().filter_map(|block| match block {
            Datablock::CacheFile(cachefile) => Some(cachefile),
            _ => None,
        })
    }

    typed_accessors!(object, object_mut, Object, Object);
    typed_accessors!(mesh, mesh_mut, Mesh, Mesh);
    typed_accessors!(curve, curve_mut, Curve, Curve);
    typed_accessors!(lattice, lattice_mut, Lattice, crate::data::Lattice);
    typed_accessors!(armature, armature_mut, Armature, Armature);
    typed_accessors!(shape_key, shape_key_mut, Key, Key);
    typed_accessors!(material, material_mut, Material, Material);
    typed_accessors!(texture, texture_mut, Texture, Texture);
    typed_accessors!(image, image_mut, Image, Image);
    typed_accessors!(light, light_mut, Light, Light);
    typed_accessors!(camera, camera_mut, Camera, Camera);
    typed_accessors!(light_probe, light_probe_mut, LightProbe, LightProbe);
    typed_accessors!(speaker, speaker_mut, Speaker, Speaker);
    typed_accessors!(sound, sound_mut, Sound, Sound);
    typed_accessors!(world, world_mut, World, World);
    typed_accessors!(scene, scene_mut, Scene, Scene);
    typed_accessors!(collection, collection_mut, Collection, Collection);
    typed_accessors!(
        particle_settings,
        particle_settings_mut,
        ParticleSettings,
        ParticleSettings
    );
    typed_accessors!(node_tree, node_tree_mut, NodeTree, NodeTree);
    typed_accessors!(simulation, simulation_mut, Simulation, Simulation);
}

// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

use std::fmt;

use bitflags::bitflags;

///
/// A stable handle addressing one datablock inside a [`crate::Main`] database.
///
/// Handles are never reused within one database, so they serve as identity
/// for hash lookups that stays valid for the lifetime of the database.
///
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IdHandle(pub(crate) u32);

impl IdHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for IdHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

///
/// Session-wide unique identity of a datablock. Unlike an [`IdHandle`], the
/// UUID survives a rebuild of the database from file, so it is the key used
/// to transfer graph state across relation rebuilds.
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SessionUuid(pub u64);

/// The closed set of datablock kinds that can participate in the graph.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum IdType {
    Object,
    Mesh,
    Curve,
    Lattice,
    Armature,
    Key,
    Material,
    Texture,
    Image,
    Light,
    Camera,
    LightProbe,
    Speaker,
    Sound,
    World,
    Scene,
    Collection,
    ParticleSettings,
    NodeTree,
    Mask,
    MovieClip,
    CacheFile,
    Action,
    Simulation,
}

/// Total number of ID types; sizes the per-type bit arrays on the graph.
pub const ID_TYPE_COUNT: usize = 24;

impl IdType {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IdType::Object => "Object",
            IdType::Mesh => "Mesh",
            IdType::Curve => "Curve",
            IdType::Lattice => "Lattice",
            IdType::Armature => "Armature",
            IdType::Key => "Key",
            IdType::Material => "Material",
            IdType::Texture => "Texture",
            IdType::Image => "Image",
            IdType::Light => "Light",
            IdType::Camera => "Camera",
            IdType::LightProbe => "LightProbe",
            IdType::Speaker => "Speaker",
            IdType::Sound => "Sound",
            IdType::World => "World",
            IdType::Scene => "Scene",
            IdType::Collection => "Collection",
            IdType::ParticleSettings => "ParticleSettings",
            IdType::NodeTree => "NodeTree",
            IdType::Mask => "Mask",
            IdType::MovieClip => "MovieClip",
            IdType::CacheFile => "CacheFile",
            IdType::Action => "Action",
            IdType::Simulation => "Simulation",
        }
    }
}

bitflags! {
    ///
    /// Per-ID recalc bits stamped onto evaluated datablocks by the update
    /// flush. Each graph component type contributes one bit through the
    /// node-type registry.
    ///
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct IdRecalcFlag: u32 {
        const TRANSFORM = 1 << 0;
        const GEOMETRY = 1 << 1;
        const ANIMATION = 1 << 2;
        const SHADING = 1 << 3;
        const COPY_ON_WRITE = 1 << 4;
        const PARAMETERS = 1 << 5;
        const TIME = 1 << 6;
        const POINT_CACHE = 1 << 7;
        const SELECT = 1 << 8;
        const BASE_FLAGS = 1 << 9;
        const SEQUENCER_STRIPS = 1 << 10;
        const AUDIO = 1 << 11;
        const PSYS = 1 << 12;
        const SOURCE = 1 << 13;
        const SYNCHRONIZE = 1 << 14;
    }
}

bitflags! {
    /// Library-management tag bits on an original datablock.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct LibraryTag: u32 {
        /// The datablock is a library override and has pending auto-refresh.
        const OVERRIDE_AUTOREFRESH = 1 << 0;
        /// The datablock is embedded into another one (node trees, master
        /// collections).
        const EMBEDDED = 1 << 1;
    }
}

///
/// Engine data attached to a datablock by a draw engine. The flush ORs
/// recalc bits into each entry so engines know what to refresh.
///
#[derive(Clone, Debug, Default)]
pub struct DrawData {
    pub recalc: IdRecalcFlag,
}

///
/// The common header embedded in every datablock.
///
#[derive(Clone, Debug)]
pub struct Id {
    pub name: String,
    pub id_type: IdType,
    pub handle: IdHandle,
    pub session_uuid: SessionUuid,
    /// Recalc bits mirrored back to the original by the host; the graph
    /// accumulates its own bits on the evaluated shadow.
    pub recalc: IdRecalcFlag,
    pub tag: LibraryTag,
    /// True for datablocks which are real library overrides.
    pub is_library_override: bool,
    pub draw_data: Vec<DrawData>,
}

impl Id {
    pub(crate) fn new(name: &str, id_type: IdType) -> Id {
        Id {
            name: name.to_owned(),
            id_type,
            // Patched by Main on insertion.
            handle: IdHandle(u32::MAX),
            session_uuid: SessionUuid(0),
            recalc: IdRecalcFlag::empty(),
            tag: LibraryTag::empty(),
            is_library_override: false,
            draw_data: Vec::new(),
        }
    }
}

// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Non-object datablocks: object data, shading, animation and the various
//! auxiliary kinds the builder knows how to pull into the graph.

use crate::anim::AnimData;
use crate::id::{Id, IdHandle, IdType};

#[derive(Clone, Debug)]
pub struct Mesh {
    pub id: Id,
    /// Shape-key datablock attached to this mesh.
    pub key: Option<IdHandle>,
    pub adt: Option<AnimData>,
}

impl Mesh {
    pub fn new(name: &str) -> Mesh {
        Mesh {
            id: Id::new(name, IdType::Mesh),
            key: None,
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Curve {
    pub id: Id,
    pub key: Option<IdHandle>,
    /// Bevel/taper objects contribute geometry dependencies.
    pub bevel_object: Option<IdHandle>,
    pub taper_object: Option<IdHandle>,
    pub adt: Option<AnimData>,
}

impl Curve {
    pub fn new(name: &str) -> Curve {
        Curve {
            id: Id::new(name, IdType::Curve),
            key: None,
            bevel_object: None,
            taper_object: None,
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Lattice {
    pub id: Id,
    pub key: Option<IdHandle>,
    pub adt: Option<AnimData>,
}

impl Lattice {
    pub fn new(name: &str) -> Lattice {
        Lattice {
            id: Id::new(name, IdType::Lattice),
            key: None,
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub parent: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Armature {
    pub id: Id,
    pub bones: Vec<Bone>,
    pub adt: Option<AnimData>,
}

impl Armature {
    pub fn new(name: &str) -> Armature {
        Armature {
            id: Id::new(name, IdType::Armature),
            bones: Vec::new(),
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct KeyBlock {
    pub name: String,
}

/// Shape-key datablock; `from` points back at the geometry that owns it.
#[derive(Clone, Debug)]
pub struct Key {
    pub id: Id,
    pub from: IdHandle,
    pub blocks: Vec<KeyBlock>,
    pub adt: Option<AnimData>,
}

impl Key {
    pub fn new(name: &str, from: IdHandle) -> Key {
        Key {
            id: Id::new(name, IdType::Key),
            from,
            blocks: Vec::new(),
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Material {
    pub id: Id,
    pub ntree: Option<IdHandle>,
    pub adt: Option<AnimData>,
}

impl Material {
    pub fn new(name: &str) -> Material {
        Material {
            id: Id::new(name, IdType::Material),
            ntree: None,
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct World {
    pub id: Id,
    pub ntree: Option<IdHandle>,
    pub adt: Option<AnimData>,
}

impl World {
    pub fn new(name: &str) -> World {
        World {
            id: Id::new(name, IdType::World),
            ntree: None,
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeTree {
    pub id: Id,
    /// Textures/images referenced with animated image users.
    pub animated_images: Vec<IdHandle>,
    /// Node groups used by this tree.
    pub groups: Vec<IdHandle>,
    pub adt: Option<AnimData>,
}

impl NodeTree {
    pub fn new(name: &str) -> NodeTree {
        NodeTree {
            id: Id::new(name, IdType::NodeTree),
            animated_images: Vec::new(),
            groups: Vec::new(),
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Texture {
    pub id: Id,
    pub image: Option<IdHandle>,
    pub adt: Option<AnimData>,
}

impl Texture {
    pub fn new(name: &str) -> Texture {
        Texture {
            id: Id::new(name, IdType::Texture),
            image: None,
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Image {
    pub id: Id,
}

impl Image {
    pub fn new(name: &str) -> Image {
        Image {
            id: Id::new(name, IdType::Image),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Light {
    pub id: Id,
    pub ntree: Option<IdHandle>,
    pub adt: Option<AnimData>,
}

impl Light {
    pub fn new(name: &str) -> Light {
        Light {
            id: Id::new(name, IdType::Light),
            ntree: None,
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Camera {
    pub id: Id,
    /// Depth-of-field focus object.
    pub dof_object: Option<IdHandle>,
    pub adt: Option<AnimData>,
}

impl Camera {
    pub fn new(name: &str) -> Camera {
        Camera {
            id: Id::new(name, IdType::Camera),
            dof_object: None,
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LightProbe {
    pub id: Id,
    pub adt: Option<AnimData>,
}

impl LightProbe {
    pub fn new(name: &str) -> LightProbe {
        LightProbe {
            id: Id::new(name, IdType::LightProbe),
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Speaker {
    pub id: Id,
    pub sound: Option<IdHandle>,
    pub adt: Option<AnimData>,
}

impl Speaker {
    pub fn new(name: &str) -> Speaker {
        Speaker {
            id: Id::new(name, IdType::Speaker),
            sound: None,
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Sound {
    pub id: Id,
}

impl Sound {
    pub fn new(name: &str) -> Sound {
        Sound {
            id: Id::new(name, IdType::Sound),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Action {
    pub id: Id,
}

impl Action {
    pub fn new(name: &str) -> Action {
        Action {
            id: Id::new(name, IdType::Action),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ParticleSettings {
    pub id: Id,
    pub effector_weights: Option<crate::object::EffectorWeights>,
    /// Per-particle force field, making the particles themselves effectors.
    pub field: Option<crate::object::ForceField>,
    pub adt: Option<AnimData>,
}

impl ParticleSettings {
    pub fn new(name: &str) -> ParticleSettings {
        ParticleSettings {
            id: Id::new(name, IdType::ParticleSettings),
            effector_weights: None,
            field: None,
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Mask {
    pub id: Id,
    pub adt: Option<AnimData>,
}

impl Mask {
    pub fn new(name: &str) -> Mask {
        Mask {
            id: Id::new(name, IdType::Mask),
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MovieClip {
    pub id: Id,
    pub adt: Option<AnimData>,
}

impl MovieClip {
    pub fn new(name: &str) -> MovieClip {
        MovieClip {
            id: Id::new(name, IdType::MovieClip),
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CacheFile {
    pub id: Id,
    pub adt: Option<AnimData>,
}

impl CacheFile {
    pub fn new(name: &str) -> CacheFile {
        CacheFile {
            id: Id::new(name, IdType::CacheFile),
            adt: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Simulation {
    pub id: Id,
    pub adt: Option<AnimData>,
}

impl Simulation {
    pub fn new(name: &str) -> Simulation {
        Simulation {
            id: Id::new(name, IdType::Simulation),
            adt: None,
        }
    }
}

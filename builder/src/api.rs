// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Resolution of property references to graph nodes: given "this datum,
//! this property, read-or-write", decide which operation or component a
//! relation should attach to.

use graph::{NodeType, OpCode};
use scene::{IdHandle, IdType, Main, ModifierKind, PropertyRef, PropertyTarget};

use crate::cache::BuilderCache;
use crate::keys::{ComponentKey, Key, OpKey};

/// Whether the property is read ("entry") or written ("exit") by the
/// relation being built.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PointerSource {
    Entry,
    Exit,
}

fn pchan_has_bbone_segments(main: &Main, object: IdHandle, bone: &str) -> bool {
    main.object(object)
        .and_then(|ob| ob.pose.as_ref())
        .and_then(|pose| pose.channel(bone))
        .is_some_and(|pchan| pchan.has_bbone_segments())
}

///
/// Custom properties are placed in their owner's parameters, except on the
/// geometry-nodes modifier where they affect the modifier (and therefore the
/// geometry) directly.
///
fn affects_parameters_node(main: &Main, prop: &PropertyRef) -> bool {
    if !prop.is_idprop {
        return false;
    }
    match &prop.target {
        PropertyTarget::Modifier { object, modifier } => {
            let is_nodes_modifier = main
                .object(*object)
                .and_then(|ob| ob.modifiers.iter().find(|md| &md.name == modifier))
                .is_some_and(|md| matches!(md.kind, ModifierKind::Nodes { .. }));
            !is_nodes_modifier
        }
        _ => true,
    }
}

const TRANSFORM_PROPERTIES: &[&str] = &[
    "location",
    "matrix_basis",
    "matrix_channel",
    "matrix_inverse",
    "matrix_local",
    "matrix_parent_inverse",
    "matrix_world",
    "rotation_axis_angle",
    "rotation_euler",
    "rotation_mode",
    "rotation_quaternion",
    "scale",
    "delta_location",
    "delta_rotation_euler",
    "delta_rotation_quaternion",
    "delta_scale",
];

fn resolve_object_property(object: IdHandle, prop: &str) -> Option<Key> {
    if TRANSFORM_PROPERTIES.contains(&prop) {
        return Some(ComponentKey::new(object, NodeType::Transform).into());
    }
    if prop == "data" {
        // Accessing object.data, most likely a geometry.
        return Some(ComponentKey::new(object, NodeType::Geometry).into());
    }
    if prop == "hide_viewport" || prop == "hide_render" {
        return Some(ComponentKey::new(object, NodeType::ObjectFromLayer).into());
    }
    if prop == "dimensions" {
        return Some(OpKey::new(object, NodeType::Parameters, OpCode::Dimensions).into());
    }
    None
}

///
/// The node a property reference should be wired to, or `None` when the
/// reference cannot be resolved (the caller logs and drops the relation).
///
pub fn resolve_property(
    main: &Main,
    cache: &mut BuilderCache,
    prop: &PropertyRef,
    source: PointerSource,
) -> Option<Key> {
    // Custom properties go to the parameters node of their owner; for pose
    // bones their own component, to improve granularity.
    if affects_parameters_node(main, prop) {
        let name = prop.prop.as_deref().unwrap_or("");
        return Some(match &prop.target {
            PropertyTarget::PoseBone { object, bone } => Key::Op(OpKey {
                id: *object,
                component: NodeType::Bone,
                component_name: bone.clone(),
                opcode: OpCode::IdProperty,
                name: name.to_owned(),
                name_tag: -1,
            }),
            other => Key::Op(OpKey {
                id: other.owner(),
                component: NodeType::Parameters,
                component_name: String::new(),
                opcode: OpCode::IdProperty,
                name: name.to_owned(),
                name_tag: -1,
            }),
        });
    }

    match &prop.target {
        PropertyTarget::PoseBone { object, bone } => {
            // Generally we just want the bone component, but some property
            // names need a more precise operation.
            match prop.prop.as_deref() {
                Some(name) if name.starts_with("bbone_") => {
                    let opcode = if pchan_has_bbone_segments(main, *object, bone) {
                        OpCode::BoneSegments
                    } else {
                        OpCode::BoneDone
                    };
                    Some(OpKey::sub(*object, NodeType::Bone, bone, opcode).into())
                }
                Some(name)
                    if matches!(name, "head" | "tail" | "length") || name.starts_with("matrix") =>
                {
                    if source == PointerSource::Exit {
                        Some(OpKey::sub(*object, NodeType::Bone, bone, OpCode::BoneDone).into())
                    } else {
                        Some(ComponentKey::sub(*object, NodeType::Bone, bone).into())
                    }
                }
                Some(_) => Some(OpKey::sub(*object, NodeType::Bone, bone, OpCode::BoneLocal).into()),
                None => Some(ComponentKey::sub(*object, NodeType::Bone, bone).into()),
            }
        }
        PropertyTarget::ArmatureBone { owner, .. } => {
            // Armature-level bones map to armature evaluation. A lookup
            // arriving via an object redirects to its data.
            let mut id = *owner;
            if main.id(id).map(|id| id.id_type) == Some(IdType::Object) {
                id = main.object(id).and_then(|ob| ob.data)?;
            }
            Some(OpKey::new(id, NodeType::Armature, OpCode::ArmatureEval).into())
        }
        PropertyTarget::Constraint { owner, constraint } => {
            // Object constraint or bone constraint decides the component.
            match cache.pchan_for_constraint(main, *owner, constraint) {
                Some(pchan) => {
                    Some(OpKey::sub(*owner, NodeType::Bone, &pchan, OpCode::BoneLocal).into())
                }
                None => {
                    Some(OpKey::new(*owner, NodeType::Transform, OpCode::TransformLocal).into())
                }
            }
        }
        PropertyTarget::ConstraintTarget {
            owner, constraint, ..
        } => {
            // Walk from the target back to its constraint, then resolve as a
            // constraint reference.
            match cache.pchan_for_constraint(main, *owner, constraint) {
                Some(pchan) => {
                    Some(OpKey::sub(*owner, NodeType::Bone, &pchan, OpCode::BoneLocal).into())
                }
                None => {
                    Some(OpKey::new(*owner, NodeType::Transform, OpCode::TransformLocal).into())
                }
            }
        }
        PropertyTarget::Modifier { object, .. } => {
            match prop.prop.as_deref() {
                Some("show_viewport") | Some("show_render") => {
                    Some(OpKey::new(*object, NodeType::Geometry, OpCode::Visibility).into())
                }
                _ => match source {
                    // Reading a modifier is reading its influence on the
                    // geometry; writing one is a parameter change.
                    PointerSource::Entry => {
                        Some(ComponentKey::new(*object, NodeType::Geometry).into())
                    }
                    PointerSource::Exit => {
                        Some(OpKey::new(*object, NodeType::Parameters, OpCode::ParametersEval).into())
                    }
                },
            }
        }
        PropertyTarget::ShapeKeyBlock { key, block } => {
            Some(OpKey::named(*key, NodeType::Parameters, OpCode::ParametersEval, block).into())
        }
        PropertyTarget::GeometryElement { id } => {
            Some(ComponentKey::new(*id, NodeType::Geometry).into())
        }
        PropertyTarget::NodeSocket { ntree } => {
            Some(ComponentKey::new(*ntree, NodeType::NTreeOutput).into())
        }
        PropertyTarget::ShaderNode { ntree } => {
            Some(ComponentKey::new(*ntree, NodeType::Shading).into())
        }
        PropertyTarget::ImageUser { owner } => {
            if main.id(*owner).map(|id| id.id_type) == Some(IdType::NodeTree) {
                Some(
                    OpKey::new(*owner, NodeType::ImageAnimation, OpCode::ImageAnimation).into(),
                )
            } else {
                fallback_parameters(prop)
            }
        }
        PropertyTarget::Sequence { scene } => {
            Some(ComponentKey::new(*scene, NodeType::Sequencer).into())
        }
        PropertyTarget::Id(id) => {
            let id_type = main.id(*id).map(|id| id.id_type);
            if let (Some(IdType::Object), Some(name)) = (id_type, prop.prop.as_deref()) {
                if let Some(key) = resolve_object_property(*id, name) {
                    return Some(key);
                }
            }
            if matches!(id_type, Some(IdType::Key)) {
                return Some(ComponentKey::new(*id, NodeType::Geometry).into());
            }
            if matches!(id_type, Some(IdType::Curve)) {
                return Some(ComponentKey::new(*id, NodeType::Geometry).into());
            }
            fallback_parameters(prop)
        }
    }
}

/// All unknown data effectively falls under "parameter evaluation".
fn fallback_parameters(prop: &PropertyRef) -> Option<Key> {
    if prop.prop.is_some() {
        Some(OpKey::new(prop.target.owner(), NodeType::Parameters, OpCode::ParametersEval).into())
    } else {
        None
    }
}

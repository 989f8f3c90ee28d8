// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

pub mod component;
pub mod id_node;
pub mod operation;

use petgraph::stable_graph;

pub use crate::node::component::{ComponentId, ComponentIdKey, ComponentNode, OpIdKey};
pub use crate::node::id_node::{IdNode, IdNodeId, LinkedState};
pub use crate::node::operation::{OpFlag, OperationNode, TimeSourceNode};

/// Handle of a link-level node (time source or operation) in the graph.
// 2^32 nodes ought to be more than enough for anyone!
pub type NodeId = stable_graph::NodeIndex<u32>;

/// Broad grouping of node types used where behavior splits three ways.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeClass {
    Generic,
    Component,
    Operation,
}

impl NodeClass {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeClass::Generic => "GENERIC",
            NodeClass::Component => "COMPONENT",
            NodeClass::Operation => "OPERATION",
        }
    }
}

///
/// The closed set of node types. Generic types come first, outer (component)
/// types after; `NodeType::class` relies on that split.
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NodeType {
    Undefined,
    Operation,
    // Generic types.
    TimeSource,
    IdRef,
    // Outer types.
    Parameters,
    Animation,
    Transform,
    Geometry,
    Sequencer,
    LayerCollections,
    CopyOnWrite,
    ObjectFromLayer,
    // Outer types with subdata.
    EvalPose,
    Bone,
    ParticleSystem,
    ParticleSettings,
    Shading,
    ShadingParameters,
    Cache,
    PointCache,
    ImageAnimation,
    BatchCache,
    Dupli,
    Synchronization,
    Audio,
    Armature,
    GenericDatablock,
    Visibility,
    Simulation,
    NTreeOutput,
}

/// Total number of node types; component masks use one bit per type.
pub const NODE_TYPE_COUNT: usize = 30;

impl NodeType {
    pub fn class(self) -> NodeClass {
        match self {
            NodeType::Operation => NodeClass::Operation,
            NodeType::Undefined | NodeType::TimeSource | NodeType::IdRef => NodeClass::Generic,
            _ => NodeClass::Component,
        }
    }

    /// Bit of this component type within an ID's components mask.
    pub fn component_mask_bit(self) -> u64 {
        debug_assert!((self as usize) < 64);
        1u64 << (self as u64)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Undefined => "UNDEFINED",
            NodeType::Operation => "OPERATION",
            NodeType::TimeSource => "TIMESOURCE",
            NodeType::IdRef => "ID_REF",
            NodeType::Parameters => "PARAMETERS",
            NodeType::Animation => "ANIMATION",
            NodeType::Transform => "TRANSFORM",
            NodeType::Geometry => "GEOMETRY",
            NodeType::Sequencer => "SEQUENCER",
            NodeType::LayerCollections => "LAYER_COLLECTIONS",
            NodeType::CopyOnWrite => "COPY_ON_WRITE",
            NodeType::ObjectFromLayer => "OBJECT_FROM_LAYER",
            NodeType::EvalPose => "EVAL_POSE",
            NodeType::Bone => "BONE",
            NodeType::ParticleSystem => "PARTICLE_SYSTEM",
            NodeType::ParticleSettings => "PARTICLE_SETTINGS",
            NodeType::Shading => "SHADING",
            NodeType::ShadingParameters => "SHADING_PARAMETERS",
            NodeType::Cache => "CACHE",
            NodeType::PointCache => "POINT_CACHE",
            NodeType::ImageAnimation => "IMAGE_ANIMATION",
            NodeType::BatchCache => "BATCH_CACHE",
            NodeType::Dupli => "DUPLI",
            NodeType::Synchronization => "SYNCHRONIZATION",
            NodeType::Audio => "AUDIO",
            NodeType::Armature => "ARMATURE",
            NodeType::GenericDatablock => "GENERIC_DATABLOCK",
            NodeType::Visibility => "VISIBILITY",
            NodeType::Simulation => "SIMULATION",
            NodeType::NTreeOutput => "NTREE_OUTPUT",
        }
    }
}

///
/// Component addressing used by the public traversal API. The `Visibility`
/// component is deliberately absent: it is internal to the graph.
///
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ObjectComponent {
    Any,
    Parameters,
    Animation,
    Transform,
    Geometry,
    EvalPose,
    Bone,
    Shading,
    Cache,
}

impl ObjectComponent {
    pub fn to_node_type(self) -> NodeType {
        match self {
            ObjectComponent::Any => NodeType::Undefined,
            ObjectComponent::Parameters => NodeType::Parameters,
            ObjectComponent::Animation => NodeType::Animation,
            ObjectComponent::Transform => NodeType::Transform,
            ObjectComponent::Geometry => NodeType::Geometry,
            ObjectComponent::EvalPose => NodeType::EvalPose,
            ObjectComponent::Bone => NodeType::Bone,
            ObjectComponent::Shading => NodeType::Shading,
            ObjectComponent::Cache => NodeType::Cache,
        }
    }

    pub fn from_node_type(node_type: NodeType) -> ObjectComponent {
        debug_assert!(
            node_type != NodeType::Visibility,
            "Visibility component is supposed to be only used internally."
        );
        match node_type {
            NodeType::Animation => ObjectComponent::Animation,
            NodeType::Transform => ObjectComponent::Transform,
            NodeType::Geometry => ObjectComponent::Geometry,
            NodeType::EvalPose => ObjectComponent::EvalPose,
            NodeType::Bone => ObjectComponent::Bone,
            NodeType::Shading => ObjectComponent::Shading,
            NodeType::Cache => ObjectComponent::Cache,
            _ => ObjectComponent::Parameters,
        }
    }
}

///
/// Codes for the operations the evaluator can schedule. One entry per
/// distinct kind of evaluation step.
///
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OpCode {
    // Generic.
    Operation,
    IdProperty,
    ParametersEntry,
    ParametersEval,
    ParametersExit,
    // Animation, drivers.
    AnimationEntry,
    AnimationEval,
    AnimationExit,
    Driver,
    // Scene.
    SceneEval,
    AudioEntry,
    AudioVolume,
    // Object.
    ObjectFromLayerEntry,
    ObjectBaseFlags,
    ObjectFromLayerExit,
    Dimensions,
    // Transform.
    TransformInit,
    TransformLocal,
    TransformParent,
    TransformConstraints,
    TransformEval,
    TransformFinal,
    TransformSimulationInit,
    // Rigid body.
    RigidbodyRebuild,
    RigidbodySim,
    RigidbodyTransformCopy,
    // Geometry.
    GeometryEvalInit,
    GeometryEval,
    GeometryEvalDone,
    GeometryShapekey,
    Visibility,
    // Object data.
    LightProbeEval,
    SpeakerEval,
    SoundEval,
    ArmatureEval,
    // Pose.
    PoseInit,
    PoseInitIk,
    PoseCleanup,
    PoseDone,
    PoseIkSolver,
    PoseSplineIkSolver,
    // Bone.
    BoneLocal,
    BonePoseParent,
    BoneConstraints,
    BoneReady,
    BoneDone,
    BoneSegments,
    // Particles.
    ParticleSystemInit,
    ParticleSystemEval,
    ParticleSystemDone,
    ParticleSettingsInit,
    ParticleSettingsEval,
    ParticleSettingsReset,
    // Caches.
    PointCacheReset,
    FileCacheUpdate,
    GeometrySelectUpdate,
    // Masks.
    MaskAnimation,
    MaskEval,
    // Collections.
    ViewLayerEval,
    // Copy on write.
    CopyOnWrite,
    // Shading.
    Shading,
    MaterialUpdate,
    LightUpdate,
    WorldUpdate,
    // Node trees.
    NTreeOutput,
    // Movie clips.
    MovieClipEval,
    MovieClipSelectUpdate,
    // Images.
    ImageAnimation,
    // Synchronization.
    SynchronizeToOriginal,
    // Generic datablocks.
    GenericDatablockUpdate,
    // Sequencer.
    SequencesEval,
    // Instancing.
    Dupli,
    SimulationEval,
}

impl OpCode {
    pub fn as_str(self) -> &'static str {
        match self {
            OpCode::Operation => "OPERATION",
            OpCode::IdProperty => "ID_PROPERTY",
            OpCode::ParametersEntry => "PARAMETERS_ENTRY",
            OpCode::ParametersEval => "PARAMETERS_EVAL",
            OpCode::ParametersExit => "PARAMETERS_EXIT",
            OpCode::AnimationEntry => "ANIMATION_ENTRY",
            OpCode::AnimationEval => "ANIMATION_EVAL",
            OpCode::AnimationExit => "ANIMATION_EXIT",
            OpCode::Driver => "DRIVER",
            OpCode::SceneEval => "SCENE_EVAL",
            OpCode::AudioEntry => "AUDIO_ENTRY",
            OpCode::AudioVolume => "AUDIO_VOLUME",
            OpCode::ObjectFromLayerEntry => "OBJECT_FROM_LAYER_ENTRY",
            OpCode::ObjectBaseFlags => "OBJECT_BASE_FLAGS",
            OpCode::ObjectFromLayerExit => "OBJECT_FROM_LAYER_EXIT",
            OpCode::Dimensions => "DIMENSIONS",
            OpCode::TransformInit => "TRANSFORM_INIT",
            OpCode::TransformLocal => "TRANSFORM_LOCAL",
            OpCode::TransformParent => "TRANSFORM_PARENT",
            OpCode::TransformConstraints => "TRANSFORM_CONSTRAINTS",
            OpCode::TransformEval => "TRANSFORM_EVAL",
            OpCode::TransformFinal => "TRANSFORM_FINAL",
            OpCode::TransformSimulationInit => "TRANSFORM_SIMULATION_INIT",
            OpCode::RigidbodyRebuild => "RIGIDBODY_REBUILD",
            OpCode::RigidbodySim => "RIGIDBODY_SIM",
            OpCode::RigidbodyTransformCopy => "RIGIDBODY_TRANSFORM_COPY",
            OpCode::GeometryEvalInit => "GEOMETRY_EVAL_INIT",
            OpCode::GeometryEval => "GEOMETRY_EVAL",
            OpCode::GeometryEvalDone => "GEOMETRY_EVAL_DONE",
            OpCode::GeometryShapekey => "GEOMETRY_SHAPEKEY",
            OpCode::Visibility => "VISIBILITY",
            OpCode::LightProbeEval => "LIGHT_PROBE_EVAL",
            OpCode::SpeakerEval => "SPEAKER_EVAL",
            OpCode::SoundEval => "SOUND_EVAL",
            OpCode::ArmatureEval => "ARMATURE_EVAL",
            OpCode::PoseInit => "POSE_INIT",
            OpCode::PoseInitIk => "POSE_INIT_IK",
            OpCode::PoseCleanup => "POSE_CLEANUP",
            OpCode::PoseDone => "POSE_DONE",
            OpCode::PoseIkSolver => "POSE_IK_SOLVER",
            OpCode::PoseSplineIkSolver => "POSE_SPLINE_IK_SOLVER",
            OpCode::BoneLocal => "BONE_LOCAL",
            OpCode::BonePoseParent => "BONE_POSE_PARENT",
            OpCode::BoneConstraints => "BONE_CONSTRAINTS",
            OpCode::BoneReady => "BONE_READY",
            OpCode::BoneDone => "BONE_DONE",
            OpCode::BoneSegments => "BONE_SEGMENTS",
            OpCode::ParticleSystemInit => "PARTICLE_SYSTEM_INIT",
            OpCode::ParticleSystemEval => "PARTICLE_SYSTEM_EVAL",
            OpCode::ParticleSystemDone => "PARTICLE_SYSTEM_DONE",
            OpCode::ParticleSettingsInit => "PARTICLE_SETTINGS_INIT",
            OpCode::ParticleSettingsEval => "PARTICLE_SETTINGS_EVAL",
            OpCode::ParticleSettingsReset => "PARTICLE_SETTINGS_RESET",
            OpCode::PointCacheReset => "POINT_CACHE_RESET",
            OpCode::FileCacheUpdate => "FILE_CACHE_UPDATE",
            OpCode::GeometrySelectUpdate => "GEOMETRY_SELECT_UPDATE",
            OpCode::MaskAnimation => "MASK_ANIMATION",
            OpCode::MaskEval => "MASK_EVAL",
            OpCode::ViewLayerEval => "VIEW_LAYER_EVAL",
            OpCode::CopyOnWrite => "COPY_ON_WRITE",
            OpCode::Shading => "SHADING",
            OpCode::MaterialUpdate => "MATERIAL_UPDATE",
            OpCode::LightUpdate => "LIGHT_UPDATE",
            OpCode::WorldUpdate => "WORLD_UPDATE",
            OpCode::NTreeOutput => "NTREE_OUTPUT",
            OpCode::MovieClipEval => "MOVIECLIP_EVAL",
            OpCode::MovieClipSelectUpdate => "MOVIECLIP_SELECT_UPDATE",
            OpCode::ImageAnimation => "IMAGE_ANIMATION",
            OpCode::SynchronizeToOriginal => "SYNCHRONIZE_TO_ORIGINAL",
            OpCode::GenericDatablockUpdate => "GENERIC_DATABLOCK_UPDATE",
            OpCode::SequencesEval => "SEQUENCES_EVAL",
            OpCode::Dupli => "DUPLI",
            OpCode::SimulationEval => "SIMULATION_EVAL",
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A link-level node: the weight type of the petgraph arena.
#[derive(Debug)]
pub enum LinkNode {
    TimeSource(TimeSourceNode),
    Operation(OperationNode),
}

impl LinkNode {
    pub fn node_type(&self) -> NodeType {
        match self {
            LinkNode::TimeSource(_) => NodeType::TimeSource,
            LinkNode::Operation(_) => NodeType::Operation,
        }
    }

    pub fn class(&self) -> NodeClass {
        self.node_type().class()
    }

    pub fn as_operation(&self) -> Option<&OperationNode> {
        match self {
            LinkNode::Operation(op_node) => Some(op_node),
            LinkNode::TimeSource(_) => None,
        }
    }

    pub fn as_operation_mut(&mut self) -> Option<&mut OperationNode> {
        match self {
            LinkNode::Operation(op_node) => Some(op_node),
            LinkNode::TimeSource(_) => None,
        }
    }
}

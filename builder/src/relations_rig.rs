// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Relation construction for rigs: pose operations, per-bone chains, IK and
//! spline-IK solvers.

use graph::node::id_node::{CustomDataMasks, CUSTOMDATA_MASK_DEFORMVERT, EVAL_FLAG_NEED_CURVE_PATH};
use graph::{NodeType, OpCode, RelationFlag};
use scene::{
    Constraint, ConstraintKind, IdHandle, IkConstraint, IkSolverKind, Object, ObjectType, Pose,
    PoseChannel, PropertyTarget, SplineIkConstraint,
};

use crate::keys::{ComponentKey, OpKey};
use crate::nodes_rig::{ik_solver_find_root, spline_ik_find_root};
use crate::pchanmap::RootChannelMap;
use crate::relations::RelationBuilder;

impl RelationBuilder<'_> {
    /// IK solver eval steps.
    fn build_ik_pose(
        &mut self,
        object: IdHandle,
        pose: &Pose,
        pchan: &PoseChannel,
        constraint: &Constraint,
        ik: &IkConstraint,
        root_map: &mut RootChannelMap,
    ) {
        if constraint.is_disabled {
            // Do not add disabled IK constraints to the relations. If these
            // need to be temporarily enabled, they are added as temporary
            // constraints during transform.
            return;
        }
        let Some(rootchan) = ik_solver_find_root(pose, pchan, ik) else {
            return;
        };
        let root_name = rootchan.name.clone();

        let pchan_local_key = OpKey::sub(object, NodeType::Bone, &pchan.name, OpCode::BoneLocal);
        let init_ik_key = OpKey::new(object, NodeType::EvalPose, OpCode::PoseInitIk);
        let solver_key = OpKey::named(object, NodeType::EvalPose, OpCode::PoseIkSolver, &root_name);
        let pose_cleanup_key = OpKey::new(object, NodeType::EvalPose, OpCode::PoseCleanup);

        // If any of the constraint parameters are animated, connect the
        // relation. Since there is only one init-IK node per armature, this
        // link has quite a high risk of spurious dependency cycles.
        let is_itasc = pose.iksolver == IkSolverKind::Itasc;
        let constraint_target = PropertyTarget::Constraint {
            owner: object,
            constraint: constraint.name.clone(),
        };
        if is_itasc || self.cache.is_any_property_animated(self.main, &constraint_target) {
            self.add_relation(
                pchan_local_key,
                init_ik_key.clone(),
                "IK Constraint -> Init IK Tree",
            );
        }
        self.add_relation(init_ik_key.clone(), solver_key.clone(), "Init IK -> IK Solver");
        // Never clean up before the solver is run.
        self.add_relation_flags(
            solver_key.clone(),
            pose_cleanup_key,
            "IK Solver -> Cleanup",
            RelationFlag::GODMODE,
        );
        // The iTaSC solver accesses the target transforms in the init tree.
        let target_dependent_key = if is_itasc {
            init_ik_key.clone()
        } else {
            solver_key.clone()
        };

        // IK target.
        if let Some(target) = &ik.target {
            if target.object != object {
                self.build_object(target.object);
                self.add_relation(
                    ComponentKey::new(target.object, NodeType::Transform),
                    target_dependent_key.clone(),
                    &constraint.name,
                );
                // Ensure the target's shadow is ready by the time the IK
                // tree is built, just in case.
                self.add_relation_flags(
                    ComponentKey::new(target.object, NodeType::CopyOnWrite),
                    init_ik_key.clone(),
                    "IK Target CoW -> Init IK Tree",
                    RelationFlag::CHECK_BEFORE_ADD,
                );
            }
            if let Some(subtarget) = &target.subtarget {
                let target_type = self.main.object(target.object).map(|ob| ob.object_type);
                match target_type {
                    Some(ObjectType::Armature) => {
                        // Bone subtarget: use the final transformation.
                        self.add_relation(
                            OpKey::sub(target.object, NodeType::Bone, subtarget, OpCode::BoneDone),
                            target_dependent_key.clone(),
                            &constraint.name,
                        );
                    }
                    Some(ObjectType::Mesh) | Some(ObjectType::Lattice) => {
                        // Vertex-group target; vertex groups are not
                        // represented separately.
                        self.add_relation(
                            ComponentKey::new(target.object, NodeType::Geometry),
                            target_dependent_key.clone(),
                            &constraint.name,
                        );
                        self.add_customdata_mask(
                            target.object,
                            CustomDataMasks::vert_mask(CUSTOMDATA_MASK_DEFORMVERT),
                        );
                    }
                    _ => {}
                }
                if target.object == object {
                    // Prevent the target's constraints from linking to
                    // anything from the same chain that it controls.
                    root_map.add_bone(subtarget, &root_name);
                }
            }
        }
        // Pole target.
        if let Some(pole) = &ik.pole_target {
            if pole.object != object {
                self.build_object(pole.object);
                self.add_relation(
                    ComponentKey::new(pole.object, NodeType::Transform),
                    target_dependent_key.clone(),
                    &constraint.name,
                );
                self.add_relation_flags(
                    ComponentKey::new(pole.object, NodeType::CopyOnWrite),
                    init_ik_key.clone(),
                    "IK Target CoW -> Init IK Tree",
                    RelationFlag::CHECK_BEFORE_ADD,
                );
            }
            if let Some(subtarget) = &pole.subtarget {
                let target_type = self.main.object(pole.object).map(|ob| ob.object_type);
                match target_type {
                    Some(ObjectType::Armature) => {
                        self.add_relation(
                            OpKey::sub(pole.object, NodeType::Bone, subtarget, OpCode::BoneDone),
                            target_dependent_key.clone(),
                            &constraint.name,
                        );
                    }
                    Some(ObjectType::Mesh) | Some(ObjectType::Lattice) => {
                        self.add_relation(
                            ComponentKey::new(pole.object, NodeType::Geometry),
                            target_dependent_key.clone(),
                            &constraint.name,
                        );
                        self.add_customdata_mask(
                            pole.object,
                            CustomDataMasks::vert_mask(CUSTOMDATA_MASK_DEFORMVERT),
                        );
                    }
                    _ => {}
                }
            }
        }

        log::debug!(
            "Starting IK build: pchan = {}, target = {:?}, segcount = {}",
            pchan.name,
            ik.target,
            ik.chain_length
        );

        // Exclude the tip from the chain if needed.
        let mut parchan = if ik.use_tip {
            Some(pchan)
        } else {
            pchan.parent.as_deref().and_then(|name| pose.channel(name))
        };
        if let Some(first) = parchan {
            root_map.add_bone(&first.name, &root_name);
            self.add_relation(
                OpKey::sub(object, NodeType::Bone, &first.name, OpCode::BoneReady),
                solver_key.clone(),
                "IK Solver Owner",
            );
        }
        // Walk to the chain's root. The solver depends on each bone's
        // pre-solve result and owns each bone's final result.
        let mut segcount: u16 = 0;
        while let Some(chain_bone) = parchan {
            if chain_bone.name != pchan.name {
                self.add_relation(
                    OpKey::sub(object, NodeType::Bone, &chain_bone.name, OpCode::BoneReady),
                    solver_key.clone(),
                    "IK Chain Parent",
                );
                self.add_relation(
                    solver_key.clone(),
                    OpKey::sub(object, NodeType::Bone, &chain_bone.name, OpCode::BoneDone),
                    "IK Chain Result",
                );
            } else {
                self.add_relation(
                    solver_key.clone(),
                    OpKey::sub(object, NodeType::Bone, &chain_bone.name, OpCode::BoneDone),
                    "IK Solver Result",
                );
            }
            root_map.add_bone(&chain_bone.name, &root_name);
            segcount += 1;
            if (ik.chain_length != 0 && segcount == ik.chain_length) || segcount > 255 {
                break;
            }
            parchan = chain_bone
                .parent
                .as_deref()
                .and_then(|name| pose.channel(name));
        }
        self.add_relation(
            solver_key.clone(),
            OpKey::new(object, NodeType::EvalPose, OpCode::PoseDone),
            "PoseEval Result-Bone Link",
        );

        self.build_inter_ik_chains(object, &solver_key, pose, &root_name, root_map);
    }

    /// Spline IK eval steps.
    fn build_splineik_pose(
        &mut self,
        object: IdHandle,
        pose: &Pose,
        pchan: &PoseChannel,
        spline: &SplineIkConstraint,
        root_map: &mut RootChannelMap,
    ) {
        let rootchan = spline_ik_find_root(pose, pchan, spline.chain_length);
        let root_name = rootchan.name.clone();

        let transforms_key = OpKey::sub(object, NodeType::Bone, &pchan.name, OpCode::BoneReady);
        let init_ik_key = OpKey::new(object, NodeType::EvalPose, OpCode::PoseInitIk);
        let solver_key = OpKey::named(
            object,
            NodeType::EvalPose,
            OpCode::PoseSplineIkSolver,
            &root_name,
        );
        let pose_cleanup_key = OpKey::new(object, NodeType::EvalPose, OpCode::PoseCleanup);

        // Solver depends on initialization.
        self.add_relation(init_ik_key, solver_key.clone(), "Init IK -> IK Solver");
        // Never clean up before the solver is run.
        self.add_relation(solver_key.clone(), pose_cleanup_key, "IK Solver -> Cleanup");
        // Attach the owner to the solver.
        self.add_relation_flags(
            transforms_key,
            solver_key.clone(),
            "Spline IK Solver Owner",
            RelationFlag::GODMODE,
        );
        // Attach the path dependency to the solver.
        if let Some(target) = spline.target {
            self.add_relation(
                ComponentKey::new(target, NodeType::Geometry),
                solver_key.clone(),
                "Curve.Path -> Spline IK",
            );
            self.add_relation(
                ComponentKey::new(target, NodeType::Transform),
                solver_key.clone(),
                "Curve.Transform -> Spline IK",
            );
            self.add_special_eval_flag(target, EVAL_FLAG_NEED_CURVE_PATH);
        }
        self.add_relation(
            solver_key.clone(),
            OpKey::sub(object, NodeType::Bone, &pchan.name, OpCode::BoneDone),
            "Spline IK Result",
        );
        root_map.add_bone(&pchan.name, &root_name);

        // Walk to the chain's root.
        let mut segcount: u16 = 1;
        let mut parchan = pchan.parent.as_deref().and_then(|name| pose.channel(name));
        while let Some(chain_bone) = parchan {
            if spline.chain_length != 0 && segcount >= spline.chain_length {
                break;
            }
            // The spline solver can only run after the standard results of
            // each chain bone are known.
            self.add_relation(
                OpKey::sub(object, NodeType::Bone, &chain_bone.name, OpCode::BoneReady),
                solver_key.clone(),
                "Spline IK Solver Update",
            );
            self.add_relation(
                solver_key.clone(),
                OpKey::sub(object, NodeType::Bone, &chain_bone.name, OpCode::BoneDone),
                "Spline IK Solver Result",
            );
            root_map.add_bone(&chain_bone.name, &root_name);
            segcount += 1;
            parchan = chain_bone
                .parent
                .as_deref()
                .and_then(|name| pose.channel(name));
        }
        self.add_relation(
            solver_key.clone(),
            OpKey::new(object, NodeType::EvalPose, OpCode::PoseDone),
            "PoseEval Result-Bone Link",
        );

        self.build_inter_ik_chains(object, &solver_key, pose, &root_name, root_map);
    }

    ///
    /// When the root of one IK chain is itself part of another chain, the
    /// two solvers interact; depending on the deepest shared root breaks the
    /// cycle that would otherwise form between them.
    ///
    fn build_inter_ik_chains(
        &mut self,
        object: IdHandle,
        solver_key: &OpKey,
        pose: &Pose,
        root_name: &str,
        root_map: &RootChannelMap,
    ) {
        let mut deepest_root: Option<&PoseChannel> = None;
        let rootchan = pose.channel(root_name);
        let mut parchan = rootchan
            .and_then(|chan| chan.parent.as_deref())
            .and_then(|name| pose.channel(name));
        while let Some(chain_bone) = parchan {
            if !root_map.has_common_root(root_name, &chain_bone.name) {
                break;
            }
            deepest_root = Some(chain_bone);
            parchan = chain_bone
                .parent
                .as_deref()
                .and_then(|name| pose.channel(name));
        }
        let Some(deepest_root) = deepest_root else {
            return;
        };
        self.add_relation(
            OpKey::sub(object, NodeType::Bone, &deepest_root.name, OpCode::BoneDone),
            solver_key.clone(),
            "IK Chain Overlap",
        );
    }

    /// Pose/armature bones graph.
    pub(crate) fn build_rig(&mut self, object: IdHandle, block: &Object) {
        // Attach links between pose operations.
        let local_transform = ComponentKey::new(object, NodeType::Transform);
        let pose_init_key = OpKey::new(object, NodeType::EvalPose, OpCode::PoseInit);
        let pose_init_ik_key = OpKey::new(object, NodeType::EvalPose, OpCode::PoseInitIk);
        let pose_cleanup_key = OpKey::new(object, NodeType::EvalPose, OpCode::PoseCleanup);
        let pose_done_key = OpKey::new(object, NodeType::EvalPose, OpCode::PoseDone);
        self.add_relation(
            local_transform,
            pose_init_key.clone(),
            "Local Transform -> Pose Init",
        );
        self.add_relation(
            pose_init_key.clone(),
            pose_init_ik_key.clone(),
            "Pose Init -> Pose Init IK",
        );
        self.add_relation(
            pose_init_ik_key,
            pose_done_key.clone(),
            "Pose Init IK -> Pose Cleanup",
        );
        // Make sure the pose is up to date with armature updates.
        if let Some(armature) = block.data {
            self.build_armature(armature);
            self.add_relation(
                OpKey::new(armature, NodeType::Armature, OpCode::ArmatureEval),
                pose_init_key.clone(),
                "Data dependency",
            );
        }
        // Run cleanup even when there are no bones.
        self.add_relation(pose_init_key.clone(), pose_cleanup_key.clone(), "Init -> Cleanup");

        let Some(pose) = &block.pose else {
            return;
        };

        // IK solvers need separate processing steps at pose level, executed
        // between chains of bones. Their relations are built before the
        // within-component ones since chain membership decides whether a
        // parent link may use the pre-solve result.
        let mut root_map = RootChannelMap::default();
        let mut pose_depends_on_local_transform = false;
        for pchan in &pose.channels {
            for constraint in &pchan.constraints {
                match &constraint.kind {
                    ConstraintKind::Kinematic(ik) => {
                        self.build_ik_pose(object, pose, pchan, constraint, ik, &mut root_map);
                        pose_depends_on_local_transform = true;
                    }
                    ConstraintKind::SplineIk(spline) => {
                        self.build_splineik_pose(object, pose, pchan, spline, &mut root_map);
                        pose_depends_on_local_transform = true;
                    }
                    // Constraints which need the world's matrix for their
                    // transform.
                    ConstraintKind::CopyTransforms { .. } => {
                        pose_depends_on_local_transform = true;
                    }
                    _ => {}
                }
            }
        }
        if pose_depends_on_local_transform {
            self.add_relation(
                ComponentKey::new(object, NodeType::Transform),
                ComponentKey::new(object, NodeType::EvalPose),
                "Local Transforms",
            );
        }

        // Links between operations for each bone.
        for pchan in &pose.channels {
            self.build_idprops_for_channel(object, pchan);
            let bone_local_key =
                OpKey::sub(object, NodeType::Bone, &pchan.name, OpCode::BoneLocal);
            let bone_pose_key =
                OpKey::sub(object, NodeType::Bone, &pchan.name, OpCode::BonePoseParent);
            let bone_ready_key =
                OpKey::sub(object, NodeType::Bone, &pchan.name, OpCode::BoneReady);
            let bone_done_key = OpKey::sub(object, NodeType::Bone, &pchan.name, OpCode::BoneDone);
            // Pose init to bone local.
            self.add_relation_flags(
                pose_init_key.clone(),
                bone_local_key.clone(),
                "Pose Init - Bone Local",
                RelationFlag::GODMODE,
            );
            // Local to pose parenting operation.
            self.add_relation(
                bone_local_key.clone(),
                bone_pose_key.clone(),
                "Bone Local - Bone Pose",
            );
            // Parent relation: when both bones are in one IK chain the
            // pre-solve result must be used, preventing lockups while
            // keeping separate chains correct.
            if let Some(parent) = &pchan.parent {
                let parent_key_opcode = if root_map.has_common_root(&pchan.name, parent) {
                    OpCode::BoneReady
                } else {
                    OpCode::BoneDone
                };
                self.add_relation(
                    OpKey::sub(object, NodeType::Bone, parent, parent_key_opcode),
                    bone_pose_key.clone(),
                    "Parent Bone -> Child Bone",
                );
            }
            // Constraint stack.
            if !pchan.constraints.is_empty() {
                let constraints_key =
                    OpKey::sub(object, NodeType::Bone, &pchan.name, OpCode::BoneConstraints);
                self.build_constraints(
                    object,
                    constraints_key.clone(),
                    &pchan.constraints,
                    Some(&root_map),
                );
                self.add_relation(
                    bone_pose_key,
                    constraints_key.clone(),
                    "Pose -> Constraints Stack",
                );
                self.add_relation(
                    bone_local_key,
                    constraints_key.clone(),
                    "Local -> Constraints Stack",
                );
                self.add_relation(constraints_key, bone_ready_key.clone(), "Constraints -> Ready");
            } else {
                self.add_relation(bone_pose_key, bone_ready_key.clone(), "Pose -> Ready");
            }
            // For bones without IK this is all that's needed; for chains the
            // solver adds its own links from ready/done.
            self.add_relation(bone_ready_key.clone(), bone_done_key.clone(), "Ready -> Done");

            // B-Bone shape is the real final step after done, if present.
            if pchan.has_bbone_segments() {
                let bone_segments_key =
                    OpKey::sub(object, NodeType::Bone, &pchan.name, OpCode::BoneSegments);
                self.add_relation(
                    bone_done_key.clone(),
                    bone_segments_key.clone(),
                    "Done -> B-Bone Segments",
                );
                // The shape also depends on the final position of the handle
                // bones.
                if let Some(prev) = &pchan.bbone_prev {
                    let prev_has_segments = pose
                        .channel(prev)
                        .is_some_and(|handle| handle.has_bbone_segments());
                    // Inheriting parent roll needs the prev handle's B-Bone
                    // result rather than its plain transform.
                    let opcode = if pchan.bbone_add_parent_end_roll && prev_has_segments {
                        OpCode::BoneSegments
                    } else {
                        OpCode::BoneDone
                    };
                    self.add_relation(
                        OpKey::sub(object, NodeType::Bone, prev, opcode),
                        bone_segments_key.clone(),
                        "Prev Handle -> B-Bone Segments",
                    );
                }
                if let Some(next) = &pchan.bbone_next {
                    self.add_relation(
                        OpKey::sub(object, NodeType::Bone, next, OpCode::BoneDone),
                        bone_segments_key.clone(),
                        "Next Handle -> B-Bone Segments",
                    );
                }
                // Pose requires the B-Bone shape.
                self.add_relation_flags(
                    bone_segments_key.clone(),
                    pose_done_key.clone(),
                    "PoseEval Result-Bone Link",
                    RelationFlag::GODMODE,
                );
                self.add_relation(bone_segments_key, pose_cleanup_key.clone(), "Cleanup dependency");
            } else {
                // Assume that all bones must be done for the pose to be
                // ready (for deformers).
                self.add_relation(
                    bone_done_key.clone(),
                    pose_done_key.clone(),
                    "PoseEval Result-Bone Link",
                );
                self.add_relation(bone_done_key, pose_cleanup_key.clone(), "Done -> Cleanup");
                self.add_relation(bone_ready_key, pose_cleanup_key.clone(), "Ready -> Cleanup");
            }
            // Custom shapes follow the armature's visibility.
            if let Some(custom_shape) = pchan.custom_shape {
                self.build_object(custom_shape);
                self.add_visibility_relation(custom_shape, object);
            }
        }
    }

    ///
    /// Custom properties of a pose channel are inputs to its local solve.
    ///
    fn build_idprops_for_channel(&mut self, object: IdHandle, pchan: &PoseChannel) {
        for prop in &pchan.custom_properties {
            let idprop_key = OpKey {
                id: object,
                component: NodeType::Bone,
                component_name: pchan.name.clone(),
                opcode: OpCode::IdProperty,
                name: prop.clone(),
                name_tag: -1,
            };
            self.add_relation(
                idprop_key,
                OpKey::sub(object, NodeType::Bone, &pchan.name, OpCode::BoneLocal),
                "ID Property -> Bone Local",
            );
        }
    }

    pub(crate) fn build_armature(&mut self, armature: IdHandle) {
        if !self.built_map.check_is_built_and_tag(armature) {
            return;
        }
        if let Some(adt) = self.main.armature(armature).and_then(|block| block.adt.clone()) {
            self.build_animdata(armature, &adt);
        }
    }
}

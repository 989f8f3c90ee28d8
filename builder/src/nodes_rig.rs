// Copyright 2025 Depsgraph project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Node construction for rigs: pose, bones and IK solver operations.

use graph::{NodeType, OpCode};
use scene::{ConstraintKind, IdHandle, IkConstraint, Object, Pose, PoseChannel};

use crate::nodes::NodeBuilder;

///
/// The chain root an IK constraint solves towards: walk the parent chain
/// from the constrained bone for `chain_length` segments (zero means all the
/// way to the root). The last visited channel is the root.
///
pub(crate) fn ik_solver_find_root<'p>(
    pose: &'p Pose,
    pchan: &'p PoseChannel,
    ik: &IkConstraint,
) -> Option<&'p PoseChannel> {
    let start = if ik.use_tip {
        pchan
    } else {
        pose.channel(pchan.parent.as_deref()?)?
    };
    let mut parchan = start;
    let mut segcount: u16 = 0;
    loop {
        segcount += 1;
        if (ik.chain_length != 0 && segcount == ik.chain_length) || segcount > 255 {
            break;
        }
        match parchan.parent.as_deref().and_then(|name| pose.channel(name)) {
            Some(parent) => parchan = parent,
            None => break,
        }
    }
    Some(parchan)
}

/// Same walk for spline IK, which always includes the tip.
pub(crate) fn spline_ik_find_root<'p>(
    pose: &'p Pose,
    pchan: &'p PoseChannel,
    chain_length: u16,
) -> &'p PoseChannel {
    let mut parchan = pchan;
    let mut segcount: u16 = 0;
    loop {
        segcount += 1;
        if (chain_length != 0 && segcount == chain_length) || segcount > 255 {
            break;
        }
        match parchan.parent.as_deref().and_then(|name| pose.channel(name)) {
            Some(parent) => parchan = parent,
            None => break,
        }
    }
    parchan
}

impl NodeBuilder<'_> {
    ///
    /// Pose and bone operations for an armature object. Solver operations
    /// are created before the per-bone ones so that chain construction can
    /// reference them by root name.
    ///
    pub(crate) fn build_rig(&mut self, object: IdHandle, block: &Object, is_visible: bool) {
        let pose_comp = self.add_component_node(object, NodeType::EvalPose, "");
        let pose_init = self
            .graph
            .ensure_operation(pose_comp, OpCode::PoseInit, "", -1, None);
        self.graph
            .ensure_operation(pose_comp, OpCode::PoseInitIk, "", -1, None);
        self.graph
            .ensure_operation(pose_comp, OpCode::PoseCleanup, "", -1, None);
        let pose_done = self
            .graph
            .ensure_operation(pose_comp, OpCode::PoseDone, "", -1, None);
        self.graph
            .component_mut(pose_comp)
            .set_entry_operation(pose_init);
        self.graph
            .component_mut(pose_comp)
            .set_exit_operation(pose_done);

        let Some(pose) = &block.pose else {
            return;
        };

        // Solver operations, one per chain root.
        for pchan in &pose.channels {
            for constraint in &pchan.constraints {
                match &constraint.kind {
                    ConstraintKind::Kinematic(ik) => {
                        if constraint.is_disabled {
                            continue;
                        }
                        if let Some(rootchan) = ik_solver_find_root(pose, pchan, ik) {
                            let root = rootchan.name.clone();
                            self.graph.ensure_operation(
                                pose_comp,
                                OpCode::PoseIkSolver,
                                &root,
                                -1,
                                None,
                            );
                        }
                    }
                    ConstraintKind::SplineIk(spline) => {
                        let root = spline_ik_find_root(pose, pchan, spline.chain_length)
                            .name
                            .clone();
                        self.graph.ensure_operation(
                            pose_comp,
                            OpCode::PoseSplineIkSolver,
                            &root,
                            -1,
                            None,
                        );
                    }
                    _ => {}
                }
            }
        }

        // Bone components.
        for pchan in &pose.channels {
            let comp = self.add_component_node(object, NodeType::Bone, &pchan.name);
            let local = self
                .graph
                .ensure_operation(comp, OpCode::BoneLocal, "", -1, None);
            self.graph
                .ensure_operation(comp, OpCode::BonePoseParent, "", -1, None);
            if !pchan.constraints.is_empty() {
                self.graph
                    .ensure_operation(comp, OpCode::BoneConstraints, "", -1, None);
            }
            self.graph
                .ensure_operation(comp, OpCode::BoneReady, "", -1, None);
            let done = self
                .graph
                .ensure_operation(comp, OpCode::BoneDone, "", -1, None);
            // B-Bone segmentation is the real final step when present.
            let exit = if pchan.has_bbone_segments() {
                self.graph
                    .ensure_operation(comp, OpCode::BoneSegments, "", -1, None)
            } else {
                done
            };
            self.graph.component_mut(comp).set_entry_operation(local);
            self.graph.component_mut(comp).set_exit_operation(exit);

            // Custom properties of the channel live on its component.
            for prop in &pchan.custom_properties {
                self.graph
                    .ensure_operation(comp, OpCode::IdProperty, prop, -1, None);
            }

            if let Some(custom_shape) = pchan.custom_shape {
                self.build_object(
                    false,
                    custom_shape,
                    graph::LinkedState::Indirectly,
                    is_visible,
                );
            }
            self.build_constraint_references(&pchan.constraints, is_visible);
        }
    }
}

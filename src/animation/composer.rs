//! Layers to skinning matrices: local pose, model space, IK, offsets

use super::ik::{FabrikSolver, IkConfig, IkTarget};
use super::layer::Layer;
use super::pose::PoseBuffer;
use super::Skeleton;
use crate::core::{Error, Result};
use glam::Mat4;

/// Per-instance scratch for turning layered poses into bone matrices
#[derive(Clone, Debug, Default)]
pub struct PoseComposer {
    pose: PoseBuffer,
    local: Vec<Mat4>,
    model: Vec<Mat4>,
    solver: FabrikSolver,
}

impl PoseComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate `layers` in order, solve IK and write one skinning matrix
    /// per bone into `out`.
    pub fn compose(
        &mut self,
        skeleton: &Skeleton,
        layers: &[Layer],
        ik_targets: &[IkTarget],
        ik_config: &IkConfig,
        out: &mut [Mat4],
    ) -> Result<()> {
        let bone_count = skeleton.bone_count();
        if out.len() < bone_count {
            return Err(Error::BufferTooSmall {
                required: bone_count,
                provided: out.len(),
            });
        }

        self.evaluate_local(skeleton, layers);
        self.compose_model(skeleton);

        for target in ik_targets {
            let Some(position) = target.position else {
                continue;
            };
            self.solver.solve(
                skeleton,
                &mut self.model,
                target.tip_joint,
                target.chain_length,
                position,
                ik_config,
            );
        }

        for ((slot, model), bone) in out.iter_mut().zip(&self.model).zip(skeleton.bones()) {
            *slot = *model * bone.offset_matrix;
        }
        Ok(())
    }

    /// Model-space matrices from the last `compose`, after IK
    pub fn model_matrices(&self) -> &[Mat4] {
        &self.model
    }

    pub fn pose(&self) -> &PoseBuffer {
        &self.pose
    }

    fn evaluate_local(&mut self, skeleton: &Skeleton, layers: &[Layer]) {
        let bone_count = skeleton.bone_count();
        self.pose.reset(bone_count);
        for layer in layers {
            layer.evaluate(&mut self.pose, skeleton);
        }

        self.local.clear();
        self.local.extend(
            skeleton
                .bones()
                .iter()
                .enumerate()
                .map(|(joint, bone)| self.pose.resolve(joint, &bone.bind).to_matrix()),
        );
    }

    /// Single forward pass; bones are stored parent-before-child
    fn compose_model(&mut self, skeleton: &Skeleton) {
        self.model.clear();
        self.model.resize(skeleton.bone_count(), Mat4::IDENTITY);

        for (joint, bone) in skeleton.bones().iter().enumerate() {
            let parent = bone.parent_index.map(|p| self.model[p]);
            let composed = match parent {
                Some(parent) => parent * self.local[joint],
                None => self.local[joint],
            };

            self.model[joint] = if is_usable(&composed) {
                composed
            } else {
                log::trace!("Joint {} ('{}') degenerate, using bind pose", joint, bone.name);
                let bind = bone.bind.to_matrix();
                parent.map_or(bind, |parent| parent * bind)
            };
        }
    }
}

fn is_usable(matrix: &Mat4) -> bool {
    matrix.is_finite() && matrix.determinant().abs() > f32::MIN_POSITIVE
}

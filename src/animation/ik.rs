//! FABRIK inverse kinematics on model-space joint matrices
//!
//! The solver bends a chain of joints ending at a tip toward a target
//! position, rotating each chain joint by the change of its bone
//! direction. Joints hanging off the chain keep their local transforms
//! relative to their (moved) parents.

use super::Skeleton;
use crate::core::Transform;
use glam::{Mat4, Quat, Vec3};
use hecs::Entity;
use serde::{Deserialize, Serialize};

/// Maximum number of ancestors a chain can include
pub const MAX_IK_CHAIN: usize = 16;

const CHAIN_CAPACITY: usize = MAX_IK_CHAIN + 1;
const SEGMENT_EPSILON: f32 = 1.0e-6;

/// Solver limits
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IkConfig {
    /// Maximum backward/forward iterations per solve
    pub max_iterations: u32,
    /// Tip-to-target distance considered converged
    pub tolerance: f32,
    /// Upper bound on ancestors per chain (capped at `MAX_IK_CHAIN`)
    pub max_chain_length: usize,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tolerance: 1.0,
            max_chain_length: MAX_IK_CHAIN,
        }
    }
}

/// Where an IK target gets its position from
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TargetSource {
    /// Another entity, optionally one of its joints; looked up every frame
    Entity { entity: Entity, joint: Option<usize> },
    /// A fixed position in the skeleton's local space
    Fixed(Vec3),
}

/// A chain that should reach toward a target
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IkTarget {
    pub tip_joint: usize,
    pub chain_length: usize,
    pub source: TargetSource,
    /// Target in the skeleton's local space, once resolved
    pub position: Option<Vec3>,
}

impl IkTarget {
    pub fn entity(tip_joint: usize, chain_length: usize, entity: Entity, joint: Option<usize>) -> Self {
        Self {
            tip_joint,
            chain_length,
            source: TargetSource::Entity { entity, joint },
            position: None,
        }
    }

    pub fn fixed(tip_joint: usize, chain_length: usize, position: Vec3) -> Self {
        Self {
            tip_joint,
            chain_length,
            source: TargetSource::Fixed(position),
            position: Some(position),
        }
    }
}

/// Result of one solve
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IkOutcome {
    /// Joints in the chain, tip included
    pub chain_joints: usize,
    pub iterations: u32,
    /// Final tip-to-target distance
    pub distance: f32,
    /// False when the chain was fully stretched toward an out-of-reach target
    pub reachable: bool,
}

/// FABRIK solver with reusable scratch buffers
#[derive(Clone, Debug, Default)]
pub struct FabrikSolver {
    transforms: Vec<Transform>,
    locals: Vec<Mat4>,
    in_chain: Vec<bool>,
    affected: Vec<bool>,
}

impl FabrikSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solve one chain in place on model-space `matrices`.
    ///
    /// `chain_length` is clamped to the available ancestors and to the
    /// configured maximum. Returns `None` when there is nothing to solve.
    pub fn solve(
        &mut self,
        skeleton: &Skeleton,
        matrices: &mut [Mat4],
        tip_joint: usize,
        chain_length: usize,
        target: Vec3,
        config: &IkConfig,
    ) -> Option<IkOutcome> {
        let joint_count = skeleton.bone_count().min(matrices.len());
        if tip_joint >= joint_count || !target.is_finite() {
            return None;
        }

        // Walk up from the tip, then flip to root-to-tip order
        let max_ancestors = chain_length.min(config.max_chain_length).min(MAX_IK_CHAIN);
        let mut chain = [0usize; CHAIN_CAPACITY];
        chain[0] = tip_joint;
        let mut count = 1;
        let mut joint = tip_joint;
        while count - 1 < max_ancestors {
            let Some(parent) = skeleton.parent_index(joint) else {
                break;
            };
            chain[count] = parent;
            count += 1;
            joint = parent;
        }
        if count - 1 < chain_length {
            log::trace!(
                "IK chain at joint {} clamped to {} of {} requested ancestors",
                tip_joint,
                count - 1,
                chain_length
            );
        }
        if count < 2 {
            return None;
        }
        let chain = &mut chain[..count];
        chain.reverse();

        self.transforms.clear();
        self.transforms
            .extend(matrices[..joint_count].iter().map(Transform::from_matrix));

        self.capture_descendants(skeleton, matrices, chain, joint_count);

        let mut original = [Vec3::ZERO; CHAIN_CAPACITY];
        let mut lengths = [0.0f32; CHAIN_CAPACITY];
        for (k, &joint) in chain.iter().enumerate() {
            original[k] = self.transforms[joint].translation;
        }
        let mut total_length = 0.0;
        for k in 0..count - 1 {
            lengths[k] = original[k].distance(original[k + 1]);
            total_length += lengths[k];
        }

        let mut solved = original;
        let root = original[0];
        let tip = count - 1;
        let reachable = total_length >= root.distance(target);
        let mut iterations = 0;

        if !reachable {
            for k in 0..tip {
                solved[k + 1] = place_at_distance(solved[k], target, lengths[k]);
            }
        } else {
            let mut distance = solved[tip].distance(target);
            while iterations < config.max_iterations && distance > config.tolerance {
                // Backward: pin the tip on the target
                solved[tip] = target;
                for k in (0..tip).rev() {
                    solved[k] = place_at_distance(solved[k + 1], solved[k], lengths[k]);
                }

                // Forward: pin the root back in place
                solved[0] = root;
                for k in 1..count {
                    solved[k] = place_at_distance(solved[k - 1], solved[k], lengths[k - 1]);
                }

                distance = solved[tip].distance(target);
                iterations += 1;
            }
        }

        for k in 0..tip {
            if lengths[k] <= SEGMENT_EPSILON {
                continue;
            }
            let Some(delta) =
                rotation_between(original[k + 1] - original[k], solved[k + 1] - solved[k])
            else {
                continue;
            };
            let transform = &mut self.transforms[chain[k]];
            transform.rotation = (delta * transform.rotation).normalize();
        }

        for (k, &joint) in chain.iter().enumerate() {
            self.transforms[joint].translation = solved[k];
            matrices[joint] = self.transforms[joint].to_matrix();
        }

        self.restore_descendants(skeleton, matrices, joint_count);

        let outcome = IkOutcome {
            chain_joints: count,
            iterations,
            distance: solved[tip].distance(target),
            reachable,
        };
        log::trace!(
            "IK tip {}: {} iterations, distance {:.4}, reachable {}",
            tip_joint,
            outcome.iterations,
            outcome.distance,
            outcome.reachable
        );
        Some(outcome)
    }

    /// Record parent-relative matrices of every joint below the chain
    /// that is not itself part of it.
    fn capture_descendants(
        &mut self,
        skeleton: &Skeleton,
        matrices: &[Mat4],
        chain: &[usize],
        joint_count: usize,
    ) {
        self.in_chain.clear();
        self.in_chain.resize(joint_count, false);
        for &joint in chain {
            self.in_chain[joint] = true;
        }

        self.affected.clear();
        self.affected.resize(joint_count, false);
        self.locals.clear();
        self.locals.resize(joint_count, Mat4::IDENTITY);

        for joint in 0..joint_count {
            if self.in_chain[joint] {
                self.affected[joint] = true;
                continue;
            }
            let Some(parent) = skeleton.parent_index(joint) else {
                continue;
            };
            if !self.affected[parent] {
                continue;
            }
            let parent_matrix = matrices[parent];
            if parent_matrix.determinant().abs() <= f32::EPSILON {
                continue;
            }
            self.locals[joint] = parent_matrix.inverse() * matrices[joint];
            self.affected[joint] = true;
        }
    }

    /// Recompose captured descendants on top of their updated parents
    fn restore_descendants(&self, skeleton: &Skeleton, matrices: &mut [Mat4], joint_count: usize) {
        for joint in 0..joint_count {
            if !self.affected[joint] || self.in_chain[joint] {
                continue;
            }
            if let Some(parent) = skeleton.parent_index(joint) {
                matrices[joint] = matrices[parent] * self.locals[joint];
            }
        }
    }
}

/// Point at `length` from `anchor` in the direction of `toward`
fn place_at_distance(anchor: Vec3, toward: Vec3, length: f32) -> Vec3 {
    let offset = toward - anchor;
    let distance = offset.length();
    if distance <= SEGMENT_EPSILON {
        return anchor;
    }
    anchor + offset * (length / distance)
}

/// Shortest rotation taking direction `from` onto `to`
fn rotation_between(from: Vec3, to: Vec3) -> Option<Quat> {
    let from = from.try_normalize()?;
    let to = to.try_normalize()?;
    let cos = from.dot(to).clamp(-1.0, 1.0);
    let axis = from.cross(to);
    let sin = axis.length();

    if sin > SEGMENT_EPSILON {
        Some(Quat::from_axis_angle(axis / sin, cos.acos()))
    } else if cos < 0.0 {
        Some(Quat::from_axis_angle(from.any_orthonormal_vector(), std::f32::consts::PI))
    } else {
        None
    }
}

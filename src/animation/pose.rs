//! Weighted per-joint pose accumulation shared by all layers

use crate::core::Transform;
use crate::math::align_hemisphere;
use glam::{Quat, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// How a layer composites onto the layers below it
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendMode {
    /// Discard what lower layers produced for the affected joints
    #[default]
    Override,
    /// Add the offset from the bind pose on top of lower layers
    Additive,
    /// Linearly interpolate from lower layers by the layer weight
    Blend,
}

/// Running weighted sums for one joint
#[derive(Clone, Copy, Debug)]
struct JointAccumulator {
    translation: Vec3,
    rotation: Vec4,
    scale: Vec3,
    weight: f32,
    additive_translation: Vec3,
    additive_rotation: Quat,
    additive_scale: Vec3,
}

impl Default for JointAccumulator {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Vec4::ZERO,
            scale: Vec3::ZERO,
            weight: 0.0,
            additive_translation: Vec3::ZERO,
            additive_rotation: Quat::IDENTITY,
            additive_scale: Vec3::ZERO,
        }
    }
}

impl JointAccumulator {
    fn attenuate(&mut self, keep: f32) {
        self.translation *= keep;
        self.rotation *= keep;
        self.scale *= keep;
        self.weight *= keep;
        self.additive_translation *= keep;
        self.additive_rotation = Quat::IDENTITY.slerp(self.additive_rotation, keep);
        self.additive_scale *= keep;
    }
}

/// Local pose under construction for a whole skeleton.
///
/// Samples are summed with their weights; whatever weight remains below
/// one when the pose is resolved is filled with the bind pose.
#[derive(Clone, Debug, Default)]
pub struct PoseBuffer {
    joints: Vec<JointAccumulator>,
}

impl PoseBuffer {
    pub fn new(joint_count: usize) -> Self {
        Self {
            joints: vec![JointAccumulator::default(); joint_count],
        }
    }

    /// Clear every joint, resizing to `joint_count`
    pub fn reset(&mut self, joint_count: usize) {
        self.joints.clear();
        self.joints.resize(joint_count, JointAccumulator::default());
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// Prepare a joint before a layer of `weight` contributes to it
    pub fn begin(&mut self, joint: usize, mode: BlendMode, weight: f32) {
        let Some(acc) = self.joints.get_mut(joint) else {
            return;
        };
        match mode {
            BlendMode::Override => *acc = JointAccumulator::default(),
            BlendMode::Blend => acc.attenuate((1.0 - weight).clamp(0.0, 1.0)),
            BlendMode::Additive => {}
        }
    }

    /// Add a sampled local transform with the given weight
    pub fn accumulate(
        &mut self,
        joint: usize,
        sample: &Transform,
        weight: f32,
        mode: BlendMode,
        bind: &Transform,
    ) {
        if weight <= 0.0 {
            return;
        }
        let Some(acc) = self.joints.get_mut(joint) else {
            return;
        };

        match mode {
            BlendMode::Additive => {
                acc.additive_translation += (sample.translation - bind.translation) * weight;
                acc.additive_scale += (sample.scale - bind.scale) * weight;
                let delta = bind.rotation.inverse() * sample.rotation;
                acc.additive_rotation *= Quat::IDENTITY.slerp(delta, weight);
            }
            BlendMode::Override | BlendMode::Blend => {
                let reference = if acc.weight > 0.0 {
                    Quat::from_vec4(acc.rotation)
                } else {
                    sample.rotation
                };
                let rotation = align_hemisphere(reference, sample.rotation);
                acc.translation += sample.translation * weight;
                acc.rotation += Vec4::from(rotation) * weight;
                acc.scale += sample.scale * weight;
                acc.weight += weight;
            }
        }
    }

    /// Total non-additive weight accumulated for a joint
    pub fn weight(&self, joint: usize) -> f32 {
        self.joints.get(joint).map(|acc| acc.weight).unwrap_or(0.0)
    }

    /// True when any layer touched the joint
    pub fn is_resolved(&self, joint: usize) -> bool {
        self.joints.get(joint).is_some_and(|acc| {
            acc.weight > 0.0
                || acc.additive_translation != Vec3::ZERO
                || acc.additive_scale != Vec3::ZERO
                || acc.additive_rotation != Quat::IDENTITY
        })
    }

    /// Final local transform of a joint
    pub fn resolve(&self, joint: usize, bind: &Transform) -> Transform {
        let Some(acc) = self.joints.get(joint) else {
            return *bind;
        };

        let base = if acc.weight <= f32::EPSILON {
            *bind
        } else {
            let rest = (1.0 - acc.weight).max(0.0);
            let total = acc.weight + rest;
            let reference = Quat::from_vec4(acc.rotation);
            let bind_rotation = Vec4::from(align_hemisphere(reference, bind.rotation));
            let rotation = acc.rotation + bind_rotation * rest;

            Transform {
                translation: (acc.translation + bind.translation * rest) / total,
                rotation: if rotation.length_squared() > f32::EPSILON {
                    Quat::from_vec4(rotation).normalize()
                } else {
                    bind.rotation
                },
                scale: (acc.scale + bind.scale * rest) / total,
            }
        };

        Transform {
            translation: base.translation + acc.additive_translation,
            rotation: (base.rotation * acc.additive_rotation).normalize(),
            scale: base.scale + acc.additive_scale,
        }
    }
}

//! Weighted, optionally masked animation layers

use super::pose::{BlendMode, PoseBuffer};
use super::state_machine::StateMachine;
use super::{Model, Skeleton};

/// An independent animation stream composited onto the skeleton
#[derive(Clone, Debug)]
pub struct Layer {
    name: String,
    weight: f32,
    blend_mode: BlendMode,
    /// Joints this layer drives; `None` means the whole skeleton
    mask: Option<Vec<usize>>,
    state_machine: StateMachine,
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: 1.0,
            blend_mode: BlendMode::Override,
            mask: None,
            state_machine: StateMachine::new(),
        }
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.set_weight(weight);
        self
    }

    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    /// Restrict the layer to a subset of joints
    pub fn with_mask(mut self, joints: impl IntoIterator<Item = usize>) -> Self {
        self.mask = Some(joints.into_iter().collect());
        self
    }

    pub fn with_state_machine(mut self, state_machine: StateMachine) -> Self {
        self.state_machine = state_machine;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Set the layer weight (clamped to 0.0-1.0)
    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight.clamp(0.0, 1.0);
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn set_blend_mode(&mut self, blend_mode: BlendMode) {
        self.blend_mode = blend_mode;
    }

    pub fn mask(&self) -> Option<&[usize]> {
        self.mask.as_deref()
    }

    pub fn clear_mask(&mut self) {
        self.mask = None;
    }

    pub fn state_machine(&self) -> &StateMachine {
        &self.state_machine
    }

    pub fn state_machine_mut(&mut self) -> &mut StateMachine {
        &mut self.state_machine
    }

    pub fn update(&mut self, dt: f32, model: &Model) {
        self.state_machine.update(dt, model);
    }

    /// Composite this layer's pose onto `pose`
    pub fn evaluate(&self, pose: &mut PoseBuffer, skeleton: &Skeleton) {
        if self.weight <= 0.0 || !self.state_machine.is_active() {
            return;
        }

        match &self.mask {
            Some(joints) => {
                for &joint in joints {
                    self.evaluate_joint(joint, pose, skeleton);
                }
            }
            None => {
                for joint in 0..skeleton.bone_count() {
                    self.evaluate_joint(joint, pose, skeleton);
                }
            }
        }
    }

    fn evaluate_joint(&self, joint: usize, pose: &mut PoseBuffer, skeleton: &Skeleton) {
        pose.begin(joint, self.blend_mode, self.weight);
        self.state_machine
            .evaluate_joint(joint, pose, self.weight, self.blend_mode, skeleton);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{ClipBuilder, ClipState, Keyframe, SkeletonBuilder};
    use crate::core::Transform;
    use glam::{Quat, Vec3};

    fn test_model() -> Model {
        let skeleton = SkeletonBuilder::new()
            .add_root("hips", Transform::IDENTITY)
            .add_bone("spine", "hips", Transform::from_translation(Vec3::Y))
            .add_bone("head", "spine", Transform::from_translation(Vec3::Y))
            .build()
            .unwrap();

        let walk = ClipBuilder::new("walk", 10.0)
            .duration(10.0)
            .keyframes((0..3).map(|j| Keyframe::translation(j, 0.0, Vec3::new(1.0, 1.0, 0.0))))
            .build();
        let aim = ClipBuilder::new("aim", 10.0)
            .duration(10.0)
            .keyframes((0..3).map(|j| Keyframe::rotation(j, 0.0, Quat::from_rotation_y(0.5))))
            .build();

        Model::new(skeleton).with_clip(walk).with_clip(aim)
    }

    fn playing_layer(name: &str, clip: &str, model: &Model) -> Layer {
        let mut layer = Layer::new(name);
        layer.state_machine_mut().add_state(clip, ClipState::new(clip));
        layer.state_machine_mut().play(clip);
        layer.update(0.0, model);
        layer
    }

    #[test]
    fn test_inactive_layer_contributes_nothing() {
        let model = test_model();
        let layer = Layer::new("empty");
        let mut pose = PoseBuffer::new(3);
        layer.evaluate(&mut pose, model.skeleton());
        assert!((0..3).all(|j| !pose.is_resolved(j)));
    }

    #[test]
    fn test_mask_limits_joints() {
        let model = test_model();
        let base = playing_layer("base", "walk", &model);
        let upper = playing_layer("upper", "aim", &model)
            .with_mask([1, 2])
            .with_blend_mode(BlendMode::Additive);

        let mut pose = PoseBuffer::new(3);
        base.evaluate(&mut pose, model.skeleton());
        upper.evaluate(&mut pose, model.skeleton());

        let skeleton = model.skeleton();
        let hips = pose.resolve(0, &skeleton.bind_transform(0));
        let head = pose.resolve(2, &skeleton.bind_transform(2));

        assert_eq!(hips.rotation, Quat::IDENTITY);
        assert!(head.rotation.angle_between(Quat::from_rotation_y(0.5)) < 1.0e-3);
        // Additive layer leaves the walk translation in place
        assert!((head.translation - Vec3::new(1.0, 1.0, 0.0)).length() < 1.0e-5);
    }

    #[test]
    fn test_override_weight_mixes_with_bind() {
        let model = test_model();
        let layer = playing_layer("base", "walk", &model).with_weight(0.5);

        let mut pose = PoseBuffer::new(3);
        layer.evaluate(&mut pose, model.skeleton());

        // Half way between the bind offset (0, 1, 0) and the key (1, 1, 0)
        let spine = pose.resolve(1, &model.skeleton().bind_transform(1));
        assert!((spine.translation - Vec3::new(0.5, 1.0, 0.0)).length() < 1.0e-5);
    }

    #[test]
    fn test_blend_layer_interpolates() {
        let model = test_model();
        let base = playing_layer("base", "walk", &model);
        let overlay = playing_layer("overlay", "aim", &model)
            .with_weight(0.5)
            .with_blend_mode(BlendMode::Blend);

        let mut pose = PoseBuffer::new(3);
        base.evaluate(&mut pose, model.skeleton());
        overlay.evaluate(&mut pose, model.skeleton());

        let hips = pose.resolve(0, &model.skeleton().bind_transform(0));
        assert!(hips.rotation.angle_between(Quat::from_rotation_y(0.25)) < 1.0e-3);
        // aim has no translation keys, so its sample carries the bind offset
        assert!((hips.translation - Vec3::new(0.5, 0.5, 0.0)).length() < 1.0e-5);
    }

    #[test]
    fn test_weight_is_clamped() {
        let layer = Layer::new("l").with_weight(3.0);
        assert_eq!(layer.weight(), 1.0);
    }
}

//! Runtime animation playback, layering and IK for one skinned instance

use super::composer::PoseComposer;
use super::config::AnimatorConfig;
use super::ik::{IkTarget, TargetSource};
use super::layer::Layer;
use super::state::ClipState;
use super::world::TransformProvider;
use super::Model;
use crate::core::{Error, Result};
use glam::{Mat4, Vec3};
use hecs::Entity;
use std::sync::Arc;

/// Name of the layer created when a model is bound
pub const BASE_LAYER: &str = "base";

/// Drives the layers of one skeleton instance and produces its bone matrices
#[derive(Clone, Debug)]
pub struct Animator {
    config: AnimatorConfig,
    model: Option<Arc<Model>>,
    layers: Vec<Layer>,
    ik_targets: Vec<IkTarget>,
    composer: PoseComposer,
    skinning: Vec<Mat4>,
}

impl Animator {
    /// Create an animator with no model bound
    pub fn new(config: AnimatorConfig) -> Self {
        Self {
            config,
            model: None,
            layers: Vec::new(),
            ik_targets: Vec::new(),
            composer: PoseComposer::new(),
            skinning: Vec::new(),
        }
    }

    /// Create an animator and bind `model`
    pub fn with_model(config: AnimatorConfig, model: Arc<Model>) -> Self {
        let mut animator = Self::new(config);
        animator.bind_model(model);
        animator
    }

    /// Bind a model, rebuilding the layer stack.
    ///
    /// Layer 0 becomes an override layer with one state per clip, named
    /// after the clip. IK targets are dropped since joint indices belong to
    /// the previous skeleton.
    pub fn bind_model(&mut self, model: Arc<Model>) {
        let mut base = Layer::new(BASE_LAYER);
        for clip in model.clips() {
            base.state_machine_mut().add_state(
                clip.name(),
                ClipState::new(clip.name())
                    .with_speed(self.config.default_speed)
                    .with_looping(self.config.looping),
            );
        }

        log::debug!(
            "Bound model with {} bones and {} clips",
            model.bone_count(),
            base.state_machine().state_count()
        );

        self.layers = vec![base];
        self.ik_targets.clear();
        self.model = Some(model);
    }

    pub fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    pub fn config(&self) -> &AnimatorConfig {
        &self.config
    }

    /// Number of bones of the bound model, 0 when unbound
    pub fn bone_count(&self) -> usize {
        self.model.as_ref().map_or(0, |model| model.bone_count())
    }

    /// Append a layer, returning its index
    pub fn add_layer(&mut self, layer: Layer) -> usize {
        self.layers.push(layer);
        self.layers.len() - 1
    }

    pub fn layer(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Add a state named `name` playing `clip_name` to a layer
    pub fn add_state(&mut self, layer: usize, name: &str, clip_name: &str) -> Result<usize> {
        let model = self.model.as_ref().ok_or(Error::NoModelBound)?;
        if model.clip(clip_name).is_none() {
            return Err(Error::UnknownClip(clip_name.to_string()));
        }
        let state = ClipState::new(clip_name)
            .with_speed(self.config.default_speed)
            .with_looping(self.config.looping);

        let layer = self.layers.get_mut(layer).ok_or(Error::UnknownLayer(layer))?;
        Ok(layer.state_machine_mut().add_state(name, state))
    }

    /// Switch a layer to `name` on the next update
    pub fn play(&mut self, name: &str, layer: usize) {
        match self.layers.get_mut(layer) {
            Some(l) => l.state_machine_mut().play(name),
            None => log::warn!("play('{}'): no layer {}", name, layer),
        }
    }

    /// Cross-fade a layer to `name` over a fraction of its clip duration
    pub fn cross_fade(&mut self, name: &str, fade_fraction: f32, layer: usize) {
        match self.layers.get_mut(layer) {
            Some(l) => l.state_machine_mut().cross_fade(name, fade_fraction),
            None => log::warn!("cross_fade('{}'): no layer {}", name, layer),
        }
    }

    /// Advance every layer
    pub fn update(&mut self, dt: f32) {
        let Some(model) = self.model.as_deref() else {
            return;
        };
        for layer in &mut self.layers {
            layer.update(dt, model);
        }
    }

    /// Aim `tip_joint` and `chain_length` ancestors at an entity, or at one
    /// of its joints. Replaces any target already set on the same tip.
    pub fn set_ik_target(
        &mut self,
        tip_joint: usize,
        chain_length: usize,
        target: Entity,
        target_joint: Option<usize>,
    ) {
        self.push_ik_target(IkTarget::entity(tip_joint, chain_length, target, target_joint));
    }

    /// Aim a chain at a fixed point in the skeleton's local space
    pub fn set_ik_target_position(&mut self, tip_joint: usize, chain_length: usize, position: Vec3) {
        self.push_ik_target(IkTarget::fixed(tip_joint, chain_length, position));
    }

    pub fn remove_ik_target(&mut self, tip_joint: usize) {
        self.ik_targets.retain(|t| t.tip_joint != tip_joint);
    }

    pub fn clear_ik_targets(&mut self) {
        self.ik_targets.clear();
    }

    pub fn ik_targets(&self) -> &[IkTarget] {
        &self.ik_targets
    }

    fn push_ik_target(&mut self, target: IkTarget) {
        self.remove_ik_target(target.tip_joint);
        self.ik_targets.push(target);
    }

    /// Look up entity targets and express them in this skeleton's space.
    ///
    /// Targets whose entity has no transform stay inactive until the next
    /// successful lookup.
    pub fn resolve_ik_targets(&mut self, owner_world: Mat4, provider: &impl TransformProvider) {
        let invertible =
            owner_world.is_finite() && owner_world.determinant().abs() > f32::MIN_POSITIVE;
        let to_local = owner_world.inverse();

        for target in &mut self.ik_targets {
            let TargetSource::Entity { entity, joint } = target.source else {
                continue;
            };
            if !invertible {
                log::trace!(
                    "Owner transform not invertible, IK target for joint {} inactive",
                    target.tip_joint
                );
                target.position = None;
                continue;
            }
            let world = provider.world_transform(entity).map(|world| match joint {
                Some(joint) => provider
                    .joint_transform(entity, joint)
                    .map(|joint_matrix| world * joint_matrix),
                None => Some(world),
            });

            target.position = world
                .flatten()
                .map(|world| to_local.transform_point3(world.w_axis.truncate()));
            if target.position.is_none() {
                log::trace!("IK target for joint {} has no transform", target.tip_joint);
            }
        }
    }

    /// Write one skinning matrix per bone into `out`
    pub fn fill_bone_matrices(&mut self, out: &mut [Mat4]) -> Result<()> {
        let model = self.model.as_deref().ok_or(Error::NoModelBound)?;
        self.composer.compose(
            model.skeleton(),
            &self.layers,
            &self.ik_targets,
            &self.config.ik,
            out,
        )
    }

    /// Write the skinning matrices as raw bytes, ready for a GPU buffer
    pub fn fill_bone_matrix_bytes(&mut self, out: &mut [u8]) -> Result<()> {
        let model = self.model.as_deref().ok_or(Error::NoModelBound)?;
        let bone_count = model.bone_count();
        let required = bone_count * std::mem::size_of::<Mat4>();
        if out.len() < required {
            return Err(Error::BufferTooSmall {
                required,
                provided: out.len(),
            });
        }

        self.skinning.resize(bone_count, Mat4::IDENTITY);
        self.composer.compose(
            model.skeleton(),
            &self.layers,
            &self.ik_targets,
            &self.config.ik,
            &mut self.skinning,
        )?;
        out[..required].copy_from_slice(bytemuck::cast_slice(&self.skinning));
        Ok(())
    }

    /// Model-space matrices from the last fill, after IK
    pub fn model_matrices(&self) -> &[Mat4] {
        self.composer.model_matrices()
    }

    /// Normalized progress of the clip playing on a layer, 0 when idle
    pub fn playback_progress(&self, layer: usize) -> f32 {
        self.layers
            .get(layer)
            .map_or(0.0, |l| l.state_machine().progress())
    }
}

impl Default for Animator {
    fn default() -> Self {
        Self::new(AnimatorConfig::default())
    }
}

//! Entity-facing side of the animation core
//!
//! `TransformProvider` is the read-only view of the scene the IK targets
//! are resolved against. `AnimationWorld` owns one animator per entity.

use super::animator::Animator;
use crate::core::{Error, Result};
use glam::Mat4;
use hecs::Entity;
use std::collections::HashMap;

/// World-space transform of an entity
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldTransform(pub Mat4);

/// Model-space joint matrices of an animated entity
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JointMatrices(pub Vec<Mat4>);

/// Lookup of transforms owned by something outside the animation core
pub trait TransformProvider {
    /// World transform of an entity, if it has one
    fn world_transform(&self, entity: Entity) -> Option<Mat4>;

    /// Model-space matrix of one of the entity's joints
    fn joint_transform(&self, _entity: Entity, _joint: usize) -> Option<Mat4> {
        None
    }
}

impl TransformProvider for hecs::World {
    fn world_transform(&self, entity: Entity) -> Option<Mat4> {
        self.get::<&WorldTransform>(entity).ok().map(|t| t.0)
    }

    fn joint_transform(&self, entity: Entity, joint: usize) -> Option<Mat4> {
        self.get::<&JointMatrices>(entity)
            .ok()
            .and_then(|joints| joints.0.get(joint).copied())
    }
}

/// Per-entity animator instances
#[derive(Default)]
pub struct AnimationWorld {
    animators: HashMap<Entity, Animator>,
}

impl AnimationWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an animator to `owner`, returning the one it replaces
    pub fn insert(&mut self, owner: Entity, animator: Animator) -> Option<Animator> {
        self.animators.insert(owner, animator)
    }

    pub fn remove(&mut self, owner: Entity) -> Option<Animator> {
        self.animators.remove(&owner)
    }

    pub fn get(&self, owner: Entity) -> Option<&Animator> {
        self.animators.get(&owner)
    }

    pub fn get_mut(&mut self, owner: Entity) -> Option<&mut Animator> {
        self.animators.get_mut(&owner)
    }

    pub fn len(&self) -> usize {
        self.animators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.animators.is_empty()
    }

    /// Advance every animator and re-resolve its IK targets
    pub fn update(&mut self, dt: f32, provider: &impl TransformProvider) {
        for (&owner, animator) in &mut self.animators {
            animator.update(dt);
            let owner_world = provider.world_transform(owner).unwrap_or(Mat4::IDENTITY);
            animator.resolve_ik_targets(owner_world, provider);
        }
    }

    /// Skinning matrices of the animator attached to `owner`
    pub fn fill_bone_matrices(&mut self, owner: Entity, out: &mut [Mat4]) -> Result<()> {
        self.animators
            .get_mut(&owner)
            .ok_or(Error::UnknownInstance)?
            .fill_bone_matrices(out)
    }
}

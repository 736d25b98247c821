//! Skinned model asset: a skeleton plus its named clips

use super::{Clip, Skeleton};
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only skeleton and clip set shared by every animator bound to it
#[derive(Clone, Debug)]
pub struct Model {
    skeleton: Skeleton,
    clips: Vec<Arc<Clip>>,
    clip_names: HashMap<String, usize>,
}

impl Model {
    pub fn new(skeleton: Skeleton) -> Self {
        Self {
            skeleton,
            clips: Vec::new(),
            clip_names: HashMap::new(),
        }
    }

    /// Add a clip; a clip with the same name is replaced
    pub fn add_clip(&mut self, clip: Clip) -> &mut Self {
        let clip = Arc::new(clip);
        match self.clip_names.get(clip.name()) {
            Some(&index) => self.clips[index] = clip,
            None => {
                self.clip_names.insert(clip.name().to_string(), self.clips.len());
                self.clips.push(clip);
            }
        }
        self
    }

    pub fn with_clip(mut self, clip: Clip) -> Self {
        self.add_clip(clip);
        self
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn bone_count(&self) -> usize {
        self.skeleton.bone_count()
    }

    pub fn clip(&self, name: &str) -> Option<Arc<Clip>> {
        self.clip_names.get(name).map(|&index| Arc::clone(&self.clips[index]))
    }

    /// Clips in insertion order
    pub fn clips(&self) -> impl Iterator<Item = &Arc<Clip>> {
        self.clips.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{ClipBuilder, SkeletonBuilder};
    use crate::core::Transform;

    #[test]
    fn test_clip_lookup() {
        let skeleton = SkeletonBuilder::new()
            .add_root("root", Transform::IDENTITY)
            .build()
            .unwrap();
        let model = Model::new(skeleton)
            .with_clip(ClipBuilder::new("walk", 30.0).duration(60.0).build())
            .with_clip(ClipBuilder::new("run", 30.0).duration(30.0).build());

        assert_eq!(model.bone_count(), 1);
        assert_eq!(model.clip("run").unwrap().duration_ticks(), 30.0);
        assert!(model.clip("jump").is_none());
        let names: Vec<&str> = model.clips().map(|c| c.name()).collect();
        assert_eq!(names, vec!["walk", "run"]);
    }

    #[test]
    fn test_clip_replacement() {
        let skeleton = SkeletonBuilder::new()
            .add_root("root", Transform::IDENTITY)
            .build()
            .unwrap();
        let model = Model::new(skeleton)
            .with_clip(ClipBuilder::new("walk", 30.0).duration(60.0).build())
            .with_clip(ClipBuilder::new("walk", 30.0).duration(90.0).build());

        assert_eq!(model.clips().count(), 1);
        assert_eq!(model.clip("walk").unwrap().duration_ticks(), 90.0);
    }
}

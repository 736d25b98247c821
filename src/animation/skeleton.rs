//! Bone hierarchy with bind pose and skinning offsets

use crate::core::{Error, Result, Transform};
use glam::Mat4;
use std::collections::HashMap;

/// Maximum number of bones per skeleton (GPU palette size)
pub const MAX_BONES: usize = 256;

/// A single bone in a skeletal hierarchy
#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub parent_index: Option<usize>,
    /// Rest transform relative to the parent bone
    pub bind: Transform,
    /// Inverse of the bind model-space matrix
    pub offset_matrix: Mat4,
}

impl Bone {
    /// Create a new bone with the given local bind transform.
    /// The offset matrix is calculated when the bone is added to a skeleton.
    pub fn new(name: impl Into<String>, parent_index: Option<usize>, bind: Transform) -> Self {
        Self {
            name: name.into(),
            parent_index,
            bind,
            offset_matrix: Mat4::IDENTITY,
        }
    }
}

/// A hierarchical skeleton stored parent-before-child
#[derive(Clone, Debug)]
pub struct Skeleton {
    bones: Vec<Bone>,
    bone_names: HashMap<String, usize>,
}

impl Skeleton {
    /// Create an empty skeleton
    pub fn new() -> Self {
        Self {
            bones: Vec::new(),
            bone_names: HashMap::new(),
        }
    }

    /// Add a bone, computing its offset matrix from the bind pose.
    ///
    /// The parent must already be present, which keeps the
    /// parent-before-child ordering every forward pass relies on.
    pub fn add_bone(&mut self, mut bone: Bone) -> Result<usize> {
        let bind_model = self.bind_model_matrix_for(&bone)?;
        bone.offset_matrix = bind_model.inverse();
        self.push_bone(bone)
    }

    /// Add a bone whose offset matrix was authored externally
    pub fn add_bone_with_offset(&mut self, bone: Bone) -> Result<usize> {
        self.bind_model_matrix_for(&bone)?;
        self.push_bone(bone)
    }

    fn bind_model_matrix_for(&self, bone: &Bone) -> Result<Mat4> {
        if self.bones.len() >= MAX_BONES {
            return Err(Error::InvalidSkeleton(format!(
                "maximum bone count ({}) exceeded",
                MAX_BONES
            )));
        }

        match bone.parent_index {
            Some(parent) if parent >= self.bones.len() => Err(Error::InvalidSkeleton(format!(
                "bone '{}' references parent {} before it exists",
                bone.name, parent
            ))),
            Some(parent) => Ok(self.bind_model_matrix(parent) * bone.bind.to_matrix()),
            None => Ok(bone.bind.to_matrix()),
        }
    }

    fn push_bone(&mut self, bone: Bone) -> Result<usize> {
        if self.bone_names.contains_key(&bone.name) {
            return Err(Error::InvalidSkeleton(format!(
                "bone name '{}' already exists",
                bone.name
            )));
        }

        let index = self.bones.len();
        self.bone_names.insert(bone.name.clone(), index);
        self.bones.push(bone);
        Ok(index)
    }

    /// Get the number of bones in the skeleton
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    /// Get a bone by index
    pub fn get_bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    /// Find a bone index by name
    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bone_names.get(name).copied()
    }

    /// Get the parent index of a bone
    pub fn parent_index(&self, bone_index: usize) -> Option<usize> {
        self.bones.get(bone_index)?.parent_index
    }

    /// Local bind transform of a bone (identity for out-of-range indices)
    pub fn bind_transform(&self, bone_index: usize) -> Transform {
        self.bones
            .get(bone_index)
            .map(|bone| bone.bind)
            .unwrap_or(Transform::IDENTITY)
    }

    /// Get all children of a bone
    pub fn children(&self, bone_index: usize) -> Vec<usize> {
        self.bones
            .iter()
            .enumerate()
            .filter_map(|(idx, bone)| {
                if bone.parent_index == Some(bone_index) {
                    Some(idx)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Compose local matrices into model space in a single forward pass.
    ///
    /// `local` and `model` must both hold at least `bone_count()` matrices.
    pub fn compose_model_matrices(&self, local: &[Mat4], model: &mut [Mat4]) {
        for (index, bone) in self.bones.iter().enumerate() {
            model[index] = match bone.parent_index {
                Some(parent_idx) => model[parent_idx] * local[index],
                None => local[index],
            };
        }
    }

    /// Model-space bind pose of every bone
    pub fn bind_model_matrices(&self) -> Vec<Mat4> {
        let local: Vec<Mat4> = self.bones.iter().map(|b| b.bind.to_matrix()).collect();
        let mut model = vec![Mat4::IDENTITY; self.bones.len()];
        self.compose_model_matrices(&local, &mut model);
        model
    }

    /// Model-space bind matrix for a single bone (walks up the hierarchy)
    pub fn bind_model_matrix(&self, bone_index: usize) -> Mat4 {
        let mut transform = Mat4::IDENTITY;
        let mut current_index = Some(bone_index);

        let mut chain = Vec::new();
        while let Some(idx) = current_index {
            chain.push(idx);
            current_index = self.bones[idx].parent_index;
        }

        for &idx in chain.iter().rev() {
            transform *= self.bones[idx].bind.to_matrix();
        }

        transform
    }
}

impl Default for Skeleton {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for name-addressed skeleton construction
pub struct SkeletonBuilder {
    skeleton: Skeleton,
    last_error: Option<Error>,
}

impl SkeletonBuilder {
    /// Create a new skeleton builder
    pub fn new() -> Self {
        Self {
            skeleton: Skeleton::new(),
            last_error: None,
        }
    }

    /// Add a root bone (no parent)
    pub fn add_root(mut self, name: &str, bind: Transform) -> Self {
        if self.last_error.is_some() {
            return self;
        }

        if let Err(e) = self.skeleton.add_bone(Bone::new(name, None, bind)) {
            self.last_error = Some(e);
        }
        self
    }

    /// Add a bone with a parent
    pub fn add_bone(mut self, name: &str, parent: &str, bind: Transform) -> Self {
        if self.last_error.is_some() {
            return self;
        }

        let Some(parent_index) = self.skeleton.find_bone(parent) else {
            self.last_error = Some(Error::InvalidSkeleton(format!(
                "parent bone '{}' not found",
                parent
            )));
            return self;
        };

        if let Err(e) = self.skeleton.add_bone(Bone::new(name, Some(parent_index), bind)) {
            self.last_error = Some(e);
        }
        self
    }

    /// Build the final skeleton
    pub fn build(self) -> Result<Skeleton> {
        if let Some(error) = self.last_error {
            Err(error)
        } else if self.skeleton.bones.is_empty() {
            Err(Error::InvalidSkeleton("skeleton must have at least one bone".into()))
        } else {
            Ok(self.skeleton)
        }
    }
}

impl Default for SkeletonBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    fn offset_y(y: f32) -> Transform {
        Transform::from_translation(Vec3::new(0.0, y, 0.0))
    }

    #[test]
    fn test_skeleton_add_bone() {
        let mut skeleton = Skeleton::new();

        let root_idx = skeleton.add_bone(Bone::new("root", None, Transform::IDENTITY)).unwrap();
        assert_eq!(root_idx, 0);
        assert_eq!(skeleton.bone_count(), 1);
        assert_eq!(skeleton.find_bone("root"), Some(0));
        assert_eq!(skeleton.find_bone("nonexistent"), None);
    }

    #[test]
    fn test_skeleton_hierarchy() {
        let mut skeleton = Skeleton::new();

        let root_idx = skeleton.add_bone(Bone::new("root", None, Transform::IDENTITY)).unwrap();
        let child1_idx = skeleton.add_bone(Bone::new("child1", Some(root_idx), offset_y(1.0))).unwrap();
        let child2_idx = skeleton.add_bone(Bone::new("child2", Some(root_idx), offset_y(1.0))).unwrap();
        skeleton.add_bone(Bone::new("grandchild", Some(child1_idx), offset_y(1.0))).unwrap();

        assert_eq!(skeleton.parent_index(child1_idx), Some(root_idx));

        let children = skeleton.children(root_idx);
        assert_eq!(children, vec![child1_idx, child2_idx]);
    }

    #[test]
    fn test_offset_matrix_is_inverse_bind() {
        let skeleton = SkeletonBuilder::new()
            .add_root("root", offset_y(1.0))
            .add_bone("spine", "root", offset_y(2.0))
            .build()
            .unwrap();

        let bind_model = skeleton.bind_model_matrices();
        for (bone, model) in skeleton.bones().iter().zip(bind_model.iter()) {
            let product = *model * bone.offset_matrix;
            assert!(product.abs_diff_eq(Mat4::IDENTITY, 1.0e-5));
        }
        let spine_pos = bind_model[1].w_axis.truncate();
        assert!((spine_pos - Vec3::new(0.0, 3.0, 0.0)).length() < 0.001);
    }

    #[test]
    fn test_composition_is_root_to_child() {
        let skeleton = SkeletonBuilder::new()
            .add_root("root", Transform::IDENTITY)
            .add_bone("mid", "root", Transform::from_translation(Vec3::X))
            .add_bone("tip", "mid", Transform::from_translation(Vec3::X))
            .build()
            .unwrap();

        let local = vec![
            Mat4::from_quat(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)),
            Mat4::from_translation(Vec3::X),
            Mat4::from_translation(Vec3::X),
        ];
        let mut model = vec![Mat4::IDENTITY; 3];
        skeleton.compose_model_matrices(&local, &mut model);

        // Root rotation of 90 degrees about Z carries the whole chain onto +Y
        let tip_pos = model[2].w_axis.truncate();
        assert!((tip_pos - Vec3::new(0.0, 2.0, 0.0)).length() < 0.001);
    }

    #[test]
    fn test_max_bones() {
        let mut skeleton = Skeleton::new();

        for i in 0..MAX_BONES {
            skeleton.add_bone(Bone::new(format!("bone_{}", i), None, Transform::IDENTITY)).unwrap();
        }

        let result = skeleton.add_bone(Bone::new("overflow", None, Transform::IDENTITY));
        assert!(matches!(result, Err(Error::InvalidSkeleton(_))));
    }

    #[test]
    fn test_skeleton_builder_invalid_parent() {
        let result = SkeletonBuilder::new()
            .add_root("root", Transform::IDENTITY)
            .add_bone("child", "nonexistent", Transform::IDENTITY)
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_bone_name() {
        let mut skeleton = Skeleton::new();
        skeleton.add_bone(Bone::new("root", None, Transform::IDENTITY)).unwrap();
        let result = skeleton.add_bone(Bone::new("root", None, Transform::IDENTITY));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_parent_index() {
        let mut skeleton = Skeleton::new();
        let result = skeleton.add_bone(Bone::new("orphan", Some(999), Transform::IDENTITY));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_builder_fails() {
        assert!(SkeletonBuilder::new().build().is_err());
    }
}

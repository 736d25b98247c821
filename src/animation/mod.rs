//! Skeletal animation system

pub mod skeleton;
pub mod clip;
pub mod model;
pub mod frame_cache;
pub mod state;
pub mod state_machine;
pub mod pose;
pub mod layer;
pub mod ik;
pub mod composer;
pub mod config;
pub mod animator;
pub mod world;

pub use skeleton::{Bone, Skeleton, SkeletonBuilder, MAX_BONES};
pub use clip::{Channel, Clip, ClipBuilder, KeyValue, Keyframe, PackedQuat};
pub use model::Model;
pub use frame_cache::{ChannelWindow, FrameCache, StateCache};
pub use state::ClipState;
pub use state_machine::{AnimNode, StateMachine, Transition};
pub use pose::{BlendMode, PoseBuffer};
pub use layer::Layer;
pub use ik::{FabrikSolver, IkConfig, IkOutcome, IkTarget, TargetSource, MAX_IK_CHAIN};
pub use composer::PoseComposer;
pub use config::AnimatorConfig;
pub use animator::{Animator, BASE_LAYER};
pub use world::{AnimationWorld, JointMatrices, TransformProvider, WorldTransform};

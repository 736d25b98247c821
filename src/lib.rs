//! Skelly - skeletal animation core
//!
//! Incremental keyframe sampling, layered state-machine blending and
//! FABRIK inverse kinematics, producing skinning matrices per frame.

pub mod core;
pub mod math;
pub mod animation;

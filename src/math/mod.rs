//! Mathematical utilities for keyframe interpolation

pub mod interp;

pub use interp::{align_hemisphere, catmull_rom, quat_exp, quat_log, squad};

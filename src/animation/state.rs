//! Clip sampler: plays one clip and evaluates per-joint poses from its frame cache

use super::clip::{Channel, Clip};
use super::frame_cache::{ChannelWindow, StateCache};
use super::pose::{BlendMode, PoseBuffer};
use super::{Model, Skeleton};
use crate::core::Transform;
use crate::math::{catmull_rom, squad};
use glam::{Quat, Vec3};
use std::sync::Arc;

/// Playback of a single clip inside a state machine.
///
/// The clip is resolved by name when the state is entered, so the same
/// state graph can be built before a model is bound.
#[derive(Clone, Debug)]
pub struct ClipState {
    clip_name: String,
    speed: f32,
    looping: bool,
    clip: Option<Arc<Clip>>,
    cache: Option<StateCache>,
    finished: bool,
}

impl ClipState {
    pub fn new(clip_name: impl Into<String>) -> Self {
        Self {
            clip_name: clip_name.into(),
            speed: 1.0,
            looping: true,
            clip: None,
            cache: None,
            finished: false,
        }
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn clip_name(&self) -> &str {
        &self.clip_name
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Set the playback speed multiplier (negative plays backwards)
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Resolve the clip and allocate a fresh cache sized to the skeleton
    pub fn enter(&mut self, model: &Model) {
        self.clip = model.clip(&self.clip_name);
        if self.clip.is_none() {
            log::warn!("Clip '{}' not found in model, state will hold the bind pose", self.clip_name);
        }

        let mut cache = StateCache::new(model.bone_count());
        cache.reset(self.clip.as_deref());
        self.cache = Some(cache);
        self.finished = false;
    }

    /// Release the cache
    pub fn exit(&mut self) {
        self.cache = None;
        self.finished = false;
    }

    pub fn is_entered(&self) -> bool {
        self.cache.is_some()
    }

    /// True once a non-looping clip has reached its end
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Advance playback by `dt` seconds
    pub fn update(&mut self, dt: f32) {
        let Some(rate) = self.clip.as_ref().map(|c| c.ticks_per_second()) else {
            return;
        };
        let Some(ticks) = self.cache.as_ref().map(|c| c.ticks()) else {
            return;
        };
        self.set_ticks(ticks + dt * self.speed * rate);
    }

    /// Jump to an absolute time in seconds
    pub fn seek(&mut self, seconds: f32) {
        let Some(rate) = self.clip.as_ref().map(|c| c.ticks_per_second()) else {
            return;
        };
        self.set_ticks(seconds * rate);
    }

    fn set_ticks(&mut self, mut ticks: f32) {
        let (Some(clip), Some(cache)) = (self.clip.as_deref(), self.cache.as_mut()) else {
            return;
        };

        let duration = clip.duration_ticks();
        if duration <= 0.0 {
            ticks = 0.0;
        } else if ticks > duration {
            if self.looping {
                ticks %= duration;
                cache.reset(Some(clip));
                log::trace!("Clip '{}' wrapped to tick {}", clip.name(), ticks);
            } else {
                ticks = duration;
            }
        } else if ticks < 0.0 {
            ticks = if self.looping { ticks.rem_euclid(duration) } else { 0.0 };
        }

        // The cursor only moves forward, so rewinding rebuilds from the start
        if ticks < cache.ticks() {
            cache.reset(Some(clip));
        }
        cache.advance_to(clip, ticks);
        self.finished = !self.looping && duration > 0.0 && ticks >= duration;
    }

    /// Current playback position in clip ticks
    pub fn ticks(&self) -> f32 {
        self.cache.as_ref().map(|c| c.ticks()).unwrap_or(0.0)
    }

    /// Clip duration in seconds, zero without a resolved clip
    pub fn duration_seconds(&self) -> f32 {
        self.clip.as_ref().map(|c| c.duration_seconds()).unwrap_or(0.0)
    }

    /// Normalized playback position.
    ///
    /// Looping clips stay below 1.0; a finished non-looping clip reads 1.0.
    pub fn progress(&self) -> f32 {
        match self.clip.as_deref() {
            Some(clip) if clip.duration_ticks() > 0.0 => {
                let duration = clip.duration_ticks();
                let ticks = if self.looping { self.ticks() % duration } else { self.ticks() };
                ticks / duration
            }
            _ => 0.0,
        }
    }

    /// Sample the local transform of one joint at the current time.
    ///
    /// Channels without any resolved key fall back to the bind pose.
    pub fn evaluate_joint(&self, joint: usize, skeleton: &Skeleton) -> Transform {
        let bind = skeleton.bind_transform(joint);
        let (Some(clip), Some(cache)) = (self.clip.as_deref(), self.cache.as_ref()) else {
            return bind;
        };
        let Some(frame) = cache.frame(joint) else {
            return bind;
        };
        let ticks = cache.ticks();

        Transform {
            translation: sample_vector(clip, frame.window(Channel::Translation), ticks)
                .unwrap_or(bind.translation),
            rotation: sample_rotation(clip, frame.window(Channel::Rotation), ticks)
                .unwrap_or(bind.rotation),
            scale: sample_vector(clip, frame.window(Channel::Scale), ticks)
                .unwrap_or(bind.scale),
        }
    }

    /// Accumulate this state's sample for `joint` into the pose
    pub fn evaluate(
        &self,
        joint: usize,
        pose: &mut PoseBuffer,
        weight: f32,
        mode: BlendMode,
        skeleton: &Skeleton,
    ) {
        let sample = self.evaluate_joint(joint, skeleton);
        pose.accumulate(joint, &sample, weight, mode, &skeleton.bind_transform(joint));
    }
}

/// Interpolation parameter of `ticks` between keys `from` and `to`
fn segment_param(clip: &Clip, from: u32, to: u32, ticks: f32) -> f32 {
    let start = clip.keyframe(from).time;
    let span = clip.keyframe(to).time - start;
    if span <= f32::EPSILON {
        return 0.0;
    }
    ((ticks - start) / span).clamp(0.0, 1.0)
}

fn sample_vector(clip: &Clip, window: &ChannelWindow, ticks: f32) -> Option<Vec3> {
    let value = |index: u32| clip.keyframe(index).vector();
    match (window.prev(), window.current(), window.next(), window.after()) {
        (Some(p), Some(c), Some(n), Some(a)) => {
            let t = segment_param(clip, c, n, ticks);
            Some(catmull_rom(value(p)?, value(c)?, value(n)?, value(a)?, t))
        }
        (_, Some(c), Some(n), _) => {
            let t = segment_param(clip, c, n, ticks);
            Some(value(c)?.lerp(value(n)?, t))
        }
        // Past the last key
        (_, Some(c), None, _) => value(c),
        // Before the first key, or the only key
        (_, None, Some(n), _) => value(n),
        _ => None,
    }
}

fn sample_rotation(clip: &Clip, window: &ChannelWindow, ticks: f32) -> Option<Quat> {
    let value = |index: u32| clip.keyframe(index).quat();
    match (window.prev(), window.current(), window.next(), window.after()) {
        (Some(p), Some(c), Some(n), Some(a)) => {
            let t = segment_param(clip, c, n, ticks);
            Some(squad(value(p)?, value(c)?, value(n)?, value(a)?, t))
        }
        (_, Some(c), Some(n), _) => {
            let t = segment_param(clip, c, n, ticks);
            Some(value(c)?.slerp(value(n)?, t))
        }
        (_, Some(c), None, _) => value(c),
        (_, None, Some(n), _) => value(n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{ClipBuilder, Keyframe, SkeletonBuilder};

    fn x(v: f32) -> Vec3 {
        Vec3::new(v, 0.0, 0.0)
    }

    fn model_with(clip: Clip) -> Model {
        let skeleton = SkeletonBuilder::new()
            .add_root("root", Transform::from_translation(Vec3::new(0.0, 5.0, 0.0)))
            .add_bone("child", "root", Transform::from_translation(Vec3::Y))
            .build()
            .unwrap();
        Model::new(skeleton).with_clip(clip)
    }

    fn entered(model: &Model, clip: &str) -> ClipState {
        let mut state = ClipState::new(clip);
        state.enter(model);
        state
    }

    #[test]
    fn test_single_keyframe_hold() {
        let model = model_with(
            ClipBuilder::new("pose", 10.0)
                .duration(20.0)
                .keyframe(Keyframe::translation(0, 0.0, Vec3::new(1.0, 2.0, 3.0)))
                .build(),
        );
        let mut state = entered(&model, "pose");

        for _ in 0..10 {
            let t = state.evaluate_joint(0, model.skeleton());
            assert_eq!(t.translation, Vec3::new(1.0, 2.0, 3.0));
            state.update(0.35);
        }
    }

    #[test]
    fn test_linear_interpolation_exact() {
        let v0 = Vec3::new(0.0, 1.0, -2.0);
        let v1 = Vec3::new(2.0, 4.0, 6.0);
        let model = model_with(
            ClipBuilder::new("slide", 10.0)
                .keyframe(Keyframe::translation(0, 0.0, v0))
                .keyframe(Keyframe::translation(0, 10.0, v1))
                .build(),
        );
        let mut state = entered(&model, "slide");
        state.update(0.5);

        assert_eq!(state.ticks(), 5.0);
        let t = state.evaluate_joint(0, model.skeleton());
        assert_eq!(t.translation, v0.lerp(v1, 0.5));
    }

    #[test]
    fn test_missing_channels_use_bind_pose() {
        let model = model_with(
            ClipBuilder::new("slide", 10.0)
                .keyframe(Keyframe::translation(0, 0.0, x(0.0)))
                .keyframe(Keyframe::translation(0, 10.0, x(1.0)))
                .build(),
        );
        let mut state = entered(&model, "slide");
        state.update(0.5);

        let root = state.evaluate_joint(0, model.skeleton());
        assert_eq!(root.rotation, Quat::IDENTITY);
        assert_eq!(root.scale, Vec3::ONE);

        // No keys at all for the child joint
        let child = state.evaluate_joint(1, model.skeleton());
        assert_eq!(child, model.skeleton().bind_transform(1));
    }

    #[test]
    fn test_unknown_clip_holds_bind_pose() {
        let model = model_with(ClipBuilder::new("walk", 10.0).duration(10.0).build());
        let mut state = entered(&model, "missing");
        state.update(1.0);

        assert_eq!(state.duration_seconds(), 0.0);
        assert_eq!(state.progress(), 0.0);
        assert_eq!(state.evaluate_joint(0, model.skeleton()), model.skeleton().bind_transform(0));
    }

    #[test]
    fn test_cubic_translation_hits_keys() {
        let model = model_with(
            ClipBuilder::new("wave", 10.0)
                .keyframe(Keyframe::translation(0, 0.0, x(0.0)))
                .keyframe(Keyframe::translation(0, 10.0, x(1.0)))
                .keyframe(Keyframe::translation(0, 20.0, x(4.0)))
                .keyframe(Keyframe::translation(0, 30.0, x(9.0)))
                .build(),
        );
        let mut state = entered(&model, "wave");

        // Exactly on the second key with all four window slots populated
        state.seek(1.0);
        let t = state.evaluate_joint(0, model.skeleton());
        assert!((t.translation.x - 1.0).abs() < 1.0e-5);

        // Between keys the spline differs from the chord
        state.seek(1.5);
        let t = state.evaluate_joint(0, model.skeleton());
        assert!(t.translation.x > 2.0 && t.translation.x < 2.5);
    }

    #[test]
    fn test_rotation_slerp() {
        let model = model_with(
            ClipBuilder::new("turn", 10.0)
                .keyframe(Keyframe::rotation(0, 0.0, Quat::IDENTITY))
                .keyframe(Keyframe::rotation(0, 10.0, Quat::from_rotation_y(1.0)))
                .build(),
        );
        let mut state = entered(&model, "turn");
        state.update(0.5);

        let t = state.evaluate_joint(0, model.skeleton());
        assert!(t.rotation.angle_between(Quat::from_rotation_y(0.5)) < 1.0e-3);
    }

    #[test]
    fn test_loop_wrap_matches_fresh_reset() {
        let clip = ClipBuilder::new("cycle", 10.0)
            .keyframe(Keyframe::translation(0, 0.0, x(0.0)))
            .keyframe(Keyframe::translation(0, 10.0, x(3.0)))
            .keyframe(Keyframe::translation(0, 20.0, x(1.0)))
            .keyframe(Keyframe::translation(0, 30.0, x(4.0)))
            .keyframe(Keyframe::translation(0, 40.0, x(0.0)))
            .keyframe(Keyframe::rotation(0, 0.0, Quat::IDENTITY))
            .keyframe(Keyframe::rotation(0, 20.0, Quat::from_rotation_z(1.0)))
            .keyframe(Keyframe::rotation(0, 40.0, Quat::IDENTITY))
            .build();
        let model = model_with(clip);

        let mut continued = entered(&model, "cycle");
        continued.update(1.5);
        continued.update(1.5);
        continued.update(1.5);
        assert_eq!(continued.ticks(), 5.0);

        let mut fresh = entered(&model, "cycle");
        fresh.update(0.5);
        assert_eq!(fresh.ticks(), 5.0);

        assert_eq!(
            continued.evaluate_joint(0, model.skeleton()),
            fresh.evaluate_joint(0, model.skeleton())
        );
    }

    #[test]
    fn test_walk_scenario() {
        let model = model_with(
            ClipBuilder::new("walk", 10.0)
                .keyframe(Keyframe::translation(0, 0.0, x(0.0)))
                .keyframe(Keyframe::translation(0, 10.0, x(1.0)))
                .keyframe(Keyframe::translation(0, 20.0, x(0.0)))
                .build(),
        );
        let mut state = entered(&model, "walk");

        state.update(1.0);
        state.update(1.0);
        state.update(1.0);

        assert_eq!(state.ticks(), 10.0);
        let t = state.evaluate_joint(0, model.skeleton());
        assert_eq!(t.translation.x, 1.0);
    }

    #[test]
    fn test_non_looping_clamps_at_end() {
        let model = model_with(
            ClipBuilder::new("jump", 10.0)
                .keyframe(Keyframe::translation(0, 0.0, x(0.0)))
                .keyframe(Keyframe::translation(0, 10.0, x(2.0)))
                .build(),
        );
        let mut state = ClipState::new("jump").with_looping(false);
        state.enter(&model);

        state.update(0.5);
        assert!(!state.is_finished());
        state.update(5.0);
        assert!(state.is_finished());
        assert_eq!(state.ticks(), 10.0);
        assert_eq!(state.progress(), 1.0);
        assert_eq!(state.evaluate_joint(0, model.skeleton()).translation, x(2.0));
    }

    #[test]
    fn test_backward_scrub_resamples() {
        let model = model_with(
            ClipBuilder::new("slide", 10.0)
                .keyframe(Keyframe::translation(0, 0.0, x(0.0)))
                .keyframe(Keyframe::translation(0, 10.0, x(1.0)))
                .keyframe(Keyframe::translation(0, 20.0, x(2.0)))
                .build(),
        );
        let mut state = entered(&model, "slide");

        state.seek(1.5);
        state.seek(0.5);
        assert_eq!(state.ticks(), 5.0);
        let t = state.evaluate_joint(0, model.skeleton());
        assert!((t.translation.x - 0.5).abs() < 1.0e-6);

        state.set_speed(-1.0);
        state.update(0.25);
        let t = state.evaluate_joint(0, model.skeleton());
        assert!((t.translation.x - 0.25).abs() < 1.0e-6);
    }

    #[test]
    fn test_exit_releases_cache() {
        let model = model_with(ClipBuilder::new("walk", 10.0).duration(10.0).build());
        let mut state = entered(&model, "walk");
        assert!(state.is_entered());
        state.exit();
        assert!(!state.is_entered());
        assert_eq!(state.ticks(), 0.0);
    }

    #[test]
    fn test_looping_progress_stays_below_one() {
        let model = model_with(
            ClipBuilder::new("walk", 10.0)
                .keyframe(Keyframe::translation(0, 0.0, x(0.0)))
                .keyframe(Keyframe::translation(0, 20.0, x(1.0)))
                .build(),
        );
        let mut state = entered(&model, "walk");
        state.update(2.0);
        assert_eq!(state.ticks(), 20.0);
        assert_eq!(state.progress(), 0.0);

        let mut once = ClipState::new("walk").with_looping(false);
        once.enter(&model);
        once.update(2.0);
        assert_eq!(once.progress(), 1.0);
    }

    #[test]
    fn test_rotation_squad_between_inner_keys() {
        let model = model_with(
            ClipBuilder::new("spin", 10.0)
                .keyframe(Keyframe::rotation(0, 0.0, Quat::from_rotation_z(0.0)))
                .keyframe(Keyframe::rotation(0, 10.0, Quat::from_rotation_z(0.4)))
                .keyframe(Keyframe::rotation(0, 20.0, Quat::from_rotation_z(0.8)))
                .keyframe(Keyframe::rotation(0, 30.0, Quat::from_rotation_z(1.2)))
                .build(),
        );
        let mut state = entered(&model, "spin");
        state.seek(1.5);

        let window = state.cache.as_ref().unwrap().frame(0).unwrap().window(Channel::Rotation);
        assert!(window.slots().iter().all(|slot| slot.is_some()));

        // Evenly spaced keys about one axis: the spline follows the arc
        let rotation = state.evaluate_joint(0, model.skeleton()).rotation;
        assert!(rotation.is_normalized());
        assert!(rotation.angle_between(Quat::from_rotation_z(0.6)) < 1.0e-3);
    }
}

//! Incremental keyframe windows for clip sampling
//!
//! Every joint keeps one 4-slot window per channel holding the keyframe
//! indices `[i-1, i, i+1, i+2]`, where `i` is the last key of that
//! joint/channel at or before the current sample time. All windows of a
//! clip state share one cursor into the clip's flat keyframe array, so
//! catching up by a time step only visits the keys crossed during it.
//!
//! The cursor only moves forward. Rewinding requires a fresh `reset`.

use super::clip::{Channel, Clip};

/// Slots of a channel window
pub const WINDOW_SLOTS: usize = 4;

const PREV: usize = 0;
const CURRENT: usize = 1;
const NEXT: usize = 2;
const AFTER: usize = 3;

/// Four keyframe indices bracketing the sample time for one joint/channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelWindow {
    slots: [Option<u32>; WINDOW_SLOTS],
}

impl ChannelWindow {
    /// Mark every slot absent
    pub fn reset(&mut self) {
        self.slots = [None; WINDOW_SLOTS];
    }

    /// Load the channel's first keys as look-ahead, before any key is crossed
    fn prime(&mut self, first: Option<u32>, clip: &Clip) {
        self.reset();
        self.slots[NEXT] = first;
        self.slots[AFTER] = first.and_then(|k| clip.next_key(k));
    }

    /// Shift the window so `index` becomes the current key
    fn cross(&mut self, index: u32, clip: &Clip) {
        let next = clip.next_key(index);
        self.slots = [
            self.slots[CURRENT],
            Some(index),
            next,
            next.and_then(|k| clip.next_key(k)),
        ];
    }

    pub fn slots(&self) -> [Option<u32>; WINDOW_SLOTS] {
        self.slots
    }

    pub fn prev(&self) -> Option<u32> {
        self.slots[PREV]
    }

    pub fn current(&self) -> Option<u32> {
        self.slots[CURRENT]
    }

    pub fn next(&self) -> Option<u32> {
        self.slots[NEXT]
    }

    pub fn after(&self) -> Option<u32> {
        self.slots[AFTER]
    }
}

/// Channel windows for a single joint
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameCache {
    channels: [ChannelWindow; Channel::COUNT],
}

impl FrameCache {
    pub fn reset(&mut self) {
        for window in &mut self.channels {
            window.reset();
        }
    }

    fn prime(&mut self, joint: usize, clip: &Clip) {
        for channel in Channel::ALL {
            self.channels[channel.index()].prime(clip.first_key(joint, channel), clip);
        }
    }

    #[inline]
    pub fn window(&self, channel: Channel) -> &ChannelWindow {
        &self.channels[channel.index()]
    }
}

/// Playback position and per-joint windows of one clip state
#[derive(Clone, Debug)]
pub struct StateCache {
    ticks: f32,
    cursor: usize,
    frames: Vec<FrameCache>,
}

impl StateCache {
    pub fn new(joint_count: usize) -> Self {
        Self {
            ticks: 0.0,
            cursor: 0,
            frames: vec![FrameCache::default(); joint_count],
        }
    }

    /// Rewind to tick zero. Windows are cleared, then primed with each
    /// channel's first keys when a clip is given.
    pub fn reset(&mut self, clip: Option<&Clip>) {
        self.ticks = 0.0;
        self.cursor = 0;
        for (joint, frame) in self.frames.iter_mut().enumerate() {
            frame.reset();
            if let Some(clip) = clip {
                frame.prime(joint, clip);
            }
        }
    }

    /// Cross every key with `time <= ticks` starting at the cursor.
    ///
    /// Keys for joints outside the skeleton are skipped.
    pub fn advance_to(&mut self, clip: &Clip, ticks: f32) {
        let keys = clip.keyframes();
        while let Some(key) = keys.get(self.cursor) {
            if key.time > ticks {
                break;
            }
            if let Some(frame) = self.frames.get_mut(key.joint) {
                frame.channels[key.channel().index()].cross(self.cursor as u32, clip);
            }
            self.cursor += 1;
        }
        self.ticks = ticks;
    }

    pub fn ticks(&self) -> f32 {
        self.ticks
    }

    /// Next untested index in the clip's keyframe array
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn joint_count(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn frame(&self, joint: usize) -> Option<&FrameCache> {
        self.frames.get(joint)
    }
}

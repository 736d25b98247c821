//! Animation clips stored as one time-ordered flat keyframe array

use super::MAX_BONES;
use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Which part of a joint transform a keyframe drives
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Translation,
    Rotation,
    Scale,
}

impl Channel {
    pub const COUNT: usize = 3;
    pub const ALL: [Channel; Self::COUNT] = [Channel::Translation, Channel::Rotation, Channel::Scale];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Channel::Translation => 0,
            Channel::Rotation => 1,
            Channel::Scale => 2,
        }
    }
}

const PACK_SCALE: f32 = i16::MAX as f32;

/// Unit quaternion packed into three signed 16-bit components.
///
/// The scalar part is dropped and rebuilt as non-negative on unpack, so
/// rotations are canonicalized to the `w >= 0` hemisphere when packed.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
pub struct PackedQuat {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl PackedQuat {
    pub fn pack(rotation: Quat) -> Self {
        let q = rotation.normalize();
        let q = if q.w < 0.0 { -q } else { q };
        let quantize = |c: f32| (c.clamp(-1.0, 1.0) * PACK_SCALE).round() as i16;
        Self {
            x: quantize(q.x),
            y: quantize(q.y),
            z: quantize(q.z),
        }
    }

    pub fn unpack(self) -> Quat {
        let x = self.x as f32 / PACK_SCALE;
        let y = self.y as f32 / PACK_SCALE;
        let z = self.z as f32 / PACK_SCALE;
        let w = (1.0 - (x * x + y * y + z * z)).max(0.0).sqrt();
        Quat::from_xyzw(x, y, z, w).normalize()
    }
}

impl From<Quat> for PackedQuat {
    fn from(rotation: Quat) -> Self {
        Self::pack(rotation)
    }
}

/// Keyframe payload; the variant doubles as the channel tag
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum KeyValue {
    Translation(Vec3),
    Rotation(PackedQuat),
    Scale(Vec3),
}

/// A timestamped value for one joint/channel
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub joint: usize,
    /// Time in clip ticks
    pub time: f32,
    pub value: KeyValue,
}

impl Keyframe {
    pub fn translation(joint: usize, time: f32, value: Vec3) -> Self {
        Self {
            joint,
            time,
            value: KeyValue::Translation(value),
        }
    }

    pub fn rotation(joint: usize, time: f32, value: Quat) -> Self {
        Self {
            joint,
            time,
            value: KeyValue::Rotation(PackedQuat::pack(value)),
        }
    }

    pub fn scale(joint: usize, time: f32, value: Vec3) -> Self {
        Self {
            joint,
            time,
            value: KeyValue::Scale(value),
        }
    }

    pub fn channel(&self) -> Channel {
        match self.value {
            KeyValue::Translation(_) => Channel::Translation,
            KeyValue::Rotation(_) => Channel::Rotation,
            KeyValue::Scale(_) => Channel::Scale,
        }
    }

    /// Vector payload of a translation or scale key
    pub fn vector(&self) -> Option<Vec3> {
        match self.value {
            KeyValue::Translation(v) | KeyValue::Scale(v) => Some(v),
            KeyValue::Rotation(_) => None,
        }
    }

    /// Unpacked payload of a rotation key
    pub fn quat(&self) -> Option<Quat> {
        match self.value {
            KeyValue::Rotation(q) => Some(q.unpack()),
            _ => None,
        }
    }
}

/// Immutable animation clip, shared by every instance playing it.
///
/// Besides the flat keyframe array the clip keeps two link tables built
/// once at construction: the first key of every joint/channel and, for
/// every key, the next key of the same joint/channel. Frame caches use
/// them to fill their look-ahead slots without rescanning.
#[derive(Clone, Debug)]
pub struct Clip {
    name: String,
    duration_ticks: f32,
    ticks_per_second: f32,
    keyframes: Vec<Keyframe>,
    next_in_channel: Vec<Option<u32>>,
    first_in_channel: Vec<[Option<u32>; Channel::COUNT]>,
}

impl Clip {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration_ticks(&self) -> f32 {
        self.duration_ticks
    }

    pub fn ticks_per_second(&self) -> f32 {
        self.ticks_per_second
    }

    /// Duration in seconds, zero for a clip without a valid tick rate
    pub fn duration_seconds(&self) -> f32 {
        if self.ticks_per_second > 0.0 {
            self.duration_ticks / self.ticks_per_second
        } else {
            0.0
        }
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    #[inline]
    pub fn keyframe(&self, index: u32) -> &Keyframe {
        &self.keyframes[index as usize]
    }

    /// Number of joints referenced by any keyframe
    pub fn joint_count(&self) -> usize {
        self.first_in_channel.len()
    }

    /// Index of the earliest key for a joint/channel
    #[inline]
    pub fn first_key(&self, joint: usize, channel: Channel) -> Option<u32> {
        self.first_in_channel.get(joint)?[channel.index()]
    }

    /// Index of the key following `index` on the same joint/channel
    #[inline]
    pub fn next_key(&self, index: u32) -> Option<u32> {
        self.next_in_channel.get(index as usize).copied().flatten()
    }
}

/// Builder keeping keyframes time-sorted as they are added
pub struct ClipBuilder {
    name: String,
    ticks_per_second: f32,
    duration_ticks: Option<f32>,
    keyframes: Vec<Keyframe>,
}

impl ClipBuilder {
    pub fn new(name: impl Into<String>, ticks_per_second: f32) -> Self {
        Self {
            name: name.into(),
            ticks_per_second,
            duration_ticks: None,
            keyframes: Vec::new(),
        }
    }

    /// Set an explicit duration; otherwise the last keyframe time is used
    pub fn duration(mut self, ticks: f32) -> Self {
        self.duration_ticks = Some(ticks);
        self
    }

    /// Add a keyframe (keys with equal time keep insertion order)
    pub fn keyframe(mut self, keyframe: Keyframe) -> Self {
        self.add_keyframe(keyframe);
        self
    }

    pub fn keyframes(mut self, keyframes: impl IntoIterator<Item = Keyframe>) -> Self {
        for keyframe in keyframes {
            self.add_keyframe(keyframe);
        }
        self
    }

    pub fn add_keyframe(&mut self, keyframe: Keyframe) {
        let pos = self.keyframes.partition_point(|k| k.time <= keyframe.time);
        self.keyframes.insert(pos, keyframe);
    }

    /// Finish the clip. Keys addressing joints past `MAX_BONES` are dropped.
    pub fn build(mut self) -> Clip {
        let total = self.keyframes.len();
        self.keyframes.retain(|k| k.joint < MAX_BONES);
        if self.keyframes.len() < total {
            log::warn!(
                "Clip '{}': dropped {} keys for joints beyond {}",
                self.name,
                total - self.keyframes.len(),
                MAX_BONES
            );
        }

        let joint_count = self
            .keyframes
            .iter()
            .map(|k| k.joint + 1)
            .max()
            .unwrap_or(0);

        let mut first_in_channel = vec![[None; Channel::COUNT]; joint_count];
        let mut last_in_channel: Vec<[Option<u32>; Channel::COUNT]> =
            vec![[None; Channel::COUNT]; joint_count];
        let mut next_in_channel = vec![None; self.keyframes.len()];

        for (index, key) in self.keyframes.iter().enumerate() {
            let index = index as u32;
            let channel = key.channel().index();
            match last_in_channel[key.joint][channel] {
                Some(prev) => next_in_channel[prev as usize] = Some(index),
                None => first_in_channel[key.joint][channel] = Some(index),
            }
            last_in_channel[key.joint][channel] = Some(index);
        }

        let duration_ticks = self.duration_ticks.unwrap_or_else(|| {
            self.keyframes.last().map(|k| k.time).unwrap_or(0.0)
        });

        Clip {
            name: self.name,
            duration_ticks,
            ticks_per_second: self.ticks_per_second,
            keyframes: self.keyframes,
            next_in_channel,
            first_in_channel,
        }
    }
}

use crate::config::ToneConfig;
use crate::{BITFLAG_CHANNELS, NIBBLE_CHANNELS};
use serde::{Deserialize, Serialize};

// Channel plan
//
// Channels are numbered from 1 and spread linearly over [min, max]:
//   f(i) = min + (i - 1) * (max - min) / (count - 1)
//
// Roles (nibble scheme, 19 channels):
// - 1:     preamble / postamble marker
// - 2:     byte separator
// - 3:     training only
// - 4..19: data nibble, value = id - 4
//
// Roles (bit-flag scheme, 10 channels):
// - 1:     preamble / postamble marker
// - 2:     byte separator
// - 3..10: one bit each, channel 3 carries the most significant bit

/// A channel identifier (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(u8);

impl Channel {
    pub const MARKER: Channel = Channel(1);
    pub const SEPARATOR: Channel = Channel(2);
    pub const TRAINING: Channel = Channel(3);

    /// Channel carrying nibble value 0
    const NIBBLE_BASE: u8 = 4;
    /// Channel carrying bit 7 in the bit-flag scheme
    const BIT_BASE: u8 = 3;

    pub const fn new(id: u8) -> Self {
        Channel(id)
    }

    pub const fn id(self) -> u8 {
        self.0
    }

    /// Data channel for a nibble value (only the low 4 bits are used)
    pub fn for_nibble(nibble: u8) -> Self {
        Channel(Self::NIBBLE_BASE + (nibble & 0x0F))
    }

    /// Data channel for a bit position, 0 being the most significant bit
    pub fn for_bit(bit: u8) -> Self {
        Channel(Self::BIT_BASE + (bit & 0x07))
    }

    fn index(self) -> usize {
        (self.0 as usize).saturating_sub(1)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

/// What a channel means to the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// Preamble or postamble
    Marker,
    Separator,
    TrainingOnly,
    /// Data nibble with its value (0-15)
    Nibble(u8),
    /// Bit-flag data with its bit position (0 = most significant)
    Bit(u8),
}

/// Byte-to-tone mapping in use, selected by the channel count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Two nibble tones and a separator per byte
    Nibble,
    /// One tone per set bit and a separator per byte
    BitFlag,
}

impl Scheme {
    pub fn for_channel_count(count: usize) -> Option<Self> {
        match count {
            NIBBLE_CHANNELS => Some(Scheme::Nibble),
            BITFLAG_CHANNELS => Some(Scheme::BitFlag),
            _ => None,
        }
    }

    pub fn channel_count(self) -> usize {
        match self {
            Scheme::Nibble => NIBBLE_CHANNELS,
            Scheme::BitFlag => BITFLAG_CHANNELS,
        }
    }

    pub fn role(self, channel: Channel) -> Option<ChannelRole> {
        let id = channel.id();
        match (self, id) {
            (_, 1) => Some(ChannelRole::Marker),
            (_, 2) => Some(ChannelRole::Separator),
            (Scheme::Nibble, 3) => Some(ChannelRole::TrainingOnly),
            (Scheme::Nibble, 4..=19) => Some(ChannelRole::Nibble(id - Channel::NIBBLE_BASE)),
            (Scheme::BitFlag, 3..=10) => Some(ChannelRole::Bit(id - Channel::BIT_BASE)),
            _ => None,
        }
    }

    /// Tones following the preamble: every non-marker channel once, ascending
    pub fn training_sequence(self) -> Vec<Channel> {
        (2..=self.channel_count() as u8).map(Channel::new).collect()
    }
}

/// Nominal channel frequencies, evenly spaced over the operating range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMap {
    count: usize,
    min_frequency: f32,
    max_frequency: f32,
}

impl ChannelMap {
    pub fn new(count: usize, min_frequency: f32, max_frequency: f32) -> Self {
        Self {
            count,
            min_frequency,
            max_frequency,
        }
    }

    pub fn from_config(config: &ToneConfig) -> Self {
        Self::new(config.channel_count, config.min_frequency, config.max_frequency)
    }

    pub fn channel_count(&self) -> usize {
        self.count
    }

    pub fn min_frequency(&self) -> f32 {
        self.min_frequency
    }

    pub fn max_frequency(&self) -> f32 {
        self.max_frequency
    }

    fn steps(&self) -> usize {
        self.count.saturating_sub(1).max(1)
    }

    /// Distance between adjacent channels in Hz
    pub fn spacing(&self) -> f32 {
        (self.max_frequency - self.min_frequency) / self.steps() as f32
    }

    /// Nominal frequency of a channel
    pub fn frequency(&self, channel: Channel) -> f32 {
        // Multiply before dividing so the last channel lands exactly on max
        self.min_frequency
            + (self.max_frequency - self.min_frequency) * channel.index() as f32
                / self.steps() as f32
    }

    pub fn contains(&self, channel: Channel) -> bool {
        channel.id() >= 1 && (channel.id() as usize) <= self.count
    }

    /// All channels in ascending order
    pub fn channels(&self) -> impl Iterator<Item = Channel> {
        (1..=self.count as u8).map(Channel::new)
    }

    /// Closest nominal channel, if it lies within `tolerance` Hz
    pub fn nearest(&self, frequency: f32, tolerance: f32) -> Option<Channel> {
        if !frequency.is_finite() || self.count == 0 {
            return None;
        }
        let position = ((frequency - self.min_frequency) / self.spacing()).round();
        let index = position.clamp(0.0, (self.count - 1) as f32) as u8;
        let channel = Channel::new(index + 1);
        if (frequency - self.frequency(channel)).abs() <= tolerance {
            Some(channel)
        } else {
            None
        }
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self::from_config(&ToneConfig::default())
    }
}

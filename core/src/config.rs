use crate::channel::{ChannelMap, Scheme};
use crate::error::{Result, ToneError};
use crate::{
    BITFLAG_CHANNELS, DEFAULT_CHANNEL_DURATION, DEFAULT_FREQUENCY_TOLERANCE,
    DEFAULT_MAX_FREQUENCY, DEFAULT_MIN_FREQUENCY, DEFAULT_PREAMBLE_DURATION,
    LEGACY_FREQUENCY_TOLERANCE, LEGACY_MAX_FREQUENCY, LEGACY_MIN_FREQUENCY, NIBBLE_CHANNELS,
    PREAMBLE_DETECTION_FACTOR,
};
use serde::{Deserialize, Serialize};

/// Operating parameters shared by the encoder and decoder of one link
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    /// Number of channels (19 selects the nibble scheme, 10 the bit-flag scheme)
    pub channel_count: usize,
    /// Frequency of channel 1 in Hz
    pub min_frequency: f32,
    /// Frequency of the last channel in Hz
    pub max_frequency: f32,
    /// Seconds per data, separator and training tone
    pub channel_duration: f32,
    /// Seconds per preamble / postamble tone
    pub preamble_duration: f32,
    /// Maximum distance in Hz between an observed tone and the channel it is matched to
    pub frequency_tolerance: f32,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            channel_count: NIBBLE_CHANNELS,
            min_frequency: DEFAULT_MIN_FREQUENCY,
            max_frequency: DEFAULT_MAX_FREQUENCY,
            channel_duration: DEFAULT_CHANNEL_DURATION,
            preamble_duration: DEFAULT_PREAMBLE_DURATION,
            frequency_tolerance: DEFAULT_FREQUENCY_TOLERANCE,
        }
    }
}

impl ToneConfig {
    /// Ten-channel bit-flag plan with 1 kHz spacing
    pub fn legacy() -> Self {
        Self {
            channel_count: BITFLAG_CHANNELS,
            min_frequency: LEGACY_MIN_FREQUENCY,
            max_frequency: LEGACY_MAX_FREQUENCY,
            frequency_tolerance: LEGACY_FREQUENCY_TOLERANCE,
            ..Self::default()
        }
    }

    pub fn scheme(&self) -> Result<Scheme> {
        Scheme::for_channel_count(self.channel_count).ok_or_else(|| {
            ToneError::InvalidConfig(format!(
                "channel count must be {} or {}, got {}",
                NIBBLE_CHANNELS, BITFLAG_CHANNELS, self.channel_count
            ))
        })
    }

    /// Shortest channel-1 tone accepted as a preamble or postamble
    pub fn min_marker_duration(&self) -> f32 {
        self.preamble_duration * PREAMBLE_DETECTION_FACTOR
    }

    pub fn validate(&self) -> Result<()> {
        self.scheme()?;

        if !self.min_frequency.is_finite() || !self.max_frequency.is_finite() {
            return Err(ToneError::InvalidConfig("frequencies must be finite".into()));
        }
        if self.min_frequency <= 0.0 {
            return Err(ToneError::InvalidConfig(format!(
                "minimum frequency must be positive, got {}",
                self.min_frequency
            )));
        }
        if self.min_frequency >= self.max_frequency {
            return Err(ToneError::InvalidConfig(format!(
                "frequency range {}..{} Hz is empty",
                self.min_frequency, self.max_frequency
            )));
        }
        if !(self.channel_duration > 0.0) || !(self.preamble_duration > 0.0) {
            return Err(ToneError::InvalidConfig("durations must be positive".into()));
        }
        if self.preamble_duration <= self.channel_duration {
            return Err(ToneError::InvalidConfig(format!(
                "preamble ({} s) must be longer than a channel tone ({} s)",
                self.preamble_duration, self.channel_duration
            )));
        }

        let spacing = ChannelMap::from_config(self).spacing();
        if !(self.frequency_tolerance > 0.0) || self.frequency_tolerance >= spacing / 2.0 {
            return Err(ToneError::InvalidConfig(format!(
                "frequency tolerance must be in (0, {:.1}) Hz, got {}",
                spacing / 2.0,
                self.frequency_tolerance
            )));
        }

        Ok(())
    }
}

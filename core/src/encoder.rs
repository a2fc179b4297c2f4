use crate::channel::{Channel, ChannelMap, Scheme};
use crate::config::ToneConfig;
use crate::error::Result;
use crate::header::{encode_header, FileMeta, MessageType};
use serde::{Deserialize, Serialize};

/// One tone of a transmission: which channel and for how long (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub channel: Channel,
    pub duration: f32,
}

impl ChannelEvent {
    pub fn new(channel: Channel, duration: f32) -> Self {
        Self { channel, duration }
    }
}

/// Header followed by the raw data it describes
pub fn build_payload(
    message_type: MessageType,
    raw: &[u8],
    file_meta: Option<&FileMeta>,
) -> Result<Vec<u8>> {
    let mut payload = encode_header(message_type, raw.len(), file_meta)?;
    payload.extend_from_slice(raw);
    Ok(payload)
}

/// Encoder from payload bytes to a tone schedule
///
/// Output layout:
/// preamble, training sweep (every non-marker channel once, ascending),
/// the tones of each payload byte, postamble.
///
/// Nibble scheme: each byte becomes high nibble, low nibble, separator.
/// Bit-flag scheme: each byte becomes one tone per set bit (most significant
/// first), then a separator.
pub struct Encoder {
    config: ToneConfig,
    scheme: Scheme,
    map: ChannelMap,
}

impl Encoder {
    pub fn new(config: ToneConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            scheme: config.scheme()?,
            map: ChannelMap::from_config(&config),
            config,
        })
    }

    pub fn config(&self) -> &ToneConfig {
        &self.config
    }

    pub fn channel_map(&self) -> &ChannelMap {
        &self.map
    }

    /// Encode a complete payload (header already prepended)
    pub fn encode(&self, payload: &[u8]) -> Vec<ChannelEvent> {
        let tone = self.config.channel_duration;
        let marker = ChannelEvent::new(Channel::MARKER, self.config.preamble_duration);

        let mut events = Vec::with_capacity(payload.len() * 3 + self.map.channel_count() + 1);
        events.push(marker);

        for channel in self.scheme.training_sequence() {
            events.push(ChannelEvent::new(channel, tone));
        }

        for &byte in payload {
            match self.scheme {
                Scheme::Nibble => {
                    events.push(ChannelEvent::new(Channel::for_nibble(byte >> 4), tone));
                    events.push(ChannelEvent::new(Channel::for_nibble(byte & 0x0F), tone));
                }
                Scheme::BitFlag => {
                    for bit in 0..8u8 {
                        if byte & (0x80 >> bit) != 0 {
                            events.push(ChannelEvent::new(Channel::for_bit(bit), tone));
                        }
                    }
                }
            }
            events.push(ChannelEvent::new(Channel::SEPARATOR, tone));
        }

        events.push(marker);
        events
    }

    /// Encode a UTF-8 text message under a text header
    pub fn encode_text(&self, text: &str) -> Result<Vec<ChannelEvent>> {
        let payload = build_payload(MessageType::Text, text.as_bytes(), None)?;
        Ok(self.encode(&payload))
    }

    /// Encode file contents under a file header
    pub fn encode_file(&self, meta: &FileMeta, data: &[u8]) -> Result<Vec<ChannelEvent>> {
        let payload = build_payload(MessageType::File, data, Some(meta))?;
        Ok(self.encode(&payload))
    }

    /// Nominal frequency of an event's channel
    pub fn frequency(&self, event: &ChannelEvent) -> f32 {
        self.map.frequency(event.channel)
    }
}

impl Default for Encoder {
    fn default() -> Self {
        let config = ToneConfig::default();
        Self {
            scheme: Scheme::Nibble,
            map: ChannelMap::from_config(&config),
            config,
        }
    }
}

/// Total airtime of a schedule in seconds
pub fn total_duration(events: &[ChannelEvent]) -> f32 {
    events.iter().map(|e| e.duration).sum()
}

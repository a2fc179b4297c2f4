//! Tone-protocol codec for acoustic data transfer
//!
//! Turns a header-framed byte payload into a sequence of single-frequency
//! channel tones (preamble, training sweep, two nibble tones and a separator
//! per byte, postamble), and reconstructs the payload from observed tones.

pub mod calibration;
pub mod channel;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod header;
pub mod segment;

pub use calibration::CalibrationTable;
pub use channel::{Channel, ChannelMap, ChannelRole, Scheme};
pub use config::ToneConfig;
pub use decoder::{observe, Decoder, DecoderState, ToneObservation, Transmission};
pub use encoder::{build_payload, total_duration, ChannelEvent, Encoder};
pub use error::{Result, ToneError};
pub use header::{decode_header, encode_header, FileMeta, Header, MessageType};
pub use segment::ToneSegmenter;

// Channel plans
pub const NIBBLE_CHANNELS: usize = 19;
pub const BITFLAG_CHANNELS: usize = 10;

// Default operating point (nibble scheme)
pub const DEFAULT_MIN_FREQUENCY: f32 = 10_000.0; // Hz
pub const DEFAULT_MAX_FREQUENCY: f32 = 18_000.0; // Hz
pub const DEFAULT_CHANNEL_DURATION: f32 = 0.03; // seconds
pub const DEFAULT_PREAMBLE_DURATION: f32 = 1.0; // seconds
pub const DEFAULT_FREQUENCY_TOLERANCE: f32 = 150.0; // Hz

// Legacy bit-flag operating point
pub const LEGACY_MIN_FREQUENCY: f32 = 5_000.0; // Hz
pub const LEGACY_MAX_FREQUENCY: f32 = 14_000.0; // Hz
pub const LEGACY_FREQUENCY_TOLERANCE: f32 = 50.0; // Hz

// Header framing
pub const HEADER_START: u8 = 0xFE;
pub const HEADER_END: u8 = 0xFF;
pub const TEXT_HEADER_SIZE: usize = 7; // start + type + size(4) + end

// Detection thresholds
/// Fraction of the preamble duration a channel-1 tone must last to count as a marker
pub const PREAMBLE_DETECTION_FACTOR: f32 = 0.7;
/// Fraction of a data tone a run of analysis blocks must cover to count as a tone
pub const CHANNEL_DETECTION_FACTOR: f32 = 0.51;
/// Maximum relative deviation of a training tone from its nominal frequency
pub const CALIBRATION_SANE_TOLERANCE_FACTOR: f32 = 0.075;

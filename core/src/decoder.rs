use crate::calibration::CalibrationTable;
use crate::channel::{Channel, ChannelMap, ChannelRole, Scheme};
use crate::config::ToneConfig;
use crate::encoder::ChannelEvent;
use crate::error::{Result, ToneError};
use crate::header::{decode_header, try_decode_header, Header, MessageType};
use crate::CALIBRATION_SANE_TOLERANCE_FACTOR;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

/// Upper bound on how many back-to-back tones one observation may stand for
const MAX_TONE_REPEATS: usize = 256;

/// A tone reported by the detection front end
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToneObservation {
    /// Measured frequency in Hz
    pub frequency: f32,
    /// How long the tone was held, in seconds
    pub duration: f32,
}

impl ToneObservation {
    pub fn new(frequency: f32, duration: f32) -> Self {
        Self {
            frequency,
            duration,
        }
    }
}

/// Ideal observations of an encoded schedule: nominal frequency, nominal duration
pub fn observe(events: &[ChannelEvent], map: &ChannelMap) -> Vec<ToneObservation> {
    events
        .iter()
        .map(|event| ToneObservation::new(map.frequency(event.channel), event.duration))
        .collect()
}

/// A fully received message
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    pub header: Header,
    pub data: Vec<u8>,
}

impl Transmission {
    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    /// Message text, for text transmissions holding valid UTF-8
    pub fn text(&self) -> Option<String> {
        match self.header.message_type {
            MessageType::Text => String::from_utf8(self.data.clone()).ok(),
            MessageType::File => None,
        }
    }

    /// `filename.extension`, for file transmissions
    pub fn file_name(&self) -> Option<String> {
        self.header.file.as_ref().map(|meta| meta.file_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    AwaitPreamble,
    /// Calibrating; `next` indexes the training sequence
    Training { next: usize },
    ExpectHighNibble,
    ExpectLowNibble { high: u8 },
    ExpectSeparator { high: u8, low: u8 },
    /// Bit-flag scheme: OR-ing bits until a separator
    CollectBits { value: u8, pending: bool },
    AwaitPostamble,
    Done,
}

/// Streaming decoder from observed tones to transmissions
///
/// Each preamble opens a session with a fresh calibration table. Observations
/// must be pushed in arrival order. A fatal error aborts the session and the
/// decoder goes back to waiting for a preamble.
pub struct Decoder {
    config: ToneConfig,
    scheme: Scheme,
    map: ChannelMap,
    training: Vec<Channel>,
    state: DecoderState,
    calibration: CalibrationTable,
    bytes: Vec<u8>,
    header: Option<(Header, usize)>,
}

impl Decoder {
    pub fn new(config: ToneConfig) -> Result<Self> {
        config.validate()?;
        let scheme = config.scheme()?;
        Ok(Self::from_parts(config, scheme))
    }

    fn from_parts(config: ToneConfig, scheme: Scheme) -> Self {
        Self {
            map: ChannelMap::from_config(&config),
            training: scheme.training_sequence(),
            calibration: CalibrationTable::new(config.channel_count),
            state: DecoderState::AwaitPreamble,
            bytes: Vec::new(),
            header: None,
            config,
            scheme,
        }
    }

    pub fn config(&self) -> &ToneConfig {
        &self.config
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Calibration of the session in progress (empty between sessions)
    pub fn calibration(&self) -> &CalibrationTable {
        &self.calibration
    }

    /// Bytes collected so far in the current session, header included
    pub fn bytes_received(&self) -> usize {
        self.bytes.len()
    }

    /// Drop the current session and wait for a new preamble
    pub fn reset(&mut self) {
        self.state = DecoderState::AwaitPreamble;
        self.calibration = CalibrationTable::new(self.config.channel_count);
        self.bytes.clear();
        self.header = None;
    }

    /// Feed one observation; returns the transmission once its postamble arrives
    pub fn push(&mut self, observation: ToneObservation) -> Result<Option<Transmission>> {
        match self.step(observation) {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!("Receive session aborted: {}", err);
                self.reset();
                Err(err)
            }
        }
    }

    /// Decode the first transmission in a complete observation buffer
    pub fn decode(&mut self, observations: &[ToneObservation]) -> Result<Transmission> {
        for &observation in observations {
            if let Some(transmission) = self.push(observation)? {
                return Ok(transmission);
            }
        }
        self.finish()?;
        Err(ToneError::PreambleNotFound)
    }

    /// Signal end of stream; reports why an unfinished session cannot complete
    pub fn finish(&mut self) -> Result<()> {
        let result = match self.state {
            DecoderState::AwaitPreamble | DecoderState::Done => Ok(()),
            DecoderState::Training { next } => Err(ToneError::CalibrationIncomplete(format!(
                "stream ended after {} of {} training tones",
                next,
                self.training.len()
            ))),
            DecoderState::AwaitPostamble => Err(ToneError::PostambleNotFound),
            _ => match &self.header {
                Some((header, end)) => Err(ToneError::SizeMismatch {
                    expected: header.raw_size as usize,
                    actual: self.bytes.len() - end,
                }),
                None => Err(ToneError::MalformedHeader(
                    "stream ended before the header was complete".into(),
                )),
            },
        };
        self.reset();
        result
    }

    fn step(&mut self, observation: ToneObservation) -> Result<Option<Transmission>> {
        match self.state {
            DecoderState::AwaitPreamble | DecoderState::Done => {
                self.await_preamble(observation);
                Ok(None)
            }
            DecoderState::Training { next } => {
                self.train(observation, next)?;
                if matches!(self.state, DecoderState::Training { .. }) {
                    return Ok(None);
                }
                // The last training tone may have merged with the first data tone
                let extra = self.repeats(observation) - 1;
                if extra > 0 {
                    self.data(observation, extra)
                } else {
                    Ok(None)
                }
            }
            _ => {
                let repeats = self.repeats(observation);
                self.data(observation, repeats)
            }
        }
    }

    /// Number of back-to-back tones an observation stands for
    fn repeats(&self, observation: ToneObservation) -> usize {
        let ratio = observation.duration / self.config.channel_duration;
        if !ratio.is_finite() {
            return 1;
        }
        (ratio.round() as usize).clamp(1, MAX_TONE_REPEATS)
    }

    fn is_marker_length(&self, observation: ToneObservation) -> bool {
        observation.duration >= self.config.min_marker_duration()
    }

    fn await_preamble(&mut self, observation: ToneObservation) {
        let window = self.map.spacing() / 2.0;
        let is_marker = self.map.nearest(observation.frequency, window) == Some(Channel::MARKER);

        if is_marker && self.is_marker_length(observation) {
            self.reset();
            self.calibration.record(Channel::MARKER, observation.frequency);
            self.state = DecoderState::Training { next: 0 };
            info!(
                "Preamble confirmed at {:.1} Hz (nominal {:.1} Hz)",
                observation.frequency,
                self.map.frequency(Channel::MARKER)
            );
        } else {
            debug!(
                "Ignoring {:.1} Hz for {:.3} s while waiting for preamble",
                observation.frequency, observation.duration
            );
        }
    }

    fn train(&mut self, observation: ToneObservation, next: usize) -> Result<()> {
        let expected = self.training[next];
        let offset = self.calibration.offset(&self.map);
        let assigned = self
            .map
            .nearest(observation.frequency - offset, self.config.frequency_tolerance);

        if assigned == Some(Channel::MARKER) {
            return Err(ToneError::CalibrationIncomplete(format!(
                "training interrupted by a marker tone after {} of {} channels",
                next,
                self.training.len()
            )));
        }
        if assigned != Some(expected) {
            return Err(ToneError::CalibrationIncomplete(format!(
                "expected training tone {} but observed {:.1} Hz",
                expected, observation.frequency
            )));
        }

        let nominal = self.map.frequency(expected);
        if (observation.frequency - nominal).abs() > nominal * CALIBRATION_SANE_TOLERANCE_FACTOR {
            return Err(ToneError::CalibrationIncomplete(format!(
                "{} observed at {:.1} Hz, too far from nominal {:.1} Hz",
                expected, observation.frequency, nominal
            )));
        }

        self.calibration.record(expected, observation.frequency);
        debug!("Calibrated {} to {:.1} Hz", expected, observation.frequency);

        if next + 1 == self.training.len() {
            info!(
                "Calibration complete ({} channels, mean offset {:+.1} Hz)",
                self.calibration.len(),
                self.calibration.offset(&self.map)
            );
            self.state = self.byte_start();
        } else {
            self.state = DecoderState::Training { next: next + 1 };
        }
        Ok(())
    }

    fn byte_start(&self) -> DecoderState {
        match self.scheme {
            Scheme::Nibble => DecoderState::ExpectHighNibble,
            Scheme::BitFlag => DecoderState::CollectBits {
                value: 0,
                pending: false,
            },
        }
    }

    fn data(&mut self, observation: ToneObservation, repeats: usize) -> Result<Option<Transmission>> {
        let Some(channel) = self
            .calibration
            .nearest(observation.frequency, self.config.frequency_tolerance)
        else {
            debug!("Unrecognized tone at {:.1} Hz, skipping", observation.frequency);
            return Ok(None);
        };
        let Some(role) = self.scheme.role(channel) else {
            return Ok(None);
        };

        if role == ChannelRole::Marker {
            if self.is_marker_length(observation) {
                return self.end_transmission().map(Some);
            }
            debug!("Ignoring short marker-band tone ({:.3} s)", observation.duration);
            return Ok(None);
        }

        for _ in 0..repeats {
            self.apply(role)?;
        }
        Ok(None)
    }

    fn apply(&mut self, role: ChannelRole) -> Result<()> {
        match (self.state, role) {
            (DecoderState::ExpectHighNibble, ChannelRole::Nibble(high)) => {
                self.state = DecoderState::ExpectLowNibble { high };
            }
            (DecoderState::ExpectLowNibble { high }, ChannelRole::Nibble(low)) => {
                self.state = DecoderState::ExpectSeparator { high, low };
            }
            (DecoderState::ExpectLowNibble { high }, ChannelRole::Separator) => {
                // Low nibble lost (usually merged with an identical high nibble)
                trace!("Low nibble missing, repeating high nibble {:#x}", high);
                self.complete_byte(high << 4 | high)?;
            }
            (DecoderState::ExpectSeparator { high, low }, ChannelRole::Separator) => {
                self.complete_byte(high << 4 | low)?;
            }
            (DecoderState::CollectBits { value, .. }, ChannelRole::Bit(bit)) => {
                self.state = DecoderState::CollectBits {
                    value: value | (0x80 >> bit),
                    pending: true,
                };
            }
            (DecoderState::CollectBits { value, .. }, ChannelRole::Separator) => {
                self.complete_byte(value)?;
            }
            (DecoderState::AwaitPostamble, _) => {
                debug!("Ignoring {:?} after the declared payload", role);
            }
            (state, role) => {
                warn!("Unexpected {:?} in state {:?}, skipping", role, state);
            }
        }
        Ok(())
    }

    fn complete_byte(&mut self, byte: u8) -> Result<()> {
        self.bytes.push(byte);
        self.state = self.byte_start();

        if self.header.is_none() {
            if let Some((header, end)) = try_decode_header(&self.bytes)? {
                debug!(
                    "Header decoded: {:?}, {} raw bytes follow",
                    header.message_type, header.raw_size
                );
                self.header = Some((header, end));
            }
        }

        if let Some((header, end)) = &self.header {
            if self.bytes.len() >= end + header.raw_size as usize {
                self.state = DecoderState::AwaitPostamble;
            }
        }
        Ok(())
    }

    fn end_transmission(&mut self) -> Result<Transmission> {
        match self.state {
            DecoderState::ExpectLowNibble { high } => self.complete_byte(high << 4 | high)?,
            DecoderState::ExpectSeparator { high, low } => self.complete_byte(high << 4 | low)?,
            DecoderState::CollectBits {
                value,
                pending: true,
            } => self.complete_byte(value)?,
            _ => {}
        }

        let (header, end) = match self.header.take() {
            Some(parsed) => parsed,
            None => decode_header(&self.bytes, 0)?,
        };

        let expected = header.raw_size as usize;
        let actual = self.bytes.len().saturating_sub(end);
        if actual < expected {
            return Err(ToneError::SizeMismatch { expected, actual });
        }

        let data = self.bytes[end..end + expected].to_vec();
        self.bytes.clear();
        self.calibration = CalibrationTable::new(self.config.channel_count);
        self.state = DecoderState::Done;
        info!("Postamble confirmed, received {} bytes", data.len());

        Ok(Transmission { header, data })
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::from_parts(ToneConfig::default(), Scheme::Nibble)
    }
}

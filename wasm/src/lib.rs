use tonecast_core::{
    ChannelEvent, Decoder, Encoder, FileMeta, ToneConfig, ToneError, ToneObservation, Transmission,
};
use wasm_bindgen::prelude::*;

fn to_js(err: ToneError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Flatten events into `[frequency, duration, ...]` pairs for the page's oscillator
fn flatten(encoder: &Encoder, events: &[ChannelEvent]) -> Vec<f32> {
    events
        .iter()
        .flat_map(|event| [encoder.frequency(event), event.duration])
        .collect()
}

#[wasm_bindgen]
pub struct WasmEncoder {
    inner: Encoder,
}

#[wasm_bindgen]
impl WasmEncoder {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<WasmEncoder, JsValue> {
        Encoder::new(ToneConfig::default())
            .map(|encoder| WasmEncoder { inner: encoder })
            .map_err(to_js)
    }

    /// Ten-channel bit-flag plan
    pub fn legacy() -> Result<WasmEncoder, JsValue> {
        Encoder::new(ToneConfig::legacy())
            .map(|encoder| WasmEncoder { inner: encoder })
            .map_err(to_js)
    }

    /// Returns a Float32Array of `[frequency, duration]` pairs to play in order
    pub fn encode_text(&self, text: &str) -> Result<Vec<f32>, JsValue> {
        let events = self.inner.encode_text(text).map_err(to_js)?;
        Ok(flatten(&self.inner, &events))
    }

    pub fn encode_file(&self, name: &str, extension: &str, data: &[u8]) -> Result<Vec<f32>, JsValue> {
        let meta = FileMeta::new(name, extension);
        let events = self.inner.encode_file(&meta, data).map_err(to_js)?;
        Ok(flatten(&self.inner, &events))
    }
}

/// Streaming receiver state shared by the binding; free of JS types
struct Receiver {
    decoder: Decoder,
    received: Option<Transmission>,
    last_error: Option<String>,
}

impl Receiver {
    fn new(config: ToneConfig) -> tonecast_core::Result<Self> {
        Ok(Self {
            decoder: Decoder::new(config)?,
            received: None,
            last_error: None,
        })
    }

    /// The decoder resets itself on a failed session, so errors only get recorded
    fn push(&mut self, frequency: f32, duration: f32) -> bool {
        let observation = ToneObservation::new(frequency, duration);
        match self.decoder.push(observation) {
            Ok(Some(transmission)) => {
                self.received = Some(transmission);
                true
            }
            Ok(None) => false,
            Err(err) => {
                self.last_error = Some(err.to_string());
                // The tone that ended the session may open the next one
                let _ = self.decoder.push(observation);
                false
            }
        }
    }

    fn take_data(&mut self) -> Vec<u8> {
        self.received
            .as_mut()
            .map(|transmission| std::mem::take(&mut transmission.data))
            .unwrap_or_default()
    }

    fn is_file(&self) -> bool {
        self.file_name().is_some()
    }

    fn file_name(&self) -> Option<String> {
        self.received.as_ref().and_then(Transmission::file_name)
    }

    fn reset(&mut self) {
        self.decoder.reset();
        self.received = None;
        self.last_error = None;
    }
}

#[wasm_bindgen]
pub struct WasmDecoder {
    inner: Receiver,
}

#[wasm_bindgen]
impl WasmDecoder {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Result<WasmDecoder, JsValue> {
        Receiver::new(ToneConfig::default())
            .map(|inner| WasmDecoder { inner })
            .map_err(to_js)
    }

    pub fn legacy() -> Result<WasmDecoder, JsValue> {
        Receiver::new(ToneConfig::legacy())
            .map(|inner| WasmDecoder { inner })
            .map_err(to_js)
    }

    /// Feed one detected tone; true once a transmission has completed
    pub fn push(&mut self, frequency: f32, duration: f32) -> bool {
        self.inner.push(frequency, duration)
    }

    /// Payload of the last completed transmission (empty once taken)
    pub fn take_data(&mut self) -> Vec<u8> {
        self.inner.take_data()
    }

    pub fn is_file(&self) -> bool {
        self.inner.is_file()
    }

    pub fn file_name(&self) -> Option<String> {
        self.inner.file_name()
    }

    /// Why the last receive session was abandoned, if it was
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.clone()
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(flat: &[f32]) -> Vec<(f32, f32)> {
        flat.chunks(2).map(|pair| (pair[0], pair[1])).collect()
    }

    #[test]
    fn test_flatten_pairs_frequency_and_duration() {
        let encoder = Encoder::default();
        let events = encoder.encode_text("A").unwrap();
        let flat = flatten(&encoder, &events);

        assert_eq!(flat.len(), events.len() * 2);
        assert_eq!(flat[0], 10_000.0);
        assert_eq!(flat[1], 1.0);
        assert_eq!(flat[3], 0.03);
    }

    #[test]
    fn test_receiver_text() {
        let encoder = Encoder::default();
        let flat = flatten(&encoder, &encoder.encode_text("wasm").unwrap());
        let mut receiver = Receiver::new(ToneConfig::default()).unwrap();

        let completed: Vec<bool> = pairs(&flat)
            .into_iter()
            .map(|(frequency, duration)| receiver.push(frequency, duration))
            .collect();
        assert_eq!(completed.iter().filter(|&&done| done).count(), 1);
        assert!(*completed.last().unwrap());

        assert!(!receiver.is_file());
        assert_eq!(receiver.take_data(), b"wasm");
        assert!(receiver.take_data().is_empty());
    }

    #[test]
    fn test_receiver_file() {
        let encoder = Encoder::new(ToneConfig::legacy()).unwrap();
        let meta = FileMeta::new("notes", "txt");
        let flat = flatten(&encoder, &encoder.encode_file(&meta, &[0, 1, 2, 254]).unwrap());
        let mut receiver = Receiver::new(ToneConfig::legacy()).unwrap();

        for (frequency, duration) in pairs(&flat) {
            receiver.push(frequency, duration);
        }
        assert!(receiver.is_file());
        assert_eq!(receiver.file_name().as_deref(), Some("notes.txt"));
        assert_eq!(receiver.take_data(), vec![0, 1, 2, 254]);

        receiver.reset();
        assert!(!receiver.is_file());
    }

    #[test]
    fn test_receiver_records_aborted_session() {
        let encoder = Encoder::default();
        let flat = flatten(&encoder, &encoder.encode_text("x").unwrap());
        let mut receiver = Receiver::new(ToneConfig::default()).unwrap();

        // Preamble, then a far-off tone where the first training tone belongs
        receiver.push(flat[0], flat[1]);
        assert!(!receiver.push(flat[2] + 220.0, flat[3]));
        assert!(receiver.last_error.is_some());
    }

    #[test]
    fn test_receiver_recovers_after_interrupted_training() {
        let encoder = Encoder::default();
        let flat = flatten(&encoder, &encoder.encode_text("again").unwrap());
        let tones = pairs(&flat);
        let mut receiver = Receiver::new(ToneConfig::default()).unwrap();

        // Preamble and two training tones, then the transmission starts over
        for &(frequency, duration) in &tones[..3] {
            receiver.push(frequency, duration);
        }
        let completed = tones
            .iter()
            .filter(|&&(frequency, duration)| receiver.push(frequency, duration))
            .count();

        assert_eq!(completed, 1);
        assert!(receiver.last_error.is_some());
        assert_eq!(receiver.take_data(), b"again");
    }
}

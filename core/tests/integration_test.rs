// End-to-end checks: payload -> channel events -> observations -> payload.
//
// Observations are produced three ways: ideal (nominal frequency and
// duration), perturbed (constant offset plus Gaussian jitter), and through the
// block segmenter, which merges back-to-back identical tones the way a real
// detection front end does.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Uniform};
use tonecast_core::{
    build_payload, decode_header, observe, Channel, ChannelEvent, ChannelMap, Decoder, Encoder,
    FileMeta, Header, MessageType, ToneConfig, ToneError, ToneObservation, ToneSegmenter,
    TEXT_HEADER_SIZE,
};

const BLOCK: f32 = 0.01;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ids(events: &[ChannelEvent]) -> Vec<u8> {
    events.iter().map(|e| e.channel.id()).collect()
}

/// Expand events into per-block frequency estimates, as an FFT front end would report them
fn blocks(events: &[ChannelEvent], map: &ChannelMap) -> Vec<Option<f32>> {
    let mut out = vec![None; 20];
    for event in events {
        let count = (event.duration / BLOCK).round() as usize;
        out.extend(std::iter::repeat(Some(map.frequency(event.channel))).take(count));
    }
    out.extend(vec![None; 20]);
    out
}

fn perturb(
    events: &[ChannelEvent],
    map: &ChannelMap,
    offset: f32,
    rng: &mut StdRng,
) -> Vec<ToneObservation> {
    let jitter = Normal::new(0.0f32, 15.0).unwrap();
    let stretch = Uniform::new(0.9f32, 1.1);
    events
        .iter()
        .map(|e| {
            ToneObservation::new(
                map.frequency(e.channel) + offset + jitter.sample(rng),
                e.duration * stretch.sample(rng),
            )
        })
        .collect()
}

#[test]
fn test_single_character_sequence() {
    let encoder = Encoder::default();
    let events = encoder.encode_text("A").unwrap();
    let sequence = ids(&events);

    assert_eq!(sequence[0], 1);
    assert_eq!(&sequence[1..19], (2..=19).collect::<Vec<u8>>().as_slice());
    assert_eq!(&sequence[sequence.len() - 4..], &[8, 5, 2, 1]);
    assert_eq!(sequence.len(), 1 + 18 + (TEXT_HEADER_SIZE + 1) * 3 + 1);

    let mut decoder = Decoder::default();
    let transmission = decoder.decode(&observe(&events, encoder.channel_map())).unwrap();
    assert_eq!(transmission.header, Header::text(1));
    assert_eq!(transmission.data, b"A");
}

#[test]
fn test_random_payload_round_trips() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(0x70_4E_CA_57);
    let encoder = Encoder::default();
    let mut decoder = Decoder::default();

    for len in 0..64 {
        let mut data = vec![0u8; len];
        rng.fill(&mut data[..]);

        let payload = build_payload(MessageType::Text, &data, None).unwrap();
        let events = encoder.encode(&payload);
        let transmission = decoder.decode(&observe(&events, encoder.channel_map())).unwrap();

        assert_eq!(transmission.header, Header::text(len as u32));
        assert_eq!(transmission.data, data, "length {}", len);
    }
}

#[test]
fn test_file_round_trip_keeps_metadata() {
    let encoder = Encoder::default();
    let meta = FileMeta::new("sensor-log.2024", "csv");
    let data = b"t,value\n0,1.5\n1,1.7\n".to_vec();

    let events = encoder.encode_file(&meta, &data).unwrap();
    let transmission = Decoder::default()
        .decode(&observe(&events, encoder.channel_map()))
        .unwrap();

    assert_eq!(transmission.message_type(), MessageType::File);
    assert_eq!(transmission.header.file.as_ref(), Some(&meta));
    assert_eq!(transmission.file_name().as_deref(), Some("sensor-log.2024.csv"));
    assert_eq!(transmission.data, data);
    assert_eq!(transmission.text(), None);
}

#[test]
fn test_empty_payload_boundary() {
    let encoder = Encoder::default();
    let events = encoder.encode_text("").unwrap();

    // preamble + training + header tones + postamble
    assert_eq!(events.len(), 1 + 18 + TEXT_HEADER_SIZE * 3 + 1);
    assert_eq!(events.first().unwrap().channel, Channel::MARKER);
    assert_eq!(events.last().unwrap().channel, Channel::MARKER);

    let transmission = Decoder::default()
        .decode(&observe(&events, encoder.channel_map()))
        .unwrap();
    assert_eq!(transmission.header, Header::text(0));
    assert!(transmission.data.is_empty());
    assert_eq!(transmission.text().as_deref(), Some(""));
}

#[test]
fn test_drop_recovery_duplicates_high_nibble() {
    let encoder = Encoder::default();
    let payload = build_payload(MessageType::Text, &[0xAB], None).unwrap();
    let mut events = encoder.encode(&payload);

    let low_nibble = events
        .iter()
        .rposition(|e| e.channel == Channel::for_nibble(0xB))
        .unwrap();
    events.remove(low_nibble);

    let transmission = Decoder::default()
        .decode(&observe(&events, encoder.channel_map()))
        .unwrap();
    assert_eq!(transmission.data, vec![0xAA]);
}

#[test]
fn test_offset_and_jitter_are_calibrated_out() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(7);
    let encoder = Encoder::default();
    let map = *encoder.channel_map();
    let text = "Calibrated over the air: 0123456789 ~!@#";

    for offset in [-140.0f32, -60.0, 0.0, 95.0, 150.0] {
        let events = encoder.encode_text(text).unwrap();
        let observations = perturb(&events, &map, offset, &mut rng);

        let (postamble, body) = observations.split_last().unwrap();
        let mut decoder = Decoder::default();
        for &observation in body {
            assert_eq!(decoder.push(observation).unwrap(), None);
        }

        let measured = decoder.calibration().offset(&map);
        assert!(
            (measured - offset).abs() < 15.0,
            "calibration offset {} for a {} Hz shift",
            measured,
            offset
        );

        let transmission = decoder.push(*postamble).unwrap().unwrap();
        assert_eq!(transmission.text().as_deref(), Some(text), "offset {}", offset);
        assert!(decoder.calibration().is_empty());
    }
}

#[test]
fn test_far_off_training_tone_fails_calibration() {
    let encoder = Encoder::default();
    let map = *encoder.channel_map();
    let events = encoder.encode_text("x").unwrap();
    let mut observations = observe(&events, &map);
    // Push the separator training tone into the middle of two channels
    observations[1].frequency += map.spacing() / 2.0;

    let err = Decoder::default().decode(&observations).unwrap_err();
    assert!(matches!(err, ToneError::CalibrationIncomplete(_)), "{:?}", err);
}

#[test]
fn test_segmented_blocks_decode() {
    init_logging();
    let config = ToneConfig::default();
    let encoder = Encoder::new(config).unwrap();
    let data = vec![0x44, 0x00, 0x00, 0xFF, 0x77, b'o', b'k', 0x11];
    let events = encoder
        .encode_file(&FileMeta::new("repeat", "bin"), &data)
        .unwrap();

    let mut segmenter = ToneSegmenter::new(&config, BLOCK).unwrap();
    let observations = segmenter.segment(&blocks(&events, encoder.channel_map()));
    // Identical neighbours were merged into single longer tones
    assert!(observations.len() < events.len());

    let transmission = Decoder::new(config).unwrap().decode(&observations).unwrap();
    assert_eq!(transmission.data, data);
    assert_eq!(transmission.file_name().as_deref(), Some("repeat.bin"));
}

#[test]
fn test_legacy_bitflag_through_segmenter() {
    let config = ToneConfig::legacy();
    let encoder = Encoder::new(config).unwrap();
    let text = "BPFSK\0\0 zero bytes";
    let events = encoder.encode_text(text).unwrap();

    let mut segmenter = ToneSegmenter::new(&config, BLOCK).unwrap();
    let observations = segmenter.segment(&blocks(&events, encoder.channel_map()));

    let transmission = Decoder::new(config).unwrap().decode(&observations).unwrap();
    assert_eq!(transmission.text().as_deref(), Some(text));
}

#[test]
fn test_header_codec_random_metadata() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..32 {
        let name_len = rng.gen_range(0..300);
        let ext_len = rng.gen_range(0..8);
        let filename: String = (0..name_len).map(|_| rng.gen_range('a'..='z')).collect();
        let extension: String = (0..ext_len).map(|_| rng.gen_range('a'..='z')).collect();
        let size: u32 = rng.gen();
        let meta = FileMeta::new(filename, extension);

        let bytes = tonecast_core::encode_header(MessageType::File, size as usize, Some(&meta)).unwrap();
        let (header, end) = decode_header(&bytes, 0).unwrap();
        assert_eq!(header, Header::file(meta, size));
        assert_eq!(end, bytes.len());
    }
}

#[test]
fn test_config_survives_json() {
    let config = ToneConfig::legacy();
    let json = serde_json::to_string(&config).unwrap();
    let parsed: ToneConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);

    let events = Encoder::new(parsed).unwrap().encode(&[0x01]);
    let json = serde_json::to_string(&events).unwrap();
    assert!(json.starts_with(r#"[{"channel":1,"duration":1.0}"#), "{}", json);
}

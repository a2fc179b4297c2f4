//! Tone schedule synthesis into 16-bit mono PCM

use crate::error::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::f32::consts::TAU;
use std::path::Path;
use tonecast_core::{ChannelEvent, ChannelMap};

pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Peak amplitude of the synthesised sine
const AMPLITUDE: f32 = 0.5;

/// Start time of every event when played back to back
pub fn schedule(events: &[ChannelEvent]) -> Vec<f32> {
    let mut clock = 0.0f32;
    events
        .iter()
        .map(|event| {
            let start = clock;
            clock += event.duration;
            start
        })
        .collect()
}

/// Synthesise the event list as one continuous-phase sine
///
/// Sample boundaries come from the schedule, so each event starts where the
/// previous one ended and rounding never accumulates.
pub fn synthesize(events: &[ChannelEvent], map: &ChannelMap, sample_rate: u32) -> Vec<f32> {
    let starts = schedule(events);
    let end_time = match (starts.last(), events.last()) {
        (Some(start), Some(event)) => start + event.duration,
        _ => 0.0,
    };
    let ends = starts.iter().skip(1).copied().chain(std::iter::once(end_time));
    let to_sample = |time: f32| (time as f64 * sample_rate as f64).round() as usize;

    let mut samples = Vec::with_capacity(to_sample(end_time));
    let mut phase = 0.0f32;
    for ((event, &start), end) in events.iter().zip(&starts).zip(ends) {
        let step = TAU * map.frequency(event.channel) / sample_rate as f32;
        for _ in to_sample(start)..to_sample(end) {
            samples.push(AMPLITUDE * phase.sin());
            phase = (phase + step) % TAU;
        }
    }
    samples
}

pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * 32767.0) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

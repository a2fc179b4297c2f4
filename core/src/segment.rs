use crate::channel::{Channel, ChannelMap};
use crate::config::ToneConfig;
use crate::decoder::ToneObservation;
use crate::error::{Result, ToneError};
use crate::CHANNEL_DETECTION_FACTOR;
use log::debug;

#[derive(Debug, Clone, Copy)]
struct Run {
    /// `None` for silence or an out-of-band tone
    channel: Option<Channel>,
    blocks: usize,
    frequency_sum: f32,
    voiced_blocks: usize,
}

impl Run {
    fn start(channel: Option<Channel>, frequency: Option<f32>) -> Self {
        let mut run = Self {
            channel,
            blocks: 0,
            frequency_sum: 0.0,
            voiced_blocks: 0,
        };
        run.extend(frequency);
        run
    }

    fn extend(&mut self, frequency: Option<f32>) {
        self.blocks += 1;
        if let (Some(_), Some(f)) = (self.channel, frequency) {
            self.frequency_sum += f;
            self.voiced_blocks += 1;
        }
    }
}

/// Groups per-block frequency estimates into tone observations
///
/// Each analysis block is classified against the nominal channel map. A new
/// classification must persist for a minimum number of blocks before it ends
/// the current tone; shorter interruptions are folded into the tone they
/// interrupted. Every kept tone is reported once, when it ends, with its mean
/// frequency and full duration.
pub struct ToneSegmenter {
    map: ChannelMap,
    block_duration: f32,
    window: f32,
    min_blocks: usize,
    current: Option<Run>,
    candidate: Option<Run>,
}

impl ToneSegmenter {
    pub fn new(config: &ToneConfig, block_duration: f32) -> Result<Self> {
        config.validate()?;
        if !(block_duration > 0.0) || block_duration > config.channel_duration {
            return Err(ToneError::InvalidConfig(format!(
                "analysis block of {} s must be positive and no longer than a channel tone ({} s)",
                block_duration, config.channel_duration
            )));
        }

        let map = ChannelMap::from_config(config);
        let min_blocks =
            ((config.channel_duration / block_duration) * CHANNEL_DETECTION_FACTOR).ceil() as usize;

        Ok(Self {
            window: map.spacing() / 2.0,
            map,
            block_duration,
            min_blocks: min_blocks.max(1),
            current: None,
            candidate: None,
        })
    }

    pub fn min_blocks(&self) -> usize {
        self.min_blocks
    }

    /// Feed the dominant frequency of one block (`None` for silence)
    ///
    /// Returns the tone that this block ended, if any.
    pub fn push(&mut self, frequency: Option<f32>) -> Option<ToneObservation> {
        let channel = frequency.and_then(|f| self.map.nearest(f, self.window));

        let Some(current) = self.current.as_mut() else {
            self.current = Some(Run::start(channel, frequency));
            return None;
        };
        if current.channel == channel {
            current.extend(frequency);
            if let Some(glitch) = self.candidate.take() {
                current.blocks += glitch.blocks;
            }
            return None;
        }

        match &mut self.candidate {
            Some(candidate) if candidate.channel == channel => candidate.extend(frequency),
            slot => {
                if let Some(glitch) = slot.replace(Run::start(channel, frequency)) {
                    current.blocks += glitch.blocks;
                }
            }
        }

        let promoted = self
            .candidate
            .filter(|candidate| candidate.blocks >= self.min_blocks)?;
        self.candidate = None;
        let ended = self.current.replace(promoted);
        ended.and_then(|run| self.close(run))
    }

    /// Flush the tone in progress at end of input
    pub fn finish(&mut self) -> Vec<ToneObservation> {
        let mut current = self.current.take();
        let mut tail = None;
        if let Some(candidate) = self.candidate.take() {
            if candidate.blocks >= self.min_blocks {
                tail = Some(candidate);
            } else if let Some(run) = current.as_mut() {
                run.blocks += candidate.blocks;
            }
        }

        [current, tail]
            .into_iter()
            .flatten()
            .filter_map(|run| self.close(run))
            .collect()
    }

    /// Segment a whole buffer of block estimates
    pub fn segment(&mut self, blocks: &[Option<f32>]) -> Vec<ToneObservation> {
        let mut observations: Vec<ToneObservation> =
            blocks.iter().filter_map(|&f| self.push(f)).collect();
        observations.extend(self.finish());
        observations
    }

    fn close(&self, run: Run) -> Option<ToneObservation> {
        if run.channel.is_none() {
            return None;
        }
        if run.blocks < self.min_blocks || run.voiced_blocks == 0 {
            debug!("Dropping {}-block glitch", run.blocks);
            return None;
        }
        Some(ToneObservation::new(
            run.frequency_sum / run.voiced_blocks as f32,
            run.blocks as f32 * self.block_duration,
        ))
    }
}

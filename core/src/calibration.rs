use crate::channel::{Channel, ChannelMap};

/// Observed frequency of each channel for one receive session
///
/// Filled from the preamble and training sweep, then used to classify data
/// tones. A fresh table is created for every session.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    entries: Vec<Option<f32>>,
}

impl CalibrationTable {
    pub fn new(channel_count: usize) -> Self {
        Self {
            entries: vec![None; channel_count],
        }
    }

    fn slot(&self, channel: Channel) -> Option<usize> {
        let index = (channel.id() as usize).checked_sub(1)?;
        (index < self.entries.len()).then_some(index)
    }

    /// Record the observed frequency for a channel (out-of-range channels are ignored)
    pub fn record(&mut self, channel: Channel, frequency: f32) {
        if let Some(index) = self.slot(channel) {
            self.entries[index] = Some(frequency);
        }
    }

    pub fn get(&self, channel: Channel) -> Option<f32> {
        self.slot(channel).and_then(|index| self.entries[index])
    }

    /// Number of calibrated channels
    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(Option::is_some)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, f32)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, f)| f.map(|f| (Channel::new(i as u8 + 1), f)))
    }

    /// Mean deviation of calibrated channels from their nominal frequencies
    pub fn offset(&self, map: &ChannelMap) -> f32 {
        let (sum, count) = self
            .iter()
            .fold((0.0f32, 0usize), |(sum, count), (channel, observed)| {
                (sum + observed - map.frequency(channel), count + 1)
            });
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    /// Calibrated channel closest to `frequency`, if within `tolerance` Hz
    pub fn nearest(&self, frequency: f32, tolerance: f32) -> Option<Channel> {
        if !frequency.is_finite() {
            return None;
        }
        self.iter()
            .map(|(channel, observed)| (channel, (observed - frequency).abs()))
            .filter(|&(_, distance)| distance <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(channel, _)| channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_lookup() {
        let mut table = CalibrationTable::new(10);
        assert!(table.is_empty());

        table.record(Channel::new(1), 5010.0);
        table.record(Channel::new(2), 6012.0);
        table.record(Channel::new(11), 1.0); // out of range
        table.record(Channel::new(0), 1.0); // out of range

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(Channel::new(2)), Some(6012.0));
        assert_eq!(table.get(Channel::new(3)), None);
        assert!(!table.is_complete());
    }

    #[test]
    fn test_complete_after_all_channels() {
        let map = ChannelMap::new(10, 5000.0, 14000.0);
        let mut table = CalibrationTable::new(10);
        for channel in map.channels() {
            table.record(channel, map.frequency(channel));
        }
        assert!(table.is_complete());
        assert_eq!(table.offset(&map), 0.0);
    }

    #[test]
    fn test_offset_tracks_shift() {
        let map = ChannelMap::new(10, 5000.0, 14000.0);
        let mut table = CalibrationTable::new(10);
        table.record(Channel::new(1), 5030.0);
        table.record(Channel::new(2), 6050.0);
        assert!((table.offset(&map) - 40.0).abs() < 1e-3);
    }

    #[test]
    fn test_nearest_uses_observed_frequencies() {
        let mut table = CalibrationTable::new(10);
        table.record(Channel::new(4), 8100.0);
        table.record(Channel::new(5), 9100.0);

        // Nominal ch4 is 8000 Hz, but the table was calibrated at 8100
        assert_eq!(table.nearest(8120.0, 50.0), Some(Channel::new(4)));
        assert_eq!(table.nearest(8000.0, 50.0), None);
        assert_eq!(table.nearest(9080.0, 50.0), Some(Channel::new(5)));
    }
}

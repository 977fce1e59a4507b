//! Per-station reference tracking
//!
//! Differential encoding needs to know what the server already has. For each
//! station the tracker keeps the live sequencer, the last live record sent
//! (the live-diff reference) and the samples waiting for the next live
//! update. It also owns the forced-full interval shared by all stations.

use std::collections::{HashMap, VecDeque};

use crate::codec::{Fields, SampleRecord};
use crate::core::{Algorithm, StationCode, DEFAULT_MAX_COMPRESSED_LIVE_RECORDS};

use super::sequencer::Sequencer;

/// Reference state for one station.
#[derive(Debug, Clone, Default)]
pub struct StationState {
    sequencer: Sequencer,
    previous_live: Option<(Fields, u16)>,
    samples: VecDeque<SampleRecord>,
}

impl StationState {
    /// The last live record sent and its sequence id.
    pub fn previous_live(&self) -> Option<(&Fields, u16)> {
        self.previous_live.as_ref().map(|(fields, seq)| (fields, *seq))
    }

    /// Most recently allocated live sequence id.
    pub fn current_sequence(&self) -> u16 {
        self.sequencer.current()
    }

    /// Number of samples waiting to be sent.
    pub fn queued_samples(&self) -> usize {
        self.samples.len()
    }
}

/// Reference state for every station the client has seen.
///
/// Sequencers and queued samples survive a reconnect; the live-diff
/// references do not, since the new connection's server state is unknown.
#[derive(Debug, Clone)]
pub struct StationTracker {
    stations: HashMap<StationCode, StationState>,
    max_compressed: u32,
    compressed_remaining: u32,
}

impl Default for StationTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_COMPRESSED_LIVE_RECORDS)
    }
}

impl StationTracker {
    /// Tracker forcing a full live record after `max_compressed` compressed
    /// ones.
    pub fn new(max_compressed: u32) -> Self {
        Self {
            stations: HashMap::new(),
            max_compressed,
            compressed_remaining: max_compressed,
        }
    }

    /// State for `station`, if any has been recorded.
    pub fn station(&self, station: &StationCode) -> Option<&StationState> {
        self.stations.get(station)
    }

    fn state_mut(&mut self, station: &StationCode) -> &mut StationState {
        self.stations.entry(station.clone()).or_default()
    }

    /// Allocate the next live sequence id for `station`.
    pub fn next_live_sequence(&mut self, station: &StationCode) -> u16 {
        self.state_mut(station).sequencer.next()
    }

    /// Take back `sequence` if nothing has been allocated since.
    pub fn rollback_live_sequence(&mut self, station: &StationCode, sequence: u16) -> bool {
        self.state_mut(station).sequencer.rollback_if_current(sequence)
    }

    /// The live-diff reference for `station`.
    pub fn previous_live(&self, station: &StationCode) -> Option<(&Fields, u16)> {
        self.stations.get(station).and_then(StationState::previous_live)
    }

    /// Remember `fields` as the live record sent under `sequence`.
    pub fn record_live(&mut self, station: &StationCode, fields: Fields, sequence: u16) {
        self.state_mut(station).previous_live = Some((fields, sequence));
    }

    /// Queue a sample for the next live update of its station.
    pub fn queue_sample(&mut self, sample: SampleRecord) {
        let station = sample.station_code.clone();
        self.state_mut(&station).samples.push_back(sample);
    }

    /// Samples waiting for the next live update of `station`, oldest first.
    pub fn queued_samples(&self, station: &StationCode) -> impl Iterator<Item = &SampleRecord> {
        self.stations
            .get(station)
            .into_iter()
            .flat_map(|state| state.samples.iter())
    }

    /// Drop the `count` oldest queued samples for `station` once they are
    /// on their way.
    pub fn remove_samples(&mut self, station: &StationCode, count: usize) {
        if let Some(state) = self.stations.get_mut(station) {
            let count = count.min(state.samples.len());
            state.samples.drain(..count);
        }
    }

    /// Whether the next live record may be compressed.
    pub fn compression_permitted(&self) -> bool {
        self.compressed_remaining != 0
    }

    /// Count a live record encoded with `algorithm` against the interval.
    /// The record after the interval ran out was full and restarts it.
    pub fn record_algorithm(&mut self, algorithm: Algorithm) {
        if self.compressed_remaining == 0 {
            self.compressed_remaining = self.max_compressed;
        } else if algorithm != Algorithm::None {
            self.compressed_remaining -= 1;
        }
    }

    /// Compressed live records left before a full one is forced.
    pub fn compressed_remaining(&self) -> u32 {
        self.compressed_remaining
    }

    /// Forget per-connection references after the connection is lost.
    pub fn reset_connection(&mut self) {
        for state in self.stations.values_mut() {
            state.previous_live = None;
        }
        self.compressed_remaining = self.max_compressed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Timestamp;

    fn station() -> StationCode {
        StationCode::new("abcde").unwrap()
    }

    fn sample(secs: u32) -> SampleRecord {
        SampleRecord::new(
            station(),
            Timestamp::from_secs(secs),
            Timestamp::from_secs(secs + 5),
            Fields::new().with("temperature", 10.0),
        )
    }

    #[test]
    fn test_sequences_are_per_station() {
        let mut tracker = StationTracker::default();
        let other = StationCode::new("fghij").unwrap();

        assert_eq!(tracker.next_live_sequence(&station()), 1);
        assert_eq!(tracker.next_live_sequence(&station()), 2);
        assert_eq!(tracker.next_live_sequence(&other), 1);
    }

    #[test]
    fn test_rollback_only_latest_sequence() {
        let mut tracker = StationTracker::default();
        let s = station();
        let first = tracker.next_live_sequence(&s);
        let second = tracker.next_live_sequence(&s);

        assert!(!tracker.rollback_live_sequence(&s, first));
        assert!(tracker.rollback_live_sequence(&s, second));
        assert_eq!(tracker.next_live_sequence(&s), second);
    }

    #[test]
    fn test_sample_queue_order() {
        let mut tracker = StationTracker::default();
        let s = station();
        tracker.queue_sample(sample(10));
        tracker.queue_sample(sample(20));
        tracker.queue_sample(sample(30));

        let order: Vec<u32> = tracker.queued_samples(&s).map(|r| r.timestamp.as_secs()).collect();
        assert_eq!(order, vec![10, 20, 30]);

        // Peeking leaves the queue alone until samples are removed.
        tracker.remove_samples(&s, 2);
        let order: Vec<u32> = tracker.queued_samples(&s).map(|r| r.timestamp.as_secs()).collect();
        assert_eq!(order, vec![30]);

        tracker.remove_samples(&s, 5);
        assert_eq!(tracker.queued_samples(&s).count(), 0);
        assert_eq!(tracker.queued_samples(&StationCode::new("zzzzz").unwrap()).count(), 0);
    }

    #[test]
    fn test_forced_full_interval() {
        let mut tracker = StationTracker::new(2);

        assert!(tracker.compression_permitted());
        tracker.record_algorithm(Algorithm::LiveDiff);
        assert!(tracker.compression_permitted());
        tracker.record_algorithm(Algorithm::SampleDiff);

        assert!(!tracker.compression_permitted());
        // Asking again does not consume anything.
        assert!(!tracker.compression_permitted());
        tracker.record_algorithm(Algorithm::None);
        assert_eq!(tracker.compressed_remaining(), 2);
        assert!(tracker.compression_permitted());
    }

    #[test]
    fn test_full_records_do_not_count() {
        let mut tracker = StationTracker::new(1);
        tracker.record_algorithm(Algorithm::None);
        assert!(tracker.compression_permitted());
        tracker.record_algorithm(Algorithm::Skip);
        assert!(!tracker.compression_permitted());
    }

    #[test]
    fn test_reset_connection_keeps_sequences_and_samples() {
        let mut tracker = StationTracker::new(3);
        let s = station();
        let seq = tracker.next_live_sequence(&s);
        tracker.record_live(&s, Fields::new().with("humidity", 50u8), seq);
        tracker.queue_sample(sample(10));
        tracker.record_algorithm(Algorithm::LiveDiff);

        tracker.reset_connection();

        assert!(tracker.previous_live(&s).is_none());
        assert_eq!(tracker.compressed_remaining(), 3);
        let state = tracker.station(&s).unwrap();
        assert_eq!(state.current_sequence(), seq);
        assert_eq!(state.queued_samples(), 1);
    }
}

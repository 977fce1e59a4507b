//! Collaborator traits for weather-push.
//!
//! The client sits between a record producer (the origin database listener)
//! and a remote server. These traits are the seams through which it reaches
//! everything that is not part of the wire protocol itself.

use std::fmt;

use tracing::debug;

use super::hardware::{HardwareType, StationCode};
use crate::codec::{LiveRecord, SampleRecord, Timestamp};

/// Encoding chosen for a record by the differential strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Full record, no diff.
    None,
    /// Diff against the previous live record.
    LiveDiff,
    /// Diff against the last acknowledged sample.
    SampleDiff,
    /// Nothing changed since the previous live record; not sent.
    Skip,
}

impl Algorithm {
    /// Name used in logs and statistics.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::LiveDiff => "live-diff",
            Self::SampleDiff => "sample-diff",
            Self::Skip => "skip",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Size accounting for one encoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionStats {
    /// Payload size of the full (undiffed) encoding.
    pub full_size: usize,
    /// Bytes saved by the chosen algorithm.
    pub saving: usize,
    /// The chosen algorithm.
    pub algorithm: Algorithm,
}

/// Source of acknowledged samples and sink for delivery confirmations.
///
/// Implemented by the origin database layer.
#[async_trait::async_trait]
pub trait SampleStore: Send + Sync + 'static {
    /// Most recent sample the server has confirmed receiving for a station.
    ///
    /// This is the only genuinely asynchronous step of packet assembly.
    async fn fetch_confirmed_sample(&self, station: &StationCode) -> Option<SampleRecord>;

    /// The server confirmed receipt of the sample taken at `timestamp`.
    async fn sample_confirmed(&self, station: &StationCode, timestamp: Timestamp);
}

/// Receiver of weather records from the origin site.
///
/// The client handle implements this so the record producer can push data
/// into it without knowing which transport is in use.
#[async_trait::async_trait]
pub trait WeatherSink: Send + Sync {
    /// A new live record is available.
    async fn notify_live_update(&self, record: LiveRecord, hardware: HardwareType);

    /// A new sample record is available.
    async fn notify_new_sample(&self, record: SampleRecord, hardware: HardwareType);
}

/// Post-hoc notifications about encoded records and written packets.
///
/// Not required for correctness.
pub trait StatisticsSink: Send + Sync + 'static {
    /// A live record was encoded and queued for transmission.
    fn log_live_record(&self, station: &StationCode, sequence: u16, stats: &CompressionStats);

    /// A sample record was encoded and queued for transmission.
    fn log_sample_record(&self, station: &StationCode, timestamp: Timestamp, stats: &CompressionStats);

    /// A packet was written to the transport.
    fn log_packet_transmission(&self, packet_type: u8, size: usize);
}

/// Statistics sink that writes everything to the `tracing` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatistics;

impl StatisticsSink for TracingStatistics {
    fn log_live_record(&self, station: &StationCode, sequence: u16, stats: &CompressionStats) {
        debug!(
            station = %station,
            sequence,
            full_size = stats.full_size,
            saving = stats.saving,
            algorithm = %stats.algorithm,
            "live record encoded"
        );
    }

    fn log_sample_record(&self, station: &StationCode, timestamp: Timestamp, stats: &CompressionStats) {
        debug!(
            station = %station,
            timestamp = timestamp.as_secs(),
            full_size = stats.full_size,
            saving = stats.saving,
            algorithm = %stats.algorithm,
            "sample record encoded"
        );
    }

    fn log_packet_transmission(&self, packet_type: u8, size: usize) {
        debug!(packet_type, size, "packet written");
    }
}

//! Transport-independent client logic.
//!
//! [`ClientCore`] owns everything the client knows about the server: the
//! connection phase, the station directory, per-station diff references and
//! the ordered outgoing queue. It never touches a socket; the connection task
//! feeds it server messages and writes the records it hands back.
//!
//! A live update goes through three steps:
//!
//! 1. [`ClientCore::begin_live`] allocates the live sequence id and reserves
//!    an outgoing slot.
//! 2. The caller looks up the station's confirmed sample (asynchronously)
//!    and hands it to [`ClientCore::complete`], which returns every dispatch
//!    now at the head of the station's queue.
//! 3. [`ClientCore::encode_dispatch`] turns each of those, in order, into the
//!    records of one weather data packet, and [`ClientCore::commit`] applies
//!    them to the per-station references once the packet is built.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::codec::{Fields, LiveRecord, SampleRecord, Timestamp};
use crate::core::{CompressionStats, EncodeError, HardwareType, StationCode, StatisticsSink};
use crate::sync::{encode_live_record, encode_sample_record, OutgoingQueue, Reservation, StationTracker};
use crate::transport::{
    ConnectionState, LiveDataRecord, SampleDataRecord, StationDirectory, WeatherRecord,
};

use super::client::ClientEvent;
use super::config::ClientConfig;
use super::wire::ServerMessage;

/// A live update waiting for its confirmed-sample lookup.
#[derive(Debug)]
pub struct PendingDispatch {
    reservation: Reservation,
    live: LiveRecord,
}

impl PendingDispatch {
    /// Station the update belongs to.
    pub fn station(&self) -> &StationCode {
        self.reservation.station()
    }

    /// Live sequence id allocated for the update.
    pub fn sequence(&self) -> u16 {
        self.reservation.sequence()
    }
}

/// A live update ready to be encoded once its turn comes.
#[derive(Debug, Clone)]
pub struct AssembledDispatch {
    station: StationCode,
    sequence: u16,
    live: LiveRecord,
    confirmed_sample: Option<SampleRecord>,
}

impl AssembledDispatch {
    /// Station the update belongs to.
    pub fn station(&self) -> &StationCode {
        &self.station
    }

    /// Live sequence id allocated for the update.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }
}

/// The records of one dispatch, encoded but not yet committed.
#[derive(Debug)]
pub struct EncodedDispatch {
    station: StationCode,
    sequence: u16,
    records: Vec<WeatherRecord>,
    samples: Vec<(Timestamp, CompressionStats)>,
    live: Option<EncodedLive>,
}

#[derive(Debug)]
struct EncodedLive {
    stats: CompressionStats,
    sent: Option<Fields>,
}

impl EncodedDispatch {
    /// Station the records belong to.
    pub fn station(&self) -> &StationCode {
        &self.station
    }

    /// Live sequence id of the dispatch.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Samples first, then the live record if it changed.
    pub fn records(&self) -> &[WeatherRecord] {
        &self.records
    }

    /// Whether there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Client state machine and packet assembly.
pub struct ClientCore {
    state: ConnectionState,
    tracker: StationTracker,
    queue: OutgoingQueue<AssembledDispatch>,
    sample_budget: usize,
    statistics: Arc<dyn StatisticsSink>,
    lost_live_records: Option<u8>,
}

impl ClientCore {
    /// Create the core for `config`.
    pub fn new(config: &ClientConfig, statistics: Arc<dyn StatisticsSink>) -> Self {
        Self {
            state: ConnectionState::connecting(config.server_addr),
            tracker: StationTracker::new(config.max_compressed_live_records),
            queue: OutgoingQueue::new(),
            sample_budget: config.sample_payload_budget(),
            statistics,
            lost_live_records: None,
        }
    }

    /// Connection state.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Stations from the latest station list.
    pub fn directory(&self) -> &StationDirectory {
        &self.state.directory
    }

    /// Per-station references.
    pub fn tracker(&self) -> &StationTracker {
        &self.tracker
    }

    /// Live-record loss counter from the latest UDP acknowledgement.
    pub fn lost_live_records(&self) -> Option<u8> {
        self.lost_live_records
    }

    /// Whether weather data may be sent.
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// The transport connected.
    pub fn on_connected(&mut self) {
        info!(server = %self.state.remote_endpoint, "connected");
        self.state.on_connected();
    }

    /// A handshake packet was written.
    pub fn on_handshake_sent(&mut self) {
        self.state.on_handshake_sent();
        info!(attempt = self.state.handshake_attempts, "handshake sent");
    }

    /// The connection went away: abandon in-flight dispatches and forget the
    /// diff references the server may not have.
    ///
    /// Sequence counters and queued samples are kept.
    pub fn on_connection_lost(&mut self) {
        info!(server = %self.state.remote_endpoint, "connection lost");
        self.state.on_closed();
        self.queue.clear();
        self.tracker.reset_connection();
    }

    /// Start a live update.
    ///
    /// Returns `None`, dropping the record, when the client is not ready or
    /// the server does not accept data for the station.
    pub fn begin_live(&mut self, live: LiveRecord, hardware: HardwareType) -> Option<PendingDispatch> {
        if !self.state.is_ready() {
            debug!(station = %live.station_code, "not ready, live record dropped");
            return None;
        }
        if !self.accepts(&live.station_code, hardware) {
            return None;
        }

        let sequence = self.tracker.next_live_sequence(&live.station_code);
        let reservation = self.queue.reserve(&live.station_code, sequence);
        Some(PendingDispatch { reservation, live })
    }

    /// Queue a sample for the station's next live update.
    ///
    /// Returns `false` when the sample was dropped.
    pub fn queue_sample(&mut self, sample: SampleRecord, hardware: HardwareType) -> bool {
        if !self.accepts(&sample.station_code, hardware) {
            return false;
        }
        self.tracker.queue_sample(sample);
        true
    }

    fn accepts(&self, station: &StationCode, hardware: HardwareType) -> bool {
        match self.state.directory.hardware_type(station) {
            None => {
                debug!(station = %station, "station unknown to server, record dropped");
                false
            }
            Some(listed) if listed != hardware => {
                warn!(
                    station = %station,
                    hardware = %hardware,
                    listed = %listed,
                    "hardware type differs from station list, record dropped"
                );
                false
            }
            Some(_) => true,
        }
    }

    /// The confirmed-sample lookup for `pending` finished.
    ///
    /// Returns the dispatches now free to go, oldest first. Dispatches
    /// reserved before the connection was lost come back empty.
    pub fn complete(
        &mut self,
        pending: PendingDispatch,
        confirmed_sample: Option<SampleRecord>,
    ) -> Vec<AssembledDispatch> {
        let PendingDispatch { reservation, live } = pending;
        let dispatch = AssembledDispatch {
            station: reservation.station().clone(),
            sequence: reservation.sequence(),
            live,
            confirmed_sample,
        };
        self.queue.fulfil(reservation, dispatch)
    }

    /// Give up on `pending` without sending anything.
    pub fn abandon(&mut self, pending: PendingDispatch) -> Vec<AssembledDispatch> {
        let PendingDispatch { reservation, .. } = pending;
        self.tracker
            .rollback_live_sequence(reservation.station(), reservation.sequence());
        self.queue.release(reservation)
    }

    /// Encode a dispatch into the records of one weather data packet.
    ///
    /// Queued samples go first, up to the sample budget, each diffed against
    /// the one before it (starting from the confirmed sample). The live
    /// record follows unless nothing changed since the previous one.
    ///
    /// Nothing is taken from the tracker here: once the packet is built,
    /// hand the result to [`commit`](Self::commit), or to
    /// [`discard`](Self::discard) if it will not be sent. On error the live
    /// sequence id is handed back and the samples stay queued.
    pub fn encode_dispatch(&mut self, dispatch: AssembledDispatch) -> Result<EncodedDispatch, EncodeError> {
        let (station, sequence) = (dispatch.station.clone(), dispatch.sequence);
        let result = self.prepare(dispatch);
        if result.is_err() {
            self.tracker.rollback_live_sequence(&station, sequence);
        }
        result
    }

    fn prepare(&self, dispatch: AssembledDispatch) -> Result<EncodedDispatch, EncodeError> {
        let AssembledDispatch {
            station,
            sequence,
            live,
            confirmed_sample,
        } = dispatch;
        let mut encoded = EncodedDispatch {
            station,
            sequence,
            records: Vec::new(),
            samples: Vec::new(),
            live: None,
        };

        let directory = &self.state.directory;
        let (Some(station_id), Some(hardware)) = (
            directory.station_id(&encoded.station),
            directory.hardware_type(&encoded.station),
        ) else {
            debug!(station = %encoded.station, sequence, "station no longer listed, dispatch dropped");
            return Ok(encoded);
        };

        let mut data_size = 0;
        let mut previous_sample = confirmed_sample.as_ref();
        for sample in self.tracker.queued_samples(&encoded.station) {
            if data_size > self.sample_budget {
                break;
            }
            let sample_encoding = encode_sample_record(sample, previous_sample, hardware)?;
            let record = WeatherRecord::Sample(SampleDataRecord {
                station_id,
                timestamp: sample.timestamp,
                download_timestamp: sample.download_timestamp,
                field_mask: sample_encoding.selection.fields,
                field_data: sample_encoding.payload.unwrap_or_default(),
            });
            data_size += record.encoded_size();
            encoded.records.push(record);
            encoded.samples.push((sample.timestamp, sample_encoding.stats));

            // Samples in one packet arrive together, so the next can diff
            // against this one.
            previous_sample = Some(sample);
        }

        let live_encoding = encode_live_record(
            &live.fields,
            self.tracker.previous_live(&encoded.station),
            previous_sample,
            hardware,
            self.tracker.compression_permitted(),
        )?;
        let sent = match live_encoding.payload {
            Some(field_data) => {
                encoded.records.push(WeatherRecord::Live(LiveDataRecord {
                    station_id,
                    sequence,
                    field_mask: live_encoding.selection.fields,
                    field_data,
                }));
                Some(live.fields)
            }
            None => None,
        };
        encoded.live = Some(EncodedLive {
            stats: live_encoding.stats,
            sent,
        });
        Ok(encoded)
    }

    /// The records of `encoded` are going out: drop the samples it carries
    /// from the queue and make its live record the next diff reference.
    pub fn commit(&mut self, encoded: EncodedDispatch) {
        let EncodedDispatch {
            station,
            sequence,
            samples,
            live,
            ..
        } = encoded;

        self.tracker.remove_samples(&station, samples.len());
        for (timestamp, stats) in &samples {
            self.statistics.log_sample_record(&station, *timestamp, stats);
        }

        let Some(live) = live else {
            self.tracker.rollback_live_sequence(&station, sequence);
            return;
        };
        self.tracker.record_algorithm(live.stats.algorithm);
        match live.sent {
            Some(fields) => {
                self.statistics.log_live_record(&station, sequence, &live.stats);
                self.tracker.record_live(&station, fields, sequence);
            }
            None => {
                debug!(station = %station, sequence, "live record unchanged, skipped");
                self.tracker.rollback_live_sequence(&station, sequence);
            }
        }
    }

    /// The records of `encoded` will not be sent. Queued samples and diff
    /// references are left as they were.
    pub fn discard(&mut self, encoded: EncodedDispatch) {
        debug!(
            station = %encoded.station,
            sequence = encoded.sequence,
            records = encoded.records.len(),
            "encoded dispatch discarded"
        );
        self.tracker
            .rollback_live_sequence(&encoded.station, encoded.sequence);
    }

    /// Act on a message from the server, returning the events it raises.
    pub fn handle_message(&mut self, message: ServerMessage) -> Vec<ClientEvent> {
        self.state.on_packet_received();

        match message {
            ServerMessage::StationInfo(info) => {
                info!(stations = info.stations.len(), "received station list");
                for station in &info.stations {
                    info!(
                        station = %station.station_code,
                        hardware = %station.hardware_type,
                        station_id = station.station_id,
                        "station"
                    );
                }

                let directory = StationDirectory::from_station_info(&info);
                let codes = directory.station_codes().to_vec();
                if self.state.on_station_list(directory) {
                    info!("now ready");
                    vec![ClientEvent::Ready(codes)]
                } else {
                    Vec::new()
                }
            }
            ServerMessage::SampleAcknowledgement {
                lost_live_records,
                acknowledgements,
            } => {
                let mut events = Vec::new();
                if let Some(lost) = lost_live_records {
                    if self.lost_live_records != Some(lost) {
                        events.push(ClientEvent::LiveRecordsLost(lost));
                    }
                    self.lost_live_records = Some(lost);
                }

                for ack in acknowledgements {
                    match self.state.directory.station_code(ack.station_id) {
                        Some(code) => events.push(ClientEvent::ReceiptConfirmation {
                            station_code: code.clone(),
                            timestamp: ack.timestamp,
                        }),
                        None => warn!(
                            station_id = ack.station_id,
                            timestamp = ack.timestamp.as_secs(),
                            "acknowledgement for unknown station"
                        ),
                    }
                }
                events
            }
            ServerMessage::AuthenticationFailed => {
                warn!(server = %self.state.remote_endpoint, "authentication failed");
                self.state.on_authentication_failed();
                vec![ClientEvent::AuthenticationFailed]
            }
            ServerMessage::Other(packet_type) => {
                debug!(?packet_type, "ignoring packet");
                Vec::new()
            }
        }
    }
}

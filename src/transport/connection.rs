//! Connection state for the weather-push client.
//!
//! A connection moves through
//! `Connecting -> Authenticating -> AwaitingStationList -> Ready`. Once ready
//! the [`StationDirectory`] maps station codes to the ids and hardware types
//! the server assigned.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use crate::core::{HardwareType, StationCode};

use super::record::{CodeMapEntry, StationInfoRecord};
use super::tcp::StationInfo;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Transport connection in progress.
    Connecting,
    /// Handshake packet being sent.
    Authenticating,
    /// Handshake sent, waiting for the station list.
    AwaitingStationList,
    /// Station list received, weather data may be sent.
    Ready,
    /// Connection closed.
    Closed,
    /// The server rejected the authorisation code.
    AuthFailed,
}

/// Station code, id and hardware type lookups built from a station list.
#[derive(Debug, Clone, Default)]
pub struct StationDirectory {
    by_code: HashMap<StationCode, (u8, HardwareType)>,
    by_id: HashMap<u8, (StationCode, HardwareType)>,
    order: Vec<StationCode>,
    image_types: HashMap<StationCode, u8>,
    image_sources: HashMap<StationCode, u8>,
}

impl StationDirectory {
    /// Build a directory from a station list.
    pub fn from_stations(stations: &[StationInfoRecord]) -> Self {
        let mut directory = Self::default();
        for station in stations {
            let code = station.station_code.clone();
            if directory
                .by_code
                .insert(code.clone(), (station.station_id, station.hardware_type))
                .is_none()
            {
                directory.order.push(code.clone());
            }
            directory
                .by_id
                .insert(station.station_id, (code, station.hardware_type));
        }
        directory
    }

    /// Build a directory from a TCP station info packet, image maps included.
    pub fn from_station_info(info: &StationInfo) -> Self {
        let mut directory = Self::from_stations(&info.stations);
        directory.image_types = code_map(&info.image_types);
        directory.image_sources = code_map(&info.image_sources);
        directory
    }

    /// Server id of a station.
    pub fn station_id(&self, code: &StationCode) -> Option<u8> {
        self.by_code.get(code).map(|(id, _)| *id)
    }

    /// Hardware type of a station, by code.
    pub fn hardware_type(&self, code: &StationCode) -> Option<HardwareType> {
        self.by_code.get(code).map(|(_, hw)| *hw)
    }

    /// Hardware type of a station, by server id.
    pub fn hardware_of(&self, station_id: u8) -> Option<HardwareType> {
        self.by_id.get(&station_id).map(|(_, hw)| *hw)
    }

    /// Station code for a server id.
    pub fn station_code(&self, station_id: u8) -> Option<&StationCode> {
        self.by_id.get(&station_id).map(|(code, _)| code)
    }

    /// Station codes in the order the server listed them.
    pub fn station_codes(&self) -> &[StationCode] {
        &self.order
    }

    /// Server id of an image type code.
    pub fn image_type_id(&self, code: &StationCode) -> Option<u8> {
        self.image_types.get(code).copied()
    }

    /// Server id of an image source code.
    pub fn image_source_id(&self, code: &StationCode) -> Option<u8> {
        self.image_sources.get(code).copied()
    }

    /// Number of stations.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the directory lists no stations.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn code_map(entries: &[CodeMapEntry]) -> HashMap<StationCode, u8> {
    entries.iter().map(|e| (e.code.clone(), e.id)).collect()
}

/// State of one client connection.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    /// Current connection phase.
    pub phase: ConnectionPhase,
    /// Server address.
    pub remote_endpoint: SocketAddr,
    /// Handshake packets sent on this connection.
    pub handshake_attempts: u32,
    /// When the last packet arrived from the server.
    pub last_received: Option<Instant>,
    /// Stations from the most recent station list.
    pub directory: StationDirectory,
}

impl ConnectionState {
    /// Create a connection state in the connecting phase.
    pub fn connecting(remote_endpoint: SocketAddr) -> Self {
        Self {
            phase: ConnectionPhase::Connecting,
            remote_endpoint,
            handshake_attempts: 0,
            last_received: None,
            directory: StationDirectory::default(),
        }
    }

    /// The transport is connected; the handshake is next.
    pub fn on_connected(&mut self) {
        self.phase = ConnectionPhase::Authenticating;
        self.handshake_attempts = 0;
        self.directory = StationDirectory::default();
    }

    /// A handshake packet went out.
    pub fn on_handshake_sent(&mut self) {
        self.handshake_attempts += 1;
        if self.phase == ConnectionPhase::Authenticating {
            self.phase = ConnectionPhase::AwaitingStationList;
        }
    }

    /// Any packet arrived from the server.
    pub fn on_packet_received(&mut self) {
        self.last_received = Some(Instant::now());
    }

    /// A station list arrived.
    ///
    /// Returns `true` if this moved the connection into `Ready`. Later
    /// station lists only refresh the directory.
    pub fn on_station_list(&mut self, directory: StationDirectory) -> bool {
        self.directory = directory;
        match self.phase {
            ConnectionPhase::Authenticating | ConnectionPhase::AwaitingStationList => {
                self.phase = ConnectionPhase::Ready;
                true
            }
            _ => false,
        }
    }

    /// The server rejected the authorisation code.
    pub fn on_authentication_failed(&mut self) {
        self.phase = ConnectionPhase::AuthFailed;
    }

    /// The transport connection went away.
    pub fn on_closed(&mut self) {
        if self.phase != ConnectionPhase::AuthFailed {
            self.phase = ConnectionPhase::Closed;
        }
    }

    /// Whether weather data may be sent.
    pub fn is_ready(&self) -> bool {
        self.phase == ConnectionPhase::Ready
    }

    /// Whether the client is still waiting for a station list.
    pub fn is_awaiting_station_list(&self) -> bool {
        self.phase == ConnectionPhase::AwaitingStationList
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> StationCode {
        StationCode::new(s).unwrap()
    }

    fn stations() -> Vec<StationInfoRecord> {
        vec![
            StationInfoRecord::new(code("abcde"), HardwareType::Davis, 1).unwrap(),
            StationInfoRecord::new(code("fghij"), HardwareType::Fowh1080, 2).unwrap(),
        ]
    }

    #[test]
    fn test_directory_lookups() {
        let directory = StationDirectory::from_stations(&stations());

        assert_eq!(directory.len(), 2);
        assert_eq!(directory.station_id(&code("abcde")), Some(1));
        assert_eq!(directory.hardware_type(&code("fghij")), Some(HardwareType::Fowh1080));
        assert_eq!(directory.hardware_of(1), Some(HardwareType::Davis));
        assert_eq!(directory.station_code(2), Some(&code("fghij")));
        assert_eq!(directory.station_codes(), &[code("abcde"), code("fghij")]);
        assert_eq!(directory.station_id(&code("zzzzz")), None);
        assert_eq!(directory.hardware_of(9), None);
    }

    #[test]
    fn test_directory_image_maps() {
        let info = StationInfo {
            stations: stations(),
            image_types: vec![CodeMapEntry::new(code("CAM"), 1)],
            image_sources: vec![CodeMapEntry::new(code("TSRC1"), 3)],
        };
        let directory = StationDirectory::from_station_info(&info);

        assert_eq!(directory.image_type_id(&code("CAM")), Some(1));
        assert_eq!(directory.image_source_id(&code("TSRC1")), Some(3));
        assert_eq!(directory.image_source_id(&code("CAM")), None);
    }

    #[test]
    fn test_phase_transitions() {
        let mut state = ConnectionState::connecting("127.0.0.1:9999".parse().unwrap());
        assert_eq!(state.phase, ConnectionPhase::Connecting);

        state.on_connected();
        assert_eq!(state.phase, ConnectionPhase::Authenticating);

        state.on_handshake_sent();
        assert!(state.is_awaiting_station_list());

        // Retries keep waiting.
        state.on_handshake_sent();
        assert_eq!(state.handshake_attempts, 2);
        assert!(state.is_awaiting_station_list());

        assert!(state.on_station_list(StationDirectory::from_stations(&stations())));
        assert!(state.is_ready());

        // A second list refreshes without a new transition.
        assert!(!state.on_station_list(StationDirectory::default()));
        assert!(state.directory.is_empty());

        state.on_closed();
        assert_eq!(state.phase, ConnectionPhase::Closed);

        state.on_connected();
        assert_eq!(state.handshake_attempts, 0);
        assert_eq!(state.phase, ConnectionPhase::Authenticating);
    }

    #[test]
    fn test_auth_failure_is_sticky() {
        let mut state = ConnectionState::connecting("127.0.0.1:9999".parse().unwrap());
        state.on_connected();
        state.on_handshake_sent();
        state.on_authentication_failed();
        state.on_closed();
        assert_eq!(state.phase, ConnectionPhase::AuthFailed);
        assert!(!state.on_station_list(StationDirectory::default()));
    }
}

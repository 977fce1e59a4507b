//! # weather-push
//!
//! Replication protocol for weather station telemetry.
//!
//! A client pushes two kinds of records to a remote server:
//!
//! - **Live records**: frequent snapshots of current conditions. Lost ones
//!   are never retransmitted, so each is sent as a full record or as a diff
//!   against the previous live record or the latest confirmed sample.
//! - **Sample records**: periodic archive entries. The server acknowledges
//!   each one; unacknowledged samples are sent again on a fresh connection.
//!
//! Records travel over TCP (authenticated, length-prefixed) or UDP (the
//! authorisation code in every datagram). Field sets depend on the station
//! hardware.
//!
//! ## Feature Flags
//!
//! - `transport` (default): Packets, stream framing and sockets
//! - `sync` (default): Diff strategy selection, patching and send ordering
//! - `client` (default): The connection-managing client
//!
//! ## Modules
//!
//! - [`core`]: Constants, error types, hardware classes and collaborator
//!   traits (always included)
//! - [`codec`]: Field tables and the record codec (always included)
//! - [`sync`]: Strategy selection and ordering (requires `sync` feature)
//! - [`transport`]: Wire formats (requires `transport` feature)
//! - [`client`]: Client API (requires `client` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use weather_push::prelude::*;
//!
//! let table = live_table(HardwareType::Generic);
//! let fields = Fields::new().with("temperature", 21.5).with_null("humidity");
//!
//! let selection = FieldSelection::new(FieldMask::range(4..=5));
//! let bytes = encode_fields(&fields, table, &selection).unwrap();
//! let decoded = decode_fields(&bytes, table, selection.fields).unwrap();
//! assert_eq!(decoded.get("temperature"), Some(&Value::Float(21.5)));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Record codec (always included)
pub mod codec;

// Sync layer (feature-gated)
#[cfg(feature = "sync")]
#[cfg_attr(docsrs, doc(cfg(feature = "sync")))]
pub mod sync;

// Transport layer (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    // Record codec
    pub use crate::codec::*;

    #[cfg(feature = "sync")]
    pub use crate::sync::{
        Candidate, OutgoingQueue, Reservation, Sequencer, StationTracker, encode_live_record,
        encode_sample_record, patch_record,
    };

    #[cfg(feature = "transport")]
    pub use crate::transport::{
        ConnectionPhase, PacketError, PacketType, RecordSet, StationInfo, TcpPacket,
        TcpStreamDecoder, TransportError, TransportResult, UdpPacket, UdpPayload, WeatherRecord,
        WeatherSocket, WeatherStream,
    };

    #[cfg(feature = "client")]
    pub use crate::client::{
        ClientConfig, ClientError, ClientEvent, Protocol, WeatherPushClient,
        WeatherPushClientBuilder,
    };
}

// Re-export commonly used items at crate root
pub use core::{DecodeError, EncodeError, HardwareType, StationCode, ValueError, WeatherPushError};

#[cfg(feature = "transport")]
pub use transport::{PacketError, PacketType, TcpPacket, UdpPacket, WeatherRecord};

#[cfg(feature = "client")]
pub use client::{ClientConfig, ClientEvent, WeatherPushClient};

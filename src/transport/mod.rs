//! Weather-push transport layer.
//!
//! Packet framing for the UDP and TCP transports, plus the async sockets the
//! client drives them over:
//!
//! - **Records**: [`WeatherRecord`] live and sample records, and
//!   [`RecordSet`] for the separator-delimited record lists both transports
//!   carry
//! - **UDP**: [`UdpPacket`] with its 12-byte header and end-of-transmission
//!   trailer
//! - **TCP**: [`TcpPacket`] and [`TcpStreamDecoder`] for reassembling packets
//!   from a byte stream
//! - **Connection state**: [`ConnectionState`] and the [`StationDirectory`]
//!   learned from the station list
//! - **Async sockets**: [`WeatherSocket`] (UDP) and [`WeatherStream`] (TCP)
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Client                       │
//! ├─────────────────────────────────────────┤
//! │         Transport Layer                 │  ← This module
//! │   packets, records, stream framing      │
//! ├─────────────────────────────────────────┤
//! │          UDP  /  TCP                    │
//! └─────────────────────────────────────────┘
//! ```

mod connection;
mod error;
mod frame;
mod record;
mod socket;
mod tcp;
mod udp;

pub use connection::*;
pub use error::*;
pub use frame::*;
pub use record::*;
pub use socket::*;
pub use tcp::*;
pub use udp::*;

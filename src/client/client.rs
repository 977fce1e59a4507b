//! High-level weather-push client API.
//!
//! [`WeatherPushClient`] is a cheap handle onto a background task that owns
//! the connection. Records are handed over a channel; server notifications
//! come back as [`ClientEvent`]s.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::codec::{LiveRecord, SampleRecord, Timestamp};
use crate::core::{
    EncodeError, HardwareType, SampleStore, StationCode, StatisticsSink, TracingStatistics,
    WeatherSink,
};
use crate::transport::{
    PacketError, TransportError, TransportResult, WeatherSocket, WeatherStream,
};

use super::config::{ClientConfig, Protocol};
use super::session::{ClientCore, PendingDispatch};
use super::wire::{wire_format, WireFormat};

/// Errors that can occur in the weather-push client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to connect to server.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The server rejected the authorisation code.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// A record could not be encoded.
    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodeError),

    /// A packet could not be built or parsed.
    #[error("packet error: {0}")]
    Packet(#[from] PacketError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The client has shut down.
    #[error("client shut down")]
    Shutdown,

    /// Configuration rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Notifications from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The station list arrived; data may be sent for these stations.
    Ready(Vec<StationCode>),
    /// The server stored the sample taken at `timestamp`.
    ReceiptConfirmation {
        /// Station the sample belongs to.
        station_code: StationCode,
        /// Sample timestamp.
        timestamp: Timestamp,
    },
    /// Late or missing live records among the last 256, as reported by a UDP
    /// server.
    LiveRecordsLost(u8),
    /// The TCP connection dropped; the client is reconnecting.
    ConnectionLost,
    /// The server rejected the authorisation code. The client stops.
    AuthenticationFailed,
}

#[derive(Debug)]
enum Command {
    Live(LiveRecord, HardwareType),
    Sample(SampleRecord, HardwareType),
    Shutdown,
}

/// A weather-push client.
///
/// # Example
///
/// ```ignore
/// use weather_push::client::{WeatherPushClient, WeatherPushClientBuilder};
///
/// let config = WeatherPushClientBuilder::new()
///     .server_addr("203.0.113.7:4224".parse()?)
///     .authorisation_code(0x1234_5678_9ABC_DEF0)
///     .build()?;
///
/// let (client, mut events) = WeatherPushClient::connect(config, store).await?;
///
/// while let Some(event) = events.recv().await {
///     // Ready, receipt confirmations, connection loss
/// }
/// ```
#[derive(Debug)]
pub struct WeatherPushClient {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<Result<(), ClientError>>,
    server_addr: SocketAddr,
}

impl WeatherPushClient {
    /// Connect to a weather-push server.
    ///
    /// Returns the client handle and a receiver for client events. Encoding
    /// statistics go to the `tracing` facade.
    pub async fn connect(
        config: ClientConfig,
        store: Arc<dyn SampleStore>,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>), ClientError> {
        Self::connect_with_statistics(config, store, Arc::new(TracingStatistics)).await
    }

    /// Connect, reporting encoding statistics to `statistics`.
    pub async fn connect_with_statistics(
        config: ClientConfig,
        store: Arc<dyn SampleStore>,
        statistics: Arc<dyn StatisticsSink>,
    ) -> Result<(Self, mpsc::Receiver<ClientEvent>), ClientError> {
        config.validate()?;

        let link = Link::connect(config.protocol, config.server_addr)
            .await
            .map_err(|e| ClientError::ConnectionFailed(format!("{}: {e}", config.server_addr)))?;

        let (command_tx, command_rx) = mpsc::channel(config.event_buffer);
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let (assembled_tx, assembled_rx) = mpsc::unbounded_channel();

        let server_addr = config.server_addr;
        let task = ConnectionTask {
            core: ClientCore::new(&config, statistics.clone()),
            wire: wire_format(config.protocol, config.authorisation_code),
            config,
            store,
            statistics,
            commands: command_rx,
            events: event_tx,
            assembled_tx,
            assembled_rx,
        };
        let task = tokio::spawn(task.run(link));

        let client = Self {
            commands: command_tx,
            task,
            server_addr,
        };
        Ok((client, event_rx))
    }

    /// Send a live record, along with any samples queued for its station.
    pub async fn send_live(&self, record: LiveRecord, hardware: HardwareType) -> Result<(), ClientError> {
        self.command(Command::Live(record, hardware)).await
    }

    /// Queue a sample; it goes out with the station's next live record.
    pub async fn send_sample(
        &self,
        record: SampleRecord,
        hardware: HardwareType,
    ) -> Result<(), ClientError> {
        self.command(Command::Sample(record, hardware)).await
    }

    async fn command(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::Shutdown)
    }

    /// Whether the background task is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Get the server address.
    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Stop the client and wait for the connection task to finish.
    ///
    /// Returns the error that stopped the task, if it stopped on its own.
    pub async fn shutdown(self) -> Result<(), ClientError> {
        let _ = self.commands.send(Command::Shutdown).await;
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(ClientError::ConnectionFailed(format!("connection task failed: {err}"))),
        }
    }
}

#[async_trait::async_trait]
impl WeatherSink for WeatherPushClient {
    async fn notify_live_update(&self, record: LiveRecord, hardware: HardwareType) {
        if let Err(err) = self.send_live(record, hardware).await {
            debug!(error = %err, "live record not delivered to client");
        }
    }

    async fn notify_new_sample(&self, record: SampleRecord, hardware: HardwareType) {
        if let Err(err) = self.send_sample(record, hardware).await {
            debug!(error = %err, "sample not delivered to client");
        }
    }
}

/// Socket for the configured transport.
#[derive(Debug)]
enum Link {
    Tcp(WeatherStream),
    Udp(WeatherSocket),
}

impl Link {
    async fn connect(protocol: Protocol, server: SocketAddr) -> io::Result<Self> {
        Ok(match protocol {
            Protocol::Tcp => Self::Tcp(WeatherStream::connect(server).await?),
            Protocol::Udp => Self::Udp(WeatherSocket::connect_to(server).await?),
        })
    }

    async fn send(&mut self, data: &[u8]) -> TransportResult<()> {
        match self {
            Self::Tcp(stream) => stream.send(data).await,
            Self::Udp(socket) => {
                // A lost datagram is no different from one the network dropped.
                if let Err(err) = socket.send(data).await {
                    warn!(error = %err, size = data.len(), "datagram not sent");
                }
                Ok(())
            }
        }
    }

    async fn recv(&mut self) -> TransportResult<Vec<u8>> {
        match self {
            Self::Tcp(stream) => stream.recv().await.map(<[u8]>::to_vec),
            Self::Udp(socket) => loop {
                match socket.recv().await {
                    Ok(data) => return Ok(data.to_vec()),
                    // ICMP errors surface here on a connected socket.
                    Err(err) => warn!(error = %err, "datagram receive failed"),
                }
            },
        }
    }
}

/// Result of a confirmed-sample lookup.
enum Assembled {
    Ready(PendingDispatch, Option<SampleRecord>),
    Failed(PendingDispatch),
}

/// Reports a lookup back to the connection task, even if the lookup panics.
struct AssemblyGuard {
    pending: Option<PendingDispatch>,
    results: mpsc::UnboundedSender<Assembled>,
}

impl AssemblyGuard {
    fn finish(mut self, confirmed_sample: Option<SampleRecord>) {
        if let Some(pending) = self.pending.take() {
            let _ = self.results.send(Assembled::Ready(pending, confirmed_sample));
        }
    }
}

impl Drop for AssemblyGuard {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            let _ = self.results.send(Assembled::Failed(pending));
        }
    }
}

enum Outcome {
    Shutdown,
    AuthenticationFailed,
    Lost(TransportError),
    Failed(ClientError),
}

enum Step {
    Command(Option<Command>),
    Assembled(Assembled),
    Received(TransportResult<Vec<u8>>),
    HandshakeTimeout,
}

struct ConnectionTask {
    config: ClientConfig,
    core: ClientCore,
    wire: Box<dyn WireFormat>,
    store: Arc<dyn SampleStore>,
    statistics: Arc<dyn StatisticsSink>,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<ClientEvent>,
    assembled_tx: mpsc::UnboundedSender<Assembled>,
    assembled_rx: mpsc::UnboundedReceiver<Assembled>,
}

impl ConnectionTask {
    async fn run(mut self, mut link: Link) -> Result<(), ClientError> {
        loop {
            match self.run_connection(&mut link).await {
                Outcome::Shutdown => {
                    info!("client shut down");
                    return Ok(());
                }
                Outcome::AuthenticationFailed => {
                    self.core.on_connection_lost();
                    return Err(ClientError::AuthenticationFailed);
                }
                Outcome::Failed(err) => {
                    error!(error = %err, "client stopped");
                    self.core.on_connection_lost();
                    return Err(err);
                }
                Outcome::Lost(err) => {
                    warn!(error = %err, "connection lost");
                    self.core.on_connection_lost();
                    self.wire.reset();
                    self.emit(ClientEvent::ConnectionLost);

                    match self.reconnect().await {
                        Some(new_link) => link = new_link,
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    async fn run_connection(&mut self, link: &mut Link) -> Outcome {
        self.core.on_connected();
        if let Err(err) = self.send_handshake(link).await {
            return Outcome::Lost(err);
        }
        let mut deadline = Instant::now() + self.config.station_list_timeout;

        loop {
            let awaiting = self.core.state().is_awaiting_station_list();
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                Some(assembled) = self.assembled_rx.recv() => Step::Assembled(assembled),
                received = link.recv() => Step::Received(received),
                _ = sleep_until(deadline), if awaiting => Step::HandshakeTimeout,
            };

            match step {
                Step::Command(None | Some(Command::Shutdown)) => return Outcome::Shutdown,
                Step::Command(Some(command)) => self.handle_command(command),
                Step::Assembled(assembled) => {
                    if let Some(outcome) = self.handle_assembled(assembled, link).await {
                        return outcome;
                    }
                }
                Step::Received(Ok(data)) => {
                    if let Some(outcome) = self.handle_received(&data).await {
                        return outcome;
                    }
                }
                Step::Received(Err(err)) => return Outcome::Lost(err),
                Step::HandshakeTimeout => {
                    warn!(
                        attempts = self.core.state().handshake_attempts,
                        timeout = ?self.config.station_list_timeout,
                        "no station list received, resending handshake"
                    );
                    if let Err(err) = self.send_handshake(link).await {
                        return Outcome::Lost(err);
                    }
                    deadline = Instant::now() + self.config.station_list_timeout;
                }
            }
        }
    }

    /// Wait out the reconnect delay and connect again, handling commands in
    /// the meantime. Returns `None` on shutdown.
    async fn reconnect(&mut self) -> Option<Link> {
        loop {
            let delay = sleep(self.config.reconnect_delay);
            tokio::pin!(delay);

            loop {
                let step = tokio::select! {
                    _ = &mut delay => None,
                    command = self.commands.recv() => Some(Step::Command(command)),
                    Some(assembled) = self.assembled_rx.recv() => Some(Step::Assembled(assembled)),
                };
                match step {
                    None => break,
                    Some(Step::Command(None | Some(Command::Shutdown))) => return None,
                    Some(Step::Command(Some(command))) => self.handle_command(command),
                    // Everything in flight belongs to the lost connection.
                    Some(Step::Assembled(Assembled::Ready(pending, _) | Assembled::Failed(pending))) => {
                        self.core.abandon(pending);
                    }
                    Some(_) => {}
                }
            }

            match Link::connect(self.config.protocol, self.config.server_addr).await {
                Ok(link) => return Some(link),
                Err(err) => warn!(server = %self.config.server_addr, error = %err, "reconnect failed"),
            }
        }
    }

    async fn send_handshake(&mut self, link: &mut Link) -> TransportResult<()> {
        let packet = self.wire.handshake()?;
        link.send(&packet).await?;
        self.core.on_handshake_sent();
        Ok(())
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Live(record, hardware) => {
                if let Some(pending) = self.core.begin_live(record, hardware) {
                    self.spawn_assembly(pending);
                }
            }
            Command::Sample(record, hardware) => {
                self.core.queue_sample(record, hardware);
            }
            Command::Shutdown => {}
        }
    }

    fn spawn_assembly(&self, pending: PendingDispatch) {
        let store = self.store.clone();
        let station = pending.station().clone();
        let guard = AssemblyGuard {
            pending: Some(pending),
            results: self.assembled_tx.clone(),
        };
        tokio::spawn(async move {
            let confirmed_sample = store.fetch_confirmed_sample(&station).await;
            guard.finish(confirmed_sample);
        });
    }

    async fn handle_assembled(&mut self, assembled: Assembled, link: &mut Link) -> Option<Outcome> {
        let drained = match assembled {
            Assembled::Ready(pending, confirmed_sample) => self.core.complete(pending, confirmed_sample),
            Assembled::Failed(pending) => {
                warn!(
                    station = %pending.station(),
                    sequence = pending.sequence(),
                    "confirmed sample lookup failed, live record dropped"
                );
                self.core.abandon(pending)
            }
        };

        for dispatch in drained {
            let (station, sequence) = (dispatch.station().clone(), dispatch.sequence());
            let encoded = match self.core.encode_dispatch(dispatch) {
                Ok(encoded) => encoded,
                Err(err) => {
                    error!(station = %station, sequence, error = %err, "failed to encode records");
                    return Some(Outcome::Failed(ClientError::Encoding(err)));
                }
            };
            if encoded.is_empty() {
                self.core.commit(encoded);
                continue;
            }

            let packet = match self.wire.weather_data(encoded.records()) {
                Ok(packet) => packet,
                Err(err) => {
                    error!(station = %station, sequence, error = %err, "failed to build weather data packet");
                    self.core.discard(encoded);
                    return Some(Outcome::Failed(ClientError::Packet(err)));
                }
            };
            self.core.commit(encoded);

            if let Err(err) = link.send(&packet).await {
                return Some(Outcome::Lost(err));
            }
            self.statistics.log_packet_transmission(packet[0], packet.len());
        }
        None
    }

    async fn handle_received(&mut self, data: &[u8]) -> Option<Outcome> {
        for message in self.wire.decode(data) {
            let message = match message {
                Ok(message) => message,
                Err(err) => {
                    warn!(error = %err, size = data.len(), "malformed packet dropped");
                    continue;
                }
            };

            for event in self.core.handle_message(message) {
                if let ClientEvent::ReceiptConfirmation {
                    station_code,
                    timestamp,
                } = &event
                {
                    self.store.sample_confirmed(station_code, *timestamp).await;
                }

                let failed = matches!(event, ClientEvent::AuthenticationFailed);
                self.emit(event);
                if failed {
                    return Some(Outcome::AuthenticationFailed);
                }
            }
        }
        None
    }

    fn emit(&self, event: ClientEvent) {
        if let Err(err) = self.events.try_send(event) {
            debug!(error = %err, "client event not delivered");
        }
    }
}

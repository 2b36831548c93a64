//! Connection session.
//!
//! The session owns the socket. It loops through
//! `Disconnected -> Connecting -> Authenticating -> Ready` and falls back to
//! `Disconnected` on any fault, reconnecting after a fixed delay. Address
//! resolution failures and rejected handshakes end the session
//! (`Terminated`).

use crate::client::Client;
use crate::dispatcher::{Dispatcher, Outbound};
use crate::error::ClientError;
use crate::event::{report, SessionEvent};
use remotecall_protocol::{frames, ContentLengthStatus, Packet, MAX_CHUNK_SIZE, MAX_FRAME_SIZE};
use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

/// Default read buffer size; one read holds at most one maximum-size frame.
pub const DEFAULT_READ_BUFFER_SIZE: usize = MAX_FRAME_SIZE;

/// Maximum read buffer size (64 KiB).
pub const MAX_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default capacity of the outbound packet queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 128;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

const ACK_CHANNEL_CAPACITY: usize = 16;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server address as `host:port`, resolved before every connection attempt.
    pub server: String,
    /// Password sent in the handshake.
    pub password: String,
    /// Dial timeout.
    pub connect_timeout: Duration,
    /// Read deadline, measured from the last successful read.
    pub read_timeout: Duration,
    /// Fixed delay before every reconnect.
    pub reconnect_delay: Duration,
    /// How long `send_content` waits for the content length acknowledgement.
    pub negotiation_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
    /// Capacity of the outbound queue; submitting blocks while it is full.
    pub outbound_capacity: usize,
    /// Capacity of the event channel; the session blocks while it is full.
    pub event_capacity: usize,
    /// Size of a `Query` chunk in chunked sends.
    pub chunk_size: usize,
}

impl SessionConfig {
    pub fn new(server: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            password: password.into(),
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(15),
            negotiation_timeout: Duration::from_secs(60),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            chunk_size: MAX_CHUNK_SIZE,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MAX_FRAME_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
        self
    }
}

/// Session state, published to every [`Client`] through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection; a reconnect is scheduled.
    Disconnected,
    /// Resolving and dialing.
    Connecting,
    /// Handshake sent, waiting for the result.
    Authenticating,
    /// Logged in; the outbound queue is being drained.
    Ready,
    /// Stopped for good.
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Authenticating => write!(f, "authenticating"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Terminated => write!(f, "terminated"),
        }
    }
}

/// State plus the generation of the current logged-in connection.
///
/// The generation increases on every successful login, so a packet bound to
/// one connection can be told apart from packets meant for the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Link {
    pub(crate) state: SessionState,
    pub(crate) generation: u64,
}

impl Link {
    pub(crate) fn new(state: SessionState) -> Self {
        Self {
            state,
            generation: 0,
        }
    }

    /// Returns whether `generation` is the connection currently logged in.
    pub(crate) fn is_ready_on(&self, generation: u64) -> bool {
        self.state == SessionState::Ready && self.generation == generation
    }
}

/// Waiters for content length results, in the order their announcements
/// were written. `None` marks an announcement nobody waits on.
type PendingAcks = VecDeque<Option<oneshot::Sender<ContentLengthStatus>>>;

/// How one connection generation ended.
enum ConnectionEnd {
    /// Reconnect after the delay.
    Lost(ClientError),
    /// Stop the session.
    Fatal(ClientError),
    /// Every client handle is gone.
    Shutdown,
}

/// The session task. Created once, lives until a fatal fault or until every
/// [`Client`] has been dropped.
pub struct Session {
    config: SessionConfig,
    state: watch::Sender<Link>,
    events: mpsc::Sender<SessionEvent>,
    acks: broadcast::Sender<ContentLengthStatus>,
    dispatcher: Dispatcher,
    /// Consecutive connection attempts since the last login.
    attempt: u32,
}

impl Session {
    /// Creates a session (not yet running), its client handle and its event
    /// receiver.
    pub fn new(config: SessionConfig) -> (Self, Client, mpsc::Receiver<SessionEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity.max(1));
        let (acks_tx, _) = broadcast::channel(ACK_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(Link::new(SessionState::Disconnected));

        let client = Client::new(
            outbound_tx,
            acks_tx.clone(),
            state_rx,
            config.chunk_size,
            config.negotiation_timeout,
        );

        let session = Self {
            dispatcher: Dispatcher::new(outbound_rx, events_tx.clone()),
            config,
            state: state_tx,
            events: events_tx,
            acks: acks_tx,
            attempt: 0,
        };

        (session, client, events_rx)
    }

    /// Creates a session and runs it on a background task.
    pub fn spawn(config: SessionConfig) -> (Client, mpsc::Receiver<SessionEvent>, JoinHandle<()>) {
        let (session, client, events) = Self::new(config);
        let handle = tokio::spawn(session.run());
        (client, events, handle)
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().state
    }

    fn generation(&self) -> u64 {
        self.state.borrow().generation
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_if_modified(|link| {
            if link.state == state {
                return false;
            }
            tracing::debug!("session state {} -> {}", link.state, state);
            link.state = state;
            true
        });
    }

    async fn report(&self, event: SessionEvent) {
        report(&self.events, event).await;
    }

    /// Runs the connect/reconnect loop.
    pub async fn run(mut self) {
        loop {
            self.set_state(SessionState::Connecting);

            let addr = match resolve(&self.config.server).await {
                Ok(addr) => addr,
                Err(e) => {
                    self.terminate(e).await;
                    return;
                }
            };

            self.attempt += 1;
            let attempt = self.attempt;
            tracing::info!("connecting to {} (attempt {})", addr, attempt);

            match self.dial(addr).await {
                Ok(stream) => {
                    self.report(SessionEvent::Connected { attempt }).await;

                    match self.run_connection(stream).await {
                        ConnectionEnd::Lost(error) => {
                            tracing::warn!(
                                "connection lost: {}; reconnecting in {:?}",
                                error,
                                self.config.reconnect_delay
                            );
                            self.set_state(SessionState::Disconnected);
                            self.report(SessionEvent::Disconnected { error }).await;
                        }
                        ConnectionEnd::Fatal(error) => {
                            self.terminate(error).await;
                            return;
                        }
                        ConnectionEnd::Shutdown => {
                            tracing::info!("all clients dropped, closing session");
                            self.set_state(SessionState::Terminated);
                            return;
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        "connect attempt {} failed: {}; retrying in {:?}",
                        attempt,
                        error,
                        self.config.reconnect_delay
                    );
                    self.report(SessionEvent::ConnectFailed { attempt, error })
                        .await;
                }
            }

            self.set_state(SessionState::Disconnected);
            sleep(self.config.reconnect_delay).await;
        }
    }

    async fn terminate(&self, error: ClientError) {
        tracing::error!("session terminated: {}", error);
        self.set_state(SessionState::Terminated);
        self.report(SessionEvent::Terminated(error)).await;
    }

    async fn dial(&self, addr: SocketAddr) -> Result<TcpStream, ClientError> {
        let stream = timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(|source| ClientError::Connect { addr, source })?;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("failed to set TCP_NODELAY: {}", e);
        }
        Ok(stream)
    }

    /// Drives one connection until it fails or the session must stop.
    ///
    /// The handshake is the first frame of every connection; queued packets
    /// are only written once the server has accepted it.
    async fn run_connection(&mut self, stream: TcpStream) -> ConnectionEnd {
        let (mut reader, mut writer) = stream.into_split();

        self.set_state(SessionState::Authenticating);
        // A password that cannot be framed fails the same way on every try.
        let handshake = match Packet::handshake(self.config.password.clone()).encode() {
            Ok(frame) => frame,
            Err(e) => return ConnectionEnd::Fatal(e.into()),
        };
        if let Err(e) = writer.write_all(&handshake).await {
            return ConnectionEnd::Lost(ClientError::Io(e));
        }

        let read_timeout = self.config.read_timeout;
        let mut buf = vec![0u8; self.config.read_buffer_size];
        let deadline = sleep(read_timeout);
        tokio::pin!(deadline);
        let mut pending = PendingAcks::new();

        loop {
            let ready = self.state() == SessionState::Ready;

            tokio::select! {
                result = reader.read(&mut buf) => {
                    let n = match result {
                        Ok(0) => return ConnectionEnd::Lost(ClientError::ConnectionClosed),
                        Ok(n) => n,
                        Err(e) => return ConnectionEnd::Lost(ClientError::Io(e)),
                    };
                    deadline.as_mut().reset(Instant::now() + read_timeout);
                    tracing::debug!("received {} bytes", n);

                    for frame in frames(&buf[..n]) {
                        let end = match frame {
                            Ok(packet) => self.handle_packet(packet, &mut pending).await,
                            Err(e) => {
                                tracing::warn!("discarding frame: {}", e);
                                self.report(SessionEvent::Error(e.into())).await;
                                None
                            }
                        };
                        if let Some(end) = end {
                            return end;
                        }
                    }
                }

                item = self.dispatcher.next(), if ready => {
                    let Some(mut item) = item else {
                        return ConnectionEnd::Shutdown;
                    };
                    if item.is_stale(self.generation()) {
                        self.dispatcher.discard(item).await;
                        continue;
                    }
                    if let Err(e) = self.dispatcher.write(&mut writer, &item.packet).await {
                        return ConnectionEnd::Lost(e);
                    }
                    if matches!(item.packet, Packet::QueryContentLength { .. }) {
                        pending.push_back(item.ack.take());
                    }
                }

                () = &mut deadline => {
                    return ConnectionEnd::Lost(ClientError::Timeout);
                }
            }
        }
    }

    /// Routes one inbound packet.
    async fn handle_packet(
        &mut self,
        packet: Packet,
        pending: &mut PendingAcks,
    ) -> Option<ConnectionEnd> {
        tracing::debug!("received {} packet", packet.packet_type());

        match packet {
            Packet::ServerHandshakeResult { result }
                if self.state() == SessionState::Authenticating =>
            {
                if !result.is_ok() {
                    return Some(ConnectionEnd::Fatal(ClientError::AuthFailed(result)));
                }
                tracing::info!("logged in to {}", self.config.server);
                self.attempt = 0;
                self.state.send_modify(|link| {
                    link.state = SessionState::Ready;
                    link.generation += 1;
                });
                tracing::debug!("connection generation {}", self.generation());
                self.report(SessionEvent::LoggedIn).await;
            }
            Packet::ContentLengthResult { result } => {
                match pending.pop_front() {
                    Some(Some(waiter)) => {
                        if waiter.send(result).is_err() {
                            tracing::debug!("content length result ({}) arrived too late", result);
                        }
                    }
                    Some(None) => {}
                    None => tracing::warn!("unsolicited content length result ({})", result),
                }
                // Observers only; no receiver is fine.
                let _ = self.acks.send(result);
                if !result.is_ok() {
                    self.report(SessionEvent::Error(ClientError::ContentNegotiation(result)))
                        .await;
                }
            }
            Packet::QueryAccepted { query_id } => {
                self.report(SessionEvent::QueryAccepted { query_id }).await;
            }
            Packet::QueryResult { query_id, content } => {
                self.report(SessionEvent::QueryResult { query_id, content })
                    .await;
            }
            other => {
                let packet_type = other.packet_type();
                tracing::warn!("unexpected {} packet", packet_type);
                self.report(SessionEvent::Error(ClientError::UnexpectedPacket(packet_type)))
                    .await;
            }
        }
        None
    }
}

async fn resolve(server: &str) -> Result<SocketAddr, ClientError> {
    let resolve_error = |reason: String| ClientError::Resolve {
        addr: server.to_string(),
        reason,
    };

    let mut addrs = tokio::net::lookup_host(server)
        .await
        .map_err(|e| resolve_error(e.to_string()))?;
    addrs
        .next()
        .ok_or_else(|| resolve_error("no addresses found".to_string()))
}

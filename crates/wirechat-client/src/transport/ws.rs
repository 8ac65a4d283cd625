//! WebSocket transport
//!
//! Owns one persistent WebSocket connection plus the supervisor task that
//! keeps it alive: connect, pump frames both ways, and on any drop retry
//! with exponential backoff until `close()` flips the shutdown flag.

use std::sync::Mutex as StdMutex;

use core::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        handshake::client::Request,
        http::header::{HeaderValue, AUTHORIZATION},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;

use wirechat_core::{AuthToken, TransportError, WireError, WirechatError, WirechatResult};

use super::{ConnectionState, Transport, TransportEvent, TransportEventReceiver};

// ----------------------------------------------------------------------------
// Reconnect Policy
// ----------------------------------------------------------------------------

/// Configuration for reconnection behavior after a connection drop.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnection attempt
    pub initial_backoff: Duration,
    /// Upper bound for the backoff delay
    pub max_backoff: Duration,
    /// Exponential backoff multiplier
    pub backoff_multiplier: f32,
    /// Consecutive failed attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy optimized for testing (fast retries, bounded)
    pub fn fast() -> Self {
        Self {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            max_attempts: Some(3),
        }
    }

    /// Validate the policy values
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_backoff.is_zero() {
            return Err("initial_backoff must be greater than zero".into());
        }
        if self.max_backoff < self.initial_backoff {
            return Err("max_backoff must be at least initial_backoff".into());
        }
        if self.backoff_multiplier < 1.0 {
            return Err("backoff_multiplier must be at least 1.0".into());
        }
        if self.max_attempts == Some(0) {
            return Err("max_attempts must be at least 1 when set".into());
        }
        Ok(())
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        current.mul_f32(self.backoff_multiplier).min(self.max_backoff)
    }
}

// ----------------------------------------------------------------------------
// WebSocket Transport
// ----------------------------------------------------------------------------

/// Pieces handed to the supervisor task on the first `connect()` call.
struct SupervisorParts {
    outbound_rx: mpsc::Receiver<String>,
}

/// WebSocket transport with supervised reconnection.
///
/// Constructed per login session and torn down with [`Transport::close`].
/// All connection state transitions flow through one watch channel and are
/// mirrored into the event queue for the dispatcher.
pub struct WsTransport {
    endpoint: Url,
    token: AuthToken,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: mpsc::Sender<TransportEvent>,
    outbound_tx: mpsc::Sender<String>,
    parts: StdMutex<Option<SupervisorParts>>,
    shutdown_tx: watch::Sender<bool>,
}

impl WsTransport {
    /// Create a transport for the given `ws://` or `wss://` endpoint.
    ///
    /// Returns the transport together with the receiving half of its event
    /// queue. Nothing connects until [`Transport::connect`] is called.
    pub fn new(
        endpoint: &str,
        token: AuthToken,
        policy: ReconnectPolicy,
        event_buffer: usize,
    ) -> WirechatResult<(Self, TransportEventReceiver)> {
        policy.validate().map_err(WirechatError::Config)?;

        let endpoint = Url::parse(endpoint)
            .map_err(|_| WirechatError::invalid_endpoint(endpoint))?;
        match endpoint.scheme() {
            "ws" | "wss" => {}
            _ => return Err(WirechatError::invalid_endpoint(endpoint.as_str())),
        }
        // Surface bad hosts and unusable tokens at construction time rather
        // than inside the supervisor.
        upgrade_request(&endpoint, &token)?;

        let (events_tx, events_rx) = mpsc::channel(event_buffer);
        let (outbound_tx, outbound_rx) = mpsc::channel(event_buffer);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, _) = watch::channel(false);

        let transport = Self {
            endpoint,
            token,
            policy,
            state_tx,
            events_tx,
            outbound_tx,
            parts: StdMutex::new(Some(SupervisorParts { outbound_rx })),
            shutdown_tx,
        };
        Ok((transport, events_rx))
    }

    /// The endpoint this transport connects to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn connect(&self) -> WirechatResult<()> {
        if *self.shutdown_tx.borrow() {
            return Err(TransportError::Closed.into());
        }

        let parts = self.parts.lock().unwrap().take();
        let Some(parts) = parts else {
            // Supervisor already running.
            return Ok(());
        };

        let supervisor = Supervisor {
            endpoint: self.endpoint.clone(),
            token: self.token.clone(),
            policy: self.policy.clone(),
            state_tx: self.state_tx.clone(),
            events_tx: self.events_tx.clone(),
            outbound_rx: parts.outbound_rx,
            shutdown_rx: self.shutdown_tx.subscribe(),
        };
        tokio::spawn(supervisor.run());
        Ok(())
    }

    async fn send_frame(&self, frame: String) -> WirechatResult<()> {
        let state = *self.state_tx.borrow();
        if state != ConnectionState::Connected {
            debug!(%state, "dropping outbound frame while not connected");
            return Ok(());
        }
        if self.outbound_tx.send(frame).await.is_err() {
            debug!("dropping outbound frame, connection task has stopped");
        }
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    async fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        // If the supervisor never started there is nobody to publish the
        // terminal state.
        if self.parts.lock().unwrap().is_some() {
            let _ = self.state_tx.send(ConnectionState::Disconnected);
        }
    }
}

// ----------------------------------------------------------------------------
// Connection Supervisor
// ----------------------------------------------------------------------------

/// Why a live connection ended.
enum SessionEnd {
    /// Remote close, send failure, or stream error; reconnect applies.
    Dropped,
    /// Local shutdown; the supervisor must exit.
    Shutdown,
}

struct Supervisor {
    endpoint: Url,
    token: AuthToken,
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: mpsc::Sender<TransportEvent>,
    outbound_rx: mpsc::Receiver<String>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Supervisor {
    async fn run(mut self) {
        let mut backoff = self.policy.initial_backoff;
        let mut failures: u32 = 0;

        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }
            self.publish_state(ConnectionState::Connecting).await;

            let request = match upgrade_request(&self.endpoint, &self.token) {
                Ok(request) => request,
                Err(err) => {
                    // Validated at construction; a failure here is not
                    // recoverable by retrying.
                    warn!(error = %err, "cannot build websocket upgrade request");
                    break;
                }
            };

            let attempt = tokio::select! {
                result = connect_async(request) => Some(result),
                _ = self.shutdown_rx.wait_for(|stop| *stop) => None,
            };
            let Some(attempt) = attempt else { break };

            match attempt {
                Ok((stream, _response)) => {
                    info!(endpoint = %self.endpoint, "websocket connected");
                    failures = 0;
                    backoff = self.policy.initial_backoff;
                    self.publish_state(ConnectionState::Connected).await;
                    let reason = self.drive_connection(stream).await;
                    self.publish_state(ConnectionState::Disconnected).await;
                    if matches!(reason, SessionEnd::Shutdown) {
                        break;
                    }
                    warn!(endpoint = %self.endpoint, "websocket connection lost");
                }
                Err(err) => {
                    self.publish_state(ConnectionState::Disconnected).await;
                    warn!(endpoint = %self.endpoint, error = %err, "websocket connect failed");
                    failures += 1;
                    if let Some(max) = self.policy.max_attempts {
                        if failures >= max {
                            warn!(attempts = failures, "giving up on reconnection");
                            break;
                        }
                    }
                }
            }

            debug!(delay = ?backoff, "waiting before reconnect");
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = self.shutdown_rx.wait_for(|stop| *stop) => break,
            }
            backoff = self.policy.next_backoff(backoff);
        }

        self.publish_state(ConnectionState::Disconnected).await;
        debug!(endpoint = %self.endpoint, "websocket supervisor stopped");
    }

    /// Pump one live connection until it drops or shutdown is requested.
    async fn drive_connection(
        &mut self,
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ) -> SessionEnd {
        let (mut sink, mut source) = stream.split();
        loop {
            tokio::select! {
                frame = self.outbound_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            if let Err(err) = sink.send(Message::Text(frame)).await {
                                warn!(error = %err, "websocket send failed");
                                return SessionEnd::Dropped;
                            }
                        }
                        // Transport handle dropped without close().
                        None => return SessionEnd::Shutdown,
                    }
                }
                inbound = source.next() => {
                    match inbound {
                        Some(Ok(Message::Text(frame))) => {
                            let _ = self.events_tx.send(TransportEvent::Frame(frame)).await;
                        }
                        Some(Ok(Message::Binary(_))) => {
                            let _ = self
                                .events_tx
                                .send(TransportEvent::Malformed(WireError::NonTextFrame))
                                .await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("websocket closed by remote");
                            return SessionEnd::Dropped;
                        }
                        // Ping and pong are answered by the library.
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(error = %err, "websocket receive failed");
                            return SessionEnd::Dropped;
                        }
                    }
                }
                _ = self.shutdown_rx.wait_for(|stop| *stop) => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    /// Record the new state and mirror it into the event queue, keeping the
    /// queue ordered relative to inbound frames. Unchanged states are not
    /// reannounced.
    async fn publish_state(&self, next: ConnectionState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            let _ = self.events_tx.send(TransportEvent::StateChanged(next)).await;
        }
    }
}

/// Build the HTTP upgrade request, attaching the bearer token when present.
fn upgrade_request(endpoint: &Url, token: &AuthToken) -> WirechatResult<Request> {
    let mut request = endpoint
        .as_str()
        .into_client_request()
        .map_err(|err| WirechatError::connect_failed(err.to_string()))?;
    if !token.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {}", token.expose()))
            .map_err(|_| WirechatError::connect_failed("auth token is not header-safe"))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

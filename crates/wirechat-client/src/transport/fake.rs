//! In-memory transport for tests
//!
//! Stands in for [`WsTransport`](super::WsTransport) without any network.
//! Tests script the server side by pushing events into the queue and assert
//! on the frames the client handed to `send_frame`.

use std::sync::Mutex as StdMutex;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use wirechat_core::{ClientEvent, ServerEvent, WireError, WirechatResult};

use super::{ConnectionState, Transport, TransportEvent, TransportEventReceiver};

// ----------------------------------------------------------------------------
// Fake Transport
// ----------------------------------------------------------------------------

/// Scriptable transport double.
///
/// `connect()` reports `Connecting` then `Connected` immediately; state is
/// otherwise driven explicitly through [`FakeTransport::set_state`], which
/// makes reconnect behavior reproducible in tests.
pub struct FakeTransport {
    state_tx: watch::Sender<ConnectionState>,
    events_tx: mpsc::Sender<TransportEvent>,
    sent: StdMutex<Vec<String>>,
    dropped: StdMutex<u64>,
}

impl FakeTransport {
    /// Create a fake transport and the event queue consumed by the client.
    pub fn new(event_buffer: usize) -> (Self, TransportEventReceiver) {
        let (events_tx, events_rx) = mpsc::channel(event_buffer);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let transport = Self {
            state_tx,
            events_tx,
            sent: StdMutex::new(Vec::new()),
            dropped: StdMutex::new(0),
        };
        (transport, events_rx)
    }

    /// Deliver a raw inbound text frame, as if received from the server.
    pub async fn push_frame(&self, frame: impl Into<String>) {
        let _ = self.events_tx.send(TransportEvent::Frame(frame.into())).await;
    }

    /// Deliver a well-formed server event.
    pub async fn push_server_event(&self, event: &ServerEvent) -> WirechatResult<()> {
        let frame = event.encode()?;
        self.push_frame(frame).await;
        Ok(())
    }

    /// Deliver traffic the transport itself rejected, e.g. a binary frame.
    pub async fn push_malformed(&self, error: WireError) {
        let _ = self.events_tx.send(TransportEvent::Malformed(error)).await;
    }

    /// Drive the connection state, announcing the change when it differs.
    pub async fn set_state(&self, next: ConnectionState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            let _ = self.events_tx.send(TransportEvent::StateChanged(next)).await;
        }
    }

    /// Raw frames the client sent, in order.
    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Sent frames decoded as client events, for structural assertions.
    pub fn sent_client_events(&self) -> Vec<ClientEvent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|frame| ClientEvent::decode(frame).ok())
            .collect()
    }

    /// Forget recorded frames, keeping the connection state.
    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Frames dropped because the fake was not connected.
    pub fn dropped_frames(&self) -> u64 {
        *self.dropped.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn connect(&self) -> WirechatResult<()> {
        self.set_state(ConnectionState::Connecting).await;
        self.set_state(ConnectionState::Connected).await;
        Ok(())
    }

    async fn send_frame(&self, frame: String) -> WirechatResult<()> {
        if *self.state_tx.borrow() != ConnectionState::Connected {
            debug!("fake transport dropping frame while not connected");
            *self.dropped.lock().unwrap() += 1;
            return Ok(());
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    async fn close(&self) {
        self.set_state(ConnectionState::Disconnected).await;
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use wirechat_core::UserId;

    #[tokio::test]
    async fn test_records_frames_only_while_connected() {
        let (transport, _events) = FakeTransport::new(8);

        transport.send_frame("lost".into()).await.unwrap();
        assert!(transport.sent_frames().is_empty());
        assert_eq!(transport.dropped_frames(), 1);

        transport.connect().await.unwrap();
        transport.send_frame("kept".into()).await.unwrap();
        assert_eq!(transport.sent_frames(), vec!["kept".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_announces_state_progression() {
        let (transport, mut events) = FakeTransport::new(8);
        transport.connect().await.unwrap();

        let first = events.recv().await.unwrap();
        assert!(matches!(
            first,
            TransportEvent::StateChanged(ConnectionState::Connecting)
        ));
        let second = events.recv().await.unwrap();
        assert!(matches!(
            second,
            TransportEvent::StateChanged(ConnectionState::Connected)
        ));
    }

    #[tokio::test]
    async fn test_unchanged_state_is_not_reannounced() {
        let (transport, mut events) = FakeTransport::new(8);
        transport.set_state(ConnectionState::Connected).await;
        transport.set_state(ConnectionState::Connected).await;
        transport.push_frame("marker").await;

        assert!(matches!(
            events.recv().await.unwrap(),
            TransportEvent::StateChanged(ConnectionState::Connected)
        ));
        // The duplicate transition produced no second state event.
        assert!(matches!(events.recv().await.unwrap(), TransportEvent::Frame(_)));
    }

    #[tokio::test]
    async fn test_sent_client_events_decodes_frames() {
        let (transport, _events) = FakeTransport::new(8);
        transport.connect().await.unwrap();

        let event = ClientEvent::GetSessions {
            user_id: UserId::new("u1"),
        };
        transport.send_frame(event.encode().unwrap()).await.unwrap();

        assert_eq!(transport.sent_client_events(), vec![event]);
    }
}

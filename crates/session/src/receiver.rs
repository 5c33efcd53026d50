//! Receiver state machine.
//!
//! `Idle -> Connecting -> AwaitingMetadata -> Receiving -> Complete`, with
//! `Error` reachable from every non-terminal state. The channel must open
//! within the configured connect timeout.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shata_data_channel::{
    ChannelEvent, Connection, DataChannel, PeerTransport, normalize_code, peer_id,
};
use shata_transfer::{
    ReceivedFile, ReceiverEngine, ReceiverUpdate, Role, SessionState, TransferSession,
};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::handshake::wait_for_open;
use crate::types::{
    EventSender, SESSION_EVENT_CAPACITY, SessionEvent, SessionEvents, event_channel,
};

/// Receives one file from the sender registered under a pairing code.
pub struct ReceiverSession<T: PeerTransport> {
    id: Uuid,
    transport: T,
    config: SessionConfig,
    session: TransferSession,
    engine: ReceiverEngine,
    connection: Option<Connection<T::Channel>>,
    cancel: CancellationToken,
    events_tx: EventSender,
    events_rx: Option<SessionEvents>,
}

impl<T: PeerTransport> ReceiverSession<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let (events_tx, events_rx) = event_channel(SESSION_EVENT_CAPACITY);
        let engine = ReceiverEngine::new().with_strict_size_check(config.strict_size_check);
        Self {
            id: Uuid::new_v4(),
            transport,
            config,
            session: TransferSession::new(Role::Receiver),
            engine,
            connection: None,
            cancel: CancellationToken::new(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<SessionEvents> {
        self.events_rx.take()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    /// Connects to `code` and receives the file it offers.
    pub async fn receive_file(&mut self, code: &str) -> Result<ReceivedFile, SessionError> {
        self.connect(code).await?;
        self.receive().await
    }

    /// Dials the sender behind `code` and waits for the channel to open.
    ///
    /// Malformed codes fail without touching the transport. Dialing and
    /// opening together must finish within the connect timeout.
    pub async fn connect(&mut self, code: &str) -> Result<(), SessionError> {
        if self.state() != SessionState::Idle {
            return Err(SessionError::InvalidState(self.state()));
        }
        let code = match normalize_code(code) {
            Ok(code) => code,
            Err(e) => return Err(self.fail(e.into())),
        };

        self.set_state(SessionState::Connecting);
        let target = peer_id(&code);
        info!(session = %self.id, code = %code, "connecting to sender");

        let limit = self.config.connect_timeout;
        let cancel = self.cancel.clone();
        let dial = async {
            let mut conn = tokio::select! {
                result = self.transport.connect(&target) => result.map_err(SessionError::from)?,
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            };
            wait_for_open(&mut conn.events, &cancel).await?;
            Ok::<_, SessionError>(conn)
        };

        match tokio::time::timeout(limit, dial).await {
            Ok(Ok(conn)) => {
                self.connection = Some(conn);
                self.set_state(SessionState::AwaitingMetadata);
                debug!(session = %self.id, "channel open");
                Ok(())
            }
            Ok(Err(e)) => Err(self.fail(e)),
            Err(_) => Err(self.fail(SessionError::ConnectionTimeout(limit))),
        }
    }

    /// Consumes channel events until the file is complete or the session
    /// fails.
    pub async fn receive(&mut self) -> Result<ReceivedFile, SessionError> {
        if self.state() != SessionState::AwaitingMetadata {
            return Err(SessionError::InvalidState(self.state()));
        }
        let Some(mut conn) = self.connection.take() else {
            return Err(SessionError::InvalidState(self.state()));
        };

        let cancel = self.cancel.clone();
        loop {
            let event = tokio::select! {
                event = conn.events.recv() => event,
                _ = cancel.cancelled() => return Err(self.fail(SessionError::Cancelled)),
            };

            match event {
                Some(ChannelEvent::Data(msg)) => {
                    match self.engine.on_message(&mut self.session, msg) {
                        Ok(ReceiverUpdate::Started(metadata)) => {
                            self.events_tx.emit(SessionEvent::StateChanged(SessionState::Receiving));
                            self.events_tx.emit(SessionEvent::MetadataReceived(metadata));
                        }
                        Ok(ReceiverUpdate::Progress(progress)) => {
                            self.events_tx.emit(SessionEvent::Progress(progress));
                        }
                        Ok(ReceiverUpdate::Finished(file)) => {
                            conn.channel.close();
                            self.events_tx.emit(SessionEvent::StateChanged(SessionState::Complete));
                            self.events_tx.emit(SessionEvent::Completed(Some(file.clone())));
                            info!(
                                session = %self.id,
                                name = %file.metadata.name,
                                bytes = file.data.len(),
                                "file received"
                            );
                            return Ok(file);
                        }
                        Err(e) => return Err(self.fail(e.into())),
                    }
                }
                Some(ChannelEvent::Open) => {}
                Some(ChannelEvent::Error(reason)) => {
                    return Err(self.fail(SessionError::Transport(reason)));
                }
                Some(ChannelEvent::Close) | None => {
                    let err = match self.engine.on_close(&mut self.session) {
                        Err(e) => e.into(),
                        Ok(()) => SessionError::InvalidState(self.state()),
                    };
                    return Err(self.fail(err));
                }
            }
        }
    }

    /// Cancels any in-flight work, drops the connection and returns to `Idle`.
    pub fn reset(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.connection = None;
        self.session.reset();
        self.engine = ReceiverEngine::new().with_strict_size_check(self.config.strict_size_check);
        self.events_tx.emit(SessionEvent::StateChanged(SessionState::Idle));
        debug!(session = %self.id, "receiver session reset");
    }

    fn set_state(&mut self, state: SessionState) {
        self.session.set_state(state);
        self.events_tx.emit(SessionEvent::StateChanged(state));
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        warn!(session = %self.id, error = %err, kind = ?err.kind(), "receiver session failed");
        self.connection = None;
        self.set_state(SessionState::Error);
        self.events_tx.emit(SessionEvent::failed(&err));
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use shata_data_channel::{ChannelError, MemoryChannel, MemoryListener, MemoryNetwork};
    use shata_protocol::WireMessage;
    use shata_protocol::constants::CHUNK_SIZE;
    use shata_transfer::FileSource;

    use crate::error::ErrorKind;
    use crate::sender::SenderSession;

    /// Connects, but the channel never reports `Open`.
    struct StalledTransport {
        held: std::sync::Mutex<Vec<mpsc::Sender<ChannelEvent>>>,
        inner: MemoryNetwork,
    }

    impl PeerTransport for StalledTransport {
        type Channel = MemoryChannel;
        type Listener = MemoryListener;

        async fn register(&self, peer_id: &str) -> Result<MemoryListener, ChannelError> {
            self.inner.register(peer_id).await
        }

        async fn connect(&self, _peer_id: &str) -> Result<Connection<MemoryChannel>, ChannelError> {
            // Borrow a real channel so the types line up, but hand out an
            // event queue that stays silent.
            let listener = self.inner.register("stalled").await?;
            let real = self.inner.connect("stalled").await?;
            drop(listener);
            let (tx, rx) = mpsc::channel(1);
            if let Ok(mut held) = self.held.lock() {
                held.push(tx);
            }
            Ok(Connection {
                channel: real.channel,
                events: rx,
            })
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    fn drain(rx: &mut SessionEvents) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn end_to_end_transfer() {
        let network = MemoryNetwork::new();
        let mut sender = SenderSession::new(network.clone(), SessionConfig::default());
        let code = sender.register().await.unwrap();

        let original = pattern(150_000);
        let send_task = tokio::spawn({
            let data = original.clone();
            async move {
                let source = FileSource::from_bytes("photo.jpg", "image/jpeg", data);
                let result = sender.serve(source).await;
                (result, sender)
            }
        });

        let mut receiver = ReceiverSession::new(network.clone(), SessionConfig::default());
        let mut events = receiver.take_events().unwrap();
        // Codes are accepted in any case with surrounding whitespace.
        let file = receiver
            .receive_file(&format!("  {}  ", code.to_lowercase()))
            .await
            .unwrap();

        assert_eq!(file.data, original);
        assert_eq!(file.metadata.name, "photo.jpg");
        assert_eq!(file.mime_type(), "image/jpeg");
        assert!(file.size_matches());
        assert_eq!(receiver.state(), SessionState::Complete);
        assert_eq!(receiver.session().bytes_transferred(), 150_000);

        let (sent, sender) = send_task.await.unwrap();
        assert_eq!(sent.unwrap(), 150_000);
        assert_eq!(sender.state(), SessionState::Complete);

        let events = drain(&mut events);
        let states: Vec<SessionState> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::StateChanged(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                SessionState::Connecting,
                SessionState::AwaitingMetadata,
                SessionState::Receiving,
                SessionState::Complete,
            ]
        );
        let progress: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Progress(p) => Some(p.bytes_transferred),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![65_536, 131_072, 150_000]);
        assert!(matches!(events.last(), Some(SessionEvent::Completed(Some(_)))));
    }

    #[tokio::test]
    async fn tuned_config_on_both_ends_transfers() {
        let config = SessionConfig {
            high_water_mark: 2 * CHUNK_SIZE,
            poll_interval: Duration::from_millis(1),
            strict_size_check: true,
            ..SessionConfig::default()
        };
        config.validate().unwrap();
        let network = MemoryNetwork::new();
        let mut sender = SenderSession::new(network.clone(), config.clone());
        let code = sender.register().await.unwrap();

        let original = pattern(150_000);
        let send_task = tokio::spawn({
            let data = original.clone();
            async move {
                sender
                    .serve(FileSource::from_bytes("photo.jpg", "image/jpeg", data))
                    .await
            }
        });

        let mut receiver = ReceiverSession::new(network, config);
        let file = receiver.receive_file(&code).await.unwrap();
        assert_eq!(file.data, original);
        assert_eq!(file.missing_chunks, 0);
        assert_eq!(send_task.await.unwrap().unwrap(), 150_000);
    }

    #[tokio::test]
    async fn sender_lifecycle_events_reach_a_late_consumer() {
        let network = MemoryNetwork::new();
        let mut sender = SenderSession::new(network.clone(), SessionConfig::default());
        let mut sender_events = sender.take_events().unwrap();
        let code = sender.register().await.unwrap();

        let size = 8 * 1024 * 1024;
        let send_task = tokio::spawn(async move {
            let result = sender
                .serve(FileSource::from_bytes("big.bin", "", pattern(size)))
                .await;
            (result, sender)
        });

        let mut receiver = ReceiverSession::new(network, SessionConfig::default());
        let file = receiver.receive_file(&code).await.unwrap();
        assert_eq!(file.data.len(), size);
        let (result, sender) = send_task.await.unwrap();
        assert_eq!(result.unwrap(), size as u64);
        drop(sender);

        // Nothing was read while 128 progress snapshots were produced.
        let mut events = Vec::new();
        while let Some(event) = sender_events.recv().await {
            events.push(event);
        }
        let progress = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Progress(_)))
            .count();
        assert!(progress <= SESSION_EVENT_CAPACITY);
        assert!(events.contains(&SessionEvent::StateChanged(SessionState::Transferring)));
        assert_eq!(
            &events[events.len() - 2..],
            &[
                SessionEvent::StateChanged(SessionState::Complete),
                SessionEvent::Completed(None),
            ]
        );
    }

    #[tokio::test]
    async fn invalid_code_fails_without_dialing() {
        let mut receiver = ReceiverSession::new(MemoryNetwork::new(), SessionConfig::default());
        let mut events = receiver.take_events().unwrap();

        let err = receiver.connect("ABC").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCode);
        assert_eq!(receiver.state(), SessionState::Error);
        assert_eq!(
            drain(&mut events),
            vec![
                SessionEvent::StateChanged(SessionState::Error),
                SessionEvent::Failed {
                    kind: ErrorKind::InvalidCode,
                    message: "Please enter a 6-character code.".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn unknown_code_is_peer_unavailable() {
        let mut receiver = ReceiverSession::new(MemoryNetwork::new(), SessionConfig::default());
        let err = receiver.connect("ABCDEF").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PeerUnavailable);
        assert_eq!(err.user_message(), "Invalid code or sender not available.");
        assert_eq!(receiver.state(), SessionState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn channel_that_never_opens_times_out() {
        let transport = StalledTransport {
            held: std::sync::Mutex::new(Vec::new()),
            inner: MemoryNetwork::new(),
        };
        let mut receiver = ReceiverSession::new(transport, SessionConfig::default());

        let started = tokio::time::Instant::now();
        let err = receiver.connect("ABCDEF").await.unwrap_err();
        assert!(matches!(err, SessionError::ConnectionTimeout(d) if d == Duration::from_secs(15)));
        assert_eq!(err.user_message(), "Connection timeout. Check the code and try again.");
        assert_eq!(receiver.state(), SessionState::Error);
        assert!(started.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test]
    async fn sender_closing_mid_transfer_is_connection_lost() {
        let network = MemoryNetwork::new();
        let mut listener = network.register(&peer_id("ABCDEF")).await.unwrap();

        let sender_side = tokio::spawn(async move {
            use shata_data_channel::PeerListener;
            let conn = listener.accept().await.unwrap();
            conn.channel
                .send(&WireMessage::Metadata(shata_protocol::FileMetadata {
                    name: "half.bin".into(),
                    size: 2 * CHUNK_SIZE as u64,
                    mime_type: String::new(),
                }))
                .unwrap();
            conn.channel
                .send(&WireMessage::chunk(0, vec![7; CHUNK_SIZE]))
                .unwrap();
            // Dropping the connection closes the channel before `complete`.
        });

        let mut receiver = ReceiverSession::new(network.clone(), SessionConfig::default());
        let err = receiver.receive_file("abcdef").await.unwrap_err();
        sender_side.await.unwrap();

        assert!(matches!(
            err,
            SessionError::ConnectionLost {
                received,
                expected: Some(expected),
            } if received == CHUNK_SIZE as u64 && expected == 2 * CHUNK_SIZE as u64
        ));
        assert_eq!(receiver.state(), SessionState::Error);
    }

    #[tokio::test]
    async fn protocol_violation_fails_session() {
        let network = MemoryNetwork::new();
        let mut listener = network.register(&peer_id("ABCDEF")).await.unwrap();

        let sender_side = tokio::spawn(async move {
            use shata_data_channel::PeerListener;
            let conn = listener.accept().await.unwrap();
            conn.channel.send(&WireMessage::chunk(0, b"early".to_vec())).unwrap();
            // Keep the channel open until the receiver has given up.
            tokio::time::sleep(Duration::from_millis(50)).await;
        });

        let mut receiver = ReceiverSession::new(network.clone(), SessionConfig::default());
        let err = receiver.receive_file("ABCDEF").await.unwrap_err();
        sender_side.await.unwrap();

        assert_eq!(err.kind(), ErrorKind::TransferFailed);
        assert_eq!(receiver.state(), SessionState::Error);
    }

    #[tokio::test]
    async fn reset_allows_a_new_attempt() {
        let network = MemoryNetwork::new();
        let mut receiver = ReceiverSession::new(network.clone(), SessionConfig::default());
        receiver.connect("ABCDEF").await.unwrap_err();
        assert_eq!(receiver.state(), SessionState::Error);

        // Connecting again without a reset is refused.
        assert!(matches!(
            receiver.connect("ABCDEF").await,
            Err(SessionError::InvalidState(SessionState::Error))
        ));

        receiver.reset();
        assert_eq!(receiver.state(), SessionState::Idle);
        assert!(receiver.session().metadata().is_none());

        let mut sender = SenderSession::new(network.clone(), SessionConfig::default());
        let code = sender.register().await.unwrap();
        let send_task = tokio::spawn(async move {
            sender
                .serve(FileSource::from_bytes("a.txt", "text/plain", b"hello".to_vec()))
                .await
        });

        let file = receiver.receive_file(&code).await.unwrap();
        assert_eq!(file.data, b"hello");
        assert_eq!(send_task.await.unwrap().unwrap(), 5);
    }

    #[tokio::test]
    async fn empty_file_round_trip() {
        let network = MemoryNetwork::new();
        let mut sender = SenderSession::new(network.clone(), SessionConfig::default());
        let code = sender.register().await.unwrap();
        let send_task = tokio::spawn(async move {
            sender
                .serve(FileSource::from_bytes("empty", "", Vec::new()))
                .await
        });

        let mut receiver = ReceiverSession::new(network, SessionConfig::default());
        let file = receiver.receive_file(&code).await.unwrap();
        assert!(file.data.is_empty());
        assert!(file.size_matches());
        assert_eq!(send_task.await.unwrap().unwrap(), 0);
    }
}

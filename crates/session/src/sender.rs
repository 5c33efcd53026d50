//! Sender state machine.
//!
//! `Idle -> Connecting -> WaitingForPeer -> Transferring -> Complete`, with
//! `Error` reachable from every non-terminal state. Code collisions are
//! retried inside `Connecting` and never surface.

use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shata_data_channel::{
    ChannelError, ChannelEvent, DataChannel, PeerListener, PeerTransport, generate_code, peer_id,
};
use shata_transfer::{
    FileSource, Role, SenderEngine, SessionState, TransferError, TransferSession,
};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::handshake::wait_for_open_within;
use crate::types::{
    EventSender, SESSION_EVENT_CAPACITY, SessionEvent, SessionEvents, event_channel,
};

/// How the engine run ended.
enum Outcome {
    Finished(Result<u64, TransferError>),
    PeerClosed,
    PeerError(String),
}

/// Offers one file under a freshly generated pairing code.
pub struct SenderSession<T: PeerTransport> {
    id: Uuid,
    transport: T,
    config: SessionConfig,
    session: TransferSession,
    code: Option<String>,
    listener: Option<T::Listener>,
    cancel: CancellationToken,
    events_tx: EventSender,
    events_rx: Option<SessionEvents>,
}

impl<T: PeerTransport> SenderSession<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let (events_tx, events_rx) = event_channel(SESSION_EVENT_CAPACITY);
        Self {
            id: Uuid::new_v4(),
            transport,
            config,
            session: TransferSession::new(Role::Sender),
            code: None,
            listener: None,
            cancel: CancellationToken::new(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<SessionEvents> {
        self.events_rx.take()
    }

    /// Token that aborts the current attempt, including a backpressure wait.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// The registered pairing code, if any.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    /// Registers a code, waits for the receiver and sends `source`.
    pub async fn send_file<R>(&mut self, source: FileSource<R>) -> Result<u64, SessionError>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.register().await?;
        self.serve(source).await
    }

    /// Registers under a new pairing code, regenerating on collisions.
    ///
    /// On success the session waits for a peer and the code is returned.
    pub async fn register(&mut self) -> Result<String, SessionError> {
        if self.state() != SessionState::Idle {
            return Err(SessionError::InvalidState(self.state()));
        }
        self.set_state(SessionState::Connecting);

        let cancel = self.cancel.clone();
        let max_attempts = self.config.max_registration_attempts;
        for attempt in 1..=max_attempts {
            let code = generate_code();
            let peer = peer_id(&code);
            let registered = tokio::select! {
                result = self.transport.register(&peer) => Some(result),
                _ = cancel.cancelled() => None,
            };

            match registered {
                None => return Err(self.fail(SessionError::Cancelled)),
                Some(Ok(listener)) => {
                    info!(session = %self.id, code = %code, attempt, "pairing code registered");
                    self.listener = Some(listener);
                    self.code = Some(code.clone());
                    self.events_tx.emit(SessionEvent::CodeAssigned(code.clone()));
                    self.set_state(SessionState::WaitingForPeer);
                    return Ok(code);
                }
                Some(Err(ChannelError::IdentifierInUse(_))) => {
                    debug!(session = %self.id, code = %code, attempt, "pairing code in use, regenerating");
                }
                Some(Err(e)) => return Err(self.fail(e.into())),
            }
        }

        Err(self.fail(SessionError::RegistrationExhausted(max_attempts)))
    }

    /// Waits for the receiver to connect, then streams `source` to it.
    ///
    /// The registration is released once a peer connects, so a code serves
    /// exactly one receiver.
    pub async fn serve<R>(&mut self, source: FileSource<R>) -> Result<u64, SessionError>
    where
        R: AsyncRead + Unpin + Send,
    {
        if self.state() != SessionState::WaitingForPeer {
            return Err(SessionError::InvalidState(self.state()));
        }
        let Some(mut listener) = self.listener.take() else {
            return Err(SessionError::InvalidState(self.state()));
        };

        let cancel = self.cancel.clone();
        let accepted = tokio::select! {
            result = listener.accept() => Some(result),
            _ = cancel.cancelled() => None,
        };
        drop(listener);

        let mut conn = match accepted {
            None => return Err(self.fail(SessionError::Cancelled)),
            Some(Err(e)) => return Err(self.fail(e.into())),
            Some(Ok(conn)) => conn,
        };
        if let Err(e) =
            wait_for_open_within(&mut conn.events, &cancel, self.config.connect_timeout).await
        {
            return Err(self.fail(e));
        }
        info!(session = %self.id, "receiver connected");
        self.set_state(SessionState::Transferring);

        let events_tx = self.events_tx.clone();
        let (progress_tx, mut progress_rx) = mpsc::channel(SESSION_EVENT_CAPACITY);
        let engine =
            SenderEngine::new(self.config.send_options(), cancel.clone()).with_progress(progress_tx);

        let outcome = {
            let send = engine.send(&conn.channel, &mut self.session, source);
            tokio::pin!(send);
            loop {
                tokio::select! {
                    biased;
                    result = &mut send => break Outcome::Finished(result),
                    Some(progress) = progress_rx.recv() => {
                        events_tx.emit(SessionEvent::Progress(progress));
                    }
                    event = conn.events.recv() => match event {
                        Some(ChannelEvent::Close) | None => break Outcome::PeerClosed,
                        Some(ChannelEvent::Error(reason)) => break Outcome::PeerError(reason),
                        Some(ChannelEvent::Data(msg)) => {
                            debug!(kind = msg.kind(), "ignoring message from receiver");
                        }
                        Some(ChannelEvent::Open) => {}
                    },
                }
            }
        };
        while let Ok(progress) = progress_rx.try_recv() {
            events_tx.emit(SessionEvent::Progress(progress));
        }

        match outcome {
            Outcome::Finished(Ok(sent)) => {
                conn.channel.close();
                self.set_state(SessionState::Complete);
                self.events_tx.emit(SessionEvent::Completed(None));
                info!(session = %self.id, bytes = sent, "file sent");
                Ok(sent)
            }
            Outcome::Finished(Err(TransferError::Channel(ChannelError::Closed)))
            | Outcome::PeerClosed => Err(self.fail(self.lost())),
            Outcome::PeerError(reason) => {
                warn!(session = %self.id, reason = %reason, "transport error mid-transfer");
                Err(self.fail(self.lost()))
            }
            Outcome::Finished(Err(e)) => Err(self.fail(e.into())),
        }
    }

    /// Cancels any in-flight work, releases the code and returns to `Idle`.
    pub fn reset(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.listener = None;
        self.code = None;
        self.session.reset();
        self.events_tx.emit(SessionEvent::StateChanged(SessionState::Idle));
        debug!(session = %self.id, "sender session reset");
    }

    fn lost(&self) -> SessionError {
        SessionError::ConnectionLost {
            received: self.session.bytes_transferred(),
            expected: self.session.metadata().map(|m| m.size),
        }
    }

    fn set_state(&mut self, state: SessionState) {
        self.session.set_state(state);
        self.events_tx.emit(SessionEvent::StateChanged(state));
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        warn!(session = %self.id, error = %err, kind = ?err.kind(), "sender session failed");
        self.listener = None;
        self.set_state(SessionState::Error);
        self.events_tx.emit(SessionEvent::failed(&err));
        err
    }
}

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use shata_data_channel::ChannelEvent;

use crate::error::SessionError;

/// Waits for the channel's `Open` event.
pub(crate) async fn wait_for_open(
    events: &mut mpsc::Receiver<ChannelEvent>,
    cancel: &CancellationToken,
) -> Result<(), SessionError> {
    let event = tokio::select! {
        event = events.recv() => event,
        _ = cancel.cancelled() => return Err(SessionError::Cancelled),
    };
    match event {
        Some(ChannelEvent::Open) => Ok(()),
        Some(ChannelEvent::Error(reason)) => Err(SessionError::Transport(reason)),
        Some(ChannelEvent::Data(msg)) => Err(SessionError::Transport(format!(
            "{} received before the channel opened",
            msg.kind()
        ))),
        Some(ChannelEvent::Close) | None => Err(SessionError::Transport(
            "channel closed before opening".into(),
        )),
    }
}

/// Like [`wait_for_open`], bounded by `limit`.
pub(crate) async fn wait_for_open_within(
    events: &mut mpsc::Receiver<ChannelEvent>,
    cancel: &CancellationToken,
    limit: Duration,
) -> Result<(), SessionError> {
    tokio::time::timeout(limit, wait_for_open(events, cancel))
        .await
        .map_err(|_| SessionError::ConnectionTimeout(limit))?
}

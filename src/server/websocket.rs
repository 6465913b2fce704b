use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use bytes::Bytes;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;

use super::AppState;
use crate::stream::{Inbound, ServerMessage, StreamSession};
use crate::validation::validate_frame;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Frames waiting behind the one in flight. When full, the reader stops
/// pulling from the socket until the session catches up.
const FRAME_QUEUE_DEPTH: usize = 4;
const OUTBOUND_BUFFER: usize = 32;
/// How long a close handshake may take before the socket is just dropped.
const CLOSE_GRACE: Duration = Duration::from_secs(1);
/// Websocket framing allowance on top of the frame size limit.
const MESSAGE_OVERHEAD_BYTES: usize = 16 * 1024;

pub async fn stream_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let max_message = state.config.limits.max_frame_bytes + MESSAGE_OVERHEAD_BYTES;
    ws.max_message_size(max_message)
        .on_upgrade(move |socket| serve_session(socket, state))
}

/// Wires one socket to a [`StreamSession`]: a reader task validates inbound
/// frames, a writer task is the only thing that writes to the socket, and the
/// session runs in between.
async fn serve_session(socket: WebSocket, state: AppState) {
    let ticket = state.registry.register();
    let session_id = ticket.id();
    let cancel = ticket.cancel_token();
    log_info!(
        "client connected: session {} ({} active)",
        session_id,
        state.registry.active_count()
    );

    let (sink, mut stream) = socket.split();
    let (out_tx, out_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);
    let (in_tx, in_rx) = mpsc::channel::<Inbound>(FRAME_QUEUE_DEPTH);

    let writer = tokio::spawn(pump_outbound(sink, out_rx, cancel.clone()));

    let reader_cancel = cancel.clone();
    let max_frame = state.config.limits.max_frame_bytes;
    let reader = tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                _ = reader_cancel.cancelled() => break,
                next = stream.next() => next,
            };

            let item = match next {
                Some(Ok(Message::Binary(data))) => match validate_frame(&data, max_frame) {
                    Ok(kind) => {
                        log_debug!("session {} received {} frame", session_id, kind.mime_type());
                        Inbound::Frame(Bytes::from(data))
                    }
                    Err(err) => Inbound::Rejected(err.to_string()),
                },
                Some(Ok(Message::Text(_))) => {
                    Inbound::Rejected("Expected a binary image frame".to_string())
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    log_warn!("session {} socket error: {err}", session_id);
                    break;
                }
            };

            let sent = tokio::select! {
                _ = reader_cancel.cancelled() => break,
                sent = in_tx.send(item) => sent,
            };
            if sent.is_err() {
                break;
            }
        }
        reader_cancel.cancel();
    });

    let session = StreamSession::new(session_id, Arc::clone(&state.pipeline), out_tx, cancel.clone());
    let summary = session.run(in_rx).await;

    cancel.cancel();
    if let Err(err) = reader.await {
        log_error!("session {} reader task failed: {err}", session_id);
    }
    if let Err(err) = writer.await {
        log_error!("session {} writer task failed: {err}", session_id);
    }

    drop(ticket);
    log_info!(
        "client disconnected: session {} after {} frame(s)",
        session_id,
        summary.frames
    );
}

/// Serializes session messages onto the socket. The only writer of `sink`.
/// Stops when the session ends, the client stops accepting writes or `cancel`
/// fires, whichever comes first.
async fn pump_outbound<S>(
    mut sink: S,
    mut out_rx: mpsc::Receiver<ServerMessage>,
    cancel: CancellationToken,
) where
    S: Sink<Message> + Unpin,
{
    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            message = out_rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(err) => {
                log_error!("failed to serialize {} message: {err}", message.kind());
                continue;
            }
        };
        let sent = tokio::select! {
            _ = cancel.cancelled() => break,
            sent = sink.send(Message::Text(text)) => sent,
        };
        if sent.is_err() {
            cancel.cancel();
            break;
        }
    }
    if timeout(CLOSE_GRACE, sink.close()).await.is_err() {
        log_debug!("socket close timed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// A client that never reads: every write stays pending.
    struct Stalled;

    impl Sink<Message> for Stalled {
        type Error = std::convert::Infallible;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _: Message) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }
    }

    #[tokio::test]
    async fn stalled_client_does_not_outlive_cancellation() {
        let (out_tx, out_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let writer = tokio::spawn(pump_outbound(Stalled, out_rx, cancel.clone()));

        out_tx.send(ServerMessage::processing()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!writer.is_finished());

        cancel.cancel();
        timeout(Duration::from_secs(5), writer)
            .await
            .expect("writer stops after cancel")
            .unwrap();
    }
}

//! Websocket server: accepts viewer connections and drives their sessions.
//!
//! One task per connection. The task multiplexes inbound control messages
//! with the pacing deadline; the deadline is re-armed only after a send
//! completes, so no two sends for one connection are ever in flight and a
//! slow transport simply stretches the pacing.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::WirePayload;
use crate::controller::TickOutcome;
use crate::error::{Result, StreamError};
use crate::session::ConnectionSession;
use crate::settings::Settings;
use crate::source::FrameSource;
use crate::transport::FrameSink;

/// Sink half of one websocket connection.
struct WsSink {
    inner: futures::stream::SplitSink<WebSocketStream<TcpStream>, Message>,
}

#[async_trait::async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, payload: WirePayload) -> Result<()> {
        let message = match payload {
            WirePayload::Binary(bytes) => Message::Binary(bytes),
            WirePayload::Text(text) => Message::Text(text.into()),
        };
        self.inner
            .send(message)
            .await
            .map_err(|e| StreamError::transport_with_source("websocket send", Box::new(e)))
    }
}

/// Accept viewer connections until cancelled.
pub async fn serve<S: FrameSource>(
    source: Arc<S>,
    settings: Arc<Settings>,
    cancel: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", settings.port))
        .await
        .map_err(|e| StreamError::transport_with_source("bind listener", Box::new(e)))?;
    info!(port = settings.port, live = settings.live, "listening for viewers");

    let next_connection_id = AtomicU64::new(1);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted
                    .map_err(|e| StreamError::transport_with_source("accept", Box::new(e)))?;
                let connection_id = next_connection_id.fetch_add(1, Ordering::Relaxed);
                debug!(connection_id, %peer, "connection accepted");

                let source = Arc::clone(&source);
                let settings = Arc::clone(&settings);
                let cancel = cancel.child_token();
                tokio::spawn(async move {
                    if let Err(e) = run_connection(stream, connection_id, source, settings, cancel).await {
                        warn!(connection_id, error = %e, "connection ended with error");
                    }
                });
            }
        }
    }
}

async fn run_connection<S: FrameSource>(
    stream: TcpStream,
    connection_id: u64,
    source: Arc<S>,
    settings: Arc<Settings>,
    cancel: CancellationToken,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| StreamError::transport_with_source("websocket handshake", Box::new(e)))?;
    let (write, mut read) = ws.split();
    let mut sink = WsSink { inner: write };

    let mut session = ConnectionSession::new(connection_id, source, settings);
    info!(connection_id, "viewer connected");

    session.send_metadata(&mut sink).await?;

    // The pacing deadline exists only while a window is inflight, and is
    // re-armed after each completed send.
    let mut deadline: Option<Instant> = None;

    loop {
        if session.is_inflight() && deadline.is_none() {
            deadline = Some(Instant::now() + session.send_interval());
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(connection_id, "connection cancelled");
                break;
            }
            message = read.next() => {
                match message {
                    None => {
                        debug!(connection_id, "viewer disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection_id, error = %e, "websocket read failed");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => {
                        match session.handle_message(text.as_str()).await {
                            Ok(()) => {}
                            Err(e) if e.is_frame_local() => {
                                warn!(connection_id, error = %e, "ignoring malformed control message");
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection_id, "close frame received");
                        break;
                    }
                    // Pings are answered by the protocol layer; binary
                    // uploads are not part of the control protocol.
                    Some(Ok(_)) => {}
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                match session.tick(&mut sink).await? {
                    TickOutcome::Continue => {
                        deadline = Some(Instant::now() + session.send_interval());
                    }
                    TickOutcome::Completed | TickOutcome::Idle => {}
                }
            }
        }
    }

    // Dropping the session cancels any pending pacing with it.
    info!(connection_id, "connection closed");
    Ok(())
}

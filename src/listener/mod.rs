//! Event listener: one persistent socket subscription per activation.
//!
//! [`activate`] spawns a task that connects to `{ws|wss}://host/ws?clientId=..`,
//! forwards matching event envelopes to the host's [`Emitter`], pings the
//! server on a fixed heartbeat, and reconnects after a fixed delay while the
//! retry budget allows. [`ListenerHandle::deactivate`] is the only way out.
pub mod config;
pub mod events;
pub mod session;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::host::Emitter;

use self::config::ListenerConfig;
use self::events::record_for_frame;
use self::session::{CloseDecision, Session, SessionState};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Owner's view of a running listener session.
///
/// Dropping the handle cancels the session as well.
pub struct ListenerHandle {
    client_id: Uuid,
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    task: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop the session: no reconnect is scheduled after this, an open
    /// socket is closed, and the task is awaited. Safe to call repeatedly.
    pub async fn deactivate(&mut self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(client_id = %self.client_id, "Closing WebSocket connection");
            self.cancel.cancel();
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(client_id = %self.client_id, error = %e, "Listener task ended abnormally");
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start a listener session. Must be called from within a Tokio runtime.
pub fn activate<E: Emitter>(config: ListenerConfig, emitter: E) -> AppResult<ListenerHandle> {
    if config.server_url.trim().is_empty() {
        tracing::error!("ComfyUI server address not configured");
        return Err(AppError::Config("ComfyUI server address is required".to_string()));
    }

    let session = Session::new(config.reconnect_interval, config.retry_limit);
    let client_id = session.client_id();
    let cancel = CancellationToken::new();
    let (state_tx, state_rx) = watch::channel(session.state());

    tracing::debug!(
        server_url = %config.server_url,
        filter = ?config.filter,
        %client_id,
        reconnect_interval = ?config.reconnect_interval,
        retry_limit = ?config.retry_limit,
        "Activating ComfyUI listener",
    );

    let task = tokio::spawn(run_session(config, session, emitter, cancel.clone(), state_tx));

    Ok(ListenerHandle { client_id, cancel, state: state_rx, task: Some(task) })
}

async fn run_session<E: Emitter>(
    config: ListenerConfig,
    mut session: Session,
    emitter: E,
    cancel: CancellationToken,
    state_tx: watch::Sender<SessionState>,
) {
    let client_id = session.client_id();
    loop {
        if cancel.is_cancelled() {
            session.stop();
        }
        if !session.begin_connect() {
            break;
        }
        state_tx.send_replace(session.state());

        match connect(&config, client_id, &cancel).await {
            Ok(Some(stream)) => {
                session.on_open();
                state_tx.send_replace(session.state());
                tracing::info!(%client_id, server_url = %config.server_url, "WebSocket connection established");
                pump(stream, &config, &emitter, &cancel).await;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(
                    %client_id,
                    server_url = %config.server_url,
                    error = %e,
                    "WebSocket connection failed",
                );
            }
        }

        if cancel.is_cancelled() {
            session.stop();
        }
        match session.on_close() {
            CloseDecision::Reconnect { attempt, delay } => {
                state_tx.send_replace(session.state());
                tracing::info!(%client_id, "Attempting to reconnect (attempt {})...", attempt);
                tokio::select! {
                    _ = cancel.cancelled() => {
                        session.stop();
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            CloseDecision::Exhausted => {
                state_tx.send_replace(session.state());
                tracing::error!(
                    %client_id,
                    retry_limit = ?config.retry_limit,
                    "Reached maximum retry count, stopping reconnection",
                );
                cancel.cancelled().await;
                session.stop();
            }
            CloseDecision::Stopped => {}
        }
    }
    state_tx.send_replace(SessionState::Stopped);
    tracing::debug!(%client_id, "Listener session stopped");
}

/// Build the socket request and connect. `Ok(None)` means the session was
/// deactivated while the handshake was pending.
async fn connect(
    config: &ListenerConfig,
    client_id: Uuid,
    cancel: &CancellationToken,
) -> AppResult<Option<WsStream>> {
    let url = config.socket_url(client_id)?;
    let mut request = url.as_str().into_client_request()?;
    if let Some(auth) = &config.auth {
        let name = HeaderName::from_bytes(auth.name.as_bytes())
            .map_err(|e| AppError::Config(format!("Invalid header key '{}': {}", auth.name, e)))?;
        let value = HeaderValue::from_str(&auth.value)
            .map_err(|e| AppError::Config(format!("Invalid header value for '{}': {}", auth.name, e)))?;
        request.headers_mut().insert(name, value);
    }

    tokio::select! {
        _ = cancel.cancelled() => Ok(None),
        result = connect_async(request) => {
            let (stream, _response) = result?;
            Ok(Some(stream))
        }
    }
}

/// Read frames until the socket closes or the session is cancelled.
///
/// The heartbeat interval lives only as long as this call, so it is always
/// released before the next connection attempt.
async fn pump<E: Emitter>(stream: WsStream, config: &ListenerConfig, emitter: &E, cancel: &CancellationToken) {
    let (mut sink, mut source) = stream.split();
    let mut heartbeat = config.heartbeat.filter(|period| !period.is_zero()).map(|period| {
        tracing::debug!("Starting heartbeat mechanism, interval: {:?}", period);
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "Close frame not delivered");
                }
                break;
            }
            _ = next_tick(&mut heartbeat) => {
                match sink.send(Message::Ping(Vec::new())).await {
                    Ok(()) => tracing::debug!("Sent heartbeat ping message"),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to send heartbeat message");
                        heartbeat = None;
                    }
                }
            }
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => forward(text.as_bytes(), config, emitter),
                Some(Ok(Message::Binary(bytes))) => forward(&bytes, config, emitter),
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "WebSocket connection closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::error!(error = %e, "WebSocket error");
                    break;
                }
                None => break,
            }
        }
    }

    if heartbeat.is_some() {
        tracing::debug!("Heartbeat timer cleaned up");
    }
}

fn forward<E: Emitter>(frame: &[u8], config: &ListenerConfig, emitter: &E) {
    if let Some(record) = record_for_frame(frame, &config.filter, &config.instance_id, &config.server_url) {
        emitter.emit(vec![record]);
    }
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

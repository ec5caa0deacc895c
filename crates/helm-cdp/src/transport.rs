use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::CdpError;
use crate::types::{CdpCommand, CdpEvent, MessageKind, RawCdpMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Key for the subscriber map: (method name, session id).
type SubscriberKey = (String, Option<String>);

/// Command sent from a client handle to the background transport task.
pub enum TransportCommand {
    SendCommand {
        command: CdpCommand,
        response_tx: oneshot::Sender<Result<serde_json::Value, CdpError>>,
        deadline: Instant,
    },
    Subscribe {
        method: String,
        session_id: Option<String>,
        event_tx: mpsc::Sender<CdpEvent>,
    },
    Shutdown,
}

struct PendingRequest {
    response_tx: oneshot::Sender<Result<serde_json::Value, CdpError>>,
    method: String,
}

/// A clonable handle that talks to the single background task owning the
/// WebSocket connection. One `TransportHandle` is shared across every
/// `CdpSession`/`Tab` opened against the same browser instance, matching
/// the single-connection model a synchronous CDP client would keep.
#[derive(Clone)]
pub struct TransportHandle {
    command_tx: mpsc::Sender<TransportCommand>,
    next_id: Arc<AtomicU64>,
}

impl TransportHandle {
    pub async fn send(&self, cmd: TransportCommand) -> Result<(), CdpError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| CdpError::Internal("transport task is not running".into()))
    }

    pub fn next_message_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn send_command(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        session_id: Option<String>,
        timeout: Duration,
    ) -> Result<serde_json::Value, CdpError> {
        let id = self.next_message_id();
        let command = CdpCommand {
            id,
            method: method.to_owned(),
            params,
            session_id,
        };
        let (response_tx, response_rx) = oneshot::channel();
        let deadline = Instant::now() + timeout;
        self.send(TransportCommand::SendCommand {
            command,
            response_tx,
            deadline,
        })
        .await?;

        response_rx
            .await
            .map_err(|_| CdpError::Internal("transport task exited before responding".into()))?
    }

    pub async fn subscribe(
        &self,
        method: &str,
        session_id: Option<String>,
        capacity: usize,
    ) -> Result<mpsc::Receiver<CdpEvent>, CdpError> {
        let (event_tx, event_rx) = mpsc::channel(capacity);
        self.send(TransportCommand::Subscribe {
            method: method.to_owned(),
            session_id,
            event_tx,
        })
        .await?;
        Ok(event_rx)
    }
}

/// Connect to a CDP WebSocket endpoint and spawn the transport task that
/// owns it for the lifetime of the connection.
pub async fn connect(url: &str, channel_capacity: usize, connect_timeout: Duration) -> Result<TransportHandle, CdpError> {
    let (ws, _) = tokio::time::timeout(connect_timeout, connect_async(url))
        .await
        .map_err(|_| CdpError::ConnectionTimeout)?
        .map_err(|e| CdpError::Connection(e.to_string()))?;

    let (command_tx, command_rx) = mpsc::channel(channel_capacity);
    let next_id = Arc::new(AtomicU64::new(1));

    tokio::spawn(run_transport(ws, command_rx));

    Ok(TransportHandle {
        command_tx,
        next_id,
    })
}

async fn run_transport(ws: WsStream, mut command_rx: mpsc::Receiver<TransportCommand>) {
    let (mut sink, mut stream) = ws.split();
    let mut pending: HashMap<u64, PendingRequest> = HashMap::new();
    let mut subscribers: HashMap<SubscriberKey, Vec<mpsc::Sender<CdpEvent>>> = HashMap::new();

    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(TransportCommand::SendCommand { command, response_tx, deadline: _ }) => {
                        let id = command.id;
                        match serde_json::to_string(&command) {
                            Ok(text) => {
                                pending.insert(id, PendingRequest { response_tx, method: command.method });
                                if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                                    if let Some(req) = pending.remove(&id) {
                                        let _ = req.response_tx.send(Err(CdpError::Connection(e.to_string())));
                                    }
                                }
                            }
                            Err(e) => {
                                let _ = response_tx.send(Err(CdpError::Internal(format!("failed to serialize command: {e}"))));
                            }
                        }
                    }
                    Some(TransportCommand::Subscribe { method, session_id, event_tx }) => {
                        subscribers.entry((method, session_id)).or_default().push(event_tx);
                    }
                    Some(TransportCommand::Shutdown) | None => {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        handle_frame(&text, &mut pending, &mut subscribers);
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        drain_pending(&mut pending, CdpError::ConnectionClosed);
                        break;
                    }
                    Some(Err(e)) => {
                        drain_pending(&mut pending, CdpError::Connection(e.to_string()));
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

fn handle_frame(
    text: &str,
    pending: &mut HashMap<u64, PendingRequest>,
    subscribers: &mut HashMap<SubscriberKey, Vec<mpsc::Sender<CdpEvent>>>,
) {
    let raw: RawCdpMessage = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("discarding unparseable CDP frame: {e}");
            return;
        }
    };
    match raw.classify() {
        Some(MessageKind::Response(resp)) => {
            if let Some(req) = pending.remove(&resp.id) {
                let result = resp.result.map_err(|e| CdpError::Protocol {
                    code: e.code,
                    message: e.message,
                });
                if result.is_err() {
                    tracing::debug!("CDP method {} returned an error", req.method);
                }
                let _ = req.response_tx.send(result);
            }
        }
        Some(MessageKind::Event(event)) => {
            let key = (event.method.clone(), event.session_id.clone());
            if let Some(subs) = subscribers.get(&key) {
                for tx in subs {
                    let _ = tx.try_send(event.clone());
                }
            }
        }
        None => {}
    }
}

fn drain_pending(pending: &mut HashMap<u64, PendingRequest>, err: CdpError) {
    for (_, req) in pending.drain() {
        let _ = req.response_tx.send(Err(match &err {
            CdpError::ConnectionClosed => CdpError::ConnectionClosed,
            other => CdpError::Connection(other.to_string()),
        }));
    }
}

//! Realtime channel: one ActionCable subscription per open conversation.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::api::events::{self, ChannelIdentifier, ChannelMessage, IncomingEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Invalid channel URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Could not connect to chat: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Chat subscription was rejected")]
    Rejected,
    #[error("Chat connection closed")]
    Closed,
    #[error("Malformed channel frame: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct ChannelParams {
    pub access_token: String,
    pub conversation_id: String,
    pub sender_id: String,
}

/// Messages from other participants, in the order the server delivered them.
pub type Inbound = mpsc::UnboundedReceiver<ChannelMessage>;

pub trait RealtimeChannel: Send {
    fn state(&self) -> ConnectionState;

    /// Fire-and-forget. Dropped without notice when the channel is down.
    fn send(&self, text: &str);

    /// Idempotent.
    fn close(&mut self);
}

#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(&self, params: ChannelParams) -> Result<(Box<dyn RealtimeChannel>, Inbound), ChannelError>;
}

/// Opens [`CableConnection`]s against `<ws_base>cable`.
pub struct CableConnector {
    ws_base: Url,
}

impl CableConnector {
    pub fn new(ws_base: &str) -> Result<Self, ChannelError> {
        Ok(Self {
            ws_base: Url::parse(&crate::utils::websocket_url(ws_base))?,
        })
    }
}

#[async_trait]
impl ChannelConnector for CableConnector {
    async fn open(&self, params: ChannelParams) -> Result<(Box<dyn RealtimeChannel>, Inbound), ChannelError> {
        let (connection, inbound) = CableConnection::open(&self.ws_base, params).await?;
        Ok((Box::new(connection), inbound))
    }
}

enum Outbound {
    Speak(String),
    Close,
}

pub struct CableConnection {
    identifier: String,
    conversation_id: String,
    sender_id: String,
    state: Arc<watch::Sender<ConnectionState>>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

pub fn cable_url(ws_base: &Url, access_token: &str) -> Result<Url, url::ParseError> {
    let mut url = ws_base.join("cable")?;
    url.query_pairs_mut().append_pair("access_token", access_token);
    Ok(url)
}

impl CableConnection {
    /// Connects, waits for the server welcome and confirms the
    /// `ConversationChannel` subscription before returning.
    pub async fn open(ws_base: &Url, params: ChannelParams) -> Result<(Self, Inbound), ChannelError> {
        let url = cable_url(ws_base, &params.access_token)?;
        let identifier = ChannelIdentifier::new(&params.conversation_id, &params.sender_id).encode()?;
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let state = Arc::new(state_tx);

        log::info!("connecting to ConversationChannel {}", params.conversation_id);
        let (ws, _) = connect_async(url.as_str()).await?;
        let (mut sink, mut stream) = ws.split();
        handshake(&mut sink, &mut stream, &identifier).await?;

        state.send_replace(ConnectionState::Connected);
        log::info!(
            "connected to ConversationChannel. Room code: {}.",
            params.conversation_id
        );

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(run(
            sink,
            stream,
            identifier.clone(),
            params.sender_id.clone(),
            state.clone(),
            outbound_rx,
            inbound_tx,
        ));

        let connection = Self {
            identifier,
            conversation_id: params.conversation_id,
            sender_id: params.sender_id,
            state,
            outbound: outbound_tx,
        };
        Ok((connection, inbound_rx))
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}

impl RealtimeChannel for CableConnection {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn send(&self, text: &str) {
        if self.state() != ConnectionState::Connected {
            log::debug!("channel down, dropping outgoing message");
            return;
        }
        match events::speak_command(&self.identifier, &self.conversation_id, text, &self.sender_id) {
            Ok(frame) => {
                let _ = self.outbound.send(Outbound::Speak(frame));
            }
            Err(e) => log::warn!("could not encode speak frame: {}", e),
        }
    }

    fn close(&mut self) {
        if self.state() == ConnectionState::Disconnected {
            return;
        }
        self.state.send_replace(ConnectionState::Disconnected);
        let _ = self.outbound.send(Outbound::Close);
    }
}

impl Drop for CableConnection {
    fn drop(&mut self) {
        self.close();
    }
}

async fn handshake(
    sink: &mut SplitSink<WsStream, Message>,
    stream: &mut SplitStream<WsStream>,
    identifier: &str,
) -> Result<(), ChannelError> {
    let mut subscribed = false;
    while let Some(frame) = stream.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => return Err(ChannelError::Closed),
            _ => continue,
        };
        match IncomingEvent::parse(&text) {
            Ok(IncomingEvent::Welcome) if !subscribed => {
                sink.send(Message::Text(events::subscribe_command(identifier)?)).await?;
                subscribed = true;
            }
            Ok(IncomingEvent::Confirmed { identifier: id }) if id == identifier => return Ok(()),
            Ok(IncomingEvent::Rejected { identifier: id }) if id == identifier => {
                return Err(ChannelError::Rejected);
            }
            Ok(IncomingEvent::Disconnect { reason }) => {
                log::warn!("server refused connection: {:?}", reason);
                return Err(ChannelError::Closed);
            }
            Ok(_) => {}
            Err(e) => log::debug!("ignoring malformed frame during handshake: {}", e),
        }
    }
    Err(ChannelError::Closed)
}

async fn run(
    mut sink: SplitSink<WsStream, Message>,
    mut stream: SplitStream<WsStream>,
    identifier: String,
    sender_id: String,
    state: Arc<watch::Sender<ConnectionState>>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: mpsc::UnboundedSender<ChannelMessage>,
) {
    loop {
        tokio::select! {
            cmd = outbound.recv() => match cmd {
                Some(Outbound::Speak(frame)) => {
                    if let Err(e) = sink.send(Message::Text(frame)).await {
                        log::warn!("chat send failed: {}", e);
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !deliver(&text, &identifier, &sender_id, &inbound) {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::warn!("chat connection dropped: {}", e);
                    break;
                }
            },
        }
    }
    state.send_replace(ConnectionState::Disconnected);
    log::info!("disconnected from ConversationChannel");
}

/// Forwards broadcasts addressed to `sender_id`. Returns `false` once the
/// server asks the client to go away.
fn deliver(
    text: &str,
    identifier: &str,
    sender_id: &str,
    inbound: &mpsc::UnboundedSender<ChannelMessage>,
) -> bool {
    match IncomingEvent::parse(text) {
        Ok(IncomingEvent::Broadcast { identifier: id, data }) if id == identifier => {
            match serde_json::from_value::<ChannelMessage>(data) {
                Ok(message) if message.is_addressed_to(sender_id) => {
                    let _ = inbound.send(message);
                }
                Ok(_) => log::debug!("dropping broadcast not addressed to {}", sender_id),
                Err(e) => log::debug!("dropping malformed broadcast: {}", e),
            }
        }
        Ok(IncomingEvent::Disconnect { reason }) => {
            log::info!("server closed chat: {:?}", reason);
            return false;
        }
        Ok(_) => {}
        Err(e) => log::debug!("ignoring malformed frame: {}", e),
    }
    true
}

//! Discord gateway client.
//!
//! Keeps one websocket session alive: Hello, Identify, periodic heartbeats,
//! and forwards the `READY` and `MESSAGE_CREATE` dispatches over a channel.
//! Sessions are not resumed; after a drop the client reconnects and
//! identifies again.

use super::model::{DiscordMessage, GatewayPayload, Hello, Ready};
use super::{DiscordError, DiscordUser};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Gateway endpoint, API version 10, JSON encoding
pub const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// `GUILDS` intent
pub const INTENT_GUILDS: u64 = 1 << 0;
/// `GUILD_MESSAGES` intent
pub const INTENT_GUILD_MESSAGES: u64 = 1 << 9;
/// `DIRECT_MESSAGES` intent
pub const INTENT_DIRECT_MESSAGES: u64 = 1 << 12;
/// `MESSAGE_CONTENT` privileged intent
pub const INTENT_MESSAGE_CONTENT: u64 = 1 << 15;
/// Intents the bot identifies with
pub const DEFAULT_INTENTS: u64 =
    INTENT_GUILDS | INTENT_GUILD_MESSAGES | INTENT_DIRECT_MESSAGES | INTENT_MESSAGE_CONTENT;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

/// Close codes after which reconnecting cannot help
const FATAL_CLOSE_CODES: &[u16] = &[4004, 4010, 4011, 4012, 4013, 4014];

const RECONNECT_INITIAL_BACKOFF_MS: u64 = 1000;
const RECONNECT_MAX_BACKOFF_MS: u64 = 60_000;

/// Events forwarded to the bot runtime
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// Session established; carries the bot's own account
    Ready(DiscordUser),
    /// A message was posted in a channel the bot can see
    MessageCreate(DiscordMessage),
}

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    Reconnect,
    Fatal(String),
}

/// Frame handling outcome inside a session
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Continue,
    HeartbeatNow,
    Acked,
    End(SessionEnd),
}

/// Gateway connection settings
#[derive(Clone)]
pub struct Gateway {
    token: String,
    intents: u64,
    url: String,
}

impl Gateway {
    /// Gateway client for the public endpoint
    #[must_use]
    pub fn new(token: impl Into<String>, intents: u64) -> Self {
        Self {
            token: token.into(),
            intents,
            url: GATEWAY_URL.to_string(),
        }
    }

    /// Run sessions until `cancel` fires or Discord rejects the bot.
    ///
    /// Events go to `events`; the loop also stops when the receiver is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns `DiscordError::Gateway` when the connection is closed with a
    /// fatal code (bad token, disallowed intents).
    pub async fn run(
        self,
        events: mpsc::Sender<GatewayEvent>,
        cancel: CancellationToken,
    ) -> Result<(), DiscordError> {
        let mut backoff_ms = RECONNECT_INITIAL_BACKOFF_MS;

        loop {
            let started = std::time::Instant::now();
            match self.run_session(&events, &cancel).await {
                Ok(SessionEnd::Shutdown) => {
                    info!("Gateway shut down");
                    return Ok(());
                }
                Ok(SessionEnd::Fatal(reason)) => {
                    error!("Gateway closed permanently: {reason}");
                    return Err(DiscordError::Gateway(reason));
                }
                Ok(SessionEnd::Reconnect) => {
                    info!("Gateway requested reconnect");
                }
                Err(e) => {
                    warn!("Gateway session failed: {e}");
                }
            }

            if events.is_closed() {
                return Ok(());
            }
            // a session that lived for a while resets the backoff
            if started.elapsed() > Duration::from_secs(60) {
                backoff_ms = RECONNECT_INITIAL_BACKOFF_MS;
            }

            debug!(backoff_ms, "Reconnecting to gateway");
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
            }
            backoff_ms = (backoff_ms * 2).min(RECONNECT_MAX_BACKOFF_MS);
        }
    }

    async fn run_session(
        &self,
        events: &mpsc::Sender<GatewayEvent>,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd, DiscordError> {
        let (socket, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| DiscordError::Gateway(format!("connect failed: {e}")))?;
        let (mut write, mut read) = socket.split();

        let hello = next_payload(&mut read).await?;
        if hello.op != OP_HELLO {
            return Err(DiscordError::Gateway(format!(
                "expected Hello, got op {}",
                hello.op
            )));
        }
        let hello: Hello = serde_json::from_value(hello.d)?;
        debug!(interval_ms = hello.heartbeat_interval, "Gateway hello");

        send_json(&mut write, &identify_payload(&self.token, self.intents)).await?;

        let mut heartbeat = tokio::time::interval(Duration::from_millis(hello.heartbeat_interval));
        // the first tick completes immediately
        heartbeat.tick().await;
        let mut sequence: Option<u64> = None;
        let mut acked = true;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
                _ = heartbeat.tick() => {
                    if !acked {
                        return Err(DiscordError::Gateway("heartbeat not acknowledged".to_string()));
                    }
                    acked = false;
                    send_json(&mut write, &heartbeat_payload(sequence)).await?;
                }
                frame = read.next() => {
                    let text = match frame {
                        None => return Err(DiscordError::Gateway("connection closed".to_string())),
                        Some(Err(e)) => return Err(DiscordError::Gateway(e.to_string())),
                        Some(Ok(WsMessage::Text(text))) => text,
                        Some(Ok(WsMessage::Close(frame))) => {
                            let code = frame.as_ref().map(|f| u16::from(f.code));
                            return Ok(classify_close(code));
                        }
                        Some(Ok(_)) => continue,
                    };

                    let payload: GatewayPayload = serde_json::from_str(&text)?;
                    match handle_payload(payload, &mut sequence, events).await {
                        Step::Continue => {}
                        Step::Acked => acked = true,
                        Step::HeartbeatNow => {
                            send_json(&mut write, &heartbeat_payload(sequence)).await?;
                        }
                        Step::End(end) => return Ok(end),
                    }
                }
            }
        }
    }
}

async fn next_payload<S>(read: &mut S) -> Result<GatewayPayload, DiscordError>
where
    S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(frame) = read.next().await {
        match frame.map_err(|e| DiscordError::Gateway(e.to_string()))? {
            WsMessage::Text(text) => return Ok(serde_json::from_str(&text)?),
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
    Err(DiscordError::Gateway("connection closed before Hello".to_string()))
}

async fn send_json<S>(write: &mut S, payload: &Value) -> Result<(), DiscordError>
where
    S: Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    write
        .send(WsMessage::Text(payload.to_string()))
        .await
        .map_err(|e| DiscordError::Gateway(e.to_string()))
}

async fn handle_payload(
    payload: GatewayPayload,
    sequence: &mut Option<u64>,
    events: &mpsc::Sender<GatewayEvent>,
) -> Step {
    match payload.op {
        OP_DISPATCH => {
            if payload.s.is_some() {
                *sequence = payload.s;
            }
            let Some(event) = parse_dispatch(payload.t.as_deref(), payload.d) else {
                return Step::Continue;
            };
            if events.send(event).await.is_err() {
                return Step::End(SessionEnd::Shutdown);
            }
            Step::Continue
        }
        OP_HEARTBEAT => Step::HeartbeatNow,
        OP_HEARTBEAT_ACK => Step::Acked,
        OP_RECONNECT | OP_INVALID_SESSION => Step::End(SessionEnd::Reconnect),
        op => {
            debug!(op, "Ignoring gateway opcode");
            Step::Continue
        }
    }
}

fn parse_dispatch(event_name: Option<&str>, data: Value) -> Option<GatewayEvent> {
    let parsed = match event_name? {
        "READY" => serde_json::from_value::<Ready>(data).map(|r| GatewayEvent::Ready(r.user)),
        "MESSAGE_CREATE" => {
            serde_json::from_value::<DiscordMessage>(data).map(GatewayEvent::MessageCreate)
        }
        _ => return None,
    };
    match parsed {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Failed to parse gateway dispatch {event_name:?}: {e}");
            None
        }
    }
}

fn classify_close(code: Option<u16>) -> SessionEnd {
    match code {
        Some(code) if FATAL_CLOSE_CODES.contains(&code) => {
            SessionEnd::Fatal(format!("close code {code}"))
        }
        _ => SessionEnd::Reconnect,
    }
}

fn identify_payload(token: &str, intents: u64) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "kaz-bot",
                "device": "kaz-bot"
            }
        }
    })
}

fn heartbeat_payload(sequence: Option<u64>) -> Value {
    json!({ "op": OP_HEARTBEAT, "d": sequence })
}

//! Chat service integration for beebot.
//!
//! This module talks to Slack in socket mode:
//! - Opening the socket mode WebSocket and acknowledging envelopes
//! - Unwrapping Events API payloads into raw events
//! - Posting replies with slack-morphism

use crate::{
    base::{
        config::Config,
        types::{BotError, Res, Void},
    },
    service::slack_api::{FullClient, api_token},
};
use async_trait::async_trait;
use futures::{FutureExt, SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use slack_morphism::prelude::*;
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, instrument};

use std::sync::Arc;

use super::{ChatClient, GenericChatClient};

// Type aliases.

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// Extra methods on `ChatClient` applied by the slack implementation.

impl ChatClient {
    /// Creates a new Slack chat client.
    pub async fn slack(config: &Config, client: Arc<FullClient>) -> Res<Self> {
        let client = SlackChatClient::new(config, client).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Structs.

/// A socket mode frame.
#[derive(Debug, Deserialize)]
struct SocketEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    reason: Option<String>,
}

/// Slack client implementation.
#[derive(Clone)]
pub struct SlackChatClient {
    bot_token: SlackApiToken,
    bot_user_id: String,
    /// App-level token, only used to open socket mode connections.
    app_token: SlackApiToken,
    client: Arc<FullClient>,
    socket: Arc<Mutex<Option<Socket>>>,
}

impl SlackChatClient {
    /// Create a new Slack chat client.
    #[instrument(name = "SlackChatClient::new", skip_all)]
    pub async fn new(config: &Config, client: Arc<FullClient>) -> Res<Self> {
        // Initialize tokens.

        let bot_token = api_token(&config.slack_bot_token);
        let app_token = api_token(&config.slack_app_token);

        // Get the bot's user ID.

        let session = client.open_session(&bot_token);
        let bot_user = session.auth_test().await?;
        let bot_user_id = bot_user.user_id.0;

        info!("Slack bot user ID: {}", bot_user_id);

        Ok(Self {
            bot_token,
            bot_user_id,
            app_token,
            client,
            socket: Arc::new(Mutex::new(None)),
        })
    }
}

#[async_trait]
impl GenericChatClient for SlackChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    #[instrument(skip(self))]
    async fn connect(&self) -> Void {
        let mut socket = self.socket.lock().await;
        *socket = None;

        let session = self.client.open_session(&self.app_token);
        let response = session
            .apps_connections_open(&SlackApiAppsConnectionOpenRequest::new())
            .await
            .map_err(|e| BotError::Transport(format!("cannot open a socket mode connection: {e}")))?;

        let (stream, _response) = connect_async(response.url.0.as_str()).await.map_err(|e| BotError::Transport(format!("WebSocket handshake failed: {e}")))?;

        *socket = Some(stream);

        Ok(())
    }

    async fn next_event(&self) -> Res<Option<Value>> {
        let mut socket = self.socket.lock().await;
        let Some(stream) = socket.as_mut() else {
            return Err(BotError::Transport("not connected".into()).into());
        };

        let result = read_event(stream).await;

        if result.is_err() {
            *socket = None;
        }

        Ok(result?)
    }

    #[instrument(skip(self, text))]
    async fn send_message(&self, channel_id: &str, text: &str) -> Void {
        let message = SlackMessageContent::new().with_text(text.to_string());

        let request = SlackApiChatPostMessageRequest::new(SlackChannelId(channel_id.to_string()), message).with_as_user(true);

        let session = self.client.open_session(&self.bot_token);

        let _ = session.chat_post_message(&request).await.map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))?;

        Ok(())
    }
}

// Socket mode helpers.

/// Reads at most one pending frame and turns it into an event.
async fn read_event(stream: &mut Socket) -> Result<Option<Value>, BotError> {
    let message = match stream.next().now_or_never() {
        None => return Ok(None),
        Some(None) => return Err(BotError::Transport("connection closed by peer".into())),
        Some(Some(Err(e))) => return Err(BotError::Transport(e.to_string())),
        Some(Some(Ok(message))) => message,
    };

    let Some(text) = frame_text(message)? else {
        return Ok(None);
    };

    let envelope = match serde_json::from_str::<SocketEnvelope>(&text) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!("Ignoring malformed socket mode frame: {}", e);
            return Ok(None);
        }
    };

    if let Some(envelope_id) = &envelope.envelope_id {
        let ack = json!({ "envelope_id": envelope_id }).to_string();
        stream.send(WsMessage::Text(ack.into())).await.map_err(|e| BotError::Transport(format!("failed to acknowledge envelope: {e}")))?;
    }

    interpret(envelope)
}

/// The text of a data frame; `None` for control frames.
fn frame_text(message: WsMessage) -> Result<Option<String>, BotError> {
    match message {
        WsMessage::Text(text) => Ok(Some(text.as_str().to_string())),
        WsMessage::Binary(bytes) => Ok(String::from_utf8(bytes.to_vec()).ok()),
        WsMessage::Close(frame) => Err(BotError::Transport(format!("connection closed: {frame:?}"))),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => Ok(None),
    }
}

/// Maps a socket mode envelope to the event it carries.
fn interpret(envelope: SocketEnvelope) -> Result<Option<Value>, BotError> {
    match envelope.kind.as_str() {
        "events_api" => Ok(envelope.payload.get("event").cloned()),
        "disconnect" => Err(BotError::Transport(format!(
            "server requested a reconnect ({})",
            envelope.reason.as_deref().unwrap_or("no reason given")
        ))),
        "hello" => {
            info!("Socket mode handshake complete.");
            Ok(None)
        }
        other => {
            debug!("Ignoring socket mode frame of type `{}`", other);
            Ok(None)
        }
    }
}

// Tests.

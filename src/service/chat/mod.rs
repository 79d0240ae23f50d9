pub mod slack;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

use crate::base::types::{Res, Void};

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This is the streaming side of the chat platform: one long-lived
/// connection that is polled for events, plus posting replies. Transport
/// failures are reported as [`BotError::Transport`](crate::base::types::BotError)
/// and are recovered by reconnecting.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Get the bot user ID.
    ///
    /// Returns the unique identifier for the bot in the chat platform,
    /// which is used to skip the bot's own messages.
    fn bot_user_id(&self) -> &str;

    /// Open the streaming connection, replacing any previous one.
    async fn connect(&self) -> Void;

    /// Read the next event without waiting.
    ///
    /// Returns `None` when nothing is pending or when the frame was not an
    /// event (handshake, keep-alive, malformed payload).
    async fn next_event(&self) -> Res<Option<Value>>;

    /// Post a message to a channel, or to a user's direct messages when given a user ID.
    async fn send_message(&self, channel_id: &str, text: &str) -> Void;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}

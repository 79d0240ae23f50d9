//! Slack implementation of the directory service.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use slack_morphism::prelude::*;
use tracing::instrument;

use crate::{
    base::{config::Config, types::Res},
    service::slack_api::{FullClient, PAGE_LIMIT, api_token, paginate},
};

use super::{DirectoryClient, GenericDirectoryClient};

// Extra methods on `DirectoryClient` applied by the slack implementation.

impl DirectoryClient {
    /// Creates a Slack directory client using the bot token.
    pub fn slack(config: &Config, client: Arc<FullClient>) -> Self {
        let client = SlackDirectoryClient::new(client, api_token(&config.slack_bot_token));
        Self { inner: Arc::new(client) }
    }
}

// Structs.

/// `conversations.list` page for direct messages.
///
/// slack-morphism's channel model drops the `user` field of IM channels.
#[derive(Debug, Deserialize)]
struct ImListResponse {
    channels: Vec<ImChannel>,
    response_metadata: Option<SlackResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ImChannel {
    id: String,
    #[serde(default)]
    user: Option<String>,
}

/// Slack directory client.
#[derive(Clone)]
pub struct SlackDirectoryClient {
    client: Arc<FullClient>,
    bot_token: SlackApiToken,
}

impl SlackDirectoryClient {
    pub fn new(client: Arc<FullClient>, bot_token: SlackApiToken) -> Self {
        Self { client, bot_token }
    }
}

#[async_trait]
impl GenericDirectoryClient for SlackDirectoryClient {
    #[instrument(skip(self))]
    async fn list_users(&self) -> Res<HashMap<String, String>> {
        let session = &self.client.open_session(&self.bot_token);

        let members = paginate(move |cursor| async move {
            let request = SlackApiUsersListRequest::new().with_limit(PAGE_LIMIT).opt_cursor(cursor);
            let response = session.users_list(&request).await?;
            Res::Ok((response.members, response.response_metadata))
        })
        .await?;

        Ok(user_names(&members))
    }

    #[instrument(skip(self))]
    async fn list_channels(&self) -> Res<HashMap<String, String>> {
        let session = &self.client.open_session(&self.bot_token);

        let channels = paginate(move |cursor| async move {
            let request = SlackApiConversationsListRequest::new()
                .with_types(vec![SlackConversationType::Public])
                .with_limit(PAGE_LIMIT)
                .opt_cursor(cursor);
            let response = session.conversations_list(&request).await?;
            Res::Ok((response.channels, response.response_metadata))
        })
        .await?;

        Ok(channel_names(&channels))
    }

    #[instrument(skip(self))]
    async fn list_direct_messages(&self) -> Res<HashMap<String, String>> {
        let session = &self.client.open_session(&self.bot_token);
        let limit = PAGE_LIMIT.to_string();
        let limit = limit.as_str();

        let ims = paginate(move |cursor| async move {
            let params = vec![("types", Some("im")), ("limit", Some(limit)), ("cursor", cursor.as_ref().map(|c| c.0.as_str()))];
            let response: ImListResponse = session
                .http_session_api
                .http_get("conversations.list", &params, Some(&SLACK_TIER2_METHOD_CONFIG))
                .await?;
            Res::Ok((response.channels, response.response_metadata))
        })
        .await?;

        Ok(ims.into_iter().filter_map(|im| Some((im.id, im.user?))).collect())
    }

    #[instrument(skip(self))]
    async fn list_emoji_aliases(&self) -> Res<HashMap<String, String>> {
        let session = self.client.open_session(&self.bot_token);
        let response = session.emoji_list().await?;

        Ok(emoji_aliases(response.emoji))
    }
}

// Helpers.

/// User id to user name, skipping users without a name.
fn user_names(members: &[SlackUser]) -> HashMap<String, String> {
    members.iter().filter_map(|user| Some((user.id.0.clone(), user.name.clone()?))).collect()
}

/// Channel id to channel name, skipping unnamed channels.
fn channel_names(channels: &[SlackChannelInfo]) -> HashMap<String, String> {
    channels.iter().filter_map(|channel| Some((channel.id.0.clone(), channel.name.clone()?))).collect()
}

/// Keeps only alias entries, mapped to the emoji they point at.
fn emoji_aliases(emoji: HashMap<SlackEmojiName, SlackEmojiRef>) -> HashMap<String, String> {
    emoji
        .into_iter()
        .filter_map(|(name, emoji)| match emoji {
            SlackEmojiRef::Alias(target) => Some((name.0, target.0)),
            SlackEmojiRef::Url(_) => None,
        })
        .collect()
}

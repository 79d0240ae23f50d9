//! In-memory snapshot of the directory service.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use tracing::{debug, info, instrument, warn};

use crate::base::{messages::UNKNOWN, types::Void};

use super::DirectoryClient;

/// One complete pull from the directory service.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Directory {
    /// User id to user name.
    pub users: HashMap<String, String>,
    /// Channel id to channel name.
    pub channels: HashMap<String, String>,
    /// Direct-message channel id to the name of the user on the other end.
    pub direct_messages: HashMap<String, String>,
    /// Emoji alias to canonical emoji name.
    pub emoji_aliases: HashMap<String, String>,
}

/// Owned, explicitly refreshed cache of the directory.
///
/// A refresh replaces the whole snapshot at once, so readers see either the
/// old directory or the new one and never a mix. The cache never grows by
/// itself; its size is that of the last snapshot.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DirectoryCache {
    client: DirectoryClient,
    snapshot: Arc<RwLock<Arc<Directory>>>,
}

impl DirectoryCache {
    pub fn new(client: DirectoryClient) -> Self {
        Self {
            client,
            snapshot: Arc::new(RwLock::new(Arc::new(Directory::default()))),
        }
    }

    /// Pulls every list from the directory service and swaps in the new snapshot.
    ///
    /// On failure the previous snapshot stays in place.
    #[instrument(name = "DirectoryCache::refresh", skip_all)]
    pub async fn refresh(&self) -> Void {
        let users = self.client.list_users().await?;
        let channels = self.client.list_channels().await?;
        let direct_messages = self.client.list_direct_messages().await?;
        let emoji_aliases = self.client.list_emoji_aliases().await?;

        let direct_messages = direct_messages
            .into_iter()
            .map(|(channel_id, user_id)| {
                let name = users.get(&user_id).cloned().unwrap_or_else(|| UNKNOWN.to_string());
                (channel_id, name)
            })
            .collect();

        let directory = Directory {
            users,
            channels,
            direct_messages,
            emoji_aliases,
        };

        for (id, name) in &directory.users {
            debug!("user {}: {}", id, name);
        }
        for (alias, name) in &directory.emoji_aliases {
            debug!("alias {} ==> {}", alias, name);
        }

        info!(
            "Directory loaded: {} users, {} channels, {} direct messages, {} emoji aliases.",
            directory.users.len(),
            directory.channels.len(),
            directory.direct_messages.len(),
            directory.emoji_aliases.len()
        );

        self.replace(directory);

        Ok(())
    }

    /// Installs `directory` as the current snapshot.
    pub fn replace(&self, directory: Directory) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(directory);
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Directory> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn user_name(&self, user_id: &str) -> Option<String> {
        self.snapshot().users.get(user_id).cloned()
    }

    /// The user's name, or `unknown`.
    pub fn resolve_user(&self, user_id: &str) -> String {
        self.user_name(user_id).unwrap_or_else(|| UNKNOWN.to_string())
    }

    pub fn channel_name(&self, channel_id: &str) -> Option<String> {
        self.snapshot().channels.get(channel_id).cloned()
    }

    /// Name of the user on the other end of a direct-message channel.
    pub fn direct_message_peer(&self, channel_id: &str) -> Option<String> {
        self.snapshot().direct_messages.get(channel_id).cloned()
    }

    /// The canonical emoji name for an alias; other names are returned unchanged.
    pub fn resolve_emoji(&self, name: &str) -> String {
        self.snapshot().emoji_aliases.get(name).cloned().unwrap_or_else(|| name.to_string())
    }

    /// Makes sure every user id is known, refreshing at most once.
    ///
    /// Returns `false` if some id is still unknown afterwards.
    pub async fn ensure_users(&self, user_ids: &[&str]) -> bool {
        let all_known = |directory: &Directory| user_ids.iter().all(|id| directory.users.contains_key(*id));

        if all_known(&self.snapshot()) {
            return true;
        }

        info!("User not found, reloading the directory ...");

        if let Err(e) = self.refresh().await {
            warn!("Directory refresh failed: {}", e);
        }

        all_known(&self.snapshot())
    }
}

//! Name resolution for users, channels, direct messages, and emoji aliases.
//!
//! The [`GenericDirectoryClient`] trait talks to the chat platform; the
//! [`DirectoryCache`] keeps the last full snapshot it returned.

pub mod cache;
pub mod slack;

use std::{collections::HashMap, ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::Res;

pub use cache::{Directory, DirectoryCache};

// Traits.

/// Generic directory service trait that clients must implement.
///
/// Each method returns the complete list for the workspace.
#[async_trait]
pub trait GenericDirectoryClient: Send + Sync + 'static {
    /// User id to user name.
    async fn list_users(&self) -> Res<HashMap<String, String>>;

    /// Channel id to channel name.
    async fn list_channels(&self) -> Res<HashMap<String, String>>;

    /// Direct-message channel id to the id of the user on the other end.
    async fn list_direct_messages(&self) -> Res<HashMap<String, String>>;

    /// Emoji alias to the emoji name it points at.
    async fn list_emoji_aliases(&self) -> Res<HashMap<String, String>>;
}

// Structs.

/// Directory client for the application.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DirectoryClient {
    inner: Arc<dyn GenericDirectoryClient>,
}

impl Deref for DirectoryClient {
    type Target = dyn GenericDirectoryClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl DirectoryClient {
    pub fn new(inner: Arc<dyn GenericDirectoryClient>) -> Self {
        Self { inner }
    }
}

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{Aggregate, ReactionEvent, Res, Void};

pub mod surreal;

/// Number of rows `showme reactions` reports.
pub const TOP_REACTIONS_LIMIT: usize = 10;

/// Number of rows `showme top <reaction>` reports.
pub const TOP_RECIPIENTS_LIMIT: usize = 5;

// Traits.

/// Generic counter store trait that clients must implement.
///
/// The store is an append-only log of [`ReactionEvent`] rows. Every query
/// recomputes its totals from the full log, and every statement runs in its
/// own transaction that is committed or cancelled before the call returns.
///
/// Queries return an empty list when nothing matches. A store that was never
/// initialized is reported as [`BotError::StorageUnavailable`](crate::base::types::BotError).
#[async_trait]
pub trait GenericDbClient: Send + Sync + 'static {
    /// Drops the counter log (if any) and creates it empty.
    async fn initialize(&self) -> Void;

    /// Returns `true` if the counter log has been created.
    async fn is_initialized(&self) -> Res<bool>;

    /// Appends one row to the counter log.
    async fn insert(&self, event: &ReactionEvent) -> Void;

    /// Totals grouped by recipient, optionally for a single reaction.
    async fn sum_by_recipient(&self, reaction: Option<&str>) -> Res<Vec<Aggregate>>;

    /// Totals grouped by giver, optionally for a single reaction.
    async fn sum_by_giver(&self, reaction: Option<&str>) -> Res<Vec<Aggregate>>;

    /// The most used reactions with their totals.
    async fn sum_by_reaction(&self) -> Res<Vec<Aggregate>>;

    /// Recipients of a single reaction, at most `limit` of them (`None` for all).
    async fn top_for_reaction(&self, reaction: &str, limit: Option<usize>) -> Res<Vec<Aggregate>>;
}

// Structs.

/// Counter store client for beebot.
///
/// This is trivially cloneable and can be passed around without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct DbClient {
    inner: Arc<dyn GenericDbClient>,
}

impl Deref for DbClient {
    type Target = dyn GenericDbClient;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DbClient {
    pub fn new(inner: Arc<dyn GenericDbClient>) -> Self {
        Self { inner }
    }
}

// Helpers.

/// Orders totals from highest to lowest and applies an optional limit.
///
/// The sort is stable, so ties keep the order the grouping produced.
pub(crate) fn rank(mut rows: Vec<Aggregate>, limit: Option<usize>) -> Vec<Aggregate> {
    rows.sort_by(|a, b| b.total.cmp(&a.total));

    if let Some(limit) = limit {
        rows.truncate(limit);
    }

    rows
}

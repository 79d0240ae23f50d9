//! Writes classified reactions into the counter store.

use tracing::{error, info, instrument};

use crate::{
    base::types::{ReactionEvent, Void, is_storage_unavailable},
    service::{db::DbClient, directory::DirectoryCache},
};

use super::classifier::Reaction;

/// Whether a reaction was given or withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Added,
    Removed,
}

/// Records one reaction change.
///
/// A failed insert is logged and skipped, except when the store itself is
/// gone, which is returned as a fatal error.
#[instrument(skip_all)]
pub async fn record_reaction(reaction: &Reaction, change: Change, db: &DbClient, directory: &DirectoryCache) -> Void {
    let from = directory.resolve_user(&reaction.from_user);
    let to = directory.resolve_user(&reaction.to_user);

    let event = match change {
        Change::Added => {
            info!("{} reacted with '{}' to {}", from, reaction.reaction, to);
            ReactionEvent::added(&reaction.from_user, &reaction.to_user, &reaction.reaction)
        }
        Change::Removed => {
            info!("{} withdrew their reaction of '{}' from {}", from, reaction.reaction, to);
            ReactionEvent::removed(&reaction.from_user, &reaction.to_user, &reaction.reaction)
        }
    };

    match db.insert(&event).await {
        Ok(()) => Ok(()),
        Err(e) if is_storage_unavailable(&e) => Err(e),
        Err(e) => {
            error!("Skipping reaction that could not be stored: {}", e);
            Ok(())
        }
    }
}

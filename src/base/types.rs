use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Err = anyhow::Error;
pub type Res<T> = Result<T, Err>;
pub type Void = Res<()>;

/// Failures that callers need to tell apart.
///
/// Everything else travels as a plain `anyhow::Error`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BotError {
    /// The counter store is missing or cannot be opened.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    /// A statement against the counter store failed and was rolled back.
    #[error("storage write failure: {0}")]
    StorageWriteFailure(String),
    /// The streaming connection broke or could not be established.
    #[error("transport error: {0}")]
    Transport(String),
}

impl BotError {
    /// Process exit status for a fatal error of this kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            BotError::StorageUnavailable(_) => 2,
            _ => 1,
        }
    }
}

/// Exit status for any error that escapes `start`.
pub fn exit_code_for(err: &Err) -> u8 {
    err.downcast_ref::<BotError>().map(BotError::exit_code).unwrap_or(1)
}

/// Returns `true` if the error means the counter store is gone.
pub fn is_storage_unavailable(err: &Err) -> bool {
    matches!(err.downcast_ref::<BotError>(), Some(BotError::StorageUnavailable(_)))
}

/// How the bot answers `showme` commands.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Reply in the channel (or DM) where the request was received.
    Channel,
    /// Reply via direct message to the requester.
    #[default]
    Dm,
    /// Never reply to `showme` requests.
    Quiet,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunMode::Channel => "channel",
            RunMode::Dm => "dm",
            RunMode::Quiet => "quiet",
        };

        f.write_str(name)
    }
}

/// One row of the counter log.
///
/// Rows are never updated; withdrawing a reaction appends a row with `counter = -1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub from_user: String,
    pub to_user: String,
    pub reaction: String,
    pub counter: i64,
}

impl ReactionEvent {
    pub fn added(from_user: impl Into<String>, to_user: impl Into<String>, reaction: impl Into<String>) -> Self {
        Self {
            from_user: from_user.into(),
            to_user: to_user.into(),
            reaction: reaction.into(),
            counter: 1,
        }
    }

    pub fn removed(from_user: impl Into<String>, to_user: impl Into<String>, reaction: impl Into<String>) -> Self {
        Self { counter: -1, ..Self::added(from_user, to_user, reaction) }
    }
}

/// A grouped total: a user id or reaction name with its summed counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub subject: String,
    pub total: i64,
}

impl Aggregate {
    pub fn new(subject: impl Into<String>, total: i64) -> Self {
        Self { subject: subject.into(), total }
    }
}

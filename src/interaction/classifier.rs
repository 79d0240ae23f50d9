//! Turns raw stream events into normalized actions.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::{base::types::RunMode, service::directory::DirectoryCache};

/// Allowed characters of an emoji argument.
static EMOJI_ARGUMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_+-]+$").expect("valid regex"));

/// Command prefix.
const SHOWME: &str = "showme";

// Actions.

/// A reaction between two distinct, known users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub from_user: String,
    pub to_user: String,
    pub reaction: String,
}

/// The query a `showme` command asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Version,
    Received,
    Given,
    Reactions,
    /// Top five recipients of a reaction.
    Top(String),
    /// Every recipient of a reaction.
    All(String),
    /// Every giver of a reaction.
    Clicked(String),
    /// The request could not be understood.
    Usage,
}

/// A command together with where its answer goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command: Command,
    /// Channel (or user, for direct messages) the reply is posted to.
    pub reply_to: String,
    /// Channel the request was typed in.
    pub channel: String,
    pub requested_by: String,
}

/// The normalized outcome of one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ReactionAdded(Reaction),
    ReactionRemoved(Reaction),
    Command(Request),
    Ignored,
}

// Inbound events.

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundEvent {
    ReactionAdded(ReactionPayload),
    ReactionRemoved(ReactionPayload),
    Message(MessagePayload),
    AppMention(MessagePayload),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ReactionPayload {
    user: String,
    #[serde(default)]
    item_user: Option<String>,
    reaction: String,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

// Classifier.

/// Classifies raw events against the directory and the reply mode.
#[derive(Clone)]
pub struct Classifier {
    directory: DirectoryCache,
    mode: RunMode,
    bot_user_id: String,
}

impl Classifier {
    pub fn new(directory: DirectoryCache, mode: RunMode, bot_user_id: impl Into<String>) -> Self {
        Self {
            directory,
            mode,
            bot_user_id: bot_user_id.into(),
        }
    }

    /// Classifies one raw event.
    ///
    /// Anything that does not decode into a known event shape is [`Action::Ignored`].
    #[instrument(name = "Classifier::classify", skip_all)]
    pub async fn classify(&self, raw: &Value) -> Action {
        let event = match InboundEvent::deserialize(raw) {
            Ok(event) => event,
            Err(e) => {
                debug!("Ignoring undecodable event: {}", e);
                return Action::Ignored;
            }
        };

        match event {
            InboundEvent::ReactionAdded(payload) => self.reaction(payload).await.map_or(Action::Ignored, Action::ReactionAdded),
            InboundEvent::ReactionRemoved(payload) => self.reaction(payload).await.map_or(Action::Ignored, Action::ReactionRemoved),
            InboundEvent::Message(payload) | InboundEvent::AppMention(payload) => self.command(payload),
            InboundEvent::Other => Action::Ignored,
        }
    }

    async fn reaction(&self, payload: ReactionPayload) -> Option<Reaction> {
        let to_user = payload.item_user?;
        let from_user = payload.user;

        if from_user == to_user {
            debug!("Ignoring self-reaction by {}", from_user);
            return None;
        }

        if !self.directory.ensure_users(&[from_user.as_str(), to_user.as_str()]).await {
            warn!("Ignoring reaction between unresolved users {} and {}", from_user, to_user);
            return None;
        }

        Some(Reaction {
            from_user,
            to_user,
            reaction: normalize_reaction(&payload.reaction),
        })
    }

    fn command(&self, payload: MessagePayload) -> Action {
        if self.mode == RunMode::Quiet {
            return Action::Ignored;
        }

        let (Some(user), Some(channel), Some(text)) = (payload.user, payload.channel, payload.text) else {
            return Action::Ignored;
        };

        if user == self.bot_user_id {
            return Action::Ignored;
        }

        let Some(command) = parse_command(&text) else {
            return Action::Ignored;
        };

        let command = match command {
            Command::Top(r) => Command::Top(self.directory.resolve_emoji(&r)),
            Command::All(r) => Command::All(self.directory.resolve_emoji(&r)),
            Command::Clicked(r) => Command::Clicked(self.directory.resolve_emoji(&r)),
            other => other,
        };

        let reply_to = match self.mode {
            RunMode::Channel => channel.clone(),
            _ => user.clone(),
        };

        Action::Command(Request {
            command,
            reply_to,
            channel,
            requested_by: user,
        })
    }
}

// Parsing.

/// Strips a skin-tone qualifier (`thumbsup::skin-tone-2` becomes `thumbsup`).
pub fn normalize_reaction(reaction: &str) -> String {
    reaction.split(':').next().unwrap_or_default().to_string()
}

/// Parses a `showme` command; `None` if the text is not one.
pub fn parse_command(text: &str) -> Option<Command> {
    let lowered = text.to_lowercase();
    let mut words = lowered.split_whitespace();

    if words.next()? != SHOWME {
        return None;
    }

    let Some(mode) = words.next() else {
        return Some(Command::Usage);
    };

    match mode {
        "version" => return Some(Command::Version),
        "received" => return Some(Command::Received),
        "given" => return Some(Command::Given),
        "reactions" => return Some(Command::Reactions),
        _ => {}
    }

    let reaction = match words.next() {
        Some(reaction) if EMOJI_ARGUMENT.is_match(reaction) => reaction.to_string(),
        _ => return Some(Command::Usage),
    };

    let command = match mode {
        "top" => Command::Top(reaction),
        "all" => Command::All(reaction),
        "clicked" => Command::Clicked(reaction),
        _ => Command::Usage,
    };

    Some(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skin_tones_are_stripped() {
        assert_eq!(normalize_reaction("thumbsup::skin-tone-2"), "thumbsup");
        assert_eq!(normalize_reaction("thumbsup"), "thumbsup");
        assert_eq!(normalize_reaction("+1::skin-tone-6"), "+1");
    }

    #[test]
    fn fixed_commands_parse_case_insensitively() {
        assert_eq!(parse_command("showme version"), Some(Command::Version));
        assert_eq!(parse_command("ShowMe RECEIVED"), Some(Command::Received));
        assert_eq!(parse_command("  showme   given  "), Some(Command::Given));
        assert_eq!(parse_command("showme reactions please"), Some(Command::Reactions));
    }

    #[test]
    fn emoji_commands_parse() {
        assert_eq!(parse_command("showme top tada"), Some(Command::Top("tada".into())));
        assert_eq!(parse_command("showme all +1"), Some(Command::All("+1".into())));
        assert_eq!(parse_command("showme clicked Party-Parrot"), Some(Command::Clicked("party-parrot".into())));
    }

    #[test]
    fn malformed_commands_are_usage_errors() {
        assert_eq!(parse_command("showme"), Some(Command::Usage));
        assert_eq!(parse_command("showme top"), Some(Command::Usage));
        assert_eq!(parse_command("showme top a/b"), Some(Command::Usage));
        assert_eq!(parse_command("showme top :tada:"), Some(Command::Usage));
        assert_eq!(parse_command("showme best tada"), Some(Command::Usage));
    }

    #[test]
    fn other_text_is_not_a_command() {
        assert_eq!(parse_command("hello there"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("showmeversion"), None);
    }
}

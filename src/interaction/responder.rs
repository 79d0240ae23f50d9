//! Answers `showme` commands with rendered leaderboards.

use chrono::{DateTime, Local};
use tracing::{error, info, instrument};

use crate::{
    base::{
        messages::{FENCE, NO_REACTIONS_FOUND, USAGE, no_reaction_found},
        types::{Aggregate, Res, Void, is_storage_unavailable},
    },
    service::{
        chat::ChatClient,
        db::{DbClient, TOP_RECIPIENTS_LIMIT},
        directory::DirectoryCache,
    },
};

use super::classifier::{Command, Request};

/// Builds and sends replies to `showme` commands.
#[derive(Clone)]
pub struct Responder {
    db: DbClient,
    directory: DirectoryCache,
    chat: ChatClient,
    started_at: DateTime<Local>,
    revision: String,
}

impl Responder {
    pub fn new(db: DbClient, directory: DirectoryCache, chat: ChatClient, started_at: DateTime<Local>, revision: impl Into<String>) -> Self {
        Self {
            db,
            directory,
            chat,
            started_at,
            revision: revision.into(),
        }
    }

    /// Answers one request.
    ///
    /// Query and send failures are logged and the request is dropped, except
    /// when the counter store is gone, which is returned as a fatal error.
    #[instrument(name = "Responder::respond", skip_all)]
    pub async fn respond(&self, request: &Request) -> Void {
        self.log_request(request);

        let reply = match self.render(&request.command).await {
            Ok(reply) => reply,
            Err(e) if is_storage_unavailable(&e) => return Err(e),
            Err(e) => {
                error!("Could not answer {:?}: {}", request.command, e);
                return Ok(());
            }
        };

        for line in reply.lines() {
            info!("{}", line);
        }

        if let Err(e) = self.chat.send_message(&request.reply_to, &reply).await {
            error!("Could not send reply to {}: {}", request.reply_to, e);
        }

        Ok(())
    }

    /// Renders the reply text for a command.
    pub async fn render(&self, command: &Command) -> Res<String> {
        let reply = match command {
            Command::Version => render_version(&self.started_at, &self.revision),
            Command::Received => self.user_table(self.db.sum_by_recipient(None).await?, NO_REACTIONS_FOUND).await,
            Command::Given => self.user_table(self.db.sum_by_giver(None).await?, NO_REACTIONS_FOUND).await,
            Command::Reactions => {
                let rows: Vec<_> = self.db.sum_by_reaction().await?.into_iter().map(|r| (r.subject, r.total)).collect();
                render_table(&rows, NO_REACTIONS_FOUND)
            }
            Command::Top(reaction) => {
                let rows = self.db.top_for_reaction(reaction, Some(TOP_RECIPIENTS_LIMIT)).await?;
                self.user_table(rows, &no_reaction_found(reaction)).await
            }
            Command::All(reaction) => {
                let rows = self.db.top_for_reaction(reaction, None).await?;
                self.user_table(rows, &no_reaction_found(reaction)).await
            }
            Command::Clicked(reaction) => {
                let rows = self.db.sum_by_giver(Some(reaction)).await?;
                self.user_table(rows, &no_reaction_found(reaction)).await
            }
            Command::Usage => USAGE.to_string(),
        };

        Ok(reply)
    }

    /// Renders totals keyed by user id with display names.
    async fn user_table(&self, rows: Vec<Aggregate>, empty: &str) -> String {
        let ids: Vec<&str> = rows.iter().map(|r| r.subject.as_str()).collect();
        self.directory.ensure_users(&ids).await;

        let named: Vec<_> = rows.iter().map(|r| (self.directory.resolve_user(&r.subject), r.total)).collect();

        render_table(&named, empty)
    }

    /// Where a request was typed, for the request log.
    fn origin(&self, channel_id: &str) -> String {
        if let Some(channel) = self.directory.channel_name(channel_id) {
            return format!("in #{channel}");
        }

        match self.directory.direct_message_peer(channel_id) {
            Some(peer) => format!("via IM with {peer}"),
            None => "via IM".to_string(),
        }
    }

    fn log_request(&self, request: &Request) {
        let user = self.directory.resolve_user(&request.requested_by);

        match &request.command {
            Command::Top(r) | Command::All(r) | Command::Clicked(r) => {
                let verb = match &request.command {
                    Command::Top(_) => "top",
                    Command::All(_) => "all",
                    _ => "clicked",
                };

                info!("{} requested to see {} {} {}", user, verb, r, self.origin(&request.channel));
            }
            Command::Usage => info!("{} sent an unrecognized request", user),
            other => info!("{} requested to see {:?}", user, other),
        }
    }
}

// Rendering.

/// Renders `(name, total)` rows as an aligned, fenced table.
///
/// Names are padded to the widest name plus one space. An empty list
/// renders `empty` in place of the rows.
pub fn render_table(rows: &[(String, i64)], empty: &str) -> String {
    if rows.is_empty() {
        return format!("{FENCE}{empty}{FENCE}");
    }

    let width = rows.iter().map(|(name, _)| name.chars().count()).max().unwrap_or_default() + 1;

    let body: String = rows.iter().map(|(name, total)| format!("{name:<width$} {total}\n")).collect();

    format!("{FENCE}{body}{FENCE}")
}

/// Renders the start time and source revision.
pub fn render_version(started_at: &DateTime<Local>, revision: &str) -> String {
    format!(
        "{FENCE}\n{:<14} {}\n{:<14} {}\n{FENCE}",
        "started:",
        started_at.format("%Y-%m-%d %H:%M:%S"),
        "head:",
        revision
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn table_pads_names_to_the_widest_plus_one() {
        let rows = vec![("alice".to_string(), 3), ("bob".to_string(), -1)];

        assert_eq!(render_table(&rows, NO_REACTIONS_FOUND), "```alice  3\nbob    -1\n```");
    }

    #[test]
    fn empty_table_renders_the_placeholder() {
        assert_eq!(render_table(&[], NO_REACTIONS_FOUND), "```no reactions found```");
        assert_eq!(render_table(&[], &no_reaction_found("tada")), "```no 'tada' reactions found```");
    }

    #[test]
    fn version_lists_start_time_and_revision() {
        let started_at = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();

        let text = render_version(&started_at, "abc1234");

        assert_eq!(text, "```\nstarted:       2024-05-01 09:30:00\nhead:          abc1234\n```");
    }
}

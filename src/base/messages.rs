//! Fixed texts the bot sends back to users.

/// Opening and closing fence of every reply.
pub const FENCE: &str = "```";

/// Placeholder for identifiers the directory does not know.
pub const UNKNOWN: &str = "unknown";

/// Line rendered in place of an empty leaderboard.
pub const NO_REACTIONS_FOUND: &str = "no reactions found";

/// Sent back when a `showme` request cannot be understood.
pub const USAGE: &str = "```
usage:
    showme  [top|all|clicked] <reaction>
    showme  [given|received|reactions]
    showme  [version]
```";

/// Line rendered in place of an empty single-reaction leaderboard.
pub fn no_reaction_found(reaction: &str) -> String {
    format!("no '{reaction}' reactions found")
}

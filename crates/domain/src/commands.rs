//! Slash-command parsing, owner-only authorization, and the feedback-loop
//! guards applied by both the gateway and the worker.
//!
//! A comment is a command iff its trimmed text starts with `/`. The first
//! whitespace-delimited token (minus the `/`) is the verb; the rest are args.
//! Authorization is evaluated before any mutating call is made.

use crate::{EventEnvelope, EventMetadata, FilterReason, UserLogin};

/// Reserved token the worker embeds in its own output.
pub const LOOP_MARKER: &str = "AIRLOCK_ECHO_ACK";

/// The marker as it is embedded in comments (an invisible HTML comment).
pub const LOOP_MARKER_TAG: &str = "<!-- AIRLOCK_ECHO_ACK -->";

const LABEL_VERB: &str = "label";
const ASSIGN_VERB: &str = "assign";

/// A parsed slash-command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// First token without its leading `/`, compared exactly.
    pub verb: String,
    /// Remaining tokens in order. For `assign`, mention sigils are stripped.
    pub args: Vec<String>,
}

/// What a command asks the worker to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    /// Add these labels to the issue.
    AddLabels(Vec<String>),
    /// Add these assignees to the issue.
    AddAssignees(Vec<String>),
    /// A recognized verb with no arguments.
    Usage {
        /// The verb as typed.
        verb: String,
        /// Usage line to show.
        usage: &'static str,
    },
    /// A verb the worker does not know.
    Unknown {
        /// The verb as typed.
        verb: String,
    },
}

/// Parses `text` as a slash-command. Returns `None` for plain comments.
pub fn parse_command(text: &str) -> Option<Command> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return None;
    }
    let mut tokens = trimmed.split_whitespace();
    let first = tokens.next().unwrap_or_default();
    let verb = first.strip_prefix('/').unwrap_or(first).to_string();

    let args = if verb == ASSIGN_VERB {
        tokens
            .map(|t| t.trim_start_matches('@'))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        tokens.map(str::to_string).collect()
    };

    Some(Command { verb, args })
}

impl Command {
    /// Interprets the command.
    pub fn action(&self) -> CommandAction {
        match self.verb.as_str() {
            LABEL_VERB if self.args.is_empty() => {
                CommandAction::Usage { verb: self.verb.clone(), usage: "/label <name> [<name>...]" }
            }
            ASSIGN_VERB if self.args.is_empty() => {
                CommandAction::Usage { verb: self.verb.clone(), usage: "/assign @<user> [@<user>...]" }
            }
            LABEL_VERB => CommandAction::AddLabels(self.args.clone()),
            ASSIGN_VERB => CommandAction::AddAssignees(self.args.clone()),
            _ => CommandAction::Unknown { verb: self.verb.clone() },
        }
    }
}

/// Authorization decision for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    /// The author owns the repository.
    Authorized,
    /// Anyone else.
    Unauthorized,
}

/// Only the repository owner may run commands. Logins compare case-insensitively.
pub fn authorize(author: &UserLogin, owner: &UserLogin) -> Authorization {
    if author.matches(owner) {
        Authorization::Authorized
    } else {
        Authorization::Unauthorized
    }
}

/// Whether `text` carries the worker's own loop marker.
pub fn contains_loop_marker(text: &str) -> bool {
    text.contains(LOOP_MARKER)
}

/// Bot guard and loop guard.
///
/// Returns the reason the envelope must be dropped, or `None` if it may be
/// processed.
pub fn screen(envelope: &EventEnvelope) -> Option<FilterReason> {
    let bot_author = match envelope.metadata() {
        EventMetadata::GitHub(meta) => meta.author_kind.is_bot(),
        EventMetadata::Telegram(meta) => meta.sender_is_bot,
    };
    if bot_author {
        return Some(FilterReason::BotAuthor);
    }
    if contains_loop_marker(envelope.text()) {
        return Some(FilterReason::LoopMarker);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::fixtures::{github_envelope, telegram_envelope};
    use crate::AuthorKind;
    use proptest::prelude::*;

    fn login(value: &str) -> UserLogin {
        UserLogin::new(value).unwrap()
    }

    #[test]
    fn plain_comment_is_not_a_command() {
        assert_eq!(parse_command("thanks for the fix"), None);
        assert_eq!(parse_command("see /label docs"), None);
    }

    #[test]
    fn label_command_parses() {
        let command = parse_command("  /label bug urgent  ").unwrap();
        assert_eq!(command.verb, "label");
        assert_eq!(command.args, vec!["bug", "urgent"]);
        assert_eq!(command.action(), CommandAction::AddLabels(vec!["bug".into(), "urgent".into()]));
    }

    #[test]
    fn assign_strips_mention_sigils() {
        let command = parse_command("/assign @alice bob @@carol @").unwrap();
        assert_eq!(command.args, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn verb_is_compared_exactly() {
        let command = parse_command("/LABEL bug").unwrap();
        assert_eq!(command.verb, "LABEL");
        assert_eq!(command.action(), CommandAction::Unknown { verb: "LABEL".into() });
    }

    #[test]
    fn detached_slash_is_an_empty_verb() {
        let command = parse_command("/ label bug").unwrap();
        assert_eq!(command.verb, "");
        assert_eq!(command.args, vec!["label", "bug"]);
        assert_eq!(command.action(), CommandAction::Unknown { verb: String::new() });
    }

    #[test]
    fn recognized_verb_without_args_asks_for_usage() {
        let action = parse_command("/label").unwrap().action();
        assert!(matches!(action, CommandAction::Usage { .. }));
    }

    #[test]
    fn unknown_verb() {
        assert_eq!(
            parse_command("/deploy prod").unwrap().action(),
            CommandAction::Unknown { verb: "deploy".into() }
        );
        assert_eq!(parse_command("/").unwrap().action(), CommandAction::Unknown { verb: String::new() });
        assert_eq!(parse_command("//label bug").unwrap().verb, "/label");
    }

    #[test]
    fn only_the_owner_is_authorized() {
        assert_eq!(authorize(&login("octocat"), &login("octocat")), Authorization::Authorized);
        assert_eq!(authorize(&login("OctoCat"), &login("octocat")), Authorization::Authorized);
        assert_eq!(authorize(&login("mallory"), &login("octocat")), Authorization::Unauthorized);
    }

    #[test]
    fn guards_drop_bots_and_marked_text() {
        assert_eq!(screen(&github_envelope("/label bug")), None);
        assert_eq!(screen(&telegram_envelope("hello")), None);

        let marked = format!("answer\n\n{LOOP_MARKER_TAG}");
        assert_eq!(screen(&github_envelope(&marked)), Some(FilterReason::LoopMarker));
        assert_eq!(screen(&telegram_envelope(&marked)), Some(FilterReason::LoopMarker));
    }

    #[test]
    fn bot_authored_comment_is_dropped() {
        let envelope = github_envelope("/label bug");
        let mut json = serde_json::to_value(&envelope).unwrap();
        json["metadata"]["author_kind"] = serde_json::to_value(AuthorKind::Bot).unwrap();
        let bot: EventEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(screen(&bot), Some(FilterReason::BotAuthor));
    }

    proptest! {
        #[test]
        fn text_without_leading_slash_is_never_a_command(text in "[^/\\s][^\n]{0,64}") {
            prop_assert!(parse_command(&text).is_none());
        }

        #[test]
        fn assign_args_never_keep_a_sigil(names in prop::collection::vec("@{0,2}[a-z]{1,10}", 0..5)) {
            let text = format!("/assign {}", names.join(" "));
            let command = parse_command(&text).unwrap();
            prop_assert_eq!(command.args.len(), names.len());
            prop_assert!(command.args.iter().all(|a| !a.starts_with('@')));
        }

        #[test]
        fn gap_after_slash_never_yields_a_known_verb(
            gap in "[ \t\n]{1,3}",
            verb in prop::sample::select(vec!["label", "assign"]),
            arg in "[a-z]{1,8}"
        ) {
            let command = parse_command(&format!("/{gap}{verb} {arg}")).unwrap();
            prop_assert_eq!(command.verb.as_str(), "");
            let is_unknown = matches!(command.action(), CommandAction::Unknown { .. });
            prop_assert!(is_unknown);
        }

        #[test]
        fn non_owner_is_never_authorized(author in "[a-z]{1,12}", owner in "[a-z]{1,12}") {
            prop_assume!(author != owner);
            prop_assert_eq!(authorize(&login(&author), &login(&owner)), Authorization::Unauthorized);
        }
    }
}

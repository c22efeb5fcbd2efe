//! Per-command and per-numeric handlers.
//!
//! The handlers are split into submodules for readability:
//! - [`registration`]: 001, 004, 005, MOTD, nick collision, password
//! - [`channel`]: JOIN, PART, KICK, TOPIC and the join-time topic numerics
//! - [`lists`]: NAMES and ban/invite/exception list batches
//! - [`modes`]: MODE, 324 and 221
//! - [`messaging`]: PRIVMSG and NOTICE, including CTCP
//! - [`users`]: NICK, QUIT, INVITE and away state
//!
//! Every handler takes the raw token vector produced by
//! [`crate::irc::tokenise_line`] and returns a [`ProcessError`] for lines it
//! cannot use; the parser turns those into diagnostics.

mod channel;
mod lists;
mod messaging;
mod modes;
mod registration;
mod users;

use crate::error::ProcessError;
use crate::event::Event;
use crate::parser::Parser;

pub(crate) fn dispatch(
    parser: &mut Parser,
    command: &str,
    tokens: &[String],
) -> Result<(), ProcessError> {
    if command.len() == 3
        && let Ok(numeric) = command.parse::<u16>()
    {
        parser.fire(Event::NumericReceived {
            numeric,
            tokens: tokens.to_vec(),
        });
    }

    match command {
        "001" => registration::handle_welcome(parser, tokens),
        "004" => registration::handle_myinfo(parser, tokens),
        "005" => registration::handle_isupport(parser, tokens),
        "372" | "375" | "376" | "422" => registration::handle_motd(parser, command, tokens),
        "433" => registration::handle_nick_in_use(parser, tokens),
        "464" => registration::handle_password_required(parser),

        "JOIN" => channel::handle_join(parser, tokens),
        "PART" => channel::handle_part(parser, tokens),
        "KICK" => channel::handle_kick(parser, tokens),
        "TOPIC" => channel::handle_topic(parser, tokens),
        "332" => channel::handle_topic_reply(parser, tokens),
        "333" => channel::handle_topic_who_time(parser, tokens),
        "329" => channel::handle_creation_time(parser, tokens),

        "353" => lists::handle_names(parser, tokens),
        "366" => lists::handle_end_of_names(parser, tokens),
        "346" | "348" | "367" => lists::handle_list_item(parser, command, tokens),
        "347" | "349" | "368" => lists::handle_list_end(parser, command, tokens),

        "MODE" | "324" | "221" => modes::handle_mode(parser, command, tokens),

        "PRIVMSG" | "NOTICE" => messaging::handle_message(parser, command, tokens),

        "NICK" => users::handle_nick(parser, tokens),
        "QUIT" => users::handle_quit(parser, tokens),
        "INVITE" => users::handle_invite(parser, tokens),
        "301" => users::handle_away_reply(parser, tokens),
        "305" | "306" => users::handle_away_state(parser, command),

        _ => Err(ProcessError::ProcessorNotFound(command.to_string())),
    }
}

/// Fail with [`ProcessError::ShortLine`] unless `tokens` has at least
/// `expected` entries.
pub(super) fn require(tokens: &[String], expected: usize) -> Result<(), ProcessError> {
    if tokens.len() >= expected {
        return Ok(());
    }
    let command = crate::irc::command_of(tokens).unwrap_or_default();
    Err(ProcessError::ShortLine {
        command,
        expected,
        got: tokens.len(),
    })
}

/// The prefix without its leading colon.
pub(super) fn source(tokens: &[String]) -> &str {
    tokens[0].strip_prefix(':').unwrap_or(&tokens[0])
}

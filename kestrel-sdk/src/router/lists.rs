//! NAMES replies and ban/invite/exception list batches.
//!
//! Each batch starts the first time an item for an idle channel (or list)
//! arrives, which throws away whatever was stored before, and ends at the
//! matching end-of numeric. Item lines with no end-of between them belong
//! to the same batch.

use crate::error::ProcessError;
use crate::event::Event;
use crate::irc::{self, Hostmask};
use crate::modes::{ChanModeKind, ParamMode};
use crate::parser::Parser;
use crate::state::{ListModeEntry, Lookup};

use super::channel::display_name;
use super::require;

/// `:server 353 me = #chan :@alice +bob carol`
///
/// Some servers leave out the channel type token, so the channel is always
/// taken from the second-to-last position.
pub(super) fn handle_names(parser: &mut Parser, tokens: &[String]) -> Result<(), ProcessError> {
    require(tokens, 5)?;
    let channel = tokens[tokens.len() - 2].clone();
    let names = &tokens[tokens.len() - 1];

    let (chan, lookup) = parser.network.ensure_channel(&channel);
    if !chan.receiving_names {
        chan.members.clear();
        chan.receiving_names = true;
    }
    if lookup == Lookup::Created {
        parser.warn(format!("got names for {channel}, which I am not on"));
    }

    for entry in names.split_whitespace() {
        let (bits, rest) = strip_prefixes(parser, entry);
        if rest.is_empty() {
            continue;
        }
        let mask = Hostmask::parse(rest);
        parser.network.ensure_client(&mask);
        if let Some((membership, _)) = parser.network.add_member(&channel, &mask.nick) {
            membership.modes = bits;
        }
    }
    Ok(())
}

/// Split leading prefix symbols off a NAMES entry, summing their bits.
fn strip_prefixes<'a>(parser: &Parser, entry: &'a str) -> (u64, &'a str) {
    let mut bits = 0;
    let mut rest = entry;
    while let Some(c) = rest.chars().next() {
        let Some(bit) = parser.modes.prefix_symbol_bit(c) else {
            break;
        };
        bits |= bit;
        rest = &rest[c.len_utf8()..];
    }
    (bits, rest)
}

/// `:server 366 me #chan :End of /NAMES list.`
pub(super) fn handle_end_of_names(
    parser: &mut Parser,
    tokens: &[String],
) -> Result<(), ProcessError> {
    require(tokens, 4)?;
    let channel = tokens[3].clone();
    let (chan, lookup) = parser.network.ensure_channel(&channel);
    chan.receiving_names = false;
    if lookup == Lookup::Created {
        parser.warn(format!("got end of names for {channel}, which I am not on"));
    }

    let pruned = parser.network.prune_invisible();
    if pruned > 0 {
        parser.debug(format!("dropped {pruned} clients no longer visible after names"));
    }
    let channel = display_name(parser, &channel);
    parser.fire(Event::ChannelGotNames { channel });
    Ok(())
}

fn list_mode_for(command: &str) -> char {
    match command {
        irc::RPL_INVITELIST | irc::RPL_ENDOFINVITELIST => 'I',
        irc::RPL_EXCEPTLIST | irc::RPL_ENDOFEXCEPTLIST => 'e',
        _ => 'b',
    }
}

/// `:server 367 me #chan <item> [owner [time]]`, likewise 346 and 348.
pub(super) fn handle_list_item(
    parser: &mut Parser,
    command: &str,
    tokens: &[String],
) -> Result<(), ProcessError> {
    require(tokens, 5)?;
    let mode = list_mode_for(command);
    let channel = tokens[3].clone();
    let entry = ListModeEntry {
        item: tokens[4].clone(),
        owner: tokens.get(5).cloned().unwrap_or_default(),
        time: tokens
            .get(6)
            .and_then(|t| t.parse::<i64>().ok())
            .unwrap_or_default(),
    };

    if parser.modes.classify(mode) != ChanModeKind::Param(ParamMode::List) {
        parser.warn(format!("{mode} is not a list mode on this server, tracking it anyway"));
    }

    let casemap = parser.network.casemap;
    let (chan, lookup) = parser.network.ensure_channel(&channel);
    if chan.receiving_lists.insert(mode) {
        chan.lists.remove(&mode);
    }
    let added = chan.set_list_entry(casemap, mode, entry, true);
    if lookup == Lookup::Created {
        parser.warn(format!("got +{mode} list for {channel}, which I am not on"));
    }
    if !added {
        parser.warn(format!("duplicate +{mode} entry {} on {channel}", tokens[4]));
    }
    Ok(())
}

/// `:server 368 me #chan :End of channel ban list`, likewise 347 and 349.
pub(super) fn handle_list_end(
    parser: &mut Parser,
    command: &str,
    tokens: &[String],
) -> Result<(), ProcessError> {
    require(tokens, 4)?;
    let mode = list_mode_for(command);
    let channel = tokens[3].clone();

    let (chan, lookup) = parser.network.ensure_channel(&channel);
    // No items in this batch: the list is empty now.
    if !chan.receiving_lists.remove(&mode) {
        chan.lists.remove(&mode);
    }
    if lookup == Lookup::Created {
        parser.warn(format!("got end of +{mode} list for {channel}, which I am not on"));
    }

    let channel = display_name(parser, &channel);
    parser.fire(Event::ChannelGotListModes { channel, mode });
    Ok(())
}

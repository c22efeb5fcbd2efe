//! Client-level changes: NICK, QUIT, INVITE and away state.

use crate::error::ProcessError;
use crate::event::Event;
use crate::irc::{self, Hostmask};
use crate::parser::Parser;

use super::require;

/// `:old!ident@host NICK new`
pub(super) fn handle_nick(parser: &mut Parser, tokens: &[String]) -> Result<(), ProcessError> {
    require(tokens, 3)?;
    let user = parser.touch_sender(&tokens[0]);
    let new_nick = tokens[2].clone();
    let is_me = parser.network.is_me(&user.nick);

    if !is_me && parser.network.client(&user.nick).is_none() {
        parser.debug(format!("nick change for unknown client {}", user.nick));
        return Ok(());
    }

    let shared = parser.network.rename_client(&user.nick, &new_nick);
    if is_me {
        parser.attempted_nick = new_nick.clone();
    }
    for channel in shared {
        parser.fire(Event::ChannelNickChanged {
            channel,
            old_nick: user.nick.clone(),
            new_nick: new_nick.clone(),
        });
    }
    parser.fire(Event::NickChanged {
        old_nick: user.nick.clone(),
        new_nick,
        user,
    });
    Ok(())
}

/// `:nick!ident@host QUIT [:reason]`
pub(super) fn handle_quit(parser: &mut Parser, tokens: &[String]) -> Result<(), ProcessError> {
    require(tokens, 2)?;
    let user = parser.touch_sender(&tokens[0]);
    let reason = tokens.get(2).cloned().unwrap_or_default();
    let channels = parser.network.channels_of(&user.nick);

    if channels.is_empty() && parser.network.client(&user.nick).is_none() {
        parser.debug(format!("quit for unknown client {}", user.nick));
        return Ok(());
    }

    for channel in channels {
        parser.fire(Event::ChannelQuit {
            channel: channel.clone(),
            user: user.clone(),
            reason: reason.clone(),
        });
        parser.network.remove_member(&channel, &user.nick);
    }
    let nick = user.nick.clone();
    parser.fire(Event::Quit { user, reason });

    if parser.network.is_me(&nick) {
        parser.network.clear_channels();
    } else {
        parser.network.remove_client(&nick);
    }
    Ok(())
}

/// `:from INVITE me #chan`
pub(super) fn handle_invite(parser: &mut Parser, tokens: &[String]) -> Result<(), ProcessError> {
    require(tokens, 4)?;
    let from = Hostmask::parse(&tokens[0]);
    parser.fire(Event::Invite {
        channel: tokens[3].clone(),
        from,
    });
    Ok(())
}

/// `:server 301 me nick :reason`
pub(super) fn handle_away_reply(parser: &mut Parser, tokens: &[String]) -> Result<(), ProcessError> {
    require(tokens, 4)?;
    let nick = tokens[3].clone();
    let reason = tokens.get(4).cloned().unwrap_or_default();
    if let Some(client) = parser.network.client_mut(&nick) {
        client.away = true;
        client.away_reason = Some(reason.clone());
    }
    parser.fire(Event::AwayStateOther { nick, reason });
    Ok(())
}

/// 305 (no longer away) and 306 (now away).
pub(super) fn handle_away_state(parser: &mut Parser, command: &str) -> Result<(), ProcessError> {
    let away = command == irc::RPL_NOWAWAY;
    let reason = if away { parser.away_reason.clone() } else { None };

    parser.network.away = away;
    let my_nick = parser.network.my_nick.clone();
    if let Some(me) = parser.network.client_mut(&my_nick) {
        me.away = away;
        me.away_reason = reason.clone();
    }
    parser.fire(Event::AwayState { away, reason });
    Ok(())
}

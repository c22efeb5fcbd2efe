//! Channel membership and topics: JOIN, PART, KICK, TOPIC, 332, 333, 329.

use crate::error::ProcessError;
use crate::event::Event;
use crate::irc::Hostmask;
use crate::parser::Parser;
use crate::state::Lookup;

use super::{require, source};

pub(super) fn handle_join(parser: &mut Parser, tokens: &[String]) -> Result<(), ProcessError> {
    require(tokens, 3)?;
    let user = Hostmask::parse(&tokens[0]);
    let channel = tokens[2].clone();

    if parser.network.is_me(&user.nick) {
        parser.network.ensure_client(&user);
        let name = parser.network.reset_channel(&channel).name.clone();
        parser.network.add_member(&name, &user.nick);
        parser.fire(Event::ChannelSelfJoin {
            channel: name.clone(),
        });
        parser.send_line(format!("MODE {name}"), true);
        return Ok(());
    }

    if parser.network.channel(&channel).is_none() {
        parser.warn(format!("got join for {channel}, which I am not on"));
        parser.network.ensure_channel(&channel);
    }
    parser.network.ensure_client(&user);
    if let Some((_, Lookup::Existing)) = parser.network.add_member(&channel, &user.nick) {
        parser.debug(format!("{} joined {channel} twice", user.nick));
    }
    let channel = display_name(parser, &channel);
    parser.fire(Event::ChannelJoin { channel, user });
    Ok(())
}

pub(super) fn handle_part(parser: &mut Parser, tokens: &[String]) -> Result<(), ProcessError> {
    require(tokens, 3)?;
    let user = parser.touch_sender(&tokens[0]);
    let channel = tokens[2].clone();
    let reason = tokens.get(3).cloned().unwrap_or_default();

    if parser.network.channel(&channel).is_none() {
        parser.warn(format!("got part for {channel}, which I am not on"));
        return Ok(());
    }
    if parser.network.membership(&channel, &user.nick).is_none() {
        parser.warn(format!("got part for {} who is not on {channel}", user.nick));
        return Ok(());
    }

    let channel = display_name(parser, &channel);
    parser.fire(Event::ChannelPart {
        channel: channel.clone(),
        user: user.clone(),
        reason,
    });
    leave(parser, &channel, &user.nick);
    Ok(())
}

/// `:setter KICK #chan victim [:reason]`
pub(super) fn handle_kick(parser: &mut Parser, tokens: &[String]) -> Result<(), ProcessError> {
    require(tokens, 4)?;
    let by = parser.touch_sender(&tokens[0]);
    let channel = tokens[2].clone();
    let kicked = tokens[3].clone();
    let reason = tokens.get(4).cloned().unwrap_or_default();

    if parser.network.channel(&channel).is_none() {
        parser.warn(format!("got kick for {channel}, which I am not on"));
        return Ok(());
    }
    if parser.network.membership(&channel, &kicked).is_none() {
        parser.warn(format!("got kick for {kicked} who is not on {channel}"));
        return Ok(());
    }

    let channel = display_name(parser, &channel);
    parser.fire(Event::ChannelKick {
        channel: channel.clone(),
        kicked: kicked.clone(),
        by,
        reason,
    });
    leave(parser, &channel, &kicked);
    Ok(())
}

/// Remove `nick` from `channel`. When it is us the whole channel goes.
fn leave(parser: &mut Parser, channel: &str, nick: &str) {
    if parser.network.is_me(nick) {
        parser.network.remove_channel(channel);
    } else {
        parser.network.remove_member(channel, nick);
        parser.network.prune_client(nick);
    }
}

pub(super) fn handle_topic(parser: &mut Parser, tokens: &[String]) -> Result<(), ProcessError> {
    require(tokens, 3)?;
    parser.touch_sender(&tokens[0]);
    let setter = source(tokens).to_string();
    let channel = tokens[2].clone();
    let topic = tokens.get(3).cloned().unwrap_or_default();
    let time = chrono::Utc::now().timestamp();

    let Some(chan) = parser.network.channel_mut(&channel) else {
        parser.warn(format!("got topic for {channel}, which I am not on"));
        return Ok(());
    };
    chan.topic = topic.clone();
    chan.topic_setter = setter.clone();
    chan.topic_time = time;
    let channel = chan.name.clone();

    parser.fire(Event::ChannelTopic {
        channel,
        topic,
        setter,
        time,
        is_join_topic: false,
    });
    Ok(())
}

/// `:server 332 me #chan :topic`
pub(super) fn handle_topic_reply(parser: &mut Parser, tokens: &[String]) -> Result<(), ProcessError> {
    require(tokens, 4)?;
    let channel = &tokens[3];
    let topic = tokens.get(4).cloned().unwrap_or_default();
    match parser.network.channel_mut(channel) {
        Some(chan) => chan.topic = topic,
        None => parser.warn(format!("got topic for {channel}, which I am not on")),
    }
    Ok(())
}

/// `:server 333 me #chan setter time`, sent after 332.
pub(super) fn handle_topic_who_time(
    parser: &mut Parser,
    tokens: &[String],
) -> Result<(), ProcessError> {
    require(tokens, 6)?;
    let channel = &tokens[3];
    let setter = tokens[4].clone();
    let time = tokens[5].parse::<i64>().unwrap_or_default();

    let Some(chan) = parser.network.channel_mut(channel) else {
        parser.warn(format!("got topic info for {channel}, which I am not on"));
        return Ok(());
    };
    chan.topic_setter = setter.clone();
    chan.topic_time = time;
    let event = Event::ChannelTopic {
        channel: chan.name.clone(),
        topic: chan.topic.clone(),
        setter,
        time,
        is_join_topic: true,
    };
    parser.fire(event);
    Ok(())
}

/// `:server 329 me #chan time`
pub(super) fn handle_creation_time(
    parser: &mut Parser,
    tokens: &[String],
) -> Result<(), ProcessError> {
    require(tokens, 5)?;
    if let Some(chan) = parser.network.channel_mut(&tokens[3]) {
        chan.created = tokens[4].parse::<i64>().ok();
    }
    Ok(())
}

/// The stored spelling of a channel name, falling back to `name`.
pub(super) fn display_name(parser: &Parser, name: &str) -> String {
    parser
        .network
        .channel(name)
        .map(|c| c.name.clone())
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::client::ConnectConfig;
    use crate::event::{Event, EventKind};
    use crate::parser::Parser;

    fn joined() -> Parser {
        let mut p = Parser::new(ConnectConfig {
            nick: "me".into(),
            ..ConnectConfig::default()
        });
        p.begin();
        p.process_line(":srv 001 me :Welcome");
        p.process_line(":me!u@h JOIN :#Chan");
        p.take_outgoing();
        p
    }

    fn events(p: &mut Parser) -> Arc<Mutex<Vec<Event>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        p.callbacks().register_all(move |ev, _| {
            if !matches!(
                ev.kind(),
                EventKind::DataIn | EventKind::DataOut | EventKind::DebugInfo | EventKind::NumericReceived
            ) {
                sink.lock().unwrap().push(ev.clone());
            }
            Ok(())
        });
        seen
    }

    #[test]
    fn self_join_requests_modes() {
        let mut p = Parser::new(ConnectConfig {
            nick: "me".into(),
            ..ConnectConfig::default()
        });
        let seen = events(&mut p);
        p.begin();
        p.process_line(":srv 001 me :Welcome");
        p.take_outgoing();
        p.process_line(":me!u@h JOIN #c");
        assert_eq!(p.take_outgoing(), vec!["MODE #c"]);
        assert!(seen
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches!(e, Event::ChannelSelfJoin { channel } if channel == "#c")));
        assert_eq!(p.network().me().map(|c| c.host.as_str()), Some("h"));
    }

    #[test]
    fn join_and_part_of_others() {
        let mut p = joined();
        p.process_line(":bob!b@host JOIN #chan");
        assert!(p.network().membership("#chan", "bob").is_some());
        assert_eq!(p.network().client("bob").map(|c| c.host.as_str()), Some("host"));

        let seen = events(&mut p);
        p.process_line(":bob!b@host PART #chan :later");
        assert!(p.network().client("bob").is_none());
        assert!(matches!(
            &seen.lock().unwrap()[0],
            Event::ChannelPart { channel, reason, .. } if channel == "#Chan" && reason == "later"
        ));
    }

    #[test]
    fn self_part_drops_channel() {
        let mut p = joined();
        p.process_line(":bob!b@host JOIN #chan");
        p.process_line(":me!u@h PART #chan");
        assert!(p.network().channel("#chan").is_none());
        assert!(p.network().client("bob").is_none());
        assert!(p.network().me().is_some());
    }

    #[test]
    fn kick_removes_victim() {
        let mut p = joined();
        p.process_line(":bob!b@host JOIN #chan");
        let seen = events(&mut p);
        p.process_line(":op!o@h KICK #chan bob :spam");
        assert!(p.network().membership("#chan", "bob").is_none());
        assert!(matches!(
            &seen.lock().unwrap()[0],
            Event::ChannelKick { kicked, by, reason, .. }
                if kicked == "bob" && by.nick == "op" && reason == "spam"
        ));

        p.process_line(":op!o@h KICK #chan me :bye");
        assert!(p.network().channel("#chan").is_none());
    }

    #[test]
    fn part_for_unknown_channel_warns() {
        let mut p = joined();
        let seen = events(&mut p);
        p.process_line(":bob!b@host PART #elsewhere");
        assert!(matches!(&seen.lock().unwrap()[0], Event::ErrorInfo(_)));
    }

    #[test]
    fn topic_change_and_join_topic() {
        let mut p = joined();
        let seen = events(&mut p);
        p.process_line(":srv 332 me #chan :Welcome to the channel");
        p.process_line(":srv 333 me #chan alice!a@h 1700000000");
        p.process_line(":bob!b@h TOPIC #chan :New topic");

        let chan = p.network().channel("#chan").unwrap();
        assert_eq!(chan.topic, "New topic");
        assert_eq!(chan.topic_setter, "bob!b@h");

        let seen = seen.lock().unwrap();
        assert!(matches!(
            &seen[0],
            Event::ChannelTopic { topic, setter, time: 1700000000, is_join_topic: true, .. }
                if topic == "Welcome to the channel" && setter == "alice!a@h"
        ));
        assert!(matches!(&seen[1], Event::ChannelTopic { is_join_topic: false, .. }));
    }

    #[test]
    fn creation_time() {
        let mut p = joined();
        p.process_line(":srv 329 me #chan 1600000000");
        assert_eq!(p.network().channel("#chan").unwrap().created, Some(1600000000));
    }
}

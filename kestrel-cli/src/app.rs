//! Console session: stdin commands in, rendered events out.

use anyhow::Result;
use kestrel_sdk::callback::Context;
use kestrel_sdk::client::{self, ClientHandle};
use kestrel_sdk::{Command, CommandSink, Event, EventKind, Parser};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::config::Resolved;

/// What one line of user input asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    Send(Command),
    Quit(Option<String>),
    /// Tell the user something locally; nothing goes to the server.
    Notice(String),
    Nothing,
}

/// Parse a line typed by the user. `current` is the channel plain text
/// goes to.
pub fn parse_input(line: &str, current: Option<&str>) -> Action {
    let line = line.trim_end();
    if line.is_empty() {
        return Action::Nothing;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return match current {
            Some(channel) => Action::Send(Command::Message {
                target: channel.to_string(),
                text: line.to_string(),
            }),
            None => Action::Notice("not on a channel, use /join or /msg".into()),
        };
    };

    let (cmd, args) = rest.split_once(' ').unwrap_or((rest, ""));
    let args = args.trim();
    let (first, tail) = split_word(args);
    let reason = (!args.is_empty()).then(|| args.to_string());

    match cmd.to_ascii_lowercase().as_str() {
        "join" | "j" if !first.is_empty() => Action::Send(Command::Join {
            channel: first.to_string(),
            key: (!tail.is_empty()).then(|| tail.to_string()),
        }),
        "part" | "leave" => {
            let (channel, reason) = if looks_like_channel(first) {
                (Some(first), tail)
            } else {
                (current, args)
            };
            match channel {
                Some(channel) => Action::Send(Command::Part {
                    channel: channel.to_string(),
                    reason: (!reason.is_empty()).then(|| reason.to_string()),
                }),
                None => usage("/part [channel] [reason]"),
            }
        }
        "msg" | "query" if !first.is_empty() && !tail.is_empty() => Action::Send(Command::Message {
            target: first.to_string(),
            text: tail.to_string(),
        }),
        "notice" if !first.is_empty() && !tail.is_empty() => Action::Send(Command::Notice {
            target: first.to_string(),
            text: tail.to_string(),
        }),
        "me" if !args.is_empty() => match current {
            Some(channel) => Action::Send(Command::Action {
                target: channel.to_string(),
                text: args.to_string(),
            }),
            None => Action::Notice("not on a channel".into()),
        },
        "ctcp" if !first.is_empty() && !tail.is_empty() => {
            let (kind, ctcp_args) = split_word(tail);
            Action::Send(Command::Ctcp {
                target: first.to_string(),
                kind: kind.to_ascii_uppercase(),
                args: ctcp_args.to_string(),
            })
        }
        "nick" if !first.is_empty() => Action::Send(Command::Nick(first.to_string())),
        "topic" => {
            let (channel, topic) = if looks_like_channel(first) {
                (Some(first), tail)
            } else {
                (current, args)
            };
            match channel {
                Some(channel) if !topic.is_empty() => Action::Send(Command::Topic {
                    channel: channel.to_string(),
                    topic: topic.to_string(),
                }),
                _ => usage("/topic [channel] <topic>"),
            }
        }
        "away" => Action::Send(Command::Away(reason)),
        "names" => match (looks_like_channel(first).then_some(first)).or(current) {
            Some(channel) => Action::Send(Command::Raw(format!("NAMES {channel}"))),
            None => usage("/names [channel]"),
        },
        "raw" | "quote" if !args.is_empty() => Action::Send(Command::Raw(args.to_string())),
        "quit" | "exit" => Action::Quit(reason),
        "join" | "j" => usage("/join <channel> [key]"),
        "msg" | "query" => usage("/msg <target> <text>"),
        "notice" => usage("/notice <target> <text>"),
        "me" => usage("/me <text>"),
        "ctcp" => usage("/ctcp <target> <type> [args]"),
        "nick" => usage("/nick <nick>"),
        "raw" | "quote" => usage("/raw <line>"),
        other => Action::Notice(format!("unknown command /{other}")),
    }
}

fn usage(text: &str) -> Action {
    Action::Notice(format!("usage: {text}"))
}

fn split_word(s: &str) -> (&str, &str) {
    match s.split_once(' ') {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (s, ""),
    }
}

fn looks_like_channel(word: &str) -> bool {
    word.starts_with(['#', '&', '!', '+'])
}

/// A channel's member list, built from tracked state when NAMES completes.
#[derive(Debug, Clone, Serialize)]
pub struct NamesListing {
    pub channel: String,
    pub members: Vec<String>,
}

impl NamesListing {
    fn collect(ctx: &Context<'_>, channel: &str) -> Option<Self> {
        let chan = ctx.network().channel(channel)?;
        let mut members: Vec<String> = chan
            .members
            .values()
            .map(|m| match ctx.modes().important_prefix(m.modes) {
                Some(symbol) => format!("{symbol}{}", m.nick),
                None => m.nick.clone(),
            })
            .collect();
        members.sort_by_key(|m| m.to_lowercase());
        Some(Self {
            channel: chan.name.clone(),
            members,
        })
    }
}

/// Human-readable rendering of an event, or `None` for events that are
/// only interesting in `--json` mode.
pub fn describe(event: &Event) -> Option<String> {
    let text = match event {
        Event::SocketClosed { reason } => format!("*** Disconnected: {reason}"),
        Event::ConnectError { message } => format!("*** Connection failed: {message}"),
        Event::ServerError { message } => format!("*** Server error: {message}"),
        Event::NoticeAuth { text } => format!("-auth- {text}"),
        Event::PasswordRequired => "*** Server requires a password".to_string(),
        Event::NickInUse { nickname } => format!("*** Nickname {nickname} is in use"),
        Event::ServerReady { server, nick } => format!("*** Connected to {server} as {nick}"),
        Event::GotNetwork { network, .. } => format!("*** Network: {network}"),
        Event::MotdLine { text } => format!("-motd- {text}"),
        Event::PingFailed { waited_ms } => format!("*** No reply to ping for {waited_ms}ms"),
        Event::ChannelSelfJoin { channel } => format!("*** Now talking in {channel}"),
        Event::ChannelJoin { channel, user } => format!("[{channel}] --> {user} joined"),
        Event::ChannelPart {
            channel,
            user,
            reason,
        } => format!("[{channel}] <-- {} left ({reason})", user.nick),
        Event::ChannelKick {
            channel,
            kicked,
            by,
            reason,
        } => format!("[{channel}] {kicked} was kicked by {} ({reason})", by.nick),
        Event::Quit { user, reason } => format!("<-- {} quit ({reason})", user.nick),
        Event::ChannelTopic {
            channel,
            topic,
            setter,
            is_join_topic,
            ..
        } => {
            if *is_join_topic {
                format!("[{channel}] Topic: {topic} (set by {setter})")
            } else {
                format!("[{channel}] {setter} changed the topic to: {topic}")
            }
        }
        Event::ChannelModeChanged {
            channel,
            setter: Some(setter),
            modes,
        } => format!("[{channel}] {} sets mode {modes}", setter.nick),
        Event::ChannelModeChanged {
            channel,
            setter: None,
            modes,
        } => format!("[{channel}] Modes: {modes}"),
        Event::UserModeChanged { nick, modes, .. } => format!("*** {nick} sets mode {modes}"),
        Event::UserModeDiscovered { modes, .. } => format!("*** Your modes: {modes}"),
        Event::NickChanged {
            old_nick, new_nick, ..
        } => format!("*** {old_nick} is now known as {new_nick}"),
        Event::AwayState { away: true, reason } => {
            format!("*** You are now away: {}", reason.as_deref().unwrap_or(""))
        }
        Event::AwayState { away: false, .. } => "*** You are no longer away".to_string(),
        Event::AwayStateOther { nick, reason } => format!("*** {nick} is away: {reason}"),
        Event::Invite { channel, from } => format!("*** {} invites you to {channel}", from.nick),
        Event::ChannelMessage {
            channel,
            from,
            text,
        } => format!("[{channel}] <{}> {text}", from.nick),
        Event::ChannelAction {
            channel,
            from,
            text,
        } => format!("[{channel}] * {} {text}", from.nick),
        Event::ChannelNotice {
            channel,
            from,
            text,
        } => format!("[{channel}] -{}- {text}", from.nick),
        Event::ChannelCtcp {
            channel,
            from,
            kind,
            args,
        } => format!("[{channel}] {} requested CTCP {kind} {args}", from.nick),
        Event::ChannelModeMessage {
            channel,
            prefix,
            from,
            text,
        } => format!("[{prefix}{channel}] <{}> {text}", from.nick),
        Event::ChannelModeNotice {
            channel,
            prefix,
            from,
            text,
        } => format!("[{prefix}{channel}] -{}- {text}", from.nick),
        Event::PrivateMessage { from, text } => format!("*{}* {text}", from.nick),
        Event::PrivateAction { from, text } => format!("* {} {text}", from.nick),
        Event::PrivateNotice { from, text } => format!("-{}- {text}", from.nick),
        Event::PrivateCtcp { from, kind, args } => {
            format!("*** {} requested CTCP {kind} {args}", from.nick)
        }
        Event::PrivateCtcpReply { from, kind, args }
        | Event::ChannelCtcpReply {
            from, kind, args, ..
        }
        | Event::UnknownCtcpReply {
            from, kind, args, ..
        } => format!("*** CTCP {kind} reply from {}: {args}", from.nick),
        Event::UnknownMessage { target, from, text } => {
            format!("[{target}] <{}> {text}", from.nick)
        }
        Event::UnknownNotice { target, from, text } => {
            format!("[{target}] -{}- {text}", from.nick)
        }
        _ => return None,
    };
    Some(text)
}

struct Session {
    handle: ClientHandle,
    json: bool,
    nick: String,
    current: Option<String>,
}

impl Session {
    fn on_event(&mut self, event: &Event) -> Result<()> {
        self.track(event);
        if self.json {
            println!("{}", serde_json::to_string(event)?);
        } else if let Some(text) = describe(event) {
            println!("{} {text}", chrono::Local::now().format("%H:%M"));
        }
        Ok(())
    }

    /// Keep our nick and the current channel in step with the server.
    fn track(&mut self, event: &Event) {
        match event {
            Event::ServerReady { nick, .. } => self.nick = nick.clone(),
            Event::NickChanged {
                old_nick, new_nick, ..
            } if *old_nick == self.nick => self.nick = new_nick.clone(),
            Event::ChannelSelfJoin { channel } => self.current = Some(channel.clone()),
            Event::ChannelPart { channel, user, .. } if user.nick == self.nick => {
                self.leave(channel)
            }
            Event::ChannelKick {
                channel, kicked, ..
            } if *kicked == self.nick => self.leave(channel),
            Event::SocketClosed { .. } => self.current = None,
            _ => {}
        }
    }

    fn leave(&mut self, channel: &str) {
        if self
            .current
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(channel))
        {
            self.current = None;
        }
    }

    fn on_names(&self, listing: &NamesListing) -> Result<()> {
        if self.json {
            let value = serde_json::json!({ "type": "names", "data": listing });
            println!("{value}");
        } else {
            println!(
                "{} [{}] {} users: {}",
                chrono::Local::now().format("%H:%M"),
                listing.channel,
                listing.members.len(),
                listing.members.join(" ")
            );
        }
        Ok(())
    }

    fn on_input(&mut self, line: &str) -> Result<()> {
        match parse_input(line, self.current.as_deref()) {
            Action::Send(command) => self.handle.send(command)?,
            Action::Quit(reason) => self.handle.disconnect(reason.as_deref())?,
            Action::Notice(text) => eprintln!("{text}"),
            Action::Nothing => {}
        }
        Ok(())
    }
}

pub async fn run(resolved: Resolved) -> Result<()> {
    let mut parser = Parser::new(resolved.connect_config());

    let channels = resolved.channels.clone();
    parser.on(EventKind::Post005, move |_, ctx| {
        for channel in &channels {
            ctx.join_channel(channel, None)?;
        }
        Ok(())
    });
    let (names_tx, mut names_rx) = mpsc::unbounded_channel();
    parser.on(EventKind::ChannelGotNames, move |event, ctx| {
        if let Some(listing) = event
            .channel()
            .and_then(|channel| NamesListing::collect(ctx, channel))
        {
            let _ = names_tx.send(listing);
        }
        Ok(())
    });
    let mut events = client::event_channel(&mut parser);

    let (handle, mut task) = client::connect(parser);
    let mut session = Session {
        handle,
        json: resolved.json,
        nick: resolved.nick.clone(),
        current: None,
    };
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            Some(event) = events.recv() => session.on_event(&event)?,
            Some(listing) = names_rx.recv() => session.on_names(&listing)?,
            line = stdin.next_line(), if stdin_open => match line? {
                Some(line) => session.on_input(&line)?,
                None => {
                    stdin_open = false;
                    session.handle.disconnect(None)?;
                }
            },
            finished = &mut task => {
                let parser = finished?;
                while let Ok(event) = events.try_recv() {
                    session.on_event(&event)?;
                }
                tracing::info!(nick = parser.my_nickname(), "session ended");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_sdk::irc::Hostmask;

    fn send(line: &str, current: Option<&str>) -> Command {
        match parse_input(line, current) {
            Action::Send(command) => command,
            other => panic!("{line}: {other:?}"),
        }
    }

    #[test]
    fn plain_text_goes_to_current_channel() {
        assert_eq!(
            send("hello there", Some("#rust")),
            Command::Message {
                target: "#rust".into(),
                text: "hello there".into()
            }
        );
        assert!(matches!(parse_input("hello", None), Action::Notice(_)));
        assert_eq!(parse_input("   ", Some("#rust")), Action::Nothing);
    }

    #[test]
    fn join_and_part() {
        assert_eq!(
            send("/join #rust sekrit", None),
            Command::Join {
                channel: "#rust".into(),
                key: Some("sekrit".into())
            }
        );
        assert_eq!(
            send("/part", Some("#rust")),
            Command::Part {
                channel: "#rust".into(),
                reason: None
            }
        );
        assert_eq!(
            send("/part #go see you", Some("#rust")),
            Command::Part {
                channel: "#go".into(),
                reason: Some("see you".into())
            }
        );
        assert_eq!(
            send("/part later all", Some("#rust")),
            Command::Part {
                channel: "#rust".into(),
                reason: Some("later all".into())
            }
        );
        assert!(matches!(parse_input("/join", None), Action::Notice(_)));
    }

    #[test]
    fn messages_and_ctcp() {
        assert_eq!(
            send("/msg bob hi there", None),
            Command::Message {
                target: "bob".into(),
                text: "hi there".into()
            }
        );
        assert_eq!(
            send("/me waves", Some("#rust")),
            Command::Action {
                target: "#rust".into(),
                text: "waves".into()
            }
        );
        assert_eq!(
            send("/ctcp bob version", None),
            Command::Ctcp {
                target: "bob".into(),
                kind: "VERSION".into(),
                args: String::new()
            }
        );
        assert_eq!(
            send("/notice #rust heads up", None),
            Command::Notice {
                target: "#rust".into(),
                text: "heads up".into()
            }
        );
        assert!(matches!(parse_input("/msg bob", None), Action::Notice(_)));
    }

    #[test]
    fn topic_away_names_raw_quit() {
        assert_eq!(
            send("/topic new topic here", Some("#rust")),
            Command::Topic {
                channel: "#rust".into(),
                topic: "new topic here".into()
            }
        );
        assert_eq!(send("/away", None), Command::Away(None));
        assert_eq!(send("/away brb", None), Command::Away(Some("brb".into())));
        assert_eq!(send("/names", Some("#rust")), Command::Raw("NAMES #rust".into()));
        assert_eq!(send("/raw WHOIS bob", None), Command::Raw("WHOIS bob".into()));
        assert_eq!(send("/nick kes", None), Command::Nick("kes".into()));
        assert_eq!(parse_input("/quit bye all", None), Action::Quit(Some("bye all".into())));
        assert_eq!(parse_input("/QUIT", None), Action::Quit(None));
        assert!(matches!(parse_input("/frobnicate", None), Action::Notice(_)));
    }

    #[test]
    fn describes_common_events() {
        let bob = Hostmask::parse("bob!b@host");
        assert_eq!(
            describe(&Event::ChannelMessage {
                channel: "#rust".into(),
                from: bob.clone(),
                text: "hi".into()
            })
            .as_deref(),
            Some("[#rust] <bob> hi")
        );
        assert_eq!(
            describe(&Event::ChannelModeChanged {
                channel: "#rust".into(),
                setter: None,
                modes: "+nt".into()
            })
            .as_deref(),
            Some("[#rust] Modes: +nt")
        );
        assert!(describe(&Event::DataIn { line: "x".into() }).is_none());
        assert!(describe(&Event::Post005).is_none());
    }
}

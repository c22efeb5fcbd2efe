//! PRIVMSG and NOTICE, including CTCP and `@#chan` style targets.

use crate::error::ProcessError;
use crate::event::Event;
use crate::irc::{self, Hostmask};
use crate::parser::Parser;

use super::require;

/// Who a message was addressed to.
enum Destination {
    Channel(String),
    /// Members of `channel` holding `prefix` or better.
    ChannelMode { channel: String, prefix: char },
    Private,
    Unknown(String),
}

enum Body<'a> {
    Text(&'a str),
    Action(&'a str),
    Ctcp { kind: &'a str, args: &'a str },
}

/// `:nick!ident@host PRIVMSG <target> :<text>`
pub(super) fn handle_message(
    parser: &mut Parser,
    command: &str,
    tokens: &[String],
) -> Result<(), ProcessError> {
    require(tokens, 4)?;
    let from = parser.touch_sender(&tokens[0]);
    let target = &tokens[2];
    let text = &tokens[3];
    let notice = command == "NOTICE";

    let destination = classify(parser, target);
    let channel = match &destination {
        Destination::Channel(c) | Destination::ChannelMode { channel: c, .. } => Some(c.as_str()),
        _ => None,
    };
    if let Some(channel) = channel
        && parser.network.channel(channel).is_none()
    {
        parser.warn(format!("got message for {channel}, which I am not on"));
        return Ok(());
    }

    let body = match irc::parse_ctcp(text) {
        Some(ctcp) if !notice && ctcp.kind.eq_ignore_ascii_case("ACTION") => Body::Action(ctcp.args),
        Some(ctcp) => Body::Ctcp {
            kind: ctcp.kind,
            args: ctcp.args,
        },
        None => Body::Text(text),
    };

    let event = build_event(parser, destination, body, from, notice);
    parser.fire(event);
    Ok(())
}

fn classify(parser: &Parser, target: &str) -> Destination {
    if parser.network.channel(target).is_some() {
        return Destination::Channel(target.to_string());
    }
    let mut chars = target.chars();
    if let Some(first) = chars.next()
        && parser.modes.is_prefix_symbol(first)
        && parser.is_channel_name(chars.as_str())
    {
        return Destination::ChannelMode {
            channel: chars.as_str().to_string(),
            prefix: first,
        };
    }
    if parser.is_channel_name(target) {
        Destination::Channel(target.to_string())
    } else if parser.network.is_me(target) {
        Destination::Private
    } else {
        Destination::Unknown(target.to_string())
    }
}

fn build_event(
    parser: &Parser,
    destination: Destination,
    body: Body<'_>,
    from: Hostmask,
    notice: bool,
) -> Event {
    let display = |name: &str| {
        parser
            .network
            .channel(name)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| name.to_string())
    };

    match destination {
        Destination::ChannelMode { channel, prefix } => {
            // CTCP framing is left in place; mode messages are rare enough.
            let text = match body {
                Body::Text(t) => t.to_string(),
                Body::Action(a) => irc::frame_ctcp("ACTION", a),
                Body::Ctcp { kind, args } => irc::frame_ctcp(kind, args),
            };
            let channel = display(&channel);
            if notice {
                Event::ChannelModeNotice {
                    channel,
                    prefix,
                    from,
                    text,
                }
            } else {
                Event::ChannelModeMessage {
                    channel,
                    prefix,
                    from,
                    text,
                }
            }
        }
        Destination::Channel(channel) => {
            let channel = display(&channel);
            match body {
                Body::Text(text) if notice => Event::ChannelNotice {
                    channel,
                    from,
                    text: text.to_string(),
                },
                Body::Text(text) => Event::ChannelMessage {
                    channel,
                    from,
                    text: text.to_string(),
                },
                Body::Action(text) => Event::ChannelAction {
                    channel,
                    from,
                    text: text.to_string(),
                },
                Body::Ctcp { kind, args } if notice => Event::ChannelCtcpReply {
                    channel,
                    from,
                    kind: kind.to_string(),
                    args: args.to_string(),
                },
                Body::Ctcp { kind, args } => Event::ChannelCtcp {
                    channel,
                    from,
                    kind: kind.to_string(),
                    args: args.to_string(),
                },
            }
        }
        Destination::Private => match body {
            Body::Text(text) if notice => Event::PrivateNotice {
                from,
                text: text.to_string(),
            },
            Body::Text(text) => Event::PrivateMessage {
                from,
                text: text.to_string(),
            },
            Body::Action(text) => Event::PrivateAction {
                from,
                text: text.to_string(),
            },
            Body::Ctcp { kind, args } if notice => Event::PrivateCtcpReply {
                from,
                kind: kind.to_string(),
                args: args.to_string(),
            },
            Body::Ctcp { kind, args } => Event::PrivateCtcp {
                from,
                kind: kind.to_string(),
                args: args.to_string(),
            },
        },
        Destination::Unknown(target) => match body {
            Body::Text(text) if notice => Event::UnknownNotice {
                target,
                from,
                text: text.to_string(),
            },
            Body::Text(text) => Event::UnknownMessage {
                target,
                from,
                text: text.to_string(),
            },
            Body::Action(text) => Event::UnknownAction {
                target,
                from,
                text: text.to_string(),
            },
            Body::Ctcp { kind, args } if notice => Event::UnknownCtcpReply {
                target,
                from,
                kind: kind.to_string(),
                args: args.to_string(),
            },
            Body::Ctcp { kind, args } => Event::UnknownCtcp {
                target,
                from,
                kind: kind.to_string(),
                args: args.to_string(),
            },
        },
    }
}

//! Channel and user mode changes: MODE, 324 and 221.

use crate::error::ProcessError;
use crate::event::Event;
use crate::irc::{self, Hostmask};
use crate::modes::{ChanModeKind, ParamMode};
use crate::parser::Parser;
use crate::state::{ListModeEntry, Lookup};

use super::channel::display_name;
use super::{require, source};

pub(super) fn handle_mode(
    parser: &mut Parser,
    command: &str,
    tokens: &[String],
) -> Result<(), ProcessError> {
    match command {
        irc::RPL_UMODEIS => {
            // :server 221 me +iw
            require(tokens, 4)?;
            let nick = tokens[2].clone();
            let modes = tokens[3..].join(" ");
            if let Some(modes) = apply_user_modes(parser, &nick, &tokens[3], Some(0)) {
                parser.fire(Event::UserModeDiscovered { nick, modes });
            } else {
                parser.debug(format!("got 221 for unknown client {nick}: {modes}"));
            }
            Ok(())
        }
        irc::RPL_CHANNELMODEIS => {
            // :server 324 me #chan +ntl 10
            require(tokens, 5)?;
            let server = Hostmask::parse(source(tokens));
            apply_channel_modes(parser, &tokens[3], server, false, &tokens[4..])
        }
        _ => {
            // :setter MODE target modes [params]
            require(tokens, 4)?;
            let setter = parser.touch_sender(&tokens[0]);
            let target = tokens[2].clone();
            if parser.is_channel_name(&target) {
                return apply_channel_modes(parser, &target, setter, true, &tokens[3..]);
            }

            let modes = tokens[3..].join(" ");
            if apply_user_modes(parser, &target, &tokens[3], None).is_some() {
                parser.fire(Event::UserModeChanged {
                    nick: target,
                    setter,
                    modes,
                });
            } else {
                parser.debug(format!("got modes for unknown client {target}: {modes}"));
            }
            Ok(())
        }
    }
}

/// Pending change to the non-prefix part of a mode line, rendered as
/// `+nt-k key`.
#[derive(Default)]
struct ModeLine {
    letters: String,
    args: Vec<String>,
    sign: Option<bool>,
}

impl ModeLine {
    fn push(&mut self, adding: bool, mode: char, arg: Option<&str>) {
        if self.sign != Some(adding) {
            self.letters.push(sign_of(adding));
            self.sign = Some(adding);
        }
        self.letters.push(mode);
        if let Some(arg) = arg {
            self.args.push(arg.to_string());
        }
    }

    fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }

    fn render(&self) -> String {
        let mut out = self.letters.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(arg);
        }
        out
    }
}

fn sign_of(adding: bool) -> char {
    if adding { '+' } else { '-' }
}

/// Walk a channel mode line and apply it.
///
/// `incremental` is false for 324, which carries the complete current set:
/// the boolean bitmask starts from zero and the per-mode events are not
/// fired. A mode that needs a parameter when none is left stops the walk;
/// changes already made are kept.
fn apply_channel_modes(
    parser: &mut Parser,
    channel: &str,
    setter: Hostmask,
    incremental: bool,
    mode_tokens: &[String],
) -> Result<(), ProcessError> {
    if let (_, Lookup::Created) = parser.network.ensure_channel(channel) {
        parser.warn(format!("got modes for {channel}, which I am not on"));
    }
    let channel = display_name(parser, channel);
    let mode_string = mode_tokens.join(" ");
    let mut params = mode_tokens.iter().skip(1);
    let mut mask = match parser.network.channel(&channel) {
        Some(chan) if incremental => chan.modes,
        _ => 0,
    };
    let mut adding = true;
    let mut non_user = ModeLine::default();
    let now = chrono::Utc::now().timestamp();
    let casemap = parser.network.casemap;

    for mode in mode_tokens[0].chars() {
        match mode {
            '+' => {
                adding = true;
                continue;
            }
            '-' => {
                adding = false;
                continue;
            }
            ':' => continue,
            _ => {}
        }

        let mut kind = parser.modes.classify(mode);
        if kind == ChanModeKind::Unknown {
            match parser.modes.add_boolean_mode(mode) {
                Some(bit) => {
                    parser.warn(format!("unknown channel mode {mode}, treating it as boolean"));
                    kind = ChanModeKind::Boolean(bit);
                }
                None => {
                    parser.warn(format!("unknown channel mode {mode} and no free bits, ignoring"));
                    continue;
                }
            }
        }

        let needs_param = match kind {
            ChanModeKind::Prefix(_) => true,
            ChanModeKind::Param(ParamMode::Set) => adding,
            ChanModeKind::Param(param) => adding || param.takes_param_on_unset(),
            ChanModeKind::Boolean(_) | ChanModeKind::Unknown => false,
        };
        let param = if needs_param {
            match params.next() {
                Some(p) => Some(p.clone()),
                None => {
                    if let Some(chan) = parser.network.channel_mut(&channel) {
                        chan.modes = mask;
                    }
                    return Err(ProcessError::MissingModeParameter {
                        target: channel,
                        mode,
                    });
                }
            }
        } else {
            None
        };

        match (kind, param) {
            (ChanModeKind::Prefix(bit), Some(target)) => {
                if parser.network.membership(&channel, &target).is_none() {
                    parser.warn(format!("got +{mode} for {target}, who is not on {channel}"));
                    parser.network.ensure_client(&Hostmask::parse(&target));
                }
                if let Some((membership, _)) = parser.network.add_member(&channel, &target) {
                    if adding {
                        membership.modes |= bit;
                    } else {
                        membership.modes &= !bit;
                    }
                }
                parser.fire(Event::ChannelUserModeChanged {
                    channel: channel.clone(),
                    target,
                    setter: setter.clone(),
                    mode: format!("{}{mode}", sign_of(adding)),
                });
            }
            (ChanModeKind::Boolean(bit), _) => {
                if adding {
                    mask |= bit;
                } else {
                    mask &= !bit;
                }
                non_user.push(adding, mode, None);
            }
            (ChanModeKind::Param(ParamMode::List), Some(item)) => {
                let entry = ListModeEntry {
                    item: item.clone(),
                    owner: setter.to_string(),
                    time: now,
                };
                let changed = parser
                    .network
                    .channel_mut(&channel)
                    .is_some_and(|chan| chan.set_list_entry(casemap, mode, entry, adding));
                if !changed {
                    parser.debug(format!("{}{mode} {item} on {channel} changed nothing", sign_of(adding)));
                }
                non_user.push(adding, mode, Some(item.as_str()));
                if incremental {
                    fire_single(parser, &channel, &setter, adding, mode, Some(item.as_str()));
                }
            }
            (ChanModeKind::Param(_), param) => {
                if let Some(chan) = parser.network.channel_mut(&channel) {
                    match (&param, adding) {
                        (Some(value), true) => chan.set_param(mode, value),
                        _ => chan.set_param(mode, ""),
                    }
                }
                non_user.push(adding, mode, param.as_deref());
                if incremental {
                    fire_single(parser, &channel, &setter, adding, mode, param.as_deref());
                }
            }
            (ChanModeKind::Prefix(_), None) | (ChanModeKind::Unknown, _) => {}
        }
    }

    if let Some(chan) = parser.network.channel_mut(&channel) {
        chan.modes = mask;
    }

    parser.fire(Event::ChannelModeChanged {
        channel: channel.clone(),
        setter: incremental.then(|| setter.clone()),
        modes: mode_string,
    });
    if incremental && !non_user.is_empty() {
        parser.fire(Event::ChannelNonUserModeChanged {
            channel,
            setter,
            modes: non_user.render(),
        });
    }
    Ok(())
}

fn fire_single(
    parser: &mut Parser,
    channel: &str,
    setter: &Hostmask,
    adding: bool,
    mode: char,
    param: Option<&str>,
) {
    let mode = match param {
        Some(param) => format!("{}{mode} {param}", sign_of(adding)),
        None => format!("{}{mode}", sign_of(adding)),
    };
    parser.fire(Event::ChannelSingleModeChanged {
        channel: channel.to_string(),
        setter: setter.clone(),
        mode,
    });
}

/// Toggle user mode bits on a known client. `start` replaces the current
/// modes before applying. Returns the resulting mode letters, or `None`
/// when the client is unknown.
fn apply_user_modes(
    parser: &mut Parser,
    nick: &str,
    modes: &str,
    start: Option<u64>,
) -> Option<String> {
    let mut mask = start.or_else(|| parser.network.client(nick).map(|c| c.user_modes))?;
    parser.network.client(nick)?;

    let mut adding = true;
    for mode in modes.chars() {
        match mode {
            '+' => adding = true,
            '-' => adding = false,
            ':' => {}
            _ => {
                let bit = match parser.modes.user_mode_bit(mode) {
                    Some(bit) => bit,
                    None => {
                        let Some(bit) = parser.modes.add_user_mode(mode) else {
                            parser.warn(format!("unknown user mode {mode} and no free bits, ignoring"));
                            continue;
                        };
                        parser.warn(format!("unknown user mode {mode}, adding it"));
                        bit
                    }
                };
                if adding {
                    mask |= bit;
                } else {
                    mask &= !bit;
                }
            }
        }
    }

    let client = parser.network.client_mut(nick)?;
    client.user_modes = mask;
    Some(parser.modes.user_mode_string(mask))
}

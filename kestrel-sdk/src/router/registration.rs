//! Registration: welcome, server info, ISUPPORT, MOTD and nick collisions.

use crate::error::{ParserError, ProcessError};
use crate::event::Event;
use crate::irc::{self, Hostmask};
use crate::parser::{ConnectionState, Parser};

use super::{require, source};

pub(super) fn handle_welcome(parser: &mut Parser, tokens: &[String]) -> Result<(), ProcessError> {
    require(tokens, 3)?;
    let server = source(tokens).to_string();
    let nick = tokens[2].clone();

    parser.state = ConnectionState::Ready;
    parser.network.server.name = server.clone();
    parser.network.my_nick = nick.clone();
    parser.attempted_nick = nick.clone();
    parser.network.ensure_client(&Hostmask::parse(&nick));

    parser.fire(Event::ServerReady { server, nick });
    Ok(())
}

/// `:server 004 me <servername> <version> <usermodes> <chanmodes>`
pub(super) fn handle_myinfo(parser: &mut Parser, tokens: &[String]) -> Result<(), ProcessError> {
    require(tokens, 5)?;
    parser.network.server.software = tokens[4].clone();
    if let Some(user_modes) = tokens.get(5) {
        parser
            .network
            .server
            .isupport
            .insert("USERMODES".to_string(), user_modes.clone());
    }
    Ok(())
}

/// `:server 005 me KEY=VALUE KEY -KEY :are supported by this server`
///
/// Values are only collected here. The registries are rebuilt from them
/// once, at end of MOTD.
pub(super) fn handle_isupport(parser: &mut Parser, tokens: &[String]) -> Result<(), ProcessError> {
    require(tokens, 4)?;
    // The "are supported by this server" text is only present as a trailing
    // parameter.
    let end = if parser.last_line().contains(" :") {
        tokens.len() - 1
    } else {
        tokens.len()
    };
    for token in &tokens[3..end] {
        if let Some(key) = token.strip_prefix('-') {
            parser.network.server.isupport.remove(&key.to_ascii_uppercase());
            continue;
        }
        let (key, value) = token.split_once('=').unwrap_or((token.as_str(), ""));
        let key = key.to_ascii_uppercase();
        parser.debug(format!("005: {key}={value}"));
        parser
            .network
            .server
            .isupport
            .insert(key.clone(), value.to_string());

        if key == "NETWORK" {
            parser.network.server.network = value.to_string();
            let server = parser.network.server.name.clone();
            parser.fire(Event::GotNetwork {
                network: value.to_string(),
                server,
            });
        }
    }
    Ok(())
}

pub(super) fn handle_motd(
    parser: &mut Parser,
    command: &str,
    tokens: &[String],
) -> Result<(), ProcessError> {
    require(tokens, 3)?;
    let text = tokens.last().cloned().unwrap_or_default();
    match command {
        irc::RPL_MOTDSTART => {
            parser.fire(Event::MotdStart { text });
        }
        irc::RPL_MOTD => {
            parser.fire(Event::MotdLine { text });
        }
        _ => {
            parser.apply_isupport();
            parser.fire(Event::MotdEnd {
                text,
                no_motd: command == irc::ERR_NOMOTD,
            });
        }
    }
    Ok(())
}

/// `:server 433 <me|*> <nick> :Nickname is already in use`
///
/// Listeners get the first say. When none ran and we are still
/// registering, try the alternate nick once, then keep prepending the
/// configured character to whatever was tried last.
pub(super) fn handle_nick_in_use(parser: &mut Parser, tokens: &[String]) -> Result<(), ProcessError> {
    let nickname = if tokens.len() > 4 {
        tokens[3].clone()
    } else {
        parser.attempted_nick.clone()
    };
    let handled = parser.fire(Event::NickInUse { nickname });
    if handled || parser.is_ready() {
        return Ok(());
    }

    let alt = parser.config.alt_nick.clone();
    let next = if !parser.tried_alt_nick
        && !alt.is_empty()
        && !parser.network.casemap.eq(&alt, &parser.attempted_nick)
    {
        alt
    } else {
        format!("{}{}", parser.config.prepend_char, parser.attempted_nick)
    };
    parser.tried_alt_nick = true;
    parser.attempted_nick = next.clone();
    parser.network.my_nick = next.clone();
    parser.send_line(format!("NICK {next}"), true);
    Ok(())
}

pub(super) fn handle_password_required(parser: &mut Parser) -> Result<(), ProcessError> {
    parser.report(ParserError::error("server requires a password"));
    parser.fire(Event::PasswordRequired);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::client::ConnectConfig;
    use crate::modes::ChanModeKind;
    use crate::parser::Parser;

    fn ready() -> Parser {
        let mut p = Parser::new(ConnectConfig::default());
        p.begin();
        p.process_line(":irc.test 001 user :Welcome");
        p
    }

    #[test]
    fn isupport_is_applied_at_end_of_motd() {
        let mut p = ready();
        p.process_line(":irc.test 005 user CHANMODES=b,k,l,nt PREFIX=(qov)~@+ CHANTYPES=# :are supported");
        assert_eq!(p.modes().prefix_modes(), "ohv");
        p.process_line(":irc.test 376 user :End of MOTD");
        assert_eq!(p.modes().prefix_modes(), "qov");
        assert_eq!(p.modes().classify('t'), ChanModeKind::Boolean(2));
        assert!(!p.modes().is_chan_type('&'));
    }

    #[test]
    fn isupport_without_trailing_text_keeps_every_token() {
        let mut p = ready();
        p.process_line(":irc.test 005 user NETWORK=Foo CHANTYPES=#");
        let isupport = &p.network().server.isupport;
        assert_eq!(isupport.get("NETWORK").map(String::as_str), Some("Foo"));
        assert_eq!(isupport.get("CHANTYPES").map(String::as_str), Some("#"));
    }

    #[test]
    fn isupport_is_applied_only_once() {
        let mut p = ready();
        p.process_line(":irc.test 422 user :MOTD File is missing");
        p.process_line(":irc.test 005 user PREFIX=(qov)~@+ :are supported");
        p.process_line(":irc.test 376 user :End of MOTD");
        assert_eq!(p.modes().prefix_modes(), "ohv");
    }

    #[test]
    fn isupport_removal_and_network() {
        let mut p = ready();
        p.process_line(":irc.test 005 user NETWORK=TestNet EXCEPTS :are supported");
        p.process_line(":irc.test 005 user -EXCEPTS :are supported");
        assert_eq!(p.network().server.network, "TestNet");
        assert!(!p.network().server.isupport.contains_key("EXCEPTS"));
    }

    #[test]
    fn myinfo_user_modes_are_used() {
        let mut p = ready();
        p.process_line(":irc.test 004 user irc.test ircd-1.0 iowxz biklmnopstv");
        p.process_line(":irc.test 376 user :End of MOTD");
        assert_eq!(p.network().server.software, "ircd-1.0");
        assert_eq!(p.modes().user_mode_bit('z'), Some(16));
    }

    #[test]
    fn casemapping_is_applied() {
        let mut p = ready();
        p.process_line(":irc.test 005 user CASEMAPPING=ascii :are supported");
        p.process_line(":irc.test 376 user :End of MOTD");
        assert_eq!(p.network().casemap, crate::casemap::CaseMapping::Ascii);
    }
}

//! IRC wire helpers: line tokenising, hostmask splitting and CTCP framing.
//!
//! Tokenising is deliberately positional rather than structured: every
//! handler in [`crate::router`] indexes straight into the token vector, so
//! `tokens[0]` is always the prefix (or the command when no prefix is
//! present) and the trailing parameter, if any, is the final element with
//! its leading `:` removed.

use serde::Serialize;

// Numerics the engine consumes or emits events for.
pub const RPL_WELCOME: &str = "001";
pub const RPL_MYINFO: &str = "004";
pub const RPL_ISUPPORT: &str = "005";
pub const RPL_UMODEIS: &str = "221";
pub const RPL_AWAY: &str = "301";
pub const RPL_UNAWAY: &str = "305";
pub const RPL_NOWAWAY: &str = "306";
pub const RPL_CHANNELMODEIS: &str = "324";
pub const RPL_CREATIONTIME: &str = "329";
pub const RPL_TOPIC: &str = "332";
pub const RPL_TOPICWHOTIME: &str = "333";
pub const RPL_INVITELIST: &str = "346";
pub const RPL_ENDOFINVITELIST: &str = "347";
pub const RPL_EXCEPTLIST: &str = "348";
pub const RPL_ENDOFEXCEPTLIST: &str = "349";
pub const RPL_NAMREPLY: &str = "353";
pub const RPL_ENDOFNAMES: &str = "366";
pub const RPL_BANLIST: &str = "367";
pub const RPL_ENDOFBANLIST: &str = "368";
pub const RPL_MOTD: &str = "372";
pub const RPL_MOTDSTART: &str = "375";
pub const RPL_ENDOFMOTD: &str = "376";
pub const ERR_NOMOTD: &str = "422";
pub const ERR_NICKNAMEINUSE: &str = "433";
pub const ERR_PASSWDMISMATCH: &str = "464";

/// Maximum length of an outgoing line, excluding the trailing CRLF.
pub const MAX_LINE_LEN: usize = 510;

/// CTCP delimiter.
pub const CTCP_DELIM: char = '\x01';

/// Split a raw line into tokens.
///
/// Everything after the first `" :"` becomes a single trailing token. A
/// line that *starts* with `:` keeps that colon on the prefix token so
/// handlers can tell prefixed and unprefixed lines apart.
pub fn tokenise_line(line: &str) -> Vec<String> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Vec::new();
    }

    let (head, trailing) = match line.find(" :") {
        Some(idx) => (&line[..idx], Some(&line[idx + 2..])),
        None => (line, None),
    };

    let mut tokens: Vec<String> = head
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if let Some(trailing) = trailing {
        tokens.push(trailing.to_string());
    }
    tokens
}

/// The routing key of a tokenised line: the command word or numeric,
/// upper-cased. Returns `None` for empty lines.
pub fn command_of(tokens: &[String]) -> Option<String> {
    let first = tokens.first()?;
    if first.starts_with(':') {
        tokens.get(1).map(|c| c.to_ascii_uppercase())
    } else {
        Some(first.to_ascii_uppercase())
    }
}

/// `nick!ident@host` split into parts. Absent parts are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Hostmask {
    pub nick: String,
    pub ident: String,
    pub host: String,
}

impl Hostmask {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.strip_prefix(':').unwrap_or(raw);
        let (rest, host) = match raw.split_once('@') {
            Some((rest, host)) => (rest, host),
            None => (raw, ""),
        };
        let (nick, ident) = match rest.split_once('!') {
            Some((nick, ident)) => (nick, ident),
            None => (rest, ""),
        };
        Self {
            nick: nick.to_string(),
            ident: ident.to_string(),
            host: host.to_string(),
        }
    }

    /// True when the mask carried ident or host information.
    pub fn is_full(&self) -> bool {
        !self.ident.is_empty() || !self.host.is_empty()
    }
}

impl std::fmt::Display for Hostmask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.nick)?;
        if !self.ident.is_empty() {
            write!(f, "!{}", self.ident)?;
        }
        if !self.host.is_empty() {
            write!(f, "@{}", self.host)?;
        }
        Ok(())
    }
}

/// A CTCP payload extracted from a PRIVMSG/NOTICE body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ctcp<'a> {
    pub kind: &'a str,
    pub args: &'a str,
}

/// Parse `\x01TYPE args\x01`. The closing delimiter is optional, some
/// clients drop it.
pub fn parse_ctcp(body: &str) -> Option<Ctcp<'_>> {
    let inner = body.strip_prefix(CTCP_DELIM)?;
    let inner = inner.strip_suffix(CTCP_DELIM).unwrap_or(inner);
    if inner.is_empty() {
        return None;
    }
    let (kind, args) = inner.split_once(' ').unwrap_or((inner, ""));
    Some(Ctcp { kind, args })
}

/// Wrap a CTCP type and argument string. The type is upper-cased.
pub fn frame_ctcp(kind: &str, args: &str) -> String {
    let kind = kind.to_ascii_uppercase();
    if args.is_empty() {
        format!("{CTCP_DELIM}{kind}{CTCP_DELIM}")
    } else {
        format!("{CTCP_DELIM}{kind} {args}{CTCP_DELIM}")
    }
}

/// Truncate a line to [`MAX_LINE_LEN`] bytes on a char boundary.
pub fn truncate_line(line: &str) -> &str {
    if line.len() <= MAX_LINE_LEN {
        return line;
    }
    let mut end = MAX_LINE_LEN;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    &line[..end]
}

/// The part of `line` before the first CR, LF or NUL. Anything after one
/// of those would reach the server as a separate command.
pub fn first_line(line: &str) -> &str {
    match line.find(['\r', '\n', '\0']) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_stops_at_breaks() {
        assert_eq!(first_line("PRIVMSG #c :hi\r\nQUIT :x"), "PRIVMSG #c :hi");
        assert_eq!(first_line("TOPIC #c :a\nb"), "TOPIC #c :a");
        assert_eq!(first_line("AWAY :x\0y"), "AWAY :x");
        assert_eq!(first_line("PING 1"), "PING 1");
    }

    #[test]
    fn tokenise_with_trailing() {
        let t = tokenise_line(":nick!u@h PRIVMSG #chan :hello there :)\r\n");
        assert_eq!(t, vec![":nick!u@h", "PRIVMSG", "#chan", "hello there :)"]);
    }

    #[test]
    fn tokenise_without_prefix() {
        let t = tokenise_line("PING :irc.example.net");
        assert_eq!(t, vec!["PING", "irc.example.net"]);
        assert_eq!(command_of(&t).as_deref(), Some("PING"));
    }

    #[test]
    fn tokenise_empty_trailing_and_extra_spaces() {
        let t = tokenise_line(":srv 332 me  #c :");
        assert_eq!(t, vec![":srv", "332", "me", "#c", ""]);
        assert!(tokenise_line("\r\n").is_empty());
    }

    #[test]
    fn command_is_uppercased() {
        let t = tokenise_line(":a!b@c privmsg #x :y");
        assert_eq!(command_of(&t).as_deref(), Some("PRIVMSG"));
    }

    #[test]
    fn hostmask_variants() {
        assert_eq!(
            Hostmask::parse(":nick!ident@host"),
            Hostmask { nick: "nick".into(), ident: "ident".into(), host: "host".into() }
        );
        assert_eq!(
            Hostmask::parse("nick@host"),
            Hostmask { nick: "nick".into(), ident: "".into(), host: "host".into() }
        );
        assert_eq!(
            Hostmask::parse("nick"),
            Hostmask { nick: "nick".into(), ident: "".into(), host: "".into() }
        );
        assert!(!Hostmask::parse("nick").is_full());
        assert_eq!(Hostmask::parse("a!b@c").to_string(), "a!b@c");
    }

    #[test]
    fn ctcp_parsing() {
        let c = parse_ctcp("\x01ACTION waves hello\x01").unwrap();
        assert_eq!(c.kind, "ACTION");
        assert_eq!(c.args, "waves hello");
        let c = parse_ctcp("\x01VERSION").unwrap();
        assert_eq!(c.kind, "VERSION");
        assert_eq!(c.args, "");
        assert!(parse_ctcp("plain").is_none());
        assert!(parse_ctcp("\x01\x01").is_none());
        assert_eq!(frame_ctcp("ping", "123"), "\x01PING 123\x01");
    }

    #[test]
    fn truncation_respects_char_boundary() {
        let long = "é".repeat(300);
        let cut = truncate_line(&long);
        assert!(cut.len() <= MAX_LINE_LEN);
        assert!(cut.chars().all(|c| c == 'é'));
    }
}

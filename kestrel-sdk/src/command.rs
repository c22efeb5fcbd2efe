//! Outgoing commands and the send API shared by every command source.

use crate::error::SendError;

/// Something the consumer wants sent to the server.
///
/// Commands are turned into wire lines by [`crate::parser::Parser::execute`],
/// which applies connection state (channel prefixes, known channels, the
/// current nickname) at that point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Raw(String),
    Message { target: String, text: String },
    Notice { target: String, text: String },
    Action { target: String, text: String },
    Ctcp { target: String, kind: String, args: String },
    CtcpReply { target: String, kind: String, args: String },
    Join { channel: String, key: Option<String> },
    Part { channel: String, reason: Option<String> },
    Nick(String),
    Topic { channel: String, topic: String },
    Away(Option<String>),
    Mode { target: String, modes: Option<String> },
    Quit(Option<String>),
}

/// The public send API.
///
/// Implemented by [`crate::client::ClientHandle`] (usable from any thread),
/// by the handler [`crate::callback::Context`], and by the sans-IO
/// [`crate::parser::Parser`] itself.
pub trait CommandSink {
    fn send(&self, command: Command) -> Result<(), SendError>;

    fn send_raw(&self, line: &str) -> Result<(), SendError> {
        if line.trim().is_empty() {
            return Err(SendError::Rejected("empty line"));
        }
        self.send(Command::Raw(line.to_string()))
    }

    fn send_message(&self, target: &str, text: &str) -> Result<(), SendError> {
        require_target(target)?;
        self.send(Command::Message {
            target: target.to_string(),
            text: text.to_string(),
        })
    }

    fn send_notice(&self, target: &str, text: &str) -> Result<(), SendError> {
        require_target(target)?;
        self.send(Command::Notice {
            target: target.to_string(),
            text: text.to_string(),
        })
    }

    fn send_action(&self, target: &str, text: &str) -> Result<(), SendError> {
        require_target(target)?;
        self.send(Command::Action {
            target: target.to_string(),
            text: text.to_string(),
        })
    }

    fn send_ctcp(&self, target: &str, kind: &str, args: &str) -> Result<(), SendError> {
        require_target(target)?;
        require_kind(kind)?;
        self.send(Command::Ctcp {
            target: target.to_string(),
            kind: kind.to_string(),
            args: args.to_string(),
        })
    }

    fn send_ctcp_reply(&self, target: &str, kind: &str, args: &str) -> Result<(), SendError> {
        require_target(target)?;
        require_kind(kind)?;
        self.send(Command::CtcpReply {
            target: target.to_string(),
            kind: kind.to_string(),
            args: args.to_string(),
        })
    }

    /// Join a channel. A name without a channel prefix gets the server's
    /// first channel type prepended.
    fn join_channel(&self, channel: &str, key: Option<&str>) -> Result<(), SendError> {
        require_target(channel)?;
        self.send(Command::Join {
            channel: channel.to_string(),
            key: key.filter(|k| !k.is_empty()).map(str::to_string),
        })
    }

    /// Leave a channel. Ignored for channels we are not on.
    fn part_channel(&self, channel: &str, reason: Option<&str>) -> Result<(), SendError> {
        require_target(channel)?;
        self.send(Command::Part {
            channel: channel.to_string(),
            reason: reason.filter(|r| !r.is_empty()).map(str::to_string),
        })
    }

    fn set_nickname(&self, nickname: &str) -> Result<(), SendError> {
        if nickname.is_empty() || nickname.contains(' ') {
            return Err(SendError::Rejected("invalid nickname"));
        }
        self.send(Command::Nick(nickname.to_string()))
    }

    fn set_topic(&self, channel: &str, topic: &str) -> Result<(), SendError> {
        require_target(channel)?;
        self.send(Command::Topic {
            channel: channel.to_string(),
            topic: topic.to_string(),
        })
    }

    /// Mark ourselves away, or back when `reason` is `None`.
    fn set_away(&self, reason: Option<&str>) -> Result<(), SendError> {
        self.send(Command::Away(
            reason.filter(|r| !r.is_empty()).map(str::to_string),
        ))
    }

    /// Change modes, or query them when `modes` is `None`.
    fn set_mode(&self, target: &str, modes: Option<&str>) -> Result<(), SendError> {
        require_target(target)?;
        self.send(Command::Mode {
            target: target.to_string(),
            modes: modes.map(str::to_string),
        })
    }

    fn quit(&self, reason: Option<&str>) -> Result<(), SendError> {
        self.send(Command::Quit(
            reason.filter(|r| !r.is_empty()).map(str::to_string),
        ))
    }
}

fn require_target(target: &str) -> Result<(), SendError> {
    if target.is_empty() || target.contains(' ') {
        Err(SendError::Rejected("invalid target"))
    } else {
        Ok(())
    }
}

fn require_kind(kind: &str) -> Result<(), SendError> {
    if kind.is_empty() || kind.contains(' ') {
        Err(SendError::Rejected("invalid CTCP type"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<Command>>);

    impl CommandSink for Recorder {
        fn send(&self, command: Command) -> Result<(), SendError> {
            self.0.borrow_mut().push(command);
            Ok(())
        }
    }

    #[test]
    fn empty_targets_are_rejected() {
        let r = Recorder::default();
        assert!(r.send_message("", "hi").is_err());
        assert!(r.send_ctcp("bob", "", "x").is_err());
        assert!(r.set_nickname("two words").is_err());
        assert!(r.send_raw("  ").is_err());
        assert!(r.0.borrow().is_empty());
    }

    #[test]
    fn empty_reasons_become_none() {
        let r = Recorder::default();
        r.quit(Some("")).unwrap();
        r.part_channel("#c", Some("bye")).unwrap();
        assert_eq!(
            *r.0.borrow(),
            vec![
                Command::Quit(None),
                Command::Part { channel: "#c".into(), reason: Some("bye".into()) },
            ]
        );
    }
}

//! Events the parser fires at registered listeners.
//!
//! Every variant carries its data by value so an event can be cloned out
//! of a handler, serialized, or forwarded over a channel. Serialized with
//! `#[serde(tag = "type", content = "data")]` so consumers can switch on
//! `type`.

use serde::Serialize;

use crate::error::ParserError;
use crate::irc::Hostmask;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// A raw line arrived from the server.
    DataIn { line: String },
    /// A raw line was written. `from_parser` is false for lines the
    /// consumer sent with [`crate::command::Command::Raw`].
    DataOut { line: String, from_parser: bool },
    DebugInfo { message: String },
    ErrorInfo(ParserError),

    SocketClosed { reason: String },
    ConnectError { message: String },
    /// The server sent `ERROR`.
    ServerError { message: String },
    /// Anything received before 001 that is not part of registration.
    NoticeAuth { text: String },
    PasswordRequired,
    NickInUse { nickname: String },
    /// 001 received; the connection is registered.
    ServerReady { server: String, nick: String },
    /// ISUPPORT registries have been rebuilt (end of MOTD).
    Post005,
    GotNetwork { network: String, server: String },
    MotdStart { text: String },
    MotdLine { text: String },
    /// `no_motd` is set when the server sent 422 instead of a MOTD.
    MotdEnd { text: String, no_motd: bool },
    NumericReceived { numeric: u16, tokens: Vec<String> },

    PingSent { token: String },
    PingSuccess { lag_ms: i64 },
    PingFailed { waited_ms: i64 },

    ChannelSelfJoin { channel: String },
    ChannelJoin { channel: String, user: Hostmask },
    ChannelPart { channel: String, user: Hostmask, reason: String },
    ChannelKick {
        channel: String,
        kicked: String,
        by: Hostmask,
        reason: String,
    },
    ChannelQuit { channel: String, user: Hostmask, reason: String },
    Quit { user: Hostmask, reason: String },
    ChannelTopic {
        channel: String,
        topic: String,
        setter: String,
        time: i64,
        /// True for the 332/333 pair sent on join.
        is_join_topic: bool,
    },
    ChannelGotNames { channel: String },
    ChannelGotListModes { channel: String, mode: char },

    /// The whole mode line as received. `setter` is `None` for 324.
    ChannelModeChanged {
        channel: String,
        setter: Option<Hostmask>,
        modes: String,
    },
    /// One prefix mode on one member, e.g. `+o`.
    ChannelUserModeChanged {
        channel: String,
        target: String,
        setter: Hostmask,
        mode: String,
    },
    /// One non-prefix mode with its parameter, e.g. `+b *!*@host`.
    ChannelSingleModeChanged {
        channel: String,
        setter: Hostmask,
        mode: String,
    },
    /// The mode line with the prefix-mode changes stripped out.
    ChannelNonUserModeChanged {
        channel: String,
        setter: Hostmask,
        modes: String,
    },
    UserModeChanged { nick: String, setter: Hostmask, modes: String },
    /// 221: the full set of our user modes.
    UserModeDiscovered { nick: String, modes: String },

    NickChanged { old_nick: String, new_nick: String, user: Hostmask },
    ChannelNickChanged { channel: String, old_nick: String, new_nick: String },
    AwayState { away: bool, reason: Option<String> },
    AwayStateOther { nick: String, reason: String },
    Invite { channel: String, from: Hostmask },

    ChannelMessage { channel: String, from: Hostmask, text: String },
    ChannelAction { channel: String, from: Hostmask, text: String },
    ChannelNotice { channel: String, from: Hostmask, text: String },
    ChannelCtcp {
        channel: String,
        from: Hostmask,
        kind: String,
        args: String,
    },
    ChannelCtcpReply {
        channel: String,
        from: Hostmask,
        kind: String,
        args: String,
    },
    /// A message to `@#chan`-style targets, only seen by members with `prefix`.
    ChannelModeMessage {
        channel: String,
        prefix: char,
        from: Hostmask,
        text: String,
    },
    ChannelModeNotice {
        channel: String,
        prefix: char,
        from: Hostmask,
        text: String,
    },

    PrivateMessage { from: Hostmask, text: String },
    PrivateAction { from: Hostmask, text: String },
    PrivateNotice { from: Hostmask, text: String },
    PrivateCtcp { from: Hostmask, kind: String, args: String },
    PrivateCtcpReply { from: Hostmask, kind: String, args: String },

    /// Messages to a target that is neither us nor a channel (e.g. `$*`).
    UnknownMessage { target: String, from: Hostmask, text: String },
    UnknownAction { target: String, from: Hostmask, text: String },
    UnknownNotice { target: String, from: Hostmask, text: String },
    UnknownCtcp {
        target: String,
        from: Hostmask,
        kind: String,
        args: String,
    },
    UnknownCtcpReply {
        target: String,
        from: Hostmask,
        kind: String,
        args: String,
    },
}

/// Discriminant of [`Event`], used to register listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DataIn,
    DataOut,
    DebugInfo,
    ErrorInfo,
    SocketClosed,
    ConnectError,
    ServerError,
    NoticeAuth,
    PasswordRequired,
    NickInUse,
    ServerReady,
    Post005,
    GotNetwork,
    MotdStart,
    MotdLine,
    MotdEnd,
    NumericReceived,
    PingSent,
    PingSuccess,
    PingFailed,
    ChannelSelfJoin,
    ChannelJoin,
    ChannelPart,
    ChannelKick,
    ChannelQuit,
    Quit,
    ChannelTopic,
    ChannelGotNames,
    ChannelGotListModes,
    ChannelModeChanged,
    ChannelUserModeChanged,
    ChannelSingleModeChanged,
    ChannelNonUserModeChanged,
    UserModeChanged,
    UserModeDiscovered,
    NickChanged,
    ChannelNickChanged,
    AwayState,
    AwayStateOther,
    Invite,
    ChannelMessage,
    ChannelAction,
    ChannelNotice,
    ChannelCtcp,
    ChannelCtcpReply,
    ChannelModeMessage,
    ChannelModeNotice,
    PrivateMessage,
    PrivateAction,
    PrivateNotice,
    PrivateCtcp,
    PrivateCtcpReply,
    UnknownMessage,
    UnknownAction,
    UnknownNotice,
    UnknownCtcp,
    UnknownCtcpReply,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::DataIn { .. } => EventKind::DataIn,
            Self::DataOut { .. } => EventKind::DataOut,
            Self::DebugInfo { .. } => EventKind::DebugInfo,
            Self::ErrorInfo(_) => EventKind::ErrorInfo,
            Self::SocketClosed { .. } => EventKind::SocketClosed,
            Self::ConnectError { .. } => EventKind::ConnectError,
            Self::ServerError { .. } => EventKind::ServerError,
            Self::NoticeAuth { .. } => EventKind::NoticeAuth,
            Self::PasswordRequired => EventKind::PasswordRequired,
            Self::NickInUse { .. } => EventKind::NickInUse,
            Self::ServerReady { .. } => EventKind::ServerReady,
            Self::Post005 => EventKind::Post005,
            Self::GotNetwork { .. } => EventKind::GotNetwork,
            Self::MotdStart { .. } => EventKind::MotdStart,
            Self::MotdLine { .. } => EventKind::MotdLine,
            Self::MotdEnd { .. } => EventKind::MotdEnd,
            Self::NumericReceived { .. } => EventKind::NumericReceived,
            Self::PingSent { .. } => EventKind::PingSent,
            Self::PingSuccess { .. } => EventKind::PingSuccess,
            Self::PingFailed { .. } => EventKind::PingFailed,
            Self::ChannelSelfJoin { .. } => EventKind::ChannelSelfJoin,
            Self::ChannelJoin { .. } => EventKind::ChannelJoin,
            Self::ChannelPart { .. } => EventKind::ChannelPart,
            Self::ChannelKick { .. } => EventKind::ChannelKick,
            Self::ChannelQuit { .. } => EventKind::ChannelQuit,
            Self::Quit { .. } => EventKind::Quit,
            Self::ChannelTopic { .. } => EventKind::ChannelTopic,
            Self::ChannelGotNames { .. } => EventKind::ChannelGotNames,
            Self::ChannelGotListModes { .. } => EventKind::ChannelGotListModes,
            Self::ChannelModeChanged { .. } => EventKind::ChannelModeChanged,
            Self::ChannelUserModeChanged { .. } => EventKind::ChannelUserModeChanged,
            Self::ChannelSingleModeChanged { .. } => EventKind::ChannelSingleModeChanged,
            Self::ChannelNonUserModeChanged { .. } => EventKind::ChannelNonUserModeChanged,
            Self::UserModeChanged { .. } => EventKind::UserModeChanged,
            Self::UserModeDiscovered { .. } => EventKind::UserModeDiscovered,
            Self::NickChanged { .. } => EventKind::NickChanged,
            Self::ChannelNickChanged { .. } => EventKind::ChannelNickChanged,
            Self::AwayState { .. } => EventKind::AwayState,
            Self::AwayStateOther { .. } => EventKind::AwayStateOther,
            Self::Invite { .. } => EventKind::Invite,
            Self::ChannelMessage { .. } => EventKind::ChannelMessage,
            Self::ChannelAction { .. } => EventKind::ChannelAction,
            Self::ChannelNotice { .. } => EventKind::ChannelNotice,
            Self::ChannelCtcp { .. } => EventKind::ChannelCtcp,
            Self::ChannelCtcpReply { .. } => EventKind::ChannelCtcpReply,
            Self::ChannelModeMessage { .. } => EventKind::ChannelModeMessage,
            Self::ChannelModeNotice { .. } => EventKind::ChannelModeNotice,
            Self::PrivateMessage { .. } => EventKind::PrivateMessage,
            Self::PrivateAction { .. } => EventKind::PrivateAction,
            Self::PrivateNotice { .. } => EventKind::PrivateNotice,
            Self::PrivateCtcp { .. } => EventKind::PrivateCtcp,
            Self::PrivateCtcpReply { .. } => EventKind::PrivateCtcpReply,
            Self::UnknownMessage { .. } => EventKind::UnknownMessage,
            Self::UnknownAction { .. } => EventKind::UnknownAction,
            Self::UnknownNotice { .. } => EventKind::UnknownNotice,
            Self::UnknownCtcp { .. } => EventKind::UnknownCtcp,
            Self::UnknownCtcpReply { .. } => EventKind::UnknownCtcpReply,
        }
    }

    /// The channel this event concerns, used for target-restricted
    /// listeners.
    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::ChannelSelfJoin { channel }
            | Self::ChannelJoin { channel, .. }
            | Self::ChannelPart { channel, .. }
            | Self::ChannelKick { channel, .. }
            | Self::ChannelQuit { channel, .. }
            | Self::ChannelTopic { channel, .. }
            | Self::ChannelGotNames { channel }
            | Self::ChannelGotListModes { channel, .. }
            | Self::ChannelModeChanged { channel, .. }
            | Self::ChannelUserModeChanged { channel, .. }
            | Self::ChannelSingleModeChanged { channel, .. }
            | Self::ChannelNonUserModeChanged { channel, .. }
            | Self::ChannelNickChanged { channel, .. }
            | Self::Invite { channel, .. }
            | Self::ChannelMessage { channel, .. }
            | Self::ChannelAction { channel, .. }
            | Self::ChannelNotice { channel, .. }
            | Self::ChannelCtcp { channel, .. }
            | Self::ChannelCtcpReply { channel, .. }
            | Self::ChannelModeMessage { channel, .. }
            | Self::ChannelModeNotice { channel, .. } => Some(channel),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let ev = Event::ChannelJoin {
            channel: "#rust".into(),
            user: Hostmask::parse("bob!b@host"),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "channel_join");
        assert_eq!(json["data"]["channel"], "#rust");
        assert_eq!(json["data"]["user"]["host"], "host");
    }

    #[test]
    fn unit_variants_serialize() {
        let json = serde_json::to_string(&Event::Post005).unwrap();
        assert_eq!(json, r#"{"type":"post005"}"#);
    }

    #[test]
    fn channel_extraction() {
        let ev = Event::ChannelGotNames { channel: "#a".into() };
        assert_eq!(ev.channel(), Some("#a"));
        assert_eq!(ev.kind(), EventKind::ChannelGotNames);
        assert_eq!(Event::PasswordRequired.channel(), None);
    }
}

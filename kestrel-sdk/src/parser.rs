//! The per-connection protocol engine.
//!
//! [`Parser`] does no I/O. Feed it lines with [`Parser::process_line`],
//! drain what it wants written with [`Parser::take_outgoing`]. The
//! transport in [`crate::client`] is one driver; tests drive it directly.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

use crate::callback::{CallbackManager, Context, ListenerId};
use crate::casemap::CaseMapping;
use crate::client::ConnectConfig;
use crate::command::{Command, CommandSink};
use crate::error::{ParserError, ProcessError, SendError, Severity};
use crate::event::{Event, EventKind};
use crate::irc::{self, Hostmask};
use crate::modes::ModeRegistry;
use crate::router;
use crate::state::Network;

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// NICK/USER sent, waiting for 001.
    Registering,
    /// 001 received.
    Ready,
    Closed,
}

/// What the driver should do after a keep-alive tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
    Idle,
    Sent,
    /// The previous ping went unanswered but a listener took care of it.
    Failed,
    /// The previous ping went unanswered and nobody handled it.
    Disconnect,
}

#[derive(Debug, Clone)]
struct PendingPing {
    token: String,
    sent_at_ms: i64,
}

pub struct Parser {
    pub(crate) config: ConnectConfig,
    pub(crate) state: ConnectionState,
    pub(crate) network: Network,
    pub(crate) modes: ModeRegistry,
    pub(crate) callbacks: CallbackManager,
    outbox: RefCell<Vec<Command>>,
    outgoing: VecDeque<String>,
    last_line: String,
    /// ISUPPORT has been applied for this connection.
    pub(crate) post005: bool,
    /// The nickname most recently sent with NICK.
    pub(crate) attempted_nick: String,
    pub(crate) tried_alt_nick: bool,
    /// Reason sent with the last `AWAY`, reported once the server confirms.
    pub(crate) away_reason: Option<String>,
    pending_ping: Option<PendingPing>,
    ping_needed: bool,
    lag_ms: Option<i64>,
}

impl Parser {
    pub fn new(config: ConnectConfig) -> Self {
        let nick = config.nick.clone();
        Self {
            network: Network::new(&nick),
            attempted_nick: nick,
            config,
            state: ConnectionState::Disconnected,
            modes: ModeRegistry::new(),
            callbacks: CallbackManager::new(),
            outbox: RefCell::new(Vec::new()),
            outgoing: VecDeque::new(),
            last_line: String::new(),
            post005: false,
            tried_alt_nick: false,
            away_reason: None,
            pending_ping: None,
            ping_needed: false,
            lag_ms: None,
        }
    }

    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn modes(&self) -> &ModeRegistry {
        &self.modes
    }

    pub fn callbacks(&mut self) -> &mut CallbackManager {
        &mut self.callbacks
    }

    /// Shorthand for `callbacks().register(..)`.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> ListenerId
    where
        F: FnMut(&Event, &Context<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.callbacks.register(kind, handler)
    }

    /// The nickname we have, or are trying to get before 001.
    pub fn my_nickname(&self) -> &str {
        if self.is_ready() {
            &self.network.my_nick
        } else {
            &self.attempted_nick
        }
    }

    /// Round trip of the last answered keep-alive ping.
    pub fn server_lag(&self) -> Option<i64> {
        self.lag_ms
    }

    pub fn last_line(&self) -> &str {
        &self.last_line
    }

    pub fn set_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Start registration: queue PASS (when configured), NICK and USER.
    pub fn begin(&mut self) {
        self.reset();
        self.state = ConnectionState::Registering;
        self.attempted_nick = self.config.nick.clone();
        self.network.my_nick = self.config.nick.clone();

        if let Some(password) = self.config.password.clone().filter(|p| !p.is_empty()) {
            self.send_line(format!("PASS {password}"), true);
        }
        self.send_line(format!("NICK {}", self.config.nick), true);
        self.send_line(
            format!("USER {} 0 * :{}", self.config.user, self.config.realname),
            true,
        );
    }

    /// Process one raw line from the server, including every callback it
    /// triggers.
    pub fn process_line(&mut self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        self.last_line = line.to_string();
        self.ping_needed = false;
        self.fire(Event::DataIn {
            line: line.to_string(),
        });

        let tokens = irc::tokenise_line(line);
        if tokens.len() < 2 {
            if !tokens.is_empty() {
                self.warn(format!("ignoring short line: {line}"));
            }
            return;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.route(&tokens)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(ProcessError::ProcessorNotFound(command))) => {
                self.debug(format!("no processor for {command}"));
            }
            Ok(Err(e)) => {
                let err = ParserError::new(e.severity(), e.to_string());
                self.report(err);
            }
            Err(_) => {
                self.report(ParserError::fatal("fatal exception while processing line"));
            }
        }
    }

    fn route(&mut self, tokens: &[String]) -> Result<(), ProcessError> {
        let first = tokens[0].to_ascii_uppercase();
        let command = irc::command_of(tokens).unwrap_or_default();

        if first == "PING" || command == "PING" {
            let token = tokens.last().map(String::as_str).unwrap_or_default();
            self.send_line(format!("PONG :{token}"), true);
            return Ok(());
        }
        if first == "PONG" || command == "PONG" {
            self.handle_pong(tokens.last().map(String::as_str).unwrap_or_default());
            return Ok(());
        }
        if first == "ERROR" {
            let message = tokens[1..].join(" ");
            self.fire(Event::ServerError { message });
            return Ok(());
        }

        if self.is_ready() {
            if first == "NOTICE" || is_server_notice_auth(tokens) {
                self.notice_auth(tokens);
                return Ok(());
            }
            return router::dispatch(self, &command, tokens);
        }

        // Before 001 only registration numerics matter.
        match command.as_str() {
            irc::RPL_WELCOME | irc::ERR_PASSWDMISMATCH | irc::ERR_NICKNAMEINUSE => {
                router::dispatch(self, &command, tokens)
            }
            _ if tokens.get(3).is_some_and(|t| is_ctcp_framed(t)) => {
                router::dispatch(self, &command, tokens)
            }
            "NICK" => Ok(()),
            _ => {
                self.notice_auth(tokens);
                Ok(())
            }
        }
    }

    fn notice_auth(&mut self, tokens: &[String]) {
        let text = tokens.last().cloned().unwrap_or_default();
        self.fire(Event::NoticeAuth { text });
    }

    fn handle_pong(&mut self, token: &str) {
        let Some(pending) = self.pending_ping.take_if(|p| p.token == token) else {
            return;
        };
        let lag = chrono::Utc::now().timestamp_millis() - pending.sent_at_ms;
        self.lag_ms = Some(lag);
        self.fire(Event::PingSuccess { lag_ms: lag });
    }

    /// Keep-alive timer tick.
    ///
    /// Any line received since the previous tick counts as proof of life.
    /// Otherwise an unanswered ping is reported with `PingFailed`, and a
    /// fresh ping is sent when none is outstanding.
    pub fn ping_tick(&mut self) -> PingOutcome {
        if !matches!(
            self.state,
            ConnectionState::Registering | ConnectionState::Ready
        ) {
            return PingOutcome::Idle;
        }
        if self.ping_needed {
            return self.ping_expired();
        }

        let now = chrono::Utc::now().timestamp_millis();
        let token = now.to_string();
        self.pending_ping = Some(PendingPing {
            token: token.clone(),
            sent_at_ms: now,
        });
        self.ping_needed = true;
        self.send_line(format!("PING {token}"), false);
        self.fire(Event::PingSent { token });
        PingOutcome::Sent
    }

    /// The keep-alive timeout ran out. Reports `PingFailed` unless a line
    /// has arrived since the ping went out.
    pub fn ping_expired(&mut self) -> PingOutcome {
        if !self.ping_needed {
            return PingOutcome::Idle;
        }
        let waited_ms = self
            .pending_ping
            .as_ref()
            .map(|p| chrono::Utc::now().timestamp_millis() - p.sent_at_ms)
            .unwrap_or_default();
        if self.fire(Event::PingFailed { waited_ms }) {
            PingOutcome::Failed
        } else {
            PingOutcome::Disconnect
        }
    }

    /// The transport closed. Fires `SocketClosed` once, then forgets all
    /// per-connection state.
    pub fn socket_closed(&mut self, reason: &str) {
        if self.state != ConnectionState::Closed {
            self.state = ConnectionState::Closed;
            self.fire(Event::SocketClosed {
                reason: reason.to_string(),
            });
        }
        self.reset();
    }

    /// The transport never came up.
    pub fn connect_failed(&mut self, error: anyhow::Error) {
        let message = format!("{error:#}");
        self.fire(Event::ConnectError {
            message: message.clone(),
        });
        self.report(ParserError::error("exception with server socket").with_cause(error));
        self.socket_closed(&message);
    }

    fn reset(&mut self) {
        self.network.reset();
        self.modes = ModeRegistry::new();
        self.post005 = false;
        self.tried_alt_nick = false;
        self.away_reason = None;
        self.pending_ping = None;
        self.ping_needed = false;
        self.outgoing.clear();
        self.outbox.borrow_mut().clear();
    }

    /// Lines waiting to be written, with queued commands rendered first.
    pub fn take_outgoing(&mut self) -> Vec<String> {
        loop {
            let pending = std::mem::take(&mut *self.outbox.borrow_mut());
            if pending.is_empty() {
                break;
            }
            for command in pending {
                self.execute(command);
            }
        }
        self.outgoing.drain(..).collect()
    }

    /// Render a command into wire lines using current connection state.
    pub fn execute(&mut self, command: Command) {
        match command {
            Command::Raw(line) => self.send_line(line, false),
            Command::Message { target, text } => {
                self.send_line(format!("PRIVMSG {target} :{text}"), true)
            }
            Command::Notice { target, text } => {
                self.send_line(format!("NOTICE {target} :{text}"), true)
            }
            Command::Action { target, text } => {
                let body = irc::frame_ctcp("ACTION", &text);
                self.send_line(format!("PRIVMSG {target} :{body}"), true)
            }
            Command::Ctcp { target, kind, args } => {
                let body = irc::frame_ctcp(&kind, &args);
                self.send_line(format!("PRIVMSG {target} :{body}"), true)
            }
            Command::CtcpReply { target, kind, args } => {
                let body = irc::frame_ctcp(&kind, &args);
                self.send_line(format!("NOTICE {target} :{body}"), true)
            }
            Command::Join { channel, key } => {
                let channel = self.with_channel_prefix(&channel);
                match key {
                    Some(key) => self.send_line(format!("JOIN {channel} {key}"), true),
                    None => self.send_line(format!("JOIN {channel}"), true),
                }
            }
            Command::Part { channel, reason } => {
                if self.network.channel(&channel).is_none() {
                    self.debug(format!("not parting {channel}: not on it"));
                    return;
                }
                match reason {
                    Some(reason) => self.send_line(format!("PART {channel} :{reason}"), true),
                    None => self.send_line(format!("PART {channel}"), true),
                }
            }
            Command::Nick(nick) => self.change_nick(nick),
            Command::Topic { channel, topic } => {
                self.send_line(format!("TOPIC {channel} :{topic}"), true)
            }
            Command::Away(Some(reason)) => {
                self.send_line(format!("AWAY :{reason}"), true);
                self.away_reason = Some(reason);
            }
            Command::Away(None) => {
                self.send_line("AWAY".to_string(), true);
                self.away_reason = None;
            }
            Command::Mode { target, modes } => match modes {
                Some(modes) => self.send_line(format!("MODE {target} {modes}"), true),
                None => self.send_line(format!("MODE {target}"), true),
            },
            Command::Quit(Some(reason)) => self.send_line(format!("QUIT :{reason}"), true),
            Command::Quit(None) => self.send_line("QUIT".to_string(), true),
        }
    }

    fn change_nick(&mut self, nick: String) {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Connecting | ConnectionState::Closed => {
                self.config.nick = nick.clone();
                self.network.my_nick = nick.clone();
                self.attempted_nick = nick;
            }
            ConnectionState::Registering | ConnectionState::Ready => {
                if self.is_ready() && self.network.my_nick == nick {
                    return;
                }
                self.send_line(format!("NICK {nick}"), true);
                self.attempted_nick = nick;
            }
        }
    }

    /// Prefix `name` with the first CHANTYPES character unless it already
    /// looks like a channel.
    fn with_channel_prefix(&self, name: &str) -> String {
        if self.is_channel_name(name) {
            return name.to_string();
        }
        let prefix = self.modes.chan_types().first().copied().unwrap_or('#');
        format!("{prefix}{name}")
    }

    /// Whether `name` refers to a channel on this connection.
    pub fn is_channel_name(&self, name: &str) -> bool {
        let Some(first) = name.chars().next() else {
            return false;
        };
        if self.network.is_me(name) {
            return false;
        }
        if self.network.channel(name).is_some() {
            return true;
        }
        if self.modes.chan_types().is_empty() {
            return matches!(first, '#' | '&' | '!' | '+');
        }
        self.modes.is_chan_type(first) || name == "0"
    }

    pub(crate) fn send_line(&mut self, line: String, from_parser: bool) {
        let single = irc::first_line(&line);
        if single.len() != line.len() {
            self.warn(format!("outgoing line cut at a line break: {single}"));
        }
        let line = irc::truncate_line(single).to_string();
        tracing::debug!(">> {line}");
        self.outgoing.push_back(line.clone());
        self.fire(Event::DataOut { line, from_parser });
    }

    pub(crate) fn fire(&mut self, event: Event) -> bool {
        let ctx = Context::new(&self.network, &self.modes, &self.outbox);
        self.callbacks.fire(&event, &ctx)
    }

    /// Raise a diagnostic tagged with the line being processed.
    pub(crate) fn report(&mut self, error: ParserError) {
        let error = if error.line.is_none() && !self.last_line.is_empty() {
            error.with_line(self.last_line.clone())
        } else {
            error
        };
        match error.severity {
            Severity::Warning => tracing::warn!("{error}"),
            _ => tracing::error!("{error}"),
        }
        self.fire(Event::ErrorInfo(error));
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        self.report(ParserError::warning(message));
    }

    pub(crate) fn debug(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{message}");
        self.fire(Event::DebugInfo { message });
    }

    /// Rebuild the mode registry and case mapping from ISUPPORT. Runs once
    /// per connection, at end of MOTD.
    pub(crate) fn apply_isupport(&mut self) {
        if self.post005 {
            return;
        }
        self.post005 = true;

        let isupport = self.network.server.isupport.clone();
        let get = |key: &str| isupport.get(key).map(String::as_str);

        self.modes.register_chan_types(get("CHANTYPES"));
        if let Err(e) = self.modes.register_prefix_modes(get("PREFIX")) {
            self.report(ParserError::error(format!("{e}, using default {}", crate::modes::DEFAULT_PREFIX)));
        }
        self.modes.register_user_modes(get("USERMODES"));
        if let Err(e) = self.modes.register_chan_modes(get("CHANMODES")) {
            self.report(ParserError::error(format!("{e}, using default {}", crate::modes::DEFAULT_CHANMODES)));
        }
        if let Some(casemapping) = get("CASEMAPPING") {
            self.network.set_casemap(CaseMapping::from_isupport(casemapping));
        }
        self.fire(Event::Post005);
    }

    /// Resolve the sender of a line, updating host bits of a known client.
    pub(crate) fn touch_sender(&mut self, prefix: &str) -> Hostmask {
        let mask = Hostmask::parse(prefix);
        if let Some(client) = self.network.client_mut(&mask.nick) {
            client.update_host_bits(&mask);
        }
        mask
    }
}

impl CommandSink for Parser {
    fn send(&self, command: Command) -> Result<(), SendError> {
        self.outbox.borrow_mut().push(command);
        Ok(())
    }
}

fn is_ctcp_framed(text: &str) -> bool {
    text.len() > 1 && text.starts_with(irc::CTCP_DELIM) && text.ends_with(irc::CTCP_DELIM)
}

/// `:server NOTICE AUTH :...` from a prefix without a user part.
fn is_server_notice_auth(tokens: &[String]) -> bool {
    tokens.len() > 2
        && !tokens[0].contains('!')
        && tokens[1].eq_ignore_ascii_case("NOTICE")
        && tokens[2].eq_ignore_ascii_case("AUTH")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn parser() -> Parser {
        Parser::new(ConnectConfig {
            nick: "me".into(),
            alt_nick: "me_alt".into(),
            ..ConnectConfig::default()
        })
    }

    fn ready() -> Parser {
        let mut p = parser();
        p.begin();
        p.process_line(":srv 001 me :Welcome");
        p.take_outgoing();
        p
    }

    fn capture(p: &mut Parser, kind: EventKind) -> Arc<Mutex<Vec<Event>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        p.on(kind, move |ev, _| {
            sink.lock().unwrap().push(ev.clone());
            Ok(())
        });
        seen
    }

    #[test]
    fn begin_sends_registration() {
        let mut p = Parser::new(ConnectConfig {
            nick: "me".into(),
            user: "ident".into(),
            realname: "Real Name".into(),
            password: Some("secret".into()),
            ..ConnectConfig::default()
        });
        p.begin();
        assert_eq!(
            p.take_outgoing(),
            vec!["PASS secret", "NICK me", "USER ident 0 * :Real Name"]
        );
        assert_eq!(p.state(), ConnectionState::Registering);
    }

    #[test]
    fn ping_is_answered_before_registration() {
        let mut p = parser();
        p.begin();
        p.take_outgoing();
        p.process_line("PING :irc.example.net");
        assert_eq!(p.take_outgoing(), vec!["PONG :irc.example.net"]);
    }

    #[test]
    fn pre_welcome_lines_become_notice_auth() {
        let mut p = parser();
        let seen = capture(&mut p, EventKind::NoticeAuth);
        p.begin();
        p.process_line(":srv NOTICE * :*** Looking up your hostname");
        p.process_line(":me NICK me");
        p.process_line(":srv 002 me :Your host");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(&seen[0], Event::NoticeAuth { text } if text == "*** Looking up your hostname"));
    }

    #[test]
    fn nick_collision_ladder() {
        let mut p = parser();
        p.begin();
        p.take_outgoing();
        p.process_line(":srv 433 * me :Nickname is already in use");
        assert_eq!(p.take_outgoing(), vec!["NICK me_alt"]);
        p.process_line(":srv 433 * me_alt :Nickname is already in use");
        assert_eq!(p.take_outgoing(), vec!["NICK _me_alt"]);
        p.process_line(":srv 433 * _me_alt :Nickname is already in use");
        assert_eq!(p.take_outgoing(), vec!["NICK __me_alt"]);
    }

    #[test]
    fn nick_in_use_handler_suppresses_ladder() {
        let mut p = parser();
        let seen = capture(&mut p, EventKind::NickInUse);
        p.begin();
        p.take_outgoing();
        p.process_line(":srv 433 * me :in use");
        assert!(p.take_outgoing().is_empty());
        assert!(matches!(&seen.lock().unwrap()[0], Event::NickInUse { nickname } if nickname == "me"));
    }

    #[test]
    fn nick_in_use_after_ready_only_fires() {
        let mut p = ready();
        p.process_line(":srv 433 me taken :in use");
        assert!(p.take_outgoing().is_empty());
    }

    #[test]
    fn welcome_marks_ready() {
        let mut p = parser();
        let seen = capture(&mut p, EventKind::ServerReady);
        p.begin();
        p.process_line(":irc.example.net 001 me_ :Welcome to IRC");
        assert!(p.is_ready());
        assert_eq!(p.network().my_nick, "me_");
        assert_eq!(p.network().server.name, "irc.example.net");
        assert!(p.network().me().is_some());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn error_line_fires_server_error() {
        let mut p = ready();
        let seen = capture(&mut p, EventKind::ServerError);
        p.process_line("ERROR :Closing Link: me (Quit)");
        assert!(matches!(&seen.lock().unwrap()[0], Event::ServerError { message } if message == "Closing Link: me (Quit)"));
    }

    #[test]
    fn unknown_command_is_debug_only() {
        let mut p = ready();
        let errors = capture(&mut p, EventKind::ErrorInfo);
        let debug = capture(&mut p, EventKind::DebugInfo);
        p.process_line(":srv WALLOPS :hello");
        assert!(errors.lock().unwrap().is_empty());
        assert!(!debug.lock().unwrap().is_empty());
    }

    #[test]
    fn short_lines_warn() {
        let mut p = ready();
        let errors = capture(&mut p, EventKind::ErrorInfo);
        p.process_line(":bob!b@h KICK #c");
        let errors = errors.lock().unwrap();
        assert!(matches!(&errors[0], Event::ErrorInfo(e) if e.severity == Severity::Warning));
    }

    #[test]
    fn single_token_line_warns() {
        let mut p = ready();
        let errors = capture(&mut p, EventKind::ErrorInfo);
        p.process_line("WALLOPS");
        p.process_line("");
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], Event::ErrorInfo(e) if e.severity == Severity::Warning));
    }

    #[test]
    fn embedded_line_breaks_never_reach_the_wire() {
        let mut p = ready();
        let errors = capture(&mut p, EventKind::ErrorInfo);
        p.send_message("#c", "hi\r\nQUIT :x").unwrap();
        p.set_topic("#c", "one\ntwo").unwrap();
        p.send_raw("NICK a\0b").unwrap();
        let out = p.take_outgoing();
        assert_eq!(out, vec!["PRIVMSG #c :hi", "TOPIC #c :one", "NICK a"]);
        assert!(out.iter().all(|l| !l.contains(['\r', '\n', '\0'])));
        assert_eq!(errors.lock().unwrap().len(), 3);
    }

    #[test]
    fn send_api_renders_lines() {
        let mut p = ready();
        p.send_message("#rust", "hello").unwrap();
        p.send_action("bob", "waves").unwrap();
        p.send_ctcp("bob", "version", "").unwrap();
        p.send_ctcp_reply("bob", "PING", "123").unwrap();
        p.join_channel("rust", Some("key")).unwrap();
        p.part_channel("#notjoined", None).unwrap();
        p.quit(Some("bye")).unwrap();
        assert_eq!(
            p.take_outgoing(),
            vec![
                "PRIVMSG #rust :hello",
                "PRIVMSG bob :\x01ACTION waves\x01",
                "PRIVMSG bob :\x01VERSION\x01",
                "NOTICE bob :\x01PING 123\x01",
                "JOIN #rust key",
                "QUIT :bye",
            ]
        );
    }

    #[test]
    fn set_nickname_before_connect_changes_config() {
        let mut p = parser();
        p.set_nickname("other").unwrap();
        assert!(p.take_outgoing().is_empty());
        assert_eq!(p.config().nick, "other");
        p.begin();
        assert_eq!(p.take_outgoing()[0], "NICK other");
    }

    #[test]
    fn data_out_reports_origin() {
        let mut p = ready();
        let seen = capture(&mut p, EventKind::DataOut);
        p.send_raw("PRIVMSG x :raw").unwrap();
        p.send_message("x", "api").unwrap();
        p.take_outgoing();
        let seen = seen.lock().unwrap();
        assert!(matches!(&seen[0], Event::DataOut { from_parser: false, .. }));
        assert!(matches!(&seen[1], Event::DataOut { from_parser: true, .. }));
    }

    #[test]
    fn ping_tick_sends_then_fails() {
        let mut p = ready();
        assert_eq!(p.ping_tick(), PingOutcome::Sent);
        let sent = p.take_outgoing();
        assert!(sent[0].starts_with("PING "));
        assert_eq!(p.ping_tick(), PingOutcome::Disconnect);

        let failures = capture(&mut p, EventKind::PingFailed);
        assert_eq!(p.ping_tick(), PingOutcome::Failed);
        assert_eq!(failures.lock().unwrap().len(), 1);
    }

    #[test]
    fn any_line_cancels_ping_timeout() {
        let mut p = ready();
        p.ping_tick();
        p.take_outgoing();
        p.process_line(":srv NOTICE me :still here");
        assert_eq!(p.ping_expired(), PingOutcome::Idle);
    }

    #[test]
    fn pong_records_lag() {
        let mut p = ready();
        let seen = capture(&mut p, EventKind::PingSuccess);
        p.ping_tick();
        let line = p.take_outgoing().remove(0);
        let token = line.trim_start_matches("PING ").to_string();
        p.process_line(&format!(":srv PONG srv :{token}"));
        assert!(p.server_lag().is_some());
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(p.ping_tick(), PingOutcome::Sent);
    }

    #[test]
    fn socket_closed_fires_once_and_resets() {
        let mut p = ready();
        let seen = capture(&mut p, EventKind::SocketClosed);
        p.process_line(":me!u@h JOIN #c");
        p.socket_closed("EOF");
        p.socket_closed("EOF");
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(p.network().channel_count(), 0);
        assert_eq!(p.state(), ConnectionState::Closed);
    }

    #[test]
    fn panicking_listener_on_data_in_does_not_stop_processing() {
        let mut p = ready();
        p.on(EventKind::DataIn, |_, _| panic!("bad listener"));
        p.process_line(":me!u@h JOIN #c");
        assert!(p.network().channel("#c").is_some());
    }
}

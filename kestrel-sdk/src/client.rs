//! Transport: TCP/TLS setup, the connection task and the remote handle.
//!
//! The protocol engine itself is the sans-IO [`Parser`]. This module owns
//! the socket, feeds received lines to the parser, writes what it queues,
//! and drives the keep-alive timer. Everything for one connection runs on
//! a single spawned task, so listeners never race with each other.
//!
//! Typical use:
//!
//! ```rust,no_run
//! use kestrel_sdk::client::{self, ConnectConfig};
//! use kestrel_sdk::command::CommandSink;
//! use kestrel_sdk::event::EventKind;
//! use kestrel_sdk::parser::Parser;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut parser = Parser::new(ConnectConfig {
//!     server_addr: "irc.libera.chat:6697".into(),
//!     nick: "kestrel".into(),
//!     tls: true,
//!     ..Default::default()
//! });
//! parser.on(EventKind::Post005, |_, ctx| {
//!     ctx.join_channel("#kestrel", None)?;
//!     Ok(())
//! });
//! let conn = client::establish_connection(parser.config()).await?;
//! let (handle, task) = client::connect_with_stream(conn, parser);
//! handle.send_message("#kestrel", "hello")?;
//! let _parser = task.await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;

use crate::callback::{CallbackManager, Context, Filter, Handler, ListenerId};
use crate::command::{Command, CommandSink};
use crate::error::SendError;
use crate::event::{Event, EventKind};
use crate::parser::{Parser, PingOutcome};

/// Configuration for connecting to an IRC server.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Server address (host:port).
    pub server_addr: String,
    /// Desired nickname.
    pub nick: String,
    /// Tried once when the nickname is taken during registration.
    pub alt_nick: String,
    /// Prepended to the last attempted nickname on further collisions.
    pub prepend_char: char,
    /// Username (ident).
    pub user: String,
    /// Real name.
    pub realname: String,
    /// Server password, sent with PASS before NICK/USER.
    pub password: Option<String>,
    /// Use TLS.
    pub tls: bool,
    /// Skip TLS certificate verification (for self-signed certs).
    pub tls_insecure: bool,
    /// Idle time before a keep-alive PING is sent.
    pub ping_interval: Duration,
    /// How long to wait for any reply to a keep-alive PING.
    pub ping_timeout: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:6667".to_string(),
            nick: "user".to_string(),
            alt_nick: String::new(),
            prepend_char: '_',
            user: "user".to_string(),
            realname: "Kestrel IRC User".to_string(),
            password: None,
            tls: false,
            tls_insecure: false,
            ping_interval: Duration::from_secs(60),
            ping_timeout: Duration::from_secs(60),
        }
    }
}

/// Requests from a [`ClientHandle`] to the connection task.
enum Control {
    Send(Command),
    Subscribe {
        id: ListenerId,
        filter: Filter,
        target: Option<String>,
        handler: Handler,
    },
    Unsubscribe(ListenerId),
    Disconnect(Option<String>),
}

/// A cloneable handle to a running connection, usable from any thread.
///
/// Commands are applied on the connection task in the order they were
/// sent. Listener registrations take effect before the next line is
/// processed.
#[derive(Clone)]
pub struct ClientHandle {
    tx: mpsc::UnboundedSender<Control>,
    ids: Arc<AtomicU64>,
}

impl ClientHandle {
    fn control(&self, control: Control) -> Result<(), SendError> {
        self.tx.send(control).map_err(|_| SendError::Closed)
    }

    /// Register a listener on the running connection.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Result<ListenerId, SendError>
    where
        F: FnMut(&Event, &Context<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.add(Filter::Kind(kind), None, Box::new(handler))
    }

    pub fn subscribe_all<F>(&self, handler: F) -> Result<ListenerId, SendError>
    where
        F: FnMut(&Event, &Context<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.add(Filter::All, None, Box::new(handler))
    }

    pub fn subscribe_for_target<F>(
        &self,
        kind: EventKind,
        channel: &str,
        handler: F,
    ) -> Result<ListenerId, SendError>
    where
        F: FnMut(&Event, &Context<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.add(Filter::Kind(kind), Some(channel.to_string()), Box::new(handler))
    }

    fn add(
        &self,
        filter: Filter,
        target: Option<String>,
        handler: Handler,
    ) -> Result<ListenerId, SendError> {
        let id = CallbackManager::allocate_id(&self.ids);
        self.control(Control::Subscribe {
            id,
            filter,
            target,
            handler,
        })?;
        Ok(id)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> Result<(), SendError> {
        self.control(Control::Unsubscribe(id))
    }

    /// Send QUIT and close the connection.
    pub fn disconnect(&self, reason: Option<&str>) -> Result<(), SendError> {
        let reason = reason.filter(|r| !r.is_empty()).map(str::to_string);
        self.control(Control::Disconnect(reason))
    }

    /// Whether the connection task is still running.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl CommandSink for ClientHandle {
    fn send(&self, command: Command) -> Result<(), SendError> {
        self.control(Control::Send(command))
    }
}

/// Forward every event except raw traffic into a channel, for consumers
/// that prefer to `.recv().await` rather than register callbacks.
pub fn event_channel(parser: &mut Parser) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    parser.callbacks().register_all(move |event, _| {
        if !matches!(event.kind(), EventKind::DataIn | EventKind::DataOut) {
            // The receiver going away just means nobody is listening.
            let _ = tx.send(event.clone());
        }
        Ok(())
    });
    rx
}

/// Establish TCP (and optionally TLS) connection to the server.
///
/// Done before the connection task starts so that connection errors can
/// be reported directly to the caller.
pub async fn establish_connection(config: &ConnectConfig) -> Result<EstablishedConnection> {
    // Auto-detect TLS from port if not explicitly set
    let use_tls = config.tls || config.server_addr.ends_with(":6697");
    let mode = if use_tls { "TLS" } else { "plain" };

    tracing::debug!("Resolving {}...", config.server_addr);
    let tcp = TcpStream::connect(&config.server_addr)
        .await
        .map_err(|e| anyhow::anyhow!("TCP connect to {} failed: {e}", config.server_addr))?;
    tracing::debug!("TCP connected to {} ({mode})", config.server_addr);

    if !use_tls {
        return Ok(EstablishedConnection::Plain(tcp));
    }

    let tls_config = if config.tls_insecure {
        tracing::warn!("TLS: certificate verification disabled");
        rustls_insecure_config()
    } else {
        rustls_default_config()
    };
    let connector = TlsConnector::from(Arc::new(tls_config));
    let host = host_of(&config.server_addr);
    let dns_name = rustls::pki_types::ServerName::try_from(host.to_string())?;
    let tls_stream = connector
        .connect(dns_name, tcp)
        .await
        .map_err(|e| anyhow::anyhow!("TLS handshake with {} failed: {e}", config.server_addr))?;
    tracing::debug!("TLS handshake complete");
    Ok(EstablishedConnection::Tls(tls_stream))
}

/// `host:port` without the port. Bracketed IPv6 literals lose their
/// brackets.
fn host_of(addr: &str) -> &str {
    let host = match addr.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => addr,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}

/// A connection that has completed TCP (and optionally TLS) but hasn't
/// started IRC registration yet.
pub enum EstablishedConnection {
    Plain(TcpStream),
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
    /// In-process stream, for tests and embedders that bring their own
    /// transport.
    Memory(tokio::io::DuplexStream),
}

/// Run the connection on an already-established stream.
///
/// Registration starts immediately. The returned task resolves to the
/// parser once the connection has closed, with `SocketClosed` fired.
pub fn connect_with_stream(
    conn: EstablishedConnection,
    mut parser: Parser,
) -> (ClientHandle, JoinHandle<Parser>) {
    let (handle, mut rx) = control_channel(&mut parser);
    let task = tokio::spawn(async move {
        parser.set_connecting();
        run_connection(conn, &mut parser, &mut rx).await;
        parser
    });
    (handle, task)
}

/// Connect to the server named in the parser's config and run the
/// connection. Connection failures are reported through `ConnectError`
/// and `SocketClosed`.
pub fn connect(mut parser: Parser) -> (ClientHandle, JoinHandle<Parser>) {
    let (handle, mut rx) = control_channel(&mut parser);
    let task = tokio::spawn(async move {
        parser.set_connecting();
        let established = establish_connection(parser.config()).await;
        match established {
            Ok(conn) => run_connection(conn, &mut parser, &mut rx).await,
            Err(e) => {
                tracing::error!(error = %e, "connect failed");
                parser.connect_failed(e);
            }
        }
        parser
    });
    (handle, task)
}

fn control_channel(parser: &mut Parser) -> (ClientHandle, mpsc::UnboundedReceiver<Control>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ClientHandle {
        tx,
        ids: parser.callbacks().id_source(),
    };
    (handle, rx)
}

async fn run_connection(
    conn: EstablishedConnection,
    parser: &mut Parser,
    rx: &mut mpsc::UnboundedReceiver<Control>,
) {
    let result = match conn {
        EstablishedConnection::Plain(tcp) => run_irc(tcp, parser, rx).await,
        EstablishedConnection::Tls(tls) => run_irc(tls, parser, rx).await,
        EstablishedConnection::Memory(duplex) => run_irc(duplex, parser, rx).await,
    };
    let reason = match result {
        Ok(reason) => reason,
        Err(e) => {
            tracing::warn!(error = %e, "connection failed");
            format!("{e:#}")
        }
    };
    tracing::info!(%reason, "connection closed");
    parser.socket_closed(&reason);
}

fn install_crypto_provider() {
    // Install a crypto provider for rustls.
    // ring is preferred (works on iOS); aws-lc-rs is the default on desktop.
    #[cfg(feature = "ring")]
    {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
    #[cfg(all(feature = "aws-lc-rs", not(feature = "ring")))]
    {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    }
}

/// Platform trust store, falling back to the bundled Mozilla roots when
/// none could be loaded.
fn rustls_default_config() -> rustls::ClientConfig {
    install_crypto_provider();

    let mut root_store = rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for error in &native.errors {
        tracing::debug!(%error, "skipping native certificate source");
    }
    let (added, ignored) = root_store.add_parsable_certificates(native.certs);
    tracing::debug!(added, ignored, "loaded native root certificates");
    if root_store.is_empty() {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

fn rustls_insecure_config() -> rustls::ClientConfig {
    install_crypto_provider();
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureVerifier))
        .with_no_client_auth()
}

#[derive(Debug)]
struct InsecureVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::CryptoProvider::get_default()
            .map(|p| p.signature_verification_algorithms.supported_schemes())
            .unwrap_or_default()
    }
}

/// Drive one connection until it closes. Returns the close reason.
async fn run_irc<S>(
    stream: S,
    parser: &mut Parser,
    rx: &mut mpsc::UnboundedReceiver<Control>,
) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    parser.begin();
    flush(parser, &mut writer).await?;

    let interval = parser.config().ping_interval;
    let timeout = parser.config().ping_timeout;
    let mut ping = tokio::time::interval_at(Instant::now() + interval, interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut ping_deadline: Option<Instant> = None;
    let mut handles_gone = false;
    let mut line_buf = Vec::new();

    loop {
        tokio::select! {
            result = reader.read_until(b'\n', &mut line_buf) => {
                if result? == 0 {
                    return Ok("EOF".to_string());
                }
                let line = String::from_utf8_lossy(&line_buf).into_owned();
                line_buf.clear();
                tracing::trace!("<< {}", line.trim_end());
                parser.process_line(&line);
            }
            control = rx.recv(), if !handles_gone => match control {
                Some(Control::Send(command)) => parser.execute(command),
                Some(Control::Subscribe { id, filter, target, handler }) => {
                    parser.callbacks().insert(id, filter, target, handler);
                }
                Some(Control::Unsubscribe(id)) => {
                    parser.callbacks().unregister(id);
                }
                Some(Control::Disconnect(reason)) => {
                    parser.execute(Command::Quit(reason));
                    flush(parser, &mut writer).await?;
                    // Best effort, the server may already be gone.
                    let _ = writer.shutdown().await;
                    return Ok("disconnect requested".to_string());
                }
                None => handles_gone = true,
            },
            _ = ping.tick() => match parser.ping_tick() {
                PingOutcome::Sent => ping_deadline = Some(Instant::now() + timeout),
                PingOutcome::Disconnect => return Ok("Server not responding".to_string()),
                PingOutcome::Idle | PingOutcome::Failed => {}
            },
            _ = sleep_until(ping_deadline), if ping_deadline.is_some() => {
                ping_deadline = None;
                if parser.ping_expired() == PingOutcome::Disconnect {
                    return Ok("Server not responding".to_string());
                }
            }
        }
        flush(parser, &mut writer).await?;
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Write every queued line, CRLF-terminated.
async fn flush<W: AsyncWrite + Unpin>(parser: &mut Parser, writer: &mut W) -> Result<()> {
    let lines = parser.take_outgoing();
    if lines.is_empty() {
        return Ok(());
    }
    let mut buf = String::new();
    for line in lines {
        buf.push_str(&line);
        buf.push_str("\r\n");
    }
    writer.write_all(buf.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_of_strips_port() {
        assert_eq!(host_of("irc.libera.chat:6697"), "irc.libera.chat");
        assert_eq!(host_of("irc.libera.chat"), "irc.libera.chat");
        assert_eq!(host_of("[::1]:6667"), "::1");
    }

    #[test]
    fn default_config() {
        let config = ConnectConfig::default();
        assert_eq!(config.prepend_char, '_');
        assert!(config.alt_nick.is_empty());
        assert_eq!(config.ping_interval, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn handle_reports_closed_connection() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ClientHandle {
            tx,
            ids: Arc::new(AtomicU64::new(1)),
        };
        drop(rx);
        assert!(!handle.is_connected());
        assert!(matches!(handle.send_message("#c", "hi"), Err(SendError::Closed)));
    }

    #[tokio::test]
    async fn event_channel_skips_raw_traffic() {
        let mut parser = Parser::new(ConnectConfig::default());
        let mut events = event_channel(&mut parser);
        parser.begin();
        parser.process_line(":srv 001 user :Welcome");
        let first = events.recv().await.unwrap();
        assert_eq!(first.kind(), EventKind::NumericReceived);
        let second = events.recv().await.unwrap();
        assert_eq!(second.kind(), EventKind::ServerReady);
    }
}

//! kestrel-sdk: an event-driven IRC client protocol engine.
//!
//! - [`parser`]: the sans-IO engine that turns server lines into state
//!   changes and [`event::Event`]s
//! - [`client`]: TCP/TLS transport, the connection task and [`client::ClientHandle`]
//! - [`state`]: the tracked view of clients, channels and memberships
//! - [`modes`]: ISUPPORT-driven mode tables
//! - [`callback`]: listener registration and dispatch
//! - [`command`]: the send API shared by handles, handlers and the parser

pub mod callback;
pub mod casemap;
pub mod client;
pub mod command;
pub mod error;
pub mod event;
pub mod irc;
pub mod modes;
pub mod parser;
mod router;
pub mod state;

pub use callback::{CallbackManager, Context, ListenerId};
pub use client::{ClientHandle, ConnectConfig};
pub use command::{Command, CommandSink};
pub use event::{Event, EventKind};
pub use parser::Parser;

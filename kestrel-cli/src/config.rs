//! Persistent configuration for the kestrel console client.
//!
//! Config file lives at `~/.config/kestrel/cli.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kestrel_sdk::ConnectConfig;
use serde::{Deserialize, Serialize};

/// Default IRC server.
pub const DEFAULT_SERVER: &str = "irc.libera.chat:6697";
/// Fallback nickname when neither flags, file nor `$USER` provide one.
pub const DEFAULT_NICK: &str = "kestrel";

/// User configuration (persisted in cli.toml).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server address (host:port).
    pub server: Option<String>,
    pub nick: Option<String>,
    /// Tried once when the nickname is taken during registration.
    pub alt_nick: Option<String>,
    pub user: Option<String>,
    pub realname: Option<String>,
    /// Server password (PASS).
    pub password: Option<String>,
    /// Use TLS (auto-detected from :6697, but can force).
    pub tls: Option<bool>,
    /// Skip TLS certificate verification.
    pub tls_insecure: Option<bool>,
    /// Channels to join once registered.
    pub channels: Option<Vec<String>>,
    /// Seconds of silence before a keep-alive PING.
    pub ping_interval: Option<u64>,
    /// Seconds to wait for any reply to that PING.
    pub ping_timeout: Option<u64>,
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kestrel")
}

pub fn config_path() -> PathBuf {
    config_dir().join("cli.toml")
}

impl Config {
    /// Load from `path`. A missing file is an empty config; an unreadable
    /// or malformed one is logged and ignored.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str(&s) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!("bad config file {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("can't read {}: {e}", path.display());
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Effective settings after merging CLI args > config file > defaults.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub server: String,
    pub nick: String,
    pub alt_nick: String,
    pub user: String,
    pub realname: String,
    pub password: Option<String>,
    pub tls: bool,
    pub tls_insecure: bool,
    pub channels: Vec<String>,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub json: bool,
}

impl Resolved {
    pub fn merge(cli: &super::Cli, config: &Config) -> Self {
        let defaults = ConnectConfig::default();

        let server = cli
            .server
            .clone()
            .or_else(|| config.server.clone())
            .unwrap_or_else(|| DEFAULT_SERVER.to_string());
        // Ensure server has a port; default to 6697 (TLS) if missing
        let server = if server.contains(':') {
            server
        } else {
            format!("{server}:6697")
        };

        let nick = cli
            .nick
            .clone()
            .or_else(|| config.nick.clone())
            .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
            .unwrap_or_else(|| DEFAULT_NICK.to_string());
        let alt_nick = cli
            .alt_nick
            .clone()
            .or_else(|| config.alt_nick.clone())
            .unwrap_or_else(|| format!("{nick}_"));
        let user = cli
            .user
            .clone()
            .or_else(|| config.user.clone())
            .unwrap_or_else(|| nick.clone());
        let realname = cli
            .realname
            .clone()
            .or_else(|| config.realname.clone())
            .unwrap_or(defaults.realname);
        let password = cli.password.clone().or_else(|| config.password.clone());

        let tls_explicit = cli.tls || config.tls.unwrap_or(false);
        let tls = tls_explicit || server.ends_with(":6697");
        let tls_insecure = cli.tls_insecure || config.tls_insecure.unwrap_or(false);

        let channels = match &cli.channels {
            Some(ch) => ch
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => config.channels.clone().unwrap_or_default(),
        };

        let ping_interval = config
            .ping_interval
            .map(Duration::from_secs)
            .unwrap_or(defaults.ping_interval);
        let ping_timeout = config
            .ping_timeout
            .map(Duration::from_secs)
            .unwrap_or(defaults.ping_timeout);

        Self {
            server,
            nick,
            alt_nick,
            user,
            realname,
            password,
            tls,
            tls_insecure,
            channels,
            ping_interval,
            ping_timeout,
            json: cli.json,
        }
    }

    pub fn connect_config(&self) -> ConnectConfig {
        ConnectConfig {
            server_addr: self.server.clone(),
            nick: self.nick.clone(),
            alt_nick: self.alt_nick.clone(),
            user: self.user.clone(),
            realname: self.realname.clone(),
            password: self.password.clone(),
            tls: self.tls,
            tls_insecure: self.tls_insecure,
            ping_interval: self.ping_interval,
            ping_timeout: self.ping_timeout,
            ..ConnectConfig::default()
        }
    }
}

impl From<&Resolved> for Config {
    fn from(r: &Resolved) -> Self {
        Self {
            server: Some(r.server.clone()),
            nick: Some(r.nick.clone()),
            alt_nick: Some(r.alt_nick.clone()),
            user: Some(r.user.clone()),
            realname: Some(r.realname.clone()),
            password: r.password.clone(),
            tls: Some(r.tls),
            tls_insecure: Some(r.tls_insecure),
            channels: Some(r.channels.clone()),
            ping_interval: Some(r.ping_interval.as_secs()),
            ping_timeout: Some(r.ping_timeout.as_secs()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cli;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("kestrel").chain(args.iter().copied()))
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml"));
        assert!(config.server.is_none());
        assert!(config.channels.is_none());
    }

    #[test]
    fn malformed_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli.toml");
        std::fs::write(&path, "server = [not toml").unwrap();
        assert!(Config::load_from(&path).server.is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cli.toml");
        let config = Config {
            server: Some("irc.example.org:6667".into()),
            channels: Some(vec!["#rust".into(), "#kestrel".into()]),
            ping_interval: Some(30),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert_eq!(loaded.server.as_deref(), Some("irc.example.org:6667"));
        assert_eq!(loaded.channels.unwrap(), vec!["#rust", "#kestrel"]);
        assert_eq!(loaded.ping_interval, Some(30));
    }

    #[test]
    fn resolved_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli.toml");
        let first = Resolved::merge(&cli(&["--nick", "saved", "--channels", "#a"]), &Config::default());
        Config::from(&first).save_to(&path).unwrap();

        let second = Resolved::merge(&cli(&[]), &Config::load_from(&path));
        assert_eq!(second.nick, "saved");
        assert_eq!(second.channels, vec!["#a"]);
        assert_eq!(second.server, first.server);
    }

    #[test]
    fn cli_overrides_file() {
        let config = Config {
            server: Some("file.example.org:6667".into()),
            nick: Some("filenick".into()),
            channels: Some(vec!["#file".into()]),
            ..Config::default()
        };
        let resolved = Resolved::merge(
            &cli(&["--server", "cli.example.org:6667", "--channels", "#a, #b,"]),
            &config,
        );
        assert_eq!(resolved.server, "cli.example.org:6667");
        assert_eq!(resolved.nick, "filenick");
        assert_eq!(resolved.alt_nick, "filenick_");
        assert_eq!(resolved.user, "filenick");
        assert_eq!(resolved.channels, vec!["#a", "#b"]);
        assert!(!resolved.tls);
    }

    #[test]
    fn defaults_fill_the_gaps() {
        let config = Config {
            nick: Some("n".into()),
            ..Config::default()
        };
        let resolved = Resolved::merge(&cli(&[]), &config);
        assert_eq!(resolved.server, DEFAULT_SERVER);
        assert!(resolved.tls);
        assert!(resolved.channels.is_empty());
        assert_eq!(resolved.ping_interval, Duration::from_secs(60));
        assert_eq!(resolved.realname, "Kestrel IRC User");
    }

    #[test]
    fn bare_host_gets_tls_port() {
        let resolved = Resolved::merge(&cli(&["--server", "irc.example.org", "--nick", "n"]), &Config::default());
        assert_eq!(resolved.server, "irc.example.org:6697");
        assert!(resolved.tls);

        let cc = resolved.connect_config();
        assert_eq!(cc.server_addr, "irc.example.org:6697");
        assert_eq!(cc.nick, "n");
        assert_eq!(cc.prepend_char, '_');
    }
}

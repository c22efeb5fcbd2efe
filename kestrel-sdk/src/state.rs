//! The user's view of the network: known clients, channels and who is where.
//!
//! Clients and channels live in maps keyed by their case-folded name.
//! Channel memberships are keyed by folded nick inside each channel, so a
//! membership is really a (channel, client) pair with no back pointers.
//! Renames and case-mapping changes re-key the maps in place.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::casemap::CaseMapping;
use crate::irc::Hostmask;
use crate::modes::ModeRegistry;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Client {
    pub nick: String,
    pub ident: String,
    pub host: String,
    pub real_name: String,
    pub user_modes: u64,
    pub away: bool,
    pub away_reason: Option<String>,
}

impl Client {
    pub fn new(nick: &str) -> Self {
        Self {
            nick: nick.to_string(),
            ..Self::default()
        }
    }

    /// Fill in ident/host from a hostmask. Known values are never replaced
    /// with empty ones.
    pub fn update_host_bits(&mut self, mask: &Hostmask) {
        if !mask.ident.is_empty() {
            self.ident = mask.ident.clone();
        }
        if !mask.host.is_empty() {
            self.host = mask.host.clone();
        }
    }

    pub fn hostmask(&self) -> Hostmask {
        Hostmask {
            nick: self.nick.clone(),
            ident: self.ident.clone(),
            host: self.host.clone(),
        }
    }
}

/// One entry of a list mode such as a ban.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListModeEntry {
    pub item: String,
    pub owner: String,
    /// Unix seconds.
    pub time: i64,
}

/// A client's presence on a channel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Membership {
    /// Display nick, kept in step with the client.
    pub nick: String,
    /// Prefix-mode bits from the [`ModeRegistry`].
    pub modes: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Channel {
    pub name: String,
    pub topic: String,
    pub topic_setter: String,
    pub topic_time: i64,
    pub created: Option<i64>,
    /// Boolean channel-mode bits.
    pub modes: u64,
    pub params: BTreeMap<char, String>,
    pub lists: BTreeMap<char, Vec<ListModeEntry>>,
    pub members: HashMap<String, Membership>,
    /// List modes whose batch (367.., 368) is currently being received.
    #[serde(skip)]
    pub(crate) receiving_lists: HashSet<char>,
    #[serde(skip)]
    pub(crate) receiving_names: bool,
}

impl Channel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn param(&self, mode: char) -> Option<&str> {
        self.params.get(&mode).map(String::as_str)
    }

    /// Store a parameter; an empty value clears it.
    pub fn set_param(&mut self, mode: char, value: &str) {
        if value.is_empty() {
            self.params.remove(&mode);
        } else {
            self.params.insert(mode, value.to_string());
        }
    }

    pub fn list(&self, mode: char) -> &[ListModeEntry] {
        self.lists.get(&mode).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Add or remove a list entry. Items compare case-insensitively and a
    /// duplicate add is rejected. Returns whether the list changed.
    pub fn set_list_entry(
        &mut self,
        casemap: CaseMapping,
        mode: char,
        entry: ListModeEntry,
        add: bool,
    ) -> bool {
        let list = self.lists.entry(mode).or_default();
        let existing = list.iter().position(|e| casemap.eq(&e.item, &entry.item));
        match (existing, add) {
            (Some(_), true) => false,
            (None, true) => {
                list.push(entry);
                true
            }
            (Some(idx), false) => {
                list.remove(idx);
                true
            }
            (None, false) => false,
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// `+ntl 10`-style rendering of the current non-list modes.
    pub fn mode_string(&self, registry: &ModeRegistry) -> String {
        let mut letters = format!("+{}", registry.boolean_mode_string(self.modes));
        let mut args = String::new();
        for (mode, value) in &self.params {
            letters.push(*mode);
            args.push(' ');
            args.push_str(value);
        }
        letters + &args
    }

    pub fn is_receiving_names(&self) -> bool {
        self.receiving_names
    }

    pub fn is_receiving_list(&self, mode: char) -> bool {
        self.receiving_lists.contains(&mode)
    }
}

/// Facts learned from 001/004/005.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub network: String,
    pub software: String,
    pub isupport: BTreeMap<String, String>,
}

/// Outcome of resolving a name that may not have been seen before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Existing,
    Created,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Network {
    pub casemap: CaseMapping,
    pub my_nick: String,
    pub away: bool,
    pub server: ServerInfo,
    clients: HashMap<String, Client>,
    channels: HashMap<String, Channel>,
}

impl Network {
    pub fn new(my_nick: &str) -> Self {
        Self {
            my_nick: my_nick.to_string(),
            ..Self::default()
        }
    }

    pub fn key(&self, name: &str) -> String {
        self.casemap.fold(name)
    }

    pub fn is_me(&self, nick: &str) -> bool {
        !self.my_nick.is_empty() && self.casemap.eq(&self.my_nick, nick)
    }

    pub fn me(&self) -> Option<&Client> {
        self.client(&self.my_nick)
    }

    pub fn client(&self, nick: &str) -> Option<&Client> {
        self.clients.get(&self.key(nick))
    }

    pub fn client_mut(&mut self, nick: &str) -> Option<&mut Client> {
        let key = self.key(nick);
        self.clients.get_mut(&key)
    }

    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Look up the client named by `mask`, creating it if unknown, and
    /// merge any ident/host the mask carries.
    pub fn ensure_client(&mut self, mask: &Hostmask) -> (&mut Client, Lookup) {
        let key = self.key(&mask.nick);
        let lookup = if self.clients.contains_key(&key) {
            Lookup::Existing
        } else {
            Lookup::Created
        };
        let client = self
            .clients
            .entry(key)
            .or_insert_with(|| Client::new(&mask.nick));
        client.update_host_bits(mask);
        (client, lookup)
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&self.key(name))
    }

    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        let key = self.key(name);
        self.channels.get_mut(&key)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn ensure_channel(&mut self, name: &str) -> (&mut Channel, Lookup) {
        let key = self.key(name);
        let lookup = if self.channels.contains_key(&key) {
            Lookup::Existing
        } else {
            Lookup::Created
        };
        let channel = self.channels.entry(key).or_insert_with(|| Channel::new(name));
        (channel, lookup)
    }

    /// Start tracking a channel we just joined, discarding any stale copy.
    pub fn reset_channel(&mut self, name: &str) -> &mut Channel {
        let key = self.key(name);
        let slot = self.channels.entry(key).or_default();
        *slot = Channel::new(name);
        slot
    }

    /// Drop a channel and every client that was only visible through it.
    pub fn remove_channel(&mut self, name: &str) -> Option<Channel> {
        let key = self.key(name);
        let channel = self.channels.remove(&key)?;
        for member in channel.members.values() {
            self.prune_client(&member.nick);
        }
        Some(channel)
    }

    pub fn membership(&self, channel: &str, nick: &str) -> Option<&Membership> {
        self.channel(channel)?.members.get(&self.key(nick))
    }

    /// Add `nick` to `channel`. Returns `None` if the channel is unknown.
    pub fn add_member(&mut self, channel: &str, nick: &str) -> Option<(&mut Membership, Lookup)> {
        let nick_key = self.key(nick);
        let chan = self.channel_mut(channel)?;
        let lookup = if chan.members.contains_key(&nick_key) {
            Lookup::Existing
        } else {
            Lookup::Created
        };
        let membership = chan.members.entry(nick_key).or_insert_with(|| Membership {
            nick: nick.to_string(),
            modes: 0,
        });
        Some((membership, lookup))
    }

    pub fn remove_member(&mut self, channel: &str, nick: &str) -> Option<Membership> {
        let nick_key = self.key(nick);
        self.channel_mut(channel)?.members.remove(&nick_key)
    }

    /// Names of every channel `nick` is on.
    pub fn channels_of(&self, nick: &str) -> Vec<String> {
        let nick_key = self.key(nick);
        let mut names: Vec<String> = self
            .channels
            .values()
            .filter(|c| c.members.contains_key(&nick_key))
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Remove `nick` from the client table when it is no longer visible on
    /// any channel. The local user is always kept. Returns whether it was
    /// removed.
    pub fn prune_client(&mut self, nick: &str) -> bool {
        if self.is_me(nick) {
            return false;
        }
        let key = self.key(nick);
        let visible = self.channels.values().any(|c| c.members.contains_key(&key));
        !visible && self.clients.remove(&key).is_some()
    }

    /// Drop every client that is not on any channel we know of. Returns how
    /// many were removed.
    pub fn prune_invisible(&mut self) -> usize {
        let me = self.key(&self.my_nick);
        let channels = &self.channels;
        let before = self.clients.len();
        self.clients.retain(|key, _| {
            *key == me || channels.values().any(|c| c.members.contains_key(key))
        });
        before - self.clients.len()
    }

    pub fn remove_client(&mut self, nick: &str) -> Option<Client> {
        let key = self.key(nick);
        for channel in self.channels.values_mut() {
            channel.members.remove(&key);
        }
        self.clients.remove(&key)
    }

    /// Re-key a client and all of its memberships. Returns the channels it
    /// shares with us.
    pub fn rename_client(&mut self, old: &str, new: &str) -> Vec<String> {
        let old_key = self.key(old);
        let new_key = self.key(new);
        let mut client = self.clients.remove(&old_key).unwrap_or_else(|| Client::new(old));
        client.nick = new.to_string();
        self.clients.insert(new_key.clone(), client);

        let mut shared = Vec::new();
        for channel in self.channels.values_mut() {
            if let Some(mut membership) = channel.members.remove(&old_key) {
                membership.nick = new.to_string();
                channel.members.insert(new_key.clone(), membership);
                shared.push(channel.name.clone());
            }
        }
        if self.casemap.eq(&self.my_nick, old) {
            self.my_nick = new.to_string();
        }
        shared.sort();
        shared
    }

    /// Switch case mapping and re-key everything under the new folding.
    pub fn set_casemap(&mut self, casemap: CaseMapping) {
        if casemap == self.casemap {
            return;
        }
        self.casemap = casemap;
        let clients = std::mem::take(&mut self.clients);
        self.clients = clients
            .into_values()
            .map(|c| (casemap.fold(&c.nick), c))
            .collect();
        let channels = std::mem::take(&mut self.channels);
        self.channels = channels
            .into_values()
            .map(|mut c| {
                let members = std::mem::take(&mut c.members);
                c.members = members
                    .into_values()
                    .map(|m| (casemap.fold(&m.nick), m))
                    .collect();
                (casemap.fold(&c.name), c)
            })
            .collect();
    }

    /// Forget everything learned on the current connection.
    pub fn reset(&mut self) {
        self.clients.clear();
        self.channels.clear();
        self.server = ServerInfo::default();
        self.casemap = CaseMapping::default();
        self.away = false;
    }

    pub fn clear_channels(&mut self) {
        let names: Vec<String> = self.channels.values().map(|c| c.name.clone()).collect();
        for name in names {
            self.remove_channel(&name);
        }
    }
}

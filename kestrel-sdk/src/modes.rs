//! Per-connection mode tables built from ISUPPORT.
//!
//! Boolean channel modes, user modes and prefix modes each get a bit in a
//! `u64`, handed out in the order the server advertises them. Channel
//! modes that take parameters are not bit-mapped; they are only tagged
//! with how their parameter behaves.

use std::collections::HashMap;

use crate::error::IsupportError;

pub const DEFAULT_CHANMODES: &str = "b,k,l,imnpstrc";
pub const DEFAULT_PREFIX: &str = "(ohv)@%+";
pub const DEFAULT_USERMODES: &str = "nwdoi";
pub const DEFAULT_CHANTYPES: &str = "#&";

/// Parameter behaviour of a non-boolean channel mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    /// Group A: `+b mask` / `-b mask`, kept as a list.
    List,
    /// Group B: parameter on both set and unset (`+k key` / `-k key`).
    SetUnset,
    /// Group C: parameter only when set (`+l 10` / `-l`).
    Set,
}

impl ParamMode {
    /// Whether removing this mode consumes a parameter.
    pub fn takes_param_on_unset(self) -> bool {
        matches!(self, Self::List | Self::SetUnset)
    }
}

/// What a channel mode letter means on this connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanModeKind {
    Prefix(u64),
    Boolean(u64),
    Param(ParamMode),
    Unknown,
}

/// An ordered set of mode letters where letter `n` owns bit `1 << n`.
#[derive(Debug, Clone, Default)]
struct BitTable {
    order: Vec<char>,
}

impl BitTable {
    fn clear(&mut self) {
        self.order.clear();
    }

    fn bit(&self, mode: char) -> Option<u64> {
        self.order.iter().position(|&c| c == mode).map(|i| 1u64 << i)
    }

    /// Returns the bit for `mode`, allocating one if needed. `None` once
    /// all 64 bits are taken.
    fn insert(&mut self, mode: char) -> Option<u64> {
        if let Some(bit) = self.bit(mode) {
            return Some(bit);
        }
        if self.order.len() >= u64::BITS as usize {
            return None;
        }
        self.order.push(mode);
        Some(1u64 << (self.order.len() - 1))
    }

    fn render(&self, mask: u64) -> String {
        self.order
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1u64 << i) != 0)
            .map(|(_, &c)| c)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ModeRegistry {
    boolean: BitTable,
    params: HashMap<char, ParamMode>,
    user: BitTable,
    /// Prefix mode letters, lowest privilege first.
    prefix: BitTable,
    mode_to_symbol: HashMap<char, char>,
    symbol_to_mode: HashMap<char, char>,
    chan_types: Vec<char>,
}

impl Default for ModeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeRegistry {
    /// A registry loaded with the hard-coded defaults used until the
    /// server's ISUPPORT has been applied.
    pub fn new() -> Self {
        let mut registry = Self {
            boolean: BitTable::default(),
            params: HashMap::new(),
            user: BitTable::default(),
            prefix: BitTable::default(),
            mode_to_symbol: HashMap::new(),
            symbol_to_mode: HashMap::new(),
            chan_types: Vec::new(),
        };
        // Defaults are well-formed, these cannot fail.
        let _ = registry.register_prefix_modes(None);
        let _ = registry.register_chan_modes(None);
        registry.register_user_modes(None);
        registry.register_chan_types(None);
        registry
    }

    /// Apply a `CHANMODES=A,B,C,D` value. On a malformed value the default
    /// is installed and the error is returned for reporting.
    pub fn register_chan_modes(&mut self, value: Option<&str>) -> Result<(), IsupportError> {
        let value = value.unwrap_or(DEFAULT_CHANMODES);
        let mut groups: Vec<&str> = value.splitn(5, ',').collect();
        let mut result = Ok(());
        if groups.len() < 4 {
            result = Err(IsupportError::ChanModes {
                value: value.to_string(),
                groups: groups.len(),
            });
            groups = DEFAULT_CHANMODES.splitn(5, ',').collect();
        }

        self.params.clear();
        self.boolean.clear();
        for (group, kind) in groups
            .iter()
            .take(3)
            .zip([ParamMode::List, ParamMode::SetUnset, ParamMode::Set])
        {
            for mode in group.chars() {
                self.params.entry(mode).or_insert(kind);
            }
        }
        for mode in groups[3].chars() {
            if self.boolean.insert(mode).is_none() {
                tracing::warn!("no free bit for boolean channel mode {mode}");
            }
        }
        tracing::debug!(
            lists = %self.list_modes(),
            booleans = %self.boolean.render(u64::MAX),
            "channel modes registered"
        );
        result
    }

    /// Apply a `PREFIX=(modes)symbols` value. The last pair gets bit 1, so
    /// a larger bit always means more privilege.
    pub fn register_prefix_modes(&mut self, value: Option<&str>) -> Result<(), IsupportError> {
        let value = value.unwrap_or(DEFAULT_PREFIX);
        let (modes, symbols, result) = match split_prefix(value) {
            Some((m, s)) => (m, s, Ok(())),
            None => {
                let (m, s) = split_prefix(DEFAULT_PREFIX).unwrap_or(("ohv", "@%+"));
                (m, s, Err(IsupportError::Prefix(value.to_string())))
            }
        };

        self.prefix.clear();
        self.mode_to_symbol.clear();
        self.symbol_to_mode.clear();
        for (mode, symbol) in modes.chars().rev().zip(symbols.chars().rev()) {
            if self.prefix.bit(mode).is_some() {
                continue;
            }
            if self.prefix.insert(mode).is_none() {
                tracing::warn!("no free bit for prefix mode {mode}");
                continue;
            }
            self.mode_to_symbol.insert(mode, symbol);
            self.symbol_to_mode.insert(symbol, mode);
        }
        result
    }

    /// Apply the user mode letters from 004 (or the default `nwdoi`).
    pub fn register_user_modes(&mut self, value: Option<&str>) {
        self.user.clear();
        for mode in value.unwrap_or(DEFAULT_USERMODES).chars() {
            if self.user.insert(mode).is_none() {
                tracing::warn!("no free bit for user mode {mode}");
            }
        }
    }

    /// Apply `CHANTYPES`.
    pub fn register_chan_types(&mut self, value: Option<&str>) {
        self.chan_types.clear();
        for c in value.unwrap_or(DEFAULT_CHANTYPES).chars() {
            if !self.chan_types.contains(&c) {
                self.chan_types.push(c);
            }
        }
    }

    pub fn classify(&self, mode: char) -> ChanModeKind {
        if let Some(bit) = self.prefix.bit(mode) {
            ChanModeKind::Prefix(bit)
        } else if let Some(bit) = self.boolean.bit(mode) {
            ChanModeKind::Boolean(bit)
        } else if let Some(kind) = self.params.get(&mode) {
            ChanModeKind::Param(*kind)
        } else {
            ChanModeKind::Unknown
        }
    }

    /// Register an unadvertised channel mode as boolean. `None` when no
    /// bits are left.
    pub fn add_boolean_mode(&mut self, mode: char) -> Option<u64> {
        self.boolean.insert(mode)
    }

    pub fn user_mode_bit(&self, mode: char) -> Option<u64> {
        self.user.bit(mode)
    }

    pub fn add_user_mode(&mut self, mode: char) -> Option<u64> {
        self.user.insert(mode)
    }

    pub fn prefix_bit(&self, mode: char) -> Option<u64> {
        self.prefix.bit(mode)
    }

    /// Bit for a prefix *symbol* such as `@`.
    pub fn prefix_symbol_bit(&self, symbol: char) -> Option<u64> {
        self.symbol_to_mode.get(&symbol).and_then(|m| self.prefix.bit(*m))
    }

    pub fn symbol_for_mode(&self, mode: char) -> Option<char> {
        self.mode_to_symbol.get(&mode).copied()
    }

    pub fn mode_for_symbol(&self, symbol: char) -> Option<char> {
        self.symbol_to_mode.get(&symbol).copied()
    }

    pub fn is_prefix_symbol(&self, c: char) -> bool {
        self.symbol_to_mode.contains_key(&c)
    }

    pub fn chan_types(&self) -> &[char] {
        &self.chan_types
    }

    pub fn is_chan_type(&self, c: char) -> bool {
        self.chan_types.contains(&c)
    }

    /// Boolean channel modes set in `mask`, in bit order.
    pub fn boolean_mode_string(&self, mask: u64) -> String {
        self.boolean.render(mask)
    }

    /// User modes set in `mask`, in bit order.
    pub fn user_mode_string(&self, mask: u64) -> String {
        self.user.render(mask)
    }

    /// Prefix mode letters in `mask`, most important first.
    pub fn prefix_mode_string(&self, mask: u64) -> String {
        self.prefix.render(mask).chars().rev().collect()
    }

    /// Prefix symbols in `mask`, most important first (`@+`).
    pub fn prefix_string(&self, mask: u64) -> String {
        self.prefix_mode_string(mask)
            .chars()
            .filter_map(|m| self.symbol_for_mode(m))
            .collect()
    }

    /// The single symbol shown beside a nick, if any.
    pub fn important_prefix(&self, mask: u64) -> Option<char> {
        self.prefix_string(mask).chars().next()
    }

    pub fn list_modes(&self) -> String {
        self.param_modes_of(ParamMode::List)
    }

    pub fn set_modes(&self) -> String {
        self.param_modes_of(ParamMode::Set)
    }

    pub fn set_unset_modes(&self) -> String {
        self.param_modes_of(ParamMode::SetUnset)
    }

    /// Known boolean modes, alphabetically.
    pub fn boolean_modes(&self) -> String {
        let mut modes = self.boolean.order.clone();
        modes.sort_unstable();
        modes.into_iter().collect()
    }

    /// Known prefix mode letters, most important first.
    pub fn prefix_modes(&self) -> String {
        self.prefix.order.iter().rev().collect()
    }

    fn param_modes_of(&self, kind: ParamMode) -> String {
        let mut modes: Vec<char> = self
            .params
            .iter()
            .filter(|(_, k)| **k == kind)
            .map(|(c, _)| *c)
            .collect();
        modes.sort_unstable();
        modes.into_iter().collect()
    }
}

fn split_prefix(value: &str) -> Option<(&str, &str)> {
    let rest = value.strip_prefix('(')?;
    let (modes, symbols) = rest.split_once(')')?;
    (modes.chars().count() == symbols.chars().count()).then_some((modes, symbols))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_installed() {
        let r = ModeRegistry::new();
        assert_eq!(r.list_modes(), "b");
        assert_eq!(r.set_unset_modes(), "k");
        assert_eq!(r.set_modes(), "l");
        assert_eq!(r.boolean_modes(), "cimnprst");
        assert_eq!(r.prefix_modes(), "ohv");
        assert!(r.is_chan_type('#') && r.is_chan_type('&'));
        assert_eq!(r.user_mode_bit('n'), Some(1));
        assert_eq!(r.user_mode_bit('i'), Some(16));
    }

    #[test]
    fn boolean_bits_follow_encounter_order() {
        let mut r = ModeRegistry::new();
        r.register_chan_modes(Some("b,k,l,imnpst")).unwrap();
        assert_eq!(r.classify('i'), ChanModeKind::Boolean(1));
        assert_eq!(r.classify('m'), ChanModeKind::Boolean(2));
        assert_eq!(r.classify('t'), ChanModeKind::Boolean(32));
        assert_eq!(r.classify('k'), ChanModeKind::Param(ParamMode::SetUnset));
        assert_eq!(r.classify('l'), ChanModeKind::Param(ParamMode::Set));
        assert_eq!(r.classify('b'), ChanModeKind::Param(ParamMode::List));
        assert_eq!(r.classify('r'), ChanModeKind::Unknown);
    }

    #[test]
    fn short_chanmodes_falls_back_to_default() {
        let mut r = ModeRegistry::new();
        let err = r.register_chan_modes(Some("b,k")).unwrap_err();
        assert_eq!(err, IsupportError::ChanModes { value: "b,k".into(), groups: 2 });
        assert_eq!(r.boolean_modes(), "cimnprst");
    }

    #[test]
    fn prefix_bits_ascend_from_the_last_pair() {
        let r = ModeRegistry::new();
        assert_eq!(r.prefix_bit('v'), Some(1));
        assert_eq!(r.prefix_bit('h'), Some(2));
        assert_eq!(r.prefix_bit('o'), Some(4));
        assert_eq!(r.prefix_symbol_bit('@'), Some(4));
        assert_eq!(r.mode_for_symbol('%'), Some('h'));
        assert_eq!(r.symbol_for_mode('v'), Some('+'));
    }

    #[test]
    fn malformed_prefix_uses_default() {
        let mut r = ModeRegistry::new();
        assert!(r.register_prefix_modes(Some("(ov)@")).is_err());
        assert_eq!(r.prefix_modes(), "ohv");
        assert!(r.register_prefix_modes(Some("ov@+")).is_err());
        r.register_prefix_modes(Some("(qaov)~&@+")).unwrap();
        assert_eq!(r.prefix_bit('q'), Some(8));
        assert_eq!(r.classify('h'), ChanModeKind::Unknown);
    }

    #[test]
    fn prefix_rendering_orders_by_importance() {
        let r = ModeRegistry::new();
        let mask = r.prefix_bit('v').unwrap() | r.prefix_bit('o').unwrap();
        assert_eq!(r.prefix_string(mask), "@+");
        assert_eq!(r.prefix_mode_string(mask), "ov");
        assert_eq!(r.important_prefix(mask), Some('@'));
        assert_eq!(r.important_prefix(0), None);
    }

    #[test]
    fn unknown_boolean_modes_are_appended() {
        let mut r = ModeRegistry::new();
        r.register_chan_modes(Some("b,k,l,nt")).unwrap();
        assert_eq!(r.add_boolean_mode('Z'), Some(4));
        assert_eq!(r.classify('Z'), ChanModeKind::Boolean(4));
        assert_eq!(r.boolean_mode_string(1 | 4), "nZ");
    }

    #[test]
    fn bit_table_is_capped_at_64() {
        let mut r = ModeRegistry::new();
        r.register_chan_modes(Some("b,k,l,")).unwrap();
        let letters: Vec<char> = (0u32..64).filter_map(|i| char::from_u32(0x100 + i)).collect();
        for c in &letters {
            assert!(r.add_boolean_mode(*c).is_some());
        }
        assert_eq!(r.add_boolean_mode('x'), None);
    }
}

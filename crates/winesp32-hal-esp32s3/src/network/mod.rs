//! Wi-Fi connectivity state shared between the connection worker and UI.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use heapless::{String, Vec};
use winesp32_core::settings::{
    WIFI_MAX_ENTRIES, WIFI_PASSWORD_BYTES, WIFI_SSID_BYTES, WifiEntry,
};

const NO_NETWORK: u8 = u8::MAX;

/// High-level connectivity state for UI + logs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ConnectivityState {
    Disconnected = 0,
    Connecting = 1,
    LinkUpNoIp = 2,
    Connected = 3,
}

impl ConnectivityState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::LinkUpNoIp,
            3 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// One access point to try, copied out of the settings record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WifiCredentials {
    pub ssid: String<WIFI_SSID_BYTES>,
    pub password: String<WIFI_PASSWORD_BYTES>,
}

/// Valid saved networks, most recently saved first.
pub fn saved_networks(entries: &[WifiEntry]) -> Vec<WifiCredentials, WIFI_MAX_ENTRIES> {
    let mut out = Vec::new();
    for entry in entries.iter().rev().filter(|entry| entry.valid) {
        if entry.ssid.is_empty() {
            continue;
        }
        let _ = out.push(WifiCredentials {
            ssid: entry.ssid.clone(),
            password: entry.password.clone(),
        });
    }
    out
}

/// Immutable connectivity snapshot for the shell and board loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConnectivitySnapshot {
    pub state: ConnectivityState,
    pub link_up: bool,
    pub has_ipv4: bool,
    /// Index into the candidate list currently in use.
    pub network: Option<u8>,
    pub revision: u32,
}

impl ConnectivitySnapshot {
    pub const fn disconnected() -> Self {
        Self {
            state: ConnectivityState::Disconnected,
            link_up: false,
            has_ipv4: false,
            network: None,
            revision: 0,
        }
    }

    /// Connection definition for the tray icon: link + IPv4 config.
    pub const fn icon_connected(self) -> bool {
        self.link_up && self.has_ipv4
    }
}

/// Lock-free shared connectivity status.
#[derive(Debug)]
pub struct ConnectivityHandle {
    state: AtomicU8,
    link_up: AtomicBool,
    has_ipv4: AtomicBool,
    network: AtomicU8,
    revision: AtomicU32,
}

impl ConnectivityHandle {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectivityState::Disconnected as u8),
            link_up: AtomicBool::new(false),
            has_ipv4: AtomicBool::new(false),
            network: AtomicU8::new(NO_NETWORK),
            revision: AtomicU32::new(0),
        }
    }

    pub fn snapshot(&self) -> ConnectivitySnapshot {
        let network = self.network.load(Ordering::Acquire);
        ConnectivitySnapshot {
            state: ConnectivityState::from_raw(self.state.load(Ordering::Acquire)),
            link_up: self.link_up.load(Ordering::Acquire),
            has_ipv4: self.has_ipv4.load(Ordering::Acquire),
            network: (network != NO_NETWORK).then_some(network),
            revision: self.revision.load(Ordering::Acquire),
        }
    }

    pub fn mark_connecting(&self, network: u8) {
        let mut changed = self.network.swap(network, Ordering::AcqRel) != network;
        changed |= self.store_state(ConnectivityState::Connecting);
        if changed {
            self.bump_revision();
        }
    }

    pub fn mark_disconnected(&self) {
        let mut changed = false;
        changed |= self.store_bool(&self.link_up, false);
        changed |= self.store_bool(&self.has_ipv4, false);
        changed |= self.network.swap(NO_NETWORK, Ordering::AcqRel) != NO_NETWORK;
        changed |= self.store_state(ConnectivityState::Disconnected);
        if changed {
            self.bump_revision();
        }
    }

    pub fn update_link_ip(&self, link_up: bool, has_ipv4: bool) {
        let mut changed = false;
        changed |= self.store_bool(&self.link_up, link_up);
        changed |= self.store_bool(&self.has_ipv4, has_ipv4);
        changed |= self.store_state(Self::state_for(link_up, has_ipv4));

        if changed {
            self.bump_revision();
        }
    }

    fn state_for(link_up: bool, has_ipv4: bool) -> ConnectivityState {
        if !link_up {
            ConnectivityState::Disconnected
        } else if !has_ipv4 {
            ConnectivityState::LinkUpNoIp
        } else {
            ConnectivityState::Connected
        }
    }

    fn store_state(&self, next: ConnectivityState) -> bool {
        self.state.swap(next as u8, Ordering::AcqRel) != next as u8
    }

    fn store_bool(&self, cell: &AtomicBool, next: bool) -> bool {
        cell.swap(next, Ordering::AcqRel) != next
    }

    fn bump_revision(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for ConnectivityHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ssid: &str, valid: bool) -> WifiEntry {
        let mut out = WifiEntry::default();
        let _ = out.ssid.push_str(ssid);
        let _ = out.password.push_str("secret");
        out.valid = valid;
        out
    }

    #[test]
    fn saved_networks_newest_first_and_skips_invalid() {
        let entries = [
            entry("home", true),
            entry("stale", false),
            entry("", true),
            entry("office", true),
        ];
        let networks = saved_networks(&entries);
        let ssids: Vec<&str, WIFI_MAX_ENTRIES> =
            networks.iter().map(|network| network.ssid.as_str()).collect();
        assert_eq!(ssids.as_slice(), &["office", "home"]);
        assert_eq!(networks[0].password.as_str(), "secret");
    }

    #[test]
    fn revision_only_moves_on_change() {
        let handle = ConnectivityHandle::new();
        assert_eq!(handle.snapshot(), ConnectivitySnapshot::disconnected());

        handle.mark_connecting(1);
        handle.mark_connecting(1);
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, ConnectivityState::Connecting);
        assert_eq!(snapshot.network, Some(1));
        assert_eq!(snapshot.revision, 1);

        handle.update_link_ip(true, true);
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, ConnectivityState::Connected);
        assert!(snapshot.icon_connected());
        assert_eq!(snapshot.revision, 2);

        handle.mark_disconnected();
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, ConnectivityState::Disconnected);
        assert_eq!(snapshot.network, None);
        assert_eq!(snapshot.revision, 3);
    }
}

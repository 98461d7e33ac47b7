//! The channel table — one logical handle per peer.
//!
//! A channel starts `Undefined` and is promoted to `Realtime` only after a
//! mutual node-id handshake; until then it may only serve bootstrap
//! messages. Keepalive peer lists are filled with a random selection so the
//! whole network does not converge on the same neighbor set.

use rand::seq::SliceRandom;
use rand::thread_rng;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use weave_types::{Account, Timestamp};

/// What traffic a channel is allowed to carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelMode {
    /// Fresh connection, handshake not yet complete.
    Undefined,
    /// Handshake complete; carries votes, publishes and keepalives.
    Realtime,
    /// Dedicated bootstrap connection.
    Bootstrap,
}

/// Per-peer state.
#[derive(Clone, Debug)]
pub struct Channel {
    pub endpoint: SocketAddr,
    pub node_id: Option<Account>,
    pub protocol_version: u8,
    pub last_packet_received: Timestamp,
    pub mode: ChannelMode,
}

impl Channel {
    pub fn new(endpoint: SocketAddr, protocol_version: u8) -> Self {
        Self {
            endpoint,
            node_id: None,
            protocol_version,
            last_packet_received: Timestamp::now(),
            mode: ChannelMode::Undefined,
        }
    }
}

/// Registry of live channels, keyed by remote endpoint.
pub struct ChannelTable {
    channels: Mutex<HashMap<SocketAddr, Channel>>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, channel: Channel) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.insert(channel.endpoint, channel);
    }

    pub fn remove(&self, endpoint: &SocketAddr) -> Option<Channel> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.remove(endpoint)
    }

    pub fn get(&self, endpoint: &SocketAddr) -> Option<Channel> {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.get(endpoint).cloned()
    }

    pub fn contains(&self, endpoint: &SocketAddr) -> bool {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.contains_key(endpoint)
    }

    pub fn len(&self) -> usize {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record traffic on a channel.
    pub fn touch(&self, endpoint: &SocketAddr, now: Timestamp) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(channel) = channels.get_mut(endpoint) {
            channel.last_packet_received = now;
        }
    }

    /// Promote a channel to realtime after a completed handshake.
    pub fn promote(&self, endpoint: &SocketAddr, node_id: Account) -> bool {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        match channels.get_mut(endpoint) {
            Some(channel) => {
                channel.node_id = Some(node_id);
                channel.mode = ChannelMode::Realtime;
                true
            }
            None => false,
        }
    }

    /// All realtime endpoints.
    pub fn realtime(&self) -> Vec<SocketAddr> {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .values()
            .filter(|channel| channel.mode == ChannelMode::Realtime)
            .map(|channel| channel.endpoint)
            .collect()
    }

    /// Fill `slots` with a random selection of realtime peers (keepalive
    /// payload). Unfilled slots keep their current value.
    pub fn random_fill(&self, slots: &mut [SocketAddr]) {
        let mut peers = self.realtime();
        peers.shuffle(&mut thread_rng());
        for (slot, peer) in slots.iter_mut().zip(peers) {
            *slot = peer;
        }
    }

    /// Drop channels with no traffic since `cutoff`. Returns the evicted
    /// endpoints.
    pub fn prune_idle(&self, cutoff: Timestamp) -> Vec<SocketAddr> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let stale: Vec<SocketAddr> = channels
            .values()
            .filter(|channel| channel.last_packet_received < cutoff)
            .map(|channel| channel.endpoint)
            .collect();
        for endpoint in &stale {
            channels.remove(endpoint);
        }
        stale
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new()
    }
}

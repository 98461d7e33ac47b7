//! SYN cookie challenge-response for the node-id handshake.
//!
//! 1. We generate a random cookie for the connecting peer's endpoint
//! 2. The peer signs the cookie with its node key
//! 3. We verify the signature against the claimed node id
//!
//! Rate-limits per IP and caps total pending cookies to prevent memory
//! exhaustion.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;

use weave_crypto::verify_signature;
use weave_types::{Account, PublicKey, Signature, Timestamp};

struct CookieEntry {
    cookie: [u8; 32],
    created_at: Timestamp,
}

struct State {
    /// endpoint -> outstanding cookie
    pending: HashMap<SocketAddr, CookieEntry>,
    /// ip -> (count, window start)
    rate_limits: HashMap<IpAddr, (u32, Timestamp)>,
}

pub struct SynCookies {
    state: Mutex<State>,
    max_pending: usize,
    cookie_ttl_secs: u64,
    max_per_ip_per_min: u32,
}

impl SynCookies {
    pub fn new(max_pending: usize, cookie_ttl_secs: u64, max_per_ip_per_min: u32) -> Self {
        Self {
            state: Mutex::new(State {
                pending: HashMap::new(),
                rate_limits: HashMap::new(),
            }),
            max_pending,
            cookie_ttl_secs,
            max_per_ip_per_min,
        }
    }

    /// Defaults matching the handshake timeout: 10k outstanding, 30 s TTL,
    /// 16 cookies per IP per minute.
    pub fn with_defaults() -> Self {
        Self::new(10_000, 30, 16)
    }

    /// Generate a cookie for a connecting endpoint. Returns `None` if the
    /// per-IP rate limit is exceeded or the table is full.
    pub fn assign(&self, endpoint: &SocketAddr) -> Option<[u8; 32]> {
        let now = Timestamp::now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let (count, window_start) = state
            .rate_limits
            .entry(endpoint.ip())
            .or_insert((0, now));
        if now.as_secs().saturating_sub(window_start.as_secs()) < 60 {
            if *count >= self.max_per_ip_per_min {
                return None;
            }
            *count += 1;
        } else {
            *window_start = now;
            *count = 1;
        }

        let ttl = self.cookie_ttl_secs;
        state
            .pending
            .retain(|_, entry| !entry.created_at.has_expired(ttl, now));
        if state.pending.len() >= self.max_pending {
            return None;
        }

        let mut cookie = [0u8; 32];
        getrandom::getrandom(&mut cookie).ok()?;
        state.pending.insert(
            *endpoint,
            CookieEntry {
                cookie,
                created_at: now,
            },
        );
        Some(cookie)
    }

    /// The outstanding cookie for an endpoint, if any (used when we are the
    /// initiator and must echo our query in a follow-up).
    pub fn cookie(&self, endpoint: &SocketAddr) -> Option<[u8; 32]> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.pending.get(endpoint).map(|entry| entry.cookie)
    }

    /// Verify a peer's signed cookie response. Consumes the cookie.
    pub fn validate(
        &self,
        endpoint: &SocketAddr,
        node_id: &Account,
        signature: &Signature,
    ) -> bool {
        let entry = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match state.pending.remove(endpoint) {
                Some(entry) => entry,
                None => return false,
            }
        };
        if entry.created_at.has_expired(self.cookie_ttl_secs, Timestamp::now()) {
            return false;
        }
        verify_signature(&entry.cookie, signature, &PublicKey::from(*node_id))
    }

    pub fn pending_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.pending.len()
    }
}

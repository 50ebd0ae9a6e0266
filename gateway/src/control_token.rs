// gateway/src/control_token.rs
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Lifetime of a control socket ticket
pub const CONTROL_TOKEN_TTL_SECS: i64 = 30;

/// Single-use tickets for opening the control socket.
///
/// WebSocket handshakes carry no Referer, so the main frame first fetches a
/// ticket with a request that passed the Referer check and presents it on
/// the handshake.
#[derive(Debug)]
pub struct ControlTokenStore {
    tokens: DashMap<String, DateTime<Utc>>,
    ttl: Duration,
}

impl Default for ControlTokenStore {
    fn default() -> Self {
        Self::new(CONTROL_TOKEN_TTL_SECS)
    }
}

impl ControlTokenStore {
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            tokens: DashMap::new(),
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// New ticket and its expiry
    pub fn issue(&self) -> (String, DateTime<Utc>) {
        let token = Uuid::new_v4().simple().to_string();
        let expires_at = Utc::now() + self.ttl;
        self.tokens.insert(token.clone(), expires_at);
        (token, expires_at)
    }

    /// Consume `token`; true only the first time and before expiry
    pub fn redeem(&self, token: &str) -> bool {
        match self.tokens.remove(token) {
            Some((_, expires_at)) => Utc::now() <= expires_at,
            None => false,
        }
    }

    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut purged = 0;
        self.tokens.retain(|_, expires_at| {
            let live = *expires_at >= now;
            if !live {
                purged += 1;
            }
            live
        });
        purged
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

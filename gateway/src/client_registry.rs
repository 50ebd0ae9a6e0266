// gateway/src/client_registry.rs
use chrono::{DateTime, Utc};
use common::embed::paths::{extract_app_from_path, EMBED_PREFIX};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

/// App ownership of one browser client (iframe document or worker)
#[derive(Debug, Clone)]
pub struct ClientEntry {
    pub app_name: String,
    pub registered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl ClientEntry {
    fn new(app_name: &str) -> Self {
        let now = Utc::now();
        Self {
            app_name: app_name.to_string(),
            registered_at: now,
            last_seen: now,
        }
    }

    /// Check if the entry has been idle longer than the TTL
    pub fn is_idle(&self, ttl_seconds: i64) -> bool {
        Utc::now().signed_duration_since(self.last_seen).num_seconds() > ttl_seconds
    }
}

/// Registry metrics
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryMetrics {
    pub tracked_clients: usize,
    pub registrations: u64,
    pub removals: u64,
    pub evictions: u64,
}

/// Maps client identifiers to the app that owns them.
///
/// A match here is authoritative: it beats the reserved-segment rules of the
/// path classifier.
#[derive(Debug, Default)]
pub struct ClientAppRegistry {
    clients: DashMap<String, ClientEntry>,
    registrations: AtomicU64,
    removals: AtomicU64,
    evictions: AtomicU64,
}

impl ClientAppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, client_id: &str, app_name: &str) {
        if client_id.is_empty() {
            return;
        }
        self.clients.insert(client_id.to_string(), ClientEntry::new(app_name));
        self.registrations.fetch_add(1, Ordering::Relaxed);
        tracing::info!("Registered client {} for app {}", client_id, app_name);
    }

    /// Owning app of `client_id`; refreshes its activity timestamp
    pub fn lookup(&self, client_id: &str) -> Option<String> {
        let mut entry = self.clients.get_mut(client_id)?;
        entry.last_seen = Utc::now();
        Some(entry.app_name.clone())
    }

    pub fn unregister(&self, client_id: &str) -> Option<String> {
        let (_, entry) = self.clients.remove(client_id)?;
        self.removals.fetch_add(1, Ordering::Relaxed);
        tracing::info!("Client {} left app {}", client_id, entry.app_name);
        Some(entry.app_name)
    }

    /// App named by a same-origin Referer's `/embed/{app}` or `/apps/{app}`
    /// path. Malformed referers count as no match.
    pub fn lookup_from_referer(referer: &str, origin: &Url) -> Option<String> {
        let referer = Url::parse(referer).ok()?;
        if referer.origin() != origin.origin() {
            return None;
        }
        extract_app_from_path(referer.path()).map(str::to_string)
    }

    /// App whose document sent a same-origin Referer inside `/embed/{app}/`.
    ///
    /// Unlike `/apps/{app}` (the main frame's own page), such a Referer can
    /// only come from the app itself, so it is as strong as a client match.
    pub fn embed_owner_from_referer(referer: &str, origin: &Url) -> Option<String> {
        let referer = Url::parse(referer).ok()?;
        if referer.origin() != origin.origin() || !referer.path().starts_with(EMBED_PREFIX) {
            return None;
        }
        extract_app_from_path(referer.path()).map(str::to_string)
    }

    /// Remove clients idle longer than `ttl_seconds`
    pub fn cleanup_idle(&self, ttl_seconds: i64) -> usize {
        let mut evicted = 0;
        self.clients.retain(|_, entry| {
            let idle = entry.is_idle(ttl_seconds);
            if idle {
                evicted += 1;
            }
            !idle
        });
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn metrics(&self) -> RegistryMetrics {
        RegistryMetrics {
            tracked_clients: self.clients.len(),
            registrations: self.registrations.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

//! Anti-forgery state tokens for in-progress authorizations
//!
//! A state is minted when the authorization URL is handed out and must come
//! back unchanged on the callback. `consume` is a single locked remove, so two
//! racing callbacks carrying the same state cannot both succeed.
//!
//! Entries older than the TTL are rejected on consume and swept lazily on
//! issue, so abandoned authorizations do not accumulate.

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Maximum age of a pending state before it is rejected.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(600);

/// Generate a cryptographically random state token.
///
/// 32 random bytes (256 bits) encoded as URL-safe base64 without padding,
/// 43 characters.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub struct PendingAuthRegistry {
    ttl: Duration,
    pending: Mutex<HashMap<String, Instant>>,
}

impl PendingAuthRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Mint a state token and record it as pending.
    pub async fn issue(&self) -> String {
        let state = generate_state();
        let mut pending = self.pending.lock().await;
        // Lazy cleanup: remove expired entries while holding the lock
        let ttl = self.ttl;
        pending.retain(|_, created_at| created_at.elapsed() < ttl);
        pending.insert(state.clone(), Instant::now());
        debug!(pending = pending.len(), "authorization state issued");
        state
    }

    /// Remove `state` and report whether it was pending and unexpired.
    ///
    /// Unknown, already-consumed, and expired states all return false.
    pub async fn consume(&self, state: &str) -> bool {
        let created_at = {
            let mut pending = self.pending.lock().await;
            pending.remove(state)
        };
        match created_at {
            Some(created_at) if created_at.elapsed() < self.ttl => true,
            Some(created_at) => {
                debug!(
                    age_secs = created_at.elapsed().as_secs(),
                    "authorization state expired"
                );
                false
            }
            None => false,
        }
    }

    /// Number of unexpired pending states.
    pub async fn len(&self) -> usize {
        let pending = self.pending.lock().await;
        pending
            .values()
            .filter(|created_at| created_at.elapsed() < self.ttl)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for PendingAuthRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_TTL)
    }
}

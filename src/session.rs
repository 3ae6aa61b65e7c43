//! Session issuance and validation.

use crate::clock::{Clock, RandomSource, Timestamp, MAX_UNIQUE_DRAWS};
use crate::error::{HandshakeError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Minimum random bytes behind a session token.
pub const MIN_TOKEN_BYTES: usize = 32;

/// Session granted after a successful handshake verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub handshake_id: String,
    pub requester_id: String,
    pub responder_id: String,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Session {
    /// Valid strictly before `expires_at`.
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }

    /// Short token prefix safe to put in logs.
    pub fn token_hint(&self) -> &str {
        token_hint(&self.token)
    }
}

pub(crate) fn token_hint(token: &str) -> &str {
    let end = token
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(token.len());
    &token[..end]
}

/// Issues time-bounded session tokens and answers validity checks.
///
/// Expired sessions stay in the store and are rejected on lookup.
pub struct SessionIssuer {
    sessions: DashMap<String, Session>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    token_bytes: usize,
}

impl SessionIssuer {
    pub fn new(clock: Arc<dyn Clock>, random: Arc<dyn RandomSource>, token_bytes: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
            random,
            token_bytes: token_bytes.max(MIN_TOKEN_BYTES),
        }
    }

    /// Issue a new session expiring `ttl` from now.
    ///
    /// Fails with `Conflict` if the random source keeps producing tokens that
    /// are already stored.
    pub fn issue(
        &self,
        handshake_id: &str,
        requester_id: &str,
        responder_id: &str,
        ttl: Duration,
    ) -> Result<Session> {
        for _ in 0..MAX_UNIQUE_DRAWS {
            let token = URL_SAFE_NO_PAD.encode(self.random.bytes(self.token_bytes));
            // Redraw rather than overwrite.
            if let Entry::Vacant(slot) = self.sessions.entry(token.clone()) {
                let created_at = self.clock.now();
                let session = Session {
                    token,
                    handshake_id: handshake_id.to_string(),
                    requester_id: requester_id.to_string(),
                    responder_id: responder_id.to_string(),
                    created_at,
                    expires_at: created_at.saturating_add(ttl),
                };
                slot.insert(session.clone());
                debug!(
                    handshake_id = %handshake_id,
                    token = %session.token_hint(),
                    "Session issued"
                );
                return Ok(session);
            }
        }
        warn!(handshake_id = %handshake_id, "Random source kept repeating session tokens");
        Err(HandshakeError::unique_id_exhausted("session token"))
    }

    /// True if the token exists and has not expired. Never extends expiry.
    pub fn is_valid(&self, token: &str) -> bool {
        let now = self.clock.now();
        self.sessions
            .get(token)
            .map(|s| s.is_valid_at(now))
            .unwrap_or(false)
    }

    /// Resolve a token to its session, rejecting unknown or expired ones.
    pub fn authorize(&self, token: &str) -> Result<Session> {
        let session = self
            .sessions
            .get(token)
            .map(|s| s.value().clone())
            .ok_or_else(HandshakeError::session_not_found)?;

        if !session.is_valid_at(self.clock.now()) {
            return Err(HandshakeError::Unauthorized("session expired".to_string()));
        }
        Ok(session)
    }

    /// Look up a session regardless of expiry.
    pub fn get(&self, token: &str) -> Option<Session> {
        self.sessions.get(token).map(|s| s.value().clone())
    }

    /// Number of stored sessions, expired ones included.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

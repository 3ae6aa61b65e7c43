//! Handshake records and their store.
//!
//! Status only moves forward:
//!
//! ```text
//! pending ──► responded ──► verified
//!    └──────► failed
//! ```
//!
//! All mutation goes through [`HandshakeStore::update`], which runs the caller's
//! closure under the entry's write guard, so concurrent read-modify-write
//! sequences on one handshake are serialized.

use crate::clock::{Clock, RandomSource, Timestamp, MAX_UNIQUE_DRAWS};
use crate::error::{HandshakeError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Handshake lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeStatus {
    #[default]
    Pending,
    Responded,
    Failed,
    Verified,
}

impl HandshakeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandshakeStatus::Pending => "pending",
            HandshakeStatus::Responded => "responded",
            HandshakeStatus::Failed => "failed",
            HandshakeStatus::Verified => "verified",
        }
    }

    /// Returns true if `next` is a legal forward transition from `self`.
    pub fn can_advance_to(&self, next: HandshakeStatus) -> bool {
        use HandshakeStatus::*;
        matches!(
            (self, next),
            (Pending, Responded) | (Pending, Failed) | (Responded, Verified)
        )
    }
}

/// One challenge-response exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    pub handshake_id: String,
    pub requester_id: String,
    pub responder_id: String,
    /// Challenge the responder signs. Fixed at creation.
    pub nonce: String,
    pub created_at: Timestamp,
    pub status: HandshakeStatus,
    pub signature: Option<String>,
    pub signature_valid: Option<bool>,
    pub response_time: Option<Timestamp>,
    pub verified_at: Option<Timestamp>,
}

impl Handshake {
    fn new(
        handshake_id: String,
        requester_id: &str,
        responder_id: &str,
        nonce: String,
        created_at: Timestamp,
    ) -> Self {
        Self {
            handshake_id,
            requester_id: requester_id.to_string(),
            responder_id: responder_id.to_string(),
            nonce,
            created_at,
            status: HandshakeStatus::Pending,
            signature: None,
            signature_valid: None,
            response_time: None,
            verified_at: None,
        }
    }

    fn advance(&mut self, next: HandshakeStatus) -> Result<()> {
        if !self.status.can_advance_to(next) {
            return Err(HandshakeError::Conflict(format!(
                "handshake {} is {}, cannot become {}",
                self.handshake_id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Record the responder's signature and verdict. Only legal while pending.
    pub(crate) fn record_response(
        &mut self,
        signature: &str,
        signature_valid: bool,
        at: Timestamp,
    ) -> Result<()> {
        let next = if signature_valid {
            HandshakeStatus::Responded
        } else {
            HandshakeStatus::Failed
        };
        self.advance(next)?;
        self.signature = Some(signature.to_string());
        self.signature_valid = Some(signature_valid);
        self.response_time = Some(at);
        Ok(())
    }

    /// Check that [`Handshake::mark_verified`] would succeed.
    ///
    /// Already-verified handshakes are a `Conflict`; anything without a valid
    /// signature is `Unauthorized`.
    pub(crate) fn ensure_verifiable(&self) -> Result<()> {
        if self.status == HandshakeStatus::Verified {
            return Err(HandshakeError::Conflict(format!(
                "handshake {} is already verified",
                self.handshake_id
            )));
        }
        if self.signature_valid != Some(true) {
            let reason = match self.signature_valid {
                Some(false) => "invalid signature",
                _ => "handshake has not been signed",
            };
            return Err(HandshakeError::Unauthorized(reason.to_string()));
        }
        Ok(())
    }

    /// Mark the handshake verified.
    pub(crate) fn mark_verified(&mut self, at: Timestamp) -> Result<()> {
        self.ensure_verifiable()?;
        self.advance(HandshakeStatus::Verified)?;
        self.verified_at = Some(at);
        Ok(())
    }
}

/// Keyed handshake store with per-entry write serialization.
#[derive(Default)]
pub struct HandshakeStore {
    handshakes: DashMap<String, Handshake>,
}

impl HandshakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a pending handshake with a fresh id and nonce.
    ///
    /// Fails with `Conflict` if the random source keeps producing ids that
    /// are already stored.
    pub fn create(
        &self,
        requester_id: &str,
        responder_id: &str,
        clock: &dyn Clock,
        random: &dyn RandomSource,
        id_bytes: usize,
        nonce_bytes: usize,
    ) -> Result<Handshake> {
        for _ in 0..MAX_UNIQUE_DRAWS {
            let handshake_id = hex::encode(random.bytes(id_bytes));
            if let Entry::Vacant(slot) = self.handshakes.entry(handshake_id.clone()) {
                let handshake = Handshake::new(
                    handshake_id,
                    requester_id,
                    responder_id,
                    hex::encode(random.bytes(nonce_bytes)),
                    clock.now(),
                );
                slot.insert(handshake.clone());
                return Ok(handshake);
            }
        }
        Err(HandshakeError::unique_id_exhausted("handshake id"))
    }

    /// Snapshot of a handshake.
    pub fn get(&self, handshake_id: &str) -> Option<Handshake> {
        self.handshakes.get(handshake_id).map(|h| h.value().clone())
    }

    /// Run `f` against the handshake while holding its write guard.
    ///
    /// `f` must not touch this store again; the guard is held for its whole
    /// duration.
    pub fn update<T>(
        &self,
        handshake_id: &str,
        f: impl FnOnce(&mut Handshake) -> Result<T>,
    ) -> Result<T> {
        let mut entry = self
            .handshakes
            .get_mut(handshake_id)
            .ok_or_else(|| HandshakeError::handshake_not_found(handshake_id))?;
        f(entry.value_mut())
    }

    /// Remove pending handshakes created before `cutoff`. Returns how many.
    pub fn remove_pending_before(&self, cutoff: Timestamp) -> usize {
        let before = self.handshakes.len();
        self.handshakes
            .retain(|_, h| !(h.status == HandshakeStatus::Pending && h.created_at < cutoff));
        before.saturating_sub(self.handshakes.len())
    }

    pub fn count_with_status(&self, status: HandshakeStatus) -> usize {
        self.handshakes
            .iter()
            .filter(|h| h.status == status)
            .count()
    }

    pub fn len(&self) -> usize {
        self.handshakes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handshakes.is_empty()
    }
}

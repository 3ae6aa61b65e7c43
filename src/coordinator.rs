//! Handshake coordinator.
//!
//! Owns the handshake and session stores and drives the challenge-response
//! lifecycle. This is the only surface the transport layer calls into.

use crate::clock::{Clock, OsRandom, RandomSource, SystemClock, Timestamp};
use crate::config::HandshakeGuardConfig;
use crate::error::{HandshakeError, Result};
use crate::handshake::{Handshake, HandshakeStatus, HandshakeStore};
use crate::model::{LabeledSample, ModelError, ThresholdModel, ThresholdSet};
use crate::registry::AgentDirectory;
use crate::score::{AnomalyReport, AnomalyScorer, FeatureVector, RiskLevel};
use crate::session::{Session, SessionIssuer};
use crate::signature;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of a respond call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondOutcome {
    pub handshake_id: String,
    pub signature_valid: bool,
    pub status: HandshakeStatus,
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedHandshake {
    pub handshake_id: String,
    pub session_token: String,
    pub anomaly_score: f64,
    pub expires_at: Timestamp,
    pub explanation: String,
}

/// Result of an anomaly check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyCheck {
    pub handshake_id: String,
    pub anomaly_score: f64,
    pub is_anomaly: bool,
    pub risk_level: RiskLevel,
    pub features: FeatureVector,
    pub explanation: String,
}

impl AnomalyCheck {
    fn from_report(handshake_id: &str, report: AnomalyReport) -> Self {
        Self {
            handshake_id: handshake_id.to_string(),
            anomaly_score: report.score,
            is_anomaly: report.is_anomaly,
            risk_level: report.risk_level,
            features: report.features,
            explanation: report.explanation,
        }
    }
}

/// Store counts for health reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    /// Registered agents, when the directory can count them
    pub agents: Option<usize>,
    pub handshakes: usize,
    pub pending_handshakes: usize,
    pub sessions: usize,
    pub model_calibrated: bool,
}

/// Handshake lifecycle coordinator.
pub struct HandshakeCoordinator {
    config: HandshakeGuardConfig,
    directory: Arc<dyn AgentDirectory>,
    handshakes: HandshakeStore,
    sessions: SessionIssuer,
    scorer: AnomalyScorer,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl HandshakeCoordinator {
    /// Create a coordinator on the system clock and OS randomness.
    ///
    /// Loads the threshold model from `scoring.model_path` when configured.
    pub fn new(
        config: HandshakeGuardConfig,
        directory: Arc<dyn AgentDirectory>,
    ) -> anyhow::Result<Self> {
        let model = match &config.scoring.model_path {
            Some(path) => ThresholdModel::load_or_default(path)?,
            None => ThresholdModel::default(),
        };
        Self::with_parts(
            config,
            directory,
            Arc::new(model),
            Arc::new(SystemClock::new()),
            Arc::new(OsRandom),
        )
    }

    /// Create a coordinator from explicit collaborators.
    pub fn with_parts(
        config: HandshakeGuardConfig,
        directory: Arc<dyn AgentDirectory>,
        model: Arc<ThresholdModel>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let sessions = SessionIssuer::new(
            Arc::clone(&clock),
            Arc::clone(&random),
            config.session.token_bytes,
        );
        let scorer = AnomalyScorer::new(model, config.scoring.anomaly_threshold);

        Ok(Self {
            config,
            directory,
            handshakes: HandshakeStore::new(),
            sessions,
            scorer,
            clock,
            random,
        })
    }

    /// Open a handshake towards a registered responder.
    pub fn start(&self, requester_id: &str, responder_id: &str) -> Result<Handshake> {
        if !self.directory.exists(responder_id) {
            warn!(
                requester_id = %requester_id,
                responder_id = %responder_id,
                "Handshake requested for unknown responder"
            );
            return Err(HandshakeError::agent_not_found(responder_id));
        }

        let handshake = self.handshakes.create(
            requester_id,
            responder_id,
            self.clock.as_ref(),
            self.random.as_ref(),
            self.config.handshake.id_bytes,
            self.config.handshake.nonce_bytes,
        )?;

        info!(
            handshake_id = %handshake.handshake_id,
            requester_id = %requester_id,
            responder_id = %responder_id,
            "Handshake started"
        );
        Ok(handshake)
    }

    /// Record a responder's signature over the handshake nonce.
    ///
    /// The signature is checked against the key of the handshake's responder.
    /// A caller claiming a different responder id is recorded as an invalid
    /// signature. Only pending handshakes accept a response.
    pub fn respond(
        &self,
        handshake_id: &str,
        signature: &str,
        responder_id: &str,
    ) -> Result<RespondOutcome> {
        let outcome = self.handshakes.update(handshake_id, |h| {
            let credentials = self
                .directory
                .get(responder_id)
                .ok_or_else(|| HandshakeError::agent_not_found(responder_id))?;

            let claimed_matches = h.responder_id == responder_id;
            let signature_valid = claimed_matches
                && signature::verify(h.nonce.as_bytes(), signature, &credentials.secret_key);

            h.record_response(signature, signature_valid, self.clock.now())?;

            if !claimed_matches {
                warn!(
                    handshake_id = %handshake_id,
                    expected = %h.responder_id,
                    claimed = %responder_id,
                    "Response from an agent other than the challenged responder"
                );
            }

            Ok(RespondOutcome {
                handshake_id: h.handshake_id.clone(),
                signature_valid,
                status: h.status,
            })
        });

        match &outcome {
            Ok(o) if o.signature_valid => info!(
                handshake_id = %handshake_id,
                responder_id = %responder_id,
                "Handshake response accepted"
            ),
            Ok(_) => warn!(
                handshake_id = %handshake_id,
                responder_id = %responder_id,
                "Handshake response failed signature verification"
            ),
            Err(e) => warn!(handshake_id = %handshake_id, error = %e, "Handshake response rejected"),
        }
        outcome
    }

    /// Verify a responded handshake, issue its session and score it.
    ///
    /// A handshake verifies at most once; later calls are a `Conflict`.
    pub fn verify(&self, handshake_id: &str) -> Result<VerifiedHandshake> {
        let result = self.handshakes.update(handshake_id, |h| {
            let now = self.clock.now();
            // Nothing is recorded unless a session was issued.
            h.ensure_verifiable()?;
            let session = self.sessions.issue(
                &h.handshake_id,
                &h.requester_id,
                &h.responder_id,
                self.config.session.ttl(),
            )?;
            h.mark_verified(now)?;

            let features = self.scorer.extract_features(h, now);
            Ok((session, self.scorer.assess(&features)))
        });

        let (session, report) = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(handshake_id = %handshake_id, error = %e, "Handshake verification refused");
                return Err(e);
            }
        };

        debug!(
            handshake_id = %handshake_id,
            latency_ms = report.features.response_latency_ms,
            entropy = report.features.message_entropy,
            duration_ms = report.features.handshake_duration_ms,
            "Handshake features"
        );
        info!(
            handshake_id = %handshake_id,
            token = %session.token_hint(),
            anomaly_score = report.score,
            risk = report.risk_level.as_str(),
            "Handshake verified"
        );
        if report.is_anomaly {
            warn!(
                handshake_id = %handshake_id,
                anomaly_score = report.score,
                explanation = %report.explanation,
                "Verified handshake looks anomalous"
            );
        }

        Ok(VerifiedHandshake {
            handshake_id: handshake_id.to_string(),
            session_token: session.token,
            anomaly_score: report.score,
            expires_at: session.expires_at,
            explanation: report.explanation,
        })
    }

    /// Score a handshake in whatever state it is in.
    pub fn check_anomaly(&self, handshake_id: &str) -> Result<AnomalyCheck> {
        let handshake = self
            .handshakes
            .get(handshake_id)
            .ok_or_else(|| HandshakeError::handshake_not_found(handshake_id))?;

        let features = self.scorer.extract_features(&handshake, self.clock.now());
        let report = self.scorer.assess(&features);
        debug!(
            handshake_id = %handshake_id,
            anomaly_score = report.score,
            is_anomaly = report.is_anomaly,
            "Anomaly check"
        );
        Ok(AnomalyCheck::from_report(handshake_id, report))
    }

    /// Snapshot of a handshake.
    pub fn handshake(&self, handshake_id: &str) -> Option<Handshake> {
        self.handshakes.get(handshake_id)
    }

    /// Resolve a session token, rejecting unknown or expired ones.
    pub fn authorize_session(&self, token: &str) -> Result<Session> {
        self.sessions.authorize(token)
    }

    pub fn is_session_valid(&self, token: &str) -> bool {
        self.sessions.is_valid(token)
    }

    /// Recalibrate the scorer's threshold model.
    pub fn calibrate(&self, samples: &[LabeledSample]) -> std::result::Result<ThresholdSet, ModelError> {
        self.scorer.model().calibrate(samples)
    }

    pub fn scorer(&self) -> &AnomalyScorer {
        &self.scorer
    }

    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            agents: self.directory.count(),
            handshakes: self.handshakes.len(),
            pending_handshakes: self.handshakes.count_with_status(HandshakeStatus::Pending),
            sessions: self.sessions.len(),
            model_calibrated: self.scorer.model().is_calibrated(),
        }
    }

    /// Drop pending handshakes older than the configured TTL.
    ///
    /// Does nothing when no TTL is configured.
    pub fn sweep_pending(&self) -> usize {
        let Some(ttl) = self.config.handshake.pending_ttl() else {
            return 0;
        };
        let cutoff = self.clock.now().saturating_sub(ttl);
        let removed = self.handshakes.remove_pending_before(cutoff);
        if removed > 0 {
            info!(removed, "Expired pending handshakes");
        }
        removed
    }

    /// Run [`HandshakeCoordinator::sweep_pending`] on an interval.
    ///
    /// Returns `None` when no pending TTL is configured. The task stops once
    /// the coordinator is dropped. Must be called inside a tokio runtime.
    pub fn spawn_pending_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        self.config.handshake.pending_ttl()?;
        let period = Duration::from_secs(self.config.handshake.sweep_interval_seconds);
        let coordinator: Weak<Self> = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match coordinator.upgrade() {
                    Some(c) => {
                        c.sweep_pending();
                    }
                    None => break,
                }
            }
            debug!("Pending handshake sweeper stopped");
        }))
    }
}

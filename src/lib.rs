//! Agent handshake guard
//!
//! Challenge-response handshakes between registered agents, session issuance
//! on success, and rule-based anomaly scoring of each exchange.
//!
//! # Features
//!
//! - HMAC-SHA256 signatures over random nonces, compared in constant time
//! - Strict handshake lifecycle: pending, responded or failed, verified
//! - Expiring session tokens issued once per verified handshake
//! - Anomaly scoring on latency, signature entropy and duration
//! - Threshold calibration from labeled samples, persisted as JSON
//! - Synthetic labeled handshakes for bootstrapping calibration
//!
//! # Example
//!
//! ```ignore
//! use handshake_guard::{AgentRegistry, AgentType, HandshakeCoordinator, HandshakeGuardConfig};
//!
//! let registry = Arc::new(AgentRegistry::new(clock, random));
//! registry.register("agent_b", AgentType::Genuine, Some(key.clone()))?;
//!
//! let coordinator = HandshakeCoordinator::new(HandshakeGuardConfig::default(), registry)?;
//! let hs = coordinator.start("agent_a", "agent_b")?;
//! coordinator.respond(&hs.handshake_id, &sign(hs.nonce.as_bytes(), &key), "agent_b")?;
//! let verified = coordinator.verify(&hs.handshake_id)?;
//! ```

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handshake;
pub mod model;
pub mod registry;
pub mod score;
pub mod session;
pub mod signature;
pub mod training;

pub use clock::{Clock, ManualClock, OsRandom, RandomSource, SystemClock, Timestamp};
pub use config::HandshakeGuardConfig;
pub use coordinator::{
    AnomalyCheck, CoordinatorStatus, HandshakeCoordinator, RespondOutcome, VerifiedHandshake,
};
pub use error::{HandshakeError, Result};
pub use handshake::{Handshake, HandshakeStatus};
pub use model::{LabeledSample, ModelError, ThresholdModel, ThresholdSet};
pub use registry::{AgentDirectory, AgentRegistry, AgentType};
pub use score::{AnomalyReport, AnomalyScorer, FeatureVector, RiskLevel};
pub use session::Session;
pub use signature::{sign, verify, SecretKey};
pub use training::{generate_samples, ClassSummary, FraudKind};

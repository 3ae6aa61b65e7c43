//! Configuration types for the handshake guard.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeGuardConfig {
    /// Session issuance settings
    pub session: SessionConfig,

    /// Handshake identifiers and pending-handshake expiry
    pub handshake: HandshakeConfig,

    /// Anomaly scoring settings
    pub scoring: ScoringConfig,
}

impl HandshakeGuardConfig {
    /// Load from a JSON or YAML file, chosen by extension.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = if path.extension().is_some_and(|e| e == "yaml" || e == "yml") {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Ok(config)
    }

    /// Apply `SESSION_TIMEOUT`, `ANOMALY_THRESHOLD` and `ML_MODEL_PATH`.
    pub fn with_env_overrides(self) -> anyhow::Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        if let Some(ttl) = lookup("SESSION_TIMEOUT") {
            self.session.ttl_seconds = ttl
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("SESSION_TIMEOUT: {}", e))?;
        }
        if let Some(threshold) = lookup("ANOMALY_THRESHOLD") {
            self.scoring.anomaly_threshold = threshold
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("ANOMALY_THRESHOLD: {}", e))?;
        }
        if let Some(path) = lookup("ML_MODEL_PATH") {
            self.scoring.model_path = Some(PathBuf::from(path));
        }
        Ok(self)
    }

    /// Reject settings that would weaken tokens or break scoring.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.session.ttl_seconds > 0,
            "session.ttl_seconds must be positive"
        );
        anyhow::ensure!(
            self.session.token_bytes >= 32,
            "session.token_bytes must be at least 32"
        );
        anyhow::ensure!(
            self.handshake.id_bytes >= 16 && self.handshake.nonce_bytes >= 16,
            "handshake id and nonce need at least 16 random bytes"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.scoring.anomaly_threshold),
            "scoring.anomaly_threshold must be within [0, 1]"
        );
        if let Some(ttl) = self.handshake.pending_ttl_seconds {
            anyhow::ensure!(ttl > 0, "handshake.pending_ttl_seconds must be positive");
            anyhow::ensure!(
                self.handshake.sweep_interval_seconds > 0,
                "handshake.sweep_interval_seconds must be positive"
            );
        }
        Ok(())
    }
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session lifetime in seconds
    pub ttl_seconds: u64,

    /// Random bytes per session token
    pub token_bytes: usize,
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            token_bytes: 32,
        }
    }
}

/// Handshake settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Random bytes per handshake id
    pub id_bytes: usize,

    /// Random bytes per nonce
    pub nonce_bytes: usize,

    /// Drop pending handshakes older than this. Unset means they never expire.
    pub pending_ttl_seconds: Option<u64>,

    /// How often the background sweeper runs
    pub sweep_interval_seconds: u64,
}

impl HandshakeConfig {
    pub fn pending_ttl(&self) -> Option<Duration> {
        self.pending_ttl_seconds.map(Duration::from_secs)
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            id_bytes: 16,
            nonce_bytes: 16,
            pending_ttl_seconds: None,
            sweep_interval_seconds: 60,
        }
    }
}

/// Scoring settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Scores strictly above this are anomalies
    pub anomaly_threshold: f64,

    /// Threshold model file; defaults are used when unset or missing
    pub model_path: Option<PathBuf>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            anomaly_threshold: 0.5,
            model_path: None,
        }
    }
}

//! Calibrated normal ranges for the handshake features.
//!
//! Calibration keeps only the non-fraud samples and derives asymmetric bounds
//! from their mean and sample standard deviation: −2σ below, +3σ above.
//! Scoring reads an immutable [`ThresholdSet`] snapshot; calibration swaps in a
//! new one under a write lock.

use crate::score::FeatureVector;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Model file format version.
pub const MODEL_VERSION: &str = "1.0";

const LATENCY_FLOOR_MS: f64 = 10.0;
const DURATION_FLOOR_MS: f64 = 50.0;
const ENTROPY_FLOOR_BITS: f64 = 1.0;

// σ used when a feature has a single sample or no spread at all.
const LATENCY_FALLBACK_STD: f64 = 50.0;
const DURATION_FALLBACK_STD: f64 = 100.0;
const ENTROPY_FALLBACK_STD: f64 = 0.5;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("calibration needs at least one usable non-fraud sample")]
    NoNormalSamples,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported model version: {0}")]
    UnsupportedVersion(String),
}

/// Inclusive normal range for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalRange {
    pub min: f64,
    pub max: f64,
}

impl NormalRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Per-feature thresholds consulted by the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub response_latency_ms: NormalRange,
    pub handshake_duration_ms: NormalRange,
    pub min_message_entropy: f64,
}

impl Default for ThresholdSet {
    /// Bounds for a normal population of latency ≈ N(150, 30) ms,
    /// duration ≈ N(200, 50) ms and entropy ≈ N(3.5, 0.5) bits.
    fn default() -> Self {
        Self {
            response_latency_ms: NormalRange::new(90.0, 240.0),
            handshake_duration_ms: NormalRange::new(100.0, 350.0),
            min_message_entropy: 2.5,
        }
    }
}

/// Feature vector labeled as fraudulent or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    #[serde(flatten)]
    pub features: FeatureVector,
    #[serde(default)]
    pub is_fraud: bool,
}

impl LabeledSample {
    pub fn normal(features: FeatureVector) -> Self {
        Self {
            features,
            is_fraud: false,
        }
    }

    pub fn fraud(features: FeatureVector) -> Self {
        Self {
            features,
            is_fraud: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ModelFile {
    version: String,
    thresholds: ThresholdSet,
    #[serde(default)]
    training_data: Vec<LabeledSample>,
}

struct ModelState {
    thresholds: Arc<ThresholdSet>,
    training_data: Arc<Vec<LabeledSample>>,
    calibrated: bool,
}

/// Holder of the current threshold snapshot.
pub struct ThresholdModel {
    state: RwLock<ModelState>,
}

impl ThresholdModel {
    pub fn new(thresholds: ThresholdSet) -> Self {
        Self {
            state: RwLock::new(ModelState {
                thresholds: Arc::new(thresholds),
                training_data: Arc::new(Vec::new()),
                calibrated: false,
            }),
        }
    }

    /// Current thresholds. The snapshot never changes under the caller.
    pub fn snapshot(&self) -> Arc<ThresholdSet> {
        Arc::clone(&self.state.read().thresholds)
    }

    /// Samples behind the current thresholds (empty for the defaults).
    pub fn training_data(&self) -> Arc<Vec<LabeledSample>> {
        Arc::clone(&self.state.read().training_data)
    }

    /// True once thresholds came from calibration or a model file.
    pub fn is_calibrated(&self) -> bool {
        self.state.read().calibrated
    }

    /// Recalibrate from labeled samples and swap in the result.
    ///
    /// On error the current thresholds stay in place.
    pub fn calibrate(&self, samples: &[LabeledSample]) -> Result<ThresholdSet, ModelError> {
        let usable: Vec<LabeledSample> = samples
            .iter()
            .filter(|s| s.features.is_finite())
            .cloned()
            .collect();
        if usable.len() < samples.len() {
            debug!(
                skipped = samples.len() - usable.len(),
                "Skipping samples with non-finite features"
            );
        }

        let thresholds = derive_thresholds(&usable)?;

        let mut state = self.state.write();
        state.thresholds = Arc::new(thresholds);
        state.training_data = Arc::new(usable);
        state.calibrated = true;
        drop(state);

        info!(
            latency_min = thresholds.response_latency_ms.min,
            latency_max = thresholds.response_latency_ms.max,
            duration_min = thresholds.handshake_duration_ms.min,
            duration_max = thresholds.handshake_duration_ms.max,
            min_entropy = thresholds.min_message_entropy,
            "Threshold model calibrated"
        );
        Ok(thresholds)
    }

    /// Load a model file written by [`ThresholdModel::save`].
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path)?;
        let file: ModelFile = serde_json::from_str(&content)?;
        if file.version != MODEL_VERSION {
            return Err(ModelError::UnsupportedVersion(file.version));
        }
        Ok(Self {
            state: RwLock::new(ModelState {
                thresholds: Arc::new(file.thresholds),
                training_data: Arc::new(file.training_data),
                calibrated: true,
            }),
        })
    }

    /// Load from `path` if it exists, otherwise start from the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ModelError> {
        if path.exists() {
            let model = Self::load(path)?;
            info!(path = %path.display(), "Loaded threshold model");
            Ok(model)
        } else {
            warn!(
                path = %path.display(),
                "Threshold model not found, using default thresholds"
            );
            Ok(Self::default())
        }
    }

    /// Pick the model for a scorer.
    ///
    /// An explicit path must load. A configured path falls back to the
    /// defaults when the file is missing.
    pub fn resolve(explicit: Option<&Path>, configured: Option<&Path>) -> Result<Self, ModelError> {
        match (explicit, configured) {
            (Some(path), _) => {
                let model = Self::load(path)?;
                info!(path = %path.display(), "Loaded threshold model");
                Ok(model)
            }
            (None, Some(path)) => Self::load_or_default(path),
            (None, None) => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let state = self.state.read();
        let file = ModelFile {
            version: MODEL_VERSION.to_string(),
            thresholds: *state.thresholds,
            training_data: state.training_data.as_ref().clone(),
        };
        drop(state);
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}

impl Default for ThresholdModel {
    fn default() -> Self {
        Self::new(ThresholdSet::default())
    }
}

fn derive_thresholds(samples: &[LabeledSample]) -> Result<ThresholdSet, ModelError> {
    let normal: Vec<&FeatureVector> = samples
        .iter()
        .filter(|s| !s.is_fraud)
        .map(|s| &s.features)
        .collect();
    if normal.is_empty() {
        return Err(ModelError::NoNormalSamples);
    }

    let latencies: Vec<f64> = normal.iter().map(|f| f.response_latency_ms).collect();
    let durations: Vec<f64> = normal.iter().map(|f| f.handshake_duration_ms).collect();
    let entropies: Vec<f64> = normal.iter().map(|f| f.message_entropy).collect();

    let (lat_mean, lat_std) = mean_std(&latencies, LATENCY_FALLBACK_STD);
    let (dur_mean, dur_std) = mean_std(&durations, DURATION_FALLBACK_STD);
    let (ent_mean, ent_std) = mean_std(&entropies, ENTROPY_FALLBACK_STD);

    Ok(ThresholdSet {
        response_latency_ms: normal_range(
            "response_latency_ms",
            lat_mean,
            lat_std,
            LATENCY_FLOOR_MS,
        ),
        handshake_duration_ms: normal_range(
            "handshake_duration_ms",
            dur_mean,
            dur_std,
            DURATION_FLOOR_MS,
        ),
        min_message_entropy: (ent_mean - 2.0 * ent_std).max(ENTROPY_FLOOR_BITS),
    })
}

/// `[max(floor, μ−2σ), μ+3σ]`, with the upper bound raised to the floor
/// when the whole population sits below it.
fn normal_range(feature: &'static str, mean: f64, std: f64, floor: f64) -> NormalRange {
    let min = (mean - 2.0 * std).max(floor);
    let max = mean + 3.0 * std;
    if max < min {
        warn!(
            feature,
            floor,
            calibrated_max = max,
            "Normal samples fall below the floor; collapsing range to the floor"
        );
        return NormalRange::new(min, min);
    }
    NormalRange::new(min, max)
}

/// Mean and sample standard deviation; `fallback_std` when n ≤ 1 or σ = 0.
fn mean_std(values: &[f64], fallback_std: f64) -> (f64, f64) {
    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    if n <= 1 {
        return (mean, fallback_std);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std = variance.sqrt();
    if std > 0.0 {
        (mean, std)
    } else {
        (mean, fallback_std)
    }
}

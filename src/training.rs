//! Labeled training data for threshold calibration.
//!
//! [`generate_samples`] draws a synthetic population: genuine handshakes with
//! human-like timing and high-entropy signatures, and four kinds of fraud.
//! [`ClassSummary`] reports per-class statistics of any labeled set.

use crate::model::LabeledSample;
use crate::score::FeatureVector;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NORMAL_SAMPLES: usize = 160;
pub const DEFAULT_FRAUD_SAMPLES: usize = 40;

const MIN_LATENCY_MS: f64 = 1.0;
const MIN_DURATION_MS: f64 = 1.0;
const MIN_ENTROPY_BITS: f64 = 0.1;

/// Share of genuine samples given a slow response.
const SLOW_GENUINE_RATE: f64 = 0.1;

/// Fraud pattern of a synthetic sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudKind {
    /// Wrong key, otherwise plausible timing
    SignatureFail,
    /// Scripted responder answering far too fast
    BotTiming,
    /// Repetitive, predictable signature text
    LowEntropy,
    /// Several signals at once
    Mixed,
}

impl FraudKind {
    pub const ALL: [FraudKind; 4] = [
        FraudKind::SignatureFail,
        FraudKind::BotTiming,
        FraudKind::LowEntropy,
        FraudKind::Mixed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FraudKind::SignatureFail => "signature_fail",
            FraudKind::BotTiming => "bot_timing",
            FraudKind::LowEntropy => "low_entropy",
            FraudKind::Mixed => "mixed",
        }
    }
}

/// Draw `n_normal` genuine and `n_fraud` fraudulent samples, in that order.
///
/// Fraud kinds are picked uniformly. Values are clamped to at least 1 ms of
/// latency and duration and 0.1 bits of entropy.
pub fn generate_samples<R: Rng + ?Sized>(
    rng: &mut R,
    n_normal: usize,
    n_fraud: usize,
) -> Vec<LabeledSample> {
    let mut samples = Vec::with_capacity(n_normal + n_fraud);

    for _ in 0..n_normal {
        samples.push(LabeledSample::normal(clamped(genuine_features(rng))));
    }
    for _ in 0..n_fraud {
        let kind = FraudKind::ALL[rng.gen_range(0..FraudKind::ALL.len())];
        samples.push(LabeledSample::fraud(clamped(fraud_features(rng, kind))));
    }

    samples
}

fn genuine_features<R: Rng + ?Sized>(rng: &mut R) -> FeatureVector {
    let mut features = FeatureVector {
        signature_verification: 1,
        response_latency_ms: gauss(rng, 180.0, 40.0),
        message_entropy: gauss(rng, 3.8, 0.4),
        handshake_duration_ms: gauss(rng, 250.0, 60.0),
    };
    if rng.gen_bool(SLOW_GENUINE_RATE) {
        features.response_latency_ms *= 1.5;
        features.handshake_duration_ms *= 1.3;
    }
    features
}

/// Feature draw for one fraud kind.
pub fn fraud_features<R: Rng + ?Sized>(rng: &mut R, kind: FraudKind) -> FeatureVector {
    let (signature_verification, latency, entropy, duration) = match kind {
        FraudKind::SignatureFail => (0, (120.0, 30.0), (3.2, 0.5), (180.0, 40.0)),
        FraudKind::BotTiming => (coin(rng), (25.0, 10.0), (2.8, 0.3), (50.0, 20.0)),
        FraudKind::LowEntropy => (coin(rng), (100.0, 25.0), (1.8, 0.4), (150.0, 30.0)),
        FraudKind::Mixed => (0, (40.0, 15.0), (2.0, 0.3), (80.0, 25.0)),
    };
    FeatureVector {
        signature_verification,
        response_latency_ms: gauss(rng, latency.0, latency.1),
        message_entropy: gauss(rng, entropy.0, entropy.1),
        handshake_duration_ms: gauss(rng, duration.0, duration.1),
    }
}

fn coin<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    u8::from(rng.gen_bool(0.5))
}

fn gauss<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    match Normal::new(mean, std_dev) {
        Ok(normal) => normal.sample(rng),
        Err(_) => mean,
    }
}

fn clamped(features: FeatureVector) -> FeatureVector {
    FeatureVector {
        response_latency_ms: features.response_latency_ms.max(MIN_LATENCY_MS),
        message_entropy: features.message_entropy.max(MIN_ENTROPY_BITS),
        handshake_duration_ms: features.handshake_duration_ms.max(MIN_DURATION_MS),
        ..features
    }
}

/// Mean and spread of one feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub mean: f64,
    /// Sample standard deviation; 0 for fewer than two values
    pub std_dev: f64,
}

impl FeatureStats {
    fn of(values: impl Iterator<Item = f64>) -> Self {
        let values: Vec<f64> = values.collect();
        let n = values.len();
        if n == 0 {
            return Self {
                mean: 0.0,
                std_dev: 0.0,
            };
        }
        let mean = values.iter().sum::<f64>() / n as f64;
        let std_dev = if n > 1 {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        } else {
            0.0
        };
        Self { mean, std_dev }
    }
}

/// Statistics of one class (fraud or not) of a labeled set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub is_fraud: bool,
    pub count: usize,
    pub signature_failures: usize,
    pub response_latency_ms: FeatureStats,
    pub message_entropy: FeatureStats,
    pub handshake_duration_ms: FeatureStats,
}

impl ClassSummary {
    /// Summarize the samples labeled `is_fraud`. `None` if there are none.
    pub fn of(samples: &[LabeledSample], is_fraud: bool) -> Option<Self> {
        let class: Vec<&FeatureVector> = samples
            .iter()
            .filter(|s| s.is_fraud == is_fraud)
            .map(|s| &s.features)
            .collect();
        if class.is_empty() {
            return None;
        }

        Some(Self {
            is_fraud,
            count: class.len(),
            signature_failures: class
                .iter()
                .filter(|f| f.signature_verification == 0)
                .count(),
            response_latency_ms: FeatureStats::of(class.iter().map(|f| f.response_latency_ms)),
            message_entropy: FeatureStats::of(class.iter().map(|f| f.message_entropy)),
            handshake_duration_ms: FeatureStats::of(class.iter().map(|f| f.handshake_duration_ms)),
        })
    }
}

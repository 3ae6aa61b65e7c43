//! Anomaly scoring for completed handshakes.
//!
//! A handshake is reduced to four signals and scored by additive rules against
//! the calibrated thresholds:
//!
//! | Rule | Weight |
//! |---|---|
//! | signature did not verify | +0.60 |
//! | response latency below / above normal range | +0.30 / +0.20 |
//! | signature entropy below minimum | +0.25 |
//! | handshake duration below / above normal range | +0.20 / +0.10 |
//!
//! The sum is capped at 1.0 and rounded to three decimals.

use crate::clock::Timestamp;
use crate::handshake::Handshake;
use crate::model::{ThresholdModel, ThresholdSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Default score above which a handshake is flagged.
pub const DEFAULT_ANOMALY_THRESHOLD: f64 = 0.5;

/// Signals measured from one handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// 1 if the signature verified, else 0
    pub signature_verification: u8,
    /// Responder turnaround in milliseconds
    pub response_latency_ms: f64,
    /// Shannon entropy of the signature string, in bits
    pub message_entropy: f64,
    /// Creation to verification (or now) in milliseconds
    #[serde(alias = "handshake_duration")]
    pub handshake_duration_ms: f64,
}

impl FeatureVector {
    pub fn is_finite(&self) -> bool {
        self.response_latency_ms.is_finite()
            && self.message_entropy.is_finite()
            && self.handshake_duration_ms.is_finite()
    }
}

/// Shannon entropy of a string's characters, in bits.
///
/// Empty input has zero entropy.
pub fn shannon_entropy(text: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut len = 0usize;
    for c in text.chars() {
        *counts.entry(c).or_insert(0) += 1;
        len += 1;
    }
    if len == 0 {
        return 0.0;
    }

    let len = len as f64;
    let entropy = counts
        .values()
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum::<f64>();
    // A single repeated character sums to -0.0.
    entropy.max(0.0)
}

/// Coarse risk bucket for a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Above 0.7 is high, above 0.5 medium, everything else low.
    pub fn from_score(score: f64) -> Self {
        if score > 0.7 {
            RiskLevel::High
        } else if score > 0.5 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW RISK",
            RiskLevel::Medium => "MEDIUM RISK",
            RiskLevel::High => "HIGH RISK",
        }
    }
}

/// Scoring rule that can fire for a feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyRule {
    SignatureFailed,
    ResponseTooFast,
    ResponseTooSlow,
    LowEntropy,
    HandshakeTooFast,
    HandshakeTooSlow,
}

impl AnomalyRule {
    pub fn weight(&self) -> f64 {
        match self {
            AnomalyRule::SignatureFailed => 0.60,
            AnomalyRule::ResponseTooFast => 0.30,
            AnomalyRule::ResponseTooSlow => 0.20,
            AnomalyRule::LowEntropy => 0.25,
            AnomalyRule::HandshakeTooFast => 0.20,
            AnomalyRule::HandshakeTooSlow => 0.10,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AnomalyRule::SignatureFailed => "Signature verification failed",
            AnomalyRule::ResponseTooFast => "Response too fast (bot-like)",
            AnomalyRule::ResponseTooSlow => "Response too slow",
            AnomalyRule::LowEntropy => "Low message entropy (repetitive pattern)",
            AnomalyRule::HandshakeTooFast => "Handshake completed too quickly",
            AnomalyRule::HandshakeTooSlow => "Handshake took too long",
        }
    }
}

/// Full scoring outcome for one feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    /// Risk score in [0, 1]
    pub score: f64,
    pub is_anomaly: bool,
    pub risk_level: RiskLevel,
    /// Rules that fired, in evaluation order
    pub rules: Vec<AnomalyRule>,
    pub explanation: String,
    pub features: FeatureVector,
}

/// Rule-based scorer over calibrated thresholds.
pub struct AnomalyScorer {
    model: Arc<ThresholdModel>,
    anomaly_threshold: f64,
}

impl AnomalyScorer {
    pub fn new(model: Arc<ThresholdModel>, anomaly_threshold: f64) -> Self {
        Self {
            model,
            anomaly_threshold,
        }
    }

    pub fn model(&self) -> &Arc<ThresholdModel> {
        &self.model
    }

    pub fn anomaly_threshold(&self) -> f64 {
        self.anomaly_threshold
    }

    /// Measure a handshake. `now` closes the duration window for handshakes
    /// that have not been verified yet.
    pub fn extract_features(&self, handshake: &Handshake, now: Timestamp) -> FeatureVector {
        let response_latency_ms = handshake
            .response_time
            .map(|at| at.millis_since(handshake.created_at))
            .unwrap_or(0.0);
        let message_entropy = handshake
            .signature
            .as_deref()
            .map(shannon_entropy)
            .unwrap_or(0.0);
        let end = handshake.verified_at.unwrap_or(now);

        FeatureVector {
            signature_verification: u8::from(handshake.signature_valid == Some(true)),
            response_latency_ms,
            message_entropy,
            handshake_duration_ms: end.millis_since(handshake.created_at),
        }
    }

    /// Rules that fire for `features` under the current thresholds.
    pub fn evaluate(&self, features: &FeatureVector) -> Vec<AnomalyRule> {
        evaluate_rules(&self.model.snapshot(), features)
    }

    /// Score in [0, 1].
    pub fn predict_anomaly(&self, features: &FeatureVector) -> f64 {
        total_score(&self.evaluate(features))
    }

    pub fn is_anomaly(&self, score: f64) -> bool {
        score > self.anomaly_threshold
    }

    /// Human-readable account of a score, e.g.
    /// `"HIGH RISK: Signature verification failed, Response too fast (bot-like)"`.
    pub fn explain(&self, features: &FeatureVector, score: f64) -> String {
        format_explanation(&self.evaluate(features), score)
    }

    /// Score, classify and explain against a single threshold snapshot.
    pub fn assess(&self, features: &FeatureVector) -> AnomalyReport {
        let rules = evaluate_rules(&self.model.snapshot(), features);
        let score = total_score(&rules);
        AnomalyReport {
            score,
            is_anomaly: self.is_anomaly(score),
            risk_level: RiskLevel::from_score(score),
            explanation: format_explanation(&rules, score),
            rules,
            features: *features,
        }
    }
}

fn evaluate_rules(thresholds: &ThresholdSet, features: &FeatureVector) -> Vec<AnomalyRule> {
    let mut rules = Vec::new();

    if features.signature_verification == 0 {
        rules.push(AnomalyRule::SignatureFailed);
    }

    let latency = features.response_latency_ms;
    if latency < thresholds.response_latency_ms.min {
        rules.push(AnomalyRule::ResponseTooFast);
    } else if latency > thresholds.response_latency_ms.max {
        rules.push(AnomalyRule::ResponseTooSlow);
    }

    if features.message_entropy < thresholds.min_message_entropy {
        rules.push(AnomalyRule::LowEntropy);
    }

    let duration = features.handshake_duration_ms;
    if duration < thresholds.handshake_duration_ms.min {
        rules.push(AnomalyRule::HandshakeTooFast);
    } else if duration > thresholds.handshake_duration_ms.max {
        rules.push(AnomalyRule::HandshakeTooSlow);
    }

    rules
}

fn total_score(rules: &[AnomalyRule]) -> f64 {
    let sum: f64 = rules.iter().map(AnomalyRule::weight).sum();
    ((sum * 1000.0).round() / 1000.0).clamp(0.0, 1.0)
}

fn format_explanation(rules: &[AnomalyRule], score: f64) -> String {
    let risk = RiskLevel::from_score(score).label();
    if rules.is_empty() {
        return format!("{}: Normal handshake pattern", risk);
    }
    let reasons: Vec<&str> = rules.iter().map(AnomalyRule::description).collect();
    format!("{}: {}", risk, reasons.join(", "))
}

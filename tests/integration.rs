//! Integration tests for the agent handshake guard.
//!
//! These tests drive complete handshake lifecycles through the coordinator,
//! plus configuration, signing, sessions, scoring and model persistence.

use handshake_guard::config::{HandshakeConfig, ScoringConfig, SessionConfig};
use handshake_guard::model::NormalRange;
use handshake_guard::score::{shannon_entropy, AnomalyRule};
use handshake_guard::session::SessionIssuer;
use handshake_guard::{
    sign, verify, AgentDirectory, AgentRegistry, AgentType, AnomalyScorer, Clock, FeatureVector,
    HandshakeCoordinator, HandshakeGuardConfig, HandshakeStatus, LabeledSample, ManualClock,
    ModelError, OsRandom, RiskLevel, SecretKey, ThresholdModel, ThresholdSet, Timestamp,
};
use std::sync::Arc;
use std::time::Duration;

const START_MS: u64 = 1_700_000_000_000;

struct Harness {
    clock: Arc<ManualClock>,
    coordinator: Arc<HandshakeCoordinator>,
    genuine_key: SecretKey,
}

fn harness_with(config: HandshakeGuardConfig, model: ThresholdModel) -> Harness {
    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(START_MS)));
    let registry = Arc::new(AgentRegistry::new(clock.clone(), Arc::new(OsRandom)));

    registry
        .register("agent_a", AgentType::Genuine, None)
        .unwrap();
    registry
        .register("agent_b", AgentType::Genuine, None)
        .unwrap();
    registry.register("agent_f", AgentType::Fake, None).unwrap();

    // agent_b signs with the random key it was registered with
    let genuine_key = registry.get("agent_b").unwrap().secret_key;

    let coordinator = HandshakeCoordinator::with_parts(
        config,
        registry,
        Arc::new(model),
        clock.clone(),
        Arc::new(OsRandom),
    )
    .unwrap();

    Harness {
        clock,
        coordinator: Arc::new(coordinator),
        genuine_key,
    }
}

fn harness() -> Harness {
    harness_with(HandshakeGuardConfig::default(), ThresholdModel::default())
}

fn features(sig: u8, latency: f64, entropy: f64, duration: f64) -> FeatureVector {
    FeatureVector {
        signature_verification: sig,
        response_latency_ms: latency,
        message_entropy: entropy,
        handshake_duration_ms: duration,
    }
}

fn default_scorer() -> AnomalyScorer {
    AnomalyScorer::new(Arc::new(ThresholdModel::default()), 0.5)
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_default_config_is_valid() {
    let config = HandshakeGuardConfig::default();

    assert_eq!(config.session.ttl_seconds, 300);
    assert_eq!(config.session.token_bytes, 32);
    assert_eq!(config.handshake.id_bytes, 16);
    assert_eq!(config.handshake.nonce_bytes, 16);
    assert!(config.handshake.pending_ttl_seconds.is_none());
    assert!((config.scoring.anomaly_threshold - 0.5).abs() < f64::EPSILON);
    assert!(config.scoring.model_path.is_none());

    config.validate().unwrap();
}

#[test]
fn test_config_from_json() {
    let json = r#"{
        "session": { "ttl_seconds": 600 },
        "handshake": { "pending_ttl_seconds": 30 },
        "scoring": { "anomaly_threshold": 0.4, "model_path": "model.json" }
    }"#;

    let config: HandshakeGuardConfig = serde_json::from_str(json).unwrap();

    assert_eq!(config.session.ttl_seconds, 600);
    assert_eq!(config.session.token_bytes, 32);
    assert_eq!(config.handshake.pending_ttl(), Some(Duration::from_secs(30)));
    assert_eq!(config.handshake.sweep_interval_seconds, 60);
    assert!((config.scoring.anomaly_threshold - 0.4).abs() < f64::EPSILON);
    config.validate().unwrap();
}

#[test]
fn test_config_from_yaml_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("guard.yaml");
    std::fs::write(
        &path,
        "session:\n  ttl_seconds: 120\nscoring:\n  anomaly_threshold: 0.6\n",
    )
    .unwrap();

    let config = HandshakeGuardConfig::from_path(&path).unwrap();
    assert_eq!(config.session.ttl(), Duration::from_secs(120));
    assert!((config.scoring.anomaly_threshold - 0.6).abs() < f64::EPSILON);
}

#[test]
fn test_config_sections_constructed_directly() {
    let config = HandshakeGuardConfig {
        session: SessionConfig {
            ttl_seconds: 0,
            token_bytes: 32,
        },
        handshake: HandshakeConfig::default(),
        scoring: ScoringConfig::default(),
    };
    assert!(config.validate().is_err());
}

// =============================================================================
// Signature Tests
// =============================================================================

#[test]
fn test_sign_verify_round_trip() {
    let key = SecretKey::from_bytes([7; 32]);
    let nonce = b"3f1c9a0b7d2e4f60a1b2c3d4e5f60718";

    let sig = sign(nonce, &key);
    assert_eq!(sig.len(), 64);
    assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert!(verify(nonce, &sig, &key));
}

#[test]
fn test_verify_rejects_wrong_key_and_tampering() {
    let key = SecretKey::from_bytes([7; 32]);
    let other = SecretKey::from_bytes([8; 32]);
    let sig = sign(b"nonce", &key);

    assert!(!verify(b"nonce", &sig, &other));
    assert!(!verify(b"nonce2", &sig, &key));
    assert!(!verify(b"nonce", &sig[..63], &key));
    assert!(!verify(b"nonce", "", &key));
    assert!(!verify(b"nonce", &sig.to_uppercase(), &key));
}

#[test]
fn test_secret_key_from_hex_rejects_bad_input() {
    assert!(SecretKey::from_hex("abcd").is_err());
    assert!(SecretKey::from_hex(&"zz".repeat(32)).is_err());
    assert!(SecretKey::from_hex(&"ab".repeat(32)).is_ok());
}

// =============================================================================
// Session Tests
// =============================================================================

#[test]
fn test_session_valid_until_expiry() {
    let clock = Arc::new(ManualClock::new(Timestamp::from_millis(START_MS)));
    let issuer = SessionIssuer::new(clock.clone(), Arc::new(OsRandom), 32);

    let session = issuer
        .issue("hs", "agent_a", "agent_b", Duration::from_secs(300))
        .unwrap();
    assert!(issuer.is_valid(&session.token));

    clock.advance(Duration::from_secs(299));
    assert!(issuer.is_valid(&session.token));

    clock.advance(Duration::from_secs(1));
    assert!(!issuer.is_valid(&session.token));
    assert!(issuer.authorize(&session.token).unwrap_err().is_unauthorized());
    assert!(issuer.authorize("unknown").unwrap_err().is_not_found());
}

#[test]
fn test_session_tokens_are_url_safe() {
    let clock = Arc::new(ManualClock::default());
    let issuer = SessionIssuer::new(clock, Arc::new(OsRandom), 32);
    let session = issuer.issue("hs", "a", "b", Duration::from_secs(60)).unwrap();

    // 32 bytes without padding
    assert_eq!(session.token.len(), 43);
    assert!(session
        .token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
}

// =============================================================================
// Scoring Tests
// =============================================================================

#[test]
fn test_normal_features_score_zero() {
    let scorer = default_scorer();
    let report = scorer.assess(&features(1, 150.0, 3.8, 200.0));

    assert_eq!(report.score, 0.0);
    assert!(!report.is_anomaly);
    assert_eq!(report.risk_level, RiskLevel::Low);
    assert!(report.rules.is_empty());
    assert_eq!(report.explanation, "LOW RISK: Normal handshake pattern");
}

#[test]
fn test_fast_response_penalty() {
    let scorer = default_scorer();
    let score = scorer.predict_anomaly(&features(1, 5.0, 3.8, 200.0));

    assert!((score - 0.3).abs() < 1e-9);
    assert_eq!(
        scorer.evaluate(&features(1, 5.0, 3.8, 200.0)),
        vec![AnomalyRule::ResponseTooFast]
    );
}

#[test]
fn test_worst_case_is_capped() {
    let scorer = default_scorer();
    let report = scorer.assess(&features(0, 1.0, 0.0, 1.0));

    // 0.6 + 0.3 + 0.25 + 0.2 before the cap
    assert_eq!(report.score, 1.0);
    assert!(report.is_anomaly);
    assert_eq!(report.risk_level, RiskLevel::High);
    assert!(report.explanation.starts_with("HIGH RISK: "));
    assert!(report.explanation.contains("Signature verification failed"));
}

#[test]
fn test_threshold_is_strict() {
    let scorer = AnomalyScorer::new(Arc::new(ThresholdModel::default()), 0.6);
    let score = scorer.predict_anomaly(&features(0, 150.0, 3.8, 200.0));

    assert!((score - 0.6).abs() < 1e-9);
    assert!(!scorer.is_anomaly(score));
    assert_eq!(RiskLevel::from_score(score), RiskLevel::Medium);
}

#[test]
fn test_nan_features_stay_bounded() {
    let scorer = default_scorer();
    let score = scorer.predict_anomaly(&features(1, f64::NAN, f64::NAN, f64::NAN));
    assert_eq!(score, 0.0);

    let score = scorer.predict_anomaly(&features(0, f64::INFINITY, 0.0, f64::INFINITY));
    assert!((0.0..=1.0).contains(&score));
}

#[test]
fn test_entropy_values() {
    assert_eq!(shannon_entropy(""), 0.0);
    assert_eq!(shannon_entropy("aaaa"), 0.0);
    assert!((shannon_entropy("ab") - 1.0).abs() < 1e-12);
    assert!((shannon_entropy("abcd") - 2.0).abs() < 1e-12);
    assert!((shannon_entropy("0123456789abcdef") - 4.0).abs() < 1e-12);
}

// =============================================================================
// Calibration and Model Tests
// =============================================================================

#[test]
fn test_zero_variance_calibration_uses_fallback_spread() {
    let model = ThresholdModel::default();
    let samples: Vec<LabeledSample> = (0..5)
        .map(|_| LabeledSample::normal(features(1, 100.0, 3.0, 200.0)))
        .collect();

    let thresholds = model.calibrate(&samples).unwrap();

    assert_eq!(thresholds.response_latency_ms, NormalRange::new(10.0, 250.0));
    assert_eq!(thresholds.handshake_duration_ms, NormalRange::new(50.0, 500.0));
    assert!((thresholds.min_message_entropy - 2.0).abs() < 1e-12);
    assert!(model.is_calibrated());
    assert_eq!(*model.snapshot(), thresholds);
}

#[test]
fn test_calibration_ignores_fraud_samples() {
    let model = ThresholdModel::default();
    let mut samples = vec![LabeledSample::normal(features(1, 150.0, 3.5, 200.0))];
    samples.push(LabeledSample::fraud(features(0, 5.0, 0.5, 10.0)));

    let thresholds = model.calibrate(&samples).unwrap();
    // Single normal sample: fallback spread around its values
    assert_eq!(thresholds.response_latency_ms, NormalRange::new(50.0, 300.0));
    assert_eq!(thresholds.handshake_duration_ms, NormalRange::new(50.0, 500.0));
}

#[test]
fn test_calibration_without_normal_samples_keeps_defaults() {
    let model = ThresholdModel::default();
    let err = model
        .calibrate(&[LabeledSample::fraud(features(0, 5.0, 0.5, 10.0))])
        .unwrap_err();

    assert!(matches!(err, ModelError::NoNormalSamples));
    assert!(!model.is_calibrated());
    assert_eq!(*model.snapshot(), ThresholdSet::default());
}

#[test]
fn test_calibration_changes_scoring() {
    let model = Arc::new(ThresholdModel::default());
    let scorer = AnomalyScorer::new(Arc::clone(&model), 0.5);
    let slow = features(1, 400.0, 3.8, 300.0);
    assert!((scorer.predict_anomaly(&slow) - 0.2).abs() < 1e-9);

    let samples: Vec<LabeledSample> = [380.0, 400.0, 420.0]
        .iter()
        .map(|&l| LabeledSample::normal(features(1, l, 3.8, 300.0)))
        .collect();
    model.calibrate(&samples).unwrap();

    assert_eq!(scorer.predict_anomaly(&slow), 0.0);
}

#[test]
fn test_model_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ml_model.json");

    let model = ThresholdModel::default();
    let samples = vec![
        LabeledSample::normal(features(1, 140.0, 3.6, 190.0)),
        LabeledSample::normal(features(1, 160.0, 3.9, 230.0)),
        LabeledSample::fraud(features(0, 20.0, 1.5, 40.0)),
    ];
    let thresholds = model.calibrate(&samples).unwrap();
    model.save(&path).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["version"], "1.0");
    assert_eq!(raw["training_data"].as_array().unwrap().len(), 3);

    let loaded = ThresholdModel::load(&path).unwrap();
    assert!(loaded.is_calibrated());
    assert_eq!(*loaded.snapshot(), thresholds);
    assert_eq!(loaded.training_data().len(), 3);
}

#[test]
fn test_model_load_or_default_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let model = ThresholdModel::load_or_default(&dir.path().join("absent.json")).unwrap();

    assert!(!model.is_calibrated());
    assert_eq!(*model.snapshot(), ThresholdSet::default());
}

#[test]
fn test_model_load_rejects_unknown_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    let thresholds = serde_json::to_value(ThresholdSet::default()).unwrap();
    let body = serde_json::json!({
        "version": "9.9",
        "thresholds": thresholds,
        "training_data": []
    });
    std::fs::write(&path, body.to_string()).unwrap();

    assert!(matches!(
        ThresholdModel::load(&path),
        Err(ModelError::UnsupportedVersion(v)) if v == "9.9"
    ));
}

// =============================================================================
// Handshake Lifecycle Tests
// =============================================================================

#[test]
fn test_genuine_handshake_scenario() {
    let h = harness();
    let hs = h.coordinator.start("agent_a", "agent_b").unwrap();

    assert_eq!(hs.handshake_id.len(), 32);
    assert_eq!(hs.nonce.len(), 32);
    assert_eq!(hs.status, HandshakeStatus::Pending);
    assert_eq!(hs.created_at, Timestamp::from_millis(START_MS));

    h.clock.advance_millis(150);
    let sig = sign(hs.nonce.as_bytes(), &h.genuine_key);
    let outcome = h.coordinator.respond(&hs.handshake_id, &sig, "agent_b").unwrap();
    assert!(outcome.signature_valid);

    h.clock.advance_millis(60);
    let verified_at = h.clock.now();
    let verified = h.coordinator.verify(&hs.handshake_id).unwrap();

    assert!(verified.anomaly_score < 0.3);
    assert_eq!(
        verified.expires_at,
        verified_at.saturating_add(Duration::from_secs(300))
    );

    let session = h.coordinator.authorize_session(&verified.session_token).unwrap();
    assert_eq!(session.handshake_id, hs.handshake_id);
    assert_eq!(session.requester_id, "agent_a");
    assert_eq!(session.responder_id, "agent_b");
    assert_eq!(session.created_at, verified_at);

    let stored = h.coordinator.handshake(&hs.handshake_id).unwrap();
    assert_eq!(stored.status, HandshakeStatus::Verified);
    assert_eq!(stored.verified_at, Some(verified_at));
}

#[test]
fn test_fake_agent_scenario() {
    let h = harness();
    let hs = h.coordinator.start("agent_a", "agent_f").unwrap();

    // The fake agent signs with a key it made up.
    h.clock.advance_millis(40);
    let forged = sign(hs.nonce.as_bytes(), &SecretKey::from_bytes([0xee; 32]));
    let outcome = h
        .coordinator
        .respond(&hs.handshake_id, &forged, "agent_f")
        .unwrap();
    assert!(!outcome.signature_valid);
    assert_eq!(outcome.status, HandshakeStatus::Failed);

    let err = h.coordinator.verify(&hs.handshake_id).unwrap_err();
    assert!(err.is_unauthorized());

    let check = h.coordinator.check_anomaly(&hs.handshake_id).unwrap();
    assert!(check.anomaly_score >= 0.6);
    assert!(check.is_anomaly);
    assert_eq!(check.features.signature_verification, 0);
    assert!(check.explanation.contains("Signature verification failed"));
    assert_eq!(h.coordinator.status().sessions, 0);
}

#[test]
fn test_bot_timing_is_flagged_even_with_valid_signature() {
    let h = harness();
    let hs = h.coordinator.start("agent_a", "agent_b").unwrap();

    h.clock.advance_millis(5);
    let sig = sign(hs.nonce.as_bytes(), &h.genuine_key);
    h.coordinator.respond(&hs.handshake_id, &sig, "agent_b").unwrap();
    h.clock.advance_millis(5);

    let verified = h.coordinator.verify(&hs.handshake_id).unwrap();
    // Too fast a response plus too short a handshake
    assert!((verified.anomaly_score - 0.5).abs() < 1e-9);
    assert!(verified.explanation.contains("Response too fast (bot-like)"));
    assert!(verified.explanation.contains("Handshake completed too quickly"));
}

#[test]
fn test_unknown_parties() {
    let h = harness();
    assert!(h.coordinator.start("agent_a", "nobody").unwrap_err().is_not_found());
    assert!(h
        .coordinator
        .respond("0".repeat(32).as_str(), "sig", "agent_b")
        .unwrap_err()
        .is_not_found());
    assert!(h.coordinator.verify("missing").unwrap_err().is_not_found());
    assert!(h.coordinator.check_anomaly("missing").unwrap_err().is_not_found());
}

#[test]
fn test_verify_twice_conflicts() {
    let h = harness();
    let hs = h.coordinator.start("agent_a", "agent_b").unwrap();
    let sig = sign(hs.nonce.as_bytes(), &h.genuine_key);
    h.coordinator.respond(&hs.handshake_id, &sig, "agent_b").unwrap();

    let first = h.coordinator.verify(&hs.handshake_id).unwrap();
    let err = h.coordinator.verify(&hs.handshake_id).unwrap_err();
    assert!(err.is_conflict());

    assert_eq!(h.coordinator.status().sessions, 1);
    assert!(h.coordinator.is_session_valid(&first.session_token));
}

#[test]
fn test_signature_over_other_nonce_fails() {
    let h = harness();
    let first = h.coordinator.start("agent_a", "agent_b").unwrap();
    let second = h.coordinator.start("agent_a", "agent_b").unwrap();
    assert_ne!(first.nonce, second.nonce);

    let replayed = sign(first.nonce.as_bytes(), &h.genuine_key);
    let outcome = h
        .coordinator
        .respond(&second.handshake_id, &replayed, "agent_b")
        .unwrap();
    assert!(!outcome.signature_valid);
}

#[test]
fn test_session_expires_after_ttl() {
    let mut config = HandshakeGuardConfig::default();
    config.session.ttl_seconds = 60;
    let h = harness_with(config, ThresholdModel::default());

    let hs = h.coordinator.start("agent_a", "agent_b").unwrap();
    let sig = sign(hs.nonce.as_bytes(), &h.genuine_key);
    h.coordinator.respond(&hs.handshake_id, &sig, "agent_b").unwrap();
    let verified = h.coordinator.verify(&hs.handshake_id).unwrap();

    h.clock.advance(Duration::from_secs(59));
    assert!(h.coordinator.is_session_valid(&verified.session_token));
    h.clock.advance(Duration::from_secs(1));
    assert!(!h.coordinator.is_session_valid(&verified.session_token));
    assert!(h
        .coordinator
        .authorize_session(&verified.session_token)
        .unwrap_err()
        .is_unauthorized());
}

#[test]
fn test_status_counts() {
    let h = harness();
    let a = h.coordinator.start("agent_a", "agent_b").unwrap();
    h.coordinator.start("agent_a", "agent_b").unwrap();

    let sig = sign(a.nonce.as_bytes(), &h.genuine_key);
    h.coordinator.respond(&a.handshake_id, &sig, "agent_b").unwrap();
    h.coordinator.verify(&a.handshake_id).unwrap();

    let status = h.coordinator.status();
    assert_eq!(status.agents, Some(3));
    assert_eq!(status.handshakes, 2);
    assert_eq!(status.pending_handshakes, 1);
    assert_eq!(status.sessions, 1);
    assert!(!status.model_calibrated);
}

#[test]
fn test_coordinator_calibration_affects_checks() {
    let h = harness();
    let hs = h.coordinator.start("agent_a", "agent_b").unwrap();
    h.clock.advance_millis(400);
    let sig = sign(hs.nonce.as_bytes(), &h.genuine_key);
    h.coordinator.respond(&hs.handshake_id, &sig, "agent_b").unwrap();

    let before = h.coordinator.check_anomaly(&hs.handshake_id).unwrap();
    assert!(before.anomaly_score > 0.0);

    let samples: Vec<LabeledSample> = [390.0, 400.0, 410.0]
        .iter()
        .map(|&l| LabeledSample::normal(features(1, l, 3.8, l + 10.0)))
        .collect();
    h.coordinator.calibrate(&samples).unwrap();

    let after = h.coordinator.check_anomaly(&hs.handshake_id).unwrap();
    assert_eq!(after.anomaly_score, 0.0);
    assert!(h.coordinator.status().model_calibrated);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_responses_record_exactly_one() {
    let h = harness();
    let hs = h.coordinator.start("agent_a", "agent_b").unwrap();
    let good = sign(hs.nonce.as_bytes(), &h.genuine_key);

    let mut tasks = Vec::new();
    for i in 0..16 {
        let coordinator = Arc::clone(&h.coordinator);
        let id = hs.handshake_id.clone();
        let sig = if i % 2 == 0 { good.clone() } else { "0".repeat(64) };
        tasks.push(tokio::spawn(async move {
            coordinator.respond(&id, &sig, "agent_b")
        }));
    }

    let mut accepted = Vec::new();
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(outcome) => accepted.push(outcome),
            Err(e) => {
                assert!(e.is_conflict());
                conflicts += 1;
            }
        }
    }

    assert_eq!(accepted.len(), 1);
    assert_eq!(conflicts, 15);

    let stored = h.coordinator.handshake(&hs.handshake_id).unwrap();
    assert_eq!(stored.signature_valid, Some(accepted[0].signature_valid));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_verifications_issue_one_session() {
    let h = harness();
    let hs = h.coordinator.start("agent_a", "agent_b").unwrap();
    let sig = sign(hs.nonce.as_bytes(), &h.genuine_key);
    h.coordinator.respond(&hs.handshake_id, &sig, "agent_b").unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let coordinator = Arc::clone(&h.coordinator);
        let id = hs.handshake_id.clone();
        tasks.push(tokio::spawn(async move { coordinator.verify(&id) }));
    }

    let mut verified = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            verified += 1;
        }
    }

    assert_eq!(verified, 1);
    assert_eq!(h.coordinator.status().sessions, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_handshakes_are_independent() {
    let h = harness();

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let coordinator = Arc::clone(&h.coordinator);
        let key = h.genuine_key.clone();
        tasks.push(tokio::spawn(async move {
            let hs = coordinator.start("agent_a", "agent_b")?;
            let sig = sign(hs.nonce.as_bytes(), &key);
            coordinator.respond(&hs.handshake_id, &sig, "agent_b")?;
            coordinator.verify(&hs.handshake_id)
        }));
    }

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let status = h.coordinator.status();
    assert_eq!(status.handshakes, 32);
    assert_eq!(status.sessions, 32);
    assert_eq!(status.pending_handshakes, 0);
}

#[tokio::test(start_paused = true)]
async fn test_pending_sweeper_runs_on_interval() {
    let mut config = HandshakeGuardConfig::default();
    config.handshake.pending_ttl_seconds = Some(30);
    config.handshake.sweep_interval_seconds = 10;
    let h = harness_with(config, ThresholdModel::default());

    let stale = h.coordinator.start("agent_a", "agent_b").unwrap();
    h.clock.advance(Duration::from_secs(31));

    let sweeper = h.coordinator.spawn_pending_sweeper().unwrap();
    // First tick fires immediately.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(h.coordinator.handshake(&stale.handshake_id).is_none());

    let fresh = h.coordinator.start("agent_a", "agent_b").unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(h.coordinator.handshake(&fresh.handshake_id).is_some());

    sweeper.abort();
}

#[test]
fn test_sweeper_not_spawned_without_ttl() {
    let h = harness();
    // No runtime needed: nothing is spawned.
    assert!(h.coordinator.spawn_pending_sweeper().is_none());
}

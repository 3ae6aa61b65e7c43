//! Agent handshake guard
//!
//! Administrative tooling: threshold calibration, signing and offline scoring.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use handshake_guard::training::{DEFAULT_FRAUD_SAMPLES, DEFAULT_NORMAL_SAMPLES};
use handshake_guard::{
    generate_samples, sign, AnomalyScorer, ClassSummary, FeatureVector, HandshakeGuardConfig,
    LabeledSample, SecretKey, ThresholdModel,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "handshake-guard")]
#[command(author, version, about = "Agent handshake verification and anomaly scoring")]
struct Args {
    /// Path to configuration file (JSON or YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable JSON logging format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

/// Size and seed of a synthetic sample set.
#[derive(clap::Args, Debug)]
struct Population {
    /// Genuine samples to generate
    #[arg(long, default_value_t = DEFAULT_NORMAL_SAMPLES)]
    normal: usize,

    /// Fraudulent samples to generate
    #[arg(long, default_value_t = DEFAULT_FRAUD_SAMPLES)]
    fraud: usize,

    /// Seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,
}

impl Population {
    fn generate(&self) -> Vec<LabeledSample> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        info!(
            normal = self.normal,
            fraud = self.fraud,
            seed = ?self.seed,
            "Generating synthetic samples"
        );
        generate_samples(&mut rng, self.normal, self.fraud)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Calibrate thresholds from labeled samples and write the model file
    Calibrate {
        /// JSON array of labeled feature vectors
        #[arg(long, required_unless_present = "synthetic")]
        samples: Option<PathBuf>,

        /// Calibrate on freshly generated synthetic samples instead
        #[arg(long, conflicts_with = "samples")]
        synthetic: bool,

        #[command(flatten)]
        population: Population,

        /// Where to write the model
        #[arg(long, default_value = "ml_model.json")]
        output: PathBuf,
    },

    /// Write a synthetic labeled sample set as JSON
    GenerateSamples {
        #[command(flatten)]
        population: Population,

        #[arg(long, default_value = "samples.json")]
        output: PathBuf,
    },

    /// Sign a nonce the way a genuine agent does
    Sign {
        #[arg(long)]
        nonce: String,

        /// 32-byte key as 64 hex characters
        #[arg(long)]
        key: String,
    },

    /// Score one feature vector and print the report
    Score {
        /// JSON object with the four handshake features
        #[arg(long)]
        features: PathBuf,

        /// Model file; overrides scoring.model_path
        #[arg(long)]
        model: Option<PathBuf>,
    },

    /// Print the effective configuration
    ShowConfig,
}

fn init_logging(json: bool, level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    // Logs go to stderr so command output stays pipeable.
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(path: Option<&Path>) -> Result<HandshakeGuardConfig> {
    let config = match path {
        Some(path) => HandshakeGuardConfig::from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => HandshakeGuardConfig::default(),
    };
    let config = config.with_env_overrides()?;
    config.validate()?;
    Ok(config)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn log_class_summaries(samples: &[LabeledSample]) {
    for is_fraud in [false, true] {
        let Some(summary) = ClassSummary::of(samples, is_fraud) else {
            continue;
        };
        info!(
            class = if is_fraud { "fraud" } else { "normal" },
            count = summary.count,
            signature_failures = summary.signature_failures,
            latency_mean_ms = summary.response_latency_ms.mean,
            latency_std_ms = summary.response_latency_ms.std_dev,
            entropy_mean = summary.message_entropy.mean,
            entropy_std = summary.message_entropy.std_dev,
            duration_mean_ms = summary.handshake_duration_ms.mean,
            duration_std_ms = summary.handshake_duration_ms.std_dev,
            "Sample statistics"
        );
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("failed to write {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, &args.log_level);

    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Calibrate {
            samples,
            synthetic,
            population,
            output,
        } => {
            let samples: Vec<LabeledSample> = match samples {
                Some(path) if !synthetic => read_json(&path)?,
                _ => population.generate(),
            };
            log_class_summaries(&samples);
            info!(total = samples.len(), "Calibrating threshold model");

            let model = ThresholdModel::default();
            let thresholds = model.calibrate(&samples)?;
            model.save(&output)?;
            info!(path = %output.display(), "Threshold model saved");

            println!("{}", serde_json::to_string_pretty(&thresholds)?);
        }
        Command::GenerateSamples { population, output } => {
            let samples = population.generate();
            log_class_summaries(&samples);
            write_json(&output, &samples)?;
            info!(path = %output.display(), count = samples.len(), "Samples written");
        }
        Command::Sign { nonce, key } => {
            let key = SecretKey::from_hex(&key)?;
            println!("{}", sign(nonce.as_bytes(), &key));
        }
        Command::Score { features, model } => {
            let features: FeatureVector = read_json(&features)?;
            let model =
                ThresholdModel::resolve(model.as_deref(), config.scoring.model_path.as_deref())
                    .context("failed to load threshold model")?;

            let scorer = AnomalyScorer::new(Arc::new(model), config.scoring.anomaly_threshold);
            let report = scorer.assess(&features);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::ShowConfig => {
            print!("{}", serde_yaml::to_string(&config)?);
        }
    }

    Ok(())
}

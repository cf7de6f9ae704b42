// Pilar operator CLI
// Inspect artifacts, classify images offline, query a running server

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use pilar_core::{CategoryTable, PilarConfig, PredictionResult};
use pilar_vision::{ImageLimits, ModelRegistry, Predictor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Parser)]
#[command(name = "pilar")]
#[command(about = "Pilar waste classification tools", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a model artifact, then print its summary
    Inspect {
        /// Artifact file (.json or .bin)
        artifact: PathBuf,
    },

    /// Classify a local image without a server
    Classify {
        /// Image file
        image: PathBuf,

        /// Model artifact
        #[arg(long, short, default_value = "model/pilar_demo.json")]
        model: PathBuf,

        /// Category table (TOML, YAML or JSON); built-in table when omitted
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Flag results below this confidence percentage as uncertain
        #[arg(long)]
        threshold: Option<f64>,

        /// Include per-class probabilities
        #[arg(long)]
        probabilities: bool,
    },

    /// Check a running server's health
    Health {
        #[arg(long, default_value = "http://localhost:7860")]
        server: String,
    },

    /// Show the model status reported by a running server
    Status {
        #[arg(long, default_value = "http://localhost:7860")]
        server: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Inspect { artifact } => inspect(&artifact)?,
        Commands::Classify {
            image,
            model,
            catalog,
            threshold,
            probabilities,
        } => classify(&image, &model, catalog.as_deref(), threshold, probabilities)?,
        Commands::Health { server } => check_health(&server).await?,
        Commands::Status { server } => show_model_status(&server).await?,
    }

    Ok(())
}

fn load_registry(path: &Path) -> anyhow::Result<Arc<ModelRegistry>> {
    let registry = Arc::new(ModelRegistry::new(path));
    registry
        .load()
        .with_context(|| format!("loading model artifact {}", path.display()))?;
    Ok(registry)
}

/// Load and validate an artifact, print its summary
fn inspect(path: &Path) -> anyhow::Result<()> {
    let registry = load_registry(path)?;
    let model = registry.get()?;
    let artifact = &model.artifact;

    println!("Model: {}", artifact.name);
    println!("  Source:      {}", model.info.source.display());
    println!("  SHA-256:     {}", model.info.sha256);
    println!("  Size:        {} bytes", model.info.size_bytes);
    println!("  Format:      v{}", artifact.format_version);
    println!("  Classifier:  {}", artifact.classifier.kind());
    println!("  Scaler:      {}", if artifact.scaler.is_some() { "yes" } else { "none" });
    println!("  Features:    {:?} ({} values)", artifact.features, artifact.features.len());
    match artifact.threshold_percent() {
        Some(threshold) => println!("  Uncertain below: {:.1}%", threshold),
        None => println!("  Uncertain below: never flagged"),
    }
    println!("  Classes ({}):", artifact.classes.len());
    for class in &artifact.classes {
        match artifact.waste_map.get(class) {
            Some(hint) => println!("    - {} -> {}", class, hint),
            None => println!("    - {}", class),
        }
    }
    Ok(())
}

fn classify(
    image: &Path,
    model: &Path,
    catalog: Option<&Path>,
    threshold: Option<f64>,
    probabilities: bool,
) -> anyhow::Result<()> {
    if let Some(t) = threshold {
        if !(0.0..=100.0).contains(&t) {
            bail!("threshold must be a percentage in [0, 100], got {}", t);
        }
    }

    let table = match catalog {
        Some(path) => CategoryTable::from_file(path)
            .with_context(|| format!("loading category table {}", path.display()))?,
        None => CategoryTable::builtin(),
    };
    let registry = load_registry(model)?;
    let threshold = threshold.or_else(|| {
        registry
            .get()
            .ok()
            .and_then(|m| m.artifact.threshold_percent())
    });

    let bytes = std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    debug!("Classifying {} ({} bytes)", image.display(), bytes.len());

    let limits = ImageLimits::from(&PilarConfig::default().upload);
    let predictor = Predictor::new(registry, limits);
    let raw = predictor
        .classify(&bytes)
        .with_context(|| format!("classifying {}", image.display()))?;

    let result = PredictionResult::from_prediction(&raw, &table, threshold, probabilities);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Check server health
async fn check_health(server: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let url = format!("{}/health", server.trim_end_matches('/'));

    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("cannot connect to {}", server))?;
    if !response.status().is_success() {
        bail!("health check failed: {}", response.status());
    }

    let health: serde_json::Value = response.json().await?;
    let model_loaded = health
        .get("model_loaded")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if model_loaded {
        println!("Server is healthy");
    } else {
        println!("Server is up but the model is not loaded");
    }
    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(())
}

async fn show_model_status(server: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let url = format!("{}/api/model/status", server.trim_end_matches('/'));

    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("cannot connect to {}", server))?;
    if !response.status().is_success() {
        bail!("model status request failed: {}", response.status());
    }
    let status: serde_json::Value = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

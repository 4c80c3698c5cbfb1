use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::json;
use std::path::PathBuf;
use water_quality_monitor::{
    config::Config,
    ml::{
        BundleSummary, InferenceService, Prediction, RoundReport, TrainingDataset,
        TrainingPipeline, TrainingProgress, TrainingReport,
    },
    models::{FeatureInput, FLOW_M_S, PH, TEMPERATURE_C, TRASH_DETECTED, TURBIDITY_NTU},
    state::create_record_store,
    telemetry,
};

#[derive(Parser)]
#[command(name = "wq-cli")]
#[command(about = "Water quality monitor CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the classifier and write the artifact bundle
    Train {
        /// Training dataset (CSV)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Where to write the bundle
        #[arg(short, long)]
        artifact: Option<PathBuf>,

        /// Number of progress rounds
        #[arg(short, long)]
        rounds: Option<usize>,

        /// Trees added per round
        #[arg(short, long)]
        trees: Option<u16>,

        /// Split and bootstrap seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Predict from sensor values given on the command line
    Predict {
        #[arg(long)]
        temperature: f64,

        #[arg(long)]
        ph: f64,

        #[arg(long)]
        turbidity: f64,

        #[arg(long)]
        flow: f64,

        /// Trash seen by the camera (yes/no)
        #[arg(long, default_value = "no")]
        trash: String,

        /// Bundle to predict with
        #[arg(short, long)]
        artifact: Option<PathBuf>,
    },

    /// Predict the last row of the training dataset
    #[command(name = "predict-dataset-tail")]
    PredictDatasetTail {
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        #[arg(short, long)]
        artifact: Option<PathBuf>,
    },

    /// Predict the newest reading in the record store
    #[command(name = "predict-latest")]
    PredictLatest {
        #[arg(short, long)]
        artifact: Option<PathBuf>,
    },

    /// Show what the current bundle was trained with
    Inspect {
        #[arg(short, long)]
        artifact: Option<PathBuf>,
    },

    /// Post a reading to a running server
    Submit {
        #[arg(short, long, default_value = "http://localhost:5000")]
        endpoint: String,

        #[arg(long)]
        ph: f64,

        #[arg(long)]
        turbidity: f64,

        #[arg(long)]
        temperature: f64,

        #[arg(long)]
        flow: f64,
    },
}

/// Prints per-round accuracy as training runs
struct ConsoleProgress {
    quiet: bool,
}

impl TrainingProgress for ConsoleProgress {
    fn on_round(&mut self, report: &RoundReport) {
        if self.quiet {
            return;
        }
        println!(
            "Round {}/{} ({} trees)",
            report.round, report.rounds, report.n_trees
        );
        for acc in &report.accuracy {
            println!("  {:<26} {:>6.2}%", acc.target, acc.accuracy * 100.0);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });
    telemetry::init_tracing_with(&config.observability, std::io::stderr);

    let artifact_or_default =
        |artifact: Option<PathBuf>| artifact.unwrap_or_else(|| config.ml.artifact_path.clone());

    match cli.command {
        Commands::Train {
            dataset,
            artifact,
            rounds,
            trees,
            seed,
        } => {
            let mut config = config.clone();
            if let Some(rounds) = rounds {
                config.ml.training.rounds = rounds;
            }
            if let Some(trees) = trees {
                config.ml.training.trees_per_round = trees;
            }
            if let Some(seed) = seed {
                config.ml.training.seed = seed;
            }
            config.validate()?;

            let dataset = dataset.unwrap_or_else(|| config.ml.dataset_path.clone());
            let artifact = artifact.unwrap_or_else(|| config.ml.artifact_path.clone());

            let pipeline = TrainingPipeline::new(config.ml.training.clone());
            let mut progress = ConsoleProgress { quiet: cli.json };
            let report = pipeline
                .run(&dataset, &artifact, &mut progress)
                .with_context(|| format!("training on {} failed", dataset.display()))?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_training_report(&report);
                println!();
                println!("Bundle written to: {}", artifact.display());
            }
        }

        Commands::Predict {
            temperature,
            ph,
            turbidity,
            flow,
            trash,
            artifact,
        } => {
            let input = FeatureInput::new()
                .with(TEMPERATURE_C, temperature)
                .with(PH, ph)
                .with(TURBIDITY_NTU, turbidity)
                .with(FLOW_M_S, flow)
                .with(TRASH_DETECTED, trash);

            let service = InferenceService::new(artifact_or_default(artifact));
            let prediction = service.predict(&input)?;
            print_prediction(&prediction, cli.json)?;
        }

        Commands::PredictDatasetTail { dataset, artifact } => {
            let dataset = dataset.unwrap_or_else(|| config.ml.dataset_path.clone());
            let data = TrainingDataset::load_csv(&dataset)?;
            let sample = data
                .last_sample()
                .context("dataset has no rows to predict")?;

            if !cli.json {
                println!("Sample: {}", serde_json::to_string(&sample)?);
            }
            let service = InferenceService::new(artifact_or_default(artifact));
            let prediction = service.predict(&sample)?;
            print_prediction(&prediction, cli.json)?;
        }

        Commands::PredictLatest { artifact } => {
            let records = create_record_store(&config.records)?;
            let service = InferenceService::new(artifact_or_default(artifact));
            let result = service.predict_latest(records.as_ref()).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                let r = &result.reading;
                println!(
                    "Reading at {}: pH {} | turbidity {} | temperature {} | flow {}",
                    r.timestamp, r.ph_value, r.turbidity, r.temperature, r.flow_value
                );
                print_prediction(&result.prediction, false)?;
            }
        }

        Commands::Inspect { artifact } => {
            let service = InferenceService::new(artifact_or_default(artifact));
            let bundle = service.bundle()?;
            let summary = BundleSummary::from(bundle.as_ref());

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }

        Commands::Submit {
            endpoint,
            ph,
            turbidity,
            temperature,
            flow,
        } => {
            let client = Client::new();
            let response = client
                .post(format!("{}/v1/readings", endpoint.trim_end_matches('/')))
                .json(&json!({
                    "ph_value": ph,
                    "turbidity": turbidity,
                    "temperature": temperature,
                    "flow_value": flow,
                }))
                .send()
                .await
                .with_context(|| format!("failed to reach {}", endpoint))?;

            let status = response.status();
            let body: serde_json::Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            if !status.is_success() {
                bail!("server rejected reading: {}", status);
            }
        }
    }

    Ok(())
}

fn print_training_report(report: &TrainingReport) {
    println!();
    println!(
        "Final model: {} trees, {} training rows, {} held out",
        report.n_trees, report.n_train, report.n_test
    );
    for acc in &report.final_accuracy {
        println!("  {:<26} {:>6.2}%", acc.target, acc.accuracy * 100.0);
    }
}

fn print_prediction(prediction: &Prediction, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(&json!({ "prediction": prediction }))?);
        return Ok(());
    }
    for (target, value) in prediction.iter() {
        println!("  {:<26} {} ({})", target, value.label, value.numeric);
    }
    Ok(())
}

fn print_summary(summary: &BundleSummary) {
    println!("Schema version: {}", summary.schema_version);
    println!("Trained at:     {}", summary.trained_at);
    println!("Trees:          {}", summary.n_trees);
    println!("Rows:           {} train / {} held out", summary.n_train, summary.n_test);
    println!("Features:       {}", summary.feature_columns.join(", "));
    println!();
    for acc in &summary.held_out_accuracy {
        let classes = summary
            .classes
            .get(&acc.target)
            .map(|c| c.join(", "))
            .unwrap_or_default();
        println!("  {:<26} {:>6.2}%  [{}]", acc.target, acc.accuracy * 100.0, classes);
    }
}

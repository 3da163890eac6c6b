use anyhow::Result;
use clap::{Parser, Subcommand};

mod tasks;

#[derive(Parser)]
#[command(
    name = "water-deeplab",
    about = "DeepLabV3 water segmentation toolkit",
    author,
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fine-tune a model on image/mask pairs
    Train(tasks::train::TrainArgs),
    /// Predict water masks with a trained model
    Predict(tasks::predict::PredictArgs),
    /// Score predicted masks against ground truth
    Evaluate(tasks::evaluate::EvaluateArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match &cli.command {
        Commands::Train(args) => tasks::train::run(args),
        Commands::Predict(args) => tasks::predict::run(args),
        Commands::Evaluate(args) => tasks::evaluate::run(args),
    }
}

// ============================================================================
// rnn-lstm CLI
// init: fresh parameter blob | perplexity: score an id corpus | inspect: shapes
// ============================================================================

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

use rnn_lstm::checkpoint::peek_params;
use rnn_lstm::{evaluate, read_corpus, validate_corpus, Backend, LanguageModel, ModelConfig, Result};

#[derive(Parser)]
#[command(name = "rnn-lstm", version, about = "Stateful LSTM language model")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Builds a freshly initialised model and saves its parameters
    Init {
        #[command(flatten)]
        model: ModelArgs,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Perplexity of a whitespace-separated id corpus
    Perplexity {
        #[command(flatten)]
        model: ModelArgs,
        #[arg(short, long)]
        params: PathBuf,
        #[arg(short, long)]
        corpus: PathBuf,
        #[arg(long, default_value = "10")]
        batch_size: usize,
        #[arg(long, default_value = "35")]
        time_size: usize,
    },

    /// Lists the tensor shapes stored in a parameter blob
    Inspect { path: PathBuf },
}

#[derive(Args)]
struct ModelArgs {
    /// JSON model config; replaces the size flags below
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "10000")]
    vocab_size: usize,
    #[arg(long, default_value = "100")]
    wordvec_size: usize,
    #[arg(long, default_value = "100")]
    hidden_size: usize,
    #[arg(long, default_value = "0")]
    seed: u64,
    #[arg(long, default_value = "serial")]
    backend: Backend,
}

impl ModelArgs {
    fn resolve(&self) -> Result<ModelConfig> {
        match &self.config {
            Some(path) => ModelConfig::from_json_file(path),
            None => {
                let config = ModelConfig::new(self.vocab_size, self.wordvec_size, self.hidden_size)
                    .with_seed(self.seed)
                    .with_backend(self.backend);
                config.validate()?;
                Ok(config)
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { model, output } => {
            let model = LanguageModel::new(model.resolve()?)?;
            model.save_params(&output)?;
            println!("{} parameters written to {}", model.param_count(), output.display());
        }
        Commands::Perplexity { model, params, corpus, batch_size, time_size } => {
            let mut model = LanguageModel::load(model.resolve()?, &params)?;
            let corpus = read_corpus(&corpus)?;
            validate_corpus(&corpus, model.config().vocab_size)?;
            let metrics = evaluate(&mut model, &corpus, batch_size, time_size)?;
            println!("{metrics}");
        }
        Commands::Inspect { path } => {
            let shapes = peek_params(&path)?;
            let total: usize = shapes.iter().map(|s| s.iter().product::<usize>()).sum();
            for (k, shape) in shapes.iter().enumerate() {
                println!("{k:>3}  {shape:?}");
            }
            println!("{} tensors, {total} values", shapes.len());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use meridian_catalog::read_catalog;
use meridian_config::{touch_health_marker, Config};
use meridian_engine::{ExecutionEngine, ServiceAdapter};
use meridian_message::OperationMessage;

mod service;

/// Meridian - run a data transformation service against an operation message
#[derive(Parser)]
#[command(name = "meridian")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Invoke the service on an operation message and input catalog
  Invoke {
    /// The operation message as a JSON string
    #[arg(long, conflicts_with = "input_file")]
    input: Option<String>,

    /// Path to a file containing the operation message
    #[arg(long)]
    input_file: Option<PathBuf>,

    /// Path to the input catalog naming the items to process
    #[arg(long)]
    sources: PathBuf,

    /// Directory the output catalog and error document are written to
    #[arg(long)]
    metadata_dir: PathBuf,

    /// Override for the staging destination, e.g. s3://bucket/prefix/
    #[arg(long)]
    data_location: Option<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  let config = Arc::new(Config::from_env().context("configuration is invalid")?);
  init_tracing(&config);

  touch_health_marker(&config.health_check_path)
    .context("could not touch the health marker file")?;

  let code = match cli.command {
    Commands::Invoke {
      input,
      input_file,
      sources,
      metadata_dir,
      data_location,
    } => invoke(config, input, input_file, sources, metadata_dir, data_location).await?,
  };
  std::process::exit(code);
}

async fn invoke(
  config: Arc<Config>,
  input: Option<String>,
  input_file: Option<PathBuf>,
  sources: PathBuf,
  metadata_dir: PathBuf,
  data_location: Option<String>,
) -> Result<i32> {
  let text = match (input, input_file) {
    (Some(text), _) => text,
    (None, Some(path)) => std::fs::read_to_string(&path)
      .with_context(|| format!("cannot read operation message from {}", path.display()))?,
    (None, None) => anyhow::bail!("one of --input or --input-file is required"),
  };

  let mut message = OperationMessage::from_json(&text).context("invalid operation message")?;
  if let Some(location) = data_location {
    message.staging_location = Some(location);
  }
  info!(
    request_id = message.request_id.as_deref().unwrap_or(""),
    version = %message.version,
    sources = message.sources.len(),
    "operation_message_parsed"
  );

  let catalog = read_catalog(&sources)
    .with_context(|| format!("cannot read input catalog {}", sources.display()))?;
  std::fs::create_dir_all(&metadata_dir)
    .with_context(|| format!("cannot create metadata directory {}", metadata_dir.display()))?;

  let engine = ExecutionEngine::new(
    config,
    message,
    ServiceAdapter::PerItem(Arc::new(service::SummaryAdapter)),
  );

  let token = engine.cancellation_token();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      token.cancel();
    }
  });

  let outcome = engine.run(catalog, &metadata_dir).await?;
  Ok(outcome.exit_code())
}

fn init_tracing(config: &Config) {
  let filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
  if config.text_logger {
    tracing_subscriber::fmt().with_env_filter(filter).init();
  } else {
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
  }
}

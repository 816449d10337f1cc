use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vox_relay::Config;
use vox_relay::api::ApiServer;

/// Vox - Resilient voice assistant relay
#[derive(Parser)]
#[command(name = "vox", version, about)]
struct Cli {
    /// Port to listen on (overrides config file)
    #[arg(long, env = "VOX_PORT")]
    port: Option<u16>,

    /// Path to a config file (default: ~/.config/vox/config.toml)
    #[arg(short, long, env = "VOX_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one voice turn on a local audio file and print the response
    Query {
        /// Audio file (webm, wav, mp3, ogg)
        file: PathBuf,
        /// Conversation session to continue
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Render text through the fallback cascade and print the reference
    Speak {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the fallback voice.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,vox_relay=info",
        1 => "info,vox_relay=debug",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Some(Command::Query { file, session }) => query(&config, &file, session.as_deref()).await,
        Some(Command::Speak { text }) => speak(&config, &text).await,
        None => serve(&config).await,
    }
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    tracing::info!(port = config.server.port, "starting vox relay");

    let pipeline = Arc::new(config.pipeline()?);
    ApiServer::new(pipeline, config.server.host.clone(), config.server.port)
        .run()
        .await?;

    Ok(())
}

/// Run a single voice turn against the configured providers
async fn query(
    config: &Config,
    file: &std::path::Path,
    session: Option<&str>,
) -> anyhow::Result<()> {
    let audio = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let pipeline = config.pipeline()?;

    let response = pipeline.run_voice_query(&audio, session).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Exercise the fallback cascade without the rest of the pipeline
async fn speak(config: &Config, text: &str) -> anyhow::Result<()> {
    let fallback = config.fallback_synthesizer()?;

    let reference = fallback.synthesize(text).await;
    println!("{reference}");
    Ok(())
}

use anyhow::{Context, Result};
use clap::Parser;
use remvox::cli::{Cli, Commands};
use remvox::config::ConfigStore;
use remvox::decoder::NullEngineFactory;
use remvox::server::{Server, WorkerMode};
use remvox::session::{WorkerLauncher, run_worker_process};
use remvox::{defaults, version_string};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(defaults::DEFAULT_CONFIG_PATH));

    match cli.command {
        None | Some(Commands::Serve { listen: None }) => {
            serve(config_path, None).await?;
        }
        Some(Commands::Serve { listen }) => {
            serve(config_path, listen).await?;
        }
        Some(Commands::CheckConfig) => {
            check_config(&config_path)?;
        }
        Some(Commands::Worker { audio_prefix }) => {
            let prefix =
                audio_prefix.unwrap_or_else(|| defaults::DEFAULT_AUDIO_PREFIX.to_string());
            run_worker_process(Arc::new(NullEngineFactory), &prefix)?;
        }
    }
    Ok(())
}

async fn serve(config_path: PathBuf, listen: Option<String>) -> Result<()> {
    tracing::info!(version = %version_string(), "starting remvox");
    let store = Arc::new(
        ConfigStore::open(config_path.clone())
            .with_context(|| format!("failed to load config from {:?}", config_path))?,
    );
    let snapshot = store.snapshot();
    let listen = listen.unwrap_or_else(|| snapshot.server.listen.clone());
    let launcher = WorkerLauncher::current_exe(&snapshot.stt.audio_prefix)
        .context("failed to locate worker executable")?;

    let server = Server::new(store, WorkerMode::Process(launcher));
    server.run(&listen).await?;
    Ok(())
}

fn check_config(config_path: &PathBuf) -> Result<()> {
    let config = remvox::Config::load(config_path)
        .with_context(|| format!("failed to load config from {:?}", config_path))?;

    let mut failures = 0usize;
    for (key, entry) in &config.languages {
        let accents: Vec<Option<&str>> = std::iter::once(None)
            .chain(entry.accents.keys().map(|a| Some(a.as_str())))
            .collect();
        for accent in accents {
            match config.resolve(key, accent) {
                Ok((model, _)) => match model.validate() {
                    Ok(()) => println!(
                        "ok: {}{}",
                        key,
                        accent.map(|a| format!(" ({})", a)).unwrap_or_default()
                    ),
                    Err(e) => {
                        failures += 1;
                        eprintln!("invalid: {}: {}", key, e);
                    }
                },
                Err(e) => {
                    failures += 1;
                    eprintln!("invalid: {}: {}", key, e);
                }
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} model configuration(s) failed validation", failures);
    }
    println!("configuration valid: {} language(s)", config.languages.len());
    Ok(())
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

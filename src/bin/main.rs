//! gridfill CLI
//!
//! Usage:
//!   gridfill run --scene <FILE> --request <FILE> [--out <FILE>]
//!   gridfill components --scene <FILE>
//!   gridfill relay [--port <PORT>]
//!
//! Global options:
//!   -c, --config <FILE>  Settings file (TOML)
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gridfill::config::SettingsError;
use gridfill::diagnostic;
use gridfill::fetch::{FetchError, ProxyFetcher};
use gridfill::orchestrator::BatchError;
use gridfill::protocol::{PluginMessage, UiChannel, UiMessage};
use gridfill::relay::{self, RelayError, RelayState};
use gridfill::scene::{InMemoryScene, NodeId, SceneDocument, SceneError};
use gridfill::{Plugin, Settings};

#[derive(Parser)]
#[command(name = "gridfill")]
#[command(about = "Fill template instances with tabular data")]
struct Cli {
    /// Settings file (TOML format)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a manual-grid request against a scene snapshot
    Run {
        /// Scene snapshot (JSON)
        #[arg(long)]
        scene: PathBuf,

        /// manual-grid message (JSON)
        #[arg(long)]
        request: PathBuf,

        /// Where to write the resulting scene (stdout if not provided)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Page to run on, by id (the snapshot's current page if not provided)
        #[arg(long)]
        page: Option<String>,
    },

    /// List the components of a scene snapshot's current page
    Components {
        /// Scene snapshot (JSON)
        #[arg(long)]
        scene: PathBuf,
    },

    /// Serve the image relay
    Relay {
        /// Port to listen on (overrides the settings file)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Debug, Error)]
enum AppError {
    #[error("error reading '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error writing '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Already rendered as a diagnostic
    #[error("{0}")]
    Input(String),

    #[error("expected a manual-grid message in '{0}'")]
    NotABatch(PathBuf),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("error encoding output: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Forwards UI messages to the log
struct LogChannel;

impl UiChannel for LogChannel {
    fn post(&self, message: PluginMessage) {
        match serde_json::to_string(&message) {
            Ok(json) => tracing::info!(message = %json, "ui"),
            Err(e) => tracing::warn!(error = %e, "could not encode ui message"),
        }
    }
}

fn read(path: &Path) -> Result<String, AppError> {
    fs::read_to_string(path).map_err(|source| AppError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn load_settings(path: Option<&Path>) -> Result<Settings, AppError> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let source = read(path)?;
    match Settings::from_toml_str(&source) {
        Ok(settings) => Ok(settings),
        Err(SettingsError::Parse(e)) => Err(AppError::Input(diagnostic::report_settings_error(
            &path.display().to_string(),
            &source,
            &e,
        ))),
        Err(e) => Err(e.into()),
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let source = read(path)?;
    serde_json::from_str(&source).map_err(|e| {
        AppError::Input(diagnostic::report_json_error(
            &path.display().to_string(),
            &source,
            &e,
        ))
    })
}

fn load_scene(path: &Path) -> Result<InMemoryScene, AppError> {
    let document: SceneDocument = parse_json(path)?;
    Ok(InMemoryScene::from_document(document)?)
}

async fn run_batch(
    settings: Settings,
    scene_path: &Path,
    request_path: &Path,
    out: Option<&Path>,
    page: Option<String>,
) -> Result<(), AppError> {
    let scene = load_scene(scene_path)?;
    if let Some(page) = page {
        scene.set_current_page(&NodeId::new(page))?;
    }
    let message: UiMessage = parse_json(request_path)?;
    if !matches!(message, UiMessage::ManualGrid(_)) {
        return Err(AppError::NotABatch(request_path.to_path_buf()));
    }

    let fetcher = ProxyFetcher::new(settings.proxy_endpoint.clone(), settings.fetch_timeout())?;
    let plugin = Plugin::new(Arc::new(scene.clone()), Arc::new(fetcher), Arc::new(LogChannel))
        .with_settings(settings);
    let ctx = scene.context();

    if let gridfill::plugin::Handled::Batch(summary) = plugin.handle(&ctx, message).await? {
        eprintln!(
            "Generated {} of {} rows ({} dropped, {} failed, {} fields skipped)",
            summary.generated_count(),
            summary.total_rows,
            summary.dropped_rows.len(),
            summary.failed_rows.len(),
            summary.skipped.len()
        );
    }

    let output = serde_json::to_string_pretty(&scene.to_document())?;
    match out {
        Some(path) => fs::write(path, output).map_err(|source| AppError::Write {
            path: path.to_path_buf(),
            source,
        })?,
        None => println!("{}", output),
    }
    Ok(())
}

async fn list_components(scene_path: &Path) -> Result<(), AppError> {
    let scene = load_scene(scene_path)?;
    let ctx = scene.context();
    let plugin = Plugin::new(
        Arc::new(scene.clone()),
        Arc::new(gridfill::fetch::InMemoryFetcher::new()),
        Arc::new(LogChannel),
    );
    let components = plugin.list_components(&ctx).await;
    println!("{}", serde_json::to_string_pretty(&components)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let settings = load_settings(cli.config.as_deref())?;
    match cli.command {
        Command::Run {
            scene,
            request,
            out,
            page,
        } => run_batch(settings, &scene, &request, out.as_deref(), page).await,
        Command::Components { scene } => list_components(&scene).await,
        Command::Relay { port } => {
            let port = port.unwrap_or(settings.relay_port);
            let state = RelayState::new(settings.fetch_timeout())?;
            relay::serve(SocketAddr::from(([0, 0, 0, 0], port)), state).await?;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "gridfill=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        match e {
            AppError::Input(diagnostic) => eprint!("{}", diagnostic),
            other => eprintln!("Error: {}", other),
        }
        process::exit(1);
    }
}

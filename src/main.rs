use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod app;
mod config;
mod conversation;
mod handler;
mod openai;
mod tui;
mod ui;

use app::App;
use config::Config;
use openai::OpenAIClient;

#[derive(Parser)]
#[command(name = "tutor", version)]
#[command(about = "Scaffolding tutor chat for math and science homework")]
struct Cli {
    /// Chat model to use (overrides the config default)
    #[arg(short, long)]
    model: Option<String>,

    /// How many recent messages are sent with each request
    #[arg(short, long)]
    window: Option<usize>,

    /// Log file path (defaults to tutor.log in the config directory)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_default();

    // No credential, no session. This must fail before the terminal UI takes
    // over the screen.
    let api_key = config.resolve_api_key().ok_or_else(|| {
        anyhow!(
            "missing OpenAI API key: set OPENAI_API_KEY or add \"openai_api_key\" \
             to the config file under your config directory (tutor/config.json)"
        )
    })?;

    init_logging(cli.log_file.clone())?;

    let model = cli
        .model
        .or_else(|| config.default_model.clone())
        .unwrap_or_else(|| openai::DEFAULT_MODEL.to_string());
    let window = cli.window.unwrap_or_else(|| config.history_window());
    let client = OpenAIClient::with_base(&api_key, &config.resolve_api_base());

    info!(model = %model, window, "starting session");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, App::new(client, model, window)).await;
    tui::restore()?;

    result
}

async fn run(terminal: &mut tui::Tui, mut app: App) -> Result<()> {
    let mut events = tui::EventHandler::new();

    while !app.should_quit {
        // Full redraw every iteration; state mutations always become visible
        terminal.draw(|frame| ui::render(&mut app, frame))?;

        // Reap the outstanding request. The tick event wakes this loop while
        // the request is in flight, so completion is picked up promptly.
        if app.pending.as_ref().is_some_and(|h| h.is_finished()) {
            if let Some(handle) = app.pending.take() {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(anyhow!("request task failed: {}", e)),
                };
                app.finish_turn(result);
            }
            continue;
        }

        match events.next().await {
            Some(event) => handler::handle_event(&mut app, event),
            None => break,
        }
    }

    info!("session ended");
    Ok(())
}

/// Logs go to a file; the terminal is owned by the UI.
fn init_logging(log_file: Option<PathBuf>) -> Result<()> {
    let path = match log_file {
        Some(path) => path,
        None => {
            let dir = dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("tutor");
            std::fs::create_dir_all(&dir)?;
            dir.join("tutor.log")
        }
    };

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_ansi(false)
        .with_writer(Arc::new(file))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

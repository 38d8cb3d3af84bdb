use std::path::PathBuf;

use adventure_core::{Config, ModelClient, OllamaClient, OpenAIClient, Provider};
use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser, Debug)]
#[command(name = "adventure")]
#[command(about = "Play a text adventure narrated by a language model")]
#[command(version)]
struct Cli {
    /// Model provider (ollama or openai)
    #[arg(short, long)]
    provider: Option<String>,

    /// Model to use
    #[arg(short, long)]
    model: Option<String>,

    /// Ollama base URL
    #[arg(long)]
    ollama_url: Option<String>,

    /// Sampling temperature
    #[arg(short, long)]
    temperature: Option<f32>,

    /// Maximum tokens per narrator reply
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Directory for log files
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Cli {
    /// Flags win over the config file
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(provider) = &self.provider {
            let provider = Provider::from_str(provider).ok_or_else(|| {
                let known: Vec<&str> = Provider::all().iter().map(|p| p.as_str()).collect();
                anyhow!("unknown provider '{}', expected one of: {}", provider, known.join(", "))
            })?;
            config.provider = Some(provider.as_str().to_string());
        }
        if let Some(model) = &self.model {
            config.default_model = Some(model.clone());
        }
        if let Some(url) = &self.ollama_url {
            config.ollama_url = url.clone();
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        Ok(())
    }
}

/// Log to a daily file; the terminal belongs to the UI.
fn init_logging(log_dir: Option<PathBuf>) -> Result<WorkerGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => dirs::data_local_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?
            .join("text-adventure")
            .join("logs"),
    };
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "adventure.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
        .init();

    Ok(guard)
}

fn build_client(config: &Config) -> ModelClient {
    match config.provider() {
        Provider::Ollama => ModelClient::Ollama(OllamaClient::new(&config.ollama_url)),
        Provider::OpenAI => ModelClient::OpenAI(OpenAIClient::new(
            &config.openai_url,
            config.resolved_openai_key(),
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_dir.clone())?;

    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not read config, using defaults");
        Config::new()
    });
    cli.apply(&mut config)?;

    let client = build_client(&config);
    let model = config
        .default_model
        .clone()
        .unwrap_or_else(|| client.provider().default_model().to_string());
    tracing::info!(provider = %client.provider(), %model, "starting");

    let mut events = EventHandler::new();
    let mut app = App::new(&config, client, model, events.sender());
    app.spawn_detection();

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, &mut app, &mut events).await;

    app.abort_generation();
    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event)?,
            None => break,
        }
    }
    Ok(())
}

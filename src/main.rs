use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

mod config;
mod context;
mod event_source;
mod interpreter;
mod llm_manager;
mod logger;
mod orchestrator;
mod providers;
mod stages;
mod ui;

use config::{Config, Credentials};
use event_source::HasDataClient;
use interpreter::Interpreter;
use llm_manager::LLMManager;
use orchestrator::{Orchestrator, PipelineError};
use ui::UIHandler;

#[derive(Parser)]
#[command(name = "event_scout")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
    /// Plain output without colors or spinner
    #[arg(long)]
    headless: bool,
    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
    /// Request in plain words; read from stdin when omitted
    #[arg(last = true)]
    request: Vec<String>,
}

fn read_request() -> Result<String> {
    print!("{}", UIHandler::prompt_text());
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read request from stdin")?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logger::init(args.verbose);
    dotenv::dotenv().ok();

    let mut config = Config::load(&args.config)?;
    config.merge_with_args(args.headless);
    let credentials = Credentials::from_env(&config.backend)?;
    info!("Configuration loaded: {:?}", credentials);

    let client = config.network.http_client()?;
    let llm_manager = LLMManager::from_config(&config.backend, &credentials, client.clone())?;
    let events = HasDataClient::new(client, credentials.events_api_key.clone(), &config.events);
    let ui = UIHandler::new(&config.ui);

    let input = if args.request.is_empty() {
        read_request()?
    } else {
        args.request.join(" ")
    };

    let parsed = Interpreter::parse(&input);
    info!("Parsed request: {:?}", parsed);

    let orchestrator = Orchestrator::new(&llm_manager, &events);
    let mut spinner = None;
    let result = orchestrator
        .handle(&parsed, |feed| {
            ui.show_events(feed);
            spinner = ui.start_spinner("Planning, forecasting and recommending...");
        })
        .await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    match result {
        Ok(recommendation) => {
            info!("Event plan:\n{}", recommendation.event_plan);
            info!("Weather:\n{}", recommendation.weather);
            info!("{} messages exchanged", recommendation.messages_exchanged);
            ui.show_recommendation(&recommendation);
            Ok(())
        }
        Err(e @ PipelineError::MissingRequiredField { .. }) => {
            ui.show_error(&e.to_string());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

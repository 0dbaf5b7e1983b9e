//! llmchat - an interactive terminal chat client for a local Ollama server.
//!
//! Checks that the server answers, then reads prompts line by line and prints
//! the model's replies. Failed requests are retried with backoff, and Ctrl+C
//! ends the session cleanly even while a request is outstanding.

mod chat;
mod config;
mod console;
mod indicator;
mod inference;
mod retry;
mod validate;

use anyhow::{Context, Result};
use chat::ChatSession;
use clap::{Parser, Subcommand};
use config::Config;
use inference::OllamaClient;
use retry::RetryPolicy;
use std::process::Command as ProcessCommand;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "llmchat")]
#[command(author, version, about = "Chat with a local Ollama model from your terminal")]
#[command(long_about = "Chat with a local Ollama model from your terminal.\n\nType 'exit', 'quit' or an empty line, or press Ctrl+C, to end the conversation.")]
struct Cli {
    /// Ask a single question and exit instead of starting a conversation
    #[arg(value_name = "QUERY")]
    query: Option<String>,

    /// Override the model from the config file
    #[arg(short = 'm', long, value_name = "MODEL")]
    model: Option<String>,

    /// Override the Ollama host URL
    #[arg(long, value_name = "URL")]
    host: Option<String>,

    /// Attempts per prompt, including the first one
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(short = 't', long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Enable debug logging on stderr
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the Ollama server answers, then exit
    Check,
    /// Open configuration file in $EDITOR
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("Unrecoverable error: {:#}", e);
            println!("❌ Critical error: {:#}", e);
            println!("Please check your configuration and try again.");
            1
        }
    };

    // Exit directly: a pending stdin read would otherwise keep the runtime alive.
    std::process::exit(code);
}

/// Log to stderr so status and answers on stdout stay readable.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("llmchat={},reqwest=warn", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    if let Some(Commands::Config) = cli.command {
        handle_config()?;
        return Ok(0);
    }

    let config = load_config(&cli)?;
    info!(
        model = %config.server.model,
        host = %config.server.host,
        max_retries = config.chat.max_retries,
        timeout_secs = config.chat.timeout_secs,
        "Configuration loaded"
    );

    let client = Arc::new(OllamaClient::new(&config.server, config.timeout())?);
    if !connect(&client, &config).await? {
        return Ok(1);
    }

    match (cli.command, cli.query) {
        (Some(Commands::Check), _) => Ok(0),
        (_, Some(query)) => handle_query(client, &config, &query).await,
        (_, None) => handle_chat(client, &config).await,
    }
}

/// Load the config file and apply command-line overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load().context("Failed to load configuration")?;

    if let Some(model) = &cli.model {
        config.server.model = model.clone();
    }
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(max_retries) = cli.max_retries {
        config.chat.max_retries = max_retries;
    }
    if let Some(timeout) = cli.timeout {
        config.chat.timeout_secs = timeout;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Run the startup check, printing progress.
async fn connect(client: &OllamaClient, config: &Config) -> Result<bool> {
    let label = &config.chat.assistant_name;
    println!("🔄 Initializing connection to {}...", label);

    let mut out = console::Stdout;
    if !validate::validate(client, &mut out).await? {
        println!(
            "❌ Failed to connect to {}. Please check your setup and try again.",
            label
        );
        return Ok(false);
    }

    println!("✅ Connected to {} successfully! (model: {})", label, client.model());
    Ok(true)
}

/// Start the interactive conversation.
async fn handle_chat(client: Arc<OllamaClient>, config: &Config) -> Result<i32> {
    println!("💡 Type 'exit', 'quit', or press Ctrl+C to end the conversation.\n");

    let shutdown = CancellationToken::new();
    cancel_on_interrupt(shutdown.clone());

    let mut session = build_session(client, config, shutdown);
    let mut input = BufReader::new(tokio::io::stdin());
    session.run(&mut input).await?;
    Ok(0)
}

/// Answer one query and exit; a failed reply exits with status 1.
async fn handle_query(client: Arc<OllamaClient>, config: &Config, query: &str) -> Result<i32> {
    let prompt = match chat::parse_input(query) {
        chat::Command::Prompt(prompt) => prompt,
        chat::Command::Exit => return Ok(0),
    };

    let shutdown = CancellationToken::new();
    cancel_on_interrupt(shutdown.clone());

    let session = build_session(client, config, shutdown);
    match session.ask(&prompt).await {
        Some(turn) => {
            if console::stdout_is_terminal() {
                console::clear_line(&mut console::Stdout)?;
            }
            println!("{}", turn.reply.text);
            Ok(if turn.reply.succeeded { 0 } else { 1 })
        }
        None => {
            println!("\n{}", console::FAREWELL);
            Ok(0)
        }
    }
}

fn build_session(
    client: Arc<OllamaClient>,
    config: &Config,
    shutdown: CancellationToken,
) -> ChatSession<OllamaClient, console::Stdout> {
    ChatSession::new(
        client,
        RetryPolicy::new(config.chat.max_retries),
        config.chat.assistant_name.clone(),
        shutdown,
        console::Stdout,
    )
    .with_animation(console::stdout_is_terminal())
}

/// Cancel `shutdown` on the first Ctrl+C.
fn cancel_on_interrupt(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
    });
}

/// Handle the config command.
fn handle_config() -> Result<()> {
    let config_path = Config::config_path()?;

    // Create default config if it doesn't exist
    if !config_path.exists() {
        Config::default().save()?;
        println!("Created default config at {}", config_path.display());
    }

    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let status = ProcessCommand::new(&editor)
        .arg(&config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        eprintln!("Editor exited with non-zero status");
    }

    Ok(())
}

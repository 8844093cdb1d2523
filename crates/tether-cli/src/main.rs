//! Tether CLI: chat with a model that can call tools on MCP servers.

mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::SlashCommand;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tether_api::AnthropicProvider;
use tether_config::{CliOverrides, TetherConfig};
use tether_core::{Orchestrator, OrchestratorConfig, QueryEvent};
use tether_mcp::{ConnectionManager, DEFAULT_PROBE_TIMEOUT, DefaultConnector, Invoker};
use tether_types::ellipsize;

#[derive(Parser)]
#[command(name = "tether", version, about = "Chat with a model that can call MCP tools")]
struct Cli {
    /// Send a single prompt and print the response (non-interactive)
    #[arg(short, long)]
    print: Option<String>,

    /// Model to use
    #[arg(long)]
    model: Option<String>,

    /// Maximum tokens in each response
    #[arg(long)]
    max_tokens: Option<u32>,

    /// API key (overrides ANTHROPIC_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Maximum chained tool calls per query
    #[arg(long)]
    max_depth: Option<usize>,

    /// Connect only these servers at startup (repeatable; default: all enabled)
    #[arg(long = "connect", value_name = "NAME")]
    connect: Vec<String>,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = TetherConfig::load(CliOverrides {
        api_key: cli.api_key,
        model: cli.model,
        max_tokens: cli.max_tokens,
        max_depth: cli.max_depth,
    })
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    let mut orchestrator = create_orchestrator(&config)?;
    connect_startup_servers(&orchestrator, &cli.connect).await;

    let result = match cli.print {
        Some(prompt) => run_query(&orchestrator, &prompt).await,
        None => repl(&mut orchestrator).await,
    };

    let closed = orchestrator.manager().disconnect_all().await;
    tracing::debug!("Disconnected {closed} server(s) on exit");
    result
}

fn create_orchestrator(config: &TetherConfig) -> Result<Orchestrator> {
    let provider = AnthropicProvider::new(&config.api_key, &config.api_base_url)
        .context("Failed to create API client")?;
    let connector = DefaultConnector::new().context("Failed to create tool-server client")?;
    let manager = Arc::new(ConnectionManager::new(
        config.servers.clone(),
        Arc::new(connector),
    ));
    let invoker = Invoker::new(manager).with_retry_config(config.invoker_retry.clone());

    let mut settings = OrchestratorConfig::new(config.model.clone(), config.max_tokens);
    settings.max_depth = config.max_depth;
    settings.system_prompt = Some(
        config
            .system_prompt
            .clone()
            .unwrap_or_else(default_system_prompt),
    );
    Ok(Orchestrator::new(Arc::new(provider), invoker, settings))
}

/// Connect the requested servers, or every enabled one. Failures are reported
/// and skipped.
async fn connect_startup_servers(orchestrator: &Orchestrator, requested: &[String]) {
    let names: Vec<String> = if requested.is_empty() {
        orchestrator
            .manager()
            .descriptors()
            .iter()
            .filter(|d| d.enabled)
            .map(|d| d.name.clone())
            .collect()
    } else {
        requested.to_vec()
    };

    for name in names {
        match orchestrator.connect_to_server(&name).await {
            Ok(()) => tracing::info!("Connected to '{name}'"),
            Err(e) => eprintln!("Warning: could not connect to '{name}': {e}"),
        }
    }
}

async fn repl(orchestrator: &mut Orchestrator) -> Result<()> {
    let stdin = io::stdin();
    let connected = orchestrator.connected_servers().await;

    eprintln!(
        "tether v{} (model: {}, servers: {})",
        env!("CARGO_PKG_VERSION"),
        orchestrator.model(),
        if connected.is_empty() {
            "none".to_string()
        } else {
            connected.join(", ")
        }
    );
    eprintln!("Type your message, or /help for commands. Press Ctrl+D to exit.\n");

    loop {
        eprint!("> ");
        io::stderr().flush()?;

        let mut input = String::new();
        let bytes_read = stdin.lock().read_line(&mut input)?;
        if bytes_read == 0 {
            eprintln!();
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = SlashCommand::parse(input) {
            if handle_slash_command(orchestrator, command).await {
                break;
            }
            continue;
        }

        run_query(orchestrator, input).await?;
        println!();
    }

    Ok(())
}

/// Run one slash command. Returns `true` when the REPL should exit.
async fn handle_slash_command(orchestrator: &mut Orchestrator, command: SlashCommand) -> bool {
    let manager = orchestrator.manager();
    match command {
        SlashCommand::Quit => return true,
        SlashCommand::Help => commands::print_help(),
        SlashCommand::Usage(usage) => eprintln!("Usage: {usage}"),
        SlashCommand::Unknown(cmd) => {
            eprintln!("Unknown command: {cmd}. Type /help for available commands.")
        }
        SlashCommand::Servers => {
            if manager.descriptors().is_empty() {
                eprintln!("No servers configured. Add [servers.<name>] to ~/.tether/config.toml.");
            }
            for descriptor in manager.descriptors() {
                let status = manager.status(&descriptor.name).await;
                let disabled = if descriptor.enabled { "" } else { " (disabled)" };
                eprintln!(
                    "  {:<16} {:<13} {}{}",
                    descriptor.name, status, descriptor.endpoint, disabled
                );
            }
        }
        SlashCommand::Tools => {
            let capabilities = orchestrator.capabilities().await;
            if capabilities.is_empty() {
                eprintln!("No capabilities: no server is connected.");
            }
            for (server, capability) in capabilities {
                eprintln!(
                    "  {:<32} [{server}] {}",
                    capability.name,
                    ellipsize(&capability.description, 80)
                );
            }
        }
        SlashCommand::Connect(name) => match orchestrator.connect_to_server(&name).await {
            Ok(()) => eprintln!("Connected to '{name}'."),
            Err(e) => eprintln!("Failed to connect: {e}"),
        },
        SlashCommand::Disconnect(name) => match orchestrator.disconnect_from_server(&name).await {
            Ok(()) => eprintln!("Disconnected from '{name}'."),
            Err(e) => eprintln!("Failed to disconnect: {e}"),
        },
        SlashCommand::Check(name) => {
            match manager.check_availability(&name, DEFAULT_PROBE_TIMEOUT).await {
                Ok(availability) => eprintln!(
                    "  {name}: {} ({}ms) {}",
                    availability.status,
                    availability.latency.as_millis(),
                    availability.diagnostic
                ),
                Err(e) => eprintln!("Check failed: {e}"),
            }
        }
        SlashCommand::Model(choice) => select_model(orchestrator, choice),
    }
    false
}

/// `/model`: list what the backend offers, or switch for later queries.
fn select_model(orchestrator: &mut Orchestrator, choice: Option<String>) {
    match choice {
        Some(model) => {
            orchestrator.set_model(model);
            eprintln!("Model set to: {}", orchestrator.model());
        }
        None => {
            let (backend, models) = orchestrator.available_models();
            eprintln!("Available models ({backend}):");
            for model in models {
                let marker = if *model == orchestrator.model() { "*" } else { " " };
                eprintln!("  {marker} {model}");
            }
            eprintln!("Current model: {}", orchestrator.model());
        }
    }
}

/// Run a query and stream its progress to stdout.
async fn run_query(orchestrator: &Orchestrator, text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    orchestrator
        .process_query_streaming(text, |event| match event {
            QueryEvent::TextDelta(text) => {
                let _ = write!(out, "{text}");
                let _ = out.flush();
            }
            QueryEvent::ToolCall { name, input } => {
                let _ = writeln!(out);
                let _ = writeln!(out, "  [tool: {name} {}]", ellipsize(&input.to_string(), 120));
            }
            QueryEvent::ToolResult {
                name,
                text,
                is_error,
            } => {
                let outcome = if is_error { "error" } else { "done" };
                let _ = writeln!(out, "  [tool {name} {outcome}: {}]", ellipsize(&text, 200));
            }
            QueryEvent::Warning(warning) => {
                let _ = writeln!(io::stderr(), "\nWarning: {warning}");
            }
            QueryEvent::Error(e) => {
                let _ = writeln!(io::stderr(), "\nError: {e}");
            }
            QueryEvent::Done { .. } => {
                let _ = writeln!(out);
            }
        })
        .await;

    out.flush().context("Failed to flush output")?;
    Ok(())
}

fn default_system_prompt() -> String {
    "You are a helpful assistant with access to tools provided by connected servers. \
     Call a tool when it helps answer the question, supplying every required parameter. \
     If a tool fails, explain what happened and answer with the information available."
        .to_string()
}

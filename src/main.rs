use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use toolchat::agent_core::{ConversationLedger, LedgerStore, Orchestrator};
use toolchat::config::{find_config_path, load_config, AppConfig};
use toolchat::inference::InferenceClient;
use toolchat::mcp_client::ProcessConnector;

/// Chat with an MCP tool server through a language model.
#[derive(Parser, Debug)]
#[command(name = "toolchat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file path (default: $TOOLCHAT_CONFIG, then toolchat.yaml in cwd or a parent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Resume a stored conversation by id
    #[arg(long)]
    conversation: Option<String>,

    /// Keep the conversation in memory only
    #[arg(long)]
    no_persist: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_path =
        toolchat::init_tracing(&toolchat::data_dir()).context("failed to initialize logging")?;

    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let config_path = find_config_path(cli.config.as_deref(), &cwd)?;
    let config = load_config(&config_path)?;
    tracing::info!(path = %config_path.display(), "loaded config");

    let ledger = Arc::new(open_ledger(&cli, &config)?);

    let client = Arc::new(InferenceClient::new(config.model.clone())?);
    if !client.health_check().await {
        tracing::warn!(base_url = %config.model.base_url, "model endpoint is not reachable yet");
    }

    let connector = Arc::new(ProcessConnector::new(
        config.server.clone(),
        config.agent.timeouts(),
    ));
    let orchestrator = Orchestrator::new(connector, client.clone(), client, ledger.clone())
        .with_history_window(config.agent.history_window);

    println!(
        "toolchat {} | conversation {} | logs at {}",
        env!("CARGO_PKG_VERSION"),
        ledger.conversation_id(),
        log_path.display()
    );
    println!("Ask a question, or type 'exit' to quit.");

    repl(&orchestrator).await
}

/// Open the conversation ledger, attaching the SQLite mirror unless disabled.
fn open_ledger(cli: &Cli, config: &AppConfig) -> Result<ConversationLedger> {
    let db_path = if cli.no_persist {
        None
    } else {
        config.agent.database_path()
    };

    let Some(db_path) = db_path else {
        if let Some(id) = &cli.conversation {
            bail!("cannot resume conversation '{id}' without a ledger database (agent.database)");
        }
        return Ok(ConversationLedger::new());
    };

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = LedgerStore::open(&db_path.to_string_lossy())?;

    let ledger = match &cli.conversation {
        Some(id) => ConversationLedger::resume(store, id)?,
        None => ConversationLedger::new().with_store(store)?,
    };
    Ok(ledger)
}

/// Read one query per line from stdin until EOF or `exit`.
///
/// Ctrl-C cancels the run in flight; a second Ctrl-C at the prompt exits.
async fn repl(orchestrator: &Orchestrator) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        let query = line.trim().to_lowercase();
        if query.is_empty() {
            continue;
        }
        if query == "exit" || query == "quit" {
            break;
        }

        tokio::select! {
            reply = orchestrator.handle(&query) => println!("{reply}"),
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("run cancelled by user");
                println!("(cancelled)");
            }
        }
    }

    tracing::info!(turns = orchestrator.ledger().len(), "session ended");
    Ok(())
}

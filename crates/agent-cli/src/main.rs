//! agent-cli: chat with an MCP server's tools from the terminal.
//!
//! Connects once, opens a single session and runs a read-query/print-response
//! loop until `exit`, `quit` or end of input.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::provider::DEFAULT_MODEL;
use agent_core::{AgentConfig, NewSession, SessionId, SessionStore};
use agent_gateway::{ConnectionManager, McpConnector, QueryService};
use agent_runtime::OllamaProvider;

const DEFAULT_MCP_SERVER: &str = "http://localhost:8000/sse";

#[derive(Parser, Debug)]
#[command(name = "agent-cli", version, about = "Agent CLI with MCP tools")]
struct Args {
    /// MCP server SSE endpoint to connect to.
    #[arg(long, env = "DEFAULT_MCP_SERVER", default_value = DEFAULT_MCP_SERVER)]
    server: String,

    /// Ollama model used to answer.
    #[arg(long, env = "AGENT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Enable debug logging.
    #[arg(long)]
    verbose: bool,
}

fn is_exit(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

/// Read queries from `input` until exit or EOF, writing answers to `out`.
/// A failed query is reported and the loop continues.
async fn chat<R, W>(
    service: &QueryService,
    session: &SessionId,
    input: R,
    mut out: W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        write!(out, "\nQuery: ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if is_exit(query) {
            break;
        }

        match service.query(session, query).await {
            Ok(response) => writeln!(out, "\nAgent: {response}")?,
            Err(e) => {
                tracing::error!(error = %e, "Query failed");
                writeln!(out, "\nError: {}", e.user_message())?;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let filter = if args.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info".into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(server = %args.server, "Connecting to MCP server");

    let provider = Arc::new(OllamaProvider::from_env()?);
    let connections = Arc::new(ConnectionManager::new(
        Arc::new(McpConnector::default()),
        provider,
        AgentConfig::default(),
    ));
    let service = QueryService::new(Arc::new(SessionStore::new()), connections.clone());

    let session = service
        .connect(NewSession {
            endpoint: args.server.clone(),
            region: "local".into(),
            model_id: args.model.clone(),
            auth_token: None,
        })
        .await?;

    if let Ok(handle) = connections.ensure_connection(&args.server).await {
        tracing::info!(tools = ?handle.tool_names(), "Available tools");
    }
    tracing::info!("Starting interactive chat session. Type 'exit' to quit.");

    let result = chat(
        &service,
        &session,
        BufReader::new(tokio::io::stdin()),
        std::io::stdout(),
    )
    .await;

    connections.teardown().await;
    result
}

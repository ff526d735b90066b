//! CLI REPL for the closing-process Q&A agent.
//!
//! Reads questions from stdin (one per line), terminates on `/q`, and
//! prints each tool step plus the final answer. All conversation state for
//! the REPL lives under a single fixed thread id.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Context;

use cierre_agent::agent::{AgentRunner, SessionStore};
use cierre_agent::config::{self, DataBackend};
use cierre_agent::inference::InferenceClient;
use cierre_agent::tools::{datalake_registry, sqlite_registry, ClosingDb, DatalakeClient};

/// Thread id for the single REPL conversation.
const REPL_THREAD_ID: &str = "1";

/// Generic user-visible message for unexpected turn failures. Detail goes
/// to the log, never to the terminal.
const UNEXPECTED_ERROR_MSG: &str = "Ocurrió un error inesperado.";

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cierre_agent=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cwd = std::env::current_dir().context("could not resolve current directory")?;
    let config_path = config::find_config_path(&cwd).context("config discovery failed")?;
    let config = config::load_config(&config_path).context("config load failed")?;

    tracing::info!(
        config = %config_path.display(),
        backend = ?config.data_backend,
        model = %config.model.model_name,
        "=== cierre-agent starting ==="
    );

    let registry = match config.data_backend {
        DataBackend::Sqlite => {
            let db = ClosingDb::open(&config.sqlite_path)
                .with_context(|| format!("could not open {}", config.sqlite_path))?;
            sqlite_registry(Arc::new(db))
        }
        DataBackend::Datalake => {
            let client = DatalakeClient::new().context("could not build datalake client")?;
            datalake_registry(Arc::new(client))
        }
    };

    tracing::info!(tools = ?registry.names(), "tool registry built");

    let model = InferenceClient::new(config.model.clone()).context("inference client error")?;
    let runner = AgentRunner::new(model, registry, Arc::new(SessionStore::new()), config.agent);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        println!("Ingrese la pregunta (/q para finalizar):");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let question = line.trim();
        if question.starts_with("/q") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        match runner.run_turn(REPL_THREAD_ID, question).await {
            Ok(report) => {
                for step in &report.steps {
                    let status = if step.ok { "ok" } else { "sin datos" };
                    println!("  [{status}] {} {}", step.tool, step.arguments);
                }
                println!("{}\n", report.answer);
            }
            Err(e) => {
                tracing::error!(error = %e, "turn failed");
                println!("{UNEXPECTED_ERROR_MSG}\n");
            }
        }
    }

    Ok(())
}

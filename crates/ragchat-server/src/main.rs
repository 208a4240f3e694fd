//! ragchat: retrieval-augmented chat server.

use std::path::PathBuf;
use std::sync::Arc;

use ragchat_chat::{FileConfigStore, HttpLlmClient};
use ragchat_core::RagChatConfig;
use ragchat_resolve::HttpRetriever;
use ragchat_runtime::{ChatOrchestrator, OrchestratorSettings};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod routes;
mod state;

use state::AppState;

fn resolve_data_dir() -> PathBuf {
    std::env::var("RAGCHAT_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn print_help() {
    println!("ragchat: retrieval-augmented chat server");
    println!();
    println!("Usage: ragchat [command]");
    println!();
    println!("Commands:");
    println!("  (none)    Start the server");
    println!("  help      Show this help message");
    println!();
    println!("Environment:");
    println!("  PORT                              HTTP port (default 3004)");
    println!("  RAGCHAT_DATA_DIR                  Data directory holding llm-configs.json (default data)");
    println!("  RAGCHAT_RETRIEVER_URL             rag-service base URL (default http://localhost:8001)");
    println!("  RAGCHAT_RETRIEVER_TIMEOUT_SECS    Retrieval timeout (default 30)");
    println!("  RAGCHAT_TOP_K                     Documents retrieved per turn (default 5)");
    println!("  RAGCHAT_SIMILARITY_THRESHOLD      Minimum relevance (default 0.7)");
    println!("  RAGCHAT_CONTEXT_BUDGET            Prompt budget in characters (default 12000)");
    println!("  RAGCHAT_STREAM_IDLE_TIMEOUT_SECS  Streaming idle window (default 60)");
    println!("  RAGCHAT_COMPLETION_TIMEOUT_SECS   Single-shot completion bound (default 180)");
    println!("  RUST_LOG                          Log filter (default info)");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "--help" | "-h" | "help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'ragchat help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = RagChatConfig::from_env(&data_dir)?;
    let port = config.port;

    let retriever = HttpRetriever::new(&config.retriever.base_url, config.retriever.timeout)?;
    info!("Retriever: {}", retriever.base_url());

    let resolver = FileConfigStore::new(&config.data_paths.llm_configs_file);
    info!("LLM configs: {}", resolver.path().display());

    let orchestrator = ChatOrchestrator::new(
        Arc::new(resolver),
        Arc::new(retriever),
        Arc::new(HttpLlmClient::new()),
        OrchestratorSettings::from_defaults(&config.chat),
    );

    let state = Arc::new(AppState::new(config, orchestrator));
    let app = routes::build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("ragchat server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

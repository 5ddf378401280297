use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use secrecy::SecretString;

use lectern_ai::{FallbackAssistant, GeminiAssistant, OfflineAssistant};
use lectern_core::{Assistant, PresenceStore};
use lectern_hub::{LocalPresenceStore, RedisPresenceStore, ServerConfig};
use lectern_store::Database;

/// Real-time classroom session hub.
#[derive(Debug, Parser)]
#[command(name = "lectern", version)]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 9400)]
    port: u16,

    /// Path to the SQLite database. Defaults to ~/.lectern/lectern.db.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Redis URL for cross-process teacher presence. Without it presence
    /// is tracked in-process only, which is fine for a single instance.
    #[arg(long, env = "LECTERN_REDIS_URL")]
    redis_url: Option<String>,

    /// Per-connection outbound queue depth.
    #[arg(long, default_value_t = 256)]
    send_queue: usize,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tracing::info!("starting lectern hub");

    let db_path = args
        .db
        .unwrap_or_else(|| dirs_home().join(".lectern").join("lectern.db"));
    let db = Database::open(&db_path).expect("failed to open database");

    let presence: Arc<dyn PresenceStore> = match &args.redis_url {
        Some(url) => {
            let store = RedisPresenceStore::connect(url)
                .await
                .expect("failed to connect to the presence store");
            tracing::info!("presence backed by redis");
            Arc::new(store)
        }
        None => {
            tracing::warn!("no redis url configured, presence is process-local");
            Arc::new(LocalPresenceStore::new())
        }
    };

    let inner: Arc<dyn Assistant> = match gemini_api_key() {
        Some(key) => {
            tracing::info!("assistant backed by gemini");
            Arc::new(GeminiAssistant::new(key))
        }
        None => {
            tracing::warn!("no GEMINI_API_KEY set, assistant runs offline");
            Arc::new(OfflineAssistant)
        }
    };
    let assistant = Arc::new(FallbackAssistant::with_defaults(inner));

    let config = ServerConfig {
        port: args.port,
        max_send_queue: args.send_queue,
    };
    let handle = lectern_hub::start(config, db, presence, assistant)
        .await
        .expect("failed to start server");

    tracing::info!(port = handle.port, "lectern hub ready");

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl+c");

    tracing::info!("shutting down");
}

fn gemini_api_key() -> Option<SecretString> {
    std::env::var("GEMINI_API_KEY")
        .or_else(|_| std::env::var("GOOGLE_API_KEY"))
        .ok()
        .filter(|k| !k.trim().is_empty())
        .map(SecretString::from)
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

use dispatch_core::{DispatchService, EventLog, SqliteStore};
use dispatch_server::config::{self, ServerConfig};
use dispatch_server::{app, AppState};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dispatch_core=debug")),
        )
        .init();

    let config = ServerConfig::from_env();
    let store = SqliteStore::open(&config.db_path).expect("open incident store");
    let log = EventLog::open(&config.db_path).expect("open event log");

    if let Some(path) = &config.accounts_file {
        match config::load_accounts(path) {
            Ok(accounts) => {
                for account in &accounts {
                    if let Err(err) = store.upsert_responder(account) {
                        warn!(account = %account.id, error = %err, "failed to seed responder account");
                    }
                }
                info!(count = accounts.len(), file = %path.display(), "responder accounts loaded");
            }
            Err(err) => warn!(error = %err, "responder accounts not loaded"),
        }
    }

    let state = AppState {
        service: DispatchService::new(Arc::new(store), log),
        paging: config.paging,
    };

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .expect("bind listen address");
    info!(bind = %config.bind, db = %config.db_path.display(), "dispatch-server listening");
    axum::serve(listener, app(state)).await.expect("serve");
}

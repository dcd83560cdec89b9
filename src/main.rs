mod api;
mod blockchain;
mod config;
mod error;
mod storage;
mod transaction;

use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::info;
use std::sync::Arc;

use api::AppState;
use config::Config;
use storage::{LedgerStore, SqliteLedger};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = Config::from_env();
    let store: Arc<dyn LedgerStore> = Arc::new(
        SqliteLedger::open(&config.database_path)
            .map_err(|e| std::io::Error::other(format!("cannot open ledger: {e}")))?,
    );
    info!(
        "ledger at {} (difficulty={}, hash format v{})",
        config.database_path,
        blockchain::DIFFICULTY,
        blockchain::HASH_FORMAT_VERSION
    );

    println!(
        "⛓️ Starting ledger API at http://{}:{}",
        config.host, config.port
    );

    let state = web::Data::new(AppState::new(store, config.mining_attempts));

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::sync::Arc;

mod chains;
mod config;
mod controllers;
mod db;
mod keys;
mod models;
mod walletconnect;

use chains::ChainResolver;
use config::Config;
use db::Database;
use keys::KeyProvider;
use walletconnect::{EvmTransactionForwarder, RelayBridgeConnector, SignerContext, SignerEngine};

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub keys: Arc<dyn KeyProvider>,
    pub signer: Arc<SignerEngine>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;

    log::info!("Initializing database at {}", config.database_url);
    let db = Database::new(&config.database_url).expect("Failed to initialize database");
    let db = Arc::new(db);

    let keys = match keys::create_key_provider() {
        Ok(provider) => provider,
        Err(e) => panic!("Failed to initialize key provider: {}", e),
    };
    log::info!("[keys] Key provider ready ({} mode)", keys.mode_name());

    let chains_path = config::chains_config_path();
    let chains = Arc::new(ChainResolver::load(&chains_path));
    log::info!(
        "[chains] {} chains available: {:?}",
        chains.supported_chain_ids().len(),
        chains.supported_chain_ids()
    );

    let signer_context = Arc::new(SignerContext {
        db: db.clone(),
        keys: keys.clone(),
        chains,
        forwarder: Arc::new(EvmTransactionForwarder::new()),
    });
    let signer = Arc::new(SignerEngine::new(
        signer_context,
        Arc::new(RelayBridgeConnector::from_config(&config)),
    ));

    if config.walletconnect_project_id.is_none() {
        log::warn!(
            "[walletconnect] {} not set; pairing requests will fail",
            config::env_vars::WALLETCONNECT_PROJECT_ID
        );
    } else if config.eager_connect {
        // Persisted sessions only receive requests once the engine is connected
        let signer = signer.clone();
        tokio::spawn(async move {
            if let Err(e) = signer.engine().await {
                log::error!("[walletconnect] Eager engine connection failed: {}", e);
            }
        });
    }

    log::info!("Starting signer server on port {}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                db: Arc::clone(&db),
                config: config.clone(),
                keys: Arc::clone(&keys),
                signer: Arc::clone(&signer),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::accounts::config)
            .configure(controllers::walletconnect::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

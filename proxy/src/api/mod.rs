pub mod types;
mod ws;

pub use ws::*;

use crate::{
    account::AccountCapPool,
    chain::{ChainClient, TxSigner},
    deepbook::DeepBook,
    error::{ProxyError, ProxyResult},
    events::{EventRouter, TradeIdentity},
    executor::Executor,
    gas::GasCoinManager,
    handlers,
    orders::OrderCache,
    whitelist::WithdrawWhitelist,
};
use actix_web::{
    dev::ServerHandle,
    web::{self, Data},
    App, HttpResponse, HttpServer,
};
use dex_common::task::spawn_task;
use log::{info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

// Everything the request handlers need, shared across workers
pub struct AppState {
    pub chain: Arc<dyn ChainClient>,
    pub signer: Arc<TxSigner>,
    pub gas: Arc<GasCoinManager>,
    pub caps: Arc<AccountCapPool>,
    pub executor: Executor,
    pub cache: Arc<OrderCache>,
    pub router: Arc<EventRouter>,
    pub deepbook: DeepBook,
    pub whitelist: WithdrawWhitelist,
    pub identity: TradeIdentity,
    pub chain_name: String,
}

pub type SharedApiServer = Arc<ApiServer>;

pub struct ApiServer {
    handle: Mutex<Option<ServerHandle>>,
}

impl ApiServer {
    pub async fn start(state: Arc<AppState>, bind_address: &str) -> ProxyResult<SharedApiServer> {
        let server = Arc::new(Self {
            handle: Mutex::new(None),
        });

        info!("starting API server on {}", bind_address);
        let data = Data::from(state);
        let builder = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .app_data(web::JsonConfig::default().error_handler(|err, _| {
                    ProxyError::BadRequest(err.to_string()).into()
                }))
                .app_data(web::QueryConfig::default().error_handler(|err, _| {
                    ProxyError::BadRequest(err.to_string()).into()
                }))
                .route("/status", web::get().to(handlers::info::status))
                .route("/pool", web::get().to(handlers::info::pool))
                .route(
                    "/wallet-address",
                    web::get().to(handlers::info::wallet_address),
                )
                .route(
                    "/balance-manager-id",
                    web::get().to(handlers::info::balance_manager_id),
                )
                .route(
                    "/wallet-balance-info",
                    web::get().to(handlers::info::wallet_balance_info),
                )
                .route(
                    "/balance-manager-balance-info",
                    web::get().to(handlers::info::balance_manager_balance_info),
                )
                .route("/orders", web::get().to(handlers::orders::get_orders))
                .route("/order", web::get().to(handlers::orders::get_order))
                .route("/order", web::post().to(handlers::orders::insert_order))
                .route("/orders", web::post().to(handlers::orders::bulk_insert))
                .route("/order", web::delete().to(handlers::orders::cancel_order))
                .route("/orders", web::delete().to(handlers::orders::cancel_orders))
                .route("/trades", web::get().to(handlers::trades::get_trades))
                .route(
                    "/deposit-into-pool",
                    web::post().to(handlers::treasury::deposit_into_pool),
                )
                .route(
                    "/deposit-into-balance-manager",
                    web::post().to(handlers::treasury::deposit_into_balance_manager),
                )
                .route(
                    "/withdraw-from-pool",
                    web::post().to(handlers::treasury::withdraw_from_pool),
                )
                .route(
                    "/withdraw-from-balance-manager",
                    web::post().to(handlers::treasury::withdraw_from_balance_manager),
                )
                .route(
                    "/withdraw-sui",
                    web::post().to(handlers::treasury::withdraw_sui),
                )
                .route("/withdraw", web::post().to(handlers::treasury::withdraw))
                .route(
                    "/account-cap",
                    web::post().to(handlers::treasury::mint_account_cap),
                )
                .route(
                    "/child-account-cap",
                    web::post().to(handlers::treasury::mint_child_account_cap),
                )
                .route(
                    "/create-balance-manager",
                    web::post().to(handlers::treasury::create_balance_manager),
                )
                .route("/ws", web::get().to(websocket_endpoint))
                .default_service(web::route().to(not_found))
        })
        .disable_signals()
        .bind(bind_address)
        .map_err(|e| ProxyError::Startup(format!("cannot bind {}: {}", bind_address, e)))?;

        let http_server = builder.run();
        {
            let handle = http_server.handle();
            let mut lock = server.handle.lock().await;
            *lock = Some(handle);
        }
        spawn_task("api-server", http_server);

        Ok(server)
    }

    pub async fn stop(&self) {
        info!("stopping API server...");
        let mut handle = self.handle.lock().await;
        if let Some(handle) = handle.take() {
            handle.stop(false).await;
            info!("API server stopped");
        } else {
            warn!("API server is not running");
        }
    }
}

async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(json!({ "error": "unrecognised route" }))
}

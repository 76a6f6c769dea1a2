use anyhow::{Context, Result};
use clap::Parser;
use dex_common::crypto::KeyPair;
use dex_proxy::{
    account::AccountCapPool,
    api::{ApiServer, AppState},
    chain::{ChainClient, RpcClientPool, TxSigner},
    config::{Config, DexConfig, FileConfig, LogLevel},
    deepbook::{default_package, DeepBook, ExchangeVersion},
    epoch::EpochTracker,
    error::ProxyError,
    events::{EventRouter, EventSubscriber, TradeIdentity},
    executor::Executor,
    gas::GasCoinManager,
    handlers,
    orders::OrderCache,
    whitelist::WithdrawWhitelist,
};
use log::{info, warn};
use std::{sync::Arc, time::Duration};

fn setup_logger(level: LogLevel) -> Result<()> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level.into())
        .chain(std::io::stdout())
        .apply()
        .context("failed to initialize logger")?;
    Ok(())
}

fn account_cap_slots(dex: &DexConfig) -> Result<Vec<dex_common::crypto::ObjectId>, ProxyError> {
    match dex.version {
        ExchangeVersion::V2 => {
            let caps = dex.account_cap_ids.as_ref().ok_or_else(|| {
                ProxyError::Startup("account_cap_ids missing for DeepBook v2".to_string())
            })?;
            if caps.children.is_empty() {
                // Nothing minted yet: dispatch through the main cap until
                // child caps are created over /child-account-cap
                Ok(vec![caps.main])
            } else {
                Ok(caps.children.clone())
            }
        }
        ExchangeVersion::V3 => {
            let manager = dex.balance_manager_id.ok_or_else(|| {
                ProxyError::Startup("balance_manager_id missing for DeepBook v3".to_string())
            })?;
            // The balance manager is a shared object; give it one dispatch
            // slot per expected concurrent transaction
            Ok(vec![manager; dex.gas_manager.gas_coin_expected_count])
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    setup_logger(config.log_level)?;

    let dex = FileConfig::load(&config.config_file)?.dex;
    info!(
        "dex-proxy starting on {} ({}, DeepBook {:?})",
        config.bind_address, dex.env, dex.version
    );

    let keypair = KeyPair::from_file(&dex.key_path)
        .map_err(|e| ProxyError::Startup(format!("cannot load keypair: {}", e)))?;
    let signer = Arc::new(TxSigner::new(keypair));
    if let Some(configured) = dex.wallet_address {
        if configured != signer.address() {
            warn!(
                "configured wallet_address {} differs from the keypair address {}",
                configured,
                signer.address()
            );
        }
    }
    info!("wallet address: {}", signer.address());

    let chain = Arc::new(RpcClientPool::new(
        &dex.exchange_connectors.rest,
        Duration::from_secs(dex.exchange_connectors.rest_call_timeout_s),
        Duration::from_secs(dex.track_leading_client_poll_interval_s),
    )?);
    // Elect an initial leader before anything touches the chain
    chain.poll_once().await;
    info!("leading RPC client: {}", chain.current_name());
    chain.start_leader_tracking();

    let gas = GasCoinManager::start(
        Arc::clone(&chain) as Arc<dyn ChainClient>,
        Arc::clone(&signer),
        dex.gas_manager.clone(),
    )
    .await?;
    gas.start_reconciler();

    let caps = AccountCapPool::new(account_cap_slots(&dex)?)?;

    let authority = match dex.version {
        ExchangeVersion::V2 => {
            dex.account_cap_ids
                .as_ref()
                .map(|caps| caps.main)
                .ok_or_else(|| {
                    ProxyError::Startup("account_cap_ids missing for DeepBook v2".to_string())
                })?
        }
        ExchangeVersion::V3 => dex.balance_manager_id.ok_or_else(|| {
            ProxyError::Startup("balance_manager_id missing for DeepBook v3".to_string())
        })?,
    };
    let package = dex
        .deepbook_package
        .unwrap_or_else(|| default_package(dex.version, dex.env));
    let deepbook = DeepBook::new(dex.version, package, authority, &dex.pools);
    info!(
        "exchange package {} with pools: {:?}",
        package,
        deepbook.pool_symbols()
    );

    let identity = TradeIdentity {
        wallet: signer.address(),
        authority,
    };
    let cache = Arc::new(OrderCache::new(dex.order_cache.capacity));
    let router = Arc::new(EventRouter::new(1024));
    let executor = Executor::new(
        Arc::clone(&chain) as Arc<dyn ChainClient>,
        Arc::clone(&signer),
        Arc::clone(&gas),
        Arc::clone(&caps),
        dex.version,
        dex.gas_manager.gas_budget_mist,
        dex.log_responses,
    );
    let whitelist = WithdrawWhitelist::load(dex.withdraw_whitelist_path.as_deref())?;

    let state = Arc::new(AppState {
        chain: Arc::clone(&chain) as Arc<dyn ChainClient>,
        signer: Arc::clone(&signer),
        gas: Arc::clone(&gas),
        caps: Arc::clone(&caps),
        executor,
        cache: Arc::clone(&cache),
        router: Arc::clone(&router),
        deepbook,
        whitelist,
        identity: identity.clone(),
        chain_name: dex.chain_name.clone(),
    });

    let server = ApiServer::start(Arc::clone(&state), &config.bind_address).await?;

    if dex.subscribe_to_events {
        EventSubscriber::new(
            dex.exchange_connectors.ws.clone(),
            dex.version,
            identity,
            Arc::clone(&cache),
            Arc::clone(&router),
        )
        .start();
    } else {
        warn!("event subscriptions disabled; the order cache will only track synchronous updates");
    }

    EpochTracker::new(
        Arc::clone(&chain) as Arc<dyn ChainClient>,
        Arc::clone(&gas),
        Arc::clone(&caps),
    )
    .start();

    if dex.version == ExchangeVersion::V3 {
        if let Some(interval) = dex.withdraw_settled_amounts_interval_s {
            handlers::treasury::start_settled_withdrawals(
                Arc::clone(&state),
                Duration::from_secs(interval),
            );
        }
    }

    info!("dex-proxy is up");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    server.stop().await;
    Ok(())
}

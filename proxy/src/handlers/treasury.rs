// Treasury and admin flows. Deposits, SUI withdrawals and token sweeps run
// directly on the main gas coin (they need its large balance); pool/manager
// withdrawals and object minting run through the executor on child coins.

use super::first_created;
use crate::{
    api::{
        types::{
            parse_amount, ChildAccountCapRequest, DepositRequest, WithdrawFromPoolRequest,
            WithdrawRequest, WithdrawSuiRequest,
        },
        AppState,
    },
    deepbook::{ExchangeVersion, PoolInfo},
    error::{ProxyError, ProxyResult},
    gas::{fetch_all_coins, GasCoinGuard, ReleaseOutcome},
};
use actix_web::{
    web::{Data, Json},
    HttpResponse,
};
use dex_common::{
    api::sui::{TransactionBlockResponse, SUI_COIN_TYPE},
    crypto::ObjectId,
};
use log::{info, log_enabled, Level};
use serde_json::json;
use std::str::FromStr;

// Run a main-coin operation with the acquisition/release discipline: the
// guard is released on every exit path, poisoned on a finality timeout and
// re-read otherwise (main's balance changes by more than gas here).
async fn with_main_coin<F, Fut>(state: &AppState, op: F) -> ProxyResult<TransactionBlockResponse>
where
    F: FnOnce(GasCoinGuard) -> Fut,
    Fut: std::future::Future<Output = (GasCoinGuard, ProxyResult<TransactionBlockResponse>)>,
{
    let Some(main) = state.gas.get_main_gas_coin().await else {
        return Err(ProxyError::MainCoinInUse);
    };
    let (main, result) = op(main).await;
    match &result {
        Err(e) if e.is_finality_timeout() => main.release(ReleaseOutcome::FinalityTimeout).await,
        _ => main.release(ReleaseOutcome::Unknown).await,
    }
    result
}

fn pool_side(pool: &PoolInfo, coin_type: &str) -> ProxyResult<bool> {
    if coin_type == pool.base_coin_type {
        Ok(true)
    } else if coin_type == pool.quote_coin_type {
        Ok(false)
    } else {
        Err(ProxyError::BadRequest(format!(
            "coin {} is neither base nor quote of {}",
            coin_type, pool.symbol
        )))
    }
}

// Produce a coin object of exactly `amount`, owned by us, to feed a deposit.
// SUI splits off main; other tokens merge-split the wallet's coins of that
// type with main paying gas.
async fn carve_deposit_coin(
    state: &AppState,
    main: &GasCoinGuard,
    coin_type: &str,
    amount: u64,
) -> ProxyResult<ObjectId> {
    let wallet = state.signer.address();
    let gas_budget = state.executor.gas_budget();
    let tx = if coin_type == SUI_COIN_TYPE {
        state
            .chain
            .build_pay_sui(wallet, vec![main.id()], vec![wallet], vec![amount], gas_budget)
            .await?
    } else {
        let coins = fetch_all_coins(state.chain.as_ref(), &state.signer, coin_type).await?;
        let mut inputs = Vec::new();
        let mut available = 0u64;
        for coin in &coins {
            inputs.push(coin.coin_object_id);
            available += coin.balance;
            if available >= amount {
                break;
            }
        }
        if available < amount {
            return Err(ProxyError::BadRequest(format!(
                "wallet holds {} of {}, {} requested",
                available, coin_type, amount
            )));
        }
        state
            .chain
            .build_pay(
                wallet,
                inputs,
                vec![wallet],
                vec![amount],
                Some(main.id()),
                gas_budget,
            )
            .await?
    };
    let response = state
        .signer
        .sign_and_execute(state.chain.as_ref(), &tx)
        .await?;
    first_created(&response)
}

async fn deposit(state: &AppState, request: DepositRequest) -> ProxyResult<HttpResponse> {
    let pool = state.deepbook.resolve_pool(&request.pool)?.clone();
    let amount = parse_amount(&request.amount, "amount")?;
    let is_base = pool_side(&pool, &request.coin)?;
    let coin_type = request.coin.clone();

    let response = with_main_coin(state, |mut main| async move {
        let result = async {
            // Sweep stray funds first so main's balance is authoritative
            state.gas.merge_untracked_into_main(&mut main).await?;
            let coin = carve_deposit_coin(state, &main, &request.coin, amount).await?;
            let call = state
                .deepbook
                .deposit_call(&pool, state.identity.authority, coin, is_base);
            let tx = state
                .chain
                .build_move_call(
                    state.signer.address(),
                    call,
                    Some(main.id()),
                    state.executor.gas_budget(),
                )
                .await?;
            state.signer.sign_and_execute(state.chain.as_ref(), &tx).await
        }
        .await;
        (main, result)
    })
    .await?;

    if log_enabled!(Level::Info) {
        info!("deposited {} of {} ({})", amount, coin_type, response.digest);
    }
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "tx_digest": response.digest,
    })))
}

pub async fn deposit_into_pool(
    state: Data<AppState>,
    body: Json<DepositRequest>,
) -> Result<HttpResponse, ProxyError> {
    deposit(&state, body.into_inner()).await
}

pub async fn deposit_into_balance_manager(
    state: Data<AppState>,
    body: Json<DepositRequest>,
) -> Result<HttpResponse, ProxyError> {
    deposit(&state, body.into_inner()).await
}

async fn withdraw_from(
    state: &AppState,
    request: WithdrawFromPoolRequest,
) -> ProxyResult<HttpResponse> {
    let pool = state.deepbook.resolve_pool(&request.pool)?.clone();
    let amount = parse_amount(&request.amount, "amount")?;
    let is_base = pool_side(&pool, &request.coin)?;

    let chain = state.chain.clone();
    let signer_address = state.signer.address();
    let gas_budget = state.executor.gas_budget();
    let request_id = format!("withdraw:{}:{}", pool.symbol, amount);
    let response = state
        .executor
        .execute(
            &request_id,
            |authority, gas_coin| {
                let call = state.deepbook.withdraw_call(&pool, authority, amount, is_base);
                let chain = chain.clone();
                async move {
                    Ok(chain
                        .build_move_call(signer_address, call, Some(gas_coin), gas_budget)
                        .await?)
                }
            },
            None,
        )
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "tx_digest": response.digest,
    })))
}

pub async fn withdraw_from_pool(
    state: Data<AppState>,
    body: Json<WithdrawFromPoolRequest>,
) -> Result<HttpResponse, ProxyError> {
    withdraw_from(&state, body.into_inner()).await
}

pub async fn withdraw_from_balance_manager(
    state: Data<AppState>,
    body: Json<WithdrawFromPoolRequest>,
) -> Result<HttpResponse, ProxyError> {
    withdraw_from(&state, body.into_inner()).await
}

async fn withdraw_sui_inner(
    state: &AppState,
    request: WithdrawSuiRequest,
) -> ProxyResult<HttpResponse> {
    let amount = parse_amount(&request.amount, "amount")?;
    let recipient = ObjectId::from_str(&request.recipient)
        .map_err(|_| ProxyError::BadRequest("invalid recipient address".to_string()))?;
    state
        .whitelist
        .check(&state.chain_name, SUI_COIN_TYPE, recipient)?;

    let response = with_main_coin(state, |main| async move {
        let result = async {
            let tx = state
                .chain
                .build_pay_sui(
                    state.signer.address(),
                    vec![main.id()],
                    vec![recipient],
                    vec![amount],
                    state.executor.gas_budget(),
                )
                .await?;
            state.signer.sign_and_execute(state.chain.as_ref(), &tx).await
        }
        .await;
        (main, result)
    })
    .await?;

    info!("withdrew {} MIST to {} ({})", amount, recipient, response.digest);
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "tx_digest": response.digest,
    })))
}

pub async fn withdraw_sui(
    state: Data<AppState>,
    body: Json<WithdrawSuiRequest>,
) -> Result<HttpResponse, ProxyError> {
    withdraw_sui_inner(&state, body.into_inner()).await
}

async fn withdraw_inner(state: &AppState, request: WithdrawRequest) -> ProxyResult<HttpResponse> {
    let amount = parse_amount(&request.amount, "amount")?;
    let recipient = ObjectId::from_str(&request.recipient)
        .map_err(|_| ProxyError::BadRequest("invalid recipient address".to_string()))?;
    state
        .whitelist
        .check(&state.chain_name, &request.coin, recipient)?;

    let response = with_main_coin(state, |main| async move {
        let result = async {
            let coins =
                fetch_all_coins(state.chain.as_ref(), &state.signer, &request.coin).await?;
            let mut inputs = Vec::new();
            let mut available = 0u64;
            for coin in &coins {
                inputs.push(coin.coin_object_id);
                available += coin.balance;
                if available >= amount {
                    break;
                }
            }
            if available < amount {
                return Err(ProxyError::BadRequest(format!(
                    "wallet holds {} of {}, {} requested",
                    available, request.coin, amount
                )));
            }
            let tx = state
                .chain
                .build_pay(
                    state.signer.address(),
                    inputs,
                    vec![recipient],
                    vec![amount],
                    Some(main.id()),
                    state.executor.gas_budget(),
                )
                .await?;
            state.signer.sign_and_execute(state.chain.as_ref(), &tx).await
        }
        .await;
        (main, result)
    })
    .await?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "tx_digest": response.digest,
    })))
}

pub async fn withdraw(
    state: Data<AppState>,
    body: Json<WithdrawRequest>,
) -> Result<HttpResponse, ProxyError> {
    withdraw_inner(&state, body.into_inner()).await
}

pub async fn mint_account_cap(state: Data<AppState>) -> Result<HttpResponse, ProxyError> {
    if state.deepbook.version != ExchangeVersion::V2 {
        return Err(ProxyError::BadRequest(
            "account caps exist only on DeepBook v2".to_string(),
        ));
    }
    let chain = state.chain.clone();
    let signer_address = state.signer.address();
    let gas_budget = state.executor.gas_budget();
    let response = state
        .executor
        .execute(
            "mint-account-cap",
            |_authority, gas_coin| {
                let call = state.deepbook.mint_account_cap_call();
                let chain = chain.clone();
                async move {
                    Ok(chain
                        .build_move_call(signer_address, call, Some(gas_coin), gas_budget)
                        .await?)
                }
            },
            None,
        )
        .await?;
    let cap = first_created(&response)?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "tx_digest": response.digest,
        "account_cap_id": cap,
    })))
}

pub async fn mint_child_account_cap(
    state: Data<AppState>,
    body: Option<Json<ChildAccountCapRequest>>,
) -> Result<HttpResponse, ProxyError> {
    if state.deepbook.version != ExchangeVersion::V2 {
        return Err(ProxyError::BadRequest(
            "child account caps exist only on DeepBook v2".to_string(),
        ));
    }
    let count = body
        .map(|body| body.into_inner().count.unwrap_or(1))
        .unwrap_or(1)
        .max(1);

    let chain = state.chain.clone();
    let signer_address = state.signer.address();
    let gas_budget = state.executor.gas_budget();
    let mut minted = Vec::with_capacity(count);
    for _ in 0..count {
        let response = state
            .executor
            .execute(
                "mint-child-account-cap",
                |_authority, gas_coin| {
                    let call = state
                        .deepbook
                        .mint_child_account_cap_call(state.identity.authority);
                    let chain = chain.clone();
                    async move {
                        Ok(chain
                            .build_move_call(signer_address, call, Some(gas_coin), gas_budget)
                            .await?)
                    }
                },
                None,
            )
            .await?;
        let cap = first_created(&response)?;
        // New children immediately join the dispatch rotation
        state.caps.register(cap);
        minted.push(cap);
    }

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "child_account_cap_ids": minted,
    })))
}

// v3 maker proceeds accumulate inside the pools; sweep them back into the
// balance manager on a timer so they stay withdrawable
pub fn start_settled_withdrawals(
    state: std::sync::Arc<AppState>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    dex_common::task::spawn_task("settled-withdrawals", async move {
        loop {
            tokio::time::sleep(interval).await;
            let pools: Vec<PoolInfo> = state.deepbook.pools().cloned().collect();
            for pool in pools {
                let chain = state.chain.clone();
                let signer_address = state.signer.address();
                let gas_budget = state.executor.gas_budget();
                let request_id = format!("settle:{}", pool.symbol);
                let result = state
                    .executor
                    .execute(
                        &request_id,
                        |authority, gas_coin| {
                            let call = state
                                .deepbook
                                .withdraw_settled_amounts_call(&pool, authority);
                            let chain = chain.clone();
                            async move {
                                Ok(chain
                                    .build_move_call(
                                        signer_address,
                                        call,
                                        Some(gas_coin),
                                        gas_budget,
                                    )
                                    .await?)
                            }
                        },
                        None,
                    )
                    .await;
                if let Err(e) = result {
                    log::warn!("settled withdrawal for {} failed: {}", pool.symbol, e);
                }
            }
        }
    })
}

pub async fn create_balance_manager(state: Data<AppState>) -> Result<HttpResponse, ProxyError> {
    if state.deepbook.version != ExchangeVersion::V3 {
        return Err(ProxyError::BadRequest(
            "balance managers exist only on DeepBook v3".to_string(),
        ));
    }
    let chain = state.chain.clone();
    let signer_address = state.signer.address();
    let gas_budget = state.executor.gas_budget();
    let response = state
        .executor
        .execute(
            "create-balance-manager",
            |_authority, gas_coin| {
                let call = state.deepbook.create_balance_manager_call();
                let chain = chain.clone();
                async move {
                    Ok(chain
                        .build_move_call(signer_address, call, Some(gas_coin), gas_budget)
                        .await?)
                }
            },
            None,
        )
        .await?;
    let manager = first_created(&response)?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "tx_digest": response.digest,
        "balance_manager_id": manager,
    })))
}

use crate::{
    api::{
        types::{
            event_json, parse_amount, parse_optional_amount, BulkInsertRequest,
            CancelOrdersQuery, InsertOrderRequest, OrderQuery, OrdersQuery,
        },
        AppState,
    },
    config::MAX_ORDERS_PER_BATCH,
    deepbook::tx::{parse_client_order_id, LimitOrderSpec},
    error::ProxyError,
    events::process_chain_events,
    orders::{Order, OrderStatus, OrderType},
};
use actix_web::{
    web::{Data, Json, Query},
    HttpResponse,
};
use serde_json::{json, Value};

fn order_json(order: &Order) -> Value {
    json!({
        "client_order_id": order.client_order_id,
        "pool_id": order.pool_id,
        "side": order.side,
        "order_type": order.order_type,
        "price": order.price.to_string(),
        "quantity": order.quantity.to_string(),
        "remaining": order.remaining.to_string(),
        "executed": order.executed.to_string(),
        "status": order.status,
        "exchange_order_id": order.exchange_order_id.map(|id| id.to_string()),
        "tx_digests": order.tx_digests,
    })
}

pub async fn insert_order(
    state: Data<AppState>,
    body: Json<InsertOrderRequest>,
) -> Result<HttpResponse, ProxyError> {
    let request = body.into_inner();
    let pool = state.deepbook.resolve_pool(&request.pool)?.clone();
    let chain_order_id = parse_client_order_id(&request.client_order_id)?;
    let price = parse_amount(&request.price, "price")?;
    let quantity = parse_amount(&request.quantity, "quantity")?;
    let requested_expiration =
        parse_optional_amount(request.expiration_ts.as_deref(), "expiration_ts")?;
    let expiration = state.deepbook.effective_expiration(requested_expiration)?;

    state.cache.add(Order::new(
        request.client_order_id.clone(),
        pool.pool_id,
        request.side,
        request.order_type,
        price,
        quantity,
        Some(expiration),
    ))?;

    let spec = LimitOrderSpec {
        client_order_id: chain_order_id,
        side: request.side,
        order_type: request.order_type,
        price,
        quantity,
        expiration_ts: expiration,
    };
    let chain = state.chain.clone();
    let signer_address = state.signer.address();
    let gas_budget = state.executor.gas_budget();
    let result = state
        .executor
        .execute(
            &request.client_order_id,
            |authority, gas_coin| {
                let call = state.deepbook.place_limit_order_call(&pool, authority, &spec);
                let chain = chain.clone();
                async move {
                    Ok(chain
                        .build_move_call(signer_address, call, Some(gas_coin), gas_budget)
                        .await?)
                }
            },
            None,
        )
        .await;

    match result {
        Ok(response) => {
            let digest = response.digest.clone();
            state.cache.update(&request.client_order_id, |order| {
                order.push_digest(digest.clone());
            });
            let events = process_chain_events(
                &response.events,
                &state.identity,
                &state.cache,
                &state.router,
            );
            state.cache.update(&request.client_order_id, |order| {
                order.upgrade_status(OrderStatus::Open);
            });
            if request.order_type == OrderType::ImmediateOrCancel {
                // IOC never rests on the book; it is terminal immediately
                state.cache.update(&request.client_order_id, |order| {
                    order.upgrade_status(OrderStatus::Finalised);
                });
                state.cache.remove(&request.client_order_id);
            }
            Ok(HttpResponse::Ok().json(json!({
                "status": "success",
                "tx_digest": response.digest,
                "events": events.iter().map(event_json).collect::<Vec<_>>(),
            })))
        }
        Err(e) => {
            // Unless finality is still pending, the order never reached the
            // book; drop the placeholder so the id can be retried
            if !e.is_finality_timeout() {
                state.cache.remove(&request.client_order_id);
            }
            Err(e)
        }
    }
}

pub async fn bulk_insert(
    state: Data<AppState>,
    body: Json<BulkInsertRequest>,
) -> Result<HttpResponse, ProxyError> {
    let request = body.into_inner();
    if request.orders.is_empty() {
        return Err(ProxyError::BadRequest(
            "orders list must not be empty".to_string(),
        ));
    }
    if request.orders.len() > MAX_ORDERS_PER_BATCH {
        return Err(ProxyError::BadRequest(format!(
            "at most {} orders per batch",
            MAX_ORDERS_PER_BATCH
        )));
    }
    let pool = state.deepbook.resolve_pool(&request.pool)?.clone();
    let requested_expiration =
        parse_optional_amount(request.expiration_ts.as_deref(), "expiration_ts")?;
    let expiration = state.deepbook.effective_expiration(requested_expiration)?;

    // Validate and cache every order before anything is submitted
    let mut specs = Vec::with_capacity(request.orders.len());
    let mut client_ids = Vec::with_capacity(request.orders.len());
    for item in &request.orders {
        let chain_order_id = parse_client_order_id(&item.client_order_id)?;
        let price = parse_amount(&item.price, "price")?;
        let quantity = parse_amount(&item.quantity, "quantity")?;
        specs.push(LimitOrderSpec {
            client_order_id: chain_order_id,
            side: item.side,
            order_type: item.order_type,
            price,
            quantity,
            expiration_ts: expiration,
        });
        client_ids.push(item.client_order_id.clone());
    }

    let mut cached: Vec<String> = Vec::with_capacity(request.orders.len());
    for (item, spec) in request.orders.iter().zip(&specs) {
        let added = state.cache.add(Order::new(
            item.client_order_id.clone(),
            pool.pool_id,
            item.side,
            item.order_type,
            spec.price,
            spec.quantity,
            Some(expiration),
        ));
        if let Err(e) = added {
            for id in &cached {
                state.cache.remove(id);
            }
            return Err(e);
        }
        cached.push(item.client_order_id.clone());
    }

    let chain = state.chain.clone();
    let signer_address = state.signer.address();
    let gas_budget = state.executor.gas_budget();
    let request_id = format!("bulk:{}", client_ids.join(","));
    let result = state
        .executor
        .execute(
            &request_id,
            |authority, gas_coin| {
                let calls = specs
                    .iter()
                    .map(|spec| state.deepbook.place_limit_order_call(&pool, authority, spec))
                    .collect();
                let chain = chain.clone();
                async move {
                    Ok(chain
                        .build_batch_move_calls(signer_address, calls, Some(gas_coin), gas_budget)
                        .await?)
                }
            },
            Some(&client_ids),
        )
        .await;

    match result {
        Ok(response) => {
            let digest = response.digest.clone();
            for (id, item) in client_ids.iter().zip(&request.orders) {
                state.cache.update(id, |order| {
                    order.push_digest(digest.clone());
                });
                state.cache.update(id, |order| {
                    order.upgrade_status(OrderStatus::Open);
                });
                if item.order_type == OrderType::ImmediateOrCancel {
                    state.cache.update(id, |order| {
                        order.upgrade_status(OrderStatus::Finalised);
                    });
                    state.cache.remove(id);
                }
            }
            let events = process_chain_events(
                &response.events,
                &state.identity,
                &state.cache,
                &state.router,
            );
            Ok(HttpResponse::Ok().json(json!({
                "status": "success",
                "tx_digest": response.digest,
                "events": events.iter().map(event_json).collect::<Vec<_>>(),
            })))
        }
        Err(e) => {
            if !e.is_finality_timeout() {
                for id in &client_ids {
                    state.cache.remove(id);
                }
            }
            Err(e)
        }
    }
}

pub async fn cancel_order(
    state: Data<AppState>,
    query: Query<OrderQuery>,
) -> Result<HttpResponse, ProxyError> {
    let query = query.into_inner();
    let pool = state.deepbook.resolve_pool(&query.pool)?.clone();
    let order = state
        .cache
        .get(&query.client_order_id)
        .ok_or_else(|| ProxyError::OrderNotFound(query.client_order_id.clone()))?;
    let exchange_order_id = order.exchange_order_id.ok_or_else(|| {
        ProxyError::BadRequest(format!(
            "order {} has no exchange order id yet",
            query.client_order_id
        ))
    })?;

    let chain = state.chain.clone();
    let signer_address = state.signer.address();
    let gas_budget = state.executor.gas_budget();
    let response = state
        .executor
        .execute(
            &query.client_order_id,
            |authority, gas_coin| {
                let call = state
                    .deepbook
                    .cancel_order_call(&pool, authority, exchange_order_id);
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

    process_chain_events(
        &response.events,
        &state.identity,
        &state.cache,
        &state.router,
    );
    state.cache.apply_cancelled(&query.client_order_id);
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "tx_digest": response.digest,
    })))
}

pub async fn cancel_orders(
    state: Data<AppState>,
    query: Query<CancelOrdersQuery>,
) -> Result<HttpResponse, ProxyError> {
    let query = query.into_inner();
    let pool = state.deepbook.resolve_pool(&query.pool)?.clone();
    let targeted = query.ids();

    // Resolve exchange ids up front for a targeted cancellation
    let mut exchange_ids = Vec::new();
    if let Some(ids) = &targeted {
        if ids.is_empty() {
            return Err(ProxyError::BadRequest(
                "client_order_ids must not be empty".to_string(),
            ));
        }
        for id in ids {
            let order = state
                .cache
                .get(id)
                .ok_or_else(|| ProxyError::OrderNotFound(id.clone()))?;
            let exchange_id = order.exchange_order_id.ok_or_else(|| {
                ProxyError::BadRequest(format!("order {} has no exchange order id yet", id))
            })?;
            exchange_ids.push(exchange_id);
        }
    }

    let chain = state.chain.clone();
    let signer_address = state.signer.address();
    let gas_budget = state.executor.gas_budget();
    let request_id = format!("cancel:{}", query.pool);
    let response = state
        .executor
        .execute(
            &request_id,
            |authority, gas_coin| {
                let calls: Vec<_> = match &targeted {
                    Some(_) => exchange_ids
                        .iter()
                        .map(|id| state.deepbook.cancel_order_call(&pool, authority, *id))
                        .collect(),
                    None => vec![state.deepbook.cancel_all_orders_call(&pool, authority)],
                };
                let chain = chain.clone();
                async move {
                    Ok(chain
                        .build_batch_move_calls(signer_address, calls, Some(gas_coin), gas_budget)
                        .await?)
                }
            },
            None,
        )
        .await?;

    process_chain_events(
        &response.events,
        &state.identity,
        &state.cache,
        &state.router,
    );
    match targeted {
        Some(ids) => {
            for id in ids {
                state.cache.apply_cancelled(&id);
            }
        }
        None => {
            for id in state.cache.client_ids_for_pool(pool.pool_id) {
                state.cache.apply_cancelled(&id);
            }
        }
    }
    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "tx_digest": response.digest,
    })))
}

pub async fn get_orders(
    state: Data<AppState>,
    query: Query<OrdersQuery>,
) -> Result<HttpResponse, ProxyError> {
    let pool = state.deepbook.resolve_pool(&query.pool)?;
    let orders: Vec<Value> = state
        .cache
        .open_orders(pool.pool_id)
        .iter()
        .map(order_json)
        .collect();
    Ok(HttpResponse::Ok().json(json!({ "orders": orders })))
}

pub async fn get_order(
    state: Data<AppState>,
    query: Query<OrderQuery>,
) -> Result<HttpResponse, ProxyError> {
    state.deepbook.resolve_pool(&query.pool)?;
    let order = state
        .cache
        .get(&query.client_order_id)
        .ok_or_else(|| ProxyError::OrderNotFound(query.client_order_id.clone()))?;
    Ok(HttpResponse::Ok().json(order_json(&order)))
}

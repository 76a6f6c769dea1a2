use crate::{
    api::{types::TradesQuery, AppState},
    config::TRADES_LOOKBACK_LIMIT_MS,
    error::ProxyError,
    events::{involves_identity, parse_events, DexEvent, OrderFilledData},
};
use actix_web::{
    web::{Data, Query},
    HttpResponse,
};
use dex_common::{
    api::sui::{EventFilter, TransactionBlockResponseOptions},
    crypto::TransactionDigest,
    time::current_millis,
};
use serde_json::json;

const DEFAULT_MAX_PAGES: usize = 10;

pub async fn get_trades(
    state: Data<AppState>,
    query: Query<TradesQuery>,
) -> Result<HttpResponse, ProxyError> {
    let query = query.into_inner();

    if let Some(digests) = query.digests() {
        let mut fills = Vec::new();
        for digest in digests {
            let digest = TransactionDigest::new(digest);
            let response = state
                .chain
                .get_transaction_block(&digest, TransactionBlockResponseOptions::effects_and_events())
                .await?;
            collect_fills(&state, &response.events, &mut fills);
        }
        return Ok(HttpResponse::Ok().json(json!({ "trades": fills })));
    }

    let start_ts: u64 = query
        .start_ts
        .as_deref()
        .ok_or_else(|| {
            ProxyError::BadRequest("either start_ts or tx_digests is required".to_string())
        })?
        .parse()
        .map_err(|_| ProxyError::BadRequest("start_ts must be a millisecond timestamp".to_string()))?;

    let now = current_millis();
    // A lookback of exactly the limit is allowed
    if now.saturating_sub(start_ts) > TRADES_LOOKBACK_LIMIT_MS {
        return Err(ProxyError::BadRequest(format!(
            "start_ts is beyond the {} minute lookback window",
            TRADES_LOOKBACK_LIMIT_MS / 60_000
        )));
    }

    let max_pages = query.max_pages.unwrap_or(DEFAULT_MAX_PAGES);
    let filter = EventFilter::TimeRange {
        start_time: start_ts,
        end_time: now,
    };
    let mut fills = Vec::new();
    let mut cursor = None;
    for _ in 0..max_pages {
        let page = state
            .chain
            .query_events(filter.clone(), cursor, None, false)
            .await?;
        collect_fills(&state, &page.data, &mut fills);
        if !page.has_next_page {
            break;
        }
        cursor = page.next_cursor;
    }

    Ok(HttpResponse::Ok().json(json!({ "trades": fills })))
}

fn collect_fills(
    state: &AppState,
    raw_events: &[dex_common::api::sui::SuiEvent],
    fills: &mut Vec<OrderFilledData>,
) {
    for raw in raw_events {
        if !involves_identity(raw, &state.identity) {
            continue;
        }
        for event in parse_events(raw, &state.identity) {
            if let DexEvent::OrderFilled(fill) = event {
                fills.push(fill);
            }
        }
    }
}

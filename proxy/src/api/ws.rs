// WebSocket push surface: one upgraded session per client, each fed from
// the broadcast channels as JSON-RPC 2.0 subscription notifications.

use super::{types::event_json, AppState};
use crate::events::DexEvent;
use actix_web::{rt::spawn, web, HttpRequest, HttpResponse};
use actix_ws::{CloseReason, Message, Session};
use dex_common::rpc::JSON_RPC_VERSION;
use futures_util::StreamExt;
use log::{debug, log_enabled, Level};
use serde_json::json;
use tokio::{select, sync::broadcast};

fn notification(event: &DexEvent) -> String {
    json!({
        "jsonrpc": JSON_RPC_VERSION,
        "method": "subscription",
        "params": event_json(event),
    })
    .to_string()
}

async fn forward(session: &mut Session, event: &DexEvent) -> Result<(), actix_ws::Closed> {
    session.text(notification(event)).await
}

pub async fn websocket_endpoint(
    request: HttpRequest,
    body: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, mut session, mut messages) = actix_ws::handle(&request, body)?;
    let mut orders = state.router.subscribe_orders();
    let mut trades = state.router.subscribe_trades();

    if log_enabled!(Level::Debug) {
        debug!("spawning task 'ws-session'");
    }
    spawn(async move {
        loop {
            select! {
                event = orders.recv() => match event {
                    Ok(event) => {
                        if forward(&mut session, &event).await.is_err() {
                            break;
                        }
                    }
                    // A slow consumer skips what it missed; the cache stays
                    // authoritative and can be re-queried over HTTP
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        if log_enabled!(Level::Debug) {
                            debug!("ws session lagged, skipped {} order events", skipped);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                event = trades.recv() => match event {
                    Ok(event) => {
                        if forward(&mut session, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        if log_enabled!(Level::Debug) {
                            debug!("ws session lagged, skipped {} trade events", skipped);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                message = messages.next() => match message {
                    Some(Ok(Message::Ping(bytes))) => {
                        if session.pong(&bytes).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                },
            }
        }
        let _ = session.close(None::<CloseReason>).await;
        if log_enabled!(Level::Debug) {
            debug!("task 'ws-session' has exited");
        }
    });

    Ok(response)
}

use super::{parse_events, process_chain_events, EventRouter, TradeIdentity};
use crate::{config::WsConfig, deepbook::ExchangeVersion, orders::OrderCache};
use anyhow::Result;
use dex_common::{
    api::sui::{EventFilter, SuiEvent},
    rpc::WsJsonRpcClient,
    task::spawn_task,
    utils::sanitize_ws_address,
};
use log::{debug, error, info, log_enabled, warn, Level};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::sleep};

// Maintains the two event subscriptions against the node: everything sent
// by our wallet, and maker-side trades initiated by others. Reconnects
// forever on failure; each delivered event is reconciled with the order
// cache and fanned out to the push channels.
pub struct EventSubscriber {
    config: WsConfig,
    version: ExchangeVersion,
    identity: TradeIdentity,
    cache: Arc<OrderCache>,
    router: Arc<EventRouter>,
}

impl EventSubscriber {
    pub fn new(
        config: WsConfig,
        version: ExchangeVersion,
        identity: TradeIdentity,
        cache: Arc<OrderCache>,
        router: Arc<EventRouter>,
    ) -> Self {
        Self {
            config,
            version,
            identity,
            cache,
            router,
        }
    }

    pub fn start(self) -> JoinHandle<()> {
        spawn_task("event-subscriber", async move {
            let reconnect_delay = Duration::from_secs(self.config.reconnect_timeout_s);
            let mut reconnects = 0usize;
            loop {
                if let Err(e) = self.run_connection().await {
                    if log_enabled!(Level::Warn) {
                        warn!("event subscription lost: {:#}", e);
                    }
                }
                reconnects += 1;
                if self.config.max_reconnects > 0 && reconnects >= self.config.max_reconnects {
                    error!(
                        "giving up on event subscription after {} reconnects",
                        reconnects
                    );
                    break;
                }
                sleep(reconnect_delay).await;
            }
        })
    }

    // Capture every transaction we initiated
    fn sender_filter(&self) -> EventFilter {
        EventFilter::Sender(self.identity.wallet)
    }

    // Capture maker-side trades we did not initiate
    fn maker_filter(&self) -> EventFilter {
        match self.version {
            ExchangeVersion::V2 => EventFilter::MoveEventField {
                path: "/maker_address".to_string(),
                value: json!(self.identity.authority),
            },
            ExchangeVersion::V3 => EventFilter::Any(vec![
                EventFilter::MoveEventField {
                    path: "/maker_balance_manager_id".to_string(),
                    value: json!(self.identity.authority),
                },
                EventFilter::MoveEventField {
                    path: "/taker_balance_manager_id".to_string(),
                    value: json!(self.identity.authority),
                },
            ]),
        }
    }

    async fn run_connection(&self) -> Result<()> {
        let url = sanitize_ws_address(&self.config.url);
        let call_timeout = Duration::from_secs(self.config.call_timeout_s);
        let mut client = WsJsonRpcClient::connect(&url, call_timeout).await?;

        let sender_sub = client
            .subscribe("suix_subscribeEvent", vec![json!(self.sender_filter())])
            .await?;
        let maker_sub = client
            .subscribe("suix_subscribeEvent", vec![json!(self.maker_filter())])
            .await?;
        info!(
            "event subscriptions established (sender #{}, maker #{})",
            sender_sub, maker_sub
        );

        loop {
            let notification = client.next_notification().await?;
            let event: SuiEvent = match serde_json::from_value(notification.params.result) {
                Ok(event) => event,
                Err(e) => {
                    if log_enabled!(Level::Debug) {
                        debug!("skipping undecodable event: {}", e);
                    }
                    continue;
                }
            };
            self.handle_event(event);
        }
    }

    fn handle_event(&self, event: SuiEvent) {
        if log_enabled!(Level::Debug) {
            let parsed = parse_events(&event, &self.identity);
            debug!(
                "subscription event {} -> {} typed events",
                event.event_type,
                parsed.len()
            );
        }
        process_chain_events(
            std::slice::from_ref(&event),
            &self.identity,
            &self.cache,
            &self.router,
        );
    }
}

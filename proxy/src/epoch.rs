// Epoch boundary watcher. Resources poisoned by a finality timeout are only
// safe to reuse once the epoch they were used in has ended; this task polls
// the chain and releases them on each transition.

use crate::{account::AccountCapPool, chain::ChainClient, config::EPOCH_POLL_INTERVAL, gas::GasCoinManager};
use dex_common::task::spawn_task;
use log::{debug, info, log_enabled, warn, Level};
use std::sync::Arc;
use tokio::{task::JoinHandle, time::sleep};

pub struct EpochTracker {
    chain: Arc<dyn ChainClient>,
    gas: Arc<GasCoinManager>,
    caps: Arc<AccountCapPool>,
}

impl EpochTracker {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        gas: Arc<GasCoinManager>,
        caps: Arc<AccountCapPool>,
    ) -> Self {
        Self { chain, gas, caps }
    }

    pub fn start(self) -> JoinHandle<()> {
        spawn_task("epoch-tracker", async move {
            let mut last_epoch: Option<u64> = None;
            loop {
                match self.chain.get_current_epoch().await {
                    Ok(epoch) => {
                        match last_epoch {
                            Some(previous) if epoch > previous => {
                                info!("epoch changed {} -> {}, releasing skipped resources", previous, epoch);
                                self.gas.on_epoch_change().await;
                                self.caps.on_epoch_change();
                            }
                            None => {
                                if log_enabled!(Level::Debug) {
                                    debug!("tracking epochs from {}", epoch);
                                }
                            }
                            _ => {}
                        }
                        last_epoch = Some(epoch);
                    }
                    Err(e) => {
                        if log_enabled!(Level::Warn) {
                            warn!("epoch poll failed: {}", e);
                        }
                    }
                }
                sleep(EPOCH_POLL_INTERVAL).await;
            }
        })
    }
}

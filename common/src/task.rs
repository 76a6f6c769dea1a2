use log::{debug, log_enabled, Level};
use std::future::Future;
use tokio::task::JoinHandle;

// Spawn a named background task so failures are attributable in logs
pub fn spawn_task<F, S>(name: S, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
    S: Into<String>,
{
    let name = name.into();
    if log_enabled!(Level::Debug) {
        debug!("spawning task '{}'", name);
    }
    tokio::spawn(async move {
        let output = future.await;
        if log_enabled!(Level::Debug) {
            debug!("task '{}' has exited", name);
        }
        output
    })
}

use log::{error, info, warn};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Run `factory()` on its own task and start a fresh one whenever it
/// returns or panics. Aborting the returned handle stops supervision.
pub fn spawn_supervised<F, Fut>(name: impl Into<String>, restart_delay: Duration, factory: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let name = name.into();
    tokio::spawn(async move {
        info!("Starting task {}", name);
        loop {
            let worker = tokio::spawn(factory());
            let _stop_worker = AbortOnDrop(worker.abort_handle());

            match worker.await {
                Ok(()) => warn!("Task {} exited, restarting in {:?}", name, restart_delay),
                Err(e) if e.is_panic() => {
                    error!("Task {} panicked, restarting in {:?}", name, restart_delay)
                }
                Err(_) => {
                    info!("Task {} cancelled", name);
                    return;
                }
            }
            sleep(restart_delay).await;
        }
    })
}

/// Aborts the task behind the handle when dropped.
pub(crate) struct AbortOnDrop(pub(crate) tokio::task::AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

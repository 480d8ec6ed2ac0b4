//! Operator interrupt handling

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const SIGTERM_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cancel `scope` when the process receives Ctrl+C (SIGINT) or SIGTERM
///
/// The listener exits on its own once the scope is cancelled by anything else.
pub fn cancel_on_shutdown_signal(scope: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = scope.cancelled() => {}
            received = wait_for_shutdown_signal() => {
                match received {
                    Ok(signal) => info!("{} received, shutting down", signal),
                    Err(e) => error!("Failed to listen for shutdown signals: {}", e),
                }
                scope.cancel();
            }
        }
    })
}

/// Wait for the first shutdown signal and return its name
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use signal_hook::consts::SIGTERM;

        let sigterm = Arc::new(AtomicBool::new(false));
        let _registration = FlagRegistration::register(SIGTERM, Arc::clone(&sigterm))?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "Ctrl+C"),
            _ = poll_flag(sigterm) => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "Ctrl+C")
    }
}

/// A signal-hook flag registration, removed when dropped
///
/// Also released when the wait is abandoned because the scope was cancelled first.
#[cfg(unix)]
struct FlagRegistration {
    id: signal_hook::SigId,
}

#[cfg(unix)]
impl FlagRegistration {
    fn register(signal: std::os::raw::c_int, flag: Arc<AtomicBool>) -> std::io::Result<Self> {
        let id = signal_hook::flag::register(signal, flag)?;
        Ok(Self { id })
    }
}

#[cfg(unix)]
impl Drop for FlagRegistration {
    fn drop(&mut self) {
        signal_hook::low_level::unregister(self.id);
    }
}

#[cfg_attr(not(unix), allow(dead_code))]
async fn poll_flag(flag: Arc<AtomicBool>) {
    while !flag.load(Ordering::Relaxed) {
        tokio::time::sleep(SIGTERM_POLL_INTERVAL).await;
    }
}

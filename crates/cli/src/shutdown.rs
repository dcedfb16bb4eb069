use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Turns SIGINT and SIGTERM into cooperative cancellation of the running
/// import. The in-flight batch still finishes before the import stops.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    interrupted: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new(token: CancellationToken) -> Self {
        ShutdownCoordinator {
            token,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns the signal listener. It exits quietly if the token is
    /// cancelled by someone else first.
    pub fn register_handlers(&self) {
        let token = self.token.clone();
        let interrupted = self.interrupted.clone();

        tokio::spawn(async move {
            let signal_name = tokio::select! {
                name = wait_for_signal() => name,
                _ = token.cancelled() => return,
            };

            info!(signal = signal_name, "Interrupt received, stopping after the current batch");
            interrupted.store(true, Ordering::SeqCst);
            token.cancel();
        });
    }

    /// True once a signal, rather than the import itself, cancelled the token.
    pub fn is_shutdown_requested(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

async fn wait_for_signal() -> &'static str {
    let interrupt = async {
        match signal::ctrl_c().await {
            Ok(()) => "SIGINT",
            Err(err) => {
                warn!(error = %err, "SIGINT handler unavailable");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "SIGTERM"
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&'static str>();

    tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    }
}

/// Process exit status of `tally import`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    /// Command error, fatal import error, or a halted import.
    GeneralError = 1,
    /// Import stopped by SIGINT/SIGTERM or cancelled.
    ShutdownRequested = 130,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

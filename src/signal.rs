//! Interrupt listener
//!
//! A background task that waits for Ctrl-C / SIGTERM, stops further stages from
//! starting, runs the shared teardown and then hands control to an exit hook.
//! It races the main flow's own teardown call; the teardown gate makes sure only
//! one body runs.

use crate::context::RunContext;
use crate::teardown::{TeardownController, TeardownReport};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Set once an interrupt has been received. Never cleared.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    raised: Arc<AtomicBool>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

/// Resolves on the first Ctrl-C, or SIGTERM on Unix.
pub async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            warn!("Failed to listen for Ctrl-C: {}", e);
                            std::future::pending::<()>().await;
                        }
                    }
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Failed to register SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Spawn the listener. When `trigger` resolves the flag is raised, teardown runs
/// and `on_exit` receives the teardown report.
pub fn spawn_interrupt_listener<T, X>(
    trigger: T,
    flag: InterruptFlag,
    teardown: Arc<TeardownController>,
    ctx: Arc<RunContext>,
    on_exit: X,
) -> JoinHandle<()>
where
    T: Future<Output = ()> + Send + 'static,
    X: FnOnce(TeardownReport) + Send + 'static,
{
    tokio::spawn(async move {
        trigger.await;
        info!(run_id = ctx.run_id(), "Run interrupted; tearing down");
        flag.raise();
        let report = teardown.teardown(&ctx).await;
        on_exit(report);
    })
}

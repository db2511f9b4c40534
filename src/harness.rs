//! One verification run wired end to end: stages, sequencer, teardown and the
//! interrupt listener all share a single run context and teardown controller.

use crate::config::HarnessConfig;
use crate::context::RunContext;
use crate::error::HarnessError;
use crate::report::RunReport;
use crate::sequencer::{Sequencer, Stage};
use crate::signal::{self, InterruptFlag};
use crate::stages::{standard_stages, Backends, StageEnv};
use crate::teardown::{TeardownController, TeardownReport};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

pub struct Harness {
    env: Arc<StageEnv>,
    ctx: Arc<RunContext>,
    teardown: Arc<TeardownController>,
    interrupt: InterruptFlag,
}

impl Harness {
    /// Harness with a freshly generated run identity.
    pub fn new(config: HarnessConfig, backends: Backends) -> Result<Self, HarnessError> {
        Self::with_context(config, backends, RunContext::generate())
    }

    pub fn with_context(
        config: HarnessConfig,
        backends: Backends,
        ctx: RunContext,
    ) -> Result<Self, HarnessError> {
        let env = StageEnv::new(config, backends)?;
        let teardown = TeardownController::new(
            env.kubectl.clone(),
            env.backends.dns.clone(),
            env.config.dns.zone_id.clone(),
            env.config.teardown.enabled,
        );
        Ok(Self {
            env: Arc::new(env),
            ctx: Arc::new(ctx),
            teardown: Arc::new(teardown),
            interrupt: InterruptFlag::new(),
        })
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    pub fn teardown_controller(&self) -> &Arc<TeardownController> {
        &self.teardown
    }

    pub fn interrupt_flag(&self) -> &InterruptFlag {
        &self.interrupt
    }

    pub fn stages(&self) -> Vec<Box<dyn Stage>> {
        standard_stages(self.env.clone())
    }

    /// Start the listener that tears down when `trigger` resolves.
    pub fn spawn_interrupt_listener<T, X>(&self, trigger: T, on_exit: X) -> JoinHandle<()>
    where
        T: Future<Output = ()> + Send + 'static,
        X: FnOnce(TeardownReport) + Send + 'static,
    {
        signal::spawn_interrupt_listener(
            trigger,
            self.interrupt.clone(),
            self.teardown.clone(),
            self.ctx.clone(),
            on_exit,
        )
    }

    /// Run the standard stages, then tear down.
    pub async fn run(&self) -> RunReport {
        self.run_stages(&self.stages()).await
    }

    /// Run an arbitrary stage list against this harness's context, then tear down.
    pub async fn run_stages(&self, stages: &[Box<dyn Stage>]) -> RunReport {
        info!(
            run_id = self.ctx.run_id(),
            port = self.ctx.allocated_port(),
            "Starting verification run"
        );
        let mut report = Sequencer::new(self.interrupt.clone())
            .run(&self.ctx, stages)
            .await;
        report.teardown = Some(self.teardown.teardown(&self.ctx).await);
        report.interrupted |= self.interrupt.is_raised();
        report
    }
}

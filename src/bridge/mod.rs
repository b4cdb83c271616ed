//! Tool Dispatcher and Connection Prober: the bridge's public entry point.

use std::{path::Path, sync::Arc, time::Duration};

use serde_json::Map;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::{
    codegen,
    config::Config,
    engine::{EngineInvoker, EngineMode},
    error::{ToolError, ToolResult},
    normalize::Normalizer,
    tools::{Tool, ToolRequest},
};

/// Stateless dispatch pipeline: validate -> build -> invoke -> classify.
/// Holds no per-call state; concurrent dispatches are independent, bounded
/// only by the engine-process semaphore (the engine is license-seated and
/// heavyweight to start).
#[derive(Clone)]
pub struct Bridge {
    invoker: EngineInvoker,
    normalizer: Normalizer,
    default_timeout: Duration,
    probe_timeout: Duration,
    permits: Arc<Semaphore>,
}

impl Bridge {
    pub fn from_config(cfg: &Config) -> Self {
        let (executable, mode) = if cfg.use_kernel() {
            (cfg.kernel_path(), EngineMode::Kernel)
        } else {
            (cfg.script_path(), EngineMode::Script)
        };
        Self {
            invoker: EngineInvoker::new(executable, mode),
            normalizer: Normalizer::new(cfg.extra_error_markers()),
            default_timeout: cfg.default_timeout(),
            probe_timeout: cfg.probe_timeout(),
            permits: Arc::new(Semaphore::new(cfg.max_concurrent())),
        }
    }

    pub fn new(executable: impl AsRef<Path>, mode: EngineMode) -> Self {
        Self {
            invoker: EngineInvoker::new(executable.as_ref(), mode),
            normalizer: Normalizer::new(std::iter::empty()),
            default_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            permits: Arc::new(Semaphore::new(4)),
        }
    }

    /// Replace the engine executable, keeping the rest of the pipeline.
    pub fn with_executable(mut self, executable: impl AsRef<Path>, mode: EngineMode) -> Self {
        self.invoker = EngineInvoker::new(executable.as_ref(), mode);
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_max_concurrent(mut self, permits: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(permits.max(1)));
        self
    }

    pub fn executable(&self) -> &Path {
        self.invoker.executable()
    }

    /// Run one tool invocation end to end. Every failure comes back as a
    /// typed `ToolError`; a panic anywhere in the pipeline is contained
    /// in the spawned task and surfaces as `InternalError`.
    pub async fn dispatch(&self, request: ToolRequest) -> ToolResult {
        let bridge = self.clone();
        match tokio::spawn(async move { bridge.run(request).await }).await {
            Ok(result) => result,
            Err(err) => Err(ToolError::Internal(panic_message(err))),
        }
    }

    async fn run(&self, request: ToolRequest) -> ToolResult {
        request.validate()?;
        let program = codegen::build(request.tool(), request.args())?;
        let limit = request.timeout().unwrap_or(self.default_timeout);
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ToolError::Internal("engine permit pool closed".into()))?;
        debug!(tool = request.tool().name(), limit_secs = limit.as_secs(), "dispatching tool");
        let outcome = self.invoker.invoke(&program, limit).await?;
        self.normalizer.classify(&outcome, limit)
    }

    /// Reachability probe: a fixed trivial program through the same
    /// pipeline with a short timeout. The failure kind distinguishes a
    /// missing executable, a licensing failure, and a hung engine.
    pub async fn test_connection(&self) -> ToolResult {
        let request =
            ToolRequest::new(Tool::TestConnection, Map::new()).with_timeout(self.probe_timeout);
        self.dispatch(request).await
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return "tool pipeline task was cancelled".into();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<String>() {
        format!("tool pipeline panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        format!("tool pipeline panicked: {s}")
    } else {
        "tool pipeline panicked".into()
    }
}

//! Runtime lifecycle: lazily loads the sandbox worker and tracks its state.
//!
//! The interpreter is not `Send`, so it lives on one dedicated OS thread for the
//! whole process. Everyone else talks to it through a [`SandboxWorker`], a cheap
//! cloneable handle around a job queue. Jobs are drained one at a time, which is
//! what serializes concurrent runs.
//!
//! ```text
//! Uninitialized --ensure_ready--> Initializing --ok--> Ready
//!                                      |
//!                                      +--err--> Failed(reason) --ensure_ready--> Initializing ...
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, OnceCell};
use tracing::{debug, error, info, instrument, warn};

use crate::config::SandboxConfig;
use crate::domain::{EngineStatus, ExecutionOutcome};
use crate::error::RuntimeError;
use crate::interp::Interpreter;
use crate::sandbox;

/// Stack for the worker thread; deep student recursion walks a lot of Rust frames.
const WORKER_STACK_BYTES: usize = 64 * 1024 * 1024;
const JOB_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeState {
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
}

struct Job {
    code: String,
    reply: oneshot::Sender<ExecutionOutcome>,
}

/// Handle to the thread that owns the interpreter.
#[derive(Clone, Debug)]
pub struct SandboxWorker {
    jobs: mpsc::Sender<Job>,
}

impl SandboxWorker {
    /// Spawns the worker thread, runs the prelude, and waits until it reports back.
    pub async fn spawn(config: SandboxConfig) -> Result<Self, RuntimeError> {
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>(JOB_QUEUE_DEPTH);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

        thread::Builder::new()
            .name("sandbox-worker".into())
            .stack_size(WORKER_STACK_BYTES)
            .spawn(move || worker_main(config, jobs_rx, ready_tx))
            .map_err(|e| RuntimeError::InitFailed(format!("cannot spawn sandbox thread: {e}")))?;

        match ready_rx.await {
            Ok(Ok(())) => Ok(Self { jobs: jobs_tx }),
            Ok(Err(reason)) => Err(RuntimeError::InitFailed(reason)),
            Err(_) => Err(RuntimeError::WorkerGone),
        }
    }

    /// Queues `code` and waits for the outcome.
    pub async fn execute(&self, code: String) -> Result<ExecutionOutcome, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.jobs
            .send(Job { code, reply })
            .await
            .map_err(|_| RuntimeError::WorkerGone)?;
        rx.await.map_err(|_| RuntimeError::WorkerGone)
    }
}

fn worker_main(
    config: SandboxConfig,
    mut jobs: mpsc::Receiver<Job>,
    ready: oneshot::Sender<Result<(), String>>,
) {
    let mut interp = Interpreter::new(config.limits());
    if let Some(prelude) = config.prelude.as_deref() {
        let out = interp.execute(prelude);
        if let Some(fault) = out.fault {
            error!(target: "sandbox", %fault, "Prelude failed; sandbox not started");
            let _ = ready.send(Err(format!("prelude failed: {fault}")));
            return;
        }
        debug!(target: "sandbox", prelude_len = prelude.len(), "Prelude loaded");
    }
    if ready.send(Ok(())).is_err() {
        warn!(target: "sandbox", "Loader went away before the sandbox was ready");
        return;
    }
    info!(target: "sandbox", fresh_namespace = config.fresh_namespace_per_run, "Sandbox worker started");

    while let Some(job) = jobs.blocking_recv() {
        let outcome = sandbox::execute_job(&mut interp, &config, &job.code);
        if job.reply.send(outcome).is_err() {
            debug!(target: "sandbox", "Caller dropped before the run finished");
        }
    }
    info!(target: "sandbox", "Sandbox worker stopped");
}

/// Strategy for bringing the sandbox up. Swappable for tests.
#[async_trait]
pub trait RuntimeLoader: Send + Sync {
    async fn load(&self) -> Result<SandboxWorker, RuntimeError>;
}

/// Default loader: spawns the worker thread and runs the configured prelude.
#[derive(Debug, Clone, Default)]
pub struct PreludeLoader {
    config: SandboxConfig,
}

impl PreludeLoader {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RuntimeLoader for PreludeLoader {
    async fn load(&self) -> Result<SandboxWorker, RuntimeError> {
        SandboxWorker::spawn(self.config.clone()).await
    }
}

/// Owns the lazily loaded sandbox worker. Construct once and share by `Arc`.
pub struct RuntimeHandle {
    loader: Arc<dyn RuntimeLoader>,
    worker: OnceCell<SandboxWorker>,
    state: Mutex<RuntimeState>,
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl RuntimeHandle {
    pub fn new(config: SandboxConfig) -> Self {
        Self::with_loader(Arc::new(PreludeLoader::new(config)))
    }

    pub fn with_loader(loader: Arc<dyn RuntimeLoader>) -> Self {
        Self {
            loader,
            worker: OnceCell::new(),
            state: Mutex::new(RuntimeState::Uninitialized),
        }
    }

    /// Loads the sandbox once. Concurrent callers share the in-flight load;
    /// after a failure the next call tries again.
    #[instrument(level = "info", skip(self))]
    pub async fn ensure_ready(&self) -> Result<(), RuntimeError> {
        if self.worker.initialized() {
            return Ok(());
        }
        self.worker
            .get_or_try_init(|| async {
                self.set_state(RuntimeState::Initializing);
                info!(target: "caatuu_engine", "Loading sandbox runtime");
                match self.loader.load().await {
                    Ok(worker) => {
                        self.set_state(RuntimeState::Ready);
                        info!(target: "caatuu_engine", "Sandbox runtime ready");
                        Ok(worker)
                    }
                    Err(e) => {
                        error!(target: "caatuu_engine", error = %e, "Sandbox runtime failed to load");
                        self.set_state(RuntimeState::Failed(e.to_string()));
                        Err(e)
                    }
                }
            })
            .await
            .map(|_| ())
    }

    pub fn is_ready(&self) -> bool {
        self.worker.initialized()
    }

    pub fn state(&self) -> RuntimeState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn status(&self) -> EngineStatus {
        match self.state() {
            RuntimeState::Uninitialized => EngineStatus::default(),
            RuntimeState::Initializing => EngineStatus { initializing: true, ..EngineStatus::default() },
            RuntimeState::Ready => EngineStatus { ready: true, ..EngineStatus::default() },
            RuntimeState::Failed(reason) => EngineStatus { error: Some(reason), ..EngineStatus::default() },
        }
    }

    /// The loaded worker, without triggering a load.
    pub fn worker(&self) -> Result<&SandboxWorker, RuntimeError> {
        self.worker.get().ok_or(RuntimeError::NotReady)
    }

    fn set_state(&self, next: RuntimeState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLoader {
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl RuntimeLoader for CountingLoader {
        async fn load(&self) -> Result<SandboxWorker, RuntimeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if self.fail_first && n == 0 {
                return Err(RuntimeError::InitFailed("first load fails".into()));
            }
            SandboxWorker::spawn(SandboxConfig::default()).await
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_load() {
        let loader = Arc::new(CountingLoader { calls: AtomicUsize::new(0), fail_first: false });
        let handle = Arc::new(RuntimeHandle::with_loader(loader.clone()));
        assert_eq!(handle.state(), RuntimeState::Uninitialized);

        let (a, b, c) = tokio::join!(handle.ensure_ready(), handle.ensure_ready(), handle.ensure_ready());
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_ready());
        assert!(handle.status().ready);

        handle.ensure_ready().await.unwrap();
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_load_is_retried() {
        let loader = Arc::new(CountingLoader { calls: AtomicUsize::new(0), fail_first: true });
        let handle = RuntimeHandle::with_loader(loader.clone());

        let err = handle.ensure_ready().await.unwrap_err();
        assert!(matches!(err, RuntimeError::InitFailed(_)));
        assert!(matches!(handle.state(), RuntimeState::Failed(_)));
        assert_eq!(handle.status().error.as_deref(), Some("runtime initialization failed: first load fails"));
        assert!(handle.worker().is_err());

        handle.ensure_ready().await.unwrap();
        assert_eq!(handle.state(), RuntimeState::Ready);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn broken_prelude_fails_initialization() {
        let config = SandboxConfig { prelude: Some("def f(:\n    pass\n".into()), ..SandboxConfig::default() };
        let handle = RuntimeHandle::new(config);
        let err = handle.ensure_ready().await.unwrap_err();
        match err {
            RuntimeError::InitFailed(reason) => assert!(reason.contains("SyntaxError"), "{reason}"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!handle.is_ready());
    }

    #[tokio::test]
    async fn worker_runs_jobs() {
        let worker = SandboxWorker::spawn(SandboxConfig::default()).await.unwrap();
        let out = worker.execute("print(6 * 7)".into()).await.unwrap();
        assert_eq!(out.stdout, "42\n");
        assert!(out.fault.is_none());
    }
}

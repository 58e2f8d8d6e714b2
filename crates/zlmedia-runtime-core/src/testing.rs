//! Test doubles: an in-process control plane and a scriptable process manager.

use crate::client::{OP_GET_CONFIGS, OP_IS_ALIVE, OP_SET_CONFIGS};
use crate::config::TerminationConfig;
use crate::error::ProcessError;
use crate::output::OutputChannel;
use crate::process::{
    LaunchSpec, ProcessHandle, ProcessId, ProcessLauncher, ProcessManager, ProcessTermination,
    TerminationResult,
};
use crate::secret::SECRET_CONFIG_KEY;
use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct StubState {
    not_alive_remaining: AtomicUsize,
    probes: AtomicUsize,
    reject_configs: AtomicBool,
    normalized_secret: Mutex<Option<String>>,
    secrets: Mutex<Vec<String>>,
    pushed: Mutex<Vec<HashMap<String, String>>>,
    live: Mutex<HashMap<String, String>>,
}

/// Minimal ZLMediaKit-like control plane on an ephemeral localhost port
pub struct StubControlPlane {
    port: u16,
    state: Arc<StubState>,
    server: JoinHandle<()>,
}

impl StubControlPlane {
    pub async fn start() -> Self {
        let state = Arc::new(StubState::default());
        let app = Router::new()
            .route("/index/api/{operation}", get(handle))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub control plane");
        let port = listener.local_addr().expect("stub address").port();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            port,
            state,
            server,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Answer the next `count` probes with a non-zero code
    pub fn not_alive_for(&self, count: usize) {
        self.state.not_alive_remaining.store(count, Ordering::SeqCst);
    }

    pub fn reject_configs(&self) {
        self.state.reject_configs.store(true, Ordering::SeqCst);
    }

    /// Echo `secret` back as the accepted `api.secret` on configuration pushes
    pub fn normalize_secret(&self, secret: impl Into<String>) {
        *lock(&self.state.normalized_secret) = Some(secret.into());
    }

    pub fn probe_count(&self) -> usize {
        self.state.probes.load(Ordering::SeqCst)
    }

    /// `secret` query parameter of every request, in arrival order
    pub fn secrets_seen(&self) -> Vec<String> {
        lock(&self.state.secrets).clone()
    }

    /// Parameters of every accepted configuration push
    pub fn pushed_configs(&self) -> Vec<HashMap<String, String>> {
        lock(&self.state.pushed).clone()
    }
}

impl Drop for StubControlPlane {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle(
    State(state): State<Arc<StubState>>,
    Path(operation): Path<String>,
    Query(mut params): Query<HashMap<String, String>>,
) -> Json<Value> {
    if let Some(secret) = params.remove("secret") {
        lock(&state.secrets).push(secret);
    }

    let reply = match operation.as_str() {
        OP_IS_ALIVE => {
            state.probes.fetch_add(1, Ordering::SeqCst);
            let starting = state
                .not_alive_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if starting {
                json!({"code": -1, "msg": "starting"})
            } else {
                json!({"code": 0, "data": {"branchName": "stub", "buildTime": "now"}})
            }
        }
        OP_SET_CONFIGS if state.reject_configs.load(Ordering::SeqCst) => {
            json!({"code": -100, "msg": "rejected"})
        }
        OP_SET_CONFIGS => {
            let changed = params.len();
            lock(&state.pushed).push(params.clone());
            lock(&state.live).extend(params);

            match lock(&state.normalized_secret).clone() {
                Some(secret) => {
                    lock(&state.live).insert(SECRET_CONFIG_KEY.to_string(), secret.clone());
                    json!({"code": 0, "changed": changed, "data": {SECRET_CONFIG_KEY: secret}})
                }
                None => json!({"code": 0, "changed": changed}),
            }
        }
        OP_GET_CONFIGS => {
            let live = lock(&state.live).clone();
            json!({"code": 0, "data": [live]})
        }
        _ => json!({"code": -404, "msg": "unknown operation"}),
    };

    Json(reply)
}

/// Observable side effects of [`FakeProcessManager`]
#[derive(Debug, Clone, PartialEq)]
pub enum FakeEvent {
    /// A pid was terminated through [`ProcessTermination`]
    Terminated(ProcessId),
    /// A process was spawned
    Spawned(LaunchSpec),
}

/// Controls one fake child process
#[derive(Clone, Debug)]
pub struct FakeProcess {
    pid: Option<ProcessId>,
    exit: Arc<watch::Sender<Option<i32>>>,
    output: OutputChannel,
    terminate_requests: Arc<AtomicUsize>,
}

impl FakeProcess {
    pub fn pid(&self) -> Option<ProcessId> {
        self.pid
    }

    /// Make the process exit with `code`; only the first exit counts
    pub fn exit(&self, code: i32) {
        self.exit.send_if_modified(|state| {
            if state.is_none() {
                *state = Some(code);
                true
            } else {
                false
            }
        });
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.exit.borrow()
    }

    /// Write a line to the process output
    pub fn emit(&self, line: impl Into<String>) {
        self.output.publish(line);
    }

    pub fn terminate_requests(&self) -> usize {
        self.terminate_requests.load(Ordering::SeqCst)
    }
}

pub struct FakeProcessHandle {
    process: FakeProcess,
}

#[async_trait]
impl ProcessHandle for FakeProcessHandle {
    fn get_pid(&self) -> Option<ProcessId> {
        self.process.pid
    }

    async fn wait(&mut self) -> Result<i32, ProcessError> {
        let mut exit = self.process.exit.subscribe();
        let code = exit
            .wait_for(Option::is_some)
            .await
            .map_err(|e| ProcessError::IoError(io::Error::other(e)))?;
        Ok(code.unwrap_or_default())
    }

    async fn terminate(&mut self) -> TerminationResult {
        self.process.terminate_requests.fetch_add(1, Ordering::SeqCst);
        if self.process.exit_code().is_some() {
            return TerminationResult::ProcessNotFound;
        }
        self.process.exit(128 + 15);
        TerminationResult::Success
    }

    async fn kill(&mut self) -> Result<(), ProcessError> {
        self.process.exit(128 + 9);
        Ok(())
    }
}

#[derive(Default)]
struct FakeInner {
    events: Mutex<Vec<FakeEvent>>,
    processes: Mutex<Vec<FakeProcess>>,
    fail_spawn: AtomicBool,
    hide_pid: AtomicBool,
    exit_on_spawn: Mutex<Option<i32>>,
    next_pid: AtomicU32,
}

/// Deterministic [`ProcessManager`] that never touches the operating system
#[derive(Clone, Default)]
pub struct FakeProcessManager {
    inner: Arc<FakeInner>,
}

impl FakeProcessManager {
    /// Spawning fails as if the executable were missing
    pub fn fail_spawn(&self) {
        self.inner.fail_spawn.store(true, Ordering::SeqCst);
    }

    /// Spawned processes report no pid
    pub fn hide_pid(&self) {
        self.inner.hide_pid.store(true, Ordering::SeqCst);
    }

    /// Spawned processes exit with `code` right away
    pub fn exit_on_spawn(&self, code: i32) {
        *lock(&self.inner.exit_on_spawn) = Some(code);
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        lock(&self.inner.events).clone()
    }

    pub fn processes(&self) -> Vec<FakeProcess> {
        lock(&self.inner.processes).clone()
    }

    /// Wait until the `index`-th process has been spawned
    pub async fn spawned(&self, index: usize) -> FakeProcess {
        loop {
            if let Some(process) = self.processes().get(index) {
                return process.clone();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl ProcessLauncher for FakeProcessManager {
    type Handle = FakeProcessHandle;

    async fn spawn_process(
        &self,
        spec: &LaunchSpec,
        output: OutputChannel,
    ) -> Result<Self::Handle, ProcessError> {
        if self.inner.fail_spawn.load(Ordering::SeqCst) {
            return Err(ProcessError::SpawnFailed(io::Error::from(
                io::ErrorKind::NotFound,
            )));
        }

        let pid = if self.inner.hide_pid.load(Ordering::SeqCst) {
            None
        } else {
            Some(40_000 + self.inner.next_pid.fetch_add(1, Ordering::SeqCst))
        };
        let (exit, _) = watch::channel(None);
        let process = FakeProcess {
            pid,
            exit: Arc::new(exit),
            output,
            terminate_requests: Arc::new(AtomicUsize::new(0)),
        };
        if let Some(code) = *lock(&self.inner.exit_on_spawn) {
            process.exit(code);
        }

        lock(&self.inner.events).push(FakeEvent::Spawned(spec.clone()));
        lock(&self.inner.processes).push(process.clone());
        Ok(FakeProcessHandle { process })
    }
}

#[async_trait]
impl ProcessTermination for FakeProcessManager {
    async fn terminate_pid(
        &self,
        pid: ProcessId,
        _policy: &TerminationConfig,
    ) -> TerminationResult {
        lock(&self.inner.events).push(FakeEvent::Terminated(pid));
        TerminationResult::Success
    }
}

impl ProcessManager for FakeProcessManager {
    fn new() -> Self {
        Self::default()
    }
}

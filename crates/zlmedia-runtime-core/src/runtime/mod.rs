mod exit_watcher;
mod poller;
mod reaper;
mod rotation;

use crate::client::ControlPlaneClient;
use crate::config::RuntimeConfig;
use crate::error::{ProcessError, RuntimeError};
use crate::output::OutputChannel;
use crate::pid::PidRecord;
use crate::process::{LaunchSpec, ProcessHandle, ProcessId, ProcessManager};
use crate::readiness::{Readiness, ReadinessSignal};
use crate::secret::{BOOTSTRAP_SECRET, SECRET_CONFIG_KEY, SharedSecret};
use exit_watcher::ExitWatch;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Lifecycle of a [`MediaRuntime`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    NotStarted,
    Starting,
    Ready,
    FailedToStart,
    Disposed,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Supervises one media server process.
///
/// `start()` reaps a stale instance, launches the executable, waits until the control
/// plane answers and finally rotates the control-plane secret. Crashes after that point
/// are only logged.
pub struct MediaRuntime<Manager: ProcessManager> {
    config: RuntimeConfig,
    process_manager: Arc<Manager>,
    pid_record: PidRecord,
    output: OutputChannel,
    readiness: ReadinessSignal,
    secret: Arc<SharedSecret>,
    operations: ControlPlaneClient,
    configs: Mutex<HashMap<String, String>>,
    state: Mutex<RuntimeState>,
    pid: OnceLock<ProcessId>,
    cancellation_token: CancellationToken,
    disposed: AtomicBool,
    exit_watcher: Mutex<Option<JoinHandle<()>>>,
}

impl<Manager: ProcessManager + 'static> MediaRuntime<Manager> {
    pub fn new(config: RuntimeConfig, process_manager: Arc<Manager>) -> Result<Self, RuntimeError> {
        config.validate()?;

        let initial_secret = config
            .configs
            .get(SECRET_CONFIG_KEY)
            .map(String::as_str)
            .unwrap_or(BOOTSTRAP_SECRET);
        let secret = Arc::new(SharedSecret::new(initial_secret));
        let operations =
            ControlPlaneClient::new(config.http_port, secret.clone(), config.request_timeout)
                .map_err(|e| RuntimeError::Configuration(e.into()))?;

        Ok(Self {
            pid_record: PidRecord::for_executable(&config.executable),
            output: OutputChannel::new(config.output_capacity),
            readiness: ReadinessSignal::new(),
            configs: Mutex::new(config.configs.clone()),
            state: Mutex::new(RuntimeState::NotStarted),
            pid: OnceLock::new(),
            cancellation_token: CancellationToken::new(),
            disposed: AtomicBool::new(false),
            exit_watcher: Mutex::new(None),
            secret,
            operations,
            process_manager,
            config,
        })
    }

    /// Launch the media server and wait until it is alive and re-secured.
    ///
    /// Fails with [`RuntimeError::Launch`] if the executable cannot be spawned, with
    /// [`RuntimeError::ProcessExitedBeforeReady`] if it dies before answering a probe and with
    /// [`RuntimeError::SecretRotation`] if the new secret could not be pushed. A runtime can
    /// only be started once.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        {
            let mut state = lock(&self.state);
            match *state {
                RuntimeState::NotStarted => *state = RuntimeState::Starting,
                RuntimeState::Disposed => return Err(RuntimeError::Disposed),
                _ => return Err(RuntimeError::AlreadyStarted),
            }
        }

        let result = self.launch_and_await().await;

        let mut state = lock(&self.state);
        if *state == RuntimeState::Starting {
            *state = match result {
                Ok(()) => RuntimeState::Ready,
                Err(_) => RuntimeState::FailedToStart,
            };
        }
        result
    }

    async fn launch_and_await(&self) -> Result<(), RuntimeError> {
        let executable = &self.config.executable;
        info!(executable = %executable.display(), "Starting media server");

        reaper::reap_if_stale(
            &self.pid_record,
            self.process_manager.as_ref(),
            &self.config.termination,
        )
        .await;

        let launch_error = |source: ProcessError| RuntimeError::Launch {
            path: executable.clone(),
            source,
        };
        let spec = LaunchSpec::for_executable(executable)
            .map_err(|e| launch_error(ProcessError::IoError(e)))?;

        if self.cancellation_token.is_cancelled() {
            return Err(RuntimeError::Disposed);
        }
        let handle = self
            .process_manager
            .spawn_process(&spec, self.output.clone())
            .await
            .map_err(launch_error)?;

        let pid = handle.get_pid();
        match pid {
            Some(pid) => {
                let _ = self.pid.set(pid);
                if let Err(e) = self.pid_record.write(pid) {
                    warn!(pid, error = %e, "Failed to write pid record");
                }
                info!(pid, "Media server spawned");
            }
            None => warn!("Media server pid unknown, stale instance reaping disabled for the next run"),
        }

        let watcher = tokio::spawn(exit_watcher::watch_exit(
            handle,
            ExitWatch {
                readiness: self.readiness.clone(),
                cancellation_token: self.cancellation_token.clone(),
                pid_record: pid.map(|_| self.pid_record.clone()),
                termination: self.config.termination.clone(),
            },
        ));
        *lock(&self.exit_watcher) = Some(watcher);

        tokio::spawn(poller::poll_until_alive(
            self.operations.clone(),
            self.readiness.clone(),
            self.config.polling.clone(),
            self.cancellation_token.child_token(),
        ));

        let readiness = tokio::select! {
            readiness = self.readiness.wait() => readiness,
            _ = self.cancellation_token.cancelled() => return Err(RuntimeError::Disposed),
        };
        match readiness {
            Readiness::Ready => {}
            Readiness::Failed(code) => return Err(RuntimeError::ProcessExitedBeforeReady(code)),
            Readiness::Pending => return Err(RuntimeError::Disposed),
        }

        let rotated = rotation::rotate_secret(&self.operations, &self.secret, &self.configs).await;
        if let Err(e) = rotated {
            if self.secret.is_bootstrap() {
                warn!(
                    error = %e,
                    "Secret rotation failed, control plane still accepts the bootstrap secret"
                );
            }
            return Err(RuntimeError::SecretRotation(e));
        }

        info!(pid = ?pid, "Media server started");
        Ok(())
    }

    /// Live output of the media server, stdout and stderr merged.
    ///
    /// Only lines emitted after subscribing are delivered.
    pub fn output(&self) -> impl Stream<Item = String> + Send + Unpin + 'static {
        self.output.subscribe()
    }

    /// Control-plane client; requests always carry the current secret
    pub fn operations(&self) -> &ControlPlaneClient {
        &self.operations
    }

    /// Stop supervising and terminate the media server. Safe to call repeatedly.
    ///
    /// In-flight control-plane requests, including a running secret rotation, are not cancelled.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        *lock(&self.state) = RuntimeState::Disposed;
        self.cancellation_token.cancel();
        info!(pid = ?self.pid(), "Disposing media server runtime");
    }

    /// Dispose and wait until the media server process has been reaped
    pub async fn shutdown(&self) {
        self.dispose();
        let watcher = lock(&self.exit_watcher).take();
        if let Some(watcher) = watcher {
            if let Err(e) = watcher.await {
                warn!(error = %e, "Exit watcher failed");
            }
        }
    }

    pub fn state(&self) -> RuntimeState {
        *lock(&self.state)
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.current()
    }

    /// Pid of the launched process, if the platform reported one
    pub fn pid(&self) -> Option<ProcessId> {
        self.pid.get().copied()
    }

    /// Configuration map as last pushed (or to be pushed) to the media server
    pub fn configs(&self) -> HashMap<String, String> {
        lock(&self.configs).clone()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn pid_record(&self) -> &PidRecord {
        &self.pid_record
    }
}

impl<Manager: ProcessManager> Drop for MediaRuntime<Manager> {
    fn drop(&mut self) {
        // the exit watcher terminates the child once cancelled
        self.cancellation_token.cancel();
    }
}

use crate::config::TerminationConfig;
use crate::error::ProcessError;
use crate::pid::PidRecord;
use crate::process::{ProcessHandle, TerminationResult};
use crate::readiness::ReadinessSignal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything the exit watcher needs besides the process itself
pub(crate) struct ExitWatch {
    pub readiness: ReadinessSignal,
    pub cancellation_token: CancellationToken,
    pub pid_record: Option<PidRecord>,
    pub termination: TerminationConfig,
}

/// Own the child until it exits.
///
/// Cancelling the token terminates the child; the exit is then expected and not reported.
pub(crate) async fn watch_exit<H: ProcessHandle>(mut handle: H, watch: ExitWatch) {
    let pid = handle.get_pid();

    let exited = tokio::select! {
        status = handle.wait() => Some(status),
        _ = watch.cancellation_token.cancelled() => None,
    };
    let status = match exited {
        Some(status) => status,
        None => terminate(&mut handle, &watch.termination).await,
    };

    if let (Some(record), Some(pid)) = (&watch.pid_record, pid) {
        if let Err(e) = record.remove_if_owned(pid) {
            debug!(pid, error = %e, "Failed to remove pid record");
        }
    }

    if watch.cancellation_token.is_cancelled() {
        debug!(?pid, result = ?status, "Media server stopped after dispose");
        return;
    }

    let code = match status {
        Ok(code) => code,
        Err(e) => {
            error!(?pid, error = %e, "Failed to wait for media server");
            -1
        }
    };

    if watch.readiness.fail(code) {
        warn!(?pid, code, "Media server exited before becoming ready");
    } else {
        warn!(?pid, code, "Media server exit with code {}", code);
    }
}

async fn terminate<H: ProcessHandle>(
    handle: &mut H,
    policy: &TerminationConfig,
) -> Result<i32, ProcessError> {
    match handle.terminate().await {
        TerminationResult::Success => {}
        TerminationResult::ProcessNotFound => return handle.wait().await,
        other => warn!(result = ?other, "Graceful termination failed"),
    }

    match tokio::time::timeout(policy.grace_period(), handle.wait()).await {
        Ok(status) => status,
        Err(_) => {
            info!("Media server ignored SIGTERM, killing it");
            handle.kill().await?;
            handle.wait().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputChannel;
    use crate::process::{LaunchSpec, ProcessLauncher};
    use crate::readiness::Readiness;
    use crate::testing::FakeProcessManager;
    use std::path::Path;

    async fn spawn(manager: &FakeProcessManager) -> <FakeProcessManager as ProcessLauncher>::Handle {
        let spec = LaunchSpec::for_executable(Path::new("/opt/zlm/MediaServer")).unwrap();
        manager
            .spawn_process(&spec, OutputChannel::new(8))
            .await
            .unwrap()
    }

    fn watch(readiness: &ReadinessSignal, token: &CancellationToken) -> ExitWatch {
        ExitWatch {
            readiness: readiness.clone(),
            cancellation_token: token.clone(),
            pid_record: None,
            termination: TerminationConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_early_exit_fails_readiness() {
        let manager = FakeProcessManager::default();
        let handle = spawn(&manager).await;
        let readiness = ReadinessSignal::new();
        let token = CancellationToken::new();

        manager.processes()[0].exit(1);
        watch_exit(handle, watch(&readiness, &token)).await;

        assert_eq!(readiness.current(), Readiness::Failed(1));
    }

    #[tokio::test]
    async fn test_exit_after_ready_keeps_ready() {
        let manager = FakeProcessManager::default();
        let handle = spawn(&manager).await;
        let readiness = ReadinessSignal::new();
        readiness.mark_ready();
        let token = CancellationToken::new();

        manager.processes()[0].exit(139);
        watch_exit(handle, watch(&readiness, &token)).await;

        assert_eq!(readiness.current(), Readiness::Ready);
    }

    #[tokio::test]
    async fn test_cancel_terminates_without_resolving() {
        let manager = FakeProcessManager::default();
        let handle = spawn(&manager).await;
        let readiness = ReadinessSignal::new();
        let token = CancellationToken::new();

        let task = tokio::spawn(watch_exit(handle, watch(&readiness, &token)));
        token.cancel();
        task.await.unwrap();

        let process = &manager.processes()[0];
        assert_eq!(process.terminate_requests(), 1);
        assert_eq!(process.exit_code(), Some(143));
        assert!(readiness.is_pending());
    }

    #[tokio::test]
    async fn test_removes_own_pid_record() {
        let dir = tempfile::tempdir().unwrap();
        let record = PidRecord::for_executable(dir.path().join("MediaServer"));
        let manager = FakeProcessManager::default();
        let handle = spawn(&manager).await;
        let process = manager.processes()[0].clone();
        record.write(process.pid().unwrap()).unwrap();

        let readiness = ReadinessSignal::new();
        let token = CancellationToken::new();
        let mut watch = watch(&readiness, &token);
        watch.pid_record = Some(record.clone());

        process.exit(0);
        watch_exit(handle, watch).await;

        assert!(!record.path().exists());
    }
}

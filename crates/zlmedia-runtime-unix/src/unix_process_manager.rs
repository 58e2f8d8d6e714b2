use async_trait::async_trait;
use zlmedia_runtime_core::{
    LaunchSpec, OutputChannel, ProcessError, ProcessHandle, ProcessId, ProcessLauncher,
    ProcessManager, ProcessTermination, TerminationConfig, TerminationResult,
};

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use backon::{ConstantBuilder, Retryable};
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use std::os::fd::OwnedFd;
    use std::os::unix::process::ExitStatusExt;
    use std::process::{ExitStatus, Stdio};
    use tokio::net::unix::pipe;
    use tokio::process::{Child, Command};
    use tracing::{debug, info, warn};

    /// Exit code of `status`, using the shell convention `128 + signal` for signalled processes
    pub(crate) fn exit_code(status: ExitStatus) -> i32 {
        status
            .code()
            .or_else(|| status.signal().map(|signal| 128 + signal))
            .unwrap_or(-1)
    }

    fn send_signal(pid: ProcessId, signal: Signal) -> TerminationResult {
        let Ok(raw) = i32::try_from(pid) else {
            return TerminationResult::Refused;
        };
        match signal::kill(NixPid::from_raw(raw), signal) {
            Ok(()) => {
                info!("Sent {} to process {}", signal, pid);
                TerminationResult::Success
            }
            Err(Errno::ESRCH) => {
                info!("Process {} not found (already terminated)", pid);
                TerminationResult::ProcessNotFound
            }
            Err(Errno::EPERM) => {
                warn!("Permission denied to signal process {}", pid);
                TerminationResult::AccessDenied
            }
            Err(e) => {
                warn!("Failed to send {} to process {}: {}", signal, pid, e);
                TerminationResult::Failed(format!("{signal} failed: {e}"))
            }
        }
    }

    fn is_alive(pid: ProcessId) -> bool {
        i32::try_from(pid)
            .map(|raw| signal::kill(NixPid::from_raw(raw), None).is_ok())
            .unwrap_or(false)
    }

    /// Unix-specific process handle implementation
    pub struct UnixProcessHandle {
        child: Child,
        pid: Option<ProcessId>,
    }

    impl UnixProcessHandle {
        pub fn new(child: Child) -> Self {
            let pid = child.id();
            Self { child, pid }
        }
    }

    #[async_trait]
    impl ProcessHandle for UnixProcessHandle {
        fn get_pid(&self) -> Option<ProcessId> {
            self.pid
        }

        async fn wait(&mut self) -> Result<i32, ProcessError> {
            let status = self.child.wait().await?;
            Ok(exit_code(status))
        }

        async fn terminate(&mut self) -> TerminationResult {
            // `Child::id` turns `None` once the child has been reaped
            match self.child.id() {
                Some(pid) => send_signal(pid, Signal::SIGTERM),
                None => TerminationResult::ProcessNotFound,
            }
        }

        async fn kill(&mut self) -> Result<(), ProcessError> {
            self.child.start_kill()?;
            Ok(())
        }
    }

    /// Unix-specific process manager: spawns through `tokio::process`, signals through `nix`
    #[derive(Debug, Default)]
    pub struct UnixProcessManager;

    #[async_trait]
    impl ProcessLauncher for UnixProcessManager {
        type Handle = UnixProcessHandle;

        async fn spawn_process(
            &self,
            spec: &LaunchSpec,
            output: OutputChannel,
        ) -> Result<Self::Handle, ProcessError> {
            // stdout and stderr share one pipe so their lines keep the order they were written in
            let (reader, writer) = std::io::pipe().map_err(ProcessError::SpawnFailed)?;
            let receiver = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;

            let mut cmd = Command::new(&spec.program);
            if let Some(dir) = &spec.working_dir {
                cmd.current_dir(dir);
            }
            cmd.stdin(Stdio::null())
                .stdout(writer.try_clone()?)
                .stderr(writer)
                .kill_on_drop(true);

            let spawned = cmd.spawn();
            // our copies of the write end must go, or the reader never sees EOF
            drop(cmd);
            let child = spawned.map_err(ProcessError::SpawnFailed)?;

            tokio::spawn(output.forward_lines(receiver));

            let handle = UnixProcessHandle::new(child);
            info!(
                "Spawned Unix process: {} (PID: {:?})",
                spec.program.display(),
                handle.get_pid()
            );
            Ok(handle)
        }
    }

    #[async_trait]
    impl ProcessTermination for UnixProcessManager {
        async fn terminate_pid(
            &self,
            pid: ProcessId,
            policy: &TerminationConfig,
        ) -> TerminationResult {
            // 0 would address our process group
            if pid == 0 || pid == std::process::id() {
                warn!("Refusing to terminate pid {}", pid);
                return TerminationResult::Refused;
            }

            match send_signal(pid, Signal::SIGTERM) {
                TerminationResult::Success => {}
                other => return other,
            }

            let exited = (|| async {
                if is_alive(pid) {
                    Err(Errno::EBUSY)
                } else {
                    Ok(())
                }
            })
            .retry(
                ConstantBuilder::default()
                    .with_delay(policy.check_interval())
                    .with_max_times(policy.max_checks()),
            )
            .await;

            match exited {
                Ok(()) => TerminationResult::Success,
                Err(_) => {
                    debug!("Process {} still alive after {:?}", pid, policy.grace_period());
                    match send_signal(pid, Signal::SIGKILL) {
                        TerminationResult::ProcessNotFound => TerminationResult::Success,
                        other => other,
                    }
                }
            }
        }
    }

    impl ProcessManager for UnixProcessManager {
        fn new() -> Self {
            info!("Initializing Unix process manager");
            Self
        }
    }
}

// Re-export the Unix implementation when on Unix systems
#[cfg(unix)]
pub use unix_impl::{UnixProcessHandle, UnixProcessManager};

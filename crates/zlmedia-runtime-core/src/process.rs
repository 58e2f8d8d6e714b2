use crate::config::TerminationConfig;
use crate::error::ProcessError;
use crate::output::OutputChannel;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Unique identifier for a process
pub type ProcessId = u32;

/// Result of a process termination operation
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationResult {
    /// Process was successfully terminated
    Success,
    /// Process was not found (already exited)
    ProcessNotFound,
    /// Permission denied (insufficient privileges)
    AccessDenied,
    /// The pid is not safe to signal (process group, or ourselves)
    Refused,
    /// Operation failed with specific error message
    Failed(String),
}

/// What to spawn and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Absolute path of the executable
    pub program: PathBuf,
    /// Directory the process runs in, the executable's parent
    pub working_dir: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn for_executable(executable: &Path) -> std::io::Result<Self> {
        let program = std::path::absolute(executable)?;
        let working_dir = program.parent().map(Path::to_path_buf);
        Ok(Self {
            program,
            working_dir,
        })
    }
}

/// Trait representing a handle to a running process
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Get the process ID (None if the platform could not report one)
    fn get_pid(&self) -> Option<ProcessId>;

    /// Wait for the process to exit and return its exit code.
    ///
    /// A process killed by signal `n` reports `128 + n`.
    async fn wait(&mut self) -> Result<i32, ProcessError>;

    /// Ask the process to stop (SIGTERM on Unix)
    async fn terminate(&mut self) -> TerminationResult;

    /// Kill the process unconditionally
    async fn kill(&mut self) -> Result<(), ProcessError>;
}

/// Spawns the supervised executable
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// The type of process handle this launcher produces
    type Handle: ProcessHandle + 'static;

    /// Spawn `spec`, forwarding both stdout and stderr line by line into `output`
    async fn spawn_process(
        &self,
        spec: &LaunchSpec,
        output: OutputChannel,
    ) -> Result<Self::Handle, ProcessError>;
}

/// Terminates processes this runtime does not own, identified by pid only
#[async_trait]
pub trait ProcessTermination: Send + Sync {
    /// Send SIGTERM, wait up to the grace period, then escalate to SIGKILL
    async fn terminate_pid(&self, pid: ProcessId, policy: &TerminationConfig) -> TerminationResult;
}

/// Platform process manager combining launching and termination
pub trait ProcessManager: ProcessLauncher + ProcessTermination {
    /// Create a new process manager instance
    fn new() -> Self
    where
        Self: Sized;
}

/// Factory trait for creating platform-specific process managers
pub trait ProcessManagerFactory {
    /// The type of process manager this factory creates
    type Manager: ProcessManager + 'static;

    /// Create a process manager for the current platform
    fn create_process_manager() -> Self::Manager;

    /// Get the platform name for logging and debugging
    fn platform_name() -> &'static str;
}

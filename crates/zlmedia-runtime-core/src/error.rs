use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by [`crate::MediaRuntime`]
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to launch {path}: {source}")]
    Launch {
        path: PathBuf,
        #[source]
        source: ProcessError,
    },

    #[error("Process exited with code {0} before becoming ready")]
    ProcessExitedBeforeReady(i32),

    #[error("Secret rotation failed: {0}")]
    SecretRotation(#[source] ControlPlaneError),

    #[error("Runtime already started")]
    AlreadyStarted,

    #[error("Runtime disposed")]
    Disposed,

    #[error("Invalid configuration: {0}")]
    Configuration(#[from] anyhow::Error),
}

impl RuntimeError {
    /// Exit code of a process that died during startup
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RuntimeError::ProcessExitedBeforeReady(code) => Some(*code),
            _ => None,
        }
    }

    /// The process may still be running with the bootstrap secret and must be disposed
    pub fn requires_dispose(&self) -> bool {
        matches!(self, RuntimeError::SecretRotation(_))
    }
}

/// Error types for process operations
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn process: {0}")]
    SpawnFailed(#[source] std::io::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors returned by the control-plane client
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{operation} rejected with code {code}: {message}")]
    Rejected {
        operation: String,
        code: i32,
        message: String,
    },
}

impl ControlPlaneError {
    /// Connection-level failures expected while the server is still booting
    pub fn is_transient(&self) -> bool {
        match self {
            ControlPlaneError::Transport(e) => e.is_connect() || e.is_timeout(),
            ControlPlaneError::Rejected { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_only_for_early_exit() {
        assert_eq!(RuntimeError::ProcessExitedBeforeReady(1).exit_code(), Some(1));
        assert_eq!(RuntimeError::AlreadyStarted.exit_code(), None);
    }

    #[test]
    fn test_rotation_failure_requires_dispose() {
        let error = RuntimeError::SecretRotation(ControlPlaneError::Rejected {
            operation: "setServerConfig".to_string(),
            code: -100,
            message: "unauthorized".to_string(),
        });
        assert!(error.requires_dispose());
        assert!(!RuntimeError::Disposed.requires_dispose());
        assert!(!error.to_string().is_empty());
    }

    #[test]
    fn test_error_display() {
        let error = RuntimeError::Launch {
            path: PathBuf::from("/missing/MediaServer"),
            source: ProcessError::SpawnFailed(std::io::Error::from(
                std::io::ErrorKind::NotFound,
            )),
        };
        let display = format!("{error}");
        assert!(display.contains("/missing/MediaServer"));

        let error = RuntimeError::ProcessExitedBeforeReady(3);
        assert!(format!("{error}").contains("code 3"));
    }

    #[test]
    fn test_rejection_is_not_transient() {
        let error = ControlPlaneError::Rejected {
            operation: "version".to_string(),
            code: -1,
            message: String::new(),
        };
        assert!(!error.is_transient());
    }
}

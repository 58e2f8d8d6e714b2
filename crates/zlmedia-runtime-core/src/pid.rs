use crate::process::ProcessId;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// Persisted pid of the last launched instance, stored next to the executable as `{executable}.pid`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidRecord {
    path: PathBuf,
}

impl PidRecord {
    pub fn for_executable(executable: impl AsRef<Path>) -> Self {
        let mut path = OsString::from(executable.as_ref().as_os_str());
        path.push(".pid");
        Self {
            path: PathBuf::from(path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the recorded pid; `Ok(None)` when no record exists
    pub fn read(&self) -> io::Result<Option<ProcessId>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        content
            .trim()
            .parse::<ProcessId>()
            .map(Some)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Overwrite the record with `pid`
    pub fn write(&self, pid: ProcessId) -> io::Result<()> {
        std::fs::write(&self.path, pid.to_string())
    }

    /// Remove the record if it still names `pid`; returns whether a file was removed
    pub fn remove_if_owned(&self, pid: ProcessId) -> io::Result<bool> {
        match self.read() {
            Ok(Some(recorded)) if recorded == pid => {
                std::fs::remove_file(&self.path)?;
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => Ok(false),
            Err(e) => Err(e),
        }
    }
}

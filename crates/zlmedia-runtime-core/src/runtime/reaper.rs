use crate::config::TerminationConfig;
use crate::pid::PidRecord;
use crate::process::{ProcessTermination, TerminationResult};
use tracing::{debug, info, warn};

/// Terminate the instance named by `record`, if any. Never fails: every problem is logged.
pub(crate) async fn reap_if_stale<T>(record: &PidRecord, terminator: &T, policy: &TerminationConfig)
where
    T: ProcessTermination + ?Sized,
{
    let pid = match record.read() {
        Ok(Some(pid)) => pid,
        Ok(None) => {
            debug!(path = %record.path().display(), "No stale pid record");
            return;
        }
        Err(e) => {
            warn!(path = %record.path().display(), error = %e, "Failed to read stale pid record");
            return;
        }
    };

    warn!(pid, "Media server process already exists, terminating it");
    match terminator.terminate_pid(pid, policy).await {
        TerminationResult::Success => info!(pid, "Stale media server terminated"),
        TerminationResult::ProcessNotFound => debug!(pid, "Stale media server already gone"),
        other => warn!(pid, result = ?other, "Failed to terminate stale media server"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEvent, FakeProcessManager};

    #[tokio::test]
    async fn test_terminates_recorded_pid() {
        let dir = tempfile::tempdir().unwrap();
        let record = PidRecord::for_executable(dir.path().join("MediaServer"));
        record.write(31337).unwrap();
        let manager = FakeProcessManager::default();

        reap_if_stale(&record, &manager, &TerminationConfig::default()).await;

        assert_eq!(manager.events(), vec![FakeEvent::Terminated(31337)]);
    }

    #[tokio::test]
    async fn test_missing_or_corrupt_record_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let record = PidRecord::for_executable(dir.path().join("MediaServer"));
        let manager = FakeProcessManager::default();

        reap_if_stale(&record, &manager, &TerminationConfig::default()).await;
        std::fs::write(record.path(), "garbage").unwrap();
        reap_if_stale(&record, &manager, &TerminationConfig::default()).await;

        assert!(manager.events().is_empty());
    }
}

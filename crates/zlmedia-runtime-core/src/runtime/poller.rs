use crate::client::ControlPlaneClient;
use crate::config::PollingConfig;
use crate::readiness::ReadinessSignal;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Probe `is_alive` on a fixed schedule until it answers `true` once.
///
/// Only one probe is in flight at a time; ticks that elapse while a probe is
/// outstanding are skipped. Probe errors count as "not alive yet".
pub(crate) async fn poll_until_alive(
    operations: ControlPlaneClient,
    readiness: ReadinessSignal,
    schedule: PollingConfig,
    cancellation_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(
        Instant::now() + schedule.initial_delay(),
        schedule.interval(),
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut attempt: u64 = 0;
    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => {
                debug!(attempt, "Readiness polling cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        // the exit watcher may have resolved the signal in the meantime
        if !readiness.is_pending() {
            return;
        }

        attempt += 1;
        match operations.is_alive().await {
            Ok(true) => {
                if readiness.mark_ready() {
                    info!(attempt, "Media server is alive");
                }
                return;
            }
            Ok(false) => debug!(attempt, "Media server not alive yet"),
            Err(e) if e.is_transient() => {
                debug!(attempt, error = %e, "Control plane not reachable yet")
            }
            Err(e) => warn!(attempt, error = %e, "Alive probe failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readiness::Readiness;
    use crate::secret::SharedSecret;
    use crate::testing::StubControlPlane;
    use std::sync::Arc;
    use std::time::Duration;

    fn schedule(initial_delay_ms: u64, interval_ms: u64) -> PollingConfig {
        PollingConfig {
            initial_delay_ms,
            interval_ms,
        }
    }

    fn client(port: u16) -> ControlPlaneClient {
        ControlPlaneClient::new(
            port,
            Arc::new(SharedSecret::default()),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_resolves_on_fourth_probe() {
        let stub = StubControlPlane::start().await;
        stub.not_alive_for(3);
        let readiness = ReadinessSignal::new();
        let started = Instant::now();

        poll_until_alive(
            client(stub.port()),
            readiness.clone(),
            schedule(20, 30),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(readiness.current(), Readiness::Ready);
        assert_eq!(stub.probe_count(), 4);
        // initial delay plus three periods
        assert!(started.elapsed() >= Duration::from_millis(20 + 3 * 30));
    }

    #[tokio::test]
    async fn test_stops_when_resolved_elsewhere() {
        let stub = StubControlPlane::start().await;
        stub.not_alive_for(usize::MAX);
        let readiness = ReadinessSignal::new();

        let task = tokio::spawn(poll_until_alive(
            client(stub.port()),
            readiness.clone(),
            schedule(0, 10),
            CancellationToken::new(),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        readiness.fail(1);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("poller should stop")
            .unwrap();
        assert_eq!(readiness.current(), Readiness::Failed(1));
    }

    #[tokio::test]
    async fn test_connection_errors_are_not_failures() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let readiness = ReadinessSignal::new();
        let token = CancellationToken::new();
        let task = tokio::spawn(poll_until_alive(
            client(port),
            readiness.clone(),
            schedule(0, 10),
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(readiness.is_pending());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("poller should stop")
            .unwrap();
        assert!(readiness.is_pending());
    }
}

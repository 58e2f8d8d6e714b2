use std::sync::Arc;
use tokio::sync::watch;

/// Outcome of the startup window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Neither alive nor dead yet
    Pending,
    /// The control plane answered an `is_alive` probe
    Ready,
    /// The process exited with the given code before becoming ready
    Failed(i32),
}

impl Readiness {
    pub fn is_pending(&self) -> bool {
        matches!(self, Readiness::Pending)
    }
}

/// Single-assignment readiness signal shared by the poller, the exit watcher and `start()`.
///
/// The first call to [`ReadinessSignal::mark_ready`] or [`ReadinessSignal::fail`] wins; every
/// later resolution attempt is a no-op that returns `false`.
#[derive(Clone, Debug)]
pub struct ReadinessSignal {
    state: Arc<watch::Sender<Readiness>>,
}

impl Default for ReadinessSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessSignal {
    pub fn new() -> Self {
        let (state, _) = watch::channel(Readiness::Pending);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn current(&self) -> Readiness {
        *self.state.borrow()
    }

    pub fn is_pending(&self) -> bool {
        self.current().is_pending()
    }

    pub fn mark_ready(&self) -> bool {
        self.resolve(Readiness::Ready)
    }

    pub fn fail(&self, exit_code: i32) -> bool {
        self.resolve(Readiness::Failed(exit_code))
    }

    fn resolve(&self, outcome: Readiness) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_pending() {
                *state = outcome;
                true
            } else {
                false
            }
        })
    }

    /// Wait until the signal leaves [`Readiness::Pending`]
    pub async fn wait(&self) -> Readiness {
        let mut receiver = self.state.subscribe();
        match receiver.wait_for(|state| !state.is_pending()).await {
            Ok(state) => *state,
            // the sender lives as long as `self`
            Err(_) => Readiness::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_resolves_at_most_once() {
        let signal = ReadinessSignal::new();
        assert!(signal.is_pending());

        assert!(signal.fail(1));
        assert!(!signal.mark_ready());
        assert!(!signal.fail(2));
        assert_eq!(signal.current(), Readiness::Failed(1));
    }

    #[tokio::test]
    async fn test_wait_observes_resolution() {
        let signal = ReadinessSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        assert!(signal.mark_ready());

        assert_eq!(waiter.await.unwrap(), Readiness::Ready);
    }

    #[tokio::test]
    async fn test_wait_after_resolution_returns_immediately() {
        let signal = ReadinessSignal::new();
        signal.fail(137);
        assert_eq!(signal.wait().await, Readiness::Failed(137));
    }

    #[tokio::test]
    async fn test_concurrent_resolvers_have_one_winner() {
        let signal = ReadinessSignal::new();
        let mut tasks = Vec::new();
        for code in 0..16 {
            let signal = signal.clone();
            tasks.push(tokio::spawn(async move {
                if code % 2 == 0 {
                    signal.mark_ready()
                } else {
                    signal.fail(code)
                }
            }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(!signal.is_pending());
    }
}

use crate::factory::PlatformProcessManagerFactory;
use std::path::Path;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::debug;
use zlmedia_runtime_core::{
    ConfigSource, ControlPlaneClient, MediaRuntime, ProcessId, ProcessManagerFactory,
    RuntimeConfig, RuntimeError, RuntimeState,
};

type PlatformManager = <PlatformProcessManagerFactory as ProcessManagerFactory>::Manager;

/// Media server runtime backed by the platform process manager.
///
/// ```no_run
/// # async fn run() -> Result<(), zlmedia_runtime::RuntimeError> {
/// use zlmedia_runtime::{MediaConfigs, MediaPorts, ZlMediaRuntime};
///
/// let configs = MediaConfigs::new(MediaPorts::default());
/// let runtime = ZlMediaRuntime::from_source("/opt/zlm/MediaServer", &configs)?;
/// runtime.start().await?;
/// let alive = runtime.operations().is_alive().await;
/// runtime.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct ZlMediaRuntime {
    inner: MediaRuntime<PlatformManager>,
}

impl ZlMediaRuntime {
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        debug!(
            platform = PlatformProcessManagerFactory::platform_name(),
            "Creating media server runtime"
        );
        let manager = Arc::new(PlatformProcessManagerFactory::create_process_manager());
        Ok(Self {
            inner: MediaRuntime::new(config, manager)?,
        })
    }

    /// Build the runtime configuration from a [`ConfigSource`] with default timings
    pub fn from_source(
        executable: impl AsRef<Path>,
        source: &impl ConfigSource,
    ) -> Result<Self, RuntimeError> {
        Self::new(RuntimeConfig::from_source(executable, source))
    }

    pub async fn start(&self) -> Result<(), RuntimeError> {
        self.inner.start().await
    }

    pub fn output(&self) -> impl Stream<Item = String> + Send + Unpin + 'static {
        self.inner.output()
    }

    pub fn operations(&self) -> &ControlPlaneClient {
        self.inner.operations()
    }

    pub fn dispose(&self) {
        self.inner.dispose()
    }

    pub async fn shutdown(&self) {
        self.inner.shutdown().await
    }

    pub fn state(&self) -> RuntimeState {
        self.inner.state()
    }

    pub fn pid(&self) -> Option<ProcessId> {
        self.inner.pid()
    }

    /// The generic runtime, for accessors not mirrored here
    pub fn inner(&self) -> &MediaRuntime<PlatformManager> {
        &self.inner
    }
}

use crate::secret::{BOOTSTRAP_SECRET, SECRET_CONFIG_KEY};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Schedule of the readiness poller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PollingConfig {
    /// Delay before the first `is_alive` probe (in milliseconds)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Fixed period between probes (in milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl PollingConfig {
    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.interval_ms == 0 {
            return Err(anyhow::anyhow!("interval_ms must be greater than zero"));
        }

        Ok(())
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// How long a process gets to honour SIGTERM before it is killed.
///
/// Shared by the stale-instance reaper and by disposal of the supervised process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TerminationConfig {
    /// Time to wait after SIGTERM before escalating (in milliseconds)
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// How often liveness is re-checked while waiting (in milliseconds)
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            check_interval_ms: default_check_interval_ms(),
        }
    }
}

impl TerminationConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.check_interval_ms == 0 {
            return Err(anyhow::anyhow!("check_interval_ms must be greater than zero"));
        }

        if self.check_interval_ms > self.grace_period_ms {
            return Err(anyhow::anyhow!(
                "check_interval_ms cannot be greater than grace_period_ms"
            ));
        }

        Ok(())
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    /// Number of liveness checks that fit into the grace period
    pub fn max_checks(&self) -> usize {
        (self.grace_period_ms / self.check_interval_ms.max(1)).max(1) as usize
    }
}

/// Ports the media server listens on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaPorts {
    pub http: u16,
    pub rtsp: u16,
    pub rtmp: u16,
    pub rtp_proxy: u16,
}

impl Default for MediaPorts {
    fn default() -> Self {
        Self {
            http: 8080,
            rtsp: 554,
            rtmp: 1935,
            rtp_proxy: 10000,
        }
    }
}

/// Source of the initial key/value configuration pushed to the media server
pub trait ConfigSource {
    /// Port of the HTTP control plane
    fn http_port(&self) -> u16;

    /// Build the full configuration mapping
    fn create_configs(&self) -> HashMap<String, String>;
}

/// Default [`ConfigSource`] producing ZLMediaKit configuration keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaConfigs {
    #[serde(default)]
    pub ports: MediaPorts,
    /// Extra entries; these override the generated ones
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl MediaConfigs {
    pub fn new(ports: MediaPorts) -> Self {
        Self {
            ports,
            extra: HashMap::new(),
        }
    }

    pub fn with(mut self, key: impl ToString, value: impl ToString) -> Self {
        self.extra.insert(key.to_string(), value.to_string());
        self
    }
}

impl ConfigSource for MediaConfigs {
    fn http_port(&self) -> u16 {
        self.ports.http
    }

    fn create_configs(&self) -> HashMap<String, String> {
        let mut configs = HashMap::from([
            ("http.port".to_string(), self.ports.http.to_string()),
            ("rtsp.port".to_string(), self.ports.rtsp.to_string()),
            ("rtmp.port".to_string(), self.ports.rtmp.to_string()),
            ("rtp_proxy.port".to_string(), self.ports.rtp_proxy.to_string()),
            (SECRET_CONFIG_KEY.to_string(), BOOTSTRAP_SECRET.to_string()),
        ]);
        configs.extend(self.extra.clone());
        configs
    }
}

/// Main runtime configuration
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into, strip_option))]
pub struct RuntimeConfig {
    /// Path of the media server executable
    pub executable: PathBuf,
    /// Port of the HTTP control plane
    pub http_port: u16,
    #[builder(default)]
    #[builder(setter(custom))]
    pub configs: HashMap<String, String>,
    #[builder(default)]
    pub polling: PollingConfig,
    #[builder(default)]
    pub termination: TerminationConfig,
    #[builder(default = "default_output_capacity()")]
    pub output_capacity: usize,
    #[builder(default = "default_request_timeout()")]
    pub request_timeout: Duration,
}

impl RuntimeConfig {
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Configuration seeded from a [`ConfigSource`], with default tuning
    pub fn from_source(executable: impl AsRef<Path>, source: &impl ConfigSource) -> Self {
        Self {
            executable: executable.as_ref().to_path_buf(),
            http_port: source.http_port(),
            configs: source.create_configs(),
            polling: PollingConfig::default(),
            termination: TerminationConfig::default(),
            output_capacity: default_output_capacity(),
            request_timeout: default_request_timeout(),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.executable.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("executable path cannot be empty"));
        }

        if self.http_port == 0 {
            return Err(anyhow::anyhow!("http_port must be a concrete port"));
        }

        if self.output_capacity == 0 {
            return Err(anyhow::anyhow!("output_capacity must be greater than zero"));
        }

        self.polling.validate()?;
        self.termination.validate()?;

        Ok(())
    }
}

impl RuntimeConfigBuilder {
    pub fn config<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self.configs.get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());

        self
    }

    pub fn configs<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        let configs = self.configs.get_or_insert_with(HashMap::new);
        for (key, value) in iter {
            configs.insert(key.to_string(), value.to_string());
        }
        self
    }
}

// Default value functions for serde
fn default_initial_delay_ms() -> u64 {
    2_000
}
fn default_interval_ms() -> u64 {
    1_000
}
fn default_grace_period_ms() -> u64 {
    5_000
}
fn default_check_interval_ms() -> u64 {
    100
}
fn default_output_capacity() -> usize {
    1024
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

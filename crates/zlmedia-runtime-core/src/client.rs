use crate::error::ControlPlaneError;
use crate::secret::SharedSecret;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Operation answering whether the control plane is up
pub const OP_IS_ALIVE: &str = "version";
/// Operation replacing the live server configuration
pub const OP_SET_CONFIGS: &str = "setServerConfig";
/// Operation reading the live server configuration
pub const OP_GET_CONFIGS: &str = "getServerConfig";

/// Generic control-plane reply: `{"code": 0, "msg": "...", ...}`
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub code: i32,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    fn into_result(self, operation: &str) -> Result<Self, ControlPlaneError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ControlPlaneError::Rejected {
                operation: operation.to_string(),
                code: self.code,
                message: self.msg.unwrap_or_default(),
            })
        }
    }
}

/// REST client for the media server control plane.
///
/// Every request carries a `secret` query parameter holding the value of the shared secret
/// at send time, so rotating the secret affects clones of this client immediately.
#[derive(Clone, Debug)]
pub struct ControlPlaneClient {
    http: reqwest::Client,
    base_url: String,
    secret: Arc<SharedSecret>,
}

impl ControlPlaneClient {
    /// Client bound to `http://127.0.0.1:{port}`
    pub fn new(
        port: u16,
        secret: Arc<SharedSecret>,
        timeout: Duration,
    ) -> Result<Self, ControlPlaneError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(
            http,
            format!("http://127.0.0.1:{port}"),
            secret,
        ))
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        secret: Arc<SharedSecret>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Secret the next request will carry
    pub fn secret(&self) -> Arc<str> {
        self.secret.current()
    }

    /// Call `/index/api/{operation}` with `params`; non-zero codes are returned as errors
    pub async fn request<K, V>(
        &self,
        operation: &str,
        params: &[(K, V)],
    ) -> Result<ApiResponse, ControlPlaneError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let url = format!("{}/index/api/{}", self.base_url, operation);
        let query: Vec<(&str, &str)> = params
            .iter()
            .map(|(k, v)| (k.as_ref(), v.as_ref()))
            .collect();

        let secret = self.secret.current();
        let response = self
            .http
            .get(&url)
            .query(&query)
            .query(&[("secret", &*secret)])
            .send()
            .await?
            .error_for_status()?
            .json::<ApiResponse>()
            .await?;

        debug!(operation, code = response.code, "Control plane replied");
        response.into_result(operation)
    }

    /// Lightweight health probe
    pub async fn is_alive(&self) -> Result<bool, ControlPlaneError> {
        match self.request::<&str, &str>(OP_IS_ALIVE, &[]).await {
            Ok(_) => Ok(true),
            Err(ControlPlaneError::Rejected { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Push `configs` to the live server, returning the values it echoed back
    pub async fn set_configs(
        &self,
        configs: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>, ControlPlaneError> {
        let params: Vec<(&str, &str)> = configs
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let response = self.request(OP_SET_CONFIGS, &params).await?;
        Ok(response.data.as_ref().map(string_map).unwrap_or_default())
    }

    /// Read the live server configuration
    pub async fn get_configs(&self) -> Result<HashMap<String, String>, ControlPlaneError> {
        let response = self.request::<&str, &str>(OP_GET_CONFIGS, &[]).await?;
        // ZLMediaKit wraps the section map in a one-element array
        let configs = match response.data {
            Some(Value::Array(items)) => items.first().map(string_map).unwrap_or_default(),
            Some(other) => string_map(&other),
            None => HashMap::new(),
        };
        Ok(configs)
    }
}

fn string_map(value: &Value) -> HashMap<String, String> {
    let Some(object) = value.as_object() else {
        return HashMap::new();
    };
    object
        .iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect()
}

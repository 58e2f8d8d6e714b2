use crate::client::ControlPlaneClient;
use crate::error::ControlPlaneError;
use crate::secret::{SECRET_CONFIG_KEY, SharedSecret, generate_secret};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Replace the bootstrap secret with a fresh one, confirmed by the media server.
///
/// The local secret only changes once the push succeeded; on failure the server keeps
/// running with the previous secret.
pub(crate) async fn rotate_secret(
    operations: &ControlPlaneClient,
    secret: &SharedSecret,
    configs: &Mutex<HashMap<String, String>>,
) -> Result<Arc<str>, ControlPlaneError> {
    let proposed = generate_secret();
    let mut snapshot = configs
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    snapshot.insert(SECRET_CONFIG_KEY.to_string(), proposed.clone());

    let confirmed = operations.set_configs(&snapshot).await?;
    let adopted = match confirmed.get(SECRET_CONFIG_KEY) {
        Some(accepted) if accepted != &proposed => {
            info!("Media server normalized the rotated secret");
            accepted.clone()
        }
        _ => proposed,
    };

    configs
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(SECRET_CONFIG_KEY.to_string(), adopted.clone());
    secret.replace(adopted.as_str());
    info!("Control plane secret rotated");
    Ok(secret.current())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::BOOTSTRAP_SECRET;
    use crate::testing::StubControlPlane;
    use std::time::Duration;

    fn setup(stub: &StubControlPlane) -> (ControlPlaneClient, Arc<SharedSecret>) {
        let secret = Arc::new(SharedSecret::default());
        let client =
            ControlPlaneClient::new(stub.port(), secret.clone(), Duration::from_secs(1)).unwrap();
        (client, secret)
    }

    #[tokio::test]
    async fn test_pushes_full_map_with_new_secret() {
        let stub = StubControlPlane::start().await;
        let (client, secret) = setup(&stub);
        let configs = Mutex::new(HashMap::from([(
            "http.port".to_string(),
            stub.port().to_string(),
        )]));

        let adopted = rotate_secret(&client, &secret, &configs).await.unwrap();

        assert_ne!(&*adopted, BOOTSTRAP_SECRET);
        assert_eq!(secret.current(), adopted);
        let pushed = stub.pushed_configs();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0][SECRET_CONFIG_KEY], &*adopted);
        assert!(pushed[0].contains_key("http.port"));
        // the push itself is authenticated with the old secret
        assert_eq!(stub.secrets_seen(), vec![BOOTSTRAP_SECRET.to_string()]);
    }

    #[tokio::test]
    async fn test_adopts_normalized_secret() {
        let stub = StubControlPlane::start().await;
        stub.normalize_secret("server-chosen");
        let (client, secret) = setup(&stub);
        let configs = Mutex::new(HashMap::new());

        rotate_secret(&client, &secret, &configs).await.unwrap();

        assert_eq!(&*secret.current(), "server-chosen");
        assert_eq!(configs.lock().unwrap()[SECRET_CONFIG_KEY], "server-chosen");
    }

    #[tokio::test]
    async fn test_rejected_push_keeps_old_secret() {
        let stub = StubControlPlane::start().await;
        stub.reject_configs();
        let (client, secret) = setup(&stub);
        let configs = Mutex::new(HashMap::new());

        let result = rotate_secret(&client, &secret, &configs).await;

        assert!(result.is_err());
        assert!(secret.is_bootstrap());
        assert!(!configs.lock().unwrap().contains_key(SECRET_CONFIG_KEY));
    }

    #[tokio::test]
    async fn test_rejected_push_keeps_previous_config_entry() {
        let stub = StubControlPlane::start().await;
        stub.reject_configs();
        let (client, secret) = setup(&stub);
        let configs = Mutex::new(HashMap::from([(
            SECRET_CONFIG_KEY.to_string(),
            BOOTSTRAP_SECRET.to_string(),
        )]));

        rotate_secret(&client, &secret, &configs).await.unwrap_err();

        assert_eq!(configs.lock().unwrap()[SECRET_CONFIG_KEY], BOOTSTRAP_SECRET);
    }
}

use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

/// Well-known secret the media server is configured with before rotation
pub const BOOTSTRAP_SECRET: &str = "zlmedia4jStartup";

/// Configuration key holding the control-plane secret
pub const SECRET_CONFIG_KEY: &str = "api.secret";

/// Control-plane secret shared between the client and the rotation step.
///
/// Readers clone the current `Arc` once per request; a concurrent [`SharedSecret::replace`]
/// is observed either entirely or not at all.
#[derive(Debug)]
pub struct SharedSecret {
    current: RwLock<Arc<str>>,
}

impl Default for SharedSecret {
    fn default() -> Self {
        Self::new(BOOTSTRAP_SECRET)
    }
}

impl SharedSecret {
    pub fn new(initial: impl Into<Arc<str>>) -> Self {
        Self {
            current: RwLock::new(initial.into()),
        }
    }

    pub fn current(&self) -> Arc<str> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new secret, returning the previous one
    pub fn replace(&self, next: impl Into<Arc<str>>) -> Arc<str> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next.into())
    }

    pub fn is_bootstrap(&self) -> bool {
        &*self.current() == BOOTSTRAP_SECRET
    }
}

/// New opaque secret: 32 lowercase hex characters without separators
pub fn generate_secret() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_with_bootstrap() {
        let secret = SharedSecret::default();
        assert!(secret.is_bootstrap());
        assert_eq!(&*secret.current(), BOOTSTRAP_SECRET);
    }

    #[test]
    fn test_replace_returns_previous() {
        let secret = SharedSecret::default();
        let previous = secret.replace("rotated");
        assert_eq!(&*previous, BOOTSTRAP_SECRET);
        assert_eq!(&*secret.current(), "rotated");
        assert!(!secret.is_bootstrap());
    }

    #[test]
    fn test_generated_secret_shape() {
        let first = generate_secret();
        let second = generate_secret();
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(first, second);
    }
}

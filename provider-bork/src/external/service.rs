//! The external system BorkResources are reconciled against.

use std::sync::Arc;

use thiserror::Error;

/// Errors building a service client.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ServiceError(pub String);

/// A NoOpService does nothing.
#[derive(Debug, Clone, Default)]
pub struct NoOpService {
    credentials_len: usize,
}

impl NoOpService {
    pub fn new(credentials: &[u8]) -> Self {
        Self {
            credentials_len: credentials.len(),
        }
    }

    /// Whether the service was built with credentials.
    pub fn authenticated(&self) -> bool {
        self.credentials_len > 0
    }
}

/// Builds a service from raw credentials.
///
/// Handed to connectors at construction time so tests can substitute a
/// failing or recording factory.
pub trait ServiceFactory: Send + Sync {
    fn new_service(&self, credentials: &[u8]) -> Result<NoOpService, ServiceError>;
}

impl<F> ServiceFactory for F
where
    F: Fn(&[u8]) -> Result<NoOpService, ServiceError> + Send + Sync,
{
    fn new_service(&self, credentials: &[u8]) -> Result<NoOpService, ServiceError> {
        self(credentials)
    }
}

/// Factory that always succeeds.
pub fn noop_service_factory() -> Arc<dyn ServiceFactory> {
    Arc::new(|credentials: &[u8]| -> Result<NoOpService, ServiceError> {
        Ok(NoOpService::new(credentials))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_factory() {
        let factory = noop_service_factory();
        assert!(!factory.new_service(&[]).unwrap().authenticated());
        assert!(factory.new_service(b"token").unwrap().authenticated());
    }

    #[test]
    fn test_closure_factory_can_fail() {
        let factory: Arc<dyn ServiceFactory> =
            Arc::new(|_: &[u8]| -> Result<NoOpService, ServiceError> {
                Err(ServiceError("boom".to_string()))
            });
        assert_eq!(factory.new_service(&[]).unwrap_err().to_string(), "boom");
    }
}

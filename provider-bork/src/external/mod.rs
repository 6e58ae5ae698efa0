//! External system clients.
//!
//! A [`Connector`] produces an [`ExternalClient`] bound to one managed
//! resource's external system. The client observes, then either creates,
//! updates, or deletes the external resource so it reflects the managed
//! resource's desired state.

mod bork;
mod connector;
mod error;
mod provider_config;
mod service;

pub use bork::BorkExternal;
pub use connector::{NoOpConnector, ProviderConfigConnector};
pub use error::{ConfigError, ConnectError, CredentialsError, ExternalError};
pub use provider_config::{MemoryProviderConfigs, ProviderConfigSource};
pub use service::{NoOpService, ServiceError, ServiceFactory, noop_service_factory};

use async_trait::async_trait;

use crate::apis::{ConnectionDetails, Managed};

/// Result of observing the external resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalObservation {
    pub resource_exists: bool,
    pub resource_up_to_date: bool,
    pub connection_details: ConnectionDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalCreation {
    pub connection_details: ConnectionDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalUpdate {
    pub connection_details: ConnectionDetails,
    /// The contended value replaced by this update, if it wrote anything.
    pub overwritten: Option<i64>,
}

impl ExternalUpdate {
    /// True when the update changed nothing.
    pub fn is_noop(&self) -> bool {
        self.overwritten.is_none() && self.connection_details.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalDelete;

/// Converges one external resource.
///
/// Calls are synchronous and run to completion; the driver schedules them on
/// a blocking thread. Every call that takes a resource rejects the wrong kind
/// with [`ExternalError::TypeMismatch`] before touching anything.
pub trait ExternalClient: Send {
    /// Report whether the external resource exists and is up to date. May
    /// only change the resource's status.
    fn observe(&self, mg: &mut Managed) -> Result<ExternalObservation, ExternalError>;

    fn create(&self, mg: &mut Managed) -> Result<ExternalCreation, ExternalError>;

    fn update(&self, mg: &mut Managed) -> Result<ExternalUpdate, ExternalError>;

    fn delete(&self, mg: &mut Managed) -> Result<ExternalDelete, ExternalError>;

    /// Release any handles held by the client.
    fn disconnect(&mut self) -> Result<(), ExternalError>;
}

/// Produces an [`ExternalClient`] for a managed resource.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, mg: &Managed) -> Result<Box<dyn ExternalClient>, ConnectError>;
}

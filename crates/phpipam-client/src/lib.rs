// # phpIPAM REST Client
//
// HTTP implementation of the `phpipam-core` backend traits.
//
// ## API Reference
//
// - Base URL: `{endpoint}/{app_id}/`
// - Login: POST `/user/` with basic auth, answers `{"token": ...}`
// - Every request carries the `phpipam-token` header
// - Every response is an envelope `{code, success, message, data}`
//
// ## Behavior
//
// - Single request per trait call, except one re-login after `Token expired`
// - Search and listing endpoints map not-found to an empty list
// - No retries, no caching of entities
//
// ## Security Requirements
//
// - Password and token NEVER appear in logs or `Debug` output

mod controllers;
mod session;

pub use controllers::{
    AddressController, L2DomainController, SectionController, SubnetController, VlanController,
};
pub use session::Session;

use std::sync::Arc;

use phpipam_core::api::{AddressApi, IpamBackend, L2DomainApi, SectionApi, SubnetApi, VlanApi};
use phpipam_core::{ProviderConfig, Result};
use tracing::info;

/// phpIPAM backend over HTTP
#[derive(Debug, Clone)]
pub struct PhpIpamClient {
    session: Arc<Session>,
    addresses: AddressController,
    subnets: SubnetController,
    sections: SectionController,
    vlans: VlanController,
    l2domains: L2DomainController,
}

impl PhpIpamClient {
    /// Create a client from configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid, or
    /// `Error::Http` if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let session = Arc::new(Session::new(config.clone())?);
        Ok(Self {
            addresses: AddressController(session.clone()),
            subnets: SubnetController(session.clone()),
            sections: SectionController(session.clone()),
            vlans: VlanController(session.clone()),
            l2domains: L2DomainController(session.clone()),
            session,
        })
    }

    /// Log in and list sections to confirm the API is reachable
    pub async fn validate_connection(&self) -> Result<()> {
        let sections = self.sections.list().await?;
        info!("Connected to phpIPAM, {} sections visible", sections.len());
        Ok(())
    }

    /// Underlying session
    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl IpamBackend for PhpIpamClient {
    fn addresses(&self) -> &dyn AddressApi {
        &self.addresses
    }

    fn subnets(&self) -> &dyn SubnetApi {
        &self.subnets
    }

    fn sections(&self) -> &dyn SectionApi {
        &self.sections
    }

    fn vlans(&self) -> &dyn VlanApi {
        &self.vlans
    }

    fn l2domains(&self) -> &dyn L2DomainApi {
        &self.l2domains
    }
}

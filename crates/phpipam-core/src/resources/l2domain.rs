//! L2 domain resource and data source

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{decode, encode, existing_id};
use crate::api::IpamBackend;
use crate::error::Result;
use crate::model::{EntityId, L2Domain, wire};
use crate::registry::{DataSourceHandler, ResourceHandler};
use crate::resolve::{self, L2DomainQuery, exactly_one};

/// Host-side L2 domain attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct L2DomainAttributes {
    #[serde(deserialize_with = "wire::identity", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub domain_id: EntityId,
    pub name: String,
    pub description: String,
    /// Comma-separated section ids the domain is visible in
    pub sections: String,
}

impl From<L2Domain> for L2DomainAttributes {
    fn from(domain: L2Domain) -> Self {
        Self {
            id: Some(domain.id.to_string()),
            domain_id: domain.id,
            name: domain.name,
            description: domain.description,
            sections: domain.sections,
        }
    }
}

impl L2DomainAttributes {
    fn to_model(&self) -> L2Domain {
        L2Domain {
            id: self.domain_id,
            name: self.name.clone(),
            description: self.description.clone(),
            sections: self.sections.clone(),
        }
    }
}

/// `phpipam_l2domain`
pub struct L2DomainResource {
    backend: Arc<dyn IpamBackend>,
}

impl L2DomainResource {
    pub fn new(backend: Arc<dyn IpamBackend>) -> Self {
        Self { backend }
    }

    async fn state(&self, id: EntityId) -> Result<Value> {
        let domain = self.backend.l2domains().get_by_id(id).await?;
        encode(&L2DomainAttributes::from(domain))
    }
}

#[async_trait]
impl ResourceHandler for L2DomainResource {
    async fn create(&self, attrs: Value) -> Result<Value> {
        let attrs: L2DomainAttributes = decode(attrs)?;
        let mut domain = attrs.to_model();
        domain.id = 0;

        let api = self.backend.l2domains();
        api.create(&domain).await?;
        info!("Created L2 domain {:?}", domain.name);

        let found = api.search_by_name(&domain.name).await?;
        let created = exactly_one(found, || format!("L2 domain named {:?}", domain.name))?;
        self.state(created.id).await
    }

    async fn read(&self, attrs: Value) -> Result<Option<Value>> {
        let query: L2DomainQuery = decode(attrs)?;
        match resolve::resolve_l2domain(&*self.backend, &query).await? {
            Some(domain) => encode(&L2DomainAttributes::from(domain)).map(Some),
            None => Ok(None),
        }
    }

    async fn update(&self, attrs: Value) -> Result<Value> {
        let attrs: L2DomainAttributes = decode(attrs)?;
        let id = existing_id(attrs.domain_id, attrs.id.as_deref(), "domain_id")?;

        let mut domain = attrs.to_model();
        domain.id = id;
        self.backend.l2domains().update(&domain).await?;
        self.state(id).await
    }

    async fn delete(&self, attrs: Value) -> Result<()> {
        let attrs: L2DomainAttributes = decode(attrs)?;
        let id = existing_id(attrs.domain_id, attrs.id.as_deref(), "domain_id")?;
        debug!("Deleting L2 domain {}", id);
        self.backend.l2domains().delete(id).await
    }
}

/// `phpipam_l2domain` data source
pub struct L2DomainDataSource {
    backend: Arc<dyn IpamBackend>,
}

impl L2DomainDataSource {
    pub fn new(backend: Arc<dyn IpamBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl DataSourceHandler for L2DomainDataSource {
    async fn read(&self, attrs: Value) -> Result<Option<Value>> {
        let query: L2DomainQuery = decode(attrs)?;
        match resolve::resolve_l2domain(&*self.backend, &query).await? {
            Some(domain) => encode(&L2DomainAttributes::from(domain)).map(Some),
            None => Ok(None),
        }
    }
}

//! Section resource and data source

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{decode, encode, existing_id};
use crate::api::IpamBackend;
use crate::error::Result;
use crate::model::{EntityId, Section, wire};
use crate::registry::{DataSourceHandler, ResourceHandler};
use crate::resolve::{self, SectionQuery, exactly_one};

/// Host-side section attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionAttributes {
    #[serde(deserialize_with = "wire::identity", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub section_id: EntityId,
    pub name: String,
    pub description: String,
    pub master_section_id: EntityId,
    pub permissions: String,
    pub strict_mode: bool,
    pub subnet_ordering: String,
    pub display_order: u64,
    pub edit_date: String,
    pub show_vlan_in_subnet_listing: bool,
    pub show_vrf_in_subnet_listing: bool,
    pub show_supernet_only: bool,
    pub dns_resolver_id: String,
}

impl SectionAttributes {
    fn to_model(&self) -> Section {
        Section {
            id: self.section_id,
            name: self.name.clone(),
            description: self.description.clone(),
            master_section_id: self.master_section_id,
            permissions: self.permissions.clone(),
            strict_mode: self.strict_mode,
            subnet_ordering: self.subnet_ordering.clone(),
            display_order: self.display_order,
            edit_date: String::new(),
            show_vlan_in_subnet_listing: self.show_vlan_in_subnet_listing,
            show_vrf_in_subnet_listing: self.show_vrf_in_subnet_listing,
            show_supernet_only: self.show_supernet_only,
            dns_resolver_id: self.dns_resolver_id.clone(),
        }
    }
}

impl From<Section> for SectionAttributes {
    fn from(section: Section) -> Self {
        Self {
            id: Some(section.id.to_string()),
            section_id: section.id,
            name: section.name,
            description: section.description,
            master_section_id: section.master_section_id,
            permissions: section.permissions,
            strict_mode: section.strict_mode,
            subnet_ordering: section.subnet_ordering,
            display_order: section.display_order,
            edit_date: section.edit_date,
            show_vlan_in_subnet_listing: section.show_vlan_in_subnet_listing,
            show_vrf_in_subnet_listing: section.show_vrf_in_subnet_listing,
            show_supernet_only: section.show_supernet_only,
            dns_resolver_id: section.dns_resolver_id,
        }
    }
}

/// `phpipam_section`
pub struct SectionResource {
    backend: Arc<dyn IpamBackend>,
}

impl SectionResource {
    pub fn new(backend: Arc<dyn IpamBackend>) -> Self {
        Self { backend }
    }

    async fn state(&self, id: EntityId) -> Result<Value> {
        let section = self.backend.sections().get_by_id(id).await?;
        encode(&SectionAttributes::from(section))
    }
}

#[async_trait]
impl ResourceHandler for SectionResource {
    async fn create(&self, attrs: Value) -> Result<Value> {
        let attrs: SectionAttributes = decode(attrs)?;
        let mut section = attrs.to_model();
        section.id = 0;

        let api = self.backend.sections();
        api.create(&section).await?;
        info!("Created section {:?}", section.name);

        let found = api.search_by_name(&section.name).await?;
        let created = exactly_one(found, || format!("section named {:?}", section.name))?;
        self.state(created.id).await
    }

    async fn read(&self, attrs: Value) -> Result<Option<Value>> {
        let query: SectionQuery = decode(attrs)?;
        match resolve::resolve_section(&*self.backend, &query).await? {
            Some(section) => encode(&SectionAttributes::from(section)).map(Some),
            None => Ok(None),
        }
    }

    async fn update(&self, attrs: Value) -> Result<Value> {
        let attrs: SectionAttributes = decode(attrs)?;
        let id = existing_id(attrs.section_id, attrs.id.as_deref(), "section_id")?;

        let mut section = attrs.to_model();
        section.id = id;
        self.backend.sections().update(&section).await?;
        self.state(id).await
    }

    async fn delete(&self, attrs: Value) -> Result<()> {
        let attrs: SectionAttributes = decode(attrs)?;
        let id = existing_id(attrs.section_id, attrs.id.as_deref(), "section_id")?;
        debug!("Deleting section {}", id);
        self.backend.sections().delete(id).await
    }
}

/// `phpipam_section` data source
pub struct SectionDataSource {
    backend: Arc<dyn IpamBackend>,
}

impl SectionDataSource {
    pub fn new(backend: Arc<dyn IpamBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl DataSourceHandler for SectionDataSource {
    async fn read(&self, attrs: Value) -> Result<Option<Value>> {
        let query: SectionQuery = decode(attrs)?;
        match resolve::resolve_section(&*self.backend, &query).await? {
            Some(section) => encode(&SectionAttributes::from(section)).map(Some),
            None => Ok(None),
        }
    }
}

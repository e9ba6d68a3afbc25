//! Subnet resource and data sources

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{custom_field_state, decode, encode, existing_id};
use crate::alloc::{self, AllocationLocks};
use crate::api::IpamBackend;
use crate::custom_fields;
use crate::error::{Error, Result};
use crate::model::{CustomFieldSet, EntityId, Subnet, wire};
use crate::registry::{DataSourceHandler, ResourceHandler};
use crate::resolve::{self, SubnetQuery, exactly_one};

/// Host-side subnet attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubnetAttributes {
    #[serde(deserialize_with = "wire::identity", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub subnet_id: EntityId,
    pub subnet_address: String,
    pub subnet_mask: u64,
    pub description: String,
    pub section_id: EntityId,
    pub linked_subnet_id: EntityId,
    pub vlan_id: EntityId,
    pub vrf_id: EntityId,
    pub master_subnet_id: EntityId,
    pub nameserver_id: EntityId,
    pub show_name: bool,
    pub permissions: String,
    pub create_ptr_records: bool,
    pub display_hostnames: bool,
    pub allow_ip_requests: bool,
    pub scan_agent_id: EntityId,
    pub include_in_ping: bool,
    pub host_discovery_enabled: bool,
    pub is_folder: bool,
    pub is_full: bool,
    pub utilization_threshold: u64,
    pub location_id: EntityId,
    pub edit_date: String,
    pub gateway_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<CustomFieldSet>,
    /// Allocate inside this subnet instead of creating a fixed CIDR
    #[serde(skip_serializing_if = "wire::is_zero")]
    pub parent_subnet_id: EntityId,
}

impl SubnetAttributes {
    fn to_model(&self) -> Subnet {
        Subnet {
            id: self.subnet_id,
            subnet_address: self.subnet_address.clone(),
            subnet_mask: self.subnet_mask,
            description: self.description.clone(),
            section_id: self.section_id,
            linked_subnet_id: self.linked_subnet_id,
            vlan_id: self.vlan_id,
            vrf_id: self.vrf_id,
            master_subnet_id: self.master_subnet_id,
            nameserver_id: self.nameserver_id,
            show_name: self.show_name,
            permissions: self.permissions.clone(),
            create_ptr_records: self.create_ptr_records,
            display_hostnames: self.display_hostnames,
            allow_ip_requests: self.allow_ip_requests,
            scan_agent_id: self.scan_agent_id,
            include_in_ping: self.include_in_ping,
            host_discovery_enabled: self.host_discovery_enabled,
            is_folder: self.is_folder,
            is_full: self.is_full,
            utilization_threshold: self.utilization_threshold,
            location_id: self.location_id,
            edit_date: String::new(),
            gateway_id: String::new(),
        }
    }

    fn from_model(subnet: Subnet, custom_fields: CustomFieldSet) -> Self {
        Self {
            id: Some(subnet.id.to_string()),
            subnet_id: subnet.id,
            subnet_address: subnet.subnet_address,
            subnet_mask: subnet.subnet_mask,
            description: subnet.description,
            section_id: subnet.section_id,
            linked_subnet_id: subnet.linked_subnet_id,
            vlan_id: subnet.vlan_id,
            vrf_id: subnet.vrf_id,
            master_subnet_id: subnet.master_subnet_id,
            nameserver_id: subnet.nameserver_id,
            show_name: subnet.show_name,
            permissions: subnet.permissions,
            create_ptr_records: subnet.create_ptr_records,
            display_hostnames: subnet.display_hostnames,
            allow_ip_requests: subnet.allow_ip_requests,
            scan_agent_id: subnet.scan_agent_id,
            include_in_ping: subnet.include_in_ping,
            host_discovery_enabled: subnet.host_discovery_enabled,
            is_folder: subnet.is_folder,
            is_full: subnet.is_full,
            utilization_threshold: subnet.utilization_threshold,
            location_id: subnet.location_id,
            edit_date: subnet.edit_date,
            gateway_id: subnet.gateway_id,
            custom_fields: Some(custom_fields),
            parent_subnet_id: 0,
        }
    }
}

async fn subnet_state(backend: &dyn IpamBackend, subnet: Subnet) -> Result<SubnetAttributes> {
    let visible = custom_fields::read(backend.subnets(), subnet.id).await?;
    Ok(SubnetAttributes::from_model(subnet, custom_field_state(visible)))
}

fn prefix_length(mask: u64) -> Result<u8> {
    match u8::try_from(mask) {
        Ok(mask) if (1..=128).contains(&mask) => Ok(mask),
        _ => Err(Error::invalid_argument(format!("invalid subnet_mask {}", mask))),
    }
}

/// `phpipam_subnet` and `phpipam_first_free_subnet`
///
/// A subnet given `parent_subnet_id` and no `subnet_address` takes the first
/// free block of `subnet_mask` bits inside the parent. The first-free
/// variant always allocates.
pub struct SubnetResource {
    backend: Arc<dyn IpamBackend>,
    locks: AllocationLocks,
    first_free: bool,
}

impl SubnetResource {
    pub fn new(backend: Arc<dyn IpamBackend>, locks: AllocationLocks) -> Self {
        Self {
            backend,
            locks,
            first_free: false,
        }
    }

    pub fn first_free(backend: Arc<dyn IpamBackend>, locks: AllocationLocks) -> Self {
        Self {
            backend,
            locks,
            first_free: true,
        }
    }

    async fn create_fixed(&self, template: &Subnet) -> Result<Subnet> {
        let api = self.backend.subnets();
        api.create(template).await?;
        let cidr = template.cidr();
        info!("Created subnet {} in section {}", cidr, template.section_id);

        let section = (template.section_id != 0).then_some(template.section_id);
        let found = api.search_by_cidr(&cidr, section).await?;
        exactly_one(found, || format!("subnet {}", cidr))
    }

    async fn state(&self, id: EntityId, parent_subnet_id: EntityId) -> Result<Value> {
        let subnet = self.backend.subnets().get_by_id(id).await?;
        let mut state = subnet_state(&*self.backend, subnet).await?;
        state.parent_subnet_id = parent_subnet_id;
        encode(&state)
    }
}

#[async_trait]
impl ResourceHandler for SubnetResource {
    async fn create(&self, attrs: Value) -> Result<Value> {
        let attrs: SubnetAttributes = decode(attrs)?;
        custom_fields::check_initial(self.backend.subnets(), attrs.custom_fields.as_ref()).await?;
        let mut template = attrs.to_model();
        template.id = 0;

        let allocate = self.first_free
            || (template.subnet_address.is_empty() && attrs.parent_subnet_id != 0);
        let created = if allocate {
            let mask = prefix_length(attrs.subnet_mask)?;
            alloc::allocate_subnet(
                &*self.backend,
                &self.locks,
                attrs.parent_subnet_id,
                mask,
                &template,
            )
            .await?
        } else {
            self.create_fixed(&template).await?
        };

        if let Some(desired) = &attrs.custom_fields {
            custom_fields::write_initial(self.backend.subnets(), created.id, desired).await?;
        }
        self.state(created.id, attrs.parent_subnet_id).await
    }

    async fn read(&self, attrs: Value) -> Result<Option<Value>> {
        let query: SubnetQuery = decode(attrs.clone())?;
        let attrs: SubnetAttributes = decode(attrs)?;
        match resolve::resolve_subnet(&*self.backend, &query).await? {
            Some(subnet) => {
                let mut state = subnet_state(&*self.backend, subnet).await?;
                state.parent_subnet_id = attrs.parent_subnet_id;
                encode(&state).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn update(&self, attrs: Value) -> Result<Value> {
        let attrs: SubnetAttributes = decode(attrs)?;
        let id = existing_id(attrs.subnet_id, attrs.id.as_deref(), "subnet_id")?;

        let mut subnet = attrs.to_model();
        subnet.id = id;
        self.backend.subnets().update(&subnet.for_update()).await?;
        custom_fields::apply(self.backend.subnets(), id, attrs.custom_fields.as_ref()).await?;

        self.state(id, attrs.parent_subnet_id).await
    }

    async fn delete(&self, attrs: Value) -> Result<()> {
        let attrs: SubnetAttributes = decode(attrs)?;
        let id = existing_id(attrs.subnet_id, attrs.id.as_deref(), "subnet_id")?;
        debug!("Deleting subnet {}", id);
        self.backend.subnets().delete(id).await
    }
}

/// `phpipam_subnet` data source
pub struct SubnetDataSource {
    backend: Arc<dyn IpamBackend>,
}

impl SubnetDataSource {
    pub fn new(backend: Arc<dyn IpamBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl DataSourceHandler for SubnetDataSource {
    async fn read(&self, attrs: Value) -> Result<Option<Value>> {
        let query: SubnetQuery = decode(attrs)?;
        match resolve::resolve_subnet(&*self.backend, &query).await? {
            Some(subnet) => encode(&subnet_state(&*self.backend, subnet).await?).map(Some),
            None => Ok(None),
        }
    }
}

/// `phpipam_subnets` data source: ids of every match in a section
pub struct SubnetsDataSource {
    backend: Arc<dyn IpamBackend>,
}

impl SubnetsDataSource {
    pub fn new(backend: Arc<dyn IpamBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl DataSourceHandler for SubnetsDataSource {
    async fn read(&self, attrs: Value) -> Result<Option<Value>> {
        let query: SubnetQuery = decode(attrs)?;
        if query.section_id == 0 {
            return Err(Error::invalid_argument("section_id is required"));
        }
        let filter = query.scope_filter()?.ok_or_else(|| {
            Error::invalid_argument(
                "one of description, description_match or custom_field_filter is required",
            )
        })?;

        let found = resolve::subnets_in_section(&*self.backend, query.section_id, &filter).await?;
        let ids: Vec<EntityId> = found.iter().map(|s| s.id).collect();
        let sum: EntityId = ids.iter().sum();

        Ok(Some(json!({
            "id": sum.to_string(),
            "section_id": query.section_id,
            "subnet_ids": ids,
        })))
    }
}

#[derive(Debug, Deserialize)]
struct FreeSubnetQuery {
    #[serde(default)]
    subnet_id: EntityId,
    #[serde(default)]
    subnet_mask: u64,
}

/// `phpipam_first_free_subnet` data source
pub struct FirstFreeSubnetDataSource {
    backend: Arc<dyn IpamBackend>,
}

impl FirstFreeSubnetDataSource {
    pub fn new(backend: Arc<dyn IpamBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl DataSourceHandler for FirstFreeSubnetDataSource {
    async fn read(&self, attrs: Value) -> Result<Option<Value>> {
        let query: FreeSubnetQuery = decode(attrs)?;
        if query.subnet_id == 0 {
            return Err(Error::invalid_argument("subnet_id is required"));
        }
        let mask = prefix_length(query.subnet_mask)?;

        let cidr = self
            .backend
            .subnets()
            .first_free_subnet(query.subnet_id, mask)
            .await?
            .ok_or_else(|| Error::not_found("Subnet has no free subnets"))?;

        Ok(Some(json!({
            "id": cidr,
            "subnet_id": query.subnet_id,
            "subnet_mask": query.subnet_mask,
            "ip_address": cidr,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryIpam;
    use crate::model::{Kind, Section};
    use pretty_assertions::assert_eq;

    async fn setup() -> (Arc<MemoryIpam>, EntityId, EntityId) {
        let ipam = Arc::new(MemoryIpam::new());
        let section = ipam
            .insert_section(Section {
                name: "dc1".to_string(),
                ..Default::default()
            })
            .await;
        let parent = ipam
            .insert_subnet(Subnet {
                subnet_address: "10.10.0.0".to_string(),
                subnet_mask: 16,
                section_id: section,
                ..Default::default()
            })
            .await;
        (ipam, section, parent)
    }

    #[tokio::test]
    async fn test_unknown_custom_field_allocates_nothing() {
        let (ipam, section, parent) = setup().await;
        ipam.define_custom_field(Kind::Subnet, "owner").await;
        let resource = SubnetResource::new(ipam.clone(), AllocationLocks::new());

        let err = resource
            .create(json!({
                "parent_subnet_id": parent,
                "subnet_mask": 24,
                "section_id": section,
                "custom_fields": {"colour": "blue"},
            }))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnknownField { .. }));
        assert_eq!(ipam.count(Kind::Subnet).await, 1);
    }

    #[tokio::test]
    async fn test_create_fixed_cidr() {
        let (ipam, section, _) = setup().await;
        let resource = SubnetResource::new(ipam.clone(), AllocationLocks::new());

        let state = resource
            .create(json!({
                "subnet_address": "172.16.0.0",
                "subnet_mask": 24,
                "section_id": section,
                "description": "lab",
            }))
            .await
            .unwrap();

        assert_eq!(state["subnet_address"], "172.16.0.0");
        assert_eq!(state["subnet_mask"], 24);
        assert_eq!(state["description"], "lab");
        assert!(state.get("parent_subnet_id").is_none());
    }

    #[tokio::test]
    async fn test_first_free_subnets_are_distinct() {
        let (ipam, _, parent) = setup().await;
        let resource = SubnetResource::first_free(ipam.clone(), AllocationLocks::new());
        let attrs = json!({"parent_subnet_id": parent, "subnet_mask": 24});

        let a = resource.create(attrs.clone()).await.unwrap();
        let b = resource.create(attrs).await.unwrap();

        assert_eq!(a["subnet_address"], "10.10.0.0");
        assert_eq!(b["subnet_address"], "10.10.1.0");
        assert_eq!(a["master_subnet_id"], parent);
        assert_eq!(a["parent_subnet_id"], parent);
    }

    #[tokio::test]
    async fn test_update_keeps_cidr() {
        let (ipam, _, parent) = setup().await;
        let resource = SubnetResource::new(ipam.clone(), AllocationLocks::new());

        let mut state = resource.read(json!({"subnet_id": parent})).await.unwrap().unwrap();
        state["description"] = json!("renamed");
        state["subnet_address"] = json!("192.0.2.0");

        let updated = resource.update(state).await.unwrap();
        assert_eq!(updated["description"], "renamed");
        assert_eq!(updated["subnet_address"], "10.10.0.0");
    }

    #[tokio::test]
    async fn test_missing_subnet_by_id_is_error() {
        let (ipam, _, parent) = setup().await;
        ipam.remove(Kind::Subnet, parent).await;

        let err = SubnetDataSource::new(ipam)
            .read(json!({"subnet_id": parent}))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_first_free_subnet_data_source() {
        let (ipam, _, parent) = setup().await;
        let out = FirstFreeSubnetDataSource::new(ipam)
            .read(json!({"subnet_id": parent, "subnet_mask": 25}))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(out["ip_address"], "10.10.0.0/25");
        assert_eq!(out["id"], "10.10.0.0/25");
    }

    #[tokio::test]
    async fn test_subnets_data_source_empty_section() {
        let ipam = Arc::new(MemoryIpam::new());
        let section = ipam.insert_section(Section::default()).await;

        let err = SubnetsDataSource::new(ipam)
            .read(json!({"section_id": section, "description": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyScope(_)));
    }
}

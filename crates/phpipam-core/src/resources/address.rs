//! Address resource and data sources

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
use crate::model::{Address, CustomFieldSet, EntityId, wire};
use crate::registry::{DataSourceHandler, ResourceHandler};
use crate::resolve::{self, AddressQuery, exactly_one};

/// Host-side address attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressAttributes {
    #[serde(deserialize_with = "wire::identity", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub address_id: EntityId,
    pub subnet_id: EntityId,
    pub ip_address: String,
    pub is_gateway: bool,
    pub description: String,
    pub hostname: String,
    pub mac_address: String,
    pub owner: String,
    pub state_tag_id: u64,
    pub skip_ptr_record: bool,
    pub ptr_record_id: u64,
    pub device_id: EntityId,
    pub switch_port_label: String,
    pub note: String,
    pub last_seen: String,
    pub exclude_ping: bool,
    pub edit_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<CustomFieldSet>,
    /// Also remove DNS records on delete; defaults to true
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_dns_on_delete: Option<bool>,
}

impl AddressAttributes {
    fn to_model(&self) -> Address {
        Address {
            id: self.address_id,
            subnet_id: self.subnet_id,
            ip: self.ip_address.clone(),
            is_gateway: self.is_gateway,
            description: self.description.clone(),
            hostname: self.hostname.clone(),
            mac: self.mac_address.clone(),
            owner: self.owner.clone(),
            tag: self.state_tag_id,
            ptr_ignore: self.skip_ptr_record,
            ptr_record_id: self.ptr_record_id,
            device_id: self.device_id,
            port: self.switch_port_label.clone(),
            note: self.note.clone(),
            last_seen: String::new(),
            exclude_ping: self.exclude_ping,
            edit_date: String::new(),
        }
    }

    fn from_model(address: Address, custom_fields: CustomFieldSet) -> Self {
        Self {
            id: Some(address.id.to_string()),
            address_id: address.id,
            subnet_id: address.subnet_id,
            ip_address: address.ip,
            is_gateway: address.is_gateway,
            description: address.description,
            hostname: address.hostname,
            mac_address: address.mac,
            owner: address.owner,
            state_tag_id: address.tag,
            skip_ptr_record: address.ptr_ignore,
            ptr_record_id: address.ptr_record_id,
            device_id: address.device_id,
            switch_port_label: address.port,
            note: address.note,
            last_seen: address.last_seen,
            exclude_ping: address.exclude_ping,
            edit_date: address.edit_date,
            custom_fields: Some(custom_fields),
            remove_dns_on_delete: None,
        }
    }
}

async fn address_state(backend: &dyn IpamBackend, address: Address) -> Result<AddressAttributes> {
    let visible = custom_fields::read(backend.addresses(), address.id).await?;
    Ok(AddressAttributes::from_model(address, custom_field_state(visible)))
}

/// `phpipam_address` and `phpipam_first_free_address`
///
/// An address with no `ip_address` is allocated from the first free IP of
/// its subnet. The first-free variant always allocates and never removes
/// DNS records on delete.
pub struct AddressResource {
    backend: Arc<dyn IpamBackend>,
    locks: AllocationLocks,
    first_free: bool,
}

impl AddressResource {
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

    async fn create_fixed(&self, template: &Address) -> Result<Address> {
        let api = self.backend.addresses();
        api.create(template).await?;
        info!("Created address {} in subnet {}", template.ip, template.subnet_id);

        let found: Vec<Address> = api
            .search_by_ip(&template.ip)
            .await?
            .into_iter()
            .filter(|a| a.subnet_id == template.subnet_id)
            .collect();
        exactly_one(found, || {
            format!("address with IP {} in subnet {}", template.ip, template.subnet_id)
        })
    }

    async fn state(&self, id: EntityId, attrs: &AddressAttributes) -> Result<Value> {
        let address = self.backend.addresses().get_by_id(id).await?;
        let mut state = address_state(&*self.backend, address).await?;
        state.remove_dns_on_delete = self.remove_dns_setting(attrs);
        encode(&state)
    }

    fn remove_dns_setting(&self, attrs: &AddressAttributes) -> Option<bool> {
        if self.first_free {
            None
        } else {
            Some(attrs.remove_dns_on_delete.unwrap_or(true))
        }
    }
}

#[async_trait]
impl ResourceHandler for AddressResource {
    async fn create(&self, attrs: Value) -> Result<Value> {
        let attrs: AddressAttributes = decode(attrs)?;
        custom_fields::check_initial(self.backend.addresses(), attrs.custom_fields.as_ref()).await?;
        let mut template = attrs.to_model();
        template.id = 0;

        let created = if self.first_free || template.ip.is_empty() {
            alloc::allocate_address(&*self.backend, &self.locks, &template).await?
        } else {
            self.create_fixed(&template).await?
        };

        if let Some(desired) = &attrs.custom_fields {
            custom_fields::write_initial(self.backend.addresses(), created.id, desired).await?;
        }
        self.state(created.id, &attrs).await
    }

    async fn read(&self, attrs: Value) -> Result<Option<Value>> {
        let query: AddressQuery = decode(attrs.clone())?;
        let attrs: AddressAttributes = decode(attrs)?;
        match resolve::resolve_address(&*self.backend, &query).await? {
            Some(address) => {
                let mut state = address_state(&*self.backend, address).await?;
                state.remove_dns_on_delete = self.remove_dns_setting(&attrs);
                encode(&state).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn update(&self, attrs: Value) -> Result<Value> {
        let attrs: AddressAttributes = decode(attrs)?;
        let id = existing_id(attrs.address_id, attrs.id.as_deref(), "address_id")?;

        let mut address = attrs.to_model();
        address.id = id;
        self.backend.addresses().update(&address.for_update()).await?;
        custom_fields::apply(self.backend.addresses(), id, attrs.custom_fields.as_ref()).await?;

        self.state(id, &attrs).await
    }

    async fn delete(&self, attrs: Value) -> Result<()> {
        let attrs: AddressAttributes = decode(attrs)?;
        let id = existing_id(attrs.address_id, attrs.id.as_deref(), "address_id")?;
        let remove_dns = self.remove_dns_setting(&attrs).unwrap_or(false);

        debug!("Deleting address {} (remove_dns={})", id, remove_dns);
        self.backend.addresses().delete(id, remove_dns).await
    }
}

/// `phpipam_address` data source
pub struct AddressDataSource {
    backend: Arc<dyn IpamBackend>,
}

impl AddressDataSource {
    pub fn new(backend: Arc<dyn IpamBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl DataSourceHandler for AddressDataSource {
    async fn read(&self, attrs: Value) -> Result<Option<Value>> {
        let query: AddressQuery = decode(attrs)?;
        match resolve::resolve_address(&*self.backend, &query).await? {
            Some(address) => encode(&address_state(&*self.backend, address).await?).map(Some),
            None => Ok(None),
        }
    }
}

/// `phpipam_addresses` data source: ids of every match in a subnet
pub struct AddressesDataSource {
    backend: Arc<dyn IpamBackend>,
}

impl AddressesDataSource {
    pub fn new(backend: Arc<dyn IpamBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl DataSourceHandler for AddressesDataSource {
    async fn read(&self, attrs: Value) -> Result<Option<Value>> {
        let query: AddressQuery = decode(attrs)?;
        if query.subnet_id == 0 {
            return Err(Error::invalid_argument("subnet_id is required"));
        }
        let filter = query.scope_filter()?.ok_or_else(|| {
            Error::invalid_argument("one of description, hostname or custom_field_filter is required")
        })?;

        let found = resolve::addresses_in_subnet(&*self.backend, query.subnet_id, &filter).await?;
        let ids: Vec<EntityId> = found.iter().map(|a| a.id).collect();
        let sum: EntityId = ids.iter().sum();

        Ok(Some(json!({
            "id": sum.to_string(),
            "subnet_id": query.subnet_id,
            "address_ids": ids,
        })))
    }
}

#[derive(Debug, Deserialize)]
struct FreeAddressQuery {
    #[serde(default)]
    subnet_id: EntityId,
}

/// `phpipam_first_free_address` data source
pub struct FirstFreeAddressDataSource {
    backend: Arc<dyn IpamBackend>,
}

impl FirstFreeAddressDataSource {
    pub fn new(backend: Arc<dyn IpamBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl DataSourceHandler for FirstFreeAddressDataSource {
    async fn read(&self, attrs: Value) -> Result<Option<Value>> {
        let query: FreeAddressQuery = decode(attrs)?;
        if query.subnet_id == 0 {
            return Err(Error::invalid_argument("subnet_id is required"));
        }

        let ip = self
            .backend
            .subnets()
            .first_free_address(query.subnet_id)
            .await?
            .ok_or_else(|| Error::not_found("Subnet has no free IP addresses"))?;

        Ok(Some(json!({
            "id": ip,
            "subnet_id": query.subnet_id,
            "ip_address": ip,
        })))
    }
}

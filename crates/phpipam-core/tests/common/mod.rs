//! Test doubles and common utilities for contract tests
//!
//! `InstrumentedIpam` wraps the in-memory backend and counts the calls the
//! contracts care about. The subnet view can stall between reading the
//! first free address and returning it, which widens the race window that
//! the allocation lock has to close.

#![allow(dead_code)]

use async_trait::async_trait;
use phpipam_core::api::{
    AddressApi, CustomFieldCarrier, IpamBackend, L2DomainApi, SectionApi, SubnetApi, VlanApi,
};
use phpipam_core::error::Result;
use phpipam_core::model::{CustomFieldSchema, CustomFieldSet, CustomFields};
use phpipam_core::{Address, EntityId, Kind, MemoryIpam, Section, Subnet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared call counters
#[derive(Debug, Clone, Default)]
pub struct Counters {
    custom_field_updates: Arc<AtomicUsize>,
    first_free_calls: Arc<AtomicUsize>,
    deletes: Arc<Mutex<Vec<(EntityId, bool)>>>,
}

impl Counters {
    /// Number of custom field writes sent for addresses
    pub fn custom_field_updates(&self) -> usize {
        self.custom_field_updates.load(Ordering::SeqCst)
    }

    /// Number of first-free-address lookups
    pub fn first_free_calls(&self) -> usize {
        self.first_free_calls.load(Ordering::SeqCst)
    }

    /// Address deletes as (id, remove_dns)
    pub fn deletes(&self) -> Vec<(EntityId, bool)> {
        self.deletes.lock().unwrap().clone()
    }
}

/// Memory backend with instrumented address and subnet views
pub struct InstrumentedIpam {
    pub memory: MemoryIpam,
    pub counters: Counters,
    addresses: CountingAddresses,
    subnets: StallingSubnets,
}

impl InstrumentedIpam {
    /// Create a backend whose first-free lookups stall for `stall`
    pub fn new(stall: Duration) -> Self {
        let memory = MemoryIpam::new();
        let counters = Counters::default();
        Self {
            addresses: CountingAddresses {
                memory: memory.clone(),
                counters: counters.clone(),
            },
            subnets: StallingSubnets {
                memory: memory.clone(),
                counters: counters.clone(),
                stall,
            },
            memory,
            counters,
        }
    }
}

impl IpamBackend for InstrumentedIpam {
    fn addresses(&self) -> &dyn AddressApi {
        &self.addresses
    }

    fn subnets(&self) -> &dyn SubnetApi {
        &self.subnets
    }

    fn sections(&self) -> &dyn SectionApi {
        self.memory.sections()
    }

    fn vlans(&self) -> &dyn VlanApi {
        self.memory.vlans()
    }

    fn l2domains(&self) -> &dyn L2DomainApi {
        self.memory.l2domains()
    }
}

struct CountingAddresses {
    memory: MemoryIpam,
    counters: Counters,
}

#[async_trait]
impl CustomFieldCarrier for CountingAddresses {
    fn kind(&self) -> Kind {
        Kind::Address
    }

    async fn custom_field_schema(&self) -> Result<CustomFieldSchema> {
        self.memory.addresses().custom_field_schema().await
    }

    async fn custom_fields(&self, id: EntityId) -> Result<CustomFields> {
        self.memory.addresses().custom_fields(id).await
    }

    async fn update_custom_fields(&self, id: EntityId, fields: &CustomFieldSet) -> Result<()> {
        self.counters.custom_field_updates.fetch_add(1, Ordering::SeqCst);
        self.memory.addresses().update_custom_fields(id, fields).await
    }
}

#[async_trait]
impl AddressApi for CountingAddresses {
    async fn get_by_id(&self, id: EntityId) -> Result<Address> {
        self.memory.addresses().get_by_id(id).await
    }

    async fn search_by_ip(&self, ip: &str) -> Result<Vec<Address>> {
        self.memory.addresses().search_by_ip(ip).await
    }

    async fn create(&self, address: &Address) -> Result<()> {
        self.memory.addresses().create(address).await
    }

    async fn update(&self, address: &Address) -> Result<()> {
        self.memory.addresses().update(address).await
    }

    async fn delete(&self, id: EntityId, remove_dns: bool) -> Result<()> {
        self.counters.deletes.lock().unwrap().push((id, remove_dns));
        self.memory.addresses().delete(id, remove_dns).await
    }
}

struct StallingSubnets {
    memory: MemoryIpam,
    counters: Counters,
    stall: Duration,
}

#[async_trait]
impl CustomFieldCarrier for StallingSubnets {
    fn kind(&self) -> Kind {
        Kind::Subnet
    }

    async fn custom_field_schema(&self) -> Result<CustomFieldSchema> {
        self.memory.subnets().custom_field_schema().await
    }

    async fn custom_fields(&self, id: EntityId) -> Result<CustomFields> {
        self.memory.subnets().custom_fields(id).await
    }

    async fn update_custom_fields(&self, id: EntityId, fields: &CustomFieldSet) -> Result<()> {
        self.memory.subnets().update_custom_fields(id, fields).await
    }
}

#[async_trait]
impl SubnetApi for StallingSubnets {
    async fn get_by_id(&self, id: EntityId) -> Result<Subnet> {
        self.memory.subnets().get_by_id(id).await
    }

    async fn search_by_cidr(&self, cidr: &str, section_id: Option<EntityId>) -> Result<Vec<Subnet>> {
        self.memory.subnets().search_by_cidr(cidr, section_id).await
    }

    async fn list_addresses(&self, id: EntityId) -> Result<Vec<Address>> {
        self.memory.subnets().list_addresses(id).await
    }

    async fn first_free_address(&self, id: EntityId) -> Result<Option<String>> {
        self.counters.first_free_calls.fetch_add(1, Ordering::SeqCst);
        let free = self.memory.subnets().first_free_address(id).await?;
        tokio::time::sleep(self.stall).await;
        Ok(free)
    }

    async fn first_free_subnet(&self, id: EntityId, mask: u8) -> Result<Option<String>> {
        self.memory.subnets().first_free_subnet(id, mask).await
    }

    async fn create(&self, subnet: &Subnet) -> Result<()> {
        self.memory.subnets().create(subnet).await
    }

    async fn update(&self, subnet: &Subnet) -> Result<()> {
        self.memory.subnets().update(subnet).await
    }

    async fn delete(&self, id: EntityId) -> Result<()> {
        self.memory.subnets().delete(id).await
    }
}

/// Section plus one subnet of the given CIDR, returns (section, subnet)
pub async fn section_with_subnet(memory: &MemoryIpam, address: &str, mask: u64) -> (EntityId, EntityId) {
    let section = memory
        .insert_section(Section {
            name: format!("section-{}", address),
            ..Default::default()
        })
        .await;
    let subnet = memory
        .insert_subnet(Subnet {
            subnet_address: address.to_string(),
            subnet_mask: mask,
            section_id: section,
            ..Default::default()
        })
        .await;
    (section, subnet)
}

/// Insert an address with a description
pub async fn address_in(memory: &MemoryIpam, subnet_id: EntityId, ip: &str, description: &str) -> EntityId {
    memory
        .insert_address(Address {
            subnet_id,
            ip: ip.to_string(),
            description: description.to_string(),
            ..Default::default()
        })
        .await
}

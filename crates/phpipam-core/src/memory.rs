// # Memory phpIPAM Backend
//
// In-memory implementation of the phpIPAM API traits.
//
// ## Purpose
//
// Behaves like a small phpIPAM server: ids are assigned on create, creates
// do not echo the entity, custom fields are reported for every schema key,
// and first-free lookups compute real free slots. Useful for testing the
// lifecycle handlers without a live API.
//
// ## Crash Behavior
//
// All state is lost on drop. Nothing is persisted.

use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::api::{AddressApi, CustomFieldCarrier, IpamBackend, L2DomainApi, SectionApi, SubnetApi, VlanApi};
use crate::error::{Error, Result};
use crate::model::{
    Address, CustomFieldMeta, CustomFieldSchema, CustomFieldSet, CustomFields, EntityId, Kind,
    L2Domain, Section, Subnet, Vlan,
};

#[derive(Debug, Default)]
struct State {
    last_id: EntityId,
    addresses: BTreeMap<EntityId, Address>,
    subnets: BTreeMap<EntityId, Subnet>,
    sections: BTreeMap<EntityId, Section>,
    vlans: BTreeMap<EntityId, Vlan>,
    l2domains: BTreeMap<EntityId, L2Domain>,
    schemas: HashMap<Kind, CustomFieldSchema>,
    custom_fields: HashMap<(Kind, EntityId), CustomFields>,
}

impl State {
    fn next_id(&mut self) -> EntityId {
        self.last_id += 1;
        self.last_id
    }

    fn exists(&self, kind: Kind, id: EntityId) -> bool {
        match kind {
            Kind::Address => self.addresses.contains_key(&id),
            Kind::Subnet => self.subnets.contains_key(&id),
            Kind::Section => self.sections.contains_key(&id),
            Kind::Vlan => self.vlans.contains_key(&id),
            Kind::L2Domain => self.l2domains.contains_key(&id),
        }
    }

    fn subnet(&self, id: EntityId) -> Result<&Subnet> {
        self.subnets.get(&id).ok_or_else(|| missing(Kind::Subnet, id))
    }
}

type Shared = Arc<RwLock<State>>;

/// In-memory phpIPAM backend
///
/// # Example
///
/// ```rust,no_run
/// use phpipam_core::memory::MemoryIpam;
/// use phpipam_core::model::Section;
///
/// #[tokio::main]
/// async fn main() {
///     let ipam = MemoryIpam::new();
///     let id = ipam
///         .insert_section(Section {
///             name: "Customers".to_string(),
///             ..Default::default()
///         })
///         .await;
///     assert_eq!(id, 1);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryIpam {
    state: Shared,
    addresses: MemoryAddresses,
    subnets: MemorySubnets,
    sections: MemorySections,
    vlans: MemoryVlans,
    l2domains: MemoryL2Domains,
}

impl MemoryIpam {
    /// Create an empty backend
    pub fn new() -> Self {
        let state: Shared = Arc::new(RwLock::new(State::default()));
        Self {
            addresses: MemoryAddresses(state.clone()),
            subnets: MemorySubnets(state.clone()),
            sections: MemorySections(state.clone()),
            vlans: MemoryVlans(state.clone()),
            l2domains: MemoryL2Domains(state.clone()),
            state,
        }
    }

    /// Declare a custom field for a kind
    pub async fn define_custom_field(&self, kind: Kind, name: impl Into<String>) {
        let name = name.into();
        let mut state = self.state.write().await;
        state.schemas.entry(kind).or_default().insert(
            name.clone(),
            CustomFieldMeta {
                name,
                field_type: "varchar(255)".to_string(),
                null: "YES".to_string(),
                ..Default::default()
            },
        );
    }

    /// Store raw custom field values, bypassing schema checks
    pub async fn set_custom_fields(&self, kind: Kind, id: EntityId, fields: CustomFields) {
        let mut state = self.state.write().await;
        state.custom_fields.insert((kind, id), fields);
    }

    /// Insert a section directly, returning its id
    pub async fn insert_section(&self, section: Section) -> EntityId {
        let mut state = self.state.write().await;
        let id = state.next_id();
        state.sections.insert(id, Section { id, ..section });
        id
    }

    /// Insert a subnet directly, returning its id
    pub async fn insert_subnet(&self, subnet: Subnet) -> EntityId {
        let mut state = self.state.write().await;
        let id = state.next_id();
        state.subnets.insert(id, Subnet { id, ..subnet });
        id
    }

    /// Insert an address directly, returning its id
    pub async fn insert_address(&self, address: Address) -> EntityId {
        let mut state = self.state.write().await;
        let id = state.next_id();
        state.addresses.insert(id, Address { id, ..address });
        id
    }

    /// Insert a VLAN directly, returning its id
    pub async fn insert_vlan(&self, vlan: Vlan) -> EntityId {
        let mut state = self.state.write().await;
        let id = state.next_id();
        state.vlans.insert(id, Vlan { id, ..vlan });
        id
    }

    /// Insert an L2 domain directly, returning its id
    pub async fn insert_l2domain(&self, domain: L2Domain) -> EntityId {
        let mut state = self.state.write().await;
        let id = state.next_id();
        state.l2domains.insert(id, L2Domain { id, ..domain });
        id
    }

    /// Delete an entity out-of-band
    pub async fn remove(&self, kind: Kind, id: EntityId) {
        let mut state = self.state.write().await;
        remove_entity(&mut state, kind, id);
    }

    /// All stored addresses, in id order
    pub async fn all_addresses(&self) -> Vec<Address> {
        self.state.read().await.addresses.values().cloned().collect()
    }

    /// Number of stored entities of a kind
    pub async fn count(&self, kind: Kind) -> usize {
        let state = self.state.read().await;
        match kind {
            Kind::Address => state.addresses.len(),
            Kind::Subnet => state.subnets.len(),
            Kind::Section => state.sections.len(),
            Kind::Vlan => state.vlans.len(),
            Kind::L2Domain => state.l2domains.len(),
        }
    }
}

impl Default for MemoryIpam {
    fn default() -> Self {
        Self::new()
    }
}

impl IpamBackend for MemoryIpam {
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

fn missing(kind: Kind, id: EntityId) -> Error {
    Error::not_found(format!("{} {} does not exist", kind, id))
}

fn remove_entity(state: &mut State, kind: Kind, id: EntityId) -> bool {
    let removed = match kind {
        Kind::Address => state.addresses.remove(&id).is_some(),
        Kind::Subnet => state.subnets.remove(&id).is_some(),
        Kind::Section => state.sections.remove(&id).is_some(),
        Kind::Vlan => state.vlans.remove(&id).is_some(),
        Kind::L2Domain => state.l2domains.remove(&id).is_some(),
    };
    state.custom_fields.remove(&(kind, id));
    removed
}

async fn schema_of(state: &Shared, kind: Kind) -> CustomFieldSchema {
    state.read().await.schemas.get(&kind).cloned().unwrap_or_default()
}

/// Every schema key, null when unset
async fn fields_of(state: &Shared, kind: Kind, id: EntityId) -> Result<CustomFields> {
    let state = state.read().await;
    if !state.exists(kind, id) {
        return Err(missing(kind, id));
    }
    let stored = state.custom_fields.get(&(kind, id));
    let schema = state.schemas.get(&kind).cloned().unwrap_or_default();
    Ok(schema
        .keys()
        .map(|key| {
            let value = stored
                .and_then(|fields| fields.get(key))
                .cloned()
                .unwrap_or(Value::Null);
            (key.clone(), value)
        })
        .collect())
}

async fn write_fields(state: &Shared, kind: Kind, id: EntityId, fields: &CustomFieldSet) -> Result<()> {
    let mut state = state.write().await;
    if !state.exists(kind, id) {
        return Err(missing(kind, id));
    }
    let stored = state.custom_fields.entry((kind, id)).or_default();
    for (key, value) in fields {
        let value = value.clone().map(Value::String).unwrap_or(Value::Null);
        stored.insert(key.clone(), value);
    }
    Ok(())
}

fn network_of(subnet: &Subnet) -> Result<IpNetwork> {
    let address: IpAddr = subnet.subnet_address.parse().map_err(|_| {
        Error::api(400, format!("Invalid subnet address {}", subnet.subnet_address))
    })?;
    let prefix = u8::try_from(subnet.subnet_mask)
        .map_err(|_| Error::api(400, format!("Invalid mask {}", subnet.subnet_mask)))?;
    IpNetwork::new(address, prefix).map_err(|e| Error::api(400, e.to_string()))
}

fn host_bits(net: &IpNetwork) -> u32 {
    let width = if net.is_ipv4() { 32 } else { 128 };
    width - u32::from(net.prefix())
}

fn to_int(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn from_int(v: u128, v4: bool) -> IpAddr {
    if v4 {
        // Only called with values inside an IPv4 range
        IpAddr::V4(Ipv4Addr::from(v as u32))
    } else {
        IpAddr::V6(Ipv6Addr::from(v))
    }
}

/// Inclusive integer range covered by a network
fn span(net: &IpNetwork) -> (u128, u128) {
    let first = to_int(net.network());
    let size_minus_one = match host_bits(net) {
        128 => u128::MAX,
        bits => (1u128 << bits) - 1,
    };
    (first, first.saturating_add(size_minus_one))
}

fn first_free_ip(net: &IpNetwork, taken: &[IpAddr]) -> Option<IpAddr> {
    let (first, last) = span(net);
    // Network and broadcast addresses are not assignable in IPv4 subnets larger than /31
    let (first, last) = if net.is_ipv4() && host_bits(net) >= 2 {
        (first + 1, last - 1)
    } else {
        (first, last)
    };
    let taken: Vec<u128> = taken.iter().map(|ip| to_int(*ip)).collect();
    let mut candidate = first;
    loop {
        if !taken.contains(&candidate) {
            return Some(from_int(candidate, net.is_ipv4()));
        }
        if candidate >= last {
            return None;
        }
        candidate += 1;
    }
}

fn first_free_block(parent: &IpNetwork, mask: u8, children: &[IpNetwork]) -> Option<IpNetwork> {
    let width = if parent.is_ipv4() { 32 } else { 128 };
    if mask < parent.prefix() || u32::from(mask) > width {
        return None;
    }
    let block_bits = width - u32::from(mask);
    if block_bits >= 128 {
        return None;
    }
    let step = 1u128 << block_bits;
    let (parent_first, parent_last) = span(parent);
    let used: Vec<(u128, u128)> = children.iter().map(span).collect();

    let mut start = parent_first;
    loop {
        let end = start + (step - 1);
        if end > parent_last {
            return None;
        }
        if !used.iter().any(|(a, b)| start <= *b && *a <= end) {
            return IpNetwork::new(from_int(start, parent.is_ipv4()), mask).ok();
        }
        start = end.checked_add(1)?;
    }
}

/// Address controller view
#[derive(Debug, Clone)]
pub struct MemoryAddresses(Shared);

#[async_trait]
impl CustomFieldCarrier for MemoryAddresses {
    fn kind(&self) -> Kind {
        Kind::Address
    }

    async fn custom_field_schema(&self) -> Result<CustomFieldSchema> {
        Ok(schema_of(&self.0, Kind::Address).await)
    }

    async fn custom_fields(&self, id: EntityId) -> Result<CustomFields> {
        fields_of(&self.0, Kind::Address, id).await
    }

    async fn update_custom_fields(&self, id: EntityId, fields: &CustomFieldSet) -> Result<()> {
        write_fields(&self.0, Kind::Address, id, fields).await
    }
}

#[async_trait]
impl AddressApi for MemoryAddresses {
    async fn get_by_id(&self, id: EntityId) -> Result<Address> {
        let state = self.0.read().await;
        state
            .addresses
            .get(&id)
            .cloned()
            .ok_or_else(|| missing(Kind::Address, id))
    }

    async fn search_by_ip(&self, ip: &str) -> Result<Vec<Address>> {
        let state = self.0.read().await;
        Ok(state
            .addresses
            .values()
            .filter(|a| a.ip == ip)
            .cloned()
            .collect())
    }

    async fn create(&self, address: &Address) -> Result<()> {
        let mut state = self.0.write().await;
        let net = network_of(state.subnet(address.subnet_id)?)?;
        let ip: IpAddr = address
            .ip
            .parse()
            .map_err(|_| Error::api(400, format!("Invalid IP address {}", address.ip)))?;
        if !net.contains(ip) {
            return Err(Error::api(
                400,
                format!("IP address {} not in subnet {}", address.ip, net),
            ));
        }
        if state
            .addresses
            .values()
            .any(|a| a.subnet_id == address.subnet_id && a.ip == address.ip)
        {
            return Err(Error::api(409, "IP address already exists"));
        }
        let id = state.next_id();
        state.addresses.insert(
            id,
            Address {
                id,
                ..address.clone()
            },
        );
        Ok(())
    }

    async fn update(&self, address: &Address) -> Result<()> {
        let mut state = self.0.write().await;
        let existing = state
            .addresses
            .get_mut(&address.id)
            .ok_or_else(|| missing(Kind::Address, address.id))?;
        *existing = Address {
            ip: existing.ip.clone(),
            subnet_id: existing.subnet_id,
            ..address.clone()
        };
        Ok(())
    }

    async fn delete(&self, id: EntityId, _remove_dns: bool) -> Result<()> {
        let mut state = self.0.write().await;
        if remove_entity(&mut state, Kind::Address, id) {
            Ok(())
        } else {
            Err(missing(Kind::Address, id))
        }
    }
}

/// Subnet controller view
#[derive(Debug, Clone)]
pub struct MemorySubnets(Shared);

#[async_trait]
impl CustomFieldCarrier for MemorySubnets {
    fn kind(&self) -> Kind {
        Kind::Subnet
    }

    async fn custom_field_schema(&self) -> Result<CustomFieldSchema> {
        Ok(schema_of(&self.0, Kind::Subnet).await)
    }

    async fn custom_fields(&self, id: EntityId) -> Result<CustomFields> {
        fields_of(&self.0, Kind::Subnet, id).await
    }

    async fn update_custom_fields(&self, id: EntityId, fields: &CustomFieldSet) -> Result<()> {
        write_fields(&self.0, Kind::Subnet, id, fields).await
    }
}

#[async_trait]
impl SubnetApi for MemorySubnets {
    async fn get_by_id(&self, id: EntityId) -> Result<Subnet> {
        self.0.read().await.subnet(id).cloned()
    }

    async fn search_by_cidr(&self, cidr: &str, section_id: Option<EntityId>) -> Result<Vec<Subnet>> {
        let state = self.0.read().await;
        Ok(state
            .subnets
            .values()
            .filter(|s| s.cidr() == cidr)
            .filter(|s| section_id.is_none_or(|section| s.section_id == section))
            .cloned()
            .collect())
    }

    async fn list_addresses(&self, id: EntityId) -> Result<Vec<Address>> {
        let state = self.0.read().await;
        state.subnet(id)?;
        Ok(state
            .addresses
            .values()
            .filter(|a| a.subnet_id == id)
            .cloned()
            .collect())
    }

    async fn first_free_address(&self, id: EntityId) -> Result<Option<String>> {
        let state = self.0.read().await;
        let net = network_of(state.subnet(id)?)?;
        let taken: Vec<IpAddr> = state
            .addresses
            .values()
            .filter(|a| a.subnet_id == id)
            .filter_map(|a| a.ip.parse().ok())
            .collect();
        Ok(first_free_ip(&net, &taken).map(|ip| ip.to_string()))
    }

    async fn first_free_subnet(&self, id: EntityId, mask: u8) -> Result<Option<String>> {
        let state = self.0.read().await;
        let parent = network_of(state.subnet(id)?)?;
        let children = state
            .subnets
            .values()
            .filter(|s| s.master_subnet_id == id)
            .map(network_of)
            .collect::<Result<Vec<_>>>()?;
        Ok(first_free_block(&parent, mask, &children).map(|net| net.to_string()))
    }

    async fn create(&self, subnet: &Subnet) -> Result<()> {
        let mut state = self.0.write().await;
        if !state.sections.contains_key(&subnet.section_id) {
            return Err(Error::api(400, "Invalid section Id"));
        }
        if !subnet.is_folder {
            network_of(subnet)?;
        }
        let id = state.next_id();
        state.subnets.insert(
            id,
            Subnet {
                id,
                ..subnet.clone()
            },
        );
        Ok(())
    }

    async fn update(&self, subnet: &Subnet) -> Result<()> {
        let mut state = self.0.write().await;
        let existing = state
            .subnets
            .get_mut(&subnet.id)
            .ok_or_else(|| missing(Kind::Subnet, subnet.id))?;
        *existing = Subnet {
            subnet_address: existing.subnet_address.clone(),
            subnet_mask: existing.subnet_mask,
            ..subnet.clone()
        };
        Ok(())
    }

    async fn delete(&self, id: EntityId) -> Result<()> {
        let mut state = self.0.write().await;
        if remove_entity(&mut state, Kind::Subnet, id) {
            Ok(())
        } else {
            Err(missing(Kind::Subnet, id))
        }
    }
}

/// Section controller view
#[derive(Debug, Clone)]
pub struct MemorySections(Shared);

#[async_trait]
impl SectionApi for MemorySections {
    async fn list(&self) -> Result<Vec<Section>> {
        Ok(self.0.read().await.sections.values().cloned().collect())
    }

    async fn get_by_id(&self, id: EntityId) -> Result<Section> {
        let state = self.0.read().await;
        state
            .sections
            .get(&id)
            .cloned()
            .ok_or_else(|| missing(Kind::Section, id))
    }

    async fn search_by_name(&self, name: &str) -> Result<Vec<Section>> {
        let state = self.0.read().await;
        Ok(state
            .sections
            .values()
            .filter(|s| s.name == name)
            .cloned()
            .collect())
    }

    async fn list_subnets(&self, id: EntityId) -> Result<Vec<Subnet>> {
        let state = self.0.read().await;
        if !state.sections.contains_key(&id) {
            return Err(missing(Kind::Section, id));
        }
        Ok(state
            .subnets
            .values()
            .filter(|s| s.section_id == id)
            .cloned()
            .collect())
    }

    async fn create(&self, section: &Section) -> Result<()> {
        let mut state = self.0.write().await;
        if state.sections.values().any(|s| s.name == section.name) {
            return Err(Error::api(409, "Section with that name already exists"));
        }
        let id = state.next_id();
        state.sections.insert(
            id,
            Section {
                id,
                ..section.clone()
            },
        );
        Ok(())
    }

    async fn update(&self, section: &Section) -> Result<()> {
        let mut state = self.0.write().await;
        let existing = state
            .sections
            .get_mut(&section.id)
            .ok_or_else(|| missing(Kind::Section, section.id))?;
        *existing = section.clone();
        Ok(())
    }

    async fn delete(&self, id: EntityId) -> Result<()> {
        let mut state = self.0.write().await;
        if remove_entity(&mut state, Kind::Section, id) {
            Ok(())
        } else {
            Err(missing(Kind::Section, id))
        }
    }
}

/// VLAN controller view
#[derive(Debug, Clone)]
pub struct MemoryVlans(Shared);

#[async_trait]
impl CustomFieldCarrier for MemoryVlans {
    fn kind(&self) -> Kind {
        Kind::Vlan
    }

    async fn custom_field_schema(&self) -> Result<CustomFieldSchema> {
        Ok(schema_of(&self.0, Kind::Vlan).await)
    }

    async fn custom_fields(&self, id: EntityId) -> Result<CustomFields> {
        fields_of(&self.0, Kind::Vlan, id).await
    }

    async fn update_custom_fields(&self, id: EntityId, fields: &CustomFieldSet) -> Result<()> {
        write_fields(&self.0, Kind::Vlan, id, fields).await
    }
}

#[async_trait]
impl VlanApi for MemoryVlans {
    async fn get_by_id(&self, id: EntityId) -> Result<Vlan> {
        let state = self.0.read().await;
        state
            .vlans
            .get(&id)
            .cloned()
            .ok_or_else(|| missing(Kind::Vlan, id))
    }

    async fn search_by_number(&self, number: u64) -> Result<Vec<Vlan>> {
        let state = self.0.read().await;
        Ok(state
            .vlans
            .values()
            .filter(|v| v.number == number)
            .cloned()
            .collect())
    }

    async fn create(&self, vlan: &Vlan) -> Result<()> {
        let mut state = self.0.write().await;
        let id = state.next_id();
        state.vlans.insert(id, Vlan { id, ..vlan.clone() });
        Ok(())
    }

    async fn update(&self, vlan: &Vlan) -> Result<()> {
        let mut state = self.0.write().await;
        let existing = state
            .vlans
            .get_mut(&vlan.id)
            .ok_or_else(|| missing(Kind::Vlan, vlan.id))?;
        *existing = vlan.clone();
        Ok(())
    }

    async fn delete(&self, id: EntityId) -> Result<()> {
        let mut state = self.0.write().await;
        if remove_entity(&mut state, Kind::Vlan, id) {
            Ok(())
        } else {
            Err(missing(Kind::Vlan, id))
        }
    }
}

/// L2 domain controller view
#[derive(Debug, Clone)]
pub struct MemoryL2Domains(Shared);

#[async_trait]
impl L2DomainApi for MemoryL2Domains {
    async fn list(&self) -> Result<Vec<L2Domain>> {
        Ok(self.0.read().await.l2domains.values().cloned().collect())
    }

    async fn get_by_id(&self, id: EntityId) -> Result<L2Domain> {
        let state = self.0.read().await;
        state
            .l2domains
            .get(&id)
            .cloned()
            .ok_or_else(|| missing(Kind::L2Domain, id))
    }

    async fn search_by_name(&self, name: &str) -> Result<Vec<L2Domain>> {
        let state = self.0.read().await;
        Ok(state
            .l2domains
            .values()
            .filter(|d| d.name == name)
            .cloned()
            .collect())
    }

    async fn create(&self, domain: &L2Domain) -> Result<()> {
        let mut state = self.0.write().await;
        let id = state.next_id();
        state.l2domains.insert(
            id,
            L2Domain {
                id,
                ..domain.clone()
            },
        );
        Ok(())
    }

    async fn update(&self, domain: &L2Domain) -> Result<()> {
        let mut state = self.0.write().await;
        let existing = state
            .l2domains
            .get_mut(&domain.id)
            .ok_or_else(|| missing(Kind::L2Domain, domain.id))?;
        *existing = domain.clone();
        Ok(())
    }

    async fn delete(&self, id: EntityId) -> Result<()> {
        let mut state = self.0.write().await;
        if remove_entity(&mut state, Kind::L2Domain, id) {
            Ok(())
        } else {
            Err(missing(Kind::L2Domain, id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn subnet_fixture(ipam: &MemoryIpam, cidr: (&str, u64)) -> EntityId {
        let section = ipam
            .insert_section(Section {
                name: "lab".to_string(),
                ..Default::default()
            })
            .await;
        ipam.insert_subnet(Subnet {
            subnet_address: cidr.0.to_string(),
            subnet_mask: cidr.1,
            section_id: section,
            ..Default::default()
        })
        .await
    }

    #[tokio::test]
    async fn test_create_does_not_echo_and_assigns_id() {
        let ipam = MemoryIpam::new();
        let subnet = subnet_fixture(&ipam, ("10.0.0.0", 29)).await;

        ipam.addresses()
            .create(&Address {
                subnet_id: subnet,
                ip: "10.0.0.2".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let found = ipam.addresses().search_by_ip("10.0.0.2").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_ne!(found[0].id, 0);
    }

    #[tokio::test]
    async fn test_duplicate_address_rejected() {
        let ipam = MemoryIpam::new();
        let subnet = subnet_fixture(&ipam, ("10.0.0.0", 29)).await;
        let address = Address {
            subnet_id: subnet,
            ip: "10.0.0.3".to_string(),
            ..Default::default()
        };

        ipam.addresses().create(&address).await.unwrap();
        let err = ipam.addresses().create(&address).await.unwrap_err();
        assert!(matches!(err, Error::Api { code: 409, .. }));
    }

    #[tokio::test]
    async fn test_first_free_address_skips_network_and_taken() {
        let ipam = MemoryIpam::new();
        let subnet = subnet_fixture(&ipam, ("10.0.0.0", 30)).await;

        assert_eq!(
            ipam.subnets().first_free_address(subnet).await.unwrap(),
            Some("10.0.0.1".to_string())
        );

        ipam.insert_address(Address {
            subnet_id: subnet,
            ip: "10.0.0.1".to_string(),
            ..Default::default()
        })
        .await;
        assert_eq!(
            ipam.subnets().first_free_address(subnet).await.unwrap(),
            Some("10.0.0.2".to_string())
        );

        ipam.insert_address(Address {
            subnet_id: subnet,
            ip: "10.0.0.2".to_string(),
            ..Default::default()
        })
        .await;
        assert_eq!(ipam.subnets().first_free_address(subnet).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_first_free_subnet_skips_children() {
        let ipam = MemoryIpam::new();
        let parent = subnet_fixture(&ipam, ("10.1.0.0", 16)).await;
        let section = ipam.subnets().get_by_id(parent).await.unwrap().section_id;
        ipam.insert_subnet(Subnet {
            subnet_address: "10.1.0.0".to_string(),
            subnet_mask: 24,
            section_id: section,
            master_subnet_id: parent,
            ..Default::default()
        })
        .await;

        assert_eq!(
            ipam.subnets().first_free_subnet(parent, 24).await.unwrap(),
            Some("10.1.1.0/24".to_string())
        );
        assert_eq!(
            ipam.subnets().first_free_subnet(parent, 8).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_custom_fields_report_every_schema_key() {
        let ipam = MemoryIpam::new();
        ipam.define_custom_field(Kind::Vlan, "owner").await;
        ipam.define_custom_field(Kind::Vlan, "site").await;
        let vlan = ipam
            .insert_vlan(Vlan {
                number: 100,
                ..Default::default()
            })
            .await;

        let set = CustomFieldSet::from([("site".to_string(), Some("ams".to_string()))]);
        ipam.vlans().update_custom_fields(vlan, &set).await.unwrap();

        let fields = ipam.vlans().custom_fields(vlan).await.unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["owner"], Value::Null);
        assert_eq!(fields["site"], Value::String("ams".to_string()));
    }

    #[tokio::test]
    async fn test_update_keeps_identity_fields() {
        let ipam = MemoryIpam::new();
        let subnet = subnet_fixture(&ipam, ("192.168.0.0", 24)).await;

        let mut changed = ipam.subnets().get_by_id(subnet).await.unwrap().for_update();
        changed.description = "renamed".to_string();
        ipam.subnets().update(&changed).await.unwrap();

        let stored = ipam.subnets().get_by_id(subnet).await.unwrap();
        assert_eq!(stored.cidr(), "192.168.0.0/24");
        assert_eq!(stored.description, "renamed");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let ipam = MemoryIpam::new();
        assert!(ipam.addresses().get_by_id(42).await.unwrap_err().is_not_found());
        assert!(ipam.sections().get_by_id(42).await.unwrap_err().is_not_found());
    }
}

// # Remote phpIPAM API traits
//
// Defines the operations the provider consumes from phpIPAM, one trait per
// entity kind, plus the custom field capability shared by the kinds that
// carry custom fields.
//
// ## Implementations
//
// - HTTP: `phpipam-client` crate
// - In-memory: [`crate::memory::MemoryIpam`]
//
// ## Conventions
//
// - `get_by_id` returns `Error::NotFound` when the entity does not exist.
// - `search_*` and `list_*` return an empty `Vec` when nothing matches.
// - `create` does not echo the entity; callers re-fetch by unique field.
// - `update` never sends identity-defining fields (see `for_update` on the model).
// - Implementations do not retry.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    Address, CustomFieldSchema, CustomFieldSet, CustomFields, EntityId, Kind, L2Domain, Section,
    Subnet, Vlan,
};

/// Custom field access for one entity kind
#[async_trait]
pub trait CustomFieldCarrier: Send + Sync {
    /// Kind whose custom fields this carrier manages
    fn kind(&self) -> Kind;

    /// Fetch the custom field schema for this kind
    ///
    /// An API with no custom fields defined returns an empty schema.
    async fn custom_field_schema(&self) -> Result<CustomFieldSchema>;

    /// Fetch the current custom field values of one entity
    async fn custom_fields(&self, id: EntityId) -> Result<CustomFields>;

    /// Write custom field values; `None` clears a field
    ///
    /// Keys are sent as given. Use [`crate::custom_fields::apply`] for a
    /// schema-checked write.
    async fn update_custom_fields(&self, id: EntityId, fields: &CustomFieldSet) -> Result<()>;
}

/// Address operations
#[async_trait]
pub trait AddressApi: CustomFieldCarrier {
    async fn get_by_id(&self, id: EntityId) -> Result<Address>;

    /// All addresses with this IP, across subnets
    async fn search_by_ip(&self, ip: &str) -> Result<Vec<Address>>;

    async fn create(&self, address: &Address) -> Result<()>;

    async fn update(&self, address: &Address) -> Result<()>;

    /// Delete an address, optionally removing its DNS records too
    async fn delete(&self, id: EntityId, remove_dns: bool) -> Result<()>;
}

/// Subnet operations
#[async_trait]
pub trait SubnetApi: CustomFieldCarrier {
    async fn get_by_id(&self, id: EntityId) -> Result<Subnet>;

    /// Subnets with this CIDR, optionally restricted to one section
    async fn search_by_cidr(&self, cidr: &str, section_id: Option<EntityId>) -> Result<Vec<Subnet>>;

    /// Addresses allocated in a subnet
    async fn list_addresses(&self, id: EntityId) -> Result<Vec<Address>>;

    /// First unallocated address in a subnet, `None` when full
    async fn first_free_address(&self, id: EntityId) -> Result<Option<String>>;

    /// First unallocated child block of the given prefix length, in CIDR form
    async fn first_free_subnet(&self, id: EntityId, mask: u8) -> Result<Option<String>>;

    async fn create(&self, subnet: &Subnet) -> Result<()>;

    async fn update(&self, subnet: &Subnet) -> Result<()>;

    async fn delete(&self, id: EntityId) -> Result<()>;
}

/// Section operations
#[async_trait]
pub trait SectionApi: Send + Sync {
    async fn list(&self) -> Result<Vec<Section>>;

    async fn get_by_id(&self, id: EntityId) -> Result<Section>;

    async fn search_by_name(&self, name: &str) -> Result<Vec<Section>>;

    /// Subnets and folders in a section
    async fn list_subnets(&self, id: EntityId) -> Result<Vec<Subnet>>;

    async fn create(&self, section: &Section) -> Result<()>;

    async fn update(&self, section: &Section) -> Result<()>;

    async fn delete(&self, id: EntityId) -> Result<()>;
}

/// VLAN operations
#[async_trait]
pub trait VlanApi: CustomFieldCarrier {
    async fn get_by_id(&self, id: EntityId) -> Result<Vlan>;

    /// VLANs with this number, across L2 domains
    async fn search_by_number(&self, number: u64) -> Result<Vec<Vlan>>;

    async fn create(&self, vlan: &Vlan) -> Result<()>;

    async fn update(&self, vlan: &Vlan) -> Result<()>;

    async fn delete(&self, id: EntityId) -> Result<()>;
}

/// L2 domain operations
#[async_trait]
pub trait L2DomainApi: Send + Sync {
    async fn list(&self) -> Result<Vec<L2Domain>>;

    async fn get_by_id(&self, id: EntityId) -> Result<L2Domain>;

    async fn search_by_name(&self, name: &str) -> Result<Vec<L2Domain>>;

    async fn create(&self, domain: &L2Domain) -> Result<()>;

    async fn update(&self, domain: &L2Domain) -> Result<()>;

    async fn delete(&self, id: EntityId) -> Result<()>;
}

/// A complete phpIPAM backend, one accessor per controller
pub trait IpamBackend: Send + Sync {
    fn addresses(&self) -> &dyn AddressApi;

    fn subnets(&self) -> &dyn SubnetApi;

    fn sections(&self) -> &dyn SectionApi;

    fn vlans(&self) -> &dyn VlanApi;

    fn l2domains(&self) -> &dyn L2DomainApi;
}

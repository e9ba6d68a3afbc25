// # phpipam-core
//
// Core library for the phpIPAM infrastructure provider.
//
// ## Architecture Overview
//
// The host orchestrator drives lifecycle calls (create, read, update, delete,
// import) per resource type. This library turns those calls into phpIPAM API
// traffic:
// - **api**: per-kind traits describing the remote phpIPAM operations
// - **resolve**: turns a search query into exactly one entity, or an error
// - **custom_fields**: computes and validates custom field writes
// - **filter**: narrows a parent-scoped listing down to matching entities
// - **alloc**: serializes "find first free slot" with the create that claims it
// - **resources**: lifecycle handlers per resource type and data source
// - **registry**: maps resource type names to handlers
// - **memory**: in-memory phpIPAM backend used by tests
//
// ## Design Principles
//
// 1. **Library-First**: the binary only wires configuration, logging and I/O
// 2. **Exactness**: singular lookups never pick one of several candidates
// 3. **Schema-Bound Writes**: custom field updates are validated before sending
// 4. **Plugin-Based**: resource types are registered by name, no if-else chains

pub mod alloc;
pub mod api;
pub mod config;
pub mod custom_fields;
pub mod error;
pub mod filter;
pub mod memory;
pub mod model;
pub mod registry;
pub mod resolve;
pub mod resources;

// Re-export core types for convenience
pub use alloc::AllocationLocks;
pub use api::{
    AddressApi, CustomFieldCarrier, IpamBackend, L2DomainApi, SectionApi, SubnetApi, VlanApi,
};
pub use config::ProviderConfig;
pub use error::{Error, Result};
pub use memory::MemoryIpam;
pub use model::{Address, EntityId, Kind, L2Domain, Section, Subnet, Vlan};
pub use registry::{DataSourceHandler, Operation, ResourceHandler, ResourceRegistry};

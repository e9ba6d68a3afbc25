// # Resource Handlers
//
// One handler per host-facing resource type and data source. Each handler
// decodes the host attribute map into a typed struct, drives the resolver,
// the allocator and the custom field reconciler, and encodes the resulting
// state back.
//
// ## Lifecycle
//
// - **create**: create remotely, re-fetch by the unique field (exactly one
//   result required), write custom fields, then read the full state
// - **read**: resolve through the search precedence; absence is `None`
// - **update**: send the entity with its identity fields cleared, then
//   reconcile custom fields
// - **delete**: delete by id
// - **import**: read by the given identity; not found is an error

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::alloc::AllocationLocks;
use crate::api::IpamBackend;
use crate::error::{Error, Result};
use crate::model::{CustomFieldSet, EntityId};
use crate::registry::ResourceRegistry;

pub mod address;
pub mod l2domain;
pub mod section;
pub mod subnet;
pub mod vlan;

/// Register every resource type and data source against one backend
pub fn register(registry: &ResourceRegistry, backend: Arc<dyn IpamBackend>, locks: AllocationLocks) {
    registry.register_resource(
        "phpipam_address",
        Arc::new(address::AddressResource::new(backend.clone(), locks.clone())),
    );
    registry.register_resource(
        "phpipam_first_free_address",
        Arc::new(address::AddressResource::first_free(backend.clone(), locks.clone())),
    );
    registry.register_resource(
        "phpipam_subnet",
        Arc::new(subnet::SubnetResource::new(backend.clone(), locks.clone())),
    );
    registry.register_resource(
        "phpipam_first_free_subnet",
        Arc::new(subnet::SubnetResource::first_free(backend.clone(), locks)),
    );
    registry.register_resource(
        "phpipam_section",
        Arc::new(section::SectionResource::new(backend.clone())),
    );
    registry.register_resource("phpipam_vlan", Arc::new(vlan::VlanResource::new(backend.clone())));
    registry.register_resource(
        "phpipam_l2domain",
        Arc::new(l2domain::L2DomainResource::new(backend.clone())),
    );

    registry.register_data_source(
        "phpipam_address",
        Arc::new(address::AddressDataSource::new(backend.clone())),
    );
    registry.register_data_source(
        "phpipam_addresses",
        Arc::new(address::AddressesDataSource::new(backend.clone())),
    );
    registry.register_data_source(
        "phpipam_first_free_address",
        Arc::new(address::FirstFreeAddressDataSource::new(backend.clone())),
    );
    registry.register_data_source(
        "phpipam_subnet",
        Arc::new(subnet::SubnetDataSource::new(backend.clone())),
    );
    registry.register_data_source(
        "phpipam_subnets",
        Arc::new(subnet::SubnetsDataSource::new(backend.clone())),
    );
    registry.register_data_source(
        "phpipam_first_free_subnet",
        Arc::new(subnet::FirstFreeSubnetDataSource::new(backend.clone())),
    );
    registry.register_data_source(
        "phpipam_section",
        Arc::new(section::SectionDataSource::new(backend.clone())),
    );
    registry.register_data_source("phpipam_vlan", Arc::new(vlan::VlanDataSource::new(backend.clone())));
    registry.register_data_source(
        "phpipam_l2domain",
        Arc::new(l2domain::L2DomainDataSource::new(backend)),
    );
}

/// Decode a host attribute map
pub(crate) fn decode<T: DeserializeOwned>(attrs: Value) -> Result<T> {
    serde_json::from_value(attrs)
        .map_err(|e| Error::invalid_argument(format!("invalid attributes: {}", e)))
}

/// Encode typed state as a host attribute map
pub(crate) fn encode<T: Serialize>(state: &T) -> Result<Value> {
    Ok(serde_json::to_value(state)?)
}

/// Identity of an existing entity: the explicit id attribute, else the host id
pub(crate) fn existing_id(explicit: EntityId, prior: Option<&str>, attr: &str) -> Result<EntityId> {
    if explicit != 0 {
        return Ok(explicit);
    }
    match prior {
        Some(raw) => raw
            .parse()
            .map_err(|_| Error::invalid_argument(format!("invalid resource id {:?}", raw))),
        None => Err(Error::invalid_argument(format!("{} is required", attr))),
    }
}

/// Visible custom fields as host state
pub(crate) fn custom_field_state(visible: std::collections::BTreeMap<String, String>) -> CustomFieldSet {
    visible.into_iter().map(|(k, v)| (k, Some(v))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryIpam;

    #[test]
    fn test_register_all_types() {
        let registry = ResourceRegistry::new();
        register(&registry, Arc::new(MemoryIpam::new()), AllocationLocks::new());

        assert_eq!(
            registry.list_resources(),
            vec![
                "phpipam_address",
                "phpipam_first_free_address",
                "phpipam_first_free_subnet",
                "phpipam_l2domain",
                "phpipam_section",
                "phpipam_subnet",
                "phpipam_vlan",
            ]
        );
        assert_eq!(registry.list_data_sources().len(), 9);
        assert!(registry.has_data_source("phpipam_subnets"));
    }

    #[test]
    fn test_existing_id() {
        assert_eq!(existing_id(4, Some("9"), "address_id").unwrap(), 4);
        assert_eq!(existing_id(0, Some("9"), "address_id").unwrap(), 9);
        assert!(existing_id(0, None, "address_id").is_err());
        assert!(existing_id(0, Some("x"), "address_id").is_err());
    }
}

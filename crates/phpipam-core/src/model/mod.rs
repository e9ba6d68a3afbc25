//! Typed phpIPAM entities
//!
//! Field names follow the provider's attribute names; serde renames map them
//! to the phpIPAM wire names and [`wire`] handles the string encoding.

pub mod wire;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Server-assigned entity id, `0` before creation
pub type EntityId = u64;

/// Custom field schema for one kind, keyed by field name
pub type CustomFieldSchema = BTreeMap<String, CustomFieldMeta>;

/// Raw custom field values as returned by the remote service
pub type CustomFields = BTreeMap<String, serde_json::Value>;

/// Custom field write set; `None` clears the field remotely
pub type CustomFieldSet = BTreeMap<String, Option<String>>;

/// Entity kinds managed by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Address,
    Subnet,
    Section,
    Vlan,
    L2Domain,
}

impl Kind {
    /// phpIPAM controller path segment for this kind
    pub fn controller(&self) -> &'static str {
        match self {
            Kind::Address => "addresses",
            Kind::Subnet => "subnets",
            Kind::Section => "sections",
            Kind::Vlan => "vlans",
            Kind::L2Domain => "l2domains",
        }
    }

    /// Whether a by-id read that finds nothing yields absence instead of an error
    ///
    /// Addresses and sections are often removed out-of-band; reporting them
    /// as gone lets the host plan a re-create.
    pub fn tolerates_missing(&self) -> bool {
        matches!(self, Kind::Address | Kind::Section)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.controller())
    }
}

/// Common accessors for all entity types
pub trait Entity: Clone + Send + Sync + 'static {
    /// Kind of this entity
    const KIND: Kind;

    /// Server-assigned id
    fn id(&self) -> EntityId;
}

/// Metadata of one custom field as reported by `/{controller}/custom_fields/`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldMeta {
    #[serde(default, deserialize_with = "wire::string")]
    pub name: String,

    /// MySQL column type, e.g. `varchar(255)`
    #[serde(rename = "type", default, deserialize_with = "wire::string")]
    pub field_type: String,

    #[serde(rename = "Comment", default, deserialize_with = "wire::string")]
    pub comment: String,

    /// `"YES"` or `"NO"`
    #[serde(rename = "Null", default, deserialize_with = "wire::string")]
    pub null: String,

    #[serde(rename = "Default", default, deserialize_with = "wire::string")]
    pub default: String,
}

/// An IP address record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub id: EntityId,

    #[serde(rename = "subnetId", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub subnet_id: EntityId,

    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub ip: String,

    #[serde(default, with = "wire::boolean", skip_serializing_if = "wire::is_false")]
    pub is_gateway: bool,

    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub hostname: String,

    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub mac: String,

    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub owner: String,

    /// Address state tag id
    #[serde(default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub tag: u64,

    #[serde(rename = "PTRignore", default, with = "wire::boolean", skip_serializing_if = "wire::is_false")]
    pub ptr_ignore: bool,

    #[serde(rename = "PTR", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub ptr_record_id: u64,

    #[serde(rename = "deviceId", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub device_id: u64,

    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub port: String,

    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub note: String,

    #[serde(rename = "lastSeen", default, deserialize_with = "wire::string", skip_serializing)]
    pub last_seen: String,

    #[serde(rename = "excludePing", default, with = "wire::boolean", skip_serializing_if = "wire::is_false")]
    pub exclude_ping: bool,

    #[serde(rename = "editDate", default, deserialize_with = "wire::string", skip_serializing)]
    pub edit_date: String,
}

impl Address {
    /// Copy suitable for an update request: the ip and subnet are fixed at creation
    pub fn for_update(&self) -> Self {
        Self {
            ip: String::new(),
            subnet_id: 0,
            ..self.clone()
        }
    }
}

impl Entity for Address {
    const KIND: Kind = Kind::Address;

    fn id(&self) -> EntityId {
        self.id
    }
}

/// A subnet or folder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subnet {
    #[serde(default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub id: EntityId,

    /// Network address, e.g. `10.10.1.0`
    #[serde(rename = "subnet", default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub subnet_address: String,

    /// Prefix length
    #[serde(rename = "mask", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub subnet_mask: u64,

    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(rename = "sectionId", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub section_id: EntityId,

    #[serde(rename = "linked_subnet", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub linked_subnet_id: EntityId,

    #[serde(rename = "vlanId", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub vlan_id: EntityId,

    #[serde(rename = "vrfId", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub vrf_id: EntityId,

    #[serde(rename = "masterSubnetId", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub master_subnet_id: EntityId,

    #[serde(rename = "nameserverId", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub nameserver_id: EntityId,

    #[serde(rename = "showName", default, with = "wire::boolean", skip_serializing_if = "wire::is_false")]
    pub show_name: bool,

    /// Stringified JSON permission map
    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub permissions: String,

    #[serde(rename = "DNSrecursive", default, with = "wire::boolean", skip_serializing_if = "wire::is_false")]
    pub create_ptr_records: bool,

    #[serde(rename = "DNSrecords", default, with = "wire::boolean", skip_serializing_if = "wire::is_false")]
    pub display_hostnames: bool,

    #[serde(rename = "allowRequests", default, with = "wire::boolean", skip_serializing_if = "wire::is_false")]
    pub allow_ip_requests: bool,

    #[serde(rename = "scanAgent", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub scan_agent_id: EntityId,

    #[serde(rename = "pingSubnet", default, with = "wire::boolean", skip_serializing_if = "wire::is_false")]
    pub include_in_ping: bool,

    #[serde(rename = "discoverSubnet", default, with = "wire::boolean", skip_serializing_if = "wire::is_false")]
    pub host_discovery_enabled: bool,

    #[serde(rename = "isFolder", default, with = "wire::boolean", skip_serializing_if = "wire::is_false")]
    pub is_folder: bool,

    #[serde(rename = "isFull", default, with = "wire::boolean", skip_serializing_if = "wire::is_false")]
    pub is_full: bool,

    #[serde(rename = "threshold", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub utilization_threshold: u64,

    #[serde(rename = "location", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub location_id: EntityId,

    #[serde(rename = "editDate", default, deserialize_with = "wire::string", skip_serializing)]
    pub edit_date: String,

    #[serde(rename = "gatewayId", default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub gateway_id: String,
}

impl Subnet {
    /// Copy suitable for an update request: address and mask are fixed at creation
    pub fn for_update(&self) -> Self {
        Self {
            subnet_address: String::new(),
            subnet_mask: 0,
            ..self.clone()
        }
    }

    /// CIDR notation of this subnet
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.subnet_address, self.subnet_mask)
    }
}

impl Entity for Subnet {
    const KIND: Kind = Kind::Subnet;

    fn id(&self) -> EntityId {
        self.id
    }
}

/// A top-level section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub id: EntityId,

    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(rename = "masterSection", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub master_section_id: EntityId,

    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub permissions: String,

    #[serde(rename = "strictMode", default, with = "wire::boolean", skip_serializing_if = "wire::is_false")]
    pub strict_mode: bool,

    #[serde(rename = "subnetOrdering", default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub subnet_ordering: String,

    #[serde(rename = "order", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub display_order: u64,

    #[serde(rename = "editDate", default, deserialize_with = "wire::string", skip_serializing)]
    pub edit_date: String,

    #[serde(rename = "showVLAN", default, with = "wire::boolean", skip_serializing_if = "wire::is_false")]
    pub show_vlan_in_subnet_listing: bool,

    #[serde(rename = "showVRF", default, with = "wire::boolean", skip_serializing_if = "wire::is_false")]
    pub show_vrf_in_subnet_listing: bool,

    #[serde(rename = "showSupernetOnly", default, with = "wire::boolean", skip_serializing_if = "wire::is_false")]
    pub show_supernet_only: bool,

    #[serde(rename = "DNS", default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub dns_resolver_id: String,
}

impl Entity for Section {
    const KIND: Kind = Kind::Section;

    fn id(&self) -> EntityId {
        self.id
    }
}

/// A VLAN
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vlan {
    #[serde(alias = "vlanId", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub id: EntityId,

    #[serde(rename = "domainId", default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub l2_domain_id: EntityId,

    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub number: u64,

    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(rename = "editDate", default, deserialize_with = "wire::string", skip_serializing)]
    pub edit_date: String,
}

impl Entity for Vlan {
    const KIND: Kind = Kind::Vlan;

    fn id(&self) -> EntityId {
        self.id
    }
}

/// A layer 2 domain grouping VLANs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct L2Domain {
    #[serde(default, with = "wire::int", skip_serializing_if = "wire::is_zero")]
    pub id: EntityId,

    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Semicolon-separated section ids the domain is visible in
    #[serde(default, deserialize_with = "wire::string", skip_serializing_if = "String::is_empty")]
    pub sections: String,
}

impl Entity for L2Domain {
    const KIND: Kind = Kind::L2Domain;

    fn id(&self) -> EntityId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_address_decodes_wire_strings() {
        let raw = serde_json::json!({
            "id": "11",
            "subnetId": "3",
            "ip": "10.10.1.5",
            "is_gateway": "1",
            "description": "web",
            "hostname": null,
            "tag": "2",
            "PTRignore": "0",
            "PTR": "0",
            "deviceId": null,
            "excludePing": "",
            "editDate": "2024-01-01 10:00:00"
        });
        let address: Address = serde_json::from_value(raw).unwrap();
        assert_eq!(address.id, 11);
        assert_eq!(address.subnet_id, 3);
        assert!(address.is_gateway);
        assert_eq!(address.hostname, "");
        assert_eq!(address.tag, 2);
        assert_eq!(address.device_id, 0);
        assert!(!address.exclude_ping);
        assert_eq!(address.edit_date, "2024-01-01 10:00:00");
    }

    #[test]
    fn test_address_for_update_drops_identity_fields() {
        let address = Address {
            id: 4,
            subnet_id: 3,
            ip: "10.0.0.4".to_string(),
            description: "db".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(address.for_update()).unwrap();
        assert_eq!(json, serde_json::json!({"id": "4", "description": "db"}));
    }

    #[test]
    fn test_subnet_for_update_drops_cidr() {
        let subnet = Subnet {
            id: 9,
            subnet_address: "10.0.0.0".to_string(),
            subnet_mask: 24,
            section_id: 1,
            ..Default::default()
        };
        assert_eq!(subnet.cidr(), "10.0.0.0/24");
        let json = serde_json::to_value(subnet.for_update()).unwrap();
        assert_eq!(json, serde_json::json!({"id": "9", "sectionId": "1"}));
    }

    #[test]
    fn test_vlan_accepts_both_id_spellings() {
        let a: Vlan = serde_json::from_value(serde_json::json!({"vlanId": "5", "number": "100"})).unwrap();
        let b: Vlan = serde_json::from_value(serde_json::json!({"id": "5", "number": "100"})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.number, 100);
    }

    #[test]
    fn test_kind_drift_tolerance() {
        assert!(Kind::Address.tolerates_missing());
        assert!(Kind::Section.tolerates_missing());
        assert!(!Kind::Subnet.tolerates_missing());
        assert!(!Kind::Vlan.tolerates_missing());
        assert!(!Kind::L2Domain.tolerates_missing());
    }
}

//! One type per phpIPAM controller, each implementing its core API trait
//!
//! | Kind      | Controller     | Custom fields |
//! |-----------|----------------|---------------|
//! | Address   | `/addresses/`  | yes           |
//! | Subnet    | `/subnets/`    | yes           |
//! | Section   | `/sections/`   | no            |
//! | Vlan      | `/vlans/`      | yes           |
//! | L2Domain  | `/l2domains/`  | no            |

use std::sync::Arc;

use async_trait::async_trait;
use phpipam_core::alloc::split_cidr;
use phpipam_core::api::{
    AddressApi, CustomFieldCarrier, L2DomainApi, SectionApi, SubnetApi, VlanApi,
};
use phpipam_core::model::{
    Address, CustomFieldSchema, CustomFieldSet, CustomFields, EntityId, Kind, L2Domain, Section,
    Subnet, Vlan,
};
use phpipam_core::{Error, Result};
use reqwest::Method;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::session::Session;

/// Message returned when a controller declares no custom fields
const NO_CUSTOM_FIELDS: &str = "No custom fields defined";

async fn schema(session: &Session, kind: Kind) -> Result<CustomFieldSchema> {
    let url = session.url(&[kind.controller(), "custom_fields"])?;
    match session.send(Method::GET, url, None).await {
        Ok(None) | Ok(Some(Value::Null)) => Ok(CustomFieldSchema::new()),
        Ok(Some(data)) => Ok(serde_json::from_value(data)?),
        Err(Error::Api { message, .. }) if message.contains(NO_CUSTOM_FIELDS) => {
            Ok(CustomFieldSchema::new())
        }
        Err(e) if e.is_not_found() => Ok(CustomFieldSchema::new()),
        Err(e) => Err(e),
    }
}

/// Custom field values are returned inline with the entity; keep only schema keys
async fn field_values(session: &Session, kind: Kind, id: EntityId) -> Result<CustomFields> {
    let schema = schema(session, kind).await?;
    if schema.is_empty() {
        return Ok(CustomFields::new());
    }

    let url = session.url(&[kind.controller(), &id.to_string()])?;
    let raw: Map<String, Value> = session.call(Method::GET, url, None).await?;
    Ok(raw
        .into_iter()
        .filter(|(key, _)| schema.contains_key(key))
        .collect())
}

fn field_patch(id: EntityId, fields: &CustomFieldSet) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("id".to_string(), Value::String(id.to_string()));
    for (key, value) in fields {
        let value = value.clone().map(Value::String).unwrap_or(Value::Null);
        body.insert(key.clone(), value);
    }
    body
}

async fn patch_fields(session: &Session, kind: Kind, body: Map<String, Value>) -> Result<()> {
    debug!("Updating {} custom fields on {}", body.len() - 1, kind);
    let url = session.url(&[kind.controller()])?;
    session
        .execute(Method::PATCH, url, Some(&Value::Object(body)))
        .await
}

fn body_of<T: serde::Serialize>(entity: &T) -> Result<Value> {
    Ok(serde_json::to_value(entity)?)
}

/// `/addresses/` controller
#[derive(Debug, Clone)]
pub struct AddressController(pub(crate) Arc<Session>);

#[async_trait]
impl CustomFieldCarrier for AddressController {
    fn kind(&self) -> Kind {
        Kind::Address
    }

    async fn custom_field_schema(&self) -> Result<CustomFieldSchema> {
        schema(&self.0, Kind::Address).await
    }

    async fn custom_fields(&self, id: EntityId) -> Result<CustomFields> {
        field_values(&self.0, Kind::Address, id).await
    }

    async fn update_custom_fields(&self, id: EntityId, fields: &CustomFieldSet) -> Result<()> {
        patch_fields(&self.0, Kind::Address, field_patch(id, fields)).await
    }
}

#[async_trait]
impl AddressApi for AddressController {
    async fn get_by_id(&self, id: EntityId) -> Result<Address> {
        let url = self.0.url(&["addresses", &id.to_string()])?;
        self.0.call(Method::GET, url, None).await
    }

    async fn search_by_ip(&self, ip: &str) -> Result<Vec<Address>> {
        let url = self.0.url(&["addresses", "search", ip])?;
        self.0.search(url).await
    }

    async fn create(&self, address: &Address) -> Result<()> {
        let url = self.0.url(&["addresses"])?;
        self.0.execute(Method::POST, url, Some(&body_of(address)?)).await
    }

    async fn update(&self, address: &Address) -> Result<()> {
        let url = self.0.url(&["addresses"])?;
        self.0.execute(Method::PATCH, url, Some(&body_of(address)?)).await
    }

    async fn delete(&self, id: EntityId, remove_dns: bool) -> Result<()> {
        let url = self.0.url(&["addresses", &id.to_string()])?;
        let body = remove_dns.then(|| json!({"remove_dns": "1"}));
        self.0.execute(Method::DELETE, url, body.as_ref()).await
    }
}

/// `/subnets/` controller
#[derive(Debug, Clone)]
pub struct SubnetController(pub(crate) Arc<Session>);

#[async_trait]
impl CustomFieldCarrier for SubnetController {
    fn kind(&self) -> Kind {
        Kind::Subnet
    }

    async fn custom_field_schema(&self) -> Result<CustomFieldSchema> {
        schema(&self.0, Kind::Subnet).await
    }

    async fn custom_fields(&self, id: EntityId) -> Result<CustomFields> {
        field_values(&self.0, Kind::Subnet, id).await
    }

    async fn update_custom_fields(&self, id: EntityId, fields: &CustomFieldSet) -> Result<()> {
        patch_fields(&self.0, Kind::Subnet, field_patch(id, fields)).await
    }
}

#[async_trait]
impl SubnetApi for SubnetController {
    async fn get_by_id(&self, id: EntityId) -> Result<Subnet> {
        let url = self.0.url(&["subnets", &id.to_string()])?;
        self.0.call(Method::GET, url, None).await
    }

    async fn search_by_cidr(&self, cidr: &str, section_id: Option<EntityId>) -> Result<Vec<Subnet>> {
        let (address, mask) = split_cidr(cidr)?;
        let mask = mask.to_string();
        let segments = ["subnets", "cidr", address, mask.as_str()];
        let url = match section_id {
            Some(section) => self
                .0
                .filtered_url(&segments, "sectionId", &section.to_string())?,
            None => self.0.url(&segments)?,
        };
        self.0.search(url).await
    }

    async fn list_addresses(&self, id: EntityId) -> Result<Vec<Address>> {
        let url = self.0.url(&["subnets", &id.to_string(), "addresses"])?;
        self.0.search(url).await
    }

    async fn first_free_address(&self, id: EntityId) -> Result<Option<String>> {
        let url = self.0.url(&["subnets", &id.to_string(), "first_free"])?;
        free_slot(&self.0, url).await
    }

    async fn first_free_subnet(&self, id: EntityId, mask: u8) -> Result<Option<String>> {
        let url = self
            .0
            .url(&["subnets", &id.to_string(), "first_subnet", &mask.to_string()])?;
        free_slot(&self.0, url).await
    }

    async fn create(&self, subnet: &Subnet) -> Result<()> {
        let url = self.0.url(&["subnets"])?;
        self.0.execute(Method::POST, url, Some(&body_of(subnet)?)).await
    }

    async fn update(&self, subnet: &Subnet) -> Result<()> {
        let url = self.0.url(&["subnets"])?;
        self.0.execute(Method::PATCH, url, Some(&body_of(subnet)?)).await
    }

    async fn delete(&self, id: EntityId) -> Result<()> {
        let url = self.0.url(&["subnets", &id.to_string()])?;
        self.0.execute(Method::DELETE, url, None).await
    }
}

/// Free-slot endpoints answer with a bare string, or not-found when full
async fn free_slot(session: &Session, url: reqwest::Url) -> Result<Option<String>> {
    match session.send(Method::GET, url, None).await {
        Ok(Some(Value::String(slot))) if !slot.is_empty() => Ok(Some(slot)),
        Ok(_) => Ok(None),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// `/sections/` controller
#[derive(Debug, Clone)]
pub struct SectionController(pub(crate) Arc<Session>);

#[async_trait]
impl SectionApi for SectionController {
    async fn list(&self) -> Result<Vec<Section>> {
        let url = self.0.url(&["sections"])?;
        self.0.search(url).await
    }

    async fn get_by_id(&self, id: EntityId) -> Result<Section> {
        let url = self.0.url(&["sections", &id.to_string()])?;
        self.0.call(Method::GET, url, None).await
    }

    async fn search_by_name(&self, name: &str) -> Result<Vec<Section>> {
        // The name endpoint returns one object rather than a list
        let url = self.0.url(&["sections", name])?;
        match self.0.call::<Section>(Method::GET, url, None).await {
            Ok(section) => Ok(vec![section]),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn list_subnets(&self, id: EntityId) -> Result<Vec<Subnet>> {
        let url = self.0.url(&["sections", &id.to_string(), "subnets"])?;
        self.0.search(url).await
    }

    async fn create(&self, section: &Section) -> Result<()> {
        let url = self.0.url(&["sections"])?;
        self.0.execute(Method::POST, url, Some(&body_of(section)?)).await
    }

    async fn update(&self, section: &Section) -> Result<()> {
        let url = self.0.url(&["sections"])?;
        self.0.execute(Method::PATCH, url, Some(&body_of(section)?)).await
    }

    async fn delete(&self, id: EntityId) -> Result<()> {
        let url = self.0.url(&["sections", &id.to_string()])?;
        self.0.execute(Method::DELETE, url, None).await
    }
}

/// `/vlans/` controller
#[derive(Debug, Clone)]
pub struct VlanController(pub(crate) Arc<Session>);

#[async_trait]
impl CustomFieldCarrier for VlanController {
    fn kind(&self) -> Kind {
        Kind::Vlan
    }

    async fn custom_field_schema(&self) -> Result<CustomFieldSchema> {
        schema(&self.0, Kind::Vlan).await
    }

    async fn custom_fields(&self, id: EntityId) -> Result<CustomFields> {
        field_values(&self.0, Kind::Vlan, id).await
    }

    async fn update_custom_fields(&self, id: EntityId, fields: &CustomFieldSet) -> Result<()> {
        // phpIPAM rejects a VLAN patch without its name
        let vlan = self.get_by_id(id).await?;
        let mut body = field_patch(id, fields);
        body.insert("name".to_string(), Value::String(vlan.name));
        patch_fields(&self.0, Kind::Vlan, body).await
    }
}

#[async_trait]
impl VlanApi for VlanController {
    async fn get_by_id(&self, id: EntityId) -> Result<Vlan> {
        let url = self.0.url(&["vlans", &id.to_string()])?;
        self.0.call(Method::GET, url, None).await
    }

    async fn search_by_number(&self, number: u64) -> Result<Vec<Vlan>> {
        let url = self.0.url(&["vlans", "search", &number.to_string()])?;
        self.0.search(url).await
    }

    async fn create(&self, vlan: &Vlan) -> Result<()> {
        let url = self.0.url(&["vlans"])?;
        self.0.execute(Method::POST, url, Some(&body_of(vlan)?)).await
    }

    async fn update(&self, vlan: &Vlan) -> Result<()> {
        let url = self.0.url(&["vlans"])?;
        self.0.execute(Method::PATCH, url, Some(&body_of(vlan)?)).await
    }

    async fn delete(&self, id: EntityId) -> Result<()> {
        let url = self.0.url(&["vlans", &id.to_string()])?;
        self.0.execute(Method::DELETE, url, None).await
    }
}

/// `/l2domains/` controller
#[derive(Debug, Clone)]
pub struct L2DomainController(pub(crate) Arc<Session>);

#[async_trait]
impl L2DomainApi for L2DomainController {
    async fn list(&self) -> Result<Vec<L2Domain>> {
        let url = self.0.url(&["l2domains"])?;
        self.0.search(url).await
    }

    async fn get_by_id(&self, id: EntityId) -> Result<L2Domain> {
        let url = self.0.url(&["l2domains", &id.to_string()])?;
        self.0.call(Method::GET, url, None).await
    }

    async fn search_by_name(&self, name: &str) -> Result<Vec<L2Domain>> {
        let url = self.0.filtered_url(&["l2domains"], "name", name)?;
        self.0.search(url).await
    }

    async fn create(&self, domain: &L2Domain) -> Result<()> {
        let url = self.0.url(&["l2domains"])?;
        self.0.execute(Method::POST, url, Some(&body_of(domain)?)).await
    }

    async fn update(&self, domain: &L2Domain) -> Result<()> {
        let url = self.0.url(&["l2domains"])?;
        self.0.execute(Method::PATCH, url, Some(&body_of(domain)?)).await
    }

    async fn delete(&self, id: EntityId) -> Result<()> {
        let url = self.0.url(&["l2domains", &id.to_string()])?;
        self.0.execute(Method::DELETE, url, None).await
    }
}

// # Entity Resolver
//
// Turns a lookup query into exactly one entity.
//
// ## Precedence
//
// Each query type selects a single criterion, checked in this order:
// 1. by id
// 2. by unique field (address IP, subnet CIDR, section name, VLAN number, L2 domain name)
// 3. by parent scope plus a filter (addresses in a subnet, subnets in a section)
// 4. by a previously known identity (import)
//
// The first populated criterion is authoritative. If it finds nothing the
// lookup fails; it never falls through to a lower criterion.
//
// ## Missing entities
//
// A by-id lookup that finds nothing yields `Ok(None)` for kinds that
// tolerate out-of-band deletion (addresses, sections) and an error for the
// rest. Unique-field and scope lookups require exactly one candidate.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use crate::api::IpamBackend;
use crate::error::{Error, Result};
use crate::filter::{self, FilterField, ScopeFilter};
use crate::model::{wire, Address, EntityId, Kind, L2Domain, Section, Subnet, Vlan};

/// Address lookup inputs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressQuery {
    #[serde(default)]
    pub address_id: EntityId,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub subnet_id: EntityId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub custom_field_filter: BTreeMap<String, String>,
    /// Identity recorded by the host, e.g. after import
    #[serde(default, rename = "id", deserialize_with = "wire::identity")]
    pub prior_id: Option<String>,
}

/// Selected address lookup strategy
#[derive(Debug, Clone)]
pub enum AddressCriteria {
    ById(EntityId),
    ByIp(String),
    InSubnet { subnet_id: EntityId, filter: ScopeFilter },
    Import(EntityId),
}

impl AddressQuery {
    /// Pick the authoritative criterion and compile its expressions
    pub fn criteria(&self) -> Result<AddressCriteria> {
        if self.address_id != 0 {
            return Ok(AddressCriteria::ById(self.address_id));
        }
        if !self.ip_address.is_empty() {
            return Ok(AddressCriteria::ByIp(self.ip_address.clone()));
        }
        if self.subnet_id != 0
            && let Some(filter) = self.scope_filter()?
        {
            return Ok(AddressCriteria::InSubnet {
                subnet_id: self.subnet_id,
                filter,
            });
        }
        if let Some(id) = import_id(self.prior_id.as_deref())? {
            return Ok(AddressCriteria::Import(id));
        }
        Err(Error::invalid_argument(
            "no valid combination of search parameters found: need one of address_id, ip_address, \
             or subnet_id and (description|hostname|custom_field_filter)",
        ))
    }

    /// Filter for a subnet-scoped search: description, then hostname, then custom fields
    pub fn scope_filter(&self) -> Result<Option<ScopeFilter>> {
        if !self.description.is_empty() {
            return Ok(Some(ScopeFilter::Exact {
                field: FilterField::Description,
                value: self.description.clone(),
            }));
        }
        if !self.hostname.is_empty() {
            return Ok(Some(ScopeFilter::Exact {
                field: FilterField::Hostname,
                value: self.hostname.clone(),
            }));
        }
        if !self.custom_field_filter.is_empty() {
            return Ok(Some(ScopeFilter::CustomFields(filter::compile_custom_filter(
                &self.custom_field_filter,
            )?)));
        }
        Ok(None)
    }
}

/// Subnet lookup inputs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubnetQuery {
    #[serde(default)]
    pub subnet_id: EntityId,
    #[serde(default)]
    pub subnet_address: String,
    #[serde(default)]
    pub subnet_mask: u8,
    #[serde(default)]
    pub section_id: EntityId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub description_match: String,
    #[serde(default)]
    pub custom_field_filter: BTreeMap<String, String>,
    #[serde(default, rename = "id", deserialize_with = "wire::identity")]
    pub prior_id: Option<String>,
}

/// Selected subnet lookup strategy
#[derive(Debug, Clone)]
pub enum SubnetCriteria {
    ById(EntityId),
    ByCidr { cidr: String, section_id: Option<EntityId> },
    InSection { section_id: EntityId, filter: ScopeFilter },
    Import(EntityId),
}

impl SubnetQuery {
    pub fn criteria(&self) -> Result<SubnetCriteria> {
        if self.subnet_id != 0 {
            return Ok(SubnetCriteria::ById(self.subnet_id));
        }
        if !self.subnet_address.is_empty() && self.subnet_mask != 0 {
            return Ok(SubnetCriteria::ByCidr {
                cidr: format!("{}/{}", self.subnet_address, self.subnet_mask),
                section_id: (self.section_id != 0).then_some(self.section_id),
            });
        }
        if self.section_id != 0
            && let Some(filter) = self.scope_filter()?
        {
            return Ok(SubnetCriteria::InSection {
                section_id: self.section_id,
                filter,
            });
        }
        if let Some(id) = import_id(self.prior_id.as_deref())? {
            return Ok(SubnetCriteria::Import(id));
        }
        Err(Error::invalid_argument(
            "no valid combination of search parameters found: need one of subnet_id, \
             subnet_address and subnet_mask, or section_id and \
             (description|description_match|custom_field_filter)",
        ))
    }

    /// Filter for a section-scoped search: expression, then description, then custom fields
    pub fn scope_filter(&self) -> Result<Option<ScopeFilter>> {
        if !self.description_match.is_empty() {
            return Ok(Some(ScopeFilter::Matches {
                field: FilterField::Description,
                regex: filter::compile(&self.description_match)?,
            }));
        }
        if !self.description.is_empty() {
            return Ok(Some(ScopeFilter::Exact {
                field: FilterField::Description,
                value: self.description.clone(),
            }));
        }
        if !self.custom_field_filter.is_empty() {
            return Ok(Some(ScopeFilter::CustomFields(filter::compile_custom_filter(
                &self.custom_field_filter,
            )?)));
        }
        Ok(None)
    }
}

/// Section lookup inputs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SectionQuery {
    #[serde(default)]
    pub section_id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "id", deserialize_with = "wire::identity")]
    pub prior_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionCriteria {
    ById(EntityId),
    ByName(String),
    Import(EntityId),
}

impl SectionQuery {
    pub fn criteria(&self) -> Result<SectionCriteria> {
        if self.section_id != 0 {
            return Ok(SectionCriteria::ById(self.section_id));
        }
        if !self.name.is_empty() {
            return Ok(SectionCriteria::ByName(self.name.clone()));
        }
        if let Some(id) = import_id(self.prior_id.as_deref())? {
            return Ok(SectionCriteria::Import(id));
        }
        Err(Error::invalid_argument(
            "no valid combination of search parameters found: need one of section_id or name",
        ))
    }
}

/// VLAN lookup inputs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VlanQuery {
    #[serde(default)]
    pub vlan_id: EntityId,
    #[serde(default)]
    pub number: u64,
    #[serde(default)]
    pub l2_domain_id: EntityId,
    #[serde(default, rename = "id", deserialize_with = "wire::identity")]
    pub prior_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VlanCriteria {
    ById(EntityId),
    ByNumber { number: u64, l2_domain_id: Option<EntityId> },
    Import(EntityId),
}

impl VlanQuery {
    pub fn criteria(&self) -> Result<VlanCriteria> {
        if self.vlan_id != 0 {
            return Ok(VlanCriteria::ById(self.vlan_id));
        }
        if self.number != 0 {
            return Ok(VlanCriteria::ByNumber {
                number: self.number,
                l2_domain_id: (self.l2_domain_id != 0).then_some(self.l2_domain_id),
            });
        }
        if let Some(id) = import_id(self.prior_id.as_deref())? {
            return Ok(VlanCriteria::Import(id));
        }
        Err(Error::invalid_argument(
            "no valid combination of search parameters found: need one of vlan_id or number",
        ))
    }
}

/// L2 domain lookup inputs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct L2DomainQuery {
    #[serde(default)]
    pub domain_id: EntityId,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "id", deserialize_with = "wire::identity")]
    pub prior_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum L2DomainCriteria {
    ById(EntityId),
    ByName(String),
    Import(EntityId),
}

impl L2DomainQuery {
    pub fn criteria(&self) -> Result<L2DomainCriteria> {
        if self.domain_id != 0 {
            return Ok(L2DomainCriteria::ById(self.domain_id));
        }
        if !self.name.is_empty() {
            return Ok(L2DomainCriteria::ByName(self.name.clone()));
        }
        if let Some(id) = import_id(self.prior_id.as_deref())? {
            return Ok(L2DomainCriteria::Import(id));
        }
        Err(Error::invalid_argument(
            "no valid combination of search parameters found: need one of domain_id or name",
        ))
    }
}

/// Resolve one address
pub async fn resolve_address(backend: &dyn IpamBackend, query: &AddressQuery) -> Result<Option<Address>> {
    let api = backend.addresses();
    match query.criteria()? {
        AddressCriteria::ById(id) => absent_if_tolerated(Kind::Address, id, api.get_by_id(id).await),
        AddressCriteria::ByIp(ip) => {
            let found = api.search_by_ip(&ip).await?;
            exactly_one(found, || format!("address with IP {}", ip)).map(Some)
        }
        AddressCriteria::InSubnet { subnet_id, filter } => {
            let found = addresses_in_subnet(backend, subnet_id, &filter).await?;
            exactly_one(found, || format!("address in subnet {}", subnet_id)).map(Some)
        }
        AddressCriteria::Import(id) => api.get_by_id(id).await.map(Some),
    }
}

/// Resolve one subnet
pub async fn resolve_subnet(backend: &dyn IpamBackend, query: &SubnetQuery) -> Result<Option<Subnet>> {
    let api = backend.subnets();
    match query.criteria()? {
        SubnetCriteria::ById(id) => absent_if_tolerated(Kind::Subnet, id, api.get_by_id(id).await),
        SubnetCriteria::ByCidr { cidr, section_id } => {
            let found = api.search_by_cidr(&cidr, section_id).await?;
            exactly_one(found, || format!("subnet {}", cidr)).map(Some)
        }
        SubnetCriteria::InSection { section_id, filter } => {
            let found = subnets_in_section(backend, section_id, &filter).await?;
            exactly_one(found, || format!("subnet in section {}", section_id)).map(Some)
        }
        SubnetCriteria::Import(id) => api.get_by_id(id).await.map(Some),
    }
}

/// Resolve one section
pub async fn resolve_section(backend: &dyn IpamBackend, query: &SectionQuery) -> Result<Option<Section>> {
    let api = backend.sections();
    match query.criteria()? {
        SectionCriteria::ById(id) => absent_if_tolerated(Kind::Section, id, api.get_by_id(id).await),
        SectionCriteria::ByName(name) => {
            let found = api.search_by_name(&name).await?;
            exactly_one(found, || format!("section named {:?}", name)).map(Some)
        }
        SectionCriteria::Import(id) => api.get_by_id(id).await.map(Some),
    }
}

/// Resolve one VLAN
pub async fn resolve_vlan(backend: &dyn IpamBackend, query: &VlanQuery) -> Result<Option<Vlan>> {
    let api = backend.vlans();
    match query.criteria()? {
        VlanCriteria::ById(id) => absent_if_tolerated(Kind::Vlan, id, api.get_by_id(id).await),
        VlanCriteria::ByNumber { number, l2_domain_id } => {
            let found = vlans_by_number(backend, number, l2_domain_id).await?;
            exactly_one(found, || format!("VLAN number {}", number)).map(Some)
        }
        VlanCriteria::Import(id) => api.get_by_id(id).await.map(Some),
    }
}

/// Resolve one L2 domain
pub async fn resolve_l2domain(backend: &dyn IpamBackend, query: &L2DomainQuery) -> Result<Option<L2Domain>> {
    let api = backend.l2domains();
    match query.criteria()? {
        L2DomainCriteria::ById(id) => absent_if_tolerated(Kind::L2Domain, id, api.get_by_id(id).await),
        L2DomainCriteria::ByName(name) => {
            let found = api.search_by_name(&name).await?;
            exactly_one(found, || format!("L2 domain named {:?}", name)).map(Some)
        }
        L2DomainCriteria::Import(id) => api.get_by_id(id).await.map(Some),
    }
}

/// Addresses of a subnet matching a scope filter
pub async fn addresses_in_subnet(
    backend: &dyn IpamBackend,
    subnet_id: EntityId,
    filter: &ScopeFilter,
) -> Result<Vec<Address>> {
    let listing = backend.subnets().list_addresses(subnet_id).await?;
    filter::filter_in_scope(listing, filter, backend.addresses()).await
}

/// Subnets of a section matching a scope filter
pub async fn subnets_in_section(
    backend: &dyn IpamBackend,
    section_id: EntityId,
    filter: &ScopeFilter,
) -> Result<Vec<Subnet>> {
    let listing = backend.sections().list_subnets(section_id).await?;
    filter::filter_in_scope(listing, filter, backend.subnets()).await
}

/// VLANs with a number, optionally restricted to one L2 domain
pub async fn vlans_by_number(
    backend: &dyn IpamBackend,
    number: u64,
    l2_domain_id: Option<EntityId>,
) -> Result<Vec<Vlan>> {
    let found = backend.vlans().search_by_number(number).await?;
    Ok(match l2_domain_id {
        Some(domain) => found.into_iter().filter(|v| v.l2_domain_id == domain).collect(),
        None => found,
    })
}

fn absent_if_tolerated<E>(kind: Kind, id: EntityId, result: Result<E>) -> Result<Option<E>> {
    match result {
        Ok(entity) => Ok(Some(entity)),
        Err(e) if e.is_not_found() && kind.tolerates_missing() => {
            debug!("{} {} no longer exists, reporting it as absent", kind, id);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Require a single candidate
pub(crate) fn exactly_one<E>(mut found: Vec<E>, what: impl FnOnce() -> String) -> Result<E> {
    if found.len() == 1
        && let Some(entity) = found.pop()
    {
        return Ok(entity);
    }
    Err(Error::ambiguous(format!(
        "search for {} returned {} results; correct the search so it matches exactly one",
        what(),
        found.len()
    )))
}

fn import_id(prior: Option<&str>) -> Result<Option<EntityId>> {
    match prior {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::invalid_argument(format!("invalid resource id {:?}", raw))),
    }
}

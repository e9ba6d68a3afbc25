//! VLAN resource and data source

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{custom_field_state, decode, encode, existing_id};
use crate::api::IpamBackend;
use crate::custom_fields;
use crate::error::{Error, Result};
use crate::model::{CustomFieldSet, EntityId, Vlan, wire};
use crate::registry::{DataSourceHandler, ResourceHandler};
use crate::resolve::{self, VlanQuery, exactly_one};

/// Host-side VLAN attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VlanAttributes {
    #[serde(deserialize_with = "wire::identity", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub vlan_id: EntityId,
    pub l2_domain_id: EntityId,
    pub name: String,
    pub number: u64,
    pub description: String,
    pub edit_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<CustomFieldSet>,
}

impl VlanAttributes {
    fn to_model(&self) -> Vlan {
        Vlan {
            id: self.vlan_id,
            l2_domain_id: self.l2_domain_id,
            name: self.name.clone(),
            number: self.number,
            description: self.description.clone(),
            edit_date: String::new(),
        }
    }

    fn from_model(vlan: Vlan, custom_fields: CustomFieldSet) -> Self {
        Self {
            id: Some(vlan.id.to_string()),
            vlan_id: vlan.id,
            l2_domain_id: vlan.l2_domain_id,
            name: vlan.name,
            number: vlan.number,
            description: vlan.description,
            edit_date: vlan.edit_date,
            custom_fields: Some(custom_fields),
        }
    }
}

async fn vlan_state(backend: &dyn IpamBackend, vlan: Vlan) -> Result<Value> {
    let visible = custom_fields::read(backend.vlans(), vlan.id).await?;
    encode(&VlanAttributes::from_model(vlan, custom_field_state(visible)))
}

/// `phpipam_vlan`
///
/// A VLAN number may exist once per L2 domain. Creation checks for an
/// existing VLAN first since phpIPAM itself does not enforce this.
pub struct VlanResource {
    backend: Arc<dyn IpamBackend>,
}

impl VlanResource {
    pub fn new(backend: Arc<dyn IpamBackend>) -> Self {
        Self { backend }
    }

    async fn state(&self, id: EntityId) -> Result<Value> {
        let vlan = self.backend.vlans().get_by_id(id).await?;
        vlan_state(&*self.backend, vlan).await
    }
}

#[async_trait]
impl ResourceHandler for VlanResource {
    async fn create(&self, attrs: Value) -> Result<Value> {
        let attrs: VlanAttributes = decode(attrs)?;
        let mut vlan = attrs.to_model();
        vlan.id = 0;
        let domain = (vlan.l2_domain_id != 0).then_some(vlan.l2_domain_id);

        // The created VLAN is found again by number
        if vlan.number == 0 {
            return Err(Error::invalid_argument("number is required to create a VLAN"));
        }
        custom_fields::check_initial(self.backend.vlans(), attrs.custom_fields.as_ref()).await?;

        let existing = resolve::vlans_by_number(&*self.backend, vlan.number, domain).await?;
        if !existing.is_empty() {
            return Err(Error::invalid_argument(format!(
                "VLAN with number: {} and l2_domain_id: {} already exists. Can't create VLAN",
                vlan.number, vlan.l2_domain_id
            )));
        }

        self.backend.vlans().create(&vlan).await?;
        info!("Created VLAN {} ({:?})", vlan.number, vlan.name);

        let found = resolve::vlans_by_number(&*self.backend, vlan.number, domain).await?;
        let created = exactly_one(found, || format!("VLAN number {}", vlan.number))?;

        if let Some(desired) = &attrs.custom_fields {
            custom_fields::write_initial(self.backend.vlans(), created.id, desired).await?;
        }
        self.state(created.id).await
    }

    async fn read(&self, attrs: Value) -> Result<Option<Value>> {
        let query: VlanQuery = decode(attrs)?;
        match resolve::resolve_vlan(&*self.backend, &query).await? {
            Some(vlan) => vlan_state(&*self.backend, vlan).await.map(Some),
            None => Ok(None),
        }
    }

    async fn update(&self, attrs: Value) -> Result<Value> {
        let attrs: VlanAttributes = decode(attrs)?;
        let id = existing_id(attrs.vlan_id, attrs.id.as_deref(), "vlan_id")?;

        let mut vlan = attrs.to_model();
        vlan.id = id;
        self.backend.vlans().update(&vlan).await?;
        custom_fields::apply(self.backend.vlans(), id, attrs.custom_fields.as_ref()).await?;

        self.state(id).await
    }

    async fn delete(&self, attrs: Value) -> Result<()> {
        let attrs: VlanAttributes = decode(attrs)?;
        let id = existing_id(attrs.vlan_id, attrs.id.as_deref(), "vlan_id")?;
        debug!("Deleting VLAN {}", id);
        self.backend.vlans().delete(id).await
    }
}

/// `phpipam_vlan` data source
pub struct VlanDataSource {
    backend: Arc<dyn IpamBackend>,
}

impl VlanDataSource {
    pub fn new(backend: Arc<dyn IpamBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl DataSourceHandler for VlanDataSource {
    async fn read(&self, attrs: Value) -> Result<Option<Value>> {
        let query: VlanQuery = decode(attrs)?;
        match resolve::resolve_vlan(&*self.backend, &query).await? {
            Some(vlan) => vlan_state(&*self.backend, vlan).await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryIpam;
    use crate::model::Kind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_duplicate_number_in_domain_rejected() {
        let ipam = Arc::new(MemoryIpam::new());
        let resource = VlanResource::new(ipam.clone());

        resource
            .create(json!({"number": 100, "l2_domain_id": 1, "name": "users"}))
            .await
            .unwrap();
        let err = resource
            .create(json!({"number": 100, "l2_domain_id": 1, "name": "again"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("VLAN with number: 100 and l2_domain_id: 1 already exists"));

        // Same number in another domain is fine
        resource
            .create(json!({"number": 100, "l2_domain_id": 2, "name": "other"}))
            .await
            .unwrap();
        assert_eq!(ipam.count(Kind::Vlan).await, 2);
    }

    #[tokio::test]
    async fn test_vlan_without_number_is_not_created() {
        let ipam = Arc::new(MemoryIpam::new());
        let resource = VlanResource::new(ipam.clone());

        let err = resource
            .create(json!({"name": "nameless", "l2_domain_id": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(ipam.count(Kind::Vlan).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_custom_field_leaves_no_vlan_behind() {
        let ipam = Arc::new(MemoryIpam::new());
        ipam.define_custom_field(Kind::Vlan, "site").await;
        let resource = VlanResource::new(ipam.clone());

        let err = resource
            .create(json!({"number": 30, "name": "lab", "custom_fields": {"colour": "blue"}}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
        assert_eq!(ipam.count(Kind::Vlan).await, 0);
    }

    #[tokio::test]
    async fn test_custom_fields_round_trip_through_state() {
        let ipam = Arc::new(MemoryIpam::new());
        ipam.define_custom_field(Kind::Vlan, "site").await;
        ipam.define_custom_field(Kind::Vlan, "rack").await;
        let resource = VlanResource::new(ipam.clone());

        let state = resource
            .create(json!({"number": 20, "name": "mgmt", "custom_fields": {"site": "ams"}}))
            .await
            .unwrap();
        assert_eq!(state["custom_fields"], json!({"site": "ams"}));

        let mut changed = state.clone();
        changed["custom_fields"] = json!({"rack": "r12"});
        let updated = resource.update(changed).await.unwrap();
        assert_eq!(updated["custom_fields"], json!({"rack": "r12"}));
    }

    #[tokio::test]
    async fn test_missing_vlan_by_id_is_error() {
        let ipam = Arc::new(MemoryIpam::new());
        let err = VlanDataSource::new(ipam)
            .read(json!({"vlan_id": 77}))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}

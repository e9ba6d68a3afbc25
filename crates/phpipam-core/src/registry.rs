//! Resource and data source registry
//!
//! Resource types are registered by name so the host-facing loop can
//! dispatch lifecycle calls without a hardcoded match over every type.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use phpipam_core::registry::{Operation, ResourceRegistry};
//!
//! let registry = ResourceRegistry::new();
//! phpipam_core::resources::register(&registry, backend, locks);
//!
//! let state = registry
//!     .call_resource("phpipam_address", Operation::Read, attrs)
//!     .await?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{Error, Result};

/// Lifecycle of one managed resource type
///
/// Attribute maps use the host-side attribute names. Identities are strings.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Create the resource and return its full state
    async fn create(&self, attrs: Value) -> Result<Value>;

    /// Refresh state, `None` when the resource is gone
    async fn read(&self, attrs: Value) -> Result<Option<Value>>;

    /// Apply changed attributes and return the new state
    async fn update(&self, attrs: Value) -> Result<Value>;

    /// Remove the resource
    async fn delete(&self, attrs: Value) -> Result<()>;

    /// Adopt an existing remote entity by identity
    async fn import(&self, id: &str) -> Result<Value> {
        self.read(json!({ "id": id }))
            .await?
            .ok_or_else(|| Error::not_found(format!("no entity with id {}", id)))
    }
}

/// Read-only lookup exposed to the host
#[async_trait]
pub trait DataSourceHandler: Send + Sync {
    /// Look up state, `None` when the target does not exist
    async fn read(&self, attrs: Value) -> Result<Option<Value>>;
}

/// Lifecycle operation requested by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Import,
}

/// Registry of resource and data source handlers
///
/// Handlers are stored behind `Arc` so a call can run without holding the
/// registry lock.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: RwLock<HashMap<String, Arc<dyn ResourceHandler>>>,
    data_sources: RwLock<HashMap<String, Arc<dyn DataSourceHandler>>>,
}

impl ResourceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a managed resource type, replacing any previous handler
    pub fn register_resource(&self, name: impl Into<String>, handler: Arc<dyn ResourceHandler>) {
        let mut resources = self
            .resources
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        resources.insert(name.into(), handler);
    }

    /// Register a data source type, replacing any previous handler
    pub fn register_data_source(&self, name: impl Into<String>, handler: Arc<dyn DataSourceHandler>) {
        let mut sources = self
            .data_sources
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        sources.insert(name.into(), handler);
    }

    /// Look up a resource handler
    pub fn resource(&self, name: &str) -> Result<Arc<dyn ResourceHandler>> {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::invalid_argument(format!("unknown resource type: {}", name)))
    }

    /// Look up a data source handler
    pub fn data_source(&self, name: &str) -> Result<Arc<dyn DataSourceHandler>> {
        self.data_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::invalid_argument(format!("unknown data source type: {}", name)))
    }

    /// Run one lifecycle operation on a resource type
    ///
    /// Absence (read of a vanished resource) and deletion both yield `null`.
    /// Import expects `{"id": "..."}`.
    pub async fn call_resource(&self, name: &str, op: Operation, attrs: Value) -> Result<Value> {
        let handler = self.resource(name)?;
        debug!("Dispatching {:?} on resource {}", op, name);

        match op {
            Operation::Create => handler.create(attrs).await,
            Operation::Read => Ok(handler.read(attrs).await?.unwrap_or(Value::Null)),
            Operation::Update => handler.update(attrs).await,
            Operation::Delete => handler.delete(attrs).await.map(|()| Value::Null),
            Operation::Import => {
                let id = import_identity(&attrs)?;
                handler.import(&id).await
            }
        }
    }

    /// Read a data source
    pub async fn call_data_source(&self, name: &str, attrs: Value) -> Result<Value> {
        let handler = self.data_source(name)?;
        debug!("Reading data source {}", name);
        Ok(handler.read(attrs).await?.unwrap_or(Value::Null))
    }

    /// Check if a resource type is registered
    pub fn has_resource(&self, name: &str) -> bool {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Check if a data source type is registered
    pub fn has_data_source(&self, name: &str) -> bool {
        self.data_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered resource type names, sorted
    pub fn list_resources(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Registered data source type names, sorted
    pub fn list_data_sources(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .data_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

fn import_identity(attrs: &Value) -> Result<String> {
    match attrs.get("id") {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(Error::invalid_argument("import requires a non-empty id")),
    }
}

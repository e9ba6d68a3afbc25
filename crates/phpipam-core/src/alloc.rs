// # Free-slot allocation
//
// phpIPAM has no atomic "allocate next free" call: a caller reads the first
// free address (or child subnet) and then creates it. Two concurrent callers
// could read the same slot. `AllocationLocks` serializes the read and the
// create per parent subnet, so each caller observes the claims of the ones
// before it.
//
// The lock handle is owned by whoever builds the resource registry and passed
// in explicitly. Nothing here is global.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::api::IpamBackend;
use crate::error::{Error, Result};
use crate::model::{Address, EntityId, Subnet};
use crate::resolve::exactly_one;

/// Per-parent allocation locks
///
/// An entry lives only while some caller holds or waits for it, so the map
/// stays bounded by the number of parents being allocated in concurrently.
#[derive(Debug, Clone, Default)]
pub struct AllocationLocks {
    inner: Arc<Mutex<HashMap<EntityId, Arc<AsyncMutex<()>>>>>,
}

/// Exclusive allocation rights in one parent subnet
///
/// Dropping the guard releases the lock and forgets the parent once nobody
/// else is waiting for it.
#[derive(Debug)]
pub struct AllocationGuard {
    parent: EntityId,
    locks: AllocationLocks,
    _guard: OwnedMutexGuard<()>,
}

impl AllocationLocks {
    /// Create an empty lock set
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive allocation rights in a parent subnet
    pub async fn acquire(&self, parent: EntityId) -> AllocationGuard {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(parent).or_default().clone()
        };
        AllocationGuard {
            parent,
            locks: self.clone(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of parents currently held or waited on
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no parent is held or waited on
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for AllocationGuard {
    fn drop(&mut self) {
        let mut locks = self.locks.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map and one in this guard: no waiters
        if locks
            .get(&self.parent)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            locks.remove(&self.parent);
        }
    }
}

/// Create an address at the first free IP of `template.subnet_id`
///
/// Returns the created address as re-read from the backend.
pub async fn allocate_address(
    backend: &dyn IpamBackend,
    locks: &AllocationLocks,
    template: &Address,
) -> Result<Address> {
    let subnet_id = template.subnet_id;
    if subnet_id == 0 {
        return Err(Error::invalid_argument(
            "subnet_id is required to allocate a free address",
        ));
    }

    let _guard = locks.acquire(subnet_id).await;
    debug!("Acquired allocation lock for subnet {}", subnet_id);

    let ip = backend
        .subnets()
        .first_free_address(subnet_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("subnet {} has no free IP addresses", subnet_id)))?;

    let address = Address {
        ip: ip.clone(),
        ..template.clone()
    };
    backend.addresses().create(&address).await?;
    info!("Allocated address {} in subnet {}", ip, subnet_id);

    let found: Vec<Address> = backend
        .addresses()
        .search_by_ip(&ip)
        .await?
        .into_iter()
        .filter(|a| a.subnet_id == subnet_id)
        .collect();
    exactly_one(found, || format!("address with IP {} in subnet {}", ip, subnet_id))
}

/// Create a child subnet at the first free block of `mask` bits inside `parent_id`
///
/// The section defaults to the parent's section when the template has none.
pub async fn allocate_subnet(
    backend: &dyn IpamBackend,
    locks: &AllocationLocks,
    parent_id: EntityId,
    mask: u8,
    template: &Subnet,
) -> Result<Subnet> {
    if parent_id == 0 {
        return Err(Error::invalid_argument(
            "parent_subnet_id is required to allocate a free subnet",
        ));
    }

    let _guard = locks.acquire(parent_id).await;
    debug!("Acquired allocation lock for subnet {}", parent_id);

    let cidr = backend
        .subnets()
        .first_free_subnet(parent_id, mask)
        .await?
        .ok_or_else(|| {
            Error::not_found(format!(
                "subnet {} has no free /{} subnets",
                parent_id, mask
            ))
        })?;
    let (address, prefix) = split_cidr(&cidr)?;

    let section_id = match template.section_id {
        0 => backend.subnets().get_by_id(parent_id).await?.section_id,
        id => id,
    };

    let subnet = Subnet {
        subnet_address: address.to_string(),
        subnet_mask: prefix,
        master_subnet_id: parent_id,
        section_id,
        ..template.clone()
    };
    backend.subnets().create(&subnet).await?;
    info!("Allocated subnet {} in subnet {}", cidr, parent_id);

    let found = backend
        .subnets()
        .search_by_cidr(&cidr, Some(section_id))
        .await?;
    exactly_one(found, || format!("subnet {} in section {}", cidr, section_id))
}

/// Split `a.b.c.d/n` into address and prefix length
pub fn split_cidr(cidr: &str) -> Result<(&str, u64)> {
    let (address, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| Error::invalid_argument(format!("invalid CIDR {:?}", cidr)))?;
    let prefix = prefix
        .parse()
        .map_err(|_| Error::invalid_argument(format!("invalid CIDR {:?}", cidr)))?;
    Ok((address, prefix))
}

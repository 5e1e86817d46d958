//! Locate an entity by name and destroy it.

use crate::error::Result;
use crate::locator::EntityLocator;
use crate::task_poller::TaskPoller;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};
use vsphere_api::{ManagedObjectReference, ManagementClient};

/// Waiting behaviour for the destroy task.
#[derive(Debug, Clone, Copy)]
pub struct DeleteOptions {
    pub task_timeout: Option<Duration>,
    pub max_wait: Option<Duration>,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            task_timeout: Some(crate::task_poller::DEFAULT_TASK_TIMEOUT),
            max_wait: Some(crate::task_poller::DEFAULT_MAX_WAIT),
        }
    }
}

/// What a delete run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteReport {
    NotFound {
        name: String,
    },
    Deleted {
        name: String,
        entity: ManagedObjectReference,
    },
}

impl fmt::Display for DeleteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteReport::NotFound { name } => {
                write!(f, "Unable to find a Managed Entity By name [ {name} ]")
            }
            DeleteReport::Deleted { name, entity } => write!(
                f,
                "Successful delete of Managed Entity Name - [ {name} ] and Entity Type - [ {} ]",
                entity.type_name
            ),
        }
    }
}

/// Delete the entity called `name` from the inventory.
///
/// A missing entity is reported, not raised, and no destroy is submitted.
/// A task that fails surfaces its fault as [`crate::error::Error::RemoteFault`].
pub async fn delete_entity<C: ManagementClient + ?Sized>(
    client: &C,
    name: &str,
    options: DeleteOptions,
) -> Result<DeleteReport> {
    let locator = EntityLocator::new(client);
    let Some(entity) = locator.find(name, client.root_folder()).await? else {
        warn!("No managed entity named {name:?}");
        return Ok(DeleteReport::NotFound {
            name: name.to_string(),
        });
    };

    info!("Destroying {} {name:?} ({entity})", entity.type_name);
    let task = client.destroy(&entity).await?;

    TaskPoller::new(client)
        .with_timeout(options.task_timeout)
        .with_max_wait(options.max_wait)
        .wait_for_success(&task)
        .await?;

    Ok(DeleteReport::Deleted {
        name: name.to_string(),
        entity,
    })
}

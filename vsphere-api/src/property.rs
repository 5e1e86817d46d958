//! Property-change waits on top of the property collector.

use crate::error::{Error, Result};
use crate::types::{ManagedObjectReference, ObjectUpdateKind, PropertyChangeOp, UpdateSet};
use crate::ManagementClient;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Latest known values of the watched properties of one object.
///
/// A path that is missing is unset on the server.
#[derive(Debug, Clone, Default)]
pub struct PropertySnapshot {
    values: HashMap<String, Value>,
    version: String,
}

impl PropertySnapshot {
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.values.get(path)
    }

    /// Collector version the snapshot reflects.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Fold one update set into the snapshot.
    ///
    /// Only changes reported for `filter` and `obj` are applied. Returns an
    /// error if the object left the filter.
    pub fn apply(
        &mut self,
        update: &UpdateSet,
        filter: &ManagedObjectReference,
        obj: &ManagedObjectReference,
    ) -> Result<()> {
        self.version = update.version.clone();

        let objects = update
            .filter_set
            .iter()
            .filter(|f| &f.filter == filter)
            .flat_map(|f| f.object_set.iter())
            .filter(|o| &o.obj == obj);

        for object in objects {
            if object.kind == ObjectUpdateKind::Leave {
                return Err(Error::ObjectRemoved(obj.to_string()));
            }
            for change in &object.change_set {
                match (change.op, &change.val) {
                    (PropertyChangeOp::Assign | PropertyChangeOp::Add, Some(val)) if !val.is_null() => {
                        self.values.insert(change.name.clone(), val.clone());
                    }
                    _ => {
                        self.values.remove(&change.name);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Limits applied to [`wait_for_values`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitOptions {
    /// Server-side wait per `WaitForUpdatesEx` call
    pub max_wait: Option<Duration>,
    /// Overall limit, after which the wait fails with [`Error::Timeout`]
    pub timeout: Option<Duration>,
}

/// Watch `paths` on `obj` until `until` holds for the collected values.
///
/// `until` is evaluated only on complete update sets, so values that the
/// server changed together are always seen together. The filter is removed
/// again before returning, on success and on error.
pub async fn wait_for_values<C, F>(
    client: &C,
    obj: &ManagedObjectReference,
    paths: &[&str],
    options: WaitOptions,
    mut until: F,
) -> Result<PropertySnapshot>
where
    C: ManagementClient + ?Sized,
    F: FnMut(&PropertySnapshot) -> bool,
{
    let filter = client.create_filter(obj, paths).await?;
    debug!("Created property filter {filter} on {obj} for {paths:?}");

    let collect = collect_until(client, &filter, obj, options.max_wait, &mut until);
    let result = match options.timeout {
        Some(timeout) => tokio::time::timeout(timeout, collect)
            .await
            .unwrap_or_else(|_| {
                Err(Error::Timeout(format!(
                    "{obj} did not reach the expected values within {timeout:?}"
                )))
            }),
        None => collect.await,
    };

    if let Err(e) = client.destroy_filter(&filter).await {
        warn!("Failed to destroy property filter {filter}: {e}");
    }

    result
}

async fn collect_until<C, F>(
    client: &C,
    filter: &ManagedObjectReference,
    obj: &ManagedObjectReference,
    max_wait: Option<Duration>,
    until: &mut F,
) -> Result<PropertySnapshot>
where
    C: ManagementClient + ?Sized,
    F: FnMut(&PropertySnapshot) -> bool,
{
    let mut snapshot = PropertySnapshot::default();

    loop {
        let Some(update) = client.wait_for_updates(snapshot.version(), max_wait).await? else {
            debug!("No property changes for {obj} within {max_wait:?}, waiting again");
            continue;
        };

        snapshot.apply(&update, filter, obj)?;

        if update.truncated {
            debug!("Update set {} truncated, fetching the remainder", update.version);
            continue;
        }

        if until(&snapshot) {
            return Ok(snapshot);
        }
    }
}

//! Client for the vSphere Web Services API over its VI/JSON binding.
//!
//! [`VimClient`] talks HTTP to vCenter or ESXi. Code that only needs inventory
//! lookup, `Destroy_Task` and property waits should depend on the
//! [`ManagementClient`] trait so it can be driven by a fake in tests.

mod client;
mod error;
mod property;
mod types;

use async_trait::async_trait;
use std::time::Duration;

pub use client::{DEFAULT_RELEASE, VimClient, VimOptions};
pub use error::{Error, Result};
pub use property::{PropertySnapshot, WaitOptions, wait_for_values};
pub use types::{
    AboutInfo, LocalizedMethodFault, ManagedObjectReference, ObjectUpdate, ObjectUpdateKind,
    PropertyChange, PropertyChangeOp, PropertyFilterUpdate, ServiceContent, TaskInfoState,
    UpdateSet, unbox,
};

/// Operations a management session exposes to inventory tooling.
#[async_trait]
pub trait ManagementClient: Send + Sync {
    /// Root of the inventory tree.
    fn root_folder(&self) -> &ManagedObjectReference;

    /// List `(name, reference)` for every entity of `type_name` (or a subtype)
    /// below `container`, recursively.
    async fn entities_by_type(
        &self,
        container: &ManagedObjectReference,
        type_name: &str,
    ) -> Result<Vec<(String, ManagedObjectReference)>>;

    /// Submit `Destroy_Task` for an entity. Returns the task reference.
    async fn destroy(&self, entity: &ManagedObjectReference) -> Result<ManagedObjectReference>;

    /// Register a property filter watching `paths` on `obj`.
    async fn create_filter(
        &self,
        obj: &ManagedObjectReference,
        paths: &[&str],
    ) -> Result<ManagedObjectReference>;

    /// Block until changes newer than `version` are available.
    ///
    /// Returns `None` when `max_wait` elapses without changes.
    async fn wait_for_updates(
        &self,
        version: &str,
        max_wait: Option<Duration>,
    ) -> Result<Option<UpdateSet>>;

    async fn destroy_filter(&self, filter: &ManagedObjectReference) -> Result<()>;
}

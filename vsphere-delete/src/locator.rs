//! Name lookup over the inventory tree.

use crate::error::{Error, Result};
use std::collections::HashMap;
use tracing::debug;
use vsphere_api::{ManagedObjectReference, ManagementClient};

/// Type filter matching every inventory object.
pub const MANAGED_ENTITY: &str = "ManagedEntity";

/// Resolves entity names to references.
pub struct EntityLocator<'a, C: ?Sized> {
    client: &'a C,
}

impl<'a, C: ManagementClient + ?Sized> EntityLocator<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Find the entity called `name` below `root`.
    ///
    /// Returns `Ok(None)` when nothing has that name. A name shared by several
    /// entities is rejected with [`Error::AmbiguousName`].
    pub async fn find(
        &self,
        name: &str,
        root: &ManagedObjectReference,
    ) -> Result<Option<ManagedObjectReference>> {
        let entities = self.client.entities_by_type(root, MANAGED_ENTITY).await?;

        let mut by_name: HashMap<String, Vec<ManagedObjectReference>> = HashMap::new();
        for (entity_name, moref) in entities {
            by_name.entry(entity_name).or_default().push(moref);
        }
        debug!("Indexed {} distinct entity name(s) under {root}", by_name.len());

        match by_name.remove(name) {
            None => Ok(None),
            Some(mut matches) if matches.len() == 1 => Ok(matches.pop()),
            Some(matches) => Err(Error::AmbiguousName {
                name: name.to_string(),
                matches: matches.iter().map(ToString::to_string).collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeInventory;

    #[tokio::test]
    async fn test_find_unique_name() {
        let inventory = FakeInventory::new()
            .with_entity("testFolder", "Folder", "group-v3")
            .with_entity("web-01", "VirtualMachine", "vm-17");
        let locator = EntityLocator::new(&inventory);

        let found = locator
            .find("testFolder", inventory.root_folder())
            .await
            .unwrap();
        assert_eq!(found, Some(ManagedObjectReference::new("Folder", "group-v3")));
        assert_eq!(inventory.listed_types(), vec![MANAGED_ENTITY.to_string()]);
    }

    #[tokio::test]
    async fn test_missing_name_is_not_an_error() {
        let inventory = FakeInventory::new().with_entity("web-01", "VirtualMachine", "vm-17");
        let locator = EntityLocator::new(&inventory);

        let found = locator.find("web-02", inventory.root_folder()).await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_match_is_exact() {
        let inventory = FakeInventory::new().with_entity("TestFolder", "Folder", "group-v3");
        let locator = EntityLocator::new(&inventory);

        assert_eq!(
            locator.find("testFolder", inventory.root_folder()).await.unwrap(),
            None
        );
        assert_eq!(
            locator.find("TestFolder ", inventory.root_folder()).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_duplicate_names_are_rejected() {
        let inventory = FakeInventory::new()
            .with_entity("db", "VirtualMachine", "vm-1")
            .with_entity("db", "Folder", "group-v9");
        let locator = EntityLocator::new(&inventory);

        let err = locator.find("db", inventory.root_folder()).await.unwrap_err();
        match err {
            Error::AmbiguousName { name, matches } => {
                assert_eq!(name, "db");
                assert_eq!(matches, vec!["VirtualMachine:vm-1", "Folder:group-v9"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

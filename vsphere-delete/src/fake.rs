//! Scripted in-memory inventory used by the unit tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use vsphere_api::{
    Error, ManagedObjectReference, ManagementClient, ObjectUpdate, ObjectUpdateKind,
    PropertyChange, PropertyChangeOp, PropertyFilterUpdate, Result, UpdateSet,
};

/// One property change as `(path, value)`; `None` unsets the path.
pub type Change = (&'static str, Option<Value>);

/// Changes the server reports together in one update set.
pub type Batch = Vec<Change>;

pub fn state(value: &str) -> Change {
    (
        "info.state",
        Some(json!({"_typeName": "TaskInfoState", "_value": value})),
    )
}

pub fn fault(fault_type: &str, message: &str) -> Change {
    (
        "info.error",
        Some(json!({
            "_typeName": "LocalizedMethodFault",
            "fault": {"_typeName": fault_type},
            "localizedMessage": message,
        })),
    )
}

#[derive(Default)]
struct Watch {
    filter: Option<ManagedObjectReference>,
    obj: Option<ManagedObjectReference>,
    batches: VecDeque<Batch>,
    version: u64,
}

pub struct FakeInventory {
    root: ManagedObjectReference,
    entities: Mutex<Vec<(String, ManagedObjectReference)>>,
    scripts: Mutex<VecDeque<Vec<Batch>>>,
    watch: Mutex<Watch>,
    collector_broken: bool,
    destroy_calls: Mutex<Vec<ManagedObjectReference>>,
    listed_types: Mutex<Vec<String>>,
    filters_created: Mutex<u32>,
    filters_destroyed: Mutex<u32>,
}

impl FakeInventory {
    pub fn new() -> Self {
        Self {
            root: ManagedObjectReference::new("Folder", "group-d1"),
            entities: Mutex::new(Vec::new()),
            scripts: Mutex::new(VecDeque::new()),
            watch: Mutex::new(Watch::default()),
            collector_broken: false,
            destroy_calls: Mutex::new(Vec::new()),
            listed_types: Mutex::new(Vec::new()),
            filters_created: Mutex::new(0),
            filters_destroyed: Mutex::new(0),
        }
    }

    pub fn with_entity(self, name: &str, type_name: &str, value: &str) -> Self {
        self.entities
            .lock()
            .unwrap()
            .push((name.to_string(), ManagedObjectReference::new(type_name, value)));
        self
    }

    /// Queue the update sets served for the next destroy task. Without a
    /// script a task goes `running` then `success`.
    pub fn with_task(self, batches: Vec<Batch>) -> Self {
        self.scripts.lock().unwrap().push_back(batches);
        self
    }

    /// Every `WaitForUpdatesEx` fails with `InvalidCollectorVersion`.
    pub fn with_broken_collector(mut self) -> Self {
        self.collector_broken = true;
        self
    }

    pub fn destroy_calls(&self) -> Vec<ManagedObjectReference> {
        self.destroy_calls.lock().unwrap().clone()
    }

    pub fn listed_types(&self) -> Vec<String> {
        self.listed_types.lock().unwrap().clone()
    }

    pub fn filters_created(&self) -> u32 {
        *self.filters_created.lock().unwrap()
    }

    pub fn filters_destroyed(&self) -> u32 {
        *self.filters_destroyed.lock().unwrap()
    }
}

fn succeeds(batches: &[Batch]) -> bool {
    batches
        .iter()
        .flatten()
        .any(|(path, value)| *path == "info.state" && value == &state("success").1)
}

#[async_trait]
impl ManagementClient for FakeInventory {
    fn root_folder(&self) -> &ManagedObjectReference {
        &self.root
    }

    async fn entities_by_type(
        &self,
        _container: &ManagedObjectReference,
        type_name: &str,
    ) -> Result<Vec<(String, ManagedObjectReference)>> {
        self.listed_types.lock().unwrap().push(type_name.to_string());
        Ok(self.entities.lock().unwrap().clone())
    }

    async fn destroy(&self, entity: &ManagedObjectReference) -> Result<ManagedObjectReference> {
        let mut calls = self.destroy_calls.lock().unwrap();
        calls.push(entity.clone());
        let task = ManagedObjectReference::new("Task", format!("task-{}", calls.len()));

        let batches = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![vec![state("running")], vec![state("success")]]);
        if succeeds(&batches) {
            self.entities.lock().unwrap().retain(|(_, moref)| moref != entity);
        }

        let mut watch = self.watch.lock().unwrap();
        watch.obj = Some(task.clone());
        watch.batches = batches.into();
        Ok(task)
    }

    async fn create_filter(
        &self,
        obj: &ManagedObjectReference,
        _paths: &[&str],
    ) -> Result<ManagedObjectReference> {
        let mut created = self.filters_created.lock().unwrap();
        *created += 1;
        let filter = ManagedObjectReference::new("PropertyFilter", format!("filter-{}", *created));
        let mut watch = self.watch.lock().unwrap();
        watch.filter = Some(filter.clone());
        watch.obj = Some(obj.clone());
        Ok(filter)
    }

    async fn wait_for_updates(
        &self,
        version: &str,
        _max_wait: Option<Duration>,
    ) -> Result<Option<UpdateSet>> {
        if self.collector_broken {
            return Err(Error::InvalidCollectorVersion(version.to_string()));
        }

        let next = {
            let mut watch = self.watch.lock().unwrap();
            let batch = watch.batches.pop_front();
            match (batch, watch.filter.clone(), watch.obj.clone()) {
                (Some(batch), Some(filter), Some(obj)) => {
                    watch.version += 1;
                    Some(UpdateSet {
                        version: watch.version.to_string(),
                        filter_set: vec![PropertyFilterUpdate {
                            filter,
                            object_set: vec![ObjectUpdate {
                                kind: ObjectUpdateKind::Modify,
                                obj,
                                change_set: batch
                                    .into_iter()
                                    .map(|(name, val)| PropertyChange {
                                        name: name.to_string(),
                                        op: PropertyChangeOp::Assign,
                                        val,
                                    })
                                    .collect(),
                            }],
                        }],
                        truncated: false,
                    })
                }
                _ => None,
            }
        };

        match next {
            Some(update) => Ok(Some(update)),
            // Script exhausted: the task never changes again
            None => std::future::pending().await,
        }
    }

    async fn destroy_filter(&self, _filter: &ManagedObjectReference) -> Result<()> {
        *self.filters_destroyed.lock().unwrap() += 1;
        Ok(())
    }
}

//! Wire types for the vSphere VI/JSON protocol.
//!
//! Only the handful of data objects the client touches are modelled. Property
//! values stay as `serde_json::Value` and are decoded where they are consumed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Opaque reference to a server-side managed object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagedObjectReference {
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: String,
}

impl ManagedObjectReference {
    pub fn new<T: ToString, V: ToString>(type_name: T, value: V) -> Self {
        Self {
            type_name: type_name.to_string(),
            value: value.to_string(),
        }
    }

    /// VI/JSON form, with the `_typeName` discriminator the server expects in
    /// request bodies.
    pub fn to_wire(&self) -> Value {
        serde_json::json!({
            "_typeName": "ManagedObjectReference",
            "type": self.type_name,
            "value": self.value,
        })
    }
}

impl fmt::Display for ManagedObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.value)
    }
}

/// State of a server-side task (`TaskInfo.state`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskInfoState {
    Queued,
    Running,
    Success,
    Error,
}

impl TaskInfoState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskInfoState::Queued => "queued",
            TaskInfoState::Running => "running",
            TaskInfoState::Success => "success",
            TaskInfoState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskInfoState::Success | TaskInfoState::Error)
    }

    /// Decode a property value, either boxed (`{"_typeName":"TaskInfoState","_value":"success"}`)
    /// or bare (`"success"`).
    pub fn from_value(value: &Value) -> Option<Self> {
        match unbox(value).as_str()? {
            "queued" => Some(TaskInfoState::Queued),
            "running" => Some(TaskInfoState::Running),
            "success" => Some(TaskInfoState::Success),
            "error" => Some(TaskInfoState::Error),
            _ => None,
        }
    }
}

/// Fault payload attached to a failed task (`TaskInfo.error`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedMethodFault {
    /// Concrete fault type, e.g. `ResourceInUse`
    pub fault_type: String,
    pub localized_message: String,
}

impl LocalizedMethodFault {
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let fault_type = obj
            .get("fault")
            .and_then(|f| f.get("_typeName"))
            .and_then(Value::as_str)
            .unwrap_or("MethodFault")
            .to_string();
        let localized_message = obj
            .get("localizedMessage")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| fault_type.clone());
        Some(Self {
            fault_type,
            localized_message,
        })
    }
}

impl fmt::Display for LocalizedMethodFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.localized_message, self.fault_type)
    }
}

/// Strip the `{"_typeName":..,"_value":..}` box the server puts around
/// primitive values carried as `anyType`.
pub fn unbox(value: &Value) -> &Value {
    value.get("_value").unwrap_or(value)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AboutInfo {
    pub full_name: String,
    #[serde(default)]
    pub api_version: Option<String>,
}

/// The subset of `ServiceContent` the client needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceContent {
    pub root_folder: ManagedObjectReference,
    pub property_collector: ManagedObjectReference,
    pub view_manager: ManagedObjectReference,
    pub session_manager: ManagedObjectReference,
    pub about: AboutInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PropertyChangeOp {
    Add,
    Remove,
    Assign,
    IndirectRemove,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PropertyChange {
    pub name: String,
    pub op: PropertyChangeOp,
    #[serde(default)]
    pub val: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectUpdateKind {
    Modify,
    Enter,
    Leave,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectUpdate {
    pub kind: ObjectUpdateKind,
    pub obj: ManagedObjectReference,
    #[serde(default)]
    pub change_set: Vec<PropertyChange>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyFilterUpdate {
    pub filter: ManagedObjectReference,
    #[serde(default)]
    pub object_set: Vec<ObjectUpdate>,
}

/// Result of one `WaitForUpdatesEx` call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSet {
    pub version: String,
    #[serde(default)]
    pub filter_set: Vec<PropertyFilterUpdate>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DynamicProperty {
    pub name: String,
    #[serde(default)]
    pub val: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ObjectContent {
    pub obj: ManagedObjectReference,
    #[serde(default)]
    pub prop_set: Vec<DynamicProperty>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RetrieveResult {
    #[serde(default)]
    pub objects: Vec<ObjectContent>,
    #[serde(default)]
    pub token: Option<String>,
}

/// Fault body returned with a non-2xx status.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerFault {
    #[serde(rename = "_typeName")]
    pub type_name: String,
    #[serde(default)]
    pub fault_message: Vec<LocalizableMessage>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LocalizableMessage {
    #[serde(default)]
    pub message: Option<String>,
}

impl ServerFault {
    pub fn message(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.fault_message.iter().find_map(|m| m.message.clone()))
            .unwrap_or_else(|| self.type_name.clone())
    }
}

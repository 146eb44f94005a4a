//! Protocol messages exchanged with the master.
//!
//! These mirror the wire-level records of the two-level offer protocol:
//! offers advertising agent resources, resources with their reservation
//! stacks and disk metadata, task and executor descriptions, and the
//! operations a scheduler can apply to an offer. Collections that affect
//! serialized output use ordered containers so that a given evaluation
//! always serializes byte-identically.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// The role resources belong to when nobody has reserved them.
pub const DEFAULT_ROLE: &str = "*";

/// Well-known resource names.
pub const CPUS_RESOURCE: &str = "cpus";
pub const MEM_RESOURCE: &str = "mem";
pub const DISK_RESOURCE: &str = "disk";
pub const PORTS_RESOURCE: &str = "ports";

pub type OfferId = String;
pub type AgentId = String;
pub type TaskId = String;
pub type ExecutorId = String;

/// A single key/value label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

/// An ordered label list. Lookup returns the first match; `set` replaces
/// an existing key in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Labels(pub Vec<Label>);

impl Labels {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|l| l.key == key)
            .map(|l| l.value.as_str())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter_mut().find(|l| l.key == key) {
            Some(label) => label.value = value,
            None => self.0.push(Label {
                key: key.to_string(),
                value,
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One entry of a resource's reservation stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservationInfo {
    pub role: Option<String>,
    pub principal: Option<String>,
    #[serde(default)]
    pub labels: Labels,
}

/// Where a disk resource is physically backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskSourceKind {
    Path,
    Mount,
    Root,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskSource {
    pub kind: DiskSourceKind,
    /// Filesystem root for PATH and MOUNT sources.
    pub root: Option<String>,
}

/// Identity of a persistent volume, assigned once at CREATE time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persistence {
    pub id: String,
    pub principal: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeMode {
    Rw,
    Ro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxPathKind {
    /// Relative to the executor's sandbox, shared with sibling tasks.
    Parent,
    /// Relative to the task's own sandbox.
    Own,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VolumeSource {
    SandboxPath { kind: SandboxPathKind, path: String },
}

/// A container mount point for a persistent volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub container_path: String,
    pub mode: VolumeMode,
    pub source: Option<VolumeSource>,
}

/// Disk metadata attached to a `disk` resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub source: Option<DiskSource>,
    pub persistence: Option<Persistence>,
    pub volume: Option<Volume>,
}

/// A named, typed resource as advertised or operated on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    /// Role declared at the resource level (statically reserved resources).
    pub role: Option<String>,
    /// Deprecated single-reservation field, kept for wire compatibility.
    pub reservation: Option<ReservationInfo>,
    /// Reservation stack; the last entry's role is the effective role.
    #[serde(default)]
    pub reservations: Vec<ReservationInfo>,
    pub disk: Option<DiskInfo>,
    pub value: Value,
}

impl Resource {
    /// An unreserved resource in the default role.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            role: None,
            reservation: None,
            reservations: Vec::new(),
            disk: None,
            value,
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_disk(mut self, disk: DiskInfo) -> Self {
        self.disk = Some(disk);
        self
    }

    pub fn has_reservation(&self) -> bool {
        self.reservation.is_some() || !self.reservations.is_empty()
    }
}

/// A resource offer from one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub agent_id: AgentId,
    pub hostname: String,
    pub resources: Vec<Resource>,
}

/// Command to run, with its environment and fetchable URIs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub value: Option<String>,
    #[serde(default)]
    pub uris: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Unified,
    Docker,
}

/// Container description; executor-level volumes are mirrored into each
/// task's volume list so sibling tasks share them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub kind: ContainerKind,
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

/// The executor a pod's tasks run under.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorInfo {
    pub executor_id: ExecutorId,
    pub name: String,
    pub command: Option<CommandInfo>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

/// The persisted task record; the state store keys these by task name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub name: String,
    pub task_id: TaskId,
    pub agent_id: Option<AgentId>,
    pub executor: Option<ExecutorInfo>,
    pub command: Option<CommandInfo>,
    pub container: Option<ContainerInfo>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub labels: Labels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Staging,
    Starting,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
}

/// Most recent status update for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    pub message: Option<String>,
}

/// An operation the driver can apply against one offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Reserve { resources: Vec<Resource> },
    Unreserve { resources: Vec<Resource> },
    Create { volumes: Vec<Resource> },
    Destroy { volumes: Vec<Resource> },
    Launch { tasks: Vec<TaskInfo> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_set_replaces_in_place() {
        let mut labels = Labels::default();
        labels.set("resource_id", "a");
        labels.set("resource_id", "b");
        assert_eq!(labels.get("resource_id"), Some("b"));
        assert_eq!(labels.0.len(), 1);
    }

    #[test]
    fn resource_roundtrips_through_json() {
        let resource = Resource::new(CPUS_RESOURCE, Value::Scalar(1.5)).with_role("svc-role");
        let json = serde_json::to_string(&resource).unwrap();
        let back: Resource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resource);
    }

    #[test]
    fn operation_tags_are_stable() {
        let op = Operation::Reserve {
            resources: vec![Resource::new(MEM_RESOURCE, Value::Scalar(256.0))],
        };
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"type\":\"reserve\""));
    }
}

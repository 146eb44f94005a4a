//! Desired-state model for a service's pods and their resources.
//!
//! A service declares pods; a pod is an ordered list of tasks co-located
//! on one agent. Each task binds to a resource set, which may be shared
//! across tasks in the pod. The evaluation core consumes these specs and
//! matches them against offers.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use berth_proto::Value;

use crate::placement::PlacementRule;

/// A plain divisible resource requirement (cpus, mem, root disk).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    pub value: Value,
    pub role: String,
    pub principal: Option<String>,
}

/// A port requirement. `port == 0` requests a dynamic port: the evaluator
/// picks the lowest port available in the role and records the choice in
/// the task environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    pub name: String,
    pub port: u64,
    pub role: String,
    pub principal: Option<String>,
}

/// A port requirement that is additionally advertised under a named VIP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedVipSpec {
    pub name: String,
    pub port: u64,
    pub vip_name: String,
    pub vip_port: u64,
    pub role: String,
    pub principal: Option<String>,
}

/// Kind of persistent volume backing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeKind {
    /// Carved out of the agent's root disk.
    Root,
    /// A whole dedicated disk; consumed atomically or not at all.
    Mount,
    /// A path on the agent's filesystem.
    Path,
}

/// A persistent volume requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    pub kind: VolumeKind,
    pub container_path: String,
    /// Disk quantity in MB.
    pub value: Value,
    pub role: String,
    pub principal: Option<String>,
}

/// One entry of a resource set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSetEntry {
    Simple(ResourceSpec),
    Port(PortSpec),
    NamedVip(NamedVipSpec),
}

impl ResourceSetEntry {
    pub fn name(&self) -> &str {
        match self {
            ResourceSetEntry::Simple(s) => &s.name,
            ResourceSetEntry::Port(p) => &p.name,
            ResourceSetEntry::NamedVip(v) => &v.name,
        }
    }
}

/// The resources a task consumes. Two tasks in a pod may reference the
/// same set (by id); the evaluator then acquires the resources once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    pub id: String,
    pub resources: Vec<ResourceSetEntry>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
}

/// A single task within a pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub resource_set: ResourceSet,
    pub command: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A pod type: co-located tasks plus an optional placement predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodSpec {
    pub name: String,
    /// How many instances of this pod the service runs.
    pub count: u32,
    pub tasks: Vec<TaskSpec>,
    /// Volumes owned by the executor and shared by every task in the pod.
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    /// Authored externally; the evaluation core only consults it.
    #[serde(skip)]
    pub placement_rule: Option<Arc<dyn PlacementRule>>,
}

/// One concrete instance of a pod type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodInstance {
    pub pod: PodSpec,
    pub index: u32,
}

impl PodInstance {
    pub fn new(pod: PodSpec, index: u32) -> Self {
        Self { pod, index }
    }

    /// Instance name, e.g. `data-0`.
    pub fn name(&self) -> String {
        format!("{}-{}", self.pod.name, self.index)
    }

    /// Persisted task name for one of this instance's tasks, e.g.
    /// `data-0-server`. The state store keys task records by this name.
    pub fn task_instance_name(&self, task_name: &str) -> String {
        format!("{}-{}", self.name(), task_name)
    }

    pub fn task_names(&self) -> Vec<String> {
        self.pod.tasks.iter().map(|t| t.name.clone()).collect()
    }
}

/// How a pod is being (re)launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryType {
    /// Normal deployment.
    None,
    /// Relaunch in place, reusing reservations.
    Transient,
    /// The pod is gone for good; discard previous reservations.
    Permanent,
}

/// What the plan manager asks the evaluator to place: a pod instance and
/// the subset of its tasks to actually launch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodInstanceRequirement {
    pub pod_instance: PodInstance,
    pub tasks_to_launch: BTreeSet<String>,
    pub recovery_type: RecoveryType,
}

impl PodInstanceRequirement {
    pub fn new(pod_instance: PodInstance, tasks_to_launch: BTreeSet<String>) -> Self {
        Self {
            pod_instance,
            tasks_to_launch,
            recovery_type: RecoveryType::None,
        }
    }

    pub fn with_recovery_type(mut self, recovery_type: RecoveryType) -> Self {
        self.recovery_type = recovery_type;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod() -> PodSpec {
        PodSpec {
            name: "data".to_string(),
            count: 3,
            tasks: vec![TaskSpec {
                name: "server".to_string(),
                resource_set: ResourceSet {
                    id: "server-resources".to_string(),
                    resources: Vec::new(),
                    volumes: Vec::new(),
                },
                command: Some("./server".to_string()),
                env: BTreeMap::new(),
            }],
            volumes: Vec::new(),
            placement_rule: None,
        }
    }

    #[test]
    fn instance_names_include_index() {
        let instance = PodInstance::new(pod(), 2);
        assert_eq!(instance.name(), "data-2");
        assert_eq!(instance.task_instance_name("server"), "data-2-server");
    }

    #[test]
    fn pod_spec_roundtrips_without_placement_rule() {
        let json = serde_json::to_string(&pod()).unwrap();
        let back: PodSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "data");
        assert!(back.placement_rule.is_none());
    }
}

//! Accumulates the in-progress task and executor messages for one pod.
//!
//! Stages contribute resources, environment variables and shared volumes
//! as they pass; the launch stage snapshots a finished `TaskInfo` out of
//! the accumulated state. A fresh builder is constructed per offer, so a
//! rejected offer leaves no residue.

use std::collections::BTreeMap;

use berth_proto::{
    CommandInfo, ContainerInfo, ContainerKind, ExecutorInfo, Offer, Resource, TaskInfo, Volume,
};
use berth_spec::{PodInstanceRequirement, SchedulerFlags};

use crate::ids::IdSource;

/// Label carrying the configuration UUID a task was launched against.
pub const TARGET_CONFIGURATION_LABEL: &str = "target_configuration";

pub struct PodInfoBuilder {
    /// In-progress task messages, keyed by spec-level task name.
    tasks: BTreeMap<String, TaskInfo>,
    executor: ExecutorInfo,
}

impl PodInfoBuilder {
    /// Seeds one in-progress task per task spec. Tasks that already exist
    /// in the state store restart from their persisted record (keeping
    /// command and environment, which carry earlier dynamic-port
    /// choices) with resources and ids cleared for re-accumulation.
    pub fn new(
        requirement: &PodInstanceRequirement,
        target_config_id: &str,
        flags: &SchedulerFlags,
        existing_tasks: &BTreeMap<String, TaskInfo>,
        executor_id: Option<&str>,
        ids: &dyn IdSource,
    ) -> Self {
        let pod_instance = &requirement.pod_instance;

        let mut tasks = BTreeMap::new();
        for task_spec in &pod_instance.pod.tasks {
            let instance_name = pod_instance.task_instance_name(&task_spec.name);
            let mut task = match existing_tasks.get(&instance_name) {
                Some(existing) => {
                    let mut task = existing.clone();
                    task.task_id.clear();
                    task.agent_id = None;
                    task.executor = None;
                    task.resources.clear();
                    task.container = None;
                    task
                }
                None => TaskInfo {
                    name: instance_name,
                    command: Some(CommandInfo {
                        value: task_spec.command.clone(),
                        uris: Vec::new(),
                        environment: task_spec.env.clone(),
                    }),
                    ..TaskInfo::default()
                },
            };
            task.labels.set(TARGET_CONFIGURATION_LABEL, target_config_id);
            tasks.insert(task_spec.name.clone(), task);
        }

        let executor = match executor_id {
            Some(id) => {
                // Reuse the running executor, resources included; executor
                // volume stages rebind against them by label.
                let persisted = existing_tasks
                    .values()
                    .filter_map(|t| t.executor.as_ref())
                    .find(|e| e.executor_id == id);
                match persisted {
                    Some(executor) => executor.clone(),
                    None => ExecutorInfo {
                        executor_id: id.to_string(),
                        name: pod_instance.name(),
                        ..ExecutorInfo::default()
                    },
                }
            }
            None => ExecutorInfo {
                executor_id: format!("{}__executor__{}", pod_instance.name(), ids.next_id()),
                name: pod_instance.name(),
                command: Some(executor_command(flags)),
                resources: Vec::new(),
            },
        };

        Self { tasks, executor }
    }

    /// Appends a finished resource to the named task, or to the executor
    /// when no task name is given.
    pub fn add_resource(&mut self, task_name: Option<&str>, resource: Resource) {
        match task_name.and_then(|n| self.tasks.get_mut(n)) {
            Some(task) => task.resources.push(resource),
            None => self.executor.resources.push(resource),
        }
    }

    /// Records an environment variable on the named task's command, or on
    /// the executor command when no task name is given.
    pub fn set_env(&mut self, task_name: Option<&str>, key: &str, value: String) {
        let command = match task_name.and_then(|n| self.tasks.get_mut(n)) {
            Some(task) => task.command.get_or_insert_with(CommandInfo::default),
            None => self.executor.command.get_or_insert_with(CommandInfo::default),
        };
        command.environment.insert(key.to_string(), value);
    }

    /// Declares an executor-level volume in every task's container so
    /// sibling tasks share it.
    pub fn add_volume_to_all_tasks(&mut self, volume: Volume) {
        for task in self.tasks.values_mut() {
            let container = task.container.get_or_insert_with(|| ContainerInfo {
                kind: ContainerKind::Unified,
                volumes: Vec::new(),
            });
            container.volumes.push(volume.clone());
        }
    }

    pub fn executor_resources(&self) -> &[Resource] {
        &self.executor.resources
    }

    pub fn task(&self, task_name: &str) -> Option<&TaskInfo> {
        self.tasks.get(task_name)
    }

    /// Snapshots a launchable `TaskInfo`: fresh task id, the offer's
    /// agent, and the shared executor attached.
    pub fn build_task(
        &self,
        task_name: &str,
        offer: &Offer,
        ids: &dyn IdSource,
    ) -> Option<TaskInfo> {
        let mut task = self.tasks.get(task_name)?.clone();
        task.task_id = format!("{}__{}", task.name, ids.next_id());
        task.agent_id = Some(offer.agent_id.clone());
        task.executor = Some(self.executor.clone());
        Some(task)
    }
}

fn executor_command(flags: &SchedulerFlags) -> CommandInfo {
    let mut uris = Vec::new();
    if let Some(uri) = &flags.executor_uri {
        uris.push(uri.clone());
    }
    if let Some(uri) = &flags.libmesos_uri {
        uris.push(uri.clone());
    }
    CommandInfo {
        value: Some("./executor/bin/berth-executor".to_string()),
        uris,
        environment: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use berth_proto::{Value, VolumeMode};
    use berth_spec::{PodInstance, PodSpec, ResourceSet, TaskSpec};

    use crate::ids::SequentialIds;

    fn requirement() -> PodInstanceRequirement {
        let pod = PodSpec {
            name: "data".to_string(),
            count: 1,
            tasks: vec![
                task_spec("server"),
                task_spec("sidecar"),
            ],
            volumes: Vec::new(),
            placement_rule: None,
        };
        PodInstanceRequirement::new(
            PodInstance::new(pod, 0),
            BTreeSet::from(["server".to_string()]),
        )
    }

    fn task_spec(name: &str) -> TaskSpec {
        TaskSpec {
            name: name.to_string(),
            resource_set: ResourceSet {
                id: format!("{name}-resources"),
                resources: Vec::new(),
                volumes: Vec::new(),
            },
            command: Some(format!("./{name}")),
            env: BTreeMap::new(),
        }
    }

    fn builder() -> PodInfoBuilder {
        let ids = SequentialIds::default();
        PodInfoBuilder::new(
            &requirement(),
            "config-uuid",
            &SchedulerFlags::default(),
            &BTreeMap::new(),
            None,
            &ids,
        )
    }

    #[test]
    fn seeds_one_task_per_spec() {
        let b = builder();
        assert_eq!(b.task("server").unwrap().name, "data-0-server");
        assert_eq!(b.task("sidecar").unwrap().name, "data-0-sidecar");
        assert_eq!(
            b.task("server").unwrap().labels.get(TARGET_CONFIGURATION_LABEL),
            Some("config-uuid")
        );
    }

    #[test]
    fn resources_route_to_task_or_executor() {
        let mut b = builder();
        b.add_resource(Some("server"), Resource::new("cpus", Value::Scalar(0.5)));
        b.add_resource(None, Resource::new("disk", Value::Scalar(1000.0)));

        assert_eq!(b.task("server").unwrap().resources.len(), 1);
        assert_eq!(b.executor_resources().len(), 1);
    }

    #[test]
    fn executor_volume_is_shared_by_all_tasks() {
        let mut b = builder();
        b.add_volume_to_all_tasks(Volume {
            container_path: "/shared".to_string(),
            mode: VolumeMode::Rw,
            source: None,
        });

        for task in ["server", "sidecar"] {
            let container = b.task(task).unwrap().container.as_ref().unwrap();
            assert_eq!(container.volumes.len(), 1);
        }
    }

    #[test]
    fn build_task_attaches_ids_and_executor() {
        let ids = SequentialIds::default();
        let b = PodInfoBuilder::new(
            &requirement(),
            "config-uuid",
            &SchedulerFlags::default(),
            &BTreeMap::new(),
            None,
            &ids,
        );
        let offer = Offer {
            id: "offer-1".to_string(),
            agent_id: "agent-9".to_string(),
            hostname: "node-9.example".to_string(),
            resources: Vec::new(),
        };

        let task = b.build_task("server", &offer, &ids).unwrap();
        assert!(task.task_id.starts_with("data-0-server__"));
        assert_eq!(task.agent_id.as_deref(), Some("agent-9"));
        let executor = task.executor.unwrap();
        assert!(executor.executor_id.starts_with("data-0__executor__"));
    }

    #[test]
    fn existing_task_restarts_from_persisted_record() {
        let mut existing = BTreeMap::new();
        let mut env = BTreeMap::new();
        env.insert("PORT_HTTP".to_string(), "31415".to_string());
        existing.insert(
            "data-0-server".to_string(),
            TaskInfo {
                name: "data-0-server".to_string(),
                task_id: "data-0-server__old".to_string(),
                command: Some(CommandInfo {
                    value: Some("./server".to_string()),
                    uris: Vec::new(),
                    environment: env,
                }),
                resources: vec![Resource::new("cpus", Value::Scalar(0.5))],
                ..TaskInfo::default()
            },
        );

        let ids = SequentialIds::default();
        let b = PodInfoBuilder::new(
            &requirement(),
            "config-uuid",
            &SchedulerFlags::default(),
            &existing,
            None,
            &ids,
        );

        let task = b.task("server").unwrap();
        assert!(task.task_id.is_empty());
        assert!(task.resources.is_empty());
        // Earlier dynamic-port choices ride along in the environment.
        assert_eq!(
            task.command.as_ref().unwrap().environment.get("PORT_HTTP"),
            Some(&"31415".to_string())
        );
    }
}

//! Matches a task's persisted resources against its current spec.
//!
//! On relaunch of an existing task, every previously reserved resource
//! either still corresponds to a spec entry (rebind it, keeping its
//! reservation and persistence ids), no longer corresponds to anything
//! (orphaned: release it), or the spec grew and wants something the task
//! never held (reserve it fresh). The mapper partitions the persisted
//! record accordingly and emits the matching evaluation stages.

use tracing::warn;

use berth_proto::{Resource, TaskInfo, PORTS_RESOURCE};
use berth_spec::{ResourceSetEntry, TaskSpec, VolumeSpec};

use crate::evaluate::stages::{ordered_entries, EvaluationStage, VolumeStage};
use crate::resource::{OfferedResource, DYNAMIC_PORT_LABEL};

pub struct TaskResourceMapper {
    orphaned: Vec<Resource>,
    stages: Vec<EvaluationStage>,
}

impl TaskResourceMapper {
    pub fn new(task_spec: &TaskSpec, task_info: &TaskInfo) -> Self {
        let mut remaining: Vec<ResourceSetEntry> = task_spec.resource_set.resources.clone();
        let mut remaining_volumes: Vec<VolumeSpec> = task_spec.resource_set.volumes.clone();

        let mut orphaned = Vec::new();
        let mut stages = Vec::new();

        for resource in &task_info.resources {
            let view = OfferedResource::new(resource.clone());
            let Some(resource_id) = view.resource_id().map(str::to_string) else {
                warn!(
                    task = %task_info.name,
                    name = %resource.name,
                    "persisted resource carries no reservation id; ignoring"
                );
                continue;
            };

            let persistence = resource
                .disk
                .as_ref()
                .and_then(|d| d.persistence.as_ref());
            if let Some(persistence) = persistence {
                // Volumes match on their container path.
                let container_path = resource
                    .disk
                    .as_ref()
                    .and_then(|d| d.volume.as_ref())
                    .map(|v| v.container_path.as_str());
                let matched = remaining_volumes
                    .iter()
                    .position(|v| Some(v.container_path.as_str()) == container_path);
                match matched {
                    Some(at) => {
                        let spec = remaining_volumes.remove(at);
                        stages.push(EvaluationStage::Volume(VolumeStage {
                            spec,
                            task_name: Some(task_spec.name.clone()),
                            resource_id: Some(resource_id),
                            persistence_id: Some(persistence.id.clone()),
                        }));
                    }
                    None => orphaned.push(resource.clone()),
                }
            } else if resource.name == PORTS_RESOURCE {
                let Some(port) = view.value().lowest() else {
                    orphaned.push(resource.clone());
                    continue;
                };
                // A dynamic port matches its spec by name; a static port
                // matches by number.
                let dynamic_for = view.reservation_label(DYNAMIC_PORT_LABEL);
                let matches = |name: &str, spec_port: u64| match dynamic_for {
                    Some(dyn_name) => spec_port == 0 && name == dyn_name,
                    None => spec_port == port,
                };
                let matched = remaining.iter().position(|entry| match entry {
                    ResourceSetEntry::Port(p) => matches(&p.name, p.port),
                    ResourceSetEntry::NamedVip(v) => matches(&v.name, v.port),
                    ResourceSetEntry::Simple(_) => false,
                });
                match matched {
                    Some(at) => {
                        let entry = remaining.remove(at);
                        stages.push(EvaluationStage::for_entry(
                            &entry,
                            &task_spec.name,
                            Some(resource_id),
                            Some(port),
                        ));
                    }
                    None => orphaned.push(resource.clone()),
                }
            } else {
                let matched = remaining.iter().position(|entry| match entry {
                    ResourceSetEntry::Simple(s) => {
                        s.name == resource.name && s.role == view.role()
                    }
                    _ => false,
                });
                match matched {
                    Some(at) => {
                        let entry = remaining.remove(at);
                        stages.push(EvaluationStage::for_entry(
                            &entry,
                            &task_spec.name,
                            Some(resource_id),
                            None,
                        ));
                    }
                    None => orphaned.push(resource.clone()),
                }
            }
        }

        // Specs the persisted task never held: acquire them fresh, in the
        // same static-port / dynamic-port / scalar order as a new pod.
        for entry in ordered_entries(&remaining) {
            stages.push(EvaluationStage::for_entry(entry, &task_spec.name, None, None));
        }
        for spec in remaining_volumes {
            stages.push(EvaluationStage::Volume(VolumeStage {
                spec,
                task_name: Some(task_spec.name.clone()),
                resource_id: None,
                persistence_id: None,
            }));
        }

        Self { orphaned, stages }
    }

    /// Persisted resources with no corresponding spec; each yields an
    /// UNRESERVE (preceded by a DESTROY for persistent volumes).
    pub fn orphaned_resources(&self) -> &[Resource] {
        &self.orphaned
    }

    pub fn into_stages(self) -> Vec<EvaluationStage> {
        self.stages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use berth_proto::{
        DiskInfo, Labels, Persistence, ReservationInfo, Value, Volume, VolumeMode,
    };
    use berth_spec::{PortSpec, ResourceSet, ResourceSpec, VolumeKind};

    use crate::resource::RESOURCE_ID_LABEL;

    fn reserved(mut resource: Resource, role: &str, id: &str) -> Resource {
        let mut labels = Labels::default();
        labels.set(RESOURCE_ID_LABEL, id);
        resource.reservations.push(ReservationInfo {
            role: Some(role.to_string()),
            principal: None,
            labels,
        });
        resource
    }

    fn dynamic_port_resource(port: u64, spec_name: &str, id: &str) -> Resource {
        let mut resource = reserved(
            Resource::new(PORTS_RESOURCE, Value::port(port)),
            "svc-role",
            id,
        );
        resource.reservations[0]
            .labels
            .set(DYNAMIC_PORT_LABEL, spec_name);
        resource
    }

    fn volume_resource(container_path: &str, id: &str, persistence_id: &str) -> Resource {
        reserved(
            Resource::new("disk", Value::Scalar(5000.0)),
            "svc-role",
            id,
        )
        .with_disk(DiskInfo {
            source: None,
            persistence: Some(Persistence {
                id: persistence_id.to_string(),
                principal: None,
            }),
            volume: Some(Volume {
                container_path: container_path.to_string(),
                mode: VolumeMode::Rw,
                source: None,
            }),
        })
    }

    fn task_spec(entries: Vec<ResourceSetEntry>, volumes: Vec<VolumeSpec>) -> TaskSpec {
        TaskSpec {
            name: "server".to_string(),
            resource_set: ResourceSet {
                id: "server-resources".to_string(),
                resources: entries,
                volumes,
            },
            command: None,
            env: BTreeMap::new(),
        }
    }

    fn simple(name: &str, amount: f64) -> ResourceSetEntry {
        ResourceSetEntry::Simple(ResourceSpec {
            name: name.to_string(),
            value: Value::Scalar(amount),
            role: "svc-role".to_string(),
            principal: None,
        })
    }

    fn task_info(resources: Vec<Resource>) -> TaskInfo {
        TaskInfo {
            name: "data-0-server".to_string(),
            resources,
            ..TaskInfo::default()
        }
    }

    #[test]
    fn matched_resources_become_seeded_stages() {
        let spec = task_spec(vec![simple("cpus", 0.5)], Vec::new());
        let info = task_info(vec![reserved(
            Resource::new("cpus", Value::Scalar(0.5)),
            "svc-role",
            "r1",
        )]);

        let mapper = TaskResourceMapper::new(&spec, &info);
        assert!(mapper.orphaned_resources().is_empty());

        let stages = mapper.into_stages();
        assert_eq!(stages.len(), 1);
        match &stages[0] {
            EvaluationStage::Resource(stage) => {
                assert_eq!(stage.resource_id.as_deref(), Some("r1"));
            }
            other => panic!("expected resource stage, got {other:?}"),
        }
    }

    #[test]
    fn unmatched_persisted_resource_is_orphaned() {
        let spec = task_spec(vec![simple("cpus", 0.5)], Vec::new());
        let info = task_info(vec![
            reserved(Resource::new("cpus", Value::Scalar(0.5)), "svc-role", "r1"),
            reserved(Resource::new("mem", Value::Scalar(256.0)), "svc-role", "r2"),
        ]);

        let mapper = TaskResourceMapper::new(&spec, &info);
        assert_eq!(mapper.orphaned_resources().len(), 1);
        assert_eq!(mapper.orphaned_resources()[0].name, "mem");
    }

    #[test]
    fn every_orphan_is_reported_exactly_once() {
        let spec = task_spec(Vec::new(), Vec::new());
        let info = task_info(vec![
            reserved(Resource::new("cpus", Value::Scalar(0.5)), "svc-role", "r1"),
            reserved(Resource::new("mem", Value::Scalar(256.0)), "svc-role", "r2"),
            volume_resource("/data", "r3", "p1"),
        ]);

        let mapper = TaskResourceMapper::new(&spec, &info);
        assert_eq!(mapper.orphaned_resources().len(), 3);
        assert!(mapper.into_stages().is_empty());
    }

    #[test]
    fn dynamic_port_rebinds_by_spec_name() {
        let spec = task_spec(
            vec![ResourceSetEntry::Port(PortSpec {
                name: "http".to_string(),
                port: 0,
                role: "svc-role".to_string(),
                principal: None,
            })],
            Vec::new(),
        );
        let info = task_info(vec![dynamic_port_resource(31007, "http", "r1")]);

        let mapper = TaskResourceMapper::new(&spec, &info);
        let stages = mapper.into_stages();
        match &stages[0] {
            EvaluationStage::Port(stage) => {
                assert_eq!(stage.resource_id.as_deref(), Some("r1"));
                assert_eq!(stage.existing_port, Some(31007));
            }
            other => panic!("expected port stage, got {other:?}"),
        }
    }

    #[test]
    fn static_port_matches_by_number() {
        let spec = task_spec(
            vec![ResourceSetEntry::Port(PortSpec {
                name: "admin".to_string(),
                port: 8443,
                role: "svc-role".to_string(),
                principal: None,
            })],
            Vec::new(),
        );
        let wrong_port = task_info(vec![reserved(
            Resource::new(PORTS_RESOURCE, Value::port(9000)),
            "svc-role",
            "r1",
        )]);

        let mapper = TaskResourceMapper::new(&spec, &wrong_port);
        assert_eq!(mapper.orphaned_resources().len(), 1);
        // The spec itself is re-acquired fresh.
        assert_eq!(mapper.into_stages().len(), 1);
    }

    #[test]
    fn volume_matches_by_container_path() {
        let volume_spec = VolumeSpec {
            name: "disk".to_string(),
            kind: VolumeKind::Root,
            container_path: "/data".to_string(),
            value: Value::Scalar(5000.0),
            role: "svc-role".to_string(),
            principal: None,
        };
        let spec = task_spec(Vec::new(), vec![volume_spec]);
        let info = task_info(vec![volume_resource("/data", "r1", "p1")]);

        let mapper = TaskResourceMapper::new(&spec, &info);
        assert!(mapper.orphaned_resources().is_empty());
        let stages = mapper.into_stages();
        match &stages[0] {
            EvaluationStage::Volume(stage) => {
                assert_eq!(stage.resource_id.as_deref(), Some("r1"));
                assert_eq!(stage.persistence_id.as_deref(), Some("p1"));
            }
            other => panic!("expected volume stage, got {other:?}"),
        }
    }

    #[test]
    fn grown_spec_is_acquired_fresh() {
        let spec = task_spec(vec![simple("cpus", 0.5), simple("mem", 256.0)], Vec::new());
        let info = task_info(vec![reserved(
            Resource::new("cpus", Value::Scalar(0.5)),
            "svc-role",
            "r1",
        )]);

        let mapper = TaskResourceMapper::new(&spec, &info);
        let stages = mapper.into_stages();
        assert_eq!(stages.len(), 2);
        match &stages[1] {
            EvaluationStage::Resource(stage) => {
                assert_eq!(stage.spec.name, "mem");
                assert!(stage.resource_id.is_none());
            }
            other => panic!("expected fresh resource stage, got {other:?}"),
        }
    }

    #[test]
    fn role_mismatch_does_not_match() {
        let spec = task_spec(vec![simple("cpus", 0.5)], Vec::new());
        let info = task_info(vec![reserved(
            Resource::new("cpus", Value::Scalar(0.5)),
            "other-role",
            "r1",
        )]);

        let mapper = TaskResourceMapper::new(&spec, &info);
        assert_eq!(mapper.orphaned_resources().len(), 1);
    }
}

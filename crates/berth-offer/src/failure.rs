//! Permanent-failure classification.
//!
//! The recovery path marks tasks permanently failed in the state store;
//! the evaluator consults those marks to decide whether a pod's previous
//! reservations should be ignored. Releasing the stranded reservations
//! themselves is the recovery path's job, not the evaluator's.

use berth_spec::PodInstance;
use berth_state::{StateResult, TaskStore};

/// A pod is failed as a whole if any of its tasks is marked failed.
pub fn is_pod_marked_failed(
    store: &dyn TaskStore,
    pod_instance: &PodInstance,
) -> StateResult<bool> {
    for task in &pod_instance.pod.tasks {
        let task_name = pod_instance.task_instance_name(&task.name);
        if store.is_marked_failed(&task_name)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use berth_proto::TaskInfo;
    use berth_spec::{PodSpec, ResourceSet, TaskSpec};
    use berth_state::StateStore;

    fn pod_instance() -> PodInstance {
        PodInstance::new(
            PodSpec {
                name: "data".to_string(),
                count: 1,
                tasks: vec![TaskSpec {
                    name: "server".to_string(),
                    resource_set: ResourceSet {
                        id: "server-resources".to_string(),
                        resources: Vec::new(),
                        volumes: Vec::new(),
                    },
                    command: None,
                    env: BTreeMap::new(),
                }],
                volumes: Vec::new(),
                placement_rule: None,
            },
            0,
        )
    }

    #[test]
    fn unmarked_pod_is_not_failed() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(!is_pod_marked_failed(&store, &pod_instance()).unwrap());
    }

    #[test]
    fn any_marked_task_fails_the_pod() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_task(&TaskInfo {
                name: "data-0-server".to_string(),
                ..TaskInfo::default()
            })
            .unwrap();
        store.mark_failed("data-0-server").unwrap();

        assert!(is_pod_marked_failed(&store, &pod_instance()).unwrap());
    }
}

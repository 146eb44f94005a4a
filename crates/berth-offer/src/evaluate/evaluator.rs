//! The offer evaluator: classify the pod, build the stage pipeline, run
//! it against each offer until one satisfies everything.
//!
//! Evaluation owns its inputs. Each offer gets a fresh resource pool and
//! pod-info builder, so a rejected offer discards all partial state. The
//! first offer for which every stage passes wins; its recommendations are
//! returned in stage order and later offers are not consulted. When no
//! offer matches, the result is an empty list and the caller declines the
//! cycle's offers.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use berth_proto::{Offer, TaskInfo, TaskState};
use berth_spec::{PodInstanceRequirement, RecoveryType, SchedulerFlags, VolumeSpec};
use berth_state::TaskStore;

use crate::error::{EvalError, EvalResult};
use crate::evaluate::builder::PodInfoBuilder;
use crate::evaluate::outcome::Outcome;
use crate::evaluate::stages::{
    ordered_entries, EvaluationStage, LaunchStage, PlacementStage, UnreserveStage, VolumeStage,
};
use crate::failure;
use crate::ids::{IdSource, RandomIds};
use crate::mapper::TaskResourceMapper;
use crate::pool::ResourcePool;
use crate::recommend::Recommendation;
use crate::resource::OfferedResource;

pub struct OfferEvaluator {
    store: Arc<dyn TaskStore>,
    service_name: String,
    target_config_id: Uuid,
    flags: SchedulerFlags,
    ids: Arc<dyn IdSource>,
}

impl OfferEvaluator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        service_name: impl Into<String>,
        target_config_id: Uuid,
        flags: SchedulerFlags,
    ) -> Self {
        Self {
            store,
            service_name: service_name.into(),
            target_config_id,
            flags,
            ids: Arc::new(RandomIds),
        }
    }

    /// Substitute the id source; tests use a deterministic sequence.
    pub fn with_id_source(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    /// Evaluates the offers in order against the pod requirement and
    /// returns the recommendations of the first satisfying offer, or an
    /// empty list when none satisfies it.
    pub fn evaluate(
        &self,
        requirement: &PodInstanceRequirement,
        offers: &[Offer],
    ) -> EvalResult<Vec<Recommendation>> {
        validate_requirement(requirement)?;

        let pod_instance = &requirement.pod_instance;

        // Snapshot the store once; evaluation never re-reads mid-pipeline.
        let all_tasks = self.store.fetch_tasks()?;
        let mut this_pod_tasks: BTreeMap<String, TaskInfo> = BTreeMap::new();
        for task in &pod_instance.pod.tasks {
            let instance_name = pod_instance.task_instance_name(&task.name);
            if let Some(info) = all_tasks.iter().find(|t| t.name == instance_name) {
                this_pod_tasks.insert(instance_name, info.clone());
            }
        }

        let mut any_task_running = false;
        for task_name in this_pod_tasks.keys() {
            if let Some(status) = self.store.fetch_status(task_name)? {
                if status.state == TaskState::Running {
                    any_task_running = true;
                    break;
                }
            }
        }
        let executor_id = if any_task_running {
            this_pod_tasks
                .values()
                .find_map(|t| t.executor.as_ref())
                .map(|e| e.executor_id.clone())
        } else {
            None
        };

        for (index, offer) in offers.iter().enumerate() {
            let stages = self.evaluation_pipeline(requirement, &all_tasks, &this_pod_tasks)?;
            if stages.is_empty() {
                info!(
                    offer = index + 1,
                    pod = %pod_instance.name(),
                    "no evaluation pipeline could be built; treating offer as insufficient"
                );
                continue;
            }

            let mut pool = ResourcePool::new(offer.clone());
            let mut builder = PodInfoBuilder::new(
                requirement,
                &self.target_config_id.to_string(),
                &self.flags,
                &this_pod_tasks,
                executor_id.as_deref(),
                self.ids.as_ref(),
            );

            let mut outcomes = Vec::with_capacity(stages.len());
            let mut failed = 0;
            for stage in &stages {
                let outcome = stage.evaluate(&mut pool, &mut builder, self.ids.as_ref());
                if !outcome.is_passing() {
                    failed += 1;
                }
                outcomes.push(outcome);
            }

            let details = render_outcomes(&outcomes);
            if failed != 0 {
                info!(
                    offer = index + 1,
                    failed,
                    total = stages.len(),
                    "offer failed evaluation stages:\n{details}"
                );
                continue;
            }

            let recommendations: Vec<Recommendation> = outcomes
                .into_iter()
                .flat_map(Outcome::into_recommendations)
                .collect();
            info!(
                offer = index + 1,
                stages = stages.len(),
                recommendations = recommendations.len(),
                service = %self.service_name,
                "offer passed all evaluation stages:\n{details}"
            );
            return Ok(recommendations);
        }

        Ok(Vec::new())
    }

    fn evaluation_pipeline(
        &self,
        requirement: &PodInstanceRequirement,
        all_tasks: &[TaskInfo],
        this_pod_tasks: &BTreeMap<String, TaskInfo>,
    ) -> EvalResult<Vec<EvaluationStage>> {
        let pod_instance = &requirement.pod_instance;
        let mut stages = Vec::new();

        if let Some(rule) = &pod_instance.pod.placement_rule {
            stages.push(EvaluationStage::Placement(PlacementStage {
                rule: rule.clone(),
                all_tasks: all_tasks.to_vec(),
            }));
        }

        let no_launched_tasks_exist = this_pod_tasks
            .values()
            .flat_map(|t| t.resources.iter())
            .all(|r| OfferedResource::new(r.clone()).resource_id().is_none());

        let pod_has_failed = requirement.recovery_type == RecoveryType::Permanent
            || failure::is_pod_marked_failed(self.store.as_ref(), pod_instance)?;

        let kind = if pod_has_failed {
            "failed"
        } else if no_launched_tasks_exist {
            "new"
        } else {
            "existing"
        };
        info!(
            pod = %pod_instance.name(),
            kind,
            tasks = ?requirement.tasks_to_launch,
            "generating pod requirement"
        );

        // A pipeline can only come back empty when an existing pod's task
        // record is missing; the caller skips the offer in that case.
        if pod_has_failed || no_launched_tasks_exist {
            stages.extend(new_pipeline(requirement));
        } else {
            let task_stages = existing_pipeline(requirement, this_pod_tasks)?;
            if task_stages.is_empty() {
                return Ok(Vec::new());
            }
            stages.extend(task_stages);
        }

        Ok(stages)
    }
}

/// Stage pipeline for a pod with no prior reservations: executor-level
/// volumes first, then each resource set once, each finished by a launch
/// stage for its representative task.
fn new_pipeline(requirement: &PodInstanceRequirement) -> Vec<EvaluationStage> {
    let pod_instance = &requirement.pod_instance;
    let mut stages = Vec::new();

    for volume in &pod_instance.pod.volumes {
        stages.push(EvaluationStage::Volume(VolumeStage {
            spec: volume.clone(),
            task_name: None,
            resource_id: None,
            persistence_id: None,
        }));
    }

    let mut seen_resource_sets = BTreeSet::new();
    for task in &pod_instance.pod.tasks {
        if !seen_resource_sets.insert(task.resource_set.id.clone()) {
            continue;
        }

        for entry in ordered_entries(&task.resource_set.resources) {
            stages.push(EvaluationStage::for_entry(entry, &task.name, None, None));
        }
        for volume in &task.resource_set.volumes {
            stages.push(EvaluationStage::Volume(VolumeStage {
                spec: volume.clone(),
                task_name: Some(task.name.clone()),
                resource_id: None,
                persistence_id: None,
            }));
        }

        stages.push(EvaluationStage::Launch(LaunchStage {
            task_name: task.name.clone(),
            should_launch: requirement.tasks_to_launch.contains(&task.name),
        }));
    }

    stages
}

/// Stage pipeline for a pod with live reservations: rebind everything the
/// task records still hold, release orphans, acquire what the spec grew.
fn existing_pipeline(
    requirement: &PodInstanceRequirement,
    this_pod_tasks: &BTreeMap<String, TaskInfo>,
) -> EvalResult<Vec<EvaluationStage>> {
    let pod_instance = &requirement.pod_instance;
    let mut stages = Vec::new();

    // Executor-level volumes rebind against the persisted executor record.
    let executor_resources = this_pod_tasks
        .values()
        .find_map(|t| t.executor.as_ref())
        .map(|e| e.resources.as_slice())
        .unwrap_or(&[]);
    for volume in &pod_instance.pod.volumes {
        stages.push(executor_volume_stage(volume, executor_resources));
    }

    for task in &pod_instance.pod.tasks {
        if !requirement.tasks_to_launch.contains(&task.name) {
            continue;
        }

        let instance_name = pod_instance.task_instance_name(&task.name);
        let Some(task_info) = this_pod_tasks.get(&instance_name) else {
            error!(
                task = %instance_name,
                "failed to fetch persisted task; cannot generate resource map"
            );
            return Ok(Vec::new());
        };

        let mapper = TaskResourceMapper::new(task, task_info);
        for orphan in mapper.orphaned_resources() {
            stages.push(EvaluationStage::Unreserve(UnreserveStage {
                resource: orphan.clone(),
            }));
        }
        stages.extend(mapper.into_stages());

        stages.push(EvaluationStage::Launch(LaunchStage {
            task_name: task.name.clone(),
            should_launch: requirement.tasks_to_launch.contains(&task.name),
        }));
    }

    Ok(stages)
}

/// Seeds an executor-volume stage with the persisted reservation and
/// persistence ids when the executor already holds the volume.
fn executor_volume_stage(
    volume: &VolumeSpec,
    executor_resources: &[berth_proto::Resource],
) -> EvaluationStage {
    let persisted = executor_resources.iter().find(|r| {
        r.disk
            .as_ref()
            .and_then(|d| d.volume.as_ref())
            .map(|v| v.container_path.as_str())
            == Some(volume.container_path.as_str())
    });

    let (resource_id, persistence_id) = match persisted {
        Some(resource) => (
            OfferedResource::new(resource.clone())
                .resource_id()
                .map(str::to_string),
            resource
                .disk
                .as_ref()
                .and_then(|d| d.persistence.as_ref())
                .map(|p| p.id.clone()),
        ),
        None => (None, None),
    };

    EvaluationStage::Volume(VolumeStage {
        spec: volume.clone(),
        task_name: None,
        resource_id,
        persistence_id,
    })
}

fn validate_requirement(requirement: &PodInstanceRequirement) -> EvalResult<()> {
    let pod_instance = &requirement.pod_instance;
    if pod_instance.pod.tasks.is_empty() {
        return Err(EvalError::InvalidRequirement(format!(
            "pod '{}' has no tasks",
            pod_instance.name()
        )));
    }

    let mut names = BTreeSet::new();
    for task in &pod_instance.pod.tasks {
        if !names.insert(task.name.as_str()) {
            return Err(EvalError::InvalidRequirement(format!(
                "duplicate task name '{}' in pod '{}'",
                task.name,
                pod_instance.name()
            )));
        }
        if task.resource_set.id.is_empty() {
            return Err(EvalError::InvalidRequirement(format!(
                "task '{}' has no resource set id",
                task.name
            )));
        }
    }

    for name in &requirement.tasks_to_launch {
        if !names.contains(name.as_str()) {
            return Err(EvalError::InvalidRequirement(format!(
                "unknown task '{name}' in tasks to launch"
            )));
        }
    }

    Ok(())
}

/// Renders the outcome tree the way it is logged: one line per outcome,
/// children indented two further spaces.
fn render_outcomes(outcomes: &[Outcome]) -> String {
    fn render(buf: &mut String, outcome: &Outcome, indent: &str) {
        let _ = writeln!(buf, "  {indent}{outcome}");
        let child_indent = format!("{indent}  ");
        for child in outcome.children() {
            render(buf, child, &child_indent);
        }
    }

    let mut buf = String::new();
    for outcome in outcomes {
        render(&mut buf, outcome, "");
    }
    buf.trim_end().to_string()
}

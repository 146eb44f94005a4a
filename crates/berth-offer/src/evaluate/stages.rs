//! Per-resource-kind evaluation stages.
//!
//! Every stage implements one contract: inspect and mutate the offer's
//! resource pool and the pod-info builder, and report an `Outcome` with
//! zero or more operation recommendations. The orchestrator runs every
//! stage of the pipeline even after a failure, so an offer rejection logs
//! the complete reason set.
//!
//! The shared "reserve when new, rebind when a reservation id is known"
//! behavior lives in free helpers; the stage variants only differ in what
//! they ask for and which labels and protos they emit.

use std::sync::Arc;

use berth_proto::{
    Labels, Persistence, ReservationInfo, Resource, SandboxPathKind, TaskInfo, Value, Volume,
    VolumeMode, VolumeSource, DISK_RESOURCE, PORTS_RESOURCE,
};
use berth_spec::{
    NamedVipSpec, PlacementRule, PortSpec, ResourceSetEntry, ResourceSpec, VolumeKind, VolumeSpec,
};

use crate::evaluate::builder::PodInfoBuilder;
use crate::evaluate::outcome::Outcome;
use crate::ids::IdSource;
use crate::pool::ResourcePool;
use crate::recommend::Recommendation;
use crate::requirement::ResourceRequirement;
use crate::resource::{
    OfferedResource, DYNAMIC_PORT_LABEL, RESOURCE_ID_LABEL, VIP_NAME_LABEL, VIP_PORT_LABEL,
};

/// One unit of the evaluation pipeline.
#[derive(Debug)]
pub enum EvaluationStage {
    Placement(PlacementStage),
    Resource(ResourceStage),
    Port(PortStage),
    NamedVip(NamedVipStage),
    Volume(VolumeStage),
    Launch(LaunchStage),
    Unreserve(UnreserveStage),
}

impl EvaluationStage {
    pub fn evaluate(
        &self,
        pool: &mut ResourcePool,
        builder: &mut PodInfoBuilder,
        ids: &dyn IdSource,
    ) -> Outcome {
        match self {
            EvaluationStage::Placement(stage) => stage.evaluate(pool),
            EvaluationStage::Resource(stage) => stage.evaluate(pool, builder, ids),
            EvaluationStage::Port(stage) => stage.evaluate(pool, builder, ids),
            EvaluationStage::NamedVip(stage) => stage.evaluate(pool, builder, ids),
            EvaluationStage::Volume(stage) => stage.evaluate(pool, builder, ids),
            EvaluationStage::Launch(stage) => stage.evaluate(pool, builder, ids),
            EvaluationStage::Unreserve(stage) => stage.evaluate(pool),
        }
    }

    /// Builds the stage for one resource-set entry.
    pub fn for_entry(
        entry: &ResourceSetEntry,
        task_name: &str,
        resource_id: Option<String>,
        existing_port: Option<u64>,
    ) -> Self {
        match entry {
            ResourceSetEntry::Simple(spec) => EvaluationStage::Resource(ResourceStage {
                spec: spec.clone(),
                task_name: Some(task_name.to_string()),
                resource_id,
            }),
            ResourceSetEntry::Port(spec) => EvaluationStage::Port(PortStage {
                spec: spec.clone(),
                task_name: Some(task_name.to_string()),
                resource_id,
                existing_port,
            }),
            ResourceSetEntry::NamedVip(spec) => EvaluationStage::NamedVip(NamedVipStage {
                spec: spec.clone(),
                task_name: Some(task_name.to_string()),
                resource_id,
                existing_port,
            }),
        }
    }
}

/// Orders resource-set entries for evaluation: statically defined ports
/// first (fixed coordinates), dynamic ports next (pick from what
/// remains), divisible scalars last (most fungible).
pub(crate) fn ordered_entries(entries: &[ResourceSetEntry]) -> Vec<&ResourceSetEntry> {
    let mut static_ports = Vec::new();
    let mut dynamic_ports = Vec::new();
    let mut simple = Vec::new();

    for entry in entries {
        let port = match entry {
            ResourceSetEntry::Port(p) => Some(p.port),
            ResourceSetEntry::NamedVip(v) => Some(v.port),
            ResourceSetEntry::Simple(_) => None,
        };
        match port {
            Some(0) => dynamic_ports.push(entry),
            Some(_) => static_ports.push(entry),
            None => simple.push(entry),
        }
    }

    let mut ordered = static_ports;
    ordered.append(&mut dynamic_ports);
    ordered.append(&mut simple);
    ordered
}

/// Environment variable a port choice is exposed under, e.g. `PORT_HTTP`
/// for a port spec named `http`.
pub(crate) fn port_env_name(spec_name: &str) -> String {
    format!(
        "PORT_{}",
        spec_name.to_uppercase().replace(['-', '.'], "_")
    )
}

/// Consumes the requested quantity from the pool. With a known resource
/// id the existing reservation is rebound as-is. Without one, the
/// quantity is taken from the unreserved (default-role) pool and a fresh
/// reservation into `role` is appended, with a newly minted id and any
/// extra labels, recommending a RESERVE.
#[allow(clippy::too_many_arguments)]
fn reserve_or_bind(
    name: &str,
    value: Value,
    role: &str,
    principal: Option<String>,
    resource_id: Option<&str>,
    extra_labels: &[(&str, String)],
    pool: &mut ResourcePool,
    ids: &dyn IdSource,
) -> Result<(Resource, Vec<Recommendation>), String> {
    let consume_role = if resource_id.is_some() {
        role
    } else {
        berth_proto::DEFAULT_ROLE
    };
    let requirement = ResourceRequirement::new(name, value, consume_role)
        .with_principal(principal.clone())
        .with_resource_id(resource_id.map(str::to_string));

    let consumed = pool
        .consume(&requirement)
        .ok_or_else(|| format!("failed to satisfy requirement for '{name}' in role '{role}'"))?;

    if resource_id.is_some() {
        return Ok((consumed.into_resource(), Vec::new()));
    }

    let mut labels = Labels::default();
    labels.set(RESOURCE_ID_LABEL, ids.next_id());
    for (key, label_value) in extra_labels {
        labels.set(key, label_value.clone());
    }

    let mut resource = consumed.into_resource();
    resource.role = Some(role.to_string());
    resource.reservations.push(ReservationInfo {
        role: Some(role.to_string()),
        principal,
        labels,
    });

    let recommendation = Recommendation::reserve(pool.offer(), resource.clone());
    Ok((resource, vec![recommendation]))
}

// ── Placement ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct PlacementStage {
    pub rule: Arc<dyn PlacementRule>,
    pub all_tasks: Vec<TaskInfo>,
}

impl PlacementStage {
    fn evaluate(&self, pool: &mut ResourcePool) -> Outcome {
        match self.rule.filter(pool.offer(), &self.all_tasks) {
            Ok(()) => Outcome::pass("placement", "placement rule accepted the offer"),
            Err(reason) => Outcome::fail("placement", reason),
        }
    }
}

// ── Divisible resources (cpus, mem, root disk) ─────────────────────

#[derive(Debug)]
pub struct ResourceStage {
    pub spec: ResourceSpec,
    pub task_name: Option<String>,
    pub resource_id: Option<String>,
}

impl ResourceStage {
    fn evaluate(
        &self,
        pool: &mut ResourcePool,
        builder: &mut PodInfoBuilder,
        ids: &dyn IdSource,
    ) -> Outcome {
        let stage = format!("resource:{}", self.spec.name);
        match reserve_or_bind(
            &self.spec.name,
            self.spec.value.clone(),
            &self.spec.role,
            self.spec.principal.clone(),
            self.resource_id.as_deref(),
            &[],
            pool,
            ids,
        ) {
            Ok((resource, recommendations)) => {
                builder.add_resource(self.task_name.as_deref(), resource);
                Outcome::pass_with(
                    &stage,
                    recommendations,
                    format!("satisfied requirement for resource '{}'", self.spec.name),
                )
            }
            Err(reason) => Outcome::fail(&stage, reason),
        }
    }
}

// ── Ports ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct PortStage {
    pub spec: PortSpec,
    pub task_name: Option<String>,
    pub resource_id: Option<String>,
    /// Concrete port a previous launch chose for a dynamic spec.
    pub existing_port: Option<u64>,
}

impl PortStage {
    fn evaluate(
        &self,
        pool: &mut ResourcePool,
        builder: &mut PodInfoBuilder,
        ids: &dyn IdSource,
    ) -> Outcome {
        let stage = format!("port:{}", self.spec.name);
        evaluate_port(
            &stage,
            &self.spec.name,
            self.spec.port,
            &self.spec.role,
            self.spec.principal.clone(),
            self.resource_id.as_deref(),
            self.existing_port,
            &[],
            pool,
            builder,
            self.task_name.as_deref(),
            ids,
        )
    }
}

#[derive(Debug)]
pub struct NamedVipStage {
    pub spec: NamedVipSpec,
    pub task_name: Option<String>,
    pub resource_id: Option<String>,
    pub existing_port: Option<u64>,
}

impl NamedVipStage {
    fn evaluate(
        &self,
        pool: &mut ResourcePool,
        builder: &mut PodInfoBuilder,
        ids: &dyn IdSource,
    ) -> Outcome {
        let stage = format!("vip:{}", self.spec.vip_name);
        let vip_labels = [
            (VIP_NAME_LABEL, self.spec.vip_name.clone()),
            (VIP_PORT_LABEL, self.spec.vip_port.to_string()),
        ];
        evaluate_port(
            &stage,
            &self.spec.name,
            self.spec.port,
            &self.spec.role,
            self.spec.principal.clone(),
            self.resource_id.as_deref(),
            self.existing_port,
            &vip_labels,
            pool,
            builder,
            self.task_name.as_deref(),
            ids,
        )
    }
}

/// Shared port evaluation: resolve the concrete port, consume it from
/// the role's ranges, and expose the choice through the environment.
#[allow(clippy::too_many_arguments)]
fn evaluate_port(
    stage: &str,
    spec_name: &str,
    spec_port: u64,
    role: &str,
    principal: Option<String>,
    resource_id: Option<&str>,
    existing_port: Option<u64>,
    vip_labels: &[(&str, String)],
    pool: &mut ResourcePool,
    builder: &mut PodInfoBuilder,
    task_name: Option<&str>,
    ids: &dyn IdSource,
) -> Outcome {
    let dynamic = spec_port == 0;
    let port = if !dynamic {
        spec_port
    } else if let Some(port) = existing_port {
        port
    } else {
        // Fresh dynamic choice: lowest unreserved port still available.
        match pool
            .available_merged(berth_proto::DEFAULT_ROLE, PORTS_RESOURCE)
            .and_then(Value::lowest)
        {
            Some(port) => port,
            None => {
                return Outcome::fail(stage, "no dynamic ports available in the offer".to_string())
            }
        }
    };

    let mut extra_labels = Vec::new();
    if dynamic {
        extra_labels.push((DYNAMIC_PORT_LABEL, spec_name.to_string()));
    }
    extra_labels.extend(vip_labels.iter().cloned());

    match reserve_or_bind(
        PORTS_RESOURCE,
        Value::port(port),
        role,
        principal,
        resource_id,
        &extra_labels,
        pool,
        ids,
    ) {
        Ok((resource, recommendations)) => {
            builder.add_resource(task_name, resource);
            builder.set_env(task_name, &port_env_name(spec_name), port.to_string());
            Outcome::pass_with(
                stage,
                recommendations,
                format!("satisfied port requirement '{spec_name}' at {port}"),
            )
        }
        Err(reason) => Outcome::fail(stage, reason),
    }
}

// ── Volumes ────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct VolumeStage {
    pub spec: VolumeSpec,
    /// `None` marks an executor-level volume shared by every task.
    pub task_name: Option<String>,
    pub resource_id: Option<String>,
    pub persistence_id: Option<String>,
}

impl VolumeStage {
    fn evaluate(
        &self,
        pool: &mut ResourcePool,
        builder: &mut PodInfoBuilder,
        ids: &dyn IdSource,
    ) -> Outcome {
        let stage = format!("volume:{}", self.spec.container_path);

        // Reuse path: a sibling stage already rebuilt this executor
        // volume in this evaluation; mirror it into the tasks only.
        if self.task_name.is_none() {
            if let Some(id) = self.resource_id.as_deref() {
                let already_built = builder
                    .executor_resources()
                    .iter()
                    .find(|r| OfferedResource::new((*r).clone()).resource_id() == Some(id))
                    .cloned();
                if let Some(existing) = already_built {
                    if let Some(volume) = existing.disk.as_ref().and_then(|d| d.volume.clone()) {
                        builder.add_volume_to_all_tasks(volume);
                    }
                    return Outcome::pass(
                        &stage,
                        format!(
                            "executor volume '{}' already satisfied",
                            self.spec.container_path
                        ),
                    );
                }
            }
        }

        let consumed = match self.spec.kind {
            VolumeKind::Root => reserve_or_bind(
                DISK_RESOURCE,
                self.spec.value.clone(),
                &self.spec.role,
                self.spec.principal.clone(),
                self.resource_id.as_deref(),
                &[],
                pool,
                ids,
            ),
            VolumeKind::Mount | VolumeKind::Path => self.consume_atomic(pool, ids),
        };
        let (mut resource, mut recommendations) = match consumed {
            Ok(pair) => pair,
            Err(reason) => return Outcome::fail(&stage, reason),
        };

        // Attach the persistence identity and the container mount. A
        // carried-forward persistence id means the volume already exists
        // on the agent; a fresh one requires a CREATE.
        let creates_volume = self.persistence_id.is_none();
        let persistence_id = self
            .persistence_id
            .clone()
            .unwrap_or_else(|| ids.next_id());
        let mut disk = resource.disk.take().unwrap_or_default();
        disk.persistence = Some(Persistence {
            id: persistence_id,
            principal: self.spec.principal.clone(),
        });
        disk.volume = Some(Volume {
            container_path: self.spec.container_path.clone(),
            mode: VolumeMode::Rw,
            source: Some(VolumeSource::SandboxPath {
                kind: SandboxPathKind::Parent,
                path: self.spec.container_path.clone(),
            }),
        });
        resource.disk = Some(disk);

        if creates_volume {
            recommendations.push(Recommendation::create(pool.offer(), resource.clone()));
        }

        if self.task_name.is_none() {
            if let Some(volume) = resource.disk.as_ref().and_then(|d| d.volume.clone()) {
                builder.add_volume_to_all_tasks(volume);
            }
        }
        builder.add_resource(self.task_name.as_deref(), resource);

        let outcome = Outcome::pass_with(
            &stage,
            recommendations,
            format!(
                "satisfied requirements for {:?} volume '{}'",
                self.spec.kind, self.spec.container_path
            ),
        );
        if self.spec.kind == VolumeKind::Root {
            // ROOT volumes delegate to plain disk consumption underneath.
            outcome.with_child(Outcome::pass(
                &format!("resource:{DISK_RESOURCE}"),
                "satisfied underlying disk requirement",
            ))
        } else {
            outcome
        }
    }

    /// MOUNT consumption: a whole disk when new, a pool lookup (without
    /// consumption) when rebinding an existing reservation.
    fn consume_atomic(
        &self,
        pool: &mut ResourcePool,
        ids: &dyn IdSource,
    ) -> Result<(Resource, Vec<Recommendation>), String> {
        match self.resource_id.as_deref() {
            None => {
                let requirement = ResourceRequirement::new(
                    DISK_RESOURCE,
                    self.spec.value.clone(),
                    self.spec.role.clone(),
                )
                .with_principal(self.spec.principal.clone())
                .atomic();
                let consumed = pool.consume(&requirement).ok_or_else(|| {
                    format!(
                        "failed to find a sufficient MOUNT volume for '{}'",
                        self.spec.container_path
                    )
                })?;

                let mut labels = Labels::default();
                labels.set(RESOURCE_ID_LABEL, ids.next_id());
                let mut resource = consumed.into_resource();
                resource.role = Some(self.spec.role.clone());
                resource.reservations.push(ReservationInfo {
                    role: Some(self.spec.role.clone()),
                    principal: self.spec.principal.clone(),
                    labels,
                });

                let recommendation = Recommendation::reserve(pool.offer(), resource.clone());
                Ok((resource, vec![recommendation]))
            }
            Some(id) => {
                let found = pool.reserved_by_id(id).ok_or_else(|| {
                    format!(
                        "failed to find reserved MOUNT volume '{}' for '{}'",
                        id, self.spec.container_path
                    )
                })?;
                Ok((found.resource().clone(), Vec::new()))
            }
        }
    }
}

// ── Launch ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct LaunchStage {
    pub task_name: String,
    pub should_launch: bool,
}

impl LaunchStage {
    fn evaluate(
        &self,
        pool: &mut ResourcePool,
        builder: &mut PodInfoBuilder,
        ids: &dyn IdSource,
    ) -> Outcome {
        let stage = format!("launch:{}", self.task_name);
        let Some(task) = builder.build_task(&self.task_name, pool.offer(), ids) else {
            return Outcome::fail(&stage, format!("unknown task '{}'", self.task_name));
        };

        if self.should_launch {
            let recommendation = Recommendation::launch(pool.offer(), task);
            Outcome::pass_with(
                &stage,
                vec![recommendation],
                format!("added launch information for task '{}'", self.task_name),
            )
        } else {
            Outcome::pass(
                &stage,
                format!(
                    "prepared task '{}' without launching it",
                    self.task_name
                ),
            )
        }
    }
}

// ── Unreserve ──────────────────────────────────────────────────────

/// Releases a persisted resource that no longer corresponds to any spec.
#[derive(Debug)]
pub struct UnreserveStage {
    pub resource: Resource,
}

impl UnreserveStage {
    fn evaluate(&self, pool: &mut ResourcePool) -> Outcome {
        let stage = format!("unreserve:{}", self.resource.name);
        let mut recommendations = Vec::new();

        let persistent = self
            .resource
            .disk
            .as_ref()
            .is_some_and(|d| d.persistence.is_some());
        if persistent {
            // The volume has to be destroyed before the reservation can go.
            recommendations.push(Recommendation::destroy(pool.offer(), self.resource.clone()));
            let mut cleared = self.resource.clone();
            if let Some(disk) = cleared.disk.as_mut() {
                disk.persistence = None;
                disk.volume = None;
            }
            recommendations.push(Recommendation::unreserve(pool.offer(), cleared));
        } else {
            recommendations.push(Recommendation::unreserve(pool.offer(), self.resource.clone()));
        }

        Outcome::pass_with(
            &stage,
            recommendations,
            format!("unreserving orphaned resource '{}'", self.resource.name),
        )
    }
}

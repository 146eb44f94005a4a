//! Desired-state model for berth services.
//!
//! What a service *wants*: pods of co-located tasks, the resources and
//! persistent volumes each task needs, placement constraints, and the
//! scheduler's own configuration. The offer evaluation core
//! (`berth-offer`) matches these against what agents *have*.
//!
//! # Components
//!
//! - **`spec`** — pods, tasks, resource sets, volume/port/VIP specs
//! - **`placement`** — the `PlacementRule` predicate trait
//! - **`config`** — `SchedulerFlags`

pub mod config;
pub mod placement;
pub mod spec;

pub use config::SchedulerFlags;
pub use placement::PlacementRule;
pub use spec::{
    NamedVipSpec, PodInstance, PodInstanceRequirement, PodSpec, PortSpec, RecoveryType,
    ResourceSet, ResourceSetEntry, ResourceSpec, TaskSpec, VolumeKind, VolumeSpec,
};

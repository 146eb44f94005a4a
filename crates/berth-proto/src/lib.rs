//! Protocol messages for the berth scheduler framework.
//!
//! Everything a framework scheduler exchanges with the resource master
//! lives here: typed values with kind-preserving arithmetic, resources
//! with reservation stacks and disk metadata, offers, task and executor
//! records, and offer operations.
//!
//! # Components
//!
//! - **`value`** — `Value` union (scalar / ranges / set / text) and arithmetic
//! - **`message`** — `Offer`, `Resource`, `TaskInfo`, `Operation`, friends

pub mod message;
pub mod value;

pub use message::{
    AgentId, CommandInfo, ContainerInfo, ContainerKind, DiskInfo, DiskSource, DiskSourceKind,
    ExecutorId, ExecutorInfo, Label, Labels, Offer, OfferId, Operation, Persistence,
    ReservationInfo, Resource, SandboxPathKind, TaskId, TaskInfo, TaskState, TaskStatus, Volume,
    VolumeMode, VolumeSource, CPUS_RESOURCE, DEFAULT_ROLE, DISK_RESOURCE, MEM_RESOURCE,
    PORTS_RESOURCE,
};
pub use value::{Range, Value, ValueKind};

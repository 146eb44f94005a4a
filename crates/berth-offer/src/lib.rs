//! Offer evaluation core for the berth scheduler framework.
//!
//! Takes a pod-instance requirement (which co-located tasks to launch or
//! recover) and a batch of resource offers, and produces the operation
//! recommendations — RESERVE, CREATE, UNRESERVE, DESTROY, LAUNCH — that
//! place the pod on one agent. Reservation and persistence identities are
//! carried across restarts so stateful tasks rebind to the volumes they
//! already own.
//!
//! Evaluation is synchronous and owns its inputs: each call snapshots the
//! state store up front, gives every offer its own resource pool and
//! builder, and returns recommendations as a value for the driver to
//! apply. Nothing is committed from inside the core.
//!
//! # Components
//!
//! - **`resource`** — semantic view over offered resources
//! - **`requirement`** — what a stage asks the pool for
//! - **`pool`** — per-offer consumable resource pool
//! - **`mapper`** — matches persisted resources to specs on relaunch
//! - **`evaluate`** — stages, pod-info builder, the `OfferEvaluator`
//! - **`recommend`** — operation recommendations
//! - **`failure`** — permanent-failure classification
//! - **`ids`** — injectable id generation

pub mod error;
pub mod evaluate;
pub mod failure;
pub mod ids;
pub mod mapper;
pub mod pool;
pub mod recommend;
pub mod requirement;
pub mod resource;

pub use error::{EvalError, EvalResult};
pub use evaluate::{EvaluationStage, OfferEvaluator, Outcome, PodInfoBuilder};
pub use ids::{IdSource, RandomIds, SequentialIds};
pub use mapper::TaskResourceMapper;
pub use pool::ResourcePool;
pub use recommend::{Recommendation, RecommendationKind};
pub use requirement::ResourceRequirement;
pub use resource::{
    OfferedResource, DYNAMIC_PORT_LABEL, RESOURCE_ID_LABEL, VIP_NAME_LABEL, VIP_PORT_LABEL,
};

//! Offer evaluation pipeline: outcomes, stages, the pod-info builder and
//! the orchestrating evaluator.

pub mod builder;
pub mod evaluator;
pub mod outcome;
pub mod stages;

pub use builder::{PodInfoBuilder, TARGET_CONFIGURATION_LABEL};
pub use evaluator::OfferEvaluator;
pub use outcome::Outcome;
pub use stages::{
    EvaluationStage, LaunchStage, NamedVipStage, PlacementStage, PortStage, ResourceStage,
    UnreserveStage, VolumeStage,
};

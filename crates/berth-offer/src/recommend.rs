//! Operation recommendations produced by evaluation.
//!
//! The core never talks to the master itself. It returns these values and
//! the driver turns them into offer operations, in the order given.

use serde::Serialize;

use berth_proto::{Offer, OfferId, Operation, Resource, TaskInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Reserve,
    Unreserve,
    Create,
    Destroy,
    Launch,
}

/// A decision against the single offer under evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub offer_id: OfferId,
    pub operation: Operation,
}

impl Recommendation {
    pub fn reserve(offer: &Offer, resource: Resource) -> Self {
        Self {
            kind: RecommendationKind::Reserve,
            offer_id: offer.id.clone(),
            operation: Operation::Reserve {
                resources: vec![resource],
            },
        }
    }

    pub fn unreserve(offer: &Offer, resource: Resource) -> Self {
        Self {
            kind: RecommendationKind::Unreserve,
            offer_id: offer.id.clone(),
            operation: Operation::Unreserve {
                resources: vec![resource],
            },
        }
    }

    pub fn create(offer: &Offer, volume: Resource) -> Self {
        Self {
            kind: RecommendationKind::Create,
            offer_id: offer.id.clone(),
            operation: Operation::Create {
                volumes: vec![volume],
            },
        }
    }

    pub fn destroy(offer: &Offer, volume: Resource) -> Self {
        Self {
            kind: RecommendationKind::Destroy,
            offer_id: offer.id.clone(),
            operation: Operation::Destroy {
                volumes: vec![volume],
            },
        }
    }

    pub fn launch(offer: &Offer, task: TaskInfo) -> Self {
        Self {
            kind: RecommendationKind::Launch,
            offer_id: offer.id.clone(),
            operation: Operation::Launch { tasks: vec![task] },
        }
    }
}

//! Placement predicate consumed by the offer evaluator.

use std::fmt;

use berth_proto::{Offer, TaskInfo};

/// A predicate over an offer and every task in the service. Rules reject
/// offers for reasons unrelated to resource quantity, such as
/// anti-affinity with already-placed tasks. Rule authoring lives outside
/// the evaluation core; the core only calls `filter`.
pub trait PlacementRule: fmt::Debug + Send + Sync {
    /// Ok to accept the offer, Err with a human-readable reason to reject.
    fn filter(&self, offer: &Offer, all_tasks: &[TaskInfo]) -> Result<(), String>;
}

/// Rejects offers from agents that already run a task of this service.
/// The one rule the framework itself needs (spread for HA); anything
/// richer is authored by the service definition.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvoidOccupiedAgents;

impl PlacementRule for AvoidOccupiedAgents {
    fn filter(&self, offer: &Offer, all_tasks: &[TaskInfo]) -> Result<(), String> {
        let occupied = all_tasks
            .iter()
            .any(|t| t.agent_id.as_deref() == Some(offer.agent_id.as_str()));
        if occupied {
            Err(format!("agent {} already runs a task", offer.agent_id))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(agent_id: &str) -> Offer {
        Offer {
            id: "offer-1".to_string(),
            agent_id: agent_id.to_string(),
            hostname: "node-1.example".to_string(),
            resources: Vec::new(),
        }
    }

    #[test]
    fn empty_service_accepts_any_agent() {
        assert!(AvoidOccupiedAgents.filter(&offer("agent-1"), &[]).is_ok());
    }

    #[test]
    fn occupied_agent_is_rejected() {
        let task = TaskInfo {
            name: "data-0-server".to_string(),
            agent_id: Some("agent-1".to_string()),
            ..TaskInfo::default()
        };
        let result = AvoidOccupiedAgents.filter(&offer("agent-1"), &[task]);
        assert!(result.is_err());
    }
}

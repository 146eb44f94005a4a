//! Per-stage evaluation outcomes.

use std::fmt;

use crate::recommend::Recommendation;

/// What one evaluation stage concluded about the offer: pass or fail, a
/// one-line reason, optional nested detail, and the operations to apply
/// if the whole offer passes.
#[derive(Debug, Clone)]
pub struct Outcome {
    passing: bool,
    stage: String,
    reason: String,
    children: Vec<Outcome>,
    recommendations: Vec<Recommendation>,
}

impl Outcome {
    pub fn pass(stage: &str, reason: impl Into<String>) -> Self {
        Self {
            passing: true,
            stage: stage.to_string(),
            reason: reason.into(),
            children: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn pass_with(
        stage: &str,
        recommendations: Vec<Recommendation>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            passing: true,
            stage: stage.to_string(),
            reason: reason.into(),
            children: Vec::new(),
            recommendations,
        }
    }

    pub fn fail(stage: &str, reason: impl Into<String>) -> Self {
        Self {
            passing: false,
            stage: stage.to_string(),
            reason: reason.into(),
            children: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: Outcome) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_passing(&self) -> bool {
        self.passing
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn children(&self) -> &[Outcome] {
        &self.children
    }

    pub fn recommendations(&self) -> &[Recommendation] {
        &self.recommendations
    }

    pub fn into_recommendations(self) -> Vec<Recommendation> {
        self.recommendations
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passing { "PASS" } else { "FAIL" };
        write!(f, "{verdict}({}): {}", self.stage, self.reason)
    }
}

//! Scheduler configuration passed explicitly into the evaluator.
//!
//! There is no implicit environment lookup here; whoever boots the
//! scheduler parses its environment or files and hands over a record.

use serde::{Deserialize, Serialize};

/// Framework-level knobs the evaluation core needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerFlags {
    /// Port the scheduler's own API listens on.
    pub api_port: u16,
    /// URI of the custom executor artifact fetched into each sandbox.
    pub executor_uri: Option<String>,
    /// URI of the agent library bundle fetched alongside the executor.
    pub libmesos_uri: Option<String>,
    /// Pause between offer cycles, in milliseconds.
    pub sleep_duration_ms: u64,
    pub framework_name: String,
}

impl Default for SchedulerFlags {
    fn default() -> Self {
        Self {
            api_port: 8080,
            executor_uri: None,
            libmesos_uri: None,
            sleep_duration_ms: 500,
            framework_name: "berth".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let flags = SchedulerFlags::default();
        assert_eq!(flags.api_port, 8080);
        assert!(flags.executor_uri.is_none());
    }

    #[test]
    fn deserializes_from_json() {
        let json = r#"{
            "api_port": 9090,
            "executor_uri": "https://artifacts.example/executor.tar.gz",
            "libmesos_uri": null,
            "sleep_duration_ms": 1000,
            "framework_name": "data-svc"
        }"#;
        let flags: SchedulerFlags = serde_json::from_str(json).unwrap();
        assert_eq!(flags.api_port, 9090);
        assert_eq!(flags.framework_name, "data-svc");
    }
}

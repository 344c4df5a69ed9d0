//! Variable context for a single execution.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Variable context threaded through one playbook execution.
///
/// The walk owns one context and lends it to each component in turn.
/// Parallel branches and loop iterations work on copies:
/// - a branch starts from [`ExecutionContext::branch`] and its changes are
///   folded back with [`ExecutionContext::merge_branch`] at the join
/// - an iteration runs in [`ExecutionContext::scoped`] and is discarded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: Uuid,

    pub playbook_id: String,

    /// Actor that triggered the execution.
    pub user_id: String,

    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

impl ExecutionContext {
    /// Create an empty context for an execution.
    pub fn new(execution_id: Uuid, playbook_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            execution_id,
            playbook_id: playbook_id.into(),
            user_id: user_id.into(),
            variables: HashMap::new(),
        }
    }

    /// Seed the initial variables.
    ///
    /// Trigger defaults first, then the top-level keys of an object payload,
    /// then `trigger` (the whole payload) and the execution metadata.
    pub fn seed(&mut self, defaults: &Map<String, Value>, trigger_data: &Value) {
        for (k, v) in defaults {
            self.set_variable(k.clone(), v.clone());
        }
        if let Value::Object(payload) = trigger_data {
            for (k, v) in payload {
                self.set_variable(k.clone(), v.clone());
            }
        }
        self.set_variable("trigger", trigger_data.clone());
        self.set_variable("triggered_by", Value::String(self.user_id.clone()));
        self.set_variable("execution_id", Value::String(self.execution_id.to_string()));
        self.set_variable("playbook_id", Value::String(self.playbook_id.clone()));
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Look up a variable by name or dotted path (`alert.hosts.0`).
    pub fn get_variable(&self, path: &str) -> Option<&Value> {
        crate::variables::lookup(&self.variables, path)
    }

    /// Snapshot for a parallel branch.
    pub fn branch(&self) -> Self {
        self.clone()
    }

    /// Fold a finished branch back in: only keys the branch added or changed
    /// relative to `base` (the snapshot it started from) are written.
    pub fn merge_branch(&mut self, base: &HashMap<String, Value>, branch: &ExecutionContext) {
        for (k, v) in &branch.variables {
            if base.get(k) != Some(v) {
                self.variables.insert(k.clone(), v.clone());
            }
        }
    }

    /// Copy for one loop iteration with the item and index variables bound.
    pub fn scoped(&self, item_variable: &str, item: Value, index_variable: &str, index: usize) -> Self {
        let mut scoped = self.clone();
        scoped.set_variable(item_variable, item);
        scoped.set_variable(index_variable, Value::from(index));
        scoped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(Uuid::new_v4(), "pb-1", "analyst@soc")
    }

    #[test]
    fn test_context_variables() {
        let mut ctx = ctx();
        ctx.set_variable("ip", json!("10.0.0.5"));
        ctx.set_variable("count", json!(42));

        assert_eq!(ctx.get_variable("ip"), Some(&json!("10.0.0.5")));
        assert_eq!(ctx.get_variable("count"), Some(&json!(42)));
        assert_eq!(ctx.get_variable("missing"), None);

        ctx.set_variable("alert", json!({"hosts": ["web-1", "db-1"]}));
        assert_eq!(ctx.get_variable("alert.hosts.1"), Some(&json!("db-1")));
        assert_eq!(ctx.get_variable("alert.owner"), None);
    }

    #[test]
    fn test_seed_order() {
        let mut ctx = ctx();
        let defaults = json!({"severity": "low", "region": "eu"});
        ctx.seed(
            defaults.as_object().unwrap(),
            &json!({"severity": "critical", "triggered_by": "spoofed"}),
        );

        assert_eq!(ctx.get_variable("severity"), Some(&json!("critical")));
        assert_eq!(ctx.get_variable("region"), Some(&json!("eu")));
        assert_eq!(ctx.get_variable("triggered_by"), Some(&json!("analyst@soc")));
        assert_eq!(ctx.get_variable("playbook_id"), Some(&json!("pb-1")));
        assert_eq!(
            ctx.get_variable("trigger"),
            Some(&json!({"severity": "critical", "triggered_by": "spoofed"}))
        );
    }

    #[test]
    fn test_seed_non_object_payload() {
        let mut ctx = ctx();
        ctx.seed(&Map::new(), &json!(["a", "b"]));
        assert_eq!(ctx.get_variable("trigger"), Some(&json!(["a", "b"])));
        assert!(ctx.get_variable("a").is_none());
    }

    #[test]
    fn test_merge_branch_only_changed_keys() {
        let mut parent = ctx();
        parent.set_variable("shared", json!(1));
        parent.set_variable("untouched", json!("x"));
        let base = parent.variables.clone();

        let mut left = parent.branch();
        left.set_variable("shared", json!(2));
        left.set_variable("left_only", json!(true));

        let right = parent.branch();

        parent.set_variable("untouched", json!("changed-by-parent"));
        parent.merge_branch(&base, &left);
        parent.merge_branch(&base, &right);

        assert_eq!(parent.get_variable("shared"), Some(&json!(2)));
        assert_eq!(parent.get_variable("left_only"), Some(&json!(true)));
        assert_eq!(parent.get_variable("untouched"), Some(&json!("changed-by-parent")));
    }

    #[test]
    fn test_scoped_does_not_leak() {
        let parent = ctx();
        let scoped = parent.scoped("host", json!("web-1"), "i", 3);
        assert_eq!(scoped.get_variable("host"), Some(&json!("web-1")));
        assert_eq!(scoped.get_variable("i"), Some(&json!(3)));
        assert!(parent.get_variable("host").is_none());
    }
}

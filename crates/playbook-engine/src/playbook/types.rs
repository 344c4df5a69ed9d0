//! Playbook definition types.
//!
//! A playbook is a graph of components. Each component carries a type tag and
//! an untyped `config` payload that is decoded into the matching config struct
//! on demand:
//! - trigger: entry point, optional default variables
//! - action: dispatch an action type with templated parameters
//! - condition: evaluate an expression, route to `true_next` / `false_next`
//! - loop: run a sub-graph once per element of a collection variable
//! - parallel: run branch sub-graphs concurrently and join

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Lifecycle status of a playbook definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybookStatus {
    Draft,
    Active,
    Archived,
}

impl std::fmt::Display for PlaybookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// Supported component types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Trigger,
    Action,
    Condition,
    Loop,
    Parallel,
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ComponentType::Trigger => "trigger",
            ComponentType::Action => "action",
            ComponentType::Condition => "condition",
            ComponentType::Loop => "loop",
            ComponentType::Parallel => "parallel",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Component configs
// ============================================================================

/// Trigger configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Default variables seeded into the context before trigger data.
    #[serde(default)]
    pub variables: serde_json::Map<String, serde_json::Value>,
}

/// Action configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Key into the action dispatcher.
    #[serde(alias = "actionType")]
    pub action_type: String,

    /// Parameters, may contain `{{name}}` placeholders.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,

    /// Variable that receives the action result.
    #[serde(default, alias = "outputVariable")]
    pub output_variable: Option<String>,
}

/// Condition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// Boolean expression over context variables.
    pub expression: String,

    /// Component visited when the expression is true.
    #[serde(default, alias = "trueNext")]
    pub true_next: Option<String>,

    /// Component visited when the expression is false.
    #[serde(default, alias = "falseNext")]
    pub false_next: Option<String>,
}

/// Loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Name (or dotted path) of the collection-valued variable.
    pub collection: String,

    /// Entry component of the per-iteration sub-graph.
    pub body: String,

    /// Per-iteration element variable.
    #[serde(default = "default_item_variable", alias = "itemVariable")]
    pub item_variable: String,

    /// Per-iteration index variable.
    #[serde(default = "default_index_variable", alias = "indexVariable")]
    pub index_variable: String,

    /// Variable that receives the ordered list of iteration outputs.
    #[serde(default, alias = "outputVariable")]
    pub output_variable: Option<String>,
}

fn default_item_variable() -> String {
    "item".to_string()
}

fn default_index_variable() -> String {
    "index".to_string()
}

/// Parallel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Branch entry components, in declaration order.
    pub branches: Vec<String>,

    /// Variable that receives the ordered list of branch outputs.
    #[serde(default, alias = "outputVariable")]
    pub output_variable: Option<String>,
}

// ============================================================================
// Component
// ============================================================================

/// A single node in the playbook graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    /// Identifier, unique within the playbook.
    pub id: String,

    /// Component type.
    #[serde(rename = "type")]
    pub component_type: ComponentType,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Type-specific configuration.
    #[serde(default)]
    pub config: serde_json::Value,

    /// Successor component ids, visited in order.
    #[serde(default)]
    pub next: Vec<String>,
}

impl Component {
    /// Name used in step records, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn trigger_config(&self) -> EngineResult<TriggerConfig> {
        if self.config.is_null() {
            return Ok(TriggerConfig::default());
        }
        self.decode_config(ComponentType::Trigger)
    }

    pub fn action_config(&self) -> EngineResult<ActionConfig> {
        self.decode_config(ComponentType::Action)
    }

    pub fn condition_config(&self) -> EngineResult<ConditionConfig> {
        self.decode_config(ComponentType::Condition)
    }

    pub fn loop_config(&self) -> EngineResult<LoopConfig> {
        self.decode_config(ComponentType::Loop)
    }

    pub fn parallel_config(&self) -> EngineResult<ParallelConfig> {
        self.decode_config(ComponentType::Parallel)
    }

    /// Every component id this component can route to: `next` plus the
    /// type-specific branch fields.
    pub fn referenced_ids(&self) -> EngineResult<Vec<String>> {
        let mut ids = self.next.clone();
        match self.component_type {
            ComponentType::Condition => {
                let config = self.condition_config()?;
                ids.extend(config.true_next);
                ids.extend(config.false_next);
            }
            ComponentType::Loop => ids.push(self.loop_config()?.body),
            ComponentType::Parallel => ids.extend(self.parallel_config()?.branches),
            ComponentType::Trigger | ComponentType::Action => {}
        }
        Ok(ids)
    }

    fn decode_config<T: DeserializeOwned>(&self, expected: ComponentType) -> EngineResult<T> {
        if self.component_type != expected {
            return Err(EngineError::InvalidConfig(format!(
                "component '{}' is a {}, not a {}",
                self.id, self.component_type, expected
            )));
        }
        serde_json::from_value(self.config.clone()).map_err(|e| {
            EngineError::InvalidConfig(format!("component '{}': {}", self.id, e))
        })
    }
}

// ============================================================================
// Playbook
// ============================================================================

/// A security response playbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: PlaybookStatus,
    pub components: Vec<Component>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Playbook {
    /// Parse a playbook from YAML.
    pub fn from_yaml(content: &str) -> EngineResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Parse a playbook from JSON.
    pub fn from_json(content: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Get a component by id.
    pub fn get_component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Get the single trigger component.
    pub fn trigger(&self) -> EngineResult<&Component> {
        let mut triggers = self
            .components
            .iter()
            .filter(|c| c.component_type == ComponentType::Trigger);

        let trigger = triggers.next().ok_or_else(|| {
            EngineError::InvalidPlaybook(format!("playbook '{}' has no trigger", self.id))
        })?;

        if triggers.next().is_some() {
            return Err(EngineError::InvalidPlaybook(format!(
                "playbook '{}' has more than one trigger",
                self.id
            )));
        }

        Ok(trigger)
    }

    /// Whether the playbook may be executed.
    pub fn is_active(&self) -> bool {
        self.status == PlaybookStatus::Active
    }
}

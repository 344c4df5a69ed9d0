//! Playbook definitions.
//!
//! This module provides:
//! - Type definitions for playbooks and components
//! - YAML/JSON parsing and structural validation
//! - The read-only repository the engine loads playbooks from

pub mod parser;
pub mod repository;
pub mod types;

pub use parser::{parse_playbook, validate_playbook};
pub use repository::{InMemoryPlaybookRepository, PlaybookRepository};
pub use types::{
    ActionConfig, Component, ComponentType, ConditionConfig, LoopConfig, ParallelConfig,
    Playbook, PlaybookStatus, TriggerConfig,
};

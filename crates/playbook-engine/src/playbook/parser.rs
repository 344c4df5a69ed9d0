//! Playbook parser and structural validation.
//!
//! Checks the graph invariants the engine relies on:
//! - exactly one trigger
//! - unique component ids
//! - every `next` / branch reference resolves, and no trigger is a successor
//! - no component is its own direct successor, branch, loop body or
//!   parallel branch
//! - condition expressions parse

use std::collections::HashSet;

use crate::error::{EngineError, EngineResult};
use crate::expression::Expression;
use crate::playbook::types::{ComponentType, Playbook};

/// Parse a YAML string into a validated Playbook.
pub fn parse_playbook(yaml_content: &str) -> EngineResult<Playbook> {
    let playbook = Playbook::from_yaml(yaml_content)?;
    validate_playbook(&playbook)?;
    Ok(playbook)
}

/// Validate a parsed playbook, reporting the first violation found.
pub fn validate_playbook(playbook: &Playbook) -> EngineResult<()> {
    playbook.trigger()?;

    let mut seen = HashSet::new();
    for component in &playbook.components {
        if component.id.is_empty() {
            return Err(EngineError::InvalidPlaybook(
                "Component with empty id".to_string(),
            ));
        }
        if !seen.insert(component.id.as_str()) {
            return Err(EngineError::InvalidPlaybook(format!(
                "Duplicate component id: {}",
                component.id
            )));
        }
    }

    for component in &playbook.components {
        for target in component.referenced_ids()? {
            if target == component.id {
                return Err(EngineError::InvalidPlaybook(format!(
                    "Component '{}' lists itself as a successor",
                    component.id
                )));
            }
            let Some(referenced) = playbook.get_component(&target) else {
                return Err(EngineError::InvalidPlaybook(format!(
                    "Component '{}' references unknown component '{}'",
                    component.id, target
                )));
            };
            if referenced.component_type == ComponentType::Trigger {
                return Err(EngineError::InvalidPlaybook(format!(
                    "Component '{}' routes to trigger '{}'",
                    component.id, target
                )));
            }
        }

        match component.component_type {
            ComponentType::Trigger => {
                component.trigger_config()?;
            }
            ComponentType::Action => {
                let config = component.action_config()?;
                if config.action_type.trim().is_empty() {
                    return Err(EngineError::InvalidPlaybook(format!(
                        "Action '{}' has an empty action type",
                        component.id
                    )));
                }
            }
            ComponentType::Condition => {
                let config = component.condition_config()?;
                Expression::parse(&config.expression).map_err(|e| {
                    EngineError::InvalidPlaybook(format!(
                        "Condition '{}': invalid expression '{}': {}",
                        component.id, config.expression, e
                    ))
                })?;
            }
            // Referenced ids were decoded above, which validates the config.
            ComponentType::Loop | ComponentType::Parallel => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml_with(components: &str) -> String {
        format!(
            "id: pb\nname: Test\nstatus: active\ncomponents:\n{}",
            components
        )
    }

    #[test]
    fn test_parse_valid_playbook() {
        let yaml = yaml_with(
            r#"
  - id: start
    type: trigger
    next: [fanout]
  - id: fanout
    type: parallel
    config:
      branches: [notify, ticket]
  - id: notify
    type: action
    config: {action_type: notify}
  - id: ticket
    type: action
    config: {action_type: open_ticket}
"#,
        );
        let playbook = parse_playbook(&yaml).unwrap();
        assert_eq!(playbook.components.len(), 4);
    }

    #[test]
    fn test_unknown_reference() {
        let yaml = yaml_with(
            r#"
  - id: start
    type: trigger
    next: [ghost]
"#,
        );
        let err = parse_playbook(&yaml).unwrap_err();
        assert!(err.to_string().contains("unknown component 'ghost'"));
    }

    #[test]
    fn test_self_successor() {
        let yaml = yaml_with(
            r#"
  - id: start
    type: trigger
    next: [again]
  - id: again
    type: action
    config: {action_type: log}
    next: [again]
"#,
        );
        let err = parse_playbook(&yaml).unwrap_err();
        assert!(err.to_string().contains("lists itself as a successor"));
    }

    #[test]
    fn test_self_reference_through_branch_fields() {
        let cases = [
            r#"
  - id: check
    type: condition
    config:
      expression: "retry"
      trueNext: check
"#,
            r#"
  - id: check
    type: loop
    config:
      collection: hosts
      body: check
"#,
            r#"
  - id: check
    type: parallel
    config:
      branches: [notify, check]
  - id: notify
    type: action
    config: {action_type: log}
"#,
        ];

        for components in cases {
            let yaml = yaml_with(&format!(
                "\n  - id: start\n    type: trigger\n    next: [check]{}",
                components
            ));
            let err = parse_playbook(&yaml).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Invalid playbook: Component 'check' lists itself as a successor"
            );
        }
    }

    #[test]
    fn test_duplicate_ids() {
        let yaml = yaml_with(
            r#"
  - id: start
    type: trigger
  - id: dup
    type: action
    config: {action_type: log}
  - id: dup
    type: action
    config: {action_type: log}
"#,
        );
        let err = parse_playbook(&yaml).unwrap_err();
        assert!(err.to_string().contains("Duplicate component id: dup"));
    }

    #[test]
    fn test_multiple_triggers() {
        let yaml = yaml_with(
            r#"
  - id: a
    type: trigger
  - id: b
    type: trigger
"#,
        );
        assert!(matches!(
            parse_playbook(&yaml),
            Err(EngineError::InvalidPlaybook(_))
        ));
    }

    #[test]
    fn test_invalid_condition_expression() {
        let yaml = yaml_with(
            r#"
  - id: start
    type: trigger
    next: [check]
  - id: check
    type: condition
    config:
      expression: "severity =="
"#,
        );
        let err = parse_playbook(&yaml).unwrap_err();
        assert!(err.to_string().contains("invalid expression"));
    }

    #[test]
    fn test_branch_to_trigger_rejected() {
        let yaml = yaml_with(
            r#"
  - id: start
    type: trigger
    next: [check]
  - id: check
    type: condition
    config:
      expression: "true"
      falseNext: start
"#,
        );
        let err = parse_playbook(&yaml).unwrap_err();
        assert!(err.to_string().contains("routes to trigger"));
    }
}

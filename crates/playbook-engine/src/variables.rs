//! `{{name}}` placeholder resolution.
//!
//! Resolution is a pure function of the value and the variable map. Unknown
//! names are left in place as literal text, so resolving an already-resolved
//! value is a no-op.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\s*\}\}")
        .expect("placeholder pattern is valid")
});

/// Resolve placeholders in strings, arrays and objects recursively.
pub fn resolve(value: &Value, variables: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_str(s, variables)),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve(v, variables)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve(v, variables)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolve placeholders in a string, always producing a string.
pub fn resolve_str(template: &str, variables: &HashMap<String, Value>) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }

    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match lookup(variables, &caps[1]) {
            Some(value) => stringify(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Look up a dotted path. Numeric segments index into arrays.
pub fn lookup<'a>(variables: &'a HashMap<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = variables.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Text form used inside strings: strings verbatim, everything else as JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> HashMap<String, Value> {
        let mut vars = HashMap::new();
        vars.insert("ip".to_string(), json!("10.0.0.5"));
        vars.insert("port".to_string(), json!(443));
        vars.insert("hosts".to_string(), json!(["web-1", "db-1"]));
        vars.insert("alert".to_string(), json!({"source": {"ip": "192.168.1.9"}}));
        vars
    }

    #[test]
    fn test_resolve_simple() {
        assert_eq!(
            resolve(&json!("Block {{ip}}"), &vars()),
            json!("Block 10.0.0.5")
        );
    }

    #[test]
    fn test_unresolved_kept() {
        assert_eq!(
            resolve(&json!("Block {{missing}}"), &HashMap::new()),
            json!("Block {{missing}}")
        );
    }

    #[test]
    fn test_whitespace_and_paths() {
        assert_eq!(
            resolve_str("src={{ alert.source.ip }} first={{hosts.0}}", &vars()),
            "src=192.168.1.9 first=web-1"
        );
    }

    #[test]
    fn test_non_string_values_stringified() {
        assert_eq!(resolve_str("{{ip}}:{{port}}", &vars()), "10.0.0.5:443");
        assert_eq!(resolve_str("hosts={{hosts}}", &vars()), r#"hosts=["web-1","db-1"]"#);
    }

    #[test]
    fn test_lone_placeholder_is_stringified() {
        assert_eq!(resolve(&json!("{{port}}"), &vars()), json!("443"));
        assert_eq!(resolve(&json!("{{ hosts }}"), &vars()), json!(r#"["web-1","db-1"]"#));
        assert_eq!(resolve(&json!("{{nope}}"), &vars()), json!("{{nope}}"));
    }

    #[test]
    fn test_non_string_leaves_untouched() {
        let template = json!({"retries": 3, "force": true, "reason": null});
        assert_eq!(resolve(&template, &vars()), template);
    }

    #[test]
    fn test_nested_structures_keep_key_order() {
        let template = json!({
            "target": "{{ip}}",
            "rules": [{"port": "{{port}}"}, "static"],
            "count": 2,
        });
        let resolved = resolve(&template, &vars());
        assert_eq!(
            resolved,
            json!({"target": "10.0.0.5", "rules": [{"port": "443"}, "static"], "count": 2})
        );
        let keys: Vec<&String> = resolved.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["target", "rules", "count"]);
    }

    #[test]
    fn test_idempotent() {
        let template = json!({"msg": "Block {{ip}} on {{missing}}"});
        let once = resolve(&template, &vars());
        let twice = resolve(&once, &vars());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_substituted_text_is_not_rescanned() {
        let mut vars = HashMap::new();
        vars.insert("a".to_string(), json!("{{b}}"));
        vars.insert("b".to_string(), json!("boom"));
        assert_eq!(resolve_str("x {{a}}", &vars), "x {{b}}");
    }
}

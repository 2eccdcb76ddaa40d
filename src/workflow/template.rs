use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::{RelayflowError, Result, common::Vars};

/// Input reference inside a template.
/// Format: `{{ field }}` or `{{ field.sub.0.key }}`
static INPUT_TEMPLATE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_\-]+(?:\.[A-Za-z0-9_\-]+)*)\s*\}\}").unwrap());

/// Resolve every `{{ path }}` in `template` against `input`.
/// Returns an error listing every reference that cannot be resolved.
pub fn render(
    template: &str,
    input: &Vars,
) -> Result<String> {
    let mut errors: Vec<String> = Vec::new();

    let rendered = INPUT_TEMPLATE.replace_all(template, |caps: &regex::Captures<'_>| match input.lookup(&caps[1]) {
        Some(value) => value_to_string(value),
        None => {
            errors.push(format!("variable '{}' not found", &caps[1]));
            String::new()
        }
    });

    if !errors.is_empty() {
        return Err(RelayflowError::Template(errors.join(", ")));
    }

    Ok(rendered.into_owned())
}

/// Convert a value to its template representation.
/// Strings are inserted without quotes, objects and arrays as JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        v => v.to_string(),
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn input() -> Vars {
        Vars::from(json!({
            "status": "ok",
            "count": 3,
            "order": {"id": "A-1", "items": ["tea", "cake"]},
            "flag": true
        }))
    }

    #[test]
    fn test_render_plain_text() {
        assert_eq!(render("no variables here", &input()).unwrap(), "no variables here");
    }

    #[test]
    fn test_render_simple_and_nested() {
        let out = render("status={{status}} order={{ order.id }} first={{order.items.0}}", &input()).unwrap();
        assert_eq!(out, "status=ok order=A-1 first=tea");
    }

    #[test]
    fn test_render_non_string_values() {
        assert_eq!(render("{{count}} {{flag}} {{order.items}}", &input()).unwrap(), r#"3 true ["tea","cake"]"#);
    }

    #[test]
    fn test_render_reports_all_missing() {
        let err = render("{{missing}} and {{order.nope}}", &input()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'missing'"));
        assert!(message.contains("'order.nope'"));
    }
}

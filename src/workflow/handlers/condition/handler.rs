use async_trait::async_trait;
use serde_json::Value;

use crate::{
    HandlerErrorKind,
    common::Vars,
    model::NodeKind,
    workflow::{
        consts::{FALSE_PORT, TRUE_PORT},
        handlers::{Handler, HandlerOutcome, mismatched},
        node::NodeConfig,
        template::value_to_string,
    },
};

use super::models::*;

/// Evaluates `field operator value` and selects the true or false port.
pub struct ConditionHandler;

impl ConditionHandler {
    /// Evaluate a single comparison.
    /// `Err` carries the reason the operands cannot be compared.
    fn evaluate(
        &self,
        actual: &Value,
        operator: ComparisonOperator,
        expected: &Value,
    ) -> Result<bool, String> {
        match operator {
            ComparisonOperator::Equals => Ok(self.eval_eq(actual, expected)),
            ComparisonOperator::NotEquals => Ok(!self.eval_eq(actual, expected)),
            ComparisonOperator::Contains => self.eval_contains(actual, expected),
            ComparisonOperator::GreaterThan => self.eval_cmp(actual, expected, operator, |a, b| a > b),
            ComparisonOperator::LessThan => self.eval_cmp(actual, expected, operator, |a, b| a < b),
        }
    }

    fn eval_eq(
        &self,
        actual: &Value,
        expected: &Value,
    ) -> bool {
        match (as_number(actual), as_number(expected)) {
            (Some(a), Some(e)) => a == e,
            _ => actual == expected,
        }
    }

    fn eval_contains(
        &self,
        actual: &Value,
        expected: &Value,
    ) -> Result<bool, String> {
        match (actual, expected) {
            (Value::String(s), Value::String(_) | Value::Number(_) | Value::Bool(_)) => Ok(s.contains(&value_to_string(expected))),
            (Value::Array(arr), e) => Ok(arr.iter().any(|v| v == e || matches!((as_number(v), as_number(e)), (Some(a), Some(b)) if a == b))),
            (Value::Object(obj), Value::String(key)) => Ok(obj.contains_key(key)),
            _ => Err(format!("cannot check whether {} contains {}", type_name(actual), type_name(expected))),
        }
    }

    fn eval_cmp<F>(
        &self,
        actual: &Value,
        expected: &Value,
        operator: ComparisonOperator,
        cmp: F,
    ) -> Result<bool, String>
    where
        F: Fn(f64, f64) -> bool,
    {
        match (as_number(actual), as_number(expected)) {
            (Some(a), Some(e)) => Ok(cmp(a, e)),
            _ => Err(format!("{} needs numbers, got {} and {}", operator, type_name(actual), type_name(expected))),
        }
    }
}

/// Numbers and numeric strings. `NaN` and infinities stay strings.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl Handler for ConditionHandler {
    fn kind(&self) -> NodeKind {
        NodeKind::LogicIf
    }

    async fn execute(
        &self,
        config: &NodeConfig,
        input: &Vars,
    ) -> HandlerOutcome {
        let NodeConfig::If(condition) = config else {
            return mismatched(self.kind(), config);
        };

        // a missing field compares as null
        let actual = input.lookup(&condition.field).cloned().unwrap_or(Value::Null);

        match self.evaluate(&actual, condition.operator, &condition.value) {
            Ok(result) => {
                let port = if result { TRUE_PORT } else { FALSE_PORT };
                HandlerOutcome::branch(Value::Bool(result), port)
            }
            Err(message) => HandlerOutcome::failed(HandlerErrorKind::InvalidComparison, format!("field '{}': {}", condition.field, message)),
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    async fn run(
        field: &str,
        operator: &str,
        value: Value,
        input: Value,
    ) -> HandlerOutcome {
        let config = NodeConfig::parse(NodeKind::LogicIf, &json!({"field": field, "operator": operator, "value": value})).unwrap();
        ConditionHandler.execute(&config, &Vars::from(input)).await
    }

    #[tokio::test]
    async fn test_equals_selects_true_port() {
        assert_eq!(run("status", "equals", json!("ok"), json!({"status": "ok"})).await, HandlerOutcome::branch(json!(true), TRUE_PORT));
        assert_eq!(run("status", "equals", json!("ok"), json!({"status": "fail"})).await, HandlerOutcome::branch(json!(false), FALSE_PORT));
    }

    #[tokio::test]
    async fn test_equals_numeric_strings() {
        assert_eq!(run("count", "equals", json!("3"), json!({"count": 3.0})).await, HandlerOutcome::branch(json!(true), TRUE_PORT));
        assert_eq!(run("count", "not_equals", json!(4), json!({"count": 3})).await, HandlerOutcome::branch(json!(true), TRUE_PORT));
    }

    #[tokio::test]
    async fn test_missing_field_is_null() {
        assert_eq!(run("gone", "equals", json!(null), json!({})).await, HandlerOutcome::branch(json!(true), TRUE_PORT));
        assert_eq!(run("gone", "equals", json!("ok"), json!({})).await, HandlerOutcome::branch(json!(false), FALSE_PORT));
    }

    #[tokio::test]
    async fn test_non_finite_strings_compare_as_strings() {
        assert_eq!(run("status", "equals", json!("NaN"), json!({"status": "NaN"})).await, HandlerOutcome::branch(json!(true), TRUE_PORT));
        assert_eq!(run("status", "not_equals", json!("inf"), json!({"status": "inf"})).await, HandlerOutcome::branch(json!(false), FALSE_PORT));
        assert!(matches!(run("level", "greater_than", json!(1), json!({"level": "infinity"})).await, HandlerOutcome::Failed { kind: HandlerErrorKind::InvalidComparison, .. }));
    }

    #[tokio::test]
    async fn test_contains() {
        assert_eq!(run("msg", "contains", json!("err"), json!({"msg": "an error"})).await, HandlerOutcome::branch(json!(true), TRUE_PORT));
        assert_eq!(run("tags", "contains", json!(2), json!({"tags": [1, 2]})).await, HandlerOutcome::branch(json!(true), TRUE_PORT));
        assert_eq!(run("user", "contains", json!("email"), json!({"user": {"name": "x"}})).await, HandlerOutcome::branch(json!(false), FALSE_PORT));
        assert!(matches!(run("n", "contains", json!(1), json!({"n": 10})).await, HandlerOutcome::Failed { kind: HandlerErrorKind::InvalidComparison, .. }));
    }

    #[tokio::test]
    async fn test_ordering_requires_numbers() {
        assert_eq!(run("order.total", "greater_than", json!(100), json!({"order": {"total": 250}})).await, HandlerOutcome::branch(json!(true), TRUE_PORT));
        assert_eq!(run("temp", "less_than", json!("0"), json!({"temp": 5})).await, HandlerOutcome::branch(json!(false), FALSE_PORT));

        let outcome = run("status", "greater_than", json!(1), json!({"status": "ok"})).await;
        assert_eq!(outcome, HandlerOutcome::failed(HandlerErrorKind::InvalidComparison, "field 'status': greater_than needs numbers, got string and number"));
    }
}

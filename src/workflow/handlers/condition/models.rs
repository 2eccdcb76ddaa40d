use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::workflow::node::KindConfig;

/// Comparison operator of a `logic.if` node
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    // string, array or object
    Contains,
    // numbers only
    GreaterThan,
    LessThan,
}

/// `field operator value`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConditionConfig {
    /// dot path into the node input
    pub field: String,
    pub operator: ComparisonOperator,
    pub value: Value,
}

impl KindConfig for ConditionConfig {
    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "field": { "type": "string", "minLength": 1 },
                "operator": {
                    "type": "string",
                    "enum": ["equals", "not_equals", "contains", "greater_than", "less_than"]
                },
                "value": {}
            },
            "required": ["field", "operator", "value"],
            "additionalProperties": false
        })
    }
}

//! JSON object used as node input, context and output container.

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// Key-value variables passed between nodes.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct Vars {
    inner: Map<String, Value>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with<V: Serialize>(
        mut self,
        key: &str,
        value: V,
    ) -> Self {
        self.set(key, value);
        self
    }

    /// Insert a serializable value. Values that cannot be serialized are stored as null.
    pub fn set<V: Serialize>(
        &mut self,
        key: &str,
        value: V,
    ) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.inner.insert(key.to_string(), value);
    }

    /// Get a value and deserialize it into `T`.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Option<T> {
        self.inner.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Overwrite keys of `self` with the keys of `other`.
    pub fn merge(
        &mut self,
        other: &Vars,
    ) {
        for (k, v) in other.inner.iter() {
            self.inner.insert(k.clone(), v.clone());
        }
    }

    /// Resolve a dot separated path (`order.items.0.name`).
    ///
    /// Array elements are addressed by their index.
    pub fn lookup(
        &self,
        path: &str,
    ) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.inner.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl Deref for Vars {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for Vars {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl From<Value> for Vars {
    /// Objects become the variables as-is; any other value is kept under `input`.
    fn from(value: Value) -> Self {
        match value {
            Value::Object(inner) => Self {
                inner,
            },
            Value::Null => Self::new(),
            other => Self::new().with("input", other),
        }
    }
}

impl From<Vars> for Value {
    fn from(vars: Vars) -> Self {
        Value::Object(vars.inner)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::Vars;

    #[test]
    fn test_vars_lookup_nested_path() {
        let vars = Vars::from(json!({"order": {"items": [{"name": "tea"}, {"name": "cake"}]}}));
        assert_eq!(vars.lookup("order.items.1.name"), Some(&json!("cake")));
        assert_eq!(vars.lookup("order.items.7.name"), None);
        assert_eq!(vars.lookup("order.total"), None);
    }

    #[test]
    fn test_vars_from_scalar_wraps_input() {
        let vars = Vars::from(json!(42));
        assert_eq!(vars.get::<i64>("input"), Some(42));
        assert!(Vars::from(json!(null)).is_empty());
    }

    #[test]
    fn test_vars_merge_overwrites() {
        let mut vars = Vars::new().with("a", 1).with("b", 2);
        vars.merge(&Vars::new().with("b", 3).with("c", 4));
        assert_eq!(serde_json::Value::from(vars), json!({"a": 1, "b": 3, "c": 4}));
    }
}

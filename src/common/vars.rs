//! JSON object wrapper used for input, config and output records.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// An ordered-by-key map of named JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vars {
    inner: Map<String, Value>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        key: &str,
        value: impl Into<Value>,
    ) {
        self.inner.insert(key.to_string(), value.into());
    }

    /// Typed lookup; `None` when missing or not convertible.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Option<T> {
        self.inner.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_value(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.inner.get(key)
    }

    /// Present and not `null`.
    pub fn has_value(
        &self,
        key: &str,
    ) -> bool {
        self.inner.get(key).is_some_and(|v| !v.is_null())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<Value> for Vars {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(inner) => Self {
                inner,
            },
            _ => Self::default(),
        }
    }
}

impl From<Vars> for Value {
    fn from(vars: Vars) -> Self {
        Value::Object(vars.inner)
    }
}

impl FromIterator<(String, Value)> for Vars {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::Vars;

    #[test]
    fn test_has_value_treats_null_as_missing() {
        let vars = Vars::from(json!({"a": 1, "b": null}));
        assert!(vars.has_value("a"));
        assert!(!vars.has_value("b"));
        assert!(!vars.has_value("c"));
        assert_eq!(vars.get::<i64>("a"), Some(1));
    }

    #[test]
    fn test_non_object_becomes_empty() {
        assert!(Vars::from(json!([1, 2])).is_empty());
    }
}

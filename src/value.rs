use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// One node of a data record. Records are built once per render and only read
/// afterwards.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

pub type DataRecord = Value;

impl Value {
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(key),
            _ => None,
        }
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        match self {
            Value::List(items) => items.get(index),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(v) => serde_json::Value::Bool(*v),
            Value::Integer(v) => serde_json::Value::from(*v),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(v) => serde_json::Value::String(v.clone()),
            Value::Date(v) => serde_json::Value::String(v.format("%Y-%m-%d").to_string()),
            Value::DateTime(v) => {
                serde_json::Value::String(v.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Value, serde_json::Error> {
        let json: serde_json::Value = serde_json::from_str(raw)?;
        Ok(Value::from(json))
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(v) => Value::Bool(v),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(v) => Value::Integer(v),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(v) => Value::String(v),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Value::Map(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_nested_json() {
        let value = Value::from(json!({
            "delegato": {"nome": "Anna", "eta": 41},
            "sezioni": [1, 2.5, null]
        }));
        assert_eq!(
            value.get("delegato").and_then(|d| d.get("nome")),
            Some(&Value::String("Anna".to_string()))
        );
        assert_eq!(
            value.get("delegato").and_then(|d| d.get("eta")),
            Some(&Value::Integer(41))
        );
        let sezioni = value.get("sezioni").and_then(Value::as_list).expect("list");
        assert_eq!(sezioni.len(), 3);
        assert_eq!(sezioni[1], Value::Float(2.5));
        assert!(sezioni[2].is_null());
    }

    #[test]
    fn index_and_key_lookups_do_not_cross_container_kinds() {
        let value = Value::from(json!({"a": [10, 20]}));
        assert!(value.get_index(0).is_none());
        let list = value.get("a").expect("a");
        assert!(list.get("0").is_none());
        assert_eq!(list.get_index(1), Some(&Value::Integer(20)));
        assert!(list.get_index(2).is_none());
    }

    #[test]
    fn native_dates_serialize_as_iso_strings() {
        let date = NaiveDate::from_ymd_opt(1990, 3, 20).expect("date");
        assert_eq!(Value::Date(date).to_json(), json!("1990-03-20"));
        let record: Value = [("d", Value::Date(date))].into_iter().collect();
        assert_eq!(record.to_json(), json!({"d": "1990-03-20"}));
    }
}

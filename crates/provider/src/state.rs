//! Terraform State Values
//!
//! Terraform exchanges configuration, plans and state as msgpack-encoded
//! dynamic values. Unknown values ride as msgpack extension type 0.

use std::collections::BTreeMap;

use thiserror::Error;

/// Extension type Terraform uses for unknown values
const UNKNOWN_EXT: i8 = 0;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid msgpack: {0}")]
    Decode(#[from] rmpv::decode::Error),

    #[error("failed to write msgpack: {0}")]
    Encode(String),

    #[error("invalid JSON state: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported value in dynamic value: {0}")]
    Unsupported(String),
}

/// Dynamic value as seen by the provider
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Unknown,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }

    /// Known and not null
    pub fn is_present(&self) -> bool {
        !self.is_null() && !self.is_unknown()
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            // Numbers too precise for float64 arrive as strings
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?.get(key)
    }

    /// Replace or add an attribute on an object value. No-op on non-objects.
    pub fn set(&mut self, key: &str, value: Value) {
        if let Value::Map(m) = self {
            m.insert(key.to_string(), value);
        }
    }
}

/// Decode a Terraform DynamicValue from msgpack bytes
pub fn decode_dynamic_value(data: &[u8]) -> Result<Value, StateError> {
    if data.is_empty() {
        return Ok(Value::Null);
    }

    let mut reader = data;
    let raw = rmpv::decode::read_value(&mut reader)?;
    from_msgpack(raw)
}

/// Encode a value to Terraform DynamicValue msgpack bytes
pub fn encode_dynamic_value(value: &Value) -> Result<Vec<u8>, StateError> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &to_msgpack(value))
        .map_err(|e| StateError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode JSON state, as found in `RawState` during upgrades.
pub fn decode_json_state(data: &[u8]) -> Result<Value, StateError> {
    if data.is_empty() {
        return Ok(Value::Null);
    }
    let json: serde_json::Value = serde_json::from_slice(data)?;
    Ok(from_json(json))
}

fn from_msgpack(raw: rmpv::Value) -> Result<Value, StateError> {
    Ok(match raw {
        rmpv::Value::Nil => Value::Null,
        rmpv::Value::Boolean(b) => Value::Bool(b),
        rmpv::Value::Integer(i) => {
            if let Some(n) = i.as_i64() {
                Value::Number(n.into())
            } else if let Some(n) = i.as_u64() {
                Value::Number(n.into())
            } else {
                return Err(StateError::Unsupported(format!("integer {i:?}")));
            }
        }
        rmpv::Value::F32(f) => float_value(f as f64),
        rmpv::Value::F64(f) => float_value(f),
        rmpv::Value::String(s) => match s.into_str() {
            Some(s) => Value::String(s),
            None => return Err(StateError::Unsupported("non UTF-8 string".to_string())),
        },
        rmpv::Value::Binary(_) => {
            return Err(StateError::Unsupported("binary".to_string()));
        }
        rmpv::Value::Array(items) => Value::List(
            items
                .into_iter()
                .map(from_msgpack)
                .collect::<Result<_, _>>()?,
        ),
        rmpv::Value::Map(entries) => {
            let mut map = BTreeMap::new();
            for (k, v) in entries {
                let key = match k {
                    rmpv::Value::String(s) => s
                        .into_str()
                        .ok_or_else(|| StateError::Unsupported("non UTF-8 key".to_string()))?,
                    other => return Err(StateError::Unsupported(format!("map key {other:?}"))),
                };
                map.insert(key, from_msgpack(v)?);
            }
            Value::Map(map)
        }
        rmpv::Value::Ext(UNKNOWN_EXT, _) => Value::Unknown,
        rmpv::Value::Ext(kind, _) => {
            return Err(StateError::Unsupported(format!("extension type {kind}")));
        }
    })
}

fn to_msgpack(value: &Value) -> rmpv::Value {
    match value {
        Value::Null => rmpv::Value::Nil,
        Value::Unknown => rmpv::Value::Ext(UNKNOWN_EXT, vec![0]),
        Value::Bool(b) => rmpv::Value::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                rmpv::Value::from(i)
            } else if let Some(u) = n.as_u64() {
                rmpv::Value::from(u)
            } else {
                rmpv::Value::F64(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => rmpv::Value::from(s.as_str()),
        Value::List(items) => rmpv::Value::Array(items.iter().map(to_msgpack).collect()),
        Value::Map(m) => rmpv::Value::Map(
            m.iter()
                .map(|(k, v)| (rmpv::Value::from(k.as_str()), to_msgpack(v)))
                .collect(),
        ),
    }
}

fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(m) => {
            Value::Map(m.into_iter().map(|(k, v)| (k, from_json(v))).collect())
        }
    }
}

/// Helper to extract a string attribute; empty when missing or not a string
pub fn get_string_attr(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_string())
        .unwrap_or("")
        .to_string()
}

/// Helper to extract a non-empty string attribute
pub fn get_optional_string_attr(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    })
}

pub fn get_int_attr(value: &Value, key: &str, default: i64) -> i64 {
    value.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
}

pub fn get_float_attr(value: &Value, key: &str, default: f64) -> f64 {
    value.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

pub fn get_bool_attr(value: &Value, key: &str, default: bool) -> bool {
    value.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

pub fn get_optional_bool_attr(value: &Value, key: &str) -> Option<bool> {
    value.get(key).and_then(|v| v.as_bool())
}

/// Elements of a list attribute; empty when missing, null or unknown
pub fn get_list_attr<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value.get(key).and_then(|v| v.as_list()).unwrap_or(&[])
}

/// Create an object value with the given attributes
pub fn make_state(attrs: Vec<(&str, Value)>) -> Value {
    Value::Map(
        attrs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    )
}

pub fn string_value(s: impl Into<String>) -> Value {
    Value::String(s.into())
}

/// String value, or null when absent
pub fn opt_string_value(s: Option<impl Into<String>>) -> Value {
    s.map(string_value).unwrap_or(Value::Null)
}

pub fn int_value(n: i64) -> Value {
    Value::Number(n.into())
}

/// Whole numbers are stored as integers so they compare equal to the
/// integers Terraform sends back.
pub fn float_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return int_value(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

pub fn opt_float_value(n: Option<f64>) -> Value {
    n.map(float_value).unwrap_or(Value::Null)
}

pub fn bool_value(b: bool) -> Value {
    Value::Bool(b)
}

pub fn opt_bool_value(b: Option<bool>) -> Value {
    b.map(Value::Bool).unwrap_or(Value::Null)
}

pub fn list_value(items: Vec<Value>) -> Value {
    Value::List(items)
}

pub fn string_list_value(items: &[String]) -> Value {
    Value::List(items.iter().map(|s| string_value(s.as_str())).collect())
}

pub fn null_value() -> Value {
    Value::Null
}

/// Replace every unknown left in `value` with null. State returned after
/// apply must be wholly known.
pub fn resolve_unknowns(value: Value) -> Value {
    match value {
        Value::Unknown => Value::Null,
        Value::List(items) => Value::List(items.into_iter().map(resolve_unknowns).collect()),
        Value::Map(attrs) => Value::Map(
            attrs
                .into_iter()
                .map(|(k, v)| (k, resolve_unknowns(v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        make_state(vec![
            ("id", string_value("p1")),
            ("cores", int_value(4)),
            ("ram", float_value(24576.5)),
            ("dhcp", bool_value(true)),
            ("name", Value::Unknown),
            ("tags", list_value(vec![string_value("a"), string_value("b")])),
            ("missing", null_value()),
        ])
    }

    #[test]
    fn test_msgpack_round_trip_preserves_unknown() {
        let value = sample();
        let bytes = encode_dynamic_value(&value).unwrap();
        let decoded = decode_dynamic_value(&bytes).unwrap();
        assert_eq!(decoded, value);
        assert!(decoded.get("name").unwrap().is_unknown());
    }

    #[test]
    fn test_unknown_uses_extension_zero() {
        let bytes = encode_dynamic_value(&Value::Unknown).unwrap();
        assert_eq!(bytes, vec![0xd4, 0x00, 0x00]);
    }

    #[test]
    fn test_empty_bytes_decode_to_null() {
        assert!(decode_dynamic_value(&[]).unwrap().is_null());
    }

    #[test]
    fn test_integers_encode_compactly() {
        assert_eq!(encode_dynamic_value(&int_value(5)).unwrap(), vec![0x05]);
    }

    #[test]
    fn test_other_extensions_are_rejected() {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &rmpv::Value::Ext(3, vec![1])).unwrap();
        assert!(decode_dynamic_value(&buf).is_err());
    }

    #[test]
    fn test_json_state_decodes() {
        let value = decode_json_state(br#"{"id":"i1","patches":["a"],"panicked":false}"#).unwrap();
        assert_eq!(get_string_attr(&value, "id"), "i1");
        assert_eq!(get_list_attr(&value, "patches").len(), 1);
        assert_eq!(get_optional_bool_attr(&value, "panicked"), Some(false));
    }

    #[test]
    fn test_attr_helpers() {
        let value = sample();
        assert_eq!(get_int_attr(&value, "cores", 0), 4);
        assert_eq!(get_float_attr(&value, "ram", 0.0), 24576.5);
        assert!(get_bool_attr(&value, "dhcp", false));
        assert_eq!(get_optional_string_attr(&value, "missing"), None);
        assert_eq!(get_string_attr(&value, "name"), "");
        assert_eq!(get_int_attr(&value, "absent", 300), 300);
    }

    #[test]
    fn test_numbers_sent_as_strings_still_parse() {
        let value = make_state(vec![("size", string_value("12345678901234567890"))]);
        assert!(value.get("size").unwrap().as_f64().is_some());
    }

    #[test]
    fn test_resolve_unknowns_reaches_nested_values() {
        let value = make_state(vec![
            ("id", string_value("w1")),
            ("token", Value::Unknown),
            ("users", list_value(vec![make_state(vec![("email", Value::Unknown)])])),
        ]);
        let resolved = resolve_unknowns(value);
        assert_eq!(resolved.get("token"), Some(&Value::Null));
        assert_eq!(get_list_attr(&resolved, "users")[0].get("email"), Some(&Value::Null));
        assert_eq!(get_string_attr(&resolved, "id"), "w1");
    }
}

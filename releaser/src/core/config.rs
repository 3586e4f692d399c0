//! Step configuration normalization and typed accessors.

use serde_json::Value;

use crate::core::error::ConfigError;
use crate::core::types::{ConfigMap, RawConfig};

/// Normalize a raw step configuration into its canonical mapping.
///
/// Native mappings are returned unchanged. Text and byte buffers are decoded
/// as JSON and must hold an object. Every other input is rejected with the
/// offending runtime type.
pub fn normalize(raw: &RawConfig) -> Result<ConfigMap, ConfigError> {
    match raw {
        RawConfig::Map(map) => Ok(map.clone()),
        RawConfig::Text(text) => decode("string", text.as_bytes()),
        RawConfig::Bytes(bytes) => decode("bytes", bytes),
        RawConfig::Other(value) => Err(ConfigError::UnsupportedType {
            found: value_kind(value),
        }),
    }
}

/// Normalize an arbitrary JSON value (e.g. a nested `env` entry).
pub fn normalize_value(value: &Value) -> Result<ConfigMap, ConfigError> {
    normalize(&RawConfig::from(value.clone()))
}

fn decode(encoding: &'static str, bytes: &[u8]) -> Result<ConfigMap, ConfigError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|err| ConfigError::Decode {
        encoding,
        message: err.to_string(),
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ConfigError::NotAMap {
            encoding,
            found: value_kind(&other),
        }),
    }
}

/// Runtime type name of a JSON value.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

/// Runtime type name of a raw configuration.
pub fn raw_kind(raw: &RawConfig) -> &'static str {
    match raw {
        RawConfig::Map(_) => "map",
        RawConfig::Text(_) => "string",
        RawConfig::Bytes(_) => "bytes",
        RawConfig::Other(value) => value_kind(value),
    }
}

/// Non-empty string value for `key`, whitespace kept as written.
/// Non-string values count as absent.
pub fn get_text<'a>(cfg: &'a ConfigMap, key: &str) -> Option<&'a str> {
    cfg.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Non-blank string value for `key`. Non-string values count as absent.
pub fn get_str<'a>(cfg: &'a ConfigMap, key: &str) -> Option<&'a str> {
    cfg.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Boolean flag for `key`, accepting `true`/`false` strings. Defaults to false.
pub fn get_bool(cfg: &ConfigMap, key: &str) -> bool {
    match cfg.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> ConfigMap {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn native_map_is_returned_unchanged() {
        let cfg = map(json!({"shell": "echo hi", "eachEntity": true, "nested": {"a": [1, 2]}}));
        let normalized = normalize(&RawConfig::Map(cfg.clone())).expect("normalize");
        assert_eq!(normalized, cfg);
    }

    #[test]
    fn text_and_bytes_are_decoded() {
        let text = RawConfig::Text(r#"{"path": "/tmp/x"}"#.to_string());
        assert_eq!(normalize(&text).expect("text"), map(json!({"path": "/tmp/x"})));

        let bytes = RawConfig::Bytes(br#"{"shell": "true"}"#.to_vec());
        assert_eq!(normalize(&bytes).expect("bytes"), map(json!({"shell": "true"})));
    }

    #[test]
    fn invalid_text_is_a_config_error() {
        for bad in ["{", "not json", "{\"a\":}", ""] {
            let err = normalize(&RawConfig::Text(bad.to_string())).expect_err(bad);
            assert!(matches!(err, ConfigError::Decode { encoding: "string", .. }));
        }
        let err = normalize(&RawConfig::Bytes(vec![0xff, 0x00])).expect_err("bytes");
        assert_eq!(err.config_type(), "bytes");
    }

    #[test]
    fn decoded_non_object_is_rejected() {
        let err = normalize(&RawConfig::Text("[1, 2]".to_string())).expect_err("array");
        assert_eq!(
            err,
            ConfigError::NotAMap {
                encoding: "string",
                found: "array"
            }
        );
    }

    #[test]
    fn other_types_are_rejected_with_their_type() {
        for (value, kind) in [
            (json!(null), "null"),
            (json!(true), "bool"),
            (json!(3), "number"),
            (json!(["a"]), "array"),
        ] {
            let err = normalize(&RawConfig::Other(value)).expect_err(kind);
            assert_eq!(err, ConfigError::UnsupportedType { found: kind });
        }
    }

    #[test]
    fn normalize_value_accepts_map_or_encoded_text() {
        let env = normalize_value(&json!({"A": "1"})).expect("map");
        assert_eq!(env, map(json!({"A": "1"})));
        let env = normalize_value(&json!("{\"A\": 1}")).expect("text");
        assert_eq!(env, map(json!({"A": 1})));
        assert!(normalize_value(&json!(5)).is_err());
        assert_eq!(
            normalize_value(&json!([123, 125])).expect_err("array"),
            ConfigError::UnsupportedType { found: "array" }
        );
    }

    #[test]
    fn accessors_tolerate_loose_types() {
        let cfg = map(json!({
            "shell": "echo",
            "blank": "   ",
            "number": 4,
            "flag": "TRUE",
            "off": false,
        }));
        assert_eq!(get_str(&cfg, "shell"), Some("echo"));
        assert_eq!(get_str(&cfg, "blank"), None);
        assert_eq!(get_str(&cfg, "number"), None);
        assert_eq!(get_str(&cfg, "missing"), None);
        assert_eq!(get_text(&cfg, "blank"), Some("   "));
        assert_eq!(get_text(&cfg, "number"), None);
        assert_eq!(get_text(&map(json!({"empty": ""})), "empty"), None);
        assert!(get_bool(&cfg, "flag"));
        assert!(!get_bool(&cfg, "off"));
        assert!(!get_bool(&cfg, "missing"));
    }
}

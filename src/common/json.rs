//! 松散 JSON 设置块的访问辅助
//!
//! 数据库中保存的 settings / streamSettings 是运营者手写的 JSON，字段可能缺失
//! 或类型不符。这里的访问器统一返回 `Option`，缺失与类型错误都视为 "不存在"。

use serde_json::{Map, Value};

/// Typed, non-panicking accessors over a JSON object.
pub trait ValueExt {
    fn str_at(&self, key: &str) -> Option<&str>;
    fn bool_at(&self, key: &str) -> Option<bool>;
    fn i64_at(&self, key: &str) -> Option<i64>;
    fn object_at(&self, key: &str) -> Option<&Map<String, Value>>;
    fn array_at(&self, key: &str) -> Option<&Vec<Value>>;

    /// Non-empty string field.
    fn non_empty_str_at(&self, key: &str) -> Option<&str> {
        self.str_at(key).filter(|s| !s.is_empty())
    }

    /// Port field, accepting either a JSON number or a numeric string.
    fn port_at(&self, key: &str) -> Option<u16>;
}

impl ValueExt for Value {
    fn str_at(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    fn bool_at(&self, key: &str) -> Option<bool> {
        self.get(key)?.as_bool()
    }

    fn i64_at(&self, key: &str) -> Option<i64> {
        let v = self.get(key)?;
        v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
    }

    fn object_at(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key)?.as_object()
    }

    fn array_at(&self, key: &str) -> Option<&Vec<Value>> {
        self.get(key)?.as_array()
    }

    fn port_at(&self, key: &str) -> Option<u16> {
        match self.get(key)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().map(|f| f as u64))
                .and_then(|p| u16::try_from(p).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Depth-first search for `key`.
///
/// Objects are walked in iteration order; each entry's key is compared before
/// descending into its value, so a match nested under an earlier entry wins
/// over a shallower match under a later one. Arrays are walked element by
/// element. Scalars never match.
pub fn search_key<'a>(data: &'a Value, key: &str) -> Option<&'a Value> {
    match data {
        Value::Object(map) => {
            for (k, v) in map {
                if k == key {
                    return Some(v);
                }
                if let Some(found) = search_key(v, key) {
                    return Some(found);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(|v| search_key(v, key)),
        _ => None,
    }
}

/// Extract the `Host` header from a header mapping, case-insensitively.
///
/// The value may be a single string or a list (first element wins). Anything
/// missing or of the wrong shape yields an empty string.
pub fn search_host(headers: Option<&Value>) -> String {
    let Some(map) = headers.and_then(Value::as_object) else {
        return String::new();
    };
    for (k, v) in map {
        if !k.eq_ignore_ascii_case("host") {
            continue;
        }
        return match v {
            Value::String(s) => s.clone(),
            Value::Array(hosts) => hosts
                .first()
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        };
    }
    String::new()
}

/// Collect the string elements of a JSON array, skipping non-strings.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

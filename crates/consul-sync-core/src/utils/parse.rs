//! Parsing of loosely typed service settings.

use consul_sync_types::{MetaValue, TagsValue};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static META_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[A-Z][A-Z_\d]+$").expect("Meta key regex is valid")
});

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%\{([^}]*)\}").expect("Placeholder regex is valid")
});

/// Strips matching surrounding quotes, repeatedly: `"'x'"` becomes `x`.
pub fn remove_around_quotas(s: &str) -> String {
    let mut current = s;
    loop {
        let bytes = current.as_bytes();
        if bytes.len() < 3 {
            break;
        }
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if !(first == b'"' || first == b'\'') || first != last {
            break;
        }
        let inner = &current[1..current.len() - 1];
        if inner.contains(['\r', '\n']) {
            break;
        }
        current = inner;
    }
    current.to_string()
}

/// Loose boolean: everything except `false`, `no` and `0` is true.
pub fn parse_boolean(raw: &str) -> bool {
    let s = raw.trim();
    !(s.eq_ignore_ascii_case("false") || s.eq_ignore_ascii_case("no") || s == "0")
}

/// `"a; b;;c"` becomes `[a, b, c]`; numbers become a single tag.
pub fn parse_tags(tags: &TagsValue) -> Vec<String> {
    match tags {
        TagsValue::Text(s) => remove_around_quotas(s)
            .split(';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
        TagsValue::Number(n) => vec![n.to_string()],
        TagsValue::List(items) => items
            .iter()
            .map(|v| scalar_to_string(v).trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    }
}

/// Parses user meta.
///
/// Text is read as a JSON object when it starts with `{`, otherwise as
/// `k=v;k2=v2`. Keys coming from an object must look like identifiers
/// (`^[A-Z][A-Z_\d]+$`, any case); pairs from the `k=v` form are taken as-is.
pub fn parse_meta(meta: &MetaValue) -> BTreeMap<String, String> {
    match meta {
        MetaValue::Map(map) => meta_from_object(map),
        MetaValue::Text(raw) => {
            let text = remove_around_quotas(raw);
            if text.starts_with('{') {
                match serde_json::from_str::<Map<String, Value>>(&text) {
                    Ok(map) => meta_from_object(&map),
                    Err(e) => {
                        tracing::debug!("meta is not a JSON object, ignored: {}", e);
                        BTreeMap::new()
                    },
                }
            } else if text.contains('=') {
                text.split(';')
                    .filter_map(|pair| pair.split_once('='))
                    .map(|(k, v)| (k.trim(), v.trim()))
                    .filter(|(k, _)| !k.is_empty())
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            } else {
                BTreeMap::new()
            }
        },
    }
}

fn meta_from_object(map: &Map<String, Value>) -> BTreeMap<String, String> {
    map.iter()
        .filter(|(k, _)| META_KEY.is_match(k))
        .map(|(k, v)| (k.clone(), scalar_to_string(v)))
        .collect()
}

/// Replaces `%{name}` with `values[name]`; unknown names become empty.
pub fn substitute_percent_bracket(text: &str, values: &BTreeMap<&str, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures<'_>| {
            values.get(caps[1].trim()).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Go-style duration (`500ms`, `10s`, `3m`, `1h`, bare number = seconds) to millis.
pub fn parse_duration_millis(raw: &str) -> Option<u64> {
    let s = raw.trim();
    let split = s.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: f64 = number.parse().ok()?;
    let factor = match unit.trim() {
        "ms" => 1.0,
        "" | "s" => 1_000.0,
        "m" => 60_000.0,
        "h" => 3_600_000.0,
        _ => return None,
    };
    let millis = value * factor;
    (millis.is_finite() && millis >= 0.0).then_some(millis as u64)
}

/// Strings stay raw, everything else is its JSON text.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

//! Loosely typed scalar settings (ports as strings, flags as "yes"/"0", ...).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Port given as number or string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u64),
    Text(String),
}

impl PortValue {
    /// `None` for zero, garbage, or values above 65535.
    pub fn as_port(&self) -> Option<u16> {
        let n = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<u64>().ok()?,
        };
        u16::try_from(n).ok().filter(|p| *p != 0)
    }

    pub fn raw(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<u16> for PortValue {
    fn from(port: u16) -> Self {
        Self::Number(u64::from(port))
    }
}

/// Boolean given as bool, number or string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Number(i64),
    Text(String),
}

impl FlagValue {
    /// Strings are true unless they read `false`, `no` or `0`.
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0,
            Self::Text(s) => {
                let s = s.trim();
                !(s.eq_ignore_ascii_case("false") || s.eq_ignore_ascii_case("no") || s == "0")
            },
        }
    }
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Service tags: `"a;b;c"`, a single number, or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagsValue {
    Text(String),
    Number(i64),
    List(Vec<Value>),
}

/// Service meta: JSON text, `k=v;k2=v2` text, or an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Text(String),
    Map(Map<String, Value>),
}

//! Serde helpers for the phpIPAM wire encoding
//!
//! phpIPAM transmits every scalar as a JSON string: integers as decimal
//! strings, booleans as `"0"`/`"1"`, and absent values as `""` or `null`.
//! These helpers decode that into logical types and encode it back.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serializer};
use serde_json::Value;

/// Skip predicate for zero integers
pub fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// Skip predicate for false booleans
pub fn is_false(v: &bool) -> bool {
    !*v
}

/// Null-tolerant string: `null` decodes to `""`
pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Host-side identity given either as a string or a number
pub fn identity<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Integers carried as decimal strings
pub mod int {
    use super::*;

    pub fn serialize<S>(v: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(0),
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| de::Error::custom(format!("expected unsigned integer, got {}", n))),
            Value::String(s) if s.is_empty() => Ok(0),
            Value::String(s) => s
                .parse()
                .map_err(|_| de::Error::custom(format!("expected integer string, got {:?}", s))),
            other => Err(de::Error::custom(format!(
                "expected integer string, got {}",
                other
            ))),
        }
    }
}

/// Booleans carried as `"0"`/`"1"`
pub mod boolean {
    use super::*;

    pub fn serialize<S>(v: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(if *v { "1" } else { "0" })
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(b),
            Value::Number(n) => Ok(n.as_u64().is_some_and(|n| n != 0)),
            Value::String(s) => match s.as_str() {
                "" | "0" => Ok(false),
                "1" => Ok(true),
                _ => Err(de::Error::custom(format!(
                    "expected \"0\" or \"1\", got {:?}",
                    s
                ))),
            },
            other => Err(de::Error::custom(format!(
                "expected boolean string, got {}",
                other
            ))),
        }
    }
}

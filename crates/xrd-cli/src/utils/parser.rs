use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::de::{DeserializeOwned, IntoDeserializer};
use std::str::FromStr;

/// Splits a `KEY=VALUE` override at its first `=`.
pub fn split_key_value(pair: &str) -> Result<(&str, &str), String> {
    match pair.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim(), value.trim())),
        _ => Err(format!("Invalid --set format: '{pair}'. Expected KEY=VALUE.")),
    }
}

pub fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid value for {key}: '{value}'"))
}

/// Parses a unit enum variant by its serialized (kebab-case) name.
pub fn parse_variant<T: DeserializeOwned>(key: &str, value: &str) -> Result<T, String> {
    let deserializer: StrDeserializer<'_, ValueError> = value.into_deserializer();
    T::deserialize(deserializer).map_err(|e| format!("Invalid value for {key}: {e}"))
}

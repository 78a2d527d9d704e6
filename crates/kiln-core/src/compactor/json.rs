//! Manifest data (JSON) minifier.

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use std::collections::HashSet;
use std::fmt;

/// Re-serializes JSON without insignificant whitespace.
///
/// Key order and number text are kept as written. Input that does not parse,
/// or that repeats a key within one object, is returned unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManifestDataMinifier;

impl ManifestDataMinifier {
    pub fn compact(&self, content: &[u8], logical_path: &str) -> Vec<u8> {
        // Re-encoding would silently keep only the last of repeated keys.
        if let Err(e) = serde_json::from_slice::<UniqueKeys>(content) {
            tracing::debug!(path = logical_path, error = %e, "json not compactable, keeping original");
            return content.to_vec();
        }
        match serde_json::from_slice::<serde_json::Value>(content) {
            Ok(value) => match serde_json::to_vec(&value) {
                Ok(out) => out,
                Err(e) => {
                    tracing::debug!(path = logical_path, error = %e, "json re-encode failed, keeping original");
                    content.to_vec()
                }
            },
            Err(e) => {
                tracing::debug!(path = logical_path, error = %e, "not valid JSON, keeping original");
                content.to_vec()
            }
        }
    }
}

/// Accepts any JSON value whose objects have no repeated keys.
struct UniqueKeys;

impl<'de> Deserialize<'de> for UniqueKeys {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(UniqueKeysVisitor)
    }
}

struct UniqueKeysVisitor;

impl<'de> Visitor<'de> for UniqueKeysVisitor {
    type Value = UniqueKeys;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_bool<E>(self, _: bool) -> Result<UniqueKeys, E> {
        Ok(UniqueKeys)
    }

    fn visit_i64<E>(self, _: i64) -> Result<UniqueKeys, E> {
        Ok(UniqueKeys)
    }

    fn visit_u64<E>(self, _: u64) -> Result<UniqueKeys, E> {
        Ok(UniqueKeys)
    }

    fn visit_f64<E>(self, _: f64) -> Result<UniqueKeys, E> {
        Ok(UniqueKeys)
    }

    fn visit_str<E>(self, _: &str) -> Result<UniqueKeys, E> {
        Ok(UniqueKeys)
    }

    fn visit_unit<E>(self) -> Result<UniqueKeys, E> {
        Ok(UniqueKeys)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<UniqueKeys, A::Error> {
        while seq.next_element::<UniqueKeys>()?.is_some() {}
        Ok(UniqueKeys)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<UniqueKeys, A::Error> {
        let mut seen = HashSet::new();
        while let Some(key) = map.next_key::<String>()? {
            if !seen.insert(key.clone()) {
                return Err(de::Error::custom(format!("duplicate key '{key}'")));
            }
            map.next_value::<UniqueKeys>()?;
        }
        Ok(UniqueKeys)
    }
}

//! Serde helpers for floats that may hold `+inf` as an "undefined" marker.
//!
//! JSON has no infinity literal, so `+inf` is written as `null` and `null`
//! reads back as `+inf`. Finite values pass through unchanged.

use serde::{Deserialize, Deserializer, Serializer};

/// Use with `#[serde(with = "crate::core::serde_float::infinite_as_null")]`.
pub mod infinite_as_null {
    use super::*;

    pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "super::infinite_as_null")]
        value: f64,
    }

    #[test]
    fn test_infinity_written_as_null() {
        let json = serde_json::to_string(&Holder {
            value: f64::INFINITY,
        })
        .unwrap();
        assert_eq!(json, r#"{"value":null}"#);

        let back: Holder = serde_json::from_str(&json).unwrap();
        assert_eq!(back.value, f64::INFINITY);
    }

    #[test]
    fn test_finite_value_unchanged() {
        let json = serde_json::to_string(&Holder { value: 1.25 }).unwrap();
        assert_eq!(json, r#"{"value":1.25}"#);
        let back: Holder = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Holder { value: 1.25 });
    }
}

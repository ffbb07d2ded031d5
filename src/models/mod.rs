pub mod chain;
pub mod message;
pub mod owner;
pub mod param;
pub mod token;

use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

/// Accepts a nullable numeric field published either as a string or as a number
/// and keeps its textual form, so precision is decided by the normalizer.
pub(crate) fn de_opt_numeric_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<JsonValue>::deserialize(deserializer)? {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s)),
        Some(JsonValue::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected numeric string, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::owner::OwnerRecord;
    use serde_json::json;

    #[test]
    fn test_quantity_accepts_string_or_number() {
        let from_string: OwnerRecord =
            serde_json::from_value(json!({"nft_id": "base.0x1.1", "quantity": "7"})).unwrap();
        let from_number: OwnerRecord =
            serde_json::from_value(json!({"nft_id": "base.0x1.1", "quantity": 7})).unwrap();
        let missing: OwnerRecord =
            serde_json::from_value(json!({"nft_id": "base.0x1.1", "quantity": null})).unwrap();

        assert_eq!(from_string.quantity.as_deref(), Some("7"));
        assert_eq!(from_number.quantity.as_deref(), Some("7"));
        assert_eq!(missing.quantity, None);
    }

    #[test]
    fn test_quantity_rejects_objects() {
        let result = serde_json::from_value::<OwnerRecord>(
            json!({"nft_id": "base.0x1.1", "quantity": {"v": 1}}),
        );
        assert!(result.is_err());
    }
}

//! Message values and their wire encoding.
//!
//! A [`Message`] is a populated [`MessageShape`]. On the wire it is a JSON
//! object keyed by field name. Decoding is lenient about absence (the
//! declared default is substituted) and strict about types.

use crate::error::{Result, RpcError};
use crate::schema::{FieldValue, MessageShape};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Ordered list of field values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    fields: Vec<(String, FieldValue)>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Message::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(FieldValue::as_i64)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(FieldValue::as_bool)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl MessageShape {
    /// Decode a wire value into a complete message.
    ///
    /// Every declared field is present in the result, in declaration order.
    /// Absent and `null` fields take their default. Unknown fields are
    /// ignored.
    pub fn decode(&self, value: &Value) -> Result<Message> {
        let present = self.decode_partial(value)?;
        let fields = self
            .fields
            .iter()
            .map(|field| {
                let value = present
                    .get(&field.name)
                    .cloned()
                    .unwrap_or_else(|| field.default.clone());
                (field.name.clone(), value)
            })
            .collect();
        Ok(Message { fields })
    }

    /// Decode only the fields present on the wire, without defaults.
    pub fn decode_partial(&self, value: &Value) -> Result<Message> {
        let empty = Map::new();
        let object = match value {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(RpcError::Decode {
                    message: format!("{} must be a JSON object, got {}", self.name, other),
                })
            }
        };

        for key in object.keys().filter(|k| self.field(k).is_none()) {
            debug!("Ignoring unknown field '{}' in {}", key, self.name);
        }

        let mut fields = Vec::with_capacity(object.len());
        for field in &self.fields {
            let raw = match object.get(&field.name) {
                None | Some(Value::Null) => continue,
                Some(raw) => raw,
            };
            let value = field.field_type.from_json(raw).ok_or_else(|| RpcError::Decode {
                message: format!(
                    "Field {}.{} expects {}, got {}",
                    self.name, field.name, field.field_type, raw
                ),
            })?;
            fields.push((field.name.clone(), value));
        }

        Ok(Message { fields })
    }

    /// Encode a message as a wire value.
    ///
    /// Only fields present in the message are written, so the receiving
    /// side substitutes its declared default for the rest.
    pub fn encode(&self, message: &Message) -> Result<Value> {
        let mut object = Map::new();
        for (name, value) in message.iter() {
            let field = self.field(name).ok_or_else(|| RpcError::Validation {
                field: format!("{}.{}", self.name, name),
                message: "field is not declared".to_string(),
            })?;
            let value = field
                .field_type
                .coerce(value)
                .ok_or_else(|| RpcError::Validation {
                    field: format!("{}.{}", self.name, name),
                    message: format!("expected {}, got {:?}", field.field_type, value),
                })?;
            object.insert(field.name.clone(), value.to_json());
        }

        // Keep declaration order on the wire.
        let mut ordered = Map::new();
        for field in &self.fields {
            if let Some(value) = object.remove(&field.name) {
                ordered.insert(field.name.clone(), value);
            }
        }
        Ok(Value::Object(ordered))
    }
}

/// Convert a serde value into a complete message checked against `shape`.
pub fn to_message<T: Serialize>(shape: &MessageShape, value: &T) -> Result<Message> {
    let json = serde_json::to_value(value)?;
    shape.decode(&json).map_err(|e| as_validation(shape, e))
}

/// Like [`to_message`] but leaves absent fields out, so the receiver applies
/// its declared defaults.
pub fn to_partial_message<T: Serialize>(shape: &MessageShape, value: &T) -> Result<Message> {
    let json = serde_json::to_value(value)?;
    shape.decode_partial(&json).map_err(|e| as_validation(shape, e))
}

fn as_validation(shape: &MessageShape, err: RpcError) -> RpcError {
    match err {
        RpcError::Decode { message } => RpcError::Validation {
            field: shape.name.clone(),
            message,
        },
        other => other,
    }
}

/// Convert a message into a serde value.
pub fn from_message<T: DeserializeOwned>(shape: &MessageShape, message: &Message) -> Result<T> {
    let json = shape.encode(message)?;
    serde_json::from_value(json).map_err(|e| RpcError::Decode {
        message: format!("{} does not match its Rust type: {}", shape.name, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaSet;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;

    fn order_shape() -> Arc<MessageShape> {
        let schema = SchemaSet::from_json(
            r#"{
                "messages": [{ "name": "Order", "fields": [
                    { "name": "item", "type": "string", "default": "coffee" },
                    { "name": "quantity", "type": "integer", "default": 1 },
                    { "name": "gift", "type": "boolean" },
                    { "name": "size", "type": "enum", "variants": ["SMALL", "LARGE"] }
                ]}],
                "services": [{ "name": "Shop", "methods": [
                    { "name": "Place", "request": "Order", "response": "Order" }
                ]}]
            }"#,
        )
        .unwrap();
        schema.method("Shop", "Place").unwrap().request.clone()
    }

    #[test]
    fn test_decode_substitutes_defaults() {
        let shape = order_shape();
        let message = shape.decode(&json!({ "gift": true })).unwrap();

        assert_eq!(message.get_str("item"), Some("coffee"));
        assert_eq!(message.get_i64("quantity"), Some(1));
        assert_eq!(message.get_bool("gift"), Some(true));
        assert_eq!(message.get_str("size"), Some("SMALL"));
        assert_eq!(message.len(), 4);
    }

    #[test]
    fn test_decode_null_and_missing_payload() {
        let shape = order_shape();
        let from_null = shape.decode(&Value::Null).unwrap();
        let from_empty = shape.decode(&json!({ "item": null })).unwrap();
        assert_eq!(from_null, from_empty);
        assert_eq!(from_null.get_str("item"), Some("coffee"));
    }

    #[test]
    fn test_decode_rejects_wrong_types() {
        let shape = order_shape();
        for bad in [
            json!({ "quantity": "lots" }),
            json!({ "gift": "yes" }),
            json!({ "size": "MEDIUM" }),
            json!({ "item": 3 }),
            json!(["item"]),
        ] {
            assert!(
                matches!(shape.decode(&bad), Err(RpcError::Decode { .. })),
                "should reject {}",
                bad
            );
        }
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let shape = order_shape();
        let message = shape.decode(&json!({ "colour": "blue" })).unwrap();
        assert!(message.get("colour").is_none());
    }

    #[test]
    fn test_encode_writes_only_present_fields_in_order() {
        let shape = order_shape();
        let message = Message::new().with("size", "LARGE").with("item", "tea");
        let value = shape.encode(&message).unwrap();

        assert_eq!(value, json!({ "item": "tea", "size": "LARGE" }));
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["item", "size"]);
    }

    #[test]
    fn test_encode_rejects_undeclared_field() {
        let shape = order_shape();
        let result = shape.encode(&Message::new().with("colour", "blue"));
        assert!(matches!(result, Err(RpcError::Validation { .. })));
    }

    #[test]
    fn test_encode_rejects_unknown_variant() {
        let shape = order_shape();
        let result = shape.encode(&Message::new().with("size", "HUGE"));
        assert!(matches!(result, Err(RpcError::Validation { .. })));
    }

    #[test]
    fn test_complete_message_survives_the_wire() {
        let shape = order_shape();
        let message = shape
            .decode(&json!({ "item": "tea", "quantity": 3, "gift": true, "size": "LARGE" }))
            .unwrap();
        let decoded = shape.decode(&shape.encode(&message).unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    fn full_order(item: &str, quantity: i64, gift: bool, size: &str) -> Message {
        Message::new()
            .with("item", item)
            .with("quantity", quantity)
            .with("gift", gift)
            .with("size", FieldValue::Enum(size.to_string()))
    }

    #[test]
    fn test_wire_roundtrip_over_edge_values() {
        let shape = order_shape();
        let items = ["", "tea", "h\u{e9}llo w\u{f6}rld", "\u{65e5}\u{672c}\u{8a9e} \u{2615}", "line\nbreak \"quoted\""];
        let quantities = [i64::MIN, -1, 0, 1, i64::MAX];

        for item in items {
            for quantity in quantities {
                for gift in [false, true] {
                    for size in ["SMALL", "LARGE"] {
                        let message = full_order(item, quantity, gift, size);
                        let wire = shape.encode(&message).unwrap();
                        assert_eq!(shape.decode(&wire).unwrap(), message, "wire form {}", wire);
                    }
                }
            }
        }
    }

    #[test]
    fn test_partial_message_decodes_to_defaults_filled_form() {
        let shape = order_shape();
        let full = full_order("\u{e9}clair", -7, true, "LARGE");
        let names: Vec<&str> = shape.fields.iter().map(|f| f.name.as_str()).collect();

        // Every subset of the declared fields.
        for mask in 0..(1u32 << names.len()) {
            let mut partial = Message::new();
            for (bit, name) in names.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    partial.set(*name, full.get(name).unwrap().clone());
                }
            }

            let mut expected = Message::new();
            for field in &shape.fields {
                let value = partial
                    .get(&field.name)
                    .cloned()
                    .unwrap_or_else(|| field.default.clone());
                expected.set(field.name.clone(), value);
            }

            let decoded = shape.decode(&shape.encode(&partial).unwrap()).unwrap();
            assert_eq!(decoded, expected, "subset mask {:#06b}", mask);
        }
    }

    #[test]
    fn test_set_replaces_existing_value() {
        let mut message = Message::new().with("item", "tea");
        message.set("item", "cocoa");
        assert_eq!(message.len(), 1);
        assert_eq!(message.get_str("item"), Some("cocoa"));
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Order {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item: Option<String>,
        #[serde(default)]
        quantity: i64,
        #[serde(default)]
        gift: bool,
        #[serde(default)]
        size: String,
    }

    #[test]
    fn test_typed_conversion_applies_defaults() {
        let shape = order_shape();
        let typed = Order {
            item: None,
            quantity: 2,
            gift: false,
            size: "LARGE".to_string(),
        };
        let message = to_message(&shape, &typed).unwrap();
        assert_eq!(message.get_str("item"), Some("coffee"));

        let back: Order = from_message(&shape, &message).unwrap();
        assert_eq!(back.item.as_deref(), Some("coffee"));
        assert_eq!(back.quantity, 2);
    }

    #[test]
    fn test_partial_conversion_skips_absent_fields() {
        let shape = order_shape();
        let typed = Order {
            item: None,
            quantity: 2,
            gift: false,
            size: "LARGE".to_string(),
        };
        let message = to_partial_message(&shape, &typed).unwrap();
        assert!(message.get("item").is_none());
        assert_eq!(message.get_i64("quantity"), Some(2));
    }

    #[test]
    fn test_typed_conversion_reports_validation() {
        let shape = order_shape();
        let typed = Order {
            item: None,
            quantity: 1,
            gift: false,
            size: "HUGE".to_string(),
        };
        assert!(matches!(
            to_message(&shape, &typed),
            Err(RpcError::Validation { .. })
        ));
    }
}

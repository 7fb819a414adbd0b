//! JSON-Cadence values.
//!
//! Transaction arguments are sent as JSON-Cadence documents and event
//! payloads arrive in the same encoding:
//!
//! ```text
//! {"type":"UInt64","value":"42"}
//! {"type":"Event","value":{"id":"A.0x..Pack.Mint","fields":[{"name":"id","value":{..}}]}}
//! ```

use serde_json::{json, Value};

use crate::chain::types::{Address, ChainError, ChainResult};

pub fn uint64(v: u64) -> Value {
    json!({ "type": "UInt64", "value": v.to_string() })
}

pub fn uint8(v: u8) -> Value {
    json!({ "type": "UInt8", "value": v.to_string() })
}

pub fn string(v: impl Into<String>) -> Value {
    json!({ "type": "String", "value": v.into() })
}

pub fn boolean(v: bool) -> Value {
    json!({ "type": "Bool", "value": v })
}

pub fn address(v: &Address) -> Value {
    json!({ "type": "Address", "value": v.to_string() })
}

pub fn array(values: Vec<Value>) -> Value {
    json!({ "type": "Array", "value": values })
}

/// Encode an argument to the bytes the access API expects.
pub fn encode(value: &Value) -> ChainResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ChainError::Decode(e.to_string()))
}

/// Field accessor over a decoded event payload.
#[derive(Debug, Clone)]
pub struct EventFields<'a> {
    fields: &'a [Value],
}

impl<'a> EventFields<'a> {
    pub fn parse(payload: &'a Value) -> ChainResult<Self> {
        let fields = payload
            .get("value")
            .and_then(|v| v.get("fields"))
            .and_then(Value::as_array)
            .ok_or_else(|| ChainError::Decode("event payload has no fields".into()))?;
        Ok(Self { fields })
    }

    fn raw(&self, name: &str) -> ChainResult<&'a Value> {
        self.fields
            .iter()
            .find(|f| f.get("name").and_then(Value::as_str) == Some(name))
            .and_then(|f| f.get("value"))
            .map(unwrap_optional)
            .ok_or_else(|| ChainError::Decode(format!("event field '{}' missing", name)))
    }

    pub fn u64(&self, name: &str) -> ChainResult<u64> {
        let v = self.raw(name)?;
        scalar(v)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ChainError::Decode(format!("event field '{}' is not an integer", name)))
    }

    pub fn string(&self, name: &str) -> ChainResult<String> {
        let v = self.raw(name)?;
        scalar(v)
            .map(str::to_string)
            .ok_or_else(|| ChainError::Decode(format!("event field '{}' is not a string", name)))
    }

    pub fn bool(&self, name: &str) -> ChainResult<bool> {
        self.raw(name)?
            .get("value")
            .and_then(Value::as_bool)
            .ok_or_else(|| ChainError::Decode(format!("event field '{}' is not a bool", name)))
    }

    /// Optional addresses decode to `None` when the chain emitted `nil`.
    pub fn address(&self, name: &str) -> ChainResult<Option<Address>> {
        let v = self.raw(name)?;
        match scalar(v) {
            Some(s) => s.parse().map(Some),
            None => Ok(None),
        }
    }
}

fn scalar(v: &Value) -> Option<&str> {
    v.get("value").and_then(Value::as_str)
}

fn unwrap_optional(v: &Value) -> &Value {
    if v.get("type").and_then(Value::as_str) == Some("Optional") {
        match v.get("value") {
            Some(inner) if !inner.is_null() => unwrap_optional(inner),
            _ => v,
        }
    } else {
        v
    }
}

/// Build an event payload. Used by the in-memory chain and tests.
pub fn event_payload(event_type: &str, fields: Vec<(&str, Value)>) -> Value {
    let fields: Vec<Value> = fields
        .into_iter()
        .map(|(name, value)| json!({ "name": name, "value": value }))
        .collect();
    json!({ "type": "Event", "value": { "id": event_type, "fields": fields } })
}

/// Wrap a value as a non-nil optional.
pub fn optional(value: Value) -> Value {
    json!({ "type": "Optional", "value": value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_encoding() {
        let bytes = encode(&uint64(7)).unwrap();
        let decoded: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded["type"], "UInt64");
        assert_eq!(decoded["value"], "7");
    }

    #[test]
    fn test_decode_deposit_fields() {
        let to: Address = "0x01cf0e2f2f715450".parse().unwrap();
        let payload = event_payload(
            "A.01cf0e2f2f715450.ExampleNFT.Deposit",
            vec![("id", uint64(12)), ("to", optional(address(&to)))],
        );
        let fields = EventFields::parse(&payload).unwrap();
        assert_eq!(fields.u64("id").unwrap(), 12);
        assert_eq!(fields.address("to").unwrap(), Some(to));
    }

    #[test]
    fn test_nil_optional_address() {
        let payload = event_payload(
            "A.01cf0e2f2f715450.ExampleNFT.Deposit",
            vec![("id", uint64(1)), ("to", json!({ "type": "Optional", "value": null }))],
        );
        let fields = EventFields::parse(&payload).unwrap();
        assert_eq!(fields.address("to").unwrap(), None);
    }

    #[test]
    fn test_missing_field() {
        let payload = event_payload("A.01.X.Opened", vec![("id", uint64(1))]);
        let fields = EventFields::parse(&payload).unwrap();
        assert!(fields.string("commitHash").is_err());
        assert!(fields.bool("openRequest").is_err());
    }

    #[test]
    fn test_bool_and_string_fields() {
        let payload = event_payload(
            "A.01.Pack.RevealRequest",
            vec![("id", uint64(3)), ("openRequest", boolean(true)), ("note", string("x"))],
        );
        let fields = EventFields::parse(&payload).unwrap();
        assert!(fields.bool("openRequest").unwrap());
        assert_eq!(fields.string("note").unwrap(), "x");
    }
}

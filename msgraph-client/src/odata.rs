//! OData wire shapes shared by every endpoint family
//!
//! Collection responses, the structured error envelope, and the two escape
//! hatches Graph payloads need: heterogeneous scalars (`DynamicValue`) and
//! polymorphic `@odata.type` families with unknown discriminators
//! (`Payload`).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One page of a collection response.
///
/// List responses carry the items under `value` and, when more pages
/// remain, an absolute continuation URL under `@odata.nextLink`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Structured error envelope returned by Graph on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(rename = "innerError", default)]
    pub inner_error: Option<InnerError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InnerError {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(rename = "request-id", default)]
    pub request_id: Option<String>,
    #[serde(rename = "client-request-id", default)]
    pub client_request_id: Option<String>,
}

impl ErrorResponse {
    /// Best-effort parse; `None` when the body is not the OData error shape.
    pub fn from_bytes(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }

    /// Correlation id from the inner error, when the server included one.
    pub fn request_id(&self) -> Option<&str> {
        self.error
            .inner_error
            .as_ref()
            .and_then(|inner| inner.request_id.as_deref())
    }
}

/// Heterogeneous scalar as emitted in group-policy presentation values.
///
/// The decoder tries narrow kinds first; anything structured (objects,
/// arrays, null) lands in `Opaque` with the raw JSON preserved. Untagged
/// deserialization tries variants in declaration order, so `Integer` must
/// stay ahead of `Floating`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DynamicValue {
    Integer(i64),
    Floating(f64),
    Boolean(bool),
    Text(String),
    Opaque(Value),
}

/// Polymorphic payload keyed on `@odata.type`.
///
/// Decoding tries the known family first; an unknown discriminator (or any
/// shape mismatch) falls back to `Unknown`, retaining the raw content for
/// forward compatibility instead of failing the whole response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<T> {
    Known(T),
    Unknown(Value),
}

impl<T> Payload<T> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Self::Known(inner) => Some(inner),
            Self::Unknown(_) => None,
        }
    }

    /// `@odata.type` discriminator of an unknown payload, when present.
    pub fn unknown_type(&self) -> Option<&str> {
        match self {
            Self::Known(_) => None,
            Self::Unknown(raw) => raw.get("@odata.type").and_then(Value::as_str),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Payload<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        match T::deserialize(raw.clone()) {
            Ok(known) => Ok(Self::Known(known)),
            Err(_) => Ok(Self::Unknown(raw)),
        }
    }
}

impl<T: Serialize> Serialize for Payload<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Known(inner) => inner.serialize(serializer),
            Self::Unknown(raw) => raw.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_response_parses_items_and_next_link() {
        let body = json!({
            "value": [{"id": "a"}, {"id": "b"}],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/items?$skip=2"
        });
        let page: ListResponse<Value> = serde_json::from_value(body).unwrap();
        assert_eq!(page.value.len(), 2);
        assert!(page.next_link.unwrap().contains("$skip=2"));
    }

    #[test]
    fn list_response_tolerates_missing_value() {
        let page: ListResponse<Value> = serde_json::from_str("{}").unwrap();
        assert!(page.value.is_empty());
        assert!(page.next_link.is_none());
    }

    #[test]
    fn error_response_surfaces_request_id() {
        let body = br#"{
            "error": {
                "code": "TooManyRequests",
                "message": "slow down",
                "innerError": {
                    "date": "2026-08-05T12:00:00",
                    "request-id": "r-123",
                    "client-request-id": "c-456"
                }
            }
        }"#;
        let parsed = ErrorResponse::from_bytes(body).unwrap();
        assert_eq!(parsed.error.code.as_deref(), Some("TooManyRequests"));
        assert_eq!(parsed.request_id(), Some("r-123"));
    }

    #[test]
    fn error_response_rejects_non_error_shape() {
        assert!(ErrorResponse::from_bytes(b"{\"id\":\"x\"}").is_none());
        assert!(ErrorResponse::from_bytes(b"not json").is_none());
    }

    #[test]
    fn dynamic_value_prefers_integer_over_float() {
        assert_eq!(
            serde_json::from_str::<DynamicValue>("7").unwrap(),
            DynamicValue::Integer(7)
        );
        assert_eq!(
            serde_json::from_str::<DynamicValue>("7.5").unwrap(),
            DynamicValue::Floating(7.5)
        );
    }

    #[test]
    fn dynamic_value_narrow_kinds_before_opaque() {
        assert_eq!(
            serde_json::from_str::<DynamicValue>("true").unwrap(),
            DynamicValue::Boolean(true)
        );
        assert_eq!(
            serde_json::from_str::<DynamicValue>("\"x\"").unwrap(),
            DynamicValue::Text("x".to_string())
        );
        assert_eq!(
            serde_json::from_str::<DynamicValue>("{\"k\":1}").unwrap(),
            DynamicValue::Opaque(json!({"k": 1}))
        );
    }

    #[test]
    fn dynamic_value_round_trips_through_json() {
        for raw in ["42", "3.25", "false", "\"text\"", "[1,2]"] {
            let decoded: DynamicValue = serde_json::from_str(raw).unwrap();
            let encoded = serde_json::to_string(&decoded).unwrap();
            let again: DynamicValue = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, again, "round trip changed {raw}");
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Script {
        #[serde(rename = "displayName")]
        display_name: String,
    }

    #[test]
    fn payload_decodes_known_family() {
        let payload: Payload<Script> =
            serde_json::from_value(json!({"displayName": "cleanup"})).unwrap();
        assert_eq!(payload.known().unwrap().display_name, "cleanup");
    }

    #[test]
    fn payload_retains_unknown_discriminator() {
        let payload: Payload<Script> = serde_json::from_value(json!({
            "@odata.type": "#microsoft.graph.futureThing",
            "newField": 1
        }))
        .unwrap();
        assert_eq!(
            payload.unknown_type(),
            Some("#microsoft.graph.futureThing")
        );
        match payload {
            Payload::Unknown(raw) => assert_eq!(raw["newField"], 1),
            Payload::Known(_) => panic!("should not decode as Script"),
        }
    }
}

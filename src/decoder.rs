//! Turns raw reply values into the shape the caller declared.
//!
//! Scalar-shaped results (primitives, enums, lists) may arrive bare or
//! wrapped in a `{"value": ...}` envelope. Structured results are handed
//! back untouched for the caller to decode.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::DecodeError;
use crate::types::{ResultType, SubscriptionId};

const ENVELOPE_FIELD: &str = "value";

/// Decode `raw` against `returns`.
///
/// Returns `Ok(None)` for `Void` (whatever the server sent) and for an
/// absent/null reply under any descriptor.
pub fn decode(raw: &Value, returns: &ResultType) -> Result<Option<Value>, DecodeError> {
    if *returns == ResultType::Void || raw.is_null() {
        return Ok(None);
    }

    if !returns.is_scalar_shaped() {
        return Ok(Some(raw.clone()));
    }

    let unwrapped = match raw {
        Value::Array(_) if !matches!(returns, ResultType::List(_)) => {
            return Err(DecodeError::ArrayToScalar {
                value: raw.to_string(),
                target: returns.type_name(),
            });
        }
        Value::Object(fields) => match fields.get(ENVELOPE_FIELD) {
            Some(inner) => inner,
            None => {
                return Err(DecodeError::MissingValue {
                    value: raw.to_string(),
                    target: returns.type_name(),
                });
            }
        },
        _ => raw,
    };

    if unwrapped.is_null() {
        return Ok(None);
    }

    check_shape(unwrapped, returns)?;
    Ok(Some(unwrapped.clone()))
}

/// Decode and then deserialize into `T`.
pub fn decode_as<T: DeserializeOwned>(
    raw: &Value,
    returns: &ResultType,
) -> Result<Option<T>, DecodeError> {
    match decode(raw, returns)? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Resolve the subscription id from a decoded subscribe reply.
///
/// A scalar is the id itself. An object must have exactly one field, whose
/// value is the id.
pub fn extract_subscription_id(decoded: Option<&Value>) -> Result<SubscriptionId, DecodeError> {
    let value = decoded.ok_or(DecodeError::MissingResult {
        operation: "subscribe",
    })?;

    match value {
        Value::Object(fields) => {
            if fields.len() != 1 {
                return Err(DecodeError::BadSubscription {
                    fields: fields.len(),
                    value: value.to_string(),
                });
            }
            let (_, inner) = fields.iter().next().ok_or(DecodeError::BadSubscription {
                fields: 0,
                value: value.to_string(),
            })?;
            scalar_as_string(inner).map(SubscriptionId::new)
        }
        other => scalar_as_string(other).map(SubscriptionId::new),
    }
}

/// Read a scalar as its string form, the way ids are compared on the wire.
pub(crate) fn scalar_as_string(value: &Value) -> Result<String, DecodeError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(DecodeError::KindMismatch {
            value: value.to_string(),
            target: "String".to_string(),
        }),
    }
}

fn check_shape(value: &Value, returns: &ResultType) -> Result<(), DecodeError> {
    let ok = match returns {
        ResultType::Void | ResultType::Object => true,
        ResultType::Primitive(kind) => {
            if value.is_array() {
                return Err(DecodeError::ArrayToScalar {
                    value: value.to_string(),
                    target: returns.type_name(),
                });
            }
            kind.accepts(value)
        }
        ResultType::Enum(_) => {
            if value.is_array() {
                return Err(DecodeError::ArrayToScalar {
                    value: value.to_string(),
                    target: returns.type_name(),
                });
            }
            value.is_string()
        }
        ResultType::List(element) => match value {
            Value::Array(items) => {
                for item in items.iter().filter(|i| !i.is_null()) {
                    check_shape(item, element)?;
                }
                true
            }
            _ => false,
        },
    };

    if ok {
        Ok(())
    } else {
        Err(DecodeError::KindMismatch {
            value: value.to_string(),
            target: returns.type_name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrimitiveKind;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;

    fn scalar_cases() -> Vec<(ResultType, Value)> {
        vec![
            (ResultType::string(), json!("hello")),
            (ResultType::integer(), json!(42)),
            (ResultType::integer(), json!(-7)),
            (ResultType::float(), json!(2.5)),
            (ResultType::boolean(), json!(true)),
            (ResultType::enumeration("MediaState"), json!("CONNECTED")),
        ]
    }

    #[test]
    fn test_bare_and_enveloped_scalars_decode_identically() {
        for (returns, scalar) in scalar_cases() {
            let bare = decode(&scalar, &returns).unwrap();
            let enveloped = decode(&json!({ "value": scalar.clone() }), &returns).unwrap();
            assert_eq!(bare, Some(scalar.clone()), "bare {}", returns);
            assert_eq!(bare, enveloped, "enveloped {}", returns);
        }
    }

    #[test]
    fn test_array_against_scalar_descriptor_fails() {
        for (returns, _) in scalar_cases() {
            let err = decode(&json!([1, 2, 3]), &returns).unwrap_err();
            assert!(
                matches!(err, DecodeError::ArrayToScalar { .. }),
                "{}: {:?}",
                returns,
                err
            );
            assert!(err.to_string().contains("cannot be converted to"));
        }
    }

    #[test]
    fn test_enveloped_array_against_scalar_descriptor_fails() {
        let err = decode(&json!({"value": [1]}), &ResultType::integer()).unwrap_err();
        assert!(matches!(err, DecodeError::ArrayToScalar { .. }));
    }

    #[test]
    fn test_object_without_value_field_fails() {
        for (returns, _) in scalar_cases() {
            let err = decode(&json!({"other": 1}), &returns).unwrap_err();
            assert!(matches!(err, DecodeError::MissingValue { .. }), "{}", returns);
        }
        let err = decode(&json!({}), &ResultType::list_of(ResultType::integer())).unwrap_err();
        assert!(matches!(err, DecodeError::MissingValue { .. }));
    }

    #[test]
    fn test_void_ignores_payload() {
        assert_eq!(decode(&json!({"value": 3}), &ResultType::Void).unwrap(), None);
        assert_eq!(decode(&json!([1, 2]), &ResultType::Void).unwrap(), None);
        assert_eq!(decode(&Value::Null, &ResultType::Void).unwrap(), None);
    }

    #[test]
    fn test_null_is_absent_for_every_descriptor() {
        let descriptors = [
            ResultType::string(),
            ResultType::enumeration("E"),
            ResultType::list_of(ResultType::string()),
            ResultType::Object,
        ];
        for returns in descriptors {
            assert_eq!(decode(&Value::Null, &returns).unwrap(), None);
        }
        assert_eq!(decode(&json!({"value": null}), &ResultType::integer()).unwrap(), None);
    }

    #[test]
    fn test_kind_mismatch_is_not_coerced() {
        let err = decode(&json!("12"), &ResultType::integer()).unwrap_err();
        assert!(matches!(err, DecodeError::KindMismatch { .. }));

        let err = decode(&json!({"value": 1.5}), &ResultType::integer()).unwrap_err();
        assert!(matches!(err, DecodeError::KindMismatch { .. }));

        let err = decode(&json!(3), &ResultType::enumeration("MediaState")).unwrap_err();
        assert!(matches!(err, DecodeError::KindMismatch { .. }));
    }

    #[test]
    fn test_list_accepts_bare_and_enveloped_arrays() {
        let returns = ResultType::list_of(ResultType::Primitive(PrimitiveKind::String));
        let items = json!(["a", "b"]);
        assert_eq!(decode(&items, &returns).unwrap(), Some(items.clone()));
        assert_eq!(
            decode(&json!({"value": ["a", "b"]}), &returns).unwrap(),
            Some(items)
        );
    }

    #[test]
    fn test_list_checks_elements() {
        let returns = ResultType::list_of(ResultType::integer());
        let err = decode(&json!([1, "two"]), &returns).unwrap_err();
        assert!(matches!(err, DecodeError::KindMismatch { .. }));

        let nested = ResultType::list_of(ResultType::list_of(ResultType::boolean()));
        assert!(decode(&json!([[true], [false, true]]), &nested).is_ok());
        assert!(decode(&json!([true]), &nested).is_err());
    }

    #[test]
    fn test_list_rejects_bare_scalar() {
        let err = decode(&json!(5), &ResultType::list_of(ResultType::integer())).unwrap_err();
        assert!(matches!(err, DecodeError::KindMismatch { .. }));
    }

    #[test]
    fn test_object_passes_through_unchanged() {
        let raw = json!({"value": 1, "extra": [1, 2]});
        assert_eq!(decode(&raw, &ResultType::Object).unwrap(), Some(raw.clone()));
        let arr = json!([{"a": 1}]);
        assert_eq!(decode(&arr, &ResultType::Object).unwrap(), Some(arr));
    }

    #[test]
    fn test_decode_as_typed() {
        #[derive(Debug, Deserialize, PartialEq)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        enum MediaState {
            Connected,
            Disconnected,
        }

        let state: Option<MediaState> =
            decode_as(&json!({"value": "DISCONNECTED"}), &ResultType::enumeration("MediaState"))
                .unwrap();
        assert_eq!(state, Some(MediaState::Disconnected));

        let n: Option<i32> = decode_as(&json!(9), &ResultType::integer()).unwrap();
        assert_eq!(n, Some(9));

        let err = decode_as::<MediaState>(&json!("PAUSED"), &ResultType::enumeration("MediaState"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Deserialize(_)));
    }

    #[test]
    fn test_subscription_id_from_bare_string() {
        let id = extract_subscription_id(Some(&json!("abc123"))).unwrap();
        assert_eq!(id.as_str(), "abc123");
    }

    #[test]
    fn test_subscription_id_from_single_field_object() {
        let id = extract_subscription_id(Some(&json!({"subscription": "abc123"}))).unwrap();
        assert_eq!(id.as_str(), "abc123");
        let id = extract_subscription_id(Some(&json!({"value": "abc123"}))).unwrap();
        assert_eq!(id.as_str(), "abc123");
    }

    #[test]
    fn test_subscription_id_rejects_other_shapes() {
        let err = extract_subscription_id(Some(&json!({}))).unwrap_err();
        assert!(matches!(err, DecodeError::BadSubscription { fields: 0, .. }));
        assert!(err.to_string().contains("should have one property"));

        let err = extract_subscription_id(Some(&json!({"a": 1, "b": 2}))).unwrap_err();
        assert!(matches!(err, DecodeError::BadSubscription { fields: 2, .. }));

        assert!(extract_subscription_id(None).is_err());
        assert!(extract_subscription_id(Some(&json!(["abc"]))).is_err());
    }
}

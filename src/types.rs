//! Data model shared by every layer of the client.
//!
//! Object references and subscription ids are opaque strings minted by the
//! remote side. The client never interprets them beyond equality.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flattened parameter map sent as `constructorParams` / `operationParams`.
///
/// Keys are unique by construction. Values are expected to be primitive or
/// already flattened; nothing in this crate recurses into them.
pub type Params = serde_json::Map<String, Value>;

/// Reference to an object that lives in the remote process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectRef(String);

impl ObjectRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ObjectRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Server-assigned subscription handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Result of a successful subscribe call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub object: ObjectRef,
    pub event_type: String,
}

/// An event pushed by the remote side.
///
/// Built on receipt, handed to the registered handler, then dropped. The
/// payload is forwarded exactly as it arrived on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RomEvent {
    pub object: ObjectRef,
    pub subscription: SubscriptionId,
    pub event_type: String,
    pub data: Value,
}

/// Scalar kinds a result descriptor can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    String,
    Integer,
    Float,
    Boolean,
}

impl PrimitiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveKind::String => "String",
            PrimitiveKind::Integer => "Integer",
            PrimitiveKind::Float => "Float",
            PrimitiveKind::Boolean => "Boolean",
        }
    }

    /// Whether a bare JSON scalar is an acceptable value of this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            PrimitiveKind::String => value.is_string(),
            PrimitiveKind::Integer => value.is_i64() || value.is_u64(),
            PrimitiveKind::Float => value.is_number(),
            PrimitiveKind::Boolean => value.is_boolean(),
        }
    }
}

/// Declared shape of an operation's result, chosen by the caller.
///
/// This drives decoding. It describes what the caller expects, not what the
/// server happens to send; a mismatch is a decode error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultType {
    Void,
    Primitive(PrimitiveKind),
    /// Enumeration carried on the wire by constant name.
    Enum(String),
    List(Box<ResultType>),
    /// Structured result, passed through for the caller to decode.
    Object,
}

impl ResultType {
    pub fn string() -> Self {
        ResultType::Primitive(PrimitiveKind::String)
    }

    pub fn integer() -> Self {
        ResultType::Primitive(PrimitiveKind::Integer)
    }

    pub fn float() -> Self {
        ResultType::Primitive(PrimitiveKind::Float)
    }

    pub fn boolean() -> Self {
        ResultType::Primitive(PrimitiveKind::Boolean)
    }

    pub fn enumeration(name: impl Into<String>) -> Self {
        ResultType::Enum(name.into())
    }

    pub fn list_of(element: ResultType) -> Self {
        ResultType::List(Box::new(element))
    }

    /// Name used in decode error messages, e.g. `List<Integer>`.
    pub fn type_name(&self) -> String {
        match self {
            ResultType::Void => "Void".to_string(),
            ResultType::Primitive(kind) => kind.as_str().to_string(),
            ResultType::Enum(name) => name.clone(),
            ResultType::List(element) => format!("List<{}>", element.type_name()),
            ResultType::Object => "Object".to_string(),
        }
    }

    /// Scalar-shaped descriptors accept the `{value: ...}` envelope.
    pub(crate) fn is_scalar_shaped(&self) -> bool {
        matches!(
            self,
            ResultType::Primitive(_) | ResultType::Enum(_) | ResultType::List(_)
        )
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name())
    }
}

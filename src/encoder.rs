//! Builds the four ROM request shapes.
//!
//! Field and method names here are the external protocol and must not change.

use serde_json::{Map, Value};

use crate::types::{ObjectRef, Params, ResultType};

pub const CREATE_METHOD: &str = "create";
pub const INVOKE_METHOD: &str = "invoke";
pub const RELEASE_METHOD: &str = "release";
pub const SUBSCRIBE_METHOD: &str = "subscribe";
pub const ONEVENT_METHOD: &str = "onEvent";

pub const CREATE_TYPE: &str = "type";
pub const CREATE_CONSTRUCTOR_PARAMS: &str = "constructorParams";
pub const INVOKE_OBJECT: &str = "object";
pub const INVOKE_OPERATION_NAME: &str = "operation";
pub const INVOKE_OPERATION_PARAMS: &str = "operationParams";
pub const RELEASE_OBJECT: &str = "object";
pub const SUBSCRIBE_OBJECT: &str = "object";
pub const SUBSCRIBE_TYPE: &str = "type";
pub const ONEVENT_OBJECT: &str = "object";
pub const ONEVENT_SUBSCRIPTION: &str = "subscription";
pub const ONEVENT_TYPE: &str = "type";
pub const ONEVENT_DATA: &str = "data";

/// A semantic ROM operation, before encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create {
        class_name: String,
        params: Option<Params>,
    },
    Invoke {
        object: ObjectRef,
        operation: String,
        params: Option<Params>,
        returns: ResultType,
    },
    Release {
        object: ObjectRef,
    },
    Subscribe {
        object: ObjectRef,
        event_type: String,
    },
}

impl Operation {
    /// Wire method name.
    pub fn method(&self) -> &'static str {
        match self {
            Operation::Create { .. } => CREATE_METHOD,
            Operation::Invoke { .. } => INVOKE_METHOD,
            Operation::Release { .. } => RELEASE_METHOD,
            Operation::Subscribe { .. } => SUBSCRIBE_METHOD,
        }
    }

    /// Descriptor the reply is decoded against.
    ///
    /// Create yields a reference string, release never yields a value, and
    /// subscribe replies are kept structural so the id extraction step can
    /// accept both of its wire shapes.
    pub fn result_type(&self) -> ResultType {
        match self {
            Operation::Create { .. } => ResultType::string(),
            Operation::Invoke { returns, .. } => returns.clone(),
            Operation::Release { .. } => ResultType::Void,
            Operation::Subscribe { .. } => ResultType::Object,
        }
    }
}

/// An encoded request: method name plus params object.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub method: &'static str,
    pub params: Map<String, Value>,
}

impl WireRequest {
    pub fn params_value(&self) -> Value {
        Value::Object(self.params.clone())
    }
}

/// Encode an operation into its wire request.
///
/// # Panics
///
/// Panics if an operation that targets an object carries an empty reference,
/// or if create is given an empty class name. Both are caller bugs.
pub fn encode(op: &Operation) -> WireRequest {
    let mut params = Map::new();

    match op {
        Operation::Create {
            class_name,
            params: constructor_params,
        } => {
            assert!(!class_name.is_empty(), "create requires a class name");
            params.insert(CREATE_TYPE.into(), Value::String(class_name.clone()));
            if let Some(p) = constructor_params {
                params.insert(CREATE_CONSTRUCTOR_PARAMS.into(), Value::Object(p.clone()));
            }
        }
        Operation::Invoke {
            object,
            operation,
            params: operation_params,
            ..
        } => {
            require_object(object, INVOKE_METHOD);
            params.insert(INVOKE_OBJECT.into(), Value::String(object.to_string()));
            params.insert(INVOKE_OPERATION_NAME.into(), Value::String(operation.clone()));
            if let Some(p) = operation_params {
                params.insert(INVOKE_OPERATION_PARAMS.into(), Value::Object(p.clone()));
            }
        }
        Operation::Release { object } => {
            require_object(object, RELEASE_METHOD);
            params.insert(RELEASE_OBJECT.into(), Value::String(object.to_string()));
        }
        Operation::Subscribe { object, event_type } => {
            require_object(object, SUBSCRIBE_METHOD);
            params.insert(SUBSCRIBE_OBJECT.into(), Value::String(object.to_string()));
            params.insert(SUBSCRIBE_TYPE.into(), Value::String(event_type.clone()));
        }
    }

    WireRequest {
        method: op.method(),
        params,
    }
}

fn require_object(object: &ObjectRef, method: &str) {
    assert!(
        !object.as_str().is_empty(),
        "{} requires an object reference",
        method
    );
}

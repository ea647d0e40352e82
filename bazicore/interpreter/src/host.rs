//! Boundary between scripts and their embedder. Host member access, static
//! calls and instantiation all funnel through [`HostInvoker`]; the engine
//! never reflects on host objects itself.

use std::any::Any;

use crate::value::Value;

/// Failures the host boundary can report. `InvocationThrew` carries an
/// exception payload that TRY/CATCH can observe; the other three abort the
/// run as invocation errors.
#[derive(Debug, Clone, PartialEq)]
pub enum HostError {
    MemberNotFound { type_name: String, member: String },
    NoAccessibleSetter { type_name: String, member: String },
    ArgumentTypeMismatch { member: String, detail: String },
    InvocationThrew(String),
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostError::MemberNotFound { type_name, member } => {
                write!(f, "member '{member}' was not found on '{type_name}'")
            }
            HostError::NoAccessibleSetter { type_name, member } => {
                write!(f, "property '{member}' on '{type_name}' has no accessible setter")
            }
            HostError::ArgumentTypeMismatch { member, detail } => {
                write!(f, "argument mismatch calling '{member}': {detail}")
            }
            HostError::InvocationThrew(msg) => write!(f, "invocation threw: {msg}"),
        }
    }
}

impl std::error::Error for HostError {}

/// Objects handed back across the host boundary. Hosts downcast through
/// `as_any` to recover their concrete types.
pub trait HostObject: Send + Sync {
    fn type_name(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
}

/// Reference to a host type, produced by dotted names that resolve to no
/// variable (`Clipboard.SetText(..)`, `System.Console`). Hosts receive it as
/// the target of static member access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHandle {
    pub path: String,
}

impl HostObject for ClassHandle {
    fn type_name(&self) -> &str {
        &self.path
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The embedder's view of external calls. Implementations must be `Send +
/// Sync`: un-awaited async methods run on worker threads and share the
/// invoker.
pub trait HostInvoker: Send + Sync {
    /// Called once per required namespace while the engine is preparing.
    /// Rejecting a capability stops the run before any statement executes.
    fn resolve_capability(&self, namespace: &str) -> Result<(), HostError> {
        let _ = namespace;
        Ok(())
    }

    fn instantiate(&self, class_path: &str, args: &[Value]) -> Result<Value, HostError>;

    fn invoke(&self, target: &Value, method: &str, args: &[Value]) -> Result<Value, HostError>;

    fn get_property(&self, target: &Value, name: &str) -> Result<Value, HostError>;

    fn set_property(&self, target: &Value, name: &str, value: Value) -> Result<(), HostError>;
}

/// Default invoker for hostless runs: every member access fails, so scripts
/// that never touch the host boundary run unchanged.
pub struct NullInvoker;

impl HostInvoker for NullInvoker {
    fn instantiate(&self, class_path: &str, _args: &[Value]) -> Result<Value, HostError> {
        Err(HostError::MemberNotFound { type_name: class_path.to_string(), member: "new".into() })
    }

    fn invoke(&self, target: &Value, method: &str, _args: &[Value]) -> Result<Value, HostError> {
        Err(HostError::MemberNotFound { type_name: target.type_name().into(), member: method.into() })
    }

    fn get_property(&self, target: &Value, name: &str) -> Result<Value, HostError> {
        Err(HostError::MemberNotFound { type_name: target.type_name().into(), member: name.into() })
    }

    fn set_property(&self, target: &Value, name: &str, _value: Value) -> Result<(), HostError> {
        Err(HostError::NoAccessibleSetter { type_name: target.type_name().into(), member: name.into() })
    }
}

use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Value};
use tether_core::ObjectId;
use thiserror::Error;

/// Errors surfaced to the host by the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("script engine error: {0}")]
    Engine(#[from] rquickjs::Error),

    #[error("uncaught script exception: {0}")]
    Exception(String),

    #[error("script class '{name}' is not registered")]
    UnknownScriptClass { name: String },

    #[error("object {id} does not exist")]
    NullObject { id: ObjectId },

    #[error("object {id} of class '{class_name}' cannot back script class '{script_class}' (expects '{base}')")]
    IncompatibleObject {
        id: ObjectId,
        class_name: String,
        script_class: String,
        base: String,
    },

    #[error("constructor of '{name}' did not produce a native instance")]
    NotANativeInstance { name: String },

    #[error("script bridge has been shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Converts an engine error, taking the pending exception out of the
    /// context when there is one.
    pub(crate) fn from_engine(ctx: &Ctx<'_>, err: rquickjs::Error) -> Self {
        if matches!(err, rquickjs::Error::Exception) {
            BridgeError::Exception(describe_exception(&ctx.catch()))
        } else {
            BridgeError::Engine(err)
        }
    }
}

/// Message (and stack, when present) of a thrown value.
pub(crate) fn describe_exception(value: &Value<'_>) -> String {
    if let Some(object) = value.as_object() {
        let message = object.get::<_, Option<String>>("message").ok().flatten();
        let stack = object.get::<_, Option<String>>("stack").ok().flatten();
        if let Some(message) = message {
            return match stack {
                Some(stack) if !stack.trim().is_empty() => format!("{message}\n{}", stack.trim_end()),
                _ => message,
            };
        }
    }
    value
        .get::<Coerced<String>>()
        .map(|text| text.0)
        .unwrap_or_else(|_| "unknown exception".to_string())
}

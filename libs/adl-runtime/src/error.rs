use std::fmt;
use std::path::PathBuf;

use crate::ast::{ScopedName, TypeExpr};

/// Failure to decode a JSON payload into a typed value.
///
/// Carries the location of the failure inside the payload. Context is
/// pushed from the innermost segment outwards as the error propagates
/// through nested bindings, and rendered outermost first:
/// `expected a number at $.readings.[2].value`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at {path}", path = self.path())]
pub struct JsonParseError {
    message: String,
    context: Vec<String>,
}

impl JsonParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// The failure without its location.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Location as `$`-rooted path.
    pub fn path(&self) -> String {
        std::iter::once("$")
            .chain(self.context.iter().rev().map(String::as_str))
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.context.push(field.into());
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.context.push(format!("[{index}]"));
        self
    }
}

/// Failure to encode a typed value as JSON.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("cannot encode non-finite number {0}")]
    NonFiniteNumber(f64),

    #[error("{0}")]
    Custom(String),
}

impl EncodeError {
    pub fn custom(msg: impl Into<String>) -> Self {
        EncodeError::Custom(msg.into())
    }
}

/// Failure to check untyped JSON against a type expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CheckError {
    #[error("json does not match type: {0}")]
    Mismatch(#[from] JsonParseError),

    #[error("unknown type {0}")]
    UnknownType(ScopedName),

    #[error("unknown primitive {0}")]
    UnknownPrimitive(String),

    #[error("unbound type parameter {0}")]
    UnboundTypeParam(String),

    #[error("cyclic type alias {0}")]
    CyclicAlias(ScopedName),

    #[error("type {texpr} expects {expected} type parameters, got {actual}")]
    Arity {
        texpr: TypeExpr,
        expected: usize,
        actual: usize,
    },
}

/// Failure to build a declaration registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error ({path}): {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid module ({path}): {source}")]
    Module {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("duplicate declaration {0}")]
    DuplicateDecl(ScopedName),
}

impl RegistryError {
    /// Add context to the error.
    ///
    /// Only `Config` carries a free-form message; other variants are
    /// returned unchanged.
    pub fn with_context(self, ctx: impl fmt::Display) -> Self {
        match self {
            RegistryError::Config(msg) => RegistryError::Config(format!("{ctx}: {msg}")),
            other => other,
        }
    }
}

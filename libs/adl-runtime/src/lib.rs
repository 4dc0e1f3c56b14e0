//! Runtime support for ADL values in Rust.
//!
//! Typed values move in and out of the type-erased [`Dynamic`] through a
//! [`JsonBinding`]: [`to_dynamic`] pairs the binding's type expression with
//! the encoded value, [`from_dynamic`] decodes only when the type
//! expressions match and returns `None` otherwise.

pub mod ast;
pub mod config;
pub mod dynamic;
pub mod error;
pub mod json;
pub mod resolver;

#[cfg(feature = "derive")]
pub use adl_runtime_derive::AdlType;

pub use ast::{ScopedName, TypeExpr, TypeRef};
pub use dynamic::{Dynamic, from_dynamic, to_dynamic};
pub use error::{CheckError, EncodeError, JsonParseError, RegistryError};
pub use json::{AdlType, Json, JsonBinding, TypeBinding, binding};
pub use resolver::{DeclRegistry, DeclResolver, check_json};

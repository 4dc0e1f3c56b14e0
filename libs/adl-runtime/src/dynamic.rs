use serde::{Deserialize, Serialize};

use crate::ast::{ScopedName, TypeExpr};
use crate::error::{CheckError, EncodeError, JsonParseError};
use crate::json::{AdlType, Json, JsonBinding, binding};
use crate::resolver::{DeclResolver, check_json};

/// A value of any ADL type, carried as JSON next to its type expression.
///
/// Immutable once built: the only ways to obtain one are [`Dynamic::new`],
/// [`to_dynamic`] and deserialization. Fields are read through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dynamic {
    type_expr: TypeExpr,
    value: Json,
}

impl Dynamic {
    /// Pair a type expression with a payload, verbatim.
    ///
    /// Nothing checks that `value` is a valid encoding of `type_expr`;
    /// prefer [`to_dynamic`], which takes both from the same binding.
    pub fn new(type_expr: TypeExpr, value: Json) -> Self {
        Self { type_expr, value }
    }

    pub fn type_expr(&self) -> &TypeExpr {
        &self.type_expr
    }

    pub fn value(&self) -> &Json {
        &self.value
    }

    pub fn into_parts(self) -> (TypeExpr, Json) {
        (self.type_expr, self.value)
    }

    /// [`to_dynamic`] with the canonical binding of `T`.
    pub fn from_value<T: AdlType>(value: &T) -> Result<Self, EncodeError> {
        to_dynamic(&binding::<T>(), value)
    }

    /// [`from_dynamic`] with the canonical binding of `T`.
    pub fn to_value<T: AdlType>(&self) -> Result<Option<T>, JsonParseError> {
        from_dynamic(&binding::<T>(), self)
    }

    /// Check the payload against the carried type expression and return a
    /// copy with struct defaults filled in.
    pub fn check(&self, resolver: &dyn DeclResolver) -> Result<Dynamic, CheckError> {
        let value = check_json(resolver, &self.type_expr, &self.value)?;
        Ok(Dynamic::new(self.type_expr.clone(), value))
    }
}

/// Wrap a value in a [`Dynamic`].
///
/// Type expression and payload both come from `binding`. Encode failures
/// are returned unchanged.
pub fn to_dynamic<T, B>(binding: &B, value: &T) -> Result<Dynamic, EncodeError>
where
    B: JsonBinding<T> + ?Sized,
{
    let type_expr = binding.type_expr();
    let value = binding.to_json(value)?;
    Ok(Dynamic::new(type_expr, value))
}

/// Extract a value from a [`Dynamic`].
///
/// Returns `Ok(None)` without decoding when the dynamic's type expression
/// differs from the binding's. A matching type followed by a malformed
/// payload is an `Err`, not `None`.
pub fn from_dynamic<T, B>(binding: &B, dynamic: &Dynamic) -> Result<Option<T>, JsonParseError>
where
    B: JsonBinding<T> + ?Sized,
{
    let expected = binding.type_expr();
    if dynamic.type_expr() != &expected {
        tracing::trace!(%expected, found = %dynamic.type_expr(), "dynamic type mismatch");
        return Ok(None);
    }
    binding.from_json(dynamic.value()).map(Some)
}

/// `sys.dynamic.Dynamic` is itself an ADL type, so dynamics nest.
impl AdlType for Dynamic {
    fn type_expr() -> TypeExpr {
        TypeExpr::reference(ScopedName::new("sys.dynamic", "Dynamic"))
    }

    fn to_json(&self) -> Result<Json, EncodeError> {
        serde_json::to_value(self).map_err(|e| EncodeError::custom(e.to_string()))
    }

    fn from_json(json: &Json) -> Result<Self, JsonParseError> {
        let obj = json
            .as_object()
            .ok_or_else(|| JsonParseError::new("expected an object"))?;
        let texpr = obj
            .get("typeExpr")
            .ok_or_else(|| JsonParseError::new("missing struct field typeExpr"))?;
        let type_expr = TypeExpr::deserialize(texpr)
            .map_err(|e| JsonParseError::new(e.to_string()).with_field("typeExpr"))?;
        let value = obj
            .get("value")
            .ok_or_else(|| JsonParseError::new("missing struct field value"))?;
        Ok(Dynamic::new(type_expr, value.clone()))
    }
}

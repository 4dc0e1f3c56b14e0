use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;

use base64::Engine;

use crate::ast::{Annotations, TypeExpr};
use crate::error::{EncodeError, JsonParseError};

/// JSON-serialized form of an ADL value.
pub type Json = serde_json::Value;

/// JSON object, as produced by struct and union bindings.
pub type JsonMap = serde_json::Map<String, Json>;

/// De/serializer for values of type `T`, together with the descriptor of
/// the ADL type it implements.
///
/// `type_expr()` must be deterministic, and `from_json` must accept
/// everything `to_json` produces for the same binding.
pub trait JsonBinding<T> {
    fn type_expr(&self) -> TypeExpr;

    fn to_json(&self, value: &T) -> Result<Json, EncodeError>;

    fn from_json(&self, json: &Json) -> Result<T, JsonParseError>;
}

/// A type with a canonical ADL binding.
///
/// Implemented here for the ADL primitives and their Rust counterparts,
/// and by `#[derive(AdlType)]` for user structs and enums.
pub trait AdlType: Sized {
    fn type_expr() -> TypeExpr;

    fn to_json(&self) -> Result<Json, EncodeError>;

    fn from_json(json: &Json) -> Result<Self, JsonParseError>;
}

/// `JsonBinding` view of an [`AdlType`].
pub struct TypeBinding<T>(PhantomData<fn() -> T>);

impl<T> TypeBinding<T> {
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for TypeBinding<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for TypeBinding<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TypeBinding<T> {}

impl<T> fmt::Debug for TypeBinding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeBinding<{}>", std::any::type_name::<T>())
    }
}

impl<T: AdlType> JsonBinding<T> for TypeBinding<T> {
    fn type_expr(&self) -> TypeExpr {
        T::type_expr()
    }

    fn to_json(&self, value: &T) -> Result<Json, EncodeError> {
        value.to_json()
    }

    fn from_json(&self, json: &Json) -> Result<T, JsonParseError> {
        T::from_json(json)
    }
}

/// Canonical binding of `T`.
pub fn binding<T: AdlType>() -> TypeBinding<T> {
    TypeBinding::new()
}

/// Decode the annotation keyed by the binding's declaration name.
///
/// Returns `Ok(None)` when the annotation is absent, or when the binding's
/// type is not a user declaration and so cannot key an annotation.
pub fn get_annotation<T, B: JsonBinding<T>>(
    binding: &B,
    annotations: &Annotations,
) -> Result<Option<T>, JsonParseError> {
    let texpr = binding.type_expr();
    let Some(name) = texpr.scoped_name() else {
        return Ok(None);
    };
    annotations
        .get(name)
        .map(|json| binding.from_json(json))
        .transpose()
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

impl AdlType for () {
    fn type_expr() -> TypeExpr {
        TypeExpr::primitive("Void")
    }

    fn to_json(&self) -> Result<Json, EncodeError> {
        Ok(Json::Null)
    }

    fn from_json(json: &Json) -> Result<Self, JsonParseError> {
        match json {
            Json::Null => Ok(()),
            _ => Err(JsonParseError::new("expected a null")),
        }
    }
}

impl AdlType for bool {
    fn type_expr() -> TypeExpr {
        TypeExpr::primitive("Bool")
    }

    fn to_json(&self) -> Result<Json, EncodeError> {
        Ok(Json::Bool(*self))
    }

    fn from_json(json: &Json) -> Result<Self, JsonParseError> {
        json.as_bool()
            .ok_or_else(|| JsonParseError::new("expected a bool"))
    }
}

impl AdlType for String {
    fn type_expr() -> TypeExpr {
        TypeExpr::primitive("String")
    }

    fn to_json(&self) -> Result<Json, EncodeError> {
        Ok(Json::String(self.clone()))
    }

    fn from_json(json: &Json) -> Result<Self, JsonParseError> {
        json.as_str()
            .map(str::to_owned)
            .ok_or_else(|| JsonParseError::new("expected a string"))
    }
}

impl AdlType for Json {
    fn type_expr() -> TypeExpr {
        TypeExpr::primitive("Json")
    }

    fn to_json(&self) -> Result<Json, EncodeError> {
        Ok(self.clone())
    }

    fn from_json(json: &Json) -> Result<Self, JsonParseError> {
        Ok(json.clone())
    }
}

macro_rules! signed_adl_type {
    ($ty:ty, $prim:literal) => {
        impl AdlType for $ty {
            fn type_expr() -> TypeExpr {
                TypeExpr::primitive($prim)
            }

            fn to_json(&self) -> Result<Json, EncodeError> {
                Ok(Json::from(*self))
            }

            fn from_json(json: &Json) -> Result<Self, JsonParseError> {
                let n = json
                    .as_number()
                    .ok_or_else(|| JsonParseError::new("expected a number"))?;
                if let Some(v) = n.as_i64() {
                    <$ty>::try_from(v).map_err(|_| out_of_range($prim, n))
                } else if n.is_u64() {
                    Err(out_of_range($prim, n))
                } else {
                    Err(JsonParseError::new(concat!("expected an integer for ", $prim)))
                }
            }
        }
    };
}

macro_rules! unsigned_adl_type {
    ($ty:ty, $prim:literal) => {
        impl AdlType for $ty {
            fn type_expr() -> TypeExpr {
                TypeExpr::primitive($prim)
            }

            fn to_json(&self) -> Result<Json, EncodeError> {
                Ok(Json::from(*self))
            }

            fn from_json(json: &Json) -> Result<Self, JsonParseError> {
                let n = json
                    .as_number()
                    .ok_or_else(|| JsonParseError::new("expected a number"))?;
                if let Some(v) = n.as_u64() {
                    <$ty>::try_from(v).map_err(|_| out_of_range($prim, n))
                } else if n.is_i64() {
                    Err(out_of_range($prim, n))
                } else {
                    Err(JsonParseError::new(concat!("expected an integer for ", $prim)))
                }
            }
        }
    };
}

fn out_of_range(prim: &str, n: &serde_json::Number) -> JsonParseError {
    JsonParseError::new(format!("number {n} out of range for {prim}"))
}

signed_adl_type!(i8, "Int8");
signed_adl_type!(i16, "Int16");
signed_adl_type!(i32, "Int32");
signed_adl_type!(i64, "Int64");
unsigned_adl_type!(u8, "Word8");
unsigned_adl_type!(u16, "Word16");
unsigned_adl_type!(u32, "Word32");
unsigned_adl_type!(u64, "Word64");

fn float_to_json(v: f64) -> Result<Json, EncodeError> {
    serde_json::Number::from_f64(v)
        .map(Json::Number)
        .ok_or(EncodeError::NonFiniteNumber(v))
}

fn float_from_json(json: &Json) -> Result<f64, JsonParseError> {
    json.as_f64()
        .ok_or_else(|| JsonParseError::new("expected a number"))
}

impl AdlType for f32 {
    fn type_expr() -> TypeExpr {
        TypeExpr::primitive("Float")
    }

    fn to_json(&self) -> Result<Json, EncodeError> {
        float_to_json(f64::from(*self))
    }

    fn from_json(json: &Json) -> Result<Self, JsonParseError> {
        let v = float_from_json(json)? as f32;
        match json {
            Json::Number(n) if !v.is_finite() => Err(out_of_range("Float", n)),
            _ => Ok(v),
        }
    }
}

impl AdlType for f64 {
    fn type_expr() -> TypeExpr {
        TypeExpr::primitive("Double")
    }

    fn to_json(&self) -> Result<Json, EncodeError> {
        float_to_json(*self)
    }

    fn from_json(json: &Json) -> Result<Self, JsonParseError> {
        float_from_json(json)
    }
}

/// ADL `Bytes`: serialized as a standard-alphabet base64 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Bytes(pub Vec<u8>);

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Bytes(v)
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AdlType for Bytes {
    fn type_expr() -> TypeExpr {
        TypeExpr::primitive("Bytes")
    }

    fn to_json(&self) -> Result<Json, EncodeError> {
        Ok(Json::String(
            base64::engine::general_purpose::STANDARD.encode(&self.0),
        ))
    }

    fn from_json(json: &Json) -> Result<Self, JsonParseError> {
        let s = json
            .as_str()
            .ok_or_else(|| JsonParseError::new("expected a string"))?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map(Bytes)
            .map_err(|e| JsonParseError::new(format!("invalid base64: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Containers
// ---------------------------------------------------------------------------

impl<T: AdlType> AdlType for Vec<T> {
    fn type_expr() -> TypeExpr {
        TypeExpr::primitive_of("Vector", vec![T::type_expr()])
    }

    fn to_json(&self) -> Result<Json, EncodeError> {
        self.iter()
            .map(AdlType::to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array)
    }

    fn from_json(json: &Json) -> Result<Self, JsonParseError> {
        let items = json
            .as_array()
            .ok_or_else(|| JsonParseError::new("expected an array"))?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| T::from_json(item).map_err(|e| e.with_index(i)))
            .collect()
    }
}

/// `Nullable<T>`: `None` is JSON `null`.
///
/// Nesting is not injective: `Some(None)` and `None` of
/// `Option<Option<T>>` both encode as `null` and decode as `None`.
impl<T: AdlType> AdlType for Option<T> {
    fn type_expr() -> TypeExpr {
        TypeExpr::primitive_of("Nullable", vec![T::type_expr()])
    }

    fn to_json(&self) -> Result<Json, EncodeError> {
        match self {
            Some(v) => v.to_json(),
            None => Ok(Json::Null),
        }
    }

    fn from_json(json: &Json) -> Result<Self, JsonParseError> {
        match json {
            Json::Null => Ok(None),
            other => T::from_json(other).map(Some),
        }
    }
}

fn string_map_from_json<T: AdlType, M: FromIterator<(String, T)>>(
    json: &Json,
) -> Result<M, JsonParseError> {
    let obj = json
        .as_object()
        .ok_or_else(|| JsonParseError::new("expected an object"))?;
    obj.iter()
        .map(|(k, v)| {
            T::from_json(v)
                .map(|v| (k.clone(), v))
                .map_err(|e| e.with_field(k.as_str()))
        })
        .collect()
}

fn string_map_to_json<'a, T: AdlType + 'a>(
    entries: impl Iterator<Item = (&'a String, &'a T)>,
) -> Result<Json, EncodeError> {
    let mut obj = JsonMap::new();
    for (k, v) in entries {
        obj.insert(k.clone(), v.to_json()?);
    }
    Ok(Json::Object(obj))
}

impl<T: AdlType> AdlType for BTreeMap<String, T> {
    fn type_expr() -> TypeExpr {
        TypeExpr::primitive_of("StringMap", vec![T::type_expr()])
    }

    fn to_json(&self) -> Result<Json, EncodeError> {
        string_map_to_json(self.iter())
    }

    fn from_json(json: &Json) -> Result<Self, JsonParseError> {
        string_map_from_json(json)
    }
}

impl<T: AdlType> AdlType for HashMap<String, T> {
    fn type_expr() -> TypeExpr {
        TypeExpr::primitive_of("StringMap", vec![T::type_expr()])
    }

    fn to_json(&self) -> Result<Json, EncodeError> {
        string_map_to_json(self.iter())
    }

    fn from_json(json: &Json) -> Result<Self, JsonParseError> {
        string_map_from_json(json)
    }
}

/// Boxing is a Rust representation detail, so it is invisible to ADL.
impl<T: AdlType> AdlType for Box<T> {
    fn type_expr() -> TypeExpr {
        T::type_expr()
    }

    fn to_json(&self) -> Result<Json, EncodeError> {
        (**self).to_json()
    }

    fn from_json(json: &Json) -> Result<Self, JsonParseError> {
        T::from_json(json).map(Box::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Annotation, ScopedName};
    use serde_json::json;

    #[test]
    fn primitive_descriptors() {
        assert_eq!(i32::type_expr().to_string(), "Int32");
        assert_eq!(u64::type_expr().to_string(), "Word64");
        assert_eq!(f32::type_expr().to_string(), "Float");
        assert_eq!(<()>::type_expr().to_string(), "Void");
        assert_eq!(
            <BTreeMap<String, Vec<Option<f64>>>>::type_expr().to_string(),
            "StringMap<Vector<Nullable<Double>>>"
        );
    }

    #[test]
    fn int_decode_checks_range() {
        assert_eq!(i8::from_json(&json!(-128)).unwrap(), -128);
        let err = i8::from_json(&json!(128)).unwrap_err();
        assert_eq!(err.message(), "number 128 out of range for Int8");
        let err = u16::from_json(&json!(-1)).unwrap_err();
        assert_eq!(err.message(), "number -1 out of range for Word16");
        let err = i64::from_json(&json!(u64::MAX)).unwrap_err();
        assert!(err.message().contains("out of range for Int64"));
    }

    #[test]
    fn int_decode_rejects_fractions_and_strings() {
        let err = i32::from_json(&json!(1.5)).unwrap_err();
        assert_eq!(err.message(), "expected an integer for Int32");
        let err = i32::from_json(&json!("42")).unwrap_err();
        assert_eq!(err.message(), "expected a number");
    }

    #[test]
    fn non_finite_float_fails_encode() {
        assert_eq!(
            f64::NAN.to_json().unwrap_err().to_string(),
            "cannot encode non-finite number NaN"
        );
        assert!(f32::INFINITY.to_json().is_err());
        assert_eq!(2.5f64.to_json().unwrap(), json!(2.5));
    }

    #[test]
    fn float_decode_rejects_numbers_beyond_f32() {
        assert_eq!(f32::from_json(&json!(1.5)).unwrap(), 1.5);
        assert_eq!(f32::from_json(&json!(f64::from(f32::MAX))).unwrap(), f32::MAX);
        let err = f32::from_json(&json!(1e300)).unwrap_err();
        assert_eq!(err.message(), "number 1e300 out of range for Float");
        let err = f32::from_json(&json!(-1e39)).unwrap_err();
        assert!(err.message().ends_with("out of range for Float"));
        assert_eq!(f64::from_json(&json!(1e300)).unwrap(), 1e300);
    }

    #[test]
    fn bytes_use_base64() {
        let bytes = Bytes(b"hello".to_vec());
        assert_eq!(bytes.to_json().unwrap(), json!("aGVsbG8="));
        assert_eq!(Bytes::from_json(&json!("aGVsbG8=")).unwrap(), bytes);
        let err = Bytes::from_json(&json!("not base64!")).unwrap_err();
        assert!(err.message().starts_with("invalid base64"));
    }

    #[test]
    fn vector_error_reports_index() {
        let err = <Vec<i32>>::from_json(&json!([1, 2, "three"])).unwrap_err();
        assert_eq!(err.to_string(), "expected a number at $.[2]");
    }

    #[test]
    fn string_map_error_reports_key() {
        let err = <HashMap<String, bool>>::from_json(&json!({"a": true, "b": 1})).unwrap_err();
        assert_eq!(err.to_string(), "expected a bool at $.b");
    }

    #[test]
    fn nullable_maps_null_to_none() {
        assert_eq!(<Option<String>>::from_json(&Json::Null).unwrap(), None);
        assert_eq!(
            <Option<String>>::from_json(&json!("x")).unwrap(),
            Some("x".to_string())
        );
        assert_eq!(None::<i32>.to_json().unwrap(), Json::Null);
    }

    #[test]
    fn nested_nullable_collapses_inner_none() {
        let inner_none: Option<Option<i32>> = Some(None);
        assert_eq!(inner_none.to_json().unwrap(), Json::Null);
        assert_eq!(<Option<Option<i32>>>::from_json(&Json::Null).unwrap(), None);
        assert_eq!(
            <Option<Option<i32>>>::from_json(&json!(3)).unwrap(),
            Some(Some(3))
        );
    }

    #[test]
    fn void_requires_null() {
        assert!(<()>::from_json(&Json::Null).is_ok());
        assert_eq!(
            <()>::from_json(&json!(0)).unwrap_err().message(),
            "expected a null"
        );
    }

    struct Owner;

    impl AdlType for Owner {
        fn type_expr() -> TypeExpr {
            TypeExpr::reference(ScopedName::new("demo.ann", "Owner"))
        }

        fn to_json(&self) -> Result<Json, EncodeError> {
            Ok(Json::Null)
        }

        fn from_json(json: &Json) -> Result<Self, JsonParseError> {
            json.as_str()
                .map(|_| Owner)
                .ok_or_else(|| JsonParseError::new("expected a string"))
        }
    }

    #[test]
    fn get_annotation_looks_up_by_scoped_name() {
        let annotations = Annotations(vec![Annotation {
            key: ScopedName::new("demo.ann", "Owner"),
            value: json!("team-a"),
        }]);
        assert!(get_annotation(&binding::<Owner>(), &annotations).unwrap().is_some());
        assert!(get_annotation(&binding::<Owner>(), &Annotations::default())
            .unwrap()
            .is_none());
        // Primitive types never key an annotation.
        assert!(get_annotation(&binding::<String>(), &annotations).unwrap().is_none());
    }

    #[test]
    fn get_annotation_propagates_decode_failure() {
        let annotations = Annotations(vec![Annotation {
            key: ScopedName::new("demo.ann", "Owner"),
            value: json!(7),
        }]);
        assert!(get_annotation(&binding::<Owner>(), &annotations).is_err());
    }
}

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::json::Json;

/// Module-qualified declaration name, e.g. `sys.dynamic.Dynamic`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedName {
    pub module_name: String,
    pub name: String,
}

impl ScopedName {
    pub fn new(module_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ScopedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module_name.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}.{}", self.module_name, self.name)
        }
    }
}

/// Head of a type expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeRef {
    /// Built-in type: `Int32`, `String`, `Vector`, ...
    Primitive(String),
    /// Unbound type parameter of the enclosing declaration.
    TypeParam(String),
    /// User declaration.
    Reference(ScopedName),
}

/// Runtime descriptor of a logical type.
///
/// Equality is structural and covers the parameters, so `Vector<Int32>`
/// and `Vector<String>` are different types. Two descriptors compare equal
/// exactly when their JSON encodings are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeExpr {
    pub type_ref: TypeRef,
    #[serde(default)]
    pub parameters: Vec<TypeExpr>,
}

impl TypeExpr {
    pub fn new(type_ref: TypeRef, parameters: Vec<TypeExpr>) -> Self {
        Self {
            type_ref,
            parameters,
        }
    }

    /// Parameterless primitive, e.g. `TypeExpr::primitive("Int32")`.
    pub fn primitive(name: impl Into<String>) -> Self {
        Self::new(TypeRef::Primitive(name.into()), Vec::new())
    }

    /// Primitive applied to parameters, e.g. `Vector<T>`.
    pub fn primitive_of(name: impl Into<String>, parameters: Vec<TypeExpr>) -> Self {
        Self::new(TypeRef::Primitive(name.into()), parameters)
    }

    pub fn type_param(name: impl Into<String>) -> Self {
        Self::new(TypeRef::TypeParam(name.into()), Vec::new())
    }

    pub fn reference(name: ScopedName) -> Self {
        Self::new(TypeRef::Reference(name), Vec::new())
    }

    pub fn reference_of(name: ScopedName, parameters: Vec<TypeExpr>) -> Self {
        Self::new(TypeRef::Reference(name), parameters)
    }

    pub fn is_void(&self) -> bool {
        matches!(&self.type_ref, TypeRef::Primitive(p) if p == "Void")
    }

    /// Scoped name when this expression refers to a user declaration.
    pub fn scoped_name(&self) -> Option<&ScopedName> {
        match &self.type_ref {
            TypeRef::Reference(name) => Some(name),
            _ => None,
        }
    }

    /// Replace type parameters by the expressions bound to them.
    ///
    /// Parameters missing from `bindings` are left in place.
    pub fn substitute(&self, bindings: &HashMap<&str, &TypeExpr>) -> TypeExpr {
        if let TypeRef::TypeParam(name) = &self.type_ref {
            if let Some(bound) = bindings.get(name.as_str()) {
                return (*bound).clone();
            }
        }
        TypeExpr {
            type_ref: self.type_ref.clone(),
            parameters: self
                .parameters
                .iter()
                .map(|p| p.substitute(bindings))
                .collect(),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.type_ref {
            TypeRef::Primitive(name) | TypeRef::TypeParam(name) => f.write_str(name)?,
            TypeRef::Reference(name) => write!(f, "{name}")?,
        }
        if !self.parameters.is_empty() {
            f.write_str("<")?;
            for (i, p) in self.parameters.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{p}")?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

/// ADL `sys.types.Maybe`: serialized as `"nothing"` or `{"just": value}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Maybe<T> {
    #[default]
    Nothing,
    Just(T),
}

impl<T> Maybe<T> {
    pub fn as_option(&self) -> Option<&T> {
        match self {
            Maybe::Nothing => None,
            Maybe::Just(v) => Some(v),
        }
    }
}

impl<T> From<Option<T>> for Maybe<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Maybe::Just(v),
            None => Maybe::Nothing,
        }
    }
}

/// One `(key, value)` annotation entry, in ADL's map-as-pairs form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "v1")]
    pub key: ScopedName,
    #[serde(rename = "v2")]
    pub value: Json,
}

/// Annotations attached to a declaration or field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Annotations(pub Vec<Annotation>);

impl Annotations {
    pub fn get(&self, key: &ScopedName) -> Option<&Json> {
        self.0.iter().find(|a| &a.key == key).map(|a| &a.value)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    pub serialized_name: String,
    pub type_expr: TypeExpr,
    #[serde(default)]
    pub default: Maybe<Json>,
    #[serde(default)]
    pub annotations: Annotations,
}

impl Field {
    /// Field whose serialized name equals its name, without default.
    pub fn new(name: impl Into<String>, type_expr: TypeExpr) -> Self {
        let name = name.into();
        Self {
            serialized_name: name.clone(),
            name,
            type_expr,
            default: Maybe::Nothing,
            annotations: Annotations::default(),
        }
    }

    pub fn with_default(mut self, default: Json) -> Self {
        self.default = Maybe::Just(default);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Struct {
    #[serde(default)]
    pub type_params: Vec<String>,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Union {
    #[serde(default)]
    pub type_params: Vec<String>,
    pub fields: Vec<Field>,
}

impl Union {
    /// A union whose every branch is void is an enumeration.
    pub fn is_enum(&self) -> bool {
        self.fields.iter().all(|f| f.type_expr.is_void())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDef {
    #[serde(default)]
    pub type_params: Vec<String>,
    pub type_expr: TypeExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewType {
    #[serde(default)]
    pub type_params: Vec<String>,
    pub type_expr: TypeExpr,
    #[serde(default)]
    pub default: Maybe<Json>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeclType {
    #[serde(rename = "struct_")]
    Struct(Struct),
    #[serde(rename = "union_")]
    Union(Union),
    #[serde(rename = "type_")]
    TypeDef(TypeDef),
    #[serde(rename = "newtype_")]
    NewType(NewType),
}

impl DeclType {
    pub fn type_params(&self) -> &[String] {
        match self {
            DeclType::Struct(s) => &s.type_params,
            DeclType::Union(u) => &u.type_params,
            DeclType::TypeDef(t) => &t.type_params,
            DeclType::NewType(n) => &n.type_params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decl {
    pub name: String,
    #[serde(default)]
    pub version: Maybe<u32>,
    #[serde(rename = "type_")]
    pub decl_type: DeclType,
    #[serde(default)]
    pub annotations: Annotations,
}

impl Decl {
    pub fn new(name: impl Into<String>, decl_type: DeclType) -> Self {
        Self {
            name: name.into(),
            version: Maybe::Nothing,
            decl_type,
            annotations: Annotations::default(),
        }
    }
}

/// A module as emitted by the ADL compiler's JSON AST backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    #[serde(default)]
    pub imports: Json,
    /// Declarations keyed by their unqualified name.
    pub decls: HashMap<String, Decl>,
    #[serde(default)]
    pub annotations: Annotations,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_expr_uses_adl_json_encoding() {
        let texpr = TypeExpr::primitive_of("Vector", vec![TypeExpr::primitive("Int32")]);
        let json = serde_json::to_value(&texpr).unwrap();
        assert_eq!(
            json,
            json!({
                "typeRef": {"primitive": "Vector"},
                "parameters": [{"typeRef": {"primitive": "Int32"}, "parameters": []}]
            })
        );
        let back: TypeExpr = serde_json::from_value(json).unwrap();
        assert_eq!(back, texpr);
    }

    #[test]
    fn parameters_take_part_in_equality() {
        let ints = TypeExpr::primitive_of("Vector", vec![TypeExpr::primitive("Int32")]);
        let strings = TypeExpr::primitive_of("Vector", vec![TypeExpr::primitive("String")]);
        assert_ne!(ints, strings);
        assert_eq!(ints, ints.clone());
    }

    #[test]
    fn display_renders_adl_syntax() {
        let texpr = TypeExpr::reference_of(
            ScopedName::new("demo.sensors", "Pair"),
            vec![
                TypeExpr::primitive("String"),
                TypeExpr::primitive_of("Nullable", vec![TypeExpr::primitive("Double")]),
            ],
        );
        assert_eq!(texpr.to_string(), "demo.sensors.Pair<String, Nullable<Double>>");
    }

    #[test]
    fn substitute_replaces_bound_params_only() {
        let texpr = TypeExpr::primitive_of(
            "StringMap",
            vec![TypeExpr::primitive_of("Vector", vec![TypeExpr::type_param("T")])],
        );
        let int = TypeExpr::primitive("Int64");
        let bindings = HashMap::from([("T", &int)]);
        assert_eq!(
            texpr.substitute(&bindings).to_string(),
            "StringMap<Vector<Int64>>"
        );

        let unbound = TypeExpr::type_param("U");
        assert_eq!(unbound.substitute(&bindings), unbound);
    }

    #[test]
    fn decl_parses_from_ast_json() {
        let decl: Decl = serde_json::from_value(json!({
            "name": "Reading",
            "version": "nothing",
            "type_": {"struct_": {
                "typeParams": [],
                "fields": [{
                    "name": "value",
                    "serializedName": "value",
                    "typeExpr": {"typeRef": {"primitive": "Double"}, "parameters": []},
                    "default": {"just": 0.0},
                    "annotations": []
                }]
            }},
            "annotations": []
        }))
        .unwrap();

        let DeclType::Struct(s) = &decl.decl_type else {
            panic!("expected struct, got {:?}", decl.decl_type);
        };
        assert_eq!(s.fields[0].default.as_option(), Some(&json!(0.0)));
    }
}

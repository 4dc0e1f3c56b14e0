//! Declaration lookup and schema-driven checking of untyped JSON.
//!
//! A receiver that holds a [`Dynamic`](crate::dynamic::Dynamic) but no Rust
//! type for it can still validate the payload, as long as the declarations
//! the type expression refers to are known to a [`DeclResolver`].

use std::collections::HashMap;
use std::path::Path;

use crate::ast::{Decl, DeclType, Module, ScopedName, Struct, TypeExpr, TypeRef, Union};
use crate::config::RegistryConfig;
use crate::dynamic::Dynamic;
use crate::error::{CheckError, JsonParseError, RegistryError};
use crate::json::{AdlType, Bytes, Json};

/// Resolves scoped names to ADL declarations.
pub trait DeclResolver {
    /// Returns `None` if the name is unknown.
    fn resolve(&self, name: &ScopedName) -> Option<&Decl>;
}

/// [`HashMap`]-backed [`DeclResolver`].
#[derive(Debug, Clone, Default)]
pub struct DeclRegistry {
    decls: HashMap<ScopedName, Decl>,
}

impl DeclRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the modules listed in `config`.
    pub fn from_config(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for path in config.module_paths() {
            registry.load_module(&path)?;
        }
        tracing::info!(
            modules = config.modules.len(),
            decls = registry.len(),
            "declaration registry ready"
        );
        Ok(registry)
    }

    /// Register one declaration of `module_name`.
    pub fn add_decl(&mut self, module_name: &str, decl: Decl) -> Result<(), RegistryError> {
        let name = ScopedName::new(module_name, decl.name.clone());
        if self.decls.contains_key(&name) {
            tracing::warn!(decl = %name, "duplicate declaration");
            return Err(RegistryError::DuplicateDecl(name));
        }
        self.decls.insert(name, decl);
        Ok(())
    }

    /// Register every declaration of `module`.
    ///
    /// Nothing is registered if any of its names is already taken.
    pub fn add_module(&mut self, module: Module) -> Result<(), RegistryError> {
        let count = module.decls.len();
        let taken = module
            .decls
            .values()
            .map(|decl| ScopedName::new(module.name.clone(), decl.name.clone()))
            .find(|name| self.decls.contains_key(name));
        if let Some(name) = taken {
            tracing::warn!(module = %module.name, decl = %name, "duplicate declaration");
            return Err(RegistryError::DuplicateDecl(name));
        }
        for decl in module.decls.into_values() {
            self.add_decl(&module.name, decl)?;
        }
        tracing::debug!(module = %module.name, decls = count, "module registered");
        Ok(())
    }

    /// Read a module from an ADL JSON AST file.
    pub fn load_module(&mut self, path: &Path) -> Result<(), RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let module: Module =
            serde_json::from_str(&content).map_err(|source| RegistryError::Module {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(path = %path.display(), module = %module.name, "module loaded");
        self.add_module(module)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &ScopedName> {
        self.decls.keys()
    }
}

impl DeclResolver for DeclRegistry {
    fn resolve(&self, name: &ScopedName) -> Option<&Decl> {
        self.decls.get(name)
    }
}

/// Check `json` against `texpr` and return its normalized form.
///
/// Normalization fills in struct field defaults and drops object keys that
/// are not declared fields. Type parameters of referenced declarations are
/// bound to the expression's parameters.
pub fn check_json(
    resolver: &dyn DeclResolver,
    texpr: &TypeExpr,
    json: &Json,
) -> Result<Json, CheckError> {
    check_value(resolver, texpr, json, &[])
}

/// `aliases` are the typedefs and newtypes expanded against this same
/// `json` value; seeing one of them again means the expansion never ends.
fn check_value(
    resolver: &dyn DeclResolver,
    texpr: &TypeExpr,
    json: &Json,
    aliases: &[ScopedName],
) -> Result<Json, CheckError> {
    match &texpr.type_ref {
        TypeRef::Primitive(name) => check_primitive(resolver, texpr, name, json, aliases),
        TypeRef::TypeParam(name) => Err(CheckError::UnboundTypeParam(name.clone())),
        TypeRef::Reference(name) => check_reference(resolver, texpr, name, json, aliases),
    }
}

fn mismatch(msg: impl Into<String>) -> CheckError {
    CheckError::Mismatch(JsonParseError::new(msg))
}

fn in_field(err: CheckError, field: &str) -> CheckError {
    match err {
        CheckError::Mismatch(e) => CheckError::Mismatch(e.with_field(field)),
        other => other,
    }
}

fn in_index(err: CheckError, index: usize) -> CheckError {
    match err {
        CheckError::Mismatch(e) => CheckError::Mismatch(e.with_index(index)),
        other => other,
    }
}

fn expect_arity(texpr: &TypeExpr, expected: usize) -> Result<(), CheckError> {
    if texpr.parameters.len() != expected {
        return Err(CheckError::Arity {
            texpr: texpr.clone(),
            expected,
            actual: texpr.parameters.len(),
        });
    }
    Ok(())
}

/// Decode with the Rust binding purely for validation.
fn via<T: AdlType>(json: &Json) -> Result<Json, CheckError> {
    T::from_json(json)?;
    Ok(json.clone())
}

fn check_primitive(
    resolver: &dyn DeclResolver,
    texpr: &TypeExpr,
    name: &str,
    json: &Json,
    aliases: &[ScopedName],
) -> Result<Json, CheckError> {
    let arity = match name {
        "Vector" | "StringMap" | "Nullable" => 1,
        "Void" | "Bool" | "Int8" | "Int16" | "Int32" | "Int64" | "Word8" | "Word16"
        | "Word32" | "Word64" | "Float" | "Double" | "String" | "Json" | "Bytes" => 0,
        other => return Err(CheckError::UnknownPrimitive(other.to_string())),
    };
    expect_arity(texpr, arity)?;

    match name {
        "Void" => via::<()>(json),
        "Bool" => via::<bool>(json),
        "Int8" => via::<i8>(json),
        "Int16" => via::<i16>(json),
        "Int32" => via::<i32>(json),
        "Int64" => via::<i64>(json),
        "Word8" => via::<u8>(json),
        "Word16" => via::<u16>(json),
        "Word32" => via::<u32>(json),
        "Word64" => via::<u64>(json),
        "Float" => via::<f32>(json),
        "Double" => via::<f64>(json),
        "String" => via::<String>(json),
        "Json" => Ok(json.clone()),
        "Bytes" => via::<Bytes>(json),
        "Vector" => {
            let items = json.as_array().ok_or_else(|| mismatch("expected an array"))?;
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    check_json(resolver, &texpr.parameters[0], item).map_err(|e| in_index(e, i))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Json::Array)
        }
        "StringMap" => {
            let obj = json.as_object().ok_or_else(|| mismatch("expected an object"))?;
            let mut out = serde_json::Map::new();
            for (k, v) in obj {
                let v = check_json(resolver, &texpr.parameters[0], v).map_err(|e| in_field(e, k))?;
                out.insert(k.clone(), v);
            }
            Ok(Json::Object(out))
        }
        "Nullable" => match json {
            Json::Null => Ok(Json::Null),
            other => check_value(resolver, &texpr.parameters[0], other, aliases),
        },
        other => Err(CheckError::UnknownPrimitive(other.to_string())),
    }
}

fn check_reference(
    resolver: &dyn DeclResolver,
    texpr: &TypeExpr,
    name: &ScopedName,
    json: &Json,
    aliases: &[ScopedName],
) -> Result<Json, CheckError> {
    let Some(decl) = resolver.resolve(name) else {
        if texpr == &<Dynamic as AdlType>::type_expr() {
            return check_nested_dynamic(resolver, json);
        }
        return Err(CheckError::UnknownType(name.clone()));
    };

    let type_params = decl.decl_type.type_params();
    expect_arity(texpr, type_params.len())?;
    let bindings: HashMap<&str, &TypeExpr> = type_params
        .iter()
        .map(String::as_str)
        .zip(texpr.parameters.iter())
        .collect();

    match &decl.decl_type {
        DeclType::Struct(s) => check_struct(resolver, s, &bindings, json),
        DeclType::Union(u) if u.is_enum() => check_enum(u, json),
        DeclType::Union(u) => check_union(resolver, u, &bindings, json),
        DeclType::TypeDef(t) => {
            check_alias(resolver, name, &t.type_expr.substitute(&bindings), json, aliases)
        }
        DeclType::NewType(n) => {
            check_alias(resolver, name, &n.type_expr.substitute(&bindings), json, aliases)
        }
    }
}

fn check_alias(
    resolver: &dyn DeclResolver,
    name: &ScopedName,
    target: &TypeExpr,
    json: &Json,
    aliases: &[ScopedName],
) -> Result<Json, CheckError> {
    if aliases.contains(name) {
        tracing::warn!(decl = %name, "cyclic type alias");
        return Err(CheckError::CyclicAlias(name.clone()));
    }
    let mut expanded = aliases.to_vec();
    expanded.push(name.clone());
    check_value(resolver, target, json, &expanded)
}

fn check_struct(
    resolver: &dyn DeclResolver,
    s: &Struct,
    bindings: &HashMap<&str, &TypeExpr>,
    json: &Json,
) -> Result<Json, CheckError> {
    let obj = json.as_object().ok_or_else(|| mismatch("expected an object"))?;
    let mut out = serde_json::Map::new();
    for field in &s.fields {
        let field_type = field.type_expr.substitute(bindings);
        let value = match (obj.get(&field.serialized_name), field.default.as_option()) {
            (Some(v), _) | (None, Some(v)) => check_json(resolver, &field_type, v)
                .map_err(|e| in_field(e, &field.serialized_name))?,
            (None, None) => {
                return Err(mismatch(format!(
                    "missing struct field {}",
                    field.serialized_name
                )));
            }
        };
        out.insert(field.serialized_name.clone(), value);
    }
    Ok(Json::Object(out))
}

fn check_enum(u: &Union, json: &Json) -> Result<Json, CheckError> {
    let s = json
        .as_str()
        .ok_or_else(|| mismatch("expected a string for enum"))?;
    if !u.fields.iter().any(|f| f.serialized_name == s) {
        return Err(mismatch(format!("invalid string for enum: {s}")));
    }
    Ok(json.clone())
}

fn check_union(
    resolver: &dyn DeclResolver,
    u: &Union,
    bindings: &HashMap<&str, &TypeExpr>,
    json: &Json,
) -> Result<Json, CheckError> {
    let lookup = |serialized: &str| {
        u.fields
            .iter()
            .find(|f| f.serialized_name == serialized)
            .ok_or_else(|| mismatch(format!("invalid union field {serialized}")))
    };

    match json {
        Json::String(s) => {
            let field = lookup(s.as_str())?;
            if !field.type_expr.is_void() {
                return Err(mismatch(format!(
                    "union field {s} needs an associated value"
                )));
            }
            Ok(json.clone())
        }
        Json::Object(obj) if obj.len() > 1 => Err(mismatch("union with multiple properties")),
        Json::Object(obj) => {
            let (k, v) = obj
                .iter()
                .next()
                .ok_or_else(|| mismatch("union without a property"))?;
            let field = lookup(k.as_str())?;
            let v = check_json(resolver, &field.type_expr.substitute(bindings), v)
                .map_err(|e| in_field(e, k))?;
            let mut out = serde_json::Map::new();
            out.insert(k.clone(), v);
            Ok(Json::Object(out))
        }
        _ => Err(mismatch("expected an object or string")),
    }
}

/// `sys.dynamic.Dynamic` without a registered declaration: check the
/// embedded value against its own type expression.
fn check_nested_dynamic(resolver: &dyn DeclResolver, json: &Json) -> Result<Json, CheckError> {
    let inner = Dynamic::from_json(json)?;
    let checked = inner.check(resolver).map_err(|e| in_field(e, "value"))?;
    checked
        .to_json()
        .map_err(|e| mismatch(e.to_string()))
}

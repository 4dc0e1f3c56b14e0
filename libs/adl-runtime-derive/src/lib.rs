use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, parse_macro_input};

/// Derive macro implementing `adl_runtime::AdlType` with ADL's JSON rules.
///
/// - Structs with named fields become JSON objects. Field names are
///   serialized in camelCase unless renamed.
/// - Enums become ADL unions: unit variants serialize as a bare string,
///   single-field tuple variants as `{"variant": value}`. An enum whose
///   variants are all unit is an ADL enum and only accepts strings.
///
/// # Example
///
/// ```ignore
/// #[derive(AdlType)]
/// #[adl(module = "demo.sensors", name = "Reading")]
/// pub struct SensorReading {
///     pub sensor_id: u32,
///
///     #[adl(rename = "temp", default)]
///     pub temperature: f64,
/// }
/// ```
///
/// Container attributes: `module` (required), `name` (defaults to the Rust
/// type name). Field/variant attributes: `rename`, `default` (fields only,
/// uses `Default::default()` when the field is absent).
#[proc_macro_derive(AdlType, attributes(adl))]
pub fn derive_adl_type(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match derive_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

#[derive(Default)]
struct AdlAttrs {
    module: Option<String>,
    name: Option<String>,
    rename: Option<String>,
    default: bool,
}

fn parse_attrs(attrs: &[Attribute]) -> Result<AdlAttrs, syn::Error> {
    let mut out = AdlAttrs::default();
    for attr in attrs {
        if !attr.path().is_ident("adl") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("module") {
                let value: LitStr = meta.value()?.parse()?;
                out.module = Some(value.value());
            } else if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                out.name = Some(value.value());
            } else if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                out.rename = Some(value.value());
            } else if meta.path.is_ident("default") {
                out.default = true;
            } else {
                return Err(meta.error("unknown adl attribute"));
            }
            Ok(())
        })?;
    }
    Ok(out)
}

fn derive_impl(input: &DeriveInput) -> Result<TokenStream2, syn::Error> {
    let ident = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "AdlType derive does not support generic types",
        ));
    }

    let attrs = parse_attrs(&input.attrs)?;
    let module = attrs.module.ok_or_else(|| {
        syn::Error::new_spanned(ident, "missing #[adl(module = \"...\")]")
    })?;
    let name = attrs.name.unwrap_or_else(|| ident.to_string());

    let (to_json, from_json) = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => struct_body(fields)?,
            _ => {
                return Err(syn::Error::new_spanned(
                    ident,
                    "AdlType only supports structs with named fields",
                ))
            }
        },
        Data::Enum(data) => enum_body(data)?,
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                ident,
                "AdlType does not support Rust unions",
            ))
        }
    };

    Ok(quote! {
        impl ::adl_runtime::json::AdlType for #ident {
            fn type_expr() -> ::adl_runtime::ast::TypeExpr {
                ::adl_runtime::ast::TypeExpr::reference(
                    ::adl_runtime::ast::ScopedName::new(#module, #name),
                )
            }

            fn to_json(
                &self,
            ) -> ::core::result::Result<::adl_runtime::json::Json, ::adl_runtime::error::EncodeError> {
                #to_json
            }

            fn from_json(
                __json: &::adl_runtime::json::Json,
            ) -> ::core::result::Result<Self, ::adl_runtime::error::JsonParseError> {
                #from_json
            }
        }
    })
}

fn struct_body(fields: &syn::FieldsNamed) -> Result<(TokenStream2, TokenStream2), syn::Error> {
    let mut inserts = Vec::new();
    let mut reads = Vec::new();

    for field in &fields.named {
        let field_ident = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected named field"))?;
        let ty = &field.ty;
        let attrs = parse_attrs(&field.attrs)?;
        let serialized = attrs
            .rename
            .unwrap_or_else(|| snake_to_camel(&field_ident.to_string()));

        inserts.push(quote! {
            __obj.insert(
                ::std::string::String::from(#serialized),
                ::adl_runtime::json::AdlType::to_json(&self.#field_ident)?,
            );
        });

        let missing = if attrs.default {
            quote! { ::core::default::Default::default() }
        } else {
            quote! {
                return ::core::result::Result::Err(::adl_runtime::error::JsonParseError::new(
                    ::std::format!("missing struct field {}", #serialized),
                ))
            }
        };

        reads.push(quote! {
            #field_ident: match __obj.get(#serialized) {
                ::core::option::Option::Some(__v) => {
                    <#ty as ::adl_runtime::json::AdlType>::from_json(__v)
                        .map_err(|e| e.with_field(#serialized))?
                }
                ::core::option::Option::None => { #missing }
            },
        });
    }

    let to_json = quote! {
        let mut __obj = ::adl_runtime::json::JsonMap::new();
        #(#inserts)*
        ::core::result::Result::Ok(::adl_runtime::json::Json::Object(__obj))
    };

    let from_json = quote! {
        let __obj = __json.as_object().ok_or_else(|| {
            ::adl_runtime::error::JsonParseError::new("expected an object")
        })?;
        ::core::result::Result::Ok(Self {
            #(#reads)*
        })
    };

    Ok((to_json, from_json))
}

fn enum_body(data: &syn::DataEnum) -> Result<(TokenStream2, TokenStream2), syn::Error> {
    let mut unit = Vec::new();
    let mut valued = Vec::new();

    for variant in &data.variants {
        let attrs = parse_attrs(&variant.attrs)?;
        if attrs.default {
            return Err(syn::Error::new_spanned(
                variant,
                "#[adl(default)] is only valid on struct fields",
            ));
        }
        let serialized = attrs
            .rename
            .unwrap_or_else(|| lower_first(&variant.ident.to_string()));
        let v_ident = &variant.ident;
        match &variant.fields {
            Fields::Unit => unit.push((v_ident, serialized)),
            Fields::Unnamed(f) if f.unnamed.len() == 1 => {
                valued.push((v_ident, serialized, &f.unnamed[0].ty))
            }
            _ => {
                return Err(syn::Error::new_spanned(
                    variant,
                    "AdlType enum variants must be unit or have exactly one unnamed field",
                ))
            }
        }
    }

    let unit_to = unit.iter().map(|(v, s)| {
        quote! {
            Self::#v => ::core::result::Result::Ok(
                ::adl_runtime::json::Json::String(::std::string::String::from(#s)),
            ),
        }
    });
    let valued_to = valued.iter().map(|(v, s, _)| {
        quote! {
            Self::#v(__inner) => {
                let mut __obj = ::adl_runtime::json::JsonMap::new();
                __obj.insert(
                    ::std::string::String::from(#s),
                    ::adl_runtime::json::AdlType::to_json(__inner)?,
                );
                ::core::result::Result::Ok(::adl_runtime::json::Json::Object(__obj))
            }
        }
    });
    let to_json = quote! {
        match self {
            #(#unit_to)*
            #(#valued_to)*
        }
    };

    let unit_names: Vec<_> = unit.iter().map(|(_, s)| s).collect();
    let unit_idents: Vec<_> = unit.iter().map(|(v, _)| v).collect();

    if valued.is_empty() {
        let from_json = quote! {
            let __s = __json.as_str().ok_or_else(|| {
                ::adl_runtime::error::JsonParseError::new("expected a string for enum")
            })?;
            match __s {
                #(#unit_names => ::core::result::Result::Ok(Self::#unit_idents),)*
                __other => ::core::result::Result::Err(::adl_runtime::error::JsonParseError::new(
                    ::std::format!("invalid string for enum: {}", __other),
                )),
            }
        };
        return Ok((to_json, from_json));
    }

    let valued_names: Vec<_> = valued.iter().map(|(_, s, _)| s).collect();
    let valued_idents: Vec<_> = valued.iter().map(|(v, _, _)| v).collect();
    let valued_types: Vec<_> = valued.iter().map(|(_, _, t)| t).collect();
    let needs_value: Vec<_> = valued
        .iter()
        .map(|(_, s, _)| format!("union field {s} needs an associated value"))
        .collect();
    let unit_fields = unit_names.clone();
    let unit_field_idents = unit_idents.clone();
    let valued_fields = valued_names.clone();

    let from_json = quote! {
        match __json {
            ::adl_runtime::json::Json::String(__s) => match __s.as_str() {
                #(#unit_names => ::core::result::Result::Ok(Self::#unit_idents),)*
                #(#valued_names => ::core::result::Result::Err(
                    ::adl_runtime::error::JsonParseError::new(#needs_value),
                ),)*
                __other => ::core::result::Result::Err(::adl_runtime::error::JsonParseError::new(
                    ::std::format!("invalid union field {}", __other),
                )),
            },
            ::adl_runtime::json::Json::Object(__obj) if __obj.len() > 1 => {
                ::core::result::Result::Err(::adl_runtime::error::JsonParseError::new(
                    "union with multiple properties",
                ))
            }
            ::adl_runtime::json::Json::Object(__obj) => {
                let (__k, __v) = __obj.iter().next().ok_or_else(|| {
                    ::adl_runtime::error::JsonParseError::new("union without a property")
                })?;
                match __k.as_str() {
                    #(#unit_fields => {
                        <() as ::adl_runtime::json::AdlType>::from_json(__v)
                            .map_err(|e| e.with_field(__k.as_str()))?;
                        ::core::result::Result::Ok(Self::#unit_field_idents)
                    })*
                    #(#valued_fields => ::core::result::Result::Ok(Self::#valued_idents(
                        <#valued_types as ::adl_runtime::json::AdlType>::from_json(__v)
                            .map_err(|e| e.with_field(__k.as_str()))?,
                    )),)*
                    __other => ::core::result::Result::Err(
                        ::adl_runtime::error::JsonParseError::new(
                            ::std::format!("invalid union field {}", __other),
                        ),
                    ),
                }
            }
            _ => ::core::result::Result::Err(::adl_runtime::error::JsonParseError::new(
                "expected an object or string",
            )),
        }
    };

    Ok((to_json, from_json))
}

/// `sensor_id` -> `sensorId`.
fn snake_to_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper = false;
    for c in s.trim_start_matches("r#").chars() {
        if c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// `Circle` -> `circle`, `NotStarted` -> `notStarted`.
fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

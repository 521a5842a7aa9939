//! Implementation of the `#[derive(Entity)]` macro.

use std::collections::HashSet;

use convert_case::{Case, Casing};
use proc_macro_crate::{FoundCrate, crate_name};
use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr};

/// Path to the engine crate as seen from the deriving crate.
fn engine_path() -> TokenStream {
    match crate_name("sift-query") {
        Ok(FoundCrate::Itself) => quote! { crate },
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote! { ::#ident }
        }
        Err(_) => match crate_name("sift") {
            Ok(FoundCrate::Itself) => quote! { crate::query },
            Ok(FoundCrate::Name(name)) => {
                let ident = Ident::new(&name, Span::call_site());
                quote! { ::#ident::query }
            }
            Err(_) => quote! { ::sift_query },
        },
    }
}

/// Parse and generate code for the `#[derive(Entity)]` macro.
pub fn derive_entity_impl(input: &DeriveInput) -> Result<TokenStream, syn::Error> {
    generate(input, &engine_path())
}

fn generate(input: &DeriveInput, engine: &TokenStream) -> Result<TokenStream, syn::Error> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Entity derive does not support generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Entity derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Entity derive only supports structs",
            ));
        }
    };

    let struct_attrs = parse_struct_attrs(input)?;
    let entity_name = struct_attrs.name.unwrap_or_else(|| name.to_string());

    let mut seen = HashSet::new();
    let mut properties = Vec::new();
    for field in fields {
        let Some(info) = parse_field(field, struct_attrs.rename_all)? else {
            continue;
        };
        if !seen.insert(info.property_name.clone()) {
            return Err(syn::Error::new_spanned(
                field,
                format!("Duplicate property name '{}'", info.property_name),
            ));
        }
        properties.push(info);
    }

    let registrations = properties.iter().map(|p| {
        let field = &p.field;
        let property_name = &p.property_name;
        quote! { .field(#property_name, |e: &#name| &e.#field) }
    });

    Ok(quote! {
        impl #engine::entity::Entity for #name {
            fn metadata() -> &'static #engine::entity::EntityMetadata<Self> {
                static METADATA: ::std::sync::OnceLock<#engine::entity::EntityMetadata<#name>> =
                    ::std::sync::OnceLock::new();
                METADATA.get_or_init(|| {
                    #engine::entity::EntityMetadata::builder(#entity_name)
                        #(#registrations)*
                        .build()
                })
            }
        }
    })
}

/// Naming rule applied to field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenameRule {
    Verbatim,
    Case(Case),
}

impl RenameRule {
    fn parse(lit: &LitStr) -> Result<Self, syn::Error> {
        let rule = match lit.value().as_str() {
            "verbatim" => Self::Verbatim,
            "PascalCase" => Self::Case(Case::Pascal),
            "camelCase" => Self::Case(Case::Camel),
            "snake_case" => Self::Case(Case::Snake),
            "SCREAMING_SNAKE_CASE" => Self::Case(Case::UpperSnake),
            "kebab-case" => Self::Case(Case::Kebab),
            "lowercase" => Self::Case(Case::Flat),
            "UPPERCASE" => Self::Case(Case::UpperFlat),
            other => {
                return Err(syn::Error::new_spanned(
                    lit,
                    format!("Unknown rename_all rule '{}'", other),
                ));
            }
        };
        Ok(rule)
    }

    fn apply(&self, field: &str) -> String {
        match self {
            Self::Verbatim => field.to_string(),
            Self::Case(case) => field.to_case(*case),
        }
    }
}

impl Default for RenameRule {
    fn default() -> Self {
        Self::Case(Case::Pascal)
    }
}

/// Struct-level attributes parsed from `#[sift(...)]`.
#[derive(Debug, Default)]
struct StructAttrs {
    name: Option<String>,
    rename_all: RenameRule,
}

/// Parse struct-level `#[sift(...)]` attributes.
fn parse_struct_attrs(input: &DeriveInput) -> Result<StructAttrs, syn::Error> {
    let mut attrs = StructAttrs::default();

    for attr in &input.attrs {
        if !attr.path().is_ident("sift") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.name = Some(value.value());
            } else if meta.path.is_ident("rename_all") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.rename_all = RenameRule::parse(&value)?;
            } else {
                return Err(meta.error("unsupported sift attribute; expected `name` or `rename_all`"));
            }
            Ok(())
        })?;
    }

    Ok(attrs)
}

/// A field exposed as a property.
#[derive(Debug)]
struct PropertyInfo {
    field: Ident,
    property_name: String,
}

/// Parse a field and its `#[sift(...)]` attributes. `None` for skipped fields.
fn parse_field(field: &syn::Field, rule: RenameRule) -> Result<Option<PropertyInfo>, syn::Error> {
    let ident = field
        .ident
        .clone()
        .ok_or_else(|| syn::Error::new_spanned(field, "Fields must be named"))?;

    let raw = ident.to_string();
    let raw = raw.strip_prefix("r#").unwrap_or(&raw);
    let mut property_name = rule.apply(raw);
    let mut skip = false;

    for attr in &field.attrs {
        if !attr.path().is_ident("sift") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                skip = true;
            } else if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                property_name = value.value();
            } else {
                return Err(meta.error("unsupported sift attribute; expected `rename` or `skip`"));
            }
            Ok(())
        })?;
    }

    if skip {
        return Ok(None);
    }
    Ok(Some(PropertyInfo {
        field: ident,
        property_name,
    }))
}

//! Derive macros for `causeway`.
//!
//! `#[derive(Record)]` turns a plain struct into a reflected record: it
//! emits the `RecordType` metadata the schema synthesizer walks, plus the
//! conversions between the typed struct and the dynamic value form the
//! codecs operate on. `#[derive(ProtoEnum)]` does the same for fieldless
//! enums.
//!
//! Field behavior is controlled through a single `#[proto(...)]` attribute:
//!
//! ```ignore
//! #[derive(Record)]
//! struct CreateUserRequest {
//!     /// Display name for the new user.
//!     #[proto(validate = "required")]
//!     name: String,
//!     #[proto(name = "emailAddress", validate = "required,email")]
//!     email: String,
//!     #[proto(optional)]
//!     nickname: String,
//! }
//! ```
//!
//! Recognized entries: `name = "..."` (outer-name override), `validate =
//! "..."`, `default = "..."`, and the bare modifiers `required`, `implicit`,
//! `explicit`, `unpacked`, `optional`, `empty`, and `oneof`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Error, Fields};

#[proc_macro_derive(Record, attributes(proto))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    record_impl(&input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

#[proc_macro_derive(ProtoEnum, attributes(proto))]
pub fn derive_proto_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    proto_enum_impl(&input)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

#[derive(Default)]
struct FieldOpts {
    name: Option<String>,
    validate: Option<String>,
    default: Option<String>,
    required: bool,
    implicit: bool,
    explicit: bool,
    unpacked: bool,
    optional: bool,
    empty: bool,
    oneof: bool,
}

fn parse_field_opts(attrs: &[syn::Attribute]) -> syn::Result<FieldOpts> {
    let mut opts = FieldOpts::default();
    for attr in attrs {
        if !attr.path().is_ident("proto") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                opts.name = Some(meta.value()?.parse::<syn::LitStr>()?.value());
            } else if meta.path.is_ident("validate") {
                opts.validate = Some(meta.value()?.parse::<syn::LitStr>()?.value());
            } else if meta.path.is_ident("default") {
                opts.default = Some(meta.value()?.parse::<syn::LitStr>()?.value());
            } else if meta.path.is_ident("required") {
                opts.required = true;
            } else if meta.path.is_ident("implicit") {
                opts.implicit = true;
            } else if meta.path.is_ident("explicit") {
                opts.explicit = true;
            } else if meta.path.is_ident("unpacked") {
                opts.unpacked = true;
            } else if meta.path.is_ident("optional") {
                opts.optional = true;
            } else if meta.path.is_ident("empty") {
                opts.empty = true;
            } else if meta.path.is_ident("oneof") {
                opts.oneof = true;
            } else {
                return Err(meta.error("unrecognized proto attribute"));
            }
            Ok(())
        })?;
    }
    Ok(opts)
}

/// Join `#[doc = "..."]` lines into one leading-comment literal.
fn doc_string(attrs: &[syn::Attribute]) -> Option<String> {
    let lines: Vec<String> = attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            syn::Meta::NameValue(nv) => match &nv.value {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Str(s),
                    ..
                }) => Some(s.value().trim().to_owned()),
                _ => None,
            },
            _ => None,
        })
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn record_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => named.named.iter().cloned().collect::<Vec<_>>(),
            Fields::Unit => Vec::new(),
            Fields::Unnamed(_) => {
                return Err(Error::new_spanned(
                    input,
                    "Record requires named struct fields",
                ))
            }
        },
        _ => {
            return Err(Error::new_spanned(
                input,
                "Record can only be derived for structs; use ProtoEnum for enums",
            ))
        }
    };

    let ident = &input.ident;
    let name_str = ident.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let type_doc = match doc_string(&input.attrs) {
        Some(doc) => quote! { .with_doc(#doc) },
        None => quote! {},
    };

    let mut field_meta = Vec::new();
    let mut to_value_entries = Vec::new();
    let mut from_value_fields = Vec::new();

    for field in &fields {
        let field_ident = field.ident.as_ref().expect("named field");
        let field_ty = &field.ty;
        let opts = parse_field_opts(&field.attrs)?;
        let proto_name = opts.name.unwrap_or_else(|| field_ident.to_string());

        let validate = match &opts.validate {
            Some(rules) => quote! { .with_validate(#rules) },
            None => quote! {},
        };
        let default = match &opts.default {
            Some(literal) => quote! { .with_default(#literal) },
            None => quote! {},
        };
        let doc = match doc_string(&field.attrs) {
            Some(doc) => quote! { .with_doc(#doc) },
            None => quote! {},
        };
        let (required, implicit, explicit, unpacked, optional, empty, oneof) = (
            opts.required,
            opts.implicit,
            opts.explicit,
            opts.unpacked,
            opts.optional,
            opts.empty,
            opts.oneof,
        );

        field_meta.push(quote! {
            .with_field(
                ::causeway::record::FieldMeta::new(
                    #proto_name,
                    <#field_ty as ::causeway::record::ProtoField>::field_kind(),
                )
                .with_modifiers(::causeway::record::Modifiers {
                    required: #required,
                    implicit: #implicit,
                    explicit: #explicit,
                    unpacked: #unpacked,
                    optional: #optional,
                    empty: #empty,
                    oneof: #oneof,
                })
                #validate
                #default
                #doc
            )
        });

        to_value_entries.push(quote! {
            (
                ::std::string::String::from(#proto_name),
                ::causeway::record::ProtoField::into_value(self.#field_ident.clone()),
            )
        });

        from_value_fields.push(quote! {
            #field_ident: ::causeway::record::ProtoField::from_value(
                fields.remove(#proto_name).unwrap_or(::causeway::value::Value::Unset),
            )
            .map_err(|e| e.in_field(#proto_name))?
        });
    }

    Ok(quote! {
        #[automatically_derived]
        impl #impl_generics ::causeway::record::Record for #ident #ty_generics #where_clause {
            fn record_type() -> ::causeway::record::RecordType {
                ::causeway::record::RecordType::new::<Self>(#name_str)
                    #type_doc
                    #(#field_meta)*
            }

            fn to_value(&self) -> ::causeway::value::Value {
                ::causeway::value::Value::Message(
                    ::std::collections::BTreeMap::from([#(#to_value_entries),*]),
                )
            }

            fn from_value(
                value: ::causeway::value::Value,
            ) -> ::std::result::Result<Self, ::causeway::error::RecordError> {
                let mut fields = match value {
                    ::causeway::value::Value::Message(fields) => fields,
                    ::causeway::value::Value::Unset => ::std::collections::BTreeMap::new(),
                    other => {
                        return Err(::causeway::error::RecordError::WrongShape {
                            expected: "message",
                            got: other.shape(),
                        })
                    }
                };
                let _ = &mut fields;
                Ok(Self { #(#from_value_fields),* })
            }
        }

        #[automatically_derived]
        impl #impl_generics ::causeway::record::ProtoField for #ident #ty_generics #where_clause {
            fn field_kind() -> ::causeway::record::FieldKind {
                ::causeway::record::FieldKind::Message(
                    ::causeway::record::MessageRef::of::<Self>(),
                )
            }

            fn into_value(self) -> ::causeway::value::Value {
                ::causeway::record::Record::to_value(&self)
            }

            fn from_value(
                value: ::causeway::value::Value,
            ) -> ::std::result::Result<Self, ::causeway::error::RecordError> {
                <Self as ::causeway::record::Record>::from_value(value)
            }
        }
    })
}

fn proto_enum_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let data = match &input.data {
        Data::Enum(data) => data,
        _ => {
            return Err(Error::new_spanned(
                input,
                "ProtoEnum can only be derived for enums",
            ))
        }
    };
    for variant in &data.variants {
        if !variant.fields.is_empty() {
            return Err(Error::new_spanned(
                variant,
                "ProtoEnum variants cannot carry data",
            ));
        }
    }

    let ident = &input.ident;
    let name_str = ident.to_string();
    // Enum numbers follow declaration order from zero, per proto3 rules.
    let values: Vec<TokenStream2> = data
        .variants
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let variant_name = v.ident.to_string();
            let number = i as i32;
            quote! { (#variant_name, #number) }
        })
        .collect();
    let to_arms: Vec<TokenStream2> = data
        .variants
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let variant = &v.ident;
            let number = i as i32;
            quote! { #ident::#variant => #number }
        })
        .collect();
    let from_arms: Vec<TokenStream2> = data
        .variants
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let variant = &v.ident;
            let number = i as i32;
            quote! { #number => ::std::option::Option::Some(#ident::#variant) }
        })
        .collect();

    let doc_expr = match doc_string(&input.attrs) {
        Some(doc) => quote! { ::std::option::Option::Some(#doc) },
        None => quote! { ::std::option::Option::None },
    };

    Ok(quote! {
        #[automatically_derived]
        impl ::causeway::record::ProtoEnum for #ident {
            fn enum_type() -> ::causeway::record::EnumType {
                ::causeway::record::EnumType {
                    name: #name_str,
                    type_id: ::std::any::TypeId::of::<Self>(),
                    doc: #doc_expr,
                    values: ::std::vec![#(#values),*],
                }
            }

            fn to_number(&self) -> i32 {
                match self { #(#to_arms),* }
            }

            fn from_number(number: i32) -> ::std::option::Option<Self> {
                match number {
                    #(#from_arms,)*
                    _ => ::std::option::Option::None,
                }
            }
        }

        #[automatically_derived]
        impl ::causeway::record::ProtoField for #ident {
            fn field_kind() -> ::causeway::record::FieldKind {
                ::causeway::record::FieldKind::Enum(::causeway::record::EnumRef::of::<Self>())
            }

            fn into_value(self) -> ::causeway::value::Value {
                ::causeway::value::Value::Int(
                    ::causeway::record::ProtoEnum::to_number(&self) as i64
                )
            }

            fn from_value(
                value: ::causeway::value::Value,
            ) -> ::std::result::Result<Self, ::causeway::error::RecordError> {
                let number = match value {
                    ::causeway::value::Value::Unset => 0,
                    ::causeway::value::Value::Int(n) => n as i32,
                    ::causeway::value::Value::UInt(n) => n as i32,
                    other => {
                        return Err(::causeway::error::RecordError::WrongShape {
                            expected: "enum number",
                            got: other.shape(),
                        })
                    }
                };
                <Self as ::causeway::record::ProtoEnum>::from_number(number).ok_or(
                    ::causeway::error::RecordError::UnknownEnumValue {
                        enum_name: #name_str,
                        number,
                    },
                )
            }
        }
    })
}

//! Procedural macros for the Fireball function server.
//!
//! This crate provides the `#[fireball_function]` attribute macro, which turns
//! an async function into a named handler type that can be registered on a
//! server.
//!
//! # Example
//!
//! ```ignore
//! use fireball::prelude::*;
//!
//! #[fireball_function(name = "hello")]
//! async fn hello(req: RawRequest, ctx: RequestContext) -> Result<Envelope, HandlerError> {
//!     ctx.logger.info("hello from function");
//!     Ok(success(serde_json::json!({ "message": "hello world" })))
//! }
//!
//! server.register(HelloFunction::NAME, HelloFunction);
//! ```

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, punctuated::Punctuated, Expr, ExprLit, FnArg, ItemFn, Lit, Meta, Token,
};

/// Attributes for the `#[fireball_function]` macro.
#[derive(Default, Debug)]
struct FunctionAttrs {
    /// Name the function is registered under.
    name: Option<String>,
    /// Optional description.
    description: Option<String>,
}

impl FunctionAttrs {
    fn parse_meta_list(metas: Punctuated<Meta, Token![,]>) -> syn::Result<Self> {
        let mut attrs = FunctionAttrs::default();

        for meta in metas {
            let nv = match meta {
                Meta::NameValue(nv) => nv,
                other => return Err(syn::Error::new_spanned(other, "expected name = value")),
            };

            let ident = nv
                .path
                .get_ident()
                .ok_or_else(|| syn::Error::new_spanned(&nv.path, "expected identifier"))?
                .to_string();

            let value = match &nv.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(lit_str),
                    ..
                }) => lit_str.value(),
                _ => return Err(syn::Error::new_spanned(&nv.value, "expected string literal")),
            };

            match ident.as_str() {
                "name" => attrs.name = Some(value),
                "description" => attrs.description = Some(value),
                _ => {
                    return Err(syn::Error::new_spanned(
                        nv.path,
                        format!("unknown attribute: {}", ident),
                    ));
                }
            }
        }

        Ok(attrs)
    }
}

/// Generate a `FunctionHandler` type for an async function.
///
/// The function must be `async` and take `(RawRequest, RequestContext)`,
/// returning `Result<Envelope, HandlerError>`. For `fn say_hello` the macro
/// emits a unit struct `SayHelloFunction` with `NAME` and `DESCRIPTION`
/// constants; the function itself is kept unchanged.
///
/// # Attributes
///
/// - `name` (optional): registered name, defaults to the function name
/// - `description` (optional): free-form description
#[proc_macro_attribute]
pub fn fireball_function(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args with Punctuated::<Meta, Token![,]>::parse_terminated);
    let input_fn = parse_macro_input!(input as ItemFn);

    match generate_function(args, input_fn) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn generate_function(
    args: Punctuated<Meta, Token![,]>,
    input_fn: ItemFn,
) -> syn::Result<proc_macro2::TokenStream> {
    let attrs = FunctionAttrs::parse_meta_list(args)?;

    if input_fn.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            &input_fn.sig,
            "fireball_function must be async",
        ));
    }

    let typed_args = input_fn
        .sig
        .inputs
        .iter()
        .filter(|arg| matches!(arg, FnArg::Typed(_)))
        .count();
    if typed_args != 2 || input_fn.sig.inputs.len() != 2 {
        return Err(syn::Error::new_spanned(
            &input_fn.sig.inputs,
            "fireball_function expects (RawRequest, RequestContext)",
        ));
    }

    let fn_name = &input_fn.sig.ident;
    let name = attrs.name.unwrap_or_else(|| fn_name.to_string());
    let description = attrs.description.unwrap_or_default();
    let struct_name = format_ident!("{}Function", to_pascal_case(&fn_name.to_string()));
    let fn_vis = &input_fn.vis;

    let expanded = quote! {
        #input_fn

        /// Generated handler type.
        #[derive(Debug, Default, Clone, Copy)]
        #fn_vis struct #struct_name;

        impl #struct_name {
            /// Name the function is registered under.
            pub const NAME: &'static str = #name;
            /// Description given to the macro.
            pub const DESCRIPTION: &'static str = #description;

            /// Create a new instance of the function.
            pub fn new() -> Self {
                Self
            }
        }

        #[fireball::prelude::async_trait]
        impl fireball::function::FunctionHandler for #struct_name {
            async fn call(
                &self,
                request: fireball::http::RawRequest,
                ctx: fireball::function::RequestContext,
            ) -> Result<fireball::envelope::Envelope, fireball::function::HandlerError> {
                #fn_name(request, ctx).await
            }
        }
    };

    Ok(expanded)
}

/// Convert a snake_case string to PascalCase.
fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().chain(chars).collect(),
            }
        })
        .collect()
}

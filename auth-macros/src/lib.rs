// Copyright (c) 2025 the openauth_issuer contributors
// Licensed under the MIT license (see LICENSE.md for details).

//! Procedural macros for creating scope-protected Rocket routes.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, punctuated::Punctuated, Expr, ItemFn, Lit, Token};

/// Attribute macro for GET routes that require a bearer access token
/// carrying a specific scope.
///
/// This macro injects a [`crate::http::guards::ScopedBearer`] request guard
/// (verifying the bearer token's signature, issuer, audience, and expiry
/// against the running issuer's key manager), checks that the token's
/// scopes include the required scope, and returns HTTP 403 if not.
///
/// # Syntax
///
/// ```rust,ignore
/// #[protect_get("/admin/users", "admin:users")]
/// fn list_users() -> Json<Vec<User>> {
///     // `bearer: ScopedBearer` is automatically available in scope
///     Json(vec![User { id: bearer.subject.id.clone(), .. }])
/// }
/// ```
///
/// If `bearer: ScopedBearer` already appears in the function signature, the
/// macro only adds the scope check rather than injecting a second
/// parameter.
#[proc_macro_attribute]
pub fn protect_get(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args with Punctuated::<Expr, Token![,]>::parse_terminated);
    let input_fn = parse_macro_input!(input as ItemFn);

    let (path, scope) = match parse_protect_args(&args) {
        Ok((p, scope)) => (p, scope),
        Err(err) => return syn::Error::new_spanned(&input_fn, err).to_compile_error().into(),
    };

    let fn_name = &input_fn.sig.ident;
    let fn_vis = &input_fn.vis;
    let fn_block = &input_fn.block;
    let fn_inputs = &input_fn.sig.inputs;
    let fn_output = &input_fn.sig.output;
    let fn_attrs = &input_fn.attrs;

    let return_type = match fn_output {
        syn::ReturnType::Default => quote! { () },
        syn::ReturnType::Type(_, ty) => quote! { #ty },
    };

    let has_bearer_param = fn_inputs.iter().any(|arg| {
        if let syn::FnArg::Typed(pat_type) = arg {
            if let syn::Type::Path(type_path) = &*pat_type.ty {
                return type_path
                    .path
                    .segments
                    .last()
                    .map(|seg| seg.ident == "ScopedBearer")
                    .unwrap_or(false);
            }
        }
        false
    });

    let expanded = if has_bearer_param {
        quote! {
            #(#fn_attrs)*
            #[rocket::get(#path)]
            #fn_vis fn #fn_name(#fn_inputs) -> rocket::Either<rocket::response::status::Forbidden<&'static str>, #return_type> {
                if !bearer.has_scope(#scope) {
                    return rocket::Either::Left(rocket::response::status::Forbidden("insufficient scope"));
                }
                rocket::Either::Right(#fn_block)
            }
        }
    } else {
        quote! {
            #(#fn_attrs)*
            #[rocket::get(#path)]
            #fn_vis fn #fn_name(
                bearer: crate::http::guards::ScopedBearer,
                #fn_inputs
            ) -> rocket::Either<rocket::response::status::Forbidden<&'static str>, #return_type> {
                if !bearer.has_scope(#scope) {
                    return rocket::Either::Left(rocket::response::status::Forbidden("insufficient scope"));
                }
                rocket::Either::Right(#fn_block)
            }
        }
    };

    expanded.into()
}

fn parse_protect_args(args: &Punctuated<Expr, Token![,]>) -> Result<(String, String), String> {
    if args.len() != 2 {
        return Err("protect_get requires exactly 2 arguments: path and required scope".to_string());
    }

    let path = match &args[0] {
        Expr::Lit(expr_lit) => {
            if let Lit::Str(lit_str) = &expr_lit.lit {
                lit_str.value()
            } else {
                return Err("First argument (path) must be a string literal".to_string());
            }
        }
        _ => return Err("First argument (path) must be a string literal".to_string()),
    };

    let scope = match &args[1] {
        Expr::Lit(expr_lit) => {
            if let Lit::Str(lit_str) = &expr_lit.lit {
                lit_str.value()
            } else {
                return Err("Second argument (scope) must be a string literal".to_string());
            }
        }
        _ => return Err("Second argument (scope) must be a string literal".to_string()),
    };

    Ok((path, scope))
}

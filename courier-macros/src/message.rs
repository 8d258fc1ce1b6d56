use crate::utils::{message_impl, parse_message_attrs};
use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, parse_macro_input};

pub(crate) fn expand_request(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let attrs = match parse_message_attrs(&input.attrs, "request", Some("response")) {
        Ok(attrs) => attrs,
        Err(e) => return e.to_compile_error().into(),
    };

    let message = message_impl(&input, attrs.name.as_ref());
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    // 未指定 response 时视为无返回值请求
    let response = attrs.ty.unwrap_or_else(|| syn::parse_quote! { () });

    TokenStream::from(quote! {
        #message

        impl #impl_generics ::courier::message::Request for #ident #ty_generics #where_clause {
            type Response = #response;
        }
    })
}

pub(crate) fn expand_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let attrs = match parse_message_attrs(&input.attrs, "event", None) {
        Ok(attrs) => attrs,
        Err(e) => return e.to_compile_error().into(),
    };

    let message = message_impl(&input, attrs.name.as_ref());
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    TokenStream::from(quote! {
        #message

        impl #impl_generics ::courier::message::Event for #ident #ty_generics #where_clause {}
    })
}

pub(crate) fn expand_stream_request(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let attrs = match parse_message_attrs(&input.attrs, "stream_request", Some("item")) {
        Ok(attrs) => attrs,
        Err(e) => return e.to_compile_error().into(),
    };

    let Some(item) = attrs.ty else {
        return syn::Error::new_spanned(
            &input.ident,
            "#[derive(StreamRequest)] requires #[stream_request(item = Type)]",
        )
        .to_compile_error()
        .into();
    };

    let message = message_impl(&input, attrs.name.as_ref());
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    TokenStream::from(quote! {
        #message

        impl #impl_generics ::courier::message::StreamRequest for #ident #ty_generics #where_clause {
            type Item = #item;
        }
    })
}

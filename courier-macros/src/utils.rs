use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, DeriveInput, LitStr, Type};

/// 消息派生的公共参数
#[derive(Default)]
pub(crate) struct MessageAttrs {
    pub(crate) name: Option<LitStr>,
    pub(crate) ty: Option<Type>,
}

/// 解析 `#[attr_name(name = "...", <type_key> = Type)]`；
/// `type_key` 为 `None` 时只接受 `name`
pub(crate) fn parse_message_attrs(
    attrs: &[Attribute],
    attr_name: &str,
    type_key: Option<&str>,
) -> syn::Result<MessageAttrs> {
    let mut out = MessageAttrs::default();

    for attr in attrs.iter().filter(|a| a.path().is_ident(attr_name)) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                if out.name.is_some() {
                    return Err(meta.error("duplicate key 'name' in attribute"));
                }
                out.name = Some(meta.value()?.parse()?);
                return Ok(());
            }

            match type_key {
                Some(key) if meta.path.is_ident(key) => {
                    if out.ty.is_some() {
                        return Err(meta.error(format!("duplicate key '{key}' in attribute")));
                    }
                    out.ty = Some(meta.value()?.parse()?);
                    Ok(())
                }
                _ => Err(meta.error("unsupported key in attribute")),
            }
        })?;
    }

    Ok(out)
}

// 生成 `Message` 实现；名称缺省为类型标识符
pub(crate) fn message_impl(input: &DeriveInput, name: Option<&LitStr>) -> TokenStream2 {
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let name = name
        .cloned()
        .unwrap_or_else(|| LitStr::new(&ident.to_string(), ident.span()));

    quote! {
        impl #impl_generics ::courier::message::Message for #ident #ty_generics #where_clause {
            const NAME: &'static str = #name;
        }
    }
}

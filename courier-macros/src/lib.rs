use proc_macro::TokenStream;

mod message;
mod utils;

/// 派生 `Message` + `Request`
/// - 参数：`#[request(response = Type, name = "...")]`
/// - `response` 缺省为 `()`（无返回值请求）；`name` 缺省为类型名
#[proc_macro_derive(Request, attributes(request))]
pub fn derive_request(input: TokenStream) -> TokenStream {
    message::expand_request(input)
}

/// 派生 `Message` + `Event`（类型本身还需实现 `serde::Serialize`）
/// - 参数：`#[event(name = "...")]`
#[proc_macro_derive(Event, attributes(event))]
pub fn derive_event(input: TokenStream) -> TokenStream {
    message::expand_event(input)
}

/// 派生 `Message` + `StreamRequest`
/// - 参数：`#[stream_request(item = Type, name = "...")]`，`item` 必填
#[proc_macro_derive(StreamRequest, attributes(stream_request))]
pub fn derive_stream_request(input: TokenStream) -> TokenStream {
    message::expand_stream_request(input)
}

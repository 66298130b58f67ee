/// / One entry of a binary log.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BinLog {
    /// / What kind of entry this is.
    #[prost(string, required, tag="1")]
    pub r#type: ::prost::alloc::string::String,
    /// / The entity the entry is about.
    #[prost(string, required, tag="2")]
    pub key: ::prost::alloc::string::String,
    /// / Milliseconds since the unix epoch.
    #[prost(int64, required, tag="3")]
    pub timestamp: i64,
    /// / Opaque entry body.
    #[prost(bytes="vec", optional, tag="4")]
    pub data: ::core::option::Option<::prost::alloc::vec::Vec<u8>>,
}

//! Messages compiled from `proto/`.

pub mod binlog {
    include!("./generated/binlog.rs");

    /// JSON reflection of `proto/binlog.proto`, for use with
    /// [DynamicCodec](crate::DynamicCodec).
    pub const SCHEMA_JSON: &str = include_str!("../schemas/binlog.json");

    /// Fully qualified name of [BinLog].
    pub const MESSAGE_TYPE: &str = "binlog.BinLog";
}
